//! Monetary types for the omnisweep protocol.
//!
//! Every domain consolidates into one canonical settlement asset; [`Value`]
//! is an amount of that asset. Transport fees are paid in the domain's fee
//! asset and are also expressed as [`Value`] since the core only compares
//! and sums them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// A non-negative amount of the canonical value unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(Decimal);

impl Value {
    pub const ZERO: Value = Value(Decimal::ZERO);

    /// Create a value; negative amounts are rejected.
    pub fn new(amount: Decimal) -> Option<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            None
        } else {
            Some(Self(amount))
        }
    }

    /// Create from an integer amount.
    pub fn from_u64(amount: u64) -> Self {
        Self(Decimal::from(amount))
    }

    /// Get the underlying decimal.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Add, returning `None` on decimal overflow.
    pub fn checked_add(&self, other: Value) -> Option<Value> {
        self.0.checked_add(other.0).map(Value)
    }

    /// Subtract, returning `None` if the result would be negative.
    pub fn checked_sub(&self, other: Value) -> Option<Value> {
        if other.0 > self.0 {
            None
        } else {
            Some(Value(self.0 - other.0))
        }
    }

    /// Subtract, clamping at zero.
    pub fn saturating_sub(&self, other: Value) -> Value {
        self.checked_sub(other).unwrap_or(Value::ZERO)
    }

    /// Add, clamping at the largest representable amount.
    pub fn saturating_add(&self, other: Value) -> Value {
        Value(self.0.saturating_add(other.0))
    }
}

impl Add for Value {
    type Output = Value;

    fn add(self, other: Value) -> Value {
        Value(self.0 + other.0)
    }
}

impl AddAssign for Value {
    fn add_assign(&mut self, other: Value) {
        self.0 += other.0;
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item = Value>>(iter: I) -> Value {
        iter.fold(Value::ZERO, |acc, v| acc + v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Error parsing a [`Value`] from its decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueParseError {
    #[error("invalid decimal: {0}")]
    Decimal(String),
    #[error("value cannot be negative: {0}")]
    Negative(String),
}

impl FromStr for Value {
    type Err = ValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s).map_err(|e| ValueParseError::Decimal(e.to_string()))?;
        Value::new(amount).ok_or_else(|| ValueParseError::Negative(s.to_string()))
    }
}

impl From<u64> for Value {
    fn from(amount: u64) -> Self {
        Self::from_u64(amount)
    }
}
