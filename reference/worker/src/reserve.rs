//! Fee reserve for completion notices.
//!
//! A dispatch holds its notice fee before any value is bridged. The hold is
//! settled when the notice goes out, released if the dispatch unwinds, and
//! otherwise stays held for as long as the notice is outstanding, so a later
//! dispatch can never spend it.

use parking_lot::Mutex;
use tracing::{info, warn};

use omnisweep_common::{Result, SweepError, Value};

#[derive(Debug, Default, Clone, Copy)]
struct Balances {
    available: Value,
    held: Value,
}

/// Canonical value the worker keeps aside to pay notice fees.
#[derive(Debug, Default)]
pub struct FeeReserve {
    balances: Mutex<Balances>,
}

impl FeeReserve {
    pub fn new(initial: Value) -> Self {
        Self {
            balances: Mutex::new(Balances {
                available: initial,
                held: Value::ZERO,
            }),
        }
    }

    /// Value not committed to any notice.
    pub fn available(&self) -> Value {
        self.balances.lock().available
    }

    /// Value held for notices not yet sent.
    pub fn held(&self) -> Value {
        self.balances.lock().held
    }

    /// Move `fee` from available to held.
    ///
    /// Fails with [`SweepError::InsufficientFee`] and leaves the reserve
    /// unchanged when `fee` is not covered.
    pub fn hold(&self, fee: Value) -> Result<()> {
        let mut balances = self.balances.lock();
        let available = balances.available.checked_sub(fee).ok_or_else(|| {
            SweepError::InsufficientFee {
                required: fee.to_string(),
                available: balances.available.to_string(),
            }
        })?;
        balances.available = available;
        balances.held = balances.held.saturating_add(fee);
        Ok(())
    }

    /// Return a hold to available; used when the dispatch unwinds.
    pub fn release(&self, fee: Value) {
        let mut balances = self.balances.lock();
        balances.held = balances.held.saturating_sub(fee);
        balances.available = balances.available.saturating_add(fee);
    }

    /// Close a hold of `held_fee` after the notice paid `paid`.
    ///
    /// Any unspent part of the hold returns to available. A fee above the
    /// hold is taken from available, clamping at zero.
    pub fn settle(&self, held_fee: Value, paid: Value) {
        let mut balances = self.balances.lock();
        balances.held = balances.held.saturating_sub(held_fee);
        match held_fee.checked_sub(paid) {
            Some(refund) => balances.available = balances.available.saturating_add(refund),
            None => {
                let excess = paid.saturating_sub(held_fee);
                warn!(held = %held_fee, paid = %paid, "Notice fee exceeded its hold");
                balances.available = balances.available.saturating_sub(excess);
            }
        }
    }

    /// Add `amount` to available. Fails if the reserve total would overflow.
    pub fn fund(&self, amount: Value) -> Result<Value> {
        let mut balances = self.balances.lock();
        let overflow = || SweepError::invalid_field("fee reserve would overflow", "amount");
        balances
            .available
            .checked_add(balances.held)
            .and_then(|total| total.checked_add(amount))
            .ok_or_else(overflow)?;
        balances.available = balances.available.checked_add(amount).ok_or_else(overflow)?;
        info!(
            added = %amount,
            available = %balances.available,
            held = %balances.held,
            "Fee reserve funded"
        );
        Ok(balances.available)
    }
}
