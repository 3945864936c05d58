//! Custody and privacy hook interfaces used when an operation finalizes.

use async_trait::async_trait;

use omnisweep_common::{Address, OperationId, Result, Value};

/// The coordinator's own holdings of the canonical value unit.
#[async_trait]
pub trait Custody: Send + Sync {
    async fn balance(&self) -> Result<Value>;

    /// Move `amount` to `to` inside the local domain; returns a reference.
    async fn transfer(&self, to: Address, amount: Value) -> Result<String>;
}

/// Post-aggregation anonymization step. Only the gating is part of the
/// protocol; what `shield` does with the value is up to the implementation.
#[async_trait]
pub trait PrivacyHook: Send + Sync {
    async fn shield(&self, operation_id: OperationId, amount: Value) -> Result<String>;
}
