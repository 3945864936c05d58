//! Conversion venue interface and batch execution.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{error, warn};

use omnisweep_common::{AssetId, DispatchInstruction, Result, SweepError, Value, VenueId};

/// Proof of one completed conversion, enough to reverse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReceipt {
    pub venue: VenueId,
    pub asset: AssetId,
    pub amount_in: Decimal,
    pub value_out: Value,
    pub reference: String,
}

/// External venue converting one asset into the canonical value unit.
///
/// Each `convert` call is all-or-nothing. `unwind` reverses a conversion the
/// venue previously reported, and is only called for receipts it issued.
#[async_trait]
pub trait ConversionAdapter: Send + Sync {
    async fn convert(&self, instruction: &DispatchInstruction) -> Result<ConversionReceipt>;

    async fn unwind(&self, receipt: &ConversionReceipt) -> Result<()>;
}

/// Outcome of a fully successful batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConversion {
    pub receipts: Vec<ConversionReceipt>,
    pub total: Value,
}

impl BatchConversion {
    pub fn instruction_count(&self) -> u32 {
        self.receipts.len() as u32
    }
}

/// Convert every instruction or none of them.
///
/// All instructions are validated before the first venue call. If any
/// conversion fails, the receipts already obtained are unwound in reverse
/// order and the failure is returned as [`SweepError::AdapterFailure`]. A
/// batch whose outputs sum past the value unit's range is unwound as a whole
/// and rejected as invalid input.
pub async fn convert_batch(
    adapter: &dyn ConversionAdapter,
    instructions: &[DispatchInstruction],
) -> Result<BatchConversion> {
    if instructions.is_empty() {
        return Err(SweepError::NoInstructions);
    }
    for instruction in instructions {
        instruction.validate()?;
    }

    let mut receipts = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        match adapter.convert(instruction).await {
            Ok(receipt) => receipts.push(receipt),
            Err(e) => {
                warn!(
                    venue = %instruction.venue,
                    asset = %instruction.asset,
                    error = %e,
                    completed = receipts.len(),
                    "Conversion failed, unwinding batch"
                );
                unwind_batch(adapter, &receipts).await;
                return Err(as_adapter_failure(instruction, e));
            }
        }
    }

    let total = receipts
        .iter()
        .try_fold(Value::ZERO, |acc, r| acc.checked_add(r.value_out));
    match total {
        Some(total) => Ok(BatchConversion { receipts, total }),
        None => {
            warn!(
                completed = receipts.len(),
                "Batch output overflows the value unit, unwinding batch"
            );
            unwind_batch(adapter, &receipts).await;
            Err(SweepError::invalid_field(
                "batch output overflows the value unit",
                "instructions",
            ))
        }
    }
}

/// Reverse `receipts` in reverse order. Unwind failures are logged, not
/// returned: the batch is already failing and the venue owns recovery.
pub async fn unwind_batch(adapter: &dyn ConversionAdapter, receipts: &[ConversionReceipt]) {
    for receipt in receipts.iter().rev() {
        if let Err(e) = adapter.unwind(receipt).await {
            error!(
                venue = %receipt.venue,
                asset = %receipt.asset,
                reference = %receipt.reference,
                error = %e,
                "Failed to unwind conversion"
            );
        }
    }
}

fn as_adapter_failure(instruction: &DispatchInstruction, err: SweepError) -> SweepError {
    match err {
        SweepError::AdapterFailure { .. } => err,
        other => SweepError::AdapterFailure {
            venue: instruction.venue.to_string(),
            asset: instruction.asset.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryVault, StaticRateVenue};
    use omnisweep_common::Address;
    use std::sync::Arc;

    fn venue() -> (Arc<MemoryVault>, StaticRateVenue) {
        let vault = Arc::new(MemoryVault::new(Address::from_label("worker")));
        vault.deposit_asset(&AssetId::new("A1"), Decimal::from(1000));
        vault.deposit_asset(&AssetId::new("A2"), Decimal::from(1000));
        let venue = StaticRateVenue::new(vault.clone())
            .with_rate("A1", Decimal::from(2))
            .with_rate("A2", Decimal::ONE);
        (vault, venue)
    }

    #[tokio::test]
    async fn test_batch_sums_outputs() {
        let (vault, venue) = venue();
        let batch = convert_batch(
            &venue,
            &[
                DispatchInstruction::new("V1", "A1", Decimal::from(100)),
                DispatchInstruction::new("V2", "A2", Decimal::from(50)),
            ],
        )
        .await
        .unwrap();

        assert_eq!(batch.total, Value::from_u64(250));
        assert_eq!(batch.instruction_count(), 2);
        assert_eq!(vault.balance_of(&vault.owner()), Value::from_u64(250));
    }

    #[tokio::test]
    async fn test_failure_unwinds_earlier_conversions() {
        let (vault, venue) = venue();
        venue.fail_asset("A2");

        let err = convert_batch(
            &venue,
            &[
                DispatchInstruction::new("V1", "A1", Decimal::from(100)),
                DispatchInstruction::new("V2", "A2", Decimal::from(50)),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SweepError::AdapterFailure { ref asset, .. } if asset == "A2"));
        assert_eq!(vault.balance_of(&vault.owner()), Value::ZERO);
        assert_eq!(vault.asset_balance(&AssetId::new("A1")), Decimal::from(1000));
        assert_eq!(venue.unwound_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_precedes_venue_calls() {
        let (_vault, venue) = venue();
        let err = convert_batch(
            &venue,
            &[
                DispatchInstruction::new("V1", "A1", Decimal::from(100)),
                DispatchInstruction::new("V1", "A1", Decimal::ZERO),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SweepError::InvalidInput { .. }));
        assert_eq!(venue.conversion_count(), 0);
    }

    /// Venue that reports a fixed output per conversion and counts unwinds.
    struct FixedOutputVenue {
        output: Value,
        unwound: parking_lot::Mutex<u32>,
    }

    #[async_trait]
    impl ConversionAdapter for FixedOutputVenue {
        async fn convert(&self, instruction: &DispatchInstruction) -> Result<ConversionReceipt> {
            Ok(ConversionReceipt {
                venue: instruction.venue.clone(),
                asset: instruction.asset.clone(),
                amount_in: instruction.amount,
                value_out: self.output,
                reference: instruction.venue.to_string(),
            })
        }

        async fn unwind(&self, _receipt: &ConversionReceipt) -> Result<()> {
            *self.unwound.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_overflowing_batch_is_unwound() {
        let venue = FixedOutputVenue {
            output: "50000000000000000000000000000".parse().unwrap(),
            unwound: parking_lot::Mutex::new(0),
        };

        let err = convert_batch(
            &venue,
            &[
                DispatchInstruction::new("V1", "A1", Decimal::ONE),
                DispatchInstruction::new("V2", "A2", Decimal::ONE),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SweepError::InvalidInput { .. }));
        assert_eq!(*venue.unwound.lock(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (_vault, venue) = venue();
        assert!(matches!(
            convert_batch(&venue, &[]).await,
            Err(SweepError::NoInstructions)
        ));
    }
}
