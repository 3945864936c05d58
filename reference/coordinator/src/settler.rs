//! Disbursement of an operation's accumulated value.

use std::sync::Arc;

use tracing::{error, info, instrument};

use omnisweep_common::{Address, DomainId, Result, SweepOperation, Value};
use omnisweep_protocol::{BridgeReceipt, Custody, PrivacyHook, ValueBridge};

/// Where finalized value went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disbursement {
    /// Nothing had accumulated.
    Nothing,
    /// Handed to the privacy hook.
    Shielded { amount: Value, reference: String },
    /// Transferred to the final receiver on this domain.
    Transferred {
        to: Address,
        amount: Value,
        reference: String,
    },
    /// Bridged to the final receiver's domain.
    Bridged(BridgeReceipt),
}

impl Disbursement {
    pub fn amount(&self) -> Value {
        match self {
            Disbursement::Nothing => Value::ZERO,
            Disbursement::Shielded { amount, .. } | Disbursement::Transferred { amount, .. } => {
                *amount
            }
            Disbursement::Bridged(receipt) => receipt.amount,
        }
    }
}

/// Moves value out of custody when an operation closes.
pub struct Settler {
    self_domain: DomainId,
    custody: Arc<dyn Custody>,
    bridge: Arc<dyn ValueBridge>,
    privacy: Arc<dyn PrivacyHook>,
}

impl Settler {
    pub fn new(
        self_domain: DomainId,
        custody: Arc<dyn Custody>,
        bridge: Arc<dyn ValueBridge>,
        privacy: Arc<dyn PrivacyHook>,
    ) -> Self {
        Self {
            self_domain,
            custody,
            bridge,
            privacy,
        }
    }

    /// Forward `operation.accumulated`: to the privacy hook when the
    /// operation asked for it, else straight to the final receiver, locally
    /// or across the bridge.
    #[instrument(
        skip(self, operation),
        fields(operation_id = %operation.id, amount = %operation.accumulated)
    )]
    pub async fn disburse(&self, operation: &SweepOperation) -> Result<Disbursement> {
        let amount = operation.accumulated;
        if amount.is_zero() {
            info!(operation_id = %operation.id, "Nothing accumulated, no value moved");
            return Ok(Disbursement::Nothing);
        }

        let result = if operation.privacy {
            self.privacy
                .shield(operation.id, amount)
                .await
                .map(|reference| Disbursement::Shielded { amount, reference })
        } else if operation.final_receiver_domain.is_local_sentinel()
            || operation.final_receiver_domain == self.self_domain
        {
            self.custody
                .transfer(operation.final_receiver, amount)
                .await
                .map(|reference| Disbursement::Transferred {
                    to: operation.final_receiver,
                    amount,
                    reference,
                })
        } else {
            self.bridge
                .send_value(
                    operation.final_receiver_domain,
                    operation.final_receiver,
                    amount,
                )
                .await
                .map(Disbursement::Bridged)
        };

        match &result {
            Ok(disbursement) => info!(
                operation_id = %operation.id,
                disbursement = ?disbursement,
                "Value disbursed"
            ),
            Err(e) => error!(
                operation_id = %operation.id,
                error = %e,
                "Disbursement failed"
            ),
        }
        result
    }

    /// Canonical balance currently held in custody.
    pub async fn custody_balance(&self) -> Result<Value> {
        self.custody.balance().await
    }
}
