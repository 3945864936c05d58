//! Remote worker: converts a domain's assets on request from the origin,
//! bridges the proceeds back, and reports completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use omnisweep_common::{
    Address, DispatchInstruction, DomainId, OperationId, Result, SweepError, Value,
};
use omnisweep_protocol::{
    convert_batch, unwind_batch, BatchConversion, BridgeFlavor, ConversionAdapter, Envelope,
    InboundHandler, InboundMessage, InboundOutcome, MessageTransport, ProtocolMessage,
    TransportReceipt, ValueBridge,
};

use crate::config::WorkerConfig;
use crate::reserve::FeeReserve;

/// Bridge references longer than this are truncated in notices, so the fee
/// quoted before bridging covers the notice actually sent.
pub const MAX_BRIDGE_REFERENCE_LEN: usize = 64;

/// External collaborators the worker drives.
pub struct WorkerCollaborators {
    pub transport: Arc<dyn MessageTransport>,
    pub adapter: Arc<dyn ConversionAdapter>,
    pub bridge: Arc<dyn ValueBridge>,
}

/// Record of a dispatch this worker converted and bridged.
#[derive(Debug, Clone)]
pub struct CompletedDispatch {
    pub operation_id: OperationId,
    pub value: Value,
    pub instruction_count: u32,
    pub bridge_reference: String,
    /// Fee set aside for the notice.
    pub notice_fee: Value,
    /// `None` while the notice is still unsent.
    pub notice: Option<TransportReceipt>,
}

/// Worker counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub dispatches_completed: AtomicU64,
    pub dispatches_failed: AtomicU64,
    pub dispatches_duplicate: AtomicU64,
    pub messages_rejected: AtomicU64,
    pub notices_sent: AtomicU64,
    pub notices_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub dispatches_completed: u64,
    pub dispatches_failed: u64,
    pub dispatches_duplicate: u64,
    pub messages_rejected: u64,
    pub notices_sent: u64,
    pub notices_failed: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            dispatches_completed: self.dispatches_completed.load(Ordering::Relaxed),
            dispatches_failed: self.dispatches_failed.load(Ordering::Relaxed),
            dispatches_duplicate: self.dispatches_duplicate.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            notices_sent: self.notices_sent.load(Ordering::Relaxed),
            notices_failed: self.notices_failed.load(Ordering::Relaxed),
        }
    }
}

/// The remote worker for one domain.
pub struct RemoteWorker {
    config: WorkerConfig,
    transport: Arc<dyn MessageTransport>,
    adapter: Arc<dyn ConversionAdapter>,
    bridge: Arc<dyn ValueBridge>,
    reserve: FeeReserve,
    completed: DashMap<OperationId, CompletedDispatch>,
    stats: WorkerStats,
    processing: Mutex<()>,
}

impl RemoteWorker {
    /// Create a worker. Fails if the configuration does not validate.
    pub fn new(config: WorkerConfig, collaborators: WorkerCollaborators) -> Result<Self> {
        config.validate().map_err(SweepError::Configuration)?;

        info!(
            domain = %config.self_domain,
            origin = %config.origin_domain,
            reserve = %config.notice_fee_reserve,
            "Worker created"
        );

        Ok(Self {
            reserve: FeeReserve::new(config.notice_fee_reserve),
            config,
            transport: collaborators.transport,
            adapter: collaborators.adapter,
            bridge: collaborators.bridge,
            completed: DashMap::new(),
            stats: WorkerStats::default(),
            processing: Mutex::new(()),
        })
    }

    /// Process one dispatch request from the origin.
    ///
    /// The batch converts all-or-nothing. The notice fee is held from the
    /// reserve before any value is bridged; if it is not covered the
    /// conversions are unwound and nothing leaves the worker. The hold stays
    /// in place until the notice is sent. A redelivered
    /// dispatch for a completed operation is acknowledged as a duplicate,
    /// or, if its notice never went out, re-sends the notice.
    #[instrument(
        skip(self, instructions),
        fields(domain = %self.config.self_domain, instructions = instructions.len())
    )]
    async fn on_dispatch_request(
        &self,
        operation_id: OperationId,
        instructions: Vec<DispatchInstruction>,
    ) -> Result<InboundOutcome> {
        if let Some(done) = self.completed.get(&operation_id).map(|d| d.value().clone()) {
            if done.notice.is_some() {
                self.stats.dispatches_duplicate.fetch_add(1, Ordering::Relaxed);
                warn!(operation_id = %operation_id, "Duplicate dispatch ignored");
                return Ok(InboundOutcome::Duplicate);
            }
            info!(
                operation_id = %operation_id,
                "Dispatch redelivered with notice outstanding, resending"
            );
            self.send_notice(done).await?;
            return Ok(InboundOutcome::Processed);
        }

        if instructions.is_empty() {
            self.stats.dispatches_failed.fetch_add(1, Ordering::Relaxed);
            return Err(SweepError::NoInstructions);
        }

        let batch = convert_batch(self.adapter.as_ref(), &instructions)
            .await
            .map_err(|e| self.failed(operation_id, e))?;

        let notice_fee = match self.quote_notice(operation_id, &batch).await {
            Ok(fee) => fee,
            Err(e) => {
                unwind_batch(self.adapter.as_ref(), &batch.receipts).await;
                return Err(self.failed(operation_id, e));
            }
        };

        let bridge_reference = if batch.total.is_zero() {
            String::new()
        } else {
            match self
                .bridge
                .send_value(
                    self.config.origin_domain,
                    self.config.origin_coordinator,
                    batch.total,
                )
                .await
            {
                Ok(receipt) => receipt.reference,
                Err(e) => {
                    self.reserve.release(notice_fee);
                    unwind_batch(self.adapter.as_ref(), &batch.receipts).await;
                    return Err(self.failed(operation_id, e));
                }
            }
        };

        let done = CompletedDispatch {
            operation_id,
            value: batch.total,
            instruction_count: batch.instruction_count(),
            bridge_reference: truncate(bridge_reference),
            notice_fee,
            notice: None,
        };
        // Value has left the domain; from here on the dispatch is never
        // converted again.
        self.completed.insert(operation_id, done.clone());
        self.stats.dispatches_completed.fetch_add(1, Ordering::Relaxed);

        info!(
            operation_id = %operation_id,
            value = %done.value,
            reference = %done.bridge_reference,
            "Batch converted and bridged"
        );

        self.send_notice(done).await?;
        Ok(InboundOutcome::Processed)
    }

    /// Top up the notice fee reserve.
    pub fn fund_fee_reserve(&self, caller: Address, amount: Value) -> Result<Value> {
        self.require_admin(&caller)?;
        self.reserve.fund(amount)
    }

    /// Retry the completion notice for an operation whose notice failed.
    pub async fn resend_notice(
        &self,
        caller: Address,
        operation_id: OperationId,
    ) -> Result<TransportReceipt> {
        self.require_admin(&caller)?;
        let _guard = self.processing.lock().await;

        let done = self
            .completed
            .get(&operation_id)
            .map(|d| d.value().clone())
            .ok_or(SweepError::OperationNotFound(operation_id))?;
        if let Some(receipt) = done.notice {
            return Ok(receipt);
        }
        self.send_notice(done).await
    }

    pub fn fee_reserve(&self) -> Value {
        self.reserve.available()
    }

    /// Fees held for notices that have not gone out.
    pub fn held_notice_fees(&self) -> Value {
        self.reserve.held()
    }

    pub fn completed_dispatch(&self, operation_id: &OperationId) -> Option<CompletedDispatch> {
        self.completed.get(operation_id).map(|d| d.value().clone())
    }

    /// Operations whose value was bridged but whose notice is unsent.
    pub fn outstanding_notices(&self) -> Vec<OperationId> {
        self.completed
            .iter()
            .filter(|d| d.notice.is_none())
            .map(|d| d.operation_id)
            .collect()
    }

    pub fn bridge_flavor(&self) -> Option<BridgeFlavor> {
        self.config.bridge.flavor_for(self.config.self_domain)
    }

    pub fn domain(&self) -> DomainId {
        self.config.self_domain
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    // --- Private methods ---

    fn require_admin(&self, caller: &Address) -> Result<()> {
        if *caller != self.config.admin {
            warn!(caller = %caller, "Admin call rejected");
            return Err(SweepError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    /// Quote the notice against a payload padded to the longest reference
    /// and hold that fee from the reserve.
    async fn quote_notice(
        &self,
        operation_id: OperationId,
        batch: &BatchConversion,
    ) -> Result<Value> {
        let padded = Envelope::completion(
            self.config.self_domain,
            self.config.origin_domain,
            operation_id,
            batch.total,
            batch.instruction_count(),
            "0".repeat(MAX_BRIDGE_REFERENCE_LEN),
        )
        .encode();
        let fee = self.transport.quote(self.config.origin_domain, &padded).await?;
        self.reserve.hold(fee)?;
        Ok(fee)
    }

    async fn send_notice(&self, mut done: CompletedDispatch) -> Result<TransportReceipt> {
        let payload = Envelope::completion(
            self.config.self_domain,
            self.config.origin_domain,
            done.operation_id,
            done.value,
            done.instruction_count,
            done.bridge_reference.clone(),
        )
        .encode();

        // The fee was held when the dispatch was accepted.
        let fee = done.notice_fee;
        let receipt = match self
            .transport
            .send(self.config.origin_domain, payload, fee, self.config.worker_address)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.stats.notices_failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    operation_id = %done.operation_id,
                    error = %e,
                    "Completion notice not sent; value already bridged"
                );
                return Err(e);
            }
        };

        self.reserve.settle(fee, receipt.fee);
        self.stats.notices_sent.fetch_add(1, Ordering::Relaxed);
        info!(
            operation_id = %done.operation_id,
            message_id = %receipt.message_id,
            fee = %receipt.fee,
            reserve = %self.reserve.available(),
            "Completion notice sent"
        );

        done.notice = Some(receipt.clone());
        self.completed.insert(done.operation_id, done);
        Ok(receipt)
    }

    fn authenticate(&self, message: &InboundMessage, envelope: &Envelope) -> Result<()> {
        let authorized = message.source_domain == self.config.origin_domain
            && message.sender == self.config.origin_coordinator
            && envelope.source_domain == message.source_domain
            && envelope.destination_domain == self.config.self_domain;
        if !authorized {
            return Err(SweepError::UnauthorizedSource {
                domain: message.source_domain,
                sender: message.sender,
            });
        }
        Ok(())
    }

    fn failed(&self, operation_id: OperationId, err: SweepError) -> SweepError {
        self.stats.dispatches_failed.fetch_add(1, Ordering::Relaxed);
        error!(operation_id = %operation_id, error = %err, "Dispatch failed, nothing sent");
        err
    }

    fn rejected(&self, err: SweepError) -> SweepError {
        self.stats.messages_rejected.fetch_add(1, Ordering::Relaxed);
        warn!(error = %err, code = err.error_code(), "Inbound message rejected");
        err
    }
}

#[async_trait]
impl InboundHandler for RemoteWorker {
    #[instrument(
        skip(self, message),
        fields(message_id = %message.message_id, source = %message.source_domain)
    )]
    async fn handle_inbound(&self, message: InboundMessage) -> Result<InboundOutcome> {
        let _guard = self.processing.lock().await;

        let envelope = Envelope::decode(&message.payload).map_err(|e| self.rejected(e))?;
        self.authenticate(&message, &envelope)
            .map_err(|e| self.rejected(e))?;

        match envelope.message {
            ProtocolMessage::DispatchRequest {
                operation_id,
                instructions,
            } => self.on_dispatch_request(operation_id, instructions).await,
            ProtocolMessage::CompletionNotice { .. } => Err(self.rejected(SweepError::invalid(
                "worker does not accept completion notices",
            ))),
        }
    }
}

fn truncate(mut reference: String) -> String {
    if reference.len() > MAX_BRIDGE_REFERENCE_LEN {
        let mut cut = MAX_BRIDGE_REFERENCE_LEN;
        while !reference.is_char_boundary(cut) {
            cut -= 1;
        }
        reference.truncate(cut);
    }
    reference
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisweep_common::AssetId;
    use omnisweep_protocol::memory::{MemoryBridgeHub, MemoryNetwork, MemoryVault, StaticRateVenue};
    use omnisweep_protocol::{BridgeConfig, BridgeEndpoint, BridgeRouter};
    use rust_decimal::Decimal;

    const ORIGIN: DomainId = DomainId::new(1);
    const WORKER: DomainId = DomainId::new(2);
    const LEGACY: DomainId = DomainId::new(3);

    fn admin() -> Address {
        Address::from_label("admin")
    }

    fn coordinator() -> Address {
        Address::from_label("coordinator")
    }

    fn bridge_config() -> BridgeConfig {
        BridgeConfig::default()
            .with_domain(ORIGIN, BridgeFlavor::Generic, 1, 1)
            .with_domain(WORKER, BridgeFlavor::Generic, 2, 42161)
            .with_domain(LEGACY, BridgeFlavor::LegacyFixedPair, 3, 56)
    }

    struct Harness {
        worker: Arc<RemoteWorker>,
        network: Arc<MemoryNetwork>,
        hub: Arc<MemoryBridgeHub>,
        origin_vault: Arc<MemoryVault>,
        vault: Arc<MemoryVault>,
        venue: Arc<StaticRateVenue>,
    }

    impl Harness {
        fn new(domain: DomainId, reserve: u64) -> Self {
            let network = Arc::new(MemoryNetwork::new(Value::from_u64(1), Decimal::ZERO));
            let hub = Arc::new(MemoryBridgeHub::new());
            let origin_vault = Arc::new(MemoryVault::new(coordinator()));
            hub.register(1, 1, origin_vault.clone());

            let address = Address::from_label(&format!("worker-{}", domain.get()));
            let vault = Arc::new(MemoryVault::new(address));
            vault.deposit_asset(&AssetId::new("A1"), Decimal::from(1000));
            vault.deposit_asset(&AssetId::new("A2"), Decimal::from(1000));
            let venue = Arc::new(
                StaticRateVenue::new(vault.clone())
                    .with_rate("A1", Decimal::from(2))
                    .with_rate("A2", Decimal::ONE),
            );

            let config = WorkerConfig::new(domain, address, ORIGIN, coordinator())
                .with_fee_reserve(Value::from_u64(reserve))
                .with_bridge(bridge_config());
            let endpoint = match config.bridge.flavor_for(domain) {
                Some(BridgeFlavor::LegacyFixedPair) => {
                    BridgeEndpoint::Legacy(hub.legacy_endpoint(vault.clone()))
                }
                _ => BridgeEndpoint::Generic(hub.generic_endpoint(vault.clone())),
            };
            let bridge = BridgeRouter::new(domain, config.bridge.clone(), endpoint).unwrap();

            let worker = Arc::new(
                RemoteWorker::new(
                    config,
                    WorkerCollaborators {
                        transport: Arc::new(network.endpoint(domain, address)),
                        adapter: venue.clone(),
                        bridge: Arc::new(bridge),
                    },
                )
                .unwrap(),
            );
            network.register_handler(domain, &worker);

            Self {
                worker,
                network,
                hub,
                origin_vault,
                vault,
                venue,
            }
        }

        async fn dispatch_from(
            &self,
            sender: Address,
            operation_id: OperationId,
            instructions: Vec<DispatchInstruction>,
        ) -> Result<InboundOutcome> {
            let domain = self.worker.domain();
            // Notices bound for ORIGIN have no handler here; `notices()` reads `sent_to`.
            self.network.drop_to(ORIGIN);
            let payload = Envelope::dispatch(ORIGIN, domain, operation_id, instructions).encode();
            self.network
                .endpoint(ORIGIN, sender)
                .send(domain, payload, Value::from_u64(1), Address::ZERO)
                .await
                .unwrap();
            self.network.deliver_next().await.unwrap().outcome
        }

        async fn dispatch(
            &self,
            operation_id: OperationId,
            instructions: Vec<DispatchInstruction>,
        ) -> Result<InboundOutcome> {
            self.dispatch_from(coordinator(), operation_id, instructions).await
        }

        fn notices(&self) -> Vec<Envelope> {
            self.network
                .sent_to(ORIGIN)
                .iter()
                .map(|r| Envelope::decode(&r.payload).unwrap())
                .collect()
        }
    }

    fn batch() -> Vec<DispatchInstruction> {
        vec![
            DispatchInstruction::new("V1", "A1", Decimal::from(100)),
            DispatchInstruction::new("V2", "A2", Decimal::from(50)),
        ]
    }

    #[tokio::test]
    async fn test_dispatch_converts_bridges_and_notifies() {
        let h = Harness::new(WORKER, 5);
        let op = OperationId::new();

        assert_eq!(h.dispatch(op, batch()).await.unwrap(), InboundOutcome::Processed);

        assert_eq!(h.origin_vault.balance_of(&coordinator()), Value::from_u64(250));
        assert_eq!(h.vault.balance_of(&h.vault.owner()), Value::ZERO);

        let notices = h.notices();
        assert_eq!(notices.len(), 1);
        match &notices[0].message {
            ProtocolMessage::CompletionNotice {
                operation_id,
                amount,
                instruction_count,
                ..
            } => {
                assert_eq!(*operation_id, op);
                assert_eq!(*amount, Value::from_u64(250));
                assert_eq!(*instruction_count, 2);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(h.worker.fee_reserve(), Value::from_u64(4));
        assert!(h.worker.outstanding_notices().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_dispatch_is_not_reprocessed() {
        let h = Harness::new(WORKER, 5);
        let op = OperationId::new();

        h.dispatch(op, batch()).await.unwrap();
        assert_eq!(h.dispatch(op, batch()).await.unwrap(), InboundOutcome::Duplicate);

        assert_eq!(h.venue.conversion_count(), 2);
        assert_eq!(h.notices().len(), 1);
        assert_eq!(h.hub.transfers().len(), 1);
        assert_eq!(h.worker.stats().dispatches_duplicate, 1);
    }

    #[tokio::test]
    async fn test_dispatch_from_unauthorized_origin_is_dropped() {
        let h = Harness::new(WORKER, 5);

        let err = h
            .dispatch_from(Address::from_label("mallory"), OperationId::new(), batch())
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::UnauthorizedSource { .. }));

        // Right address, wrong domain.
        let payload = Envelope::dispatch(ORIGIN, WORKER, OperationId::new(), batch()).encode();
        h.network
            .endpoint(LEGACY, coordinator())
            .send(WORKER, payload, Value::from_u64(1), Address::ZERO)
            .await
            .unwrap();
        let delivery = h.network.deliver_next().await.unwrap();
        assert!(matches!(delivery.outcome, Err(SweepError::UnauthorizedSource { .. })));

        assert_eq!(h.venue.conversion_count(), 0);
        assert_eq!(h.worker.stats().messages_rejected, 2);
    }

    #[tokio::test]
    async fn test_empty_dispatch() {
        let h = Harness::new(WORKER, 5);
        assert!(matches!(
            h.dispatch(OperationId::new(), vec![]).await,
            Err(SweepError::NoInstructions)
        ));
    }

    #[tokio::test]
    async fn test_adapter_failure_sends_nothing_and_can_be_retried() {
        let h = Harness::new(WORKER, 5);
        let op = OperationId::new();
        h.venue.fail_asset("A2");

        let err = h.dispatch(op, batch()).await.unwrap_err();
        assert!(matches!(err, SweepError::AdapterFailure { .. }));
        assert!(h.notices().is_empty());
        assert!(h.hub.transfers().is_empty());
        assert_eq!(h.vault.asset_balance(&AssetId::new("A1")), Decimal::from(1000));
        assert!(h.worker.completed_dispatch(&op).is_none());

        h.venue.heal_asset("A2");
        assert_eq!(h.dispatch(op, batch()).await.unwrap(), InboundOutcome::Processed);
        assert_eq!(h.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_unfunded_reserve_blocks_bridging() {
        let h = Harness::new(WORKER, 0);
        let op = OperationId::new();

        let err = h.dispatch(op, batch()).await.unwrap_err();
        assert!(matches!(err, SweepError::InsufficientFee { .. }));
        assert!(h.hub.transfers().is_empty());
        assert_eq!(h.venue.unwound_count(), 2);
        assert_eq!(h.vault.balance_of(&h.vault.owner()), Value::ZERO);

        assert!(matches!(
            h.worker.fund_fee_reserve(coordinator(), Value::from_u64(3)),
            Err(SweepError::Unauthorized { .. })
        ));
        h.worker.fund_fee_reserve(admin(), Value::from_u64(3)).unwrap();
        assert_eq!(h.dispatch(op, batch()).await.unwrap(), InboundOutcome::Processed);
        assert_eq!(h.worker.fee_reserve(), Value::from_u64(2));
    }

    #[tokio::test]
    async fn test_failed_notice_is_resent_on_redelivery() {
        let h = Harness::new(WORKER, 5);
        let op = OperationId::new();
        h.network.fail_sends_to(ORIGIN, true);

        let err = h.dispatch(op, batch()).await.unwrap_err();
        assert!(matches!(err, SweepError::TransportFailure(_)));
        assert_eq!(h.origin_vault.balance_of(&coordinator()), Value::from_u64(250));
        assert_eq!(h.worker.outstanding_notices(), vec![op]);

        h.network.fail_sends_to(ORIGIN, false);
        assert_eq!(h.dispatch(op, batch()).await.unwrap(), InboundOutcome::Processed);
        assert_eq!(h.notices().len(), 1);
        assert_eq!(h.hub.transfers().len(), 1);
        assert_eq!(h.dispatch(op, batch()).await.unwrap(), InboundOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_outstanding_notice_keeps_its_fee() {
        let h = Harness::new(WORKER, 1);
        let first = OperationId::new();
        let second = OperationId::new();

        h.network.fail_sends_to(ORIGIN, true);
        let err = h.dispatch(first, batch()).await.unwrap_err();
        assert!(matches!(err, SweepError::TransportFailure(_)));
        assert_eq!(h.worker.fee_reserve(), Value::ZERO);
        assert_eq!(h.worker.held_notice_fees(), Value::from_u64(1));
        h.network.fail_sends_to(ORIGIN, false);

        // The only fee in the reserve belongs to the first notice.
        let err = h.dispatch(second, batch()).await.unwrap_err();
        assert!(matches!(err, SweepError::InsufficientFee { .. }));
        assert_eq!(h.hub.transfers().len(), 1);
        assert_eq!(h.venue.unwound_count(), 2);
        assert!(h.worker.completed_dispatch(&second).is_none());

        h.worker.resend_notice(admin(), first).await.unwrap();
        assert_eq!(h.notices().len(), 1);
        assert_eq!(h.worker.held_notice_fees(), Value::ZERO);
        assert!(h.worker.outstanding_notices().is_empty());

        h.worker.fund_fee_reserve(admin(), Value::from_u64(1)).unwrap();
        assert_eq!(h.dispatch(second, batch()).await.unwrap(), InboundOutcome::Processed);
        assert_eq!(h.worker.fee_reserve(), Value::ZERO);
        assert_eq!(h.origin_vault.balance_of(&coordinator()), Value::from_u64(500));
    }

    #[tokio::test]
    async fn test_bridge_failure_releases_held_fee() {
        let h = Harness::new(WORKER, 1);
        h.hub.set_failing(true);

        assert!(h.dispatch(OperationId::new(), batch()).await.is_err());
        assert_eq!(h.worker.fee_reserve(), Value::from_u64(1));
        assert_eq!(h.worker.held_notice_fees(), Value::ZERO);
    }

    #[tokio::test]
    async fn test_resend_notice_is_admin_only() {
        let h = Harness::new(WORKER, 5);
        let op = OperationId::new();
        h.network.fail_sends_to(ORIGIN, true);
        assert!(h.dispatch(op, batch()).await.is_err());
        h.network.fail_sends_to(ORIGIN, false);

        assert!(h.worker.resend_notice(coordinator(), op).await.is_err());
        let receipt = h.worker.resend_notice(admin(), op).await.unwrap();
        assert_eq!(h.network.sent_to(ORIGIN)[0].message_id, receipt.message_id);
        assert!(matches!(
            h.worker.resend_notice(admin(), OperationId::new()).await,
            Err(SweepError::OperationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_domain_bridges_with_fixed_pair_shape() {
        let h = Harness::new(LEGACY, 5);
        assert_eq!(h.worker.bridge_flavor(), Some(BridgeFlavor::LegacyFixedPair));

        h.dispatch(OperationId::new(), batch()).await.unwrap();
        let transfer = &h.hub.transfers()[0];
        assert_eq!(transfer.flavor, BridgeFlavor::LegacyFixedPair);
        assert_eq!(transfer.numeric_destination, 1);
        assert_eq!(transfer.recipient_bytes, coordinator().as_bytes().to_vec());
        assert_eq!(h.origin_vault.balance_of(&coordinator()), Value::from_u64(250));
    }

    #[test]
    fn test_truncate_reference() {
        assert_eq!(truncate("abc".to_string()), "abc");
        assert_eq!(truncate("x".repeat(100)).len(), MAX_BRIDGE_REFERENCE_LEN);
    }
}
