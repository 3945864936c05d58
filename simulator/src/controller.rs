//! Simulation controller.
//!
//! Wires one origin coordinator and a set of remote workers over the
//! in-memory network and bridge, then drives scenarios through the full
//! dispatch / convert / bridge / notice round trip.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use omnisweep_common::{
    Address, AssetId, CountingMode, DispatchInstruction, DomainId, ManualClock, OperationId,
    OperationStatus, SweepOperation, Value,
};
use omnisweep_coordinator::{
    Collaborators, CoordinatorConfig, OperationReceipt, SweepCoordinator, SweepRequest,
};
use omnisweep_protocol::memory::{
    MemoryBridgeHub, MemoryNetwork, MemoryVault, RecordingPrivacyHook, StaticRateVenue,
};
use omnisweep_protocol::{
    BridgeConfig, BridgeEndpoint, BridgeFlavor, BridgeRouter, Envelope, MessageKind,
};
use omnisweep_worker::{RemoteWorker, WorkerCollaborators, WorkerConfig};

use crate::metrics::SimulationMetrics;
use crate::scenario::{Scenario, ScenarioReport};

/// Domain the coordinator runs on.
pub const ORIGIN: DomainId = DomainId::new(1);

/// Upper bound on deliveries in one pump, against runaway duplication.
const MAX_DELIVERIES: u64 = 100_000;

/// Asset inventory seeded into every vault.
const INVENTORY: u64 = 1_000_000_000;

/// Knobs for one simulated deployment.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Number of remote domains.
    pub remotes: usize,
    pub seed: Option<u64>,
    /// Probability that a message gets one extra delivery.
    pub duplicate_rate: f64,
    pub counting_mode: CountingMode,
    /// Asset amount each listed domain sweeps.
    pub amount: u64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            remotes: 2,
            seed: None,
            duplicate_rate: 0.0,
            counting_mode: CountingMode::Idempotent,
            amount: 500,
        }
    }
}

struct WorkerNode {
    worker: Arc<RemoteWorker>,
    vault: Arc<MemoryVault>,
    venue: Arc<StaticRateVenue>,
}

/// Controls the simulation.
pub struct SimulationController {
    options: SimulationOptions,
    rng: RwLock<StdRng>,
    network: Arc<MemoryNetwork>,
    hub: Arc<MemoryBridgeHub>,
    clock: ManualClock,
    coordinator: Arc<SweepCoordinator>,
    origin_vault: Arc<MemoryVault>,
    privacy: Arc<RecordingPrivacyHook>,
    workers: BTreeMap<DomainId, WorkerNode>,
    metrics: RwLock<SimulationMetrics>,
}

impl SimulationController {
    /// Build the deployment.
    pub fn new(options: SimulationOptions) -> anyhow::Result<Self> {
        if options.remotes == 0 {
            anyhow::bail!("at least one remote domain is required");
        }
        if !(0.0..=1.0).contains(&options.duplicate_rate) {
            anyhow::bail!("duplicate rate must be within [0, 1]");
        }
        if options.amount == 0 {
            anyhow::bail!("sweep amount must be positive");
        }

        let rng = match options.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let remote_domains: Vec<DomainId> = (0..options.remotes)
            .map(|i| DomainId::new(i as u32 + 2))
            .collect();
        let bridge = bridge_table(&remote_domains);

        let network = Arc::new(MemoryNetwork::new(Value::from_u64(1), Decimal::new(1, 3)));
        let hub = Arc::new(MemoryBridgeHub::new());
        let clock = ManualClock::default();

        // Origin side.
        let mut config = CoordinatorConfig {
            counting_mode: options.counting_mode,
            bridge: bridge.clone(),
            ..CoordinatorConfig::default()
        };
        for domain in &remote_domains {
            config = config.with_remote(*domain, worker_address(*domain));
        }

        let origin_vault = Arc::new(MemoryVault::new(config.coordinator_address));
        origin_vault.deposit_asset(&asset_for(ORIGIN), Decimal::from(INVENTORY));
        hub.register(1, legacy_chain_id(ORIGIN), origin_vault.clone());
        let origin_venue = Arc::new(
            StaticRateVenue::new(origin_vault.clone()).with_rate(asset_for(ORIGIN), Decimal::ONE),
        );
        let privacy = Arc::new(RecordingPrivacyHook::new(origin_vault.clone()));
        let origin_bridge = BridgeRouter::new(
            ORIGIN,
            bridge.clone(),
            endpoint_for(&hub, &bridge, ORIGIN, origin_vault.clone()),
        )?;

        let coordinator = Arc::new(
            SweepCoordinator::new(
                config.clone(),
                Collaborators {
                    transport: Arc::new(network.endpoint(ORIGIN, config.coordinator_address)),
                    adapter: origin_venue,
                    bridge: Arc::new(origin_bridge),
                    custody: origin_vault.clone(),
                    privacy: privacy.clone(),
                    clock: Arc::new(clock.clone()),
                },
            )
            .context("coordinator rejected its configuration")?,
        );
        network.register_handler(ORIGIN, &coordinator);

        // Remote side.
        let mut workers = BTreeMap::new();
        for domain in remote_domains {
            let address = worker_address(domain);
            let vault = Arc::new(MemoryVault::new(address));
            vault.deposit_asset(&asset_for(domain), Decimal::from(INVENTORY));
            hub.register(domain.get(), legacy_chain_id(domain), vault.clone());

            let venue = Arc::new(
                StaticRateVenue::new(vault.clone()).with_rate(asset_for(domain), Decimal::ONE),
            );
            let worker_config =
                WorkerConfig::new(domain, address, ORIGIN, config.coordinator_address)
                    .with_fee_reserve(Value::from_u64(100))
                    .with_bridge(bridge.clone());
            let router = BridgeRouter::new(
                domain,
                bridge.clone(),
                endpoint_for(&hub, &bridge, domain, vault.clone()),
            )?;

            let worker = Arc::new(
                RemoteWorker::new(
                    worker_config,
                    WorkerCollaborators {
                        transport: Arc::new(network.endpoint(domain, address)),
                        adapter: venue.clone(),
                        bridge: Arc::new(router),
                    },
                )
                .with_context(|| {
                    format!("worker for domain {} rejected its configuration", domain)
                })?,
            );
            network.register_handler(domain, &worker);

            workers.insert(domain, WorkerNode { worker, vault, venue });
        }

        info!(
            remotes = workers.len(),
            counting_mode = ?options.counting_mode,
            duplicate_rate = options.duplicate_rate,
            "Simulation deployment ready"
        );

        Ok(Self {
            options,
            rng: RwLock::new(rng),
            network,
            hub,
            clock,
            coordinator,
            origin_vault,
            privacy,
            workers,
            metrics: RwLock::new(SimulationMetrics::new()),
        })
    }

    /// Run one scenario to completion.
    pub async fn run_scenario(&self, scenario: Scenario) -> anyhow::Result<ScenarioReport> {
        info!(scenario = %scenario, "Running scenario: {}", scenario.description());

        let receiver_before = self.receiver_balance();
        let shielded_before = self.shielded_value();
        let finalized_before = self.coordinator.metrics().snapshot().operations_finalized;

        let include_remotes = scenario != Scenario::LocalOnly;
        let request = self
            .sweep_request(include_remotes)
            .with_privacy(scenario == Scenario::Privacy);
        let expected_value = Value::from_u64(self.options.amount * request.domains.len() as u64);

        let receipt = self.start(request).await?;
        let mut notes = Vec::new();

        let deliveries = match scenario {
            Scenario::LocalOnly | Scenario::Mixed | Scenario::Privacy => {
                self.pump(self.options.duplicate_rate).await?
            }
            Scenario::DuplicateDelivery => self.pump(1.0).await?,
            Scenario::StalledDomain => self.run_stalled(&receipt, &mut notes).await?,
            Scenario::AdapterFailure => self.run_adapter_failure(&receipt, &mut notes).await?,
        };

        let operation = self.coordinator.operation(receipt.operation_id)?;
        let finalize_count =
            self.coordinator.metrics().snapshot().operations_finalized - finalized_before;
        if operation.is_ready() && operation.reported.len() < operation.expected.len() {
            notes.push(format!(
                "counter reached {} with only {:?} reported",
                operation.completed_domains, operation.reported
            ));
        }

        let report = ScenarioReport {
            scenario,
            operation_id: receipt.operation_id.to_string(),
            status: operation.status,
            total_domains: operation.total_domains,
            completed_domains: operation.completed_domains,
            completed_at_start: receipt.completed_domains,
            expected_value,
            delivered_value: self.receiver_balance().saturating_sub(receiver_before),
            shielded_value: self.shielded_value().saturating_sub(shielded_before),
            dispatches: receipt.dispatches.len(),
            notices: self.notices_for(receipt.operation_id),
            finalize_count,
            deliveries,
            notes,
        };

        self.metrics
            .write()
            .await
            .record_operation(report.status, report.deliveries);

        info!(
            scenario = %scenario,
            status = ?report.status,
            completed = report.completed_domains,
            total = report.total_domains,
            delivered = %report.delivered_value,
            expected = %report.expected_value,
            "Scenario complete"
        );
        Ok(report)
    }

    /// A request listing the origin's own domain and, optionally, every
    /// remote, each with one instruction of the configured amount.
    pub fn sweep_request(&self, include_remotes: bool) -> SweepRequest {
        let mut request =
            SweepRequest::default().with_domain(ORIGIN, vec![self.instruction_for(ORIGIN)]);
        if include_remotes {
            for domain in self.workers.keys() {
                request = request.with_domain(*domain, vec![self.instruction_for(*domain)]);
            }
        }
        request
    }

    /// Start an operation, attaching enough to cover every dispatch fee.
    pub async fn start(&self, request: SweepRequest) -> anyhow::Result<OperationReceipt> {
        let budget = Value::from_u64(10 * (request.domains.len() as u64 + 1));
        let receipt = self.coordinator.start_operation(request, budget).await?;
        info!(
            operation_id = %receipt.operation_id,
            completed = receipt.completed_domains,
            total = receipt.total_domains,
            dispatches = receipt.dispatches.len(),
            refund = %receipt.refund,
            "Operation started"
        );
        if let Some(reason) = &receipt.finalize_error {
            warn!(
                operation_id = %receipt.operation_id,
                reason = %reason,
                "Inline finalize failed, operation left open"
            );
        }
        Ok(receipt)
    }

    /// Deliver until the network is quiet, shuffling the queue before every
    /// delivery and giving each message at most one extra copy with
    /// probability `duplicate_rate`. Returns the number of deliveries.
    pub async fn pump(&self, duplicate_rate: f64) -> anyhow::Result<u64> {
        let mut duplicated = HashSet::new();
        let mut delivered = 0u64;

        while self.network.pending_count() > 0 {
            if delivered >= MAX_DELIVERIES {
                anyhow::bail!("network did not settle after {} deliveries", delivered);
            }

            {
                let mut rng = self.rng.write().await;
                self.network.shuffle(&mut *rng);
                if let Some(next) = self.network.pending().first() {
                    let id = next.message.message_id;
                    if !duplicated.contains(&id) && rng.gen_bool(duplicate_rate) {
                        duplicated.insert(id);
                        self.network.duplicate(&id);
                        self.metrics.write().await.record_duplicate_injected();
                    }
                }
            }

            if let Some(delivery) = self.network.deliver_next().await {
                delivered += 1;
                if let Err(e) = &delivery.outcome {
                    warn!(
                        destination = %delivery.destination,
                        message_id = %delivery.message_id,
                        error = %e,
                        "Delivery failed"
                    );
                }
                self.metrics.write().await.record_delivery(&delivery.outcome);
            }
        }
        Ok(delivered)
    }

    /// Lose the dispatch to the last remote, then settle what arrived once
    /// the deadline passes.
    async fn run_stalled(
        &self,
        receipt: &OperationReceipt,
        notes: &mut Vec<String>,
    ) -> anyhow::Result<u64> {
        let stalled = self.last_remote()?;
        let dropped = self.network.drop_to(stalled);
        notes.push(format!("dropped {} message(s) to domain {}", dropped, stalled));

        let delivered = self.pump(self.options.duplicate_rate).await?;

        let admin = self.coordinator.config().admin;
        if self
            .coordinator
            .settle_partial(admin, receipt.operation_id)
            .await
            .is_ok()
        {
            anyhow::bail!("partial settle succeeded before the deadline");
        }

        let deadline = chrono::Duration::from_std(self.coordinator.config().operation_deadline)
            .context("operation deadline out of range")?;
        self.clock.advance(deadline + chrono::Duration::seconds(1));
        let expired = self.coordinator.scan_deadlines();
        notes.push(format!("{} operation(s) past deadline", expired.len()));

        let (operation, disbursement) = self
            .coordinator
            .settle_partial(admin, receipt.operation_id)
            .await?;
        notes.push(format!(
            "settled {} with {:?} missing",
            disbursement.amount(),
            operation.pending_domains()
        ));
        Ok(delivered)
    }

    /// Fail the last remote's venue, then heal it and redeliver its dispatch.
    async fn run_adapter_failure(
        &self,
        receipt: &OperationReceipt,
        notes: &mut Vec<String>,
    ) -> anyhow::Result<u64> {
        let failing = self.last_remote()?;
        let node = self.node(failing)?;
        node.venue.fail_asset(asset_for(failing));

        let mut delivered = self.pump(self.options.duplicate_rate).await?;
        let stuck = self.coordinator.operation(receipt.operation_id)?;
        notes.push(format!(
            "after venue failure on domain {}: {}/{} completed, worker holds {}",
            failing,
            stuck.completed_domains,
            stuck.total_domains,
            node.vault.balance_of(&node.vault.owner())
        ));

        node.venue.heal_asset(asset_for(failing));
        let dispatch = self
            .network
            .sent_to(failing)
            .into_iter()
            .rev()
            .find(|r| {
                Envelope::decode(&r.payload)
                    .map(|e| e.operation_id() == receipt.operation_id)
                    .unwrap_or(false)
            })
            .context("no dispatch was sent to the failing domain")?;
        self.network.redeliver(&dispatch);
        notes.push(format!("venue healed, dispatch to domain {} redelivered", failing));

        delivered += self.pump(self.options.duplicate_rate).await?;
        Ok(delivered)
    }

    // --- Accessors ---

    pub fn coordinator(&self) -> &Arc<SweepCoordinator> {
        &self.coordinator
    }

    #[allow(dead_code)]
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    #[allow(dead_code)]
    pub fn hub(&self) -> &Arc<MemoryBridgeHub> {
        &self.hub
    }

    pub fn worker(&self, domain: DomainId) -> Option<&Arc<RemoteWorker>> {
        self.workers.get(&domain).map(|n| &n.worker)
    }

    #[allow(dead_code)]
    pub fn worker_vault(&self, domain: DomainId) -> Option<&Arc<MemoryVault>> {
        self.workers.get(&domain).map(|n| &n.vault)
    }

    #[allow(dead_code)]
    pub fn venue(&self, domain: DomainId) -> Option<&Arc<StaticRateVenue>> {
        self.workers.get(&domain).map(|n| &n.venue)
    }

    pub fn remote_domains(&self) -> Vec<DomainId> {
        self.workers.keys().copied().collect()
    }

    #[allow(dead_code)]
    pub fn operation(&self, operation_id: OperationId) -> anyhow::Result<SweepOperation> {
        Ok(self.coordinator.operation(operation_id)?)
    }

    /// Balance held by the final receiver on the origin domain.
    pub fn receiver_balance(&self) -> Value {
        let (receiver, _) = self.coordinator.final_receiver();
        self.origin_vault.balance_of(&receiver)
    }

    pub fn shielded_value(&self) -> Value {
        self.privacy.shielded().into_iter().map(|(_, v)| v).sum()
    }

    /// Completion notices sent for `operation_id`.
    pub fn notices_for(&self, operation_id: OperationId) -> usize {
        self.network
            .sent_to(ORIGIN)
            .iter()
            .filter_map(|r| Envelope::decode(&r.payload).ok())
            .filter(|e| {
                e.kind() == MessageKind::CompletionNotice && e.operation_id() == operation_id
            })
            .count()
    }

    pub async fn metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }

    // --- Private methods ---

    fn instruction_for(&self, domain: DomainId) -> DispatchInstruction {
        DispatchInstruction::new(
            format!("V{}", domain.get()).as_str(),
            asset_for(domain),
            Decimal::from(self.options.amount),
        )
    }

    fn node(&self, domain: DomainId) -> anyhow::Result<&WorkerNode> {
        self.workers
            .get(&domain)
            .with_context(|| format!("no worker on domain {}", domain))
    }

    fn last_remote(&self) -> anyhow::Result<DomainId> {
        self.workers
            .keys()
            .next_back()
            .copied()
            .context("no remote domains")
    }
}

/// Remotes on odd domains expose the legacy fixed-pair call shape, the rest
/// the generic one.
fn bridge_table(remotes: &[DomainId]) -> BridgeConfig {
    let mut table = BridgeConfig::default().with_domain(
        ORIGIN,
        BridgeFlavor::Generic,
        ORIGIN.get(),
        legacy_chain_id(ORIGIN),
    );
    for domain in remotes {
        let flavor = if domain.get() % 2 == 1 {
            BridgeFlavor::LegacyFixedPair
        } else {
            BridgeFlavor::Generic
        };
        table = table.with_domain(*domain, flavor, domain.get(), legacy_chain_id(*domain));
    }
    table
}

fn endpoint_for(
    hub: &Arc<MemoryBridgeHub>,
    table: &BridgeConfig,
    domain: DomainId,
    vault: Arc<MemoryVault>,
) -> BridgeEndpoint {
    match table.flavor_for(domain) {
        Some(BridgeFlavor::LegacyFixedPair) => BridgeEndpoint::Legacy(hub.legacy_endpoint(vault)),
        _ => BridgeEndpoint::Generic(hub.generic_endpoint(vault)),
    }
}

fn legacy_chain_id(domain: DomainId) -> u64 {
    1000 + domain.get() as u64
}

fn worker_address(domain: DomainId) -> Address {
    Address::from_label(&format!("worker-{}", domain.get()))
}

fn asset_for(domain: DomainId) -> AssetId {
    AssetId::new(format!("A{}", domain.get()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisweep_coordinator::Disbursement;

    fn controller(remotes: usize, mode: CountingMode) -> SimulationController {
        SimulationController::new(SimulationOptions {
            remotes,
            seed: Some(7),
            counting_mode: mode,
            ..SimulationOptions::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_concrete_self_plus_remote_sweep() {
        let sim = controller(1, CountingMode::Idempotent);
        let remote = DomainId::new(2);
        let request = SweepRequest::default()
            .with_domain(ORIGIN, vec![DispatchInstruction::new("V1", "A1", Decimal::from(500))])
            .with_domain(remote, vec![DispatchInstruction::new("V2", "A2", Decimal::from(500))]);

        let receipt = sim.start(request).await.unwrap();
        assert_eq!(receipt.dispatches.len(), 1);
        assert_eq!(receipt.dispatches[0].domain, remote);
        assert_eq!(receipt.completed_domains, 1);
        assert_eq!(receipt.total_domains, 2);
        assert_eq!(sim.network().sent_to(remote).len(), 1);

        sim.pump(0.0).await.unwrap();

        let operation = sim.operation(receipt.operation_id).unwrap();
        assert_eq!(operation.completed_domains, 2);
        assert_eq!(operation.status, OperationStatus::Finalized);
        assert_eq!(sim.notices_for(receipt.operation_id), 1);
        assert_eq!(sim.receiver_balance(), Value::from_u64(1000));
        assert_eq!(sim.coordinator().metrics().snapshot().operations_finalized, 1);
    }

    #[tokio::test]
    async fn test_local_only_finalizes_inside_start() {
        let sim = controller(2, CountingMode::Idempotent);
        let receipt = sim.start(sim.sweep_request(false)).await.unwrap();

        assert_eq!(receipt.completed_domains, receipt.total_domains);
        assert!(receipt.dispatches.is_empty());
        assert!(matches!(receipt.disbursement, Some(Disbursement::Transferred { .. })));
        assert!(sim.network().sent().is_empty());
        assert_eq!(sim.receiver_balance(), Value::from_u64(500));
    }

    #[tokio::test]
    async fn test_mixed_sweep_over_both_bridge_shapes() {
        let sim = controller(3, CountingMode::Idempotent);
        let report = sim.run_scenario(Scenario::Mixed).await.unwrap();

        assert!(report.fully_settled());
        assert_eq!(report.dispatches, 3);
        assert_eq!(report.notices, 3);
        assert_eq!(report.finalize_count, 1);
        assert_eq!(report.completed_at_start, 1);

        let flavors: HashSet<BridgeFlavor> =
            sim.hub().transfers().iter().map(|t| t.flavor).collect();
        assert!(flavors.contains(&BridgeFlavor::Generic));
        assert!(flavors.contains(&BridgeFlavor::LegacyFixedPair));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_harmless_when_idempotent() {
        let sim = controller(3, CountingMode::Idempotent);
        let report = sim.run_scenario(Scenario::DuplicateDelivery).await.unwrap();

        assert!(report.fully_settled());
        assert_eq!(report.finalize_count, 1);
        assert_eq!(report.notices, 3);
        assert_eq!(report.completed_domains, report.total_domains);

        for domain in sim.remote_domains() {
            assert_eq!(sim.worker(domain).unwrap().stats().dispatches_completed, 1);
        }
        let metrics = sim.metrics().await;
        assert!(metrics.duplicates_injected > 0);
        assert!(metrics.deliveries_duplicate > 0);
    }

    #[tokio::test]
    async fn test_duplicate_notice_finalizes_early_under_legacy_counting() {
        let sim = controller(2, CountingMode::Legacy);
        let receipt = sim.start(sim.sweep_request(true)).await.unwrap();

        // Both dispatches, then both notices queue up.
        sim.network().deliver_next().await.unwrap().outcome.unwrap();
        sim.network().deliver_next().await.unwrap().outcome.unwrap();
        let notices = sim.network().pending();
        assert_eq!(notices.len(), 2);

        // First notice arrives twice before the second one.
        sim.network().drop_to(ORIGIN);
        sim.network().inject(ORIGIN, notices[0].message.clone());
        sim.network().inject(ORIGIN, notices[0].message.clone());
        sim.network().deliver_next().await.unwrap().outcome.unwrap();

        // The replay completes the count while domain 3 is still unreported.
        sim.network().deliver_next().await.unwrap().outcome.unwrap();

        let operation = sim.operation(receipt.operation_id).unwrap();
        assert_eq!(operation.status, OperationStatus::Finalized);
        assert_eq!(operation.completed_domains, operation.total_domains);
        assert!(operation.reported.len() < operation.expected.len());
        assert_eq!(sim.receiver_balance(), Value::from_u64(1500));

        // The genuine second notice is refused.
        sim.network().inject(ORIGIN, notices[1].message.clone());
        assert!(sim.network().deliver_next().await.unwrap().outcome.is_err());
        let operation = sim.operation(receipt.operation_id).unwrap();
        assert_eq!(operation.completed_domains, operation.total_domains);
        assert_eq!(sim.coordinator().metrics().snapshot().operations_finalized, 1);
    }

    #[tokio::test]
    async fn test_duplicate_notice_counted_once_when_idempotent() {
        let sim = controller(2, CountingMode::Idempotent);
        let receipt = sim.start(sim.sweep_request(true)).await.unwrap();

        sim.network().deliver_next().await.unwrap().outcome.unwrap();
        sim.network().deliver_next().await.unwrap().outcome.unwrap();
        let notices = sim.network().pending();
        sim.network().duplicate(&notices[0].message.message_id);
        sim.network().deliver_next().await.unwrap().outcome.unwrap();
        sim.network().drop_to(ORIGIN);
        sim.network().inject(ORIGIN, notices[0].message.clone());
        let replay = sim.network().deliver_next().await.unwrap();
        assert!(matches!(replay.outcome, Ok(omnisweep_protocol::InboundOutcome::Duplicate)));

        let operation = sim.operation(receipt.operation_id).unwrap();
        assert_eq!(operation.status, OperationStatus::AwaitingCompletions);
        assert_eq!(operation.completed_domains, 2);

        sim.network().inject(ORIGIN, notices[1].message.clone());
        sim.pump(0.0).await.unwrap();
        let operation = sim.operation(receipt.operation_id).unwrap();
        assert_eq!(operation.status, OperationStatus::Finalized);
        assert_eq!(sim.receiver_balance(), Value::from_u64(1500));
    }

    #[tokio::test]
    async fn test_unauthorized_notice_leaves_counter_unchanged() {
        let sim = controller(1, CountingMode::Idempotent);
        let receipt = sim.start(sim.sweep_request(true)).await.unwrap();

        let forged = Envelope::completion(
            DomainId::new(9),
            ORIGIN,
            receipt.operation_id,
            Value::from_u64(500),
            1,
            "forged",
        )
        .encode();
        let outsider = sim.network().endpoint(DomainId::new(9), Address::from_label("mallory"));
        use omnisweep_protocol::MessageTransport;
        outsider
            .send(ORIGIN, forged, Value::from_u64(10), Address::ZERO)
            .await
            .unwrap();
        sim.network().drop_to(DomainId::new(2));

        let delivery = sim.network().deliver_next().await.unwrap();
        assert!(delivery.outcome.is_err());
        assert_eq!(
            sim.coordinator().completed_domains(receipt.operation_id).unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_stalled_domain_settles_partially_after_deadline() {
        let sim = controller(2, CountingMode::Idempotent);
        let report = sim.run_scenario(Scenario::StalledDomain).await.unwrap();

        assert_eq!(report.status, OperationStatus::PartiallySettled);
        assert_eq!(report.completed_domains, 2);
        assert_eq!(report.total_domains, 3);
        assert_eq!(report.delivered_value, Value::from_u64(1000));
        assert_eq!(report.finalize_count, 0);
        assert!(!report.fully_settled());
    }

    #[tokio::test]
    async fn test_adapter_failure_emits_no_notice_until_recovered() {
        let sim = controller(2, CountingMode::Idempotent);
        let failing = DomainId::new(3);
        sim.venue(failing).unwrap().fail_asset("A3");

        let receipt = sim.start(sim.sweep_request(true)).await.unwrap();
        sim.pump(0.0).await.unwrap();

        assert_eq!(sim.notices_for(receipt.operation_id), 1);
        let vault = sim.worker_vault(failing).unwrap();
        assert_eq!(vault.balance_of(&vault.owner()), Value::ZERO);
        assert_eq!(vault.asset_balance(&AssetId::new("A3")), Decimal::from(INVENTORY));
        assert!(sim.hub().transfers().iter().all(|t| {
            t.numeric_destination == 1 || t.numeric_destination == legacy_chain_id(ORIGIN)
        }));
        assert_eq!(sim.hub().transfers().len(), 1);
        assert_eq!(
            sim.operation(receipt.operation_id).unwrap().status,
            OperationStatus::AwaitingCompletions
        );
    }

    #[tokio::test]
    async fn test_adapter_failure_scenario_recovers() {
        let sim = controller(2, CountingMode::Idempotent);
        let report = sim.run_scenario(Scenario::AdapterFailure).await.unwrap();
        assert!(report.fully_settled());
        assert_eq!(report.notices, 2);
        assert_eq!(report.finalize_count, 1);
    }

    #[tokio::test]
    async fn test_privacy_scenario_shields_everything() {
        let sim = controller(2, CountingMode::Idempotent);
        let report = sim.run_scenario(Scenario::Privacy).await.unwrap();

        assert!(report.fully_settled());
        assert_eq!(report.shielded_value, report.expected_value);
        assert_eq!(report.delivered_value, Value::ZERO);
    }

    #[tokio::test]
    async fn test_every_scenario_runs_on_one_deployment() {
        let sim = SimulationController::new(SimulationOptions {
            remotes: 3,
            seed: Some(42),
            duplicate_rate: 0.3,
            ..SimulationOptions::default()
        })
        .unwrap();

        for scenario in Scenario::all() {
            let report = sim.run_scenario(scenario).await.unwrap();
            assert!(report.completed_domains <= report.total_domains);
            assert!(report.finalize_count <= 1);
        }
        let metrics = sim.metrics().await;
        assert_eq!(metrics.operations_run, 6);
        assert_eq!(metrics.operations_partially_settled, 1);
        assert_eq!(metrics.operations_finalized, 5);
    }

    #[test]
    fn test_invalid_options() {
        assert!(SimulationController::new(SimulationOptions {
            remotes: 0,
            ..SimulationOptions::default()
        })
        .is_err());
        assert!(SimulationController::new(SimulationOptions {
            duplicate_rate: 1.5,
            ..SimulationOptions::default()
        })
        .is_err());
    }
}
