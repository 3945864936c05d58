//! Origin coordinator: starts sweep operations, counts completions, and
//! finalizes.
//!
//! Every externally triggered call runs to completion under one processing
//! lock, mirroring the run-to-completion execution model the protocol
//! assumes. Operation records are edited as clones and committed to the
//! [`OperationBook`] only once the call has succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use omnisweep_common::{
    Address, Clock, CompletionOutcome, CountingMode, DispatchInstruction, DomainId, MessageId,
    OperationId, OperationStatus, Result, SweepError, SweepOperation, Timestamp, Value,
};
use omnisweep_protocol::{
    convert_batch, unwind_batch, BridgeConfig, ConversionAdapter, Custody, Envelope,
    InboundHandler, InboundMessage, InboundOutcome, MessageTransport, PrivacyHook,
    ProtocolMessage, ValueBridge,
};

use crate::book::OperationBook;
use crate::config::CoordinatorConfig;
use crate::metrics::{Metrics, SharedMetrics};
use crate::remotes::RemoteRegistry;
use crate::settler::{Disbursement, Settler};
use crate::state::CoordinatorState;

/// Request to start a sweep operation.
///
/// `domains[i]` is swept with `instructions[i]`. The coordinator's own
/// domain may appear in the list; [`DomainId::LOCAL`] is accepted as an
/// alias for it.
#[derive(Debug, Clone, Default)]
pub struct SweepRequest {
    /// Domains to sweep, each listed once.
    pub domains: Vec<DomainId>,
    /// Conversion instructions, parallel to `domains`.
    pub instructions: Vec<Vec<DispatchInstruction>>,
    /// Route the final balance through the privacy hook.
    pub privacy: bool,
}

impl SweepRequest {
    pub fn new(
        domains: Vec<DomainId>,
        instructions: Vec<Vec<DispatchInstruction>>,
        privacy: bool,
    ) -> Self {
        Self {
            domains,
            instructions,
            privacy,
        }
    }

    /// Append a domain and its instructions.
    pub fn with_domain(mut self, domain: DomainId, instructions: Vec<DispatchInstruction>) -> Self {
        self.domains.push(domain);
        self.instructions.push(instructions);
        self
    }

    pub fn with_privacy(mut self, privacy: bool) -> Self {
        self.privacy = privacy;
        self
    }
}

/// One dispatch request that left the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Destination domain.
    pub domain: DomainId,
    /// Transport message ID.
    pub message_id: MessageId,
    /// Fee the transport charged.
    pub fee: Value,
}

/// Returned by [`SweepCoordinator::start_operation`].
#[derive(Debug, Clone)]
pub struct OperationReceipt {
    /// Unique operation ID.
    pub operation_id: OperationId,
    /// Number of domains listed.
    pub total_domains: u32,
    /// Completions counted when the call returned.
    pub completed_domains: u32,
    /// Status when the call returned.
    pub status: OperationStatus,
    /// Dispatch requests sent, in send order.
    pub dispatches: Vec<DispatchRecord>,
    /// Value produced by the synchronous local conversion.
    pub local_value: Value,
    /// Transport fees paid for the dispatches.
    pub fees_paid: Value,
    /// Attached value not spent on transport fees.
    pub refund: Value,
    /// Set when the operation finalized inside the call.
    pub disbursement: Option<Disbursement>,
    /// Set when the operation was ready but the inline finalize failed. The
    /// operation stays open and [`SweepCoordinator::retry_finalize`] runs it
    /// again.
    pub finalize_error: Option<String>,
}

/// External collaborators the coordinator drives.
pub struct Collaborators {
    /// Sends dispatch requests to remote domains.
    pub transport: Arc<dyn MessageTransport>,
    /// Converts the origin domain's own assets.
    pub adapter: Arc<dyn ConversionAdapter>,
    /// Moves the final balance to another domain.
    pub bridge: Arc<dyn ValueBridge>,
    /// Holds the accumulated value until finalize.
    pub custody: Arc<dyn Custody>,
    /// Shields the final balance when an operation asks for privacy.
    pub privacy: Arc<dyn PrivacyHook>,
    pub clock: Arc<dyn Clock>,
}

struct DispatchPlan {
    expected: BTreeSet<DomainId>,
    local: Option<Vec<DispatchInstruction>>,
    remote: Vec<(DomainId, Vec<DispatchInstruction>)>,
    deadline: chrono::Duration,
}

/// The origin coordinator.
pub struct SweepCoordinator {
    config: CoordinatorConfig,
    state: RwLock<CoordinatorState>,
    book: OperationBook,
    remotes: RemoteRegistry,
    settler: Settler,
    transport: Arc<dyn MessageTransport>,
    adapter: Arc<dyn ConversionAdapter>,
    clock: Arc<dyn Clock>,
    metrics: SharedMetrics,
    /// Serializes every state-changing call.
    processing: Mutex<()>,
    /// Operations already reported by the deadline watch.
    flagged_expired: DashMap<OperationId, Timestamp>,
    shutdown: watch::Sender<bool>,
}

impl SweepCoordinator {
    /// Create a coordinator. Fails if the configuration does not validate.
    pub fn new(config: CoordinatorConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate().map_err(SweepError::Configuration)?;

        let (shutdown, _) = watch::channel(false);
        let settler = Settler::new(
            config.self_domain,
            collaborators.custody,
            collaborators.bridge,
            collaborators.privacy,
        );

        info!(
            domain = %config.self_domain,
            remotes = config.remotes.len(),
            counting_mode = ?config.counting_mode,
            "Coordinator created"
        );

        Ok(Self {
            remotes: RemoteRegistry::from_map(&config.remotes),
            config,
            state: RwLock::new(CoordinatorState::Running),
            book: OperationBook::new(),
            settler,
            transport: collaborators.transport,
            adapter: collaborators.adapter,
            clock: collaborators.clock,
            metrics: Arc::new(Metrics::new()),
            processing: Mutex::new(()),
            flagged_expired: DashMap::new(),
            shutdown,
        })
    }

    /// Start a sweep operation.
    ///
    /// Validation and fee quoting happen before anything leaves the
    /// coordinator. If this domain is listed, its instructions are converted
    /// synchronously and counted immediately; when that completes the
    /// operation (a local-only sweep), finalize runs inside this call. If
    /// that finalize fails the call still succeeds: the operation stays
    /// open with its completion counted and the receipt carries
    /// `finalize_error`.
    #[instrument(
        skip(self, request),
        fields(domains = request.domains.len(), privacy = request.privacy)
    )]
    pub async fn start_operation(
        &self,
        request: SweepRequest,
        attached_fee: Value,
    ) -> Result<OperationReceipt> {
        if !self.state().accepts_operations() {
            return Err(SweepError::CoordinatorPaused);
        }
        let _guard = self.processing.lock().await;

        let plan = self.plan(&request)?;
        let operation_id = OperationId::new();
        let self_domain = self.config.self_domain;

        // Quote every dispatch before sending any of them.
        let mut quoted = Vec::with_capacity(plan.remote.len());
        let mut total_fees = Value::ZERO;
        for (domain, instructions) in plan.remote {
            let payload =
                Envelope::dispatch(self_domain, domain, operation_id, instructions).encode();
            let fee = self.transport.quote(domain, &payload).await?;
            total_fees = total_fees.checked_add(fee).ok_or_else(|| {
                SweepError::invalid_field("dispatch fees overflow the value unit", "attached_fee")
            })?;
            quoted.push((domain, payload, fee));
        }
        if total_fees > attached_fee {
            warn!(
                required = %total_fees,
                attached = %attached_fee,
                "Attached value cannot cover dispatch fees"
            );
            return Err(SweepError::InsufficientFee {
                required: total_fees.to_string(),
                available: attached_fee.to_string(),
            });
        }

        let local_batch = match &plan.local {
            Some(instructions) => Some(convert_batch(self.adapter.as_ref(), instructions).await?),
            None => None,
        };

        let now = self.clock.now();
        let mut operation = SweepOperation::new(
            operation_id,
            plan.expected,
            self.config.final_receiver,
            self.config.final_receiver_domain,
            request.privacy,
            now,
            now + plan.deadline,
        );
        self.book.insert(operation.clone());
        self.metrics.operation_started();

        let mut dispatches = Vec::with_capacity(quoted.len());
        for (domain, payload, fee) in quoted {
            match self
                .transport
                .send(domain, payload, fee, self.config.coordinator_address)
                .await
            {
                Ok(receipt) => {
                    operation.fees_paid = operation.fees_paid.saturating_add(receipt.fee);
                    self.metrics.dispatch_sent();
                    info!(
                        operation_id = %operation_id,
                        domain = %domain,
                        message_id = %receipt.message_id,
                        fee = %receipt.fee,
                        "Dispatch request sent"
                    );
                    dispatches.push(DispatchRecord {
                        domain,
                        message_id: receipt.message_id,
                        fee: receipt.fee,
                    });
                }
                Err(e) => {
                    error!(
                        operation_id = %operation_id,
                        domain = %domain,
                        error = %e,
                        "Dispatch failed, aborting operation"
                    );
                    if !dispatches.is_empty() {
                        let sent: Vec<DomainId> = dispatches.iter().map(|d| d.domain).collect();
                        warn!(
                            operation_id = %operation_id,
                            sent = ?sent,
                            "Sent dispatches stay in flight; their value strands in custody"
                        );
                    }
                    if let Some(batch) = &local_batch {
                        unwind_batch(self.adapter.as_ref(), &batch.receipts).await;
                    }
                    operation.transition_to(OperationStatus::Aborted, self.clock.now())?;
                    self.book.commit(operation);
                    self.metrics.operation_aborted();
                    return Err(e);
                }
            }
        }

        let mut disbursement = None;
        let mut finalize_error = None;
        if let Some(batch) = local_batch {
            operation.local_value = batch.total;
            let outcome =
                operation.record_completion(self_domain, batch.total, self.config.counting_mode)?;
            info!(
                operation_id = %operation_id,
                value = %batch.total,
                instructions = batch.instruction_count(),
                "Local domain converted and counted"
            );
            self.book.commit(operation.clone());

            if let CompletionOutcome::Counted { ready: true, .. } = outcome {
                let mut finalizing = operation.clone();
                match self.finalize(&mut finalizing).await {
                    Ok(done) => {
                        disbursement = Some(done);
                        self.book.commit(finalizing.clone());
                        operation = finalizing;
                    }
                    Err(e) => {
                        error!(
                            operation_id = %operation_id,
                            error = %e,
                            code = e.error_code(),
                            "Finalize failed, operation left open for retry"
                        );
                        finalize_error = Some(e.to_string());
                    }
                }
            }
        } else {
            self.book.commit(operation.clone());
        }

        info!(
            operation_id = %operation_id,
            total = operation.total_domains,
            completed = operation.completed_domains,
            dispatches = dispatches.len(),
            "Operation started"
        );

        Ok(OperationReceipt {
            operation_id,
            total_domains: operation.total_domains,
            completed_domains: operation.completed_domains,
            status: operation.status,
            dispatches,
            local_value: operation.local_value,
            fees_paid: operation.fees_paid,
            refund: attached_fee.saturating_sub(operation.fees_paid),
            disbursement,
            finalize_error,
        })
    }

    // --- Operator calls ---

    /// Add or replace an allow-listed remote worker.
    pub fn set_remote(
        &self,
        caller: Address,
        domain: DomainId,
        worker: Address,
    ) -> Result<Option<Address>> {
        self.require_admin(&caller)?;
        if domain == self.config.self_domain || domain.is_local_sentinel() {
            return Err(SweepError::invalid_field(
                "the coordinator's own domain cannot be a remote",
                "domain",
            ));
        }
        if worker.is_zero() {
            return Err(SweepError::invalid_field("worker address cannot be zero", "worker"));
        }
        Ok(self.remotes.set(domain, worker))
    }

    pub fn remove_remote(&self, caller: Address, domain: DomainId) -> Result<Option<Address>> {
        self.require_admin(&caller)?;
        Ok(self.remotes.remove(&domain))
    }

    /// Stop accepting new operations. Notices are still counted.
    pub fn pause(&self, caller: Address) -> Result<()> {
        self.require_admin(&caller)?;
        let mut state = self.state.write();
        match *state {
            CoordinatorState::Running | CoordinatorState::Paused => {
                *state = CoordinatorState::Paused;
                info!("Coordinator paused");
                Ok(())
            }
            other => Err(SweepError::Internal(format!("cannot pause while {:?}", other))),
        }
    }

    pub fn unpause(&self, caller: Address) -> Result<()> {
        self.require_admin(&caller)?;
        let mut state = self.state.write();
        match *state {
            CoordinatorState::Running | CoordinatorState::Paused => {
                *state = CoordinatorState::Running;
                info!("Coordinator resumed");
                Ok(())
            }
            other => Err(SweepError::Internal(format!("cannot resume while {:?}", other))),
        }
    }

    /// Abandon an open operation. No value moves; whatever arrived stays in
    /// custody for manual recovery.
    #[instrument(skip(self))]
    pub async fn abort_operation(
        &self,
        caller: Address,
        operation_id: OperationId,
    ) -> Result<SweepOperation> {
        self.require_admin(&caller)?;
        let _guard = self.processing.lock().await;

        let mut operation = self.open_operation(&operation_id)?;
        operation.transition_to(OperationStatus::Aborted, self.clock.now())?;
        self.book.commit(operation.clone());
        self.metrics.operation_aborted();

        warn!(
            operation_id = %operation_id,
            completed = operation.completed_domains,
            total = operation.total_domains,
            stranded = %operation.accumulated,
            "Operation aborted"
        );
        Ok(operation)
    }

    /// Forward whatever value has been accounted to an operation whose
    /// deadline has passed.
    #[instrument(skip(self))]
    pub async fn settle_partial(
        &self,
        caller: Address,
        operation_id: OperationId,
    ) -> Result<(SweepOperation, Disbursement)> {
        self.require_admin(&caller)?;
        let _guard = self.processing.lock().await;

        let mut operation = self.open_operation(&operation_id)?;
        let now = self.clock.now();
        if !operation.is_past_deadline(now) {
            return Err(SweepError::DeadlineNotReached(operation_id));
        }

        operation.claim_finalize()?;
        let disbursement = self.settler.disburse(&operation).await?;
        operation.transition_to(OperationStatus::PartiallySettled, now)?;
        self.book.commit(operation.clone());
        self.metrics.operation_partially_settled();

        warn!(
            operation_id = %operation_id,
            completed = operation.completed_domains,
            total = operation.total_domains,
            missing = ?operation.pending_domains(),
            amount = %disbursement.amount(),
            "Operation partially settled"
        );
        Ok((operation, disbursement))
    }

    /// Re-run finalize for an operation whose counter reached the total but
    /// whose disbursement failed.
    #[instrument(skip(self))]
    pub async fn retry_finalize(
        &self,
        caller: Address,
        operation_id: OperationId,
    ) -> Result<Disbursement> {
        self.require_admin(&caller)?;
        let _guard = self.processing.lock().await;

        let mut operation = self.open_operation(&operation_id)?;
        if !operation.is_ready() {
            return Err(SweepError::invalid(format!(
                "operation {} has {} of {} completions",
                operation_id, operation.completed_domains, operation.total_domains
            )));
        }
        let disbursement = self.finalize(&mut operation).await?;
        self.book.commit(operation);
        Ok(disbursement)
    }

    /// Count a completion without a transport message. Harness use only:
    /// bypasses the allow-list, so it is restricted to the administrator.
    pub async fn complete_domain_direct(
        &self,
        caller: Address,
        operation_id: OperationId,
        domain: DomainId,
        amount: Value,
    ) -> Result<InboundOutcome> {
        self.require_admin(&caller)?;
        let _guard = self.processing.lock().await;
        self.record_notice(operation_id, domain, caller, amount).await
    }

    // --- Lifecycle ---

    /// Spawn the deadline watch on the current runtime.
    pub fn spawn_deadline_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run_deadline_watch().await })
    }

    /// Periodically report operations past their deadline until shutdown.
    pub async fn run_deadline_watch(&self) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.deadline_scan_interval) => {
                    self.scan_deadlines();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Deadline watch stopped");
    }

    /// Report open operations that passed their deadline since the last
    /// scan. Returns the newly expired ids.
    pub fn scan_deadlines(&self) -> Vec<OperationId> {
        let now = self.clock.now();
        let mut newly_expired = Vec::new();
        for operation in self.book.expired(now) {
            if self.flagged_expired.insert(operation.id, now).is_none() {
                self.metrics.operation_expired();
                warn!(
                    operation_id = %operation.id,
                    deadline = %operation.deadline,
                    pending = ?operation.pending_domains(),
                    "Operation past deadline, awaiting operator"
                );
                newly_expired.push(operation.id);
            }
        }
        newly_expired
    }

    /// Stop accepting work, wait for the call in progress, stop.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!(domain = %self.config.self_domain, "Stopping coordinator");
        *self.state.write() = CoordinatorState::ShuttingDown;
        self.shutdown.send_replace(true);

        let _guard = self.processing.lock().await;
        *self.state.write() = CoordinatorState::Stopped;

        info!(open = self.book.open().len(), "Coordinator stopped");
    }

    // --- Queries ---

    pub fn operation(&self, operation_id: OperationId) -> Result<SweepOperation> {
        self.book.get(&operation_id)
    }

    pub fn total_domains(&self, operation_id: OperationId) -> Result<u32> {
        Ok(self.book.get(&operation_id)?.total_domains)
    }

    pub fn completed_domains(&self, operation_id: OperationId) -> Result<u32> {
        Ok(self.book.get(&operation_id)?.completed_domains)
    }

    pub fn open_operations(&self) -> Vec<SweepOperation> {
        self.book.open()
    }

    /// Open operations past their deadline.
    pub fn expired_operations(&self) -> Vec<SweepOperation> {
        self.book.expired(self.clock.now())
    }

    pub fn operation_count(&self) -> usize {
        self.book.len()
    }

    pub fn remotes(&self) -> BTreeMap<DomainId, Address> {
        self.remotes.snapshot()
    }

    pub fn bridge_config(&self) -> &BridgeConfig {
        &self.config.bridge
    }

    pub fn final_receiver(&self) -> (Address, DomainId) {
        (self.config.final_receiver, self.config.final_receiver_domain)
    }

    pub fn counting_mode(&self) -> CountingMode {
        self.config.counting_mode
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    pub async fn custody_balance(&self) -> Result<Value> {
        self.settler.custody_balance().await
    }

    // --- Private methods ---

    fn require_admin(&self, caller: &Address) -> Result<()> {
        if *caller != self.config.admin {
            warn!(caller = %caller, "Admin call rejected");
            return Err(SweepError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn open_operation(&self, operation_id: &OperationId) -> Result<SweepOperation> {
        let operation = self.book.get(operation_id)?;
        if !operation.is_open() {
            return Err(SweepError::OperationClosed {
                operation_id: *operation_id,
                status: operation.status,
            });
        }
        Ok(operation)
    }

    fn plan(&self, request: &SweepRequest) -> Result<DispatchPlan> {
        if request.domains.is_empty() {
            return Err(SweepError::invalid_field("at least one domain is required", "domains"));
        }
        if request.domains.len() != request.instructions.len() {
            return Err(SweepError::invalid_field(
                format!(
                    "{} domains but {} instruction lists",
                    request.domains.len(),
                    request.instructions.len()
                ),
                "instructions",
            ));
        }

        let deadline = chrono::Duration::from_std(self.config.operation_deadline)
            .map_err(|e| SweepError::Configuration(e.to_string()))?;

        let self_domain = self.config.self_domain;
        let mut plan = DispatchPlan {
            expected: BTreeSet::new(),
            local: None,
            remote: Vec::new(),
            deadline,
        };

        for (domain, instructions) in request.domains.iter().zip(&request.instructions) {
            let domain = if domain.is_local_sentinel() { self_domain } else { *domain };

            if !plan.expected.insert(domain) {
                return Err(SweepError::invalid_field(
                    format!("domain {} is listed more than once", domain),
                    "domains",
                ));
            }
            if instructions.is_empty() {
                return Err(SweepError::EmptyInstructions { domain });
            }
            for instruction in instructions {
                instruction.validate()?;
            }

            if domain == self_domain {
                plan.local = Some(instructions.clone());
            } else if self.remotes.contains(&domain) {
                plan.remote.push((domain, instructions.clone()));
            } else {
                return Err(SweepError::UnauthorizedSource {
                    domain,
                    sender: Address::ZERO,
                });
            }
        }

        Ok(plan)
    }

    /// Check a delivered message against its envelope and the allow-list.
    fn authenticate(&self, message: &InboundMessage, envelope: &Envelope) -> Result<()> {
        let unauthorized = || SweepError::UnauthorizedSource {
            domain: message.source_domain,
            sender: message.sender,
        };

        if envelope.source_domain != message.source_domain {
            return Err(unauthorized());
        }
        if envelope.destination_domain != self.config.self_domain {
            return Err(unauthorized());
        }
        if !self.remotes.is_authorized(&message.source_domain, &message.sender) {
            return Err(unauthorized());
        }
        Ok(())
    }

    /// Count one completion. Caller holds the processing lock.
    async fn record_notice(
        &self,
        operation_id: OperationId,
        domain: DomainId,
        sender: Address,
        amount: Value,
    ) -> Result<InboundOutcome> {
        let mut operation = self.book.get(&operation_id).map_err(|e| self.rejected(e))?;
        let mode = self.config.counting_mode;

        if mode == CountingMode::Idempotent && !operation.expected.contains(&domain) {
            return Err(self.rejected(SweepError::UnauthorizedSource { domain, sender }));
        }

        match operation.record_completion(domain, amount, mode) {
            Ok(CompletionOutcome::Duplicate) => {
                self.metrics.notice_duplicate();
                warn!(
                    operation_id = %operation_id,
                    domain = %domain,
                    "Duplicate completion notice ignored"
                );
                Ok(InboundOutcome::Duplicate)
            }
            Ok(CompletionOutcome::Counted {
                completed,
                total,
                ready,
            }) => {
                info!(
                    operation_id = %operation_id,
                    domain = %domain,
                    amount = %amount,
                    completed,
                    total,
                    "Completion counted"
                );
                if ready {
                    self.finalize(&mut operation).await?;
                }
                self.book.commit(operation);
                self.metrics.notice_accepted();
                Ok(InboundOutcome::Processed)
            }
            Err(e) => Err(self.rejected(e)),
        }
    }

    /// Run finalize side effects on a working copy. Idempotent mode claims
    /// the single finalize slot first; legacy mode relies on the
    /// `completed == total` edge alone.
    async fn finalize(&self, operation: &mut SweepOperation) -> Result<Disbursement> {
        if self.config.counting_mode == CountingMode::Idempotent {
            operation.claim_finalize()?;
        }

        let disbursement = self.settler.disburse(operation).await?;
        operation.finalized = true;
        operation.transition_to(OperationStatus::Finalized, self.clock.now())?;
        self.metrics.operation_finalized();

        info!(
            operation_id = %operation.id,
            reported = ?operation.reported,
            amount = %disbursement.amount(),
            "Operation finalized"
        );
        Ok(disbursement)
    }

    fn rejected(&self, err: SweepError) -> SweepError {
        self.metrics.notice_rejected();
        warn!(error = %err, code = err.error_code(), "Inbound message rejected");
        err
    }
}

#[async_trait]
impl InboundHandler for SweepCoordinator {
    #[instrument(
        skip(self, message),
        fields(message_id = %message.message_id, source = %message.source_domain)
    )]
    async fn handle_inbound(&self, message: InboundMessage) -> Result<InboundOutcome> {
        if !self.state().accepts_notices() {
            return Err(SweepError::Internal("coordinator is stopped".to_string()));
        }
        let _guard = self.processing.lock().await;

        let envelope = Envelope::decode(&message.payload).map_err(|e| self.rejected(e))?;
        self.authenticate(&message, &envelope)
            .map_err(|e| self.rejected(e))?;

        match envelope.message {
            ProtocolMessage::CompletionNotice {
                operation_id,
                amount,
                ..
            } => {
                self.record_notice(operation_id, message.source_domain, message.sender, amount)
                    .await
            }
            ProtocolMessage::DispatchRequest { .. } => Err(self.rejected(SweepError::invalid(
                "coordinator does not accept dispatch requests",
            ))),
        }
    }
}
