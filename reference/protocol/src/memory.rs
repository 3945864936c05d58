//! In-memory implementations of the external collaborators.
//!
//! Used by the simulator and by tests: a per-domain [`MemoryVault`] ledger,
//! a fixed-rate conversion venue, a bridge hub serving both call shapes, a
//! privacy hook, and a [`MemoryNetwork`] that delivers messages at least
//! once, in whatever order the test asks for.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::debug;

use omnisweep_common::{
    Address, AssetId, DispatchInstruction, DomainId, MessageId, OperationId, Result, SweepError,
    Value,
};

use crate::bridge::{BridgeFlavor, GenericBridgeEndpoint, LegacyBridgeEndpoint};
use crate::custody::{Custody, PrivacyHook};
use crate::transport::{
    derive_message_id, InboundHandler, InboundMessage, InboundOutcome, MessageTransport,
    TransportReceipt,
};
use crate::venue::{ConversionAdapter, ConversionReceipt};

// --- Ledger ---

/// Canonical-value balances by address plus the owner's raw asset holdings,
/// for a single domain.
#[derive(Debug)]
pub struct MemoryVault {
    owner: Address,
    balances: Mutex<HashMap<Address, Value>>,
    assets: Mutex<HashMap<AssetId, Decimal>>,
    transfers: AtomicU64,
}

impl MemoryVault {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            balances: Mutex::new(HashMap::new()),
            assets: Mutex::new(HashMap::new()),
            transfers: AtomicU64::new(0),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn balance_of(&self, address: &Address) -> Value {
        self.balances.lock().get(address).copied().unwrap_or_default()
    }

    pub fn credit(&self, address: &Address, amount: Value) {
        *self.balances.lock().entry(*address).or_default() += amount;
    }

    pub fn debit(&self, address: &Address, amount: Value) -> Result<()> {
        let mut balances = self.balances.lock();
        let balance = balances.entry(*address).or_default();
        *balance = balance.checked_sub(amount).ok_or_else(|| {
            SweepError::CustodyFailure(format!(
                "{} holds {}, cannot debit {}",
                address, balance, amount
            ))
        })?;
        Ok(())
    }

    pub fn deposit_asset(&self, asset: &AssetId, amount: Decimal) {
        *self.assets.lock().entry(asset.clone()).or_insert(Decimal::ZERO) += amount;
    }

    pub fn withdraw_asset(&self, asset: &AssetId, amount: Decimal) -> Result<()> {
        let mut assets = self.assets.lock();
        let held = assets.entry(asset.clone()).or_insert(Decimal::ZERO);
        if *held < amount {
            return Err(SweepError::AdapterFailure {
                venue: String::new(),
                asset: asset.to_string(),
                reason: format!("holding {} is below {}", held, amount),
            });
        }
        *held -= amount;
        Ok(())
    }

    pub fn asset_balance(&self, asset: &AssetId) -> Decimal {
        self.assets.lock().get(asset).copied().unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl Custody for MemoryVault {
    async fn balance(&self) -> Result<Value> {
        Ok(self.balance_of(&self.owner))
    }

    async fn transfer(&self, to: Address, amount: Value) -> Result<String> {
        self.debit(&self.owner, amount)?;
        self.credit(&to, amount);
        let n = self.transfers.fetch_add(1, Ordering::Relaxed);
        Ok(format!("transfer-{}", n))
    }
}

// --- Venue ---

/// Venue converting at fixed per-asset rates out of a [`MemoryVault`].
pub struct StaticRateVenue {
    vault: Arc<MemoryVault>,
    rates: HashMap<AssetId, Decimal>,
    failing: Mutex<HashSet<AssetId>>,
    conversions: Mutex<Vec<ConversionReceipt>>,
    unwound: Mutex<Vec<ConversionReceipt>>,
}

impl StaticRateVenue {
    pub fn new(vault: Arc<MemoryVault>) -> Self {
        Self {
            vault,
            rates: HashMap::new(),
            failing: Mutex::new(HashSet::new()),
            conversions: Mutex::new(Vec::new()),
            unwound: Mutex::new(Vec::new()),
        }
    }

    /// Value units obtained per unit of `asset`.
    pub fn with_rate(mut self, asset: impl Into<AssetId>, rate: Decimal) -> Self {
        self.rates.insert(asset.into(), rate);
        self
    }

    /// Make every conversion of `asset` fail.
    pub fn fail_asset(&self, asset: impl Into<AssetId>) {
        self.failing.lock().insert(asset.into());
    }

    pub fn heal_asset(&self, asset: impl Into<AssetId>) {
        self.failing.lock().remove(&asset.into());
    }

    pub fn conversion_count(&self) -> usize {
        self.conversions.lock().len()
    }

    pub fn unwound_count(&self) -> usize {
        self.unwound.lock().len()
    }
}

#[async_trait]
impl ConversionAdapter for StaticRateVenue {
    async fn convert(&self, instruction: &DispatchInstruction) -> Result<ConversionReceipt> {
        let failure = |reason: String| SweepError::AdapterFailure {
            venue: instruction.venue.to_string(),
            asset: instruction.asset.to_string(),
            reason,
        };

        if self.failing.lock().contains(&instruction.asset) {
            return Err(failure("venue rejected the swap".to_string()));
        }
        let rate = *self
            .rates
            .get(&instruction.asset)
            .ok_or_else(|| failure("no route for asset".to_string()))?;

        self.vault
            .withdraw_asset(&instruction.asset, instruction.amount)
            .map_err(|e| failure(e.to_string()))?;

        let value_out = Value::new(instruction.amount * rate)
            .ok_or_else(|| failure("negative output".to_string()))?;
        self.vault.credit(&self.vault.owner(), value_out);

        let mut conversions = self.conversions.lock();
        let receipt = ConversionReceipt {
            venue: instruction.venue.clone(),
            asset: instruction.asset.clone(),
            amount_in: instruction.amount,
            value_out,
            reference: format!("{}-{}", instruction.venue, conversions.len()),
        };
        conversions.push(receipt.clone());
        Ok(receipt)
    }

    async fn unwind(&self, receipt: &ConversionReceipt) -> Result<()> {
        self.vault.debit(&self.vault.owner(), receipt.value_out)?;
        self.vault.deposit_asset(&receipt.asset, receipt.amount_in);
        self.unwound.lock().push(receipt.clone());
        Ok(())
    }
}

// --- Bridge ---

/// One bridged transfer as seen by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTransferRecord {
    pub flavor: BridgeFlavor,
    pub numeric_destination: u64,
    pub recipient_bytes: Vec<u8>,
    pub amount: Value,
    pub reference: String,
}

/// Bridge backend that moves value between registered vaults instantly.
#[derive(Default)]
pub struct MemoryBridgeHub {
    generic: Mutex<HashMap<u32, Arc<MemoryVault>>>,
    legacy: Mutex<HashMap<u64, Arc<MemoryVault>>>,
    transfers: Mutex<Vec<BridgeTransferRecord>>,
    failing: AtomicBool,
}

impl MemoryBridgeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `vault` reachable under both numbering schemes.
    pub fn register(&self, generic_id: u32, legacy_chain_id: u64, vault: Arc<MemoryVault>) {
        self.generic.lock().insert(generic_id, vault.clone());
        self.legacy.lock().insert(legacy_chain_id, vault);
    }

    pub fn generic_endpoint(
        self: &Arc<Self>,
        local: Arc<MemoryVault>,
    ) -> Arc<dyn GenericBridgeEndpoint> {
        Arc::new(MemoryGenericEndpoint {
            hub: self.clone(),
            local,
        })
    }

    pub fn legacy_endpoint(
        self: &Arc<Self>,
        local: Arc<MemoryVault>,
    ) -> Arc<dyn LegacyBridgeEndpoint> {
        Arc::new(MemoryLegacyEndpoint {
            hub: self.clone(),
            local,
        })
    }

    /// Make every bridge call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn transfers(&self) -> Vec<BridgeTransferRecord> {
        self.transfers.lock().clone()
    }

    fn settle(
        &self,
        local: &MemoryVault,
        destination: Option<Arc<MemoryVault>>,
        record: BridgeTransferRecord,
        recipient: Address,
    ) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SweepError::BridgeFailure("bridge unavailable".to_string()));
        }
        let destination = destination.ok_or_else(|| {
            SweepError::BridgeFailure(format!(
                "unknown destination {}",
                record.numeric_destination
            ))
        })?;

        local.debit(&local.owner(), record.amount)?;
        destination.credit(&recipient, record.amount);

        let mut transfers = self.transfers.lock();
        let reference = format!("{}-{}", record.flavor, transfers.len());
        transfers.push(BridgeTransferRecord {
            reference: reference.clone(),
            ..record
        });
        Ok(reference)
    }
}

struct MemoryGenericEndpoint {
    hub: Arc<MemoryBridgeHub>,
    local: Arc<MemoryVault>,
}

#[async_trait]
impl GenericBridgeEndpoint for MemoryGenericEndpoint {
    async fn deposit(
        &self,
        destination_id: u32,
        recipient: [u8; 32],
        amount: Value,
    ) -> Result<String> {
        let address = Address::from_slice(&recipient[12..])
            .map_err(|e| SweepError::BridgeFailure(e.to_string()))?;
        let destination = self.hub.generic.lock().get(&destination_id).cloned();
        self.hub.settle(
            &self.local,
            destination,
            BridgeTransferRecord {
                flavor: BridgeFlavor::Generic,
                numeric_destination: destination_id as u64,
                recipient_bytes: recipient.to_vec(),
                amount,
                reference: String::new(),
            },
            address,
        )
    }
}

struct MemoryLegacyEndpoint {
    hub: Arc<MemoryBridgeHub>,
    local: Arc<MemoryVault>,
}

#[async_trait]
impl LegacyBridgeEndpoint for MemoryLegacyEndpoint {
    async fn transfer(&self, chain_id: u64, recipient: Vec<u8>, amount: Value) -> Result<String> {
        let address = Address::from_slice(&recipient)
            .map_err(|e| SweepError::BridgeFailure(e.to_string()))?;
        let destination = self.hub.legacy.lock().get(&chain_id).cloned();
        self.hub.settle(
            &self.local,
            destination,
            BridgeTransferRecord {
                flavor: BridgeFlavor::LegacyFixedPair,
                numeric_destination: chain_id,
                recipient_bytes: recipient,
                amount,
                reference: String::new(),
            },
            address,
        )
    }
}

// --- Privacy hook ---

/// Privacy hook that takes value out of a vault and records it.
pub struct RecordingPrivacyHook {
    vault: Arc<MemoryVault>,
    shielded: Mutex<Vec<(OperationId, Value)>>,
}

impl RecordingPrivacyHook {
    pub fn new(vault: Arc<MemoryVault>) -> Self {
        Self {
            vault,
            shielded: Mutex::new(Vec::new()),
        }
    }

    pub fn shielded(&self) -> Vec<(OperationId, Value)> {
        self.shielded.lock().clone()
    }
}

#[async_trait]
impl PrivacyHook for RecordingPrivacyHook {
    async fn shield(&self, operation_id: OperationId, amount: Value) -> Result<String> {
        self.vault.debit(&self.vault.owner(), amount)?;
        let mut shielded = self.shielded.lock();
        shielded.push((operation_id, amount));
        Ok(format!("shield-{}", shielded.len()))
    }
}

// --- Network ---

/// A message waiting for delivery.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub destination: DomainId,
    pub message: InboundMessage,
}

/// Log entry for every accepted send.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub source: DomainId,
    pub sender: Address,
    pub destination: DomainId,
    pub message_id: MessageId,
    pub fee: Value,
    pub payload: Vec<u8>,
}

/// Result of delivering one message.
#[derive(Debug)]
pub struct Delivery {
    pub destination: DomainId,
    pub message_id: MessageId,
    pub outcome: Result<InboundOutcome>,
}

struct NetworkState {
    nonce: u64,
    in_flight: VecDeque<InFlight>,
    handlers: HashMap<DomainId, Weak<dyn InboundHandler>>,
    failing_destinations: HashSet<DomainId>,
    sent: Vec<SentRecord>,
}

/// Shared medium connecting every [`MemoryTransport`].
///
/// Nothing is delivered until the owner calls [`deliver_next`] or
/// [`deliver_all`]; in between, messages can be duplicated, reordered, or
/// dropped to reproduce at-least-once, unordered delivery.
///
/// [`deliver_next`]: MemoryNetwork::deliver_next
/// [`deliver_all`]: MemoryNetwork::deliver_all
pub struct MemoryNetwork {
    base_fee: Value,
    fee_per_byte: Decimal,
    state: Mutex<NetworkState>,
}

impl MemoryNetwork {
    pub fn new(base_fee: Value, fee_per_byte: Decimal) -> Self {
        Self {
            base_fee,
            fee_per_byte,
            state: Mutex::new(NetworkState {
                nonce: 0,
                in_flight: VecDeque::new(),
                handlers: HashMap::new(),
                failing_destinations: HashSet::new(),
                sent: Vec::new(),
            }),
        }
    }

    /// Network that charges nothing.
    pub fn free() -> Self {
        Self::new(Value::ZERO, Decimal::ZERO)
    }

    /// Transport endpoint for a component at `address` on `domain`.
    pub fn endpoint(self: &Arc<Self>, domain: DomainId, address: Address) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            domain,
            address,
        }
    }

    /// Route deliveries for `domain` to `handler`. Only a weak reference is
    /// kept, so components can own their transport without a cycle.
    pub fn register_handler<H: InboundHandler + 'static>(
        &self,
        domain: DomainId,
        handler: &Arc<H>,
    ) {
        let handler: Arc<dyn InboundHandler> = handler.clone();
        self.state.lock().handlers.insert(domain, Arc::downgrade(&handler));
    }

    pub fn fee_for(&self, payload_len: usize) -> Value {
        let variable = Value::new(self.fee_per_byte * Decimal::from(payload_len as u64))
            .unwrap_or_default();
        self.base_fee + variable
    }

    /// Refuse every send to `domain` while `failing` is set.
    pub fn fail_sends_to(&self, domain: DomainId, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing_destinations.insert(domain);
        } else {
            state.failing_destinations.remove(&domain);
        }
    }

    pub fn pending(&self) -> Vec<InFlight> {
        self.state.lock().in_flight.iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.state.lock().sent.clone()
    }

    pub fn sent_to(&self, destination: DomainId) -> Vec<SentRecord> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|r| r.destination == destination)
            .cloned()
            .collect()
    }

    /// Queue a second copy of every pending message.
    pub fn duplicate_pending(&self) {
        let mut state = self.state.lock();
        let copies: Vec<InFlight> = state.in_flight.iter().cloned().collect();
        state.in_flight.extend(copies);
    }

    /// Queue one extra copy of a specific pending message.
    pub fn duplicate(&self, message_id: &MessageId) -> bool {
        let mut state = self.state.lock();
        let copy = state
            .in_flight
            .iter()
            .find(|m| m.message.message_id == *message_id)
            .cloned();
        match copy {
            Some(copy) => {
                state.in_flight.push_back(copy);
                true
            }
            None => false,
        }
    }

    /// Put an already-sent message back in flight.
    pub fn redeliver(&self, record: &SentRecord) {
        self.state.lock().in_flight.push_back(InFlight {
            destination: record.destination,
            message: InboundMessage {
                message_id: record.message_id,
                source_domain: record.source,
                sender: record.sender,
                payload: record.payload.clone(),
            },
        });
    }

    /// Inject an arbitrary message, e.g. one with a forged sender.
    pub fn inject(&self, destination: DomainId, message: InboundMessage) {
        self.state
            .lock()
            .in_flight
            .push_back(InFlight { destination, message });
    }

    /// Randomly reorder pending messages.
    pub fn shuffle<R: Rng + ?Sized>(&self, rng: &mut R) {
        self.state.lock().in_flight.make_contiguous().shuffle(rng);
    }

    /// Drop every pending message addressed to `destination`.
    pub fn drop_to(&self, destination: DomainId) -> usize {
        let mut state = self.state.lock();
        let before = state.in_flight.len();
        state.in_flight.retain(|m| m.destination != destination);
        before - state.in_flight.len()
    }

    /// Deliver the oldest pending message.
    pub async fn deliver_next(&self) -> Option<Delivery> {
        let (in_flight, handler) = {
            let mut state = self.state.lock();
            let in_flight = state.in_flight.pop_front()?;
            let handler = state
                .handlers
                .get(&in_flight.destination)
                .and_then(Weak::upgrade);
            (in_flight, handler)
        };

        let message_id = in_flight.message.message_id;
        let destination = in_flight.destination;
        debug!(%destination, %message_id, "Delivering message");

        let outcome = match handler {
            Some(handler) => handler.handle_inbound(in_flight.message).await,
            None => Err(SweepError::TransportFailure(format!(
                "no handler registered for domain {}",
                destination
            ))),
        };

        Some(Delivery {
            destination,
            message_id,
            outcome,
        })
    }

    /// Deliver until nothing is pending, including messages sent by the
    /// handlers along the way.
    pub async fn deliver_all(&self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Some(delivery) = self.deliver_next().await {
            deliveries.push(delivery);
        }
        deliveries
    }
}

/// Transport endpoint for one component.
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    domain: DomainId,
    address: Address,
}

impl MemoryTransport {
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn quote(&self, _destination: DomainId, payload: &[u8]) -> Result<Value> {
        Ok(self.network.fee_for(payload.len()))
    }

    async fn send(
        &self,
        destination: DomainId,
        payload: Vec<u8>,
        fee: Value,
        _refund_to: Address,
    ) -> Result<TransportReceipt> {
        let required = self.network.fee_for(payload.len());
        if fee < required {
            return Err(SweepError::InsufficientFee {
                required: required.to_string(),
                available: fee.to_string(),
            });
        }

        let mut state = self.network.state.lock();
        if state.failing_destinations.contains(&destination) {
            return Err(SweepError::TransportFailure(format!(
                "route to {} unavailable",
                destination
            )));
        }

        let nonce = state.nonce;
        state.nonce += 1;
        let message_id = derive_message_id(self.domain, destination, nonce, &payload);

        state.sent.push(SentRecord {
            source: self.domain,
            sender: self.address,
            destination,
            message_id,
            fee: required,
            payload: payload.clone(),
        });
        state.in_flight.push_back(InFlight {
            destination,
            message: InboundMessage {
                message_id,
                source_domain: self.domain,
                sender: self.address,
                payload,
            },
        });

        Ok(TransportReceipt {
            message_id,
            nonce,
            fee: required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct CountingHandler {
        seen: Mutex<Vec<MessageId>>,
    }

    #[async_trait]
    impl InboundHandler for CountingHandler {
        async fn handle_inbound(&self, message: InboundMessage) -> Result<InboundOutcome> {
            let mut seen = self.seen.lock();
            if seen.contains(&message.message_id) {
                return Ok(InboundOutcome::Duplicate);
            }
            seen.push(message.message_id);
            Ok(InboundOutcome::Processed)
        }
    }

    fn handler() -> Arc<CountingHandler> {
        Arc::new(CountingHandler {
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_send_requires_quoted_fee() {
        let network = Arc::new(MemoryNetwork::new(Value::from_u64(2), Decimal::ONE));
        let transport = network.endpoint(DomainId::new(1), Address::from_label("a"));

        let quote = transport.quote(DomainId::new(2), b"abc").await.unwrap();
        assert_eq!(quote, Value::from_u64(5));

        let short = transport
            .send(DomainId::new(2), b"abc".to_vec(), Value::from_u64(4), Address::ZERO)
            .await;
        assert!(matches!(short, Err(SweepError::InsufficientFee { .. })));
        assert_eq!(network.pending_count(), 0);

        transport
            .send(DomainId::new(2), b"abc".to_vec(), quote, Address::ZERO)
            .await
            .unwrap();
        assert_eq!(network.sent_to(DomainId::new(2)).len(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_reach_handler_twice() {
        let network = Arc::new(MemoryNetwork::free());
        let receiver = handler();
        network.register_handler(DomainId::new(2), &receiver);

        let transport = network.endpoint(DomainId::new(1), Address::from_label("a"));
        transport
            .send(DomainId::new(2), b"x".to_vec(), Value::ZERO, Address::ZERO)
            .await
            .unwrap();
        network.duplicate_pending();

        let outcomes: Vec<_> = network
            .deliver_all()
            .await
            .into_iter()
            .map(|d| d.outcome.unwrap())
            .collect();
        assert_eq!(outcomes, vec![InboundOutcome::Processed, InboundOutcome::Duplicate]);
    }

    #[tokio::test]
    async fn test_authenticated_source_is_stamped_by_transport() {
        let network = Arc::new(MemoryNetwork::free());
        let sender = Address::from_label("origin");
        let transport = network.endpoint(DomainId::new(1), sender);
        transport
            .send(DomainId::new(9), b"x".to_vec(), Value::ZERO, Address::ZERO)
            .await
            .unwrap();

        let pending = network.pending();
        assert_eq!(pending[0].message.source_domain, DomainId::new(1));
        assert_eq!(pending[0].message.sender, sender);
    }

    #[tokio::test]
    async fn test_failing_route_and_missing_handler() {
        let network = Arc::new(MemoryNetwork::free());
        let transport = network.endpoint(DomainId::new(1), Address::from_label("a"));

        network.fail_sends_to(DomainId::new(2), true);
        assert!(transport
            .send(DomainId::new(2), vec![], Value::ZERO, Address::ZERO)
            .await
            .is_err());

        network.fail_sends_to(DomainId::new(2), false);
        transport
            .send(DomainId::new(2), vec![], Value::ZERO, Address::ZERO)
            .await
            .unwrap();
        let delivery = network.deliver_next().await.unwrap();
        assert!(delivery.outcome.is_err());
    }

    #[tokio::test]
    async fn test_shuffle_and_drop() {
        let network = Arc::new(MemoryNetwork::free());
        let transport = network.endpoint(DomainId::new(1), Address::from_label("a"));
        for d in [2u32, 3, 2, 3] {
            transport
                .send(DomainId::new(d), vec![d as u8], Value::ZERO, Address::ZERO)
                .await
                .unwrap();
        }

        network.shuffle(&mut StdRng::seed_from_u64(7));
        assert_eq!(network.pending_count(), 4);
        assert_eq!(network.drop_to(DomainId::new(3)), 2);
        assert!(network
            .pending()
            .iter()
            .all(|m| m.destination == DomainId::new(2)));
    }

    #[tokio::test]
    async fn test_vault_custody_transfer() {
        let vault = MemoryVault::new(Address::from_label("owner"));
        vault.credit(&vault.owner(), Value::from_u64(10));

        let to = Address::from_label("to");
        vault.transfer(to, Value::from_u64(4)).await.unwrap();
        assert_eq!(vault.balance().await.unwrap(), Value::from_u64(6));
        assert_eq!(vault.balance_of(&to), Value::from_u64(4));
        assert!(vault.transfer(to, Value::from_u64(7)).await.is_err());
    }
}
