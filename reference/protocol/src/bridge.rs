//! Value bridge interface and bridge-flavor selection.
//!
//! Domains expose one of two outbound bridge call shapes:
//!
//! - **Generic**: `deposit(destination_id: u32, recipient: bytes32, amount)`
//! - **Legacy fixed-pair**: `transfer(chain_id: u64, recipient: bytes, amount)`
//!
//! Which one applies depends on the domain the sender is deployed on, not on
//! the destination. [`BridgeRouter`] hides the difference behind
//! [`ValueBridge`] and picks the flavor from [`BridgeConfig`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use omnisweep_common::{Address, DomainId, Result, SweepError, Value};

/// Outbound bridge call shape exposed by a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeFlavor {
    Generic,
    LegacyFixedPair,
}

impl fmt::Display for BridgeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeFlavor::Generic => write!(f, "generic"),
            BridgeFlavor::LegacyFixedPair => write!(f, "legacy_fixed_pair"),
        }
    }
}

/// Static bridge table shared by every deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Deployment domain -> call shape its bridge exposes.
    pub flavors: BTreeMap<DomainId, BridgeFlavor>,
    /// Domain -> numeric id used by the generic call shape.
    pub generic_destination_ids: BTreeMap<DomainId, u32>,
    /// Domain -> chain id used by the legacy call shape.
    pub legacy_chain_ids: BTreeMap<DomainId, u64>,
}

impl BridgeConfig {
    /// Register a domain under both numbering schemes and its own flavor.
    pub fn with_domain(
        mut self,
        domain: DomainId,
        flavor: BridgeFlavor,
        generic_destination_id: u32,
        legacy_chain_id: u64,
    ) -> Self {
        self.flavors.insert(domain, flavor);
        self.generic_destination_ids.insert(domain, generic_destination_id);
        self.legacy_chain_ids.insert(domain, legacy_chain_id);
        self
    }

    /// Flavor exposed by `domain`'s deployment.
    pub fn flavor_for(&self, domain: DomainId) -> Option<BridgeFlavor> {
        self.flavors.get(&domain).copied()
    }

    /// Check that `local_domain` has a flavor entry.
    pub fn validate(&self, local_domain: DomainId) -> std::result::Result<(), String> {
        if self.flavor_for(local_domain).is_none() {
            return Err(format!("no bridge flavor configured for domain {}", local_domain));
        }
        Ok(())
    }
}

/// Receipt for a bridged transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReceipt {
    pub flavor: BridgeFlavor,
    pub destination: DomainId,
    pub recipient: Address,
    pub amount: Value,
    pub reference: String,
}

/// Moves canonical value from the local domain to another domain.
#[async_trait]
pub trait ValueBridge: Send + Sync {
    async fn send_value(
        &self,
        destination: DomainId,
        recipient: Address,
        amount: Value,
    ) -> Result<BridgeReceipt>;
}

/// Generic call shape.
#[async_trait]
pub trait GenericBridgeEndpoint: Send + Sync {
    async fn deposit(&self, destination_id: u32, recipient: [u8; 32], amount: Value)
        -> Result<String>;
}

/// Legacy fixed-pair call shape.
#[async_trait]
pub trait LegacyBridgeEndpoint: Send + Sync {
    async fn transfer(&self, chain_id: u64, recipient: Vec<u8>, amount: Value) -> Result<String>;
}

/// Handle to the bridge the local deployment exposes.
#[derive(Clone)]
pub enum BridgeEndpoint {
    Generic(Arc<dyn GenericBridgeEndpoint>),
    Legacy(Arc<dyn LegacyBridgeEndpoint>),
}

impl BridgeEndpoint {
    pub fn flavor(&self) -> BridgeFlavor {
        match self {
            BridgeEndpoint::Generic(_) => BridgeFlavor::Generic,
            BridgeEndpoint::Legacy(_) => BridgeFlavor::LegacyFixedPair,
        }
    }
}

/// [`ValueBridge`] that translates calls into the local flavor's shape.
pub struct BridgeRouter {
    local_domain: DomainId,
    config: BridgeConfig,
    endpoint: BridgeEndpoint,
}

impl BridgeRouter {
    /// Build a router for `local_domain`. The endpoint must match the flavor
    /// the table lists for that domain.
    pub fn new(
        local_domain: DomainId,
        config: BridgeConfig,
        endpoint: BridgeEndpoint,
    ) -> Result<Self> {
        let configured = config.flavor_for(local_domain).ok_or_else(|| {
            SweepError::Configuration(format!(
                "no bridge flavor configured for domain {}",
                local_domain
            ))
        })?;

        if configured != endpoint.flavor() {
            return Err(SweepError::Configuration(format!(
                "domain {} is configured for {} bridging but a {} endpoint was supplied",
                local_domain,
                configured,
                endpoint.flavor()
            )));
        }

        Ok(Self {
            local_domain,
            config,
            endpoint,
        })
    }

    pub fn flavor(&self) -> BridgeFlavor {
        self.endpoint.flavor()
    }

    pub fn local_domain(&self) -> DomainId {
        self.local_domain
    }
}

#[async_trait]
impl ValueBridge for BridgeRouter {
    #[instrument(skip(self), fields(flavor = %self.flavor(), from = %self.local_domain))]
    async fn send_value(
        &self,
        destination: DomainId,
        recipient: Address,
        amount: Value,
    ) -> Result<BridgeReceipt> {
        if amount.is_zero() {
            return Err(SweepError::invalid_field("bridge amount must be positive", "amount"));
        }
        if recipient.is_zero() {
            return Err(SweepError::invalid_field("bridge recipient cannot be zero", "recipient"));
        }

        let reference = match &self.endpoint {
            BridgeEndpoint::Generic(endpoint) => {
                let destination_id = *self
                    .config
                    .generic_destination_ids
                    .get(&destination)
                    .ok_or_else(|| missing_id(destination, BridgeFlavor::Generic))?;
                endpoint
                    .deposit(destination_id, recipient.to_word(), amount)
                    .await?
            }
            BridgeEndpoint::Legacy(endpoint) => {
                let chain_id = *self
                    .config
                    .legacy_chain_ids
                    .get(&destination)
                    .ok_or_else(|| missing_id(destination, BridgeFlavor::LegacyFixedPair))?;
                endpoint
                    .transfer(chain_id, recipient.as_bytes().to_vec(), amount)
                    .await?
            }
        };

        info!(
            destination = %destination,
            recipient = %recipient,
            amount = %amount,
            reference = %reference,
            "Value bridged"
        );

        Ok(BridgeReceipt {
            flavor: self.flavor(),
            destination,
            recipient,
            amount,
            reference,
        })
    }
}

fn missing_id(destination: DomainId, flavor: BridgeFlavor) -> SweepError {
    SweepError::Configuration(format!(
        "no {} bridge id configured for destination {}",
        flavor, destination
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBridgeHub, MemoryVault};

    const ORIGIN: DomainId = DomainId::new(1);
    const ARB: DomainId = DomainId::new(2);
    const BSC: DomainId = DomainId::new(3);

    fn config() -> BridgeConfig {
        BridgeConfig::default()
            .with_domain(ORIGIN, BridgeFlavor::Generic, 0, 1)
            .with_domain(ARB, BridgeFlavor::Generic, 3, 42161)
            .with_domain(BSC, BridgeFlavor::LegacyFixedPair, 7, 56)
    }

    fn funded(label: &str, amount: u64) -> Arc<MemoryVault> {
        let vault = Arc::new(MemoryVault::new(Address::from_label(label)));
        vault.credit(&vault.owner(), Value::from_u64(amount));
        vault
    }

    #[tokio::test]
    async fn test_generic_flavor_uses_destination_id_and_word_recipient() {
        let hub = Arc::new(MemoryBridgeHub::new());
        let origin_vault = funded("origin", 0);
        hub.register(0, 1, origin_vault.clone());

        let arb_vault = funded("arb", 100);
        let router = BridgeRouter::new(
            ARB,
            config(),
            BridgeEndpoint::Generic(hub.generic_endpoint(arb_vault.clone())),
        )
        .unwrap();

        let recipient = Address::from_label("coordinator");
        let receipt = router
            .send_value(ORIGIN, recipient, Value::from_u64(40))
            .await
            .unwrap();

        assert_eq!(receipt.flavor, BridgeFlavor::Generic);
        assert_eq!(arb_vault.balance_of(&arb_vault.owner()), Value::from_u64(60));
        assert_eq!(origin_vault.balance_of(&recipient), Value::from_u64(40));

        let record = &hub.transfers()[0];
        assert_eq!(record.numeric_destination, 0);
        assert_eq!(record.recipient_bytes, recipient.to_word().to_vec());
    }

    #[tokio::test]
    async fn test_legacy_flavor_selected_by_local_domain() {
        let hub = Arc::new(MemoryBridgeHub::new());
        let origin_vault = funded("origin", 0);
        hub.register(0, 1, origin_vault.clone());

        let bsc_vault = funded("bsc", 10);
        let router = BridgeRouter::new(
            BSC,
            config(),
            BridgeEndpoint::Legacy(hub.legacy_endpoint(bsc_vault)),
        )
        .unwrap();
        assert_eq!(router.flavor(), BridgeFlavor::LegacyFixedPair);

        let recipient = Address::from_label("coordinator");
        router
            .send_value(ORIGIN, recipient, Value::from_u64(10))
            .await
            .unwrap();

        let record = &hub.transfers()[0];
        assert_eq!(record.flavor, BridgeFlavor::LegacyFixedPair);
        assert_eq!(record.numeric_destination, 1);
        assert_eq!(record.recipient_bytes, recipient.as_bytes().to_vec());
    }

    #[test]
    fn test_endpoint_must_match_configured_flavor() {
        let hub = Arc::new(MemoryBridgeHub::new());
        let result = BridgeRouter::new(
            BSC,
            config(),
            BridgeEndpoint::Generic(hub.generic_endpoint(funded("bsc", 0))),
        );
        assert!(matches!(result, Err(SweepError::Configuration(_))));

        let unknown = BridgeRouter::new(
            DomainId::new(99),
            config(),
            BridgeEndpoint::Generic(hub.generic_endpoint(funded("x", 0))),
        );
        assert!(unknown.is_err());
    }

    #[tokio::test]
    async fn test_unknown_destination_and_zero_amount() {
        let hub = Arc::new(MemoryBridgeHub::new());
        let router = BridgeRouter::new(
            ARB,
            config(),
            BridgeEndpoint::Generic(hub.generic_endpoint(funded("arb", 5))),
        )
        .unwrap();

        let recipient = Address::from_label("r");
        assert!(matches!(
            router.send_value(DomainId::new(99), recipient, Value::from_u64(1)).await,
            Err(SweepError::Configuration(_))
        ));
        assert!(matches!(
            router.send_value(ORIGIN, recipient, Value::ZERO).await,
            Err(SweepError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_config_validate() {
        assert!(config().validate(ARB).is_ok());
        assert!(config().validate(DomainId::new(42)).is_err());
    }
}
