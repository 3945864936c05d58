//! Remote worker configuration.

use serde::{Deserialize, Serialize};

use omnisweep_common::{Address, DomainId, Value};
use omnisweep_protocol::{BridgeConfig, BridgeFlavor};

/// Configuration for a remote worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Domain this worker is deployed on.
    pub self_domain: DomainId,
    /// Address the worker's notices are sent from.
    pub worker_address: Address,
    /// Administrator identity for operator calls.
    pub admin: Address,
    /// Domain of the origin coordinator.
    pub origin_domain: DomainId,
    /// Only dispatches sent from this address are accepted; bridged value
    /// is delivered to it.
    pub origin_coordinator: Address,
    /// Canonical value set aside for completion-notice fees at start-up.
    pub notice_fee_reserve: Value,
    /// Domain -> bridge flavor table.
    pub bridge: BridgeConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let self_domain = DomainId::new(2);
        let origin_domain = DomainId::new(1);
        Self {
            self_domain,
            worker_address: Address::from_label("worker-2"),
            admin: Address::from_label("admin"),
            origin_domain,
            origin_coordinator: Address::from_label("coordinator"),
            notice_fee_reserve: Value::ZERO,
            bridge: BridgeConfig::default()
                .with_domain(origin_domain, BridgeFlavor::Generic, 1, 1)
                .with_domain(self_domain, BridgeFlavor::Generic, 2, 2),
        }
    }
}

impl WorkerConfig {
    /// Config for a worker on `self_domain` reporting to `origin_domain`.
    pub fn new(
        self_domain: DomainId,
        worker_address: Address,
        origin_domain: DomainId,
        origin_coordinator: Address,
    ) -> Self {
        Self {
            self_domain,
            worker_address,
            origin_domain,
            origin_coordinator,
            ..Self::default()
        }
    }

    pub fn with_fee_reserve(mut self, reserve: Value) -> Self {
        self.notice_fee_reserve = reserve;
        self
    }

    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(domain) = env_parse::<u32>("OMNISWEEP_SELF_DOMAIN") {
            config.self_domain = DomainId::new(domain);
        }

        if let Some(address) = env_parse::<Address>("OMNISWEEP_WORKER_ADDRESS") {
            config.worker_address = address;
        }

        if let Some(admin) = env_parse::<Address>("OMNISWEEP_ADMIN") {
            config.admin = admin;
        }

        if let Some(domain) = env_parse::<u32>("OMNISWEEP_ORIGIN_DOMAIN") {
            config.origin_domain = DomainId::new(domain);
        }

        if let Some(address) = env_parse::<Address>("OMNISWEEP_ORIGIN_COORDINATOR") {
            config.origin_coordinator = address;
        }

        if let Some(reserve) = env_parse::<Value>("OMNISWEEP_NOTICE_FEE_RESERVE") {
            config.notice_fee_reserve = reserve;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.self_domain == self.origin_domain {
            return Err("Worker cannot run on the origin domain".to_string());
        }

        if self.self_domain.is_local_sentinel() || self.origin_domain.is_local_sentinel() {
            return Err("Domains cannot be the local sentinel".to_string());
        }

        if self.worker_address.is_zero() || self.origin_coordinator.is_zero() {
            return Err("Worker and origin coordinator addresses cannot be zero".to_string());
        }

        if self.admin.is_zero() {
            return Err("Admin address cannot be zero".to_string());
        }

        self.bridge.validate(self.self_domain)?;

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(WorkerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = WorkerConfig::new(
            DomainId::new(1),
            Address::from_label("w"),
            DomainId::new(1),
            Address::from_label("c"),
        );
        assert!(config.validate().is_err());

        let config = WorkerConfig::default().with_bridge(BridgeConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_config() {
        let json = r#"{ "self_domain": 5, "notice_fee_reserve": "2.5" }"#;
        let config: WorkerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.self_domain, DomainId::new(5));
        assert_eq!(config.notice_fee_reserve, "2.5".parse().unwrap());
    }
}
