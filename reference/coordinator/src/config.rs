//! Coordinator configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use omnisweep_common::{constants, Address, CountingMode, DomainId, DurationExt};
use omnisweep_protocol::{BridgeConfig, BridgeFlavor};

/// Main coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Domain this coordinator is deployed on.
    pub self_domain: DomainId,
    /// Address the coordinator's messages are sent from; remote workers
    /// accept dispatches only from this address.
    pub coordinator_address: Address,
    /// Administrator identity for operator calls.
    pub admin: Address,
    /// Recipient of every finalized operation.
    pub final_receiver: Address,
    /// Domain of the final receiver; [`DomainId::LOCAL`] means this domain.
    pub final_receiver_domain: DomainId,
    /// Allow-list: remote domain -> authorized worker address.
    pub remotes: BTreeMap<DomainId, Address>,
    /// How completion notices are counted.
    pub counting_mode: CountingMode,
    /// How long an operation waits before it may be partially settled.
    pub operation_deadline: Duration,
    /// Deadline watch scan interval.
    pub deadline_scan_interval: Duration,
    /// Domain -> bridge flavor table.
    pub bridge: BridgeConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let self_domain = DomainId::new(1);
        Self {
            self_domain,
            coordinator_address: Address::from_label("coordinator"),
            admin: Address::from_label("admin"),
            final_receiver: Address::from_label("final-receiver"),
            final_receiver_domain: DomainId::LOCAL,
            remotes: BTreeMap::new(),
            counting_mode: CountingMode::Idempotent,
            operation_deadline: constants::default_operation_deadline().as_std(),
            deadline_scan_interval: constants::deadline_scan_interval().as_std(),
            bridge: BridgeConfig::default().with_domain(self_domain, BridgeFlavor::Generic, 1, 1),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(domain) = env_parse::<u32>("OMNISWEEP_SELF_DOMAIN") {
            config.self_domain = DomainId::new(domain);
        }

        if let Some(address) = env_parse::<Address>("OMNISWEEP_COORDINATOR_ADDRESS") {
            config.coordinator_address = address;
        }

        if let Some(admin) = env_parse::<Address>("OMNISWEEP_ADMIN") {
            config.admin = admin;
        }

        if let Some(receiver) = env_parse::<Address>("OMNISWEEP_FINAL_RECEIVER") {
            config.final_receiver = receiver;
        }

        if let Some(domain) = env_parse::<u32>("OMNISWEEP_FINAL_RECEIVER_DOMAIN") {
            config.final_receiver_domain = DomainId::new(domain);
        }

        if let Ok(mode) = std::env::var("OMNISWEEP_COUNTING_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "legacy" => config.counting_mode = CountingMode::Legacy,
                "idempotent" => config.counting_mode = CountingMode::Idempotent,
                _ => {}
            }
        }

        if let Some(secs) = env_parse::<u64>("OMNISWEEP_OPERATION_DEADLINE_SECS") {
            config.operation_deadline = Duration::from_secs(secs);
        }

        // "2=0xabc..,3=0xdef.."
        if let Ok(remotes) = std::env::var("OMNISWEEP_REMOTES") {
            for entry in remotes.split(',').filter(|e| !e.trim().is_empty()) {
                if let Some((domain, address)) = entry.split_once('=') {
                    if let (Ok(domain), Ok(address)) =
                        (domain.trim().parse::<u32>(), address.trim().parse::<Address>())
                    {
                        config.remotes.insert(DomainId::new(domain), address);
                    }
                }
            }
        }

        config
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read {}: {}", path.as_ref().display(), e))?;
        serde_json::from_str(&raw).map_err(|e| format!("Invalid configuration JSON: {}", e))
    }

    /// Add a remote domain to the allow-list.
    pub fn with_remote(mut self, domain: DomainId, worker: Address) -> Self {
        self.remotes.insert(domain, worker);
        self
    }

    /// Whether the final receiver lives on this coordinator's domain.
    pub fn receiver_is_local(&self) -> bool {
        self.final_receiver_domain.is_local_sentinel()
            || self.final_receiver_domain == self.self_domain
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.self_domain.is_local_sentinel() {
            return Err("Self domain cannot be the local sentinel".to_string());
        }

        if self.coordinator_address.is_zero() {
            return Err("Coordinator address cannot be zero".to_string());
        }

        if self.admin.is_zero() {
            return Err("Admin address cannot be zero".to_string());
        }

        if self.final_receiver.is_zero() {
            return Err("Final receiver cannot be zero".to_string());
        }

        for (domain, worker) in &self.remotes {
            if *domain == self.self_domain || domain.is_local_sentinel() {
                return Err(format!("Remote allow-list cannot contain {}", domain));
            }
            if worker.is_zero() {
                return Err(format!("Remote worker for {} cannot be zero", domain));
            }
        }

        if self.operation_deadline < constants::min_operation_deadline().as_std() {
            return Err("Operation deadline is below the minimum".to_string());
        }

        if self.deadline_scan_interval.is_zero() {
            return Err("Deadline scan interval cannot be 0".to_string());
        }

        if !self.receiver_is_local() {
            self.bridge.validate(self.self_domain)?;
        }

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
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.receiver_is_local());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CoordinatorConfig::default();
        config.admin = Address::ZERO;
        assert!(config.validate().is_err());

        let config =
            CoordinatorConfig::default().with_remote(DomainId::new(1), Address::from_label("w"));
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.operation_deadline = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_receiver_needs_bridge_flavor() {
        let mut config = CoordinatorConfig::default();
        config.final_receiver_domain = DomainId::new(7);
        config.bridge = BridgeConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_allow_list() {
        let config = CoordinatorConfig::default()
            .with_remote(DomainId::new(2), Address::from_label("worker-2"));
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CoordinatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.remotes, config.remotes);
        assert_eq!(parsed.counting_mode, CountingMode::Idempotent);
    }
}
