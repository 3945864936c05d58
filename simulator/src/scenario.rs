//! Simulation scenarios.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use omnisweep_common::{OperationStatus, Value};

/// A named end-to-end sweep scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Only the origin domain is listed.
    LocalOnly,
    /// Origin plus every remote, clean delivery.
    Mixed,
    /// Every message is delivered twice.
    DuplicateDelivery,
    /// One remote never hears about the operation.
    StalledDomain,
    /// One remote's venue rejects its swap.
    AdapterFailure,
    /// Final balance goes through the privacy hook.
    Privacy,
}

impl Scenario {
    pub fn all() -> [Scenario; 6] {
        [
            Scenario::LocalOnly,
            Scenario::Mixed,
            Scenario::DuplicateDelivery,
            Scenario::StalledDomain,
            Scenario::AdapterFailure,
            Scenario::Privacy,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::LocalOnly => "local-only",
            Scenario::Mixed => "mixed",
            Scenario::DuplicateDelivery => "duplicate-delivery",
            Scenario::StalledDomain => "stalled-domain",
            Scenario::AdapterFailure => "adapter-failure",
            Scenario::Privacy => "privacy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::LocalOnly => "Sweep the origin domain only; finalizes inside start",
            Scenario::Mixed => "Sweep the origin and every remote over a clean network",
            Scenario::DuplicateDelivery => "Every dispatch and notice is delivered twice",
            Scenario::StalledDomain => {
                "One dispatch is lost; the operator settles what arrived after the deadline"
            }
            Scenario::AdapterFailure => {
                "One remote's venue fails, then recovers on redelivery of its dispatch"
            }
            Scenario::Privacy => "Sweep everything and shield the final balance",
        }
    }

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        Self::all()
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| anyhow::anyhow!("Unknown scenario: {}", name))
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub operation_id: String,
    pub status: OperationStatus,
    pub total_domains: u32,
    pub completed_domains: u32,
    /// Completed count reported by `start_operation` itself.
    pub completed_at_start: u32,
    /// Value the listed domains would produce if every one reported.
    pub expected_value: Value,
    /// Value that reached the final receiver during this run.
    pub delivered_value: Value,
    /// Value handed to the privacy hook during this run.
    pub shielded_value: Value,
    pub dispatches: usize,
    pub notices: usize,
    /// Finalize executions during this run.
    pub finalize_count: u64,
    pub deliveries: u64,
    pub notes: Vec<String>,
}

impl ScenarioReport {
    /// Whether every listed domain's value reached its destination.
    pub fn fully_settled(&self) -> bool {
        self.status == OperationStatus::Finalized
            && self.delivered_value + self.shielded_value == self.expected_value
    }
}
