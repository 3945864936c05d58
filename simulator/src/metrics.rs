//! Simulation metrics.

use std::collections::VecDeque;

use omnisweep_common::{OperationStatus, Result};
use omnisweep_protocol::InboundOutcome;

/// Run-level counters kept by the simulator.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Scenarios run.
    pub operations_run: u64,
    pub operations_finalized: u64,
    pub operations_partially_settled: u64,
    /// Operations left open when their scenario ended.
    pub operations_open: u64,
    /// Messages handed to a handler.
    pub messages_delivered: u64,
    /// Extra copies queued by the simulated network.
    pub duplicates_injected: u64,
    pub deliveries_processed: u64,
    pub deliveries_duplicate: u64,
    pub deliveries_failed: u64,
    /// Deliveries each operation needed before its scenario ended.
    delivery_samples: VecDeque<u64>,
    max_samples: usize,
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self {
            operations_run: 0,
            operations_finalized: 0,
            operations_partially_settled: 0,
            operations_open: 0,
            messages_delivered: 0,
            duplicates_injected: 0,
            deliveries_processed: 0,
            deliveries_duplicate: 0,
            deliveries_failed: 0,
            delivery_samples: VecDeque::with_capacity(1024),
            max_samples: 1024,
        }
    }

    /// Record one delivery and what the handler made of it.
    pub fn record_delivery(&mut self, outcome: &Result<InboundOutcome>) {
        self.messages_delivered += 1;
        match outcome {
            Ok(InboundOutcome::Processed) => self.deliveries_processed += 1,
            Ok(InboundOutcome::Duplicate) => self.deliveries_duplicate += 1,
            Err(_) => self.deliveries_failed += 1,
        }
    }

    pub fn record_duplicate_injected(&mut self) {
        self.duplicates_injected += 1;
    }

    /// Record how an operation ended and the deliveries it took.
    pub fn record_operation(&mut self, status: OperationStatus, deliveries: u64) {
        self.operations_run += 1;
        match status {
            OperationStatus::Finalized => self.operations_finalized += 1,
            OperationStatus::PartiallySettled => self.operations_partially_settled += 1,
            OperationStatus::AwaitingCompletions => self.operations_open += 1,
            OperationStatus::Aborted => {}
        }

        if self.delivery_samples.len() >= self.max_samples {
            self.delivery_samples.pop_front();
        }
        self.delivery_samples.push_back(deliveries);
    }

    /// Average deliveries per operation.
    pub fn average_deliveries(&self) -> u64 {
        if self.delivery_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.delivery_samples.iter().sum();
        sum / self.delivery_samples.len() as u64
    }

    pub fn p99_deliveries(&self) -> u64 {
        self.percentile_deliveries(99)
    }

    fn percentile_deliveries(&self, percentile: usize) -> u64 {
        if self.delivery_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.delivery_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Share of operations that finalized.
    pub fn finalize_rate(&self) -> f64 {
        if self.operations_run == 0 {
            return 0.0;
        }

        self.operations_finalized as f64 / self.operations_run as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisweep_common::SweepError;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_delivery(&Ok(InboundOutcome::Processed));
        metrics.record_delivery(&Ok(InboundOutcome::Duplicate));
        metrics.record_delivery(&Err(SweepError::NoInstructions));
        metrics.record_operation(OperationStatus::Finalized, 2);
        metrics.record_operation(OperationStatus::Finalized, 4);
        metrics.record_operation(OperationStatus::PartiallySettled, 3);
        metrics.record_operation(OperationStatus::AwaitingCompletions, 1);

        assert_eq!(metrics.messages_delivered, 3);
        assert_eq!(metrics.deliveries_processed, 1);
        assert_eq!(metrics.deliveries_duplicate, 1);
        assert_eq!(metrics.deliveries_failed, 1);
        assert_eq!(metrics.operations_run, 4);
        assert_eq!(metrics.operations_open, 1);
        assert_eq!(metrics.average_deliveries(), 2);
        assert_eq!(metrics.p99_deliveries(), 4);
        assert_eq!(metrics.finalize_rate(), 0.5);
    }
}
