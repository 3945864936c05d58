//! Metrics collection for coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coordinator metrics.
#[derive(Default)]
pub struct Metrics {
    /// Operations started.
    pub operations_started: AtomicU64,
    /// Operations finalized after every domain reported.
    pub operations_finalized: AtomicU64,
    /// Operations aborted by the operator or by a failed dispatch.
    pub operations_aborted: AtomicU64,
    /// Operations partially settled after their deadline.
    pub operations_partially_settled: AtomicU64,
    /// Operations seen past their deadline by the watch.
    pub operations_expired: AtomicU64,
    /// Open operations.
    pub operations_open: AtomicU64,
    /// Completion notices that advanced a counter.
    pub notices_accepted: AtomicU64,
    /// Redelivered notices acknowledged without effect.
    pub notices_duplicate: AtomicU64,
    /// Notices rejected (unauthorized, malformed, closed operation).
    pub notices_rejected: AtomicU64,
    /// Dispatch requests sent.
    pub dispatches_sent: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_started(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
        self.operations_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn operation_finalized(&self) {
        self.operations_finalized.fetch_add(1, Ordering::Relaxed);
        self.operations_open.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn operation_aborted(&self) {
        self.operations_aborted.fetch_add(1, Ordering::Relaxed);
        self.operations_open.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn operation_partially_settled(&self) {
        self.operations_partially_settled.fetch_add(1, Ordering::Relaxed);
        self.operations_open.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn operation_expired(&self) {
        self.operations_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notice_accepted(&self) {
        self.notices_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notice_duplicate(&self) {
        self.notices_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notice_rejected(&self) {
        self.notices_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_sent(&self) {
        self.dispatches_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_started: self.operations_started.load(Ordering::Relaxed),
            operations_finalized: self.operations_finalized.load(Ordering::Relaxed),
            operations_aborted: self.operations_aborted.load(Ordering::Relaxed),
            operations_partially_settled: self
                .operations_partially_settled
                .load(Ordering::Relaxed),
            operations_expired: self.operations_expired.load(Ordering::Relaxed),
            operations_open: self.operations_open.load(Ordering::Relaxed),
            notices_accepted: self.notices_accepted.load(Ordering::Relaxed),
            notices_duplicate: self.notices_duplicate.load(Ordering::Relaxed),
            notices_rejected: self.notices_rejected.load(Ordering::Relaxed),
            dispatches_sent: self.dispatches_sent.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let series: [(&str, &str, &str, u64); 10] = [
            (
                "operations_started",
                "counter",
                "Total operations started",
                snapshot.operations_started,
            ),
            (
                "operations_finalized",
                "counter",
                "Total operations finalized",
                snapshot.operations_finalized,
            ),
            (
                "operations_aborted",
                "counter",
                "Total operations aborted",
                snapshot.operations_aborted,
            ),
            (
                "operations_partially_settled",
                "counter",
                "Total operations partially settled after deadline",
                snapshot.operations_partially_settled,
            ),
            (
                "operations_expired",
                "counter",
                "Operations observed past deadline",
                snapshot.operations_expired,
            ),
            (
                "operations_open",
                "gauge",
                "Operations awaiting completions",
                snapshot.operations_open,
            ),
            (
                "notices_accepted",
                "counter",
                "Completion notices counted",
                snapshot.notices_accepted,
            ),
            (
                "notices_duplicate",
                "counter",
                "Duplicate completion notices",
                snapshot.notices_duplicate,
            ),
            ("notices_rejected", "counter", "Rejected inbound messages", snapshot.notices_rejected),
            ("dispatches_sent", "counter", "Dispatch requests sent", snapshot.dispatches_sent),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in series {
            out.push_str(&format!("# HELP omnisweep_{name} {help}\n"));
            out.push_str(&format!("# TYPE omnisweep_{name} {kind}\n"));
            out.push_str(&format!("omnisweep_{name} {value}\n\n"));
        }
        out
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub operations_started: u64,
    pub operations_finalized: u64,
    pub operations_aborted: u64,
    pub operations_partially_settled: u64,
    pub operations_expired: u64,
    pub operations_open: u64,
    pub notices_accepted: u64,
    pub notices_duplicate: u64,
    pub notices_rejected: u64,
    pub dispatches_sent: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.operation_started();
        metrics.operation_started();
        metrics.operation_finalized();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations_started, 2);
        assert_eq!(snapshot.operations_finalized, 1);
        assert_eq!(snapshot.operations_open, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.operation_started();
        metrics.notice_duplicate();

        let output = metrics.to_prometheus();
        assert!(output.contains("omnisweep_operations_started 1"));
        assert!(output.contains("# TYPE omnisweep_operations_open gauge"));
        assert!(output.contains("omnisweep_notices_duplicate 1"));
    }
}
