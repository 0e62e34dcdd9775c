//! Prometheus metrics for the relayer.
//!
//! Exposes counters, gauges and a histogram covering scheduling, executor
//! activity and the message pipeline. [`RelayerMetrics`] owns a dedicated
//! [`Registry`]; [`RelayerMetrics::encode_text`] renders it in the
//! Prometheus text exposition format for whatever control plane embeds the
//! relayer.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::NodeError;

/// Central collection of all relayer-level Prometheus metrics.
pub struct RelayerMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Scheduling ──────────────────────────────────────────────────────
    /// Dispatch cycles run while holding the dispatch lock.
    pub dispatch_cycles: IntCounter,
    /// Dispatch ticks skipped because another node held the lock.
    pub dispatch_lock_misses: IntCounter,
    /// Leases (re)assigned by this node's dispatcher.
    pub leases_assigned: IntCounter,
    /// Online nodes seen by the last dispatch cycle.
    pub online_nodes: IntGauge,

    // ── Executors (labelled by task type) ───────────────────────────────
    pub executor_submitted: IntCounterVec,
    /// Skipped because a run for the key was still in flight or the lease expired.
    pub executor_skipped: IntCounterVec,
    pub executor_failed: IntCounterVec,
    pub executions_in_flight: IntGauge,
    pub task_duration_ms: Histogram,

    // ── Pipeline ────────────────────────────────────────────────────────
    pub am_received: IntCounter,
    pub ucp_received: IntCounter,
    pub sdp_created: IntCounter,
    pub sdp_committed: IntCounter,
    pub sdp_commit_failed: IntCounter,
    /// Confirmed receipts applied, labelled `success` / `failure`.
    pub sdp_confirmed: IntCounterVec,
    /// Rows moved to the archive, labelled by pool.
    pub rows_archived: IntCounterVec,
}

impl RelayerMetrics {
    /// Create a fresh set of metrics, all registered under a new [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_cycles = register_int_counter_with_registry!(
            Opts::new("xrelay_dispatch_cycles_total", "Dispatch cycles run by this node"),
            registry
        )
        .expect("failed to register dispatch_cycles counter");

        let dispatch_lock_misses = register_int_counter_with_registry!(
            Opts::new(
                "xrelay_dispatch_lock_misses_total",
                "Dispatch ticks skipped because the lock was held elsewhere"
            ),
            registry
        )
        .expect("failed to register dispatch_lock_misses counter");

        let leases_assigned = register_int_counter_with_registry!(
            Opts::new("xrelay_leases_assigned_total", "Leases assigned by this node"),
            registry
        )
        .expect("failed to register leases_assigned counter");

        let online_nodes = register_int_gauge_with_registry!(
            Opts::new("xrelay_online_nodes", "Online nodes seen by the last dispatch"),
            registry
        )
        .expect("failed to register online_nodes gauge");

        let executor_submitted = register_int_counter_vec_with_registry!(
            Opts::new("xrelay_executor_submitted_total", "Task runs submitted"),
            &["task"],
            registry
        )
        .expect("failed to register executor_submitted counter");

        let executor_skipped = register_int_counter_vec_with_registry!(
            Opts::new("xrelay_executor_skipped_total", "Task runs skipped"),
            &["task"],
            registry
        )
        .expect("failed to register executor_skipped counter");

        let executor_failed = register_int_counter_vec_with_registry!(
            Opts::new("xrelay_executor_failed_total", "Task runs that failed"),
            &["task"],
            registry
        )
        .expect("failed to register executor_failed counter");

        let executions_in_flight = register_int_gauge_with_registry!(
            Opts::new("xrelay_executions_in_flight", "Task runs currently executing"),
            registry
        )
        .expect("failed to register executions_in_flight gauge");

        // 1 ms → ~16 s.
        let task_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new("xrelay_task_duration_ms", "Task run time in milliseconds")
                .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register task_duration_ms histogram");

        let am_received = register_int_counter_with_registry!(
            Opts::new("xrelay_am_received_total", "Authenticated messages ingested"),
            registry
        )
        .expect("failed to register am_received counter");

        let ucp_received = register_int_counter_with_registry!(
            Opts::new("xrelay_ucp_received_total", "Uniform cross-chain packets ingested"),
            registry
        )
        .expect("failed to register ucp_received counter");

        let sdp_created = register_int_counter_with_registry!(
            Opts::new("xrelay_sdp_created_total", "SDP messages extracted"),
            registry
        )
        .expect("failed to register sdp_created counter");

        let sdp_committed = register_int_counter_with_registry!(
            Opts::new("xrelay_sdp_committed_total", "SDP messages submitted"),
            registry
        )
        .expect("failed to register sdp_committed counter");

        let sdp_commit_failed = register_int_counter_with_registry!(
            Opts::new(
                "xrelay_sdp_commit_failed_total",
                "SDP submissions rejected synchronously"
            ),
            registry
        )
        .expect("failed to register sdp_commit_failed counter");

        let sdp_confirmed = register_int_counter_vec_with_registry!(
            Opts::new("xrelay_sdp_confirmed_total", "Confirmed receipts applied"),
            &["outcome"],
            registry
        )
        .expect("failed to register sdp_confirmed counter");

        let rows_archived = register_int_counter_vec_with_registry!(
            Opts::new("xrelay_rows_archived_total", "Rows moved to the archive"),
            &["pool"],
            registry
        )
        .expect("failed to register rows_archived counter");

        Self {
            registry,
            dispatch_cycles,
            dispatch_lock_misses,
            leases_assigned,
            online_nodes,
            executor_submitted,
            executor_skipped,
            executor_failed,
            executions_in_flight,
            task_duration_ms,
            am_received,
            ucp_received,
            sdp_created,
            sdp_committed,
            sdp_commit_failed,
            sdp_confirmed,
            rows_archived,
        }
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, NodeError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| NodeError::Other(format!("metrics encoding failed: {e}")))?;
        String::from_utf8(buf).map_err(|e| NodeError::Other(e.to_string()))
    }
}

impl Default for RelayerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_metrics() {
        let metrics = RelayerMetrics::new();
        metrics.dispatch_cycles.inc();
        metrics.executor_submitted.with_label_values(&["COMMIT_TASK"]).inc();
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("xrelay_dispatch_cycles_total 1"));
        assert!(text.contains("xrelay_executor_submitted_total{task=\"COMMIT_TASK\"} 1"));
    }
}
