//! Observability infrastructure for the monitor
//!
//! Provides:
//! - Prometheus metrics (tick latency, current intervals, failures, dispatch outcomes)
//! - Structured JSON logging of named events with tracing

use crate::models::{AnomalyEvent, Severity, TrendDirection};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    tick_latency_seconds: Histogram,
    current_interval_seconds: GaugeVec,
    sample_failures: IntCounter,
    store_failures: IntCounter,
    retrain_jobs: IntCounterVec,
    notify_jobs: IntCounterVec,
    anomalies_detected: IntCounterVec,
    model_swaps: IntCounter,
    machines_monitored: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "adaptive_monitor_tick_latency_seconds",
                "Time spent in one sample-evaluate-adjust tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            current_interval_seconds: register_gauge_vec!(
                "adaptive_monitor_current_interval_seconds",
                "Current sampling interval per machine",
                &["machine_id"]
            )
            .expect("Failed to register current_interval_seconds"),

            sample_failures: register_int_counter!(
                "adaptive_monitor_sample_failures_total",
                "Failed or timed out metric reads"
            )
            .expect("Failed to register sample_failures"),

            store_failures: register_int_counter!(
                "adaptive_monitor_store_failures_total",
                "Samples that could not be persisted"
            )
            .expect("Failed to register store_failures"),

            retrain_jobs: register_int_counter_vec!(
                "adaptive_monitor_retrain_jobs_total",
                "Retrain dispatch attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register retrain_jobs"),

            notify_jobs: register_int_counter_vec!(
                "adaptive_monitor_notify_jobs_total",
                "Notify dispatch attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register notify_jobs"),

            anomalies_detected: register_int_counter_vec!(
                "adaptive_monitor_anomalies_detected_total",
                "Anomalies admitted past cooldown",
                &["severity"]
            )
            .expect("Failed to register anomalies_detected"),

            model_swaps: register_int_counter!(
                "adaptive_monitor_model_swaps_total",
                "Trend models installed by the retrain worker"
            )
            .expect("Failed to register model_swaps"),

            machines_monitored: register_int_gauge!(
                "adaptive_monitor_machines_monitored",
                "Number of machine loops currently running"
            )
            .expect("Failed to register machines_monitored"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn set_current_interval(&self, machine_id: &str, interval_secs: f64) {
        self.inner()
            .current_interval_seconds
            .with_label_values(&[machine_id])
            .set(interval_secs);
    }

    pub fn inc_sample_failures(&self) {
        self.inner().sample_failures.inc();
    }

    pub fn inc_store_failures(&self) {
        self.inner().store_failures.inc();
    }

    /// `outcome` is one of enqueued, duplicate, degraded, suppressed
    pub fn inc_retrain_jobs(&self, outcome: &str) {
        self.inner().retrain_jobs.with_label_values(&[outcome]).inc();
    }

    pub fn inc_notify_jobs(&self, outcome: &str) {
        self.inner().notify_jobs.with_label_values(&[outcome]).inc();
    }

    pub fn inc_anomalies_detected(&self, severity: Severity) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[&severity.to_string()])
            .inc();
    }

    pub fn inc_model_swaps(&self) {
        self.inner().model_swaps.inc();
    }

    pub fn inc_machines_monitored(&self) {
        self.inner().machines_monitored.inc();
    }

    pub fn dec_machines_monitored(&self) {
        self.inner().machines_monitored.dec();
    }
}

/// Structured logger for monitor events
///
/// Every line carries `event` so log pipelines can route on it.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, machines: usize, queue: &str) {
        info!(
            event = "monitor_started",
            node = %self.node_name,
            monitor_version = %version,
            machines = machines,
            job_queue = %queue,
            "Adaptive monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Adaptive monitor shutting down"
        );
    }

    /// Only logged when the interval actually moved
    pub fn log_interval_change(
        &self,
        machine_id: &str,
        old_interval: f64,
        new_interval: f64,
        direction: TrendDirection,
        delta: f64,
    ) {
        info!(
            event = "interval_changed",
            node = %self.node_name,
            machine_id = %machine_id,
            old_interval_secs = old_interval,
            new_interval_secs = new_interval,
            trend = %direction,
            recommended_delta = delta,
            "Sampling interval adjusted"
        );
    }

    pub fn log_anomaly(&self, event: &AnomalyEvent) {
        match event.severity {
            Severity::Critical => {
                warn!(
                    event = "anomaly_detected",
                    node = %self.node_name,
                    machine_id = %event.machine_id,
                    metric = %event.metric_name,
                    severity = %event.severity,
                    observed = event.observed_value,
                    expected_low = event.expected_range.low,
                    expected_high = event.expected_range.high,
                    z_score = event.z_score,
                    "Critical anomaly detected"
                );
            }
            Severity::Major => {
                info!(
                    event = "anomaly_detected",
                    node = %self.node_name,
                    machine_id = %event.machine_id,
                    metric = %event.metric_name,
                    severity = %event.severity,
                    observed = event.observed_value,
                    expected_low = event.expected_range.low,
                    expected_high = event.expected_range.high,
                    z_score = event.z_score,
                    "Anomaly detected"
                );
            }
        }
    }

    pub fn log_retrain_dispatched(&self, machine_id: &str, epoch: u64, dedup_key: &str) {
        info!(
            event = "retrain_dispatched",
            node = %self.node_name,
            machine_id = %machine_id,
            epoch = epoch,
            dedup_key = %dedup_key,
            "Retrain job enqueued"
        );
    }

    /// A dependency failed and work continues without it
    pub fn log_degraded(&self, component: &str, machine_id: &str, reason: &str) {
        warn!(
            event = "degraded_mode",
            node = %self.node_name,
            component = %component,
            machine_id = %machine_id,
            reason = %reason,
            "Continuing in degraded mode"
        );
    }

    pub fn log_model_swap(&self, machine_id: &str, samples: usize, slope: f64, r_squared: f64) {
        info!(
            event = "model_swapped",
            node = %self.node_name,
            machine_id = %machine_id,
            samples = samples,
            slope = slope,
            r_squared = r_squared,
            "Trend model replaced"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_creation() {
        // Handles share the global registry, so creating several is fine
        let metrics = MonitorMetrics::new();
        let other = MonitorMetrics::new();

        metrics.observe_tick_latency(0.002);
        metrics.set_current_interval("m", 240.0);
        metrics.inc_sample_failures();
        metrics.inc_retrain_jobs("enqueued");
        other.inc_notify_jobs("degraded");
        other.inc_anomalies_detected(Severity::Critical);
        other.inc_model_swaps();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "adaptive_monitor_current_interval_seconds"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name, "test-node");
    }
}
