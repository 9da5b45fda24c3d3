//! Metric history storage
//!
//! The document store used in production sits behind `MetricStore`; the
//! in-memory implementation backs single-node deployments and tests.

mod memory;

pub use memory::{InMemoryMetricStore, DEFAULT_RETENTION};

use crate::error::MonitorResult;
use crate::models::MetricSample;

pub use async_trait::async_trait;

/// Append-only, per-machine ordered sample history. Safe for concurrent use.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn append(&self, sample: MetricSample) -> MonitorResult<()>;

    /// Samples for `machine_id` with `timestamp >= since`, oldest first
    async fn history(&self, machine_id: &str, since: i64) -> MonitorResult<Vec<MetricSample>>;
}
