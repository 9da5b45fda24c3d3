//! Metric sources
//!
//! A source produces one `MetricSample` per call. Reads may fail
//! transiently; the scheduler owns retry and timeout policy.

mod system;

pub use system::SystemMetricSource;

use crate::error::MonitorResult;
use crate::models::MetricSample;

pub use async_trait::async_trait;

/// Trait for metric source implementations
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Identifier of the machine this source observes
    fn machine_id(&self) -> &str;

    /// Take one sample
    async fn read(&self) -> MonitorResult<MetricSample>;
}
