//! Error taxonomy for the monitoring core
//!
//! Every per-tick failure is contained inside the tick that produced it;
//! only `ConfigInvalid` is fatal, and only at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Sample read failed or timed out; retried by the scheduler
    #[error("metric source failure for {machine_id}: {reason}")]
    TransientSourceFailure { machine_id: String, reason: String },

    /// Sample could not be persisted; the sample is dropped
    #[error("metric store write failed for {machine_id}: {reason}")]
    StoreWriteFailure { machine_id: String, reason: String },

    /// Job queue rejected or could not be reached
    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("model fit failed for {machine_id}: {reason}")]
    ModelFit { machine_id: String, reason: String },

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

impl MonitorError {
    pub fn source_failure(machine_id: &str, reason: impl ToString) -> Self {
        MonitorError::TransientSourceFailure {
            machine_id: machine_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn store_failure(machine_id: &str, reason: impl ToString) -> Self {
        MonitorError::StoreWriteFailure {
            machine_id: machine_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
