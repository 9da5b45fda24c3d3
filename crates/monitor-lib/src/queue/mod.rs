//! Job queue contract between the sampling loops and the worker tier
//!
//! The core only needs `enqueue` with a dedup key and at-least-once
//! delivery. Two implementations ship:
//! - `ChannelJobQueue`: bounded in-process channels feeding the workers
//! - `LogOnlyQueue`: fallback selected when no queue is configured

mod channel;
mod log_only;

pub use channel::{ChannelJobQueue, JobReceivers, DEFAULT_DEDUP_TTL};
pub use log_only::LogOnlyQueue;

use crate::error::MonitorResult;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Retrain,
    Notify,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Retrain => write!(f, "retrain"),
            JobType::Notify => write!(f, "notify"),
        }
    }
}

/// Queue acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Enqueued,
    /// A job with the same dedup key is already known; nothing was added
    Duplicate,
}

/// A job as the worker tier receives it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_type: JobType,
    pub dedup_key: String,
    pub payload: serde_json::Value,
}

/// Trait for job queue implementations. Safe for concurrent use.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Failure means the job was not accepted and is `QueueUnavailable`
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        dedup_key: &str,
    ) -> MonitorResult<Ack>;
}
