use super::{async_trait, Ack, JobQueue, JobType};
use crate::error::MonitorResult;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Queue used when no background tier is configured
///
/// Every job is recorded in the log and acknowledged; nothing runs.
#[derive(Debug, Default)]
pub struct LogOnlyQueue {
    recorded: AtomicU64,
}

impl LogOnlyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl JobQueue for LogOnlyQueue {
    fn name(&self) -> &str {
        "log_only"
    }

    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        dedup_key: &str,
    ) -> MonitorResult<Ack> {
        self.recorded.fetch_add(1, Ordering::Relaxed);
        info!(
            job_type = %job_type,
            dedup_key = %dedup_key,
            payload = %payload,
            "Job recorded (no queue configured)"
        );
        Ok(Ack::Enqueued)
    }
}
