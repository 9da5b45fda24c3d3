use super::{async_trait, Ack, JobQueue, JobType, QueuedJob};
use crate::error::{MonitorError, MonitorResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::debug;

/// How long a dedup key is remembered
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(60 * 60);

/// Consumer ends of a `ChannelJobQueue`
pub struct JobReceivers {
    pub retrain: mpsc::Receiver<QueuedJob>,
    pub notify: mpsc::Receiver<QueuedJob>,
}

/// Bounded in-process queue with dedup
///
/// Enqueue never waits: a full channel is reported as unavailable so the
/// caller can degrade instead of stalling its loop.
pub struct ChannelJobQueue {
    retrain_tx: mpsc::Sender<QueuedJob>,
    notify_tx: mpsc::Sender<QueuedJob>,
    /// dedup key -> first seen
    seen: DashMap<String, Instant>,
    dedup_ttl: Duration,
}

impl ChannelJobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceivers) {
        let (retrain_tx, retrain) = mpsc::channel(capacity.max(1));
        let (notify_tx, notify) = mpsc::channel(capacity.max(1));
        (
            Self {
                retrain_tx,
                notify_tx,
                seen: DashMap::new(),
                dedup_ttl: DEFAULT_DEDUP_TTL,
            },
            JobReceivers { retrain, notify },
        )
    }

    pub fn with_dedup_ttl(mut self, ttl: Duration) -> Self {
        self.dedup_ttl = ttl;
        self
    }

    /// Number of dedup keys currently remembered
    pub fn tracked_keys(&self) -> usize {
        self.seen.len()
    }

    fn evict_expired(&self, now: Instant) {
        let ttl = self.dedup_ttl;
        self.seen.retain(|_, first_seen| now.duration_since(*first_seen) < ttl);
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    fn name(&self) -> &str {
        "channel"
    }

    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        dedup_key: &str,
    ) -> MonitorResult<Ack> {
        let now = Instant::now();
        self.evict_expired(now);

        let key = format!("{}:{}", job_type, dedup_key);
        let Entry::Vacant(slot) = self.seen.entry(key) else {
            debug!(job_type = %job_type, dedup_key = %dedup_key, "Duplicate job ignored");
            return Ok(Ack::Duplicate);
        };

        let tx = match job_type {
            JobType::Retrain => &self.retrain_tx,
            JobType::Notify => &self.notify_tx,
        };
        let job = QueuedJob {
            job_type,
            dedup_key: dedup_key.to_string(),
            payload,
        };

        // The key is only remembered once the job is actually accepted
        match tx.try_send(job) {
            Ok(()) => {
                slot.insert(now);
                Ok(Ack::Enqueued)
            }
            Err(TrySendError::Full(_)) => Err(MonitorError::QueueUnavailable(format!(
                "{} queue is full",
                job_type
            ))),
            Err(TrySendError::Closed(_)) => Err(MonitorError::QueueUnavailable(format!(
                "{} queue is closed",
                job_type
            ))),
        }
    }
}
