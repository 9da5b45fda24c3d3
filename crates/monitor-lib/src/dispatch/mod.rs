//! Job dispatch from the sampling loops to the worker tier
//!
//! `RetrainDispatcher` and `NotifyDispatcher` are thin wrappers over a
//! shared submitter that adds:
//! - a bounded enqueue timeout, so a slow queue never stalls a tick
//! - exponential backoff after queue failures
//! - a closed flag that suppresses new dispatches on shutdown
//!
//! No dispatch failure is ever returned to the caller. The outcome is
//! reported for logging and metrics only.

mod backoff;
mod notify;
mod retrain;

pub use backoff::Backoff;
pub use notify::NotifyDispatcher;
pub use retrain::RetrainDispatcher;

use crate::health::{Component, DegradedReason, HealthRegistry};
use crate::queue::{Ack, JobQueue, JobType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Enqueued,
    /// The queue already holds this dedup key
    Duplicate,
    /// The queue failed or is in backoff; the job was recorded locally
    Degraded,
    /// The dispatcher is closed
    Suppressed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Enqueued => "enqueued",
            DispatchOutcome::Duplicate => "duplicate",
            DispatchOutcome::Degraded => "degraded",
            DispatchOutcome::Suppressed => "suppressed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub enqueue_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enqueue_timeout: Duration::from_millis(500),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

struct JobSubmitter {
    queue: Arc<dyn JobQueue>,
    job_type: JobType,
    enqueue_timeout: Duration,
    backoff: Backoff,
    closed: AtomicBool,
    health: Option<HealthRegistry>,
}

impl JobSubmitter {
    fn new(queue: Arc<dyn JobQueue>, job_type: JobType, config: &DispatchConfig) -> Self {
        Self {
            queue,
            job_type,
            enqueue_timeout: config.enqueue_timeout,
            backoff: Backoff::new(config.backoff_base, config.backoff_max),
            closed: AtomicBool::new(false),
            health: None,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Try to enqueue; on failure returns the reason for the degraded record
    async fn submit(
        &self,
        payload: serde_json::Value,
        dedup_key: &str,
    ) -> Result<DispatchOutcome, String> {
        if self.is_closed() {
            debug!(job_type = %self.job_type, dedup_key = %dedup_key, "Dispatcher closed, job suppressed");
            return Ok(DispatchOutcome::Suppressed);
        }

        if self.backoff.is_backing_off() {
            return Err(format!(
                "{} queue in backoff after {} failures",
                self.queue.name(),
                self.backoff.failures()
            ));
        }

        let attempt = tokio::time::timeout(
            self.enqueue_timeout,
            self.queue.enqueue(self.job_type, payload, dedup_key),
        )
        .await;

        let reason = match attempt {
            Ok(Ok(ack)) => {
                if self.backoff.failures() > 0 {
                    self.backoff.reset();
                    if let Some(health) = &self.health {
                        health.set_healthy(Component::JobQueue).await;
                    }
                }
                return Ok(match ack {
                    Ack::Enqueued => DispatchOutcome::Enqueued,
                    Ack::Duplicate => DispatchOutcome::Duplicate,
                });
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("enqueue timed out after {:?}", self.enqueue_timeout),
        };

        let delay = self.backoff.record_failure();
        warn!(
            job_type = %self.job_type,
            queue = %self.queue.name(),
            error = %reason,
            backoff_ms = delay.as_millis() as u64,
            "Job queue unavailable"
        );
        if let Some(health) = &self.health {
            health
                .set_degraded(
                    Component::JobQueue,
                    DegradedReason::QueueUnavailable {
                        queue: self.queue.name().to_string(),
                        error: reason.clone(),
                    },
                )
                .await;
        }
        Err(reason)
    }
}
