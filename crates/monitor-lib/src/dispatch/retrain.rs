use super::{DispatchConfig, DispatchOutcome, JobSubmitter};
use crate::health::{Component, HealthRegistry};
use crate::models::{HistoryRef, RetrainJob, RetrainPayload};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::queue::{JobQueue, JobType};
use std::sync::Arc;

/// Submits retrain jobs, at most one per machine per epoch
pub struct RetrainDispatcher {
    submitter: JobSubmitter,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl RetrainDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, config: &DispatchConfig) -> Self {
        Self {
            submitter: JobSubmitter::new(queue, JobType::Retrain, config),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("adaptive-monitor"),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.submitter.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn dedup_key(machine_id: &str, epoch: u64) -> String {
        format!("{}:{}", machine_id, epoch)
    }

    /// Fire-and-forget retrain request. Never fails and never waits for the job.
    pub async fn request_retrain(
        &self,
        machine_id: &str,
        history: HistoryRef,
        epoch: u64,
    ) -> DispatchOutcome {
        let dedup_key = Self::dedup_key(machine_id, epoch);
        let job = RetrainJob {
            machine_id: machine_id.to_string(),
            dedup_key: dedup_key.clone(),
            payload: RetrainPayload { history, epoch },
            enqueued_at: chrono::Utc::now().timestamp(),
        };

        let submitted = match serde_json::to_value(&job) {
            Ok(payload) => self.submitter.submit(payload, &dedup_key).await,
            Err(e) => Err(format!("failed to encode retrain job: {}", e)),
        };

        let outcome = match submitted {
            Ok(outcome) => outcome,
            Err(reason) => {
                // Retraining is an optimization; sampling carries on without it
                self.logger
                    .log_degraded(Component::JobQueue.as_str(), machine_id, &reason);
                DispatchOutcome::Degraded
            }
        };

        if outcome == DispatchOutcome::Enqueued {
            self.logger.log_retrain_dispatched(machine_id, epoch, &dedup_key);
        }
        self.metrics.inc_retrain_jobs(outcome.as_str());
        outcome
    }

    /// Suppress all later requests
    pub fn close(&self) {
        self.submitter.close();
    }

    pub fn is_closed(&self) -> bool {
        self.submitter.is_closed()
    }
}
