use crate::error::{MonitorError, MonitorResult};
use crate::forecast::TrendForecaster;
use crate::health::{Component, DegradedReason, HealthRegistry};
use crate::models::RetrainJob;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::queue::QueuedJob;
use crate::store::MetricStore;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Fits fresh trend models off the sampling path
pub struct RetrainWorker {
    jobs: mpsc::Receiver<QueuedJob>,
    store: Arc<dyn MetricStore>,
    forecaster: Arc<TrendForecaster>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl RetrainWorker {
    pub fn new(
        jobs: mpsc::Receiver<QueuedJob>,
        store: Arc<dyn MetricStore>,
        forecaster: Arc<TrendForecaster>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            jobs,
            store,
            forecaster,
            metrics: MonitorMetrics::new(),
            logger,
            health: None,
        }
    }

    /// Report fit failures on the `forecaster` component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Process jobs until shutdown or until every sender is gone.
    /// A job already being processed is finished first.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting retrain worker");
        loop {
            tokio::select! {
                job = self.jobs.recv() => {
                    let Some(job) = job else {
                        debug!("Retrain queue closed");
                        break;
                    };
                    let machine_id = job
                        .payload
                        .get("machine_id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    match self.process(job).await {
                        Ok(_) => {
                            if let Some(health) = &self.health {
                                health.set_healthy(Component::Forecaster).await;
                            }
                        }
                        Err(e) => {
                            warn!(machine_id = ?machine_id, error = %e, "Retrain job failed");
                            if let Some(health) = &self.health {
                                let reason = DegradedReason::ModelFitFailed {
                                    machine_id,
                                    error: e.to_string(),
                                };
                                health.set_degraded(Component::Forecaster, reason).await;
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down retrain worker");
                    break;
                }
            }
        }
    }

    /// Handle one job; returns whether a new model was installed
    pub async fn process(&self, job: QueuedJob) -> MonitorResult<bool> {
        let job: RetrainJob = serde_json::from_value(job.payload)
            .map_err(|e| MonitorError::ModelFit {
                machine_id: "unknown".into(),
                reason: format!("malformed retrain job: {}", e),
            })?;

        let history = self
            .store
            .history(&job.machine_id, job.payload.history.since)
            .await?;

        let forecaster = Arc::clone(&self.forecaster);
        let machine_id = job.machine_id.clone();
        let fitted = tokio::task::spawn_blocking(move || forecaster.retrain(&machine_id, &history))
            .await
            .map_err(|e| MonitorError::ModelFit {
                machine_id: job.machine_id.clone(),
                reason: format!("fit task failed: {}", e),
            })??;

        match fitted {
            Some(fit) => {
                self.metrics.inc_model_swaps();
                self.logger
                    .log_model_swap(&fit.machine_id, fit.samples, fit.slope, fit.r_squared);
                Ok(true)
            }
            None => {
                debug!(
                    machine_id = %job.machine_id,
                    epoch = job.payload.epoch,
                    "Retrain skipped, not enough history"
                );
                Ok(false)
            }
        }
    }
}
