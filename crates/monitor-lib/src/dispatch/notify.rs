use super::{DispatchConfig, DispatchOutcome, JobSubmitter};
use crate::health::HealthRegistry;
use crate::models::{AnomalyEvent, NotifyJob};
use crate::observability::MonitorMetrics;
use crate::queue::{JobQueue, JobType};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Submits anomaly notifications, one per metric per cooldown window
pub struct NotifyDispatcher {
    submitter: JobSubmitter,
    cooldown_secs: i64,
    metrics: MonitorMetrics,
}

impl NotifyDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, config: &DispatchConfig, cooldown: Duration) -> Self {
        Self {
            submitter: JobSubmitter::new(queue, JobType::Notify, config),
            cooldown_secs: (cooldown.as_secs() as i64).max(1),
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.submitter.health = Some(health);
        self
    }

    pub fn dedup_key(event: &AnomalyEvent, cooldown_epoch: i64) -> String {
        format!("{}:{}:{}", event.machine_id, event.metric_name, cooldown_epoch)
    }

    pub async fn notify(&self, event: &AnomalyEvent) -> DispatchOutcome {
        let cooldown_epoch = event.timestamp.div_euclid(self.cooldown_secs);
        let dedup_key = Self::dedup_key(event, cooldown_epoch);
        let job = NotifyJob {
            machine_id: event.machine_id.clone(),
            dedup_key: dedup_key.clone(),
            payload: event.clone(),
            enqueued_at: chrono::Utc::now().timestamp(),
        };

        let submitted = match serde_json::to_value(&job) {
            Ok(payload) => self.submitter.submit(payload, &dedup_key).await,
            Err(e) => Err(format!("failed to encode notify job: {}", e)),
        };

        let outcome = match submitted {
            Ok(outcome) => outcome,
            Err(reason) => {
                // Local record so the anomaly is not lost entirely
                warn!(
                    event = "anomaly_recorded_locally",
                    machine_id = %event.machine_id,
                    metric = %event.metric_name,
                    severity = %event.severity,
                    observed = event.observed_value,
                    expected_low = event.expected_range.low,
                    expected_high = event.expected_range.high,
                    z_score = event.z_score,
                    timestamp = event.timestamp,
                    reason = %reason,
                    "Notification queue unavailable, anomaly logged only"
                );
                DispatchOutcome::Degraded
            }
        };

        self.metrics.inc_notify_jobs(outcome.as_str());
        outcome
    }

    pub fn close(&self) {
        self.submitter.close();
    }

    pub fn is_closed(&self) -> bool {
        self.submitter.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExpectedRange, MetricName, Severity};
    use crate::queue::ChannelJobQueue;

    fn event(ts: i64) -> AnomalyEvent {
        AnomalyEvent {
            machine_id: "m".into(),
            timestamp: ts,
            metric_name: MetricName::CpuPct,
            observed_value: 97.0,
            expected_range: ExpectedRange {
                low: 10.0,
                high: 30.0,
            },
            severity: Severity::Critical,
            z_score: 8.1,
        }
    }

    #[tokio::test]
    async fn test_dedup_within_cooldown_epoch() {
        let (queue, mut rx) = ChannelJobQueue::new(8);
        let dispatcher = NotifyDispatcher::new(
            Arc::new(queue),
            &DispatchConfig::default(),
            Duration::from_secs(60),
        );

        assert_eq!(dispatcher.notify(&event(120)).await, DispatchOutcome::Enqueued);
        assert_eq!(dispatcher.notify(&event(150)).await, DispatchOutcome::Duplicate);
        assert_eq!(dispatcher.notify(&event(180)).await, DispatchOutcome::Enqueued);

        let job: NotifyJob = serde_json::from_value(rx.notify.recv().await.unwrap().payload).unwrap();
        assert_eq!(job.dedup_key, "m:cpu_pct:2");
        assert_eq!(job.payload, event(120));
    }

    #[tokio::test]
    async fn test_closed_queue_falls_back_to_log() {
        let (queue, rx) = ChannelJobQueue::new(1);
        drop(rx);
        let dispatcher = NotifyDispatcher::new(
            Arc::new(queue),
            &DispatchConfig::default(),
            Duration::from_secs(60),
        );

        assert_eq!(dispatcher.notify(&event(0)).await, DispatchOutcome::Degraded);
    }
}
