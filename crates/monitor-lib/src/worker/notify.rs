use crate::anomaly::render_report;
use crate::error::{MonitorError, MonitorResult};
use crate::forecast::{robust_baselines, BASELINE_WINDOW};
use crate::models::NotifyJob;
use crate::queue::QueuedJob;
use crate::store::MetricStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use async_trait::async_trait;

/// Delivery transport for rendered anomaly reports
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, subject: &str, body: &str) -> MonitorResult<()>;
}

/// Channel that writes reports to the log
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, subject: &str, body: &str) -> MonitorResult<()> {
        info!(subject = %subject, report = %body, "Anomaly notification");
        Ok(())
    }
}

/// Renders anomaly reports and hands them to a channel
pub struct NotifyWorker {
    jobs: mpsc::Receiver<QueuedJob>,
    store: Arc<dyn MetricStore>,
    channel: Arc<dyn NotificationChannel>,
    max_retries: u32,
    base_delay: Duration,
    /// How much history the report's normal ranges are computed over
    report_lookback_secs: i64,
}

impl NotifyWorker {
    pub fn new(
        jobs: mpsc::Receiver<QueuedJob>,
        store: Arc<dyn MetricStore>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            jobs,
            store,
            channel,
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            report_lookback_secs: 6 * 60 * 60,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(channel = %self.channel.name(), "Starting notify worker");
        loop {
            tokio::select! {
                job = self.jobs.recv() => {
                    let Some(job) = job else {
                        debug!("Notify queue closed");
                        break;
                    };
                    if let Err(e) = self.process(job).await {
                        warn!(error = %e, "Notify job failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down notify worker");
                    break;
                }
            }
        }
    }

    pub async fn process(&self, job: QueuedJob) -> MonitorResult<()> {
        let job: NotifyJob = serde_json::from_value(job.payload)
            .map_err(|e| MonitorError::Delivery(format!("malformed notify job: {}", e)))?;
        let event = job.payload;

        // Normal ranges are best effort; the report still goes out without them
        let since = event.timestamp.saturating_sub(self.report_lookback_secs);
        let baselines = match self.store.history(&event.machine_id, since).await {
            Ok(history) => robust_baselines(&history, BASELINE_WINDOW),
            Err(e) => {
                warn!(machine_id = %event.machine_id, error = %e, "No history for report");
                HashMap::new()
            }
        };

        let subject = format!("System anomaly detected: {}", event.machine_id);
        let body = render_report(&event.machine_id, std::slice::from_ref(&event), &baselines);
        self.send_with_retry(&subject, &body).await
    }

    async fn send_with_retry(&self, subject: &str, body: &str) -> MonitorResult<()> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            match self.channel.send(subject, body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.base_delay * 2u32.pow(attempt)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| MonitorError::Delivery("no delivery attempt made".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyEvent, ExpectedRange, MetricName, Severity};
    use crate::queue::JobType;
    use crate::store::InMemoryMetricStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FlakyChannel {
        failures_left: AtomicU32,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FlakyChannel {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationChannel for FlakyChannel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, subject: &str, body: &str) -> MonitorResult<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(MonitorError::Delivery("smtp timeout".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn job() -> QueuedJob {
        let event = AnomalyEvent {
            machine_id: "m".into(),
            timestamp: 1_700_000_000,
            metric_name: MetricName::CpuPct,
            observed_value: 97.0,
            expected_range: ExpectedRange {
                low: 10.0,
                high: 30.0,
            },
            severity: Severity::Critical,
            z_score: 9.4,
        };
        let job = NotifyJob {
            machine_id: "m".into(),
            dedup_key: "m:cpu_pct:28333333".into(),
            payload: event,
            enqueued_at: 1_700_000_000,
        };
        QueuedJob {
            job_type: JobType::Notify,
            dedup_key: job.dedup_key.clone(),
            payload: serde_json::to_value(&job).unwrap(),
        }
    }

    fn worker(channel: Arc<FlakyChannel>) -> NotifyWorker {
        let (_tx, rx) = mpsc::channel(1);
        NotifyWorker::new(rx, Arc::new(InMemoryMetricStore::default()), channel)
            .with_retries(2, Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_delivered_after_retries() {
        let channel = Arc::new(FlakyChannel::new(2));
        worker(channel.clone()).process(job()).await.unwrap();

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "System anomaly detected: m");
        assert!(sent[0].1.contains("CRITICAL ANOMALIES"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_gives_up() {
        let channel = Arc::new(FlakyChannel::new(10));
        let result = worker(channel.clone()).process(job()).await;
        assert!(matches!(result, Err(MonitorError::Delivery(_))));
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_channel() {
        assert!(LogChannel.send("s", "b").await.is_ok());
        assert_eq!(LogChannel.name(), "log");
    }
}
