//! Single-tick state transition

use super::{IntervalPolicy, SchedulerConfig, SchedulerPhase};
use crate::anomaly::AnomalyEvaluator;
use crate::dispatch::{DispatchConfig, DispatchOutcome, NotifyDispatcher, RetrainDispatcher};
use crate::error::{MonitorError, MonitorResult};
use crate::forecast::Forecaster;
use crate::health::{Component, DegradedReason, HealthRegistry};
use crate::models::{AnomalyEvent, ForecastResult, HistoryRef, IntervalState, MetricSample};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::queue::{JobQueue, LogOnlyQueue};
use crate::source::MetricSource;
use crate::store::MetricStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// What one tick did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub state: IntervalState,
    /// Whether a sample was read and its store write finished in time
    pub sampled: bool,
    /// Whether the sample reached the store
    pub stored: bool,
    pub forecast: Option<ForecastResult>,
    pub anomalies: Vec<AnomalyEvent>,
    pub retrain: Option<DispatchOutcome>,
}

impl TickReport {
    fn unsampled(state: IntervalState) -> Self {
        Self {
            state,
            sampled: false,
            stored: false,
            forecast: None,
            anomalies: Vec::new(),
            retrain: None,
        }
    }

    /// How long the loop sleeps before the next tick
    pub fn next_wait(&self, config: &SchedulerConfig) -> Duration {
        if self.sampled || self.state.consecutive_failures >= config.degrade_after_failures {
            self.state.interval_duration()
        } else {
            config.failure_backoff
        }
    }
}

/// Per-machine tick engine
///
/// Owns the machine's source; shares the store, forecaster, evaluator
/// and dispatchers with the other machines.
pub struct Scheduler {
    source: Arc<dyn MetricSource>,
    store: Arc<dyn MetricStore>,
    forecaster: Arc<dyn Forecaster>,
    evaluator: Arc<AnomalyEvaluator>,
    retrain: Arc<RetrainDispatcher>,
    notify: Arc<NotifyDispatcher>,
    policy: IntervalPolicy,
    config: SchedulerConfig,
    health: Option<HealthRegistry>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    phase: watch::Sender<SchedulerPhase>,
}

impl Scheduler {
    pub fn machine_id(&self) -> &str {
        self.source.machine_id()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Fresh state at the default interval
    pub fn initial_state(&self) -> IntervalState {
        IntervalState::new(
            self.machine_id(),
            self.config.min_interval_secs,
            self.config.default_interval_secs,
            self.config.max_interval_secs,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.phase.borrow()
    }

    pub(crate) fn set_phase(&self, phase: SchedulerPhase) {
        self.phase.send_replace(phase);
    }

    pub(crate) fn metrics(&self) -> &MonitorMetrics {
        &self.metrics
    }

    pub(crate) fn health(&self) -> Option<&HealthRegistry> {
        self.health.as_ref()
    }

    /// Run one tick. Never fails: every error is contained and reported.
    pub async fn tick(&self, mut state: IntervalState) -> TickReport {
        let start = Instant::now();
        self.set_phase(SchedulerPhase::Sampling);

        let sample = match self.read_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                self.metrics.inc_sample_failures();
                self.record_sample_failure(&mut state, &e).await;
                return TickReport::unsampled(state);
            }
        };

        self.set_phase(SchedulerPhase::Evaluating);

        // A write that hangs counts as a failed read; one the store rejects
        // only costs the sample
        let append = timeout(self.config.store_timeout, self.store.append(sample.clone()));
        let stored = match append.await {
            Ok(Ok(())) => {
                if let Some(health) = &self.health {
                    health.set_healthy(Component::MetricStore).await;
                }
                true
            }
            Ok(Err(e)) => {
                self.metrics.inc_store_failures();
                self.logger.log_degraded(
                    Component::MetricStore.as_str(),
                    &state.machine_id,
                    &e.to_string(),
                );
                if let Some(health) = &self.health {
                    let reason = DegradedReason::StoreWriteFailed {
                        machine_id: state.machine_id.clone(),
                        error: e.to_string(),
                    };
                    health.set_degraded(Component::MetricStore, reason).await;
                }
                false
            }
            Err(_) => {
                let e = MonitorError::store_failure(
                    &sample.machine_id,
                    format!("append timed out after {:?}", self.config.store_timeout),
                );
                self.metrics.inc_store_failures();
                self.record_sample_failure(&mut state, &e).await;
                return TickReport::unsampled(state);
            }
        };

        if state.consecutive_failures >= self.config.degrade_after_failures {
            info!(machine_id = %state.machine_id, "Sampling recovered");
            if let Some(health) = &self.health {
                health.machine_healthy(&state.machine_id).await;
            }
        }
        state.consecutive_failures = 0;

        state.cycle_count += 1;
        state.cycles_since_retrain += 1;

        let history = self.load_history(&sample).await;
        let forecast = self.forecaster.evaluate(&state.machine_id, &history);

        let old_interval = state.current_interval;
        state.current_interval = self.policy.next_interval(&state, &forecast);
        self.check_bounds(&mut state);
        if (state.current_interval - old_interval).abs() > f64::EPSILON {
            self.logger.log_interval_change(
                &state.machine_id,
                old_interval,
                state.current_interval,
                forecast.trend_direction,
                forecast.recommended_interval_delta,
            );
        }
        self.metrics
            .set_current_interval(&state.machine_id, state.current_interval);

        let anomalies = self.evaluator.check_all(&sample, &forecast);
        for event in &anomalies {
            self.logger.log_anomaly(event);
            self.metrics.inc_anomalies_detected(event.severity);
            self.notify.notify(event).await;
        }

        // Periodic freshness, independent of what the forecast said
        let retrain = if self.forecaster.retrain_due(state.cycles_since_retrain) {
            let epoch = state.epoch + 1;
            let history_ref = HistoryRef {
                machine_id: state.machine_id.clone(),
                since: self.config.history_since(sample.timestamp),
            };
            let outcome = self
                .retrain
                .request_retrain(&state.machine_id, history_ref, epoch)
                .await;
            state.epoch = epoch;
            state.cycles_since_retrain = 0;
            Some(outcome)
        } else {
            None
        };

        self.metrics
            .observe_tick_latency(start.elapsed().as_secs_f64());
        debug!(
            machine_id = %state.machine_id,
            cycle = state.cycle_count,
            interval_secs = state.current_interval,
            stored = stored,
            anomalies = anomalies.len(),
            "Tick complete"
        );

        TickReport {
            state,
            sampled: true,
            stored,
            forecast: Some(forecast),
            anomalies,
            retrain,
        }
    }

    async fn read_sample(&self) -> MonitorResult<MetricSample> {
        match timeout(self.config.read_timeout, self.source.read()).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::source_failure(
                self.machine_id(),
                format!("read timed out after {:?}", self.config.read_timeout),
            )),
        }
    }

    /// History ending with `sample`, even if the store lost it
    async fn load_history(&self, sample: &MetricSample) -> Vec<MetricSample> {
        let since = self.config.history_since(sample.timestamp);
        let mut history = match timeout(
            self.config.store_timeout,
            self.store.history(&sample.machine_id, since),
        )
        .await
        {
            Ok(Ok(history)) => history,
            Ok(Err(e)) => {
                warn!(machine_id = %sample.machine_id, error = %e, "Failed to load history");
                Vec::new()
            }
            Err(_) => {
                warn!(machine_id = %sample.machine_id, "History load timed out");
                Vec::new()
            }
        };

        if history
            .last()
            .map_or(true, |last| last.timestamp < sample.timestamp)
        {
            history.push(sample.clone());
        }
        history
    }

    /// Read failures and store timeouts: no cycle is counted, and from
    /// `degrade_after_failures` on the interval is pinned to max
    async fn record_sample_failure(&self, state: &mut IntervalState, error: &MonitorError) {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        warn!(
            machine_id = %state.machine_id,
            error = %error,
            consecutive_failures = state.consecutive_failures,
            "Sample failed"
        );

        if state.consecutive_failures >= self.config.degrade_after_failures {
            state.current_interval = state.max_interval;
            self.metrics
                .set_current_interval(&state.machine_id, state.current_interval);
            if state.consecutive_failures == self.config.degrade_after_failures {
                self.logger.log_degraded(
                    "metric_source",
                    &state.machine_id,
                    "sampling failing, sampling at max interval",
                );
            }
            if let Some(health) = &self.health {
                let reason = DegradedReason::SourceFailing {
                    consecutive_failures: state.consecutive_failures,
                };
                health.machine_degraded(&state.machine_id, reason).await;
            }
        }
        self.check_bounds(state);
    }

    /// `min_interval <= current_interval <= max_interval` after every mutation
    fn check_bounds(&self, state: &mut IntervalState) {
        let before = state.current_interval;
        if state.restore_bounds() {
            warn!(
                machine_id = %state.machine_id,
                interval_secs = before,
                restored_secs = state.current_interval,
                min_interval_secs = state.min_interval,
                max_interval_secs = state.max_interval,
                "Interval left its bounds, restored"
            );
        }
    }
}

/// Builder for a per-machine `Scheduler`
pub struct SchedulerBuilder {
    source: Option<Arc<dyn MetricSource>>,
    store: Option<Arc<dyn MetricStore>>,
    forecaster: Option<Arc<dyn Forecaster>>,
    evaluator: Option<Arc<AnomalyEvaluator>>,
    retrain: Option<Arc<RetrainDispatcher>>,
    notify: Option<Arc<NotifyDispatcher>>,
    queue: Option<Arc<dyn JobQueue>>,
    policy: IntervalPolicy,
    config: SchedulerConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            store: None,
            forecaster: None,
            evaluator: None,
            retrain: None,
            notify: None,
            queue: None,
            policy: IntervalPolicy::default(),
            config: SchedulerConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn MetricStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn forecaster(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.forecaster = Some(forecaster);
        self
    }

    /// Share an evaluator (and its cooldown state) across schedulers
    pub fn evaluator(mut self, evaluator: Arc<AnomalyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn retrain_dispatcher(mut self, dispatcher: Arc<RetrainDispatcher>) -> Self {
        self.retrain = Some(dispatcher);
        self
    }

    pub fn notify_dispatcher(mut self, dispatcher: Arc<NotifyDispatcher>) -> Self {
        self.notify = Some(dispatcher);
        self
    }

    /// Queue used for any dispatcher not set explicitly
    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn policy(mut self, policy: IntervalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Validate configuration and assemble the scheduler
    pub fn build(self) -> MonitorResult<Scheduler> {
        self.config.validate()?;

        let source = self
            .source
            .ok_or_else(|| MonitorError::ConfigInvalid("metric source is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| MonitorError::ConfigInvalid("metric store is required".into()))?;
        let forecaster = self
            .forecaster
            .ok_or_else(|| MonitorError::ConfigInvalid("forecaster is required".into()))?;

        if forecaster.retrain_cycles() != self.config.retrain_cycles {
            return Err(MonitorError::ConfigInvalid(format!(
                "forecaster retrains every {} cycles but the scheduler is configured for {}",
                forecaster.retrain_cycles(),
                self.config.retrain_cycles
            )));
        }

        let config = self.config;
        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(LogOnlyQueue::new()) as Arc<dyn JobQueue>);
        let dispatch = DispatchConfig::default();

        let retrain = match self.retrain {
            Some(retrain) => retrain,
            None => {
                let mut dispatcher = RetrainDispatcher::new(Arc::clone(&queue), &dispatch);
                if let Some(health) = &self.health {
                    dispatcher = dispatcher.with_health(health.clone());
                }
                Arc::new(dispatcher)
            }
        };
        let notify = match self.notify {
            Some(notify) => notify,
            None => {
                let mut dispatcher =
                    NotifyDispatcher::new(Arc::clone(&queue), &dispatch, config.cooldown_window);
                if let Some(health) = &self.health {
                    dispatcher = dispatcher.with_health(health.clone());
                }
                Arc::new(dispatcher)
            }
        };
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(AnomalyEvaluator::new(config.cooldown_window)));
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new(source.machine_id().to_string()));

        let (phase, _) = watch::channel(SchedulerPhase::Idle);

        Ok(Scheduler {
            source,
            store,
            forecaster,
            evaluator,
            retrain,
            notify,
            policy: self.policy,
            config,
            health: self.health,
            metrics: MonitorMetrics::new(),
            logger,
            phase,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
