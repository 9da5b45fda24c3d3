//! Forecasting contract consumed by the scheduler

use super::{
    robust_baselines, DeltaWeighting, LinearTrendModel, ModelRegistry, ProportionalWeighting,
    TrendFit, TrendModel, BASELINE_WINDOW, MIN_BASELINE_POINTS,
};
use crate::error::{MonitorError, MonitorResult};
use crate::models::{ForecastResult, MetricSample};
use std::sync::Arc;
use tracing::debug;

/// Interval guidance from ordered history
pub trait Forecaster: Send + Sync {
    /// Forecast for the tick whose sample is the last element of `history`.
    /// Must be cheap: uses whatever model is currently installed.
    fn evaluate(&self, machine_id: &str, history: &[MetricSample]) -> ForecastResult;

    /// Ticks per retrain epoch
    fn retrain_cycles(&self) -> u64;

    fn retrain_due(&self, cycles_since_retrain: u64) -> bool {
        cycles_since_retrain >= self.retrain_cycles()
    }
}

#[derive(Debug, Clone)]
pub struct ForecasterConfig {
    pub min_data_points_for_training: usize,
    pub retrain_cycles: u64,
    pub baseline_window: usize,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            min_data_points_for_training: 20,
            retrain_cycles: 10,
            baseline_window: BASELINE_WINDOW,
        }
    }
}

impl ForecasterConfig {
    pub fn validate(&self) -> MonitorResult<()> {
        if self.retrain_cycles == 0 {
            return Err(MonitorError::ConfigInvalid(
                "retrain_cycles must be at least 1".into(),
            ));
        }
        if self.min_data_points_for_training < 2 {
            return Err(MonitorError::ConfigInvalid(
                "min_data_points_for_training must be at least 2".into(),
            ));
        }
        if self.baseline_window < MIN_BASELINE_POINTS {
            return Err(MonitorError::ConfigInvalid(format!(
                "baseline_window must be at least {}",
                MIN_BASELINE_POINTS
            )));
        }
        Ok(())
    }
}

/// Forecaster backed by a pluggable `TrendModel` and `DeltaWeighting`
pub struct TrendForecaster {
    model: Arc<dyn TrendModel>,
    weighting: Arc<dyn DeltaWeighting>,
    registry: Arc<ModelRegistry>,
    config: ForecasterConfig,
}

impl TrendForecaster {
    pub fn new(config: ForecasterConfig, registry: Arc<ModelRegistry>) -> Self {
        Self {
            model: Arc::new(LinearTrendModel::default()),
            weighting: Arc::new(ProportionalWeighting::default()),
            registry,
            config,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn TrendModel>) -> Self {
        self.model = model;
        self
    }

    pub fn with_weighting(mut self, weighting: Arc<dyn DeltaWeighting>) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    /// Fit a fresh model and install it. Slow; call from the worker tier only.
    ///
    /// Returns `Ok(None)` when there is not yet enough history to train on.
    pub fn retrain(
        &self,
        machine_id: &str,
        history: &[MetricSample],
    ) -> MonitorResult<Option<Arc<TrendFit>>> {
        if history.len() < self.config.min_data_points_for_training {
            debug!(
                machine_id = %machine_id,
                samples = history.len(),
                required = self.config.min_data_points_for_training,
                "Not enough history to retrain"
            );
            return Ok(None);
        }

        let fit = self.model.fit(machine_id, history)?;
        Ok(Some(self.registry.install(fit)))
    }
}

impl Forecaster for TrendForecaster {
    fn evaluate(&self, machine_id: &str, history: &[MetricSample]) -> ForecastResult {
        let Some(latest) = history.last() else {
            return ForecastResult::neutral(machine_id, 0);
        };

        // Baselines only need a handful of points, the trend needs far more
        let mut result = ForecastResult::neutral(machine_id, latest.timestamp);
        result.baselines = robust_baselines(history, self.config.baseline_window);

        if history.len() < self.config.min_data_points_for_training {
            return result;
        }

        // Without a trained model the interval stays put
        let Some(fit) = self.registry.current(machine_id) else {
            return result;
        };

        let signal = self.model.predict(&fit, latest);
        result.trend_direction = signal.direction;
        result.volatility_score = signal.volatility.max(0.0);
        result.confidence = signal.confidence.clamp(0.0, 1.0);
        result.recommended_interval_delta = self.weighting.delta(&signal);
        result
    }

    fn retrain_cycles(&self) -> u64 {
        self.config.retrain_cycles
    }
}
