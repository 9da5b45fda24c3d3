//! Fit/predict strategy for load trends

use crate::error::{MonitorError, MonitorResult};
use crate::models::{MetricSample, TrendDirection};
use serde::{Deserialize, Serialize};

/// Fitted trend parameters for one machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFit {
    pub machine_id: String,
    pub fitted_at: i64,
    /// Number of samples the fit was computed over
    pub samples: usize,
    /// CPU percentage points per sample
    pub slope: f64,
    pub intercept: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub r_squared: f64,
    pub p10: f64,
    pub p90: f64,
}

impl TrendFit {
    /// Value the fitted line projects `steps_ahead` samples past the window
    pub fn projected(&self, steps_ahead: f64) -> f64 {
        self.intercept + self.slope * ((self.samples as f64 - 1.0) + steps_ahead)
    }
}

/// What a fitted model says about the latest sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSignal {
    pub direction: TrendDirection,
    /// -1..=1, positive when load is rising
    pub trend_strength: f64,
    /// -1..=1, where the blended load sits inside the historical band
    pub load_pressure: f64,
    pub volatility: f64,
    pub confidence: f64,
    /// Load is past the emergency threshold
    pub emergency: bool,
}

/// Trait for trend model implementations
pub trait TrendModel: Send + Sync {
    /// Fit a model over ordered history. May be slow; never called on the sampling path.
    fn fit(&self, machine_id: &str, history: &[MetricSample]) -> MonitorResult<TrendFit>;

    /// Interpret the latest sample against a previously fitted model
    fn predict(&self, fit: &TrendFit, latest: &MetricSample) -> TrendSignal;
}

/// Least-squares trend over CPU usage
#[derive(Debug, Clone)]
pub struct LinearTrendModel {
    /// Most recent samples considered by `fit`
    pub fit_window: usize,
    /// Slopes inside +/- this band count as stable
    pub stable_slope: f64,
    /// Slope that maps to a trend strength of ~0.76 (tanh(1))
    pub slope_scale: f64,
    pub emergency_cpu_pct: f64,
    /// Below this load the projection dominates the blend
    pub high_load_pct: f64,
}

impl Default for LinearTrendModel {
    fn default() -> Self {
        Self {
            fit_window: 360,
            stable_slope: 0.05,
            slope_scale: 1.0,
            emergency_cpu_pct: 90.0,
            high_load_pct: 70.0,
        }
    }
}

impl TrendModel for LinearTrendModel {
    fn fit(&self, machine_id: &str, history: &[MetricSample]) -> MonitorResult<TrendFit> {
        let values: Vec<f64> = history[history.len().saturating_sub(self.fit_window)..]
            .iter()
            .map(|s| s.cpu_pct)
            .filter(|v| v.is_finite())
            .collect();

        if values.len() < 2 {
            return Err(MonitorError::ModelFit {
                machine_id: machine_id.to_string(),
                reason: format!("{} usable samples, need at least 2", values.len()),
            });
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let slope = linear_regression_slope(&values);
        let mean_x = (n - 1.0) / 2.0;
        let intercept = mean - slope * mean_x;

        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let ss_tot: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        let ss_res: f64 = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v - (intercept + slope * i as f64)).powi(2))
            .sum();
        let r_squared = if ss_tot < f64::EPSILON {
            1.0
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };

        Ok(TrendFit {
            machine_id: machine_id.to_string(),
            fitted_at: history.last().map(|s| s.timestamp).unwrap_or_default(),
            samples: values.len(),
            slope,
            intercept,
            mean,
            std_dev: variance.sqrt(),
            r_squared,
            p10: percentile(&values, 10.0),
            p90: percentile(&values, 90.0),
        })
    }

    fn predict(&self, fit: &TrendFit, latest: &MetricSample) -> TrendSignal {
        let current = latest.cpu_pct;
        let projected = fit.projected(1.0);

        let blend_weight = if current < self.high_load_pct { 0.7 } else { 0.3 };
        let blended = blend_weight * projected + (1.0 - blend_weight) * current;

        let band = fit.p90 - fit.p10;
        let load_pressure = if band < f64::EPSILON {
            0.0
        } else {
            (2.0 * (blended - fit.p10) / band - 1.0).clamp(-1.0, 1.0)
        };

        let direction = if fit.slope > self.stable_slope {
            TrendDirection::Rising
        } else if fit.slope < -self.stable_slope {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        };

        let volatility = (fit.std_dev / fit.mean.max(1.0)).max(0.0);
        let confidence = match direction {
            TrendDirection::Stable => 1.0 / (1.0 + volatility),
            _ => fit.r_squared,
        }
        .clamp(0.0, 1.0);

        TrendSignal {
            direction,
            trend_strength: (fit.slope / self.slope_scale).tanh(),
            load_pressure,
            volatility,
            confidence,
            emergency: current >= self.emergency_cpu_pct,
        }
    }
}

/// Calculate linear regression slope for trend detection
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Nearest-rank percentile, `p` in 0..=100
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
