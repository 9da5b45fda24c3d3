//! Trend forecasting
//!
//! The forecaster turns ordered metric history into interval guidance:
//! - `TrendModel` is the swappable fit/predict strategy
//! - `DeltaWeighting` maps a trend signal to an interval delta
//! - `ModelRegistry` holds the latest fit per machine and swaps it atomically
//! - robust baselines feed the anomaly evaluator

mod baseline;
mod forecaster;
mod model;
mod registry;
mod weighting;

pub use baseline::{median, robust_baselines, BASELINE_WINDOW, MIN_BASELINE_POINTS};
pub use forecaster::{Forecaster, ForecasterConfig, TrendForecaster};
pub use model::{
    linear_regression_slope, percentile, LinearTrendModel, TrendFit, TrendModel, TrendSignal,
};
pub use registry::{compute_checksum, sanitize_machine_id, ModelRegistry};
pub use weighting::{DeltaWeighting, ProportionalWeighting};
