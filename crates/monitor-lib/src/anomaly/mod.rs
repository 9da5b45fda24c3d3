//! Anomaly detection and reporting
//!
//! This module provides:
//! - Robust z-score evaluation of each sample against forecast baselines
//! - Per-metric cooldown so a sustained anomaly does not storm the queue
//! - Plain-text anomaly reports for the notification tier

mod evaluator;
mod report;

pub use evaluator::{
    threshold_for, AnomalyEvaluator, CRITICAL_Z_SCORE, DEFAULT_COOLDOWN_SECS, MAD_SCALE,
};
pub use report::render_report;
