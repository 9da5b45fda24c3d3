//! Robust per-metric baselines
//!
//! Median and median absolute deviation over the most recent samples.
//! Both are insensitive to the very outliers the evaluator hunts for.

use crate::models::{MetricBaseline, MetricName, MetricSample};
use std::collections::HashMap;

/// Number of most recent samples used for baselines
pub const BASELINE_WINDOW: usize = 30;

/// Fewer points than this and a metric gets no baseline
pub const MIN_BASELINE_POINTS: usize = 3;

/// Upper median of `values`
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(sorted[sorted.len() / 2])
}

/// Baselines for every metric with enough finite values in the trailing window
pub fn robust_baselines(
    history: &[MetricSample],
    window: usize,
) -> HashMap<MetricName, MetricBaseline> {
    let recent = &history[history.len().saturating_sub(window)..];
    let mut baselines = HashMap::new();

    for metric in MetricName::ALL {
        let values: Vec<f64> = recent
            .iter()
            .filter_map(|s| metric.value_of(s))
            .filter(|v| v.is_finite())
            .collect();
        if values.len() < MIN_BASELINE_POINTS {
            continue;
        }

        let Some(center) = median(&values) else {
            continue;
        };
        let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
        let mad = median(&deviations).unwrap_or(0.0);

        baselines.insert(
            metric,
            MetricBaseline {
                median: center,
                mad,
                points: values.len(),
            },
        );
    }

    baselines
}
