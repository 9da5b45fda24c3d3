//! Modified z-score anomaly evaluation
//!
//! Each metric of a sample is scored against the median and MAD baseline
//! carried by the tick's forecast. Metrics without a usable baseline
//! (fewer than three points or zero spread) are never flagged.

use crate::models::{
    AnomalyEvent, ExpectedRange, ForecastResult, MetricBaseline, MetricName, MetricSample,
    Severity,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

/// Default cooldown between events for the same metric
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Consistency constant relating MAD to a standard deviation
pub const MAD_SCALE: f64 = 0.6745;

/// Above this |z| an anomaly is critical
pub const CRITICAL_Z_SCORE: f64 = 5.0;

const BASE_THRESHOLD: f64 = 3.5;
const SMALL_SAMPLE_THRESHOLD: f64 = 3.0;

/// Z-score threshold for a baseline computed over `points` values
pub fn threshold_for(points: usize) -> f64 {
    if points < 10 {
        SMALL_SAMPLE_THRESHOLD
    } else if points > 100 {
        BASE_THRESHOLD + points as f64 / 500.0
    } else {
        BASE_THRESHOLD
    }
}

/// Detects metric anomalies with per-(machine, metric) cooldown
pub struct AnomalyEvaluator {
    /// Cooldown window in seconds of sample time
    cooldown_secs: i64,
    /// (machine, metric) -> timestamp of the last emitted event
    last_emitted: DashMap<(String, MetricName), i64>,
}

impl AnomalyEvaluator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown_secs: (cooldown.as_secs() as i64).max(1),
            last_emitted: DashMap::new(),
        }
    }

    pub fn cooldown_secs(&self) -> i64 {
        self.cooldown_secs
    }

    /// Index of the cooldown window containing `timestamp`
    pub fn cooldown_epoch(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.cooldown_secs)
    }

    /// Score one metric value, returning an event when it is anomalous.
    /// Ignores cooldown.
    pub fn score(
        &self,
        sample: &MetricSample,
        metric: MetricName,
        baseline: &MetricBaseline,
    ) -> Option<AnomalyEvent> {
        let value = metric.value_of(sample)?;
        if !value.is_finite() || baseline.points < 3 || baseline.mad <= 0.0 {
            return None;
        }

        let z_score = MAD_SCALE * (value - baseline.median) / baseline.mad;
        let threshold = threshold_for(baseline.points);
        if z_score.abs() <= threshold {
            return None;
        }

        let spread = threshold * baseline.mad / MAD_SCALE;
        Some(AnomalyEvent {
            machine_id: sample.machine_id.clone(),
            timestamp: sample.timestamp,
            metric_name: metric,
            observed_value: value,
            expected_range: ExpectedRange {
                low: baseline.median - spread,
                high: baseline.median + spread,
            },
            severity: if z_score.abs() > CRITICAL_Z_SCORE {
                Severity::Critical
            } else {
                Severity::Major
            },
            z_score,
        })
    }

    /// Most severe anomaly of this sample that is outside its cooldown
    pub fn check(&self, sample: &MetricSample, forecast: &ForecastResult) -> Option<AnomalyEvent> {
        let mut candidates = self.candidates(sample, forecast);
        candidates.sort_by(|a, b| {
            b.severity.cmp(&a.severity).then(
                b.z_score
                    .abs()
                    .partial_cmp(&a.z_score.abs())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        candidates.into_iter().find(|event| self.admit(event))
    }

    /// Every independent anomaly of this sample that is outside its cooldown
    pub fn check_all(&self, sample: &MetricSample, forecast: &ForecastResult) -> Vec<AnomalyEvent> {
        self.candidates(sample, forecast)
            .into_iter()
            .filter(|event| self.admit(event))
            .collect()
    }

    fn candidates(&self, sample: &MetricSample, forecast: &ForecastResult) -> Vec<AnomalyEvent> {
        MetricName::ALL
            .iter()
            .filter_map(|metric| {
                let baseline = forecast.baselines.get(metric)?;
                self.score(sample, *metric, baseline)
            })
            .collect()
    }

    /// Record the event unless its metric is cooling down
    fn admit(&self, event: &AnomalyEvent) -> bool {
        let key = (event.machine_id.clone(), event.metric_name);
        match self.last_emitted.entry(key) {
            Entry::Occupied(mut last) => {
                if event.timestamp - *last.get() < self.cooldown_secs {
                    debug!(
                        machine_id = %event.machine_id,
                        metric = %event.metric_name,
                        "Anomaly suppressed by cooldown"
                    );
                    return false;
                }
                last.insert(event.timestamp);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(event.timestamp);
                true
            }
        }
    }
}

impl Default for AnomalyEvaluator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}
