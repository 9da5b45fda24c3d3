//! Core data models for the adaptive monitor

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// One reading of a machine's resource usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub machine_id: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    /// Bytes read and written since the previous sample
    pub disk_io: f64,
    /// Bytes received and transmitted since the previous sample
    pub net_io: f64,
    pub gpu_pct: Option<f64>,
    pub process_count: u32,
}

/// Metrics the anomaly evaluator inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    CpuPct,
    MemPct,
    DiskIo,
    NetIo,
    GpuPct,
    ProcessCount,
}

impl MetricName {
    pub const ALL: [MetricName; 6] = [
        MetricName::CpuPct,
        MetricName::MemPct,
        MetricName::DiskIo,
        MetricName::NetIo,
        MetricName::GpuPct,
        MetricName::ProcessCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CpuPct => "cpu_pct",
            MetricName::MemPct => "mem_pct",
            MetricName::DiskIo => "disk_io",
            MetricName::NetIo => "net_io",
            MetricName::GpuPct => "gpu_pct",
            MetricName::ProcessCount => "process_count",
        }
    }

    /// Read this metric from a sample; `None` when the machine does not report it
    pub fn value_of(&self, sample: &MetricSample) -> Option<f64> {
        match self {
            MetricName::CpuPct => Some(sample.cpu_pct),
            MetricName::MemPct => Some(sample.mem_pct),
            MetricName::DiskIo => Some(sample.disk_io),
            MetricName::NetIo => Some(sample.net_io),
            MetricName::GpuPct => sample.gpu_pct,
            MetricName::ProcessCount => Some(sample.process_count as f64),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the forecast load trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Rising => write!(f, "rising"),
            TrendDirection::Falling => write!(f, "falling"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Robust location and spread of one metric over recent history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBaseline {
    pub median: f64,
    /// Median absolute deviation
    pub mad: f64,
    pub points: usize,
}

/// Forecast guidance for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub machine_id: String,
    pub generated_at: i64,
    pub trend_direction: TrendDirection,
    /// Always >= 0
    pub volatility_score: f64,
    /// Seconds to add to the current interval (negative samples more often)
    pub recommended_interval_delta: f64,
    /// 0..=1
    pub confidence: f64,
    /// Per-metric baselines the anomaly evaluator compares against
    #[serde(default)]
    pub baselines: HashMap<MetricName, MetricBaseline>,
}

impl ForecastResult {
    /// Forecast that leaves the interval untouched
    pub fn neutral(machine_id: impl Into<String>, generated_at: i64) -> Self {
        Self {
            machine_id: machine_id.into(),
            generated_at,
            trend_direction: TrendDirection::Stable,
            volatility_score: 0.0,
            recommended_interval_delta: 0.0,
            confidence: 0.0,
            baselines: HashMap::new(),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.trend_direction == TrendDirection::Stable
            && self.recommended_interval_delta == 0.0
            && self.confidence == 0.0
    }
}

/// Per-machine sampling state, owned by that machine's loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalState {
    pub machine_id: String,
    /// Seconds
    pub current_interval: f64,
    pub min_interval: f64,
    pub max_interval: f64,
    pub cycle_count: u64,
    pub cycles_since_retrain: u64,
    /// Number of completed retrain epochs
    pub epoch: u64,
    pub consecutive_failures: u32,
}

impl IntervalState {
    pub fn new(
        machine_id: impl Into<String>,
        min_interval: f64,
        default_interval: f64,
        max_interval: f64,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            current_interval: default_interval.clamp(min_interval, max_interval),
            min_interval,
            max_interval,
            cycle_count: 0,
            cycles_since_retrain: 0,
            epoch: 0,
            consecutive_failures: 0,
        }
    }

    pub fn within_bounds(&self) -> bool {
        self.min_interval <= self.current_interval && self.current_interval <= self.max_interval
    }

    /// Pull `current_interval` back into bounds; a non-finite interval
    /// falls back to the max. Returns whether anything changed.
    pub fn restore_bounds(&mut self) -> bool {
        if self.within_bounds() {
            return false;
        }
        self.current_interval = if self.current_interval.is_finite() {
            self.current_interval
                .max(self.min_interval)
                .min(self.max_interval)
        } else {
            self.max_interval
        };
        true
    }

    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.current_interval.max(0.0))
    }
}

/// Anomaly severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Major,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub low: f64,
    pub high: f64,
}

impl ExpectedRange {
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// A metric reading outside its expected range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub machine_id: String,
    pub timestamp: i64,
    pub metric_name: MetricName,
    pub observed_value: f64,
    pub expected_range: ExpectedRange,
    pub severity: Severity,
    /// Modified z-score that triggered the event
    pub z_score: f64,
}

/// Where a retrain worker should read history from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRef {
    pub machine_id: String,
    pub since: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainPayload {
    pub history: HistoryRef,
    pub epoch: u64,
}

/// Retraining request handed to the worker tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainJob {
    pub machine_id: String,
    pub dedup_key: String,
    pub payload: RetrainPayload,
    pub enqueued_at: i64,
}

/// Notification request handed to the worker tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyJob {
    pub machine_id: String,
    pub dedup_key: String,
    pub payload: AnomalyEvent,
    pub enqueued_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MetricSample {
        MetricSample {
            machine_id: "host-a".to_string(),
            timestamp: 1_700_000_000,
            cpu_pct: 42.0,
            mem_pct: 61.5,
            disk_io: 1024.0,
            net_io: 2048.0,
            gpu_pct: None,
            process_count: 180,
        }
    }

    #[test]
    fn test_metric_value_lookup() {
        let s = sample();
        assert_eq!(MetricName::CpuPct.value_of(&s), Some(42.0));
        assert_eq!(MetricName::ProcessCount.value_of(&s), Some(180.0));
        assert_eq!(MetricName::GpuPct.value_of(&s), None);
    }

    #[test]
    fn test_neutral_forecast() {
        let f = ForecastResult::neutral("host-a", 10);
        assert!(f.is_neutral());
        assert_eq!(f.trend_direction, TrendDirection::Stable);
        assert!(f.baselines.is_empty());
    }

    #[test]
    fn test_interval_state_clamps_default() {
        let s = IntervalState::new("host-a", 30.0, 900.0, 600.0);
        assert_eq!(s.current_interval, 600.0);
        assert!(s.within_bounds());
        assert_eq!(s.interval_duration(), Duration::from_secs(600));
    }

    #[test]
    fn test_restore_bounds() {
        let mut s = IntervalState::new("host-a", 30.0, 300.0, 600.0);
        assert!(!s.restore_bounds());

        s.current_interval = 5.0;
        assert!(s.restore_bounds());
        assert_eq!(s.current_interval, 30.0);

        s.current_interval = f64::NAN;
        assert!(s.restore_bounds());
        assert_eq!(s.current_interval, 600.0);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Major);
        assert_eq!(Severity::Critical.to_string(), "critical");
    }

    #[test]
    fn test_forecast_serializes_direction_lowercase() {
        let f = ForecastResult::neutral("host-a", 10);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["trend_direction"], "stable");
    }
}
