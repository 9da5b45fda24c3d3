//! Adaptive scheduling
//!
//! One `MachineLoop` per monitored machine drives a `Scheduler` through
//! repeated ticks. Each tick is a state transition over an owned
//! `IntervalState`: sample, persist, forecast, adjust the interval,
//! evaluate anomalies and, once per epoch, request a retrain.

mod machine_loop;
mod policy;
mod tick;


pub use machine_loop::MachineLoop;
pub use policy::IntervalPolicy;
pub use tick::{Scheduler, SchedulerBuilder, TickReport};

use crate::error::{MonitorError, MonitorResult};
use crate::forecast::{ForecasterConfig, BASELINE_WINDOW};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Loop phase, published on a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPhase {
    Idle,
    Sampling,
    Evaluating,
    Waiting,
    Stopped,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Sampling => "sampling",
            SchedulerPhase::Evaluating => "evaluating",
            SchedulerPhase::Waiting => "waiting",
            SchedulerPhase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Configuration for the per-machine scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval bounds and starting point, in seconds
    pub min_interval_secs: f64,
    pub max_interval_secs: f64,
    pub default_interval_secs: f64,
    pub min_data_points_for_training: usize,
    /// Ticks per retrain epoch
    pub retrain_cycles: u64,
    pub cooldown_window: Duration,
    /// Wait before retrying after a failed read
    pub failure_backoff: Duration,
    /// Consecutive read failures before the interval is pinned to max
    pub degrade_after_failures: u32,
    pub read_timeout: Duration,
    pub store_timeout: Duration,
    /// How far back history is loaded for forecasting and retraining
    pub history_lookback: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 30.0,
            max_interval_secs: 600.0,
            default_interval_secs: 300.0,
            min_data_points_for_training: 20,
            retrain_cycles: 10,
            cooldown_window: Duration::from_secs(60),
            failure_backoff: Duration::from_secs(5),
            degrade_after_failures: 3,
            read_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            history_lookback: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl SchedulerConfig {
    /// Reject configurations no loop may start with
    pub fn validate(&self) -> MonitorResult<()> {
        let (min, default, max) = (
            self.min_interval_secs,
            self.default_interval_secs,
            self.max_interval_secs,
        );
        if ![min, default, max].iter().all(|v| v.is_finite()) {
            return Err(MonitorError::ConfigInvalid(
                "intervals must be finite numbers".into(),
            ));
        }
        if !(0.0 < min && min <= default && default <= max) {
            return Err(MonitorError::ConfigInvalid(format!(
                "require 0 < min_interval ({}) <= default_interval ({}) <= max_interval ({})",
                min, default, max
            )));
        }
        self.forecaster_config().validate()?;
        if self.cooldown_window.is_zero() {
            return Err(MonitorError::ConfigInvalid(
                "cooldown_window must be positive".into(),
            ));
        }
        if self.read_timeout.is_zero() || self.store_timeout.is_zero() {
            return Err(MonitorError::ConfigInvalid(
                "read and store timeouts must be positive".into(),
            ));
        }
        if self.degrade_after_failures == 0 {
            return Err(MonitorError::ConfigInvalid(
                "degrade_after_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The forecaster settings this scheduler runs with. Building the
    /// forecaster from here keeps both sides on the same epoch length.
    pub fn forecaster_config(&self) -> ForecasterConfig {
        ForecasterConfig {
            min_data_points_for_training: self.min_data_points_for_training,
            retrain_cycles: self.retrain_cycles,
            baseline_window: BASELINE_WINDOW,
        }
    }

    /// History start for a tick at `timestamp`
    pub fn history_since(&self, timestamp: i64) -> i64 {
        timestamp.saturating_sub(self.history_lookback.as_secs() as i64)
    }
}
