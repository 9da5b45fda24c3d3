//! Monitor configuration
//!
//! Read from an optional `monitor.toml` and `MONITOR_*` environment
//! variables, the environment taking precedence.

use anyhow::{Context, Result};
use monitor_lib::dispatch::DispatchConfig;
use monitor_lib::scheduler::SchedulerConfig;
use monitor_lib::store::DEFAULT_RETENTION;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Identifier of the monitored machine; the host name when unset
    #[serde(default)]
    pub machine_id: Option<String>,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_min_interval")]
    pub min_interval_secs: f64,

    #[serde(default = "default_max_interval")]
    pub max_interval_secs: f64,

    #[serde(default = "default_interval")]
    pub default_interval_secs: f64,

    #[serde(default = "default_min_data_points")]
    pub min_data_points_for_training: usize,

    #[serde(default = "default_retrain_cycles")]
    pub retrain_cycles: u64,

    #[serde(default = "default_cooldown_window")]
    pub cooldown_window_secs: u64,

    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,

    #[serde(default = "default_enqueue_timeout")]
    pub enqueue_timeout_ms: u64,

    /// Run the in-process worker tier; otherwise jobs are only logged
    #[serde(default = "default_queue_enabled")]
    pub queue_enabled: bool,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Where trained models are persisted; in memory only when unset
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    /// Samples kept per machine
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

fn default_api_port() -> u16 {
    8080
}

fn default_min_interval() -> f64 {
    30.0
}

fn default_max_interval() -> f64 {
    600.0
}

fn default_interval() -> f64 {
    300.0
}

fn default_min_data_points() -> usize {
    20
}

fn default_retrain_cycles() -> u64 {
    10
}

fn default_cooldown_window() -> u64 {
    60
}

fn default_failure_backoff() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    10
}

fn default_store_timeout() -> u64 {
    5
}

fn default_enqueue_timeout() -> u64 {
    500
}

fn default_queue_enabled() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}

fn default_history_retention() -> usize {
    DEFAULT_RETENTION
}

impl MonitorConfig {
    /// Load configuration from config file and environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("monitor").required(false))
            .add_source(config::Environment::with_prefix("MONITOR").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid settings before any loop starts
    pub fn validate(&self) -> Result<()> {
        self.scheduler_config()
            .validate()
            .context("Invalid scheduler configuration")?;
        if self.queue_enabled && self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be positive when the queue is enabled");
        }
        if self.enqueue_timeout_ms == 0 {
            anyhow::bail!("enqueue_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            min_interval_secs: self.min_interval_secs,
            max_interval_secs: self.max_interval_secs,
            default_interval_secs: self.default_interval_secs,
            min_data_points_for_training: self.min_data_points_for_training,
            retrain_cycles: self.retrain_cycles,
            cooldown_window: Duration::from_secs(self.cooldown_window_secs),
            failure_backoff: Duration::from_secs(self.failure_backoff_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            store_timeout: Duration::from_secs(self.store_timeout_secs),
            ..Default::default()
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            enqueue_timeout: Duration::from_millis(self.enqueue_timeout_ms),
            ..Default::default()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            machine_id: None,
            api_port: default_api_port(),
            min_interval_secs: default_min_interval(),
            max_interval_secs: default_max_interval(),
            default_interval_secs: default_interval(),
            min_data_points_for_training: default_min_data_points(),
            retrain_cycles: default_retrain_cycles(),
            cooldown_window_secs: default_cooldown_window(),
            failure_backoff_secs: default_failure_backoff(),
            read_timeout_secs: default_read_timeout(),
            store_timeout_secs: default_store_timeout(),
            enqueue_timeout_ms: default_enqueue_timeout(),
            queue_enabled: default_queue_enabled(),
            queue_capacity: default_queue_capacity(),
            model_dir: None,
            history_retention: default_history_retention(),
        }
    }
}
