//! Monitor library for adaptive machine resource monitoring
//!
//! This crate provides the core functionality for:
//! - Metric sampling from the local host
//! - Trend forecasting and adaptive sampling intervals
//! - Anomaly detection with per-metric cooldown
//! - Retrain and notification dispatch to a background worker tier
//! - Health checks and observability

pub mod anomaly;
pub mod dispatch;
pub mod error;
pub mod forecast;
pub mod health;
pub mod models;
pub mod observability;
pub mod queue;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod worker;

pub use error::{MonitorError, MonitorResult};
pub use health::{
    Component, ComponentHealth, ComponentStatus, DegradedReason, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
