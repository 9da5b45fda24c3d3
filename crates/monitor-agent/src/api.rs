//! HTTP API for health checks, loop status and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::MonitorMetrics,
    scheduler::SchedulerPhase,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    /// Phase feed of every machine loop
    pub loops: Vec<(String, watch::Receiver<SchedulerPhase>)>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: MonitorMetrics) -> Self {
        Self {
            health_registry,
            metrics,
            loops: Vec::new(),
        }
    }

    pub fn with_loop(
        mut self,
        machine_id: impl Into<String>,
        phase: watch::Receiver<SchedulerPhase>,
    ) -> Self {
        self.loops.push((machine_id.into(), phase));
        self
    }
}

#[derive(Debug, Serialize)]
pub struct LoopStatus {
    pub machine_id: String,
    pub phase: SchedulerPhase,
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Vec<LoopStatus>> {
    let loops = state
        .loops
        .iter()
        .map(|(machine_id, phase)| LoopStatus {
            machine_id: machine_id.clone(),
            phase: *phase.borrow(),
        })
        .collect();
    Json(loops)
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
