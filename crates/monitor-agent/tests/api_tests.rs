//! Integration tests for the monitor API endpoints

use adaptive_monitor::api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use monitor_lib::{
    health::{Component, DegradedReason, HealthRegistry},
    observability::MonitorMetrics,
    scheduler::SchedulerPhase,
};
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();

    let metrics = MonitorMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get_text(app: Router, uri: &str) -> String {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_queue_degraded() {
    let (app, state) = setup_test_app().await;

    // A queue outage degrades dispatch but sampling continues
    state
        .health_registry
        .set_degraded(
            Component::JobQueue,
            DegradedReason::QueueUnavailable {
                queue: "channel".into(),
                error: "enqueue timed out".into(),
            },
        )
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["job_queue"]["status"], "degraded");
    let reason = &health["components"]["job_queue"]["reason"];
    assert_eq!(reason["kind"], "queue_unavailable");
    assert_eq!(reason["queue"], "channel");
    assert_eq!(reason["error"], "enqueue timed out");
}

#[tokio::test]
async fn test_healthz_returns_503_when_no_machine_samples() {
    let (app, state) = setup_test_app().await;

    state.health_registry.register_machine("node-a").await;
    state
        .health_registry
        .machine_degraded(
            "node-a",
            DegradedReason::SourceFailing {
                consecutive_failures: 3,
            },
        )
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["machines"]["node-a"]["reason"]["kind"], "source_failing");
    assert_eq!(
        health["machines"]["node-a"]["reason"]["consecutive_failures"],
        3
    );
}

#[tokio::test]
async fn test_healthz_ok_while_another_machine_samples() {
    let (app, state) = setup_test_app().await;

    state.health_registry.register_machine("node-a").await;
    state.health_registry.register_machine("node-b").await;
    state
        .health_registry
        .machine_degraded(
            "node-a",
            DegradedReason::SourceFailing {
                consecutive_failures: 3,
            },
        )
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["machines"]["node-b"]["status"], "healthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    // Not ready until startup completes
    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state.health_registry.register_machine("node-a").await;
    state
        .health_registry
        .machine_degraded(
            "node-a",
            DegradedReason::SourceFailing {
                consecutive_failures: 4,
            },
        )
        .await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["reason"], "No machine is being sampled");
}

#[tokio::test]
async fn test_status_reports_loop_phases() {
    let health_registry = HealthRegistry::new();

    let (phase_tx, phase_rx) = watch::channel(SchedulerPhase::Idle);
    let state = Arc::new(
        AppState::new(health_registry, MonitorMetrics::new()).with_loop("node-a", phase_rx),
    );

    phase_tx.send_replace(SchedulerPhase::Waiting);

    let (status, loops) = get_json(create_router(state), "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(loops.as_array().unwrap().len(), 1);
    assert_eq!(loops[0]["machine_id"], "node-a");
    assert_eq!(loops[0]["phase"], "waiting");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_tick_latency(0.001);
    state.metrics.set_current_interval("api-test", 240.0);
    state.metrics.inc_retrain_jobs("enqueued");
    state.metrics.inc_notify_jobs("duplicate");

    let metrics_text = get_text(app, "/metrics").await;

    assert!(metrics_text.contains("adaptive_monitor_tick_latency_seconds"));
    assert!(metrics_text
        .contains("adaptive_monitor_current_interval_seconds{machine_id=\"api-test\"} 240"));
    assert!(metrics_text.contains("adaptive_monitor_retrain_jobs_total"));
    assert!(metrics_text.contains("adaptive_monitor_notify_jobs_total"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_tick_latency(0.001);
    state.metrics.observe_tick_latency(0.005);
    state.metrics.observe_tick_latency(0.01);

    let metrics_text = get_text(app, "/metrics").await;

    assert!(metrics_text.contains("adaptive_monitor_tick_latency_seconds_bucket"));
    assert!(metrics_text.contains("adaptive_monitor_tick_latency_seconds_count"));
    assert!(metrics_text.contains("adaptive_monitor_tick_latency_seconds_sum"));
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let (_, health) = get_json(app, "/healthz").await;

    assert!(health["components"].is_object());
    assert!(health["machines"].is_object());
    for component in Component::ALL {
        let name = component.as_str();
        assert!(health["components"][name].is_object(), "missing {name}");
    }
}
