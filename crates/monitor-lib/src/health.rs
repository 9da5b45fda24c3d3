//! Monitor health
//!
//! Every machine loop reports its own entry, and the shared dependencies
//! (job queue, metric store, forecaster) one each. A degraded entry keeps
//! the failure that caused it, so `/healthz` tells an operator which
//! queue or machine is in trouble and for how long.
//!
//! Nothing here is ever fatal. The monitor as a whole is only unhealthy
//! once no machine can be sampled at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared dependencies with a health entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Forecaster,
    JobQueue,
    MetricStore,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Forecaster,
        Component::JobQueue,
        Component::MetricStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Forecaster => "forecaster",
            Component::JobQueue => "job_queue",
            Component::MetricStore => "metric_store",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    /// Only ever reported for the monitor as a whole
    Unhealthy,
}

/// The failure behind a degraded entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedReason {
    /// Reads (or store writes that timed out) keep failing; the loop samples at max interval
    SourceFailing { consecutive_failures: u32 },
    QueueUnavailable { queue: String, error: String },
    StoreWriteFailed { machine_id: String, error: String },
    ModelFitFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        machine_id: Option<String>,
        error: String,
    },
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::SourceFailing {
                consecutive_failures,
            } => write!(f, "{} consecutive sample failures", consecutive_failures),
            DegradedReason::QueueUnavailable { queue, error } => {
                write!(f, "{} queue unavailable: {}", queue, error)
            }
            DegradedReason::StoreWriteFailed { machine_id, error } => {
                write!(f, "store write for {} failed: {}", machine_id, error)
            }
            DegradedReason::ModelFitFailed {
                machine_id: Some(machine_id),
                error,
            } => write!(f, "model fit for {} failed: {}", machine_id, error),
            DegradedReason::ModelFitFailed {
                machine_id: None,
                error,
            } => write!(f, "model fit failed: {}", error),
        }
    }
}

/// One health entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DegradedReason>,
    /// Unix seconds when the entry entered its current status
    pub since: i64,
    pub last_update: i64,
}

impl ComponentHealth {
    fn healthy(now: i64) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            reason: None,
            since: now,
            last_update: now,
        }
    }

    /// `since` only moves when the status changes; the reason is always the latest
    fn transition(&mut self, reason: Option<DegradedReason>, now: i64) {
        let status = if reason.is_some() {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        };
        if self.status != status {
            self.since = now;
        }
        self.status = status;
        self.reason = reason;
        self.last_update = now;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
    pub machines: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Unhealthy when every running machine loop is degraded, degraded when
    /// any entry is, healthy otherwise
    pub fn compute_status(
        components: &BTreeMap<Component, ComponentHealth>,
        machines: &BTreeMap<String, ComponentHealth>,
    ) -> ComponentStatus {
        let degraded = |h: &ComponentHealth| h.status != ComponentStatus::Healthy;

        if !machines.is_empty() && machines.values().all(degraded) {
            ComponentStatus::Unhealthy
        } else if components.values().any(degraded) || machines.values().any(degraded) {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    machines: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared, cloneable view of monitor health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl HealthRegistry {
    /// Every component starts healthy; no machines, not ready
    pub fn new() -> Self {
        let now = now();
        let components = Component::ALL
            .iter()
            .map(|c| (*c, ComponentHealth::healthy(now)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(HealthState {
                components,
                machines: BTreeMap::new(),
                ready: false,
            })),
        }
    }

    pub async fn register_machine(&self, machine_id: &str) {
        let mut state = self.state.write().await;
        state
            .machines
            .entry(machine_id.to_string())
            .or_insert_with(|| ComponentHealth::healthy(now()));
    }

    /// A stopped loop no longer counts towards monitor health
    pub async fn deregister_machine(&self, machine_id: &str) {
        self.state.write().await.machines.remove(machine_id);
    }

    pub async fn set_healthy(&self, component: Component) {
        self.update_component(component, None).await;
    }

    pub async fn set_degraded(&self, component: Component, reason: DegradedReason) {
        self.update_component(component, Some(reason)).await;
    }

    pub async fn machine_healthy(&self, machine_id: &str) {
        self.update_machine(machine_id, None).await;
    }

    pub async fn machine_degraded(&self, machine_id: &str, reason: DegradedReason) {
        self.update_machine(machine_id, Some(reason)).await;
    }

    async fn update_component(&self, component: Component, reason: Option<DegradedReason>) {
        let now = now();
        let mut state = self.state.write().await;
        state
            .components
            .entry(component)
            .or_insert_with(|| ComponentHealth::healthy(now))
            .transition(reason, now);
    }

    async fn update_machine(&self, machine_id: &str, reason: Option<DegradedReason>) {
        let now = now();
        let mut state = self.state.write().await;
        state
            .machines
            .entry(machine_id.to_string())
            .or_insert_with(|| ComponentHealth::healthy(now))
            .transition(reason, now);
    }

    pub async fn status(&self, component: Component) -> ComponentStatus {
        self.state
            .read()
            .await
            .components
            .get(&component)
            .map_or(ComponentStatus::Healthy, |h| h.status)
    }

    pub async fn machine_status(&self, machine_id: &str) -> Option<ComponentStatus> {
        self.state
            .read()
            .await
            .machines
            .get(machine_id)
            .map(|h| h.status)
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: HealthResponse::compute_status(&state.components, &state.machines),
            components: state.components.clone(),
            machines: state.machines.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let status = HealthResponse::compute_status(&state.components, &state.machines);

        let reason = if !state.ready {
            Some("Monitor not yet initialized")
        } else if status == ComponentStatus::Unhealthy {
            Some("No machine is being sampled")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_down(error: &str) -> DegradedReason {
        DegradedReason::QueueUnavailable {
            queue: "channel".into(),
            error: error.into(),
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), Component::ALL.len());
        assert!(health.machines.is_empty());
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_degraded_queue_keeps_latest_reason() {
        let registry = HealthRegistry::new();
        registry.register_machine("m").await;

        registry
            .set_degraded(Component::JobQueue, queue_down("queue full"))
            .await;
        let since = registry.health().await.components[&Component::JobQueue].since;
        registry
            .set_degraded(Component::JobQueue, queue_down("enqueue timed out"))
            .await;

        let health = registry.health().await;
        let queue = &health.components[&Component::JobQueue];
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(queue.since, since);
        assert_eq!(queue.reason, Some(queue_down("enqueue timed out")));

        registry.set_healthy(Component::JobQueue).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components[&Component::JobQueue].reason, None);
    }

    #[tokio::test]
    async fn test_one_failing_machine_degrades() {
        let registry = HealthRegistry::new();
        registry.register_machine("a").await;
        registry.register_machine("b").await;
        registry.set_ready(true).await;

        registry
            .machine_degraded(
                "a",
                DegradedReason::SourceFailing {
                    consecutive_failures: 3,
                },
            )
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert_eq!(
            registry.machine_status("a").await,
            Some(ComponentStatus::Degraded)
        );
        assert_eq!(
            registry.machine_status("b").await,
            Some(ComponentStatus::Healthy)
        );
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_all_machines_failing_is_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register_machine("a").await;
        registry.set_ready(true).await;

        registry
            .machine_degraded(
                "a",
                DegradedReason::SourceFailing {
                    consecutive_failures: 3,
                },
            )
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("No machine is being sampled"));

        registry.machine_healthy("a").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_deregistered_machine_is_dropped() {
        let registry = HealthRegistry::new();
        registry.register_machine("a").await;
        registry.deregister_machine("a").await;

        assert_eq!(registry.machine_status("a").await, None);
        assert!(registry.health().await.machines.is_empty());
    }

    #[tokio::test]
    async fn test_response_json_shape() {
        let registry = HealthRegistry::new();
        registry.register_machine("m").await;
        registry
            .set_degraded(
                Component::MetricStore,
                DegradedReason::StoreWriteFailed {
                    machine_id: "m".into(),
                    error: "disk full".into(),
                },
            )
            .await;

        let json = serde_json::to_value(registry.health().await).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"]["metric_store"]["status"], "degraded");
        assert_eq!(
            json["components"]["metric_store"]["reason"]["kind"],
            "store_write_failed"
        );
        assert_eq!(json["components"]["job_queue"]["status"], "healthy");
        assert!(json["components"]["job_queue"].get("reason").is_none());
        assert_eq!(json["machines"]["m"]["status"], "healthy");
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            queue_down("closed").to_string(),
            "channel queue unavailable: closed"
        );
        assert_eq!(
            DegradedReason::SourceFailing {
                consecutive_failures: 4
            }
            .to_string(),
            "4 consecutive sample failures"
        );
    }
}
