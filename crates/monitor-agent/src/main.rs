//! Adaptive Monitor - self-tuning metric sampling agent
//!
//! Samples this host on an adaptive interval, forecasts resource trends,
//! flags anomalies and hands retrain/notify work to the job queue.

use adaptive_monitor::{api, config::MonitorConfig};
use anyhow::{Context, Result};
use monitor_lib::{
    anomaly::AnomalyEvaluator,
    dispatch::{NotifyDispatcher, RetrainDispatcher},
    forecast::{ModelRegistry, TrendForecaster},
    health::HealthRegistry,
    observability::{MonitorMetrics, StructuredLogger},
    queue::{ChannelJobQueue, JobQueue, LogOnlyQueue},
    scheduler::{MachineLoop, SchedulerBuilder},
    source::{MetricSource, SystemMetricSource},
    store::{InMemoryMetricStore, MetricStore},
    worker::{LogChannel, NotifyWorker, RetrainWorker},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting adaptive-monitor");

    // Invalid configuration is fatal before any loop starts
    let config = MonitorConfig::load()?;
    let scheduler_config = config.scheduler_config();
    let dispatch_config = config.dispatch_config();

    let source: Arc<dyn MetricSource> = match &config.machine_id {
        Some(id) => Arc::new(SystemMetricSource::with_machine_id(id)),
        None => Arc::new(SystemMetricSource::new()),
    };
    let machine_id = source.machine_id().to_string();
    info!(machine_id = %machine_id, "Monitor configured");

    let health_registry = HealthRegistry::new();

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(&machine_id);

    let registry = match &config.model_dir {
        Some(dir) => {
            let registry = ModelRegistry::with_persistence(dir)
                .with_context(|| format!("Failed to open model directory {}", dir.display()))?;
            let loaded = registry.load_persisted()?;
            info!(models = loaded, dir = %dir.display(), "Loaded persisted models");
            registry
        }
        None => ModelRegistry::new(),
    };
    let forecaster = Arc::new(TrendForecaster::new(
        scheduler_config.forecaster_config(),
        Arc::new(registry),
    ));

    let store: Arc<dyn MetricStore> = Arc::new(InMemoryMetricStore::new(config.history_retention));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut workers = Vec::new();

    let queue: Arc<dyn JobQueue> = if config.queue_enabled {
        let (queue, receivers) = ChannelJobQueue::new(config.queue_capacity);

        let retrain_worker = RetrainWorker::new(
            receivers.retrain,
            store.clone(),
            forecaster.clone(),
            logger.clone(),
        )
        .with_health(health_registry.clone());
        workers.push(tokio::spawn(retrain_worker.run(shutdown_tx.subscribe())));

        let notify_worker =
            NotifyWorker::new(receivers.notify, store.clone(), Arc::new(LogChannel));
        workers.push(tokio::spawn(notify_worker.run(shutdown_tx.subscribe())));

        Arc::new(queue)
    } else {
        warn!("Job queue disabled, retrain and notify jobs are only logged");
        Arc::new(LogOnlyQueue::new())
    };

    let retrain = Arc::new(
        RetrainDispatcher::new(queue.clone(), &dispatch_config)
            .with_health(health_registry.clone())
            .with_logger(logger.clone()),
    );
    let notify = Arc::new(
        NotifyDispatcher::new(queue.clone(), &dispatch_config, scheduler_config.cooldown_window)
            .with_health(health_registry.clone()),
    );
    let evaluator = Arc::new(AnomalyEvaluator::new(scheduler_config.cooldown_window));

    let scheduler = SchedulerBuilder::new()
        .source(source)
        .store(store)
        .forecaster(forecaster)
        .evaluator(evaluator)
        .retrain_dispatcher(retrain.clone())
        .notify_dispatcher(notify.clone())
        .config(scheduler_config)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()
        .context("Failed to build scheduler")?;

    let machine_loop = MachineLoop::new(scheduler);
    let app_state = Arc::new(
        api::AppState::new(health_registry.clone(), metrics.clone())
            .with_loop(machine_id.as_str(), machine_loop.phase()),
    );
    let loops = vec![machine_loop.spawn(shutdown_tx.subscribe())];

    // Start health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    health_registry.set_ready(true).await;
    logger.log_startup(MONITOR_VERSION, loops.len(), queue.name());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // No new jobs once shutdown starts; queued work is left to the workers
    retrain.close();
    notify.close();
    let _ = shutdown_tx.send(());

    for handle in loops {
        match handle.await {
            Ok(state) => info!(
                machine_id = %state.machine_id,
                cycles = state.cycle_count,
                interval_secs = state.current_interval,
                "Machine loop stopped"
            ),
            Err(e) => warn!(error = %e, "Machine loop task failed"),
        }
    }
    for handle in workers {
        if let Err(e) = handle.await {
            warn!(error = %e, "Worker task failed");
        }
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
