//! Local host metrics via sysinfo

use super::{async_trait, MetricSource};
use crate::error::{MonitorError, MonitorResult};
use crate::models::MetricSample;
use std::sync::{Arc, Mutex};
use sysinfo::{Networks, System};
use tracing::debug;

struct HostState {
    system: System,
    networks: Networks,
}

/// Reads CPU, memory, disk, network and process figures for this host
pub struct SystemMetricSource {
    machine_id: String,
    state: Arc<Mutex<HostState>>,
}

impl SystemMetricSource {
    /// Create a source labelled with the host name, falling back to `"localhost"`
    pub fn new() -> Self {
        let machine_id = System::host_name().unwrap_or_else(|| "localhost".to_string());
        Self::with_machine_id(machine_id)
    }

    pub fn with_machine_id(machine_id: impl Into<String>) -> Self {
        let mut system = System::new_all();
        // Prime CPU counters so the first real read has a baseline
        system.refresh_cpu();
        Self {
            machine_id: machine_id.into(),
            state: Arc::new(Mutex::new(HostState {
                system,
                networks: Networks::new_with_refreshed_list(),
            })),
        }
    }
}

impl Default for SystemMetricSource {
    fn default() -> Self {
        Self::new()
    }
}

fn read_host(machine_id: &str, state: &Mutex<HostState>) -> MonitorResult<MetricSample> {
    let mut guard = state
        .lock()
        .map_err(|_| MonitorError::source_failure(machine_id, "host state lock poisoned"))?;
    let HostState { system, networks } = &mut *guard;

    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_processes();
    networks.refresh();

    let total_memory = system.total_memory();
    if total_memory == 0 {
        return Err(MonitorError::source_failure(machine_id, "memory totals unavailable"));
    }
    let mem_pct = system.used_memory() as f64 / total_memory as f64 * 100.0;

    let disk_io: u64 = system
        .processes()
        .values()
        .map(|p| {
            let usage = p.disk_usage();
            usage.read_bytes + usage.written_bytes
        })
        .sum();

    let net_io: u64 = networks
        .iter()
        .map(|(_, data)| data.received() + data.transmitted())
        .sum();

    Ok(MetricSample {
        machine_id: machine_id.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        cpu_pct: system.global_cpu_info().cpu_usage() as f64,
        mem_pct,
        disk_io: disk_io as f64,
        net_io: net_io as f64,
        gpu_pct: None,
        process_count: system.processes().len() as u32,
    })
}

#[async_trait]
impl MetricSource for SystemMetricSource {
    fn machine_id(&self) -> &str {
        &self.machine_id
    }

    async fn read(&self) -> MonitorResult<MetricSample> {
        let state = Arc::clone(&self.state);
        let machine_id = self.machine_id.clone();

        let sample = tokio::task::spawn_blocking(move || read_host(&machine_id, &state))
            .await
            .map_err(|e| MonitorError::source_failure(&self.machine_id, e))??;

        debug!(
            machine_id = %sample.machine_id,
            cpu_pct = sample.cpu_pct,
            mem_pct = sample.mem_pct,
            "Host sample read"
        );
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_local_host() {
        let source = SystemMetricSource::with_machine_id("test-host");
        let sample = source.read().await.unwrap();

        assert_eq!(sample.machine_id, "test-host");
        assert!(sample.mem_pct >= 0.0 && sample.mem_pct <= 100.0);
        assert!(sample.cpu_pct >= 0.0);
        assert!(sample.gpu_pct.is_none());
    }
}
