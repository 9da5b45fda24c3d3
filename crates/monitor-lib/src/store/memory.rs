use super::{async_trait, MetricStore};
use crate::error::MonitorResult;
use crate::models::MetricSample;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Samples kept per machine (24 hours at 10s)
pub const DEFAULT_RETENTION: usize = 8640;

/// Bounded in-memory history keyed by machine
pub struct InMemoryMetricStore {
    series: DashMap<String, VecDeque<MetricSample>>,
    retention: usize,
}

impl InMemoryMetricStore {
    pub fn new(retention: usize) -> Self {
        Self {
            series: DashMap::new(),
            retention: retention.max(1),
        }
    }

    pub fn len(&self, machine_id: &str) -> usize {
        self.series.get(machine_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, machine_id: &str) -> bool {
        self.len(machine_id) == 0
    }

    pub fn machines(&self) -> Vec<String> {
        self.series.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for InMemoryMetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn append(&self, sample: MetricSample) -> MonitorResult<()> {
        let mut series = self.series.entry(sample.machine_id.clone()).or_default();

        // Out-of-order samples are placed by timestamp
        let out_of_order = series
            .back()
            .map_or(false, |last| last.timestamp > sample.timestamp);
        if out_of_order {
            let pos = series.partition_point(|s| s.timestamp <= sample.timestamp);
            series.insert(pos, sample);
        } else {
            series.push_back(sample);
        }

        while series.len() > self.retention {
            series.pop_front();
        }
        Ok(())
    }

    async fn history(&self, machine_id: &str, since: i64) -> MonitorResult<Vec<MetricSample>> {
        let Some(series) = self.series.get(machine_id) else {
            return Ok(Vec::new());
        };
        let start = series.partition_point(|s| s.timestamp < since);
        Ok(series.range(start..).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(machine_id: &str, timestamp: i64) -> MetricSample {
        MetricSample {
            machine_id: machine_id.to_string(),
            timestamp,
            cpu_pct: 10.0,
            mem_pct: 20.0,
            disk_io: 0.0,
            net_io: 0.0,
            gpu_pct: None,
            process_count: 100,
        }
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_filtered() {
        let store = InMemoryMetricStore::default();
        for ts in [10, 30, 20, 40] {
            store.append(sample("a", ts)).await.unwrap();
        }

        let history = store.history("a", 20).await.unwrap();
        let stamps: Vec<i64> = history.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![20, 30, 40]);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let store = InMemoryMetricStore::new(3);
        for ts in 0..5 {
            store.append(sample("a", ts)).await.unwrap();
        }

        let history = store.history("a", i64::MIN).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp, 2);
    }

    #[tokio::test]
    async fn test_machines_are_isolated() {
        let store = InMemoryMetricStore::default();
        store.append(sample("a", 1)).await.unwrap();
        store.append(sample("b", 1)).await.unwrap();
        store.append(sample("b", 2)).await.unwrap();

        assert_eq!(store.len("a"), 1);
        assert_eq!(store.len("b"), 2);
        assert!(store.history("c", 0).await.unwrap().is_empty());
        assert_eq!(store.machines().len(), 2);
    }
}
