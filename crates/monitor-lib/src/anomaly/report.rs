//! Plain-text anomaly report

use crate::models::{AnomalyEvent, MetricBaseline, MetricName, Severity};
use chrono::{TimeZone, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

/// Maximum events listed per severity section
const MAX_LISTED: usize = 5;

fn investigation_hint(metric: MetricName) -> &'static str {
    match metric {
        MetricName::CpuPct => "CPU spikes: check the workload scheduler and cooling",
        MetricName::MemPct => "Memory pressure: look for leaking or runaway processes",
        MetricName::DiskIo => "Disk I/O: check batch jobs and disk health",
        MetricName::NetIo => "Network I/O: inspect traffic sources and retransmits",
        MetricName::GpuPct => "GPU load: review queued jobs and thermals",
        MetricName::ProcessCount => "Process count: look for fork storms or stuck workers",
    }
}

/// Render a human-readable report for one machine
pub fn render_report(
    machine_id: &str,
    events: &[AnomalyEvent],
    baselines: &HashMap<MetricName, MetricBaseline>,
) -> String {
    let mut out = String::new();
    if events.is_empty() {
        out.push_str("No significant anomalies detected.\n");
        return out;
    }

    let _ = writeln!(out, "Anomaly report for machine {}", machine_id);

    let _ = writeln!(out, "\nNormal ranges (median values):");
    let ordered: BTreeMap<_, _> = baselines.iter().collect();
    for (metric, baseline) in &ordered {
        let _ = writeln!(out, "  {}: {:.2}", metric, baseline.median);
    }

    for (severity, title) in [
        (Severity::Critical, "CRITICAL ANOMALIES (z-score > 5)"),
        (Severity::Major, "MAJOR ANOMALIES"),
    ] {
        let listed: Vec<&AnomalyEvent> =
            events.iter().filter(|e| e.severity == severity).collect();
        if listed.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{}:", title);
        for e in listed.iter().take(MAX_LISTED) {
            let _ = writeln!(
                out,
                "  {} | {} = {:.2} (z-score: {:.2}, expected {:.2}..{:.2}) at {}",
                e.machine_id,
                e.metric_name,
                e.observed_value,
                e.z_score,
                e.expected_range.low,
                e.expected_range.high,
                format_timestamp(e.timestamp),
            );
        }
    }

    let mut hours: BTreeMap<u32, usize> = BTreeMap::new();
    for e in events {
        if let Some(t) = Utc.timestamp_opt(e.timestamp, 0).single() {
            *hours.entry(t.hour()).or_default() += 1;
        }
    }
    let mut frequent: Vec<(u32, usize)> = hours.into_iter().collect();
    frequent.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    if !frequent.is_empty() {
        let _ = writeln!(out, "\nFrequent anomaly times (UTC):");
        for (hour, count) in frequent.iter().take(3) {
            let _ = writeln!(out, "  {:02}:00 - {} anomalies", hour, count);
        }
    }

    let _ = writeln!(out, "\nPotential investigation paths:");
    let mut metrics: Vec<MetricName> = events.iter().map(|e| e.metric_name).collect();
    metrics.sort();
    metrics.dedup();
    for metric in metrics {
        let _ = writeln!(out, "  {}", investigation_hint(metric));
    }

    let _ = writeln!(out, "\nFound {} significant anomalies", events.len());
    out
}

fn format_timestamp(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExpectedRange;

    fn event(metric: MetricName, severity: Severity, ts: i64) -> AnomalyEvent {
        AnomalyEvent {
            machine_id: "aa:bb".to_string(),
            timestamp: ts,
            metric_name: metric,
            observed_value: 95.0,
            expected_range: ExpectedRange {
                low: 10.0,
                high: 30.0,
            },
            severity,
            z_score: 6.2,
        }
    }

    #[test]
    fn test_empty_report() {
        let report = render_report("m", &[], &HashMap::new());
        assert!(report.contains("No significant anomalies"));
    }

    #[test]
    fn test_report_sections() {
        let mut baselines = HashMap::new();
        baselines.insert(
            MetricName::CpuPct,
            MetricBaseline {
                median: 20.0,
                mad: 2.0,
                points: 30,
            },
        );
        // 2023-11-14 22:13:20 UTC
        let events = vec![
            event(MetricName::CpuPct, Severity::Critical, 1_700_000_000),
            event(MetricName::MemPct, Severity::Major, 1_700_000_060),
        ];

        let report = render_report("aa:bb", &events, &baselines);
        assert!(report.contains("Anomaly report for machine aa:bb"));
        assert!(report.contains("cpu_pct: 20.00"));
        assert!(report.contains("CRITICAL ANOMALIES"));
        assert!(report.contains("MAJOR ANOMALIES"));
        assert!(report.contains("22:00 - 2 anomalies"));
        assert!(report.contains("CPU spikes"));
        assert!(report.contains("Memory pressure"));
        assert!(report.contains("Found 2 significant anomalies"));
    }
}
