use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Latency samples kept per operation for the p95 estimate.
const MAX_LATENCY_SAMPLES: usize = 1024;

#[derive(Debug, Default)]
struct OperationStats {
    total_calls: u64,
    successful_calls: u64,
    total_latency: Duration,
    latencies: VecDeque<Duration>,
    error_counts: BTreeMap<String, u64>,
}

/// Aggregated view of one operation's calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub error_counts: BTreeMap<String, u64>,
}

/// Call counts, latencies and error kinds per named operation.
///
/// Read-only aggregation: nothing here feeds back into control flow.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    operations: Mutex<HashMap<String, OperationStats>>,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: &str, latency: Duration, error_kind: Option<&str>) {
        let mut operations = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stats = operations.entry(operation.to_string()).or_default();

        stats.total_calls += 1;
        stats.total_latency += latency;
        if stats.latencies.len() == MAX_LATENCY_SAMPLES {
            stats.latencies.pop_front();
        }
        stats.latencies.push_back(latency);

        match error_kind {
            None => stats.successful_calls += 1,
            Some(kind) => *stats.error_counts.entry(kind.to_string()).or_default() += 1,
        }
    }

    /// Snapshot for one operation; an unknown operation yields zeroes.
    #[must_use]
    pub fn snapshot(&self, operation: &str) -> MetricsSnapshot {
        let operations = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        operations
            .get(operation)
            .map(summarize)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn all(&self) -> BTreeMap<String, MetricsSnapshot> {
        let operations = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        operations
            .iter()
            .map(|(name, stats)| (name.clone(), summarize(stats)))
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(stats: &OperationStats) -> MetricsSnapshot {
    if stats.total_calls == 0 {
        return MetricsSnapshot::default();
    }
    let calls = stats.total_calls as f64;

    let mut sorted: Vec<Duration> = stats.latencies.iter().copied().collect();
    sorted.sort_unstable();
    let p95 = if sorted.is_empty() {
        Duration::ZERO
    } else {
        let idx = (sorted.len() * 95 / 100).min(sorted.len() - 1);
        sorted[idx]
    };

    MetricsSnapshot {
        total_calls: stats.total_calls,
        success_rate: stats.successful_calls as f64 / calls,
        avg_latency_ms: stats.total_latency.as_secs_f64() * 1000.0 / calls,
        p95_latency_ms: p95.as_secs_f64() * 1000.0,
        error_counts: stats.error_counts.clone(),
    }
}
