// =============================================================================
// Metrics registry — in-memory counters and running averages
// =============================================================================
//
// A single `RwLock`-guarded bucket map, mirroring `ResultCache`/
// `CircuitBreaker`'s shape rather than per-field atomics: the per-source and
// per-symbol keyspaces grow at runtime as new sources/symbols are seen, which
// atomics (fine for the teacher's fixed-cardinality rate-limit counters)
// can't express cleanly.
// =============================================================================

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
struct SourceBucket {
    success: u64,
    failure: u64,
    avg_latency_ms: f64,
}

#[derive(Debug, Clone, Default)]
struct AggregateBucket {
    count: u64,
    avg_latency_ms: f64,
    last_sources: usize,
}

#[derive(Default)]
struct MetricsInner {
    sources: HashMap<String, SourceBucket>,
    aggregates: HashMap<String, AggregateBucket>,
    source_success_total: u64,
    source_failure_total: u64,
    aggregate_success_total: u64,
}

/// Process-wide, thread-shared metrics registry.
pub struct Metrics {
    inner: RwLock<MetricsInner>,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MetricsInner::default()),
            start_time: Instant::now(),
        }
    }

    pub fn record_source_success(&self, source: &str, latency_ms: f64) {
        let mut inner = self.inner.write();
        inner.source_success_total += 1;
        let bucket = inner.sources.entry(source.to_string()).or_default();
        bucket.success += 1;
        let count = bucket.success as f64;
        bucket.avg_latency_ms =
            round2(((bucket.avg_latency_ms * (count - 1.0)) + latency_ms) / count);
    }

    pub fn record_source_failure(&self, source: &str) {
        let mut inner = self.inner.write();
        inner.source_failure_total += 1;
        let bucket = inner.sources.entry(source.to_string()).or_default();
        bucket.failure += 1;
    }

    pub fn record_aggregate(&self, symbol: &str, source_count: usize, avg_latency_ms: f64) {
        let mut inner = self.inner.write();
        inner.aggregate_success_total += 1;
        let bucket = inner.aggregates.entry(symbol.to_string()).or_default();
        bucket.count += 1;
        let count = bucket.count as f64;
        bucket.avg_latency_ms =
            round2(((bucket.avg_latency_ms * (count - 1.0)) + avg_latency_ms) / count);
        bucket.last_sources = source_count;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        MetricsSnapshot {
            sources: inner
                .sources
                .iter()
                .map(|(name, b)| {
                    (
                        name.clone(),
                        SourceMetricsSnapshot {
                            success: b.success,
                            failure: b.failure,
                            avg_latency_ms: b.avg_latency_ms,
                        },
                    )
                })
                .collect(),
            aggregates: inner
                .aggregates
                .iter()
                .map(|(symbol, b)| {
                    (
                        symbol.clone(),
                        AggregateMetricsSnapshot {
                            count: b.count,
                            avg_latency_ms: b.avg_latency_ms,
                            last_sources: b.last_sources,
                        },
                    )
                })
                .collect(),
            source_success_total: inner.source_success_total,
            source_failure_total: inner.source_failure_total,
            aggregate_success_total: inner.aggregate_success_total,
            uptime_seconds: round2(self.start_time.elapsed().as_secs_f64()),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceMetricsSnapshot {
    pub success: u64,
    pub failure: u64,
    #[serde(rename = "avgLatencyMs")]
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetricsSnapshot {
    pub count: u64,
    #[serde(rename = "avgLatencyMs")]
    pub avg_latency_ms: f64,
    #[serde(rename = "lastSources")]
    pub last_sources: usize,
}

/// Serializable snapshot returned by `Metrics::snapshot`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub sources: HashMap<String, SourceMetricsSnapshot>,
    pub aggregates: HashMap<String, AggregateMetricsSnapshot>,
    #[serde(rename = "sourceSuccessTotal")]
    pub source_success_total: u64,
    #[serde(rename = "sourceFailureTotal")]
    pub source_failure_total: u64,
    #[serde(rename = "aggregateSuccessTotal")]
    pub aggregate_success_total: u64,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_matches_incremental_formula() {
        let metrics = Metrics::new();
        metrics.record_source_success("S", 10.0);
        metrics.record_source_success("S", 20.0);
        metrics.record_source_success("S", 30.0);
        let snap = metrics.snapshot();
        let bucket = &snap.sources["S"];
        assert_eq!(bucket.success, 3);
        assert!((bucket.avg_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn failure_does_not_affect_latency_average() {
        let metrics = Metrics::new();
        metrics.record_source_success("S", 10.0);
        metrics.record_source_failure("S");
        let snap = metrics.snapshot();
        let bucket = &snap.sources["S"];
        assert_eq!(bucket.failure, 1);
        assert!((bucket.avg_latency_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_tracks_last_source_count() {
        let metrics = Metrics::new();
        metrics.record_aggregate("XAU-USD", 4, 50.0);
        metrics.record_aggregate("XAU-USD", 3, 70.0);
        let snap = metrics.snapshot();
        let bucket = &snap.aggregates["XAU-USD"];
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.last_sources, 3);
        assert!((bucket.avg_latency_ms - 60.0).abs() < 1e-9);
    }

    #[test]
    fn uptime_is_nonnegative() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert!(snap.uptime_seconds >= 0.0);
    }
}
