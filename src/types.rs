// =============================================================================
// Shared types used across the Aurora rates aggregator
// =============================================================================

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One successful price observation from one source for one symbol.
///
/// A reading retained in the result cache always has `price > 0` and a
/// finite `timestamp` — entry validation happens once, at the aggregator's
/// entry filter, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReading {
    pub source: String,
    pub symbol: String,
    pub price: f64,
    /// Wall time of the fetch, in milliseconds.
    pub latency_ms: f64,
    /// Wall time at fetch completion, seconds since epoch.
    pub timestamp: f64,
    /// Freshness budget in seconds, injected by the scheduler per source
    /// config — not known by the adapter itself.
    pub max_age: f64,
}

/// Static per-adapter metadata, set once at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMeta {
    pub source_name: String,
    /// Weight in (0, 1], default 0.5 if unset by the adapter.
    pub weight: f64,
    /// Symbols this source serves. Empty means "all".
    pub supported_symbols: HashSet<String>,
    /// Informational only — does not affect scheduling or aggregation.
    pub priority: u32,
}

impl SourceMeta {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            weight: 0.5,
            supported_symbols: HashSet::new(),
            priority: 1,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_supported_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// True if the adapter's supported set is empty ("all") or contains `symbol`.
    pub fn supports(&self, symbol: &str) -> bool {
        self.supported_symbols.is_empty() || self.supported_symbols.contains(symbol)
    }
}

/// Scheduler-side per-source cadence configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base poll period, seconds.
    pub interval_s: f64,
    /// Initial phase delay to de-synchronize sources, seconds.
    pub offset_s: f64,
    /// Freshness budget copied into each reading, seconds.
    pub max_age_s: f64,
}

impl SourceConfig {
    pub fn new(interval_s: f64, offset_s: f64, max_age_s: f64) -> Self {
        Self {
            interval_s,
            offset_s,
            max_age_s,
        }
    }

    /// Fallback used for sources with no `SOURCE_CONFIG` entry.
    pub fn fallback(interval_s: f64) -> Self {
        Self {
            interval_s,
            offset_s: 0.0,
            max_age_s: interval_s * 3.0,
        }
    }
}

/// Published aggregation output for one symbol, one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateQuote {
    pub symbol: String,
    /// Rounded to 2 decimals on output; internal math stays full precision.
    pub price: f64,
    /// Seconds since epoch — latest source timestamp, falling back to wall clock.
    pub timestamp: f64,
    /// Count of fresh readings, pre-outlier-filter.
    pub sources: usize,
    /// Source names retained after the outlier filter.
    pub details: Vec<String>,
    pub fastest: String,
    #[serde(rename = "fastestLatency")]
    pub fastest_latency: f64,
    #[serde(rename = "avgLatency")]
    pub avg_latency: f64,
    pub is_market_open: bool,
}
