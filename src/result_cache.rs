// =============================================================================
// Result cache — latest reading per (symbol, source), scheduler -> aggregator
// =============================================================================
//
// Single writer per (symbol, source) key (the corresponding poller), single
// reader (the aggregation tick). Entries are created on first successful
// poll and overwritten thereafter — never deleted; staleness is handled
// downstream by the aggregator's freshness filter.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::SourceReading;

/// `symbol -> source_name -> latest SourceReading`, mirroring
/// `AppState::trade_processors`'s `RwLock<HashMap<...>>` shape.
#[derive(Default)]
pub struct ResultCache {
    inner: RwLock<HashMap<String, HashMap<String, SourceReading>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or overwrite) the latest reading for `(reading.symbol, reading.source)`.
    pub fn store(&self, reading: SourceReading) {
        let mut inner = self.inner.write();
        inner
            .entry(reading.symbol.clone())
            .or_default()
            .insert(reading.source.clone(), reading);
    }

    /// Snapshot all current readings for `symbol`. A shallow copy taken
    /// before aggregation, avoiding races with concurrent mid-tick updates.
    pub fn snapshot(&self, symbol: &str) -> Vec<SourceReading> {
        self.inner
            .read()
            .get(symbol)
            .map(|by_source| by_source.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(source: &str, symbol: &str, price: f64) -> SourceReading {
        SourceReading {
            source: source.to_string(),
            symbol: symbol.to_string(),
            price,
            latency_ms: 10.0,
            timestamp: 1000.0,
            max_age: 10.0,
        }
    }

    #[test]
    fn store_then_snapshot_returns_reading() {
        let cache = ResultCache::new();
        cache.store(reading("Binance", "XAU-USD", 2650.0));
        let snap = cache.snapshot("XAU-USD");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].source, "Binance");
    }

    #[test]
    fn latest_write_wins_per_source() {
        let cache = ResultCache::new();
        cache.store(reading("Binance", "XAU-USD", 2650.0));
        cache.store(reading("Binance", "XAU-USD", 2651.0));
        let snap = cache.snapshot("XAU-USD");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].price, 2651.0);
    }

    #[test]
    fn distinct_sources_coexist() {
        let cache = ResultCache::new();
        cache.store(reading("Binance", "XAU-USD", 2650.0));
        cache.store(reading("Kitco", "XAU-USD", 2651.0));
        assert_eq!(cache.snapshot("XAU-USD").len(), 2);
    }

    #[test]
    fn unknown_symbol_snapshots_empty() {
        let cache = ResultCache::new();
        assert!(cache.snapshot("USD-TWD").is_empty());
    }
}
