// =============================================================================
// Source adapter contract
// =============================================================================
//
// A uniform polling interface with per-source metadata. Concrete adapters
// implement only `fetch_price`; the default `get_data` wrapper concentrates
// timing and error-swallowing so adapters can focus on protocol/parsing.
// Errors never raise past `fetch_price` — any failure is signaled by `None`.
// =============================================================================

use async_trait::async_trait;

use crate::clock::now_unix;
use crate::types::{SourceMeta, SourceReading};

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Static metadata: name, weight, supported symbols, priority.
    fn meta(&self) -> &SourceMeta;

    /// True if this adapter serves `symbol`.
    fn supports(&self, symbol: &str) -> bool {
        self.meta().supports(symbol)
    }

    /// Fetch a price for `symbol`. Must never propagate an error to the
    /// caller — any failure (timeout, parse error, bad status) is signaled
    /// by returning `None`.
    async fn fetch_price(&self, symbol: &str) -> Option<f64>;

    /// Wrapper that measures latency, invokes `fetch_price`, and returns a
    /// standardized `SourceReading`. `max_age` is left at 0 here — the
    /// scheduler overwrites it with the effective freshness budget before
    /// storing the reading in the result cache.
    async fn get_data(&self, symbol: &str) -> Option<SourceReading> {
        let start = now_unix();
        let price = self.fetch_price(symbol).await?;
        let finished = now_unix();
        Some(SourceReading {
            source: self.meta().source_name.clone(),
            symbol: symbol.to_string(),
            price,
            latency_ms: (finished - start) * 1000.0,
            timestamp: finished,
            max_age: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct AlwaysFails;

    #[async_trait]
    impl SourceAdapter for AlwaysFails {
        fn meta(&self) -> &SourceMeta {
            static META: std::sync::OnceLock<SourceMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| SourceMeta::new("AlwaysFails"))
        }

        async fn fetch_price(&self, _symbol: &str) -> Option<f64> {
            None
        }
    }

    struct Toggle(AtomicBool);

    #[async_trait]
    impl SourceAdapter for Toggle {
        fn meta(&self) -> &SourceMeta {
            static META: std::sync::OnceLock<SourceMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| SourceMeta::new("Toggle").with_weight(0.7))
        }

        async fn fetch_price(&self, _symbol: &str) -> Option<f64> {
            if self.0.swap(false, Ordering::SeqCst) {
                Some(42.0)
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn failure_never_panics_and_returns_none() {
        let adapter = AlwaysFails;
        assert!(adapter.get_data("XAU-USD").await.is_none());
    }

    #[tokio::test]
    async fn success_produces_reading_with_positive_timestamp() {
        let adapter = Toggle(AtomicBool::new(true));
        let reading = adapter.get_data("XAU-USD").await.unwrap();
        assert_eq!(reading.price, 42.0);
        assert_eq!(reading.source, "Toggle");
        assert!(reading.timestamp > 0.0);
        assert!(reading.latency_ms >= 0.0);
    }

    #[test]
    fn supports_defaults_to_meta() {
        let adapter = AlwaysFails;
        assert!(adapter.supports("anything"));
    }
}
