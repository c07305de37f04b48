// =============================================================================
// Mock adapter — deterministic-ish fixture source
// =============================================================================
//
// Grounded on the Python original's `sources/mock.py`: a random walk around a
// base price per symbol, always available, low weight so it never dominates
// the weighted mean. Used in the binary's default source list and in tests
// that need a source with no network dependency.
// =============================================================================

use async_trait::async_trait;
use rand::Rng;

use crate::adapter::SourceAdapter;
use crate::market_hours::is_market_open;
use crate::types::SourceMeta;

pub struct MockAdapter {
    meta: SourceMeta,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: SourceMeta::new(name).with_weight(0.3).with_priority(1),
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new("Mock")
    }
}

fn base_price(symbol: &str) -> f64 {
    let upper = symbol.to_uppercase();
    if upper.contains("XAU") {
        2650.0
    } else if upper.contains("XAG") {
        31.0
    } else {
        31.8
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    async fn fetch_price(&self, symbol: &str) -> Option<f64> {
        let delay_s = rand::thread_rng().gen_range(0.02..0.08);
        tokio::time::sleep(tokio::time::Duration::from_secs_f64(delay_s)).await;

        let base = base_price(symbol);

        // A closed market returns a flat price with no fluctuation, matching
        // the Python original.
        if !is_market_open(symbol, chrono::Utc::now()) {
            return Some(base);
        }

        let fluctuation: f64 = rand::thread_rng().gen_range(-0.5..0.5);
        Some(((base + fluctuation) * 100.0).round() / 100.0)
    }
}
