// =============================================================================
// Binance adapter — PAXG/USDT as a proxy for XAU-USD
// =============================================================================
//
// Public, unauthenticated ticker endpoint — no HMAC signing needed, unlike
// the teacher's `binance/client.rs` (which signs trading requests). One
// shared `reqwest::Client` per adapter instance, matching the "one shared,
// reusable session/connection pool" resource limit in §5.
// =============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::adapter::SourceAdapter;
use crate::http_client::get_json_with_retries;
use crate::types::SourceMeta;

const TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price";

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

pub struct BinanceAdapter {
    meta: SourceMeta,
    client: reqwest::Client,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("failed to build reqwest client");

        Self {
            meta: SourceMeta::new("Binance")
                .with_weight(0.8)
                .with_priority(1)
                .with_supported_symbols(["XAU-USD"]),
            client,
        }
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for BinanceAdapter {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    fn supports(&self, symbol: &str) -> bool {
        symbol.to_uppercase().contains("XAU")
    }

    #[instrument(skip(self), fields(source = "Binance"))]
    async fn fetch_price(&self, symbol: &str) -> Option<f64> {
        if !symbol.to_uppercase().contains("XAU") {
            return None;
        }

        let response =
            get_json_with_retries(&self.client, TICKER_URL, &[("symbol", "PAXGUSDT")]).await?;

        let body: TickerResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Binance ticker response parse failure");
                return None;
            }
        };

        match body.price.parse::<f64>() {
            Ok(price) if price > 0.0 => {
                debug!(price, "Binance PAXG/USDT fetched");
                Some(price)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_xau_only() {
        let adapter = BinanceAdapter::new();
        assert!(adapter.supports("XAU-USD"));
        assert!(!adapter.supports("USD-TWD"));
        assert!(!adapter.supports("XAG-USD"));
    }

    #[test]
    fn meta_has_high_weight() {
        let adapter = BinanceAdapter::new();
        assert!((adapter.meta().weight - 0.8).abs() < f64::EPSILON);
    }
}
