// =============================================================================
// Analytics loop — optional spot/futures spread logger
// =============================================================================
//
// Grounded on the Python original's `scheduler.py::_log_spread_loop`: every
// 60 s, for each configured (spot, futures) symbol pair, read both latest
// quotes from the KV backend and log the spread. Disabled by default (no
// pairs configured); excluded from correctness testing per the spec's
// non-goals, kept because it costs one small function in the teacher's
// "many independent tokio::spawn loops" style.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::kv::KvStore;
use crate::types::AggregateQuote;

const SPREAD_LOG_INTERVAL_S: u64 = 60;

async fn latest_quote(state: &AppState, symbol: &str) -> Option<AggregateQuote> {
    let key = format!("market:latest:{symbol}");
    let bytes = match state.kv.get(&key).await {
        Ok(bytes) => bytes?,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "analytics: failed to read latest quote");
            return None;
        }
    };
    serde_json::from_slice(&bytes).ok()
}

/// Logs the spot/futures spread for each `(spot, futures)` pair in `pairs`
/// every `SPREAD_LOG_INTERVAL_S` seconds, until shutdown.
pub async fn spread_log_loop(
    state: Arc<AppState>,
    pairs: Vec<(String, String)>,
    mut rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(SPREAD_LOG_INTERVAL_S));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = rx.changed() => {
                if !*rx.borrow() {
                    return;
                }
            }
        }

        if !*rx.borrow() {
            return;
        }

        for (spot_symbol, futures_symbol) in &pairs {
            let spot = latest_quote(&state, spot_symbol).await;
            let futures = latest_quote(&state, futures_symbol).await;

            match (spot, futures) {
                (Some(spot), Some(futures)) => {
                    let spread = futures.price - spot.price;
                    let spread_bps = if spot.price != 0.0 {
                        (spread / spot.price) * 10_000.0
                    } else {
                        0.0
                    };
                    info!(
                        spot = %spot_symbol,
                        futures = %futures_symbol,
                        spot_price = spot.price,
                        futures_price = futures.price,
                        spread,
                        spread_bps,
                        "spot/futures spread"
                    );
                }
                _ => {
                    info!(spot = %spot_symbol, futures = %futures_symbol, "analytics: missing quote, skipping");
                }
            }
        }
    }
}
