// =============================================================================
// Scheduler — one polling loop per (source, symbol), one aggregation loop
// =============================================================================
//
// Grounded on the teacher's `main.rs` pattern of many independent
// `tokio::spawn` loops sharing `Arc<AppState>`, generalized with a
// `watch::Sender<bool>` "running" flag so shutdown can interrupt an
// in-progress sleep rather than waiting it out (§5.1).
// =============================================================================

pub mod analytics;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::SourceAdapter;
use crate::aggregator;
use crate::app_state::AppState;
use crate::kv::KvStore;
use crate::market_hours::is_market_open;
use crate::types::SourceReading;

/// Non-crypto closed-market sources sleep this long per cycle instead of
/// their configured interval, and their effective max_age widens to at
/// least this many seconds — matches §4.3 step 2e.
const CLOSED_MARKET_SLEEP_S: f64 = 30.0;
const CLOSED_MARKET_MIN_MAX_AGE_S: f64 = 60.0;

const SCALE_MIN: f64 = 1.0;
const SCALE_MAX: f64 = 4.0;
const SCALE_DECAY: f64 = 0.9;
const SCALE_GROWTH: f64 = 1.5;

const CRYPTO_KEYWORDS: [&str; 4] = ["BTC", "ETH", "PAXG", "USDT"];

fn is_crypto_source(source_name: &str) -> bool {
    let upper = source_name.to_uppercase();
    CRYPTO_KEYWORDS.iter().any(|kw| upper.contains(kw)) || source_name.eq_ignore_ascii_case("Binance")
}

/// Widens `base_max_age` to at least `CLOSED_MARKET_MIN_MAX_AGE_S` when the
/// market is closed for this source's symbol, per §4.3 step 2e. Extracted so
/// the widening rule is unit-testable without a live clock or adapter.
fn effective_max_age(base_max_age: f64, market_closed_for_source: bool) -> f64 {
    if market_closed_for_source {
        base_max_age.max(CLOSED_MARKET_MIN_MAX_AGE_S)
    } else {
        base_max_age
    }
}

/// Sleeps `duration`, returning early if `rx` observes a shutdown signal.
/// Returns `false` if shutdown fired during the sleep.
async fn sleep_or_shutdown(duration: Duration, rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = rx.changed() => !*rx.borrow(),
    }
}

/// Drives one `(source, symbol)` polling loop until shutdown.
async fn poll_loop(
    state: Arc<AppState>,
    adapter: Arc<dyn SourceAdapter>,
    symbol: String,
    mut rx: watch::Receiver<bool>,
) {
    let source_name = adapter.meta().source_name.clone();
    let base_config = state.config.read().source_config_for(&source_name);

    if base_config.offset_s > 0.0 {
        if !sleep_or_shutdown(Duration::from_secs_f64(base_config.offset_s), &mut rx).await {
            return;
        }
    }

    let mut scale = 1.0_f64;

    loop {
        if !*rx.borrow() {
            return;
        }

        let market_closed_for_source =
            !is_market_open(&symbol, Utc::now()) && !is_crypto_source(&source_name);
        let max_age = effective_max_age(base_config.max_age_s, market_closed_for_source);

        if !state.breaker.is_available(&source_name, now_unix()) {
            debug!(source = %source_name, symbol = %symbol, "breaker open, skipping cycle");
        } else {
            match adapter.get_data(&symbol).await {
                Some(mut reading) => {
                    reading.max_age = max_age;
                    state.metrics.record_source_success(&source_name, reading.latency_ms);
                    state.result_cache.store(reading);
                    scale = (scale * SCALE_DECAY).max(SCALE_MIN);
                }
                None => {
                    state.breaker.record_failure(&source_name, now_unix());
                    state.metrics.record_source_failure(&source_name);
                    scale = (scale * SCALE_GROWTH).min(SCALE_MAX);
                }
            }
        }

        let sleep_s = if market_closed_for_source {
            CLOSED_MARKET_SLEEP_S
        } else {
            base_config.interval_s * scale
        };

        if !sleep_or_shutdown(Duration::from_secs_f64(sleep_s), &mut rx).await {
            return;
        }
    }
}

fn now_unix() -> f64 {
    crate::clock::now_unix()
}

/// Drives the 1 Hz aggregation loop across all configured symbols.
async fn aggregation_loop(state: Arc<AppState>, mut rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

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

        let symbols = state.symbols();
        let weights = adapter_weights(&state);

        for symbol in &symbols {
            let readings: Vec<SourceReading> = state.result_cache.snapshot(symbol);
            let quote = match aggregator::aggregate(symbol, &readings, now_unix(), &weights, &state.breaker) {
                Some(q) => q,
                None => {
                    warn!(symbol = %symbol, "no fresh data this tick, skipping publication");
                    continue;
                }
            };

            let payload = match serde_json::to_vec(&quote) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "failed to serialise aggregate quote");
                    continue;
                }
            };

            let stream_key = format!("market:stream:{symbol}");
            let latest_key = format!("market:latest:{symbol}");

            if let Err(e) = state.kv.publish(&stream_key, payload.clone()).await {
                warn!(symbol = %symbol, error = %e, "publish failed, will retry next tick");
            }
            if let Err(e) = state.kv.set(&latest_key, payload).await {
                warn!(symbol = %symbol, error = %e, "set latest failed, will retry next tick");
            }

            state
                .metrics
                .record_aggregate(symbol, quote.sources, quote.avg_latency);
        }
    }
}

/// Snapshot of per-source weights the aggregator needs, read out of the
/// registered adapters' metadata (held separately from `AppState` since
/// weights are static per adapter instance, not a runtime config knob).
fn adapter_weights(state: &AppState) -> HashMap<String, f64> {
    state.adapter_weights.clone()
}

/// Owns every spawned task handle and the shutdown signal used to stop them.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns one polling task per `(source, symbol)` passing `supports`,
    /// plus the aggregation loop and (if `analytics_pairs` is non-empty)
    /// the spread-logging analytics loop.
    pub fn spawn(
        state: Arc<AppState>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        analytics_pairs: Vec<(String, String)>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        let mut handles = Vec::new();

        let symbols = state.symbols();

        for adapter in &adapters {
            for symbol in &symbols {
                if !adapter.supports(symbol) {
                    continue;
                }
                let state = state.clone();
                let adapter = adapter.clone();
                let symbol = symbol.clone();
                let rx = shutdown_rx.clone();
                handles.push(tokio::spawn(poll_loop(state, adapter, symbol, rx)));
            }
        }

        info!(tasks = handles.len(), "polling tasks spawned");

        {
            let state = state.clone();
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(aggregation_loop(state, rx)));
        }

        if !analytics_pairs.is_empty() {
            let state = state.clone();
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(analytics::spread_log_loop(
                state,
                analytics_pairs,
                rx,
            )));
        }

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Flips the running flag and awaits every spawned task, matching the
    /// Python `Scheduler.stop()`'s `gather(*tasks, return_exceptions=True)`.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(false);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler task panicked during shutdown");
            }
        }
    }
}
