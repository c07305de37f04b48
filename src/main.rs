// =============================================================================
// Aurora Rates — Main Entry Point
// =============================================================================
//
// A real-time multi-source market-price aggregator: many polling loops feed
// a shared result cache, one aggregation loop turns the freshest readings
// into a published quote per symbol.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod adapter;
mod adapters;
mod aggregator;
mod app_state;
mod circuit_breaker;
mod clock;
mod config;
mod http_client;
mod kv;
mod market_hours;
mod metrics;
mod result_cache;
mod scheduler;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapter::SourceAdapter;
use crate::adapters::binance::BinanceAdapter;
use crate::adapters::mock::MockAdapter;
use crate::app_state::AppState;
use crate::config::RuntimeConfig;
use crate::kv::InMemoryKv;
use crate::scheduler::Scheduler;

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║            Aurora Rates — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides();

    info!(symbols = ?config.symbols, "configured symbols");
    info!(
        failure_threshold = config.failure_threshold,
        recovery_timeout_s = config.recovery_timeout_s,
        "circuit breaker configured"
    );

    // ── 2. Build source adapters ──────────────────────────────────────────
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(BinanceAdapter::new()),
        Arc::new(MockAdapter::new("Mock")),
    ];

    let adapter_weights: HashMap<String, f64> = adapters
        .iter()
        .map(|a| (a.meta().source_name.clone(), a.meta().weight))
        .collect();

    // ── 3. Build shared state ────────────────────────────────────────────
    let kv = Arc::new(InMemoryKv::new());
    let state = Arc::new(AppState::new(config, kv, adapter_weights));

    // ── 4. Spawn polling + aggregation tasks ─────────────────────────────
    let scheduler = Scheduler::spawn(state.clone(), adapters, Vec::new());

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    scheduler.shutdown().await;

    if let Err(e) = state.config.read().save(CONFIG_PATH) {
        warn!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("Aurora Rates shut down complete.");
    Ok(())
}
