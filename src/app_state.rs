// =============================================================================
// Central Application State — Aurora Rates Aggregator
// =============================================================================
//
// The single source of truth shared across every polling, aggregation and
// analytics task. All subsystems hold Arc references to their own internal
// state; AppState ties them together so a single `Arc<AppState>` clone is
// all any spawned task needs.
//
// Thread safety:
//   - parking_lot::RwLock guards the mutable runtime config.
//   - ResultCache, CircuitBreaker and Metrics each manage their own interior
//     mutability and are safe to share behind a plain Arc.
//   - The KV backend is behind a trait object so the in-memory
//     implementation can later be swapped for a real store without
//     touching call sites.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::RuntimeConfig;
use crate::kv::KvStore;
use crate::metrics::Metrics;
use crate::result_cache::ResultCache;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Hot-reloadable tunables (symbols, breaker thresholds, per-source cadence).
    pub config: Arc<RwLock<RuntimeConfig>>,

    /// Latest reading per (symbol, source), used as the aggregator's input snapshot.
    pub result_cache: Arc<ResultCache>,

    /// Per-source failure tracking and recovery gating.
    pub breaker: Arc<CircuitBreaker>,

    /// Running counters surfaced for observability.
    pub metrics: Arc<Metrics>,

    /// Published quotes and pub/sub channel, backed by an in-memory store.
    pub kv: Arc<dyn KvStore>,

    /// Static per-source weight, read from each registered adapter's
    /// metadata at startup — the aggregator needs this by name only, not
    /// the adapter itself.
    pub adapter_weights: HashMap<String, f64>,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        kv: Arc<dyn KvStore>,
        adapter_weights: HashMap<String, f64>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.failure_threshold, config.recovery_timeout_s);

        Self {
            config: Arc::new(RwLock::new(config)),
            result_cache: Arc::new(ResultCache::new()),
            breaker: Arc::new(breaker),
            metrics: Arc::new(Metrics::new()),
            kv,
            adapter_weights,
        }
    }

    /// Symbols currently configured for polling, snapshotted for a caller
    /// that needs an owned `Vec` outside the config lock.
    pub fn symbols(&self) -> Vec<String> {
        self.config.read().symbols.clone()
    }
}
