// =============================================================================
// Circuit Breaker — per-source availability gate
// =============================================================================
//
// Closed/open/half-open failure gate, one `CircuitState` per source name.
// `is_available` is the single method that both reads and, on recovery,
// mutates state: it permits exactly one probe per recovery window rather
// than modeling a distinct half-open state. That asymmetry is load-bearing
// (see the open-question note on `is_available`) and must not be "cleaned
// up" into two separate calls.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default consecutive-failure count before a source's breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default seconds a breaker stays open before permitting a probe.
pub const DEFAULT_RECOVERY_TIMEOUT_S: f64 = 300.0;

/// Per-source breaker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub failure_count: u32,
    pub last_failure_ts: f64,
    pub open: bool,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            failure_count: 0,
            last_failure_ts: 0.0,
            open: false,
        }
    }
}

/// Per-source failure gate. Config fields sit outside the lock, mirroring
/// `RiskEngine`'s config-fields/mutable-state split.
pub struct CircuitBreaker {
    state: RwLock<HashMap<String, CircuitState>>,
    failure_threshold: u32,
    recovery_timeout_s: f64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout_s: f64) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            failure_threshold,
            recovery_timeout_s,
        }
    }

    /// Record a failed poll for `source`. Opens the breaker once the
    /// consecutive-failure count reaches the threshold.
    pub fn record_failure(&self, source: &str, now: f64) {
        let mut state = self.state.write();
        let entry = state.entry(source.to_string()).or_default();
        entry.failure_count += 1;
        entry.last_failure_ts = now;

        if entry.failure_count >= self.failure_threshold && !entry.open {
            entry.open = true;
            warn!(source, failures = entry.failure_count, "circuit breaker open");
        }
    }

    /// Record a successful (or filter-surviving) result for `source`.
    /// Decrements the failure count toward zero; closes the breaker once
    /// it reaches zero.
    pub fn record_success(&self, source: &str) {
        let mut state = self.state.write();
        if let Some(entry) = state.get_mut(source) {
            entry.failure_count = entry.failure_count.saturating_sub(1);
            if entry.open && entry.failure_count == 0 {
                entry.open = false;
                info!(source, "circuit breaker closed");
            }
        }
    }

    /// True if `source` is available to poll right now.
    ///
    /// If the breaker is open and `recovery_timeout_s` has elapsed since the
    /// last failure, this call itself transitions the source to half-open:
    /// `failure_count` is set to `threshold - 1`, `open` is cleared, and
    /// `true` is returned — permitting exactly one probe. The next
    /// `record_success`/`record_failure` decides whether it re-closes or
    /// re-opens.
    pub fn is_available(&self, source: &str, now: f64) -> bool {
        let mut state = self.state.write();
        let Some(entry) = state.get_mut(source) else {
            return true;
        };
        if !entry.open {
            return true;
        }
        if now - entry.last_failure_ts > self.recovery_timeout_s {
            info!(source, "circuit breaker half-open, permitting one probe");
            entry.failure_count = self.failure_threshold.saturating_sub(1);
            entry.open = false;
            return true;
        }
        false
    }

    /// Snapshot current breaker states, keyed by source name.
    pub fn snapshot(&self) -> HashMap<String, CircuitState> {
        self.state.read().clone()
    }
}
