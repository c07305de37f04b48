// =============================================================================
// Wall clock — the one place `SystemTime::now()` is called
// =============================================================================
//
// Every pure calculation elsewhere (freshness, breaker recovery) takes an
// explicit `now: f64` parameter instead of reading the clock itself, so
// tests can pass a fixed or advancing value without sleeping. This function
// is the single real source of "now" for the running binary.
// =============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time, seconds since the Unix epoch.
pub fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
