// =============================================================================
// Runtime configuration — hot-reloadable settings with atomic save
// =============================================================================
//
// Same shape and persistence discipline as the teacher's `runtime_config.rs`:
// every tunable lives here, every field carries a serde default so an older
// config file keeps loading after new fields are added, and saves use an
// atomic tmp + rename so a crash mid-write never corrupts the file on disk.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::circuit_breaker::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT_S};
use crate::types::SourceConfig;

fn default_symbols() -> Vec<String> {
    vec![
        "XAU-USD".to_string(),
        "XAG-USD".to_string(),
        "USD-TWD".to_string(),
    ]
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_recovery_timeout_s() -> f64 {
    DEFAULT_RECOVERY_TIMEOUT_S
}

/// Built-in `SOURCE_CONFIG` table, carried forward verbatim (interval,
/// offset, max_age in seconds) from the Python original as defaults. A
/// `SOURCE_CONFIG_PATH` JSON file can override/extend these per source.
fn default_source_config() -> HashMap<String, SourceConfig> {
    [
        ("Binance", (2.0, 0.0, 6.0)),
        ("GoldPrice.org", (15.0, 1.0, 45.0)),
        ("Sina Finance", (5.0, 0.5, 15.0)),
        ("BullionVault", (10.0, 2.0, 30.0)),
        ("Yahoo Finance", (60.0, 5.0, 180.0)),
        ("Kitco", (60.0, 10.0, 180.0)),
        ("Investing.com", (120.0, 15.0, 360.0)),
        ("OANDA", (5.0, 3.0, 15.0)),
        ("Taiwan Bank", (60.0, 20.0, 180.0)),
        ("Mock", (2.0, 0.0, 6.0)),
        ("exchangerate.host", (30.0, 12.0, 90.0)),
        ("open.er-api.com", (60.0, 25.0, 180.0)),
        ("Fawaz API", (3600.0, 30.0, 10800.0)),
        ("FloatRates", (3600.0, 45.0, 10800.0)),
        ("Gold-API", (30.0, 40.0, 90.0)),
        ("APMEX", (60.0, 50.0, 180.0)),
    ]
    .into_iter()
    .map(|(name, (interval, offset, max_age))| {
        (name.to_string(), SourceConfig::new(interval, offset, max_age))
    })
    .collect()
}

/// Top-level runtime configuration. Every field has a serde default so
/// older JSON files missing new fields still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Symbols the aggregator polls and publishes.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Consecutive failures before a source's circuit breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds a breaker stays open before permitting a recovery probe.
    #[serde(default = "default_recovery_timeout_s")]
    pub recovery_timeout_s: f64,

    /// Per-source polling cadence. Sources with no entry fall back to
    /// `SourceConfig::fallback(10.0)`, matching the Python default.
    #[serde(default = "default_source_config")]
    pub source_config: HashMap<String, SourceConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_s: default_recovery_timeout_s(),
            source_config: default_source_config(),
        }
    }
}

impl RuntimeConfig {
    /// Look up the effective `SourceConfig` for `source_name`, falling back
    /// to `{interval: 10, offset: 0, max_age: interval*3}` when unlisted.
    pub fn source_config_for(&self, source_name: &str) -> SourceConfig {
        self.source_config
            .get(source_name)
            .copied()
            .unwrap_or_else(|| SourceConfig::fallback(10.0))
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(path = %path.display(), symbols = ?config.symbols, "runtime config loaded");
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename) to prevent corruption on crash.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply environment-variable overrides (`AURORA_SYMBOLS`,
    /// `FAILURE_THRESHOLD`, `RECOVERY_TIMEOUT`), matching the teacher's
    /// `main.rs` env-override convention for symbols.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(syms) = std::env::var("AURORA_SYMBOLS") {
            let symbols: Vec<String> = syms
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !symbols.is_empty() {
                self.symbols = symbols;
            }
        }

        if let Ok(v) = std::env::var("FAILURE_THRESHOLD") {
            match v.parse() {
                Ok(n) => self.failure_threshold = n,
                Err(e) => warn!(value = %v, error = %e, "invalid FAILURE_THRESHOLD, keeping default"),
            }
        }

        if let Ok(v) = std::env::var("RECOVERY_TIMEOUT") {
            match v.parse() {
                Ok(n) => self.recovery_timeout_s = n,
                Err(e) => warn!(value = %v, error = %e, "invalid RECOVERY_TIMEOUT, keeping default"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbols, vec!["XAU-USD", "XAG-USD", "USD-TWD"]);
        assert_eq!(cfg.failure_threshold, 5);
        assert!((cfg.recovery_timeout_s - 300.0).abs() < f64::EPSILON);
        assert!(cfg.source_config.contains_key("Binance"));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.failure_threshold, 5);
        assert!(cfg.source_config.contains_key("Mock"));
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["XAU-USD"] }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["XAU-USD"]);
        assert_eq!(cfg.failure_threshold, 5);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.source_config.len(), cfg2.source_config.len());
    }

    #[test]
    fn unknown_source_falls_back_to_default_cadence() {
        let cfg = RuntimeConfig::default();
        let sc = cfg.source_config_for("Some New Source");
        assert!((sc.interval_s - 10.0).abs() < f64::EPSILON);
        assert!((sc.max_age_s - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn save_then_load_round_trips_atomically() {
        let dir = std::env::temp_dir().join(format!("aurora-rates-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("runtime_config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.symbols = vec!["XAU-USD".to_string()];
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.symbols, vec!["XAU-USD"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
