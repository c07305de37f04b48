// =============================================================================
// Aggregator — freshness weighting, MAD outlier filter, weighted mean
// =============================================================================
//
// `aggregate` is a free function, not a method needing `&self` beyond the
// breaker/weights it is handed, so it is directly unit-testable without
// constructing a whole `AppState` — matching the Python original's
// `Aggregator.aggregate` being the single entry point the scheduler calls.
//
// Preserves two intentional asymmetries called out in the design notes:
//   - `breaker.record_success` is credited for every reading that passes the
//     entry filter (price > 0), even if it is later dropped by the outlier
//     filter. The scheduler credits failures on its own; this crediting
//     happens here, independent of freshness/outlier survival.
//   - the MAD threshold, not the Python original's fixed 0.3% band — the
//     spec is authoritative here and supersedes the simpler original.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use tracing::warn;

use crate::circuit_breaker::CircuitBreaker;
use crate::market_hours::is_market_open;
use crate::types::{AggregateQuote, SourceReading};

const DEFAULT_WEIGHT: f64 = 0.5;
const FRESHNESS_FLOOR_AGE_S: f64 = 2.0;
const TOP_N_LATENCY: usize = 5;

struct AggEntry {
    source: String,
    price: f64,
    eff_weight: f64,
    latency_ms: f64,
    timestamp: f64,
}

/// Run one aggregation tick for `symbol` over its current result-cache
/// snapshot. Returns `None` (and logs a warning) if no reading survives the
/// freshness filter.
pub fn aggregate(
    symbol: &str,
    readings: &[SourceReading],
    now: f64,
    weights: &HashMap<String, f64>,
    breaker: &CircuitBreaker,
) -> Option<AggregateQuote> {
    // Step 1 — entry filter: drop price <= 0; credit breaker success for
    // every reading that passes, independent of what happens next.
    let valid: Vec<&SourceReading> = readings
        .iter()
        .filter(|r| r.price > 0.0 && r.price.is_finite())
        .collect();

    for r in &valid {
        breaker.record_success(&r.source);
    }

    if valid.is_empty() {
        warn!(symbol, "no valid data for symbol");
        return None;
    }

    // Step 2 — freshness filter.
    let mut fresh_entries: Vec<AggEntry> = Vec::new();
    for r in &valid {
        let age = (now - r.timestamp).max(0.0);
        if age > r.max_age {
            continue;
        }
        let freshness = freshness_for_age(age, r.max_age);
        let weight = weights.get(&r.source).copied().unwrap_or(DEFAULT_WEIGHT);
        let eff_weight = weight * freshness;
        if eff_weight <= 0.0 {
            continue;
        }
        fresh_entries.push(AggEntry {
            source: r.source.clone(),
            price: r.price,
            eff_weight,
            latency_ms: r.latency_ms,
            timestamp: r.timestamp,
        });
    }

    if fresh_entries.is_empty() {
        warn!(symbol, "no fresh data for symbol");
        return None;
    }

    // Step 3 — MAD outlier filter, only with >= 3 survivors.
    let post_filter: Vec<&AggEntry> = if fresh_entries.len() >= 3 {
        let prices: Vec<f64> = fresh_entries.iter().map(|e| e.price).collect();
        let median = median(&prices);
        let deviations: Vec<f64> = prices.iter().map(|p| (p - median).abs()).collect();
        let mad = median(&deviations);
        let threshold = (3.0 * mad).clamp(median * 0.0005, median * 0.01);

        let kept: Vec<&AggEntry> = fresh_entries
            .iter()
            .filter(|e| (e.price - median).abs() <= threshold)
            .collect();

        if kept.is_empty() {
            fresh_entries.iter().collect()
        } else {
            kept
        }
    } else {
        fresh_entries.iter().collect()
    };

    // Step 4 — weighted price.
    let total_weight: f64 = post_filter.iter().map(|e| e.eff_weight).sum();
    let final_price = if total_weight > 0.0 {
        post_filter.iter().map(|e| e.price * e.eff_weight).sum::<f64>() / total_weight
    } else {
        post_filter.iter().map(|e| e.price).sum::<f64>() / post_filter.len() as f64
    };

    // Step 5 — latency summary, computed over pre-outlier fresh entries.
    let fastest_entry = fresh_entries
        .iter()
        .min_by(|a, b| a.latency_ms.partial_cmp(&b.latency_ms).unwrap())
        .expect("fresh_entries is non-empty");
    let fastest = fastest_entry.source.clone();
    let fastest_latency = round(fastest_entry.latency_ms, 1);

    let mut by_latency: Vec<&AggEntry> = fresh_entries.iter().collect();
    by_latency.sort_by(|a, b| a.latency_ms.partial_cmp(&b.latency_ms).unwrap());
    let top: Vec<&AggEntry> = by_latency.into_iter().take(TOP_N_LATENCY).collect();
    let top_weight: f64 = top.iter().map(|e| e.eff_weight).sum();
    let avg_latency = if top_weight > 0.0 {
        round(
            top.iter().map(|e| e.latency_ms * e.eff_weight).sum::<f64>() / top_weight,
            1,
        )
    } else {
        0.0
    };

    // Step 6 — output shaping.
    let timestamp = post_filter
        .iter()
        .map(|e| e.timestamp)
        .fold(None, |acc: Option<f64>, ts| {
            Some(acc.map_or(ts, |cur| cur.max(ts)))
        })
        .unwrap_or(now);

    let details: Vec<String> = post_filter.iter().map(|e| e.source.clone()).collect();

    let now_dt = chrono::DateTime::<Utc>::from_timestamp(now as i64, 0).unwrap_or_else(Utc::now);
    let market_open = is_market_open(symbol, now_dt);

    Some(AggregateQuote {
        symbol: symbol.to_string(),
        price: round(final_price, 2),
        timestamp,
        sources: fresh_entries.len(),
        details,
        fastest,
        fastest_latency,
        avg_latency,
        is_market_open: market_open,
    })
}

fn freshness_for_age(age: f64, max_age: f64) -> f64 {
    if age < FRESHNESS_FLOOR_AGE_S {
        1.0
    } else {
        (-(age - FRESHNESS_FLOOR_AGE_S) / (max_age / 2.0).max(1.0)).exp()
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn round(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(source: &str, price: f64, latency_ms: f64, ts: f64, max_age: f64) -> SourceReading {
        SourceReading {
            source: source.to_string(),
            symbol: "XAU-USD".to_string(),
            price,
            latency_ms,
            timestamp: ts,
            max_age,
        }
    }

    fn weights(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn weighted_mean_correctness() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        let readings = vec![
            reading("S1", 100.0, 10.0, now, 10.0),
            reading("S2", 110.0, 10.0, now, 10.0),
        ];
        let w = weights(&[("S1", 0.5), ("S2", 0.5)]);
        let quote = aggregate("XAU-USD", &readings, now, &w, &breaker).unwrap();
        assert!((quote.price - 105.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_a_outlier_rejection() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        let readings = vec![
            reading("S1", 100.0, 10.0, now, 10.0),
            reading("S2", 100.5, 10.0, now, 10.0),
            reading("S3", 101.0, 10.0, now, 10.0),
            reading("S4", 1000.0, 10.0, now, 10.0),
        ];
        let w = weights(&[("S1", 0.5), ("S2", 0.5), ("S3", 0.5), ("S4", 0.5)]);
        let quote = aggregate("XAU-USD", &readings, now, &w, &breaker).unwrap();
        assert_eq!(quote.sources, 4);
        let mut details = quote.details.clone();
        details.sort();
        assert_eq!(details, vec!["S1", "S2", "S3"]);
        assert!((quote.price - 100.5).abs() < 1e-6);
    }

    #[test]
    fn scenario_b_freshness_boundary() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        let readings = vec![
            reading("S1", 100.0, 10.0, now - 1.0, 10.0),
            reading("S2", 200.0, 10.0, now - 12.0, 10.0),
        ];
        let w = weights(&[("S1", 0.5), ("S2", 0.5)]);
        let quote = aggregate("XAU-USD", &readings, now, &w, &breaker).unwrap();
        assert_eq!(quote.details, vec!["S1"]);
        assert!((quote.price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_d_no_fresh_data_returns_none() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        let readings = vec![reading("S1", 100.0, 10.0, now - 100.0, 10.0)];
        let w = weights(&[("S1", 0.5)]);
        assert!(aggregate("XAU-USD", &readings, now, &w, &breaker).is_none());
    }

    #[test]
    fn scenario_e_weighted_latency_top_five() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        let latencies = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        let readings: Vec<SourceReading> = latencies
            .iter()
            .enumerate()
            .map(|(i, l)| reading(&format!("S{i}"), 100.0, *l, now, 10.0))
            .collect();
        let w: HashMap<String, f64> = (0..6).map(|i| (format!("S{i}"), 0.5)).collect();
        let quote = aggregate("XAU-USD", &readings, now, &w, &breaker).unwrap();
        assert!((quote.avg_latency - 30.0).abs() < 1e-6);
        assert!((quote.fastest_latency - 10.0).abs() < 1e-9);
        assert_eq!(quote.fastest, "S0");
    }

    #[test]
    fn freshness_monotonicity_equals_weight_under_two_seconds() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        let readings = vec![reading("S1", 100.0, 10.0, now - 1.0, 10.0)];
        let w = weights(&[("S1", 0.7)]);
        let quote = aggregate("XAU-USD", &readings, now, &w, &breaker).unwrap();
        // Sole source, full weight: final price equals the reading exactly.
        assert!((quote.price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn all_entries_filtered_falls_back_to_unfiltered() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        // Even-sized set straddling the median with no entry close to it:
        // every deviation exceeds the clamped MAD threshold, so the filter
        // would remove everything and must fall back to the unfiltered set.
        let readings = vec![
            reading("S1", 100.0, 10.0, now, 100.0),
            reading("S2", 100.0, 10.0, now, 100.0),
            reading("S3", 200.0, 10.0, now, 100.0),
            reading("S4", 200.0, 10.0, now, 100.0),
        ];
        let w = weights(&[("S1", 0.5), ("S2", 0.5), ("S3", 0.5), ("S4", 0.5)]);
        let quote = aggregate("XAU-USD", &readings, now, &w, &breaker).unwrap();
        assert_eq!(quote.details.len(), 4);
    }

    #[test]
    fn aggregator_credits_success_even_when_outlier_filtered() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        // S4 will be filtered as an outlier but must still earn a success
        // credit with the breaker — preserved open-question behavior.
        breaker.record_failure("S4", now - 10.0);
        let readings = vec![
            reading("S1", 100.0, 10.0, now, 10.0),
            reading("S2", 100.5, 10.0, now, 10.0),
            reading("S3", 101.0, 10.0, now, 10.0),
            reading("S4", 1000.0, 10.0, now, 10.0),
        ];
        let w = weights(&[("S1", 0.5), ("S2", 0.5), ("S3", 0.5), ("S4", 0.5)]);
        let quote = aggregate("XAU-USD", &readings, now, &w, &breaker).unwrap();
        assert!(!quote.details.contains(&"S4".to_string()));
        let snap = breaker.snapshot();
        assert_eq!(snap["S4"].failure_count, 0);
    }

    #[test]
    fn price_le_zero_is_rejected_at_entry() {
        let breaker = CircuitBreaker::new(5, 300.0);
        let now = 1000.0;
        let readings = vec![reading("S1", 0.0, 10.0, now, 10.0)];
        let w = weights(&[("S1", 0.5)]);
        assert!(aggregate("XAU-USD", &readings, now, &w, &breaker).is_none());
    }

    #[test]
    fn median_is_average_of_two_middle_values_for_even_set() {
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < 1e-9);
    }
}
