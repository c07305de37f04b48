// =============================================================================
// Shared HTTP client — bounded retries with exponential backoff
// =============================================================================
//
// Grounded on the Python original's `http_client.py`: one shared
// `reqwest::Client` (the adapter owns it, matching §5's "one shared, reusable
// session/connection pool"), a retry wrapper around `GET` that backs off on
// timeouts and on the retryable status set {429, 500, 502, 503, 504}, and
// gives up after `retries` attempts rather than raising past the adapter.
// =============================================================================

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

/// Matches the Python original's `retries=2, backoff=0.5`.
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_S: f64 = 0.5;

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(
        status.as_u16(),
        429 | 500 | 502 | 503 | 504
    )
}

/// GET `url` with `query`, retrying on timeouts/connection errors and on the
/// retryable status set, doubling the backoff each attempt. Returns `None`
/// once every attempt is exhausted — callers never see a raised error, per
/// the adapter contract's "must never raise to the caller".
pub async fn get_with_retries(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
    retries: u32,
    backoff_s: f64,
) -> Option<reqwest::Response> {
    let mut attempt = 0;
    loop {
        let result = client.get(url).query(query).send().await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Some(response);
                }
                if is_retryable_status(status) && attempt < retries {
                    warn!(url, %status, attempt, "retryable HTTP status, backing off");
                    tokio::time::sleep(Duration::from_secs_f64(
                        backoff_s * 2f64.powi(attempt as i32),
                    ))
                    .await;
                    attempt += 1;
                    continue;
                }
                warn!(url, %status, "HTTP request failed, giving up");
                return None;
            }
            Err(e) => {
                if attempt < retries {
                    warn!(url, error = %e, attempt, "HTTP request error, backing off");
                    tokio::time::sleep(Duration::from_secs_f64(
                        backoff_s * 2f64.powi(attempt as i32),
                    ))
                    .await;
                    attempt += 1;
                    continue;
                }
                warn!(url, error = %e, "HTTP request exhausted retries");
                return None;
            }
        }
    }
}

/// Convenience wrapper using the default retry/backoff budget.
pub async fn get_json_with_retries(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> Option<reqwest::Response> {
    let resp = get_with_retries(client, url, query, DEFAULT_RETRIES, DEFAULT_BACKOFF_S).await?;
    debug!(url, "HTTP request succeeded");
    Some(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_spec_set() {
        for code in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(reqwest::StatusCode::from_u16(code).unwrap()));
        }
        assert!(!is_retryable_status(reqwest::StatusCode::from_u16(404).unwrap()));
        assert!(!is_retryable_status(reqwest::StatusCode::from_u16(200).unwrap()));
    }
}
