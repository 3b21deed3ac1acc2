//! HTTP fetching with bounded retry and exponential backoff.
//!
//! Every other component sits on top of this module. Publisher pages and
//! feeds are fetched with a browser-identifying User-Agent and a French
//! language preference, and transient failures (HTTP 429, 5xx, transport
//! errors) are retried with capped exponential backoff plus jitter. A
//! server-supplied `Retry-After` hint overrides the computed delay.
//!
//! Delivery calls deliberately do not go through this retry loop: they are
//! not idempotent, and get their own narrower 429-only handling in the
//! telegram module.
//!
//! # Retry Strategy
//!
//! - 4 attempts total
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd
//!
//! Note: callers record fetch outcomes in the persisted failure tracker via
//! the run context; this module itself stays side-effect free apart from the
//! network.

use crate::error::FetchError;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; FinanceNewsNotify/0.2; +https://t.me/MorrocanFinancialNews)";
const ACCEPT_LANGUAGE: &str = "fr,en;q=0.8";

/// Default timeout for publisher page and feed fetches.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for lightweight image probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the shared HTTP client used for every network call in a run.
pub fn build_client() -> Result<Client, reqwest::Error> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        reqwest::header::HeaderValue::from_static(ACCEPT_LANGUAGE),
    );
    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
}

/// How a sequence of attempts against one URL is paced.
///
/// The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
/// unless the server named its own `Retry-After`, which wins.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Initial delay between retries (doubles with each attempt).
    pub base_delay: Duration,
    /// Delay cap to prevent excessive waiting.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: usize) -> Duration {
        let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1) as u32);
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        let jitter_ms: u64 = rand::rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after_hint(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Fetch a URL's body as text, retrying transient failures.
///
/// # Returns
///
/// The response body on any 2xx status, or a [`FetchError`] once the policy
/// is exhausted or a non-retryable status arrives.
#[instrument(level = "info", skip(client, policy), fields(%url))]
pub async fn fetch_text(
    client: &Client,
    url: &str,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<String, FetchError> {
    let total_t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        let result = client.get(url).timeout(timeout).send().await;

        let (failure, hint): (FetchError, Option<Duration>) = match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let body = response.text().await.map_err(|e| FetchError::Transport {
                        url: url.to_string(),
                        source: e,
                    })?;
                    debug!(
                        attempt,
                        bytes = body.len(),
                        elapsed_ms = total_t0.elapsed().as_millis() as u64,
                        "Fetched"
                    );
                    return Ok(body);
                }
                let hint = retry_after_hint(&response);
                let failure = FetchError::Status {
                    url: url.to_string(),
                    status,
                };
                if !retryable(status) {
                    return Err(failure);
                }
                (failure, hint)
            }
            Err(e) => (
                FetchError::Transport {
                    url: url.to_string(),
                    source: e,
                },
                None,
            ),
        };

        if attempt >= policy.max_attempts {
            warn!(
                attempt,
                max = policy.max_attempts,
                elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                error = %failure,
                "fetch exhausted retries"
            );
            return Err(failure);
        }

        let delay = hint.unwrap_or_else(|| policy.delay_for(attempt));
        warn!(
            attempt,
            max = policy.max_attempts,
            ?delay,
            error = %failure,
            "fetch attempt failed; backing off"
        );
        sleep(delay).await;
    }
}
