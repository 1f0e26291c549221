//! Transport with retries for GitHub calls.

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Longest `Retry-After` the client is willing to wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Exponential backoff: `base * 2^attempt`, plus up to `base / jitter_divisor`
/// of random jitter.
#[derive(Debug, Clone, Copy)]
pub(super) struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub jitter_divisor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            jitter_divisor: 4,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 2u32.checked_pow(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let delay = self.backoff(attempt);
        let spread = (delay / self.jitter_divisor.max(1)).as_millis() as u64;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Transient statuses: timeouts, rate limiting and gateway trouble.
fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || matches!(status.as_u16(), 500 | 502 | 503 | 504)
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body()
}

/// Seconds from a `Retry-After` header, capped.
fn retry_after(response: &Response) -> Option<Duration> {
    let secs: u64 = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Send a request, retrying transient failures under `policy`.
///
/// Git objects are content-addressed, so replaying a create request after a
/// lost response yields the same object. Other error statuses are returned
/// as a normal response for the caller to inspect.
pub(super) async fn send_with_retry(
    policy: RetryPolicy,
    mut build: impl FnMut() -> reqwest::RequestBuilder,
) -> Result<Response> {
    let mut attempt = 0;

    loop {
        let exhausted = attempt >= policy.max_retries;
        let delay = match build().send().await {
            Ok(response) => {
                let status = response.status();
                if exhausted || !should_retry_status(status) {
                    return Ok(response);
                }
                let delay = retry_after(&response).unwrap_or_else(|| policy.delay_for(attempt));
                debug!(
                    "GitHub answered {}; retry {}/{} in {:?}",
                    status,
                    attempt + 1,
                    policy.max_retries,
                    delay
                );
                // Drain so the connection can be reused
                let _ = response.bytes().await;
                delay
            }
            Err(err) if !exhausted && should_retry_error(&err) => {
                let delay = policy.delay_for(attempt);
                debug!(
                    "GitHub request error: {}; retry {}/{} in {:?}",
                    err,
                    attempt + 1,
                    policy.max_retries,
                    delay
                );
                delay
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("HTTP request failed after {} attempt(s)", attempt + 1)
                });
            }
        };
        sleep(delay).await;
        attempt += 1;
    }
}
