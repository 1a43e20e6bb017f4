//! Retry with exponential backoff for the sheet download.
//!
//! Connection failures, timeouts, HTTP 429 and HTTP 5xx are retried. Any
//! other 4xx is permanent (an unpublished sheet answers 401/403/404).

use std::time::Duration;

use reqwest::StatusCode;

use crate::SourceError;

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// Delay before retry `attempt` (1-based): 2s, 4s, 8s.
#[must_use]
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

/// Returns `true` for statuses worth another attempt.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

/// Sends the request built by `build_request`, retrying transient
/// failures up to [`MAX_RETRIES`] times.
///
/// The closure is called once per attempt since a builder is consumed by
/// `send()`.
///
/// # Errors
///
/// Returns [`SourceError::Http`] for transport failures and
/// [`SourceError::HttpStatus`] for non-success statuses, after retries are
/// exhausted or immediately for permanent failures.
#[allow(clippy::future_not_send)]
pub async fn send_with_retry<F>(build_request: F) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                log::warn!("  transient error: {e}");
            }
            Err(e) => return Err(SourceError::Http(e)),
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    log::warn!("  HTTP {status}");
                } else {
                    return Err(SourceError::HttpStatus { status });
                }
            }
        }
        attempt += 1;
    }
}
