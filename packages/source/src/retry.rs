//! HTTP retry for the dataset download.
//!
//! The open-data portal occasionally drops connections or answers with a
//! 5xx while it regenerates its export. [`send_text`] retries those
//! transient failures under a [`RetryPolicy`]. Geocoding requests do not
//! go through here; they are never retried.

use std::time::Duration;

use crate::SourceError;

/// How often and how patiently to retry a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three retries after 2s, 4s, and 8s.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// What to do with the outcome of one attempt.
enum Attempt {
    Done(reqwest::Response),
    Retry(SourceError),
    Fail(SourceError),
}

fn classify(result: Result<reqwest::Response, reqwest::Error>) -> Attempt {
    match result {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                Attempt::Done(response)
            } else {
                let error = SourceError::Status {
                    status,
                    url: response.url().to_string(),
                };
                if is_retryable_status(status) {
                    Attempt::Retry(error)
                } else {
                    Attempt::Fail(error)
                }
            }
        }
        Err(e) if is_transient(&e) => Attempt::Retry(SourceError::Http(e)),
        Err(e) => Attempt::Fail(SourceError::Http(e)),
    }
}

/// Sends the request built by `build_request` and returns the body text.
///
/// `build_request` is called once per attempt since a
/// [`reqwest::RequestBuilder`] is consumed by `.send()`.
///
/// # Errors
///
/// Returns [`SourceError`] for a non-retryable status, a permanent
/// transport error, or the last failure once `policy` is used up.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: &RetryPolicy, build_request: F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        let reason = match classify(build_request().send().await) {
            Attempt::Done(response) => return Ok(response.text().await?),
            Attempt::Fail(e) => return Err(e),
            Attempt::Retry(e) if attempt >= policy.max_retries => {
                log::error!("download failed after {attempt} retries: {e}");
                return Err(e);
            }
            Attempt::Retry(e) => e,
        };

        attempt += 1;
        let delay = policy.delay(attempt);
        log::warn!(
            "download attempt failed ({reason}), retry {attempt}/{} in {delay:?}",
            policy.max_retries
        );
        tokio::time::sleep(delay).await;
    }
}

/// Returns `true` for statuses worth another attempt.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
