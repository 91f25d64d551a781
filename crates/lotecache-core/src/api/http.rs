//! Request plumbing shared by the Airtable and Supabase clients.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, Response};
use tracing::warn;

use super::ApiError;

/// HTTP request timeout in seconds.
/// Image downloads from the source CDN can be slow; 30s still fails fast.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// Airtable asks clients to wait 30s after repeated 429s; one second
/// doubling covers the usual per-second limit.
const INITIAL_BACKOFF_MS: u64 = 1000;

pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

/// Check if response is successful, returning an error with body if not.
/// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
/// or Err for other errors.
async fn check_response_for_retry(response: Response) -> Result<Option<Response>> {
    if response.status().is_success() {
        Ok(Some(response))
    } else if response.status().as_u16() == 429 {
        Ok(None)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body).into())
    }
}

/// How 429 responses are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

/// Send the request produced by `build`, retrying 429 responses with
/// exponential backoff. `build` is called once per attempt.
pub async fn send_with_retry<F>(what: &str, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    send_with_policy(RetryPolicy::default(), what, build).await
}

/// [`send_with_retry`] with an explicit policy. Errors other than 429 are
/// returned on the first attempt.
pub async fn send_with_policy<F>(policy: RetryPolicy, what: &str, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut retries = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        let response = build()
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send request: {}", what))?;

        match check_response_for_retry(response).await? {
            Some(response) => return Ok(response),
            None => {
                retries += 1;
                if retries > policy.max_retries {
                    return Err(ApiError::RateLimited.into());
                }
                warn!(request = what, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

/// Find an [`ApiError`] anywhere in an error chain.
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
}
