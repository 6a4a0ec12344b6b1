//! Retry utilities for feed downloads.
//!
//! Provides exponential backoff retry logic for transient HTTP errors such as
//! 429 responses, 5xx responses and dropped connections. Everything else
//! (decode failures, 4xx, bad URLs) is propagated immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::FeedError;

/// Returns `true` if `err` represents a transient condition that should be
/// retried after a backoff delay.
fn is_retriable(err: &FeedError) -> bool {
    match err {
        FeedError::RateLimited { .. } | FeedError::Http(_) => true,
        FeedError::UnexpectedStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Executes `operation` with exponential backoff retries on transient errors.
///
/// On a retriable error the function sleeps for `backoff_base_secs * 2^attempt`
/// seconds and tries again, up to `max_retries` additional attempts after the
/// first try. If all retries are exhausted the last error is returned.
///
/// With `max_retries = 2` the operation is attempted at most 3 times total.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, FeedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }

        // Cap the shift so extreme configs saturate instead of overflowing.
        let delay_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs,
            error = %err,
            "transient feed error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        attempt += 1;
    }
}
