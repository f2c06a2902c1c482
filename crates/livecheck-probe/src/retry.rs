//! Bounded retry with randomized back-off for reachability attempts.
//!
//! A URL gets at most `max_attempts` tries. Between tries the task sleeps
//! for `backoff_base_ms × attempt` scaled by a uniform jitter in
//! `[0.75, 1.25)`. After the last attempt the URL is reported as failed; it
//! is never re-queued.

use std::future::Future;
use std::time::Duration;

use crate::error::ProbeError;

/// Upper bound on a single back-off sleep.
const MAX_DELAY_MS: u64 = 10_000;

/// Returns `true` for errors that are worth another attempt.
///
/// **Retriable:** timeouts, connect failures, and HTTP 5xx.
///
/// **Not retriable:** 4xx statuses and anything that is not a network error;
/// retrying won't change the answer.
pub(crate) fn is_retriable(err: &ProbeError) -> bool {
    match err {
        ProbeError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ProbeError::UnexpectedStatus { status, .. } => *status >= 500,
        ProbeError::Tool(_)
        | ProbeError::Parse { .. }
        | ProbeError::NoVideo { .. }
        | ProbeError::CapabilityMissing(_) => false,
    }
}

/// Runs `operation` up to `max_attempts` times, returning the final result
/// together with the number of attempts made.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> (Result<T, ProbeError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return (Ok(value), attempt),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_attempts {
                    return (Err(err), attempt);
                }
                let delay_ms = jittered_delay_ms(backoff_base_ms, attempt);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "probe attempt failed, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn jittered_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    let computed = backoff_base_ms
        .saturating_mul(u64::from(attempt))
        .min(MAX_DELAY_MS);
    (computed as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64
}
