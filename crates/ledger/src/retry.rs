//! Retry logic for transient ledger read failures.
//!
//! This module provides [`with_retry_timeout`], which wraps an async
//! operation with automatic retry on transient errors (transport failures,
//! timeouts) under an overall deadline. Non-transient errors (reverts, rejections, not-found, decode
//! failures) are returned immediately without retry.
//!
//! # Backoff Strategy
//!
//! Retries use exponential backoff with jitter:
//! - Base delay doubles with each attempt: `initial_backoff * 2^attempt`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added to prevent thundering-herd effects
//!   across multiple clients
//!
//! Only reads go through this module. Writes are submitted exactly once.

use std::{future::Future, sync::Arc, time::Duration};

use fail::fail_point;
use parking_lot::Mutex;
use rand::Rng;
use shelfchain_library::{LedgerError, LedgerResult};

use crate::config::RetryConfig;

/// Tracks retry state for timeout reporting.
///
/// Shared between `with_retry_tracked` and `with_retry_timeout`. When the
/// overall timeout cancels the retry loop, the handler reads this state to
/// log what the loop was doing.
#[derive(Debug, Default)]
struct RetryState {
    /// Number of attempts that returned a result.
    attempts_completed: u32,
    /// Whether the loop is sleeping (backoff) rather than awaiting the ledger.
    during_backoff: bool,
    /// The last error returned by the ledger.
    last_error: Option<LedgerError>,
}

/// Executes `operation` with automatic retry on transient errors,
/// recording progress in `state` so that `with_retry_timeout` can report
/// where the deadline hit.
///
/// Returns the result of the first successful call, or the last error
/// if all retry attempts are exhausted.
///
/// # Retry Eligibility
///
/// Only errors where [`LedgerError::is_transient`] returns `true` are
/// retried. All other errors are propagated immediately.
async fn with_retry_tracked<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    state: Arc<Mutex<RetryState>>,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut last_error: Option<LedgerError> = None;

    for attempt in 0..=config.max_retries {
        state.lock().during_backoff = false;

        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = compute_backoff(config, attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying after backoff",
                );

                {
                    let mut s = state.lock();
                    s.attempts_completed = attempt + 1;
                    s.during_backoff = true;
                    s.last_error = Some(err.clone());
                }

                last_error = Some(err);
                fail_point!("retry-before-sleep");
                tokio::time::sleep(delay).await;
            },
            Err(err) => {
                {
                    let mut s = state.lock();
                    s.attempts_completed = attempt + 1;
                    s.last_error = Some(err.clone());
                }
                if attempt > 0 && err.is_transient() {
                    tracing::warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "retries exhausted",
                    );
                }
                return Err(err);
            },
        }
    }

    // Unreachable in practice: the last attempt always returns above.
    Err(last_error.unwrap_or(LedgerError::Timeout))
}

/// Executes `operation` with retry **and** an overall timeout.
///
/// This wraps the retry loop with `tokio::time::timeout`, bounding the
/// total wall-clock time of the operation including all retry attempts
/// and backoff sleeps. When the deadline fires the loop is cancelled and
/// [`LedgerError::Timeout`] is returned; the retry state at that moment is
/// logged so a deadline too short for the retry policy is distinguishable
/// from a slow ledger.
#[tracing::instrument(
    skip(config, operation),
    fields(timeout_ms = timeout.as_millis() as u64, max_retries = config.max_retries)
)]
pub(crate) async fn with_retry_timeout<F, Fut, T>(
    config: &RetryConfig,
    timeout: Duration,
    operation_name: &str,
    operation: F,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let state = Arc::new(Mutex::new(RetryState::default()));

    match tokio::time::timeout(
        timeout,
        with_retry_tracked(config, operation_name, operation, Arc::clone(&state)),
    )
    .await
    {
        Ok(result) => result,
        Err(_elapsed) => {
            let s = state.lock();
            tracing::warn!(
                operation = operation_name,
                attempts_completed = s.attempts_completed,
                during_backoff = s.during_backoff,
                last_error = s.last_error.as_ref().map(ToString::to_string),
                "read deadline exceeded",
            );
            Err(LedgerError::Timeout)
        },
    }
}

/// Computes the backoff duration for the given attempt number.
///
/// Uses exponential backoff with jitter:
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..50% of delay)`
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    // Add jitter: 0–50% of the computed delay
    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}
