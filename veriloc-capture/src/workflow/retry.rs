//! Bounded exponential-backoff retry for transient submission failures
//!
//! Only [`Error::TransientSubmissionFailure`] is retried; every other error
//! fails immediately. Backoff doubles from the configured initial delay up
//! to the cap, with a small random jitter so clients that failed together
//! do not retry together.

use rand::Rng;
use std::time::Duration;
use veriloc_common::config::SubmissionConfig;
use veriloc_common::Result;

/// Retry `operation` until it succeeds, fails non-transiently, or the retry
/// bound is exhausted. Returns the final result either way.
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: &SubmissionConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut backoff_ms = policy.initial_backoff_ms;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let jitter_ms = rand::thread_rng().gen_range(0..=backoff_ms / 4);
                let delay_ms = backoff_ms + jitter_ms;
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms,
                    error = %err,
                    "Transient failure, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                backoff_ms = (backoff_ms * 2).min(policy.max_backoff_ms);
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Retry bound exhausted"
                    );
                }
                return Err(err);
            }
        }
    }

    unreachable!("loop returns on every branch")
}
