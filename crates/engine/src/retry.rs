// Shared retry-with-backoff logic for transfer and mux attempts.
//
// Implements exponential backoff with jitter, max delay cap, and error
// classification driven by the caller.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::DownloadError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial attempt).
    pub max_retries: u32,
    /// Base delay between retries. Actual delay = base * 2^attempt + jitter.
    pub base_delay: Duration,
    /// Hard cap on the computed delay to prevent unbounded growth.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, base_delay/2) to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt is computed with a checked shift so attempts >= 32 saturate.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exp_delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        let capped = exp_delay.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        if jitter_range_ms == 0 {
            return capped;
        }

        // Jitter is limited so the final delay never exceeds `max_delay`.
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed with a retryable error (network, 5xx, timeout).
    Retry(DownloadError),
    /// Operation failed with a non-retryable error (4xx, bad input).
    Fail(DownloadError),
}

impl<T> RetryAction<T> {
    /// Classify an error by its own retryability.
    pub fn from_error(err: DownloadError) -> Self {
        if err.is_retryable() {
            RetryAction::Retry(err)
        } else {
            RetryAction::Fail(err)
        }
    }
}

/// Execute an async operation with retry-and-backoff.
///
/// The `operation` closure receives the current attempt number (0-indexed)
/// and returns a [`RetryAction`] indicating whether the result is a
/// success, retryable failure, or permanent failure. Cancellation is
/// observed before every attempt and while sleeping between attempts.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, DownloadError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    for attempt in 0..=policy.max_retries {
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(DownloadError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // Unreachable: the loop covers 0..=max_retries and the last iteration returns on Retry.
    Err(DownloadError::Internal {
        reason: "retry loop exited without result".to_string(),
    })
}
