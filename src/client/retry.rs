use std::{future::Future, time::Duration};
use tokio_retry::RetryIf;

use crate::error::FetchError;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry policy shared by every cached operation.
///
/// Delays double from `base_delay` and are capped at `max_delay`. Whether a
/// failure is retried at all is decided by [`FetchError::is_retryable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    /// 3 retries, 1s doubling, 30s cap
    pub const fn standard() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Single attempt. Used for writes, which are not idempotent in general.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// The full backoff schedule, one entry per allowed retry
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        (0..policy.max_retries).map(move |attempt| policy.delay_for(attempt))
    }

    /// Runs `action`, retrying transient failures according to the policy
    pub async fn run<T, A, Fut>(&self, action: A) -> Result<T, FetchError>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        RetryIf::start(self.delays(), action, |error: &FetchError| {
            let retry = error.is_retryable();
            if retry {
                tracing::warn!(error = %error, "Request failed, retrying");
            } else {
                tracing::debug!(error = %error, "Request failed permanently");
            }
            retry
        })
        .await
    }
}
