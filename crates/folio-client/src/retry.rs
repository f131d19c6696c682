//! Exponential backoff retry logic for Okapi requests.

use crate::error::{FolioClientError, FolioClientResult};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry count and base delay.
    /// The delay cap defaults to 30 seconds.
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: 30_000,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Whether the error should be retried at the given attempt number.
    ///
    /// Only transient failures qualify: unreachable host, 429, and 5xx.
    /// Conflicts and other client errors are returned to the caller as-is.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &FolioClientError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        error.is_retryable() || error.is_server_error()
    }

    /// Delay before the next attempt.
    ///
    /// A 429 carrying `Retry-After` uses that value (capped at `max_delay_ms`).
    /// Otherwise `min(base_delay_ms * 2^attempt, max_delay_ms)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &FolioClientError) -> Duration {
        let ms = if let FolioClientError::RateLimited {
            retry_after_secs: Some(retry_after),
        } = error
        {
            retry_after.saturating_mul(1000).min(self.max_delay_ms)
        } else {
            self.base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt))
                .min(self.max_delay_ms)
        };
        Duration::from_millis(ms)
    }

    /// Execute an async operation with retry.
    ///
    /// `on_error` sees every failed attempt before the retry decision; the
    /// reconciler uses it to trip its backpressure gate on 429/503.
    pub async fn execute_observed<F, Fut, T, O>(
        &self,
        operation_name: &str,
        mut on_error: O,
        mut f: F,
    ) -> FolioClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = FolioClientResult<T>>,
        O: FnMut(&FolioClientError),
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Okapi request succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    on_error(&error);
                    if !self.should_retry(attempt, &error) {
                        let transient = error.is_retryable() || error.is_server_error();
                        if transient && self.max_retries > 0 {
                            warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                error = %error,
                                "Max retries exceeded"
                            );
                            return Err(FolioClientError::MaxRetriesExceeded {
                                attempts: attempt + 1,
                                message: format!(
                                    "{operation_name} failed after {} attempt(s): {error}",
                                    attempt + 1
                                ),
                            });
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt, &error);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Execute an async operation with retry, without observing failures.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, f: F) -> FolioClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = FolioClientResult<T>>,
    {
        self.execute_observed(operation_name, |_| {}, f).await
    }
}
