//! Retry policy shared by every upstream call.

use slotsync_core::{RetryConfig, UpstreamError, UpstreamOperation, UpstreamResult};
use std::future::Future;
use tracing::{error, warn};

/// Exponential backoff with separate rules for reads and mutations.
///
/// Reads retry every transient failure. Mutations retry only failures known
/// to have happened before the request left this process; any other
/// transient failure of a mutation is reported as
/// [`UpstreamError::Ambiguous`], because the provider may already have acted
/// on it. Rejections and undecodable responses are never retried.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `err` from an attempt at `operation` may be retried.
    pub fn should_retry(&self, operation: UpstreamOperation, err: &UpstreamError) -> bool {
        if operation.is_mutation() {
            err.is_pre_send()
        } else {
            err.is_retryable_read()
        }
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// retries are exhausted. `attempt` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: UpstreamOperation, mut attempt: F) -> UpstreamResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let mut retries = 0u32;
        loop {
            let err = match attempt(retries + 1).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.should_retry(operation, &err) {
                return Err(surface(operation, err));
            }

            if retries >= self.config.max_retries {
                error!(
                    operation = %operation,
                    attempts = retries + 1,
                    error = %err,
                    "Upstream retries exhausted"
                );
                return Err(UpstreamError::Unavailable {
                    operation,
                    attempts: retries + 1,
                    last_error: Box::new(err),
                });
            }

            retries += 1;
            let delay = self.config.delay_for_retry(retries);
            warn!(
                operation = %operation,
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Upstream attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// A mutation that failed after its request was sent has an unknown outcome.
fn surface(operation: UpstreamOperation, err: UpstreamError) -> UpstreamError {
    match err {
        UpstreamError::Transient { reason, .. } if operation.is_mutation() => {
            UpstreamError::Ambiguous { operation, reason }
        }
        other => other,
    }
}
