//! Shared upstream client: connection ceiling, deadlines and retries.

use slotsync_core::{
    Booking, BookingRequest, CacheKey, SendPhase, Slot, UpstreamError, UpstreamOperation,
    UpstreamResult,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::UpstreamClientConfig;
use crate::provider::SchedulingProvider;
use crate::retry::RetryPolicy;

/// The one client every component shares.
///
/// Each attempt holds a permit from a semaphore sized to the pool ceiling, so
/// at most `max_connections` requests are in flight at once. Permits are
/// released when the attempt finishes or is dropped by a deadline, never
/// held across a backoff sleep.
#[derive(Clone)]
pub struct UpstreamClient {
    provider: Arc<dyn SchedulingProvider>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    attempt_timeout: Duration,
    call_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(provider: Arc<dyn SchedulingProvider>, config: UpstreamClientConfig) -> Self {
        Self {
            provider,
            retry: RetryPolicy::new(config.retry),
            permits: Arc::new(Semaphore::new(config.pool.max_connections.max(1))),
            attempt_timeout: config.pool.attempt_timeout,
            call_timeout: config.call_timeout,
        }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Permits not currently held by an in-flight attempt.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop accepting new attempts. In-flight attempts finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    pub async fn fetch_availability(&self, key: &CacheKey) -> UpstreamResult<Vec<Slot>> {
        let provider = &self.provider;
        self.call(UpstreamOperation::FetchAvailability, || {
            provider.fetch_availability(key)
        })
        .await
    }

    pub async fn create_booking(&self, request: &BookingRequest) -> UpstreamResult<Booking> {
        let provider = &self.provider;
        self.call(UpstreamOperation::CreateBooking, || {
            provider.create_booking(request)
        })
        .await
    }

    pub async fn cancel_booking(&self, booking_id: &str, reason: &str) -> UpstreamResult<()> {
        let provider = &self.provider;
        self.call(UpstreamOperation::CancelBooking, || {
            provider.cancel_booking(booking_id, reason)
        })
        .await
    }

    pub async fn find_bookings(&self, email: &str) -> UpstreamResult<Vec<Booking>> {
        let provider = &self.provider;
        self.call(UpstreamOperation::FindBookings, || provider.find_bookings(email))
            .await
    }

    async fn call<T, F, Fut>(&self, operation: UpstreamOperation, op: F) -> UpstreamResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let started = Instant::now();
        let dispatched = AtomicBool::new(false);
        let dispatched = &dispatched;
        let op = &op;
        let permits = &self.permits;
        let attempt_timeout = self.attempt_timeout;

        let sequence = self.retry.run(operation, move |attempt| async move {
            let _permit = permits
                .acquire()
                .await
                .map_err(|_| UpstreamError::PoolClosed)?;
            // Counts as dispatched while in flight. A failure that provably
            // never reached the provider restores the previous value.
            let sent_before = dispatched.swap(true, Ordering::AcqRel);
            debug!(operation = %operation, attempt, "Dispatching upstream request");

            let result = match tokio::time::timeout(attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Transient {
                    operation,
                    reason: format!("attempt timed out after {:?}", attempt_timeout),
                    phase: SendPhase::Sent,
                }),
            };
            if matches!(&result, Err(err) if err.is_pre_send()) {
                dispatched.store(sent_before, Ordering::Release);
            }
            result
        });

        match tokio::time::timeout(self.call_timeout, sequence).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = started.elapsed();
                warn!(
                    operation = %operation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Upstream call exceeded overall deadline"
                );
                if operation.is_mutation() && dispatched.load(Ordering::Acquire) {
                    Err(UpstreamError::Ambiguous {
                        operation,
                        reason: format!("deadline of {:?} elapsed after the request was sent", self.call_timeout),
                    })
                } else {
                    Err(UpstreamError::Timeout { operation, elapsed })
                }
            }
        }
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("provider", &self.provider.provider_id())
            .field("retry", self.retry.config())
            .field("available_permits", &self.permits.available_permits())
            .field("attempt_timeout", &self.attempt_timeout)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
