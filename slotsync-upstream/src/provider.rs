//! Transport trait for scheduling providers.

use async_trait::async_trait;
use slotsync_core::{Booking, BookingRequest, CacheKey, Slot, UpstreamResult};

/// One attempt at one provider operation.
///
/// Implementations perform no retries of their own. They must classify every
/// failure: `Transient` with the correct [`SendPhase`](slotsync_core::SendPhase)
/// for network errors and 5xx responses, `Rejected` for 4xx responses and
/// `InvalidResponse` for undecodable success bodies. [`UpstreamClient`]
/// relies on that classification to decide what is safe to retry.
///
/// [`UpstreamClient`]: crate::UpstreamClient
#[async_trait]
pub trait SchedulingProvider: Send + Sync {
    /// Short identifier used in logs and metrics.
    fn provider_id(&self) -> &str;

    /// Bookable slots for the key's resource within the key's window.
    async fn fetch_availability(&self, key: &CacheKey) -> UpstreamResult<Vec<Slot>>;

    async fn create_booking(&self, request: &BookingRequest) -> UpstreamResult<Booking>;

    async fn cancel_booking(&self, booking_id: &str, reason: &str) -> UpstreamResult<()>;

    /// Active bookings for an invitee email.
    async fn find_bookings(&self, email: &str) -> UpstreamResult<Vec<Booking>>;
}
