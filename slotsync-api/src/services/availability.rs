//! Availability Service
//!
//! The façade used by tool-calling code. Reads are served from the cache
//! when the entry is within the staleness ceiling, otherwise fetched from the
//! provider synchronously and stored. Booking mutations pass straight through
//! to the upstream client and invalidate what they change.

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use slotsync_cache::{BookingsCache, BookingsLookup, CacheRead, CacheStore, Freshness};
use slotsync_core::{
    Booking, BookingRequest, CacheEntry, CacheKey, CacheStats, EntrySource, HealthCheck,
    ProviderEvent, ProviderEventKind, Slot, UpstreamError, ValidationError,
};
use slotsync_upstream::UpstreamClient;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::AvailabilityConfig;
use crate::constants::{AFTERNOON_STARTS_AT_HOUR, DEFAULT_CANCEL_REASON};
use crate::error::{ServiceError, ServiceResult};
use crate::jobs::BackgroundRefresher;
use crate::services::invalidation::{InvalidationGateway, InvalidationReport};
use crate::telemetry::metrics;

// ============================================================================
// TIME PREFERENCE
// ============================================================================

/// Part of the clinic's day a patient asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePreference {
    /// Before noon, clinic local time
    Morning,
    /// Noon onwards, clinic local time
    Afternoon,
    #[default]
    All,
}

impl TimePreference {
    pub fn matches(&self, slot: &Slot, clinic_utc_offset_minutes: i32) -> bool {
        let local = slot.start + ChronoDuration::minutes(i64::from(clinic_utc_offset_minutes));
        match self {
            TimePreference::Morning => local.hour() < AFTERNOON_STARTS_AT_HOUR,
            TimePreference::Afternoon => local.hour() >= AFTERNOON_STARTS_AT_HOUR,
            TimePreference::All => true,
        }
    }
}

impl FromStr for TimePreference {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(TimePreference::Morning),
            "afternoon" => Ok(TimePreference::Afternoon),
            "all" | "any" | "" => Ok(TimePreference::All),
            other => Err(ValidationError::InvalidField {
                field: "preference".to_string(),
                reason: format!("'{}' is not one of morning, afternoon, all", other),
            }),
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct AvailabilityService {
    store: Arc<CacheStore>,
    bookings: Arc<BookingsCache>,
    upstream: UpstreamClient,
    gateway: InvalidationGateway,
    refresher: BackgroundRefresher,
    config: AvailabilityConfig,
}

impl AvailabilityService {
    /// Build the service around a shared store, bookings cache, upstream
    /// client and refresher. The invalidation gateway is built from the
    /// same pieces.
    pub fn new(
        store: Arc<CacheStore>,
        bookings: Arc<BookingsCache>,
        upstream: UpstreamClient,
        refresher: BackgroundRefresher,
        config: AvailabilityConfig,
    ) -> Self {
        let gateway =
            InvalidationGateway::new(Arc::clone(&store), Arc::clone(&bookings), upstream.clone());
        Self {
            store,
            bookings,
            upstream,
            gateway,
            refresher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn bookings_cache(&self) -> &Arc<BookingsCache> {
        &self.bookings
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn gateway(&self) -> &InvalidationGateway {
        &self.gateway
    }

    pub fn refresher(&self) -> &BackgroundRefresher {
        &self.refresher
    }

    pub fn config(&self) -> &AvailabilityConfig {
        &self.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Slots for `key`, served from cache when within the staleness ceiling.
    pub async fn get_availability(&self, key: &CacheKey) -> ServiceResult<Vec<Slot>> {
        let read = self
            .read_availability(key, Freshness::best_effort(self.config.staleness_ceiling))
            .await?;
        Ok(read.value().slots().to_vec())
    }

    /// Like [`get_availability`](Self::get_availability), keeping only slots
    /// in the requested part of the clinic's day.
    pub async fn get_availability_filtered(
        &self,
        key: &CacheKey,
        preference: TimePreference,
    ) -> ServiceResult<Vec<Slot>> {
        let offset = self.config.clinic_utc_offset_minutes;
        Ok(self
            .get_availability(key)
            .await?
            .into_iter()
            .filter(|slot| preference.matches(slot, offset))
            .collect())
    }

    /// Fetch `key` from the provider regardless of what is cached, store the
    /// result and return it.
    pub async fn refresh_availability(
        &self,
        key: &CacheKey,
    ) -> ServiceResult<CacheRead<Arc<CacheEntry>>> {
        self.read_availability(key, Freshness::Latest).await
    }

    /// Read `key` with an explicit freshness requirement.
    ///
    /// 1. A cached entry satisfying `freshness` is a hit.
    /// 2. Otherwise this is a miss: the provider is called and the result
    ///    stored.
    /// 3. If that call fails, whatever entry the cache holds is returned
    ///    flagged as a stale fallback. Only when there is no entry at all
    ///    does the read fail with [`ServiceError::AvailabilityUnavailable`].
    pub async fn read_availability(
        &self,
        key: &CacheKey,
        freshness: Freshness,
    ) -> ServiceResult<CacheRead<Arc<CacheEntry>>> {
        if let Freshness::BestEffort { max_staleness } = freshness {
            if let Some(entry) = self.store.get(key) {
                if !entry.is_older_than(max_staleness, Utc::now()) {
                    self.store.record_hit();
                    record_read("cache");
                    tracing::debug!(key = %key, slots = entry.slots().len(), "Availability cache hit");
                    let fetched_at = entry.fetched_at();
                    return Ok(CacheRead::from_cache(entry, fetched_at));
                }
            }
        }

        self.store.record_miss();
        tracing::debug!(key = %key, latest = freshness.is_latest(), "Availability cache miss, fetching");

        let requested_at = Utc::now();
        match self.upstream.fetch_availability(key).await {
            Ok(slots) => {
                let fetched = Arc::new(CacheEntry::new(
                    key.clone(),
                    slots,
                    requested_at,
                    Utc::now(),
                    EntrySource::ReadThrough,
                ));
                self.store.put(fetched.as_ref().clone());
                let entry = self
                    .store
                    .get(key)
                    .filter(|current| current.fetched_at() >= fetched.fetched_at())
                    .unwrap_or(fetched);
                record_read("provider");
                let fetched_at = entry.fetched_at();
                Ok(CacheRead::from_provider(entry, fetched_at))
            }
            Err(e) => self.fall_back(key, e),
        }
    }

    fn fall_back(
        &self,
        key: &CacheKey,
        error: UpstreamError,
    ) -> ServiceResult<CacheRead<Arc<CacheEntry>>> {
        match self.store.get(key) {
            Some(entry) => {
                let fetched_at = entry.fetched_at();
                tracing::warn!(
                    key = %key,
                    error = %error,
                    age_secs = entry.age(Utc::now()).as_secs(),
                    "Provider fetch failed, serving stale availability"
                );
                record_read("stale_fallback");
                Ok(CacheRead::stale(entry, fetched_at))
            }
            None => {
                tracing::error!(
                    key = %key,
                    error = %error,
                    "Availability unavailable: nothing cached and provider fetch failed"
                );
                record_read("unavailable");
                Err(ServiceError::AvailabilityUnavailable {
                    key: key.clone(),
                    source: error,
                })
            }
        }
    }

    /// Active bookings for `email`.
    ///
    /// Served from the bookings cache within its TTL. An expired entry is
    /// returned if the provider call fails. A result is not cached when the
    /// email was invalidated while the lookup was in flight.
    pub async fn find_bookings(&self, email: &str) -> ServiceResult<Arc<Vec<Booking>>> {
        if email.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "email".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        let lookup = self.bookings.get(email);
        if let BookingsLookup::Fresh(bookings) = lookup {
            self.store.record_hit();
            tracing::debug!(bookings = bookings.len(), "Bookings cache hit");
            return Ok(bookings);
        }

        self.store.record_miss();
        let requested_at = Utc::now();
        match self.upstream.find_bookings(email).await {
            Ok(bookings) => {
                let bookings = Arc::new(bookings);
                if !self.bookings.put(email, Arc::clone(&bookings), requested_at) {
                    tracing::debug!("Bookings changed during lookup, result not cached");
                }
                Ok(bookings)
            }
            Err(e) => match lookup {
                BookingsLookup::Expired(bookings) => {
                    tracing::warn!(error = %e, "Bookings lookup failed, serving expired entry");
                    Ok(bookings)
                }
                _ => Err(e.into()),
            },
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Book `request.slot` for `request.invitee`.
    ///
    /// Never retried after the request may have reached the provider. An
    /// [`UpstreamError::Ambiguous`] means the caller should check the
    /// invitee's bookings before trying again.
    pub async fn create_booking(&self, request: &BookingRequest) -> ServiceResult<Booking> {
        request.validate()?;

        let booking = match self.upstream.create_booking(request).await {
            Ok(booking) => booking,
            Err(e) => {
                if matches!(e, UpstreamError::Ambiguous { .. }) {
                    tracing::warn!(
                        slot_start = %request.slot.start,
                        error = %e,
                        "Booking outcome unknown, not retrying"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            booking_id = %booking.booking_id,
            slot_start = %request.slot.start,
            "Booking created"
        );

        // The booked slot is gone from every window that contains it.
        match ProviderEvent::new(
            ProviderEventKind::BookingCreated,
            &request.slot.resource_id,
            request.slot.start,
            request.slot.end,
        ) {
            Ok(event) => {
                self.gateway
                    .handle(&event.with_invitee_email(request.invitee.email.clone()))
                    .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not derive invalidation for new booking");
                self.bookings.invalidate_email(&request.invitee.email);
            }
        }

        Ok(booking)
    }

    /// Cancel a booking. The slot it frees is picked up by the provider's
    /// cancellation webhook or the next refresh cycle.
    pub async fn cancel_booking(&self, booking_id: &str, reason: Option<&str>) -> ServiceResult<()> {
        if booking_id.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "booking_id".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        self.upstream
            .cancel_booking(booking_id, reason.unwrap_or(DEFAULT_CANCEL_REASON))
            .await?;

        self.bookings.invalidate_all();
        tracing::info!(booking_id = %booking_id, "Booking canceled");
        Ok(())
    }

    // ========================================================================
    // Events, stats, readiness
    // ========================================================================

    pub async fn handle_provider_event(&self, event: &ProviderEvent) -> InvalidationReport {
        self.gateway.handle(event).await
    }

    pub fn get_stats(&self) -> CacheStats {
        let mut stats = self.store.snapshot_stats();
        stats.bookings_cached = self.bookings.len() as u64;
        stats
    }

    /// Ready once the initial population has completed and the refresher
    /// is running.
    pub fn is_ready(&self) -> bool {
        self.refresher.is_running()
    }

    /// Component health for the readiness endpoint.
    pub fn health(&self) -> HealthCheck {
        let stats = self.get_stats();
        let check = if !self.is_ready() {
            HealthCheck::unhealthy(
                "availability",
                format!("refresher is {}", self.refresher.state()),
            )
        } else if let Some(error) = &stats.last_refresh_error {
            HealthCheck::degraded("availability", format!("last refresh failed: {}", error))
        } else {
            HealthCheck::healthy("availability")
        };
        check
            .with_metadata("cache_size", serde_json::json!(stats.cache_size))
            .with_metadata("last_refresh_at", serde_json::json!(stats.last_refresh_at))
    }
}

fn record_read(origin: &str) {
    if let Some(metrics) = metrics() {
        metrics.record_availability_read(origin);
    }
}
