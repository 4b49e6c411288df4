//! SlotSync Test Utilities
//!
//! Shared test infrastructure for the SlotSync workspace:
//! - [`ScriptedProvider`], an in-memory scheduling provider with scripted
//!   responses and call accounting
//! - Proptest generators for slots, keys and timestamps
//! - Fixtures for common scenarios

pub use slotsync_core::{
    Booking, BookingRequest, BookingStatus, CacheKey, DateWindow, Invitee, SendPhase, Slot,
    Timestamp, UpstreamError, UpstreamOperation, UpstreamResult,
};
pub use slotsync_upstream::SchedulingProvider;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ============================================================================
// SCRIPTED PROVIDER
// ============================================================================

struct Script<T> {
    queued: VecDeque<UpstreamResult<T>>,
    sticky: Option<UpstreamResult<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queued: VecDeque::new(),
            sticky: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<UpstreamResult<T>> {
        self.queued.pop_front().or_else(|| self.sticky.clone())
    }
}

#[derive(Default)]
struct State {
    availability: HashMap<CacheKey, Script<Vec<Slot>>>,
    bookings: HashMap<String, Script<Vec<Booking>>>,
    create: Script<Booking>,
    cancel: Script<()>,
    fetch_calls: HashMap<CacheKey, usize>,
    calls: HashMap<UpstreamOperation, usize>,
    canceled: Vec<String>,
}

/// In-memory [`SchedulingProvider`] for tests.
///
/// Each key (or email) has a queue of one-shot responses consumed first and
/// an optional sticky response returned once the queue is empty. Keys with
/// no script return an empty slot list. Every call optionally sleeps for a
/// fixed latency, which combined with a paused tokio clock makes overlap and
/// deadline behaviour deterministic.
#[derive(Default)]
pub struct ScriptedProvider {
    state: Mutex<State>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Respond to every fetch of `key` with `slots`.
    pub fn set_availability(&self, key: &CacheKey, slots: Vec<Slot>) {
        self.state().availability.entry(key.clone()).or_default().sticky = Some(Ok(slots));
    }

    /// Fail every fetch of `key` with `err`.
    pub fn fail_availability(&self, key: &CacheKey, err: UpstreamError) {
        self.state().availability.entry(key.clone()).or_default().sticky = Some(Err(err));
    }

    /// Queue a one-shot response for the next fetch of `key`.
    pub fn push_availability(&self, key: &CacheKey, result: UpstreamResult<Vec<Slot>>) {
        self.state()
            .availability
            .entry(key.clone())
            .or_default()
            .queued
            .push_back(result);
    }

    pub fn set_bookings(&self, email: &str, bookings: Vec<Booking>) {
        self.state().bookings.entry(email.to_lowercase()).or_default().sticky = Some(Ok(bookings));
    }

    pub fn fail_bookings(&self, email: &str, err: UpstreamError) {
        self.state().bookings.entry(email.to_lowercase()).or_default().sticky = Some(Err(err));
    }

    pub fn push_create_result(&self, result: UpstreamResult<Booking>) {
        self.state().create.queued.push_back(result);
    }

    pub fn push_cancel_result(&self, result: UpstreamResult<()>) {
        self.state().cancel.queued.push_back(result);
    }

    /// Provider calls made for `key` so far.
    pub fn fetch_calls(&self, key: &CacheKey) -> usize {
        self.state().fetch_calls.get(key).copied().unwrap_or(0)
    }

    pub fn calls(&self, operation: UpstreamOperation) -> usize {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Booking ids passed to successful cancel calls.
    pub fn canceled(&self) -> Vec<String> {
        self.state().canceled.clone()
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, operation: UpstreamOperation) {
        *self.state().calls.entry(operation).or_default() += 1;
    }

    async fn simulate_latency(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SchedulingProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    async fn fetch_availability(&self, key: &CacheKey) -> UpstreamResult<Vec<Slot>> {
        self.record(UpstreamOperation::FetchAvailability);
        *self.state().fetch_calls.entry(key.clone()).or_default() += 1;
        self.simulate_latency().await;
        let next = self.state().availability.get_mut(key).and_then(|s| s.next());
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_booking(&self, request: &BookingRequest) -> UpstreamResult<Booking> {
        self.record(UpstreamOperation::CreateBooking);
        self.simulate_latency().await;
        let next = self.state().create.next();
        next.unwrap_or_else(|| {
            Ok(fixtures::booking(
                "scripted-booking",
                &request.invitee.email,
                request.slot.start,
            ))
        })
    }

    async fn cancel_booking(&self, booking_id: &str, _reason: &str) -> UpstreamResult<()> {
        self.record(UpstreamOperation::CancelBooking);
        self.simulate_latency().await;
        let next = self.state().cancel.next().unwrap_or(Ok(()));
        if next.is_ok() {
            self.state().canceled.push(booking_id.to_string());
        }
        next
    }

    async fn find_bookings(&self, email: &str) -> UpstreamResult<Vec<Booking>> {
        self.record(UpstreamOperation::FindBookings);
        self.simulate_latency().await;
        let next = self
            .state()
            .bookings
            .get_mut(&email.to_lowercase())
            .and_then(|s| s.next());
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SlotSync data types.

    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    /// Generate a Timestamp on a half-hour boundary in early 2026.
    pub fn arb_slot_start() -> impl Strategy<Value = Timestamp> {
        (0i64..(60 * 48)).prop_map(|half_hours| {
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now)
                + chrono::Duration::minutes(30 * half_hours)
        })
    }

    pub fn arb_resource_id() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("https://api.calendly.com/event_types/checkup".to_string()),
            Just("https://api.calendly.com/event_types/cleaning".to_string()),
            "[a-z]{3,8}",
        ]
    }

    /// Generate a 30 minute slot for `resource_id`.
    pub fn arb_slot(resource_id: String) -> impl Strategy<Value = Slot> {
        (arb_slot_start(), "[a-z0-9]{8}").prop_map(move |(start, token)| {
            Slot::new(
                resource_id.clone(),
                start,
                start + chrono::Duration::minutes(30),
                token,
            )
        })
    }

    /// Generate a possibly unsorted, possibly duplicated slot list.
    pub fn arb_slots(resource_id: String) -> impl Strategy<Value = Vec<Slot>> {
        prop::collection::vec(arb_slot(resource_id), 0..24)
    }

    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (arb_resource_id(), 0u32..60, 1u32..8).prop_map(|(resource, offset, days)| {
            let start = NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap_or_default()
                + chrono::Duration::days(offset as i64);
            let window = DateWindow::starting(start, days)
                .unwrap_or_else(|_| DateWindow::single_day(start));
            CacheKey::new(&resource, window)
                .unwrap_or_else(|_| fixtures::key_for("fallback", start, 1))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common test scenarios.

    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    pub const RESOURCE: &str = "https://api.calendly.com/event_types/dental-checkup";

    pub fn day(year: i32, month: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, d).expect("valid fixture date")
    }

    pub fn at(year: i32, month: u32, d: u32, hour: u32, minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(year, month, d, hour, minute, 0)
            .single()
            .expect("valid fixture time")
    }

    /// Key covering `days` days of `resource` from `start`.
    pub fn key_for(resource: &str, start: NaiveDate, days: u32) -> CacheKey {
        let window = DateWindow::starting(start, days).expect("fixture window has at least one day");
        CacheKey::new(resource, window).expect("fixture resource is not empty")
    }

    /// A 30 minute slot starting at `start`.
    pub fn slot_at(resource: &str, start: Timestamp) -> Slot {
        Slot::new(
            resource,
            start,
            start + chrono::Duration::minutes(30),
            format!("https://calendly.com/acme-dental/30min/{}", start.to_rfc3339()),
        )
    }

    /// Consecutive half-hour slots from `first`.
    pub fn slots_from(resource: &str, first: Timestamp, count: usize) -> Vec<Slot> {
        (0..count)
            .map(|i| slot_at(resource, first + chrono::Duration::minutes(30 * i as i64)))
            .collect()
    }

    pub fn booking(id: &str, email: &str, start: Timestamp) -> Booking {
        Booking {
            booking_id: id.to_string(),
            name: Some("Dental Check Up".to_string()),
            resource_id: Some(RESOURCE.to_string()),
            start,
            end: start + chrono::Duration::minutes(30),
            status: BookingStatus::Active,
            invitee_email: Some(email.to_string()),
        }
    }

    pub fn booking_request(slot: Slot, email: &str) -> BookingRequest {
        BookingRequest {
            slot,
            invitee: Invitee {
                name: "Pat Doe".to_string(),
                email: email.to_string(),
                timezone: Some("Europe/London".to_string()),
            },
        }
    }

    pub fn transient(operation: UpstreamOperation) -> UpstreamError {
        UpstreamError::Transient {
            operation,
            reason: "HTTP 503: Service Unavailable".to_string(),
            phase: SendPhase::Sent,
        }
    }

    pub fn rejected(operation: UpstreamOperation, status: u16) -> UpstreamError {
        UpstreamError::Rejected {
            operation,
            status,
            reason: "rejected by fixture".to_string(),
        }
    }
}
