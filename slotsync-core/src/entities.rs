//! Availability entities: keys, windows, slots, cache entries and bookings.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ValidationError;
use crate::Timestamp;

// ============================================================================
// CACHE KEY
// ============================================================================

/// Canonical form of a provider resource identifier.
///
/// Surrounding whitespace and trailing slashes are dropped so that
/// `https://api.calendly.com/event_types/abc/` and
/// `https://api.calendly.com/event_types/abc` collide.
pub fn canonical_resource(resource_id: &str) -> String {
    resource_id.trim().trim_end_matches('/').to_string()
}

/// Longest window a key may cover, in days.
pub const MAX_WINDOW_DAYS: u32 = 62;

/// An inclusive range of UTC calendar days, at most [`MAX_WINDOW_DAYS`] long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Create a window covering `start..=end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidWindow { start, end });
        }
        if (end - start).num_days() >= i64::from(MAX_WINDOW_DAYS) {
            return Err(ValidationError::InvalidField {
                field: "days".to_string(),
                reason: format!("window must not exceed {} days", MAX_WINDOW_DAYS),
            });
        }
        Ok(Self { start, end })
    }

    /// A window covering exactly one day.
    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// A window of `days` consecutive days beginning at `start`.
    pub fn starting(start: NaiveDate, days: u32) -> Result<Self, ValidationError> {
        if days == 0 {
            return Err(ValidationError::InvalidField {
                field: "days".to_string(),
                reason: "window must span at least one day".to_string(),
            });
        }
        let end = start
            .checked_add_days(chrono::Days::new(u64::from(days - 1)))
            .ok_or_else(|| ValidationError::InvalidField {
                field: "days".to_string(),
                reason: "window end is out of range".to_string(),
            })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered (always at least 1).
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// First instant covered by the window (midnight UTC of `start`).
    pub fn starts_at(&self) -> Timestamp {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the window (midnight UTC after `end`).
    ///
    /// Saturates at the latest representable instant when `end` is the last
    /// representable day.
    pub fn ends_at(&self) -> Timestamp {
        self.end
            .and_time(NaiveTime::MIN)
            .and_utc()
            .checked_add_signed(chrono::Duration::days(1))
            .unwrap_or(Timestamp::MAX_UTC)
    }

    /// Whether the half-open interval `[from, to)` intersects this window.
    pub fn overlaps(&self, from: Timestamp, to: Timestamp) -> bool {
        from < self.ends_at() && self.starts_at() < to
    }

    /// Whether the instant falls inside this window.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.starts_at() <= at && at < self.ends_at()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Normalized identifier for a queryable availability window.
///
/// Equivalent queries collide: the resource identifier is canonicalized on
/// construction and the window is a plain day range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    resource_id: String,
    window: DateWindow,
}

impl CacheKey {
    /// Build a key from a raw resource identifier and a window.
    pub fn new(resource_id: &str, window: DateWindow) -> Result<Self, ValidationError> {
        let resource_id = canonical_resource(resource_id);
        if resource_id.is_empty() {
            return Err(ValidationError::EmptyResource);
        }
        Ok(Self {
            resource_id,
            window,
        })
    }

    /// Convenience constructor from a raw day range.
    pub fn for_days(
        resource_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Self::new(resource_id, DateWindow::new(start, end)?)
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource_id, self.window)
    }
}

// ============================================================================
// SLOTS
// ============================================================================

/// A bookable time window. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub start: Timestamp,
    pub end: Timestamp,
    pub resource_id: String,
    /// Provider-issued opaque scheduling-link token.
    pub scheduling_token: String,
}

impl Slot {
    pub fn new(
        resource_id: impl Into<String>,
        start: Timestamp,
        end: Timestamp,
        scheduling_token: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            resource_id: resource_id.into(),
            scheduling_token: scheduling_token.into(),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// Order slots by start time and drop repeated `(resource_id, start)` pairs.
///
/// The first occurrence of a duplicated pair wins.
pub fn normalize_slots(mut slots: Vec<Slot>) -> Vec<Slot> {
    slots.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    slots.dedup_by(|later, earlier| {
        later.start == earlier.start && later.resource_id == earlier.resource_id
    });
    slots
}

// ============================================================================
// CACHE ENTRIES
// ============================================================================

/// What produced a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Scheduled background refresh cycle.
    Refresh,
    /// Out-of-band refetch after a provider event.
    InvalidationRefetch,
    /// Synchronous fallback fetch on a reader's miss.
    ReadThrough,
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntrySource::Refresh => "refresh",
            EntrySource::InvalidationRefetch => "invalidation_refetch",
            EntrySource::ReadThrough => "read_through",
        };
        f.write_str(name)
    }
}

/// A cached slot list plus freshness metadata.
///
/// Entries are replaced wholesale and never mutated; the slot list is
/// normalized on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    key: CacheKey,
    slots: Vec<Slot>,
    /// When the upstream request that produced this entry was issued.
    requested_at: Timestamp,
    /// When that request completed.
    fetched_at: Timestamp,
    source: EntrySource,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        slots: Vec<Slot>,
        requested_at: Timestamp,
        fetched_at: Timestamp,
        source: EntrySource,
    ) -> Self {
        Self {
            key,
            slots: normalize_slots(slots),
            requested_at: requested_at.min(fetched_at),
            fetched_at,
            source,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn requested_at(&self) -> Timestamp {
        self.requested_at
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn source(&self) -> EntrySource {
        self.source
    }

    /// Age of the entry relative to `now`, zero if `fetched_at` is ahead.
    pub fn age(&self, now: Timestamp) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_older_than(&self, ceiling: Duration, now: Timestamp) -> bool {
        self.age(now) > ceiling
    }
}

// ============================================================================
// BOOKINGS
// ============================================================================

/// The person a booking is made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitee {
    pub name: String,
    pub email: String,
    pub timezone: Option<String>,
}

/// Request to book a specific slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub slot: Slot,
    pub invitee: Invitee,
}

impl BookingRequest {
    /// Reject requests the provider would refuse anyway.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.invitee.name.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "invitee.name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let email = self.invitee.email.trim();
        let valid_email = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid_email {
            return Err(ValidationError::InvalidField {
                field: "invitee.email".to_string(),
                reason: format!("'{}' is not an email address", self.invitee.email),
            });
        }
        if self.slot.end <= self.slot.start {
            return Err(ValidationError::InvalidField {
                field: "slot".to_string(),
                reason: "slot end must be after its start".to_string(),
            });
        }
        Ok(())
    }
}

/// Lifecycle state of a booking at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Canceled,
}

/// A booking as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Provider booking identifier (the scheduled event UUID for Calendly).
    pub booking_id: String,
    pub name: Option<String>,
    pub resource_id: Option<String>,
    pub start: Timestamp,
    pub end: Timestamp,
    pub status: BookingStatus,
    pub invitee_email: Option<String>,
}
