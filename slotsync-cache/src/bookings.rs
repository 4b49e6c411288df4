//! Per-email cache of booking lookups.
//!
//! Writes follow the same ordering rule as the availability store: a lookup
//! requested before the email's last invalidation (or before the last
//! `invalidate_all`) cannot repopulate it.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use slotsync_core::{Booking, Timestamp};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedBookings {
    bookings: Arc<Vec<Booking>>,
    cached_at: Timestamp,
}

/// Per-email state. `watermark` is the latest of the accepted lookup's
/// request time and the last invalidation; writes requested earlier are
/// refused.
#[derive(Debug, Clone)]
struct BookingsCell {
    cached: Option<CachedBookings>,
    watermark: Timestamp,
}

/// Outcome of a bookings cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingsLookup {
    /// Cached within the TTL.
    Fresh(Arc<Vec<Booking>>),
    /// Cached, but past the TTL. Usable as a fallback if the provider fails.
    Expired(Arc<Vec<Booking>>),
    Missing,
}

/// Booking lookups keyed by case-normalized email with a fixed TTL.
#[derive(Debug)]
pub struct BookingsCache {
    entries: DashMap<String, BookingsCell>,
    /// Time of the last `invalidate_all`. Held for reading across every
    /// write so a clear cannot interleave with one.
    cleared_at: RwLock<Option<Timestamp>>,
    ttl: Duration,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl BookingsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cleared_at: RwLock::new(None),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, email: &str) -> BookingsLookup {
        self.get_at(email, Utc::now())
    }

    pub fn get_at(&self, email: &str, now: Timestamp) -> BookingsLookup {
        let Some(cell) = self.entries.get(&normalize_email(email)) else {
            return BookingsLookup::Missing;
        };
        let Some(cached) = &cell.cached else {
            return BookingsLookup::Missing;
        };
        let age = (now - cached.cached_at).to_std().unwrap_or(Duration::ZERO);
        if age > self.ttl {
            BookingsLookup::Expired(Arc::clone(&cached.bookings))
        } else {
            BookingsLookup::Fresh(Arc::clone(&cached.bookings))
        }
    }

    /// Cache the result of a lookup that was sent to the provider at
    /// `requested_at`.
    ///
    /// Returns `false` when the write was refused because the email was
    /// invalidated, or a later lookup was stored, after `requested_at`.
    pub fn put(&self, email: &str, bookings: Arc<Vec<Booking>>, requested_at: Timestamp) -> bool {
        self.put_at(email, bookings, requested_at, Utc::now())
    }

    /// [`put`](Self::put) with an explicit cache time.
    pub fn put_at(
        &self,
        email: &str,
        bookings: Arc<Vec<Booking>>,
        requested_at: Timestamp,
        now: Timestamp,
    ) -> bool {
        let cleared_at = self.cleared_at.read().unwrap_or_else(PoisonError::into_inner);
        if cleared_at.is_some_and(|at| requested_at < at) {
            debug!(requested_at = %requested_at, "Refusing bookings write older than a full clear");
            return false;
        }

        let cached = Some(CachedBookings {
            bookings,
            cached_at: now,
        });
        match self.entries.entry(normalize_email(email)) {
            Entry::Vacant(vacant) => {
                vacant.insert(BookingsCell {
                    cached,
                    watermark: requested_at,
                });
                true
            }
            Entry::Occupied(mut occupied) => {
                let cell = occupied.get_mut();
                if requested_at < cell.watermark {
                    debug!(
                        requested_at = %requested_at,
                        watermark = %cell.watermark,
                        "Refusing out-of-order bookings write"
                    );
                    return false;
                }
                cell.cached = cached;
                cell.watermark = requested_at;
                true
            }
        }
    }

    /// Returns `true` if an entry was removed.
    pub fn invalidate_email(&self, email: &str) -> bool {
        self.invalidate_email_at(email, Utc::now())
    }

    /// [`invalidate_email`](Self::invalidate_email) with an explicit time.
    /// Lookups requested before `at` can no longer populate the email.
    pub fn invalidate_email_at(&self, email: &str, at: Timestamp) -> bool {
        let mut cell = self
            .entries
            .entry(normalize_email(email))
            .or_insert_with(|| BookingsCell {
                cached: None,
                watermark: at,
            });
        cell.watermark = cell.watermark.max(at);
        cell.cached.take().is_some()
    }

    pub fn invalidate_all(&self) {
        self.invalidate_all_at(Utc::now());
    }

    /// Drop every entry. Lookups requested before `at` can no longer
    /// populate any email.
    pub fn invalidate_all_at(&self, at: Timestamp) {
        let mut cleared_at = self.cleared_at.write().unwrap_or_else(PoisonError::into_inner);
        *cleared_at = Some(cleared_at.map_or(at, |prev| prev.max(at)));
        self.entries.clear();
    }

    /// Number of emails currently holding a cached lookup.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|cell| cell.cached.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use slotsync_core::BookingStatus;

    fn booking(id: &str) -> Booking {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        Booking {
            booking_id: id.to_string(),
            name: Some("Cleaning".to_string()),
            resource_id: None,
            start,
            end: start + chrono::Duration::minutes(30),
            status: BookingStatus::Active,
            invitee_email: Some("pat@example.com".to_string()),
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let cache = BookingsCache::new(Duration::from_secs(300));
        cache.put("Pat@Example.com ", Arc::new(vec![booking("b1")]), Utc::now());
        match cache.get("pat@example.com") {
            BookingsLookup::Fresh(bookings) => assert_eq!(bookings[0].booking_id, "b1"),
            other => panic!("expected fresh entry, got {other:?}"),
        }
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = BookingsCache::new(Duration::from_secs(300));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert!(cache.put_at("pat@example.com", Arc::new(vec![booking("b1")]), now, now));
        assert!(matches!(
            cache.get_at("pat@example.com", now + chrono::Duration::seconds(300)),
            BookingsLookup::Fresh(_)
        ));
        assert!(matches!(
            cache.get_at("pat@example.com", now + chrono::Duration::seconds(301)),
            BookingsLookup::Expired(_)
        ));
    }

    #[test]
    fn test_invalidation() {
        let cache = BookingsCache::new(Duration::from_secs(300));
        cache.put("a@example.com", Arc::new(vec![]), Utc::now());
        cache.put("b@example.com", Arc::new(vec![]), Utc::now());
        assert!(cache.invalidate_email("A@example.com"));
        assert!(!cache.invalidate_email("A@example.com"));
        assert_eq!(cache.get("a@example.com"), BookingsLookup::Missing);
        assert_eq!(cache.len(), 1);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_lookup_requested_before_invalidation_is_refused() {
        let cache = BookingsCache::new(Duration::from_secs(300));
        assert!(cache.put_at("pat@example.com", Arc::new(vec![booking("b1")]), t(0), t(0)));

        // Lookup A starts at t=10, the email is invalidated at t=11, and A
        // completes at t=15.
        assert!(cache.invalidate_email_at("pat@example.com", t(11)));
        assert!(!cache.put_at("pat@example.com", Arc::new(vec![]), t(10), t(15)));
        assert_eq!(cache.get_at("pat@example.com", t(16)), BookingsLookup::Missing);

        assert!(cache.put_at("pat@example.com", Arc::new(vec![booking("b2")]), t(12), t(13)));
        // A slower lookup that started between the invalidation and the
        // accepted one cannot overwrite it.
        assert!(!cache.put_at("pat@example.com", Arc::new(vec![]), t(11), t(20)));
        match cache.get_at("pat@example.com", t(21)) {
            BookingsLookup::Fresh(bookings) => assert_eq!(bookings[0].booking_id, "b2"),
            other => panic!("expected fresh entry, got {other:?}"),
        }
    }

    #[test]
    fn test_invalidating_absent_email_still_gates_in_flight_lookup() {
        let cache = BookingsCache::new(Duration::from_secs(300));
        assert!(!cache.invalidate_email_at("pat@example.com", t(5)));
        assert!(cache.is_empty());
        assert!(!cache.put_at("pat@example.com", Arc::new(vec![]), t(0), t(6)));
        assert!(cache.put_at("pat@example.com", Arc::new(vec![]), t(5), t(6)));
    }

    #[test]
    fn test_invalidate_all_gates_every_email() {
        let cache = BookingsCache::new(Duration::from_secs(300));
        cache.invalidate_all_at(t(10));
        assert!(!cache.put_at("new@example.com", Arc::new(vec![]), t(9), t(12)));
        assert!(cache.put_at("new@example.com", Arc::new(vec![]), t(10), t(12)));
        assert_eq!(cache.len(), 1);
    }
}
