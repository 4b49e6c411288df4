//! Normalized provider notifications.
//!
//! Webhook payloads are parsed and authenticated elsewhere; this is the shape
//! the invalidation path consumes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::{canonical_resource, CacheKey};
use crate::error::EventError;
use crate::Timestamp;

/// What happened upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventKind {
    BookingCreated,
    BookingCanceled,
    BookingRescheduled,
}

impl fmt::Display for ProviderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BookingCreated => "booking_created",
            Self::BookingCanceled => "booking_canceled",
            Self::BookingRescheduled => "booking_rescheduled",
        };
        f.write_str(name)
    }
}

/// A validated, normalized provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub kind: ProviderEventKind,
    pub resource_id: String,
    /// Start of the affected time window (inclusive).
    pub affected_from: Timestamp,
    /// End of the affected time window (exclusive).
    pub affected_to: Timestamp,
    pub received_at: Timestamp,
    /// Invitee email, when the provider reported one.
    pub invitee_email: Option<String>,
}

impl ProviderEvent {
    pub fn new(
        kind: ProviderEventKind,
        resource_id: &str,
        affected_from: Timestamp,
        affected_to: Timestamp,
    ) -> Result<Self, EventError> {
        let resource_id = canonical_resource(resource_id);
        if resource_id.is_empty() {
            return Err(EventError::MissingField {
                field: "resource_id".to_string(),
            });
        }
        if affected_to <= affected_from {
            return Err(EventError::InvalidField {
                field: "affected_window".to_string(),
                reason: format!("{} is not after {}", affected_to, affected_from),
            });
        }
        Ok(Self {
            kind,
            resource_id,
            affected_from,
            affected_to,
            received_at: Utc::now(),
            invitee_email: None,
        })
    }

    pub fn with_invitee_email(mut self, email: impl Into<String>) -> Self {
        self.invitee_email = Some(email.into());
        self
    }

    pub fn with_received_at(mut self, received_at: Timestamp) -> Self {
        self.received_at = received_at;
        self
    }

    /// Whether the cached slot list for `key` may be wrong after this event.
    pub fn affects(&self, key: &CacheKey) -> bool {
        key.resource_id() == self.resource_id
            && key.window().overlaps(self.affected_from, self.affected_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DateWindow;
    use chrono::{NaiveDate, TimeZone};

    fn at(d: u32, h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, d, h, 0, 0).unwrap()
    }

    fn key(resource: &str, start: u32, end: u32) -> CacheKey {
        CacheKey::for_days(
            resource,
            NaiveDate::from_ymd_opt(2026, 1, start).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, end).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_event_affects_overlapping_key_of_same_resource() {
        let event =
            ProviderEvent::new(ProviderEventKind::BookingCreated, "res-1/", at(24, 9), at(24, 10))
                .unwrap();
        assert_eq!(event.resource_id, "res-1");
        assert!(event.affects(&key("res-1", 24, 30)));
        assert!(event.affects(&key("res-1", 20, 24)));
        assert!(!event.affects(&key("res-1", 25, 30)));
        assert!(!event.affects(&key("res-2", 24, 30)));
    }

    #[test]
    fn test_event_rejects_empty_window() {
        let err = ProviderEvent::new(ProviderEventKind::BookingCanceled, "r", at(24, 9), at(24, 9))
            .unwrap_err();
        assert!(matches!(err, EventError::InvalidField { .. }));
    }

    #[test]
    fn test_event_rejects_missing_resource() {
        let err = ProviderEvent::new(ProviderEventKind::BookingCanceled, " ", at(24, 9), at(24, 10))
            .unwrap_err();
        assert!(matches!(err, EventError::MissingField { .. }));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ProviderEventKind::BookingRescheduled).unwrap();
        assert_eq!(json, "\"booking_rescheduled\"");
        let window = DateWindow::single_day(NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        assert!(window.contains(at(24, 9)));
    }
}
