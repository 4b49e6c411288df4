//! Calendly API request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub resource: UserResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResource {
    pub uri: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

// ============================================================================
// AVAILABILITY
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableTimesResponse {
    #[serde(default)]
    pub collection: Vec<AvailableTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableTime {
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub scheduling_url: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub invitees_remaining: Option<u32>,
}

impl AvailableTime {
    pub fn is_bookable(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s == "available")
            && self.invitees_remaining.map_or(true, |n| n > 0)
    }
}

// ============================================================================
// SCHEDULED EVENTS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledEventsResponse {
    #[serde(default)]
    pub collection: Vec<ScheduledEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledEvent {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub event_type: Option<String>,
}

// ============================================================================
// INVITEES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CreateInviteeRequest {
    pub event_type: String,
    pub start_time: String,
    pub invitee: InviteeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteeBody {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInviteeResponse {
    pub resource: InviteeResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteeResource {
    pub uri: String,
    /// URI of the scheduled event the invitee was added to.
    pub event: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationRequest {
    pub reason: String,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn describe(&self) -> Option<String> {
        match (&self.title, &self.message) {
            (Some(title), Some(message)) => Some(format!("{}: {}", title, message)),
            (None, Some(message)) => Some(message.clone()),
            (Some(title), None) => Some(title.clone()),
            (None, None) => None,
        }
    }
}

/// Last path segment of a Calendly resource URI.
pub fn uuid_from_uri(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_from_uri() {
        assert_eq!(
            uuid_from_uri("https://api.calendly.com/scheduled_events/event-123"),
            "event-123"
        );
        assert_eq!(uuid_from_uri("event-123"), "event-123");
    }

    #[test]
    fn test_available_time_filtering() {
        let json = r#"{"start_time":"2026-01-24T09:00:00Z","scheduling_url":"u","status":"available","invitees_remaining":0}"#;
        let slot: AvailableTime = serde_json::from_str(json).unwrap();
        assert!(!slot.is_bookable());
    }

    #[test]
    fn test_error_body_describe() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"title":"Invalid Argument","message":"slot taken"}"#).unwrap();
        assert_eq!(body.describe().unwrap(), "Invalid Argument: slot taken");
    }
}
