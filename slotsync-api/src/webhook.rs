//! Calendly webhook authentication and normalization.
//!
//! Calendly signs each delivery with a `Calendly-Webhook-Signature` header of
//! the form `t=<unix seconds>,v1=<hex>`, where the hex value is
//! HMAC-SHA256(signing key, `"<t>.<raw body>"`).
//!
//! Payloads are normalized into [`ProviderEvent`]s:
//!
//! | Calendly event                         | Result                |
//! |----------------------------------------|-----------------------|
//! | `invitee.created`                      | `BookingCreated`      |
//! | `invitee.canceled`                     | `BookingCanceled`     |
//! | `invitee.canceled`, `rescheduled=true` | `BookingRescheduled`  |
//! | `invitee_no_show`                      | ignored               |
//! | `ping` or no `event`                   | ping                  |
//! | anything else                          | `EventError`          |

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use slotsync_core::{EventError, ProviderEvent, ProviderEventKind, Timestamp};
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SIGNATURES
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing webhook signature")]
    Missing,

    #[error("Malformed webhook signature: {reason}")]
    Malformed { reason: String },

    #[error("Webhook signature timestamp is {age_secs}s away from now")]
    Expired { age_secs: i64 },

    #[error("Invalid webhook signature")]
    Mismatch,

    #[error("Webhook signing key is unusable: {reason}")]
    InvalidKey { reason: String },
}

fn mac_for(signing_key: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).map_err(|e| {
        SignatureError::InvalidKey {
            reason: e.to_string(),
        }
    })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Produce a `Calendly-Webhook-Signature` header value for `body`.
pub fn sign_payload(signing_key: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let mac = mac_for(signing_key, timestamp, body)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={},v1={}", timestamp, signature))
}

/// Check a `Calendly-Webhook-Signature` header against the raw body.
///
/// The digest comparison is constant-time. Signatures whose timestamp is
/// more than `max_age` away from `now`, in either direction, are rejected.
pub fn verify_signature(
    header: Option<&str>,
    body: &[u8],
    signing_key: &str,
    now: Timestamp,
    max_age: Duration,
) -> Result<(), SignatureError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::Missing)?;

    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signature = Some(value),
            _ => {}
        }
    }

    let timestamp: i64 = timestamp
        .ok_or_else(|| SignatureError::Malformed {
            reason: "missing t= component".to_string(),
        })?
        .parse()
        .map_err(|_| SignatureError::Malformed {
            reason: "t= is not a unix timestamp".to_string(),
        })?;
    let signature = signature.ok_or_else(|| SignatureError::Malformed {
        reason: "missing v1= component".to_string(),
    })?;
    let signature = hex::decode(signature).map_err(|_| SignatureError::Malformed {
        reason: "v1= is not hex".to_string(),
    })?;

    let age_secs = now.timestamp() - timestamp;
    if age_secs.unsigned_abs() > max_age.as_secs() {
        return Err(SignatureError::Expired { age_secs });
    }

    mac_for(signing_key, timestamp, body)?
        .verify_slice(&signature)
        .map_err(|_| SignatureError::Mismatch)
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    event: Option<String>,
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    email: Option<String>,
    invitee: Option<InviteeInfo>,
    scheduled_event: Option<EventInfo>,
    /// Older payloads carry the event details here, newer ones the event URI.
    event: Option<serde_json::Value>,
    rescheduled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct InviteeInfo {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventInfo {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    event_type: Option<String>,
}

/// Outcome of normalizing a webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookMessage {
    /// Subscription check. Nothing to do.
    Ping,
    /// A recognized event that does not affect availability.
    Ignored { kind: String },
    Event(ProviderEvent),
}

/// Normalize a Calendly webhook body.
///
/// Unknown event kinds and payloads missing the fields needed to locate the
/// affected window are errors; the caller logs and drops them.
pub fn parse_calendly_event(body: &[u8]) -> Result<WebhookMessage, EventError> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| EventError::Malformed {
        reason: e.to_string(),
    })?;

    let kind = match envelope.event.as_deref().map(str::trim) {
        None | Some("") | Some("ping") => return Ok(WebhookMessage::Ping),
        Some(kind) => kind.to_string(),
    };

    let payload = envelope.payload.ok_or_else(|| EventError::MissingField {
        field: "payload".to_string(),
    })?;

    let provider_kind = match kind.as_str() {
        "invitee.created" => ProviderEventKind::BookingCreated,
        "invitee.canceled" if payload.rescheduled.unwrap_or(false) => {
            ProviderEventKind::BookingRescheduled
        }
        "invitee.canceled" => ProviderEventKind::BookingCanceled,
        "invitee_no_show.created" | "invitee_no_show.deleted" | "invitee_no_show" => {
            return Ok(WebhookMessage::Ignored { kind });
        }
        _ => return Err(EventError::UnknownKind { kind }),
    };

    let email = payload
        .email
        .or_else(|| payload.invitee.and_then(|invitee| invitee.email))
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty());

    let details = payload
        .scheduled_event
        .or_else(|| {
            payload
                .event
                .filter(serde_json::Value::is_object)
                .and_then(|details| serde_json::from_value(details).ok())
        })
        .ok_or_else(|| EventError::MissingField {
            field: "payload.scheduled_event".to_string(),
        })?;

    let resource_id = details.event_type.ok_or_else(|| EventError::MissingField {
        field: "payload.scheduled_event.event_type".to_string(),
    })?;
    let start = details.start_time.ok_or_else(|| EventError::MissingField {
        field: "payload.scheduled_event.start_time".to_string(),
    })?;
    // Without an end time the event is treated as an instant at its start.
    let end = details
        .end_time
        .unwrap_or_else(|| start + ChronoDuration::minutes(1));

    let mut event = ProviderEvent::new(provider_kind, &resource_id, start, end)?;
    if let Some(email) = email {
        event = event.with_invitee_email(email);
    }
    Ok(WebhookMessage::Event(event))
}
