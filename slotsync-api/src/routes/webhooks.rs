//! Provider webhook receiver.
//!
//! Deliveries are authenticated against the raw body before anything is
//! parsed. Invalidation and the follow-up refetch finish before the
//! response is sent, so a 200 means the cache already reflects the event.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use slotsync_core::EventError;

use crate::constants::CALENDLY_SIGNATURE_HEADER;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::metrics;
use crate::webhook::{parse_calendly_event, verify_signature, WebhookMessage};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refetched: Option<usize>,
}

impl WebhookAck {
    fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            message: None,
            affected: None,
            refetched: None,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /webhooks/calendly - Receive a Calendly delivery
pub async fn receive_calendly(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if let Some(signing_key) = state.webhook.signing_key.as_deref() {
        let header = headers
            .get(CALENDLY_SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Err(e) = verify_signature(
            header,
            &body,
            signing_key,
            Utc::now(),
            state.webhook.max_signature_age,
        ) {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            record("unknown", "unauthorized");
            return Err(ApiError::invalid_signature(e.to_string()));
        }
    }

    let message = match parse_calendly_event(&body) {
        Ok(message) => message,
        Err(EventError::Malformed { reason }) => {
            record("unknown", "malformed");
            return Err(ApiError::invalid_input(format!(
                "Malformed webhook payload: {}",
                reason
            )));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dropping webhook event that cannot be applied");
            record("unknown", "dropped");
            return Ok((StatusCode::OK, Json(WebhookAck::status("ignored"))));
        }
    };

    let ack = match message {
        WebhookMessage::Ping => {
            record("ping", "ok");
            WebhookAck {
                message: Some("Webhook endpoint is active".to_string()),
                ..WebhookAck::status("ok")
            }
        }
        WebhookMessage::Ignored { kind } => {
            tracing::debug!(kind = %kind, "Ignoring webhook event");
            record(&kind, "ignored");
            WebhookAck::status("ignored")
        }
        WebhookMessage::Event(event) => {
            let report = state.service.handle_provider_event(&event).await;
            let outcome = if report.failed.is_empty() {
                "processed"
            } else {
                "partial"
            };
            record(&event.kind.to_string(), outcome);
            WebhookAck {
                affected: Some(report.affected.len()),
                refetched: Some(report.refetched),
                ..WebhookAck::status("processed")
            }
        }
    };

    Ok((StatusCode::OK, Json(ack)))
}

fn record(kind: &str, outcome: &str) {
    if let Some(metrics) = metrics() {
        metrics.record_webhook_event(kind, outcome);
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/calendly", post(receive_calendly))
        .with_state(state)
}
