//! Calendly HTTP transport

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use slotsync_core::{
    normalize_slots, Booking, BookingRequest, BookingStatus, CacheKey, ConfigError, SendPhase,
    Slot, Timestamp, UpstreamError, UpstreamOperation, UpstreamResult,
};
use tokio::sync::OnceCell;
use tracing::debug;

use super::types::{
    uuid_from_uri, AvailableTimesResponse, CancellationRequest, CreateInviteeRequest,
    CreateInviteeResponse, ErrorBody, InviteeBody, ScheduledEventsResponse, UserResponse,
};
use crate::config::{PoolConfig, ProviderConfig};
use crate::provider::SchedulingProvider;

const PROVIDER_ID: &str = "calendly";

/// Longest range `/event_type_available_times` accepts in one request.
const AVAILABLE_TIMES_MAX_RANGE_DAYS: i64 = 7;

/// Calendly API client.
///
/// Holds one pooled `reqwest::Client`; keep-alive connections are reused
/// across calls and capped at `idle_per_host`.
pub struct CalendlyProvider {
    client: Client,
    config: ProviderConfig,
    user_uri: OnceCell<String>,
}

impl CalendlyProvider {
    pub fn new(config: ProviderConfig, pool: &PoolConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .pool_max_idle_per_host(pool.idle_per_host)
            .pool_idle_timeout(pool.idle_timeout)
            .connect_timeout(pool.connect_timeout)
            .user_agent(concat!("slotsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client".to_string(),
                value: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        let user_uri = match &config.user_uri {
            Some(uri) => OnceCell::new_with(Some(uri.clone())),
            None => OnceCell::new(),
        };

        Ok(Self {
            client,
            config,
            user_uri,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.base_url, path))
            .bearer_auth(&self.config.api_token)
    }

    /// Send one request and decode a JSON success body.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: UpstreamOperation,
        builder: RequestBuilder,
    ) -> UpstreamResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(|e| {
                if e.is_decode() {
                    UpstreamError::InvalidResponse {
                        operation,
                        reason: e.to_string(),
                    }
                } else {
                    transport_error(operation, e)
                }
            });
        }

        let body = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.describe())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Err(status_error(operation, status, reason))
    }

    async fn resolve_user_uri(&self) -> UpstreamResult<&str> {
        let uri = self
            .user_uri
            .get_or_try_init(|| async {
                let user: UserResponse = self
                    .send(UpstreamOperation::ResolveUser, self.request(Method::GET, "/users/me"))
                    .await?;
                debug!(user_uri = %user.resource.uri, "Resolved Calendly user");
                Ok::<_, UpstreamError>(user.resource.uri)
            })
            .await?;
        Ok(uri.as_str())
    }

    fn format_time(at: Timestamp) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[async_trait]
impl SchedulingProvider for CalendlyProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch_availability(&self, key: &CacheKey) -> UpstreamResult<Vec<Slot>> {
        let operation = UpstreamOperation::FetchAvailability;
        let lead = chrono::Duration::from_std(self.config.min_lead_time)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let earliest = Utc::now().checked_add_signed(lead).unwrap_or(Timestamp::MAX_UTC);
        let start = key.window().starts_at().max(earliest);
        let end = key.window().ends_at();
        let max_range = chrono::Duration::days(AVAILABLE_TIMES_MAX_RANGE_DAYS);

        let mut slots = Vec::new();
        let mut chunk_start = start;
        while chunk_start < end {
            let chunk_end = chunk_start
                .checked_add_signed(max_range)
                .map_or(end, |at| at.min(end));
            let builder = self
                .request(Method::GET, "/event_type_available_times")
                .query(&[
                    ("event_type", key.resource_id().to_string()),
                    ("start_time", Self::format_time(chunk_start)),
                    ("end_time", Self::format_time(chunk_end)),
                ]);
            let response: AvailableTimesResponse = self.send(operation, builder).await?;
            debug!(
                key = %key,
                chunk_start = %chunk_start,
                times = response.collection.len(),
                "Fetched Calendly available times"
            );

            slots.extend(response.collection.into_iter().filter(|t| t.is_bookable()).map(|t| {
                Slot::new(
                    key.resource_id(),
                    t.start_time,
                    t.start_time + self.config.slot_duration,
                    t.scheduling_url,
                )
            }));
            chunk_start = chunk_end;
        }

        Ok(normalize_slots(slots))
    }

    async fn create_booking(&self, request: &BookingRequest) -> UpstreamResult<Booking> {
        let operation = UpstreamOperation::CreateBooking;
        let event_type = if request.slot.resource_id.is_empty() {
            self.config.event_type_uri.clone().ok_or_else(|| UpstreamError::Rejected {
                operation,
                status: 400,
                reason: "no event type for booking".to_string(),
            })?
        } else {
            request.slot.resource_id.clone()
        };

        let body = CreateInviteeRequest {
            event_type: event_type.clone(),
            start_time: Self::format_time(request.slot.start),
            invitee: InviteeBody {
                name: request.invitee.name.clone(),
                email: request.invitee.email.clone(),
                timezone: request.invitee.timezone.clone(),
            },
        };
        let response: CreateInviteeResponse = self
            .send(operation, self.request(Method::POST, "/invitees").json(&body))
            .await?;

        Ok(Booking {
            booking_id: uuid_from_uri(&response.resource.event).to_string(),
            name: None,
            resource_id: Some(event_type),
            start: request.slot.start,
            end: request.slot.end,
            status: BookingStatus::Active,
            invitee_email: Some(request.invitee.email.clone()),
        })
    }

    async fn cancel_booking(&self, booking_id: &str, reason: &str) -> UpstreamResult<()> {
        let path = format!("/scheduled_events/{}/cancellation", uuid_from_uri(booking_id));
        let body = CancellationRequest {
            reason: reason.to_string(),
        };
        let _: serde_json::Value = self
            .send(
                UpstreamOperation::CancelBooking,
                self.request(Method::POST, &path).json(&body),
            )
            .await?;
        Ok(())
    }

    async fn find_bookings(&self, email: &str) -> UpstreamResult<Vec<Booking>> {
        let user = self.resolve_user_uri().await?;
        let builder = self.request(Method::GET, "/scheduled_events").query(&[
            ("user", user),
            ("invitee_email", email),
            ("status", "active"),
        ]);
        let response: ScheduledEventsResponse =
            self.send(UpstreamOperation::FindBookings, builder).await?;

        Ok(response
            .collection
            .into_iter()
            .map(|event| Booking {
                booking_id: uuid_from_uri(&event.uri).to_string(),
                name: event.name,
                resource_id: event.event_type,
                start: event.start_time,
                end: event.end_time,
                status: if event.status == "canceled" {
                    BookingStatus::Canceled
                } else {
                    BookingStatus::Active
                },
                invitee_email: Some(email.to_string()),
            })
            .collect())
    }
}

/// Classify a reqwest failure. Only connection failures are known to have
/// happened before the request was written.
fn transport_error(operation: UpstreamOperation, e: reqwest::Error) -> UpstreamError {
    let phase = if e.is_connect() {
        SendPhase::NotSent
    } else {
        SendPhase::Sent
    };
    UpstreamError::Transient {
        operation,
        reason: e.to_string(),
        phase,
    }
}

/// Classify a non-success status.
///
/// 429 means the request was refused before being processed, so it is safe
/// to retry even for mutations.
fn status_error(operation: UpstreamOperation, status: StatusCode, reason: String) -> UpstreamError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        UpstreamError::Transient {
            operation,
            reason,
            phase: SendPhase::NotSent,
        }
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        UpstreamError::Transient {
            operation,
            reason: format!("HTTP {}: {}", status.as_u16(), reason),
            phase: SendPhase::Sent,
        }
    } else {
        UpstreamError::Rejected {
            operation,
            status: status.as_u16(),
            reason,
        }
    }
}

impl std::fmt::Debug for CalendlyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendlyProvider")
            .field("base_url", &self.config.base_url)
            .field("api_token", &"[REDACTED]")
            .field("user_uri", &self.user_uri.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let op = UpstreamOperation::CreateBooking;
        assert!(matches!(
            status_error(op, StatusCode::BAD_GATEWAY, String::new()),
            UpstreamError::Transient { phase: SendPhase::Sent, .. }
        ));
        assert!(matches!(
            status_error(op, StatusCode::TOO_MANY_REQUESTS, String::new()),
            UpstreamError::Transient { phase: SendPhase::NotSent, .. }
        ));
        assert!(matches!(
            status_error(op, StatusCode::CONFLICT, "taken".to_string()),
            UpstreamError::Rejected { status: 409, .. }
        ));
    }

    #[test]
    fn test_format_time_matches_calendly_layout() {
        use chrono::TimeZone;
        let at = Utc.with_ymd_and_hms(2026, 1, 24, 9, 0, 0).unwrap();
        assert_eq!(CalendlyProvider::format_time(at), "2026-01-24T09:00:00.000000Z");
    }
}
