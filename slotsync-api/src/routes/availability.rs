//! Availability and booking lookup endpoints.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use slotsync_cache::Freshness;
use slotsync_core::{Booking, CacheKey, DateWindow, Slot};

use crate::constants::DEFAULT_TRACKED_HORIZON_DAYS;
use crate::error::{ApiError, ApiResult};
use crate::services::TimePreference;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityQuery {
    pub resource: Option<String>,
    pub start: Option<NaiveDate>,
    pub days: Option<u32>,
    pub time_preference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub slots: Vec<Slot>,
    /// Served from cache without calling the provider.
    pub cached: bool,
    pub cache_age_seconds: u64,
    /// Provider call failed and the last known slots were returned.
    pub stale: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingSearchRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSearchResponse {
    pub email: String,
    pub bookings: Vec<Booking>,
    pub count: usize,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /availability - Slots for a resource and date window
pub async fn get_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let resource = query
        .resource
        .or_else(|| state.default_resource.clone())
        .ok_or_else(|| ApiError::invalid_input("resource is required"))?;
    let preference: TimePreference = query
        .time_preference
        .as_deref()
        .unwrap_or_default()
        .parse()?;
    let start = query.start.unwrap_or_else(|| Utc::now().date_naive());
    let days = query.days.unwrap_or(DEFAULT_TRACKED_HORIZON_DAYS);
    let key = CacheKey::new(&resource, DateWindow::starting(start, days)?)?;

    let service = &state.service;
    let read = service
        .read_availability(&key, Freshness::best_effort(service.config().staleness_ceiling))
        .await?;

    let offset = service.config().clinic_utc_offset_minutes;
    let slots = read
        .value()
        .slots()
        .iter()
        .filter(|slot| preference.matches(slot, offset))
        .cloned()
        .collect();

    Ok(Json(AvailabilityResponse {
        slots,
        cached: read.was_cache_hit(),
        cache_age_seconds: read.staleness().as_secs(),
        stale: read.is_stale_fallback(),
    }))
}

/// POST /bookings/search - Active bookings for an email
pub async fn search_bookings(
    State(state): State<AppState>,
    Json(req): Json<BookingSearchRequest>,
) -> ApiResult<Json<BookingSearchResponse>> {
    let bookings = state.service.find_bookings(&req.email).await?;
    let bookings = bookings.as_ref().clone();
    Ok(Json(BookingSearchResponse {
        email: req.email,
        count: bookings.len(),
        bookings,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/availability", get(get_availability))
        .route("/bookings/search", post(search_bookings))
        .with_state(state)
}
