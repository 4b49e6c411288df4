//! Health Check Endpoints
//!
//! - /health/live - Process alive check
//! - /health/ready - Initial population done and refresher running
//! - /health/stats - Cache counters
//!
//! No authentication required for health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use slotsync_core::{CacheStats, HealthCheck, HealthStatus};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub availability: HealthCheck,
    pub refresher: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
///
/// Stays 503 until the initial population has finished. A degraded cache
/// (last refresh cycle had failures) is still ready: it keeps serving.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let availability = state.service.health();
    let ready = state.service.is_ready();

    let response = HealthResponse {
        status: availability.status,
        message: availability.message.clone(),
        details: Some(HealthDetails {
            refresher: state.service.refresher().state().to_string(),
            availability,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// GET /health/stats - Cache counters and hit rate
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.service.get_stats();
    let hit_rate = stats.hit_rate();
    Json(StatsResponse { stats, hit_rate })
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no auth required)
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/stats", get(stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Degraded,
            message: Some("last refresh failed".to_string()),
            details: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "degraded");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        let response = StatsResponse {
            hit_rate: stats.hit_rate(),
            stats,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["hits"], 3);
        assert_eq!(json["hit_rate"], 0.75);
    }
}
