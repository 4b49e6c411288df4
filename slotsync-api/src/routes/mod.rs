//! HTTP Routes
//!
//! - `/health/*` - liveness, readiness and cache counters
//! - `/webhooks/calendly` - provider event receiver
//! - `/availability`, `/bookings/search` - read endpoints over the caches
//! - `/metrics` - Prometheus exposition

pub mod availability;
pub mod health;
pub mod webhooks;

use axum::{middleware::from_fn, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use availability::create_router as availability_router;
pub use health::create_router as health_router;
pub use webhooks::create_router as webhooks_router;

/// Assemble the full application router.
pub fn create_router(state: AppState) -> Router {
    let metrics_enabled = state.metrics_enabled;
    let mut router = Router::new()
        .nest("/health", health_router(state.clone()))
        .nest("/webhooks", webhooks_router(state.clone()))
        .merge(availability_router(state));

    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
}
