//! SlotSync API - Availability Service Layer
//!
//! Sits between booking flows and the scheduling provider. Availability is
//! served from a per-process cache kept warm by a background refresher and
//! kept correct by provider webhooks, which invalidate and refetch the
//! affected date windows.
//!
//! The crate exposes the service façade for in-process callers and a small
//! Axum surface for health, stats, webhooks and read endpoints.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod webhook;

// Re-export commonly used types
pub use config::{
    AvailabilityConfig, BookingsCacheConfig, RefresherConfig, ServerConfig, SyncConfig,
    TrackedKeys, WebhookConfig,
};
pub use error::{ApiError, ApiResult, ErrorCode, ServiceError, ServiceResult};
pub use jobs::{BackgroundRefresher, CycleReport, RefresherState};
pub use routes::create_router;
pub use services::{AvailabilityService, InvalidationGateway, InvalidationReport, TimePreference};
pub use state::AppState;
pub use webhook::{parse_calendly_event, sign_payload, verify_signature, SignatureError, WebhookMessage};
