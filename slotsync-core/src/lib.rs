//! SlotSync Core - Availability Data Model
//!
//! Pure data structures shared by every SlotSync crate: cache keys, slots,
//! cache entries, provider events, statistics and the error taxonomy.
//! This crate performs no I/O.

use chrono::{DateTime, Utc};

pub mod config;
pub mod entities;
pub mod error;
pub mod event;
pub mod health;
pub mod stats;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use config::RetryConfig;
pub use entities::{
    canonical_resource, normalize_slots, Booking, BookingRequest, BookingStatus, CacheEntry,
    CacheKey, DateWindow, EntrySource, Invitee, Slot, MAX_WINDOW_DAYS,
};
pub use error::{
    ConfigError, EventError, SendPhase, UpstreamError, UpstreamOperation, UpstreamResult,
    ValidationError,
};
pub use event::{ProviderEvent, ProviderEventKind};
pub use health::{HealthCheck, HealthStatus};
pub use stats::CacheStats;
