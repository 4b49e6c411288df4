//! Constants for the SlotSync service layer
//!
//! Defaults for every configuration value read by [`crate::config`].

// ============================================================================
// BACKGROUND REFRESH
// ============================================================================

/// Interval between refresh cycles (2 minutes)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 120;

/// How long shutdown waits for an in-flight refresh cycle
pub const DEFAULT_REFRESH_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Days of availability tracked per resource, starting today
pub const DEFAULT_TRACKED_HORIZON_DAYS: u32 = 7;

// ============================================================================
// CACHING
// ============================================================================

/// Maximum age of a cached entry before a read treats it as a miss.
/// Matches the refresh interval.
pub const DEFAULT_STALENESS_CEILING_SECS: u64 = DEFAULT_REFRESH_INTERVAL_SECS;

/// A read-through key no reader has touched for this long is no longer
/// refreshed. Matches the staleness ceiling.
pub const DEFAULT_READ_THROUGH_IDLE_SECS: u64 = DEFAULT_STALENESS_CEILING_SECS;

/// Lifetime of a cached booking lookup (5 minutes)
pub const DEFAULT_BOOKINGS_TTL_SECS: u64 = 300;

/// Hour of the clinic's local day at which afternoon starts
pub const AFTERNOON_STARTS_AT_HOUR: u32 = 12;

// ============================================================================
// WEBHOOKS
// ============================================================================

/// Header carrying the Calendly webhook signature
pub const CALENDLY_SIGNATURE_HEADER: &str = "calendly-webhook-signature";

/// Maximum accepted age of a webhook signature timestamp (3 minutes)
pub const DEFAULT_MAX_SIGNATURE_AGE_SECS: u64 = 180;

/// Reason sent to the provider when a booking is canceled without one
pub const DEFAULT_CANCEL_REASON: &str = "Canceled by patient";

// ============================================================================
// SERVER
// ============================================================================

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "slotsync_api=debug,slotsync_upstream=info,tower_http=info,info";
