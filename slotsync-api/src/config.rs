//! Service configuration.
//!
//! Every struct has a `Default`, a `from_env()` constructor that falls back
//! to the default for any unset or unparseable variable, and where useful a
//! `development()` preset with short intervals.

use chrono::NaiveDate;
use slotsync_core::{CacheKey, ConfigError, DateWindow, MAX_WINDOW_DAYS};
use slotsync_upstream::{ProviderConfig, UpstreamClientConfig};
use std::time::Duration;

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_BOOKINGS_TTL_SECS, DEFAULT_MAX_SIGNATURE_AGE_SECS, DEFAULT_PORT,
    DEFAULT_READ_THROUGH_IDLE_SECS, DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_REFRESH_SHUTDOWN_GRACE_SECS,
    DEFAULT_STALENESS_CEILING_SECS, DEFAULT_TRACKED_HORIZON_DAYS,
};
use crate::telemetry::TelemetryConfig;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ============================================================================
// TRACKED KEYS
// ============================================================================

/// Which keys the background refresher keeps warm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedKeys {
    /// An explicit list of keys.
    Fixed(Vec<CacheKey>),
    /// One key per resource covering `horizon_days` days from today (UTC),
    /// clamped to `1..=MAX_WINDOW_DAYS`.
    Rolling {
        resources: Vec<String>,
        horizon_days: u32,
    },
}

impl Default for TrackedKeys {
    fn default() -> Self {
        TrackedKeys::Rolling {
            resources: Vec::new(),
            horizon_days: DEFAULT_TRACKED_HORIZON_DAYS,
        }
    }
}

impl TrackedKeys {
    /// Resolve to concrete keys for the given day.
    ///
    /// Resources that do not form a valid key (blank identifiers) are skipped.
    pub fn keys_for(&self, today: NaiveDate) -> Vec<CacheKey> {
        match self {
            TrackedKeys::Fixed(keys) => keys.clone(),
            TrackedKeys::Rolling {
                resources,
                horizon_days,
            } => {
                let days = (*horizon_days).clamp(1, MAX_WINDOW_DAYS);
                let Ok(window) = DateWindow::starting(today, days) else {
                    return Vec::new();
                };
                let mut keys: Vec<CacheKey> = resources
                    .iter()
                    .filter_map(|resource| CacheKey::new(resource, window).ok())
                    .collect();
                keys.sort();
                keys.dedup();
                keys
            }
        }
    }

    /// Track `resource` in addition to whatever is already tracked.
    pub fn with_resource(self, resource: impl Into<String>) -> Self {
        match self {
            TrackedKeys::Rolling {
                mut resources,
                horizon_days,
            } => {
                resources.push(resource.into());
                TrackedKeys::Rolling {
                    resources,
                    horizon_days,
                }
            }
            fixed @ TrackedKeys::Fixed(_) => fixed,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TrackedKeys::Fixed(keys) => keys.is_empty(),
            TrackedKeys::Rolling { resources, .. } => resources.is_empty(),
        }
    }
}

// ============================================================================
// REFRESHER
// ============================================================================

/// Configuration for the background refresher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefresherConfig {
    /// Time between refresh cycles (default: 2 minutes)
    pub interval: Duration,

    /// How long shutdown waits for an in-flight cycle before aborting it
    /// (default: 10 seconds)
    pub shutdown_grace: Duration,

    /// Untracked keys are refreshed only while a reader has accessed them
    /// within this bound (default: 120 seconds)
    pub read_through_idle: Duration,

    pub tracked: TrackedKeys,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_REFRESH_SHUTDOWN_GRACE_SECS),
            read_through_idle: Duration::from_secs(DEFAULT_READ_THROUGH_IDLE_SECS),
            tracked: TrackedKeys::default(),
        }
    }
}

impl RefresherConfig {
    /// Create RefresherConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SLOTSYNC_REFRESH_INTERVAL_SECS`: Time between cycles (default: 120)
    /// - `SLOTSYNC_REFRESH_SHUTDOWN_GRACE_SECS`: Shutdown grace period (default: 10)
    /// - `SLOTSYNC_READ_THROUGH_IDLE_SECS`: Idle bound for untracked keys (default: 120)
    /// - `SLOTSYNC_TRACKED_RESOURCES`: Comma-separated resource identifiers
    /// - `SLOTSYNC_TRACKED_HORIZON_DAYS`: Days tracked per resource (default: 7)
    pub fn from_env() -> Self {
        let interval = Duration::from_secs(
            env_parse::<u64>("SLOTSYNC_REFRESH_INTERVAL_SECS")
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS)
                .max(1),
        );

        let shutdown_grace = Duration::from_secs(
            env_parse("SLOTSYNC_REFRESH_SHUTDOWN_GRACE_SECS")
                .unwrap_or(DEFAULT_REFRESH_SHUTDOWN_GRACE_SECS),
        );

        let read_through_idle = Duration::from_secs(
            env_parse("SLOTSYNC_READ_THROUGH_IDLE_SECS").unwrap_or(DEFAULT_READ_THROUGH_IDLE_SECS),
        );

        let resources = env_string("SLOTSYNC_TRACKED_RESOURCES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let horizon_days =
            env_parse("SLOTSYNC_TRACKED_HORIZON_DAYS").unwrap_or(DEFAULT_TRACKED_HORIZON_DAYS);

        Self {
            interval,
            shutdown_grace,
            read_through_idle,
            tracked: TrackedKeys::Rolling {
                resources,
                horizon_days,
            },
        }
    }

    /// Short intervals for local development.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(2),
            read_through_idle: Duration::from_secs(15),
            tracked: TrackedKeys::default(),
        }
    }
}

// ============================================================================
// AVAILABILITY
// ============================================================================

/// Read-path settings for the availability service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityConfig {
    /// Entries older than this are treated as misses (default: 120 seconds).
    pub staleness_ceiling: Duration,

    /// Clinic offset from UTC, used to split morning from afternoon.
    pub clinic_utc_offset_minutes: i32,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            staleness_ceiling: Duration::from_secs(DEFAULT_STALENESS_CEILING_SECS),
            clinic_utc_offset_minutes: 0,
        }
    }
}

impl AvailabilityConfig {
    /// - `SLOTSYNC_STALENESS_CEILING_SECS` (default: 120)
    /// - `SLOTSYNC_CLINIC_UTC_OFFSET_MINUTES` (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let clinic_utc_offset_minutes: i32 =
            env_parse("SLOTSYNC_CLINIC_UTC_OFFSET_MINUTES").unwrap_or(0);
        if clinic_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::InvalidValue {
                field: "SLOTSYNC_CLINIC_UTC_OFFSET_MINUTES".to_string(),
                value: clinic_utc_offset_minutes.to_string(),
                reason: "offset must be less than 24 hours".to_string(),
            });
        }

        Ok(Self {
            staleness_ceiling: Duration::from_secs(
                env_parse("SLOTSYNC_STALENESS_CEILING_SECS")
                    .unwrap_or(DEFAULT_STALENESS_CEILING_SECS),
            ),
            clinic_utc_offset_minutes,
        })
    }
}

/// Settings for the per-email bookings cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingsCacheConfig {
    pub ttl: Duration,
}

impl Default for BookingsCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_BOOKINGS_TTL_SECS),
        }
    }
}

impl BookingsCacheConfig {
    /// - `SLOTSYNC_BOOKINGS_TTL_SECS` (default: 300)
    pub fn from_env() -> Self {
        Self {
            ttl: Duration::from_secs(
                env_parse("SLOTSYNC_BOOKINGS_TTL_SECS").unwrap_or(DEFAULT_BOOKINGS_TTL_SECS),
            ),
        }
    }
}

// ============================================================================
// WEBHOOKS
// ============================================================================

/// Webhook authenticity settings.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Calendly signing key. Signature checks are skipped when absent.
    pub signing_key: Option<String>,
    pub max_signature_age: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            max_signature_age: Duration::from_secs(DEFAULT_MAX_SIGNATURE_AGE_SECS),
        }
    }
}

impl WebhookConfig {
    /// - `CALENDLY_WEBHOOK_SIGNING_KEY`: signing key (optional)
    /// - `SLOTSYNC_WEBHOOK_MAX_SIGNATURE_AGE_SECS` (default: 180)
    pub fn from_env() -> Self {
        Self {
            signing_key: env_string("CALENDLY_WEBHOOK_SIGNING_KEY"),
            max_signature_age: Duration::from_secs(
                env_parse("SLOTSYNC_WEBHOOK_MAX_SIGNATURE_AGE_SECS")
                    .unwrap_or(DEFAULT_MAX_SIGNATURE_AGE_SECS),
            ),
        }
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_signature_age", &self.max_signature_age)
            .finish()
    }
}

// ============================================================================
// SERVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// - `SLOTSYNC_BIND`: bind host (default: 0.0.0.0)
    /// - `SLOTSYNC_PORT`, then `PORT` (default: 8080)
    pub fn from_env() -> Self {
        Self {
            host: env_string("SLOTSYNC_BIND").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string()),
            port: env_parse("SLOTSYNC_PORT")
                .or_else(|| env_parse("PORT"))
                .unwrap_or(DEFAULT_PORT),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// Everything the server binary needs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub provider: ProviderConfig,
    pub upstream: UpstreamClientConfig,
    pub refresher: RefresherConfig,
    pub availability: AvailabilityConfig,
    pub bookings: BookingsCacheConfig,
    pub webhook: WebhookConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

impl SyncConfig {
    /// Load the full configuration.
    ///
    /// When no tracked resources are configured, the provider's default
    /// event type is tracked.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = ProviderConfig::from_env()?;
        let mut refresher = RefresherConfig::from_env();
        if refresher.tracked.is_empty() {
            if let Some(event_type) = &provider.event_type_uri {
                refresher.tracked = refresher.tracked.with_resource(event_type.clone());
            }
        }

        Ok(Self {
            provider,
            upstream: UpstreamClientConfig::from_env()?,
            refresher,
            availability: AvailabilityConfig::from_env()?,
            bookings: BookingsCacheConfig::from_env(),
            webhook: WebhookConfig::from_env(),
            server: ServerConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        })
    }
}
