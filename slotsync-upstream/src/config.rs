//! Upstream client configuration.
//!
//! Loaded from environment variables with parse-or-default semantics. Only
//! the provider API token is required.

use slotsync_core::{ConfigError, RetryConfig};
use std::time::Duration;

pub const DEFAULT_CALENDLY_BASE_URL: &str = "https://api.calendly.com";
pub const DEFAULT_SLOT_DURATION_MINUTES: i64 = 30;
pub const DEFAULT_MIN_LEAD_TIME_SECS: u64 = 3600;

pub const DEFAULT_POOL_IDLE_PER_HOST: usize = 10;
pub const DEFAULT_POOL_MAX_CONNECTIONS: usize = 20;
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

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
// PROVIDER
// ============================================================================

/// Calendly connection settings.
#[derive(Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_token: String,
    /// Event type used when a booking request does not name one.
    pub event_type_uri: Option<String>,
    /// Organization user; resolved through `/users/me` when absent.
    pub user_uri: Option<String>,
    pub slot_duration: chrono::Duration,
    /// Availability is never requested for times sooner than this.
    pub min_lead_time: Duration,
}

impl ProviderConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_CALENDLY_BASE_URL.to_string(),
            api_token: api_token.into(),
            event_type_uri: None,
            user_uri: None,
            slot_duration: chrono::Duration::minutes(DEFAULT_SLOT_DURATION_MINUTES),
            min_lead_time: Duration::from_secs(DEFAULT_MIN_LEAD_TIME_SECS),
        }
    }

    /// Point the provider at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_uri(mut self, user_uri: impl Into<String>) -> Self {
        self.user_uri = Some(user_uri.into());
        self
    }

    pub fn with_min_lead_time(mut self, lead: Duration) -> Self {
        self.min_lead_time = lead;
        self
    }

    /// Load from environment variables.
    ///
    /// - `CALENDLY_API_TOKEN`: API token (required)
    /// - `CALENDLY_BASE_URL`: API base URL (default: https://api.calendly.com)
    /// - `CALENDLY_EVENT_TYPE_URI`: default event type for bookings
    /// - `CALENDLY_USER_URI`: organization user URI
    /// - `SLOTSYNC_SLOT_DURATION_MINUTES`: slot length (default: 30)
    /// - `SLOTSYNC_MIN_LEAD_TIME_SECS`: earliest bookable offset from now (default: 3600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = env_string("CALENDLY_API_TOKEN").ok_or_else(|| ConfigError::MissingRequired {
            field: "CALENDLY_API_TOKEN".to_string(),
        })?;

        let mut config = Self::new(api_token);
        if let Some(base_url) = env_string("CALENDLY_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        config.event_type_uri = env_string("CALENDLY_EVENT_TYPE_URI");
        config.user_uri = env_string("CALENDLY_USER_URI");

        let slot_minutes: i64 =
            env_parse("SLOTSYNC_SLOT_DURATION_MINUTES").unwrap_or(DEFAULT_SLOT_DURATION_MINUTES);
        if slot_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "SLOTSYNC_SLOT_DURATION_MINUTES".to_string(),
                value: slot_minutes.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        config.slot_duration = chrono::Duration::minutes(slot_minutes);
        config.min_lead_time = Duration::from_secs(
            env_parse("SLOTSYNC_MIN_LEAD_TIME_SECS").unwrap_or(DEFAULT_MIN_LEAD_TIME_SECS),
        );
        Ok(config)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("event_type_uri", &self.event_type_uri)
            .field("user_uri", &self.user_uri)
            .field("slot_duration", &self.slot_duration)
            .field("min_lead_time", &self.min_lead_time)
            .finish()
    }
}

// ============================================================================
// POOL
// ============================================================================

/// Connection pool sizing and per-attempt deadlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle keep-alive connections retained per host.
    pub idle_per_host: usize,
    /// Ceiling on concurrently in-flight provider requests.
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Deadline for a single attempt, including reading the body.
    pub attempt_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_per_host: DEFAULT_POOL_IDLE_PER_HOST,
            max_connections: DEFAULT_POOL_MAX_CONNECTIONS,
            idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// - `SLOTSYNC_POOL_IDLE_PER_HOST` (default: 10)
    /// - `SLOTSYNC_POOL_MAX_CONNECTIONS` (default: 20)
    /// - `SLOTSYNC_POOL_IDLE_TIMEOUT_SECS` (default: 90)
    /// - `SLOTSYNC_CONNECT_TIMEOUT_SECS` (default: 5)
    /// - `SLOTSYNC_ATTEMPT_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Self {
        Self {
            idle_per_host: env_parse("SLOTSYNC_POOL_IDLE_PER_HOST")
                .unwrap_or(DEFAULT_POOL_IDLE_PER_HOST),
            max_connections: env_parse::<usize>("SLOTSYNC_POOL_MAX_CONNECTIONS")
                .unwrap_or(DEFAULT_POOL_MAX_CONNECTIONS)
                .max(1),
            idle_timeout: Duration::from_secs(
                env_parse("SLOTSYNC_POOL_IDLE_TIMEOUT_SECS").unwrap_or(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            ),
            connect_timeout: Duration::from_secs(
                env_parse("SLOTSYNC_CONNECT_TIMEOUT_SECS").unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            attempt_timeout: Duration::from_secs(
                env_parse("SLOTSYNC_ATTEMPT_TIMEOUT_SECS").unwrap_or(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            ),
        }
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Settings for [`UpstreamClient`](crate::UpstreamClient).
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamClientConfig {
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    /// Deadline for a whole call, retries and backoff included.
    pub call_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl UpstreamClientConfig {
    /// - `SLOTSYNC_RETRY_MAX_RETRIES` (default: 3)
    /// - `SLOTSYNC_RETRY_INITIAL_BACKOFF_MS` (default: 1000)
    /// - `SLOTSYNC_RETRY_MAX_BACKOFF_MS` (default: 10000)
    /// - `SLOTSYNC_CALL_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: env_parse("SLOTSYNC_RETRY_MAX_RETRIES").unwrap_or(defaults.max_retries),
            initial_backoff: env_parse("SLOTSYNC_RETRY_INITIAL_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: env_parse("SLOTSYNC_RETRY_MAX_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            backoff_multiplier: defaults.backoff_multiplier,
        };
        retry.validate()?;

        Ok(Self {
            pool: PoolConfig::from_env(),
            retry,
            call_timeout: Duration::from_secs(
                env_parse("SLOTSYNC_CALL_TIMEOUT_SECS").unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_defaults() {
        let pool = PoolConfig::default();
        assert_eq!(pool.idle_per_host, 10);
        assert_eq!(pool.max_connections, 20);
    }

    #[test]
    fn test_provider_config_debug_redacts_token() {
        let config = ProviderConfig::new("secret-token").with_base_url("http://localhost:9999/");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(config.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_client_defaults_allow_full_backoff_within_call_timeout() {
        let config = UpstreamClientConfig::default();
        let total_backoff: Duration = (1..=config.retry.max_retries)
            .map(|n| config.retry.delay_for_retry(n))
            .sum();
        assert_eq!(total_backoff, Duration::from_secs(7));
        assert!(total_backoff < config.call_timeout);
    }
}
