//! Shared configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Backoff policy for retryable upstream failures.
///
/// `max_retries` counts attempts after the first one, so the defaults give
/// four attempts separated by 1s, 2s and 4s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based), capped at `max_backoff`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
                reason: "must be a finite number >= 1.0".to_string(),
            });
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::InvalidValue {
                field: "max_backoff".to_string(),
                value: format!("{:?}", self.max_backoff),
                reason: "must not be below initial_backoff".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delays_are_1_2_4_seconds() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.delay_for_retry(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_retry(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_retry(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_backoff: Duration::from_secs(3),
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for_retry(3), Duration::from_secs(3));
        assert_eq!(config.delay_for_retry(30), Duration::from_secs(3));
    }

    #[test]
    fn test_validate_rejects_shrinking_multiplier() {
        let config = RetryConfig {
            backoff_multiplier: 0.5,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(RetryConfig::default().validate().is_ok());
        assert_eq!(RetryConfig::none().max_attempts(), 1);
    }
}
