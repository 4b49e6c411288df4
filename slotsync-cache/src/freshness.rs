//! Freshness contracts for availability reads.

use chrono::Utc;
use slotsync_core::Timestamp;
use std::time::Duration;

/// Freshness requirement for cache reads.
///
/// Callers must say how old an entry they are willing to accept rather than
/// relying on a hidden default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Accept cached data not older than `max_staleness`.
    BestEffort {
        /// Maximum acceptable age for cached data.
        max_staleness: Duration,
    },

    /// Always go to the provider. Used for forced refreshes.
    Latest,
}

impl Freshness {
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }

    /// Get the max staleness for BestEffort, or zero for Latest.
    pub fn max_staleness(&self) -> Duration {
        match self {
            Self::BestEffort { max_staleness } => *max_staleness,
            Self::Latest => Duration::ZERO,
        }
    }
}

/// Where the value of a [`CacheRead`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    /// A cached entry within the caller's staleness tolerance.
    Cache,
    /// A synchronous provider fetch.
    Provider,
    /// A cached entry beyond the tolerance, returned because the provider
    /// fetch failed.
    StaleFallback,
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    fetched_at: Timestamp,
    origin: ReadOrigin,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, fetched_at: Timestamp) -> Self {
        Self {
            value,
            fetched_at,
            origin: ReadOrigin::Cache,
        }
    }

    pub fn from_provider(value: T, fetched_at: Timestamp) -> Self {
        Self {
            value,
            fetched_at,
            origin: ReadOrigin::Provider,
        }
    }

    pub fn stale(value: T, fetched_at: Timestamp) -> Self {
        Self {
            value,
            fetched_at,
            origin: ReadOrigin::StaleFallback,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn origin(&self) -> ReadOrigin {
        self.origin
    }

    pub fn was_cache_hit(&self) -> bool {
        self.origin == ReadOrigin::Cache
    }

    pub fn is_stale_fallback(&self) -> bool {
        self.origin == ReadOrigin::StaleFallback
    }

    /// How long ago the value was fetched from the provider.
    pub fn staleness(&self) -> Duration {
        (Utc::now() - self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            fetched_at: self.fetched_at,
            origin: self.origin,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
