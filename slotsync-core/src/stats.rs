//! Cache statistics snapshot.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Point-in-time view of the availability cache counters.
///
/// Every counter is monotonic for the life of the process except
/// `last_refresh_error`, which the next clean refresh cycle clears, and the
/// two size gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads served from a fresh cache entry.
    pub hits: u64,
    /// Reads that needed a synchronous upstream fetch.
    pub misses: u64,
    /// Completed refresh cycles.
    pub refresh_count: u64,
    /// Individual key fetches that failed during refresh cycles.
    pub refresh_failures: u64,
    pub last_refresh_at: Option<Timestamp>,
    pub last_refresh_error: Option<String>,
    /// Keys invalidated by provider events.
    pub invalidation_count: u64,
    /// Refresh ticks dropped because a cycle was still running.
    pub skipped_ticks: u64,
    /// Availability entries currently held.
    pub cache_size: u64,
    /// Email lookups currently held by the bookings cache.
    pub bookings_cached: u64,
}

impl CacheStats {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 10,
            misses: 5,
            ..Default::default()
        };
        assert_eq!(stats.total_requests(), 15);
        assert!((stats.hit_rate() - 0.6667).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
