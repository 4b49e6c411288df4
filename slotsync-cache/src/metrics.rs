//! Counters shared by the availability store and the bookings cache.

use slotsync_core::{CacheStats, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct RefreshStatus {
    last_refresh_at: Option<Timestamp>,
    last_refresh_error: Option<String>,
}

/// Monotonic cache counters.
///
/// Counters are lock-free. The last refresh time and error are updated
/// together under a short-lived lock so a snapshot never pairs one cycle's
/// time with another cycle's error.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    refresh_count: AtomicU64,
    refresh_failures: AtomicU64,
    invalidation_count: AtomicU64,
    skipped_ticks: AtomicU64,
    refresh: RwLock<RefreshStatus>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_tick(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished refresh cycle.
    ///
    /// `last_error` is the error of the last key that failed in the cycle, or
    /// `None` when every key refreshed, which clears the previous error.
    pub fn record_refresh_cycle(&self, at: Timestamp, failures: u64, last_error: Option<String>) {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        self.refresh_failures.fetch_add(failures, Ordering::Relaxed);
        let mut status = self.refresh.write().unwrap_or_else(PoisonError::into_inner);
        status.last_refresh_at = Some(at);
        status.last_refresh_error = last_error;
    }

    /// Snapshot the counters. Size gauges are left at zero for the owner of
    /// the maps to fill in.
    pub fn snapshot(&self) -> CacheStats {
        let status = self.refresh.read().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refresh_count: self.refresh_count.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            last_refresh_at: status.last_refresh_at,
            last_refresh_error: status.last_refresh_error.clone(),
            invalidation_count: self.invalidation_count.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            cache_size: 0,
            bookings_cached: 0,
        }
    }
}
