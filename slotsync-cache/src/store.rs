//! Keyed availability store.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use slotsync_core::{CacheEntry, CacheKey, CacheStats, EntrySource, Timestamp};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::metrics::CacheMetrics;

const NEVER_READ: i64 = i64::MIN;

/// Per-key state. `invalidated_at` outlives the entry it evicted so that
/// late writes from fetches issued before the invalidation can be refused.
#[derive(Debug)]
struct Cell {
    entry: Option<Arc<CacheEntry>>,
    invalidated_at: Option<Timestamp>,
    /// Milliseconds since the epoch of the last reader access. Updated under
    /// the shard read lock.
    last_read_millis: AtomicI64,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            entry: None,
            invalidated_at: None,
            last_read_millis: AtomicI64::new(NEVER_READ),
        }
    }
}

impl Cell {
    fn holding(entry: CacheEntry) -> Self {
        let last_read = match entry.source() {
            EntrySource::ReadThrough => entry.requested_at().timestamp_millis(),
            _ => NEVER_READ,
        };
        Self {
            entry: Some(Arc::new(entry)),
            invalidated_at: None,
            last_read_millis: AtomicI64::new(last_read),
        }
    }

    fn touch(&self, at: Timestamp) {
        self.last_read_millis
            .fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }

    fn read_since(&self, since: Timestamp) -> bool {
        self.last_read_millis.load(Ordering::Relaxed) >= since.timestamp_millis()
    }

    fn accepts(&self, incoming: &CacheEntry) -> bool {
        let newer_fetch = self
            .entry
            .as_ref()
            .map_or(true, |current| incoming.fetched_at() >= current.fetched_at());
        let after_invalidation = self
            .invalidated_at
            .map_or(true, |at| incoming.requested_at() >= at);
        newer_fetch && after_invalidation
    }
}

/// Concurrency-safe availability store.
///
/// Backed by a sharded map. A read holds a shard read lock only long enough
/// to clone an `Arc`; a write holds the shard write lock only long enough to
/// compare timestamps and swap the `Arc`. No lock is ever held across an
/// upstream call.
#[derive(Debug, Default)]
pub struct CacheStore {
    cells: DashMap<CacheKey, Cell>,
    metrics: Arc<CacheMetrics>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share counters with another cache (the bookings cache).
    pub fn with_metrics(metrics: Arc<CacheMetrics>) -> Self {
        Self {
            cells: DashMap::new(),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Current entry for `key`, if one is present.
    ///
    /// Counts as a reader access for [`keys_read_since`](Self::keys_read_since).
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.get_at(key, Utc::now())
    }

    /// [`get`](Self::get) with an explicit access time.
    pub fn get_at(&self, key: &CacheKey, now: Timestamp) -> Option<Arc<CacheEntry>> {
        self.cells.get(key).and_then(|cell| {
            cell.touch(now);
            cell.entry.clone()
        })
    }

    /// Store `entry` under its key.
    ///
    /// Returns `false` when the write was refused because the key already
    /// holds a more recently fetched entry, or because the entry was requested
    /// before the key's last invalidation.
    pub fn put(&self, entry: CacheEntry) -> bool {
        let key = entry.key().clone();
        match self.cells.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(Cell::holding(entry));
                true
            }
            Entry::Occupied(mut occupied) => {
                let cell = occupied.get_mut();
                if !cell.accepts(&entry) {
                    debug!(
                        key = %entry.key(),
                        fetched_at = %entry.fetched_at(),
                        requested_at = %entry.requested_at(),
                        "Refusing out-of-order cache write"
                    );
                    return false;
                }
                if entry.source() == EntrySource::ReadThrough {
                    cell.touch(entry.requested_at());
                }
                cell.entry = Some(Arc::new(entry));
                true
            }
        }
    }

    /// Evict the entry for `key` and remember when, so fetches requested
    /// before now cannot repopulate it.
    ///
    /// Returns `true` if an entry was evicted. Invalidating an absent key is
    /// a no-op apart from moving the tombstone forward.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.invalidate_at(key, Utc::now())
    }

    /// [`invalidate`](Self::invalidate) with an explicit time.
    pub fn invalidate_at(&self, key: &CacheKey, at: Timestamp) -> bool {
        let mut cell = self.cells.entry(key.clone()).or_default();
        cell.invalidated_at = Some(cell.invalidated_at.map_or(at, |prev| prev.max(at)));
        let evicted = cell.entry.take().is_some();
        drop(cell);
        if evicted {
            self.metrics.record_invalidation();
        }
        evicted
    }

    /// Every key the store knows about, including invalidated ones awaiting
    /// a refetch.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.cells.iter().map(|cell| cell.key().clone()).collect()
    }

    /// Keys whose window has not ended at `now` and that a reader accessed at
    /// or after `since`.
    pub fn keys_read_since(&self, since: Timestamp, now: Timestamp) -> Vec<CacheKey> {
        self.cells
            .iter()
            .filter(|cell| cell.key().window().ends_at() > now && cell.read_since(since))
            .map(|cell| cell.key().clone())
            .collect()
    }

    /// Drop every cell whose window ended at or before `now`, tombstones
    /// included. Returns how many cells were removed.
    pub fn purge_ended(&self, now: Timestamp) -> usize {
        let before = self.cells.len();
        self.cells.retain(|key, _| key.window().ends_at() > now);
        let purged = before.saturating_sub(self.cells.len());
        if purged > 0 {
            debug!(purged, "Purged cache cells with ended windows");
        }
        purged
    }

    /// Number of keys currently holding an entry.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|cell| cell.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record_hit(&self) {
        self.metrics.record_hit();
    }

    pub fn record_miss(&self) {
        self.metrics.record_miss();
    }

    pub fn snapshot_stats(&self) -> CacheStats {
        let mut stats = self.metrics.snapshot();
        stats.cache_size = self.len() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use slotsync_core::{EntrySource, Slot};

    fn key(resource: &str) -> CacheKey {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        CacheKey::for_days(resource, day, day).unwrap()
    }

    fn base() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    fn entry(key: &CacheKey, slots: usize, fetched_offset_secs: i64) -> CacheEntry {
        let fetched_at = base() + Duration::seconds(fetched_offset_secs);
        let day_start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let slots = (0..slots)
            .map(|i| {
                let start = day_start + Duration::minutes(30 * i as i64);
                Slot::new(key.resource_id(), start, start + Duration::minutes(30), format!("t{i}"))
            })
            .collect();
        CacheEntry::new(key.clone(), slots, fetched_at, fetched_at, EntrySource::Refresh)
    }

    #[test]
    fn test_get_returns_latest_put() {
        let store = CacheStore::new();
        let k = key("r");
        assert!(store.get(&k).is_none());
        assert!(store.put(entry(&k, 2, 0)));
        assert!(store.put(entry(&k, 3, 10)));
        assert_eq!(store.get(&k).unwrap().slots().len(), 3);
    }

    #[test]
    fn test_older_fetch_is_refused() {
        let store = CacheStore::new();
        let k = key("r");
        assert!(store.put(entry(&k, 3, 10)));
        assert!(!store.put(entry(&k, 1, 5)));
        let current = store.get(&k).unwrap();
        assert_eq!(current.slots().len(), 3);
        assert_eq!(current.fetched_at(), base() + Duration::seconds(10));
    }

    #[test]
    fn test_invalidate_evicts_and_gates_old_requests() {
        let store = CacheStore::new();
        let k = key("r");
        store.put(entry(&k, 5, 0));

        let invalidated_at = base() + Duration::seconds(20);
        assert!(store.invalidate_at(&k, invalidated_at));
        assert!(store.get(&k).is_none());

        // Requested before the invalidation, completed after it.
        let late = CacheEntry::new(
            k.clone(),
            vec![],
            base() + Duration::seconds(15),
            base() + Duration::seconds(25),
            EntrySource::Refresh,
        );
        assert!(!store.put(late));
        assert!(store.get(&k).is_none());

        let refetch = CacheEntry::new(
            k.clone(),
            vec![],
            base() + Duration::seconds(21),
            base() + Duration::seconds(22),
            EntrySource::InvalidationRefetch,
        );
        assert!(store.put(refetch));
        assert!(store.get(&k).unwrap().fetched_at() >= invalidated_at);
    }

    #[test]
    fn test_tombstone_survives_refetch() {
        let store = CacheStore::new();
        let k = key("r");
        store.invalidate_at(&k, base() + Duration::seconds(20));
        let refetch = CacheEntry::new(
            k.clone(),
            vec![],
            base() + Duration::seconds(21),
            base() + Duration::seconds(22),
            EntrySource::InvalidationRefetch,
        );
        assert!(store.put(refetch));

        // A refresh requested before the invalidation finishes last.
        let slow_refresh = CacheEntry::new(
            k.clone(),
            vec![],
            base() + Duration::seconds(10),
            base() + Duration::seconds(30),
            EntrySource::Refresh,
        );
        assert!(!store.put(slow_refresh));
        assert_eq!(store.get(&k).unwrap().source(), EntrySource::InvalidationRefetch);
    }

    #[test]
    fn test_invalidate_absent_key_is_idempotent() {
        let store = CacheStore::new();
        let k = key("r");
        assert!(!store.invalidate(&k));
        assert!(!store.invalidate(&k));
        assert_eq!(store.snapshot_stats().invalidation_count, 0);
        assert_eq!(store.len(), 0);
        assert_eq!(store.keys(), vec![k]);
    }

    #[test]
    fn test_purge_ended_drops_past_windows_and_tombstones() {
        let store = CacheStore::new();
        let past = key("past");
        let tombstoned = key("tombstoned");
        let current_day = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let current = CacheKey::for_days("current", current_day, current_day).unwrap();
        store.put(entry(&past, 1, 0));
        store.invalidate_at(&tombstoned, base());
        store.put(CacheEntry::new(current.clone(), vec![], base(), base(), EntrySource::Refresh));

        // 2026-03-02 has ended, 2026-03-03 has not.
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
        assert_eq!(store.purge_ended(now), 2);
        assert_eq!(store.keys(), vec![current]);
        assert_eq!(store.purge_ended(now), 0);
    }

    #[test]
    fn test_keys_read_since_tracks_reader_access() {
        let store = CacheStore::new();
        let read_through = key("read-through");
        let refreshed = key("refreshed");
        let idle = key("idle");
        store.put(CacheEntry::new(
            read_through.clone(),
            vec![],
            base(),
            base(),
            EntrySource::ReadThrough,
        ));
        store.put(entry(&refreshed, 1, 0));
        store.put(CacheEntry::new(
            idle.clone(),
            vec![],
            base() - Duration::hours(1),
            base() - Duration::hours(1),
            EntrySource::ReadThrough,
        ));

        let since = base() - Duration::minutes(2);
        assert_eq!(store.keys_read_since(since, base()), vec![read_through.clone()]);

        store.get_at(&refreshed, base() + Duration::seconds(5));
        let mut keys = store.keys_read_since(since, base());
        keys.sort();
        assert_eq!(keys, vec![read_through, refreshed]);

        // Ended windows never count, however recently read.
        let after_window = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
        assert!(store.keys_read_since(since, after_window).is_empty());
    }

    #[test]
    fn test_snapshot_reports_cache_size() {
        let store = CacheStore::new();
        store.put(entry(&key("a"), 1, 0));
        store.put(entry(&key("b"), 1, 0));
        store.invalidate(&key("b"));
        store.record_hit();
        store.record_miss();
        let stats = store.snapshot_stats();
        assert_eq!(stats.cache_size, 1);
        assert_eq!(stats.invalidation_count, 1);
        assert_eq!(stats.total_requests(), 2);
    }
}
