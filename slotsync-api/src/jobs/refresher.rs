//! Background Refresher
//!
//! Keeps the availability cache warm by refetching every tracked key on a
//! fixed interval. Untracked keys are refetched only while readers keep
//! asking for them, and cells whose window has ended are dropped at the
//! start of each cycle.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               |
//!               +-- initial population failed --> Stopped
//! ```
//!
//! [`BackgroundRefresher::start`] performs one synchronous full population.
//! If any tracked key cannot be fetched the refresher goes back to `Stopped`
//! and the error is returned, so the service never reports ready with a
//! cache that was never filled.
//!
//! # One cycle at a time
//!
//! A cycle runs as its own task behind a compare-and-swap flag. A tick that
//! fires while the flag is held is counted as skipped and dropped. Ticks
//! never queue.
//!
//! # Failures
//!
//! A failed fetch for one key is logged, leaves that key's previous entry in
//! place, and becomes the cycle's `last_refresh_error`. The remaining keys
//! are still refreshed.

use chrono::Utc;
use slotsync_cache::CacheStore;
use slotsync_core::{CacheEntry, CacheKey, EntrySource, Timestamp, UpstreamError};
use slotsync_upstream::UpstreamClient;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::config::RefresherConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::telemetry::metrics;

/// How often `start` rechecks for a manually triggered cycle to finish.
const CYCLE_WAIT_POLL: Duration = Duration::from_millis(50);

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RefresherState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl RefresherState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RefresherState::Starting,
            2 => RefresherState::Running,
            3 => RefresherState::Stopping,
            _ => RefresherState::Stopped,
        }
    }
}

impl fmt::Display for RefresherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefresherState::Stopped => "stopped",
            RefresherState::Starting => "starting",
            RefresherState::Running => "running",
            RefresherState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

// ============================================================================
// CYCLE REPORT
// ============================================================================

/// Outcome of one refresh cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Keys the cycle attempted.
    pub keys: usize,
    /// Keys whose new entry was stored.
    pub refreshed: usize,
    /// Keys fetched successfully but already holding a newer entry.
    pub superseded: usize,
    pub failed: Vec<(CacheKey, UpstreamError)>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// INTERNALS
// ============================================================================

struct Inner {
    store: Arc<CacheStore>,
    upstream: UpstreamClient,
    config: RefresherConfig,
    state: AtomicU8,
    cycle_running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Holds the single-cycle flag; clears it on drop, including when the cycle
/// task is aborted.
struct CycleGuard {
    inner: Arc<Inner>,
}

impl CycleGuard {
    fn try_acquire(inner: &Arc<Inner>) -> Option<Self> {
        inner
            .cycle_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                inner: Arc::clone(inner),
            })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.inner.cycle_running.store(false, Ordering::Release);
    }
}

impl Inner {
    fn state(&self) -> RefresherState {
        RefresherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RefresherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: RefresherState, to: RefresherState) -> ServiceResult<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| ServiceError::RefresherState {
                expected: from,
                actual: RefresherState::from_u8(actual),
            })
    }

    /// Drop cells whose window has ended, then return the tracked keys plus
    /// every cached key a reader accessed within `read_through_idle`.
    fn cycle_keys(&self) -> Vec<CacheKey> {
        let now = Utc::now();
        let purged = self.store.purge_ended(now);
        let idle = chrono::Duration::from_std(self.config.read_through_idle)
            .unwrap_or(chrono::Duration::MAX);
        let since = now.checked_sub_signed(idle).unwrap_or(Timestamp::MIN_UTC);

        let mut keys = self.config.tracked.keys_for(now.date_naive());
        let tracked = keys.len();
        keys.extend(self.store.keys_read_since(since, now));
        keys.sort();
        keys.dedup();
        tracing::debug!(tracked, purged, keys = keys.len(), "Resolved refresh cycle keys");
        keys
    }

    async fn refresh_keys(&self, keys: Vec<CacheKey>) -> CycleReport {
        let cycle_id = Uuid::now_v7();
        let started_at = Utc::now();
        let started = Instant::now();
        let total = keys.len();

        tracing::debug!(cycle_id = %cycle_id, keys = total, "Refresh cycle started");

        let mut refreshed = 0;
        let mut superseded = 0;
        let mut failed = Vec::new();
        let mut last_error = None;

        for key in keys {
            let requested_at = Utc::now();
            match self.upstream.fetch_availability(&key).await {
                Ok(slots) => {
                    let entry =
                        CacheEntry::new(key, slots, requested_at, Utc::now(), EntrySource::Refresh);
                    if self.store.put(entry) {
                        refreshed += 1;
                    } else {
                        superseded += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        cycle_id = %cycle_id,
                        key = %key,
                        error = %e,
                        "Refresh failed for key, keeping previous entry"
                    );
                    last_error = Some(format!("{}: {}", key, e));
                    failed.push((key, e));
                }
            }
        }

        let finished_at = Utc::now();
        self.store
            .metrics()
            .record_refresh_cycle(finished_at, failed.len() as u64, last_error);
        if let Some(metrics) = metrics() {
            metrics.record_refresh_cycle(
                failed.len() as u64,
                started.elapsed().as_secs_f64(),
                self.store.len(),
            );
        }

        tracing::info!(
            cycle_id = %cycle_id,
            keys = total,
            refreshed,
            superseded,
            failed = failed.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Refresh cycle completed"
        );

        CycleReport {
            cycle_id,
            started_at,
            finished_at,
            keys: total,
            refreshed,
            superseded,
            failed,
        }
    }
}

// ============================================================================
// BACKGROUND REFRESHER
// ============================================================================

/// Periodic repopulation of the availability cache.
///
/// Cheap to clone; clones share the same task and state.
#[derive(Clone)]
pub struct BackgroundRefresher {
    inner: Arc<Inner>,
}

impl BackgroundRefresher {
    pub fn new(store: Arc<CacheStore>, upstream: UpstreamClient, config: RefresherConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                upstream,
                config,
                state: AtomicU8::new(RefresherState::Stopped as u8),
                cycle_running: AtomicBool::new(false),
                shutdown_tx,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> RefresherState {
        self.inner.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RefresherState::Running
    }

    /// Whether a refresh cycle is executing right now.
    pub fn cycle_in_flight(&self) -> bool {
        self.inner.cycle_running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &RefresherConfig {
        &self.inner.config
    }

    /// Populate the cache, then start the periodic loop.
    ///
    /// Fails with [`ServiceError::InitialPopulation`] if any tracked key
    /// could not be fetched, leaving the refresher `Stopped`, and with
    /// [`ServiceError::RefresherState`] if it was not `Stopped`.
    pub async fn start(&self) -> ServiceResult<CycleReport> {
        self.inner
            .transition(RefresherState::Stopped, RefresherState::Starting)?;

        let keys = self.inner.config.tracked.keys_for(Utc::now().date_naive());
        tracing::info!(keys = keys.len(), "Initial cache population started");

        let guard = loop {
            if let Some(guard) = CycleGuard::try_acquire(&self.inner) {
                break guard;
            }
            tokio::time::sleep(CYCLE_WAIT_POLL).await;
        };
        let report = self.inner.refresh_keys(keys).await;
        drop(guard);

        if let Some((_, last_error)) = report.failed.last() {
            let last_error = last_error.clone();
            let failed_keys: Vec<CacheKey> =
                report.failed.iter().map(|(key, _)| key.clone()).collect();
            self.inner.set_state(RefresherState::Stopped);
            tracing::error!(
                failed = failed_keys.len(),
                error = %last_error,
                "Initial cache population failed"
            );
            return Err(ServiceError::InitialPopulation {
                failed_keys,
                last_error,
            });
        }

        self.inner.shutdown_tx.send_replace(false);
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), shutdown_rx));
        *self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.inner.set_state(RefresherState::Running);

        tracing::info!(
            refreshed = report.refreshed,
            interval_secs = self.inner.config.interval.as_secs(),
            "Background refresher running"
        );
        Ok(report)
    }

    /// Run one refresh cycle now, over the same keys a scheduled cycle
    /// would use.
    ///
    /// Returns `None` without doing anything if a cycle is already in flight.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let guard = CycleGuard::try_acquire(&self.inner)?;
        let report = self.inner.refresh_keys(self.inner.cycle_keys()).await;
        drop(guard);
        Some(report)
    }

    /// Stop the periodic loop.
    ///
    /// No new cycle starts after this is called. An in-flight cycle gets up
    /// to `shutdown_grace` to finish before it is aborted.
    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.inner
            .transition(RefresherState::Running, RefresherState::Stopping)?;
        self.inner.shutdown_tx.send_replace(true);

        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Refresher task ended abnormally");
                }
            }
        }

        self.inner.set_state(RefresherState::Stopped);
        Ok(())
    }
}

impl fmt::Debug for BackgroundRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundRefresher")
            .field("state", &self.state())
            .field("cycle_in_flight", &self.cycle_in_flight())
            .field("config", &self.inner.config)
            .finish()
    }
}

async fn run_loop(inner: Arc<Inner>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = inner.config.interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Background refresher shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                match CycleGuard::try_acquire(&inner) {
                    Some(guard) => {
                        let cycle = Arc::clone(&inner);
                        in_flight = Some(tokio::spawn(async move {
                            let _guard = guard;
                            let keys = cycle.cycle_keys();
                            cycle.refresh_keys(keys).await;
                        }));
                    }
                    None => {
                        inner.store.metrics().record_skipped_tick();
                        if let Some(metrics) = metrics() {
                            metrics.record_skipped_tick();
                        }
                        tracing::debug!("Refresh tick skipped, previous cycle still running");
                    }
                }
            }
        }
    }

    if let Some(mut handle) = in_flight.take() {
        if !handle.is_finished() {
            let grace = inner.config.shutdown_grace;
            tracing::info!(
                grace_ms = grace.as_millis() as u64,
                "Waiting for in-flight refresh cycle"
            );
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
                tracing::warn!("In-flight refresh cycle aborted at shutdown deadline");
            }
        }
    }

    let stats = inner.store.snapshot_stats();
    tracing::info!(
        refresh_count = stats.refresh_count,
        refresh_failures = stats.refresh_failures,
        skipped_ticks = stats.skipped_ticks,
        "Background refresher stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            RefresherState::Stopped,
            RefresherState::Starting,
            RefresherState::Running,
            RefresherState::Stopping,
        ] {
            assert_eq!(RefresherState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RefresherState::Running.to_string(), "running");
    }
}
