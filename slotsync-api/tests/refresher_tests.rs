//! Background refresher lifecycle, failure accounting and tick skipping.

mod support;

use std::time::Duration;

use chrono::Utc;
use slotsync_api::{RefresherState, ServiceError};
use slotsync_core::{CacheEntry, EntrySource};
use slotsync_test_utils::fixtures::*;
use slotsync_test_utils::*;
use support::{harness, refresher_config};
use tokio::time::Instant;

fn week() -> CacheKey {
    key_for(RESOURCE, day(2030, 5, 6), 7)
}

#[tokio::test]
async fn test_start_populates_tracked_keys_and_reports_ready() {
    let key = week();
    let h = harness(ScriptedProvider::new(), refresher_config(vec![key.clone()]));
    h.provider
        .set_availability(&key, slots_from(RESOURCE, at(2030, 5, 6, 9, 0), 5));
    assert!(!h.service.is_ready());

    let report = h.refresher.start().await.unwrap();

    assert_eq!(report.keys, 1);
    assert_eq!(report.refreshed, 1);
    assert!(report.is_clean());
    assert!(h.service.is_ready());
    assert_eq!(h.store.get(&key).unwrap().slots().len(), 5);

    h.refresher.shutdown().await.unwrap();
    assert_eq!(h.refresher.state(), RefresherState::Stopped);
}

#[tokio::test]
async fn test_failed_initial_population_leaves_refresher_stopped() {
    let key = week();
    let h = harness(ScriptedProvider::new(), refresher_config(vec![key.clone()]));
    h.provider
        .fail_availability(&key, transient(UpstreamOperation::FetchAvailability));

    let err = h.refresher.start().await.unwrap_err();

    match err {
        ServiceError::InitialPopulation { failed_keys, .. } => assert_eq!(failed_keys, vec![key.clone()]),
        other => panic!("expected InitialPopulation, got {other:?}"),
    }
    assert_eq!(h.refresher.state(), RefresherState::Stopped);
    assert!(!h.service.is_ready());

    h.provider
        .set_availability(&key, slots_from(RESOURCE, at(2030, 5, 6, 9, 0), 2));
    h.refresher.start().await.unwrap();
    assert!(h.service.is_ready());
    h.refresher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_twice_is_a_state_error() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![week()]));
    h.refresher.start().await.unwrap();

    let err = h.refresher.start().await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::RefresherState {
            expected: RefresherState::Stopped,
            actual: RefresherState::Running,
        }
    ));
    h.refresher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_cycles_keep_previous_slots() {
    let key = week();
    let h = harness(ScriptedProvider::new(), refresher_config(vec![key.clone()]));
    h.provider
        .set_availability(&key, slots_from(RESOURCE, at(2030, 5, 6, 9, 0), 5));
    h.refresher.start().await.unwrap();

    h.provider
        .fail_availability(&key, transient(UpstreamOperation::FetchAvailability));
    for _ in 0..3 {
        let report = h.refresher.run_cycle().await.unwrap();
        assert_eq!(report.failed.len(), 1);
    }

    let stats = h.service.get_stats();
    assert_eq!(stats.refresh_failures, 3);
    assert_eq!(stats.refresh_count, 4);
    assert!(stats.last_refresh_error.is_some());
    assert_eq!(h.service.get_availability(&key).await.unwrap().len(), 5);

    h.provider
        .set_availability(&key, slots_from(RESOURCE, at(2030, 5, 6, 9, 0), 5));
    h.refresher.run_cycle().await.unwrap();
    assert!(h.service.get_stats().last_refresh_error.is_none());

    h.refresher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cycle_also_refreshes_read_through_keys() {
    let tracked = week();
    let other = key_for(RESOURCE, day(2030, 6, 3), 7);
    let h = harness(ScriptedProvider::new(), refresher_config(vec![tracked.clone()]));
    h.service.get_availability(&other).await.unwrap();

    let report = h.refresher.run_cycle().await.unwrap();

    assert_eq!(report.keys, 2);
    assert_eq!(h.provider.fetch_calls(&other), 2);
}

fn read_through_entry(key: &CacheKey, requested_at: Timestamp) -> CacheEntry {
    CacheEntry::new(key.clone(), vec![], requested_at, requested_at, EntrySource::ReadThrough)
}

#[tokio::test]
async fn test_cycle_purges_ended_windows_and_skips_idle_keys() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![]));
    let now = Utc::now();

    let ended: Vec<CacheKey> = (1..=28).map(|d| key_for(RESOURCE, day(2020, 2, d), 1)).collect();
    for key in &ended {
        assert!(h.store.put(read_through_entry(key, now)));
    }
    let recent: Vec<CacheKey> = (0..3)
        .map(|week| key_for(RESOURCE, day(2030, 6, 3 + 7 * week), 7))
        .collect();
    for key in &recent {
        h.service.get_availability(key).await.unwrap();
    }
    let idle_resource = "https://api.calendly.com/event_types/idle";
    let idle: Vec<CacheKey> = (0..4)
        .map(|d| key_for(idle_resource, day(2030, 6, 3 + d), 1))
        .collect();
    for key in &idle {
        assert!(h.store.put(read_through_entry(key, now - chrono::Duration::hours(1))));
    }
    assert_eq!(h.store.keys().len(), 35);

    for cycle in 1..=2 {
        let report = h.refresher.run_cycle().await.unwrap();
        assert_eq!(report.keys, recent.len(), "cycle {cycle}");
        assert_eq!(h.store.keys().len(), recent.len() + idle.len());
    }

    for key in &recent {
        assert_eq!(h.provider.fetch_calls(key), 3);
    }
    for key in ended.iter().chain(&idle) {
        assert_eq!(h.provider.fetch_calls(key), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycle_skips_ticks_instead_of_overlapping() {
    let key = week();
    let h = harness(
        ScriptedProvider::with_latency(Duration::from_secs(300)),
        refresher_config(vec![key.clone()]),
    );
    h.refresher.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(600)).await;

    let stats = h.service.get_stats();
    assert!(stats.skipped_ticks >= 1, "skipped_ticks = {}", stats.skipped_ticks);
    assert_eq!(h.provider.max_in_flight(), 1);

    h.refresher.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_cycle_after_grace() {
    let key = week();
    let mut config = refresher_config(vec![key.clone()]);
    config.shutdown_grace = Duration::from_secs(10);
    let h = harness(ScriptedProvider::with_latency(Duration::from_secs(300)), config);
    h.refresher.start().await.unwrap();

    // First scheduled cycle starts at +120s and would run until +420s.
    tokio::time::sleep(Duration::from_secs(130)).await;
    assert!(h.refresher.cycle_in_flight());

    let before = Instant::now();
    h.refresher.shutdown().await.unwrap();
    let waited = before.elapsed();

    assert!(waited >= Duration::from_secs(10));
    assert!(waited < Duration::from_secs(60));
    assert_eq!(h.refresher.state(), RefresherState::Stopped);
    assert_eq!(h.service.get_stats().refresh_count, 1);
}

#[tokio::test]
async fn test_shutdown_when_stopped_is_a_state_error() {
    let h = harness(ScriptedProvider::new(), refresher_config(vec![week()]));

    let err = h.refresher.shutdown().await.unwrap_err();

    assert!(matches!(err, ServiceError::RefresherState { .. }));
}
