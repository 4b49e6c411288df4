//! Shared wiring for the service-level integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use slotsync_api::{
    AvailabilityConfig, AvailabilityService, BackgroundRefresher, RefresherConfig, TrackedKeys,
};
use slotsync_cache::{BookingsCache, CacheStore};
use slotsync_core::{CacheKey, RetryConfig};
use slotsync_test_utils::ScriptedProvider;
use slotsync_upstream::{PoolConfig, UpstreamClient, UpstreamClientConfig};

/// Everything one test needs, sharing a single scripted provider.
pub struct Harness {
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<CacheStore>,
    pub bookings: Arc<BookingsCache>,
    pub upstream: UpstreamClient,
    pub refresher: BackgroundRefresher,
    pub service: Arc<AvailabilityService>,
}

/// No retries and deadlines long enough that scripted latency never trips
/// them.
pub fn client_config() -> UpstreamClientConfig {
    UpstreamClientConfig {
        pool: PoolConfig {
            attempt_timeout: Duration::from_secs(3_600),
            ..PoolConfig::default()
        },
        retry: RetryConfig::none(),
        call_timeout: Duration::from_secs(7_200),
    }
}

pub fn refresher_config(tracked: Vec<CacheKey>) -> RefresherConfig {
    RefresherConfig {
        tracked: TrackedKeys::Fixed(tracked),
        ..RefresherConfig::default()
    }
}

pub fn harness(provider: ScriptedProvider, refresher: RefresherConfig) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(CacheStore::new());
    let bookings = Arc::new(BookingsCache::new(Duration::from_secs(300)));
    let upstream = UpstreamClient::new(provider.clone(), client_config());
    let refresher = BackgroundRefresher::new(store.clone(), upstream.clone(), refresher);
    let service = Arc::new(AvailabilityService::new(
        store.clone(),
        bookings.clone(),
        upstream.clone(),
        refresher.clone(),
        AvailabilityConfig::default(),
    ));

    Harness {
        provider,
        store,
        bookings,
        upstream,
        refresher,
        service,
    }
}
