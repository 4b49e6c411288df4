//! Invalidation Gateway
//!
//! Turns provider events into targeted cache evictions followed by an
//! immediate refetch of each evicted key.

use chrono::Utc;
use slotsync_cache::{BookingsCache, CacheStore};
use slotsync_core::{CacheEntry, CacheKey, EntrySource, ProviderEvent, UpstreamError};
use slotsync_upstream::UpstreamClient;
use std::sync::Arc;

/// What handling one event did.
#[derive(Debug, Clone, Default)]
pub struct InvalidationReport {
    /// Keys whose window overlaps the event.
    pub affected: Vec<CacheKey>,
    /// Affected keys that held an entry when invalidated.
    pub evicted: usize,
    /// Affected keys repopulated by the out-of-band refetch.
    pub refetched: usize,
    /// Refetches that failed. These keys stay empty until the next refresh
    /// cycle or read.
    pub failed: Vec<(CacheKey, UpstreamError)>,
    pub bookings_invalidated: bool,
}

/// Applies provider events to the caches.
///
/// Handling is idempotent. Replaying an event re-invalidates and refetches
/// the same keys and never calls a provider mutation.
#[derive(Clone)]
pub struct InvalidationGateway {
    store: Arc<CacheStore>,
    bookings: Arc<BookingsCache>,
    upstream: UpstreamClient,
}

impl InvalidationGateway {
    pub fn new(store: Arc<CacheStore>, bookings: Arc<BookingsCache>, upstream: UpstreamClient) -> Self {
        Self {
            store,
            bookings,
            upstream,
        }
    }

    /// Known keys whose cached slots may be wrong after `event`.
    ///
    /// Includes keys that are currently invalidated, so a replayed event
    /// refetches them again.
    pub fn affected_keys(&self, event: &ProviderEvent) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| event.affects(key))
            .collect();
        keys.sort();
        keys
    }

    /// Invalidate every affected key, then refetch them one by one.
    ///
    /// All keys are invalidated before the first refetch starts, so no
    /// reader can observe pre-event data for any of them once this has
    /// begun. Refetch failures are reported, never propagated.
    pub async fn handle(&self, event: &ProviderEvent) -> InvalidationReport {
        let affected = self.affected_keys(event);
        let invalidated_at = Utc::now();
        let evicted = affected
            .iter()
            .filter(|key| self.store.invalidate_at(key, invalidated_at))
            .count();

        let bookings_invalidated = match &event.invitee_email {
            Some(email) => self.bookings.invalidate_email(email),
            None => {
                let had_entries = !self.bookings.is_empty();
                self.bookings.invalidate_all();
                had_entries
            }
        };

        tracing::info!(
            kind = %event.kind,
            resource_id = %event.resource_id,
            affected_from = %event.affected_from,
            affected_to = %event.affected_to,
            affected = affected.len(),
            evicted,
            bookings_invalidated,
            "Provider event invalidated cache"
        );

        let mut refetched = 0;
        let mut failed = Vec::new();
        for key in &affected {
            let requested_at = Utc::now();
            match self.upstream.fetch_availability(key).await {
                Ok(slots) => {
                    let entry = CacheEntry::new(
                        key.clone(),
                        slots,
                        requested_at,
                        Utc::now(),
                        EntrySource::InvalidationRefetch,
                    );
                    if self.store.put(entry) {
                        refetched += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Refetch after invalidation failed, key stays empty until repopulated"
                    );
                    failed.push((key.clone(), e));
                }
            }
        }

        tracing::debug!(
            kind = %event.kind,
            refetched,
            failed = failed.len(),
            "Invalidation refetch finished"
        );

        InvalidationReport {
            affected,
            evicted,
            refetched,
            failed,
            bookings_invalidated,
        }
    }
}
