//! SlotSync availability cache.
//!
//! An in-memory, concurrency-safe store of availability entries keyed by
//! [`CacheKey`](slotsync_core::CacheKey). Entries are replaced wholesale,
//! never mutated in place, and every read hands out a shared reference to an
//! immutable entry.
//!
//! # Ordering
//!
//! Writes are conditional. A [`CacheStore::put`] is applied only when the
//! incoming entry was fetched no earlier than the one it replaces and was
//! requested no earlier than the key's last invalidation. Racing writers
//! therefore resolve by fetch completion time, and a fetch that was already
//! in flight when a key was invalidated can never bring the old data back.
//!
//! # Freshness
//!
//! Callers state their staleness tolerance with [`Freshness`] and receive a
//! [`CacheRead<T>`] that says whether the value came from the cache, from the
//! provider, or from a stale entry kept because the provider failed.

pub mod bookings;
pub mod freshness;
pub mod metrics;
pub mod store;

pub use bookings::{BookingsCache, BookingsLookup};
pub use freshness::{CacheRead, Freshness, ReadOrigin};
pub use metrics::CacheMetrics;
pub use store::CacheStore;
