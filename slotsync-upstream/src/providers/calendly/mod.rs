//! Calendly provider implementation
//!
//! Availability comes from `/event_type_available_times`, bookings are
//! created through `/invitees` and canceled through
//! `/scheduled_events/{uuid}/cancellation`, and invitee lookups use
//! `/scheduled_events` filtered by email. A cache key's resource identifier
//! is the Calendly event type URI.

pub mod client;
pub mod types;

pub use client::CalendlyProvider;
