//! Service layer: the availability façade and the invalidation gateway.

pub mod availability;
pub mod invalidation;

pub use availability::{AvailabilityService, TimePreference};
pub use invalidation::{InvalidationGateway, InvalidationReport};
