//! Scheduling provider implementations.

pub mod calendly;

pub use calendly::CalendlyProvider;
