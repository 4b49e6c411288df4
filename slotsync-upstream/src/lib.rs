//! SlotSync upstream client.
//!
//! Everything that talks to the scheduling provider lives here:
//!
//! - [`SchedulingProvider`] - single-attempt transport trait, one method per
//!   provider operation, with failures already classified
//! - [`RetryPolicy`] - exponential backoff with separate rules for reads and
//!   mutations
//! - [`UpstreamClient`] - the shared entry point that adds the connection
//!   ceiling, per-attempt and overall deadlines, and the retry policy on top
//!   of a provider
//! - [`providers::calendly`] - the Calendly HTTP transport

pub mod client;
pub mod config;
pub mod provider;
pub mod providers;
pub mod retry;

pub use client::UpstreamClient;
pub use config::{PoolConfig, ProviderConfig, UpstreamClientConfig};
pub use provider::SchedulingProvider;
pub use providers::calendly::CalendlyProvider;
pub use retry::RetryPolicy;
