//! SlotSync Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the cache,
//! the refresher, the webhook path and the HTTP surface.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, SyncMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
