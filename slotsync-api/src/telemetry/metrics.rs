//! Prometheus Metrics Definitions
//!
//! Process-wide counters mirroring the cache statistics plus HTTP, refresh
//! and webhook instrumentation. Exposed on `/metrics` for scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec,
    register_int_gauge, Counter, CounterVec, Encoder, Histogram, HistogramVec, IntGauge,
    TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Refresh cycle duration buckets (seconds). A cycle with retries can take
/// tens of seconds.
const REFRESH_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance, registered on first use.
pub static METRICS: Lazy<ApiResult<SyncMetrics>> = Lazy::new(SyncMetrics::new);

/// The registered metrics, or `None` if registration failed.
///
/// Instrumentation is best-effort: a registration failure is logged once and
/// never fails a request.
pub fn metrics() -> Option<&'static SyncMetrics> {
    match METRICS.as_ref() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            static LOGGED: std::sync::Once = std::sync::Once::new();
            LOGGED.call_once(|| tracing::error!(error = %e, "Metrics unavailable"));
            None
        }
    }
}

#[derive(Clone)]
pub struct SyncMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Availability reads - labels: origin (cache, provider, stale_fallback, unavailable)
    pub availability_reads_total: CounterVec,

    /// Refresh cycles - labels: outcome (clean, partial)
    pub refresh_cycles_total: CounterVec,

    pub refresh_cycle_duration_seconds: Histogram,

    /// Refresh ticks dropped because a cycle was still running
    pub refresh_ticks_skipped_total: Counter,

    /// Provider events - labels: kind, outcome (handled, ignored, invalid, unauthorized)
    pub webhook_events_total: CounterVec,

    /// Availability entries currently cached
    pub cache_entries: IntGauge,
}

impl SyncMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "slotsync_http_requests_total",
                "Total HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "slotsync_http_request_duration_seconds",
                "HTTP request latency in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            availability_reads_total: register_counter_vec!(
                "slotsync_availability_reads_total",
                "Availability reads by where the answer came from",
                &["origin"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register availability_reads_total: {}", e)))?,

            refresh_cycles_total: register_counter_vec!(
                "slotsync_refresh_cycles_total",
                "Completed background refresh cycles",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register refresh_cycles_total: {}", e)))?,

            refresh_cycle_duration_seconds: register_histogram!(
                "slotsync_refresh_cycle_duration_seconds",
                "Duration of background refresh cycles in seconds",
                REFRESH_DURATION_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register refresh_cycle_duration_seconds: {}", e)))?,

            refresh_ticks_skipped_total: register_counter!(
                "slotsync_refresh_ticks_skipped_total",
                "Refresh ticks skipped because a cycle was in flight"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register refresh_ticks_skipped_total: {}", e)))?,

            webhook_events_total: register_counter_vec!(
                "slotsync_webhook_events_total",
                "Provider webhook deliveries",
                &["kind", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register webhook_events_total: {}", e)))?,

            cache_entries: register_int_gauge!(
                "slotsync_cache_entries",
                "Availability entries currently cached"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_entries: {}", e)))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_availability_read(&self, origin: &str) {
        self.availability_reads_total.with_label_values(&[origin]).inc();
    }

    pub fn record_refresh_cycle(&self, failures: u64, duration_secs: f64, cache_entries: usize) {
        let outcome = if failures == 0 { "clean" } else { "partial" };
        self.refresh_cycles_total.with_label_values(&[outcome]).inc();
        self.refresh_cycle_duration_seconds.observe(duration_secs);
        self.cache_entries.set(cache_entries as i64);
    }

    pub fn record_skipped_tick(&self) {
        self.refresh_ticks_skipped_total.inc();
    }

    pub fn record_webhook_event(&self, kind: &str, outcome: &str) {
        self.webhook_events_total.with_label_values(&[kind, outcome]).inc();
    }
}

/// Handler for GET /metrics. Returns Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    // Registers on first scrape so an idle process still exports the families.
    let _ = metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics failed to register")?;
        assert!(!metrics.availability_reads_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_availability_read() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics failed to register")?;
        let before = metrics.availability_reads_total.with_label_values(&["cache"]).get();
        metrics.record_availability_read("cache");
        let after = metrics.availability_reads_total.with_label_values(&["cache"]).get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_refresh_cycle_sets_entry_gauge() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics failed to register")?;
        metrics.record_refresh_cycle(0, 0.2, 3);
        assert!(metrics.refresh_cycles_total.with_label_values(&["clean"]).get() >= 1.0);
        Ok(())
    }
}
