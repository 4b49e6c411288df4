//! Shared state handed to every HTTP handler.

use std::sync::Arc;
use std::time::Instant;

use crate::config::WebhookConfig;
use crate::services::AvailabilityService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AvailabilityService>,
    pub webhook: Arc<WebhookConfig>,
    /// Resource used by `GET /availability` when the query names none.
    pub default_resource: Option<String>,
    pub metrics_enabled: bool,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: Arc<AvailabilityService>, webhook: WebhookConfig) -> Self {
        Self {
            service,
            webhook: Arc::new(webhook),
            default_resource: None,
            metrics_enabled: true,
            start_time: Instant::now(),
        }
    }

    pub fn with_default_resource(mut self, resource: impl Into<String>) -> Self {
        self.default_resource = Some(resource.into());
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}
