//! SlotSync Server Entry Point
//!
//! Loads configuration, warms the availability cache, then serves the HTTP
//! surface until SIGINT/SIGTERM.

use std::sync::Arc;

use slotsync_api::{
    create_router, telemetry::init_tracing, ApiError, ApiResult, AppState, AvailabilityService,
    BackgroundRefresher, SyncConfig,
};
use slotsync_cache::{BookingsCache, CacheStore};
use slotsync_upstream::{CalendlyProvider, UpstreamClient};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = SyncConfig::from_env()
        .map_err(|e| ApiError::invalid_input(format!("Invalid configuration: {}", e)))?;
    init_tracing(&config.telemetry)?;

    let provider = CalendlyProvider::new(config.provider.clone(), &config.upstream.pool)
        .map_err(|e| ApiError::internal_error(format!("Failed to build provider client: {}", e)))?;
    let upstream = UpstreamClient::new(Arc::new(provider), config.upstream.clone());

    let store = Arc::new(CacheStore::new());
    let bookings = Arc::new(BookingsCache::new(config.bookings.ttl));
    let refresher = BackgroundRefresher::new(store.clone(), upstream.clone(), config.refresher.clone());
    let service = Arc::new(AvailabilityService::new(
        store,
        bookings,
        upstream.clone(),
        refresher.clone(),
        config.availability.clone(),
    ));

    if config.webhook.signing_key.is_none() {
        tracing::warn!("CALENDLY_WEBHOOK_SIGNING_KEY not set, webhook deliveries are not authenticated");
    }

    let report = refresher.start().await.map_err(|e| {
        tracing::error!(error = %e, "Initial cache population failed");
        ApiError::from(e)
    })?;
    tracing::info!(
        cycle_id = %report.cycle_id,
        keys = report.keys,
        "Initial cache population complete"
    );

    let mut state = AppState::new(service, config.webhook.clone())
        .with_metrics(config.telemetry.metrics_enabled);
    if let Some(resource) = &config.provider.event_type_uri {
        state = state.with_default_resource(resource.clone());
    }
    let app = create_router(state);

    let addr = config.server.bind_addr();
    tracing::info!(%addr, "Starting SlotSync server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)));

    if let Err(e) = refresher.shutdown().await {
        tracing::warn!(error = %e, "Refresher did not stop cleanly");
    }
    upstream.close();
    tracing::info!("SlotSync server stopped");

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
