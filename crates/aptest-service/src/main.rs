//! Aptest Service - HTTP API for aptitude tests and payments
//!
//! This is the main entry point for the aptest service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aptest_service::{create_router, AppState, ServiceConfig};
use aptest_store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aptest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Aptest Service");

    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        environment = %config.environment,
        gateway_timeout_seconds = config.gateway_timeout_seconds,
        name_fallback = config.allow_name_fallback,
        "Service configuration loaded"
    );

    let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;
    store.migrate().await?;
    tracing::info!("Database migrations applied");

    let state = AppState::new(Arc::new(store), config.clone())?;

    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
