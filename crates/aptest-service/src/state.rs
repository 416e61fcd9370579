//! Application state.

use std::sync::Arc;
use std::time::Duration;

use aptest_store::Store;

use crate::config::ServiceConfig;
use crate::toss::{TossClient, TossError};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Toss Payments client.
    pub toss: Arc<TossClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway client cannot be built.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, TossError> {
        let toss = TossClient::new(
            config.toss_secret_key.clone(),
            config.toss_confirm_url.clone(),
            Duration::from_secs(config.gateway_timeout_seconds),
        )?;

        if config.toss_secret_key.starts_with("test_") {
            tracing::warn!("Toss Payments running with a test-mode secret key");
        } else {
            tracing::info!(confirm_url = %config.toss_confirm_url, "Toss Payments enabled");
        }

        if config.allow_name_fallback {
            tracing::warn!("Identity resolution by display name is enabled");
        }

        Ok(Self {
            store,
            config,
            toss: Arc::new(toss),
        })
    }
}
