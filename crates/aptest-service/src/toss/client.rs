//! Toss Payments API client implementation.

use reqwest::Client;
use std::time::Duration;

use super::types::{ConfirmRequest, ConfirmedPayment, TossErrorResponse};

/// Error type for Toss operations.
#[derive(Debug, thiserror::Error)]
pub enum TossError {
    /// HTTP request failed after reaching the gateway.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway could not be reached or did not answer in time.
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// Toss API returned an error.
    #[error("Toss API error ({status}): {code} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Toss Payments API client.
#[derive(Debug, Clone)]
pub struct TossClient {
    client: Client,
    secret_key: String,
    confirm_url: String,
}

impl TossClient {
    /// Create a new Toss client.
    ///
    /// # Arguments
    ///
    /// * `secret_key` - Toss secret key (`test_sk_...`, `test_gsk_...` or `live_sk_...`)
    /// * `confirm_url` - Confirm endpoint
    /// * `timeout` - Upper bound for one gateway call
    ///
    /// # Errors
    ///
    /// Returns `TossError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        secret_key: impl Into<String>,
        confirm_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TossError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TossError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: secret_key.into(),
            confirm_url: confirm_url.into(),
        })
    }

    /// Confirm an authorized payment.
    ///
    /// The secret key is sent as the basic-auth user name with an empty password.
    ///
    /// # Errors
    ///
    /// - `TossError::Api` when the gateway rejects the confirmation.
    /// - `TossError::Unreachable` on connect failure or timeout.
    pub async fn confirm(
        &self,
        payment_key: &str,
        order_id: &str,
        amount: i64,
    ) -> Result<ConfirmedPayment, TossError> {
        tracing::debug!(order_id = %order_id, amount = %amount, "Confirming Toss payment");

        let response = self
            .client
            .post(&self.confirm_url)
            .basic_auth(&self.secret_key, Some(""))
            .json(&ConfirmRequest {
                payment_key,
                order_id,
                amount,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    TossError::Unreachable(e.to_string())
                } else {
                    TossError::Http(e)
                }
            })?;

        Self::handle_response(response).await
    }

    /// Handle API response, parsing errors if present.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TossError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<TossErrorResponse, _> = response.json().await;

        match error_body {
            Ok(toss_error) => Err(TossError::Api {
                status: status.as_u16(),
                code: toss_error.code,
                message: toss_error.message,
            }),
            Err(_) => Err(TossError::Api {
                status: status.as_u16(),
                code: "UNKNOWN".to_string(),
                message: format!("HTTP {status}"),
            }),
        }
    }
}
