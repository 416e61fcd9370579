//! Toss Payments API types.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Body of a confirm request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest<'a> {
    /// Key issued by the gateway when the buyer authorized the payment.
    pub payment_key: &'a str,
    /// Our order id.
    pub order_id: &'a str,
    /// Amount to capture.
    pub amount: i64,
}

/// Receipt link.
#[derive(Debug, Clone, Deserialize)]
pub struct Receipt {
    /// Receipt URL.
    pub url: String,
}

/// Confirmed payment object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedPayment {
    /// Payment key.
    pub payment_key: String,
    /// Order id.
    pub order_id: String,
    /// Order display name.
    #[serde(default)]
    pub order_name: Option<String>,
    /// Payment status (`DONE` on success).
    #[serde(default)]
    pub status: Option<String>,
    /// Payment method, e.g. `카드`.
    #[serde(default)]
    pub method: Option<String>,
    /// Total charged amount.
    pub total_amount: i64,
    /// Amount not yet cancelled.
    #[serde(default)]
    pub balance_amount: i64,
    /// Approval time.
    #[serde(default)]
    pub approved_at: Option<DateTime<FixedOffset>>,
    /// Receipt.
    #[serde(default)]
    pub receipt: Option<Receipt>,
}

/// Error body returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct TossErrorResponse {
    /// Error code, e.g. `REJECT_CARD_PAYMENT`.
    pub code: String,
    /// Error message.
    pub message: String,
}
