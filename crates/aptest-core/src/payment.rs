//! Payment rows, the payment state machine, and payment log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, Result};
use crate::{AccountId, OrderId};

/// Default payment method recorded at the ready phase.
pub const DEFAULT_PAYMENT_METHOD: &str = "CARD";

/// Status of a payment row.
///
/// `Ready -> Done` or `Ready -> Failed`. Both `Done` and `Failed` are terminal;
/// a retry needs a new order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Awaiting gateway confirmation.
    Ready,
    /// Confirmed by the gateway.
    Done,
    /// Rejected or reported as failed.
    Failed,
}

impl PaymentStatus {
    /// The stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// Parse a stored column value.
    #[must_use]
    pub fn from_column(value: &str) -> Option<Self> {
        match value {
            "READY" => Some(Self::Ready),
            "DONE" => Some(Self::Done),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further gateway-driven transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Validate a gateway-driven transition.
    ///
    /// Explicit failure reports bypass this check; they are authoritative.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless `self` is `Ready` and
    /// `next` is terminal.
    pub fn transition(self, next: Self) -> Result<Self> {
        match (self, next) {
            (Self::Ready, Self::Done | Self::Failed) => Ok(next),
            (from, to) => Err(DomainError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Order id (unique).
    pub order_id: String,
    /// Paying account.
    pub account: AccountId,
    /// Choice result this payment is for.
    pub choice_seq: i64,
    /// Amount recorded at the ready phase.
    pub amount: i64,
    /// Order display name.
    pub order_name: String,
    /// Current status.
    pub status: PaymentStatus,
    /// Payment method.
    pub method: Option<String>,
    /// Gateway payment key.
    pub payment_key: Option<String>,
    /// Failure reason, for failed payments.
    pub fail_reason: Option<String>,
    /// Gateway approval time.
    pub approved_at: Option<DateTime<Utc>>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a payment entering the `READY` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    /// Order id.
    pub order_id: OrderId,
    /// Paying account.
    pub account: AccountId,
    /// Choice result sequence.
    pub choice_seq: i64,
    /// Amount.
    pub amount: i64,
    /// Order display name.
    pub order_name: String,
    /// Payment method.
    pub method: String,
}

/// Gateway approval details written when a payment becomes `DONE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentApproval {
    /// Gateway payment key.
    pub payment_key: String,
    /// Payment method reported by the gateway.
    pub method: Option<String>,
    /// Approval time reported by the gateway.
    pub approved_at: DateTime<Utc>,
}

/// Lifecycle event recorded in the payment log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEvent {
    /// Ready phase completed.
    PaymentReady,
    /// Gateway confirmed the payment.
    PaymentConfirm,
    /// Gateway rejected the confirmation.
    PaymentConfirmFail,
    /// The client reported a failure.
    PaymentFail,
}

impl PaymentEvent {
    /// The stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentReady => "PAYMENT_READY",
            Self::PaymentConfirm => "PAYMENT_CONFIRM",
            Self::PaymentConfirmFail => "PAYMENT_CONFIRM_FAIL",
            Self::PaymentFail => "PAYMENT_FAIL",
        }
    }

    /// Parse a stored column value.
    #[must_use]
    pub fn from_column(value: &str) -> Option<Self> {
        match value {
            "PAYMENT_READY" => Some(Self::PaymentReady),
            "PAYMENT_CONFIRM" => Some(Self::PaymentConfirm),
            "PAYMENT_CONFIRM_FAIL" => Some(Self::PaymentConfirmFail),
            "PAYMENT_FAIL" => Some(Self::PaymentFail),
            _ => None,
        }
    }
}

/// One append-only payment log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLogEntry {
    /// Order id, when known.
    pub order_id: Option<String>,
    /// Account, when known.
    pub account: Option<AccountId>,
    /// Event type.
    pub event: PaymentEvent,
    /// Payment status after the event, when one applies.
    pub status: Option<PaymentStatus>,
    /// Amount involved.
    pub amount: Option<i64>,
    /// Gateway payment key.
    pub payment_key: Option<String>,
    /// Failure or gateway code.
    pub code: Option<String>,
    /// Failure or gateway message.
    pub message: Option<String>,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

impl PaymentLogEntry {
    /// Start a log entry for `event`, stamped now.
    #[must_use]
    pub fn new(event: PaymentEvent) -> Self {
        Self {
            order_id: None,
            account: None,
            event,
            status: None,
            amount: None,
            payment_key: None,
            code: None,
            message: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the payment this entry concerns.
    #[must_use]
    pub fn for_order(mut self, order_id: impl Into<String>, account: Option<AccountId>) -> Self {
        self.order_id = Some(order_id.into());
        self.account = account;
        self
    }

    /// Attach status and amount.
    #[must_use]
    pub fn with_status(mut self, status: PaymentStatus, amount: Option<i64>) -> Self {
        self.status = Some(status);
        self.amount = amount;
        self
    }

    /// Attach the gateway payment key.
    #[must_use]
    pub fn with_payment_key(mut self, payment_key: impl Into<String>) -> Self {
        self.payment_key = Some(payment_key.into());
        self
    }

    /// Attach a code and message.
    #[must_use]
    pub fn with_reason(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self.message = Some(message.into());
        self
    }
}
