//! Error types for aptest domain logic.

use crate::ids::IdError;
use crate::payment::PaymentStatus;

/// Result type for aptest domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors raised by domain validation and state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Input failed validation. The message is user-facing.
    #[error("validation error: {0}")]
    Validation(String),

    /// A payment status transition that the state machine does not allow.
    #[error("invalid payment transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: PaymentStatus,
        /// Requested status.
        to: PaymentStatus,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl DomainError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
