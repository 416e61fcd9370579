//! Toss Payments integration.
//!
//! Toss handles card authorization on the client side; this service only
//! confirms an authorized payment with the secret key once the amount has
//! been checked against the stored order.

pub mod client;
pub mod types;

pub use client::TossClient;
pub use client::TossError;
pub use types::*;
