//! Aptest HTTP API service.
//!
//! This crate provides the HTTP API for the aptitude-testing service:
//!
//! - Session identity resolution
//! - Personal and organization dashboards
//! - Product catalog and institute join codes
//! - Personal signup
//! - Toss Payments ready / confirm / fail workflow
//!
//! # Authentication
//!
//! The identity provider issues HS256 session tokens. The service reads the
//! provider user id, raw account id, email and display name from them and
//! maps the first present one to an account (see [`identity`]). The payment
//! confirm and fail endpoints are gateway redirects and carry no session.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Health handler needs async for the router

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod response;
pub mod routes;
pub mod state;
pub mod toss;

pub use config::{ConfigError, ServiceConfig};
pub use error::{ApiError, ApiJson};
pub use response::SafeJson;
pub use routes::create_router;
pub use state::AppState;
pub use toss::{TossClient, TossError};
