//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{dashboard, health, institutes, payments, products, signup};
use crate::state::AppState;

/// Maximum concurrent requests for payment endpoints.
/// Each one may hold a database transaction and a gateway call.
const PAYMENT_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Maximum concurrent requests for the remaining API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /signup/personal` - Create a personal account
/// - `POST /verify-session-code` - Check an institute turn join code
///
/// ## Session auth
/// - `GET /dashboard` - Personal dashboard
/// - `GET /dashboard/organization` - Organization dashboard
/// - `GET /products` - Product catalog
/// - `GET /payment/info` - Payment details for one choice result
/// - `POST /payment/ready` - Start a payment
///
/// ## Gateway redirects (no session)
/// - `POST /payment/confirm` - Confirm an authorized payment
/// - `POST /payment/fail` - Record a failed payment
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let payment_routes = Router::new()
        .route("/ready", post(payments::ready))
        .route("/confirm", post(payments::confirm))
        .route("/fail", post(payments::fail))
        .route("/info", get(products::payment_info))
        .layer(ConcurrencyLimitLayer::new(PAYMENT_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/dashboard", get(dashboard::get_dashboard))
        .route(
            "/dashboard/organization",
            get(dashboard::get_organization_dashboard),
        )
        .route("/products", get(products::list_products))
        .route("/signup/personal", post(signup::signup_personal))
        .route("/verify-session-code", post(institutes::verify_session_code))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/payment", payment_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
