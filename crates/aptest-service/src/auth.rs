//! Session authentication.
//!
//! The identity provider issues an HS256-signed session token. `SessionUser`
//! verifies it and exposes what the provider knows about the caller as an
//! `IdentityBundle`; mapping that to an account is the job of
//! [`crate::identity`].

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use aptest_core::IdentityBundle;

use crate::error::ApiError;
use crate::state::AppState;

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Provider user id (the account's login id).
    #[serde(default)]
    pub sub: Option<String>,
    /// Raw account UUID.
    #[serde(default)]
    pub id: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Expiration (Unix seconds).
    pub exp: u64,
}

impl From<SessionClaims> for IdentityBundle {
    fn from(claims: SessionClaims) -> Self {
        Self {
            provider_user_id: claims.sub,
            raw_id: claims.id,
            email: claims.email,
            display_name: claims.name,
        }
    }
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    /// What the identity provider knows about the caller.
    pub identity: IdentityBundle,
}

impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            // Extract the Authorization header
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            // Extract the Bearer token
            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            let claims = validate_session(token, &state.config.session_secret)?;

            Ok(SessionUser {
                identity: claims.into(),
            })
        })
    }
}

/// Validate a session token and return its claims.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` for a bad signature, an expired token or
/// malformed claims.
pub fn validate_session(token: &str, secret: &str) -> Result<SessionClaims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;

    decode::<SessionClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            ApiError::Unauthorized
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(claims: &SessionClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(exp: u64) -> SessionClaims {
        SessionClaims {
            sub: Some("testuser".into()),
            id: None,
            email: Some("hong@example.com".into()),
            name: None,
            exp,
        }
    }

    fn future() -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap() + 3600
    }

    #[test]
    fn accepts_valid_token() {
        let claims = validate_session(&token(&claims(future()), "secret"), "secret").unwrap();
        let identity = IdentityBundle::from(claims);
        assert_eq!(identity.provider_user_id.as_deref(), Some("testuser"));
        assert_eq!(identity.email.as_deref(), Some("hong@example.com"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let result = validate_session(&token(&claims(future()), "secret"), "other");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn rejects_expired_token() {
        let result = validate_session(&token(&claims(1_000), "secret"), "secret");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }
}
