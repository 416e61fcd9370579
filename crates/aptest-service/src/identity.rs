//! Identity resolution.
//!
//! Maps a session's `IdentityBundle` to an internal account. The lookup key
//! is the first present field of the bundle, in this order:
//!
//! 1. provider user id, matched against the login id
//! 2. raw account UUID
//! 3. email, via the person table
//! 4. display name, via the person table (only when enabled, and only on a
//!    unique match)
//!
//! A miss on the chosen key is final; later fields are never tried. Inactive
//! accounts never resolve.

use aptest_core::{Account, AccountId, IdentityBundle, IdentityKey, InstituteRef};
use aptest_store::{Store, StoreError};

use crate::error::ApiError;

/// Resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No active account matches the identity.
    #[error("account not found")]
    NotFound,

    /// The account exists but is not allowed here.
    #[error("forbidden")]
    Forbidden,

    /// The identity carries a malformed value.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound => Self::NotFound("계정 정보를 찾을 수 없습니다.".into()),
            ResolveError::Forbidden => Self::Forbidden("기관 회원만 이용할 수 있습니다.".into()),
            ResolveError::InvalidIdentity(msg) => Self::BadRequest(msg),
            ResolveError::Store(err) => Self::Store(err),
        }
    }
}

fn active(account: Option<Account>) -> Result<Account, ResolveError> {
    account
        .filter(|a| a.active)
        .ok_or(ResolveError::NotFound)
}

/// Resolve a session identity to an active account.
///
/// # Errors
///
/// - `ResolveError::NotFound` when nothing matches, the match is inactive, or
///   a display-name lookup is disabled or ambiguous.
/// - `ResolveError::InvalidIdentity` when the raw id is not a UUID.
/// - `ResolveError::Store` on storage failure.
pub async fn resolve_account(
    store: &dyn Store,
    identity: &IdentityBundle,
    allow_name_fallback: bool,
) -> Result<Account, ResolveError> {
    let Some(key) = identity.key() else {
        tracing::debug!("Session carries no usable identity");
        return Err(ResolveError::NotFound);
    };

    let resolved = match key {
        IdentityKey::ProviderUserId(login_id) => {
            active(store.find_account_by_login_id(login_id).await?)
        }
        IdentityKey::RawId(raw) => {
            let id: AccountId = raw
                .parse()
                .map_err(|_| ResolveError::InvalidIdentity("계정 식별자 형식이 올바르지 않습니다.".into()))?;
            active(store.get_account(&id).await?)
        }
        IdentityKey::Email(email) => active(
            store
                .find_accounts_by_email(email)
                .await?
                .into_iter()
                .find(|a| a.active),
        ),
        IdentityKey::DisplayName(name) => {
            if !allow_name_fallback {
                tracing::debug!("Display-name resolution disabled");
                return Err(ResolveError::NotFound);
            }

            let mut matches: Vec<Account> = store
                .find_accounts_by_person_name(name)
                .await?
                .into_iter()
                .filter(|a| a.active)
                .collect();

            if matches.len() > 1 {
                tracing::warn!(
                    candidates = matches.len(),
                    "Display name matches several accounts; refusing to guess"
                );
                return Err(ResolveError::NotFound);
            }
            matches.pop().ok_or(ResolveError::NotFound)
        }
    };

    match &resolved {
        Ok(account) => {
            tracing::debug!(strategy = key.strategy(), account_id = %account.id, "Session resolved");
        }
        Err(_) => tracing::debug!(strategy = key.strategy(), "Session did not resolve"),
    }

    resolved
}

/// Resolve a session identity to an active account that belongs to an institute.
///
/// # Errors
///
/// Everything `resolve_account` returns, plus `ResolveError::Forbidden` for a
/// personal account.
pub async fn resolve_organization_account(
    store: &dyn Store,
    identity: &IdentityBundle,
    allow_name_fallback: bool,
) -> Result<(Account, InstituteRef), ResolveError> {
    let account = resolve_account(store, identity, allow_name_fallback).await?;

    match account.institute {
        Some(institute) => Ok((account, institute)),
        None => Err(ResolveError::Forbidden),
    }
}
