//! Personal signup.

use std::sync::Arc;

use axum::extract::State;
use chrono::{Duration, Utc};
use serde::Serialize;

use aptest_core::{default_signup_product, AccountId, ProductSelection, SignupForm};
use aptest_store::{with_transaction, NewAccount, Store, StoreError};

use crate::error::{ApiError, ApiJson};
use crate::response::SafeJson;
use crate::state::AppState;

const DUPLICATE_LOGIN_ID: &str = "이미 사용 중인 아이디입니다.";

/// Signup response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    /// Always true.
    pub success: bool,
    /// Login id of the new account.
    pub user_id: String,
    /// Global id of the new account.
    pub account_id: String,
}

/// `POST /signup/personal`.
///
/// Person, account and the default free choice result are written together;
/// the audit rows that follow are best effort.
pub async fn signup_personal(
    State(state): State<Arc<AppState>>,
    ApiJson(form): ApiJson<SignupForm>,
) -> Result<SafeJson<SignupResponse>, ApiError> {
    let signup = form.validate()?;
    let store = state.store.as_ref();

    if store.login_id_exists(&signup.login_id).await? {
        return Err(ApiError::BadRequest(DUPLICATE_LOGIN_ID.into()));
    }

    let account_id = AccountId::generate();
    let login_id = signup.login_id.clone();
    let expires_at = Duration::try_days(state.config.account_validity_days)
        .and_then(|validity| Utc::now().checked_add_signed(validity))
        .ok_or_else(|| ApiError::Internal("account validity period is out of range".into()))?;

    let product_code = with_transaction(store, move |tx| {
        Box::pin(async move {
            let person_seq = tx.insert_person(&signup.person).await?;

            tx.insert_account(&NewAccount {
                id: account_id,
                login_id: signup.login_id,
                password: signup.password,
                person_seq,
                expires_at: Some(expires_at),
                institute: None,
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation { .. } => ApiError::BadRequest(DUPLICATE_LOGIN_ID.into()),
                other => other.into(),
            })?;

            let products = tx.list_all_products().await?;
            let product = default_signup_product(&products).ok_or_else(|| {
                ApiError::Internal("no product is configured for new accounts".into())
            })?;

            let selection = ProductSelection {
                product_code: Some(product.code),
                kind: product.kind.clone(),
                price: product.price,
            };
            tx.insert_choice(&account_id, 1, &selection, None).await?;

            Ok::<_, ApiError>(product.code)
        })
    })
    .await
    .map_err(|e| e.diagnostic("회원가입 처리 중 오류가 발생했습니다."))?;

    record_audit(store, &account_id, &login_id).await;

    tracing::info!(
        account_id = %account_id,
        login_id = %login_id,
        product_code = product_code,
        "Personal account created"
    );

    Ok(SafeJson(SignupResponse {
        success: true,
        user_id: login_id,
        account_id: account_id.to_string(),
    }))
}

async fn record_audit(store: &dyn Store, account_id: &AccountId, login_id: &str) {
    if let Err(e) = store.record_login_event(account_id, "SIGNUP").await {
        tracing::warn!(error = %e, account_id = %account_id, "Failed to record signup login event");
    }

    let detail = format!("personal signup: {login_id}");
    if let Err(e) = store
        .record_account_action(account_id, "CREATE_ACCOUNT", &detail)
        .await
    {
        tracing::warn!(error = %e, account_id = %account_id, "Failed to record account action");
    }
}
