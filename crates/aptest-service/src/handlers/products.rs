//! Product catalog and per-choice payment info.

use std::sync::Arc;

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use aptest_core::{Product, ProductType};

use crate::auth::SessionUser;
use crate::error::ApiError;
use crate::identity::{resolve_account, ResolveError};
use crate::response::SafeJson;
use crate::state::AppState;

/// Product list response.
#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    /// Always true.
    pub success: bool,
    /// Active products, cheapest first.
    pub products: Vec<Product>,
}

/// `GET /products`.
///
/// Institutional accounts see institutional products; everyone else, including
/// sessions that resolve to no account, sees personal products.
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    session: SessionUser,
) -> Result<SafeJson<ProductListResponse>, ApiError> {
    let product_type = match resolve_account(
        state.store.as_ref(),
        &session.identity,
        state.config.allow_name_fallback,
    )
    .await
    {
        Ok(account) if account.is_organization() => ProductType::Institutional,
        Ok(_) | Err(ResolveError::NotFound | ResolveError::InvalidIdentity(_)) => {
            ProductType::Personal
        }
        Err(err) => return Err(err.into()),
    };

    let products = state.store.list_products(product_type).await?;

    Ok(SafeJson(ProductListResponse {
        success: true,
        products,
    }))
}

/// Payment info query parameters.
#[derive(Debug, Deserialize)]
pub struct PaymentInfoQuery {
    /// Choice result sequence, kept raw so a bad value gets a JSON error body.
    pub cr_seq: Option<String>,
}

/// Payment info response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfoResponse {
    /// Always true.
    pub success: bool,
    /// Choice result sequence.
    #[serde(rename = "cr_seq")]
    pub seq: i64,
    /// Name shown to the buyer.
    pub order_name: String,
    /// Amount to charge.
    pub amount: i64,
    /// Product kind of the choice.
    pub product_type: String,
}

/// `GET /payment/info?cr_seq=N`.
pub async fn payment_info(
    State(state): State<Arc<AppState>>,
    session: SessionUser,
    Query(query): Query<PaymentInfoQuery>,
) -> Result<SafeJson<PaymentInfoResponse>, ApiError> {
    let seq: i64 = query
        .cr_seq
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("cr_seq가 필요합니다.".into()))?
        .parse()
        .map_err(|_| ApiError::BadRequest("cr_seq 형식이 올바르지 않습니다.".into()))?;

    let account = resolve_account(
        state.store.as_ref(),
        &session.identity,
        state.config.allow_name_fallback,
    )
    .await?;

    let detail = state
        .store
        .get_choice_detail(&account.id, seq)
        .await?
        .ok_or_else(|| ApiError::NotFound("결제 정보를 찾을 수 없습니다.".into()))?;

    Ok(SafeJson(PaymentInfoResponse {
        success: true,
        seq: detail.seq,
        order_name: detail.order_name,
        amount: detail.amount,
        product_type: detail.kind,
    }))
}
