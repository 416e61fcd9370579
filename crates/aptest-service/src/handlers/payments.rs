//! Toss payment workflow: ready, confirm and fail.
//!
//! A payment starts `READY` when the client opens the gateway widget and ends
//! `DONE` after a matching gateway confirmation or `FAILED` after a rejection
//! or a client failure report. Each phase writes its rows in one unit of work.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use aptest_core::{
    AccountId, NewPayment, OrderId, PaymentApproval, PaymentEvent, PaymentLogEntry, PaymentStatus,
    ProductSelection, DEFAULT_PAYMENT_METHOD,
};
use aptest_store::{with_transaction, StoreError};

use crate::auth::SessionUser;
use crate::error::{ApiError, ApiJson};
use crate::identity::{resolve_account, ResolveError};
use crate::response::SafeJson;
use crate::state::AppState;
use crate::toss::{ConfirmedPayment, TossError};

fn required<'a>(value: Option<&'a String>, message: &str) -> Result<&'a str, ApiError> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

// ============================================================================
// Ready
// ============================================================================

/// Ready request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyRequest {
    /// Client-generated order id.
    pub order_id: Option<String>,
    /// Amount to charge.
    pub amount: Option<i64>,
    /// Name shown to the buyer.
    pub order_name: Option<String>,
    /// Paying account.
    pub account_id: Option<String>,
    /// Product code.
    pub product_id: Option<i64>,
    /// Product kind override.
    pub product_type: Option<String>,
    /// Payment method (default `CARD`).
    #[serde(alias = "method")]
    pub payment_method: Option<String>,
}

/// Ready response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    /// Always true.
    pub success: bool,
    /// Order id.
    pub order_id: String,
    /// Amount.
    pub amount: i64,
    /// Order name.
    pub order_name: String,
    /// Customer key for the gateway widget (the account id).
    pub customer_key: String,
}

/// `POST /payment/ready`.
pub async fn ready(
    State(state): State<Arc<AppState>>,
    session: SessionUser,
    ApiJson(request): ApiJson<ReadyRequest>,
) -> Result<SafeJson<ReadyResponse>, ApiError> {
    const MISSING: &str = "주문번호, 금액, 주문명, 계정 정보는 필수입니다.";

    let order_id: OrderId = required(request.order_id.as_ref(), MISSING)?
        .parse()
        .map_err(|_| ApiError::BadRequest("주문번호 형식이 올바르지 않습니다.".into()))?;
    let amount = request
        .amount
        .ok_or_else(|| ApiError::BadRequest(MISSING.into()))?;
    let order_name = required(request.order_name.as_ref(), MISSING)?.to_string();
    let account_id: AccountId = required(request.account_id.as_ref(), MISSING)?
        .parse()
        .map_err(|_| ApiError::BadRequest("계정 식별자 형식이 올바르지 않습니다.".into()))?;

    if amount <= 0 {
        return Err(ApiError::BadRequest("결제 금액이 올바르지 않습니다.".into()));
    }

    let store = state.store.as_ref();

    if store.payment_exists(order_id.as_str()).await? {
        tracing::info!(order_id = %order_id, "Duplicate order id on ready");
        return Err(ApiError::DuplicateOrder(order_id.to_string()));
    }

    store
        .get_account(&account_id)
        .await?
        .filter(|a| a.active)
        .ok_or_else(|| ApiError::BadRequest("유효하지 않은 계정입니다.".into()))?;

    match resolve_account(store, &session.identity, state.config.allow_name_fallback).await {
        Ok(session_account) if session_account.id == account_id => {}
        Ok(session_account) => {
            tracing::warn!(
                session_account = %session_account.id,
                requested_account = %account_id,
                "Payment requested for another account"
            );
            return Err(ApiError::BadRequest("계정 정보가 일치하지 않습니다.".into()));
        }
        Err(ResolveError::NotFound) => return Err(ApiError::Unauthorized),
        Err(err) => return Err(err.into()),
    }

    let product = match request.product_id {
        Some(code) => Some(
            store
                .get_product(code)
                .await?
                .ok_or_else(|| ApiError::BadRequest("상품 정보를 찾을 수 없습니다.".into()))?,
        ),
        None => None,
    };

    let selection = ProductSelection {
        product_code: request.product_id,
        kind: request
            .product_type
            .filter(|t| !t.trim().is_empty())
            .or_else(|| product.map(|p| p.kind))
            .unwrap_or_default(),
        price: amount,
    };

    let method = request
        .payment_method
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());

    let tx_order_id = order_id.clone();
    let tx_order_name = order_name.clone();

    let choice_seq = with_transaction(store, move |tx| {
        Box::pin(async move {
            tx.lock_account(&account_id).await?;

            let seq = if let Some(seq) = tx.find_unpaid_choice(&account_id).await? {
                tx.update_choice_selection(&account_id, seq, &selection, tx_order_id.as_str())
                    .await?;
                seq
            } else {
                let seq = tx.next_choice_seq(&account_id).await?;
                tx.insert_choice(&account_id, seq, &selection, Some(tx_order_id.as_str()))
                    .await
                    .map_err(|e| match e {
                        StoreError::UniqueViolation { .. } => {
                            ApiError::Conflict("진행 중인 결제가 있습니다.".into())
                        }
                        other => other.into(),
                    })?;
                seq
            };

            let payment = NewPayment {
                order_id: tx_order_id.clone(),
                account: account_id,
                choice_seq: seq,
                amount,
                order_name: tx_order_name,
                method,
            };
            tx.insert_payment(&payment).await.map_err(|e| match e {
                StoreError::UniqueViolation { .. } => {
                    ApiError::DuplicateOrder(tx_order_id.to_string())
                }
                other => other.into(),
            })?;

            tx.append_payment_log(
                &PaymentLogEntry::new(PaymentEvent::PaymentReady)
                    .for_order(tx_order_id.as_str(), Some(account_id))
                    .with_status(PaymentStatus::Ready, Some(amount)),
            )
            .await?;

            Ok::<_, ApiError>(seq)
        })
    })
    .await
    .map_err(|e| e.diagnostic("결제 준비 중 오류가 발생했습니다."))?;

    tracing::info!(
        order_id = %order_id,
        account_id = %account_id,
        cr_seq = choice_seq,
        amount = amount,
        "Payment ready"
    );

    Ok(SafeJson(ReadyResponse {
        success: true,
        order_id: order_id.to_string(),
        amount,
        order_name,
        customer_key: account_id.to_string(),
    }))
}

// ============================================================================
// Confirm
// ============================================================================

/// Confirm request, sent after the gateway redirects back with a payment key.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Gateway payment key.
    pub payment_key: Option<String>,
    /// Order id.
    pub order_id: Option<String>,
    /// Amount the client believes it paid.
    pub amount: Option<i64>,
}

/// Confirm response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    /// Always true.
    pub success: bool,
    /// Order id.
    pub order_id: String,
    /// Payment method reported by the gateway.
    pub method: Option<String>,
    /// Charged amount.
    pub total_amount: i64,
    /// Amount not cancelled.
    pub balance_amount: i64,
    /// Gateway payment key.
    pub payment_key: String,
    /// Approval time (RFC 3339).
    pub approved_at: String,
    /// Receipt link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

/// `POST /payment/confirm`.
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ConfirmRequest>,
) -> Result<SafeJson<ConfirmResponse>, ApiError> {
    const MISSING: &str = "결제키, 주문번호, 금액은 필수입니다.";

    let payment_key = required(request.payment_key.as_ref(), MISSING)?.to_string();
    let order_id = required(request.order_id.as_ref(), MISSING)?.to_string();
    let amount = request
        .amount
        .ok_or_else(|| ApiError::BadRequest(MISSING.into()))?;

    let store = state.store.as_ref();
    let payment = store
        .get_payment(&order_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("결제 정보를 찾을 수 없습니다.".into()))?;

    payment.status.transition(PaymentStatus::Done)?;

    if payment.amount != amount {
        tracing::warn!(
            order_id = %order_id,
            expected = payment.amount,
            received = amount,
            "Confirm amount does not match the order"
        );
        return Err(ApiError::BadRequest("결제 금액이 일치하지 않습니다.".into()));
    }

    let confirmed = match state.toss.confirm(&payment_key, &order_id, amount).await {
        Ok(confirmed) => confirmed,
        Err(TossError::Api {
            status,
            code,
            message,
        }) => {
            record_rejection(&state, &payment, &payment_key, &code, &message).await;
            return Err(ApiError::Gateway {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                code,
                message,
            });
        }
        Err(TossError::Unreachable(msg)) => {
            tracing::error!(order_id = %order_id, "Gateway unreachable; payment left READY");
            return Err(ApiError::GatewayUnreachable(msg));
        }
        Err(TossError::Http(e)) => {
            tracing::error!(
                error = %e,
                order_id = %order_id,
                payment_key = %payment_key,
                "Gateway response unreadable; the charge may be approved, reconcile manually"
            );
            return Err(ApiError::GatewayUnreachable(e.to_string()));
        }
        Err(TossError::Configuration(msg)) => return Err(ApiError::Internal(msg)),
    };

    record_confirmation(&state, &payment, &confirmed).await?;

    tracing::info!(
        order_id = %order_id,
        account_id = %payment.account,
        amount = confirmed.total_amount,
        "Payment confirmed"
    );

    let approved_at = confirmed
        .approved_at
        .map_or_else(|| Utc::now().to_rfc3339(), |t| t.to_rfc3339());

    Ok(SafeJson(ConfirmResponse {
        success: true,
        order_id,
        method: confirmed.method,
        total_amount: confirmed.total_amount,
        balance_amount: confirmed.balance_amount,
        payment_key: confirmed.payment_key,
        approved_at,
        receipt_url: confirmed.receipt.map(|r| r.url),
    }))
}

/// Mark a rejected payment `FAILED`. The gateway's answer is what the caller
/// sees, so a store failure here is only logged.
async fn record_rejection(
    state: &AppState,
    payment: &aptest_core::Payment,
    payment_key: &str,
    code: &str,
    message: &str,
) {
    let order_id = payment.order_id.clone();
    let account = payment.account;
    let amount = payment.amount;
    let payment_key = payment_key.to_string();
    let code = code.to_string();
    let message = message.to_string();

    let result = with_transaction(state.store.as_ref(), move |tx| {
        Box::pin(async move {
            let moved = tx
                .mark_payment_failed(
                    &order_id,
                    &message,
                    Some(payment_key.as_str()),
                    Some(PaymentStatus::Ready),
                )
                .await?;
            if !moved {
                tracing::warn!(order_id = %order_id, "Rejected payment was no longer READY");
            }

            tx.append_payment_log(
                &PaymentLogEntry::new(PaymentEvent::PaymentConfirmFail)
                    .for_order(order_id.as_str(), Some(account))
                    .with_status(PaymentStatus::Failed, Some(amount))
                    .with_payment_key(payment_key.as_str())
                    .with_reason(code.as_str(), message.as_str()),
            )
            .await?;

            Ok::<_, StoreError>(())
        })
    })
    .await;

    if let Err(e) = result {
        tracing::error!(
            error = %e,
            order_id = %payment.order_id,
            "Failed to record gateway rejection"
        );
    }
}

/// Apply a gateway confirmation: payment `DONE`, choice paid, log row.
async fn record_confirmation(
    state: &AppState,
    payment: &aptest_core::Payment,
    confirmed: &ConfirmedPayment,
) -> Result<(), ApiError> {
    let order_id = payment.order_id.clone();
    let account = payment.account;
    let choice_seq = payment.choice_seq;
    let amount = confirmed.total_amount;
    let approval = PaymentApproval {
        payment_key: confirmed.payment_key.clone(),
        method: confirmed.method.clone(),
        approved_at: confirmed
            .approved_at
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc)),
    };

    with_transaction(state.store.as_ref(), move |tx| {
        Box::pin(async move {
            if !tx.mark_payment_done(&order_id, &approval).await? {
                return Err(ApiError::Conflict("이미 처리된 결제입니다.".into()));
            }

            if !tx
                .mark_choice_paid(&account, choice_seq, approval.approved_at)
                .await?
            {
                tracing::warn!(
                    order_id = %order_id,
                    cr_seq = choice_seq,
                    "Choice result already paid"
                );
            }

            tx.append_payment_log(
                &PaymentLogEntry::new(PaymentEvent::PaymentConfirm)
                    .for_order(order_id.as_str(), Some(account))
                    .with_status(PaymentStatus::Done, Some(amount))
                    .with_payment_key(approval.payment_key.as_str()),
            )
            .await?;

            Ok::<_, ApiError>(())
        })
    })
    .await
    .map_err(|e| {
        if matches!(e, ApiError::Store(_) | ApiError::Internal(_)) {
            tracing::error!(
                order_id = %payment.order_id,
                payment_key = %confirmed.payment_key,
                "Gateway confirmed a payment that could not be recorded; reconcile manually"
            );
        }
        e.diagnostic("결제 승인 후 저장 중 오류가 발생했습니다.")
    })
}

// ============================================================================
// Fail
// ============================================================================

/// Failure report from the gateway widget's fail redirect.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailRequest {
    /// Gateway error code.
    pub code: Option<String>,
    /// Gateway error message.
    pub message: Option<String>,
    /// Order id, when the failure happened after ready.
    pub order_id: Option<String>,
}

/// Fail response.
#[derive(Debug, Serialize)]
pub struct FailResponse {
    /// Always true.
    pub success: bool,
}

/// `POST /payment/fail`.
///
/// A failure report is authoritative: a named payment moves to `FAILED`
/// whatever its current status.
pub async fn fail(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<FailRequest>,
) -> Result<SafeJson<FailResponse>, ApiError> {
    const MISSING: &str = "오류 코드와 메시지는 필수입니다.";

    let code = required(request.code.as_ref(), MISSING)?.to_string();
    let message = required(request.message.as_ref(), MISSING)?.to_string();
    let order_id = request
        .order_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let log_order_id = order_id.clone();

    let marked = with_transaction(state.store.as_ref(), move |tx| {
        Box::pin(async move {
            let mut entry = PaymentLogEntry::new(PaymentEvent::PaymentFail);
            let mut marked = false;

            if let Some(order_id) = order_id {
                entry = match tx.get_payment(&order_id).await? {
                    Some(payment) => {
                        marked = tx
                            .mark_payment_failed(&order_id, &message, None, None)
                            .await?;
                        entry
                            .for_order(order_id.as_str(), Some(payment.account))
                            .with_status(PaymentStatus::Failed, Some(payment.amount))
                    }
                    None => entry.for_order(order_id.as_str(), None),
                };
            }

            tx.append_payment_log(&entry.with_reason(code, message)).await?;
            Ok::<_, ApiError>(marked)
        })
    })
    .await
    .map_err(|e| e.diagnostic("결제 실패 기록 중 오류가 발생했습니다."))?;

    tracing::info!(order_id = ?log_order_id, marked = marked, "Payment failure reported");

    Ok(SafeJson(FailResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        let blank = Some("  ".to_string());
        assert!(required(blank.as_ref(), "x").is_err());
        assert!(required(None, "x").is_err());

        let value = Some(" order-0001 ".to_string());
        assert_eq!(required(value.as_ref(), "x").unwrap(), "order-0001");
    }

    #[test]
    fn ready_request_uses_camel_case() {
        let request: ReadyRequest = serde_json::from_value(serde_json::json!({
            "orderId": "order-0001",
            "amount": 30000,
            "orderName": "프리미엄 검사",
            "accountId": "00000000-0000-0000-0000-000000000001",
            "productId": 2
        }))
        .unwrap();
        assert_eq!(request.amount, Some(30_000));
        assert_eq!(request.product_id, Some(2));
        assert!(request.payment_method.is_none());
    }

    #[test]
    fn ready_request_reads_payment_method() {
        let request: ReadyRequest = serde_json::from_value(serde_json::json!({
            "orderId": "order-0001",
            "paymentMethod": "VIRTUAL_ACCOUNT"
        }))
        .unwrap();
        assert_eq!(request.payment_method.as_deref(), Some("VIRTUAL_ACCOUNT"));

        let legacy: ReadyRequest =
            serde_json::from_value(serde_json::json!({ "method": "TRANSFER" })).unwrap();
        assert_eq!(legacy.payment_method.as_deref(), Some("TRANSFER"));
    }
}
