//! API error types and responses.

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use aptest_core::DomainError;
use aptest_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid session.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid session but not allowed here.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The order id was already used.
    #[error("duplicate order: {0}")]
    DuplicateOrder(String),

    /// Conflict - invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The payment gateway rejected the request.
    #[error("gateway error {status}: {code} - {message}")]
    Gateway {
        /// HTTP status returned by the gateway.
        status: StatusCode,
        /// Gateway error code.
        code: String,
        /// Gateway error message.
        message: String,
    },

    /// The payment gateway could not be reached in time.
    #[error("gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Storage failure, reported without details.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal failure reported with the underlying message, for flows that
    /// may leave state needing manual reconciliation.
    #[error("{message}: {detail}")]
    Diagnostic {
        /// User-facing message.
        message: String,
        /// Underlying error message.
        detail: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Attach the underlying message of a 5xx error to the response body.
    ///
    /// Client errors pass through unchanged.
    #[must_use]
    pub fn diagnostic(self, message: &str) -> Self {
        match self {
            Self::Store(err) => Self::Diagnostic {
                message: message.to_string(),
                detail: err.to_string(),
            },
            Self::Internal(detail) => Self::Diagnostic {
                message: message.to_string(),
                detail,
            },
            other => other,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "로그인이 필요합니다.".to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            Self::DuplicateOrder(order_id) => (
                StatusCode::BAD_REQUEST,
                "duplicate_order",
                "이미 처리된 주문번호입니다.".to_string(),
                Some(serde_json::json!({ "orderId": order_id })),
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            Self::Gateway {
                status,
                code,
                message,
            } => {
                tracing::warn!(status = %status, code = %code, "Payment gateway rejected request");
                (status, "gateway_error", message, Some(serde_json::json!({ "code": code })))
            }
            Self::GatewayUnreachable(msg) => {
                tracing::error!(error = %msg, "Payment gateway unreachable");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "gateway_unreachable",
                    "결제 서버와 통신할 수 없습니다. 잠시 후 다시 시도해주세요.".to_string(),
                    None,
                )
            }
            Self::Store(err) => {
                tracing::error!(error = %err, "Store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "서버 오류가 발생했습니다.".to_string(),
                    None,
                )
            }
            Self::Diagnostic { message, detail } => {
                tracing::error!(error = %detail, message = %message, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    message,
                    Some(serde_json::Value::String(detail)),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "서버 오류가 발생했습니다.".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// JSON request body. A body that is not JSON, or does not match `T`,
/// is rejected as `ApiError::BadRequest`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(
            status = %rejection.status(),
            error = %rejection.body_text(),
            "Rejected request body"
        );
        Self::BadRequest("요청 본문 형식이 올바르지 않습니다.".into())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::BadRequest(msg),
            DomainError::InvalidId(err) => Self::BadRequest(err.to_string()),
            DomainError::InvalidTransition { from, to } => {
                Self::Conflict(format!("결제 상태를 {from}에서 {to}(으)로 변경할 수 없습니다."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_keeps_client_errors() {
        let err = ApiError::BadRequest("x".into()).diagnostic("결제 처리 실패");
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn diagnostic_wraps_store_errors() {
        let err = ApiError::from(StoreError::Database("boom".into())).diagnostic("결제 처리 실패");
        match err {
            ApiError::Diagnostic { message, detail } => {
                assert_eq!(message, "결제 처리 실패");
                assert!(detail.contains("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn statuses() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden(String::new()), StatusCode::FORBIDDEN),
            (ApiError::DuplicateOrder("o".into()), StatusCode::BAD_REQUEST),
            (ApiError::Conflict(String::new()), StatusCode::CONFLICT),
            (
                ApiError::GatewayUnreachable(String::new()),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ApiError::Gateway {
                    status: StatusCode::PAYMENT_REQUIRED,
                    code: "REJECT_CARD_PAYMENT".into(),
                    message: String::new(),
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (ApiError::Store(StoreError::NotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
