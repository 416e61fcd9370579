//! Institute turn join codes.

use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiJson};
use crate::response::SafeJson;
use crate::state::AppState;

/// Verify request.
#[derive(Debug, Deserialize)]
pub struct VerifySessionCodeRequest {
    /// Join code handed out by the institute.
    #[serde(default)]
    pub code: Option<String>,
}

/// Verify response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionCodeResponse {
    /// Always true.
    pub valid: bool,
    /// Institute name.
    pub institute_name: String,
    /// Institute sequence.
    pub ins_seq: i64,
    /// Turn sequence.
    pub tur_seq: i64,
}

/// `POST /verify-session-code`.
pub async fn verify_session_code(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<VerifySessionCodeRequest>,
) -> Result<SafeJson<VerifySessionCodeResponse>, ApiError> {
    let code = request
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("세션 코드를 입력해주세요.".into()))?;

    let turn = state
        .store
        .find_turn_by_code(code)
        .await?
        .ok_or_else(|| ApiError::NotFound("유효하지 않은 세션 코드입니다.".into()))?;

    if !turn.usable {
        tracing::info!(ins_seq = turn.ins_seq, tur_seq = turn.tur_seq, "Session code for closed turn");
        return Err(ApiError::Forbidden("사용이 중지된 세션 코드입니다.".into()));
    }

    Ok(SafeJson(VerifySessionCodeResponse {
        valid: true,
        institute_name: turn.institute_name,
        ins_seq: turn.ins_seq,
        tur_seq: turn.tur_seq,
    }))
}
