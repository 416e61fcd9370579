//! Personal and organization dashboards.

use std::sync::Arc;

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use aptest_core::{
    review_eligibility, Account, DoneState, Flag, InstituteInfo, LatestChoice, Member, ReviewCode,
    TestRow,
};
use aptest_store::Store;

use crate::auth::SessionUser;
use crate::error::ApiError;
use crate::identity::{resolve_account, resolve_organization_account};
use crate::response::SafeJson;
use crate::state::AppState;

/// Status of the account's newest test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    /// Sequence of the newest choice result, absent when there is none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cr_seq: Option<i64>,
    /// Payment flag.
    pub paid: Flag,
    /// Product kind.
    pub kind: String,
    /// Whether the account's access has expired.
    pub expired: Flag,
    /// Done state.
    pub state: DoneState,
}

impl AccountStatus {
    fn new(latest: Option<LatestChoice>, expired: bool) -> Self {
        let expired = if expired { Flag::Yes } else { Flag::No };
        match latest {
            Some(latest) => Self {
                cr_seq: Some(latest.seq),
                paid: latest.paid,
                kind: latest.kind,
                expired,
                state: latest.done,
            },
            None => Self {
                cr_seq: None,
                paid: Flag::No,
                kind: String::new(),
                expired,
                state: DoneState::Running,
            },
        }
    }
}

/// One test on the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestItem {
    /// Choice result sequence.
    #[serde(rename = "cr_seq")]
    pub seq: i64,
    /// Product code.
    pub product_code: Option<i64>,
    /// Product name, falling back to the kind when the product is gone.
    pub product_name: String,
    /// Product kind.
    pub kind: String,
    /// Price.
    pub price: i64,
    /// Payment flag.
    pub paid: Flag,
    /// Payment time.
    pub paid_at: Option<DateTime<Utc>>,
    /// Attempt start.
    pub started_at: Option<DateTime<Utc>>,
    /// Attempt end.
    pub ended_at: Option<DateTime<Utc>>,
    /// Done state.
    pub state: DoneState,
    /// Review eligibility.
    pub review: ReviewCode,
}

impl TestItem {
    fn new(row: TestRow, expired: bool) -> Self {
        let review = review_eligibility(&row.kind, expired, row.done);
        Self {
            seq: row.seq,
            product_code: row.product_code,
            product_name: row.product_name.unwrap_or_else(|| row.kind.clone()),
            kind: row.kind,
            price: row.price,
            paid: row.paid,
            paid_at: row.paid_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            state: row.done,
            review,
        }
    }
}

/// Personal dashboard response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    /// Always true.
    pub success: bool,
    /// Newest test status.
    pub account_status: AccountStatus,
    /// Every test of the account, newest first.
    pub tests: Vec<TestItem>,
    /// Number of completed tests.
    pub completed_tests: usize,
}

/// Organization dashboard response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDashboardResponse {
    /// Personal dashboard fields.
    #[serde(flatten)]
    pub dashboard: DashboardResponse,
    /// The account's institute and turn.
    pub institute_info: InstituteInfo,
    /// Turn roster, newest member first.
    pub members: Vec<Member>,
    /// Always true.
    pub is_organization: bool,
}

async fn aggregate(store: &dyn Store, account: &Account) -> Result<DashboardResponse, ApiError> {
    let expired = account.is_expired_at(Utc::now());
    let latest = store.latest_choice(&account.id).await?;
    let tests: Vec<TestItem> = store
        .list_tests(&account.id)
        .await?
        .into_iter()
        .map(|row| TestItem::new(row, expired))
        .collect();
    let completed_tests = tests.iter().filter(|t| t.state == DoneState::Ended).count();

    Ok(DashboardResponse {
        success: true,
        account_status: AccountStatus::new(latest, expired),
        tests,
        completed_tests,
    })
}

/// `GET /dashboard`.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    session: SessionUser,
) -> Result<SafeJson<DashboardResponse>, ApiError> {
    let account = resolve_account(
        state.store.as_ref(),
        &session.identity,
        state.config.allow_name_fallback,
    )
    .await?;

    let dashboard = aggregate(state.store.as_ref(), &account).await?;

    tracing::debug!(
        account_id = %account.id,
        tests = dashboard.tests.len(),
        "Dashboard aggregated"
    );

    Ok(SafeJson(dashboard))
}

/// `GET /dashboard/organization`.
pub async fn get_organization_dashboard(
    State(state): State<Arc<AppState>>,
    session: SessionUser,
) -> Result<SafeJson<OrganizationDashboardResponse>, ApiError> {
    let store = state.store.as_ref();
    let (account, institute) = resolve_organization_account(
        store,
        &session.identity,
        state.config.allow_name_fallback,
    )
    .await?;

    let institute_info = store
        .get_institute_info(&institute)
        .await?
        .ok_or_else(|| ApiError::NotFound("기관 정보를 찾을 수 없습니다.".into()))?;
    let members = store.list_members(&institute).await?;
    let dashboard = aggregate(store, &account).await?;

    Ok(SafeJson(OrganizationDashboardResponse {
        dashboard,
        institute_info,
        members,
        is_organization: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_status_defaults() {
        let status = AccountStatus::new(None, false);
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({ "paid": "N", "kind": "", "expired": "N", "state": "R" })
        );
    }

    #[test]
    fn product_name_falls_back_to_kind() {
        let item = TestItem::new(
            TestRow {
                seq: 2,
                product_code: None,
                product_name: None,
                kind: "premium_a".into(),
                price: 30_000,
                paid: Flag::Yes,
                paid_at: None,
                started_at: None,
                ended_at: None,
                done: DoneState::Ended,
            },
            false,
        );
        assert_eq!(item.product_name, "premium_a");
        assert_eq!(item.review, ReviewCode::PremiumReviewable);

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["cr_seq"], 2);
        assert_eq!(value["review"], "P");
    }
}
