//! Choice results (purchased test instances), answer progress and review eligibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{is_basic_kind, is_premium_kind};
use crate::{AccountId, Flag};

/// Lifecycle state of a test attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DoneState {
    /// Not started or still running (`R`).
    #[serde(rename = "R")]
    #[default]
    Running,
    /// Completed (`E`).
    #[serde(rename = "E")]
    Ended,
}

impl DoneState {
    /// The stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "R",
            Self::Ended => "E",
        }
    }

    /// Parse a stored column value; unknown values count as running.
    #[must_use]
    pub fn from_column(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("e") {
            Self::Ended
        } else {
            Self::Running
        }
    }
}

/// Whether a test's report may be viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewCode {
    /// Basic test, completed, account not expired.
    #[serde(rename = "Y")]
    Reviewable,
    /// Basic test on an expired account.
    #[serde(rename = "E")]
    Expired,
    /// Premium test, completed.
    #[serde(rename = "P")]
    PremiumReviewable,
    /// Anything else.
    #[serde(rename = "N")]
    NotReviewable,
}

/// Derive the review-eligibility code for one test row.
///
/// Rules are evaluated in order and the first match wins.
#[must_use]
pub fn review_eligibility(kind: &str, expired: bool, done: DoneState) -> ReviewCode {
    let basic = is_basic_kind(kind);
    if basic && !expired && done == DoneState::Ended {
        ReviewCode::Reviewable
    } else if basic && expired {
        ReviewCode::Expired
    } else if is_premium_kind(kind) && done == DoneState::Ended {
        ReviewCode::PremiumReviewable
    } else {
        ReviewCode::NotReviewable
    }
}

/// Product fields copied onto a choice result when it is created or re-targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSelection {
    /// Product code, when the client named one.
    pub product_code: Option<i64>,
    /// Product kind.
    pub kind: String,
    /// Price the buyer is charged.
    pub price: i64,
}

/// A choice result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceResult {
    /// Owning account.
    pub account: AccountId,
    /// Per-account sequence (`cr_seq`).
    pub seq: i64,
    /// Product code.
    pub product_code: Option<i64>,
    /// Product kind.
    pub kind: String,
    /// Product price.
    pub price: i64,
    /// Payment flag.
    pub paid: Flag,
    /// When the payment was confirmed.
    pub paid_at: Option<DateTime<Utc>>,
    /// Order id once payment is initiated.
    pub order_id: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// An answer progress row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerProgress {
    /// Owning account.
    pub account: AccountId,
    /// Choice result sequence.
    pub seq: i64,
    /// When the attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the attempt ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Done state.
    pub done: DoneState,
}

/// The newest choice result joined with its progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestChoice {
    /// Choice result sequence.
    pub seq: i64,
    /// Payment flag.
    pub paid: Flag,
    /// Product kind.
    pub kind: String,
    /// Done state (`R` when no progress row exists).
    pub done: DoneState,
}

/// One row of the dashboard test list, before eligibility is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRow {
    /// Choice result sequence.
    pub seq: i64,
    /// Product code.
    pub product_code: Option<i64>,
    /// Product display name, when the product still exists.
    pub product_name: Option<String>,
    /// Product kind.
    pub kind: String,
    /// Product price.
    pub price: i64,
    /// Payment flag.
    pub paid: Flag,
    /// Payment timestamp.
    pub paid_at: Option<DateTime<Utc>>,
    /// Attempt start.
    pub started_at: Option<DateTime<Utc>>,
    /// Attempt end.
    pub ended_at: Option<DateTime<Utc>>,
    /// Done state (`R` when no progress row exists).
    pub done: DoneState,
}

/// A choice result with the product details needed to start a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceDetail {
    /// Choice result sequence.
    pub seq: i64,
    /// Name shown to the buyer.
    pub order_name: String,
    /// Amount to charge.
    pub amount: i64,
    /// Product kind.
    pub kind: String,
}
