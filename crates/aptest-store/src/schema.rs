//! Table names of the relational schema.
//!
//! The DDL lives in `migrations/`; these constants keep log fields and
//! diagnostics consistent with it.

/// Table names.
pub mod table {
    /// People, created once at signup.
    pub const PERSON: &str = "person";

    /// Login accounts, keyed by `ac_gid`.
    pub const ACCOUNT: &str = "account";

    /// Organizations.
    pub const INSTITUTE: &str = "institute";

    /// Cohorts of an institute, each with a join code.
    pub const INSTITUTE_TURN: &str = "institute_turn";

    /// Person to institute turn membership.
    pub const INSTITUTE_MEMBER: &str = "institute_member";

    /// Purchasable test products.
    pub const PRODUCT: &str = "product";

    /// Purchased or selected test instances, keyed by `(ac_gid, cr_seq)`.
    pub const CHOICE_RESULT: &str = "choice_result";

    /// Answer progress of a choice result.
    pub const ANSWER_PROGRESS: &str = "answer_progress";

    /// Payments, keyed by `order_id`.
    pub const PAYMENT: &str = "payment";

    /// Append-only payment audit trail.
    pub const PAYMENT_LOG: &str = "payment_log";

    /// Login events.
    pub const LOGIN_LOG: &str = "login_log";

    /// Account actions.
    pub const ACCOUNT_LOG: &str = "account_log";
}

/// Name of the partial unique index allowing one unpaid choice per account.
pub const UNPAID_CHOICE_INDEX: &str = "choice_result_one_unpaid_per_account";

/// Name of the case-insensitive login id index.
pub const LOGIN_ID_INDEX: &str = "account_login_id_lower_key";

/// Returns all table names, in creation order.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        table::PERSON,
        table::INSTITUTE,
        table::INSTITUTE_TURN,
        table::ACCOUNT,
        table::INSTITUTE_MEMBER,
        table::PRODUCT,
        table::CHOICE_RESULT,
        table::ANSWER_PROGRESS,
        table::PAYMENT,
        table::PAYMENT_LOG,
        table::LOGIN_LOG,
        table::ACCOUNT_LOG,
    ]
}
