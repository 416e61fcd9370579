//! Storage layer for aptest.
//!
//! This crate provides persistent storage for accounts, test selections
//! (choice results), payments and their audit logs on top of PostgreSQL.
//!
//! # Architecture
//!
//! - [`Store`] covers single-statement reads and best-effort audit writes.
//! - [`UnitOfWork`] covers every multi-statement mutation; it is obtained from
//!   [`Store::begin`] and must end in [`UnitOfWork::commit`] or
//!   [`UnitOfWork::rollback`].
//! - [`with_transaction`] wraps a scope in a unit of work, committing on `Ok`
//!   and rolling back on `Err`. Dropping an unfinished unit of work (request
//!   cancellation) also rolls back.
//!
//! # Example
//!
//! ```no_run
//! use aptest_store::{with_transaction, PgStore, Store, StoreError};
//! use aptest_core::AccountId;
//!
//! # async fn run(account: AccountId) -> Result<(), StoreError> {
//! let store = PgStore::connect("postgres://localhost/aptest", 5).await?;
//!
//! let seq = with_transaction(&store, move |tx| {
//!     Box::pin(async move {
//!         tx.lock_account(&account).await?;
//!         tx.next_choice_seq(&account).await
//!     })
//! })
//! .await?;
//! # let _ = seq;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "fixtures")]
pub mod fixture;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
#[cfg(feature = "fixtures")]
pub use fixture::{FailPoint, FixtureDataSource, TurnSeed};
pub use postgres::{PgStore, MIGRATOR};

use aptest_core::{
    Account, AccountId, ChoiceDetail, InstituteInfo, InstituteRef, LatestChoice, Member,
    NewPayment, NewPerson, Payment, PaymentApproval, PaymentLogEntry, PaymentStatus, Product,
    ProductSelection, ProductType, TestRow, TurnLookup,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

/// Insert payload for a new account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Global account id.
    pub id: AccountId,
    /// Login id.
    pub login_id: String,
    /// Plain-text password. The store hashes it; it is never written as-is.
    pub password: String,
    /// Owning person.
    pub person_seq: i64,
    /// Access expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Institute membership.
    pub institute: Option<InstituteRef>,
}

/// The storage trait for reads and best-effort audit writes.
///
/// Multi-statement mutations go through [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection is available.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by its global id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>>;

    /// Find an account by login id, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_account_by_login_id(&self, login_id: &str) -> Result<Option<Account>>;

    /// List the accounts of every person with this email, oldest account first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_accounts_by_email(&self, email: &str) -> Result<Vec<Account>>;

    /// List the accounts of every person with exactly this name, oldest account first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_accounts_by_person_name(&self, name: &str) -> Result<Vec<Account>>;

    /// Whether a login id is taken, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn login_id_exists(&self, login_id: &str) -> Result<bool>;

    // =========================================================================
    // Dashboard Operations
    // =========================================================================

    /// The newest choice result of an account, joined with its progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn latest_choice(&self, account: &AccountId) -> Result<Option<LatestChoice>>;

    /// Every choice result of an account joined to product and progress,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_tests(&self, account: &AccountId) -> Result<Vec<TestRow>>;

    /// Institute and turn details.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_institute_info(&self, institute: &InstituteRef) -> Result<Option<InstituteInfo>>;

    /// Members of an institute turn, most recent join first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_members(&self, institute: &InstituteRef) -> Result<Vec<Member>>;

    /// Look up an institute turn by join code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_turn_by_code(&self, code: &str) -> Result<Option<TurnLookup>>;

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Active products of one type, cheapest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_products(&self, product_type: ProductType) -> Result<Vec<Product>>;

    /// Get a product by code, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_product(&self, code: i64) -> Result<Option<Product>>;

    /// A choice result of an account with its product's name and price.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_choice_detail(&self, account: &AccountId, seq: i64)
        -> Result<Option<ChoiceDetail>>;

    // =========================================================================
    // Payment Operations
    // =========================================================================

    /// Get a payment by order id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_payment(&self, order_id: &str) -> Result<Option<Payment>>;

    /// Whether a payment with this order id exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn payment_exists(&self, order_id: &str) -> Result<bool>;

    // =========================================================================
    // Audit Operations (best effort)
    // =========================================================================

    /// Record a login event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record_login_event(&self, account: &AccountId, event: &str) -> Result<()>;

    /// Record an account action.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record_account_action(
        &self,
        account: &AccountId,
        action: &str,
        detail: &str,
    ) -> Result<()>;
}

/// One open database transaction.
///
/// Every write made through a unit of work becomes visible together on
/// [`commit`](UnitOfWork::commit) or not at all.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Serialize with every other unit of work touching this account until
    /// this one ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn lock_account(&mut self, account: &AccountId) -> Result<()>;

    // =========================================================================
    // Choice Results
    // =========================================================================

    /// Sequence of the account's unpaid choice result, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_unpaid_choice(&mut self, account: &AccountId) -> Result<Option<i64>>;

    /// Next free choice result sequence (max + 1, starting at 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn next_choice_seq(&mut self, account: &AccountId) -> Result<i64>;

    /// Insert an unpaid choice result.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the account already has an
    /// unpaid choice result or the sequence is taken.
    async fn insert_choice(
        &mut self,
        account: &AccountId,
        seq: i64,
        selection: &ProductSelection,
        order_id: Option<&str>,
    ) -> Result<()>;

    /// Re-target an existing unpaid choice result at a new product and order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no unpaid choice result has this sequence.
    async fn update_choice_selection(
        &mut self,
        account: &AccountId,
        seq: i64,
        selection: &ProductSelection,
        order_id: &str,
    ) -> Result<()>;

    /// Set a choice result's payment flag to `Y`.
    ///
    /// Returns `false` when the row was already paid or does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn mark_choice_paid(
        &mut self,
        account: &AccountId,
        seq: i64,
        paid_at: DateTime<Utc>,
    ) -> Result<bool>;

    // =========================================================================
    // Payments
    // =========================================================================

    /// Get a payment by order id, locking it for the rest of the unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_payment(&mut self, order_id: &str) -> Result<Option<Payment>>;

    /// Insert a payment in the `READY` state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the order id is taken.
    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<()>;

    /// Move a `READY` payment to `DONE` with the gateway's approval details.
    ///
    /// Returns `false` when the payment is missing or no longer `READY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn mark_payment_done(&mut self, order_id: &str, approval: &PaymentApproval)
        -> Result<bool>;

    /// Move a payment to `FAILED`.
    ///
    /// With `expected` set, only a payment currently in that status moves;
    /// with `None` the update is unconditional. Returns whether a row changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn mark_payment_failed(
        &mut self,
        order_id: &str,
        reason: &str,
        payment_key: Option<&str>,
        expected: Option<PaymentStatus>,
    ) -> Result<bool>;

    /// Append a payment log row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn append_payment_log(&mut self, entry: &PaymentLogEntry) -> Result<()>;

    // =========================================================================
    // Signup
    // =========================================================================

    /// Insert a person and return its sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_person(&mut self, person: &NewPerson) -> Result<i64>;

    /// Insert an account, hashing its password.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the login id is taken.
    async fn insert_account(&mut self, account: &NewAccount) -> Result<()>;

    /// Every product, active or not, ordered by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_all_products(&mut self) -> Result<Vec<Product>>;

    // =========================================================================
    // Completion
    // =========================================================================

    /// Make every write of this unit of work visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; nothing is applied in that case.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write of this unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback could not be sent.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Run `scope` inside one unit of work.
///
/// Commits when the scope returns `Ok` and rolls back when it returns `Err`.
/// A failed rollback is logged; the scope's error is still returned.
///
/// # Errors
///
/// Returns the scope's error, or the store error from `begin`/`commit`.
pub async fn with_transaction<T, E, F>(store: &dyn Store, scope: F) -> std::result::Result<T, E>
where
    T: Send,
    E: From<StoreError> + Send,
    F: for<'t> FnOnce(&'t mut dyn UnitOfWork) -> BoxFuture<'t, std::result::Result<T, E>> + Send,
{
    let mut tx = store.begin().await?;

    match scope(tx.as_mut()).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
