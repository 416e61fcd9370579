//! PostgreSQL storage implementation.
//!
//! This module provides `PgStore`, the production implementation of the
//! `Store` trait, and `PgUnitOfWork`, a unit of work over one
//! `sqlx::Transaction`. Every statement is parameterized.

use aptest_core::{
    Account, AccountId, ChoiceDetail, DoneState, Flag, InstituteInfo, InstituteRef, LatestChoice,
    Member, NewPayment, NewPerson, Payment, PaymentApproval, PaymentLogEntry, PaymentStatus,
    Product, ProductSelection, ProductType, TestRow, TurnLookup,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::{NewAccount, Store, UnitOfWork};

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const ACCOUNT_COLUMNS: &str = "a.ac_gid, a.ac_id, a.pe_seq, a.ac_use, a.ac_expire_date, \
                               a.ins_seq, a.tur_seq, a.ac_created_at";

const PAYMENT_COLUMNS: &str = "order_id, ac_gid, cr_seq, amount, order_name, status, method, \
                               payment_key, fail_reason, approved_at, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "pd_num, pd_name, pd_kind, pd_price, pd_type, pd_use";

// =============================================================================
// Row mapping
// =============================================================================

#[derive(FromRow)]
struct AccountRow {
    ac_gid: Uuid,
    ac_id: String,
    pe_seq: i64,
    ac_use: String,
    ac_expire_date: Option<DateTime<Utc>>,
    ins_seq: Option<i64>,
    tur_seq: Option<i64>,
    ac_created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: AccountId::from_uuid(row.ac_gid),
            login_id: row.ac_id,
            person_seq: row.pe_seq,
            active: Flag::from_column(&row.ac_use).is_yes(),
            expires_at: row.ac_expire_date,
            institute: InstituteRef::from_columns(row.ins_seq, row.tur_seq),
            created_at: row.ac_created_at,
        }
    }
}

#[derive(FromRow)]
struct PaymentRow {
    order_id: String,
    ac_gid: Uuid,
    cr_seq: i64,
    amount: i64,
    order_name: String,
    status: String,
    method: Option<String>,
    payment_key: Option<String>,
    fail_reason: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        let status = PaymentStatus::from_column(&row.status).ok_or_else(|| {
            StoreError::Serialization(format!("unknown payment status: {}", row.status))
        })?;

        Ok(Self {
            order_id: row.order_id,
            account: AccountId::from_uuid(row.ac_gid),
            choice_seq: row.cr_seq,
            amount: row.amount,
            order_name: row.order_name,
            status,
            method: row.method,
            payment_key: row.payment_key,
            fail_reason: row.fail_reason,
            approved_at: row.approved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    pd_num: i64,
    pd_name: String,
    pd_kind: String,
    pd_price: i64,
    pd_type: String,
    pd_use: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self> {
        let product_type = ProductType::from_column(&row.pd_type).ok_or_else(|| {
            StoreError::Serialization(format!("unknown product type: {}", row.pd_type))
        })?;

        Ok(Self {
            code: row.pd_num,
            name: row.pd_name,
            kind: row.pd_kind,
            price: row.pd_price,
            product_type,
            active: Flag::from_column(&row.pd_use).is_yes(),
        })
    }
}

fn products(rows: Vec<ProductRow>) -> Result<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

#[derive(FromRow)]
struct LatestChoiceRow {
    cr_seq: i64,
    cr_pay: String,
    pd_kind: String,
    anp_done: Option<String>,
}

#[derive(FromRow)]
struct TestRowRecord {
    cr_seq: i64,
    pd_num: Option<i64>,
    pd_name: Option<String>,
    pd_kind: String,
    pd_price: i64,
    cr_pay: String,
    cr_pay_date: Option<DateTime<Utc>>,
    anp_start_date: Option<DateTime<Utc>>,
    anp_end_date: Option<DateTime<Utc>>,
    anp_done: Option<String>,
}

impl From<TestRowRecord> for TestRow {
    fn from(row: TestRowRecord) -> Self {
        Self {
            seq: row.cr_seq,
            product_code: row.pd_num,
            product_name: row.pd_name,
            kind: row.pd_kind,
            price: row.pd_price,
            paid: Flag::from_column(&row.cr_pay),
            paid_at: row.cr_pay_date,
            started_at: row.anp_start_date,
            ended_at: row.anp_end_date,
            done: row
                .anp_done
                .as_deref()
                .map_or(DoneState::Running, DoneState::from_column),
        }
    }
}

#[derive(FromRow)]
struct InstituteInfoRow {
    ins_seq: i64,
    ins_name: String,
    tur_seq: i64,
    tur_code: String,
    tur_use: String,
    tur_req_sum: i64,
    tur_use_sum: i64,
}

#[derive(FromRow)]
struct MemberRow {
    pe_seq: i64,
    pe_name: String,
    pe_email: String,
    pe_phone: Option<String>,
    mem_join_date: DateTime<Utc>,
}

#[derive(FromRow)]
struct TurnRow {
    ins_seq: i64,
    tur_seq: i64,
    ins_name: String,
    tur_use: String,
}

#[derive(FromRow)]
struct ChoiceDetailRow {
    cr_seq: i64,
    order_name: String,
    amount: i64,
    pd_kind: String,
}

// =============================================================================
// PgStore
// =============================================================================

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot establish a connection.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn accounts_where(&self, predicate: &str, value: &str) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account a \
             JOIN person p ON p.pe_seq = a.pe_seq \
             WHERE {predicate} \
             ORDER BY a.ac_created_at, a.ac_id"
        );

        let rows: Vec<AccountRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM account a WHERE a.ac_gid = $1");

        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Account::from))
    }

    async fn find_account_by_login_id(&self, login_id: &str) -> Result<Option<Account>> {
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM account a WHERE lower(a.ac_id) = lower($1)");

        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(login_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Account::from))
    }

    async fn find_accounts_by_email(&self, email: &str) -> Result<Vec<Account>> {
        self.accounts_where("lower(p.pe_email) = lower($1)", email)
            .await
    }

    async fn find_accounts_by_person_name(&self, name: &str) -> Result<Vec<Account>> {
        self.accounts_where("p.pe_name = $1", name).await
    }

    async fn login_id_exists(&self, login_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM account WHERE lower(ac_id) = lower($1))")
                .bind(login_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    // =========================================================================
    // Dashboard Operations
    // =========================================================================

    async fn latest_choice(&self, account: &AccountId) -> Result<Option<LatestChoice>> {
        let row: Option<LatestChoiceRow> = sqlx::query_as(
            "SELECT cr.cr_seq, cr.cr_pay, cr.pd_kind, ap.anp_done \
             FROM choice_result cr \
             LEFT JOIN answer_progress ap ON ap.ac_gid = cr.ac_gid AND ap.cr_seq = cr.cr_seq \
             WHERE cr.ac_gid = $1 \
             ORDER BY cr.cr_seq DESC \
             LIMIT 1",
        )
        .bind(account.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| LatestChoice {
            seq: row.cr_seq,
            paid: Flag::from_column(&row.cr_pay),
            kind: row.pd_kind,
            done: row
                .anp_done
                .as_deref()
                .map_or(DoneState::Running, DoneState::from_column),
        }))
    }

    async fn list_tests(&self, account: &AccountId) -> Result<Vec<TestRow>> {
        let rows: Vec<TestRowRecord> = sqlx::query_as(
            "SELECT cr.cr_seq, cr.pd_num, p.pd_name, cr.pd_kind, cr.pd_price, cr.cr_pay, \
                    cr.cr_pay_date, ap.anp_start_date, ap.anp_end_date, ap.anp_done \
             FROM choice_result cr \
             LEFT JOIN product p ON p.pd_num = cr.pd_num \
             LEFT JOIN answer_progress ap ON ap.ac_gid = cr.ac_gid AND ap.cr_seq = cr.cr_seq \
             WHERE cr.ac_gid = $1 \
             ORDER BY cr.cr_seq DESC",
        )
        .bind(account.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TestRow::from).collect())
    }

    async fn get_institute_info(&self, institute: &InstituteRef) -> Result<Option<InstituteInfo>> {
        let row: Option<InstituteInfoRow> = sqlx::query_as(
            "SELECT i.ins_seq, i.ins_name, t.tur_seq, t.tur_code, t.tur_use, \
                    t.tur_req_sum, t.tur_use_sum \
             FROM institute i \
             JOIN institute_turn t ON t.ins_seq = i.ins_seq \
             WHERE i.ins_seq = $1 AND t.tur_seq = $2",
        )
        .bind(institute.ins_seq)
        .bind(institute.tur_seq)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| InstituteInfo {
            ins_seq: row.ins_seq,
            ins_name: row.ins_name,
            tur_seq: row.tur_seq,
            tur_code: row.tur_code,
            tur_use: Flag::from_column(&row.tur_use).is_yes(),
            tur_req_sum: row.tur_req_sum,
            tur_use_sum: row.tur_use_sum,
        }))
    }

    async fn list_members(&self, institute: &InstituteRef) -> Result<Vec<Member>> {
        let rows: Vec<MemberRow> = sqlx::query_as(
            "SELECT p.pe_seq, p.pe_name, p.pe_email, p.pe_phone, m.mem_join_date \
             FROM institute_member m \
             JOIN person p ON p.pe_seq = m.pe_seq \
             WHERE m.ins_seq = $1 AND m.tur_seq = $2 \
             ORDER BY m.mem_join_date DESC",
        )
        .bind(institute.ins_seq)
        .bind(institute.tur_seq)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Member {
                pe_seq: row.pe_seq,
                name: row.pe_name,
                email: row.pe_email,
                phone: row.pe_phone,
                join_date: row.mem_join_date,
            })
            .collect())
    }

    async fn find_turn_by_code(&self, code: &str) -> Result<Option<TurnLookup>> {
        let row: Option<TurnRow> = sqlx::query_as(
            "SELECT t.ins_seq, t.tur_seq, i.ins_name, t.tur_use \
             FROM institute_turn t \
             JOIN institute i ON i.ins_seq = t.ins_seq \
             WHERE t.tur_code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| TurnLookup {
            ins_seq: row.ins_seq,
            tur_seq: row.tur_seq,
            institute_name: row.ins_name,
            usable: Flag::from_column(&row.tur_use).is_yes(),
        }))
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    async fn list_products(&self, product_type: ProductType) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM product \
             WHERE pd_type = $1 AND pd_use = 'Y' \
             ORDER BY pd_price, pd_num"
        );

        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(product_type.as_str())
            .fetch_all(&self.pool)
            .await?;

        products(rows)
    }

    async fn get_product(&self, code: i64) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE pd_num = $1");

        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Product::try_from).transpose()
    }

    async fn get_choice_detail(
        &self,
        account: &AccountId,
        seq: i64,
    ) -> Result<Option<ChoiceDetail>> {
        let row: Option<ChoiceDetailRow> = sqlx::query_as(
            "SELECT cr.cr_seq, COALESCE(p.pd_name, cr.pd_kind) AS order_name, \
                    COALESCE(p.pd_price, cr.pd_price) AS amount, cr.pd_kind \
             FROM choice_result cr \
             LEFT JOIN product p ON p.pd_num = cr.pd_num \
             WHERE cr.ac_gid = $1 AND cr.cr_seq = $2",
        )
        .bind(account.as_uuid())
        .bind(seq)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ChoiceDetail {
            seq: row.cr_seq,
            order_name: row.order_name,
            amount: row.amount,
            kind: row.pd_kind,
        }))
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    async fn get_payment(&self, order_id: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE order_id = $1");

        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn payment_exists(&self, order_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payment WHERE order_id = $1)")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    // =========================================================================
    // Audit Operations
    // =========================================================================

    async fn record_login_event(&self, account: &AccountId, event: &str) -> Result<()> {
        sqlx::query("INSERT INTO login_log (ac_gid, event) VALUES ($1, $2)")
            .bind(account.as_uuid())
            .bind(event)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn record_account_action(
        &self,
        account: &AccountId,
        action: &str,
        detail: &str,
    ) -> Result<()> {
        sqlx::query("INSERT INTO account_log (ac_gid, action, detail) VALUES ($1, $2, $3)")
            .bind(account.as_uuid())
            .bind(action)
            .bind(detail)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// PgUnitOfWork
// =============================================================================

/// A unit of work over one database transaction.
///
/// Dropping it without calling `commit` rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_account(&mut self, account: &AccountId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(account.to_string())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Choice Results
    // =========================================================================

    async fn find_unpaid_choice(&mut self, account: &AccountId) -> Result<Option<i64>> {
        let seq: Option<i64> = sqlx::query_scalar(
            "SELECT cr_seq FROM choice_result \
             WHERE ac_gid = $1 AND cr_pay = 'N' \
             ORDER BY cr_seq \
             LIMIT 1 \
             FOR UPDATE",
        )
        .bind(account.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(seq)
    }

    async fn next_choice_seq(&mut self, account: &AccountId) -> Result<i64> {
        let seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(cr_seq), 0) + 1 FROM choice_result WHERE ac_gid = $1",
        )
        .bind(account.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(seq)
    }

    async fn insert_choice(
        &mut self,
        account: &AccountId,
        seq: i64,
        selection: &ProductSelection,
        order_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO choice_result (ac_gid, cr_seq, pd_num, pd_kind, pd_price, cr_pay, order_id) \
             VALUES ($1, $2, $3, $4, $5, 'N', $6)",
        )
        .bind(account.as_uuid())
        .bind(seq)
        .bind(selection.product_code)
        .bind(&selection.kind)
        .bind(selection.price)
        .bind(order_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_choice_selection(
        &mut self,
        account: &AccountId,
        seq: i64,
        selection: &ProductSelection,
        order_id: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE choice_result \
             SET pd_num = $3, pd_kind = $4, pd_price = $5, order_id = $6 \
             WHERE ac_gid = $1 AND cr_seq = $2 AND cr_pay = 'N'",
        )
        .bind(account.as_uuid())
        .bind(seq)
        .bind(selection.product_code)
        .bind(&selection.kind)
        .bind(selection.price)
        .bind(order_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn mark_choice_paid(
        &mut self,
        account: &AccountId,
        seq: i64,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE choice_result SET cr_pay = 'Y', cr_pay_date = $3 \
             WHERE ac_gid = $1 AND cr_seq = $2 AND cr_pay = 'N'",
        )
        .bind(account.as_uuid())
        .bind(seq)
        .bind(paid_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    async fn get_payment(&mut self, order_id: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payment WHERE order_id = $1 FOR UPDATE");

        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<()> {
        sqlx::query(
            "INSERT INTO payment (order_id, ac_gid, cr_seq, amount, order_name, status, method) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(payment.order_id.as_str())
        .bind(payment.account.as_uuid())
        .bind(payment.choice_seq)
        .bind(payment.amount)
        .bind(&payment.order_name)
        .bind(PaymentStatus::Ready.as_str())
        .bind(&payment.method)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn mark_payment_done(
        &mut self,
        order_id: &str,
        approval: &PaymentApproval,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payment \
             SET status = 'DONE', payment_key = $2, method = COALESCE($3, method), \
                 approved_at = $4, updated_at = now() \
             WHERE order_id = $1 AND status = 'READY'",
        )
        .bind(order_id)
        .bind(&approval.payment_key)
        .bind(approval.method.as_deref())
        .bind(approval.approved_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_payment_failed(
        &mut self,
        order_id: &str,
        reason: &str,
        payment_key: Option<&str>,
        expected: Option<PaymentStatus>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payment \
             SET status = 'FAILED', fail_reason = $2, \
                 payment_key = COALESCE($3, payment_key), updated_at = now() \
             WHERE order_id = $1 AND ($4::text IS NULL OR status = $4)",
        )
        .bind(order_id)
        .bind(reason)
        .bind(payment_key)
        .bind(expected.map(PaymentStatus::as_str))
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_payment_log(&mut self, entry: &PaymentLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO payment_log \
             (order_id, ac_gid, event, status, amount, payment_key, code, message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.order_id.as_deref())
        .bind(entry.account.map(|id| *id.as_uuid()))
        .bind(entry.event.as_str())
        .bind(entry.status.map(PaymentStatus::as_str))
        .bind(entry.amount)
        .bind(entry.payment_key.as_deref())
        .bind(entry.code.as_deref())
        .bind(entry.message.as_deref())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Signup
    // =========================================================================

    async fn insert_person(&mut self, person: &NewPerson) -> Result<i64> {
        let seq: i64 = sqlx::query_scalar(
            "INSERT INTO person \
             (pe_name, pe_email, pe_birth_year, pe_birth_month, pe_birth_day, pe_sex, pe_phone, \
              pe_zipcode, pe_address, pe_address_detail, pe_education, pe_school, pe_major, pe_job) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING pe_seq",
        )
        .bind(&person.name)
        .bind(&person.email)
        .bind(person.birth.year)
        .bind(i32::try_from(person.birth.month).unwrap_or_default())
        .bind(i32::try_from(person.birth.day).unwrap_or_default())
        .bind(person.gender.as_str())
        .bind(&person.phone)
        .bind(person.zip_code.as_deref())
        .bind(person.address.as_deref())
        .bind(person.address_detail.as_deref())
        .bind(person.education.as_deref())
        .bind(person.school.as_deref())
        .bind(person.major.as_deref())
        .bind(person.job.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(seq)
    }

    async fn insert_account(&mut self, account: &NewAccount) -> Result<()> {
        sqlx::query(
            "INSERT INTO account \
             (ac_gid, ac_id, ac_pw, pe_seq, ac_use, ac_expire_date, ins_seq, tur_seq) \
             VALUES ($1, $2, crypt($3, gen_salt('bf')), $4, 'Y', $5, $6, $7)",
        )
        .bind(account.id.as_uuid())
        .bind(&account.login_id)
        .bind(&account.password)
        .bind(account.person_seq)
        .bind(account.expires_at)
        .bind(account.institute.map(|i| i.ins_seq))
        .bind(account.institute.map(|i| i.tur_seq))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn list_all_products(&mut self) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM product ORDER BY pd_num");

        let rows: Vec<ProductRow> = sqlx::query_as(&sql).fetch_all(&mut *self.tx).await?;

        products(rows)
    }

    // =========================================================================
    // Completion
    // =========================================================================

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::all_tables;
    use crate::with_transaction;
    use aptest_core::{BirthDate, Gender, OrderId};

    async fn connect() -> PgStore {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgStore::connect(&url, 2).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn person(name: &str) -> NewPerson {
        NewPerson {
            name: name.into(),
            email: format!("{}@example.com", Uuid::new_v4().simple()),
            birth: BirthDate {
                year: 1990,
                month: 1,
                day: 2,
            },
            gender: Gender::Female,
            phone: "010-0000-0000".into(),
            zip_code: None,
            address: None,
            address_detail: None,
            education: None,
            school: None,
            major: None,
            job: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn migrations_create_every_table() {
        let store = connect().await;

        for table in all_tables() {
            let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
                .bind(table)
                .fetch_one(store.pool())
                .await
                .unwrap();
            assert!(exists, "{table} missing");
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn signup_and_payment_round() {
        let store = connect().await;
        let id = AccountId::generate();
        let login_id = format!("pg-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let order_id: OrderId = format!("order-{}", Uuid::new_v4().simple()).parse().unwrap();

        let login = login_id.clone();
        let order = order_id.clone();
        with_transaction(&store, move |tx| {
            Box::pin(async move {
                let pe_seq = tx.insert_person(&person("PG Test")).await?;
                tx.insert_account(&NewAccount {
                    id,
                    login_id: login,
                    password: "pw".into(),
                    person_seq: pe_seq,
                    expires_at: None,
                    institute: None,
                })
                .await?;
                tx.lock_account(&id).await?;
                let seq = tx.next_choice_seq(&id).await?;
                let selection = ProductSelection {
                    product_code: None,
                    kind: "basic".into(),
                    price: 1000,
                };
                tx.insert_choice(&id, seq, &selection, Some(order.as_str()))
                    .await?;
                tx.insert_payment(&NewPayment {
                    order_id: order,
                    account: id,
                    choice_seq: seq,
                    amount: 1000,
                    order_name: "basic".into(),
                    method: "CARD".into(),
                })
                .await?;
                Ok::<_, StoreError>(())
            })
        })
        .await
        .unwrap();

        assert!(store.login_id_exists(&login_id.to_uppercase()).await.unwrap());
        let payment = store.get_payment(order_id.as_str()).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Ready);
        assert_eq!(payment.account, id);

        let hash: String = sqlx::query_scalar("SELECT ac_pw FROM account WHERE ac_gid = $1")
            .bind(id.as_uuid())
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_ne!(hash, "pw");
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn duplicate_login_id_is_unique_violation() {
        let store = connect().await;
        let login_id = format!("dup-{}", &Uuid::new_v4().simple().to_string()[..12]);

        for attempt in 0..2 {
            let login = if attempt == 0 {
                login_id.clone()
            } else {
                login_id.to_uppercase()
            };
            let result = with_transaction(&store, move |tx| {
                Box::pin(async move {
                    let pe_seq = tx.insert_person(&person("Dup")).await?;
                    tx.insert_account(&NewAccount {
                        id: AccountId::generate(),
                        login_id: login,
                        password: "pw".into(),
                        person_seq: pe_seq,
                        expires_at: None,
                        institute: None,
                    })
                    .await
                })
            })
            .await;

            if attempt == 0 {
                result.unwrap();
            } else {
                assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));
            }
        }
    }
}
