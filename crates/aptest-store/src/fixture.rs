//! In-memory storage for tests.
//!
//! `FixtureDataSource` implements `Store` over plain vectors guarded by one
//! async mutex. A unit of work holds the mutex for its whole lifetime and
//! edits a private copy of the tables, so commit publishes every write at
//! once and rollback (or drop) discards them. Unique indexes of the SQL
//! schema are enforced the same way.
//!
//! Only compiled with the `fixtures` feature; never wire it into a binary.

use std::sync::Arc;

use aptest_core::{
    Account, AccountId, AnswerProgress, ChoiceDetail, ChoiceResult, DoneState, Flag,
    InstituteInfo, InstituteRef, LatestChoice, Member, NewPayment, NewPerson, Payment,
    PaymentApproval, PaymentLogEntry, PaymentStatus, Product, ProductSelection, ProductType,
    TestRow, TurnLookup,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, StoreError};
use crate::schema::{LOGIN_ID_INDEX, UNPAID_CHOICE_INDEX};
use crate::{NewAccount, Store, UnitOfWork};

/// A write that can be made to fail once, to exercise rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// `UnitOfWork::insert_choice`.
    InsertChoice,
    /// `UnitOfWork::insert_payment`.
    InsertPayment,
    /// `UnitOfWork::mark_payment_done`.
    MarkPaymentDone,
    /// `UnitOfWork::mark_choice_paid`.
    MarkChoicePaid,
    /// `UnitOfWork::append_payment_log`.
    AppendPaymentLog,
    /// `UnitOfWork::insert_person`.
    InsertPerson,
    /// `UnitOfWork::insert_account`.
    InsertAccount,
    /// `UnitOfWork::commit`.
    Commit,
    /// `Store::record_login_event`.
    LoginEvent,
    /// `Store::record_account_action`.
    AccountAction,
}

/// Seed data for an institute turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSeed {
    /// Institute sequence.
    pub ins_seq: i64,
    /// Turn sequence.
    pub tur_seq: i64,
    /// Join code.
    pub code: String,
    /// Whether the turn is usable.
    pub usable: bool,
    /// Requested seats.
    pub requested: i64,
    /// Used seats.
    pub used: i64,
}

#[derive(Debug, Clone)]
struct PersonRecord {
    seq: i64,
    name: String,
    email: String,
    phone: Option<String>,
}

#[derive(Debug, Clone)]
struct AccountRecord {
    account: Account,
    password_hash: String,
}

#[derive(Debug, Clone)]
struct MemberRecord {
    pe_seq: i64,
    institute: InstituteRef,
    join_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    persons: Vec<PersonRecord>,
    accounts: Vec<AccountRecord>,
    institutes: Vec<(i64, String)>,
    turns: Vec<TurnSeed>,
    members: Vec<MemberRecord>,
    products: Vec<Product>,
    choices: Vec<ChoiceResult>,
    progress: Vec<AnswerProgress>,
    payments: Vec<Payment>,
    payment_logs: Vec<PaymentLogEntry>,
    login_logs: Vec<(AccountId, String)>,
    account_logs: Vec<(AccountId, String, String)>,
}

impl Tables {
    fn next_person_seq(&self) -> i64 {
        self.persons.iter().map(|p| p.seq).max().unwrap_or(0) + 1
    }

    fn add_person(&mut self, name: &str, email: &str, phone: Option<&str>) -> i64 {
        let seq = self.next_person_seq();
        self.persons.push(PersonRecord {
            seq,
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.map(String::from),
        });
        seq
    }

    fn add_account(&mut self, account: Account, password: &str) -> Result<()> {
        let login_id = account.login_id.to_lowercase();
        if self
            .accounts
            .iter()
            .any(|r| r.account.login_id.to_lowercase() == login_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: LOGIN_ID_INDEX.to_string(),
            });
        }

        self.accounts.push(AccountRecord {
            account,
            password_hash: hash_password(password, &uuid::Uuid::new_v4().simple().to_string()),
        });
        Ok(())
    }

    fn add_choice(&mut self, choice: ChoiceResult) -> Result<()> {
        if choice.paid == Flag::No
            && self
                .choices
                .iter()
                .any(|c| c.account == choice.account && c.paid == Flag::No)
        {
            return Err(StoreError::UniqueViolation {
                constraint: UNPAID_CHOICE_INDEX.to_string(),
            });
        }
        if self
            .choices
            .iter()
            .any(|c| c.account == choice.account && c.seq == choice.seq)
        {
            return Err(StoreError::UniqueViolation {
                constraint: "choice_result_pkey".to_string(),
            });
        }

        self.choices.push(choice);
        Ok(())
    }

    fn accounts_of_persons(&self, matches: impl Fn(&PersonRecord) -> bool) -> Vec<Account> {
        let seqs: Vec<i64> = self
            .persons
            .iter()
            .filter(|p| matches(p))
            .map(|p| p.seq)
            .collect();

        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .filter(|r| seqs.contains(&r.account.person_seq))
            .map(|r| r.account.clone())
            .collect();
        accounts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.login_id.cmp(&b.login_id))
        });
        accounts
    }

    fn progress_of(&self, account: &AccountId, seq: i64) -> Option<&AnswerProgress> {
        self.progress
            .iter()
            .find(|p| &p.account == account && p.seq == seq)
    }

    fn product(&self, code: Option<i64>) -> Option<&Product> {
        code.and_then(|code| self.products.iter().find(|p| p.code == code))
    }
}

fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("sha256${salt}${}", hex::encode(hasher.finalize()))
}

fn password_matches(hash: &str, password: &str) -> bool {
    hash.split('$')
        .nth(1)
        .is_some_and(|salt| hash_password(password, salt) == hash)
}

async fn trip(failures: &Mutex<Vec<FailPoint>>, point: FailPoint) -> Result<()> {
    let mut failures = failures.lock().await;
    if let Some(index) = failures.iter().position(|p| *p == point) {
        failures.remove(index);
        return Err(StoreError::Database(format!("injected failure at {point:?}")));
    }
    Ok(())
}

/// In-memory `Store` for tests.
#[derive(Clone, Default)]
pub struct FixtureDataSource {
    tables: Arc<Mutex<Tables>>,
    failures: Arc<Mutex<Vec<FailPoint>>>,
}

impl FixtureDataSource {
    /// Create an empty data source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call at `point` fail with a database error.
    pub async fn fail_next(&self, point: FailPoint) {
        self.failures.lock().await.push(point);
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Insert a person and return its sequence.
    pub async fn seed_person(&self, name: &str, email: &str) -> i64 {
        self.tables.lock().await.add_person(name, email, None)
    }

    /// Insert a person with a phone number and return its sequence.
    pub async fn seed_person_with_phone(&self, name: &str, email: &str, phone: &str) -> i64 {
        self.tables.lock().await.add_person(name, email, Some(phone))
    }

    /// Insert an account with the given password.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` if the login id is taken.
    pub async fn seed_account(&self, account: &Account, password: &str) -> Result<()> {
        self.tables
            .lock()
            .await
            .add_account(account.clone(), password)
    }

    /// Insert a product.
    pub async fn seed_product(&self, product: Product) {
        self.tables.lock().await.products.push(product);
    }

    /// Insert an institute.
    pub async fn seed_institute(&self, ins_seq: i64, name: &str) {
        self.tables
            .lock()
            .await
            .institutes
            .push((ins_seq, name.to_string()));
    }

    /// Insert an institute turn.
    pub async fn seed_turn(&self, turn: TurnSeed) {
        self.tables.lock().await.turns.push(turn);
    }

    /// Add a person to an institute turn.
    pub async fn seed_member(&self, pe_seq: i64, institute: InstituteRef, join_date: DateTime<Utc>) {
        self.tables.lock().await.members.push(MemberRecord {
            pe_seq,
            institute,
            join_date,
        });
    }

    /// Insert a choice result.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` on a second unpaid row or a taken sequence.
    pub async fn seed_choice(&self, choice: ChoiceResult) -> Result<()> {
        self.tables.lock().await.add_choice(choice)
    }

    /// Insert an answer progress row.
    pub async fn seed_progress(&self, progress: AnswerProgress) {
        self.tables.lock().await.progress.push(progress);
    }

    /// Insert a payment row as-is.
    pub async fn seed_payment(&self, payment: Payment) {
        self.tables.lock().await.payments.push(payment);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every payment row.
    pub async fn payments(&self) -> Vec<Payment> {
        self.tables.lock().await.payments.clone()
    }

    /// Every payment log row, in insertion order.
    pub async fn payment_logs(&self) -> Vec<PaymentLogEntry> {
        self.tables.lock().await.payment_logs.clone()
    }

    /// Choice results of one account, by sequence.
    pub async fn choices_for(&self, account: &AccountId) -> Vec<ChoiceResult> {
        let mut choices: Vec<ChoiceResult> = self
            .tables
            .lock()
            .await
            .choices
            .iter()
            .filter(|c| &c.account == account)
            .cloned()
            .collect();
        choices.sort_by_key(|c| c.seq);
        choices
    }

    /// Every account row.
    pub async fn accounts(&self) -> Vec<Account> {
        self.tables
            .lock()
            .await
            .accounts
            .iter()
            .map(|r| r.account.clone())
            .collect()
    }

    /// Number of person rows.
    pub async fn person_count(&self) -> usize {
        self.tables.lock().await.persons.len()
    }

    /// Number of login log rows.
    pub async fn login_log_count(&self) -> usize {
        self.tables.lock().await.login_logs.len()
    }

    /// Number of account log rows.
    pub async fn account_log_count(&self) -> usize {
        self.tables.lock().await.account_logs.len()
    }

    /// Whether `password` matches the stored hash of `login_id`.
    pub async fn password_matches(&self, login_id: &str, password: &str) -> bool {
        let login_id = login_id.to_lowercase();
        self.tables.lock().await.accounts.iter().any(|r| {
            r.account.login_id.to_lowercase() == login_id
                && password_matches(&r.password_hash, password)
        })
    }
}

#[async_trait]
impl Store for FixtureDataSource {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(FixtureUnitOfWork {
            guard,
            working,
            failures: Arc::clone(&self.failures),
        }))
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .iter()
            .find(|r| &r.account.id == id)
            .map(|r| r.account.clone()))
    }

    async fn find_account_by_login_id(&self, login_id: &str) -> Result<Option<Account>> {
        let login_id = login_id.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .iter()
            .find(|r| r.account.login_id.to_lowercase() == login_id)
            .map(|r| r.account.clone()))
    }

    async fn find_accounts_by_email(&self, email: &str) -> Result<Vec<Account>> {
        let email = email.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables.accounts_of_persons(|p| p.email.to_lowercase() == email))
    }

    async fn find_accounts_by_person_name(&self, name: &str) -> Result<Vec<Account>> {
        let tables = self.tables.lock().await;
        Ok(tables.accounts_of_persons(|p| p.name == name))
    }

    async fn login_id_exists(&self, login_id: &str) -> Result<bool> {
        Ok(self.find_account_by_login_id(login_id).await?.is_some())
    }

    async fn latest_choice(&self, account: &AccountId) -> Result<Option<LatestChoice>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .choices
            .iter()
            .filter(|c| &c.account == account)
            .max_by_key(|c| c.seq)
            .map(|c| LatestChoice {
                seq: c.seq,
                paid: c.paid,
                kind: c.kind.clone(),
                done: tables
                    .progress_of(account, c.seq)
                    .map_or(DoneState::Running, |p| p.done),
            }))
    }

    async fn list_tests(&self, account: &AccountId) -> Result<Vec<TestRow>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<TestRow> = tables
            .choices
            .iter()
            .filter(|c| &c.account == account)
            .map(|c| {
                let progress = tables.progress_of(account, c.seq);
                TestRow {
                    seq: c.seq,
                    product_code: c.product_code,
                    product_name: tables.product(c.product_code).map(|p| p.name.clone()),
                    kind: c.kind.clone(),
                    price: c.price,
                    paid: c.paid,
                    paid_at: c.paid_at,
                    started_at: progress.and_then(|p| p.started_at),
                    ended_at: progress.and_then(|p| p.ended_at),
                    done: progress.map_or(DoneState::Running, |p| p.done),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(rows)
    }

    async fn get_institute_info(&self, institute: &InstituteRef) -> Result<Option<InstituteInfo>> {
        let tables = self.tables.lock().await;
        let Some((_, ins_name)) = tables
            .institutes
            .iter()
            .find(|(seq, _)| *seq == institute.ins_seq)
        else {
            return Ok(None);
        };

        Ok(tables
            .turns
            .iter()
            .find(|t| t.ins_seq == institute.ins_seq && t.tur_seq == institute.tur_seq)
            .map(|t| InstituteInfo {
                ins_seq: t.ins_seq,
                ins_name: ins_name.clone(),
                tur_seq: t.tur_seq,
                tur_code: t.code.clone(),
                tur_use: t.usable,
                tur_req_sum: t.requested,
                tur_use_sum: t.used,
            }))
    }

    async fn list_members(&self, institute: &InstituteRef) -> Result<Vec<Member>> {
        let tables = self.tables.lock().await;
        let mut members: Vec<Member> = tables
            .members
            .iter()
            .filter(|m| &m.institute == institute)
            .filter_map(|m| {
                tables
                    .persons
                    .iter()
                    .find(|p| p.seq == m.pe_seq)
                    .map(|p| Member {
                        pe_seq: p.seq,
                        name: p.name.clone(),
                        email: p.email.clone(),
                        phone: p.phone.clone(),
                        join_date: m.join_date,
                    })
            })
            .collect();
        members.sort_by(|a, b| b.join_date.cmp(&a.join_date));
        Ok(members)
    }

    async fn find_turn_by_code(&self, code: &str) -> Result<Option<TurnLookup>> {
        let tables = self.tables.lock().await;
        Ok(tables.turns.iter().find(|t| t.code == code).and_then(|t| {
            tables
                .institutes
                .iter()
                .find(|(seq, _)| *seq == t.ins_seq)
                .map(|(_, name)| TurnLookup {
                    ins_seq: t.ins_seq,
                    tur_seq: t.tur_seq,
                    institute_name: name.clone(),
                    usable: t.usable,
                })
        }))
    }

    async fn list_products(&self, product_type: ProductType) -> Result<Vec<Product>> {
        let tables = self.tables.lock().await;
        let mut products: Vec<Product> = tables
            .products
            .iter()
            .filter(|p| p.active && p.product_type == product_type)
            .cloned()
            .collect();
        products.sort_by_key(|p| (p.price, p.code));
        Ok(products)
    }

    async fn get_product(&self, code: i64) -> Result<Option<Product>> {
        let tables = self.tables.lock().await;
        Ok(tables.product(Some(code)).cloned())
    }

    async fn get_choice_detail(
        &self,
        account: &AccountId,
        seq: i64,
    ) -> Result<Option<ChoiceDetail>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .choices
            .iter()
            .find(|c| &c.account == account && c.seq == seq)
            .map(|c| {
                let product = tables.product(c.product_code);
                ChoiceDetail {
                    seq: c.seq,
                    order_name: product.map_or_else(|| c.kind.clone(), |p| p.name.clone()),
                    amount: product.map_or(c.price, |p| p.price),
                    kind: c.kind.clone(),
                }
            }))
    }

    async fn get_payment(&self, order_id: &str) -> Result<Option<Payment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn payment_exists(&self, order_id: &str) -> Result<bool> {
        Ok(self.get_payment(order_id).await?.is_some())
    }

    async fn record_login_event(&self, account: &AccountId, event: &str) -> Result<()> {
        trip(&self.failures, FailPoint::LoginEvent).await?;
        self.tables
            .lock()
            .await
            .login_logs
            .push((*account, event.to_string()));
        Ok(())
    }

    async fn record_account_action(
        &self,
        account: &AccountId,
        action: &str,
        detail: &str,
    ) -> Result<()> {
        trip(&self.failures, FailPoint::AccountAction).await?;
        self.tables.lock().await.account_logs.push((
            *account,
            action.to_string(),
            detail.to_string(),
        ));
        Ok(())
    }
}

/// A unit of work over a private copy of the fixture tables.
pub struct FixtureUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    failures: Arc<Mutex<Vec<FailPoint>>>,
}

#[async_trait]
impl UnitOfWork for FixtureUnitOfWork {
    async fn lock_account(&mut self, _account: &AccountId) -> Result<()> {
        // The table guard already serializes units of work.
        Ok(())
    }

    async fn find_unpaid_choice(&mut self, account: &AccountId) -> Result<Option<i64>> {
        Ok(self
            .working
            .choices
            .iter()
            .filter(|c| &c.account == account && c.paid == Flag::No)
            .map(|c| c.seq)
            .min())
    }

    async fn next_choice_seq(&mut self, account: &AccountId) -> Result<i64> {
        Ok(self
            .working
            .choices
            .iter()
            .filter(|c| &c.account == account)
            .map(|c| c.seq)
            .max()
            .unwrap_or(0)
            + 1)
    }

    async fn insert_choice(
        &mut self,
        account: &AccountId,
        seq: i64,
        selection: &ProductSelection,
        order_id: Option<&str>,
    ) -> Result<()> {
        trip(&self.failures, FailPoint::InsertChoice).await?;
        self.working.add_choice(ChoiceResult {
            account: *account,
            seq,
            product_code: selection.product_code,
            kind: selection.kind.clone(),
            price: selection.price,
            paid: Flag::No,
            paid_at: None,
            order_id: order_id.map(String::from),
            created_at: Utc::now(),
        })
    }

    async fn update_choice_selection(
        &mut self,
        account: &AccountId,
        seq: i64,
        selection: &ProductSelection,
        order_id: &str,
    ) -> Result<()> {
        let choice = self
            .working
            .choices
            .iter_mut()
            .find(|c| &c.account == account && c.seq == seq && c.paid == Flag::No)
            .ok_or(StoreError::NotFound)?;

        choice.product_code = selection.product_code;
        choice.kind.clone_from(&selection.kind);
        choice.price = selection.price;
        choice.order_id = Some(order_id.to_string());
        Ok(())
    }

    async fn mark_choice_paid(
        &mut self,
        account: &AccountId,
        seq: i64,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        trip(&self.failures, FailPoint::MarkChoicePaid).await?;
        let Some(choice) = self
            .working
            .choices
            .iter_mut()
            .find(|c| &c.account == account && c.seq == seq && c.paid == Flag::No)
        else {
            return Ok(false);
        };

        choice.paid = Flag::Yes;
        choice.paid_at = Some(paid_at);
        Ok(true)
    }

    async fn get_payment(&mut self, order_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> Result<()> {
        trip(&self.failures, FailPoint::InsertPayment).await?;
        if self
            .working
            .payments
            .iter()
            .any(|p| p.order_id == payment.order_id.as_str())
        {
            return Err(StoreError::UniqueViolation {
                constraint: "payment_pkey".to_string(),
            });
        }

        let now = Utc::now();
        self.working.payments.push(Payment {
            order_id: payment.order_id.as_str().to_string(),
            account: payment.account,
            choice_seq: payment.choice_seq,
            amount: payment.amount,
            order_name: payment.order_name.clone(),
            status: PaymentStatus::Ready,
            method: Some(payment.method.clone()),
            payment_key: None,
            fail_reason: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    async fn mark_payment_done(
        &mut self,
        order_id: &str,
        approval: &PaymentApproval,
    ) -> Result<bool> {
        trip(&self.failures, FailPoint::MarkPaymentDone).await?;
        let Some(payment) = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.order_id == order_id && p.status == PaymentStatus::Ready)
        else {
            return Ok(false);
        };

        payment.status = PaymentStatus::Done;
        payment.payment_key = Some(approval.payment_key.clone());
        if approval.method.is_some() {
            payment.method.clone_from(&approval.method);
        }
        payment.approved_at = Some(approval.approved_at);
        payment.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_payment_failed(
        &mut self,
        order_id: &str,
        reason: &str,
        payment_key: Option<&str>,
        expected: Option<PaymentStatus>,
    ) -> Result<bool> {
        let Some(payment) = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.order_id == order_id && expected.map_or(true, |s| p.status == s))
        else {
            return Ok(false);
        };

        payment.status = PaymentStatus::Failed;
        payment.fail_reason = Some(reason.to_string());
        if let Some(key) = payment_key {
            payment.payment_key = Some(key.to_string());
        }
        payment.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_payment_log(&mut self, entry: &PaymentLogEntry) -> Result<()> {
        trip(&self.failures, FailPoint::AppendPaymentLog).await?;
        self.working.payment_logs.push(entry.clone());
        Ok(())
    }

    async fn insert_person(&mut self, person: &NewPerson) -> Result<i64> {
        trip(&self.failures, FailPoint::InsertPerson).await?;
        Ok(self
            .working
            .add_person(&person.name, &person.email, Some(&person.phone)))
    }

    async fn insert_account(&mut self, account: &NewAccount) -> Result<()> {
        trip(&self.failures, FailPoint::InsertAccount).await?;
        self.working.add_account(
            Account {
                id: account.id,
                login_id: account.login_id.clone(),
                person_seq: account.person_seq,
                active: true,
                expires_at: account.expires_at,
                institute: account.institute,
                created_at: Utc::now(),
            },
            &account.password,
        )
    }

    async fn list_all_products(&mut self) -> Result<Vec<Product>> {
        let mut products = self.working.products.clone();
        products.sort_by_key(|p| p.code);
        Ok(products)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        trip(&self.failures, FailPoint::Commit).await?;
        let Self {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
