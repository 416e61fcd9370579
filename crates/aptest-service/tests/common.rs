//! Common test utilities for aptest integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use wiremock::MockServer;

use aptest_core::{
    Account, AccountId, AnswerProgress, ChoiceResult, DoneState, Flag, InstituteRef, Product,
    ProductType,
};
use aptest_service::auth::SessionClaims;
use aptest_service::{create_router, AppState, ServiceConfig};
use aptest_store::{FixtureDataSource, TurnSeed};

pub const TEST_SECRET: &str = "integration-session-secret";
pub const CONFIRM_PATH: &str = "/v1/payments/confirm";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for seeding and inspection.
    pub store: FixtureDataSource,
    /// Stand-in for the Toss confirm API.
    pub gateway: MockServer,
}

impl TestHarness {
    /// Create a harness with an empty store and no name fallback.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a harness, adjusting the config before the router is built.
    pub async fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let gateway = MockServer::start().await;
        let store = FixtureDataSource::new();

        let mut config = ServiceConfig {
            session_secret: TEST_SECRET.into(),
            toss_secret_key: "test_sk_integration".into(),
            toss_confirm_url: format!("{}{CONFIRM_PATH}", gateway.uri()),
            gateway_timeout_seconds: 1,
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let state = AppState::new(Arc::new(store.clone()), config).expect("Failed to build state");
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        Self {
            server,
            store,
            gateway,
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Sign a session token with the given claims.
    pub fn token(claims: &SessionClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("Failed to sign token")
    }

    /// Claims carrying only the given fields, valid for an hour.
    pub fn claims(
        sub: Option<&str>,
        id: Option<&str>,
        email: Option<&str>,
        name: Option<&str>,
    ) -> SessionClaims {
        SessionClaims {
            sub: sub.map(String::from),
            id: id.map(String::from),
            email: email.map(String::from),
            name: name.map(String::from),
            exp: u64::try_from((Utc::now() + Duration::hours(1)).timestamp()).unwrap(),
        }
    }

    /// Authorization header for a provider user id.
    pub fn auth_for(login_id: &str) -> (HeaderName, HeaderValue) {
        Self::auth(&Self::claims(Some(login_id), None, None, None))
    }

    /// Authorization header for arbitrary claims.
    pub fn auth(claims: &SessionClaims) -> (HeaderName, HeaderValue) {
        let value = format!("Bearer {}", Self::token(claims));
        (
            header::AUTHORIZATION,
            HeaderValue::from_str(&value).expect("Invalid header value"),
        )
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Seed an active personal account for a new person.
    pub async fn seed_account(&self, login_id: &str, name: &str, email: &str) -> Account {
        self.seed_account_with(login_id, name, email, true, None).await
    }

    /// Seed an account with explicit flags.
    pub async fn seed_account_with(
        &self,
        login_id: &str,
        name: &str,
        email: &str,
        active: bool,
        institute: Option<InstituteRef>,
    ) -> Account {
        let person_seq = self.store.seed_person(name, email).await;
        let account = Account {
            id: AccountId::generate(),
            login_id: login_id.into(),
            person_seq,
            active,
            expires_at: Some(Utc::now() + Duration::days(30)),
            institute,
            created_at: Utc::now(),
        };
        self.store
            .seed_account(&account, "password")
            .await
            .expect("Failed to seed account");
        account
    }

    /// Seed the standard catalog: free basic, premium, and an institutional test.
    pub async fn seed_catalog(&self) {
        for (code, name, kind, price, product_type) in [
            (1, "기본 적성검사", "basic", 0, ProductType::Personal),
            (2, "프리미엄 적성검사", "premium", 30_000, ProductType::Personal),
            (3, "기관 적성검사", "basic", 0, ProductType::Institutional),
        ] {
            self.store
                .seed_product(Product {
                    code,
                    name: name.into(),
                    kind: kind.into(),
                    price,
                    product_type,
                    active: true,
                })
                .await;
        }
    }

    /// Seed a choice result.
    pub async fn seed_choice(&self, account: &AccountId, seq: i64, kind: &str, paid: Flag) {
        self.store
            .seed_choice(ChoiceResult {
                account: *account,
                seq,
                product_code: None,
                kind: kind.into(),
                price: 0,
                paid,
                paid_at: None,
                order_id: None,
                created_at: Utc::now(),
            })
            .await
            .expect("Failed to seed choice");
    }

    /// Seed answer progress for a choice result.
    pub async fn seed_progress(&self, account: &AccountId, seq: i64, done: DoneState) {
        self.store
            .seed_progress(AnswerProgress {
                account: *account,
                seq,
                started_at: Some(Utc::now() - Duration::hours(1)),
                ended_at: (done == DoneState::Ended).then(Utc::now),
                done,
            })
            .await;
    }

    /// Seed an institute with one turn and return the reference to it.
    pub async fn seed_institute(&self, name: &str, code: &str, usable: bool) -> InstituteRef {
        let institute = InstituteRef {
            ins_seq: 10,
            tur_seq: 1,
        };
        self.store.seed_institute(institute.ins_seq, name).await;
        self.store
            .seed_turn(TurnSeed {
                ins_seq: institute.ins_seq,
                tur_seq: institute.tur_seq,
                code: code.into(),
                usable,
                requested: 30,
                used: 2,
            })
            .await;
        institute
    }
}
