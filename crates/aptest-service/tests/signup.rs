//! Personal signup integration tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestHarness;
use serde_json::{json, Value};

use aptest_core::Flag;
use aptest_store::FailPoint;

fn form(login_id: &str) -> Value {
    json!({
        "loginId": login_id,
        "password": "secret-pw",
        "name": "홍길동",
        "email": "hong@example.com",
        "birthDate": "1995.03.07",
        "gender": "남",
        "phone": "010-1234-5678",
        "school": "한빛대학교",
        "major": "컴퓨터공학"
    })
}

#[tokio::test]
async fn signup_creates_person_account_and_default_choice() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;

    let response = harness
        .server
        .post("/signup/personal")
        .json(&form("newuser"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["userId"], "newuser");

    let accounts = harness.store.accounts().await;
    assert_eq!(accounts.len(), 1);
    let account = &accounts[0];
    assert_eq!(body["accountId"], account.id.to_string());
    assert!(account.active);
    assert!(account.institute.is_none());
    let expires_at = account.expires_at.unwrap();
    assert!(expires_at > Utc::now() + Duration::days(364));

    assert_eq!(harness.store.person_count().await, 1);
    assert!(harness.store.password_matches("newuser", "secret-pw").await);

    let choices = harness.store.choices_for(&account.id).await;
    assert_eq!(choices.len(), 1);
    assert_eq!(choices[0].seq, 1);
    assert_eq!(choices[0].paid, Flag::No);
    assert_eq!(choices[0].product_code, Some(1));
    assert_eq!(choices[0].kind, "basic");

    assert_eq!(harness.store.login_log_count().await, 1);
    assert_eq!(harness.store.account_log_count().await, 1);
}

#[tokio::test]
async fn duplicate_login_id_is_rejected_without_writes() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    harness
        .seed_account("testuser", "김기존", "old@example.com")
        .await;

    let response = harness
        .server
        .post("/signup/personal")
        .json(&form("TestUser"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "이미 사용 중인 아이디입니다.");
    assert_eq!(harness.store.accounts().await.len(), 1);
    assert_eq!(harness.store.person_count().await, 1);
    assert_eq!(harness.store.login_log_count().await, 0);
}

#[tokio::test]
async fn invalid_gender_is_rejected() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    let mut body = form("newuser");
    body["gender"] = json!("X");

    let response = harness.server.post("/signup/personal").json(&body).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.store.person_count().await, 0);
}

#[tokio::test]
async fn malformed_birth_date_is_rejected() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    let mut body = form("newuser");
    body["birthDate"] = json!("1995-ab-07");

    let response = harness.server.post("/signup/personal").json(&body).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_json_body_is_bad_request() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;

    let response = harness
        .server
        .post("/signup/personal")
        .text("loginId=newuser&password=secret")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(harness.store.person_count().await, 0);
}

#[tokio::test]
async fn wrong_typed_field_is_bad_request() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    let mut body = form("newuser");
    body["phone"] = json!(1_012_345_678);

    let response = harness.server.post("/signup/personal").json(&body).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(harness.store.accounts().await.is_empty());
}

#[tokio::test]
async fn missing_catalog_is_a_server_error() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/signup/personal")
        .json(&form("newuser"))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.store.accounts().await.is_empty());
    assert_eq!(harness.store.person_count().await, 0);
}

#[tokio::test]
async fn out_of_range_validity_is_a_server_error() {
    let harness = TestHarness::with_config(|c| c.account_validity_days = i64::MAX).await;
    harness.seed_catalog().await;

    let response = harness
        .server
        .post("/signup/personal")
        .json(&form("newuser"))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.store.accounts().await.is_empty());
}

#[tokio::test]
async fn failed_account_insert_rolls_back_the_person() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    harness.store.fail_next(FailPoint::InsertAccount).await;

    let response = harness
        .server
        .post("/signup/personal")
        .json(&form("newuser"))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert!(body["error"]["details"].is_string());
    assert_eq!(harness.store.person_count().await, 0);
    assert!(harness.store.accounts().await.is_empty());
}

#[tokio::test]
async fn audit_log_failure_does_not_fail_signup() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    harness.store.fail_next(FailPoint::LoginEvent).await;
    harness.store.fail_next(FailPoint::AccountAction).await;

    let response = harness
        .server
        .post("/signup/personal")
        .json(&form("newuser"))
        .await;

    response.assert_status_ok();
    assert_eq!(harness.store.accounts().await.len(), 1);
    assert_eq!(harness.store.login_log_count().await, 0);
    assert_eq!(harness.store.account_log_count().await, 0);
}

#[tokio::test]
async fn new_account_can_open_its_dashboard() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    harness
        .server
        .post("/signup/personal")
        .json(&form("newuser"))
        .await
        .assert_status_ok();

    let (name, value) = TestHarness::auth_for("newuser");
    let response = harness.server.get("/dashboard").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["accountStatus"]["kind"], "basic");
    assert_eq!(body["accountStatus"]["paid"], "N");
    assert_eq!(body["tests"][0]["productName"], "기본 적성검사");
}
