//! Catalog, payment info, session code and health integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};

use aptest_core::Flag;

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_check_returns_ok() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "aptest");
}

// ============================================================================
// Products
// ============================================================================

#[tokio::test]
async fn personal_accounts_see_personal_products_cheapest_first() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    harness
        .seed_account("testuser", "홍길동", "hong@example.com")
        .await;

    let (name, value) = TestHarness::auth_for("testuser");
    let response = harness.server.get("/products").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    let products = body["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["code"], 1);
    assert_eq!(products[1]["code"], 2);
    assert_eq!(products[1]["productType"], "P");
}

#[tokio::test]
async fn institutional_accounts_see_institutional_products() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    let institute = harness.seed_institute("한빛고등학교", "HANBIT01", true).await;
    harness
        .seed_account_with("teacher1", "최교사", "t@example.com", true, Some(institute))
        .await;

    let (name, value) = TestHarness::auth_for("teacher1");
    let response = harness.server.get("/products").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["products"].as_array().unwrap().len(), 1);
    assert_eq!(body["products"][0]["productType"], "I");
}

#[tokio::test]
async fn unresolved_session_sees_personal_products() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;

    let (name, value) = TestHarness::auth_for("nobody");
    let response = harness.server.get("/products").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["products"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn products_require_a_session() {
    let harness = TestHarness::new().await;

    harness.server.get("/products").await.assert_status_unauthorized();
}

// ============================================================================
// Payment Info
// ============================================================================

#[tokio::test]
async fn payment_info_describes_the_choice() {
    let harness = TestHarness::new().await;
    harness.seed_catalog().await;
    let account = harness
        .seed_account("testuser", "홍길동", "hong@example.com")
        .await;
    harness
        .store
        .seed_choice(aptest_core::ChoiceResult {
            account: account.id,
            seq: 1,
            product_code: Some(2),
            kind: "premium".into(),
            price: 30_000,
            paid: Flag::No,
            paid_at: None,
            order_id: None,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let (name, value) = TestHarness::auth_for("testuser");
    let response = harness
        .server
        .get("/payment/info")
        .add_query_param("cr_seq", 1)
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["cr_seq"], 1);
    assert_eq!(body["orderName"], "프리미엄 적성검사");
    assert_eq!(body["amount"], 30000);
    assert_eq!(body["productType"], "premium");
}

#[tokio::test]
async fn payment_info_validates_cr_seq() {
    let harness = TestHarness::new().await;
    harness
        .seed_account("testuser", "홍길동", "hong@example.com")
        .await;

    let (name, value) = TestHarness::auth_for("testuser");
    let missing = harness
        .server
        .get("/payment/info")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

    let invalid = harness
        .server
        .get("/payment/info")
        .add_query_param("cr_seq", "abc")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

    let absent = harness
        .server
        .get("/payment/info")
        .add_query_param("cr_seq", 7)
        .add_header(name, value)
        .await;
    absent.assert_status_not_found();
}

// ============================================================================
// Session Codes
// ============================================================================

#[tokio::test]
async fn valid_session_code_names_the_institute() {
    let harness = TestHarness::new().await;
    harness.seed_institute("한빛고등학교", "HANBIT01", true).await;

    let response = harness
        .server
        .post("/verify-session-code")
        .json(&json!({ "code": "HANBIT01" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["valid"], true);
    assert_eq!(body["instituteName"], "한빛고등학교");
    assert_eq!(body["insSeq"], 10);
    assert_eq!(body["turSeq"], 1);
}

#[tokio::test]
async fn session_code_errors() {
    let harness = TestHarness::new().await;
    harness.seed_institute("한빛고등학교", "CLOSED01", false).await;

    let missing = harness
        .server
        .post("/verify-session-code")
        .json(&json!({}))
        .await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

    let unknown = harness
        .server
        .post("/verify-session-code")
        .json(&json!({ "code": "NOPE" }))
        .await;
    unknown.assert_status_not_found();

    let closed = harness
        .server
        .post("/verify-session-code")
        .json(&json!({ "code": "CLOSED01" }))
        .await;
    assert_eq!(closed.status_code(), StatusCode::FORBIDDEN);

    let wrong_type = harness
        .server
        .post("/verify-session-code")
        .json(&json!({ "code": 1234 }))
        .await;
    assert_eq!(wrong_type.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = wrong_type.json();
    assert_eq!(body["error"]["code"], "bad_request");
}
