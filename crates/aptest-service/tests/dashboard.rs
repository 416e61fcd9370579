//! Dashboard and identity resolution integration tests.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::TestHarness;
use serde_json::Value;

use aptest_core::{DoneState, Flag};

// ============================================================================
// Identity Resolution
// ============================================================================

#[tokio::test]
async fn every_identity_form_reaches_the_same_dashboard() {
    let harness = TestHarness::with_config(|c| c.allow_name_fallback = true).await;
    let account = harness
        .seed_account("testuser", "홍길동", "hong@example.com")
        .await;
    harness.seed_choice(&account.id, 1, "basic", Flag::Yes).await;

    let raw_id = account.id.to_string();
    let sessions = [
        TestHarness::claims(Some("testuser"), None, None, None),
        TestHarness::claims(None, Some(&raw_id), None, None),
        TestHarness::claims(None, None, Some("hong@example.com"), None),
        TestHarness::claims(None, None, None, Some("홍길동")),
    ];

    for claims in &sessions {
        let (name, value) = TestHarness::auth(claims);
        let response = harness.server.get("/dashboard").add_header(name, value).await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["tests"][0]["cr_seq"], 1, "{claims:?}");
    }
}

#[tokio::test]
async fn inactive_account_is_not_found_for_every_form() {
    let harness = TestHarness::with_config(|c| c.allow_name_fallback = true).await;
    let account = harness
        .seed_account_with("dormant", "김휴면", "dormant@example.com", false, None)
        .await;

    let raw_id = account.id.to_string();
    let sessions = [
        TestHarness::claims(Some("dormant"), None, None, None),
        TestHarness::claims(None, Some(&raw_id), None, None),
        TestHarness::claims(None, None, Some("dormant@example.com"), None),
        TestHarness::claims(None, None, None, Some("김휴면")),
    ];

    for claims in &sessions {
        let (name, value) = TestHarness::auth(claims);
        let response = harness.server.get("/dashboard").add_header(name, value).await;

        response.assert_status_not_found();
    }
}

#[tokio::test]
async fn dashboard_without_session_is_unauthorized() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/dashboard").await;

    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn malformed_raw_id_is_bad_request() {
    let harness = TestHarness::new().await;

    let (name, value) = TestHarness::auth(&TestHarness::claims(None, Some("42"), None, None));
    let response = harness.server.get("/dashboard").add_header(name, value).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Personal Dashboard
// ============================================================================

#[tokio::test]
async fn empty_dashboard_uses_defaults() {
    let harness = TestHarness::new().await;
    harness
        .seed_account("newbie", "이신입", "newbie@example.com")
        .await;

    let (name, value) = TestHarness::auth_for("newbie");
    let response = harness.server.get("/dashboard").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(
        body["accountStatus"],
        serde_json::json!({ "paid": "N", "kind": "", "expired": "N", "state": "R" })
    );
    assert_eq!(body["tests"], serde_json::json!([]));
    assert_eq!(body["completedTests"], 0);
}

#[tokio::test]
async fn dashboard_lists_tests_with_review_codes() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account("testuser", "홍길동", "hong@example.com")
        .await;
    harness.seed_choice(&account.id, 1, "basic", Flag::Yes).await;
    harness.seed_progress(&account.id, 1, DoneState::Ended).await;
    harness.seed_choice(&account.id, 2, "premium", Flag::Yes).await;
    harness.seed_progress(&account.id, 2, DoneState::Ended).await;
    harness.seed_choice(&account.id, 3, "premium", Flag::No).await;

    let (name, value) = TestHarness::auth_for("testuser");
    let response = harness.server.get("/dashboard").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["completedTests"], 2);
    assert_eq!(body["accountStatus"]["cr_seq"], 3);
    assert_eq!(body["accountStatus"]["paid"], "N");
    assert_eq!(body["accountStatus"]["kind"], "premium");

    let tests = body["tests"].as_array().unwrap();
    let review = |seq: i64| {
        tests
            .iter()
            .find(|t| t["cr_seq"] == seq)
            .map(|t| t["review"].clone())
            .unwrap()
    };
    assert_eq!(review(1), "Y");
    assert_eq!(review(2), "P");
    assert_eq!(review(3), "N");
}

#[tokio::test]
async fn expired_basic_test_is_marked_expired() {
    let harness = TestHarness::new().await;
    let person_seq = harness.store.seed_person("박만료", "old@example.com").await;
    let account = aptest_core::Account {
        id: aptest_core::AccountId::generate(),
        login_id: "olduser".into(),
        person_seq,
        active: true,
        expires_at: Some(Utc::now() - chrono::Duration::days(1)),
        institute: None,
        created_at: Utc::now(),
    };
    harness.store.seed_account(&account, "pw").await.unwrap();
    harness.seed_choice(&account.id, 1, "basic", Flag::Yes).await;
    harness.seed_progress(&account.id, 1, DoneState::Ended).await;

    let (name, value) = TestHarness::auth_for("olduser");
    let response = harness.server.get("/dashboard").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["accountStatus"]["expired"], "Y");
    assert_eq!(body["tests"][0]["review"], "E");
}

#[tokio::test]
async fn sequences_beyond_double_precision_are_strings() {
    let harness = TestHarness::new().await;
    let account = harness
        .seed_account("testuser", "홍길동", "hong@example.com")
        .await;
    let big: i64 = 9_007_199_254_740_993;
    harness.seed_choice(&account.id, big, "basic", Flag::Yes).await;

    let (name, value) = TestHarness::auth_for("testuser");
    let response = harness.server.get("/dashboard").add_header(name, value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tests"][0]["cr_seq"], "9007199254740993");
    assert_eq!(body["accountStatus"]["cr_seq"], "9007199254740993");
    assert_eq!(body["completedTests"], 0);
}

// ============================================================================
// Organization Dashboard
// ============================================================================

#[tokio::test]
async fn organization_dashboard_includes_institute_and_members() {
    let harness = TestHarness::new().await;
    let institute = harness.seed_institute("한빛고등학교", "HANBIT01", true).await;
    let account = harness
        .seed_account_with(
            "teacher1",
            "최교사",
            "teacher@example.com",
            true,
            Some(institute),
        )
        .await;

    let early = harness.store.seed_person("학생A", "a@example.com").await;
    let late = harness.store.seed_person("학생B", "b@example.com").await;
    harness
        .store
        .seed_member(early, institute, Utc::now() - chrono::Duration::days(3))
        .await;
    harness.store.seed_member(late, institute, Utc::now()).await;
    harness.seed_choice(&account.id, 1, "basic", Flag::No).await;

    let (name, value) = TestHarness::auth_for("teacher1");
    let response = harness
        .server
        .get("/dashboard/organization")
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["isOrganization"], true);
    assert_eq!(body["instituteInfo"]["insName"], "한빛고등학교");
    assert_eq!(body["instituteInfo"]["turCode"], "HANBIT01");
    assert_eq!(body["members"][0]["name"], "학생B");
    assert_eq!(body["members"][1]["name"], "학생A");
    assert_eq!(body["tests"][0]["cr_seq"], 1);
}

#[tokio::test]
async fn personal_account_is_forbidden_from_organization_dashboard() {
    let harness = TestHarness::new().await;
    harness
        .seed_account("testuser", "홍길동", "hong@example.com")
        .await;

    let (name, value) = TestHarness::auth_for("testuser");
    let response = harness
        .server
        .get("/dashboard/organization")
        .add_header(name, value)
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_institute_row_is_not_found() {
    let harness = TestHarness::new().await;
    let orphan = aptest_core::InstituteRef {
        ins_seq: 99,
        tur_seq: 1,
    };
    harness
        .seed_account_with("teacher2", "정교사", "t2@example.com", true, Some(orphan))
        .await;

    let (name, value) = TestHarness::auth_for("teacher2");
    let response = harness
        .server
        .get("/dashboard/organization")
        .add_header(name, value)
        .await;

    response.assert_status_not_found();
}
