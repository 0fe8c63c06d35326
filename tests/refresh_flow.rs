mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{Harness, json_body, set_cookie};
use sso_orchestrator::{Platform, SessionStore};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn refresh_rotates_tokens_in_place() {
    let harness = Harness::start().await;
    let before = harness.seed_authenticated("sess-1", Platform::Mobile).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-2",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt-2"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = harness
        .get("/refresh-token", Some("sso_session=sess-1; sso_access_token=at-1"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie(&response, "sso_access_token").as_deref(), Some("at-2"));
    let body = json_body(response).await;
    assert_eq!(body["access_token"], "at-2");
    assert_eq!(body["expires_in"], 3600);

    let after = harness.record(&before.id).await.unwrap();
    assert_eq!(after.access_token, "at-2");
    assert_eq!(after.refresh_token, "rt-2");
    // Omitted by the server, so kept.
    assert_eq!(after.id_token, "it-1");
    assert_eq!(after.subject_id, before.subject_id);
    assert_eq!(after.platform, Platform::Mobile);
    assert_eq!(after.csrf_state(), before.csrf_state());
}

#[tokio::test]
async fn refresh_accepts_bearer_header() {
    let harness = Harness::start().await;
    harness.seed_authenticated("sess-1", Platform::Web).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "at-2" })),
        )
        .expect(1)
        .mount(&harness.server)
        .await;

    let request = axum::http::Request::builder()
        .uri("/refresh-token")
        .header("cookie", "sso_session=sess-1")
        .header("authorization", "Bearer at-1")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn foreign_access_token_is_rejected_without_remote_call() {
    let harness = Harness::start().await;
    let before = harness.seed_authenticated("sess-1", Platform::Web).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let response = harness
        .get("/refresh-token", Some("sso_session=sess-1; sso_access_token=stolen"))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "token_mismatch");
    assert_eq!(harness.record(&before.id).await.unwrap(), before);
}

#[tokio::test]
async fn missing_access_token_is_rejected() {
    let harness = Harness::start().await;
    harness.seed_authenticated("sess-1", Platform::Web).await;

    let response = harness.get("/refresh-token", Some("sso_session=sess-1")).await;
    let body = json_body(response).await;
    assert_eq!(body["code"], "token_mismatch");
}

#[tokio::test]
async fn failed_refresh_leaves_record_untouched() {
    let harness = Harness::start().await;
    let before = harness.seed_authenticated("sess-1", Platform::Web).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({ "error": "invalid_grant" })),
        )
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = harness
        .get("/refresh-token", Some("sso_session=sess-1; sso_access_token=at-1"))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "refresh_failed");
    assert_eq!(harness.record(&before.id).await.unwrap(), before);
}

#[tokio::test]
async fn session_without_refresh_token_fails_locally() {
    let harness = Harness::start().await;
    let mut record = harness.seed_authenticated("sess-1", Platform::Web).await;
    record.refresh_token.clear();
    record.sso = true;
    harness
        .store
        .set(&record, Duration::from_secs(600))
        .await
        .unwrap();
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let response = harness
        .get("/refresh-token", Some("sso_session=sess-1; sso_access_token=at-1"))
        .await;
    let body = json_body(response).await;
    assert_eq!(body["code"], "refresh_failed");
}

#[tokio::test]
async fn unknown_session_must_restart_login() {
    let harness = Harness::start().await;

    let response = harness
        .get("/refresh-token", Some("sso_session=gone; sso_access_token=at-1"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "session_not_found");
}
