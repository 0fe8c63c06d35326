mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    DISPLAY_NAME, EXTERNAL_ID, FakeDirectory, Harness, SUBJECT, active_introspection, json_body,
    location, mount_headless_code, set_cookie,
};
use sso_orchestrator::{AuditEvent, Platform, SessionId, VisitorType};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn exchange_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/sso")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn mount_verify(harness: &Harness, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/token/verify"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1)
        .mount(&harness.server)
        .await;
}

async fn forbid_headless(harness: &Harness) {
    Mock::given(method("GET"))
        .and(path("/oauth2/auth"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.server)
        .await;
}

// ── POST /sso ──────────────────────────────────────────────────────

#[tokio::test]
async fn revoked_external_token_creates_no_session() {
    let harness = Harness::start().await;
    mount_verify(&harness, 401, serde_json::json!({ "error": "token revoked" })).await;
    forbid_headless(&harness).await;

    let response = harness
        .send(exchange_request(serde_json::json!({ "token": "revoked" })))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "external_token_invalid");
    assert!(harness.store.is_empty());
    assert!(harness.audit.events().is_empty());
}

#[tokio::test]
async fn unlinked_identity_is_account_not_found() {
    let harness = Harness::start().await;
    mount_verify(&harness, 200, serde_json::json!({ "external_id": "stranger" })).await;
    forbid_headless(&harness).await;

    let response = harness
        .send(exchange_request(serde_json::json!({ "token": "ext" })))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "account_not_found");
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn disabled_account_is_refused() {
    let mut directory = FakeDirectory::standard();
    for account in directory.accounts.values_mut() {
        account.disabled = true;
    }
    let harness = Harness::with_directory(directory).await;
    mount_verify(&harness, 200, serde_json::json!({ "external_id": EXTERNAL_ID })).await;
    forbid_headless(&harness).await;

    let response = harness
        .send(exchange_request(serde_json::json!({ "token": "ext" })))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "account_disabled");
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn disabled_token_exchange_is_a_configuration_error() {
    let mut directory = FakeDirectory::standard();
    directory.login_config.token_exchange_enabled = false;
    let harness = Harness::with_directory(directory).await;

    let response = harness
        .send(exchange_request(serde_json::json!({ "token": "ext" })))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], "configuration_error");
}

#[tokio::test]
async fn malformed_exchange_body_gets_structured_error() {
    let harness = Harness::start().await;
    forbid_headless(&harness).await;
    let request = Request::builder()
        .method("POST")
        .uri("/sso")
        .header("content-type", "application/json")
        .body(Body::from("{\"platform\": \"web\"}"))
        .unwrap();

    let response = harness.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "invalid_request");
    assert!(body["description"].is_string());
    assert!(body["solution"].is_string());
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn token_exchange_creates_sso_session() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/token/verify"))
        .and(header("authorization", "Bearer ext-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "external_id": EXTERNAL_ID,
            "display_name": "Ada L."
        })))
        .expect(1)
        .mount(&harness.server)
        .await;
    mount_headless_code(&harness.server).await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("code=hc-1"))
        .and(body_string_contains(
            "redirect_uri=https%3A%2F%2Fapp.example.com%2Flogin%2Fcallback",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "sso-at",
            "expires_in": 3600,
            "refresh_token": "sso-rt"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = harness
        .send(exchange_request(serde_json::json!({
            "token": "ext-token",
            "platform": "mobile"
        })))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookie(&response, "sso_access_token").as_deref(), Some("sso-at"));
    let body = json_body(response).await;
    assert_eq!(body["subject_id"], SUBJECT);
    assert_eq!(body["display_name"], DISPLAY_NAME);
    assert_eq!(body["access_token"], "sso-at");
    assert_eq!(body["expires_in"], 3600);

    let session_id = SessionId(body["session_id"].as_str().unwrap().to_string());
    let record = harness.record(&session_id).await.unwrap();
    assert!(record.is_authenticated());
    assert!(record.sso);
    assert_eq!(record.platform, Platform::Mobile);
    assert_eq!(record.visitor_type, Some(VisitorType::RealName));
    assert_eq!(record.refresh_token, "sso-rt");

    assert_eq!(
        harness.audit.events(),
        vec![AuditEvent::Login {
            session_id,
            subject_id: SUBJECT.into(),
            platform: Platform::Mobile,
            sso: true,
        }]
    );
}

// ── GET /sso ───────────────────────────────────────────────────────

#[tokio::test]
async fn broker_sso_creates_session_and_redirects() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/partner/sso"))
        .and(body_string_contains("ticket=T-1"))
        .and(body_string_contains("response_type=token+id_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "broker-at",
            "id_token": "broker-it",
            "expires_in": 600
        })))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth2/introspect"))
        .and(body_string_contains("token=broker-at"))
        .respond_with(ResponseTemplate::new(200).set_body_json(active_introspection()))
        .expect(1)
        .mount(&harness.server)
        .await;

    let response = harness.get("/sso?ticket=T-1&platform=2", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/desktop/signed-in");
    let session_id = SessionId(set_cookie(&response, "sso_session").unwrap());
    let record = harness.record(&session_id).await.unwrap();
    assert!(record.sso);
    assert!(record.refresh_token.is_empty());
    assert_eq!(record.id_token, "broker-it");
    assert_eq!(record.display_name, DISPLAY_NAME);
    assert_eq!(harness.audit.events().len(), 1);
}

#[tokio::test]
async fn broker_sso_with_inactive_token_creates_nothing() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/partner/sso"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "broker-at",
            "id_token": "broker-it"
        })))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth2/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "active": false })))
        .mount(&harness.server)
        .await;

    let response = harness.get("/sso?ticket=T-1", None).await;

    assert_eq!(location(&response), "/signin?error=protocol_error");
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn broker_sso_without_enabled_broker_is_a_configuration_error() {
    let mut directory = FakeDirectory::standard();
    directory.login_config.broker_id = None;
    let harness = Harness::with_directory(directory).await;

    let response = harness.get("/sso?ticket=T-1", None).await;
    assert_eq!(location(&response), "/signin?error=configuration_error");
}

#[tokio::test]
async fn broker_sso_with_unconfigured_broker_is_a_configuration_error() {
    let mut directory = FakeDirectory::standard();
    directory.login_config.broker_id = Some("ghost".into());
    let harness = Harness::with_directory(directory).await;

    let response = harness.get("/sso?ticket=T-1", None).await;
    assert_eq!(location(&response), "/signin?error=configuration_error");
}
