#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http_body_util::BodyExt;
use sso_orchestrator::middleware::{AuthConfig, auth_routes};
use sso_orchestrator::{
    AuditEvent, AuditSink, AuthClient, BrokerClient, BrokerConfig, DirectoryError,
    ExternalIdentity, LocalAccount, LoginConfig, MemorySessionStore, OAuthConfig, Platform,
    SessionId, SessionRecord, SessionStatus, SessionStore, SubjectId, UserDirectory, UserProfile,
    VisitorType,
};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SUBJECT: &str = "user-42";
pub const DISPLAY_NAME: &str = "Ada";
pub const EXTERNAL_ID: &str = "ext-1";

// ── Fakes ──────────────────────────────────────────────────────────

pub struct FakeDirectory {
    pub accounts: HashMap<String, LocalAccount>,
    pub profiles: HashMap<SubjectId, UserProfile>,
    pub login_config: LoginConfig,
}

impl FakeDirectory {
    /// One active account, linked to `EXTERNAL_ID`.
    pub fn standard() -> Self {
        let subject_id = SubjectId::from(SUBJECT);
        Self {
            accounts: HashMap::from([(
                EXTERNAL_ID.to_string(),
                LocalAccount {
                    subject_id: subject_id.clone(),
                    display_name: DISPLAY_NAME.into(),
                    disabled: false,
                },
            )]),
            profiles: HashMap::from([(
                subject_id.clone(),
                UserProfile {
                    subject_id,
                    display_name: DISPLAY_NAME.into(),
                },
            )]),
            login_config: LoginConfig {
                broker_id: Some("partner".into()),
                token_exchange_enabled: true,
            },
        }
    }
}

impl UserDirectory for FakeDirectory {
    async fn resolve_account(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<Option<LocalAccount>, DirectoryError> {
        Ok(self.accounts.get(&identity.external_id).cloned())
    }

    async fn profile(&self, subject_id: &SubjectId) -> Result<Option<UserProfile>, DirectoryError> {
        Ok(self.profiles.get(subject_id).cloned())
    }

    async fn login_config(&self) -> Result<LoginConfig, DirectoryError> {
        Ok(self.login_config.clone())
    }
}

#[derive(Clone, Default)]
pub struct RecordingAudit(Arc<Mutex<Vec<AuditEvent>>>);

impl RecordingAudit {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    async fn record(&self, event: AuditEvent) {
        self.0.lock().unwrap().push(event);
    }
}

// ── Harness ────────────────────────────────────────────────────────

/// The auth router wired to a mock authorization server that also plays
/// both brokers (`corp` at `/`, `partner` at `/partner/`).
pub struct Harness {
    pub server: MockServer,
    pub store: MemorySessionStore,
    pub audit: RecordingAudit,
    pub app: Router,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_directory(FakeDirectory::standard()).await
    }

    pub async fn with_directory(directory: FakeDirectory) -> Self {
        Self::build(directory, Some("https://app.example.com/logout/callback")).await
    }

    /// A deployment with no post-logout return URI configured.
    pub async fn without_logout_callback() -> Self {
        Self::build(FakeDirectory::standard(), None).await
    }

    async fn build(directory: FakeDirectory, post_logout_redirect_uri: Option<&str>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("sso_orchestrator=debug,audit=info")
            .try_init();

        let server = MockServer::start().await;
        let base: Url = server.uri().parse().unwrap();
        let mut oauth = OAuthConfig::new(
            "portal",
            base.clone(),
            base.clone(),
            "https://app.example.com/login/callback".parse().unwrap(),
        )
        .with_timeout(Duration::from_secs(5));
        if let Some(uri) = post_logout_redirect_uri {
            oauth = oauth.with_post_logout_redirect_uri(uri.parse().unwrap());
        }
        let client = AuthClient::new(oauth).unwrap();

        let corp = BrokerClient::new(BrokerConfig::new("corp", &base), Duration::from_secs(5)).unwrap();
        let partner = BrokerClient::new(
            BrokerConfig::new("partner", &base.join("partner/").unwrap()),
            Duration::from_secs(5),
        )
        .unwrap();

        let config = AuthConfig::new(client)
            .with_token_exchange_broker(corp)
            .with_broker(partner)
            .with_secure_cookies(false)
            .with_deployment_host("app.example.com")
            .with_error_redirect("/signin");

        let store = MemorySessionStore::new();
        let audit = RecordingAudit::default();
        let app = auth_routes(config, store.clone(), directory, audit.clone());

        Self {
            server,
            store,
            audit,
            app,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn record(&self, id: &SessionId) -> Option<SessionRecord> {
        self.store.get(id).await.unwrap()
    }

    /// Store an authenticated interactive session for `SUBJECT`.
    pub async fn seed_authenticated(&self, id: &str, platform: Platform) -> SessionRecord {
        let mut record = SessionRecord::pending(SessionId::from(id), platform, None);
        record.status = SessionStatus::Authenticated;
        record.subject_id = SubjectId::from(SUBJECT);
        record.display_name = DISPLAY_NAME.into();
        record.visitor_type = Some(VisitorType::RealName);
        record.access_token = "at-1".into();
        record.refresh_token = "rt-1".into();
        record.id_token = "it-1".into();
        self.store.set(&record, Duration::from_secs(600)).await.unwrap();
        record
    }
}

// ── Response helpers ───────────────────────────────────────────────

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Value of the `Set-Cookie` named `name`, if the response sets it.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(n, _)| n.trim() == name)
        .map(|(_, value)| value.to_string())
}

pub fn url_param(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Unsigned JWT carrying `nonce`; signatures are not checked on the token
/// endpoint response.
pub fn id_token_with_nonce(nonce: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({ "nonce": nonce }).to_string());
    format!("{header}.{payload}.sig")
}

pub fn active_introspection() -> serde_json::Value {
    serde_json::json!({
        "active": true,
        "sub": SUBJECT,
        "scope": "openid offline profile",
        "client_id": "portal",
        "ext": { "visitor_type": "real_name", "client_type": "web" }
    })
}

// ── Headless flow script ───────────────────────────────────────────

pub const LOGIN_CHALLENGE: &str = "lc-1";
pub const CONSENT_CHALLENGE: &str = "cc-1";

/// Mount the six hops of a headless login on `server`.
///
/// Hop 4 answers with `hop4`; hops 5 and 6 expect `tail_calls` requests.
/// Hop 6 redirects to `final_location`.
pub async fn mount_headless(
    server: &MockServer,
    response_type: &str,
    hop4: ResponseTemplate,
    final_location: &str,
    tail_calls: u64,
) {
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/oauth2/auth"))
        .and(query_param("response_type", response_type))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{uri}/login?login_challenge={LOGIN_CHALLENGE}").as_str())
                .insert_header("set-cookie", "csrf_a=1; Path=/; HttpOnly"),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/admin/oauth2/auth/requests/login"))
        .and(query_param("login_challenge", LOGIN_CHALLENGE))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "challenge": LOGIN_CHALLENGE,
            "client": {
                "client_name": "Portal",
                "metadata": { "client_type": "web", "description": "Main portal" }
            }
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/admin/oauth2/auth/requests/login/accept"))
        .and(query_param("login_challenge", LOGIN_CHALLENGE))
        .and(body_json(serde_json::json!({ "subject": SUBJECT })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "redirect_to": format!("{uri}/oauth2/auth?login_verifier=lv-1")
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth2/auth"))
        .and(query_param("login_verifier", "lv-1"))
        .and(header("cookie", "csrf_a=1"))
        .respond_with(hop4)
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/admin/oauth2/auth/requests/consent/accept"))
        .and(query_param("consent_challenge", CONSENT_CHALLENGE))
        .and(body_partial_json(serde_json::json!({
            "session": { "access_token": { "visitor_type": "real_name" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "redirect_to": format!("{uri}/oauth2/auth?consent_verifier=cv-1")
        })))
        .expect(tail_calls)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth2/auth"))
        .and(query_param("consent_verifier", "cv-1"))
        .and(header("cookie", "csrf_a=1; session_b=2"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", final_location))
        .expect(tail_calls)
        .mount(server)
        .await;
}

/// Hop 4 answer that hands out the consent challenge and a session cookie.
pub fn consent_redirect(server: &MockServer) -> ResponseTemplate {
    ResponseTemplate::new(302)
        .insert_header(
            "location",
            format!("{}/consent?consent_challenge={CONSENT_CHALLENGE}", server.uri()).as_str(),
        )
        .insert_header("set-cookie", "session_b=2; Path=/")
}

/// A complete `code` headless login ending in `code=hc-1`.
pub async fn mount_headless_code(server: &MockServer) {
    mount_headless(
        server,
        "code",
        consent_redirect(server),
        "https://app.example.com/login/callback?code=hc-1&scope=openid+offline+profile&state=s",
        1,
    )
    .await;
}
