use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use super::config::{AuthConfig, AuthSettings};
use super::state::AuthState;
use super::{info, login, logout, refresh, sso};
use crate::audit::AuditSink;
use crate::directory::UserDirectory;
use crate::session::{SessionRecord, SessionStore};

/// Create the session orchestration router.
///
/// Routes (relative to the configured auth path):
/// `GET /login`, `GET /login/callback`, `GET /logout`, `GET /logout/callback`,
/// `GET /refresh-token`, `GET /userinfo`, `GET /username`, `GET|POST /sso`,
/// `GET /platform`.
pub fn auth_routes<S, D, A>(config: AuthConfig, store: S, directory: D, audit: A) -> Router
where
    S: SessionStore,
    D: UserDirectory,
    A: AuditSink,
{
    let auth_path = config.settings.auth_path.clone();

    let state = AuthState {
        client: Arc::new(config.client),
        brokers: Arc::new(config.brokers),
        token_exchange_broker: config.token_exchange_broker.map(Arc::from),
        store: Arc::new(store),
        directory: Arc::new(directory),
        audit: Arc::new(audit),
        settings: Arc::new(config.settings),
        host_cache: Arc::new(OnceLock::new()),
    };

    Router::new()
        .route(&format!("{auth_path}/login"), get(login::login::<S, D, A>))
        .route(
            &format!("{auth_path}/login/callback"),
            get(login::callback::<S, D, A>),
        )
        .route(&format!("{auth_path}/logout"), get(logout::logout::<S, D, A>))
        .route(
            &format!("{auth_path}/logout/callback"),
            get(logout::callback::<S, D, A>),
        )
        .route(
            &format!("{auth_path}/refresh-token"),
            get(refresh::refresh_token::<S, D, A>),
        )
        .route(
            &format!("{auth_path}/sso"),
            get(sso::broker_sso::<S, D, A>).post(sso::token_exchange::<S, D, A>),
        )
        .route(&format!("{auth_path}/userinfo"), get(info::userinfo::<S, D, A>))
        .route(&format!("{auth_path}/username"), get(info::username))
        .route(&format!("{auth_path}/platform"), get(info::platform::<S, D, A>))
        .with_state(state)
}

// ── Helpers ────────────────────────────────────────────────────────

/// `302 Found` browser redirect.
pub(super) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Accept only local absolute paths as post-login targets.
pub(super) fn sanitize_target(target: Option<String>) -> Option<String> {
    target.filter(|t| t.starts_with('/') && !t.starts_with("//") && !t.contains('\\'))
}

/// Where to send the browser once a session is authenticated.
pub(super) fn success_target<'a>(settings: &'a AuthSettings, record: &'a SessionRecord) -> &'a str {
    record
        .redirect_target
        .as_deref()
        .unwrap_or_else(|| settings.platform_landing(record.platform))
}
