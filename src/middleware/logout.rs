use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::cookies;
use super::error::AuthError;
use super::routes::found;
use super::state::AuthState;
use crate::audit::{AuditEvent, AuditSink};
use crate::directory::UserDirectory;
use crate::session::{SessionRecord, SessionStore};

// ── Logout ─────────────────────────────────────────────────────────

pub(super) async fn logout<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let record = match find_session(&state, &jar, &headers).await {
        Ok(Some(record)) => record,
        Ok(None) => return logged_out(&state, jar),
        Err(e) => return (jar, e.landing(&state.settings.error_redirect)).into_response(),
    };

    // Headless sessions have no provider session in the browser to end, and
    // without a return URI the provider never comes back to the callback.
    let returns_to_callback = state.client.config().post_logout_redirect_uri().is_some();
    if record.sso || record.id_token.is_empty() || !returns_to_callback {
        return match terminate(&state, &record).await {
            Ok(()) => logged_out(&state, jar),
            Err(e) => (jar, e.landing(&state.settings.error_redirect)).into_response(),
        };
    }

    tracing::info!(session_id = %record.id, "Redirecting to end-session endpoint");
    let url = state
        .client
        .end_session_url(&record.id_token, record.csrf_state());
    found(url.as_str())
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct LogoutCallbackParams {
    state: Option<String>,
}

pub(super) async fn callback<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(params): Query<LogoutCallbackParams>,
) -> Response {
    let record = match find_session(&state, &jar, &headers).await {
        Ok(Some(record)) => record,
        Ok(None) => return logged_out(&state, jar),
        Err(e) => return (jar, e.landing(&state.settings.error_redirect)).into_response(),
    };

    let received = params.state.unwrap_or_default();
    if !record.state_matches(&received) {
        tracing::warn!(session_id = %record.id, "Logout state mismatch");
        return (jar, AuthError::StateMismatch.landing(&state.settings.error_redirect))
            .into_response();
    }

    match terminate(&state, &record).await {
        Ok(()) => logged_out(&state, jar),
        Err(e) => (jar, e.landing(&state.settings.error_redirect)).into_response(),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// A missing session id or a store miss both mean "already logged out".
async fn find_session<S: SessionStore, D: UserDirectory, A: AuditSink>(
    state: &AuthState<S, D, A>,
    jar: &CookieJar,
    headers: &HeaderMap,
) -> Result<Option<SessionRecord>, AuthError> {
    match cookies::session_id(jar, headers, &state.settings) {
        Some(id) => state.load(&id).await,
        None => Ok(None),
    }
}

fn logged_out<S, D, A>(state: &AuthState<S, D, A>, jar: CookieJar) -> Response {
    let jar = cookies::clear_session_cookies(jar, &state.settings);
    (jar, found(&state.settings.landing)).into_response()
}

/// Local termination: best-effort revoke, delete, then audit.
///
/// A failed revoke never keeps the local record alive.
pub(super) async fn terminate<S: SessionStore, D: UserDirectory, A: AuditSink>(
    state: &AuthState<S, D, A>,
    record: &SessionRecord,
) -> Result<(), AuthError> {
    for token in [&record.refresh_token, &record.access_token] {
        if token.is_empty() {
            continue;
        }
        if let Err(e) = state.client.revoke(token).await {
            tracing::warn!(session_id = %record.id, error = %e, "Token revocation failed during logout");
        }
    }

    state.store.delete(&record.id).await.map_err(|e| {
        tracing::error!(session_id = %record.id, error = %e, "Session deletion failed during logout");
        AuthError::store(e)
    })?;

    state
        .audit(AuditEvent::Logout {
            session_id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            sso: record.sso,
        })
        .await;

    tracing::info!(session_id = %record.id, sso = record.sso, "Logout successful");
    Ok(())
}
