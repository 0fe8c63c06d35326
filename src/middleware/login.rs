use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::cookies;
use super::error::AuthError;
use super::routes::{found, sanitize_target, success_target};
use super::state::AuthState;
use crate::audit::{AuditEvent, AuditSink};
use crate::directory::UserDirectory;
use crate::session::{SessionRecord, SessionStatus, SessionStore};
use crate::types::{Platform, SessionId};

/// Callback `error` values with which the user declined, not a failure.
const DECLINED: [&str; 2] = ["request_unauthorized", "request_forbidden"];

// ── Login ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct LoginParams {
    platform: Option<String>,
    redirect: Option<String>,
}

enum LoginStart {
    /// Send the browser to the authorize endpoint.
    Authorize { record: SessionRecord, url: String },
    /// The session is authenticated and its token is still active.
    AlreadyAuthenticated(SessionRecord),
}

pub(super) async fn login<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> Response {
    let platform = params
        .platform
        .as_deref()
        .and_then(|p| p.parse::<Platform>().ok())
        .unwrap_or_default();
    let target = sanitize_target(params.redirect);

    match begin_login(&state, &jar, &headers, platform, target).await {
        Ok(LoginStart::Authorize { record, url }) => {
            let jar = jar.add(cookies::session_cookie(&state.settings, &record.id));
            (jar, found(&url)).into_response()
        }
        Ok(LoginStart::AlreadyAuthenticated(record)) => {
            tracing::debug!(session_id = %record.id, "Session already authenticated");
            found(success_target(&state.settings, &record))
        }
        Err(e) => (jar, e.landing(&state.settings.error_redirect)).into_response(),
    }
}

async fn begin_login<S: SessionStore, D: UserDirectory, A: AuditSink>(
    state: &AuthState<S, D, A>,
    jar: &CookieJar,
    headers: &HeaderMap,
    platform: Platform,
    target: Option<String>,
) -> Result<LoginStart, AuthError> {
    let existing = match cookies::session_id(jar, headers, &state.settings) {
        Some(id) => state.load(&id).await?,
        None => None,
    };

    let Some(mut record) = existing else {
        let record = SessionRecord::pending(SessionId::generate(), platform, target);
        state.persist(&record).await?;
        tracing::info!(session_id = %record.id, platform = platform.as_str(), "Login started");
        let url = state
            .client
            .authorization_url(record.csrf_state(), &record.nonce)
            .into();
        return Ok(LoginStart::Authorize { record, url });
    };

    let mut changed = false;
    if record.is_authenticated() {
        if token_is_active(state, &record).await {
            if target.is_some() {
                record.redirect_target = target;
            }
            return Ok(LoginStart::AlreadyAuthenticated(record));
        }
        record.reset_to_pending();
        changed = true;
    }

    // The state issued with the record is reused; it is never regenerated mid-flow.
    changed |= record.resume_with(platform, target);
    if changed {
        state.persist(&record).await?;
    }
    tracing::info!(session_id = %record.id, platform = platform.as_str(), "Login resumed");
    let url = state
        .client
        .authorization_url(record.csrf_state(), &record.nonce)
        .into();
    Ok(LoginStart::Authorize { record, url })
}

async fn token_is_active<S: SessionStore, D: UserDirectory, A: AuditSink>(
    state: &AuthState<S, D, A>,
    record: &SessionRecord,
) -> bool {
    if record.access_token.is_empty() {
        return false;
    }
    match state.client.introspect(&record.access_token).await {
        Ok(introspection) => introspection.active,
        Err(e) => {
            tracing::warn!(session_id = %record.id, error = %e, "Introspection failed, restarting login");
            false
        }
    }
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub(super) async fn callback<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = &params.error {
        let desc = params.error_description.as_deref().unwrap_or_default();
        if DECLINED.contains(&error.as_str()) {
            // The pending record stays as it is; the user may try again.
            tracing::warn!(error = %error, description = %desc, "Login declined");
            return found(&state.settings.landing);
        }
        let err = AuthError::Protocol {
            operation: "authorization callback",
            detail: format!("{error}: {desc}"),
        };
        return (jar, err.landing(&state.settings.error_redirect)).into_response();
    }

    match complete_login(&state, &jar, &headers, params.code, params.state).await {
        Ok(record) => {
            let target = success_target(&state.settings, &record).to_string();
            let jar = cookies::add_session_cookies(jar, &state.settings, &record);
            (jar, found(&target)).into_response()
        }
        Err(e) => (jar, e.landing(&state.settings.error_redirect)).into_response(),
    }
}

async fn complete_login<S: SessionStore, D: UserDirectory, A: AuditSink>(
    state: &AuthState<S, D, A>,
    jar: &CookieJar,
    headers: &HeaderMap,
    code: Option<String>,
    received_state: Option<String>,
) -> Result<SessionRecord, AuthError> {
    let code = code.filter(|c| !c.is_empty()).ok_or_else(|| AuthError::Protocol {
        operation: "authorization callback",
        detail: "missing code".into(),
    })?;
    let received_state = received_state.ok_or(AuthError::StateMismatch)?;

    let session_id =
        cookies::session_id(jar, headers, &state.settings).ok_or(AuthError::SessionNotFound)?;
    let mut record = state
        .load(&session_id)
        .await?
        .ok_or(AuthError::SessionNotFound)?;

    if !record.state_matches(&received_state) {
        tracing::warn!(session_id = %record.id, "OAuth state mismatch");
        return Err(AuthError::StateMismatch);
    }

    let redirect_uri = state.client.config().redirect_uri().as_str().to_owned();
    let tokens = state.client.exchange_code(&code, &redirect_uri).await?;

    if let Some(nonce) = tokens.id_token_nonce() {
        if nonce != record.nonce {
            tracing::warn!(session_id = %record.id, "OIDC nonce mismatch");
            return Err(AuthError::NonceMismatch);
        }
    }

    let introspection = state.client.introspect(&tokens.access_token).await?;
    if !introspection.active || introspection.subject_id.is_empty() {
        return Err(AuthError::Protocol {
            operation: "token introspection",
            detail: "freshly issued token is not active".into(),
        });
    }

    let profile = state
        .directory
        .profile(&introspection.subject_id)
        .await
        .map_err(AuthError::directory)?
        .ok_or(AuthError::AccountNotFound)?;

    record.status = SessionStatus::Authenticated;
    record.visitor_type = introspection.visitor_type();
    record.subject_id = introspection.subject_id;
    record.display_name = profile.display_name;
    record.access_token = tokens.access_token;
    record.refresh_token = tokens.refresh_token.unwrap_or_default();
    record.id_token = tokens.id_token.unwrap_or_default();
    record.sso = false;

    state.persist(&record).await?;
    state
        .audit(AuditEvent::Login {
            session_id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            platform: record.platform,
            sso: false,
        })
        .await;

    tracing::info!(session_id = %record.id, subject_id = %record.subject_id, "Login successful");
    Ok(record)
}
