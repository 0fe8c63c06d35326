use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use serde::Serialize;

use super::cookies;
use super::error::AuthError;
use super::state::AuthState;
use crate::audit::AuditSink;
use crate::directory::UserDirectory;
use crate::session::SessionStore;

#[derive(Debug, Serialize)]
pub(super) struct RefreshBody {
    access_token: String,
    token_type: String,
    expires_in: Option<u64>,
}

/// Rotate the session's tokens.
///
/// The presented access token must equal the stored one; otherwise the
/// request is refused before the token endpoint is called. On any failure the
/// stored record is left as it was.
pub(super) async fn refresh_token<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, Json<RefreshBody>), AuthError> {
    let presented = cookies::cookie_pair(&jar, &headers, &state.settings);
    let session_id = presented.session_id.ok_or(AuthError::Unauthenticated)?;
    let mut record = state
        .load(&session_id)
        .await?
        .ok_or(AuthError::SessionNotFound)?;

    if record.access_token.is_empty()
        || presented.access_token.as_deref() != Some(record.access_token.as_str())
    {
        tracing::warn!(session_id = %record.id, "Refresh with foreign access token");
        return Err(AuthError::TokenMismatch);
    }
    if record.refresh_token.is_empty() {
        return Err(AuthError::RefreshFailed("session has no refresh token".into()));
    }

    let tokens = state
        .client
        .refresh(&record.refresh_token)
        .await
        .map_err(|e| {
            tracing::error!(session_id = %record.id, error = %e, "Token refresh failed");
            AuthError::RefreshFailed(e.to_string())
        })?;

    record.access_token = tokens.access_token;
    if let Some(refresh_token) = tokens.refresh_token {
        record.refresh_token = refresh_token;
    }
    if let Some(id_token) = tokens.id_token {
        record.id_token = id_token;
    }
    state.persist(&record).await?;

    tracing::info!(session_id = %record.id, "Session tokens refreshed");
    let jar = cookies::add_session_cookies(jar, &state.settings, &record);
    Ok((
        jar,
        Json(RefreshBody {
            access_token: record.access_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
        }),
    ))
}
