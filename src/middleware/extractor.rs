use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

use super::cookies;
use super::error::AuthError;
use super::state::AuthState;
use crate::audit::AuditSink;
use crate::directory::UserDirectory;
use crate::session::{SessionRecord, SessionStore};
use crate::types::SessionId;

/// Authenticated session extracted from the session cookie, falling back to
/// the session header.
///
/// Returns `401 Unauthorized` when no session id is presented or the session
/// has not completed login.
///
/// # Example
///
/// ```rust,ignore
/// async fn whoami(AuthSession(session): AuthSession) -> impl IntoResponse {
///     format!("Hello, {}", session.display_name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthSession(pub SessionRecord);

impl<S, D, A> FromRequestParts<AuthState<S, D, A>> for AuthSession
where
    S: SessionStore,
    D: UserDirectory,
    A: AuditSink,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState<S, D, A>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = cookies::session_id(&jar, &parts.headers, &state.settings)
            .ok_or(AuthError::Unauthenticated)?;

        let record = state
            .load(&session_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        if !record.is_authenticated() {
            return Err(AuthError::Unauthenticated);
        }
        Ok(Self(record))
    }
}

/// Resolve the authenticated session named by the request's cookie.
///
/// For consumer middleware that runs outside the auth router. Store errors,
/// unknown ids and sessions still pending login all yield `None`.
///
/// ```rust,ignore
/// let session = resolve_session(&store, &headers, "sso_session").await;
/// ```
pub async fn resolve_session<S: SessionStore>(
    store: &S,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Option<SessionRecord> {
    let jar = CookieJar::from_headers(headers);
    let session_id = jar
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())?;

    match store.get(&SessionId(session_id)).await {
        Ok(record) => record.filter(SessionRecord::is_authenticated),
        Err(e) => {
            tracing::error!(error = %e, "Session lookup failed");
            None
        }
    }
}
