use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use serde::Serialize;

use super::cookies;
use super::error::AuthError;
use super::extractor::AuthSession;
use super::state::AuthState;
use crate::audit::AuditSink;
use crate::directory::UserDirectory;
use crate::session::SessionStore;
use crate::types::{Platform, SubjectId, VisitorType};

#[derive(Debug, Serialize)]
pub(super) struct UserInfoBody {
    subject_id: SubjectId,
    display_name: String,
    visitor_type: Option<VisitorType>,
    platform: Platform,
    scope: String,
}

/// Identity of the current session, confirmed against introspection.
pub(super) async fn userinfo<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    AuthSession(record): AuthSession,
) -> Result<Json<UserInfoBody>, AuthError> {
    let introspection = state.client.introspect(&record.access_token).await?;
    if !introspection.active {
        tracing::debug!(session_id = %record.id, "Access token no longer active");
        return Err(AuthError::Unauthenticated);
    }

    Ok(Json(UserInfoBody {
        visitor_type: introspection.visitor_type().or(record.visitor_type),
        subject_id: record.subject_id,
        display_name: record.display_name,
        platform: record.platform,
        scope: introspection.scope,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct UsernameBody {
    display_name: String,
}

pub(super) async fn username(AuthSession(record): AuthSession) -> Json<UsernameBody> {
    Json(UsernameBody {
        display_name: record.display_name,
    })
}

#[derive(Debug, Serialize)]
pub(super) struct PlatformBody {
    platform: u8,
    name: &'static str,
}

/// Platform the session was started from; the default platform without one.
pub(super) async fn platform<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Json<PlatformBody>, AuthError> {
    let platform = match cookies::session_id(&jar, &headers, &state.settings) {
        Some(id) => state
            .load(&id)
            .await?
            .map(|record| record.platform)
            .unwrap_or_default(),
        None => Platform::default(),
    };
    Ok(Json(PlatformBody {
        platform: platform.code(),
        name: platform.as_str(),
    }))
}
