use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use super::cookies;
use super::error::AuthError;
use super::routes::{found, sanitize_target, success_target};
use super::state::AuthState;
use crate::audit::{AuditEvent, AuditSink};
use crate::directory::UserDirectory;
use crate::headless::{ResponseType, TokenInfo};
use crate::session::{SessionRecord, SessionStatus, SessionStore};
use crate::types::{ClientType, Platform, SessionId, SubjectId, VisitorType};

// ── Token exchange (POST /sso) ─────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct TokenExchangeRequest {
    token: String,
    #[serde(default)]
    platform: Option<Platform>,
    #[serde(default)]
    client_type: Option<ClientType>,
}

#[derive(Debug, Serialize)]
pub(super) struct TokenExchangeBody {
    session_id: SessionId,
    subject_id: SubjectId,
    display_name: String,
    access_token: String,
    expires_in: Option<u64>,
}

/// Trade an externally issued token for a local session.
///
/// The external token is verified by the token-exchange broker, the linked
/// local account is logged in through the headless flow, and the resulting
/// code is exchanged for tokens. Nothing is stored unless every step succeeds.
pub(super) async fn token_exchange<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    headers: HeaderMap,
    request: Result<Json<TokenExchangeRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<TokenExchangeBody>), AuthError> {
    let Json(request) = request.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    let broker_id = state
        .token_exchange_broker
        .as_deref()
        .ok_or_else(|| AuthError::Config("token exchange broker is not configured".into()))?;
    let broker = state.brokers.get(broker_id).ok_or_else(|| {
        AuthError::Config(format!("token exchange broker {broker_id:?} is not registered"))
    })?;

    let login_config = state
        .directory
        .login_config()
        .await
        .map_err(AuthError::directory)?;
    if !login_config.token_exchange_enabled {
        return Err(AuthError::Config("token exchange is disabled".into()));
    }

    let identity = broker.verify_token(&request.token).await?;
    let account = state
        .directory
        .resolve_account(&identity)
        .await
        .map_err(AuthError::directory)?
        .ok_or_else(|| {
            tracing::info!(provider = %identity.provider, external_id = %identity.external_id, "No linked account");
            AuthError::AccountNotFound
        })?;
    if account.disabled {
        tracing::info!(subject_id = %account.subject_id, "Token exchange for disabled account");
        return Err(AuthError::AccountDisabled);
    }

    let platform = request.platform.unwrap_or_default();
    let client_type = request
        .client_type
        .unwrap_or_else(|| ClientType::from(platform));
    let access_host = state.access_host(&headers)?.to_owned();

    let grant = state
        .client
        .headless_login(&account.subject_id, ResponseType::Code, &access_host, client_type)
        .await?;
    let TokenInfo::Code { code, .. } = grant.token_info else {
        return Err(AuthError::Protocol {
            operation: "token exchange",
            detail: "headless login did not yield a code".into(),
        });
    };
    let tokens = state
        .client
        .exchange_code(&code, grant.redirect_uri.as_str())
        .await?;

    let mut record = SessionRecord::pending(SessionId::generate(), platform, None);
    record.status = SessionStatus::Authenticated;
    record.subject_id = account.subject_id;
    record.display_name = account.display_name;
    record.visitor_type = Some(VisitorType::RealName);
    record.access_token = tokens.access_token;
    record.refresh_token = tokens.refresh_token.unwrap_or_default();
    record.id_token = tokens.id_token.unwrap_or_default();
    record.sso = true;

    state.persist(&record).await?;
    state
        .audit(AuditEvent::Login {
            session_id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            platform,
            sso: true,
        })
        .await;
    tracing::info!(
        session_id = %record.id,
        subject_id = %record.subject_id,
        provider = %identity.provider,
        "Token exchange login successful"
    );

    let jar = cookies::add_session_cookies(jar, &state.settings, &record);
    Ok((
        jar,
        Json(TokenExchangeBody {
            session_id: record.id,
            subject_id: record.subject_id,
            display_name: record.display_name,
            access_token: record.access_token,
            expires_in: tokens.expires_in,
        }),
    ))
}

// ── Broker SSO (GET /sso) ──────────────────────────────────────────

/// Log in through the deployment's SSO broker.
///
/// `platform` and `redirect` are consumed locally; every other query
/// parameter is forwarded to the broker unchanged.
pub(super) async fn broker_sso<S: SessionStore, D: UserDirectory, A: AuditSink>(
    State(state): State<AuthState<S, D, A>>,
    jar: CookieJar,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let mut platform = Platform::default();
    let mut target = None;
    let mut forwarded = Vec::with_capacity(params.len());
    for (key, value) in params {
        match key.as_str() {
            "platform" => platform = value.parse().unwrap_or_default(),
            "redirect" => target = sanitize_target(Some(value)),
            _ => forwarded.push((key, value)),
        }
    }

    match broker_login(&state, &forwarded, platform, target).await {
        Ok(record) => {
            let location = success_target(&state.settings, &record).to_string();
            let jar = cookies::add_session_cookies(jar, &state.settings, &record);
            (jar, found(&location)).into_response()
        }
        Err(e) => (jar, e.landing(&state.settings.error_redirect)).into_response(),
    }
}

async fn broker_login<S: SessionStore, D: UserDirectory, A: AuditSink>(
    state: &AuthState<S, D, A>,
    params: &[(String, String)],
    platform: Platform,
    target: Option<String>,
) -> Result<SessionRecord, AuthError> {
    let login_config = state
        .directory
        .login_config()
        .await
        .map_err(AuthError::directory)?;
    let broker_id = login_config
        .broker_id
        .ok_or_else(|| AuthError::Config("no SSO broker is enabled".into()))?;
    let broker = state
        .brokers
        .get(&broker_id)
        .ok_or_else(|| AuthError::Config(format!("SSO broker {broker_id:?} is not configured")))?;

    let tokens = broker.sso(params, ResponseType::TokenIdToken).await?;

    let introspection = state.client.introspect(&tokens.access_token).await?;
    if !introspection.active || introspection.subject_id.is_empty() {
        return Err(AuthError::Protocol {
            operation: "broker sso",
            detail: "broker token is not active".into(),
        });
    }

    let profile = state
        .directory
        .profile(&introspection.subject_id)
        .await
        .map_err(AuthError::directory)?
        .ok_or(AuthError::AccountNotFound)?;

    let mut record = SessionRecord::pending(SessionId::generate(), platform, target);
    record.status = SessionStatus::Authenticated;
    record.visitor_type = introspection.visitor_type();
    record.subject_id = introspection.subject_id;
    record.display_name = profile.display_name;
    record.access_token = tokens.access_token;
    record.id_token = tokens.id_token.unwrap_or_default();
    record.sso = true;

    state.persist(&record).await?;
    state
        .audit(AuditEvent::Login {
            session_id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            platform,
            sso: true,
        })
        .await;
    tracing::info!(
        session_id = %record.id,
        subject_id = %record.subject_id,
        broker = %broker_id,
        "Broker SSO login successful"
    );
    Ok(record)
}
