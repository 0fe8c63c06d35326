use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::routes::found;

/// Errors surfaced by the login, logout and refresh orchestration.
///
/// Programmatic routes render them as JSON (see [`ErrorBody`]); browser routes
/// turn them into a redirect to the neutral error landing carrying only the
/// stable [`code`](AuthError::code).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No session identifier, or the session is not authenticated.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The session id is unknown to the store; login must start over.
    #[error("Session not found")]
    SessionNotFound,

    /// Missing broker, deployment host or other configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The authorization server or a broker broke protocol.
    #[error("{operation}: {detail}")]
    Protocol {
        operation: &'static str,
        detail: String,
    },

    /// A programmatic request body could not be read.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No local account is linked to this identity")]
    AccountNotFound,

    #[error("The local account is disabled")]
    AccountDisabled,

    #[error("External token expired or invalid: {0}")]
    ExternalTokenInvalid(String),

    /// Callback `state` differs from the stored one.
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// ID token `nonce` differs from the stored one.
    #[error("OIDC nonce mismatch")]
    NonceMismatch,

    /// The access token presented with a refresh differs from the stored one.
    #[error("Access token does not match the session")]
    TokenMismatch,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("User directory error: {0}")]
    Directory(String),
}

/// Structured error for programmatic callers.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub description: &'static str,
    pub cause: String,
    pub solution: &'static str,
}

impl AuthError {
    pub(crate) fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }

    pub(crate) fn directory(e: impl std::fmt::Display) -> Self {
        Self::Directory(e.to_string())
    }

    /// Stable, user-visible error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::SessionNotFound => "session_not_found",
            Self::Config(_) => "configuration_error",
            Self::Protocol { .. } => "protocol_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::AccountNotFound => "account_not_found",
            Self::AccountDisabled => "account_disabled",
            Self::ExternalTokenInvalid(_) => "external_token_invalid",
            Self::StateMismatch => "state_mismatch",
            Self::NonceMismatch => "nonce_mismatch",
            Self::TokenMismatch => "token_mismatch",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::Store(_) => "store_error",
            Self::Directory(_) => "directory_error",
        }
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "No authenticated session was presented.",
            Self::SessionNotFound => "The session does not exist or has expired.",
            Self::Config(_) => "Single sign-on is not configured for this deployment.",
            Self::Protocol { .. } => "The authorization server returned an unexpected response.",
            Self::InvalidRequest(_) => "The request body is malformed.",
            Self::AccountNotFound => "No account is linked to the presented identity.",
            Self::AccountDisabled => "The account has been disabled.",
            Self::ExternalTokenInvalid(_) => "The presented token has expired or is invalid.",
            Self::StateMismatch | Self::NonceMismatch => {
                "The login response does not belong to this session."
            }
            Self::TokenMismatch => "The access token does not belong to this session.",
            Self::RefreshFailed(_) => "The session tokens could not be renewed.",
            Self::Store(_) => "Session storage is unavailable.",
            Self::Directory(_) => "The user directory is unavailable.",
        }
    }

    #[must_use]
    pub fn solution(&self) -> &'static str {
        match self {
            Self::Unauthenticated
            | Self::SessionNotFound
            | Self::StateMismatch
            | Self::NonceMismatch
            | Self::TokenMismatch
            | Self::RefreshFailed(_) => "Sign in again.",
            Self::ExternalTokenInvalid(_) => "Obtain a new token from the identity provider and retry.",
            Self::AccountNotFound => "Ask an administrator to link your account.",
            Self::AccountDisabled => "Contact an administrator to re-enable the account.",
            Self::InvalidRequest(_) => "Send a JSON body with a `token` field.",
            Self::Config(_) => "Contact an administrator.",
            Self::Protocol { .. } | Self::Store(_) | Self::Directory(_) => "Retry later.",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated
            | Self::SessionNotFound
            | Self::ExternalTokenInvalid(_)
            | Self::TokenMismatch
            | Self::RefreshFailed(_) => StatusCode::UNAUTHORIZED,
            Self::StateMismatch | Self::NonceMismatch | Self::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::Protocol { .. } | Self::Directory(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log(&self) {
        match self {
            Self::Config(_) | Self::Protocol { .. } | Self::Store(_) | Self::Directory(_) => {
                tracing::error!(error = %self, code = self.code(), "Auth internal error");
            }
            Self::StateMismatch | Self::NonceMismatch | Self::TokenMismatch => {
                tracing::warn!(error = %self, code = self.code(), "Rejected forged or stale request");
            }
            _ => tracing::info!(error = %self, code = self.code(), "Auth request refused"),
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            description: self.description(),
            cause: self.to_string(),
            solution: self.solution(),
        }
    }

    /// Browser rendering: a redirect to the neutral error landing.
    #[must_use]
    pub fn landing(&self, error_redirect: &str) -> Response {
        self.log();
        let separator = if error_redirect.contains('?') { '&' } else { '?' };
        found(&format!("{error_redirect}{separator}error={}", self.code()))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<crate::error::Error> for AuthError {
    fn from(e: crate::error::Error) -> Self {
        use crate::error::Error;
        match e {
            Error::ExternalTokenRejected(detail) => Self::ExternalTokenInvalid(detail),
            Error::Config(detail) => Self::Config(detail),
            Error::OAuth {
                operation,
                status,
                detail,
            } => Self::Protocol {
                operation,
                detail: format!("status {status:?}: {detail}"),
            },
            Error::Protocol { operation, detail } => Self::Protocol { operation, detail },
            Error::Http(e) => Self::Protocol {
                operation: "http request",
                detail: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn landing_carries_only_the_code() {
        let err = AuthError::Protocol {
            operation: "verify consent",
            detail: "secret upstream detail".into(),
        };
        let response = err.landing("/signin");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/signin?error=protocol_error"
        );
    }

    #[test]
    fn landing_appends_to_existing_query() {
        let response = AuthError::StateMismatch.landing("/?lang=en");
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/?lang=en&error=state_mismatch"
        );
    }

    #[test]
    fn identity_errors_are_distinct() {
        let codes = [
            AuthError::AccountNotFound.code(),
            AuthError::AccountDisabled.code(),
            AuthError::ExternalTokenInvalid(String::new()).code(),
        ];
        assert_eq!(codes, ["account_not_found", "account_disabled", "external_token_invalid"]);
    }

    #[test]
    fn client_errors_map_to_kinds() {
        let err: AuthError = crate::error::Error::ExternalTokenRejected("expired".into()).into();
        assert!(matches!(err, AuthError::ExternalTokenInvalid(_)));

        let err: AuthError = crate::error::Error::OAuth {
            operation: "token exchange",
            status: Some(400),
            detail: "invalid_grant".into(),
        }
        .into();
        assert!(matches!(err, AuthError::Protocol { operation: "token exchange", .. }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn json_body_has_all_fields() {
        let body = serde_json::to_value(AuthError::RefreshFailed("invalid_grant".into()).body()).unwrap();
        assert_eq!(body["code"], "refresh_failed");
        assert_eq!(body["cause"], "Token refresh failed: invalid_grant");
        assert!(body["description"].is_string());
        assert!(body["solution"].is_string());
    }
}
