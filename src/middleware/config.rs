use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use super::error::AuthError;
use crate::broker::{BrokerClient, BrokerConfig, BrokerRegistry};
use crate::oauth::{AuthClient, OAuthConfig};
use crate::types::Platform;

const TOKEN_EXCHANGE_BROKER_ID: &str = "token-exchange";

/// Upper bound of the session lifetime, ten years.
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone, Debug)]
pub(crate) struct AuthSettings {
    pub(crate) session_cookie_name: String,
    pub(crate) access_token_cookie_name: String,
    pub(crate) subject_cookie_name: String,
    pub(crate) session_header: String,
    pub(crate) session_ttl_days: i64,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
    pub(crate) landing: String,
    pub(crate) error_redirect: String,
    pub(crate) platform_landings: HashMap<Platform, String>,
    pub(crate) deployment_host: Option<String>,
}

impl AuthSettings {
    fn defaults() -> Self {
        Self {
            session_cookie_name: "sso_session".into(),
            access_token_cookie_name: "sso_access_token".into(),
            subject_cookie_name: "sso_subject".into(),
            session_header: "x-session-id".into(),
            session_ttl_days: 7,
            secure_cookies: true,
            auth_path: String::new(),
            landing: "/".into(),
            error_redirect: "/".into(),
            platform_landings: HashMap::from([
                (Platform::Web, "/".to_string()),
                (Platform::Desktop, "/desktop/signed-in".to_string()),
                (Platform::Mobile, "/mobile/signed-in".to_string()),
            ]),
            deployment_host: None,
        }
    }

    pub(crate) fn session_ttl(&self) -> Duration {
        let days = u64::try_from(self.session_ttl_days).unwrap_or(0);
        Duration::from_secs(days.saturating_mul(24 * 60 * 60))
    }

    pub(crate) fn platform_landing(&self, platform: Platform) -> &str {
        self.platform_landings
            .get(&platform)
            .map_or(self.landing.as_str(), String::as_str)
    }
}

/// Session orchestration configuration.
///
/// Required field (`client`) is a constructor parameter; everything else has
/// a default and a `with_*` override.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup,
/// or [`new()`](AuthConfig::new) with `with_*` methods for full control.
pub struct AuthConfig {
    pub(super) client: AuthClient,
    pub(super) brokers: BrokerRegistry,
    pub(super) token_exchange_broker: Option<String>,
    pub(super) settings: AuthSettings,
}

impl AuthConfig {
    #[must_use]
    pub fn new(client: AuthClient) -> Self {
        Self {
            client,
            brokers: BrokerRegistry::new(),
            token_exchange_broker: None,
            settings: AuthSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SSO_CLIENT_ID`: OAuth2 client ID
    /// - `SSO_PUBLIC_URL`: public base URL of the authorization server
    /// - `SSO_ADMIN_URL`: admin base URL of the authorization server
    /// - `SSO_REDIRECT_URI`: login callback URI of this service
    ///
    /// # Optional env vars
    /// - `SSO_CLIENT_SECRET`: switches token calls to `client_secret_basic`
    /// - `SSO_POST_LOGOUT_REDIRECT_URI`: logout callback URI of this service
    /// - `SSO_SCOPES`: comma-separated scopes
    /// - `SSO_HTTP_TIMEOUT_SECS`: timeout for every outbound call
    /// - `SSO_DEPLOYMENT_HOST`: host used for headless logins
    /// - `SSO_TOKEN_EXCHANGE_BROKER_URL`: broker verifying `POST /sso` tokens
    /// - `SSO_BROKERS`: comma-separated `id=base_url` brokers for `GET /sso`
    /// - `DEV_AUTH`: set to `"1"` or `"true"` to disable secure cookies
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let client_id = required("SSO_CLIENT_ID")?;
        let public_url = required_url("SSO_PUBLIC_URL")?;
        let admin_url = required_url("SSO_ADMIN_URL")?;
        let redirect_uri = required_url("SSO_REDIRECT_URI")?;

        let mut oauth = OAuthConfig::new(client_id, public_url, admin_url, redirect_uri);

        if let Ok(secret) = std::env::var("SSO_CLIENT_SECRET") {
            oauth = oauth.with_client_secret(secret);
        }
        if let Some(url) = optional_url("SSO_POST_LOGOUT_REDIRECT_URI")? {
            oauth = oauth.with_post_logout_redirect_uri(url);
        }
        if let Ok(scopes) = std::env::var("SSO_SCOPES") {
            oauth = oauth.with_scopes(scopes.split(',').map(|s| s.trim().to_string()).collect());
        }
        if let Ok(secs) = std::env::var("SSO_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| AuthError::Config(format!("SSO_HTTP_TIMEOUT_SECS: {e}")))?;
            oauth = oauth.with_timeout(Duration::from_secs(secs));
        }
        let timeout = oauth.timeout();

        let client =
            AuthClient::new(oauth).map_err(|e| AuthError::Config(format!("HTTP client: {e}")))?;
        let mut config = Self::new(client);

        if let Some(url) = optional_url("SSO_TOKEN_EXCHANGE_BROKER_URL")? {
            let broker = broker(BrokerConfig::new(TOKEN_EXCHANGE_BROKER_ID, &url), timeout)?;
            config = config.with_token_exchange_broker(broker);
        }
        if let Ok(list) = std::env::var("SSO_BROKERS") {
            for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let (id, url) = entry.split_once('=').ok_or_else(|| {
                    AuthError::Config(format!("SSO_BROKERS: expected id=url, got {entry:?}"))
                })?;
                let url: Url = url
                    .parse()
                    .map_err(|e| AuthError::Config(format!("SSO_BROKERS ({id}): {e}")))?;
                config = config.with_broker(broker(BrokerConfig::new(id, &url), timeout)?);
            }
        }
        if let Ok(host) = std::env::var("SSO_DEPLOYMENT_HOST") {
            config = config.with_deployment_host(host);
        }

        let dev_auth = matches!(
            std::env::var("DEV_AUTH").as_deref(),
            Ok("1") | Ok("true"),
        );

        Ok(config.with_secure_cookies(!dev_auth))
    }

    /// Register a broker selectable by `GET /sso`.
    #[must_use]
    pub fn with_broker(mut self, broker: BrokerClient) -> Self {
        self.brokers = self.brokers.with_broker(broker);
        self
    }

    /// Register the broker that verifies external tokens for `POST /sso`.
    #[must_use]
    pub fn with_token_exchange_broker(mut self, broker: BrokerClient) -> Self {
        self.token_exchange_broker = Some(broker.id().to_string());
        self.with_broker(broker)
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_access_token_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.access_token_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_subject_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.subject_cookie_name = name.into();
        self
    }

    /// Header consulted for the session id when no session cookie is sent.
    #[must_use]
    pub fn with_session_header(mut self, name: impl Into<String>) -> Self {
        self.settings.session_header = name.into();
        self
    }

    /// Session record and cookie lifetime, clamped to `0..=MAX_SESSION_TTL_DAYS`.
    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.settings.session_ttl_days = days.clamp(0, MAX_SESSION_TTL_DAYS);
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Neutral landing page (logout, declined login).
    #[must_use]
    pub fn with_landing(mut self, path: impl Into<String>) -> Self {
        self.settings.landing = path.into();
        self
    }

    #[must_use]
    pub fn with_error_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.error_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_platform_landing(mut self, platform: Platform, path: impl Into<String>) -> Self {
        self.settings.platform_landings.insert(platform, path.into());
        self
    }

    /// Host headless logins are started for. Without it, the first request's
    /// `Host` header is used.
    #[must_use]
    pub fn with_deployment_host(mut self, host: impl Into<String>) -> Self {
        self.settings.deployment_host = Some(host.into());
        self
    }
}

fn required(name: &str) -> Result<String, AuthError> {
    std::env::var(name).map_err(|_| AuthError::Config(format!("{name} is required")))
}

fn required_url(name: &str) -> Result<Url, AuthError> {
    required(name)?
        .parse()
        .map_err(|e| AuthError::Config(format!("{name}: {e}")))
}

fn optional_url(name: &str) -> Result<Option<Url>, AuthError> {
    std::env::var(name)
        .ok()
        .map(|s| s.parse().map_err(|e| AuthError::Config(format!("{name}: {e}"))))
        .transpose()
}

fn broker(config: BrokerConfig, timeout: Duration) -> Result<BrokerClient, AuthError> {
    BrokerClient::new(config, timeout).map_err(|e| AuthError::Config(format!("broker client: {e}")))
}
