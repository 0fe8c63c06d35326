use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::introspection::{RawIntrospection, TokenIntrospection};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authorization server configuration.
///
/// Required fields are constructor parameters; endpoint paths default to the
/// layout of an Ory Hydra style server and can be overridden.
///
/// ```rust,ignore
/// use sso_orchestrator::OAuthConfig;
///
/// let config = OAuthConfig::new(
///     "portal",
///     "https://auth.example.com".parse()?,
///     "http://auth-admin.internal:4445".parse()?,
///     "https://portal.example.com/login/callback".parse()?,
/// )
/// .with_client_secret("s3cret");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: Option<String>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) revoke_url: Url,
    pub(crate) end_session_url: Url,
    pub(crate) admin_url: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) post_logout_redirect_uri: Option<Url>,
    pub(crate) scopes: Vec<String>,
    pub(crate) timeout: Duration,
}

impl OAuthConfig {
    /// Create a configuration from the public and admin base URLs.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        public_url: Url,
        admin_url: Url,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_url: join(&public_url, "oauth2/auth"),
            token_url: join(&public_url, "oauth2/token"),
            revoke_url: join(&public_url, "oauth2/revoke"),
            end_session_url: join(&public_url, "oauth2/sessions/logout"),
            admin_url,
            redirect_uri,
            post_logout_redirect_uri: None,
            scopes: vec!["openid".into(), "offline".into(), "profile".into()],
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Authenticate with `client_secret_basic` instead of a public client id.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the revocation endpoint.
    #[must_use]
    pub fn with_revoke_url(mut self, url: Url) -> Self {
        self.revoke_url = url;
        self
    }

    /// Override the end-session endpoint.
    #[must_use]
    pub fn with_end_session_url(mut self, url: Url) -> Self {
        self.end_session_url = url;
        self
    }

    /// Where the end-session endpoint sends the browser back to.
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, url: Url) -> Self {
        self.post_logout_redirect_uri = Some(url);
        self
    }

    /// Override the granted scopes (default: `["openid", "offline", "profile"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Timeout applied uniformly to every outbound call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// OAuth2 client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Authorization endpoint.
    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    /// Token endpoint.
    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Login callback URI registered with the client.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Logout callback URI, if configured.
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> Option<&Url> {
        self.post_logout_redirect_uri.as_ref()
    }

    /// Scopes requested on login.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Timeout of every outbound call.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn admin_endpoint(&self, path: &str) -> Url {
        join(&self.admin_url, path)
    }
}

fn join(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{}", base.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn bearer() -> String {
    "bearer".into()
}

impl TokenResponse {
    /// The `nonce` claim of the ID token, if there is one.
    ///
    /// The token comes straight from the token endpoint, so its signature is
    /// not checked here; a token that does not decode yields `None`.
    #[must_use]
    pub fn id_token_nonce(&self) -> Option<String> {
        let payload = self.id_token.as_deref()?.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        claims.get("nonce")?.as_str().map(str::to_owned)
    }
}

/// Client for the authorization server: token operations and the headless
/// admin flow (see [`crate::headless`]).
///
/// The underlying HTTP client never follows redirects. Protocol state in the
/// headless flow is read from `Location` headers.
#[derive(Debug, Clone)]
pub struct AuthClient {
    pub(crate) config: OAuthConfig,
    pub(crate) http: reqwest::Client,
}

impl AuthClient {
    /// Create a client with a non-redirecting HTTP client using the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: OAuthConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client. It must not follow redirects.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Interactive authorization URL for a browser redirect.
    #[must_use]
    pub fn authorization_url(&self, state: &str, nonce: &str) -> Url {
        let scope = self.config.scopes.join(" ");
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        url
    }

    /// RP-initiated logout URL.
    #[must_use]
    pub fn end_session_url(&self, id_token_hint: &str, state: &str) -> Url {
        let mut url = self.config.end_session_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("id_token_hint", id_token_hint)
                .append_pair("state", state);
            if let Some(uri) = &self.config.post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", uri.as_str());
            }
        }
        url
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `redirect_uri` must be the one the code was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::OAuth`] if the token endpoint returns an error.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        self.token_request(&params, "token exchange").await
    }

    /// Rotate tokens with a refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::OAuth`] if the token endpoint returns an error.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params, "token refresh").await
    }

    /// Introspect a token at the admin endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure or an undecodable body, or
    /// [`Error::OAuth`] if the endpoint returns an error.
    pub async fn introspect(&self, token: &str) -> Result<TokenIntrospection, Error> {
        let response = self
            .http
            .post(self.config.admin_endpoint("admin/oauth2/introspect"))
            .form(&[("token", token)])
            .send()
            .await?;

        let response = Self::ensure_success(response, "token introspection").await?;
        let raw = response.json::<RawIntrospection>().await?;
        Ok(raw.into())
    }

    /// Revoke an access or refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::OAuth`] if the revoke endpoint returns an error.
    pub async fn revoke(&self, token: &str) -> Result<(), Error> {
        let request = self
            .http
            .post(self.config.revoke_url.clone())
            .form(&self.with_client_auth(&[("token", token)]));
        let response = self.authenticate(request).send().await?;
        Self::ensure_success(response, "token revocation").await?;
        Ok(())
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let request = self
            .http
            .post(self.config.token_url.clone())
            .form(&self.with_client_auth(params));
        let response = self.authenticate(request).send().await?;

        let response = Self::ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// Public clients identify themselves in the form body.
    fn with_client_auth<'a>(&'a self, params: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut form = params.to_vec();
        if self.config.client_secret.is_none() {
            form.push(("client_id", self.config.client_id.as_str()));
        }
        form
    }

    /// Confidential clients use `client_secret_basic`.
    fn authenticate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.client_secret {
            Some(secret) => request.basic_auth(&self.config.client_id, Some(secret)),
            None => request,
        }
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    pub(crate) async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}
