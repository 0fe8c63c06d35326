//! Headless login/consent flow driven through the admin API.
//!
//! The six calls below form one transaction and must run in order:
//!
//! 1. [`AuthClient::authorize_request`]: start an authorization, read the login challenge
//! 2. [`AuthClient::get_login_request_info`]: client metadata of the challenge
//! 3. [`AuthClient::accept_login_request`]: accept the login for a subject
//! 4. [`AuthClient::verify_login_request`]: follow the login verifier, read the consent challenge
//! 5. [`AuthClient::accept_consent_request`]: grant scopes and visitor context
//! 6. [`AuthClient::verify_consent`]: follow the consent verifier, read the grant
//!
//! Cookies set by the authorization server at steps 1 and 4 belong to its own
//! short-lived login/consent session and are forwarded, unfiltered, to the
//! following verify step.

use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::Error;
use crate::oauth::AuthClient;
use crate::random;
use crate::types::{AccountType, ClientType, DeviceInfo, SubjectId, VisitorType};

/// OAuth `response_type` requested from the authorize endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Code,
    Token,
    TokenIdToken,
}

impl ResponseType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
            Self::TokenIdToken => "token id_token",
        }
    }
}

/// What the final consent redirect carried, per response type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenInfo {
    Code {
        code: String,
        scope: String,
    },
    Token {
        access_token: String,
        expires_in: u64,
        scope: String,
        token_type: String,
        /// Present for `token id_token`.
        id_token: Option<String>,
    },
}

/// Cookies collected from `Set-Cookie` headers, as `name=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCookies(Vec<String>);

impl ProviderCookies {
    fn collect(response: &reqwest::Response) -> Self {
        let pairs = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(|pair| pair.trim().to_string())
            .filter(|pair| pair.contains('='))
            .collect();
        Self(pairs)
    }

    /// Add `newer` cookies, replacing same-named ones.
    #[must_use]
    pub fn merged(mut self, newer: Self) -> Self {
        for pair in newer.0 {
            let name = cookie_name(&pair).to_string();
            self.0.retain(|existing| cookie_name(existing) != name);
            self.0.push(pair);
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of a single `Cookie` request header.
    #[must_use]
    pub fn header_value(&self) -> String {
        self.0.join("; ")
    }

    #[must_use]
    pub fn pairs(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for ProviderCookies {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

fn cookie_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(name, _)| name)
}

/// Result of step 1.
#[derive(Debug, Clone)]
pub struct LoginChallenge {
    pub challenge: String,
    pub cookies: ProviderCookies,
}

/// Result of step 4.
#[derive(Debug, Clone)]
pub struct ConsentChallenge {
    pub challenge: String,
    pub cookies: ProviderCookies,
}

/// Outcome of a complete headless login.
#[derive(Debug, Clone)]
pub struct HeadlessGrant {
    pub token_info: TokenInfo,
    pub device: DeviceInfo,
    /// Redirect URI the authorization was started with; needed to redeem a code.
    pub redirect_uri: Url,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    client: Option<LoginRequestClient>,
}

#[derive(Deserialize)]
struct LoginRequestClient {
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RedirectTo {
    redirect_to: String,
}

impl AuthClient {
    /// Redirect URI of the headless flow: the configured callback on `access_host`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `access_host` is not a valid `host[:port]`.
    pub fn headless_redirect_uri(&self, access_host: &str) -> Result<Url, Error> {
        let mut uri = self.config.redirect_uri.clone();
        if access_host.is_empty() {
            return Ok(uri);
        }
        let host = Url::parse(&format!("{}://{access_host}", uri.scheme()))
            .map_err(|e| Error::Config(format!("invalid access host {access_host:?}: {e}")))?;
        uri.set_host(host.host_str())
            .map_err(|e| Error::Config(format!("invalid access host {access_host:?}: {e}")))?;
        uri.set_port(host.port())
            .map_err(|()| Error::Config(format!("access host {access_host:?} cannot carry a port")))?;
        Ok(uri)
    }

    /// Step 1: start an authorization without a browser.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] unless the endpoint redirects with a `login_challenge`.
    pub async fn authorize_request(
        &self,
        response_type: ResponseType,
        access_host: &str,
        state: &str,
    ) -> Result<LoginChallenge, Error> {
        const OP: &str = "authorize request";

        let redirect_uri = self.headless_redirect_uri(access_host)?;
        let scope = self.config.scopes.join(" ");
        let nonce = random::generate_nonce();
        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", response_type.as_str())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("nonce", &nonce);

        let response = self.http.get(url).send().await?;
        let location = redirect_location(&response, OP)?;
        let cookies = ProviderCookies::collect(&response);
        let challenge = query_value(&location, "login_challenge")
            .ok_or_else(|| Error::protocol(OP, "redirect without login_challenge"))?;

        tracing::debug!(operation = OP, cookies = cookies.pairs().len(), "Login challenge issued");
        Ok(LoginChallenge { challenge, cookies })
    }

    /// Step 2: read the client metadata of a login challenge.
    ///
    /// # Errors
    ///
    /// [`Error::OAuth`] on a non-success status, [`Error::Http`] on transport
    /// or decoding failure.
    pub async fn get_login_request_info(&self, login_challenge: &str) -> Result<DeviceInfo, Error> {
        let mut url = self.config.admin_endpoint("admin/oauth2/auth/requests/login");
        url.query_pairs_mut()
            .append_pair("login_challenge", login_challenge);

        let response = self.http.get(url).send().await?;
        let response = require_ok(response, "get login request").await?;
        let request = response.json::<LoginRequest>().await?;

        let Some(client) = request.client else {
            return Ok(DeviceInfo::default());
        };
        let meta = |key: &str| {
            client
                .metadata
                .as_ref()
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Ok(DeviceInfo {
            name: client.client_name.clone().unwrap_or_default(),
            client_type: meta("client_type"),
            description: meta("description"),
        })
    }

    /// Step 3: accept the login for `subject_id`, returning the verifier URL.
    ///
    /// # Errors
    ///
    /// [`Error::OAuth`] on a non-success status.
    pub async fn accept_login_request(
        &self,
        subject_id: &SubjectId,
        login_challenge: &str,
    ) -> Result<Url, Error> {
        let mut url = self
            .config
            .admin_endpoint("admin/oauth2/auth/requests/login/accept");
        url.query_pairs_mut()
            .append_pair("login_challenge", login_challenge);

        let response = self
            .http
            .put(url)
            .json(&json!({ "subject": subject_id.as_str() }))
            .send()
            .await?;
        let response = require_ok(response, "accept login request").await?;
        parse_redirect_to(response, "accept login request").await
    }

    /// Step 4: follow the login verifier, carrying the step-1 cookies.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] unless the server redirects with a `consent_challenge`.
    pub async fn verify_login_request(
        &self,
        redirect_url: &Url,
        cookies: &ProviderCookies,
    ) -> Result<ConsentChallenge, Error> {
        const OP: &str = "verify login request";

        let response = self.get_with_cookies(redirect_url, cookies).send().await?;
        let location = redirect_location(&response, OP)?;
        let received = ProviderCookies::collect(&response);
        let challenge = query_value(&location, "consent_challenge")
            .ok_or_else(|| Error::protocol(OP, "redirect without consent_challenge"))?;

        Ok(ConsentChallenge {
            challenge,
            cookies: cookies.clone().merged(received),
        })
    }

    /// Step 5: grant the default scopes with a synthetic visitor context, so
    /// introspection of the minted tokens reports a real-name visitor.
    ///
    /// # Errors
    ///
    /// [`Error::OAuth`] on a non-success status.
    pub async fn accept_consent_request(
        &self,
        consent_challenge: &str,
        client_type: ClientType,
    ) -> Result<Url, Error> {
        let mut url = self
            .config
            .admin_endpoint("admin/oauth2/auth/requests/consent/accept");
        url.query_pairs_mut()
            .append_pair("consent_challenge", consent_challenge);

        let ext = json!({
            "visitor_type": VisitorType::RealName.as_str(),
            "account_type": AccountType::Personal.as_str(),
            "client_type": client_type.as_str(),
        });
        let body = json!({
            "grant_scope": self.config.scopes,
            "remember": false,
            "session": {
                "access_token": ext,
                "id_token": ext,
            },
        });

        let response = self.http.put(url).json(&body).send().await?;
        let response = require_ok(response, "accept consent request").await?;
        parse_redirect_to(response, "accept consent request").await
    }

    /// Step 6: follow the consent verifier and read the grant from the final
    /// redirect.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] on any status but 302/303, or when a value required
    /// by `response_type` is missing.
    pub async fn verify_consent(
        &self,
        redirect_url: &Url,
        response_type: ResponseType,
        cookies: &ProviderCookies,
    ) -> Result<TokenInfo, Error> {
        const OP: &str = "verify consent";

        let response = self.get_with_cookies(redirect_url, cookies).send().await?;
        let location = redirect_location(&response, OP)?;
        if let Some(error) = query_value(&location, "error") {
            let desc = query_value(&location, "error_description").unwrap_or_default();
            return Err(Error::protocol(OP, format!("{error}: {desc}")));
        }
        parse_token_info(&location, response_type)
    }

    /// Run all six steps for `subject_id`.
    ///
    /// # Errors
    ///
    /// The first failing step's error; later steps are not attempted.
    pub async fn headless_login(
        &self,
        subject_id: &SubjectId,
        response_type: ResponseType,
        access_host: &str,
        client_type: ClientType,
    ) -> Result<HeadlessGrant, Error> {
        let redirect_uri = self.headless_redirect_uri(access_host)?;
        let state = random::generate_state();

        let login = self
            .authorize_request(response_type, access_host, &state)
            .await?;
        let device = self.get_login_request_info(&login.challenge).await?;
        let verifier = self
            .accept_login_request(subject_id, &login.challenge)
            .await?;
        let consent = self.verify_login_request(&verifier, &login.cookies).await?;
        let verifier = self
            .accept_consent_request(&consent.challenge, client_type)
            .await?;
        let token_info = self
            .verify_consent(&verifier, response_type, &consent.cookies)
            .await?;

        tracing::info!(
            subject_id = %subject_id,
            response_type = response_type.as_str(),
            device = %device.name,
            "Headless login completed"
        );
        Ok(HeadlessGrant {
            token_info,
            device,
            redirect_uri,
        })
    }

    fn get_with_cookies(&self, url: &Url, cookies: &ProviderCookies) -> reqwest::RequestBuilder {
        let request = self.http.get(url.clone());
        if cookies.is_empty() {
            request
        } else {
            request.header(COOKIE, cookies.header_value())
        }
    }
}

/// Requires a 302/303 and returns its resolved `Location`.
fn redirect_location(response: &reqwest::Response, operation: &'static str) -> Result<Url, Error> {
    let status = response.status();
    tracing::debug!(operation, status = status.as_u16(), "Headless step answered");
    if status != StatusCode::FOUND && status != StatusCode::SEE_OTHER {
        return Err(Error::protocol(
            operation,
            format!("expected a redirect, got status {status}"),
        ));
    }
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::protocol(operation, "redirect without Location header"))?;
    response
        .url()
        .join(location)
        .map_err(|e| Error::protocol(operation, format!("invalid Location {location:?}: {e}")))
}

async fn require_ok(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    tracing::debug!(operation, status = response.status().as_u16(), "Headless step answered");
    if response.status() == StatusCode::OK {
        return Ok(response);
    }
    AuthClient::ensure_success(response, operation)
        .await
        .and_then(|r| {
            Err(Error::protocol(
                operation,
                format!("expected status 200, got {}", r.status()),
            ))
        })
}

async fn parse_redirect_to(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<Url, Error> {
    let body = response.json::<RedirectTo>().await?;
    Url::parse(&body.redirect_to)
        .map_err(|e| Error::protocol(operation, format!("invalid redirect_to: {e}")))
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn fragment_value(url: &Url, key: &str) -> Option<String> {
    let fragment = url.fragment()?;
    url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn parse_token_info(location: &Url, response_type: ResponseType) -> Result<TokenInfo, Error> {
    const OP: &str = "verify consent";
    let missing = |key: &str| Error::protocol(OP, format!("redirect without {key}"));

    match response_type {
        ResponseType::Code => Ok(TokenInfo::Code {
            code: query_value(location, "code").ok_or_else(|| missing("code"))?,
            scope: query_value(location, "scope").ok_or_else(|| missing("scope"))?,
        }),
        ResponseType::Token | ResponseType::TokenIdToken => {
            let field = |key: &str| fragment_value(location, key).ok_or_else(|| missing(key));
            let expires_in = field("expires_in")?
                .parse::<u64>()
                .map_err(|e| Error::protocol(OP, format!("invalid expires_in: {e}")))?;
            let id_token = match response_type {
                ResponseType::TokenIdToken => Some(field("id_token")?),
                _ => None,
            };
            Ok(TokenInfo::Token {
                access_token: field("access_token")?,
                expires_in,
                scope: field("scope")?,
                token_type: field("token_type")?,
                id_token,
            })
        }
    }
}
