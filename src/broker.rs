//! Identity broker clients.
//!
//! A broker is an external system that vouches for an identity: it either
//! verifies a token it issued ([`BrokerClient::verify_token`]) or runs a
//! complete single sign-on with whatever credential parameters the caller
//! forwards ([`BrokerClient::sso`]).

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::headless::ResponseType;
use crate::oauth::AuthClient;

/// Endpoints of one broker.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BrokerConfig {
    pub(crate) id: String,
    pub(crate) verify_url: Url,
    pub(crate) sso_url: Url,
}

impl BrokerConfig {
    /// Create a config with endpoints derived from `base_url`
    /// (`/token/verify` and `/sso`).
    #[must_use]
    pub fn new(id: impl Into<String>, base_url: &Url) -> Self {
        let mut verify_url = base_url.clone();
        verify_url.set_path(&format!("{}/token/verify", base_url.path().trim_end_matches('/')));
        let mut sso_url = base_url.clone();
        sso_url.set_path(&format!("{}/sso", base_url.path().trim_end_matches('/')));
        Self {
            id: id.into(),
            verify_url,
            sso_url,
        }
    }

    /// Override the token verification endpoint.
    #[must_use]
    pub fn with_verify_url(mut self, url: Url) -> Self {
        self.verify_url = url;
        self
    }

    /// Override the SSO endpoint.
    #[must_use]
    pub fn with_sso_url(mut self, url: Url) -> Self {
        self.sso_url = url;
        self
    }

    /// Registry key of this broker.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Identity asserted by a broker for an external token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Id of the broker that asserted the identity.
    #[serde(default)]
    pub provider: String,
    pub external_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens returned directly by a broker SSO.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// HTTP client for one broker.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    config: BrokerConfig,
    http: reqwest::Client,
}

impl BrokerClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: BrokerConfig, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { config, http })
    }

    /// Registry key of this broker.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Verify an externally issued token.
    ///
    /// # Errors
    ///
    /// [`Error::ExternalTokenRejected`] when the broker refuses the token as
    /// expired or invalid (400/401/403), [`Error::OAuth`] for other failures.
    pub async fn verify_token(&self, token: &str) -> Result<ExternalIdentity, Error> {
        let response = self
            .http
            .post(self.config.verify_url.clone())
            .bearer_auth(token)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(broker = %self.config.id, "External token rejected");
            return Err(Error::ExternalTokenRejected(body));
        }

        let response = AuthClient::ensure_success(response, "broker token verification").await?;
        let mut identity = response.json::<ExternalIdentity>().await?;
        if identity.external_id.is_empty() {
            return Err(Error::protocol(
                "broker token verification",
                "empty external_id",
            ));
        }
        identity.provider.clone_from(&self.config.id);
        Ok(identity)
    }

    /// Run the broker's single sign-on with caller-supplied parameters.
    ///
    /// # Errors
    ///
    /// [`Error::OAuth`] on a non-success status, [`Error::Http`] on transport
    /// or decoding failure.
    pub async fn sso(
        &self,
        params: &[(String, String)],
        response_type: ResponseType,
    ) -> Result<BrokerTokens, Error> {
        let mut form: Vec<(&str, &str)> = params
            .iter()
            .filter(|(k, _)| k != "response_type")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        form.push(("response_type", response_type.as_str()));

        let response = self
            .http
            .post(self.config.sso_url.clone())
            .form(&form)
            .send()
            .await?;
        let response = AuthClient::ensure_success(response, "broker sso").await?;
        let tokens = response.json::<BrokerTokens>().await?;

        if response_type == ResponseType::TokenIdToken && tokens.id_token.is_none() {
            return Err(Error::protocol("broker sso", "response without id_token"));
        }
        Ok(tokens)
    }
}

/// Brokers available to this deployment, keyed by broker id.
#[derive(Debug, Clone, Default)]
pub struct BrokerRegistry {
    brokers: HashMap<String, BrokerClient>,
}

impl BrokerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_broker(mut self, broker: BrokerClient) -> Self {
        self.brokers.insert(broker.id().to_string(), broker);
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BrokerClient> {
        self.brokers.get(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}
