use std::sync::{Arc, OnceLock};

use axum::http::HeaderMap;
use axum::http::header::HOST;

use super::config::AuthSettings;
use super::error::AuthError;
use crate::audit::{AuditEvent, AuditSink};
use crate::broker::BrokerRegistry;
use crate::directory::UserDirectory;
use crate::oauth::AuthClient;
use crate::session::{SessionRecord, SessionStore};
use crate::types::SessionId;

/// Shared state for auth route handlers.
pub(super) struct AuthState<S, D, A> {
    pub(super) client: Arc<AuthClient>,
    pub(super) brokers: Arc<BrokerRegistry>,
    pub(super) token_exchange_broker: Option<Arc<str>>,
    pub(super) store: Arc<S>,
    pub(super) directory: Arc<D>,
    pub(super) audit: Arc<A>,
    pub(super) settings: Arc<AuthSettings>,
    /// Deployment host resolved from the first request when not configured.
    pub(super) host_cache: Arc<OnceLock<String>>,
}

// Manual Clone: avoid derive adding `S: Clone, D: Clone, A: Clone` bounds.
impl<S, D, A> Clone for AuthState<S, D, A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            brokers: self.brokers.clone(),
            token_exchange_broker: self.token_exchange_broker.clone(),
            store: self.store.clone(),
            directory: self.directory.clone(),
            audit: self.audit.clone(),
            settings: self.settings.clone(),
            host_cache: self.host_cache.clone(),
        }
    }
}

impl<S: SessionStore, D: UserDirectory, A: AuditSink> AuthState<S, D, A> {
    pub(super) async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, AuthError> {
        self.store.get(id).await.map_err(|e| {
            tracing::error!(session_id = %id, error = %e, "Session lookup failed");
            AuthError::store(e)
        })
    }

    pub(super) async fn persist(&self, record: &SessionRecord) -> Result<(), AuthError> {
        self.store
            .set(record, self.settings.session_ttl())
            .await
            .map_err(|e| {
                tracing::error!(session_id = %record.id, error = %e, "Session write failed");
                AuthError::store(e)
            })
    }

    /// Emit an audit event. Callers invoke this only after the store commit.
    pub(super) async fn audit(&self, event: AuditEvent) {
        self.audit.record(event).await;
    }

    /// Host headless logins are started for.
    pub(super) fn access_host(&self, headers: &HeaderMap) -> Result<&str, AuthError> {
        if let Some(host) = &self.settings.deployment_host {
            return Ok(host);
        }
        if let Some(host) = self.host_cache.get() {
            return Ok(host);
        }
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AuthError::Config("deployment host is not configured".into()))?;
        Ok(self.host_cache.get_or_init(|| host.to_string()))
    }
}
