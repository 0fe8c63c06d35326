use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::random;
use crate::types::{Platform, SessionId, SubjectId, VisitorType};

/// Boxed error type returned by consumer-provided stores.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Where a session is in the login state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// `state` and `nonce` issued, waiting for the authorization callback.
    #[default]
    PendingLogin,
    /// Tokens exchanged and the subject resolved.
    Authenticated,
}

/// Durable representation of one browser or programmatic session.
///
/// One record per session id. The record is updated in place; `csrf_state`
/// is set when the record is created and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    csrf_state: String,
    pub nonce: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub redirect_target: Option<String>,
    #[serde(default)]
    pub subject_id: SubjectId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub visitor_type: Option<VisitorType>,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub id_token: String,
    #[serde(default)]
    pub sso: bool,
}

impl SessionRecord {
    /// Create a pending record with a fresh `state` and `nonce`.
    #[must_use]
    pub fn pending(id: SessionId, platform: Platform, redirect_target: Option<String>) -> Self {
        Self::with_state(id, random::generate_state(), random::generate_nonce())
            .with_resume(platform, redirect_target)
    }

    /// Create a pending record around an already-issued `state` and `nonce`.
    #[must_use]
    pub fn with_state(id: SessionId, csrf_state: String, nonce: String) -> Self {
        Self {
            id,
            csrf_state,
            nonce,
            status: SessionStatus::PendingLogin,
            platform: Platform::default(),
            redirect_target: None,
            subject_id: SubjectId::default(),
            display_name: String::new(),
            visitor_type: None,
            access_token: String::new(),
            refresh_token: String::new(),
            id_token: String::new(),
            sso: false,
        }
    }

    #[must_use]
    fn with_resume(mut self, platform: Platform, redirect_target: Option<String>) -> Self {
        self.platform = platform;
        self.redirect_target = redirect_target;
        self
    }

    /// The anti-forgery `state` issued when this record was created.
    #[must_use]
    pub fn csrf_state(&self) -> &str {
        &self.csrf_state
    }

    /// Constant-shape comparison of a callback `state` against the stored one.
    #[must_use]
    pub fn state_matches(&self, received: &str) -> bool {
        !self.csrf_state.is_empty()
            && self.csrf_state.len() == received.len()
            && self
                .csrf_state
                .bytes()
                .zip(received.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// Update the resume parameters of an in-flight login.
    ///
    /// Returns `true` when anything changed.
    pub fn resume_with(&mut self, platform: Platform, redirect_target: Option<String>) -> bool {
        let changed = self.platform != platform || self.redirect_target != redirect_target;
        self.platform = platform;
        self.redirect_target = redirect_target;
        changed
    }

    /// Drop tokens and identity so the record can go through login again.
    /// `csrf_state` and `nonce` are kept.
    pub fn reset_to_pending(&mut self) {
        self.status = SessionStatus::PendingLogin;
        self.sso = false;
        self.subject_id = SubjectId::default();
        self.display_name.clear();
        self.visitor_type = None;
        self.access_token.clear();
        self.refresh_token.clear();
        self.id_token.clear();
    }
}

/// Consumer-provided session persistence.
///
/// The store is the only synchronization point between requests; concurrent
/// writes to one id are last-writer-wins.
pub trait SessionStore: Send + Sync + 'static {
    /// Look up a record. Expired records are reported as `None`.
    fn get(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send;

    /// Insert or overwrite the record under `record.id`, expiring after `ttl`.
    fn set(
        &self,
        record: &SessionRecord,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a record. Removing a missing record is not an error.
    fn delete(&self, session_id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

struct Entry {
    payload: String,
    expires_at: Instant,
}

/// Writes between two sweeps of expired records.
const PURGE_EVERY_WRITES: usize = 256;

/// In-process, TTL-bound session store.
///
/// Records are kept serialized as JSON, the same shape a remote key-value
/// store would hold. Clones share the same map. Expired records are evicted
/// when read and swept every [`PURGE_EVERY_WRITES`] writes.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<SessionId, Entry>>>,
    writes: Arc<AtomicUsize>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Purged expired sessions");
        }
        removed
    }
}

fn poisoned() -> StoreError {
    "session store lock poisoned".into()
}

impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let payload = {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            match entries.get(session_id) {
                Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
                Some(_) => None,
                None => return Ok(None),
            }
        };
        let Some(payload) = payload else {
            let mut entries = self.entries.write().map_err(|_| poisoned())?;
            // Re-check: a concurrent `set` may have refreshed the record.
            if entries
                .get(session_id)
                .is_some_and(|e| e.expires_at <= Instant::now())
            {
                entries.remove(session_id);
            }
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&payload)?))
    }

    async fn set(&self, record: &SessionRecord, ttl: Duration) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        let entry = Entry {
            payload,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(record.id.clone(), entry);
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY_WRITES == 0 {
            self.purge_expired();
        }
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .remove(session_id);
        Ok(())
    }
}
