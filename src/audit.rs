use std::future::Future;

use serde::Serialize;

use crate::types::{Platform, SessionId, SubjectId};

/// Post-commit session events.
///
/// Emitted only after the session record was written (login) or deleted
/// (logout), so an event never names a session the store does not agree with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Login {
        session_id: SessionId,
        subject_id: SubjectId,
        platform: Platform,
        sso: bool,
    },
    Logout {
        session_id: SessionId,
        subject_id: SubjectId,
        sso: bool,
    },
}

/// Receiver of audit events. Formatting and shipping are the sink's concern.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, event: AuditEvent) -> impl Future<Output = ()> + Send;
}

/// Writes audit events as structured `tracing` records under target `audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::Login {
                session_id,
                subject_id,
                platform,
                sso,
            } => tracing::info!(
                target: "audit",
                session_id = %session_id,
                subject_id = %subject_id,
                platform = platform.as_str(),
                sso,
                "login"
            ),
            AuditEvent::Logout {
                session_id,
                subject_id,
                sso,
            } => tracing::info!(
                target: "audit",
                session_id = %session_id,
                subject_id = %subject_id,
                sso,
                "logout"
            ),
        }
    }
}
