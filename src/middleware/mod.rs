//! Session orchestration routes for Axum.
//!
//! Mounts interactive login, logout, refresh and the two headless SSO
//! variants on a router, backed by a consumer-provided [`SessionStore`],
//! [`UserDirectory`] and [`AuditSink`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sso_orchestrator::middleware::{AuthConfig, auth_routes, resolve_session};
//! use sso_orchestrator::{MemorySessionStore, TracingAuditSink};
//!
//! // 1. Implement UserDirectory for your app
//! // 2. Configure from environment
//! let config = AuthConfig::from_env()?;
//!
//! // 3. Mount auth routes
//! let store = MemorySessionStore::new();
//! let app = axum::Router::new()
//!     .merge(auth_routes(config, store.clone(), directory, TracingAuditSink));
//!
//! // 4. Use resolve_session() in your middleware
//! let session = resolve_session(&store, &headers, "sso_session").await;
//! ```
//!
//! [`SessionStore`]: crate::SessionStore
//! [`UserDirectory`]: crate::UserDirectory
//! [`AuditSink`]: crate::AuditSink

mod config;
mod cookies;
mod error;
mod extractor;
mod info;
mod login;
mod logout;
mod refresh;
mod routes;
mod sso;
mod state;

pub use config::AuthConfig;
pub use error::{AuthError, ErrorBody};
pub use extractor::{AuthSession, resolve_session};
pub use routes::auth_routes;
