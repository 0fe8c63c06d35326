#![doc = include_str!("../README.md")]

pub mod audit;
pub mod broker;
pub mod directory;
pub mod error;
pub mod headless;
pub mod introspection;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod oauth;
pub mod random;
pub mod session;
pub mod types;

// Re-exports for convenient access
pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use broker::{BrokerClient, BrokerConfig, BrokerRegistry, BrokerTokens, ExternalIdentity};
pub use directory::{DirectoryError, LocalAccount, LoginConfig, UserDirectory, UserProfile};
pub use error::Error;
pub use headless::{HeadlessGrant, ProviderCookies, ResponseType, TokenInfo};
pub use introspection::{RealNameContext, TokenIntrospection, Visitor};
pub use oauth::{AuthClient, OAuthConfig, TokenResponse};
pub use session::{MemorySessionStore, SessionRecord, SessionStatus, SessionStore, StoreError};
pub use types::{
    AccountType, ClientType, CookiePair, DeviceInfo, Platform, SessionId, SubjectId, VisitorType,
};
