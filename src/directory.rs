use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::broker::ExternalIdentity;
use crate::types::SubjectId;

/// Boxed error type returned by consumer-provided directories.
pub type DirectoryError = Box<dyn std::error::Error + Send + Sync>;

/// Local account linked to an external identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub subject_id: SubjectId,
    pub display_name: String,
    pub disabled: bool,
}

/// Display profile of a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub subject_id: SubjectId,
    pub display_name: String,
}

/// Active login configuration of the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Broker used by `GET /sso`, if any is enabled.
    #[serde(default)]
    pub broker_id: Option<String>,
    /// Whether `POST /sso` token exchange is allowed.
    #[serde(default = "enabled")]
    pub token_exchange_enabled: bool,
}

fn enabled() -> bool {
    true
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            broker_id: None,
            token_exchange_enabled: true,
        }
    }
}

/// Consumer-provided user directory.
///
/// # Example
///
/// ```rust,ignore
/// impl UserDirectory for MyDirectory {
///     async fn resolve_account(&self, identity: &ExternalIdentity)
///         -> Result<Option<LocalAccount>, DirectoryError>
///     {
///         self.db.account_by_external_id(&identity.provider, &identity.external_id).await
///     }
///     // ...
/// }
/// ```
pub trait UserDirectory: Send + Sync + 'static {
    /// Find the local account linked to an external identity, including
    /// disabled ones.
    fn resolve_account(
        &self,
        identity: &ExternalIdentity,
    ) -> impl Future<Output = Result<Option<LocalAccount>, DirectoryError>> + Send;

    /// Display profile of a subject, `None` if the subject is unknown.
    fn profile(
        &self,
        subject_id: &SubjectId,
    ) -> impl Future<Output = Result<Option<UserProfile>, DirectoryError>> + Send;

    /// Login configuration currently active for this deployment.
    fn login_config(&self) -> impl Future<Output = Result<LoginConfig, DirectoryError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_config_defaults_enable_token_exchange() {
        let config: LoginConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.broker_id, None);
        assert!(config.token_exchange_enabled);
        assert_eq!(config, LoginConfig::default());
    }
}
