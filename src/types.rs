use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Opaque session identifier (ULID string), carried in the session cookie.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into, Default,
)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a fresh, unguessable session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Subject identifier of a local account (OAuth `sub` claim).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into, Default,
)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A string did not name any variant of one of the enumerated mappings below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Front end the browser session was started from.
///
/// Browsers pass it as a numeric code (`?platform=1`); the code selects the
/// success landing page after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Web,
    Desktop,
    Mobile,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Web, Platform::Desktop, Platform::Mobile];

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Web => 1,
            Self::Desktop => 2,
            Self::Mobile => 3,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Web),
            2 => Some(Self::Desktop),
            3 => Some(Self::Mobile),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = ParseEnumError;

    /// Accepts either the numeric code or the lowercase name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| ParseEnumError::new("platform", s));
        }
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("platform", s))
    }
}

/// Classification of the authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorType {
    RealName,
    Anonymous,
    ServiceAccount,
}

impl VisitorType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RealName => "real_name",
            Self::Anonymous => "anonymous",
            Self::ServiceAccount => "service_account",
        }
    }
}

impl std::str::FromStr for VisitorType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real_name" => Ok(Self::RealName),
            "anonymous" => Ok(Self::Anonymous),
            "service_account" => Ok(Self::ServiceAccount),
            other => Err(ParseEnumError::new("visitor type", other)),
        }
    }
}

/// Kind of local account a real-name visitor signed in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Personal,
    Enterprise,
    Admin,
}

impl AccountType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Enterprise => "enterprise",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "enterprise" => Ok(Self::Enterprise),
            "admin" => Ok(Self::Admin),
            other => Err(ParseEnumError::new("account type", other)),
        }
    }
}

/// Kind of OAuth client a token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    #[default]
    Web,
    Desktop,
    Mobile,
    Cli,
}

impl ClientType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Cli => "cli",
        }
    }
}

impl std::str::FromStr for ClientType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            "cli" => Ok(Self::Cli),
            other => Err(ParseEnumError::new("client type", other)),
        }
    }
}

impl From<Platform> for ClientType {
    fn from(p: Platform) -> Self {
        match p {
            Platform::Web => Self::Web,
            Platform::Desktop => Self::Desktop,
            Platform::Mobile => Self::Mobile,
        }
    }
}

/// Client metadata of one login challenge, as reported by the admin API.
///
/// Missing metadata is not an error; every field defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub client_type: String,
    pub description: String,
}

/// Session id and access token as the browser presents them.
///
/// Transport only: the stored session record is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookiePair {
    pub session_id: Option<SessionId>,
    pub access_token: Option<String>,
}
