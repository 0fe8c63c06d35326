//! Typed token introspection (RFC 7662).
//!
//! The authorization server returns visitor context in the free-form `ext`
//! object. Which fields are meaningful depends on the visitor type, so the
//! context is decoded into [`Visitor`] and real-name fields are only reachable
//! through [`Visitor::RealName`].

use serde::{Deserialize, Serialize};

use crate::types::{AccountType, ClientType, SubjectId, VisitorType};

/// Context carried only by real-name human visitors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealNameContext {
    pub login_ip: Option<String>,
    pub device_id: Option<String>,
    pub account_type: Option<AccountType>,
    pub client_type: Option<ClientType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "visitor_type", rename_all = "snake_case")]
pub enum Visitor {
    RealName(RealNameContext),
    Anonymous { client_type: Option<ClientType> },
    ServiceAccount,
}

impl Visitor {
    #[must_use]
    pub fn visitor_type(&self) -> VisitorType {
        match self {
            Self::RealName(_) => VisitorType::RealName,
            Self::Anonymous { .. } => VisitorType::Anonymous,
            Self::ServiceAccount => VisitorType::ServiceAccount,
        }
    }

    /// Real-name context, or `None` for any other visitor type.
    #[must_use]
    pub fn real_name(&self) -> Option<&RealNameContext> {
        match self {
            Self::RealName(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// Decoded introspection response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIntrospection {
    pub active: bool,
    pub subject_id: SubjectId,
    pub scope: String,
    pub client_id: String,
    /// `None` for inactive tokens and for unrecognised visitor types.
    pub visitor: Option<Visitor>,
}

impl TokenIntrospection {
    #[must_use]
    pub fn visitor_type(&self) -> Option<VisitorType> {
        self.visitor.as_ref().map(Visitor::visitor_type)
    }
}

/// Wire shape of the introspection response.
#[derive(Debug, Deserialize)]
pub(crate) struct RawIntrospection {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    ext: Option<RawExt>,
}

#[derive(Debug, Default, Deserialize)]
struct RawExt {
    #[serde(default)]
    visitor_type: Option<String>,
    #[serde(default)]
    login_ip: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    account_type: Option<String>,
    #[serde(default)]
    client_type: Option<String>,
}

impl From<RawIntrospection> for TokenIntrospection {
    fn from(raw: RawIntrospection) -> Self {
        let visitor = raw
            .active
            .then(|| decode_visitor(raw.ext.unwrap_or_default()))
            .flatten();
        Self {
            active: raw.active,
            subject_id: SubjectId(raw.sub.unwrap_or_default()),
            scope: raw.scope.unwrap_or_default(),
            client_id: raw.client_id.unwrap_or_default(),
            visitor,
        }
    }
}

// Unknown account and client types in `ext` decode to `None` rather than
// failing the whole introspection. An unknown visitor type yields no visitor
// at all so its context never reaches the real-name fields.
fn decode_visitor(ext: RawExt) -> Option<Visitor> {
    let client_type = ext.client_type.as_deref().and_then(|s| s.parse().ok());
    match ext.visitor_type.as_deref().map(str::parse::<VisitorType>) {
        Some(Ok(VisitorType::Anonymous)) => Some(Visitor::Anonymous { client_type }),
        Some(Ok(VisitorType::ServiceAccount)) => Some(Visitor::ServiceAccount),
        // Tokens minted by an interactive consent without ext are human logins.
        Some(Ok(VisitorType::RealName)) | None => Some(Visitor::RealName(RealNameContext {
            login_ip: ext.login_ip.filter(|s| !s.is_empty()),
            device_id: ext.device_id.filter(|s| !s.is_empty()),
            account_type: ext.account_type.as_deref().and_then(|s| s.parse().ok()),
            client_type,
        })),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Unrecognised visitor type in introspection");
            None
        }
    }
}
