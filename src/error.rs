/// Errors returned by the outbound clients (authorization server, brokers).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport failure, timeout, or an undecodable JSON body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote endpoint answered with a non-success status.
    #[error("{operation} failed with status {status:?}: {detail}")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// The remote endpoint answered, but not in the shape the protocol requires
    /// (unexpected status, missing redirect parameter, malformed URL).
    #[error("{operation}: {detail}")]
    Protocol {
        operation: &'static str,
        detail: String,
    },

    /// An identity broker refused the external token as expired or invalid.
    #[error("external token rejected: {0}")]
    ExternalTokenRejected(String),

    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn protocol(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            operation,
            detail: detail.into(),
        }
    }
}
