//! Broker error types.

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The server rejected the session (HTTP 401). Triggers one re-authorization.
    #[error("session rejected by server")]
    Unauthorized,

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },

    #[error("not connected")]
    NotConnected,

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("token file {path}: {message}")]
    TokenFile { path: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    pub(crate) fn parse(what: &'static str, err: impl std::fmt::Display) -> Self {
        BrokerError::Parse {
            what,
            message: err.to_string(),
        }
    }
}
