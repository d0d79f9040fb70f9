//! Error types for the tracker.

use std::path::PathBuf;

use divtrack_broker::BrokerError;

/// All errors that can occur during tracker operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("{broker}: {source}")]
    Broker {
        broker: String,
        source: BrokerError,
    },

    #[error("no broker session could be established")]
    NoBrokers,

    #[error("workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    #[error("workbook schema: {0}")]
    Schema(#[from] divtrack::Error),

    #[error("workbook is locked by another run ({0}); remove the lock file if no other run is active")]
    Locked(PathBuf),

    #[error("failed to read trade journal {path}: {source}")]
    JournalRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse trade journal: {0}")]
    JournalParse(#[from] serde_json::Error),

    #[error("alert failed: {0}")]
    Alert(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    pub fn broker(broker: &str, source: BrokerError) -> Self {
        Error::Broker {
            broker: broker.to_string(),
            source,
        }
    }

    pub fn workbook(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Error::Workbook {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Workbook schema and lock problems exit with a distinct status.
    pub fn is_workbook_error(&self) -> bool {
        matches!(self, Error::Schema(_) | Error::Locked(_) | Error::Workbook { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
