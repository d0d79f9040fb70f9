//! Persisted OAuth tokens.
//!
//! Tokens are stored as JSON files. A missing or unreadable file is treated
//! as "no token" so a corrupt cache never blocks re-authorization.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Seconds shaved off an access token's lifetime before it is considered expired.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime of a Schwab refresh token.
pub const REFRESH_LIFETIME_DAYS: i64 = 7;

/// E*TRADE access token. Valid for the calendar day it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub token: String,
    pub secret: String,
    pub issued_date: NaiveDate,
}

impl OAuthToken {
    pub fn is_valid_on(&self, today: NaiveDate) -> bool {
        self.issued_date == today && !self.token.is_empty()
    }
}

/// Schwab OAuth2 token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchwabToken {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
    pub refresh_issued_at: DateTime<Utc>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl SchwabToken {
    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && now < self.issued_at + Duration::seconds(self.expires_in - EXPIRY_MARGIN_SECS)
    }

    pub fn refresh_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.refresh_token.is_empty()
            && now < self.refresh_issued_at + Duration::days(REFRESH_LIFETIME_DAYS)
    }
}

/// A JSON file holding one token.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the token, `None` if absent or unreadable.
    pub fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cannot read token file {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("ignoring corrupt token file {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Write the token atomically (temp file + rename), owner-only on unix.
    pub fn save<T: Serialize>(&self, token: &T) -> Result<(), BrokerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let json = serde_json::to_string_pretty(token).map_err(|e| self.error(e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| self.error(e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|e| self.error(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.error(e))
    }

    /// Remove the file. Missing is not an error.
    pub fn delete(&self) -> Result<(), BrokerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }

    fn error(&self, err: impl std::fmt::Display) -> BrokerError {
        BrokerError::TokenFile {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}
