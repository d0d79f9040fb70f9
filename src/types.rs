//! Core types: Symbol

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A ticker symbol, normalized to uppercase.
///
/// Option positions use their OSI key (e.g. `F----250117P00012000`), so
/// there is no length limit. Whitespace anywhere in the symbol is rejected,
/// which keeps sheet keys and API path segments unambiguous.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a ticker.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(Error::InvalidSymbol(raw.to_string()));
        }
        Ok(Symbol(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for OSI option keys: a root, then `YYMMDD`, `C` or `P`, and an
    /// eight digit strike in thousandths.
    pub fn is_option(&self) -> bool {
        let bytes = self.0.as_bytes();
        if bytes.len() <= OSI_SUFFIX_LEN {
            return false;
        }
        let suffix = &bytes[bytes.len() - OSI_SUFFIX_LEN..];
        suffix[..6].iter().all(u8::is_ascii_digit)
            && matches!(suffix[6], b'C' | b'P')
            && suffix[7..].iter().all(u8::is_ascii_digit)
    }
}

const OSI_SUFFIX_LEN: usize = 15;

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Symbol::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
