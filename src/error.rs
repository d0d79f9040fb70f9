//! Validation errors for domain values and sheet schemas.

/// Errors returned when raw input (broker payloads, sheet cells, journal
/// entries) cannot be turned into domain values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Ticker is empty or contains whitespace.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Trade type string is not one of the known kinds.
    #[error("unknown trade type: {0:?}")]
    UnknownTradeKind(String),

    /// Date string matched none of the accepted layouts.
    #[error("invalid date: {0:?}")]
    InvalidDate(String),

    /// Sheet has no header row at all.
    #[error("sheet '{sheet}' has no header row")]
    MissingHeader { sheet: &'static str },

    /// A required column could not be found in the header row.
    #[error("sheet '{sheet}' is missing required column '{column}'")]
    MissingColumn {
        sheet: &'static str,
        column: &'static str,
    },

    /// Two header cells resolve to the same column.
    #[error("sheet '{sheet}' has duplicate column '{column}'")]
    DuplicateColumn { sheet: &'static str, column: String },
}

pub type Result<T> = std::result::Result<T, Error>;
