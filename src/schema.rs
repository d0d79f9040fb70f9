//! Named-column sheet schemas.
//!
//! The workbook is both report and database, so every sheet that is read
//! back declares its columns by header text. Loading resolves each header to
//! its current position; nothing downstream uses a hard-coded column number.
//! Header matching ignores case and repeated whitespace.
//!
//! The Dividends sheet additionally carries one history column per snapshot
//! date, headed `Yield YYYY-MM-DD`.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::format::parse_date;

/// A named column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Column {
    pub header: &'static str,
    /// Loading fails when a required column is absent.
    pub required: bool,
}

const fn required(header: &'static str) -> Column {
    Column {
        header,
        required: true,
    }
}

const fn optional(header: &'static str) -> Column {
    Column {
        header,
        required: false,
    }
}

/// Layout of one sheet. `columns` is also the write order.
#[derive(Clone, Copy, Debug)]
pub struct SheetSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Whether dated `Yield …` history columns follow the fixed columns.
    pub history: bool,
}

pub mod dividends {
    use super::{Column, optional, required};

    pub const TICKER: Column = required("Ticker");
    pub const ACCOUNT: Column = required("Account");
    pub const QUANTITY: Column = required("Quantity");
    pub const PRICE_PAID: Column = optional("Price Paid");
    pub const CURRENT_PRICE: Column = optional("Current Price");
    pub const MARKET_VALUE: Column = optional("Market Value");
    pub const ANNUAL_RATE: Column = optional("Annual Rate");
    pub const BEGINNING_YIELD: Column = required("Beginning Yield");
    pub const ANNUAL_DIVIDEND: Column = optional("Annual Dividend");
    pub const MONTHLY_DIVIDEND: Column = optional("Monthly Dividend");
    pub const SOURCE: Column = optional("Source");

    pub const COLUMNS: &[Column] = &[
        TICKER,
        ACCOUNT,
        QUANTITY,
        PRICE_PAID,
        CURRENT_PRICE,
        MARKET_VALUE,
        ANNUAL_RATE,
        BEGINNING_YIELD,
        ANNUAL_DIVIDEND,
        MONTHLY_DIVIDEND,
        SOURCE,
    ];
}

pub mod accounts {
    use super::{Column, optional, required};

    pub const BROKER: Column = required("Broker");
    pub const ACCOUNT: Column = required("Account");
    pub const DESCRIPTION: Column = optional("Description");
    pub const CASH: Column = required("Cash");
    pub const TOTAL_VALUE: Column = required("Total Value");
    pub const UPDATED: Column = optional("Updated");

    pub const COLUMNS: &[Column] = &[BROKER, ACCOUNT, DESCRIPTION, CASH, TOTAL_VALUE, UPDATED];
}

pub mod trades {
    use super::{Column, optional, required};

    pub const DATE: Column = required("Date");
    pub const TICKER: Column = required("Ticker");
    pub const TYPE: Column = required("Type");
    pub const SHARES: Column = required("Shares");
    pub const COST: Column = required("Cost");
    pub const STRIKE: Column = optional("Strike");
    pub const INVESTMENT: Column = optional("Investment");
    pub const PUT_VALUE: Column = optional("Put Value");
    pub const PUT_CASH_REQ: Column = optional("Put Cash Req");
    pub const CALL_VALUE: Column = optional("Call Value");

    pub const COLUMNS: &[Column] = &[
        DATE,
        TICKER,
        TYPE,
        SHARES,
        COST,
        STRIKE,
        INVESTMENT,
        PUT_VALUE,
        PUT_CASH_REQ,
        CALL_VALUE,
    ];
}

pub mod summary {
    use super::{Column, optional};

    pub const ACCOUNT: Column = optional("Account");
    pub const HOLDINGS: Column = optional("Holdings");
    pub const MARKET_VALUE: Column = optional("Market Value");
    pub const ANNUAL_DIVIDEND: Column = optional("Annual Dividend");
    pub const MONTHLY_DIVIDEND: Column = optional("Monthly Dividend");
    pub const YIELD: Column = optional("Yield");
    pub const CASH: Column = optional("Cash");
    pub const TOTAL_VALUE: Column = optional("Total Value");

    pub const COLUMNS: &[Column] = &[
        ACCOUNT,
        HOLDINGS,
        MARKET_VALUE,
        ANNUAL_DIVIDEND,
        MONTHLY_DIVIDEND,
        YIELD,
        CASH,
        TOTAL_VALUE,
    ];
}

pub const DIVIDENDS: SheetSchema = SheetSchema {
    name: "Dividends",
    columns: dividends::COLUMNS,
    history: true,
};

pub const ACCOUNTS: SheetSchema = SheetSchema {
    name: "Accounts",
    columns: accounts::COLUMNS,
    history: false,
};

pub const TRADES: SheetSchema = SheetSchema {
    name: "Trades",
    columns: trades::COLUMNS,
    history: false,
};

/// Derived on every write, never read back.
pub const SUMMARY: SheetSchema = SheetSchema {
    name: "Summary",
    columns: summary::COLUMNS,
    history: false,
};

const HISTORY_PREFIX: &str = "yield ";

/// Header text for a history column.
pub fn history_header(date: NaiveDate) -> String {
    format!("Yield {}", date.format("%Y-%m-%d"))
}

/// Date of a history column header, if `header` is one.
pub fn parse_history_header(header: &str) -> Option<NaiveDate> {
    let normalized = normalize(header);
    let rest = normalized.strip_prefix(HISTORY_PREFIX)?;
    parse_date(rest)
}

fn normalize(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Resolved header row: where each named column currently lives.
#[derive(Clone, Debug)]
pub struct ColumnMap {
    sheet: &'static str,
    fixed: FxHashMap<&'static str, usize>,
    history: Vec<(NaiveDate, usize)>,
    ignored: Vec<(String, usize)>,
}

impl SheetSchema {
    /// Header texts in write order.
    pub fn headers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.header)
    }

    /// Resolve a header row against this schema.
    ///
    /// Unknown headers are tolerated (and reported through
    /// [`ColumnMap::ignored`]); missing required columns and duplicates are
    /// errors, so a damaged sheet is never silently rewritten.
    pub fn resolve<S: AsRef<str>>(&self, headers: &[S]) -> Result<ColumnMap> {
        if headers.iter().all(|h| h.as_ref().trim().is_empty()) {
            return Err(Error::MissingHeader { sheet: self.name });
        }

        let mut fixed = FxHashMap::default();
        let mut history: Vec<(NaiveDate, usize)> = Vec::new();
        let mut ignored = Vec::new();

        for (idx, raw) in headers.iter().enumerate() {
            let raw = raw.as_ref();
            let key = normalize(raw);
            if key.is_empty() {
                continue;
            }

            if let Some(column) = self.columns.iter().find(|c| normalize(c.header) == key) {
                if fixed.insert(column.header, idx).is_some() {
                    return Err(Error::DuplicateColumn {
                        sheet: self.name,
                        column: column.header.to_string(),
                    });
                }
            } else if let Some(date) = self.history.then(|| parse_history_header(raw)).flatten() {
                if history.iter().any(|(d, _)| *d == date) {
                    return Err(Error::DuplicateColumn {
                        sheet: self.name,
                        column: history_header(date),
                    });
                }
                history.push((date, idx));
            } else {
                ignored.push((raw.trim().to_string(), idx));
            }
        }

        if let Some(missing) = self
            .columns
            .iter()
            .find(|c| c.required && !fixed.contains_key(c.header))
        {
            return Err(Error::MissingColumn {
                sheet: self.name,
                column: missing.header,
            });
        }

        // newest first, matching the write order
        history.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(ColumnMap {
            sheet: self.name,
            fixed,
            history,
            ignored,
        })
    }
}

impl ColumnMap {
    pub fn sheet(&self) -> &'static str {
        self.sheet
    }

    /// Position of a named column, `None` if an optional column is absent.
    pub fn index(&self, column: Column) -> Option<usize> {
        self.fixed.get(column.header).copied()
    }

    /// History columns, newest date first.
    pub fn history(&self) -> &[(NaiveDate, usize)] {
        &self.history
    }

    /// Header texts that matched no column, with their positions.
    ///
    /// Columns with a blank header are neither mapped nor listed here.
    pub fn ignored(&self) -> &[(String, usize)] {
        &self.ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn history_headers() {
        assert_eq!(history_header(date(2025, 1, 5)), "Yield 2025-01-05");
        assert_eq!(parse_history_header("Yield 2025-01-05"), Some(date(2025, 1, 5)));
        assert_eq!(parse_history_header("  yield   1/5/2025 "), Some(date(2025, 1, 5)));
        assert_eq!(parse_history_header("Beginning Yield"), None);
        assert_eq!(parse_history_header("Yield"), None);
    }

    #[test]
    fn resolves_by_name_not_position() {
        let headers = ["Quantity", "ticker", "ACCOUNT", "Beginning  Yield"];
        let map = DIVIDENDS.resolve(&headers).unwrap();
        assert_eq!(map.index(dividends::TICKER), Some(1));
        assert_eq!(map.index(dividends::ACCOUNT), Some(2));
        assert_eq!(map.index(dividends::QUANTITY), Some(0));
        assert_eq!(map.index(dividends::BEGINNING_YIELD), Some(3));
        assert_eq!(map.index(dividends::MARKET_VALUE), None);
    }

    #[test]
    fn history_sorted_newest_first() {
        let headers = [
            "Ticker",
            "Account",
            "Quantity",
            "Beginning Yield",
            "Yield 2025-01-05",
            "Yield 2025-03-01",
            "Notes",
        ];
        let map = DIVIDENDS.resolve(&headers).unwrap();
        assert_eq!(map.history(), &[(date(2025, 3, 1), 5), (date(2025, 1, 5), 4)]);
        assert_eq!(map.ignored(), &[("Notes".to_string(), 6)]);
    }

    #[test]
    fn missing_required_column() {
        let err = DIVIDENDS
            .resolve(&["Ticker", "Account", "Beginning Yield"])
            .unwrap_err();
        assert_eq!(
            err,
            Error::MissingColumn {
                sheet: "Dividends",
                column: "Quantity"
            }
        );
    }

    #[test]
    fn duplicate_columns_rejected() {
        let err = DIVIDENDS
            .resolve(&["Ticker", "Account", "Quantity", "Beginning Yield", "Ticker"])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateColumn { .. }));

        let err = DIVIDENDS
            .resolve(&[
                "Ticker",
                "Account",
                "Quantity",
                "Beginning Yield",
                "Yield 2025-01-05",
                "Yield 1/5/2025",
            ])
            .unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateColumn {
                sheet: "Dividends",
                column: "Yield 2025-01-05".into()
            }
        );
    }

    #[test]
    fn history_only_on_dividends() {
        let headers = [
            "Date", "Ticker", "Type", "Shares", "Cost", "Yield 2025-01-05",
        ];
        let map = TRADES.resolve(&headers).unwrap();
        assert!(map.history().is_empty());
        assert_eq!(map.ignored(), &[("Yield 2025-01-05".to_string(), 5)]);
    }

    #[test]
    fn blank_header_row() {
        let err = ACCOUNTS.resolve(&["", "  "]).unwrap_err();
        assert_eq!(err, Error::MissingHeader { sheet: "Accounts" });
    }
}
