//! Trade journal import.
//!
//! The journal is a JSON array of trades:
//!
//! ```json
//! [
//!   {"date": "2025-01-05", "ticker": "T", "type": "Sold Put", "shares": -1, "cost": 2.5, "strike": 25},
//!   {"date": "1/6/2025", "ticker": "O", "type": "Bought Stock", "shares": 100, "cost": "$50.00"}
//! ]
//! ```
//!
//! Amounts may be numbers or currency strings. Entries that fail to parse are
//! skipped with a warning.

use std::path::Path;

use divtrack::format::{parse_amount, parse_date};
use divtrack::{Symbol, Trade, TradeKind};
use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn value(&self) -> Option<f64> {
        match self {
            Amount::Number(v) => Some(*v),
            Amount::Text(s) => parse_amount(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    date: String,
    #[serde(alias = "symbol")]
    ticker: String,
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    shares: Amount,
    cost: Amount,
    #[serde(default)]
    strike: Option<Amount>,
}

impl Entry {
    fn into_trade(self) -> std::result::Result<Trade, String> {
        let date = parse_date(&self.date).ok_or_else(|| format!("invalid date {:?}", self.date))?;
        let symbol = Symbol::new(&self.ticker).map_err(|e| e.to_string())?;
        let kind: TradeKind = self.kind.parse().map_err(|e: divtrack::Error| e.to_string())?;
        let shares = self.shares.value().ok_or("shares is not a number")?;
        let cost = self.cost.value().ok_or("cost is not a number")?;
        let strike = match &self.strike {
            Some(amount) => Some(amount.value().ok_or("strike is not a number")?),
            None => None,
        };
        if kind == TradeKind::SoldPut && strike.is_none() {
            warn!("{date} {symbol}: sold put without strike, cash requirement left blank");
        }
        Ok(Trade {
            date,
            symbol,
            kind,
            shares,
            cost,
            strike,
        })
    }
}

/// Parse journal JSON into trades, skipping invalid entries.
pub fn parse_journal(json: &str) -> Result<Vec<Trade>> {
    let entries: Vec<Entry> = serde_json::from_str(json)?;
    let mut trades = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        match entry.into_trade() {
            Ok(trade) => trades.push(trade),
            Err(e) => warn!("journal entry {}: {e}, skipped", i + 1),
        }
    }
    Ok(trades)
}

pub fn load_journal(path: &Path) -> Result<Vec<Trade>> {
    let json = std::fs::read_to_string(path).map_err(|e| Error::JournalRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_journal(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_numbers_and_currency_strings() {
        let trades = parse_journal(
            r#"[
                {"date": "2025-01-05", "ticker": "t", "type": "Sold Put", "shares": -1, "cost": 2.5, "strike": 25},
                {"date": "1/6/2025", "symbol": "O", "kind": "bought_stock", "shares": "100", "cost": "$50.00"}
            ]"#,
        )
        .unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].symbol.as_str(), "T");
        assert_eq!(trades[0].kind, TradeKind::SoldPut);
        assert_eq!(trades[0].strike, Some(25.0));
        assert_eq!(trades[1].date, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(trades[1].kind, TradeKind::BoughtStock);
        assert_eq!(trades[1].cost, 50.0);
        assert_eq!(trades[1].formatted().investment, "$5,000.00");
    }

    #[test]
    fn invalid_entries_skipped() {
        let trades = parse_journal(
            r#"[
                {"date": "someday", "ticker": "T", "type": "Sold Put", "shares": -1, "cost": 2.5},
                {"date": "2025-01-05", "ticker": "T", "type": "Sold Straddle", "shares": -1, "cost": 2.5},
                {"date": "2025-01-05", "ticker": "T", "type": "Sold Call", "shares": -1, "cost": "abc"},
                {"date": "2025-01-05", "ticker": "T", "type": "Sold Call", "shares": -1, "cost": 0.8}
            ]"#,
        )
        .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].formatted().call_value, "$0.80");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(parse_journal("{not json"), Err(Error::JournalParse(_))));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_journal(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::JournalRead { .. }));
    }
}
