//! Trade journal entries and the cash values they imply.
//!
//! Each trade fills at most one family of value columns in the tracker:
//! stock trades fill Investment, puts fill Put Value (and Put Cash Req when
//! sold), calls fill Call Value. Share counts are signed in the journal
//! (sold contracts are negative), so option values use the magnitude and the
//! trade kind decides the sign.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::format::format_money;
use crate::types::Symbol;

/// What kind of trade a journal row records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TradeKind {
    BoughtStock,
    SoldStock,
    SoldPut,
    BoughtPut,
    SoldCall,
    BoughtCall,
}

impl TradeKind {
    pub const ALL: [TradeKind; 6] = [
        TradeKind::BoughtStock,
        TradeKind::SoldStock,
        TradeKind::SoldPut,
        TradeKind::BoughtPut,
        TradeKind::SoldCall,
        TradeKind::BoughtCall,
    ];

    /// The label used in the journal and the Trades sheet.
    pub fn as_str(self) -> &'static str {
        match self {
            TradeKind::BoughtStock => "Bought Stock",
            TradeKind::SoldStock => "Sold Stock",
            TradeKind::SoldPut => "Sold Put",
            TradeKind::BoughtPut => "Bought Put",
            TradeKind::SoldCall => "Sold Call",
            TradeKind::BoughtCall => "Bought Call",
        }
    }

    pub fn is_option(self) -> bool {
        !matches!(self, TradeKind::BoughtStock | TradeKind::SoldStock)
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TradeKind {
    type Err = Error;

    /// Case-insensitive; `_`, `-` and repeated spaces are treated as one space.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        TradeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| Error::UnknownTradeKind(s.to_string()))
    }
}

/// One row of the trade journal.
#[derive(Clone, Debug, PartialEq)]
pub struct Trade {
    pub date: NaiveDate,
    pub symbol: Symbol,
    pub kind: TradeKind,
    /// Signed: positive = bought, negative = sold. Contracts for options.
    pub shares: f64,
    /// Price per share (stock) or premium per contract unit (options).
    pub cost: f64,
    /// Strike price, options only.
    pub strike: Option<f64>,
}

/// Cash values derived from a trade. `None` means "not applicable".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TradeValues {
    pub investment: Option<f64>,
    pub put_value: Option<f64>,
    pub put_cash_req: Option<f64>,
    pub call_value: Option<f64>,
}

/// [`TradeValues`] rendered for the sheet; empty strings for `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormattedTradeValues {
    pub investment: String,
    pub put_value: String,
    pub put_cash_req: String,
    pub call_value: String,
}

impl Trade {
    /// Compute the tracker value columns for this trade.
    pub fn values(&self) -> TradeValues {
        let contracts = self.shares.abs();
        let premium = contracts * self.cost;
        match self.kind {
            TradeKind::BoughtStock | TradeKind::SoldStock => TradeValues {
                investment: Some(self.shares * self.cost),
                ..TradeValues::default()
            },
            TradeKind::SoldPut => TradeValues {
                put_value: Some(premium),
                put_cash_req: self.strike.map(|strike| contracts * strike),
                ..TradeValues::default()
            },
            TradeKind::BoughtPut => TradeValues {
                put_value: Some(-premium),
                ..TradeValues::default()
            },
            TradeKind::SoldCall => TradeValues {
                call_value: Some(premium),
                ..TradeValues::default()
            },
            TradeKind::BoughtCall => TradeValues {
                call_value: Some(-premium),
                ..TradeValues::default()
            },
        }
    }

    /// Value columns as sheet text.
    pub fn formatted(&self) -> FormattedTradeValues {
        self.values().formatted()
    }
}

impl TradeValues {
    pub fn formatted(&self) -> FormattedTradeValues {
        let render = |value: Option<f64>| value.map(format_money).unwrap_or_default();
        FormattedTradeValues {
            investment: render(self.investment),
            put_value: render(self.put_value),
            put_cash_req: render(self.put_cash_req),
            call_value: render(self.call_value),
        }
    }
}
