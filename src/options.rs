//! Option contracts and premium-income math for covered calls and
//! cash-secured puts.

use std::fmt;

use chrono::NaiveDate;

use crate::types::Symbol;

/// Call or put.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionKind {
    Call,
    Put,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            OptionKind::Call => "CALL",
            OptionKind::Put => "PUT",
        })
    }
}

/// One side of an option chain row.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptionContract {
    /// Display or OSI symbol of the contract.
    pub symbol: String,
    pub underlying: Symbol,
    pub kind: OptionKind,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub open_interest: u64,
}

impl OptionContract {
    /// Bid/ask midpoint, or the bid when there is no ask.
    pub fn mid(&self) -> f64 {
        if self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.bid
        }
    }

    /// Premium received for selling at the bid, as a percentage of strike.
    pub fn premium_yield_pct(&self) -> Option<f64> {
        (self.strike > 0.0 && self.bid > 0.0).then(|| self.bid / self.strike * 100.0)
    }

    /// Days from `today` until expiry (negative once expired).
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry - today).num_days()
    }

    /// Premium yield scaled to a 365-day year. `None` on or after expiry.
    pub fn annualized_yield_pct(&self, today: NaiveDate) -> Option<f64> {
        let days = self.days_to_expiry(today);
        if days <= 0 {
            return None;
        }
        self.premium_yield_pct()
            .map(|premium| premium * 365.0 / days as f64)
    }
}
