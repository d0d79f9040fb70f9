//! Brokerage positions as fetched for a single run.

use crate::types::Symbol;

/// A holding of one symbol in one brokerage account.
///
/// Monetary values are plain dollars: positions are only ever summed and
/// written to spreadsheet cells, never matched or netted.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub symbol: Symbol,
    /// Account identifier as shown to the user (not the API key).
    pub account: String,
    /// Positive = long, negative = short. Fractional shares allowed.
    pub quantity: f64,
    /// Average price paid per share.
    pub price_paid: f64,
    /// Last traded price.
    pub current_price: f64,
    pub market_value: f64,
}

impl Position {
    /// Total paid for the position.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.price_paid
    }

    /// Unrealized gain in dollars.
    pub fn gain(&self) -> f64 {
        self.market_value - self.cost_basis()
    }

    /// Unrealized gain as a percentage of cost, `None` when cost is zero.
    pub fn gain_pct(&self) -> Option<f64> {
        let cost = self.cost_basis();
        (cost.abs() > f64::EPSILON).then(|| self.gain() / cost.abs() * 100.0)
    }

    /// Best available per-share price: last trade, else market value / quantity.
    pub fn effective_price(&self) -> f64 {
        if self.current_price > 0.0 {
            self.current_price
        } else if self.quantity.abs() > f64::EPSILON {
            (self.market_value / self.quantity).abs()
        } else {
            0.0
        }
    }
}
