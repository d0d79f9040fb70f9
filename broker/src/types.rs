//! Shared broker types: accounts, balances, quotes.
//!
//! Positions use [`divtrack::Position`] directly.

use chrono::NaiveDate;
use divtrack::Symbol;
use serde::{Deserialize, Serialize};

/// A brokerage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account number as shown to the user.
    pub id: String,
    /// Opaque key the API addresses the account by (E*TRADE `accountIdKey`,
    /// Schwab account hash).
    pub key: String,
    pub description: String,
    /// Brokerage-specific account type, e.g. `INDIVIDUAL`, `IRA`.
    pub kind: String,
}

impl Account {
    /// Description if the broker gave one, else the account number.
    pub fn label(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.id
        } else {
            &self.description
        }
    }
}

/// Account balance snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: String,
    pub cash: f64,
    pub total_value: f64,
}

/// Live quote from the broker, including dividend fields when available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub last: f64,
    /// Annual dividend per share.
    pub annual_dividend: Option<f64>,
    /// Dividend yield in percent.
    pub dividend_yield: Option<f64>,
    pub ex_dividend_date: Option<NaiveDate>,
    pub description: String,
}

impl Quote {
    /// Annual dividend per share: the reported amount, or yield × last price.
    pub fn annual_dividend_per_share(&self) -> Option<f64> {
        match (self.annual_dividend, self.dividend_yield) {
            (Some(amount), _) if amount > 0.0 => Some(amount),
            (_, Some(y)) if y > 0.0 && self.last > 0.0 => Some(y / 100.0 * self.last),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(last: f64, annual: Option<f64>, yld: Option<f64>) -> Quote {
        Quote {
            symbol: Symbol::new("O").unwrap(),
            last,
            annual_dividend: annual,
            dividend_yield: yld,
            ex_dividend_date: None,
            description: String::new(),
        }
    }

    #[test]
    fn prefers_reported_amount() {
        assert_eq!(quote(60.0, Some(3.0), Some(9.0)).annual_dividend_per_share(), Some(3.0));
    }

    #[test]
    fn falls_back_to_yield() {
        assert_eq!(quote(50.0, Some(0.0), Some(4.0)).annual_dividend_per_share(), Some(2.0));
        assert_eq!(quote(0.0, None, Some(4.0)).annual_dividend_per_share(), None);
        assert_eq!(quote(50.0, None, None).annual_dividend_per_share(), None);
    }

    #[test]
    fn label_falls_back_to_id() {
        let mut account = Account {
            id: "1234".into(),
            key: "k".into(),
            description: " ".into(),
            kind: "IRA".into(),
        };
        assert_eq!(account.label(), "1234");
        account.description = "Roth".into();
        assert_eq!(account.label(), "Roth");
    }
}
