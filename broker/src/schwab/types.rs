//! Schwab API response types and their conversion into broker types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use divtrack::{Position, Symbol};
use log::warn;
use serde::Deserialize;

use crate::error::BrokerError;
use crate::token::SchwabToken;
use crate::types::{Account, Balance, Quote};

/// Body of `POST /v1/oauth/token`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    1800
}

impl TokenResponse {
    /// Token to persist. A refresh grant keeps the previous refresh token's
    /// issue time unless the server rotated it.
    pub fn into_token(self, now: DateTime<Utc>, previous: Option<&SchwabToken>) -> SchwabToken {
        let (refresh_token, refresh_issued_at) = match previous {
            Some(prev) if self.refresh_token.is_empty() || self.refresh_token == prev.refresh_token => {
                (prev.refresh_token.clone(), prev.refresh_issued_at)
            }
            _ => (self.refresh_token, now),
        };
        SchwabToken {
            access_token: self.access_token,
            refresh_token,
            issued_at: now,
            refresh_issued_at,
            expires_in: self.expires_in,
        }
    }
}

pub fn parse_token(json: &str) -> Result<TokenResponse, BrokerError> {
    serde_json::from_str(json).map_err(|e| BrokerError::parse("token response", e))
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountNumber {
    account_number: String,
    hash_value: String,
}

/// Parse `/accounts/accountNumbers`. Descriptions and types are filled in
/// from the account details later.
pub fn parse_account_numbers(json: &str) -> Result<Vec<Account>, BrokerError> {
    let numbers: Vec<AccountNumber> =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("account numbers", e))?;
    Ok(numbers
        .into_iter()
        .map(|n| Account {
            id: n.account_number,
            key: n.hash_value,
            description: String::new(),
            kind: String::new(),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountEnvelope {
    securities_account: SecuritiesAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecuritiesAccount {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    positions: Vec<SchwabPosition>,
    current_balances: Option<CurrentBalances>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentBalances {
    cash_balance: Option<f64>,
    cash_available_for_trading: Option<f64>,
    liquidation_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchwabPosition {
    #[serde(default)]
    long_quantity: f64,
    #[serde(default)]
    short_quantity: f64,
    #[serde(default)]
    average_price: f64,
    #[serde(default)]
    market_value: f64,
    instrument: Instrument,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    #[serde(default)]
    symbol: String,
}

/// Account details: positions plus balance.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDetails {
    pub kind: String,
    pub positions: Vec<Position>,
    pub balance: Balance,
}

/// Parse `/accounts/{hash}?fields=positions`.
pub fn parse_account_details(json: &str, account_id: &str) -> Result<AccountDetails, BrokerError> {
    let envelope: AccountEnvelope =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("account details", e))?;
    let account = envelope.securities_account;

    let mut positions = Vec::with_capacity(account.positions.len());
    for p in account.positions {
        // option symbols pad the root with spaces
        let raw: String = p.instrument.symbol.split_whitespace().collect();
        let symbol = match Symbol::new(&raw) {
            Ok(symbol) => symbol,
            Err(e) => {
                warn!("schwab: skipping position in {account_id}: {e}");
                continue;
            }
        };
        let is_short = p.short_quantity > 0.0 && p.short_quantity >= p.long_quantity;
        let quantity = if is_short {
            -p.short_quantity
        } else {
            p.long_quantity
        };
        let current_price = if quantity != 0.0 {
            (p.market_value / quantity).abs()
        } else {
            0.0
        };
        positions.push(Position {
            symbol,
            account: account_id.to_string(),
            quantity,
            price_paid: p.average_price,
            current_price,
            market_value: p.market_value,
        });
    }

    let balances = account.current_balances;
    let balance = Balance {
        account_id: account_id.to_string(),
        cash: balances
            .as_ref()
            .and_then(|b| b.cash_balance.or(b.cash_available_for_trading))
            .unwrap_or(0.0),
        total_value: balances
            .as_ref()
            .and_then(|b| b.liquidation_value)
            .unwrap_or(0.0),
    };

    Ok(AccountDetails {
        kind: account.kind,
        positions,
        balance,
    })
}

// ============================================================================
// Quotes
// ============================================================================

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    quote: Option<QuoteBlock>,
    fundamental: Option<Fundamental>,
    reference: Option<Reference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBlock {
    last_price: Option<f64>,
    close_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fundamental {
    div_amount: Option<f64>,
    div_yield: Option<f64>,
    div_ex_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    #[serde(default)]
    description: String,
}

/// Parse `/marketdata/v1/quotes`, a map keyed by symbol. Entries with an
/// error instead of a quote are skipped.
pub fn parse_quotes(json: &str) -> Result<Vec<Quote>, BrokerError> {
    let map: HashMap<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("quotes", e))?;

    let mut quotes = Vec::with_capacity(map.len());
    for (key, value) in map {
        let entry: QuoteEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("schwab quote for {key} skipped: {e}");
                continue;
            }
        };
        let Some(block) = entry.quote else {
            warn!("schwab: no quote for {key}");
            continue;
        };
        let Ok(symbol) = Symbol::new(&key) else {
            continue;
        };
        let fundamental = entry.fundamental;
        quotes.push(Quote {
            symbol,
            last: block.last_price.or(block.close_price).unwrap_or(0.0),
            annual_dividend: fundamental
                .as_ref()
                .and_then(|f| f.div_amount)
                .filter(|v| *v > 0.0),
            dividend_yield: fundamental
                .as_ref()
                .and_then(|f| f.div_yield)
                .filter(|v| *v > 0.0),
            // e.g. 2025-01-05T00:00:00Z
            ex_dividend_date: fundamental
                .as_ref()
                .and_then(|f| f.div_ex_date.as_deref())
                .and_then(divtrack::format::parse_date),
            description: entry.reference.map(|r| r.description).unwrap_or_default(),
        });
    }
    quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    Ok(quotes)
}
