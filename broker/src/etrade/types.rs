//! E*TRADE API response types and their conversion into broker types.
//!
//! The parse functions take raw JSON text so they can be exercised against
//! fixtures without a session.

use chrono::{DateTime, NaiveDate};
use divtrack::{OptionContract, OptionKind, Position, Symbol};
use log::warn;
use serde::Deserialize;

use crate::error::BrokerError;
use crate::types::{Account, Balance, Quote};

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccountListEnvelope {
    #[serde(rename = "AccountListResponse")]
    response: AccountListResponse,
}

#[derive(Debug, Deserialize)]
struct AccountListResponse {
    #[serde(rename = "Accounts")]
    accounts: AccountsWrapper,
}

#[derive(Debug, Deserialize)]
struct AccountsWrapper {
    #[serde(rename = "Account", default)]
    account: Vec<EtradeAccount>,
}

/// One entry of `/v1/accounts/list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtradeAccount {
    pub account_id: String,
    pub account_id_key: String,
    #[serde(default)]
    pub account_desc: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub account_status: String,
}

/// Parse the account list, skipping closed accounts.
pub fn parse_accounts(json: &str) -> Result<Vec<Account>, BrokerError> {
    let envelope: AccountListEnvelope =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("account list", e))?;
    Ok(envelope
        .response
        .accounts
        .account
        .into_iter()
        .filter(|a| !a.account_status.eq_ignore_ascii_case("CLOSED"))
        .map(|a| Account {
            description: if a.account_name.trim().is_empty() {
                a.account_desc
            } else {
                a.account_name
            },
            id: a.account_id,
            key: a.account_id_key,
            kind: a.account_type,
        })
        .collect())
}

// ============================================================================
// Balance
// ============================================================================

#[derive(Debug, Deserialize)]
struct BalanceEnvelope {
    #[serde(rename = "BalanceResponse")]
    response: BalanceResponse,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(rename = "Computed")]
    computed: Computed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Computed {
    cash_balance: Option<f64>,
    net_cash: Option<f64>,
    #[serde(rename = "RealTimeValues")]
    real_time_values: Option<RealTimeValues>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealTimeValues {
    total_account_value: Option<f64>,
}

pub fn parse_balance(json: &str, account_id: &str) -> Result<Balance, BrokerError> {
    let envelope: BalanceEnvelope =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("balance", e))?;
    let computed = envelope.response.computed;
    Ok(Balance {
        account_id: account_id.to_string(),
        cash: computed.cash_balance.or(computed.net_cash).unwrap_or(0.0),
        total_value: computed
            .real_time_values
            .and_then(|v| v.total_account_value)
            .unwrap_or(0.0),
    })
}

// ============================================================================
// Portfolio
// ============================================================================

#[derive(Debug, Deserialize)]
struct PortfolioEnvelope {
    #[serde(rename = "PortfolioResponse")]
    response: PortfolioResponse,
}

#[derive(Debug, Deserialize)]
struct PortfolioResponse {
    #[serde(rename = "AccountPortfolio", default)]
    account_portfolio: Vec<AccountPortfolio>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountPortfolio {
    #[serde(default = "one")]
    total_pages: u32,
    #[serde(rename = "Position", default)]
    position: Vec<EtradePosition>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtradePosition {
    #[serde(default)]
    symbol_description: String,
    #[serde(default)]
    quantity: f64,
    #[serde(default)]
    position_type: String,
    #[serde(default)]
    price_paid: f64,
    #[serde(default)]
    market_value: f64,
    #[serde(default)]
    osi_key: String,
    #[serde(rename = "Quick")]
    quick: Option<QuickView>,
    #[serde(rename = "Product")]
    product: Option<Product>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickView {
    last_trade: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    security_type: String,
}

/// One page of portfolio positions.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPage {
    pub positions: Vec<Position>,
    pub total_pages: u32,
}

/// Parse a portfolio page. Options are keyed by their OSI symbol; short
/// positions get a negative quantity. Rows without a usable symbol are skipped.
pub fn parse_portfolio(json: &str, account_id: &str) -> Result<PortfolioPage, BrokerError> {
    let envelope: PortfolioEnvelope =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("portfolio", e))?;

    let mut page = PortfolioPage {
        positions: Vec::new(),
        total_pages: 1,
    };
    for portfolio in envelope.response.account_portfolio {
        page.total_pages = page.total_pages.max(portfolio.total_pages);
        for p in portfolio.position {
            let is_option = p
                .product
                .as_ref()
                .is_some_and(|prod| prod.security_type == "OPTN");
            let raw = if is_option && !p.osi_key.is_empty() {
                p.osi_key.as_str()
            } else {
                p.product
                    .as_ref()
                    .map(|prod| prod.symbol.as_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(p.symbol_description.as_str())
            };
            let symbol = match Symbol::new(raw) {
                Ok(symbol) => symbol,
                Err(e) => {
                    warn!("etrade: skipping position in {account_id}: {e}");
                    continue;
                }
            };
            let quantity = if p.position_type.eq_ignore_ascii_case("SHORT") {
                -p.quantity.abs()
            } else {
                p.quantity
            };
            page.positions.push(Position {
                symbol,
                account: account_id.to_string(),
                quantity,
                price_paid: p.price_paid,
                current_price: p.quick.and_then(|q| q.last_trade).unwrap_or(0.0),
                market_value: p.market_value,
            });
        }
    }
    Ok(page)
}

// ============================================================================
// Quotes
// ============================================================================

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "QuoteResponse")]
    response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "QuoteData", default)]
    quote_data: Vec<QuoteData>,
    #[serde(rename = "Messages")]
    messages: Option<Messages>,
}

#[derive(Debug, Deserialize)]
struct Messages {
    #[serde(rename = "Message", default)]
    message: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(rename = "All")]
    all: Option<AllQuoteDetails>,
    #[serde(rename = "Product")]
    product: Product,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllQuoteDetails {
    #[serde(default)]
    last_trade: f64,
    annual_dividend: Option<f64>,
    #[serde(rename = "yield")]
    dividend_yield: Option<f64>,
    ex_dividend_date: Option<i64>,
    #[serde(default)]
    company_name: String,
}

/// Parse a quote response. Warnings from the API (e.g. unknown symbols) are
/// logged and the affected symbols omitted.
pub fn parse_quotes(json: &str) -> Result<Vec<Quote>, BrokerError> {
    let envelope: QuoteEnvelope =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("quotes", e))?;
    let response = envelope.response;

    for message in response.messages.into_iter().flat_map(|m| m.message) {
        warn!("etrade quote: {}", message.description);
    }

    let mut quotes = Vec::with_capacity(response.quote_data.len());
    for data in response.quote_data {
        let Ok(symbol) = Symbol::new(&data.product.symbol) else {
            warn!("etrade quote without symbol skipped");
            continue;
        };
        let Some(all) = data.all else {
            warn!("etrade quote for {symbol} has no detail section");
            continue;
        };
        quotes.push(Quote {
            symbol,
            last: all.last_trade,
            annual_dividend: all.annual_dividend.filter(|v| *v > 0.0),
            dividend_yield: all.dividend_yield.filter(|v| *v > 0.0),
            ex_dividend_date: all.ex_dividend_date.and_then(epoch_date),
            description: all.company_name,
        });
    }
    Ok(quotes)
}

fn epoch_date(secs: i64) -> Option<NaiveDate> {
    (secs > 0)
        .then(|| DateTime::from_timestamp(secs, 0))
        .flatten()
        .map(|dt| dt.date_naive())
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExpireDateEnvelope {
    #[serde(rename = "OptionExpireDateResponse")]
    response: ExpireDateResponse,
}

#[derive(Debug, Deserialize)]
struct ExpireDateResponse {
    #[serde(rename = "ExpirationDate", default)]
    expiration_date: Vec<ExpirationDate>,
}

#[derive(Debug, Deserialize)]
struct ExpirationDate {
    year: i32,
    month: u32,
    day: u32,
}

/// Parse the expiry date list, sorted ascending.
pub fn parse_expiry_dates(json: &str) -> Result<Vec<NaiveDate>, BrokerError> {
    let envelope: ExpireDateEnvelope =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("option expiry dates", e))?;
    let mut dates: Vec<NaiveDate> = envelope
        .response
        .expiration_date
        .iter()
        .filter_map(|d| NaiveDate::from_ymd_opt(d.year, d.month, d.day))
        .collect();
    dates.sort();
    dates.dedup();
    Ok(dates)
}

#[derive(Debug, Deserialize)]
struct ChainEnvelope {
    #[serde(rename = "OptionChainResponse")]
    response: ChainResponse,
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    #[serde(rename = "OptionPair", default)]
    option_pair: Vec<OptionPair>,
}

#[derive(Debug, Deserialize)]
struct OptionPair {
    #[serde(rename = "Call")]
    call: Option<OptionDetails>,
    #[serde(rename = "Put")]
    put: Option<OptionDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionDetails {
    #[serde(default)]
    display_symbol: String,
    #[serde(default)]
    osi_key: String,
    #[serde(default)]
    strike_price: f64,
    #[serde(default)]
    bid: f64,
    #[serde(default)]
    ask: f64,
    #[serde(default)]
    last_price: f64,
    #[serde(default)]
    open_interest: u64,
}

/// Parse an option chain for one expiry. Calls come before puts, each sorted
/// by strike.
pub fn parse_option_chain(
    json: &str,
    underlying: &Symbol,
    expiry: NaiveDate,
) -> Result<Vec<OptionContract>, BrokerError> {
    let envelope: ChainEnvelope =
        serde_json::from_str(json).map_err(|e| BrokerError::parse("option chain", e))?;

    let contract = |kind: OptionKind, d: OptionDetails| OptionContract {
        symbol: if d.osi_key.is_empty() {
            d.display_symbol
        } else {
            d.osi_key
        },
        underlying: underlying.clone(),
        kind,
        expiry,
        strike: d.strike_price,
        bid: d.bid,
        ask: d.ask,
        last: d.last_price,
        open_interest: d.open_interest,
    };

    let mut calls = Vec::new();
    let mut puts = Vec::new();
    for pair in envelope.response.option_pair {
        if let Some(call) = pair.call {
            calls.push(contract(OptionKind::Call, call));
        }
        if let Some(put) = pair.put {
            puts.push(contract(OptionKind::Put, put));
        }
    }
    calls.sort_by(|a, b| a.strike.total_cmp(&b.strike));
    puts.sort_by(|a, b| a.strike.total_cmp(&b.strike));
    calls.extend(puts);
    Ok(calls)
}

/// Parse a form-encoded OAuth token response into `(token, secret)`.
pub fn parse_token_form(body: &str) -> Result<(String, String), BrokerError> {
    let mut token = None;
    let mut secret = None;
    for pair in body.trim().split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(value)
            .map_err(|e| BrokerError::parse("token response", e))?
            .into_owned();
        match key {
            "oauth_token" => token = Some(value),
            "oauth_token_secret" => secret = Some(value),
            _ => {}
        }
    }
    match (token, secret) {
        (Some(t), Some(s)) if !t.is_empty() => Ok((t, s)),
        _ => Err(BrokerError::Auth(format!(
            "token response missing oauth_token: {body}"
        ))),
    }
}
