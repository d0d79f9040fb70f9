//! Alpha Vantage fundamentals: company overview and annual cash flow.
//!
//! The free tier allows a handful of calls per minute and per day. When the
//! service answers with a rate-limit note the client stops querying for the
//! rest of the run and every later lookup reports "unavailable".

use std::time::Duration;

use divtrack::Symbol;
use log::{debug, warn};
use reqwest::blocking::Client;
use rustc_hash::FxHashMap;
use serde_json::Value;

pub const BASE_URL: &str = "https://www.alphavantage.co/query";

/// The dividend-relevant part of an `OVERVIEW` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overview {
    /// Trailing annual dividend per share.
    pub dividend_per_share: Option<f64>,
    /// Dividend yield as a fraction (0.05 = 5%).
    pub dividend_yield: Option<f64>,
    pub shares_outstanding: Option<f64>,
}

/// Outcome of one Alpha Vantage call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Data(T),
    /// Unknown symbol, no such field, or an error message.
    Unavailable,
    /// `Note`/`Information` throttle message.
    RateLimited(String),
}

/// Source of fundamental dividend data.
pub trait Fundamentals {
    fn overview(&mut self, symbol: &Symbol) -> Option<Overview>;

    /// Total dividends paid in the latest fiscal year, in dollars.
    fn annual_dividend_payout(&mut self, symbol: &Symbol) -> Option<f64>;
}

/// Blocking Alpha Vantage client.
pub struct AlphaVantage {
    client: Client,
    api_key: String,
    base_url: String,
    limited: bool,
    overviews: FxHashMap<Symbol, Option<Overview>>,
}

impl AlphaVantage {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            limited: false,
            overviews: FxHashMap::default(),
        }
    }

    /// True once a rate-limit note was seen.
    pub fn is_rate_limited(&self) -> bool {
        self.limited
    }

    fn query(&mut self, function: &str, symbol: &Symbol) -> Option<String> {
        if self.limited {
            return None;
        }
        debug!("alphavantage {function} {symbol}");
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", function),
                ("symbol", symbol.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send();

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                warn!("alphavantage {function} {symbol}: request failed: {e}");
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!("alphavantage {function} {symbol}: HTTP {}", resp.status());
            return None;
        }
        match resp.text() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("alphavantage {function} {symbol}: reading body failed: {e}");
                None
            }
        }
    }

    fn settle<T>(&mut self, function: &str, symbol: &Symbol, reply: Reply<T>) -> Option<T> {
        match reply {
            Reply::Data(value) => Some(value),
            Reply::Unavailable => {
                debug!("alphavantage {function} {symbol}: no data");
                None
            }
            Reply::RateLimited(note) => {
                warn!("alphavantage rate limit reached, skipping it for the rest of this run: {note}");
                self.limited = true;
                None
            }
        }
    }
}

impl Fundamentals for AlphaVantage {
    fn overview(&mut self, symbol: &Symbol) -> Option<Overview> {
        if let Some(cached) = self.overviews.get(symbol) {
            return cached.clone();
        }
        let body = self.query("OVERVIEW", symbol)?;
        let overview = self.settle("OVERVIEW", symbol, parse_overview(&body));
        // A throttled answer says nothing about the symbol.
        if !self.limited {
            self.overviews.insert(symbol.clone(), overview.clone());
        }
        overview
    }

    fn annual_dividend_payout(&mut self, symbol: &Symbol) -> Option<f64> {
        let body = self.query("CASH_FLOW", symbol)?;
        self.settle("CASH_FLOW", symbol, parse_cash_flow(&body))
    }
}

/// Classify throttle and error envelopes shared by every function.
fn envelope(json: &Value) -> Option<Reply<()>> {
    for key in ["Note", "Information"] {
        if let Some(note) = json.get(key).and_then(Value::as_str) {
            return Some(Reply::RateLimited(note.to_string()));
        }
    }
    if let Some(message) = json.get("Error Message").and_then(Value::as_str) {
        warn!("alphavantage error: {message}");
        return Some(Reply::Unavailable);
    }
    None
}

/// Numbers arrive as strings; "None", "-" and zero mean absent.
fn number(json: &Value, key: &str) -> Option<f64> {
    let value = match json.get(key)? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

pub fn parse_overview(body: &str) -> Reply<Overview> {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => {
            warn!("alphavantage OVERVIEW: invalid JSON: {e}");
            return Reply::Unavailable;
        }
    };
    if let Some(Reply::RateLimited(note)) = envelope(&json) {
        return Reply::RateLimited(note);
    }
    if json.get("Symbol").is_none() {
        return Reply::Unavailable;
    }
    Reply::Data(Overview {
        dividend_per_share: number(&json, "DividendPerShare"),
        dividend_yield: number(&json, "DividendYield"),
        shares_outstanding: number(&json, "SharesOutstanding"),
    })
}

/// Dividend payout of the most recent annual report.
pub fn parse_cash_flow(body: &str) -> Reply<f64> {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => {
            warn!("alphavantage CASH_FLOW: invalid JSON: {e}");
            return Reply::Unavailable;
        }
    };
    if let Some(Reply::RateLimited(note)) = envelope(&json) {
        return Reply::RateLimited(note);
    }
    let Some(reports) = json.get("annualReports").and_then(Value::as_array) else {
        return Reply::Unavailable;
    };
    let latest = reports
        .iter()
        .max_by_key(|r| r.get("fiscalDateEnding").and_then(Value::as_str).unwrap_or(""));
    let payout = latest
        .and_then(|r| number(r, "dividendPayout").or_else(|| number(r, "dividendPayoutCommonStock")));
    match payout {
        Some(payout) => Reply::Data(payout),
        None => Reply::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_fields() {
        let body = r#"{
            "Symbol": "O",
            "Name": "Realty Income Corporation",
            "DividendPerShare": "3.08",
            "DividendYield": "0.0565",
            "SharesOutstanding": "870000000"
        }"#;
        let Reply::Data(overview) = parse_overview(body) else {
            panic!("expected data");
        };
        assert_eq!(overview.dividend_per_share, Some(3.08));
        assert_eq!(overview.dividend_yield, Some(0.0565));
        assert_eq!(overview.shares_outstanding, Some(870_000_000.0));
    }

    #[test]
    fn overview_none_values() {
        let body = r#"{"Symbol": "TSLA", "DividendPerShare": "None", "DividendYield": "0"}"#;
        assert_eq!(parse_overview(body), Reply::Data(Overview::default()));
    }

    #[test]
    fn overview_unknown_symbol() {
        assert_eq!(parse_overview("{}"), Reply::Unavailable);
        assert_eq!(
            parse_overview(r#"{"Error Message": "Invalid API call."}"#),
            Reply::Unavailable
        );
    }

    #[test]
    fn rate_limit_notes() {
        let note = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        assert!(matches!(parse_overview(note), Reply::RateLimited(_)));
        let info = r#"{"Information": "You have reached the daily limit."}"#;
        assert!(matches!(parse_cash_flow(info), Reply::RateLimited(_)));
    }

    #[test]
    fn cash_flow_uses_latest_report() {
        let body = r#"{
            "symbol": "MAIN",
            "annualReports": [
                {"fiscalDateEnding": "2022-12-31", "dividendPayout": "200000000"},
                {"fiscalDateEnding": "2023-12-31", "dividendPayout": "230000000"}
            ]
        }"#;
        assert_eq!(parse_cash_flow(body), Reply::Data(230_000_000.0));
    }

    #[test]
    fn cash_flow_without_payout() {
        let body = r#"{"symbol": "X", "annualReports": [{"fiscalDateEnding": "2023-12-31", "dividendPayout": "None"}]}"#;
        assert_eq!(parse_cash_flow(body), Reply::Unavailable);
        assert_eq!(parse_cash_flow("not json"), Reply::Unavailable);
    }

    #[test]
    fn limited_client_makes_no_calls() {
        let mut av = AlphaVantage::with_base_url("demo", "http://127.0.0.1:9");
        av.limited = true;
        let symbol = Symbol::new("O").unwrap();
        assert!(av.overview(&symbol).is_none());
        assert!(av.annual_dividend_payout(&symbol).is_none());
        assert!(av.is_rate_limited());
    }
}
