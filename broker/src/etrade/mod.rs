//! E*TRADE broker implementation.

pub mod client;
pub mod oauth;
pub mod types;

use std::path::PathBuf;

use chrono::{Datelike, Local, NaiveDate};
use divtrack::{OptionContract, Position, Symbol};
use log::{debug, info, warn};

use crate::error::BrokerError;
use crate::session::{SessionControl, with_reauth};
use crate::token::{OAuthToken, TokenFile};
use crate::types::*;
use crate::{Authorizer, Broker};
use client::{EtradeClient, TokenPair};

/// The quote endpoint accepts at most this many symbols per call.
pub const MAX_QUOTE_SYMBOLS: usize = 25;

/// Connection settings for [`EtradeBroker`].
#[derive(Debug, Clone)]
pub struct EtradeConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub sandbox: bool,
    /// Where the day's access token is cached.
    pub token_path: PathBuf,
}

/// E*TRADE broker implementing the generic Broker trait.
///
/// Access tokens expire at midnight US Eastern, so a cached token is reused
/// only on the local calendar day it was issued.
pub struct EtradeBroker {
    client: EtradeClient,
    store: TokenFile,
    authorizer: Box<dyn Authorizer>,
    access: Option<TokenPair>,
}

impl EtradeBroker {
    /// Create a broker handle (not yet connected).
    pub fn new(config: &EtradeConfig, authorizer: Box<dyn Authorizer>) -> Self {
        Self {
            client: EtradeClient::new(&config.consumer_key, &config.consumer_secret, config.sandbox),
            store: TokenFile::new(&config.token_path),
            authorizer,
            access: None,
        }
    }

    /// Available option expiry dates for an underlying, ascending.
    pub fn option_expiry_dates(&mut self, symbol: &Symbol) -> Result<Vec<NaiveDate>, BrokerError> {
        let body = self.get(
            "/v1/market/optionexpiredate",
            &[("symbol", symbol.as_str())],
            "option expiry dates",
        )?;
        match body {
            Some(json) => types::parse_expiry_dates(&json),
            None => Ok(Vec::new()),
        }
    }

    /// Calls and puts for one expiry.
    pub fn option_chain(
        &mut self,
        symbol: &Symbol,
        expiry: NaiveDate,
    ) -> Result<Vec<OptionContract>, BrokerError> {
        let (year, month, day) = (
            expiry.year().to_string(),
            expiry.month().to_string(),
            expiry.day().to_string(),
        );
        let query = [
            ("symbol", symbol.as_str()),
            ("expiryYear", year.as_str()),
            ("expiryMonth", month.as_str()),
            ("expiryDay", day.as_str()),
            ("chainType", "CALLPUT"),
            ("includeWeekly", "true"),
        ];
        match self.get("/v1/market/optionchains", &query, "option chain")? {
            Some(json) => types::parse_option_chain(&json, symbol, expiry),
            None => Ok(Vec::new()),
        }
    }

    fn authorize_interactive(&mut self) -> Result<TokenPair, BrokerError> {
        info!("etrade: authorization required");
        let request = self.client.request_token()?;
        let url = self.client.authorize_url(&request);

        let verifier = self
            .authorizer
            .authorize(self.name(), &url)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let Some(verifier) = verifier else {
            self.store.delete()?;
            return Err(BrokerError::Auth("etrade: authorization cancelled".into()));
        };

        let access = match self.client.access_token(&request, &verifier) {
            Ok(access) => access,
            Err(e) => {
                self.store.delete()?;
                return Err(e);
            }
        };
        self.store.save(&OAuthToken {
            token: access.token.clone(),
            secret: access.secret.clone(),
            issued_date: Local::now().date_naive(),
        })?;
        info!("etrade: access token saved to {}", self.store.path().display());
        Ok(access)
    }

    fn get(
        &mut self,
        path: &str,
        query: &[(&str, &str)],
        what: &'static str,
    ) -> Result<Option<String>, BrokerError> {
        with_reauth(self, |broker| {
            let access = broker.access.as_ref().ok_or(BrokerError::NotConnected)?;
            broker.client.get(access, path, query, what)
        })
    }
}

impl SessionControl for EtradeBroker {
    fn broker_name(&self) -> &str {
        self.name()
    }

    fn establish(&mut self) -> Result<(), BrokerError> {
        if self.access.is_some() {
            return Ok(());
        }
        let today = Local::now().date_naive();
        if let Some(cached) = self.store.load::<OAuthToken>() {
            if cached.is_valid_on(today) {
                debug!("etrade: reusing token issued {}", cached.issued_date);
                self.access = Some(TokenPair {
                    token: cached.token,
                    secret: cached.secret,
                });
                return Ok(());
            }
            info!("etrade: cached token from {} has expired", cached.issued_date);
        }
        self.access = Some(self.authorize_interactive()?);
        Ok(())
    }

    fn invalidate(&mut self) -> Result<(), BrokerError> {
        self.access = None;
        self.store.delete()
    }
}

impl Broker for EtradeBroker {
    fn name(&self) -> &str {
        "etrade"
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        self.establish()
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.access = None;
        Ok(())
    }

    fn accounts(&mut self) -> Result<Vec<Account>, BrokerError> {
        match self.get("/v1/accounts/list", &[], "account list")? {
            Some(json) => types::parse_accounts(&json),
            None => Ok(Vec::new()),
        }
    }

    fn balance(&mut self, account: &Account) -> Result<Balance, BrokerError> {
        let path = format!("/v1/accounts/{}/balance", account.key);
        let query = [("instType", "BROKERAGE"), ("realTimeNAV", "true")];
        let json = self
            .get(&path, &query, "balance")?
            .ok_or_else(|| BrokerError::parse("balance", "empty response"))?;
        types::parse_balance(&json, &account.id)
    }

    fn positions(&mut self, account: &Account) -> Result<Vec<Position>, BrokerError> {
        let path = format!("/v1/accounts/{}/portfolio", account.key);
        let mut positions = Vec::new();
        let mut page_number = 1u32;
        loop {
            let page = page_number.to_string();
            let query = [("pageNumber", page.as_str())];
            // 204 means the account holds nothing
            let Some(json) = self.get(&path, &query, "portfolio")? else {
                break;
            };
            let page = types::parse_portfolio(&json, &account.id)?;
            positions.extend(page.positions);
            if page_number >= page.total_pages {
                break;
            }
            page_number += 1;
        }
        debug!("etrade: {} positions in {}", positions.len(), account.id);
        Ok(positions)
    }

    fn quotes(&mut self, symbols: &[Symbol]) -> Result<Vec<Quote>, BrokerError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(MAX_QUOTE_SYMBOLS) {
            let joined = chunk
                .iter()
                .map(Symbol::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let path = format!("/v1/market/quote/{joined}");
            match self.get(&path, &[("detailFlag", "ALL")], "quotes")? {
                Some(json) => quotes.extend(types::parse_quotes(&json)?),
                None => warn!("etrade: empty quote response for {joined}"),
            }
        }
        Ok(quotes)
    }
}
