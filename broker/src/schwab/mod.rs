//! Schwab broker implementation.
//!
//! Access tokens last 30 minutes and are refreshed transparently; the refresh
//! token lasts 7 days, after which the browser flow runs again.

pub mod client;
pub mod types;

use std::path::PathBuf;

use chrono::Utc;
use divtrack::{Position, Symbol};
use log::{debug, info, warn};

use crate::error::BrokerError;
use crate::session::{SessionControl, with_reauth};
use crate::token::{SchwabToken, TokenFile};
use crate::types::*;
use crate::{Authorizer, Broker};
use client::SchwabClient;

/// Symbols per market-data request.
pub const MAX_QUOTE_SYMBOLS: usize = 100;

/// Connection settings for [`SchwabBroker`].
#[derive(Debug, Clone)]
pub struct SchwabConfig {
    pub app_key: String,
    pub app_secret: String,
    /// Registered redirect URI of the app.
    pub callback_url: String,
    pub token_path: PathBuf,
}

/// Pull the authorization code out of a pasted redirect URL, or accept a
/// bare code. The code is URL-decoded.
///
/// ```
/// use divtrack_broker::schwab::extract_code;
///
/// let url = "https://127.0.0.1/?code=C0.abc%40&session=xyz";
/// assert_eq!(extract_code(url).as_deref(), Some("C0.abc@"));
/// assert_eq!(extract_code("  C0.abc  ").as_deref(), Some("C0.abc"));
/// assert_eq!(extract_code(""), None);
/// ```
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let query = match input.split_once('?') {
        Some((_, query)) => Some(query),
        None if input.contains("code=") => Some(input),
        None => None,
    };
    let raw = match query {
        Some(query) => {
            let query = query.split('#').next().unwrap_or(query);
            query.split('&').find_map(|pair| pair.strip_prefix("code="))?
        }
        None => input,
    };
    let decoded = urlencoding::decode(raw).ok()?.into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

/// Schwab broker implementing the generic Broker trait.
pub struct SchwabBroker {
    client: SchwabClient,
    store: TokenFile,
    authorizer: Box<dyn Authorizer>,
    token: Option<SchwabToken>,
}

impl SchwabBroker {
    /// Create a broker handle (not yet connected).
    pub fn new(config: &SchwabConfig, authorizer: Box<dyn Authorizer>) -> Self {
        Self {
            client: SchwabClient::new(&config.app_key, &config.app_secret, &config.callback_url),
            store: TokenFile::new(&config.token_path),
            authorizer,
            token: None,
        }
    }

    fn authorize_interactive(&mut self) -> Result<SchwabToken, BrokerError> {
        info!("schwab: authorization required");
        let url = self.client.authorize_url();
        let code = self
            .authorizer
            .authorize(self.name(), &url)
            .as_deref()
            .and_then(extract_code);
        let Some(code) = code else {
            self.store.delete()?;
            return Err(BrokerError::Auth("schwab: authorization cancelled".into()));
        };

        let response = match self.client.exchange_code(&code) {
            Ok(response) => response,
            Err(e) => {
                self.store.delete()?;
                return Err(e);
            }
        };
        let token = response.into_token(Utc::now(), None);
        self.store.save(&token)?;
        info!("schwab: tokens saved to {}", self.store.path().display());
        Ok(token)
    }

    fn get(
        &mut self,
        path: &str,
        query: &[(&str, &str)],
        what: &'static str,
    ) -> Result<String, BrokerError> {
        with_reauth(self, |broker| {
            let fresh = match &broker.token {
                None => return Err(BrokerError::NotConnected),
                Some(token) => token.access_valid_at(Utc::now()),
            };
            if !fresh {
                broker.establish()?;
            }
            let token = broker.token.as_ref().ok_or(BrokerError::NotConnected)?;
            broker.client.get(&token.access_token, path, query, what)
        })
    }

    fn details(
        &mut self,
        account: &Account,
        with_positions: bool,
    ) -> Result<types::AccountDetails, BrokerError> {
        let path = format!("/trader/v1/accounts/{}", account.key);
        let query: &[(&str, &str)] = if with_positions {
            &[("fields", "positions")]
        } else {
            &[]
        };
        let json = self.get(&path, query, "account details")?;
        types::parse_account_details(&json, &account.id)
    }
}

impl SessionControl for SchwabBroker {
    fn broker_name(&self) -> &str {
        self.name()
    }

    fn establish(&mut self) -> Result<(), BrokerError> {
        let now = Utc::now();
        if self.token.as_ref().is_some_and(|t| t.access_valid_at(now)) {
            return Ok(());
        }

        let cached = self.token.take().or_else(|| self.store.load::<SchwabToken>());
        if let Some(cached) = cached {
            if cached.access_valid_at(now) {
                debug!("schwab: reusing cached access token");
                self.token = Some(cached);
                return Ok(());
            }
            if cached.refresh_valid_at(now) {
                match self.client.refresh(&cached.refresh_token) {
                    Ok(response) => {
                        let token = response.into_token(now, Some(&cached));
                        self.store.save(&token)?;
                        debug!("schwab: access token refreshed");
                        self.token = Some(token);
                        return Ok(());
                    }
                    Err(e) => warn!("schwab: refresh failed, re-authorizing: {e}"),
                }
            } else {
                info!("schwab: refresh token expired");
            }
        }

        self.token = Some(self.authorize_interactive()?);
        Ok(())
    }

    fn invalidate(&mut self) -> Result<(), BrokerError> {
        self.token = None;
        self.store.delete()
    }
}

impl Broker for SchwabBroker {
    fn name(&self) -> &str {
        "schwab"
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        self.establish()
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.token = None;
        Ok(())
    }

    fn accounts(&mut self) -> Result<Vec<Account>, BrokerError> {
        let json = self.get("/trader/v1/accounts/accountNumbers", &[], "account numbers")?;
        let mut accounts = types::parse_account_numbers(&json)?;
        for account in &mut accounts {
            match self.details(account, false) {
                Ok(details) => account.kind = details.kind,
                Err(e) => warn!("schwab: no details for {}: {e}", account.id),
            }
        }
        Ok(accounts)
    }

    fn balance(&mut self, account: &Account) -> Result<Balance, BrokerError> {
        Ok(self.details(account, false)?.balance)
    }

    fn positions(&mut self, account: &Account) -> Result<Vec<Position>, BrokerError> {
        Ok(self.details(account, true)?.positions)
    }

    fn quotes(&mut self, symbols: &[Symbol]) -> Result<Vec<Quote>, BrokerError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(MAX_QUOTE_SYMBOLS) {
            let joined = chunk
                .iter()
                .map(Symbol::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let query = [("symbols", joined.as_str()), ("fields", "quote,fundamental")];
            let json = self.get("/marketdata/v1/quotes", &query, "quotes")?;
            quotes.extend(types::parse_quotes(&json)?);
        }
        Ok(quotes)
    }
}
