//! E*TRADE REST client.

use std::time::Duration;

use chrono::Utc;
use log::debug;
use reqwest::blocking::Client;

use super::oauth::{self, OAuthParams};
use super::types::parse_token_form;
use crate::error::BrokerError;
use crate::http;

pub const LIVE_URL: &str = "https://api.etrade.com";
pub const SANDBOX_URL: &str = "https://apisb.etrade.com";
pub const AUTHORIZE_URL: &str = "https://us.etrade.com/e/t/etws/authorize";

/// Blocking E*TRADE client. Holds consumer credentials; the access token is
/// passed per call.
pub struct EtradeClient {
    client: Client,
    consumer_key: String,
    consumer_secret: String,
    base_url: String,
}

/// A token/secret pair (request or access).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub secret: String,
}

impl EtradeClient {
    pub fn new(consumer_key: &str, consumer_secret: &str, sandbox: bool) -> Self {
        let base_url = if sandbox { SANDBOX_URL } else { LIVE_URL };
        Self::with_base_url(consumer_key, consumer_secret, base_url)
    }

    /// Client against an arbitrary base URL.
    pub fn with_base_url(consumer_key: &str, consumer_secret: &str, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Step 1: obtain a request token (`oauth_callback=oob`).
    pub fn request_token(&self) -> Result<TokenPair, BrokerError> {
        let url = format!("{}/oauth/request_token", self.base_url);
        let params = OAuthParams {
            consumer_key: &self.consumer_key,
            consumer_secret: &self.consumer_secret,
            token: None,
            token_secret: "",
            extra: &[("oauth_callback", "oob")],
        };
        let body = self.signed_get(&url, &[], &params, "request token")?;
        let (token, secret) = parse_token_form(&body)?;
        Ok(TokenPair { token, secret })
    }

    /// Step 2: the page where the user approves access and reads the verifier.
    pub fn authorize_url(&self, request: &TokenPair) -> String {
        format!(
            "{AUTHORIZE_URL}?key={}&token={}",
            oauth::percent_encode(&self.consumer_key),
            oauth::percent_encode(&request.token)
        )
    }

    /// Step 3: exchange the request token and verifier for an access token.
    pub fn access_token(
        &self,
        request: &TokenPair,
        verifier: &str,
    ) -> Result<TokenPair, BrokerError> {
        let url = format!("{}/oauth/access_token", self.base_url);
        let params = OAuthParams {
            consumer_key: &self.consumer_key,
            consumer_secret: &self.consumer_secret,
            token: Some(&request.token),
            token_secret: &request.secret,
            extra: &[("oauth_verifier", verifier)],
        };
        let body = self
            .signed_get(&url, &[], &params, "access token")
            .map_err(|e| match e {
                BrokerError::Unauthorized => {
                    BrokerError::Auth("verification code rejected".into())
                }
                other => other,
            })?;
        let (token, secret) = parse_token_form(&body)?;
        Ok(TokenPair { token, secret })
    }

    /// Signed GET of an API path (`/v1/...`). `None` for 204 No Content.
    pub fn get(
        &self,
        access: &TokenPair,
        path: &str,
        query: &[(&str, &str)],
        what: &'static str,
    ) -> Result<Option<String>, BrokerError> {
        let url = format!("{}{path}", self.base_url);
        let params = OAuthParams {
            consumer_key: &self.consumer_key,
            consumer_secret: &self.consumer_secret,
            token: Some(&access.token),
            token_secret: &access.secret,
            extra: &[],
        };
        let header = oauth::authorization_header(
            "GET",
            &url,
            query,
            &params,
            &oauth::nonce(),
            Utc::now().timestamp(),
        )?;
        debug!("etrade GET {path} {query:?}");
        let resp = self
            .client
            .get(&url)
            .query(query)
            .header("Authorization", header)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| http::send_error(what, e))?;
        http::body(resp, what)
    }

    fn signed_get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        params: &OAuthParams<'_>,
        what: &'static str,
    ) -> Result<String, BrokerError> {
        let header = oauth::authorization_header(
            "GET",
            url,
            query,
            params,
            &oauth::nonce(),
            Utc::now().timestamp(),
        )?;
        let resp = self
            .client
            .get(url)
            .query(query)
            .header("Authorization", header)
            .send()
            .map_err(|e| http::send_error(what, e))?;
        http::require_body(resp, what)
    }
}
