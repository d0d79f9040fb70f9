//! Schwab REST client: OAuth2 token endpoint plus bearer-authenticated GETs.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;

use super::types::{TokenResponse, parse_token};
use crate::error::BrokerError;
use crate::http;

pub const API_URL: &str = "https://api.schwabapi.com";

/// Blocking Schwab client.
pub struct SchwabClient {
    client: Client,
    app_key: String,
    app_secret: String,
    callback_url: String,
    base_url: String,
}

impl SchwabClient {
    pub fn new(app_key: &str, app_secret: &str, callback_url: &str) -> Self {
        Self::with_base_url(app_key, app_secret, callback_url, API_URL)
    }

    pub fn with_base_url(app_key: &str, app_secret: &str, callback_url: &str, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            callback_url: callback_url.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Page where the user logs in and approves the app.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/v1/oauth/authorize?client_id={}&redirect_uri={}",
            self.base_url,
            urlencoding::encode(&self.app_key),
            urlencoding::encode(&self.callback_url)
        )
    }

    /// Exchange an authorization code for a token pair.
    pub fn exchange_code(&self, code: &str) -> Result<TokenResponse, BrokerError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.callback_url),
        ])
    }

    /// Get a new access token from a refresh token.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, BrokerError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
    }

    /// Bearer-authenticated GET of an API path.
    pub fn get(
        &self,
        access_token: &str,
        path: &str,
        query: &[(&str, &str)],
        what: &'static str,
    ) -> Result<String, BrokerError> {
        let url = format!("{}{path}", self.base_url);
        debug!("schwab GET {path} {query:?}");
        let resp = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| http::send_error(what, e))?;
        http::require_body(resp, what)
    }

    fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, BrokerError> {
        let url = format!("{}/v1/oauth/token", self.base_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.app_key, Some(&self.app_secret))
            .form(form)
            .send()
            .map_err(|e| http::send_error("token", e))?;
        let body = http::require_body(resp, "token").map_err(|e| match e {
            BrokerError::Unauthorized => BrokerError::Auth("schwab: token request rejected".into()),
            BrokerError::Http { status, body } => {
                BrokerError::Auth(format!("schwab: token request failed ({status}): {body}"))
            }
            other => other,
        })?;
        parse_token(&body)
    }
}
