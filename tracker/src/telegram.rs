//! Telegram Bot API alerts.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::NaiveDate;
use divtrack::format::{format_money, format_percent, format_us_date};
use divtrack::{PortfolioTotals, TierChange};
use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::AlertConfig;
use crate::error::{Error, Result};

pub const API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages to one chat.
pub struct Telegram {
    client: Client,
    token: String,
    chat_id: String,
    base_url: String,
}

impl Telegram {
    pub fn new(config: &AlertConfig) -> Self {
        Self::with_base_url(config, API_URL)
    }

    pub fn with_base_url(config: &AlertConfig, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `sendMessage` with plain text.
    pub fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        debug!("telegram sendMessage ({} chars)", text.len());
        let resp = self
            .client
            .get(&url)
            .query(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .map_err(|e| Error::Alert(format!("request failed: {}", e.without_url())))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| Error::Alert(format!("reading response failed: {e}")))?;
        check_reply(status.as_u16(), &body)
    }
}

/// Interpret a `sendMessage` response.
fn check_reply(status: u16, body: &str) -> Result<()> {
    match serde_json::from_str::<ApiReply>(body) {
        Ok(reply) if reply.ok => Ok(()),
        Ok(reply) => Err(Error::Alert(format!(
            "HTTP {status}: {}",
            reply.description.unwrap_or_else(|| "unknown error".into())
        ))),
        Err(_) => Err(Error::Alert(format!("HTTP {status}: unexpected response"))),
    }
}

/// Summary sent after an update run.
pub fn compose_update_message(
    date: NaiveDate,
    totals: &PortfolioTotals,
    accounts: &[(String, PortfolioTotals)],
    changes: &[TierChange],
) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "Dividend update {}", format_us_date(date));
    let _ = writeln!(
        msg,
        "Market value {} | annual {} | monthly {}",
        format_money(totals.market_value),
        format_money(totals.annual),
        format_money(totals.monthly)
    );
    if let Some(y) = totals.yield_pct() {
        let _ = writeln!(msg, "Portfolio yield {}", format_percent(y));
    }

    if accounts.len() > 1 {
        for (account, t) in accounts {
            let _ = writeln!(
                msg,
                "  {account}: {} ({}/mo)",
                format_money(t.annual),
                format_money(t.monthly)
            );
        }
    }

    if changes.is_empty() {
        let _ = writeln!(msg, "No yield tier changes.");
    } else {
        let _ = writeln!(msg, "Yield tier changes:");
        for c in changes {
            let _ = writeln!(
                msg,
                "  {} ({}): {} {} -> {} {}",
                c.symbol,
                c.account,
                c.from,
                format_percent(c.previous),
                c.to,
                format_percent(c.current)
            );
        }
    }
    msg.trim_end().to_string()
}
