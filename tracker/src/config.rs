//! TOML configuration loading and validation.
//!
//! Secrets may be left empty in the file and supplied through environment
//! variables instead; see [`Config::apply_env`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use divtrack::{Symbol, YieldThresholds};
use divtrack_broker::etrade::EtradeConfig;
use divtrack_broker::schwab::SchwabConfig;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workbook: WorkbookConfig,
    #[serde(default)]
    pub etrade: EtradeSection,
    #[serde(default)]
    pub schwab: SchwabSection,
    #[serde(default)]
    pub dividends: DividendConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkbookConfig {
    #[serde(default = "default_workbook_path")]
    pub path: PathBuf,
    /// Copy the previous file to `<stem>.backup.xlsx` before writing.
    #[serde(default = "default_true")]
    pub backup: bool,
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            path: default_workbook_path(),
            backup: true,
        }
    }
}

fn default_workbook_path() -> PathBuf {
    PathBuf::from("dividends.xlsx")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtradeSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
    #[serde(default)]
    pub sandbox: bool,
    /// Defaults to `~/.divtrack/etrade_token.json`.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchwabSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default = "default_callback")]
    pub callback_url: String,
    /// Defaults to `~/.divtrack/schwab_token.json`.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

impl Default for SchwabSection {
    fn default() -> Self {
        Self {
            enabled: false,
            app_key: String::new(),
            app_secret: String::new(),
            callback_url: default_callback(),
            token_file: None,
        }
    }
}

fn default_callback() -> String {
    "https://127.0.0.1".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DividendConfig {
    #[serde(default)]
    pub alphavantage_api_key: String,
    #[serde(default = "default_high_yield")]
    pub high_yield_pct: f64,
    #[serde(default = "default_moderate_yield")]
    pub moderate_yield_pct: f64,
    /// Annual dividend per share by ticker; wins over every other source.
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

impl Default for DividendConfig {
    fn default() -> Self {
        Self {
            alphavantage_api_key: String::new(),
            high_yield_pct: default_high_yield(),
            moderate_yield_pct: default_moderate_yield(),
            overrides: BTreeMap::new(),
        }
    }
}

fn default_high_yield() -> f64 {
    15.0
}
fn default_moderate_yield() -> f64 {
    8.0
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Try to open the authorization page in the default browser.
    #[serde(default = "default_true")]
    pub open_browser: bool,
    /// Ring the terminal bell when input is needed.
    #[serde(default = "default_true")]
    pub bell: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            open_browser: true,
            bell: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file, fill secrets from the environment and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill empty secret fields from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |field: &mut String, key: &str| {
            if field.trim().is_empty() {
                if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                    *field = value;
                }
            }
        };
        fill(&mut self.etrade.consumer_key, "ETRADE_CONSUMER_KEY");
        fill(&mut self.etrade.consumer_secret, "ETRADE_CONSUMER_SECRET");
        fill(&mut self.schwab.app_key, "SCHWAB_APP_KEY");
        fill(&mut self.schwab.app_secret, "SCHWAB_APP_SECRET");
        fill(&mut self.dividends.alphavantage_api_key, "ALPHAVANTAGE_API_KEY");
        fill(&mut self.alerts.telegram_bot_token, "TELEGRAM_BOT_TOKEN");
        fill(&mut self.alerts.telegram_chat_id, "TELEGRAM_CHAT_ID");
    }

    /// Validate config invariants shared by every command.
    ///
    /// Broker sections are checked separately by [`Config::validate_brokers`],
    /// since `alert` and `trades import` never open a session.
    pub fn validate(&self) -> Result<()> {
        if self.workbook.path.as_os_str().is_empty() {
            return Err(Error::Config("workbook path must not be empty".into()));
        }
        let d = &self.dividends;
        if !(d.moderate_yield_pct > 0.0 && d.high_yield_pct > d.moderate_yield_pct) {
            return Err(Error::Config(
                "yield thresholds must satisfy 0 < moderate_yield_pct < high_yield_pct".into(),
            ));
        }
        self.overrides()?;
        if self.alerts.enabled
            && (self.alerts.telegram_bot_token.is_empty() || self.alerts.telegram_chat_id.is_empty())
        {
            return Err(Error::Config(
                "alerts enabled but telegram_bot_token/telegram_chat_id missing".into(),
            ));
        }
        Ok(())
    }

    /// Broker invariants: at least one broker enabled, each with credentials.
    pub fn validate_brokers(&self) -> Result<()> {
        if !self.etrade.enabled && !self.schwab.enabled {
            return Err(Error::Config("enable at least one of [etrade] or [schwab]".into()));
        }
        if self.etrade.enabled
            && (self.etrade.consumer_key.is_empty() || self.etrade.consumer_secret.is_empty())
        {
            return Err(Error::Config(
                "etrade consumer_key/consumer_secret missing (or set ETRADE_CONSUMER_KEY/ETRADE_CONSUMER_SECRET)".into(),
            ));
        }
        if self.schwab.enabled {
            if self.schwab.app_key.is_empty() || self.schwab.app_secret.is_empty() {
                return Err(Error::Config(
                    "schwab app_key/app_secret missing (or set SCHWAB_APP_KEY/SCHWAB_APP_SECRET)".into(),
                ));
            }
            if !self.schwab.callback_url.starts_with("https://") {
                return Err(Error::Config("schwab callback_url must be an https URL".into()));
            }
        }
        Ok(())
    }

    pub fn thresholds(&self) -> YieldThresholds {
        YieldThresholds {
            high_pct: self.dividends.high_yield_pct,
            moderate_pct: self.dividends.moderate_yield_pct,
        }
    }

    /// Dividend overrides keyed by normalized symbol.
    pub fn overrides(&self) -> Result<FxHashMap<Symbol, f64>> {
        self.dividends
            .overrides
            .iter()
            .map(|(ticker, rate)| {
                let symbol = Symbol::new(ticker)
                    .map_err(|e| Error::Config(format!("dividend override: {e}")))?;
                if !rate.is_finite() || *rate < 0.0 {
                    return Err(Error::Config(format!(
                        "dividend override for {symbol} must be >= 0"
                    )));
                }
                Ok((symbol, *rate))
            })
            .collect()
    }

    pub fn etrade_config(&self) -> EtradeConfig {
        EtradeConfig {
            consumer_key: self.etrade.consumer_key.clone(),
            consumer_secret: self.etrade.consumer_secret.clone(),
            sandbox: self.etrade.sandbox,
            token_path: self
                .etrade
                .token_file
                .clone()
                .unwrap_or_else(|| default_token_path("etrade_token.json")),
        }
    }

    pub fn schwab_config(&self) -> SchwabConfig {
        SchwabConfig {
            app_key: self.schwab.app_key.clone(),
            app_secret: self.schwab.app_secret.clone(),
            callback_url: self.schwab.callback_url.clone(),
            token_path: self
                .schwab
                .token_file
                .clone()
                .unwrap_or_else(|| default_token_path("schwab_token.json")),
        }
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}

/// `~/.divtrack/<file>`, or the working directory if there is no home.
fn default_token_path(file: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".divtrack")
        .join(file)
}
