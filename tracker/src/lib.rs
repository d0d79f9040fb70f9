//! divtrack-tracker: dividend income tracker for E*TRADE and Schwab accounts.
//!
//! Fetches accounts, balances and positions from the configured brokers,
//! estimates each holding's dividend income (config overrides, broker quotes,
//! then Alpha Vantage fundamentals) and keeps an Excel workbook with a dated,
//! colour-coded yield history. A Telegram message summarises each run.

pub mod alphavantage;
pub mod audit;
pub mod auth;
pub mod broker;
pub mod config;
pub mod dividends;
pub mod error;
pub mod execution;
pub mod journal;
pub mod telegram;
pub mod workbook;
