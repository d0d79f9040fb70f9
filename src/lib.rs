//! # divtrack
//!
//! Domain core for a dividend-income tracker: holdings, dividend estimates,
//! yield tiers, trade journal values and the named-column sheet schemas the
//! workbook is read and written through.
//!
//! Nothing in this crate touches the network or the filesystem. Broker
//! clients live in `divtrack-broker`; the CLI and workbook persistence live
//! in `divtrack-tracker`.
//!
//! ## Quick Start
//!
//! ```
//! use divtrack::{DividendRate, Position, RateSource, Symbol, YieldThresholds, YieldTier, estimate};
//!
//! let position = Position {
//!     symbol: Symbol::new("o").unwrap(),
//!     account: "Brokerage".into(),
//!     quantity: 100.0,
//!     price_paid: 52.0,
//!     current_price: 60.0,
//!     market_value: 6_000.0,
//! };
//!
//! let est = estimate(&position, &DividendRate::new(3.0, RateSource::Broker));
//! assert_eq!(est.annual, 300.0);
//! assert_eq!(est.monthly, 25.0);
//! assert_eq!(est.yield_pct, Some(5.0));
//! assert_eq!(YieldThresholds::default().tier(est.yield_pct), YieldTier::Low);
//! ```
//!
//! ## Trade values
//!
//! Journal rows derive their value columns from the trade kind:
//!
//! ```
//! use divtrack::{Trade, TradeKind, Symbol};
//! use chrono::NaiveDate;
//!
//! let trade = Trade {
//!     date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
//!     symbol: Symbol::new("KO").unwrap(),
//!     kind: TradeKind::SoldPut,
//!     shares: -1.0,
//!     cost: 2.5,
//!     strike: Some(25.0),
//! };
//! let cells = trade.formatted();
//! assert_eq!(cells.investment, "");
//! assert_eq!(cells.put_value, "$2.50");
//! assert_eq!(cells.put_cash_req, "$25.00");
//! assert_eq!(cells.call_value, "");
//! ```

pub mod dividend;
mod error;
pub mod format;
pub mod ledger;
pub mod options;
pub mod position;
pub mod schema;
pub mod trade;
mod types;

pub use dividend::{
    DividendEstimate, DividendRate, PortfolioTotals, RateSource, YieldThresholds, YieldTier,
    estimate, totals, totals_by_account,
};
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerRow, SnapshotReport, TierChange};
pub use options::{OptionContract, OptionKind};
pub use position::Position;
pub use trade::{FormattedTradeValues, Trade, TradeKind, TradeValues};
pub use types::Symbol;
