//! Broker trait and implementations for divtrack.
//!
//! Provides a generic `Broker` trait that abstracts over the brokerages
//! holdings are fetched from. Implementations:
//!
//! - **E*TRADE** (feature `etrade`): REST API with OAuth1 request signing
//! - **Schwab** (feature `schwab`): Trader and Market Data APIs with OAuth2
//!
//! Both sessions need a human in the loop the first time (or each day, for
//! E*TRADE). That interaction goes through the [`Authorizer`] trait so the
//! clients stay free of terminal code.

pub mod error;
pub mod mock;
pub mod session;
pub mod token;
pub mod types;

#[cfg(any(feature = "etrade", feature = "schwab"))]
mod http;

#[cfg(feature = "etrade")]
pub mod etrade;

#[cfg(feature = "schwab")]
pub mod schwab;

pub use divtrack::Position;
pub use error::BrokerError;
pub use types::*;

use divtrack::Symbol;

/// A broker connection that can list accounts and fetch balances, positions
/// and quotes.
///
/// Methods take `&mut self` because a rejected session is re-established in
/// place.
pub trait Broker {
    /// Short lowercase name used in logs, config and the Accounts sheet.
    fn name(&self) -> &str;

    /// Establish a session (cached token or interactive authorization).
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Drop the session.
    fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Open accounts visible to this session.
    fn accounts(&mut self) -> Result<Vec<Account>, BrokerError>;

    /// Cash and total value of one account.
    fn balance(&mut self, account: &Account) -> Result<Balance, BrokerError>;

    /// Current holdings of one account.
    fn positions(&mut self, account: &Account) -> Result<Vec<Position>, BrokerError>;

    /// Quotes for the given symbols. Unknown symbols are omitted.
    fn quotes(&mut self, symbols: &[Symbol]) -> Result<Vec<Quote>, BrokerError>;
}

/// Hands an authorization URL to a human and returns what they paste back.
pub trait Authorizer {
    /// `None` means the user cancelled.
    fn authorize(&self, broker: &str, url: &str) -> Option<String>;
}
