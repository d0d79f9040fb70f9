//! Mock broker for testing — implements the `Broker` trait with configurable behavior.
//!
//! Use this in integration tests to simulate broker responses without network calls.
//!
//! ```
//! use divtrack::Symbol;
//! use divtrack_broker::Broker;
//! use divtrack_broker::mock::MockBroker;
//!
//! let mut broker = MockBroker::builder("mock")
//!     .with_account("1001", "Brokerage", 2_500.0)
//!     .with_position("1001", Symbol::new("O").unwrap(), 100.0, 52.0, 60.0)
//!     .with_quote(Symbol::new("O").unwrap(), 60.0, Some(3.0))
//!     .build();
//!
//! broker.connect().unwrap();
//! let accounts = broker.accounts().unwrap();
//! assert_eq!(broker.positions(&accounts[0]).unwrap().len(), 1);
//! ```

use divtrack::{Position, Symbol};

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    name: String,
    accounts: Vec<(Account, f64)>,
    positions: Vec<Position>,
    quotes: Vec<Quote>,
    fail_connect: bool,
    unauthorized_calls: usize,
}

impl MockBrokerBuilder {
    /// Add an account with the given cash balance.
    pub fn with_account(mut self, id: &str, description: &str, cash: f64) -> Self {
        self.accounts.push((
            Account {
                id: id.to_string(),
                key: format!("key-{id}"),
                description: description.to_string(),
                kind: "INDIVIDUAL".to_string(),
            },
            cash,
        ));
        self
    }

    /// Add a holding to the account with id `account`.
    pub fn with_position(
        mut self,
        account: &str,
        symbol: Symbol,
        quantity: f64,
        price_paid: f64,
        current_price: f64,
    ) -> Self {
        self.positions.push(Position {
            symbol,
            account: account.to_string(),
            quantity,
            price_paid,
            current_price,
            market_value: quantity * current_price,
        });
        self
    }

    pub fn with_quote(mut self, symbol: Symbol, last: f64, annual_dividend: Option<f64>) -> Self {
        self.quotes.push(Quote {
            symbol,
            last,
            annual_dividend,
            dividend_yield: None,
            ex_dividend_date: None,
            description: String::new(),
        });
        self
    }

    /// Make `connect` fail with an authentication error.
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Reject the next `n` data calls with `Unauthorized`.
    pub fn unauthorized_calls(mut self, n: usize) -> Self {
        self.unauthorized_calls = n;
        self
    }

    pub fn build(self) -> MockBroker {
        MockBroker {
            name: self.name,
            connected: false,
            accounts: self.accounts,
            positions: self.positions,
            quotes: self.quotes,
            fail_connect: self.fail_connect,
            unauthorized_calls: self.unauthorized_calls,
            connects: 0,
        }
    }
}

/// A mock broker returning canned accounts, positions and quotes.
pub struct MockBroker {
    name: String,
    connected: bool,
    accounts: Vec<(Account, f64)>,
    positions: Vec<Position>,
    quotes: Vec<Quote>,
    fail_connect: bool,
    unauthorized_calls: usize,
    connects: usize,
}

impl MockBroker {
    pub fn builder(name: &str) -> MockBrokerBuilder {
        MockBrokerBuilder {
            name: name.to_string(),
            accounts: Vec::new(),
            positions: Vec::new(),
            quotes: Vec::new(),
            fail_connect: false,
            unauthorized_calls: 0,
        }
    }

    /// How many times `connect` succeeded.
    pub fn connects(&self) -> usize {
        self.connects
    }

    fn check(&mut self) -> Result<(), BrokerError> {
        if !self.connected {
            return Err(BrokerError::NotConnected);
        }
        if self.unauthorized_calls > 0 {
            self.unauthorized_calls -= 1;
            return Err(BrokerError::Unauthorized);
        }
        Ok(())
    }
}

impl Broker for MockBroker {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        if self.fail_connect {
            return Err(BrokerError::Auth("mock: authorization cancelled".into()));
        }
        self.connected = true;
        self.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }

    fn accounts(&mut self) -> Result<Vec<Account>, BrokerError> {
        self.check()?;
        Ok(self.accounts.iter().map(|(a, _)| a.clone()).collect())
    }

    fn balance(&mut self, account: &Account) -> Result<Balance, BrokerError> {
        self.check()?;
        let (_, cash) = self
            .accounts
            .iter()
            .find(|(a, _)| a.id == account.id)
            .ok_or_else(|| BrokerError::Other(format!("mock: unknown account {}", account.id)))?;
        let invested: f64 = self
            .positions
            .iter()
            .filter(|p| p.account == account.id)
            .map(|p| p.market_value)
            .sum();
        Ok(Balance {
            account_id: account.id.clone(),
            cash: *cash,
            total_value: cash + invested,
        })
    }

    fn positions(&mut self, account: &Account) -> Result<Vec<Position>, BrokerError> {
        self.check()?;
        Ok(self
            .positions
            .iter()
            .filter(|p| p.account == account.id)
            .cloned()
            .collect())
    }

    fn quotes(&mut self, symbols: &[Symbol]) -> Result<Vec<Quote>, BrokerError> {
        self.check()?;
        Ok(self
            .quotes
            .iter()
            .filter(|q| symbols.contains(&q.symbol))
            .cloned()
            .collect())
    }
}
