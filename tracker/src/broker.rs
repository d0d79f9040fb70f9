//! Broker sessions and per-run snapshots of accounts, positions and quotes.

use chrono::NaiveDate;
use divtrack::{Position, Symbol};
use divtrack_broker::etrade::EtradeBroker;
use divtrack_broker::schwab::SchwabBroker;
use divtrack_broker::{Account, Balance, Broker, Quote};
use log::{info, warn};

use crate::auth::TerminalAuthorizer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::workbook::AccountRow;

/// Enabled brokers, not yet connected.
pub fn build_brokers(config: &Config) -> Result<Vec<Box<dyn Broker>>> {
    config.validate_brokers()?;
    let mut brokers: Vec<Box<dyn Broker>> = Vec::new();
    if config.etrade.enabled {
        brokers.push(Box::new(EtradeBroker::new(
            &config.etrade_config(),
            Box::new(TerminalAuthorizer::new(&config.auth)),
        )));
    }
    if config.schwab.enabled {
        brokers.push(Box::new(SchwabBroker::new(
            &config.schwab_config(),
            Box::new(TerminalAuthorizer::new(&config.auth)),
        )));
    }
    Ok(brokers)
}

/// One account's state at fetch time.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account: Account,
    pub balance: Balance,
    pub positions: Vec<Position>,
}

/// Everything fetched from one broker.
#[derive(Debug, Clone)]
pub struct BrokerSnapshot {
    pub broker: String,
    pub accounts: Vec<AccountSnapshot>,
    pub quotes: Vec<Quote>,
}

/// Connect and fetch one broker.
///
/// An account whose balance or positions cannot be read is skipped, so its
/// workbook rows stay as they were. Failed quotes only cost the broker as a
/// dividend source.
pub fn fetch_broker(broker: &mut dyn Broker) -> Result<BrokerSnapshot> {
    let name = broker.name().to_string();
    broker.connect().map_err(|e| Error::broker(&name, e))?;
    let accounts = broker.accounts().map_err(|e| Error::broker(&name, e))?;
    info!("{name}: {} account(s)", accounts.len());

    let mut snapshots = Vec::with_capacity(accounts.len());
    for account in accounts {
        let fetched = broker
            .balance(&account)
            .and_then(|balance| Ok((balance, broker.positions(&account)?)));
        match fetched {
            Ok((balance, positions)) => snapshots.push(AccountSnapshot {
                account,
                balance,
                positions,
            }),
            Err(e) => warn!("{name}: account {} skipped: {e}", account.id),
        }
    }

    let mut symbols: Vec<Symbol> = snapshots
        .iter()
        .flat_map(|s| s.positions.iter().map(|p| p.symbol.clone()))
        .filter(|s| !s.is_option())
        .collect();
    symbols.sort();
    symbols.dedup();

    let quotes = if symbols.is_empty() {
        Vec::new()
    } else {
        broker.quotes(&symbols).unwrap_or_else(|e| {
            warn!("{name}: quotes unavailable: {e}");
            Vec::new()
        })
    };

    Ok(BrokerSnapshot {
        broker: name,
        accounts: snapshots,
        quotes,
    })
}

/// Snapshots of every broker that could be fetched.
#[derive(Debug, Default)]
pub struct Collected {
    pub snapshots: Vec<BrokerSnapshot>,
    pub failures: Vec<(String, Error)>,
}

impl Collected {
    pub fn positions(&self) -> Vec<Position> {
        self.snapshots
            .iter()
            .flat_map(|b| b.accounts.iter())
            .flat_map(|a| a.positions.iter().cloned())
            .collect()
    }

    pub fn quotes(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = Vec::new();
        for quote in self.snapshots.iter().flat_map(|b| b.quotes.iter()) {
            if !quotes.iter().any(|q| q.symbol == quote.symbol) {
                quotes.push(quote.clone());
            }
        }
        quotes
    }

    /// Ids of accounts whose positions were retrieved.
    pub fn fetched_accounts(&self) -> Vec<String> {
        self.snapshots
            .iter()
            .flat_map(|b| b.accounts.iter().map(|a| a.account.id.clone()))
            .collect()
    }

    pub fn account_rows(&self, date: NaiveDate) -> Vec<AccountRow> {
        self.snapshots
            .iter()
            .flat_map(|b| {
                b.accounts.iter().map(move |a| AccountRow {
                    broker: b.broker.clone(),
                    account: a.account.id.clone(),
                    description: a.account.label().to_string(),
                    cash: a.balance.cash,
                    total_value: a.balance.total_value,
                    updated: Some(date),
                })
            })
            .collect()
    }
}

/// Fetch every broker in turn. Failures are logged and collected; the run
/// only fails when no broker could be fetched.
pub fn collect_snapshots(brokers: &mut [Box<dyn Broker>]) -> Result<Collected> {
    let mut collected = Collected::default();
    for broker in brokers.iter_mut() {
        let name = broker.name().to_string();
        match fetch_broker(broker.as_mut()) {
            Ok(snapshot) => collected.snapshots.push(snapshot),
            Err(e) => {
                warn!("{name}: skipped this run: {e}");
                collected.failures.push((name, e));
            }
        }
    }
    if collected.snapshots.is_empty() {
        return Err(Error::NoBrokers);
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use divtrack_broker::mock::MockBroker;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn fetch_collects_accounts_and_quotes() {
        let mut broker = MockBroker::builder("mock")
            .with_account("1001", "Brokerage", 500.0)
            .with_position("1001", sym("O"), 100.0, 52.0, 60.0)
            .with_position("1001", sym("T250117P00025000"), -1.0, 2.5, 1.0)
            .with_quote(sym("O"), 60.0, Some(3.0))
            .build();

        let snapshot = fetch_broker(&mut broker).unwrap();
        assert_eq!(snapshot.broker, "mock");
        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.accounts[0].positions.len(), 2);
        assert_eq!(snapshot.accounts[0].balance.total_value, 500.0 + 6000.0 - 1.0);
        assert_eq!(snapshot.quotes.len(), 1);
    }

    #[test]
    fn failed_broker_is_skipped() {
        let mut brokers: Vec<Box<dyn Broker>> = vec![
            Box::new(MockBroker::builder("down").fail_connect().build()),
            Box::new(
                MockBroker::builder("up")
                    .with_account("2002", "IRA", 0.0)
                    .with_position("2002", sym("MAIN"), 10.0, 40.0, 50.0)
                    .build(),
            ),
        ];
        let collected = collect_snapshots(&mut brokers).unwrap();
        assert_eq!(collected.snapshots.len(), 1);
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].0, "down");
        assert_eq!(collected.fetched_accounts(), vec!["2002".to_string()]);
        assert_eq!(collected.positions().len(), 1);
    }

    #[test]
    fn all_brokers_down() {
        let mut brokers: Vec<Box<dyn Broker>> =
            vec![Box::new(MockBroker::builder("down").fail_connect().build())];
        assert!(matches!(collect_snapshots(&mut brokers), Err(Error::NoBrokers)));
    }

    #[test]
    fn account_rows_carry_broker_and_date() {
        let mut brokers: Vec<Box<dyn Broker>> = vec![Box::new(
            MockBroker::builder("schwab")
                .with_account("3003", "Joint", 100.0)
                .build(),
        )];
        let collected = collect_snapshots(&mut brokers).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let rows = collected.account_rows(date);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].broker, "schwab");
        assert_eq!(rows[0].description, "Joint");
        assert_eq!(rows[0].updated, Some(date));
    }
}
