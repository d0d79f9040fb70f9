//! The dividend ledger: the in-memory form of the Dividends sheet.
//!
//! One row per (symbol, account). Each run applies a snapshot of fresh
//! estimates for a date. Applying the same date twice overwrites that date's
//! history values instead of adding a second column, and a row's beginning
//! yield is written once, the first time a yield is known for it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::dividend::{DividendEstimate, PortfolioTotals, YieldThresholds, YieldTier};
use crate::types::Symbol;

/// One holding's row with its yield history.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerRow {
    pub symbol: Symbol,
    pub account: String,
    pub quantity: f64,
    pub price_paid: f64,
    pub current_price: f64,
    pub market_value: f64,
    /// Annual dividend per share used for the latest estimate.
    pub annual_rate: f64,
    pub beginning_yield: Option<f64>,
    pub annual_dividend: f64,
    pub monthly_dividend: f64,
    /// Rate source label of the latest estimate.
    pub source: String,
    /// Yield percent per snapshot date.
    pub history: BTreeMap<NaiveDate, f64>,
}

impl LedgerRow {
    pub fn new(symbol: Symbol, account: impl Into<String>) -> Self {
        Self {
            symbol,
            account: account.into(),
            quantity: 0.0,
            price_paid: 0.0,
            current_price: 0.0,
            market_value: 0.0,
            annual_rate: 0.0,
            beginning_yield: None,
            annual_dividend: 0.0,
            monthly_dividend: 0.0,
            source: String::new(),
            history: BTreeMap::new(),
        }
    }

    pub fn yield_on(&self, date: NaiveDate) -> Option<f64> {
        self.history.get(&date).copied()
    }

    /// Most recent history entry.
    pub fn latest_yield(&self) -> Option<(NaiveDate, f64)> {
        self.history.iter().next_back().map(|(d, y)| (*d, *y))
    }

    /// A row whose position was sold: kept for its history, no longer held.
    pub fn is_closed(&self) -> bool {
        self.quantity == 0.0 && self.market_value == 0.0
    }

    fn overwrite_from(&mut self, est: &DividendEstimate) {
        self.quantity = est.quantity;
        self.price_paid = est.price_paid;
        self.current_price = est.price;
        self.market_value = est.market_value;
        self.annual_rate = est.annual_per_share;
        self.annual_dividend = est.annual;
        self.monthly_dividend = est.monthly;
        self.source = est.source.to_string();
    }

    fn accumulate(&mut self, est: &DividendEstimate) {
        let quantity = self.quantity + est.quantity;
        if quantity.abs() > f64::EPSILON {
            self.price_paid =
                (self.price_paid * self.quantity + est.price_paid * est.quantity) / quantity;
        }
        self.quantity = quantity;
        self.market_value += est.market_value;
        self.annual_dividend += est.annual;
        self.monthly_dividend += est.monthly;
    }

    fn close(&mut self, date: NaiveDate) {
        self.quantity = 0.0;
        self.market_value = 0.0;
        self.annual_dividend = 0.0;
        self.monthly_dividend = 0.0;
        self.history.remove(&date);
    }
}

/// What applying a snapshot changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotReport {
    /// Rows created by this snapshot.
    pub added: Vec<(Symbol, String)>,
    /// Existing rows refreshed.
    pub updated: usize,
    /// Rows of fetched accounts that no longer hold the symbol.
    pub closed: Vec<(Symbol, String)>,
    /// Rows of accounts not fetched this run, left untouched.
    pub retained: usize,
    /// The snapshot date already had a history column.
    pub replaced_date: bool,
}

/// A holding whose yield moved to a different tier between the two most
/// recent snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct TierChange {
    pub symbol: Symbol,
    pub account: String,
    pub previous: f64,
    pub current: f64,
    pub from: YieldTier,
    pub to: YieldTier,
}

/// Rows plus the ordered set of snapshot dates (newest first).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ledger {
    dates: Vec<NaiveDate>,
    rows: Vec<LedgerRow>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loaded rows. The date list is the union of `dates` and
    /// every date present in a row's history.
    pub fn from_rows(dates: impl IntoIterator<Item = NaiveDate>, rows: Vec<LedgerRow>) -> Self {
        let mut all: Vec<NaiveDate> = dates.into_iter().collect();
        all.extend(rows.iter().flat_map(|r| r.history.keys().copied()));
        all.sort_by(|a, b| b.cmp(a));
        all.dedup();
        Self { dates: all, rows }
    }

    /// Snapshot dates, newest first.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn find(&self, symbol: &Symbol, account: &str) -> Option<&LedgerRow> {
        self.rows
            .iter()
            .find(|r| &r.symbol == symbol && r.account == account)
    }

    /// Apply a run's estimates as the snapshot for `date`.
    ///
    /// `fetched_accounts` lists the accounts whose positions were actually
    /// retrieved; rows of those accounts missing from `estimates` are closed,
    /// rows of other accounts are left as they were.
    pub fn apply_snapshot(
        &mut self,
        date: NaiveDate,
        estimates: &[DividendEstimate],
        fetched_accounts: &[String],
    ) -> SnapshotReport {
        let mut report = SnapshotReport {
            replaced_date: self.dates.contains(&date),
            ..SnapshotReport::default()
        };
        if !report.replaced_date {
            let at = self.dates.partition_point(|d| *d > date);
            self.dates.insert(at, date);
        }

        let mut index: FxHashMap<(Symbol, String), usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.symbol.clone(), r.account.clone()), i))
            .collect();
        let mut touched: FxHashSet<usize> = FxHashSet::default();
        let mut created: FxHashSet<usize> = FxHashSet::default();

        for est in estimates {
            let key = (est.symbol.clone(), est.account.clone());
            let i = match index.get(&key) {
                Some(&i) => i,
                None => {
                    self.rows.push(LedgerRow::new(est.symbol.clone(), est.account.clone()));
                    let i = self.rows.len() - 1;
                    index.insert(key.clone(), i);
                    created.insert(i);
                    report.added.push(key);
                    i
                }
            };

            let row = &mut self.rows[i];
            if touched.insert(i) {
                row.overwrite_from(est);
            } else {
                // same symbol twice in one account (separate lots)
                row.accumulate(est);
            }

            match est.yield_pct {
                Some(y) => {
                    row.history.insert(date, y);
                    if row.beginning_yield.is_none() {
                        row.beginning_yield = Some(y);
                    }
                }
                None => {
                    row.history.remove(&date);
                }
            }
        }

        for (i, row) in self.rows.iter_mut().enumerate() {
            if touched.contains(&i) {
                if !created.contains(&i) {
                    report.updated += 1;
                }
            } else if fetched_accounts.iter().any(|a| *a == row.account) {
                if !row.is_closed() {
                    report.closed.push((row.symbol.clone(), row.account.clone()));
                }
                row.close(date);
            } else {
                report.retained += 1;
            }
        }

        report
    }

    /// Holdings whose tier on `date` differs from the snapshot before it.
    ///
    /// The comparison is against the newest date older than `date`, so a
    /// back-dated run is compared with its own predecessor.
    pub fn tier_changes(&self, date: NaiveDate, thresholds: &YieldThresholds) -> Vec<TierChange> {
        if !self.dates.contains(&date) {
            return Vec::new();
        }
        // dates are kept newest first
        let Some(&previous_date) = self.dates.iter().find(|d| **d < date) else {
            return Vec::new();
        };

        self.rows
            .iter()
            .filter_map(|row| {
                let current = row.yield_on(date)?;
                let previous = row.yield_on(previous_date)?;
                let from = thresholds.tier(Some(previous));
                let to = thresholds.tier(Some(current));
                (from != to).then(|| TierChange {
                    symbol: row.symbol.clone(),
                    account: row.account.clone(),
                    previous,
                    current,
                    from,
                    to,
                })
            })
            .collect()
    }

    /// Totals over open rows.
    pub fn totals(&self) -> PortfolioTotals {
        let mut totals = PortfolioTotals::default();
        for row in self.rows.iter().filter(|r| !r.is_closed()) {
            totals.add(row.market_value, row.annual_dividend);
        }
        totals
    }

    /// Totals over open rows per account, ordered by account.
    pub fn account_totals(&self) -> Vec<(String, PortfolioTotals)> {
        let mut by_account: BTreeMap<String, PortfolioTotals> = BTreeMap::new();
        for row in self.rows.iter().filter(|r| !r.is_closed()) {
            by_account
                .entry(row.account.clone())
                .or_default()
                .add(row.market_value, row.annual_dividend);
        }
        by_account.into_iter().collect()
    }
}
