//! Integration tests for the update pipeline and workbook persistence.

use std::path::{Path, PathBuf};

use calamine::{Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use divtrack::{Symbol, Trade, TradeKind};
use divtrack_broker::Broker;
use divtrack_broker::mock::MockBroker;
use divtrack_tracker::alphavantage::{Fundamentals, Overview};
use divtrack_tracker::audit::AuditLog;
use divtrack_tracker::config::Config;
use divtrack_tracker::error::Error;
use divtrack_tracker::execution::{UpdateOptions, UpdateOutcome, import_into, update_workbook};
use divtrack_tracker::workbook::{
    AccountRow, SaveOptions, Workbook, WorkbookLock, backup_path, lock_path,
};

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Overview data for MAIN only.
struct FakeFundamentals;

impl Fundamentals for FakeFundamentals {
    fn overview(&mut self, symbol: &Symbol) -> Option<Overview> {
        (symbol.as_str() == "MAIN").then(|| Overview {
            dividend_per_share: Some(4.0),
            ..Overview::default()
        })
    }

    fn annual_dividend_payout(&mut self, _symbol: &Symbol) -> Option<f64> {
        None
    }
}

struct Env {
    _dir: tempfile::TempDir,
    config: Config,
    audit: AuditLog,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.workbook.path = dir.path().join("dividends.xlsx");
        config.logging.dir = dir.path().join("logs").display().to_string();
        let audit = AuditLog::open(&config.audit_path()).unwrap();
        Self {
            _dir: dir,
            config,
            audit,
        }
    }

    fn path(&self) -> PathBuf {
        self.config.workbook.path.clone()
    }

    fn update(&mut self, brokers: Vec<Box<dyn Broker>>, on: NaiveDate) -> Result<UpdateOutcome, Error> {
        self.run(brokers, on, false)
    }

    fn run(
        &mut self,
        mut brokers: Vec<Box<dyn Broker>>,
        on: NaiveDate,
        dry_run: bool,
    ) -> Result<UpdateOutcome, Error> {
        let mut fundamentals = FakeFundamentals;
        let opts = UpdateOptions {
            dry_run,
            no_alert: true,
            date: on,
        };
        update_workbook(
            &self.config,
            &mut brokers,
            Some(&mut fundamentals),
            &opts,
            &mut self.audit,
        )
    }
}

fn etrade(o_price: f64, with_main: bool) -> Box<dyn Broker> {
    let mut builder = MockBroker::builder("etrade")
        .with_account("1001", "Brokerage", 1_000.0)
        .with_position("1001", sym("O"), 100.0, 52.0, o_price)
        .with_quote(sym("O"), o_price, Some(3.0));
    if with_main {
        builder = builder.with_position("1001", sym("MAIN"), 50.0, 40.0, 50.0);
    }
    Box::new(builder.build())
}

fn schwab(up: bool) -> Box<dyn Broker> {
    let builder = MockBroker::builder("schwab")
        .with_account("2002", "IRA", 0.0)
        .with_position("2002", sym("PFE"), 200.0, 30.0, 25.0)
        .with_quote(sym("PFE"), 25.0, Some(1.68));
    if up {
        Box::new(builder.build())
    } else {
        Box::new(builder.fail_connect().build())
    }
}

// ============================================================================
// First run
// ============================================================================

#[test]
fn first_run_creates_workbook() {
    let mut env = Env::new();
    let d1 = date(2025, 1, 5);

    let outcome = env.update(vec![etrade(60.0, true)], d1).unwrap();
    assert!(outcome.written);
    assert_eq!(outcome.report.added.len(), 2);
    assert!(approx(outcome.totals.annual, 300.0 + 200.0));

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.ledger.dates(), &[d1]);

    let o = book.ledger.find(&sym("O"), "1001").unwrap();
    assert!(approx(o.quantity, 100.0));
    assert!(approx(o.annual_dividend, 300.0));
    assert!(approx(o.beginning_yield.unwrap(), 5.0));
    assert!(approx(o.yield_on(d1).unwrap(), 5.0));
    assert_eq!(o.source, "broker");

    let main = book.ledger.find(&sym("MAIN"), "1001").unwrap();
    assert!(approx(main.yield_on(d1).unwrap(), 8.0));
    assert_eq!(main.source, "overview");

    assert_eq!(book.accounts.len(), 1);
    assert_eq!(book.accounts[0].broker, "etrade");
    assert!(approx(book.accounts[0].total_value, 1_000.0 + 6_000.0 + 2_500.0));
    assert_eq!(book.accounts[0].updated, Some(d1));

    assert!(!lock_path(&env.path()).exists());
}

// ============================================================================
// Re-runs and history
// ============================================================================

#[test]
fn same_day_rerun_overwrites_history_column() {
    let mut env = Env::new();
    let d1 = date(2025, 1, 5);

    env.update(vec![etrade(60.0, true)], d1).unwrap();
    let outcome = env.update(vec![etrade(50.0, true)], d1).unwrap();
    assert!(outcome.report.replaced_date);
    assert_eq!(outcome.report.updated, 2);

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.ledger.dates().len(), 1);
    let o = book.ledger.find(&sym("O"), "1001").unwrap();
    assert!(approx(o.yield_on(d1).unwrap(), 6.0));
    assert!(approx(o.beginning_yield.unwrap(), 5.0));
}

#[test]
fn new_day_adds_newest_history_column() {
    let mut env = Env::new();
    let (d1, d2) = (date(2025, 1, 5), date(2025, 1, 12));

    env.update(vec![etrade(60.0, true)], d1).unwrap();
    env.update(vec![etrade(50.0, true)], d2).unwrap();

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.ledger.dates(), &[d2, d1]);
    let o = book.ledger.find(&sym("O"), "1001").unwrap();
    assert!(approx(o.yield_on(d1).unwrap(), 5.0));
    assert!(approx(o.yield_on(d2).unwrap(), 6.0));
    assert!(approx(o.beginning_yield.unwrap(), 5.0));
    assert!(backup_path(&env.path()).exists());
}

#[test]
fn sold_position_is_closed_but_kept() {
    let mut env = Env::new();
    let (d1, d2) = (date(2025, 1, 5), date(2025, 1, 12));

    env.update(vec![etrade(60.0, true)], d1).unwrap();
    let outcome = env.update(vec![etrade(60.0, false)], d2).unwrap();
    assert_eq!(outcome.report.closed, vec![(sym("MAIN"), "1001".to_string())]);

    let book = Workbook::load(&env.path()).unwrap();
    let main = book.ledger.find(&sym("MAIN"), "1001").unwrap();
    assert!(main.is_closed());
    assert_eq!(main.yield_on(d2), None);
    assert!(approx(main.yield_on(d1).unwrap(), 8.0));
    assert!(approx(book.ledger.totals().annual, 300.0));
}

#[test]
fn tier_changes_between_snapshots() {
    let mut env = Env::new();
    let (d1, d2) = (date(2025, 1, 5), date(2025, 1, 12));

    env.update(vec![etrade(60.0, false)], d1).unwrap();
    // 3.00 / 30.00 = 10% moves O from low to moderate
    let outcome = env.update(vec![etrade(30.0, false)], d2).unwrap();
    assert_eq!(outcome.tier_changes.len(), 1);
    assert_eq!(outcome.tier_changes[0].symbol, sym("O"));
}

// ============================================================================
// Broker failures
// ============================================================================

#[test]
fn failed_broker_rows_left_untouched() {
    let mut env = Env::new();
    let (d1, d2) = (date(2025, 1, 5), date(2025, 1, 12));

    env.update(vec![etrade(60.0, true), schwab(true)], d1).unwrap();
    let outcome = env
        .update(vec![etrade(60.0, true), schwab(false)], d2)
        .unwrap();
    assert_eq!(outcome.failed_brokers, vec!["schwab".to_string()]);
    assert_eq!(outcome.report.retained, 1);
    assert!(outcome.report.closed.is_empty());

    let book = Workbook::load(&env.path()).unwrap();
    let pfe = book.ledger.find(&sym("PFE"), "2002").unwrap();
    assert!(approx(pfe.quantity, 200.0));
    assert!(pfe.yield_on(d1).is_some());
    assert_eq!(pfe.yield_on(d2), None);
    assert_eq!(book.accounts.len(), 2);
}

#[test]
fn no_broker_fails_without_writing() {
    let mut env = Env::new();
    let err = env.update(vec![schwab(false)], date(2025, 1, 5)).unwrap_err();
    assert!(matches!(err, Error::NoBrokers));
    assert!(!env.path().exists());
    assert!(!lock_path(&env.path()).exists());
}

// ============================================================================
// Locking and dry runs
// ============================================================================

#[test]
fn locked_workbook_is_refused() {
    let mut env = Env::new();
    let _held = WorkbookLock::acquire(&env.path()).unwrap();
    let err = env.update(vec![etrade(60.0, true)], date(2025, 1, 5)).unwrap_err();
    assert!(matches!(err, Error::Locked(_)));
    assert!(err.is_workbook_error());
}

#[test]
fn dry_run_writes_nothing() {
    let mut env = Env::new();
    let outcome = env.run(vec![etrade(60.0, true)], date(2025, 1, 5), true).unwrap();
    assert!(!outcome.written);
    assert_eq!(outcome.estimates.len(), 2);
    assert!(!env.path().exists());
}

// ============================================================================
// Schema handling
// ============================================================================

fn write_sheet(path: &Path, name: &str, rows: &[Vec<&str>]) {
    write_book(path, &[(name, rows)]);
}

/// Numeric-looking cells are written as numbers, everything else as text.
fn write_book(path: &Path, sheets: &[(&str, &[Vec<&str>])]) {
    let mut book = rust_xlsxwriter::Workbook::new();
    for (name, rows) in sheets {
        let ws = book.add_worksheet();
        ws.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                match cell.parse::<f64>() {
                    Ok(n) => ws.write_number(r as u32, c as u16, n).unwrap(),
                    Err(_) => ws.write_string(r as u32, c as u16, *cell).unwrap(),
                };
            }
        }
    }
    book.save(path).unwrap();
}

/// Every cell of a sheet as display text, header row first.
fn read_sheet(path: &Path, name: &str) -> Vec<Vec<String>> {
    let mut xlsx: Xlsx<_> = open_workbook(path).unwrap();
    let range = xlsx.worksheet_range(name).unwrap();
    range
        .rows()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// Values below `header`, one per data row.
fn column(sheet: &[Vec<String>], header: &str) -> Vec<String> {
    let i = sheet[0]
        .iter()
        .position(|h| h == header)
        .unwrap_or_else(|| panic!("no column {header:?} in {:?}", sheet[0]));
    sheet[1..]
        .iter()
        .map(|row| row.get(i).cloned().unwrap_or_default())
        .collect()
}

#[test]
fn reordered_columns_are_resolved_by_header() {
    let env = Env::new();
    write_sheet(
        &env.path(),
        "Dividends",
        &[
            vec!["Account", "Notes", "beginning  yield", "TICKER", "Yield 2025-01-05", "Quantity", "Yield 2025-01-12"],
            vec!["1001", "core", "5", "O", "5", "100", "6"],
            vec!["1001", "", "", "", "", "7", ""],
        ],
    );

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.ledger.dates(), &[date(2025, 1, 12), date(2025, 1, 5)]);
    assert_eq!(book.ledger.rows().len(), 1);
    let o = book.ledger.find(&sym("O"), "1001").unwrap();
    assert!(approx(o.quantity, 100.0));
    assert!(approx(o.beginning_yield.unwrap(), 5.0));
    assert!(approx(o.yield_on(date(2025, 1, 12)).unwrap(), 6.0));
}

#[test]
fn unreadable_rows_and_unknown_columns_survive_an_update() {
    let mut env = Env::new();
    let dividends: &[Vec<&str>] = &[
        vec!["Ticker", "Account", "Quantity", "Beginning Yield", "Notes", "Yield 2025-01-05"],
        vec!["O", "1001", "100", "5", "monthly payer", "5"],
        vec!["MAIN", "1001", "1OO", "8", "typo", "8"],
    ];
    let accounts: &[Vec<&str>] = &[
        vec!["Broker", "Account", "Cash", "Total Value", "Owner"],
        vec!["etrade", "1001", "5", "5", "joint"],
    ];
    let trades: &[Vec<&str>] = &[
        vec!["Date", "Ticker", "Type", "Shares", "Cost", "Memo"],
        vec!["1/5/2025", "T", "Sold Put", "-1", "2.5", "rolled"],
        vec!["someday", "O", "Bought Stock", "1", "1", ""],
    ];
    write_book(
        &env.path(),
        &[("Dividends", dividends), ("Accounts", accounts), ("Trades", trades)],
    );

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.ledger.rows().len(), 1);
    assert_eq!(book.trades.len(), 1);
    assert_eq!(book.unreadable_rows(), 2);

    env.update(vec![etrade(60.0, false)], date(2025, 1, 6)).unwrap();

    let dividends = read_sheet(&env.path(), "Dividends");
    assert_eq!(column(&dividends, "Ticker"), ["O", "MAIN"]);
    assert_eq!(column(&dividends, "Quantity"), ["100", "1OO"]);
    assert_eq!(column(&dividends, "Notes"), ["monthly payer", "typo"]);
    assert_eq!(column(&dividends, "Yield 2025-01-05"), ["5", "8"]);
    assert_eq!(column(&dividends, "Yield 2025-01-06"), ["5", ""]);

    let accounts = read_sheet(&env.path(), "Accounts");
    assert_eq!(column(&accounts, "Owner"), ["joint"]);
    assert_eq!(column(&accounts, "Cash"), ["1000"]);

    let trades = read_sheet(&env.path(), "Trades");
    assert_eq!(column(&trades, "Date"), ["1/5/2025", "someday"]);
    assert_eq!(column(&trades, "Memo"), ["rolled", ""]);

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.unreadable_rows(), 2);
    assert!(approx(book.ledger.find(&sym("O"), "1001").unwrap().yield_on(date(2025, 1, 6)).unwrap(), 5.0));
}

#[test]
fn duplicate_rows_are_written_back() {
    let env = Env::new();
    write_sheet(
        &env.path(),
        "Accounts",
        &[
            vec!["Broker", "Account", "Cash", "Total Value"],
            vec!["etrade", "1001", "5", "5"],
            vec!["etrade", "1001", "7", "7"],
        ],
    );
    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.accounts.len(), 1);
    assert_eq!(book.unreadable_rows(), 1);

    book.save(
        &env.path(),
        &SaveOptions {
            thresholds: env.config.thresholds(),
            backup: true,
            generated: date(2025, 1, 5),
        },
    )
    .unwrap();
    let accounts = read_sheet(&env.path(), "Accounts");
    assert_eq!(column(&accounts, "Cash"), ["5", "7"]);
}

#[test]
fn summary_includes_cash_only_accounts() {
    let env = Env::new();
    let mut book = Workbook::default();
    book.merge_accounts(vec![AccountRow {
        broker: "schwab".into(),
        account: "3003".into(),
        description: "Cash".into(),
        cash: 1_000.0,
        total_value: 1_000.0,
        updated: Some(date(2025, 1, 5)),
    }]);
    book.save(
        &env.path(),
        &SaveOptions {
            thresholds: env.config.thresholds(),
            backup: false,
            generated: date(2025, 1, 5),
        },
    )
    .unwrap();

    let summary = read_sheet(&env.path(), "Summary");
    assert_eq!(&summary[1][..2], ["3003", "0"]);
    assert_eq!(&column(&summary, "Cash")[..2], ["1000", "1000"]);
    assert_eq!(summary[2][0], "Total");
    assert_eq!(summary[2][7], "1000");
}

#[test]
fn missing_required_column_aborts_before_writing() {
    let mut env = Env::new();
    write_sheet(
        &env.path(),
        "Dividends",
        &[vec!["Ticker", "Account", "Quantity"], vec!["O", "1001", "100"]],
    );
    let before = std::fs::read(env.path()).unwrap();

    assert!(matches!(Workbook::load(&env.path()), Err(Error::Schema(_))));
    let err = env.update(vec![etrade(60.0, true)], date(2025, 1, 5)).unwrap_err();
    assert!(err.is_workbook_error());
    assert_eq!(std::fs::read(env.path()).unwrap(), before);
    assert!(!lock_path(&env.path()).exists());
}

#[test]
fn duplicate_column_is_a_schema_error() {
    let env = Env::new();
    write_sheet(
        &env.path(),
        "Accounts",
        &[vec!["Broker", "Account", "Cash", "Cash", "Total Value"]],
    );
    assert!(matches!(Workbook::load(&env.path()), Err(Error::Schema(_))));
}

// ============================================================================
// Trades
// ============================================================================

fn trades() -> Vec<Trade> {
    vec![
        Trade {
            date: date(2025, 1, 5),
            symbol: sym("T"),
            kind: TradeKind::SoldPut,
            shares: -1.0,
            cost: 2.5,
            strike: Some(25.0),
        },
        Trade {
            date: date(2025, 1, 6),
            symbol: sym("O"),
            kind: TradeKind::BoughtStock,
            shares: 100.0,
            cost: 50.0,
            strike: None,
        },
    ]
}

#[test]
fn trade_import_skips_duplicates() {
    let env = Env::new();
    assert_eq!(import_into(&env.config, trades()).unwrap(), (2, 0));
    assert_eq!(import_into(&env.config, trades()).unwrap(), (0, 2));

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.trades, trades());
    assert_eq!(book.trades[0].formatted().put_cash_req, "$25.00");
}

#[test]
fn trades_survive_an_update() {
    let mut env = Env::new();
    import_into(&env.config, trades()).unwrap();
    env.update(vec![etrade(60.0, true)], date(2025, 1, 7)).unwrap();

    let book = Workbook::load(&env.path()).unwrap();
    assert_eq!(book.trades.len(), 2);
    assert_eq!(book.ledger.rows().len(), 2);
}
