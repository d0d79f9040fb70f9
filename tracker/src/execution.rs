//! Command implementations: fetch → estimate → write → alert.
//!
//! This is the main workflow that ties together all components.

use std::path::Path;

use chrono::{Local, NaiveDate};
use divtrack::format::{format_money, format_percent, format_us_date};
use divtrack::{
    DividendEstimate, OptionContract, OptionKind, PortfolioTotals, SnapshotReport, Symbol,
    TierChange, YieldThresholds, totals, totals_by_account,
};
use divtrack_broker::etrade::EtradeBroker;
use divtrack_broker::schwab::SchwabBroker;
use divtrack_broker::token::TokenFile;
use divtrack_broker::{Broker, BrokerError};
use log::{info, warn};

use crate::alphavantage::{AlphaVantage, Fundamentals};
use crate::audit::{self, AuditLog};
use crate::auth::TerminalAuthorizer;
use crate::broker::{self, BrokerSnapshot, Collected};
use crate::config::Config;
use crate::dividends::estimate_holdings;
use crate::error::{Error, Result};
use crate::journal;
use crate::telegram::{self, Telegram};
use crate::workbook::{SaveOptions, Workbook, WorkbookLock};

/// Which broker a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BrokerKind {
    Etrade,
    Schwab,
}

/// Options for an update run.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub dry_run: bool,
    pub no_alert: bool,
    /// Snapshot date, normally today.
    pub date: NaiveDate,
}

/// What an update run did.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub estimates: Vec<DividendEstimate>,
    pub report: SnapshotReport,
    pub totals: PortfolioTotals,
    pub accounts: Vec<(String, PortfolioTotals)>,
    pub tier_changes: Vec<TierChange>,
    pub failed_brokers: Vec<String>,
    pub written: bool,
}

/// The update pipeline with its collaborators passed in.
///
/// The workbook is loaded (and locked) before any broker is contacted, so a
/// schema problem stops the run before the interactive login.
pub fn update_workbook(
    config: &Config,
    brokers: &mut [Box<dyn Broker>],
    fundamentals: Option<&mut dyn Fundamentals>,
    opts: &UpdateOptions,
    audit: &mut AuditLog,
) -> Result<UpdateOutcome> {
    let path = config.workbook.path.as_path();
    let _lock = if opts.dry_run {
        None
    } else {
        Some(WorkbookLock::acquire(path)?)
    };
    let mut book = Workbook::load(path)?;

    let collected = broker::collect_snapshots(brokers)?;
    log_collected(audit, &collected)?;

    let overrides = config.overrides()?;
    let estimates = estimate_holdings(
        &collected.positions(),
        &collected.quotes(),
        &overrides,
        fundamentals,
    );
    audit::log_estimates(audit, &estimates)?;

    let report = book
        .ledger
        .apply_snapshot(opts.date, &estimates, &collected.fetched_accounts());
    for (symbol, account) in &report.closed {
        warn!("{symbol} no longer held in account {account}; row kept with its history");
    }
    if report.retained > 0 {
        warn!(
            "{} row(s) of accounts not fetched this run left unchanged",
            report.retained
        );
    }
    book.merge_accounts(collected.account_rows(opts.date));

    let thresholds = config.thresholds();
    let outcome_totals = book.ledger.totals();
    if !opts.dry_run {
        book.save(
            path,
            &SaveOptions {
                thresholds,
                backup: config.workbook.backup,
                generated: opts.date,
            },
        )?;
        audit::log_workbook_written(audit, opts.date, &report, &outcome_totals)?;
    }

    Ok(UpdateOutcome {
        estimates,
        tier_changes: book.ledger.tier_changes(opts.date, &thresholds),
        accounts: book.ledger.account_totals(),
        totals: outcome_totals,
        report,
        failed_brokers: collected.failures.iter().map(|(name, _)| name.clone()).collect(),
        written: !opts.dry_run,
    })
}

fn log_collected(audit: &mut AuditLog, collected: &Collected) -> Result<()> {
    for (name, err) in &collected.failures {
        audit::log_session(audit, name, Some(&err.to_string()))?;
    }
    for snapshot in &collected.snapshots {
        audit::log_session(audit, &snapshot.broker, None)?;
        for account in &snapshot.accounts {
            audit::log_positions(
                audit,
                &snapshot.broker,
                &account.account.id,
                account.positions.len(),
                account.balance.total_value,
            )?;
        }
    }
    Ok(())
}

fn fundamentals(config: &Config) -> Option<AlphaVantage> {
    let key = config.dividends.alphavantage_api_key.trim();
    if key.is_empty() {
        info!("no Alpha Vantage key configured, using overrides and broker quotes only");
        None
    } else {
        Some(AlphaVantage::new(key))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Full update: fetch every broker, refresh the workbook, send the alert.
pub fn run_update(config: &Config, dry_run: bool, no_alert: bool) -> Result<()> {
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(&mut audit, "update", &config.workbook.path, dry_run)?;

    let mut brokers = broker::build_brokers(config)?;
    let mut av = fundamentals(config);
    let opts = UpdateOptions {
        dry_run,
        no_alert,
        date: today(),
    };
    let outcome = update_workbook(
        config,
        &mut brokers,
        av.as_mut().map(|a| a as &mut dyn Fundamentals),
        &opts,
        &mut audit,
    )?;
    for broker in &mut brokers {
        let _ = broker.disconnect();
    }

    display_estimates(&outcome.estimates, &config.thresholds());
    display_totals(&outcome.totals, &outcome.accounts);
    display_report(&outcome.report);
    if !outcome.failed_brokers.is_empty() {
        println!("\nSkipped broker(s): {}", outcome.failed_brokers.join(", "));
    }
    for change in &outcome.tier_changes {
        println!(
            "Tier change: {} ({}) {} -> {} ({})",
            change.symbol,
            change.account,
            change.from,
            change.to,
            format_percent(change.current)
        );
    }

    if outcome.written {
        println!("\nWorkbook written to {}", config.workbook.path.display());
    } else {
        println!("\n[DRY RUN] Workbook not written.");
    }

    if config.alerts.enabled && !opts.no_alert && !opts.dry_run {
        let text = telegram::compose_update_message(
            opts.date,
            &outcome.totals,
            &outcome.accounts,
            &outcome.tier_changes,
        );
        match Telegram::new(&config.alerts).send(&text) {
            Ok(()) => audit::log_alert(&mut audit, true, None)?,
            Err(e) => {
                warn!("alert not sent: {e}");
                audit::log_alert(&mut audit, false, Some(&e.to_string()))?;
            }
        }
    }

    audit::log_run_completed(
        &mut audit,
        brokers.len(),
        outcome.failed_brokers.len(),
    )?;
    Ok(())
}

/// Print every broker's accounts and positions.
pub fn show_positions(config: &Config) -> Result<()> {
    let mut brokers = broker::build_brokers(config)?;
    let collected = broker::collect_snapshots(&mut brokers)?;
    for snapshot in &collected.snapshots {
        display_broker(snapshot);
    }
    Ok(())
}

/// Establish each broker session and list its accounts.
pub fn check_status(config: &Config) -> Result<()> {
    let mut brokers = broker::build_brokers(config)?;
    let mut connected = 0;
    for broker in &mut brokers {
        let name = broker.name().to_string();
        print!("{name}: ");
        match broker.connect().and_then(|_| broker.accounts()) {
            Ok(accounts) => {
                println!("OK, {} account(s)", accounts.len());
                for account in &accounts {
                    println!("  {:12} {:24} {}", account.id, account.label(), account.kind);
                }
                connected += 1;
            }
            Err(e) => println!("FAILED: {e}"),
        }
    }
    if connected == 0 {
        return Err(Error::NoBrokers);
    }
    Ok(())
}

/// Print dividend estimates without touching the workbook.
pub fn show_dividends(config: &Config) -> Result<()> {
    let mut brokers = broker::build_brokers(config)?;
    let collected = broker::collect_snapshots(&mut brokers)?;
    let mut av = fundamentals(config);
    let estimates = estimate_holdings(
        &collected.positions(),
        &collected.quotes(),
        &config.overrides()?,
        av.as_mut().map(|a| a as &mut dyn Fundamentals),
    );
    display_estimates(&estimates, &config.thresholds());
    display_totals(&totals(&estimates), &totals_by_account(&estimates));
    Ok(())
}

/// Append journal trades to the Trades sheet.
pub fn import_trades(config: &Config, journal_path: &Path) -> Result<()> {
    let trades = journal::load_journal(journal_path)?;
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(&mut audit, "trades import", &config.workbook.path, false)?;

    let (appended, skipped) = import_into(config, trades)?;
    audit::log_trades_imported(&mut audit, appended, skipped)?;
    println!("{appended} trade(s) added, {skipped} duplicate(s) skipped.");
    Ok(())
}

/// Lock, load, append and save. Returns (appended, duplicates).
pub fn import_into(config: &Config, trades: Vec<divtrack::Trade>) -> Result<(usize, usize)> {
    let path = config.workbook.path.as_path();
    let _lock = WorkbookLock::acquire(path)?;
    let mut book = Workbook::load(path)?;
    let (appended, skipped) = book.append_trades(trades);
    if appended > 0 {
        book.save(
            path,
            &SaveOptions {
                thresholds: config.thresholds(),
                backup: config.workbook.backup,
                generated: today(),
            },
        )?;
    }
    Ok((appended, skipped))
}

/// List option expiries, or the chain for one expiry (E*TRADE only).
pub fn show_options(config: &Config, symbol: &str, expiry: Option<NaiveDate>) -> Result<()> {
    config.validate_brokers()?;
    if !config.etrade.enabled {
        return Err(Error::Config("option chains need [etrade] enabled".into()));
    }
    let symbol = Symbol::new(symbol).map_err(|e| Error::Argument(e.to_string()))?;
    let mut etrade = EtradeBroker::new(
        &config.etrade_config(),
        Box::new(TerminalAuthorizer::new(&config.auth)),
    );
    let wrap = |e: BrokerError| Error::broker("etrade", e);
    etrade.connect().map_err(wrap)?;

    match expiry {
        None => {
            let dates = etrade.option_expiry_dates(&symbol).map_err(wrap)?;
            if dates.is_empty() {
                println!("No option expiries for {symbol}.");
            }
            for date in dates {
                println!("{date}  ({} days)", (date - today()).num_days());
            }
        }
        Some(expiry) => {
            let chain = etrade.option_chain(&symbol, expiry).map_err(wrap)?;
            display_chain(&symbol, expiry, &chain, today());
        }
    }
    Ok(())
}

/// Delete cached tokens and run the authorization flow again.
pub fn reauth(config: &Config, which: Option<BrokerKind>) -> Result<()> {
    config.validate_brokers()?;
    let targets: Vec<BrokerKind> = match which {
        Some(kind) => vec![kind],
        None => [
            (config.etrade.enabled, BrokerKind::Etrade),
            (config.schwab.enabled, BrokerKind::Schwab),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
        .collect(),
    };

    for kind in targets {
        let (name, token_path, mut broker) = match kind {
            BrokerKind::Etrade => {
                let cfg = config.etrade_config();
                let broker: Box<dyn Broker> = Box::new(EtradeBroker::new(
                    &cfg,
                    Box::new(TerminalAuthorizer::new(&config.auth)),
                ));
                ("etrade", cfg.token_path, broker)
            }
            BrokerKind::Schwab => {
                let cfg = config.schwab_config();
                let broker: Box<dyn Broker> = Box::new(SchwabBroker::new(
                    &cfg,
                    Box::new(TerminalAuthorizer::new(&config.auth)),
                ));
                ("schwab", cfg.token_path, broker)
            }
        };
        TokenFile::new(&token_path)
            .delete()
            .map_err(|e| Error::broker(name, e))?;
        info!("{name}: cached token removed");
        broker.connect().map_err(|e| Error::broker(name, e))?;
        println!("{name}: authorized, token saved to {}", token_path.display());
    }
    Ok(())
}

/// Send a one-off Telegram message.
pub fn send_alert(config: &Config, message: &str) -> Result<()> {
    if config.alerts.telegram_bot_token.is_empty() || config.alerts.telegram_chat_id.is_empty() {
        return Err(Error::Config(
            "telegram_bot_token and telegram_chat_id are required to send alerts".into(),
        ));
    }
    Telegram::new(&config.alerts).send(message)?;
    println!("Alert sent.");
    Ok(())
}

// === Display ===

fn display_broker(snapshot: &BrokerSnapshot) {
    for account in &snapshot.accounts {
        println!(
            "\n{} {} ({}): cash {}, total {}",
            snapshot.broker,
            account.account.id,
            account.account.label(),
            format_money(account.balance.cash),
            format_money(account.balance.total_value),
        );
        if account.positions.is_empty() {
            println!("  No positions.");
            continue;
        }
        for p in &account.positions {
            println!(
                "  {:22} {:>10} @ {:>10} paid {:>10} = {:>12}",
                p.symbol,
                p.quantity,
                format_money(p.current_price),
                format_money(p.price_paid),
                format_money(p.market_value),
            );
        }
    }
}

pub fn display_estimates(estimates: &[DividendEstimate], thresholds: &YieldThresholds) {
    if estimates.is_empty() {
        println!("No holdings.");
        return;
    }
    println!(
        "\n  {:22} {:10} {:>10} {:>10} {:>9} {:>12} {:>10}  {}",
        "Symbol", "Account", "Quantity", "Price", "Yield", "Annual", "Monthly", "Source"
    );
    for e in estimates {
        let yield_text = e.yield_pct.map(format_percent).unwrap_or_else(|| "-".into());
        println!(
            "  {:22} {:10} {:>10} {:>10} {:>9} {:>12} {:>10}  {} ({})",
            e.symbol,
            e.account,
            e.quantity,
            format_money(e.price),
            yield_text,
            format_money(e.annual),
            format_money(e.monthly),
            e.source,
            thresholds.tier(e.yield_pct),
        );
    }
}

fn display_totals(totals: &PortfolioTotals, accounts: &[(String, PortfolioTotals)]) {
    println!();
    for (account, t) in accounts {
        println!(
            "  {:10} {:>3} holdings  value {:>14}  annual {:>12}  monthly {:>10}",
            account,
            t.holdings,
            format_money(t.market_value),
            format_money(t.annual),
            format_money(t.monthly),
        );
    }
    println!(
        "  {:10} {:>3} holdings  value {:>14}  annual {:>12}  monthly {:>10}  yield {}",
        "TOTAL",
        totals.holdings,
        format_money(totals.market_value),
        format_money(totals.annual),
        format_money(totals.monthly),
        totals.yield_pct().map(format_percent).unwrap_or_else(|| "-".into()),
    );
}

fn display_report(report: &SnapshotReport) {
    println!(
        "\n{} added, {} updated, {} closed, {} untouched{}",
        report.added.len(),
        report.updated,
        report.closed.len(),
        report.retained,
        if report.replaced_date {
            " (today's column overwritten)"
        } else {
            ""
        }
    );
}

fn display_chain(symbol: &Symbol, expiry: NaiveDate, chain: &[OptionContract], today: NaiveDate) {
    println!(
        "{symbol} options expiring {} ({} days)",
        format_us_date(expiry),
        (expiry - today).num_days()
    );
    for kind in [OptionKind::Put, OptionKind::Call] {
        println!("\n{kind}S");
        println!(
            "  {:>9} {:>8} {:>8} {:>8} {:>8} {:>9} {:>10}",
            "Strike", "Bid", "Ask", "Last", "OI", "Premium", "Annualized"
        );
        for c in chain.iter().filter(|c| c.kind == kind) {
            println!(
                "  {:>9.2} {:>8.2} {:>8.2} {:>8.2} {:>8} {:>9} {:>10}",
                c.strike,
                c.bid,
                c.ask,
                c.last,
                c.open_interest,
                c.premium_yield_pct().map(format_percent).unwrap_or_else(|| "-".into()),
                c.annualized_yield_pct(today)
                    .map(format_percent)
                    .unwrap_or_else(|| "-".into()),
            );
        }
    }
}
