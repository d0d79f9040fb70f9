//! JSONL audit trail.
//!
//! Each tracker run appends events to an audit.jsonl file, one JSON object
//! per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use divtrack::{DividendEstimate, PortfolioTotals, SnapshotReport};
use serde::Serialize;

use crate::error::Result;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

pub fn log_run_started(
    audit: &mut AuditLog,
    command: &str,
    workbook: &Path,
    dry_run: bool,
) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "command": command,
            "workbook": workbook.display().to_string(),
            "dry_run": dry_run,
        }),
    )
}

/// A broker session was (or was not) established.
pub fn log_session(audit: &mut AuditLog, broker: &str, error: Option<&str>) -> Result<()> {
    audit.log(
        "broker_session",
        serde_json::json!({
            "broker": broker,
            "ok": error.is_none(),
            "error": error,
        }),
    )
}

pub fn log_positions(
    audit: &mut AuditLog,
    broker: &str,
    account: &str,
    positions: usize,
    total_value: f64,
) -> Result<()> {
    audit.log(
        "positions_fetched",
        serde_json::json!({
            "broker": broker,
            "account": account,
            "positions": positions,
            "total_value": total_value,
        }),
    )
}

/// Log the dividend estimates and where each rate came from.
pub fn log_estimates(audit: &mut AuditLog, estimates: &[DividendEstimate]) -> Result<()> {
    let rows: Vec<_> = estimates
        .iter()
        .map(|e| {
            serde_json::json!({
                "symbol": e.symbol.as_str(),
                "account": e.account,
                "annual_per_share": e.annual_per_share,
                "yield_pct": e.yield_pct,
                "annual": e.annual,
                "source": e.source.to_string(),
            })
        })
        .collect();

    audit.log("dividends_estimated", serde_json::json!({ "estimates": rows }))
}

pub fn log_workbook_written(
    audit: &mut AuditLog,
    date: NaiveDate,
    report: &SnapshotReport,
    totals: &PortfolioTotals,
) -> Result<()> {
    audit.log(
        "workbook_written",
        serde_json::json!({
            "date": date.to_string(),
            "added": report.added.len(),
            "updated": report.updated,
            "closed": report.closed.len(),
            "retained": report.retained,
            "replaced_date": report.replaced_date,
            "market_value": totals.market_value,
            "annual": totals.annual,
        }),
    )
}

pub fn log_trades_imported(audit: &mut AuditLog, appended: usize, skipped: usize) -> Result<()> {
    audit.log(
        "trades_imported",
        serde_json::json!({
            "appended": appended,
            "duplicates_skipped": skipped,
        }),
    )
}

pub fn log_alert(audit: &mut AuditLog, sent: bool, error: Option<&str>) -> Result<()> {
    audit.log(
        "alert",
        serde_json::json!({
            "sent": sent,
            "error": error,
        }),
    )
}

pub fn log_run_completed(audit: &mut AuditLog, brokers: usize, failed: usize) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "brokers": brokers,
            "failed_brokers": failed,
        }),
    )
}
