//! The Excel workbook: persistent store and report in one file.
//!
//! Sheets are read with `calamine` and located by header text through the
//! schemas in [`divtrack::schema`], so columns may be reordered by hand
//! between runs. Every save regenerates the whole file with
//! `rust_xlsxwriter`: the previous file is copied to `<stem>.backup.xlsx`,
//! the new one is written to a temporary path and renamed into place.
//!
//! Cells the typed model does not understand survive a save: unknown columns
//! are written back after the known ones, and rows that cannot be read are
//! written back whole below the readable rows.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::hash::Hash;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use divtrack::format::{date_from_excel_serial, format_us_date, parse_amount, parse_date};
use divtrack::schema::{self, ColumnMap, SheetSchema, accounts, dividends, summary, trades};
use divtrack::{
    Ledger, LedgerRow, PortfolioTotals, Symbol, Trade, TradeKind, YieldThresholds, YieldTier,
};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use rust_xlsxwriter::{Color, Format, Worksheet, XlsxError};

use crate::error::{Error, Result};

const GREEN: u32 = 0xC6EFCE;
const YELLOW: u32 = 0xFFEB9C;
const RED: u32 = 0xFFC7CE;

/// A row of the Accounts sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub broker: String,
    pub account: String,
    pub description: String,
    pub cash: f64,
    pub total_value: f64,
    /// Date of the run that last refreshed the row.
    pub updated: Option<NaiveDate>,
}

/// A cell copied through a save without interpretation.
#[derive(Debug, Clone, PartialEq)]
enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date.
    Date(f64),
}

impl From<&Data> for RawCell {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => RawCell::Empty,
            Data::String(s) => RawCell::Text(s.clone()),
            Data::Float(v) => RawCell::Number(*v),
            Data::Int(v) => RawCell::Number(*v as f64),
            Data::Bool(v) => RawCell::Bool(*v),
            Data::DateTime(dt) => RawCell::Date(dt.as_f64()),
            other => RawCell::Text(other.to_string()),
        }
    }
}

/// A row that could not be read, by column.
#[derive(Debug, Clone)]
struct RawRow {
    fixed: FxHashMap<&'static str, RawCell>,
    history: BTreeMap<NaiveDate, RawCell>,
    /// Aligned with [`Passthrough::headers`].
    extra: Vec<RawCell>,
}

/// The part of one sheet that lives outside the typed model.
#[derive(Debug, Clone)]
struct Passthrough<K> {
    /// Unknown column headers, in sheet order.
    headers: Vec<String>,
    /// Unknown-column cells of readable rows, by row key.
    extra: FxHashMap<K, Vec<RawCell>>,
    unreadable: Vec<RawRow>,
}

impl<K> Default for Passthrough<K> {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            extra: FxHashMap::default(),
            unreadable: Vec::new(),
        }
    }
}

impl<K: Eq + Hash> Passthrough<K> {
    fn new(map: &ColumnMap) -> Self {
        Self {
            headers: map.ignored().iter().map(|(h, _)| h.clone()).collect(),
            ..Self::default()
        }
    }

    /// Remember the unknown-column cells of a readable row.
    fn keep(&mut self, key: K, map: &ColumnMap, row: &[Data]) {
        let cells = extra_cells(map, row);
        if cells.iter().any(|c| *c != RawCell::Empty) {
            self.extra.insert(key, cells);
        }
    }

    fn keep_unreadable(&mut self, schema: &SheetSchema, map: &ColumnMap, row: &[Data]) {
        self.unreadable.push(RawRow {
            fixed: schema
                .columns
                .iter()
                .filter_map(|c| Some((c.header, raw(row.get(map.index(*c)?)))))
                .collect(),
            history: map.history().iter().map(|(d, i)| (*d, raw(row.get(*i)))).collect(),
            extra: extra_cells(map, row),
        });
    }

    fn cells(&self, key: &K) -> &[RawCell] {
        self.extra.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Everything the workbook stores.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub ledger: Ledger,
    pub accounts: Vec<AccountRow>,
    pub trades: Vec<Trade>,
    dividends_raw: Passthrough<(Symbol, String)>,
    accounts_raw: Passthrough<(String, String)>,
    /// Keyed by position in `trades`, which only ever grows at the end.
    trades_raw: Passthrough<usize>,
}

impl Workbook {
    /// Read the workbook at `path`. A missing file is an empty workbook.
    ///
    /// Fails on a schema violation (missing or duplicate column) so a
    /// damaged sheet is never overwritten.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("{} does not exist yet, starting empty", path.display());
            return Ok(Self::default());
        }

        let mut xlsx: Xlsx<_> = open_workbook(path).map_err(|e| Error::workbook(path, e))?;
        let names = xlsx.sheet_names();
        let mut range = |schema: &SheetSchema| -> Result<Option<Range<Data>>> {
            let Some(name) = names.iter().find(|n| n.eq_ignore_ascii_case(schema.name)) else {
                debug!("{}: no '{}' sheet", path.display(), schema.name);
                return Ok(None);
            };
            let range = xlsx.worksheet_range(name).map_err(|e| Error::workbook(path, e))?;
            Ok((!range.is_empty()).then_some(range))
        };

        let (ledger, dividends_raw) = match range(&schema::DIVIDENDS)? {
            Some(r) => read_ledger(&r)?,
            None => (Ledger::new(), Passthrough::default()),
        };
        let (accounts, accounts_raw) = match range(&schema::ACCOUNTS)? {
            Some(r) => read_accounts(&r)?,
            None => (Vec::new(), Passthrough::default()),
        };
        let (trades, trades_raw) = match range(&schema::TRADES)? {
            Some(r) => read_trades(&r)?,
            None => (Vec::new(), Passthrough::default()),
        };

        let book = Self {
            ledger,
            accounts,
            trades,
            dividends_raw,
            accounts_raw,
            trades_raw,
        };
        debug!(
            "loaded {}: {} holdings, {} accounts, {} trades",
            path.display(),
            book.ledger.rows().len(),
            book.accounts.len(),
            book.trades.len()
        );
        if book.unreadable_rows() > 0 {
            warn!(
                "{}: {} unreadable row(s) will be written back unchanged",
                path.display(),
                book.unreadable_rows()
            );
        }
        Ok(book)
    }

    /// Rows that could not be read; they are kept as-is on save.
    pub fn unreadable_rows(&self) -> usize {
        self.dividends_raw.unreadable.len()
            + self.accounts_raw.unreadable.len()
            + self.trades_raw.unreadable.len()
    }

    /// Replace rows of refreshed accounts; rows of other accounts stay.
    pub fn merge_accounts(&mut self, rows: Vec<AccountRow>) {
        for row in rows {
            match self
                .accounts
                .iter_mut()
                .find(|a| a.broker == row.broker && a.account == row.account)
            {
                Some(existing) => *existing = row,
                None => self.accounts.push(row),
            }
        }
    }

    /// Append trades not already present. Returns (appended, duplicates).
    pub fn append_trades(&mut self, trades: impl IntoIterator<Item = Trade>) -> (usize, usize) {
        let (mut appended, mut skipped) = (0, 0);
        for trade in trades {
            if self.trades.iter().any(|t| same_trade(t, &trade)) {
                debug!("skipping duplicate trade {} {} {}", trade.date, trade.symbol, trade.kind);
                skipped += 1;
            } else {
                self.trades.push(trade);
                appended += 1;
            }
        }
        (appended, skipped)
    }

    /// Write the workbook to `path`, backing up the previous file first.
    pub fn save(&self, path: &Path, options: &SaveOptions) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::workbook(path, e))?;
        }
        if options.backup && path.exists() {
            let backup = backup_path(path);
            fs::copy(path, &backup).map_err(|e| Error::workbook(path, format!("backup failed: {e}")))?;
            debug!("backed up {} to {}", path.display(), backup.display());
        }

        let mut book = self.build(options).map_err(|e| Error::workbook(path, e))?;
        let tmp = temp_path(path);
        book.save(&tmp).map_err(|e| Error::workbook(path, e))?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::workbook(path, format!("replacing file failed: {e}"))
        })?;
        info!("wrote {}", path.display());
        Ok(())
    }

    fn build(&self, options: &SaveOptions) -> std::result::Result<rust_xlsxwriter::Workbook, XlsxError> {
        let formats = Formats::new();
        let mut book = rust_xlsxwriter::Workbook::new();
        book.push_worksheet(self.dividends_sheet(options, &formats)?);
        book.push_worksheet(self.accounts_sheet(&formats)?);
        book.push_worksheet(self.trades_sheet(&formats)?);
        book.push_worksheet(self.summary_sheet(options, &formats)?);
        Ok(book)
    }

    fn dividends_sheet(&self, options: &SaveOptions, f: &Formats) -> std::result::Result<Worksheet, XlsxError> {
        let mut ws = Worksheet::new();
        ws.set_name(schema::DIVIDENDS.name)?;
        let dates = self.ledger.dates();
        let fixed = dividends::COLUMNS.len();
        write_headers(&mut ws, &schema::DIVIDENDS, f)?;
        for (i, date) in dates.iter().enumerate() {
            ws.write_string_with_format(0, col(fixed + i), schema::history_header(*date), &f.header)?;
        }
        let extra_at = fixed + dates.len();
        write_extra_headers(&mut ws, extra_at, &self.dividends_raw.headers, f)?;

        let at = |c: schema::Column| col(dividends::COLUMNS.iter().position(|x| *x == c).unwrap_or(0));
        for (r, row) in self.ledger.rows().iter().enumerate() {
            let r = (r + 1) as u32;
            ws.write_string(r, at(dividends::TICKER), row.symbol.as_str())?;
            ws.write_string(r, at(dividends::ACCOUNT), &row.account)?;
            ws.write_number(r, at(dividends::QUANTITY), row.quantity)?;
            ws.write_number_with_format(r, at(dividends::PRICE_PAID), row.price_paid, &f.money)?;
            ws.write_number_with_format(r, at(dividends::CURRENT_PRICE), row.current_price, &f.money)?;
            ws.write_number_with_format(r, at(dividends::MARKET_VALUE), row.market_value, &f.money)?;
            ws.write_number_with_format(r, at(dividends::ANNUAL_RATE), row.annual_rate, &f.money)?;
            if let Some(y) = row.beginning_yield {
                ws.write_number_with_format(r, at(dividends::BEGINNING_YIELD), y, &f.percent)?;
            }
            ws.write_number_with_format(r, at(dividends::ANNUAL_DIVIDEND), row.annual_dividend, &f.money)?;
            ws.write_number_with_format(r, at(dividends::MONTHLY_DIVIDEND), row.monthly_dividend, &f.money)?;
            ws.write_string(r, at(dividends::SOURCE), &row.source)?;

            for (i, date) in dates.iter().enumerate() {
                if let Some(y) = row.yield_on(*date) {
                    let format = f.tier(options.thresholds.tier(Some(y)));
                    ws.write_number_with_format(r, col(fixed + i), y, format)?;
                }
            }
            let key = (row.symbol.clone(), row.account.clone());
            write_cells(&mut ws, r, extra_at, self.dividends_raw.cells(&key), f)?;
        }
        let first = self.ledger.rows().len() + 1;
        for (r, kept) in self.dividends_raw.unreadable.iter().enumerate() {
            write_raw_row(&mut ws, (first + r) as u32, kept, &schema::DIVIDENDS, dates, extra_at, f)?;
        }

        set_widths(&mut ws, extra_at + self.dividends_raw.headers.len(), 14.0)?;
        ws.set_column_width(0, 10)?;
        ws.set_freeze_panes(1, 2)?;
        Ok(ws)
    }

    fn accounts_sheet(&self, f: &Formats) -> std::result::Result<Worksheet, XlsxError> {
        let mut ws = Worksheet::new();
        ws.set_name(schema::ACCOUNTS.name)?;
        write_headers(&mut ws, &schema::ACCOUNTS, f)?;
        let extra_at = accounts::COLUMNS.len();
        write_extra_headers(&mut ws, extra_at, &self.accounts_raw.headers, f)?;
        for (r, row) in self.accounts.iter().enumerate() {
            let r = (r + 1) as u32;
            ws.write_string(r, 0, &row.broker)?;
            ws.write_string(r, 1, &row.account)?;
            ws.write_string(r, 2, &row.description)?;
            ws.write_number_with_format(r, 3, row.cash, &f.money)?;
            ws.write_number_with_format(r, 4, row.total_value, &f.money)?;
            if let Some(updated) = row.updated {
                ws.write_string(r, 5, format_us_date(updated))?;
            }
            let key = (row.broker.clone(), row.account.clone());
            write_cells(&mut ws, r, extra_at, self.accounts_raw.cells(&key), f)?;
        }
        let first = self.accounts.len() + 1;
        for (r, kept) in self.accounts_raw.unreadable.iter().enumerate() {
            write_raw_row(&mut ws, (first + r) as u32, kept, &schema::ACCOUNTS, &[], extra_at, f)?;
        }
        set_widths(&mut ws, extra_at + self.accounts_raw.headers.len(), 16.0)?;
        ws.set_column_width(2, 28)?;
        ws.set_freeze_panes(1, 0)?;
        Ok(ws)
    }

    fn trades_sheet(&self, f: &Formats) -> std::result::Result<Worksheet, XlsxError> {
        let mut ws = Worksheet::new();
        ws.set_name(schema::TRADES.name)?;
        write_headers(&mut ws, &schema::TRADES, f)?;
        let extra_at = trades::COLUMNS.len();
        write_extra_headers(&mut ws, extra_at, &self.trades_raw.headers, f)?;
        for (i, trade) in self.trades.iter().enumerate() {
            let r = (i + 1) as u32;
            let values = trade.formatted();
            ws.write_string(r, 0, format_us_date(trade.date))?;
            ws.write_string(r, 1, trade.symbol.as_str())?;
            ws.write_string(r, 2, trade.kind.as_str())?;
            ws.write_number(r, 3, trade.shares)?;
            ws.write_number_with_format(r, 4, trade.cost, &f.money)?;
            if let Some(strike) = trade.strike {
                ws.write_number_with_format(r, 5, strike, &f.money)?;
            }
            ws.write_string(r, 6, values.investment)?;
            ws.write_string(r, 7, values.put_value)?;
            ws.write_string(r, 8, values.put_cash_req)?;
            ws.write_string(r, 9, values.call_value)?;
            write_cells(&mut ws, r, extra_at, self.trades_raw.cells(&i), f)?;
        }
        let first = self.trades.len() + 1;
        for (r, kept) in self.trades_raw.unreadable.iter().enumerate() {
            write_raw_row(&mut ws, (first + r) as u32, kept, &schema::TRADES, &[], extra_at, f)?;
        }
        set_widths(&mut ws, extra_at + self.trades_raw.headers.len(), 14.0)?;
        ws.set_freeze_panes(1, 0)?;
        Ok(ws)
    }

    fn summary_sheet(&self, options: &SaveOptions, f: &Formats) -> std::result::Result<Worksheet, XlsxError> {
        let mut ws = Worksheet::new();
        ws.set_name(schema::SUMMARY.name)?;
        write_headers(&mut ws, &schema::SUMMARY, f)?;

        // every account with holdings or an Accounts row, cash-only ones included
        let holdings: BTreeMap<String, PortfolioTotals> =
            self.ledger.account_totals().into_iter().collect();
        let mut names: BTreeSet<&str> = holdings.keys().map(String::as_str).collect();
        names.extend(self.accounts.iter().map(|a| a.account.as_str()));

        let mut r = 1u32;
        let (mut all_cash, mut all_total) = (0.0, 0.0);
        for account in names {
            let totals = holdings.get(account).copied().unwrap_or_default();
            let (cash, total) = self
                .accounts
                .iter()
                .filter(|a| a.account == account)
                .fold((0.0, 0.0), |(c, t), a| (c + a.cash, t + a.total_value));
            all_cash += cash;
            all_total += total;
            write_summary_row(&mut ws, r, account, &totals, cash, total, options, f, false)?;
            r += 1;
        }
        let totals = self.ledger.totals();
        write_summary_row(&mut ws, r, "Total", &totals, all_cash, all_total, options, f, true)?;

        ws.write_string(r + 2, 0, "Generated")?;
        ws.write_string(r + 2, 1, format_us_date(options.generated))?;
        set_widths(&mut ws, summary::COLUMNS.len(), 16.0)?;
        Ok(ws)
    }
}

/// Parameters of a save.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub thresholds: YieldThresholds,
    pub backup: bool,
    /// Shown on the Summary sheet.
    pub generated: NaiveDate,
}

struct Formats {
    header: Format,
    money: Format,
    percent: Format,
    date: Format,
    bold_money: Format,
    high: Format,
    moderate: Format,
    low: Format,
}

impl Formats {
    fn new() -> Self {
        let percent = || Format::new().set_num_format("0.00\"%\"");
        Self {
            header: Format::new().set_bold(),
            money: Format::new().set_num_format("$#,##0.00"),
            percent: percent(),
            date: Format::new().set_num_format("m/d/yyyy"),
            bold_money: Format::new().set_bold().set_num_format("$#,##0.00"),
            high: percent().set_background_color(Color::RGB(GREEN)),
            moderate: percent().set_background_color(Color::RGB(YELLOW)),
            low: percent().set_background_color(Color::RGB(RED)),
        }
    }

    fn tier(&self, tier: YieldTier) -> &Format {
        match tier {
            YieldTier::High => &self.high,
            YieldTier::Moderate => &self.moderate,
            YieldTier::Low => &self.low,
            YieldTier::Unknown => &self.percent,
        }
    }
}

fn col(i: usize) -> u16 {
    i as u16
}

fn write_headers(ws: &mut Worksheet, schema: &SheetSchema, f: &Formats) -> std::result::Result<(), XlsxError> {
    for (c, header) in schema.headers().enumerate() {
        ws.write_string_with_format(0, col(c), header, &f.header)?;
    }
    Ok(())
}

fn write_extra_headers(
    ws: &mut Worksheet,
    first: usize,
    headers: &[String],
    f: &Formats,
) -> std::result::Result<(), XlsxError> {
    for (j, header) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col(first + j), header, &f.header)?;
    }
    Ok(())
}

fn write_raw(ws: &mut Worksheet, r: u32, c: u16, cell: &RawCell, f: &Formats) -> std::result::Result<(), XlsxError> {
    match cell {
        RawCell::Empty => {}
        RawCell::Text(s) => {
            ws.write_string(r, c, s)?;
        }
        RawCell::Number(v) => {
            ws.write_number(r, c, *v)?;
        }
        RawCell::Bool(v) => {
            ws.write_boolean(r, c, *v)?;
        }
        RawCell::Date(v) => {
            ws.write_number_with_format(r, c, *v, &f.date)?;
        }
    }
    Ok(())
}

fn write_cells(
    ws: &mut Worksheet,
    r: u32,
    first: usize,
    cells: &[RawCell],
    f: &Formats,
) -> std::result::Result<(), XlsxError> {
    for (j, cell) in cells.iter().enumerate() {
        write_raw(ws, r, col(first + j), cell, f)?;
    }
    Ok(())
}

/// Write an unreadable row back under the current layout.
fn write_raw_row(
    ws: &mut Worksheet,
    r: u32,
    row: &RawRow,
    schema: &SheetSchema,
    dates: &[NaiveDate],
    extra_at: usize,
    f: &Formats,
) -> std::result::Result<(), XlsxError> {
    for (c, column) in schema.columns.iter().enumerate() {
        if let Some(cell) = row.fixed.get(column.header) {
            write_raw(ws, r, col(c), cell, f)?;
        }
    }
    for (i, date) in dates.iter().enumerate() {
        if let Some(cell) = row.history.get(date) {
            write_raw(ws, r, col(schema.columns.len() + i), cell, f)?;
        }
    }
    write_cells(ws, r, extra_at, &row.extra, f)
}

fn set_widths(ws: &mut Worksheet, columns: usize, width: f64) -> std::result::Result<(), XlsxError> {
    for c in 0..columns {
        ws.set_column_width(col(c), width)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_summary_row(
    ws: &mut Worksheet,
    r: u32,
    label: &str,
    totals: &PortfolioTotals,
    cash: f64,
    total_value: f64,
    options: &SaveOptions,
    f: &Formats,
    bold: bool,
) -> std::result::Result<(), XlsxError> {
    let money = if bold { &f.bold_money } else { &f.money };
    if bold {
        ws.write_string_with_format(r, 0, label, &f.header)?;
    } else {
        ws.write_string(r, 0, label)?;
    }
    ws.write_number(r, 1, totals.holdings as f64)?;
    ws.write_number_with_format(r, 2, totals.market_value, money)?;
    ws.write_number_with_format(r, 3, totals.annual, money)?;
    ws.write_number_with_format(r, 4, totals.monthly, money)?;
    if let Some(y) = totals.yield_pct() {
        ws.write_number_with_format(r, 5, y, f.tier(options.thresholds.tier(Some(y))))?;
    }
    ws.write_number_with_format(r, 6, cash, money)?;
    ws.write_number_with_format(r, 7, total_value, money)?;
    Ok(())
}

// === Reading ===

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        Some(Data::String(s)) => s.trim().to_string(),
        Some(Data::Float(v)) => v.to_string(),
        Some(Data::Int(v)) => v.to_string(),
        Some(Data::Bool(v)) => v.to_string(),
        Some(Data::DateTimeIso(s)) => s.clone(),
        Some(Data::DateTime(dt)) => dt.as_f64().to_string(),
        _ => String::new(),
    }
}

/// `Ok(None)` for a blank cell, `Err` for text that is not a number.
fn cell_number(cell: Option<&Data>) -> std::result::Result<Option<f64>, String> {
    match cell {
        None | Some(Data::Empty) => Ok(None),
        Some(Data::Float(v)) => Ok(Some(*v)),
        Some(Data::Int(v)) => Ok(Some(*v as f64)),
        Some(Data::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Data::String(s)) => parse_amount(s.trim().trim_end_matches('%'))
            .map(Some)
            .ok_or_else(|| format!("{s:?} is not a number")),
        Some(other) => Err(format!("{other:?} is not a number")),
    }
}

fn cell_date(cell: Option<&Data>) -> Option<NaiveDate> {
    match cell? {
        Data::DateTime(dt) => date_from_excel_serial(dt.as_f64()),
        Data::Float(v) => date_from_excel_serial(*v),
        Data::Int(v) => date_from_excel_serial(*v as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date(s),
        _ => None,
    }
}

/// Header row and data rows of a sheet, with the header resolved.
fn resolve<'a>(range: &'a Range<Data>, schema: &SheetSchema) -> Result<(ColumnMap, Vec<&'a [Data]>)> {
    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .map(|h| h.iter().map(|c| cell_text(Some(c))).collect())
        .unwrap_or_default();
    let map = schema.resolve(header.as_slice())?;
    for (ignored, _) in map.ignored() {
        info!("sheet '{}': keeping unknown column '{ignored}' as is", schema.name);
    }
    let data = rows
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .collect();
    Ok((map, data))
}

/// Looks up named cells of one row.
struct RowReader<'a> {
    map: &'a ColumnMap,
    row: &'a [Data],
}

impl<'a> RowReader<'a> {
    fn cell(&self, column: schema::Column) -> Option<&'a Data> {
        self.map.index(column).and_then(|i| self.row.get(i))
    }

    fn text(&self, column: schema::Column) -> String {
        cell_text(self.cell(column))
    }

    fn number(&self, column: schema::Column) -> std::result::Result<Option<f64>, String> {
        cell_number(self.cell(column)).map_err(|e| format!("{}: {e}", column.header))
    }

    fn required_number(&self, column: schema::Column) -> std::result::Result<f64, String> {
        self.number(column)?
            .ok_or_else(|| format!("{}: missing value", column.header))
    }

    fn symbol(&self, column: schema::Column) -> std::result::Result<Symbol, String> {
        let text = self.text(column);
        if text.is_empty() {
            return Err(format!("{}: missing value", column.header));
        }
        Symbol::new(&text).map_err(|e| e.to_string())
    }
}

fn read_ledger(range: &Range<Data>) -> Result<(Ledger, Passthrough<(Symbol, String)>)> {
    let (map, data) = resolve(range, &schema::DIVIDENDS)?;
    let mut passthrough = Passthrough::new(&map);
    let mut rows: Vec<LedgerRow> = Vec::with_capacity(data.len());

    for (i, cells) in data.into_iter().enumerate() {
        let reader = RowReader { map: &map, row: cells };
        match read_ledger_row(&reader, &map) {
            Ok(row) => {
                if rows.iter().any(|r| r.symbol == row.symbol && r.account == row.account) {
                    warn!("Dividends row {}: duplicate {} / {}, kept unread", i + 2, row.symbol, row.account);
                    passthrough.keep_unreadable(&schema::DIVIDENDS, &map, cells);
                } else {
                    passthrough.keep((row.symbol.clone(), row.account.clone()), &map, cells);
                    rows.push(row);
                }
            }
            Err(e) => {
                warn!("Dividends row {}: {e}, kept unread", i + 2);
                passthrough.keep_unreadable(&schema::DIVIDENDS, &map, cells);
            }
        }
    }

    let dates = map.history().iter().map(|(d, _)| *d);
    Ok((Ledger::from_rows(dates, rows), passthrough))
}

fn read_ledger_row(r: &RowReader<'_>, map: &ColumnMap) -> std::result::Result<LedgerRow, String> {
    let mut row = LedgerRow::new(r.symbol(dividends::TICKER)?, r.text(dividends::ACCOUNT));
    row.quantity = r.required_number(dividends::QUANTITY)?;
    row.price_paid = r.number(dividends::PRICE_PAID)?.unwrap_or(0.0);
    row.current_price = r.number(dividends::CURRENT_PRICE)?.unwrap_or(0.0);
    row.market_value = r.number(dividends::MARKET_VALUE)?.unwrap_or(0.0);
    row.annual_rate = r.number(dividends::ANNUAL_RATE)?.unwrap_or(0.0);
    row.beginning_yield = r.number(dividends::BEGINNING_YIELD)?;
    row.annual_dividend = r.number(dividends::ANNUAL_DIVIDEND)?.unwrap_or(0.0);
    row.monthly_dividend = r.number(dividends::MONTHLY_DIVIDEND)?.unwrap_or(0.0);
    row.source = r.text(dividends::SOURCE);

    for (date, idx) in map.history() {
        let value = cell_number(r.row.get(*idx)).map_err(|e| format!("{}: {e}", schema::history_header(*date)))?;
        if let Some(y) = value {
            row.history.insert(*date, y);
        }
    }
    Ok(row)
}

fn read_accounts(range: &Range<Data>) -> Result<(Vec<AccountRow>, Passthrough<(String, String)>)> {
    let (map, data) = resolve(range, &schema::ACCOUNTS)?;
    let mut passthrough = Passthrough::new(&map);
    let mut rows: Vec<AccountRow> = Vec::with_capacity(data.len());
    for (i, cells) in data.into_iter().enumerate() {
        match read_account_row(&RowReader { map: &map, row: cells }) {
            Ok(row) if rows.iter().any(|r| r.broker == row.broker && r.account == row.account) => {
                warn!("Accounts row {}: duplicate {} / {}, kept unread", i + 2, row.broker, row.account);
                passthrough.keep_unreadable(&schema::ACCOUNTS, &map, cells);
            }
            Ok(row) => {
                passthrough.keep((row.broker.clone(), row.account.clone()), &map, cells);
                rows.push(row);
            }
            Err(e) => {
                warn!("Accounts row {}: {e}, kept unread", i + 2);
                passthrough.keep_unreadable(&schema::ACCOUNTS, &map, cells);
            }
        }
    }
    Ok((rows, passthrough))
}

fn read_account_row(r: &RowReader<'_>) -> std::result::Result<AccountRow, String> {
    let account = r.text(accounts::ACCOUNT);
    if account.is_empty() {
        return Err("Account: missing value".into());
    }
    Ok(AccountRow {
        broker: r.text(accounts::BROKER),
        account,
        description: r.text(accounts::DESCRIPTION),
        cash: r.number(accounts::CASH)?.unwrap_or(0.0),
        total_value: r.number(accounts::TOTAL_VALUE)?.unwrap_or(0.0),
        updated: cell_date(r.cell(accounts::UPDATED)),
    })
}

fn read_trades(range: &Range<Data>) -> Result<(Vec<Trade>, Passthrough<usize>)> {
    let (map, data) = resolve(range, &schema::TRADES)?;
    let mut passthrough = Passthrough::new(&map);
    let mut rows = Vec::with_capacity(data.len());
    for (i, cells) in data.into_iter().enumerate() {
        match read_trade_row(&RowReader { map: &map, row: cells }) {
            Ok(trade) => {
                passthrough.keep(rows.len(), &map, cells);
                rows.push(trade);
            }
            Err(e) => {
                warn!("Trades row {}: {e}, kept unread", i + 2);
                passthrough.keep_unreadable(&schema::TRADES, &map, cells);
            }
        }
    }
    Ok((rows, passthrough))
}

fn raw(cell: Option<&Data>) -> RawCell {
    cell.map(RawCell::from).unwrap_or(RawCell::Empty)
}

fn extra_cells(map: &ColumnMap, row: &[Data]) -> Vec<RawCell> {
    map.ignored().iter().map(|(_, i)| raw(row.get(*i))).collect()
}

fn read_trade_row(r: &RowReader<'_>) -> std::result::Result<Trade, String> {
    let date = cell_date(r.cell(trades::DATE))
        .ok_or_else(|| format!("Date: {:?} is not a date", r.text(trades::DATE)))?;
    let kind = r
        .text(trades::TYPE)
        .parse::<TradeKind>()
        .map_err(|e| e.to_string())?;
    Ok(Trade {
        date,
        symbol: r.symbol(trades::TICKER)?,
        kind,
        shares: r.required_number(trades::SHARES)?,
        cost: r.required_number(trades::COST)?,
        strike: r.number(trades::STRIKE)?,
    })
}

fn same_trade(a: &Trade, b: &Trade) -> bool {
    let close = |x: f64, y: f64| (x - y).abs() < 1e-9;
    a.date == b.date
        && a.symbol == b.symbol
        && a.kind == b.kind
        && close(a.shares, b.shares)
        && close(a.cost, b.cost)
        && match (a.strike, b.strike) {
            (Some(x), Some(y)) => close(x, y),
            (None, None) => true,
            _ => false,
        }
}

// === Paths and locking ===

/// `<stem>.backup.xlsx` next to the workbook.
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".into());
    path.with_file_name(format!("{stem}.backup.xlsx"))
}

fn temp_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".into());
    path.with_file_name(format!(".{stem}.tmp.xlsx"))
}

/// `<path>.lock`.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive lock on a workbook, released on drop.
#[derive(Debug)]
pub struct WorkbookLock {
    path: PathBuf,
}

impl WorkbookLock {
    /// Create `<path>.lock`; fails with [`Error::Locked`] if it exists.
    pub fn acquire(workbook: &Path) -> Result<Self> {
        let path = lock_path(workbook);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::workbook(workbook, e))?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(Error::Locked(path)),
            Err(e) => return Err(Error::workbook(workbook, format!("creating lock failed: {e}"))),
        };
        let _ = writeln!(file, "{}", std::process::id());
        debug!("acquired {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkbookLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("could not remove lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn trade(kind: TradeKind, shares: f64, cost: f64, strike: Option<f64>) -> Trade {
        Trade {
            date: date(2025, 1, 5),
            symbol: Symbol::new("T").unwrap(),
            kind,
            shares,
            cost,
            strike,
        }
    }

    #[test]
    fn derived_paths() {
        let path = Path::new("/data/dividends.xlsx");
        assert_eq!(backup_path(path), PathBuf::from("/data/dividends.backup.xlsx"));
        assert_eq!(lock_path(path), PathBuf::from("/data/dividends.xlsx.lock"));
        assert_eq!(temp_path(path), PathBuf::from("/data/.dividends.tmp.xlsx"));
    }

    #[test]
    fn lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("book.xlsx");

        let lock = WorkbookLock::acquire(&book).unwrap();
        assert!(lock.path().exists());
        assert!(matches!(WorkbookLock::acquire(&book), Err(Error::Locked(_))));

        drop(lock);
        assert!(!lock_path(&book).exists());
        let again = WorkbookLock::acquire(&book);
        assert!(again.is_ok());
    }

    #[test]
    fn number_cells() {
        assert_eq!(cell_number(Some(&Data::Float(2.5))), Ok(Some(2.5)));
        assert_eq!(cell_number(Some(&Data::Int(3))), Ok(Some(3.0)));
        assert_eq!(cell_number(Some(&Data::String("$1,234.50".into()))), Ok(Some(1234.5)));
        assert_eq!(cell_number(Some(&Data::String("5.25%".into()))), Ok(Some(5.25)));
        assert_eq!(cell_number(Some(&Data::Empty)), Ok(None));
        assert_eq!(cell_number(None), Ok(None));
        assert!(cell_number(Some(&Data::String("n/a".into()))).is_err());
    }

    #[test]
    fn raw_cells_keep_their_kind() {
        assert_eq!(RawCell::from(&Data::String("x".into())), RawCell::Text("x".into()));
        assert_eq!(RawCell::from(&Data::Int(3)), RawCell::Number(3.0));
        assert_eq!(RawCell::from(&Data::Bool(true)), RawCell::Bool(true));
        assert_eq!(raw(None), RawCell::Empty);
    }

    #[test]
    fn date_cells() {
        assert_eq!(cell_date(Some(&Data::String("1/5/2025".into()))), Some(date(2025, 1, 5)));
        assert_eq!(cell_date(Some(&Data::Float(45662.0))), Some(date(2025, 1, 5)));
        assert_eq!(cell_date(Some(&Data::Empty)), None);
    }

    #[test]
    fn duplicate_trades_skipped() {
        let mut book = Workbook::default();
        let put = trade(TradeKind::SoldPut, -1.0, 2.5, Some(25.0));
        let (added, skipped) = book.append_trades(vec![put.clone(), put.clone()]);
        assert_eq!((added, skipped), (1, 1));

        let other_strike = trade(TradeKind::SoldPut, -1.0, 2.5, Some(26.0));
        let (added, skipped) = book.append_trades(vec![put, other_strike]);
        assert_eq!((added, skipped), (1, 1));
        assert_eq!(book.trades.len(), 2);
    }

    #[test]
    fn merge_accounts_replaces_by_broker_and_id() {
        let row = |broker: &str, account: &str, cash: f64| AccountRow {
            broker: broker.into(),
            account: account.into(),
            description: String::new(),
            cash,
            total_value: cash,
            updated: None,
        };
        let mut book = Workbook::default();
        book.merge_accounts(vec![row("etrade", "1", 10.0), row("schwab", "2", 20.0)]);
        book.merge_accounts(vec![row("etrade", "1", 15.0)]);
        assert_eq!(book.accounts.len(), 2);
        assert_eq!(book.accounts[0].cash, 15.0);
        assert_eq!(book.accounts[1].cash, 20.0);
    }
}
