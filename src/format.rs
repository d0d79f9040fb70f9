//! Display formatting for money, percentages and trade dates.
//!
//! These are the strings that land in the workbook's text cells and on the
//! console, so they follow US spreadsheet conventions: `$1,234.50`,
//! `-$2.50`, `1/5/2025`.

use chrono::{Datelike, Duration, NaiveDate};

/// Format a dollar amount with thousands separators and two decimals.
///
/// ```
/// use divtrack::format::format_money;
///
/// assert_eq!(format_money(1234.5), "$1,234.50");
/// assert_eq!(format_money(-2.5), "-$2.50");
/// ```
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let dollars = cents / 100;
    let rem = cents % 100;
    // -0.001 rounds to zero cents; don't print "-$0.00"
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${}.{rem:02}", group_thousands(dollars))
}

/// Format a numeric string as currency.
///
/// `$` and `,` are ignored on input, so the function is idempotent on its own
/// output. Blank input gives an empty string; input that is not a number is
/// returned unchanged.
pub fn format_currency(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    match parse_amount(raw) {
        Some(value) => format_money(value),
        None => raw.to_string(),
    }
}

/// Parse an amount such as `1234.5`, `$1,234.50` or `-$2.50`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Percentage with two decimals, e.g. `12.34%`.
pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

/// Parse a trade or statement date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` (time ignored, `T` separator
/// also accepted) and `M/D/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw
        .trim()
        .split([' ', 'T'])
        .next()
        .unwrap_or_default();
    if head.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
        return Some(date);
    }

    let mut parts = head.split('/');
    let (month, day, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// `M/D/YYYY` without leading zeros.
pub fn format_us_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

/// Reformat a date string as `M/D/YYYY`.
///
/// Blank input gives an empty string; unparseable input is returned as-is.
///
/// ```
/// use divtrack::format::format_date;
///
/// assert_eq!(format_date("2025-01-05"), "1/5/2025");
/// assert_eq!(format_date("2025-12-05 14:30:00"), "12/5/2025");
/// assert_eq!(format_date(""), "");
/// ```
pub fn format_date(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    match parse_date(raw) {
        Some(date) => format_us_date(date),
        None => raw.to_string(),
    }
}

/// Convert an Excel serial day number (1900 date system) to a date.
pub fn date_from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
