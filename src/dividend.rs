//! Dividend rates, per-holding income estimates and yield tiers.

use std::collections::BTreeMap;
use std::fmt;

use crate::position::Position;
use crate::types::Symbol;

/// Where an annual dividend rate came from, in resolution priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RateSource {
    /// Manually configured rate.
    Override,
    /// The broker's quote (annual dividend or yield).
    Broker,
    /// Alpha Vantage company overview.
    Overview,
    /// Alpha Vantage cash-flow statement (payout / shares outstanding).
    CashFlow,
    /// No source had a rate.
    Missing,
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RateSource::Override => "override",
            RateSource::Broker => "broker",
            RateSource::Overview => "overview",
            RateSource::CashFlow => "cash-flow",
            RateSource::Missing => "missing",
        };
        f.pad(label)
    }
}

/// Annual dividend per share.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DividendRate {
    pub annual_per_share: f64,
    pub source: RateSource,
}

impl DividendRate {
    pub fn new(annual_per_share: f64, source: RateSource) -> Self {
        Self {
            annual_per_share,
            source,
        }
    }

    /// Derive the per-share rate from a yield percentage and a price.
    pub fn from_yield(yield_pct: f64, price: f64, source: RateSource) -> Self {
        Self::new(price * yield_pct / 100.0, source)
    }

    pub fn missing() -> Self {
        Self::new(0.0, RateSource::Missing)
    }

    pub fn is_missing(&self) -> bool {
        self.source == RateSource::Missing
    }
}

/// Estimated dividend income for one holding.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DividendEstimate {
    pub symbol: Symbol,
    pub account: String,
    pub quantity: f64,
    pub price: f64,
    pub price_paid: f64,
    pub market_value: f64,
    pub annual_per_share: f64,
    /// Current yield in percent; `None` when the rate or price is unknown.
    pub yield_pct: Option<f64>,
    pub annual: f64,
    pub monthly: f64,
    pub source: RateSource,
}

/// Combine a position with its dividend rate.
///
/// ```
/// use divtrack::dividend::{estimate, DividendRate, RateSource};
/// use divtrack::{Position, Symbol};
///
/// let pos = Position {
///     symbol: Symbol::new("O").unwrap(),
///     account: "1234".into(),
///     quantity: 120.0,
///     price_paid: 52.0,
///     current_price: 60.0,
///     market_value: 7200.0,
/// };
/// let est = estimate(&pos, &DividendRate::new(3.0, RateSource::Broker));
/// assert_eq!(est.annual, 360.0);
/// assert_eq!(est.monthly, 30.0);
/// assert_eq!(est.yield_pct, Some(5.0));
/// ```
pub fn estimate(position: &Position, rate: &DividendRate) -> DividendEstimate {
    let price = position.effective_price();
    let yield_pct = (!rate.is_missing() && price > 0.0)
        .then(|| rate.annual_per_share / price * 100.0);
    let annual = position.quantity * rate.annual_per_share;

    DividendEstimate {
        symbol: position.symbol.clone(),
        account: position.account.clone(),
        quantity: position.quantity,
        price,
        price_paid: position.price_paid,
        market_value: position.market_value,
        annual_per_share: rate.annual_per_share,
        yield_pct,
        annual,
        monthly: annual / 12.0,
        source: rate.source,
    }
}

/// Colour band for a yield value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum YieldTier {
    High,
    Moderate,
    Low,
    Unknown,
}

impl fmt::Display for YieldTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            YieldTier::High => "high",
            YieldTier::Moderate => "moderate",
            YieldTier::Low => "low",
            YieldTier::Unknown => "unknown",
        };
        f.pad(label)
    }
}

/// Yield cut-offs (percent) for the tier colours.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YieldThresholds {
    pub high_pct: f64,
    pub moderate_pct: f64,
}

impl Default for YieldThresholds {
    fn default() -> Self {
        Self {
            high_pct: 15.0,
            moderate_pct: 8.0,
        }
    }
}

impl YieldThresholds {
    /// Classify a yield. Boundaries belong to the higher tier.
    pub fn tier(&self, yield_pct: Option<f64>) -> YieldTier {
        match yield_pct {
            Some(y) if y.is_nan() => YieldTier::Unknown,
            Some(y) if y >= self.high_pct => YieldTier::High,
            Some(y) if y >= self.moderate_pct => YieldTier::Moderate,
            Some(_) => YieldTier::Low,
            None => YieldTier::Unknown,
        }
    }
}

/// Running totals over a set of holdings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioTotals {
    pub holdings: usize,
    pub market_value: f64,
    pub annual: f64,
    pub monthly: f64,
}

impl PortfolioTotals {
    pub fn add(&mut self, market_value: f64, annual: f64) {
        self.holdings += 1;
        self.market_value += market_value;
        self.annual += annual;
        self.monthly += annual / 12.0;
    }

    /// Income-weighted yield of the whole set, `None` without market value.
    pub fn yield_pct(&self) -> Option<f64> {
        (self.market_value > 0.0).then(|| self.annual / self.market_value * 100.0)
    }
}

/// Totals across all estimates.
pub fn totals(estimates: &[DividendEstimate]) -> PortfolioTotals {
    let mut totals = PortfolioTotals::default();
    for est in estimates {
        totals.add(est.market_value, est.annual);
    }
    totals
}

/// Totals per account, ordered by account id.
pub fn totals_by_account(estimates: &[DividendEstimate]) -> Vec<(String, PortfolioTotals)> {
    let mut by_account: BTreeMap<String, PortfolioTotals> = BTreeMap::new();
    for est in estimates {
        by_account
            .entry(est.account.clone())
            .or_default()
            .add(est.market_value, est.annual);
    }
    by_account.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(symbol: &str, account: &str, quantity: f64, price: f64) -> Position {
        Position {
            symbol: Symbol::new(symbol).unwrap(),
            account: account.into(),
            quantity,
            price_paid: price,
            current_price: price,
            market_value: quantity * price,
        }
    }

    #[test]
    fn rate_from_yield() {
        let rate = DividendRate::from_yield(12.0, 25.0, RateSource::Broker);
        assert_eq!(rate.annual_per_share, 3.0);
    }

    #[test]
    fn missing_rate_has_no_yield() {
        let est = estimate(&position("XYZ", "A", 10.0, 20.0), &DividendRate::missing());
        assert_eq!(est.yield_pct, None);
        assert_eq!(est.annual, 0.0);
        assert_eq!(est.source, RateSource::Missing);
    }

    #[test]
    fn zero_price_has_no_yield() {
        let mut pos = position("XYZ", "A", 10.0, 0.0);
        pos.market_value = 0.0;
        let est = estimate(&pos, &DividendRate::new(1.2, RateSource::Override));
        assert_eq!(est.yield_pct, None);
        assert_eq!(est.annual, 12.0);
        assert_eq!(est.monthly, 1.0);
    }

    #[test]
    fn tiers_at_boundaries() {
        let t = YieldThresholds::default();
        assert_eq!(t.tier(Some(15.0)), YieldTier::High);
        assert_eq!(t.tier(Some(14.99)), YieldTier::Moderate);
        assert_eq!(t.tier(Some(8.0)), YieldTier::Moderate);
        assert_eq!(t.tier(Some(7.99)), YieldTier::Low);
        assert_eq!(t.tier(Some(0.0)), YieldTier::Low);
        assert_eq!(t.tier(None), YieldTier::Unknown);
        assert_eq!(t.tier(Some(f64::NAN)), YieldTier::Unknown);
    }

    #[test]
    fn totals_group_by_account() {
        let estimates = vec![
            estimate(&position("O", "B", 100.0, 60.0), &DividendRate::new(3.0, RateSource::Broker)),
            estimate(&position("MAIN", "A", 50.0, 40.0), &DividendRate::new(2.4, RateSource::Broker)),
            estimate(&position("T", "B", 10.0, 20.0), &DividendRate::new(1.2, RateSource::Broker)),
        ];

        let all = totals(&estimates);
        assert_eq!(all.holdings, 3);
        assert_eq!(all.market_value, 6000.0 + 2000.0 + 200.0);
        assert_eq!(all.annual, 300.0 + 120.0 + 12.0);

        let grouped = totals_by_account(&estimates);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "A");
        assert_eq!(grouped[0].1.annual, 120.0);
        assert_eq!(grouped[1].0, "B");
        assert_eq!(grouped[1].1.holdings, 2);
        assert_eq!(grouped[1].1.yield_pct(), Some(312.0 / 6200.0 * 100.0));
    }

    #[test]
    fn empty_totals_have_no_yield() {
        assert_eq!(totals(&[]).yield_pct(), None);
    }
}
