//! Dividend rate resolution across overrides, broker quotes and Alpha Vantage.

use divtrack::{DividendEstimate, DividendRate, Position, RateSource, Symbol, estimate};
use divtrack_broker::Quote;
use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::alphavantage::Fundamentals;

/// First available rate: override, broker quote, overview, cash flow.
pub fn resolve_rate(
    symbol: &Symbol,
    price: f64,
    overrides: &FxHashMap<Symbol, f64>,
    quote: Option<&Quote>,
    fundamentals: Option<&mut dyn Fundamentals>,
) -> DividendRate {
    if let Some(rate) = overrides.get(symbol) {
        return DividendRate::new(*rate, RateSource::Override);
    }
    if let Some(amount) = quote.and_then(Quote::annual_dividend_per_share) {
        return DividendRate::new(amount, RateSource::Broker);
    }
    if symbol.is_option() {
        debug!("{symbol}: option contract, no dividend");
        return DividendRate::missing();
    }
    let Some(fundamentals) = fundamentals else {
        return DividendRate::missing();
    };

    let overview = fundamentals.overview(symbol);
    if let Some(overview) = &overview {
        if let Some(amount) = overview.dividend_per_share {
            return DividendRate::new(amount, RateSource::Overview);
        }
        if let Some(fraction) = overview.dividend_yield.filter(|_| price > 0.0) {
            return DividendRate::from_yield(fraction * 100.0, price, RateSource::Overview);
        }
    }

    let shares = overview.and_then(|o| o.shares_outstanding);
    if let Some(shares) = shares {
        if let Some(payout) = fundamentals.annual_dividend_payout(symbol) {
            return DividendRate::new(payout / shares, RateSource::CashFlow);
        }
    }
    DividendRate::missing()
}

/// Estimate dividend income for every holding.
///
/// Each distinct symbol is resolved once. Positions without a current price
/// take the quote's last price.
pub fn estimate_holdings(
    positions: &[Position],
    quotes: &[Quote],
    overrides: &FxHashMap<Symbol, f64>,
    mut fundamentals: Option<&mut dyn Fundamentals>,
) -> Vec<DividendEstimate> {
    let quotes: FxHashMap<&Symbol, &Quote> = quotes.iter().map(|q| (&q.symbol, q)).collect();
    let mut rates: FxHashMap<Symbol, DividendRate> = FxHashMap::default();

    positions
        .iter()
        .map(|position| {
            let quote = quotes.get(&position.symbol).copied();
            let mut position = position.clone();
            if position.current_price <= 0.0 {
                if let Some(last) = quote.map(|q| q.last).filter(|last| *last > 0.0) {
                    position.current_price = last;
                    position.market_value = position.quantity * last;
                }
            }

            let rate = *rates.entry(position.symbol.clone()).or_insert_with(|| {
                let rate = resolve_rate(
                    &position.symbol,
                    position.effective_price(),
                    overrides,
                    quote,
                    fundamentals
                        .as_deref_mut()
                        .map(|f| f as &mut dyn Fundamentals),
                );
                if rate.is_missing() && !position.symbol.is_option() {
                    warn!("{}: no dividend rate found, recording 0", position.symbol);
                }
                rate
            });
            estimate(&position, &rate)
        })
        .collect()
}
