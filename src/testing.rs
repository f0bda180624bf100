//! Deterministic fixtures shared by unit tests

use crate::types::{MarketSnapshot, PricePoint, PriceSeries};
use chrono::Utc;
use rust_decimal::Decimal;

/// Series with the given closes at day indices 0..n (OHLC collapsed to the
/// close, zero volume).
pub fn series_from_closes(symbol: &str, closes: &[Decimal]) -> PriceSeries {
    let points = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PricePoint {
            time: i as i64,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
        })
        .collect();
    PriceSeries::new(symbol.to_string(), points)
}

/// Closes drifting up by a fixed step each day.
pub fn drifting_closes(start: Decimal, step: Decimal, len: usize) -> Vec<Decimal> {
    (0..len)
        .map(|i| start + step * Decimal::from(i as u64))
        .collect()
}

/// Closes oscillating around a base: base + amplitude, base − amplitude, ...
/// Gives a series with nonzero volatility and no drift.
pub fn alternating_closes(base: Decimal, amplitude: Decimal, len: usize) -> Vec<Decimal> {
    (0..len)
        .map(|i| {
            if i % 2 == 0 {
                base + amplitude
            } else {
                base - amplitude
            }
        })
        .collect()
}

/// Snapshot with the given price and market cap, refreshed just now.
pub fn snapshot(symbol: &str, price: Decimal, market_cap: Decimal) -> MarketSnapshot {
    MarketSnapshot {
        symbol: symbol.to_string(),
        price,
        market_cap,
        change_24h: Decimal::ZERO,
        volume_24h: Decimal::ZERO,
        last_updated: Utc::now(),
    }
}
