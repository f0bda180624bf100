//! Bounded price history store
//!
//! Pure data holder: one [`PriceSeries`] per asset with a fixed retention
//! window. Filled by data ingestion, read-only to the optimizer.

use crate::types::{PricePoint, PriceSeries};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

pub struct HistoryStore {
    window: usize,
    series: HashMap<String, PriceSeries>,
}

impl HistoryStore {
    /// `window` is the maximum number of points retained per asset.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            series: HashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn series(&self, symbol: &str) -> Option<&PriceSeries> {
        self.series.get(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    /// Replace the whole series for an asset, truncated to the window.
    pub fn insert_series(&mut self, series: PriceSeries) {
        let mut series = series;
        series.evict_to(self.window);
        self.series.insert(series.symbol.clone(), series);
    }

    /// Append one point. Out-of-order or duplicate timestamps are ignored
    /// with a debug log; the oldest point is evicted past the window.
    pub fn insert_point(&mut self, symbol: &str, point: PricePoint) {
        let series = self
            .series
            .entry(symbol.to_string())
            .or_insert_with(|| PriceSeries::new(symbol.to_string(), Vec::new()));
        if !series.push(point) {
            debug!(symbol, time = point.time, "ignoring stale price point");
            return;
        }
        series.evict_to(self.window);
    }

    /// Close rows over the intersection of all symbols' timestamps, ascending.
    /// Empty when any symbol has no history at all.
    pub fn aligned_closes(&self, symbols: &[String]) -> Vec<HashMap<String, Decimal>> {
        let mut by_symbol: Vec<(&String, BTreeMap<i64, Decimal>)> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.series.get(symbol) {
                Some(series) if !series.is_empty() => {
                    let closes = series.points().iter().map(|p| (p.time, p.close)).collect();
                    by_symbol.push((symbol, closes));
                }
                _ => return Vec::new(),
            }
        }

        let mut shared: Option<BTreeSet<i64>> = None;
        for (_, closes) in &by_symbol {
            let times: BTreeSet<i64> = closes.keys().copied().collect();
            shared = Some(match shared {
                Some(acc) => acc.intersection(&times).copied().collect(),
                None => times,
            });
        }

        shared
            .unwrap_or_default()
            .into_iter()
            .map(|time| {
                by_symbol
                    .iter()
                    .map(|(symbol, closes)| ((*symbol).clone(), closes[&time]))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::series_from_closes;
    use rust_decimal_macros::dec;

    fn point(time: i64, close: Decimal) -> PricePoint {
        PricePoint {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
        }
    }

    #[test]
    fn test_insert_point_orders_and_evicts() {
        let mut store = HistoryStore::new(3);
        for t in 0..5 {
            store.insert_point("BTC", point(t, Decimal::from(100 + t)));
        }
        let series = store.series("BTC").unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.points()[0].time, 2);
        assert_eq!(series.last().unwrap().time, 4);
    }

    #[test]
    fn test_insert_point_rejects_stale() {
        let mut store = HistoryStore::new(10);
        store.insert_point("BTC", point(5, dec!(100)));
        store.insert_point("BTC", point(5, dec!(101)));
        store.insert_point("BTC", point(3, dec!(99)));
        let series = store.series("BTC").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().close, dec!(100));
    }

    #[test]
    fn test_insert_series_truncates_to_window() {
        let mut store = HistoryStore::new(2);
        store.insert_series(series_from_closes("ETH", &[dec!(1), dec!(2), dec!(3)]));
        let series = store.series("ETH").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].close, dec!(2));
    }

    #[test]
    fn test_aligned_closes_intersection() {
        let mut store = HistoryStore::new(100);
        store.insert_series(series_from_closes("BTC", &[dec!(100), dec!(101), dec!(102)]));
        // ETH only overlaps on times 1 and 2
        store.insert_series(PriceSeries::new(
            "ETH".to_string(),
            vec![point(1, dec!(50)), point(2, dec!(51)), point(3, dec!(52))],
        ));

        let symbols = vec!["BTC".to_string(), "ETH".to_string()];
        let rows = store.aligned_closes(&symbols);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["BTC"], dec!(101));
        assert_eq!(rows[0]["ETH"], dec!(50));
        assert_eq!(rows[1]["BTC"], dec!(102));
        assert_eq!(rows[1]["ETH"], dec!(51));
    }

    #[test]
    fn test_aligned_closes_missing_symbol_is_empty() {
        let mut store = HistoryStore::new(100);
        store.insert_series(series_from_closes("BTC", &[dec!(100), dec!(101)]));
        let symbols = vec!["BTC".to_string(), "ETH".to_string()];
        assert!(store.aligned_closes(&symbols).is_empty());
    }
}
