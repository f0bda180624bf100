//! Market data boundary
//!
//! The optimizer consumes price history and market snapshots through the
//! [`MarketDataProvider`] trait; live acquisition protocols live behind it
//! and are out of scope here. The crate ships a file-backed provider for the
//! CLI and an explicit TTL cache for snapshots; cache lifetime is a plain
//! timestamp comparison on an owned object, not ambient global state.

use crate::error::{BotError, Result};
use crate::types::{MarketSnapshot, PricePoint, PriceSeries};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Source of price series and market snapshots.
///
/// Failure for a single symbol must not abort a whole optimization; callers
/// degrade per-strategy instead.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Price history for the requested lookback window, ascending by time.
    async fn price_series(&self, symbol: &str, lookback_days: usize) -> Result<PriceSeries>;

    /// Current market snapshot for one symbol.
    async fn market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// TTL cache for market snapshots (default TTL 5 minutes, configured).
///
/// Reads check staleness against the entry's own timestamp; a refresh simply
/// overwrites the entry, so concurrent refreshes of the same symbol are
/// idempotent (last write wins).
pub struct SnapshotCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, MarketSnapshot>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A snapshot that is still within its TTL, if any.
    pub fn get(&self, symbol: &str) -> Option<MarketSnapshot> {
        let entries = self.entries.read();
        entries
            .get(symbol)
            .filter(|snapshot| Utc::now() - snapshot.last_updated < self.ttl)
            .cloned()
    }

    pub fn insert(&self, snapshot: MarketSnapshot) {
        self.entries
            .write()
            .insert(snapshot.symbol.clone(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// File-backed provider: price history and snapshots from JSON files
/// produced by the external ingestion pipeline.
///
/// History format: `{ "BTC": [{time, open, high, low, close, volume}, ...] }`.
/// Snapshot format: a JSON array of snapshot objects.
pub struct FileDataProvider {
    series: HashMap<String, PriceSeries>,
    snapshots: HashMap<String, MarketSnapshot>,
}

impl FileDataProvider {
    pub fn new(
        series: HashMap<String, PriceSeries>,
        snapshots: HashMap<String, MarketSnapshot>,
    ) -> Self {
        Self { series, snapshots }
    }

    /// Load both files. A missing snapshot file degrades to an empty snapshot
    /// set (market-cap weighting will then assign zero weights), a missing
    /// history file is a hard error.
    pub fn load(history_path: &Path, snapshots_path: &Path) -> Result<Self> {
        let raw: HashMap<String, Vec<PricePoint>> =
            serde_json::from_str(&std::fs::read_to_string(history_path)?)?;
        let series = raw
            .into_iter()
            .map(|(symbol, points)| (symbol.clone(), PriceSeries::new(symbol, points)))
            .collect();

        let snapshots = if snapshots_path.exists() {
            let list: Vec<MarketSnapshot> =
                serde_json::from_str(&std::fs::read_to_string(snapshots_path)?)?;
            list.into_iter()
                .map(|snapshot| (snapshot.symbol.clone(), snapshot))
                .collect()
        } else {
            warn!(path = %snapshots_path.display(), "snapshot file missing, continuing without snapshots");
            HashMap::new()
        };

        Ok(Self { series, snapshots })
    }
}

#[async_trait]
impl MarketDataProvider for FileDataProvider {
    async fn price_series(&self, symbol: &str, lookback_days: usize) -> Result<PriceSeries> {
        self.series
            .get(symbol)
            .map(|series| series.truncate_to(lookback_days))
            .ok_or_else(|| BotError::SeriesNotFound(symbol.to_string()))
    }

    async fn market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        self.snapshots
            .get(symbol)
            .cloned()
            .ok_or_else(|| BotError::SnapshotNotFound(symbol.to_string()))
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{series_from_closes, snapshot};
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_snapshot_cache_hit_within_ttl() {
        let cache = SnapshotCache::new(Duration::seconds(300));
        cache.insert(snapshot("BTC", dec!(50000), dec!(1000)));
        let hit = cache.get("BTC").unwrap();
        assert_eq!(hit.price, dec!(50000));
    }

    #[test]
    fn test_snapshot_cache_expires() {
        let cache = SnapshotCache::new(Duration::seconds(300));
        let mut stale = snapshot("BTC", dec!(50000), dec!(1000));
        stale.last_updated = Utc::now() - Duration::seconds(301);
        cache.insert(stale);
        assert!(cache.get("BTC").is_none());
        // The entry is still present; a refresh overwrites it.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_cache_last_write_wins() {
        let cache = SnapshotCache::new(Duration::seconds(300));
        cache.insert(snapshot("BTC", dec!(50000), dec!(1000)));
        cache.insert(snapshot("BTC", dec!(51000), dec!(1010)));
        assert_eq!(cache.get("BTC").unwrap().price, dec!(51000));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_file_provider_lookback_truncation() {
        let series = series_from_closes("BTC", &[dec!(1), dec!(2), dec!(3), dec!(4)]);
        let provider = FileDataProvider::new(
            HashMap::from([("BTC".to_string(), series)]),
            HashMap::new(),
        );

        let truncated = provider.price_series("BTC", 2).await.unwrap();
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated.points()[0].close, dec!(3));

        let err = provider.price_series("ETH", 2).await.unwrap_err();
        assert!(matches!(err, BotError::SeriesNotFound(_)));
    }

    #[tokio::test]
    async fn test_file_provider_load() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("history.json");
        let snapshots_path = dir.path().join("snapshots.json");

        let mut history = std::fs::File::create(&history_path).unwrap();
        write!(
            history,
            r#"{{"BTC": [
                {{"time": 0, "open": "100", "high": "101", "low": "99", "close": "100", "volume": "10"}},
                {{"time": 1, "open": "100", "high": "103", "low": "100", "close": "102", "volume": "12"}}
            ]}}"#
        )
        .unwrap();

        let provider = FileDataProvider::load(&history_path, &snapshots_path).unwrap();
        let series = provider.price_series("BTC", 30).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, dec!(102));

        // Snapshot file absent: provider loads, snapshots just miss.
        let err = provider.market_snapshot("BTC").await.unwrap_err();
        assert!(matches!(err, BotError::SnapshotNotFound(_)));
    }
}
