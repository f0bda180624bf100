//! Portfolio optimization engine
//!
//! Turns historical price series into constrained target weights and the
//! metrics needed to judge them. Strategy selection is a closed enum; every
//! numerical failure inside a strategy degrades to a documented fallback
//! instead of surfacing to the caller.
//!
//! ```rust,ignore
//! use rebalancer_bot::optimizer::{PortfolioOptimizer, Strategy};
//!
//! let optimizer = PortfolioOptimizer::new(provider, optimizer_cfg, data_cfg);
//! let result = optimizer.optimize(&assets, &current, Strategy::MinVariance).await?;
//! ```

pub mod constraints;
pub mod metrics;
pub mod strategies;


pub use constraints::{project, WeightBounds};
pub use metrics::{portfolio_metrics, AssetStat};

use crate::config::{DataConfig, OptimizerConfig};
use crate::data::{MarketDataProvider, SnapshotCache};
use crate::error::{BotError, Result};
use crate::history::HistoryStore;
use crate::solver::SolverError;
use crate::stats::{
    annualized_return, annualized_volatility, correlation, covariance_matrix, StatsError,
    DEFAULT_VOLATILITY,
};
use crate::types::{
    MarketSnapshot, OptimizationResult, PortfolioMetrics, PriceSeries, Weights,
};
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Internal numerical failures. Callers inside this module map every variant
/// to the risk-parity fallback; nothing here crosses the crate boundary.
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("empty asset universe")]
    EmptyUniverse,

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("minimum variance produced a degenerate solution")]
    Degenerate,
}

/// Allocation strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    EqualWeight,
    MarketCap,
    RiskParity,
    MinVariance,
}

impl FromStr for Strategy {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equal_weight" => Ok(Strategy::EqualWeight),
            "market_cap" => Ok(Strategy::MarketCap),
            "risk_parity" => Ok(Strategy::RiskParity),
            "min_variance" => Ok(Strategy::MinVariance),
            other => Err(BotError::InvalidInput(format!(
                "unknown strategy '{other}' (expected equal_weight, market_cap, risk_parity or min_variance)"
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::EqualWeight => "equal_weight",
            Strategy::MarketCap => "market_cap",
            Strategy::RiskParity => "risk_parity",
            Strategy::MinVariance => "min_variance",
        };
        f.write_str(name)
    }
}

/// The optimization engine: owns the price history store, the snapshot TTL
/// cache and a handle to the market data provider.
///
/// Each request is stateless beyond those read-mostly caches, so a caller may
/// discard an in-flight result without side effects.
pub struct PortfolioOptimizer {
    provider: Arc<dyn MarketDataProvider>,
    history: RwLock<HistoryStore>,
    snapshots: SnapshotCache,
    config: OptimizerConfig,
    history_window: usize,
}

impl PortfolioOptimizer {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        config: OptimizerConfig,
        data_config: DataConfig,
    ) -> Self {
        Self {
            provider,
            history: RwLock::new(HistoryStore::new(data_config.history_window_days)),
            snapshots: SnapshotCache::new(Duration::seconds(data_config.snapshot_ttl_secs as i64)),
            config,
            history_window: data_config.history_window_days,
        }
    }

    /// Compute target weights for the universe under the given strategy,
    /// apply the configured weight bounds and price the result.
    ///
    /// An empty universe is a caller contract violation and fails fast; data
    /// problems for individual assets degrade per strategy instead.
    pub async fn optimize(
        &self,
        assets: &[String],
        current_weights: &Weights,
        strategy: Strategy,
    ) -> Result<OptimizationResult> {
        if assets.is_empty() {
            return Err(BotError::InvalidInput("asset universe is empty".to_string()));
        }

        let (stats, correlations, vols) = self.asset_stats(assets).await;

        let raw = match strategy {
            Strategy::EqualWeight => strategies::equal_weight(assets),
            Strategy::MarketCap => {
                let snapshots = self.collect_snapshots(assets).await;
                strategies::market_cap_weight(assets, &snapshots)
            }
            Strategy::RiskParity => strategies::inverse_volatility(assets, &vols),
            Strategy::MinVariance => self.min_variance_or_fallback(assets, &vols),
        };

        let bounds = WeightBounds {
            min_weight: self.config.min_weight,
            max_weight: self.config.max_weight,
        };
        let target_weights = project(&raw, &bounds);
        let metrics = portfolio_metrics(
            &stats,
            &correlations,
            &target_weights,
            self.config.risk_free_rate,
        );

        tracing::info!(
            %strategy,
            assets = assets.len(),
            expected_return = %metrics.expected_return,
            volatility = %metrics.volatility,
            sharpe = %metrics.sharpe_ratio,
            "optimization complete"
        );

        Ok(OptimizationResult {
            assets: assets.to_vec(),
            current_weights: current_weights.clone(),
            target_weights,
            metrics,
            last_updated: Utc::now(),
        })
    }

    /// Price an arbitrary weight vector over the universe (used to value the
    /// current portfolio before planning a rebalance).
    pub async fn evaluate(&self, assets: &[String], weights: &Weights) -> Result<PortfolioMetrics> {
        if assets.is_empty() {
            return Err(BotError::InvalidInput("asset universe is empty".to_string()));
        }
        let (stats, correlations, _) = self.asset_stats(assets).await;
        Ok(portfolio_metrics(
            &stats,
            &correlations,
            weights,
            self.config.risk_free_rate,
        ))
    }

    fn min_variance_or_fallback(&self, assets: &[String], vols: &HashMap<String, Decimal>) -> Weights {
        let aligned = self.history.read().aligned_closes(assets);
        let attempt = covariance_matrix(assets, &aligned)
            .map_err(OptimizeError::from)
            .and_then(|cov| strategies::min_variance(assets, &cov));

        match attempt {
            Ok(weights) => weights,
            Err(e) => {
                tracing::warn!("minimum variance degraded to risk parity: {e}");
                strategies::inverse_volatility(assets, vols)
            }
        }
    }

    /// Per-asset stats and the pairwise correlation matrix, loading price
    /// history through the provider as needed. Assets the provider cannot
    /// serve fall back to the default volatility and zero expected return.
    async fn asset_stats(
        &self,
        assets: &[String],
    ) -> (Vec<AssetStat>, Vec<Vec<Decimal>>, HashMap<String, Decimal>) {
        let mut loaded: HashMap<String, PriceSeries> = HashMap::with_capacity(assets.len());
        for symbol in assets {
            if let Some(series) = self.series(symbol).await {
                loaded.insert(symbol.clone(), series);
            }
        }

        let mut stats = Vec::with_capacity(assets.len());
        let mut vols = HashMap::with_capacity(assets.len());
        for symbol in assets {
            let (volatility, expected_return) = match loaded.get(symbol) {
                Some(series) => (
                    annualized_volatility(series, self.config.volatility_lookback_days),
                    annualized_return(series, self.config.volatility_lookback_days),
                ),
                None => {
                    tracing::warn!(symbol = %symbol, "no price history, using default volatility");
                    (DEFAULT_VOLATILITY, Decimal::ZERO)
                }
            };
            vols.insert(symbol.clone(), volatility);
            stats.push(AssetStat {
                symbol: symbol.clone(),
                expected_return,
                volatility,
            });
        }

        let n = assets.len();
        let mut correlations = vec![vec![Decimal::ZERO; n]; n];
        for i in 0..n {
            correlations[i][i] = Decimal::ONE;
            for j in (i + 1)..n {
                let corr = match (loaded.get(&assets[i]), loaded.get(&assets[j])) {
                    (Some(a), Some(b)) => {
                        correlation(a, b, self.config.correlation_lookback_days)
                    }
                    _ => Decimal::ZERO,
                };
                correlations[i][j] = corr;
                correlations[j][i] = corr;
            }
        }

        (stats, correlations, vols)
    }

    /// Cached price series, fetched from the provider on first use.
    async fn series(&self, symbol: &str) -> Option<PriceSeries> {
        {
            let history = self.history.read();
            if let Some(series) = history.series(symbol) {
                return Some(series.clone());
            }
        }

        match self.provider.price_series(symbol, self.history_window).await {
            Ok(series) => {
                self.history.write().insert_series(series.clone());
                Some(series)
            }
            Err(e) => {
                tracing::warn!(symbol, provider = self.provider.name(), "price series fetch failed: {e}");
                None
            }
        }
    }

    /// Cached snapshot, refetched when the TTL has lapsed. Last write wins on
    /// concurrent refreshes; values converge to the same upstream truth.
    async fn snapshot(&self, symbol: &str) -> Option<MarketSnapshot> {
        if let Some(snapshot) = self.snapshots.get(symbol) {
            return Some(snapshot);
        }

        match self.provider.market_snapshot(symbol).await {
            Ok(snapshot) => {
                self.snapshots.insert(snapshot.clone());
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(symbol, provider = self.provider.name(), "snapshot fetch failed: {e}");
                None
            }
        }
    }

    async fn collect_snapshots(&self, assets: &[String]) -> HashMap<String, MarketSnapshot> {
        let mut snapshots = HashMap::with_capacity(assets.len());
        for symbol in assets {
            if let Some(snapshot) = self.snapshot(symbol).await {
                snapshots.insert(symbol.clone(), snapshot);
            }
        }
        snapshots
    }
}
