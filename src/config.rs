//! Configuration loading
//!
//! Layered: defaults, then an optional TOML file, then environment variables
//! with the `REBALANCER__` prefix (e.g. `REBALANCER__OPTIMIZER__MAX_WEIGHT`).

use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = shellexpand::tilde(path);
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("REBALANCER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Data ingestion and caching.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// JSON file with per-asset OHLCV history.
    pub history_path: String,
    /// JSON file with current market snapshots.
    pub snapshots_path: String,
    /// Points retained per asset in the history store.
    pub history_window_days: usize,
    /// Snapshot time-to-live before a refetch.
    pub snapshot_ttl_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            history_path: "data/history.json".to_string(),
            snapshots_path: "data/snapshots.json".to_string(),
            history_window_days: 365,
            snapshot_ttl_secs: 300,
        }
    }
}

/// Optimization engine parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Per-asset weight floor after constraint projection.
    pub min_weight: Decimal,
    /// Per-asset weight cap after constraint projection.
    pub max_weight: Decimal,
    /// Annual risk-free rate used in Sharpe ratios.
    pub risk_free_rate: Decimal,
    pub volatility_lookback_days: usize,
    pub correlation_lookback_days: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_weight: dec!(0.01),
            max_weight: dec!(0.50),
            risk_free_rate: dec!(0.02),
            volatility_lookback_days: 30,
            correlation_lookback_days: 90,
        }
    }
}

/// Rebalance decision thresholds and cost model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Maximum per-asset weight deviation tolerated before rebalancing.
    pub deviation_threshold: Decimal,
    /// Sharpe-ratio gain that justifies rebalancing on its own.
    pub sharpe_improvement_threshold: Decimal,
    /// Weight deltas below this are ignored as noise.
    pub min_trade_size: Decimal,
    /// Fee per unit of traded weight.
    pub base_fee_rate: Decimal,
    /// Baseline slippage per unit of traded weight.
    pub base_slippage: Decimal,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            deviation_threshold: dec!(0.05),
            sharpe_improvement_threshold: dec!(0.1),
            min_trade_size: dec!(0.001),
            base_fee_rate: dec!(0.001),
            base_slippage: dec!(0.0005),
        }
    }
}
