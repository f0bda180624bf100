//! Core types shared across the bot

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tolerance used when checking that a weight vector sums to 1.
pub const WEIGHT_SUM_TOLERANCE: Decimal = dec!(0.0001);

/// Mapping from asset symbol to portfolio weight in [0, 1].
pub type Weights = HashMap<String, Decimal>;

/// Sum of all weights in the map.
pub fn weights_sum(weights: &Weights) -> Decimal {
    weights.values().copied().sum()
}

/// Scale weights in place so they sum to 1. A zero-sum map is left untouched.
pub fn normalize_weights(weights: &mut Weights) {
    let total = weights_sum(weights);
    if total.is_zero() {
        return;
    }
    for weight in weights.values_mut() {
        *weight /= total;
    }
}

/// A single OHLCV observation. Immutable once recorded.
///
/// `time` is a unix day (or generic period) index, not epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Ordered price history for one asset: ascending by time, unique timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series from unordered points; sorts ascending and drops
    /// duplicate timestamps (first occurrence wins).
    pub fn new(symbol: String, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.time);
        points.dedup_by_key(|p| p.time);
        Self { symbol, points }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// The last `n` points (all of them when the series is shorter).
    pub fn tail(&self, n: usize) -> &[PricePoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }

    /// A new series holding only the last `n` points.
    pub fn truncate_to(&self, n: usize) -> PriceSeries {
        PriceSeries {
            symbol: self.symbol.clone(),
            points: self.tail(n).to_vec(),
        }
    }

    /// Append a point; rejects out-of-order or duplicate timestamps.
    /// Returns whether the point was accepted.
    pub fn push(&mut self, point: PricePoint) -> bool {
        if let Some(last) = self.points.last() {
            if point.time <= last.time {
                return false;
            }
        }
        self.points.push(point);
        true
    }

    /// Drop oldest points until at most `window` remain.
    pub fn evict_to(&mut self, window: usize) {
        if self.points.len() > window {
            let excess = self.points.len() - window;
            self.points.drain(..excess);
        }
    }
}

/// Current market state for one asset, refreshed on a TTL basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub market_cap: Decimal,
    pub change_24h: Decimal,
    pub volume_24h: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Risk/return profile of one asset inside a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMetrics {
    pub weight: Decimal,
    pub expected_return: Decimal,
    pub volatility: Decimal,
}

/// Derived portfolio statistics. Recomputed on demand, never persisted
/// as authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub expected_return: Decimal,
    pub volatility: Decimal,
    pub sharpe_ratio: Decimal,
    pub per_asset: HashMap<String, AssetMetrics>,
}

/// A portfolio: universe, current weights and their metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub assets: Vec<String>,
    pub weights: Weights,
    pub metrics: PortfolioMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_weights: Option<Weights>,
}

/// A freshly computed allocation to compare the current portfolio against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub weights: Weights,
    pub metrics: PortfolioMetrics,
}

/// Result of a single optimization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub assets: Vec<String>,
    pub current_weights: Weights,
    pub target_weights: Weights,
    pub metrics: PortfolioMetrics,
    pub last_updated: DateTime<Utc>,
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// One rebalancing trade; `amount` is the absolute weight delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub action: TradeAction,
    pub amount: Decimal,
}

/// Expected improvement of the target allocation over the current one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementMetrics {
    pub return_improvement: Decimal,
    /// Old volatility minus new volatility; positive means less risk.
    pub risk_reduction: Decimal,
    pub sharpe_improvement: Decimal,
    pub is_improvement: bool,
}

/// Executable rebalancing plan with cost estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub trades: Vec<Trade>,
    pub total_buy: Decimal,
    pub total_sell: Decimal,
    pub net_flow: Decimal,
    pub transaction_cost: Decimal,
    pub slippage: Decimal,
    pub metrics: ImprovementMetrics,
    pub constraints_applied: bool,
}
