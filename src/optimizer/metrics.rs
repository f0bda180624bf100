//! Portfolio-level risk/return metrics

use crate::stats::{decimal_sqrt, VOLATILITY_FLOOR};
use crate::types::{AssetMetrics, PortfolioMetrics, Weights};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Per-asset inputs to the metrics calculation, in universe order.
#[derive(Debug, Clone)]
pub struct AssetStat {
    pub symbol: String,
    pub expected_return: Decimal,
    pub volatility: Decimal,
}

/// Assemble expected return, volatility and Sharpe ratio for a weighted
/// portfolio.
///
/// `correlations` is indexed like `stats` (correlations[i][j] between asset i
/// and j). Variance is the two-term expansion
/// `Σ wᵢ²σᵢ² + 2·Σ_{i<j} wᵢwⱼσᵢσⱼρᵢⱼ`; the Sharpe denominator is floored to
/// avoid dividing by a zero volatility.
pub fn portfolio_metrics(
    stats: &[AssetStat],
    correlations: &[Vec<Decimal>],
    weights: &Weights,
    risk_free_rate: Decimal,
) -> PortfolioMetrics {
    let mut expected_return = Decimal::ZERO;
    let mut variance = Decimal::ZERO;
    let mut per_asset = HashMap::with_capacity(stats.len());

    for (i, stat) in stats.iter().enumerate() {
        let wi = weights.get(&stat.symbol).copied().unwrap_or(Decimal::ZERO);
        expected_return += wi * stat.expected_return;
        variance += wi * wi * stat.volatility * stat.volatility;

        for (j, other) in stats.iter().enumerate().skip(i + 1) {
            let wj = weights.get(&other.symbol).copied().unwrap_or(Decimal::ZERO);
            variance +=
                dec!(2) * wi * wj * stat.volatility * other.volatility * correlations[i][j];
        }

        per_asset.insert(
            stat.symbol.clone(),
            AssetMetrics {
                weight: wi,
                expected_return: stat.expected_return,
                volatility: stat.volatility,
            },
        );
    }

    let volatility = decimal_sqrt(variance);
    let sharpe_ratio = (expected_return - risk_free_rate) / volatility.max(VOLATILITY_FLOOR);

    PortfolioMetrics {
        expected_return,
        volatility,
        sharpe_ratio,
        per_asset,
    }
}
