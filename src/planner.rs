//! Rebalance decision and plan construction
//!
//! Compares the current portfolio to a freshly computed target, decides
//! whether rebalancing is warranted under the configured thresholds, and
//! emits a trade list with cost, slippage and turnover estimates.

use crate::config::RebalanceConfig;
use crate::optimizer::{project, WeightBounds};
use crate::types::{
    ImprovementMetrics, Portfolio, RebalancePlan, TargetAllocation, Trade, TradeAction, Weights,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Trades above this fraction of notional weight get their slippage scaled up.
const LARGE_TRADE_THRESHOLD: Decimal = dec!(0.1);

/// Optional per-plan overrides supplied by the caller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlanConstraints {
    /// Overrides the configured noise floor for trade sizes.
    pub min_trade_size: Option<Decimal>,
    /// Re-projects target weights under this cap before planning.
    pub max_position_size: Option<Decimal>,
}

/// Outcome of the needs-rebalance test, with the quantities that drove it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceCheck {
    pub needs_rebalance: bool,
    pub max_deviation: Decimal,
    pub sharpe_improvement: Decimal,
    pub deviation_trigger: bool,
    pub sharpe_trigger: bool,
    pub correlation_stable: bool,
}

/// True when the maximum per-asset deviation or the Sharpe improvement
/// crosses its threshold, gated by the correlation-stability check.
pub fn needs_rebalancing(
    portfolio: &Portfolio,
    target: &TargetAllocation,
    config: &RebalanceConfig,
) -> RebalanceCheck {
    let max_deviation = symbols_of(&portfolio.weights, &target.weights)
        .into_iter()
        .map(|symbol| weight_diff(&portfolio.weights, &target.weights, symbol).abs())
        .max()
        .unwrap_or(Decimal::ZERO);

    let sharpe_improvement = target.metrics.sharpe_ratio - portfolio.metrics.sharpe_ratio;

    let deviation_trigger = max_deviation >= config.deviation_threshold;
    let sharpe_trigger = sharpe_improvement >= config.sharpe_improvement_threshold;
    let correlation_stable = correlation_stability_check(portfolio, target);

    RebalanceCheck {
        needs_rebalance: (deviation_trigger || sharpe_trigger) && correlation_stable,
        max_deviation,
        sharpe_improvement,
        deviation_trigger,
        sharpe_trigger,
        correlation_stable,
    }
}

/// Build the executable plan: one trade per asset whose weight delta clears
/// the noise floor, ordered so the most consequential trades execute first.
pub fn generate_rebalancing_plan(
    portfolio: &Portfolio,
    target: &TargetAllocation,
    constraints: Option<&PlanConstraints>,
    config: &RebalanceConfig,
) -> RebalancePlan {
    let mut target_weights = target.weights.clone();
    let mut constraints_applied = false;

    if let Some(c) = constraints {
        if let Some(max) = c.max_position_size {
            target_weights = project(
                &target_weights,
                &WeightBounds {
                    min_weight: Decimal::ZERO,
                    max_weight: max,
                },
            );
            constraints_applied = true;
        }
        if c.min_trade_size.is_some() {
            constraints_applied = true;
        }
    }
    let min_trade_size = constraints
        .and_then(|c| c.min_trade_size)
        .unwrap_or(config.min_trade_size);

    let mut trades = Vec::new();
    let mut total_buy = Decimal::ZERO;
    let mut total_sell = Decimal::ZERO;

    for symbol in symbols_of(&portfolio.weights, &target_weights) {
        let diff = weight_diff(&portfolio.weights, &target_weights, symbol);
        let amount = diff.abs();
        if amount < min_trade_size {
            continue;
        }
        let action = if diff > Decimal::ZERO {
            total_buy += amount;
            TradeAction::Buy
        } else {
            total_sell += amount;
            TradeAction::Sell
        };
        trades.push(Trade {
            symbol: symbol.clone(),
            action,
            amount,
        });
    }
    trades.sort_by(|a, b| b.amount.cmp(&a.amount));

    let transaction_cost: Decimal = trades
        .iter()
        .map(|t| t.amount * config.base_fee_rate)
        .sum();
    let slippage: Decimal = trades
        .iter()
        .map(|t| estimate_slippage(t.amount, config.base_slippage))
        .sum();

    let sharpe_improvement = target.metrics.sharpe_ratio - portfolio.metrics.sharpe_ratio;
    let metrics = ImprovementMetrics {
        return_improvement: target.metrics.expected_return - portfolio.metrics.expected_return,
        risk_reduction: portfolio.metrics.volatility - target.metrics.volatility,
        sharpe_improvement,
        is_improvement: sharpe_improvement > Decimal::ZERO,
    };

    RebalancePlan {
        net_flow: total_buy - total_sell,
        trades,
        total_buy,
        total_sell,
        transaction_cost,
        slippage,
        metrics,
        constraints_applied,
    }
}

/// Half the total absolute weight change between two allocations.
pub fn turnover(a: &Weights, b: &Weights) -> Decimal {
    let total: Decimal = symbols_of(a, b)
        .into_iter()
        .map(|symbol| weight_diff(a, b, symbol).abs())
        .sum();
    total / dec!(2)
}

/// Slippage scales up for trades representing a large share of notional
/// weight, capped at double the base rate.
fn estimate_slippage(amount: Decimal, base_slippage: Decimal) -> Decimal {
    let scale = (amount / LARGE_TRADE_THRESHOLD).min(Decimal::ONE);
    amount * base_slippage * (Decimal::ONE + scale)
}

// TODO: wire a real correlation-drift detector; the check currently always
// passes.
fn correlation_stability_check(_portfolio: &Portfolio, _target: &TargetAllocation) -> bool {
    true
}

fn symbols_of<'a>(a: &'a Weights, b: &'a Weights) -> BTreeSet<&'a String> {
    a.keys().chain(b.keys()).collect()
}

fn weight_diff(current: &Weights, target: &Weights, symbol: &String) -> Decimal {
    let from = current.get(symbol).copied().unwrap_or(Decimal::ZERO);
    let to = target.get(symbol).copied().unwrap_or(Decimal::ZERO);
    to - from
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetMetrics, PortfolioMetrics};
    use std::collections::HashMap;

    fn weights(entries: &[(&str, Decimal)]) -> Weights {
        entries.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    fn metrics(expected_return: Decimal, volatility: Decimal, sharpe: Decimal) -> PortfolioMetrics {
        PortfolioMetrics {
            expected_return,
            volatility,
            sharpe_ratio: sharpe,
            per_asset: HashMap::<String, AssetMetrics>::new(),
        }
    }

    fn portfolio(w: Weights, m: PortfolioMetrics) -> Portfolio {
        Portfolio {
            assets: w.keys().cloned().collect(),
            weights: w,
            metrics: m,
            previous_weights: None,
        }
    }

    #[test]
    fn test_no_rebalance_when_target_equals_current() {
        let w = weights(&[("BTC", dec!(0.5)), ("ETH", dec!(0.5))]);
        let m = metrics(dec!(0.10), dec!(0.30), dec!(0.27));
        let current = portfolio(w.clone(), m.clone());
        let target = TargetAllocation {
            weights: w,
            metrics: m,
        };

        let check = needs_rebalancing(&current, &target, &RebalanceConfig::default());
        assert!(!check.needs_rebalance);
        assert_eq!(check.max_deviation, Decimal::ZERO);
        assert_eq!(check.sharpe_improvement, Decimal::ZERO);
    }

    #[test]
    fn test_rebalance_on_deviation() {
        let current = portfolio(
            weights(&[("BTC", dec!(0.60)), ("ETH", dec!(0.40))]),
            metrics(dec!(0.10), dec!(0.30), dec!(0.27)),
        );
        let target = TargetAllocation {
            weights: weights(&[("BTC", dec!(0.50)), ("ETH", dec!(0.50))]),
            metrics: metrics(dec!(0.10), dec!(0.30), dec!(0.27)),
        };

        let check = needs_rebalancing(&current, &target, &RebalanceConfig::default());
        assert!(check.needs_rebalance);
        assert!(check.deviation_trigger);
        assert!(!check.sharpe_trigger);
        assert_eq!(check.max_deviation, dec!(0.10));
    }

    #[test]
    fn test_rebalance_on_sharpe_improvement_alone() {
        let current = portfolio(
            weights(&[("BTC", dec!(0.50)), ("ETH", dec!(0.50))]),
            metrics(dec!(0.10), dec!(0.30), dec!(0.20)),
        );
        // Deviation below threshold, Sharpe gain above it.
        let target = TargetAllocation {
            weights: weights(&[("BTC", dec!(0.52)), ("ETH", dec!(0.48))]),
            metrics: metrics(dec!(0.12), dec!(0.28), dec!(0.36)),
        };

        let check = needs_rebalancing(&current, &target, &RebalanceConfig::default());
        assert!(check.needs_rebalance);
        assert!(!check.deviation_trigger);
        assert!(check.sharpe_trigger);
    }

    #[test]
    fn test_plan_trade_ordering_and_totals() {
        let current = portfolio(
            weights(&[("BTC", dec!(0.5)), ("ETH", dec!(0.3)), ("USDC", dec!(0.2))]),
            metrics(dec!(0.10), dec!(0.35), dec!(0.23)),
        );
        let target = TargetAllocation {
            weights: weights(&[("BTC", dec!(0.3)), ("ETH", dec!(0.4)), ("USDC", dec!(0.3))]),
            metrics: metrics(dec!(0.09), dec!(0.28), dec!(0.25)),
        };

        let plan = generate_rebalancing_plan(&current, &target, None, &RebalanceConfig::default());

        assert_eq!(plan.trades.len(), 3);
        // Largest delta first.
        assert_eq!(plan.trades[0].symbol, "BTC");
        assert_eq!(plan.trades[0].action, TradeAction::Sell);
        assert_eq!(plan.trades[0].amount, dec!(0.2));
        for trade in &plan.trades[1..] {
            assert_eq!(trade.action, TradeAction::Buy);
            assert_eq!(trade.amount, dec!(0.1));
        }
        assert_eq!(plan.total_buy, dec!(0.2));
        assert_eq!(plan.total_sell, dec!(0.2));
        assert_eq!(plan.net_flow, Decimal::ZERO);
        assert!(!plan.constraints_applied);
        assert!(plan.metrics.is_improvement);
        assert_eq!(plan.metrics.risk_reduction, dec!(0.07));
    }

    #[test]
    fn test_plan_ignores_noise_diffs() {
        let current = portfolio(
            weights(&[("BTC", dec!(0.5000)), ("ETH", dec!(0.5000))]),
            metrics(dec!(0.10), dec!(0.30), dec!(0.27)),
        );
        let target = TargetAllocation {
            weights: weights(&[("BTC", dec!(0.5005)), ("ETH", dec!(0.4995))]),
            metrics: metrics(dec!(0.10), dec!(0.30), dec!(0.27)),
        };

        let plan = generate_rebalancing_plan(&current, &target, None, &RebalanceConfig::default());
        assert!(plan.trades.is_empty());
        assert_eq!(plan.transaction_cost, Decimal::ZERO);
    }

    #[test]
    fn test_plan_cost_and_slippage() {
        let config = RebalanceConfig::default();
        let current = portfolio(
            weights(&[("BTC", dec!(0.70)), ("ETH", dec!(0.30))]),
            metrics(dec!(0.10), dec!(0.40), dec!(0.20)),
        );
        let target = TargetAllocation {
            weights: weights(&[("BTC", dec!(0.50)), ("ETH", dec!(0.50))]),
            metrics: metrics(dec!(0.10), dec!(0.32), dec!(0.25)),
        };

        let plan = generate_rebalancing_plan(&current, &target, None, &config);

        // Two trades of 0.2 each: cost = 0.4 * 0.001.
        assert_eq!(plan.transaction_cost, dec!(0.0004));
        // Both trades are >= 10% of notional, so slippage doubles:
        // 2 * (0.2 * 0.0005 * 2) = 0.0004.
        assert_eq!(plan.slippage, dec!(0.0004));
    }

    #[test]
    fn test_plan_small_trade_slippage_scales_down() {
        let config = RebalanceConfig::default();
        // 2% trade: scale factor 1 + 0.02/0.1 = 1.2.
        assert_eq!(
            super::estimate_slippage(dec!(0.02), config.base_slippage),
            dec!(0.02) * dec!(0.0005) * dec!(1.2)
        );
    }

    #[test]
    fn test_plan_max_position_constraint() {
        let current = portfolio(
            weights(&[("BTC", dec!(0.40)), ("ETH", dec!(0.60))]),
            metrics(dec!(0.10), dec!(0.35), dec!(0.23)),
        );
        let target = TargetAllocation {
            weights: weights(&[("BTC", dec!(0.70)), ("ETH", dec!(0.30))]),
            metrics: metrics(dec!(0.12), dec!(0.30), dec!(0.33)),
        };
        let constraints = PlanConstraints {
            min_trade_size: None,
            max_position_size: Some(dec!(0.50)),
        };

        let plan = generate_rebalancing_plan(
            &current,
            &target,
            Some(&constraints),
            &RebalanceConfig::default(),
        );

        assert!(plan.constraints_applied);
        // BTC capped to 0.50, ETH takes the remainder: 0.40 -> 0.50 buy of 0.10.
        let btc = plan.trades.iter().find(|t| t.symbol == "BTC").unwrap();
        assert_eq!(btc.action, TradeAction::Buy);
        assert_eq!(btc.amount, dec!(0.10));
    }

    #[test]
    fn test_turnover() {
        let a = weights(&[("BTC", dec!(0.5)), ("ETH", dec!(0.3)), ("USDC", dec!(0.2))]);
        let b = weights(&[("BTC", dec!(0.3)), ("ETH", dec!(0.4)), ("USDC", dec!(0.3))]);
        assert_eq!(turnover(&a, &b), dec!(0.2));
        assert_eq!(turnover(&a, &a), Decimal::ZERO);
        // Symmetric.
        assert_eq!(turnover(&a, &b), turnover(&b, &a));
    }

    #[test]
    fn test_turnover_disjoint_universes() {
        let a = weights(&[("BTC", dec!(1))]);
        let b = weights(&[("ETH", dec!(1))]);
        assert_eq!(turnover(&a, &b), Decimal::ONE);
    }
}
