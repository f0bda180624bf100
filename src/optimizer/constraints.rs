//! Per-asset weight bound enforcement

use crate::types::Weights;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Allocation bounds applied to every asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min_weight: Decimal,
    pub max_weight: Decimal,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self {
            min_weight: dec!(0.01),
            max_weight: dec!(0.50),
        }
    }
}

/// Clamp weights into `[min_weight, max_weight]` and redistribute the
/// freed/borrowed mass over the assets still strictly inside their bounds.
///
/// Single pass: assets pinned to a bound keep it, and the flexible remainder
/// is scaled by `remaining / sum_of_flexible`. If the redistribution pushes a
/// previously flexible asset outside its bound, or the bounds are infeasible
/// (e.g. N × min_weight > 1), the overshoot is returned as-is; callers that
/// need an exact unit sum must renormalize downstream.
pub fn project(weights: &Weights, bounds: &WeightBounds) -> Weights {
    let mut projected = Weights::with_capacity(weights.len());
    let mut flexible: Vec<&String> = Vec::new();
    let mut pinned_total = Decimal::ZERO;
    let mut flexible_total = Decimal::ZERO;

    for (symbol, &raw) in weights {
        let clamped = raw.clamp(bounds.min_weight, bounds.max_weight);
        if raw > bounds.min_weight && raw < bounds.max_weight {
            flexible.push(symbol);
            flexible_total += clamped;
        } else {
            pinned_total += clamped;
        }
        projected.insert(symbol.clone(), clamped);
    }

    if !flexible.is_empty() && !flexible_total.is_zero() {
        let remaining = Decimal::ONE - pinned_total;
        let scale = remaining / flexible_total;
        for symbol in flexible {
            if let Some(weight) = projected.get_mut(symbol) {
                *weight *= scale;
            }
        }
    }

    projected
}
