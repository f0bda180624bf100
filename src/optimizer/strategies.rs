//! Raw (pre-constraint) allocation strategies
//!
//! Four pure functions from market/statistical inputs to target weights.
//! Fallback wiring between them lives in the optimizer facade.

use super::OptimizeError;
use crate::solver;
use crate::stats::CovarianceMatrix;
use crate::types::{normalize_weights, MarketSnapshot, Weights};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::warn;

/// Volatilities are floored here before inversion.
const INVERSE_VOL_FLOOR: Decimal = dec!(0.0001);

/// `1/N` for every asset. Always succeeds.
pub fn equal_weight(assets: &[String]) -> Weights {
    if assets.is_empty() {
        return Weights::new();
    }
    let share = Decimal::ONE / Decimal::from(assets.len() as u64);
    assets.iter().map(|s| (s.clone(), share)).collect()
}

/// `cap[i] / Σ cap`. An asset without a snapshot stays in the output with
/// weight 0 rather than failing the computation or vanishing from the
/// universe.
pub fn market_cap_weight(
    assets: &[String],
    snapshots: &HashMap<String, MarketSnapshot>,
) -> Weights {
    let total: Decimal = assets
        .iter()
        .filter_map(|s| snapshots.get(s))
        .map(|snap| snap.market_cap.max(Decimal::ZERO))
        .sum();

    if total.is_zero() {
        warn!("no market caps available, market-cap weights are all zero");
        return assets.iter().map(|s| (s.clone(), Decimal::ZERO)).collect();
    }

    assets
        .iter()
        .map(|symbol| {
            let weight = snapshots
                .get(symbol)
                .map(|snap| snap.market_cap.max(Decimal::ZERO) / total)
                .unwrap_or(Decimal::ZERO);
            (symbol.clone(), weight)
        })
        .collect()
}

/// Risk parity: `(1/vol[i]) / Σ(1/vol[j])` with vols floored at 0.0001.
/// Guaranteed to succeed for any volatility estimates.
pub fn inverse_volatility(assets: &[String], vols: &HashMap<String, Decimal>) -> Weights {
    let inverses: Vec<Decimal> = assets
        .iter()
        .map(|symbol| {
            let vol = vols
                .get(symbol)
                .copied()
                .unwrap_or(INVERSE_VOL_FLOOR)
                .max(INVERSE_VOL_FLOOR);
            Decimal::ONE / vol
        })
        .collect();

    let total: Decimal = inverses.iter().copied().sum();
    assets
        .iter()
        .zip(inverses)
        .map(|(symbol, inv)| (symbol.clone(), inv / total))
        .collect()
}

/// Minimum variance: solve the augmented system
/// `[Σ, 1; 1ᵗ, 0] · [w; λ] = [0; 1]` (minimize wᵗΣw subject to Σw = 1),
/// then clamp to long-only and renormalize.
///
/// Errors (singular covariance, degenerate solution) are for the caller to
/// catch; the documented recovery is a risk-parity fallback.
pub fn min_variance(assets: &[String], cov: &CovarianceMatrix) -> Result<Weights, OptimizeError> {
    let n = assets.len();
    if n == 0 {
        return Err(OptimizeError::EmptyUniverse);
    }
    if n == 1 {
        return Ok(HashMap::from([(assets[0].clone(), Decimal::ONE)]));
    }

    let size = n + 1;
    let mut a = vec![vec![Decimal::ZERO; size]; size];
    for i in 0..n {
        for j in 0..n {
            a[i][j] = cov.get(i, j);
        }
        a[i][n] = Decimal::ONE;
        a[n][i] = Decimal::ONE;
    }
    let mut b = vec![Decimal::ZERO; size];
    b[n] = Decimal::ONE;

    let solution = solver::solve(&a, &b)?;

    // Long-only via post-hoc clamping; the last entry is the multiplier λ.
    let mut weights: Weights = assets
        .iter()
        .enumerate()
        .map(|(i, symbol)| (symbol.clone(), solution[i].max(Decimal::ZERO)))
        .collect();

    if crate::types::weights_sum(&weights).is_zero() {
        return Err(OptimizeError::Degenerate);
    }
    normalize_weights(&mut weights);
    Ok(weights)
}
