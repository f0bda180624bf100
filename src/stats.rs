//! Return, volatility, correlation and covariance estimation
//!
//! Every estimator here fails soft on thin data: volatility falls back to a
//! documented default, correlation reports "no information" as zero, and only
//! the covariance matrix returns an error (its caller is required to degrade
//! to an allocation that does not need it). None of these paths panic.

use crate::types::{PricePoint, PriceSeries};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

/// Crypto trades every day of the year.
pub const TRADING_DAYS_PER_YEAR: u32 = 365;

/// Volatility assumed when a series is too short to estimate one (30%).
pub const DEFAULT_VOLATILITY: Decimal = dec!(0.30);

/// Floor applied before dividing by a volatility estimate.
pub const VOLATILITY_FLOOR: Decimal = dec!(0.0001);

/// Minimum number of aligned return rows for a usable covariance matrix.
pub const MIN_COVARIANCE_ROWS: usize = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("insufficient aligned history: need {required} return rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },
}

/// Period-over-period simple returns `(p[i] - p[i-1]) / p[i-1]`.
///
/// Lazy and restartable; observations with a zero previous close are skipped.
pub fn simple_returns(points: &[PricePoint]) -> impl Iterator<Item = Decimal> + '_ {
    points.windows(2).filter_map(|w| {
        if w[0].close.is_zero() {
            None
        } else {
            Some((w[1].close - w[0].close) / w[0].close)
        }
    })
}

/// Annualized volatility: sample std-dev of daily returns over the lookback,
/// scaled by sqrt(365).
///
/// With fewer than two returns this cannot be estimated; rather than failing
/// the optimization it reports [`DEFAULT_VOLATILITY`] and logs a data-quality
/// warning.
pub fn annualized_volatility(series: &PriceSeries, lookback_days: usize) -> Decimal {
    let tail = series.tail(lookback_days + 1);
    let returns: Vec<Decimal> = simple_returns(tail).collect();
    if returns.len() < 2 {
        warn!(
            symbol = %series.symbol,
            points = series.len(),
            "insufficient history for volatility estimate, using default"
        );
        return DEFAULT_VOLATILITY;
    }
    sample_std(&returns) * annualization_factor()
}

/// Annualized expected return: mean daily return over the lookback × 365.
/// Zero when no return can be computed.
pub fn annualized_return(series: &PriceSeries, lookback_days: usize) -> Decimal {
    let tail = series.tail(lookback_days + 1);
    let returns: Vec<Decimal> = simple_returns(tail).collect();
    if returns.is_empty() {
        debug!(symbol = %series.symbol, "insufficient history for return estimate");
        return Decimal::ZERO;
    }
    mean(&returns) * Decimal::from(TRADING_DAYS_PER_YEAR)
}

/// Pearson correlation of daily returns over timestamp-aligned closes.
///
/// Returns 0 ("no information") when fewer than two aligned returns exist or
/// either side has zero variance.
pub fn correlation(a: &PriceSeries, b: &PriceSeries, lookback_days: usize) -> Decimal {
    let closes_a: BTreeMap<i64, Decimal> = a.points().iter().map(|p| (p.time, p.close)).collect();
    let closes_b: BTreeMap<i64, Decimal> = b.points().iter().map(|p| (p.time, p.close)).collect();

    let mut shared: Vec<(Decimal, Decimal)> = closes_a
        .iter()
        .filter_map(|(time, &ca)| closes_b.get(time).map(|&cb| (ca, cb)))
        .collect();
    let start = shared.len().saturating_sub(lookback_days + 1);
    shared.drain(..start);

    let returns_a = pair_returns(&shared, |p| p.0);
    let returns_b = pair_returns(&shared, |p| p.1);
    let n = returns_a.len().min(returns_b.len());
    if n < 2 {
        return Decimal::ZERO;
    }
    let returns_a = &returns_a[..n];
    let returns_b = &returns_b[..n];

    let mean_a = mean(returns_a);
    let mean_b = mean(returns_b);
    let mut cov = Decimal::ZERO;
    let mut var_a = Decimal::ZERO;
    let mut var_b = Decimal::ZERO;
    for i in 0..n {
        let da = returns_a[i] - mean_a;
        let db = returns_b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a.is_zero() || var_b.is_zero() {
        return Decimal::ZERO;
    }
    cov / (decimal_sqrt(var_a) * decimal_sqrt(var_b))
}

/// Square, symmetric covariance matrix over a fixed symbol ordering.
/// Entry (i, j) is the sample covariance of daily returns; the diagonal
/// holds variances.
#[derive(Debug, Clone)]
pub struct CovarianceMatrix {
    symbols: Vec<String>,
    entries: Vec<Vec<Decimal>>,
}

impl CovarianceMatrix {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn get(&self, i: usize, j: usize) -> Decimal {
        self.entries[i][j]
    }

    pub fn variance(&self, i: usize) -> Decimal {
        self.entries[i][i]
    }

    /// Build directly from entries; tests construct exact matrices.
    #[cfg(test)]
    pub(crate) fn from_entries(symbols: Vec<String>, entries: Vec<Vec<Decimal>>) -> Self {
        Self { symbols, entries }
    }
}

/// Sample covariance matrix from pre-aligned close rows (one map per date,
/// ascending). Each pair is computed once and mirrored so the matrix stays
/// symmetric by construction. Uses the (n−1) denominator.
///
/// Requires [`MIN_COVARIANCE_ROWS`] return rows; below that the estimate is
/// too unstable to feed a solver and the caller must fall back.
pub fn covariance_matrix(
    symbols: &[String],
    aligned: &[HashMap<String, Decimal>],
) -> Result<CovarianceMatrix, StatsError> {
    let n = symbols.len();

    // Difference aligned rows into per-date return rows. A row is dropped
    // whole when any symbol is missing or has a zero previous close, so the
    // columns stay aligned.
    let mut returns: Vec<Vec<Decimal>> = Vec::with_capacity(aligned.len().saturating_sub(1));
    for w in aligned.windows(2) {
        let mut row = Vec::with_capacity(n);
        let mut complete = true;
        for symbol in symbols {
            match (w[0].get(symbol), w[1].get(symbol)) {
                (Some(prev), Some(curr)) if !prev.is_zero() => row.push((curr - prev) / prev),
                _ => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            returns.push(row);
        }
    }

    let rows = returns.len();
    if rows < MIN_COVARIANCE_ROWS {
        return Err(StatsError::InsufficientData {
            required: MIN_COVARIANCE_ROWS,
            actual: rows,
        });
    }

    let row_count = Decimal::from(rows as u64);
    let mut means = vec![Decimal::ZERO; n];
    for row in &returns {
        for (j, ret) in row.iter().enumerate() {
            means[j] += *ret;
        }
    }
    for m in &mut means {
        *m /= row_count;
    }

    let divisor = Decimal::from((rows - 1) as u64);
    let mut entries = vec![vec![Decimal::ZERO; n]; n];
    for i in 0..n {
        for j in i..n {
            let mut cov = Decimal::ZERO;
            for row in &returns {
                cov += (row[i] - means[i]) * (row[j] - means[j]);
            }
            cov /= divisor;
            entries[i][j] = cov;
            entries[j][i] = cov;
        }
    }

    Ok(CovarianceMatrix {
        symbols: symbols.to_vec(),
        entries,
    })
}

pub(crate) fn decimal_sqrt(value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    value.sqrt().unwrap_or(Decimal::ZERO)
}

fn annualization_factor() -> Decimal {
    decimal_sqrt(Decimal::from(TRADING_DAYS_PER_YEAR))
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64)
}

/// Sample standard deviation with the (n−1) denominator.
fn sample_std(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }
    let m = mean(values);
    let sum_sq: Decimal = values.iter().map(|v| (*v - m) * (*v - m)).sum();
    decimal_sqrt(sum_sq / Decimal::from((values.len() - 1) as u64))
}

fn pair_returns<F>(pairs: &[(Decimal, Decimal)], pick: F) -> Vec<Decimal>
where
    F: Fn(&(Decimal, Decimal)) -> Decimal,
{
    pairs
        .windows(2)
        .filter_map(|w| {
            let prev = pick(&w[0]);
            let curr = pick(&w[1]);
            if prev.is_zero() {
                None
            } else {
                Some((curr - prev) / prev)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{alternating_closes, drifting_closes, series_from_closes};

    #[test]
    fn test_simple_returns() {
        let series = series_from_closes("BTC", &[dec!(100), dec!(110), dec!(99)]);
        let returns: Vec<Decimal> = simple_returns(series.points()).collect();
        assert_eq!(returns, vec![dec!(0.1), dec!(-0.1)]);
    }

    #[test]
    fn test_simple_returns_skip_zero_close() {
        let series = series_from_closes("BTC", &[dec!(100), dec!(0), dec!(50)]);
        let returns: Vec<Decimal> = simple_returns(series.points()).collect();
        // 100 -> 0 is -100%; 0 -> 50 is undefined and skipped
        assert_eq!(returns, vec![dec!(-1)]);
    }

    #[test]
    fn test_volatility_default_on_thin_series() {
        let series = series_from_closes("BTC", &[dec!(100)]);
        assert_eq!(annualized_volatility(&series, 30), DEFAULT_VOLATILITY);

        let series = series_from_closes("BTC", &[dec!(100), dec!(101)]);
        // one return is still not enough for a sample std-dev
        assert_eq!(annualized_volatility(&series, 30), DEFAULT_VOLATILITY);
    }

    #[test]
    fn test_volatility_of_flat_series_is_zero() {
        let series = series_from_closes("USDC", &[dec!(1); 40]);
        assert_eq!(annualized_volatility(&series, 30), Decimal::ZERO);
    }

    #[test]
    fn test_volatility_scales_with_amplitude() {
        let calm = series_from_closes("A", &alternating_closes(dec!(100), dec!(1), 40));
        let wild = series_from_closes("B", &alternating_closes(dec!(100), dec!(10), 40));
        assert!(annualized_volatility(&wild, 30) > annualized_volatility(&calm, 30));
    }

    #[test]
    fn test_annualized_return_of_drifting_series() {
        let series = series_from_closes("BTC", &drifting_closes(dec!(100), dec!(1), 31));
        let ret = annualized_return(&series, 30);
        assert!(ret > Decimal::ZERO);
    }

    #[test]
    fn test_self_correlation_is_one() {
        let series = series_from_closes("BTC", &alternating_closes(dec!(100), dec!(5), 60));
        let corr = correlation(&series, &series, 90);
        assert!((corr - Decimal::ONE).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_correlation_is_symmetric() {
        let a = series_from_closes("BTC", &alternating_closes(dec!(100), dec!(5), 60));
        let b = series_from_closes("ETH", &drifting_closes(dec!(50), dec!(2), 60));
        assert_eq!(correlation(&a, &b, 90), correlation(&b, &a, 90));
    }

    #[test]
    fn test_correlation_no_overlap_is_zero() {
        let a = series_from_closes("BTC", &alternating_closes(dec!(100), dec!(5), 30));
        let mut points = Vec::new();
        for (i, close) in alternating_closes(dec!(50), dec!(2), 30).iter().enumerate() {
            points.push(PricePoint {
                time: 1000 + i as i64,
                open: *close,
                high: *close,
                low: *close,
                close: *close,
                volume: Decimal::ZERO,
            });
        }
        let b = PriceSeries::new("ETH".to_string(), points);
        assert_eq!(correlation(&a, &b, 90), Decimal::ZERO);
    }

    #[test]
    fn test_correlation_zero_variance_is_zero() {
        let a = series_from_closes("USDC", &[dec!(1); 40]);
        let b = series_from_closes("BTC", &alternating_closes(dec!(100), dec!(5), 40));
        assert_eq!(correlation(&a, &b, 90), Decimal::ZERO);
    }

    fn aligned_rows(closes: &[(Decimal, Decimal)]) -> Vec<HashMap<String, Decimal>> {
        closes
            .iter()
            .map(|(a, b)| {
                HashMap::from([("A".to_string(), *a), ("B".to_string(), *b)])
            })
            .collect()
    }

    #[test]
    fn test_covariance_matrix_symmetric() {
        let symbols = vec!["A".to_string(), "B".to_string()];
        let rows: Vec<(Decimal, Decimal)> = alternating_closes(dec!(100), dec!(5), 40)
            .into_iter()
            .zip(drifting_closes(dec!(50), dec!(1), 40))
            .collect();
        let cov = covariance_matrix(&symbols, &aligned_rows(&rows)).unwrap();
        assert_eq!(cov.len(), 2);
        assert_eq!(cov.get(0, 1), cov.get(1, 0));
        assert!(cov.variance(0) > Decimal::ZERO);
    }

    #[test]
    fn test_covariance_matrix_insufficient_rows() {
        let symbols = vec!["A".to_string(), "B".to_string()];
        let rows: Vec<(Decimal, Decimal)> = alternating_closes(dec!(100), dec!(5), 10)
            .into_iter()
            .zip(drifting_closes(dec!(50), dec!(1), 10))
            .collect();
        let err = covariance_matrix(&symbols, &aligned_rows(&rows)).unwrap_err();
        assert_eq!(
            err,
            StatsError::InsufficientData {
                required: MIN_COVARIANCE_ROWS,
                actual: 9,
            }
        );
    }
}
