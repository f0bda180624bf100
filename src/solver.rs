//! Dense linear system solver
//!
//! Gaussian elimination with partial pivoting: before eliminating a column,
//! the row with the largest absolute value in that column is swapped into the
//! pivot position to bound numerical error.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("matrix is singular at pivot column {column}")]
    Singular { column: usize },

    #[error("dimension mismatch: matrix is {rows}x{cols}, vector has {vector_len} entries")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        vector_len: usize,
    },
}

/// Solve `A·x = b` for a square `A`.
///
/// A pivot that is exactly zero after searching all rows below means the
/// matrix is singular; that is reported as an error, never divided by.
pub fn solve(a: &[Vec<Decimal>], b: &[Decimal]) -> Result<Vec<Decimal>, SolverError> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(SolverError::DimensionMismatch {
            rows: n,
            cols: a.first().map(|row| row.len()).unwrap_or(0),
            vector_len: b.len(),
        });
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    // Work on an augmented copy [A | b].
    let mut aug: Vec<Vec<Decimal>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(*rhs);
            r
        })
        .collect();

    // Forward elimination.
    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let candidate = aug[row][col].abs();
            if candidate > pivot_val {
                pivot_val = candidate;
                pivot_row = row;
            }
        }
        if pivot_val.is_zero() {
            return Err(SolverError::Singular { column: col });
        }
        if pivot_row != col {
            aug.swap(col, pivot_row);
        }

        let pivot = aug[col][col];
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot;
            if factor.is_zero() {
                continue;
            }
            for k in col..=n {
                let delta = factor * aug[col][k];
                aug[row][k] -= delta;
            }
        }
    }

    // Back substitution.
    let mut x = vec![Decimal::ZERO; n];
    for col in (0..n).rev() {
        let mut acc = aug[col][n];
        for k in (col + 1)..n {
            acc -= aug[col][k] * x[k];
        }
        x[col] = acc / aug[col][col];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_solve_identity() {
        let a = vec![
            vec![dec!(1), dec!(0)],
            vec![dec!(0), dec!(1)],
        ];
        let b = vec![dec!(3), dec!(-2)];
        assert_eq!(solve(&a, &b).unwrap(), vec![dec!(3), dec!(-2)]);
    }

    #[test]
    fn test_solve_2x2() {
        // 2x + y = 5, x - y = 1  ->  x = 2, y = 1
        let a = vec![
            vec![dec!(2), dec!(1)],
            vec![dec!(1), dec!(-1)],
        ];
        let b = vec![dec!(5), dec!(1)];
        let x = solve(&a, &b).unwrap();
        assert_eq!(x, vec![dec!(2), dec!(1)]);
    }

    #[test]
    fn test_solve_requires_row_swap() {
        // Leading zero pivot forces a swap before elimination.
        let a = vec![
            vec![dec!(0), dec!(1)],
            vec![dec!(1), dec!(0)],
        ];
        let b = vec![dec!(7), dec!(4)];
        let x = solve(&a, &b).unwrap();
        assert_eq!(x, vec![dec!(4), dec!(7)]);
    }

    #[test]
    fn test_solve_singular() {
        let a = vec![
            vec![dec!(1), dec!(2)],
            vec![dec!(2), dec!(4)],
        ];
        let b = vec![dec!(1), dec!(2)];
        assert_eq!(
            solve(&a, &b).unwrap_err(),
            SolverError::Singular { column: 1 }
        );
    }

    #[test]
    fn test_solve_dimension_mismatch() {
        let a = vec![vec![dec!(1), dec!(2)]];
        let b = vec![dec!(1)];
        assert!(matches!(
            solve(&a, &b),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_solve_3x3() {
        let a = vec![
            vec![dec!(2), dec!(1), dec!(-1)],
            vec![dec!(-3), dec!(-1), dec!(2)],
            vec![dec!(-2), dec!(1), dec!(2)],
        ];
        let b = vec![dec!(8), dec!(-11), dec!(-3)];
        let x = solve(&a, &b).unwrap();
        let expected = [dec!(2), dec!(3), dec!(-1)];
        for (got, want) in x.iter().zip(expected.iter()) {
            assert!((got - want).abs() < dec!(0.000000000000000001), "{got} != {want}");
        }
    }
}
