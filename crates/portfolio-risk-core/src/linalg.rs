//! Dense matrix helpers shared by the risk model, the metrics engine and the
//! optimizers. Matrices are row-major `Vec<Vec<f64>>`.

use crate::error::PortfolioRiskError;
use crate::PortfolioRiskResult;

/// Dot product.
pub(crate) fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Matrix-vector multiplication: result_i = sum_j(mat[i][j] * v[j]).
pub(crate) fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Quadratic form w' * M * w.
pub(crate) fn quadratic_form(mat: &[Vec<f64>], w: &[f64]) -> f64 {
    vec_dot(w, &mat_vec_multiply(mat, w))
}

/// Square root that treats tiny negative round-off as zero.
pub(crate) fn sqrt_clamped(val: f64) -> f64 {
    if val <= 0.0 {
        0.0
    } else {
        val.sqrt()
    }
}

/// Largest absolute entry of a matrix.
pub(crate) fn max_abs(mat: &[Vec<f64>]) -> f64 {
    mat.iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub(crate) fn solve_linear_system(
    mut a: Vec<Vec<f64>>,
    mut b: Vec<f64>,
) -> PortfolioRiskResult<Vec<f64>> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(PortfolioRiskError::InvalidInput {
            field: "linear_system".into(),
            reason: format!("Expected a square {n}x{n} system"),
        });
    }

    let tolerance = f64::EPSILON * max_abs(&a).max(f64::MIN_POSITIVE) * n as f64;

    for col in 0..n {
        // Partial pivoting
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            let val = a[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }
        if max_val <= tolerance || !max_val.is_finite() {
            return Err(PortfolioRiskError::InvalidInput {
                field: "linear_system".into(),
                reason: "Matrix is singular".into(),
            });
        }
        if max_row != col {
            a.swap(max_row, col);
            b.swap(max_row, col);
        }

        let pivot_row = a[col].clone();
        let pivot = pivot_row[col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for (cell, pv) in a[row][col..].iter_mut().zip(pivot_row[col..].iter()) {
                *cell -= factor * pv;
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let tail: f64 = (i + 1..n).map(|j| a[i][j] * x[j]).sum();
        x[i] = (b[i] - tail) / a[i][i];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_two_by_two() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve_linear_system(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_solve_requires_pivoting() {
        let a = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let x = solve_linear_system(a, vec![2.0, 3.0]).unwrap();
        assert_eq!(x, vec![3.0, 2.0]);
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve_linear_system(a, vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_quadratic_form_and_sqrt() {
        let m = vec![vec![0.04, 0.0], vec![0.0, 0.01]];
        let w = vec![0.5, 0.5];
        assert!((quadratic_form(&m, &w) - 0.0125).abs() < 1e-15);
        assert_eq!(sqrt_clamped(-1e-18), 0.0);
    }
}
