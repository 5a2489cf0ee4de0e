//! Convex quadratic programs with linear equalities and optional
//! non-negativity bounds:
//!
//! ```text
//! min ½ xᵀQx + cᵀx   s.t.  A x = b,  (x ≥ 0)
//! ```
//!
//! Bounded problems are solved with a primal active-set method on the
//! non-negativity constraints, started from a vertex found by simplex phase
//! one. Each iteration solves the equality-constrained subproblem over the
//! free variables through its (regularised) KKT system.

use crate::error::PortfolioRiskError;
use crate::linalg::{mat_vec_multiply, max_abs, solve_linear_system};
use crate::optimization::linear_program::feasible_point;
use crate::PortfolioRiskResult;

const RIDGE: f64 = 1e-10;
const DUAL_REGULARISATION: f64 = 1e-12;

#[derive(Debug, Clone)]
pub(crate) struct QuadraticProgram {
    pub hessian: Vec<Vec<f64>>,
    pub linear: Vec<f64>,
    pub equalities: Vec<Vec<f64>>,
    pub rhs: Vec<f64>,
    pub non_negative: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct QpSolution {
    pub x: Vec<f64>,
    pub iterations: u32,
}

pub(crate) fn solve_qp(problem: &QuadraticProgram, label: &str, max_iterations: u32) -> PortfolioRiskResult<QpSolution> {
    let n = problem.linear.len();
    let m = problem.equalities.len();
    if n == 0 || problem.hessian.len() != n || problem.hessian.iter().any(|r| r.len() != n) {
        return Err(PortfolioRiskError::optimization(label, "Hessian does not match the number of variables"));
    }
    if problem.rhs.len() != m || problem.equalities.iter().any(|r| r.len() != n) {
        return Err(PortfolioRiskError::optimization(label, "Equality constraints are malformed"));
    }

    // Scaling leaves the minimiser unchanged
    let obj_scale = max_abs(&problem.hessian)
        .max(problem.linear.iter().fold(0.0_f64, |a, v| a.max(v.abs())));
    let obj_scale = if obj_scale > 0.0 { obj_scale } else { 1.0 };
    let q: Vec<Vec<f64>> = problem
        .hessian
        .iter()
        .map(|row| row.iter().map(|v| v / obj_scale).collect())
        .collect();
    let c: Vec<f64> = problem.linear.iter().map(|v| v / obj_scale).collect();

    let mut a = Vec::with_capacity(m);
    let mut b = Vec::with_capacity(m);
    for (row, &rhs) in problem.equalities.iter().zip(&problem.rhs) {
        let s = row.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if s == 0.0 {
            if rhs != 0.0 {
                return Err(PortfolioRiskError::optimization(label, "An equality constraint has no coefficients"));
            }
            continue;
        }
        a.push(row.iter().map(|v| v / s).collect::<Vec<f64>>());
        b.push(rhs / s);
    }

    let ridge = RIDGE * (0..n).map(|i| q[i][i]).fold(0.0_f64, f64::max).max(1e-6);
    let all: Vec<usize> = (0..n).collect();

    if !problem.non_negative {
        let (x, _) = solve_subproblem(&q, &c, &a, &b, &all, ridge, label)?;
        check_feasible(&a, &b, &x, label)?;
        return Ok(QpSolution { x, iterations: 1 });
    }

    let max_pivots = 50 * (a.len() + n) as u32;
    let mut x = feasible_point(&a, &b, label, max_pivots)?;
    let mut working: Vec<bool> = x.iter().map(|v| *v <= 0.0).collect();
    let mut last_delta = f64::INFINITY;

    for iteration in 1..=max_iterations {
        let free: Vec<usize> = (0..n).filter(|&i| !working[i]).collect();
        if free.is_empty() {
            return Err(PortfolioRiskError::optimization(label, "Every variable is pinned at its bound"));
        }
        let (x_free, lambda) = solve_subproblem(&q, &c, &a, &b, &free, ridge, label)?;

        let mut target = vec![0.0; n];
        for (k, &i) in free.iter().enumerate() {
            target[i] = x_free[k];
        }
        let step: Vec<f64> = target.iter().zip(&x).map(|(t, v)| t - v).collect();
        let x_norm = x.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        last_delta = step.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));

        if last_delta <= 1e-12 * x_norm {
            x = target;
            // Bound multipliers ν = Qx + c + Aᵀλ must be non-negative
            let mut grad = mat_vec_multiply(&q, &x);
            for (g, ci) in grad.iter_mut().zip(&c) {
                *g += ci;
            }
            for (row, l) in a.iter().zip(&lambda) {
                for (g, aij) in grad.iter_mut().zip(row) {
                    *g += aij * l;
                }
            }
            let tolerance = 1e-9 * x_norm;
            let release = (0..n)
                .filter(|&i| working[i] && grad[i] < -tolerance)
                .min_by(|&i, &j| grad[i].total_cmp(&grad[j]));
            match release {
                None => {
                    check_feasible(&a, &b, &x, label)?;
                    log::debug!("{label}: active set converged in {iteration} iterations");
                    return Ok(QpSolution {
                        x,
                        iterations: iteration,
                    });
                }
                Some(i) => working[i] = false,
            }
            continue;
        }

        let mut alpha = 1.0;
        let mut blocking = None;
        for &i in &free {
            if step[i] < 0.0 {
                let ratio = x[i] / -step[i];
                if ratio < alpha {
                    alpha = ratio;
                    blocking = Some(i);
                }
            }
        }
        for (xi, si) in x.iter_mut().zip(&step) {
            *xi += alpha * si;
        }
        if let Some(i) = blocking {
            x[i] = 0.0;
            working[i] = true;
        }
    }

    Err(PortfolioRiskError::ConvergenceFailure {
        function: format!("{label} active set"),
        iterations: max_iterations,
        last_delta,
    })
}

/// Minimise over the `free` variables with the rest fixed at zero.
/// Returns (x_free, λ).
fn solve_subproblem(
    q: &[Vec<f64>],
    c: &[f64],
    a: &[Vec<f64>],
    b: &[f64],
    free: &[usize],
    ridge: f64,
    label: &str,
) -> PortfolioRiskResult<(Vec<f64>, Vec<f64>)> {
    let f = free.len();
    let m = a.len();
    let size = f + m;
    let mut kkt = vec![vec![0.0; size]; size];
    let mut rhs = vec![0.0; size];

    for (r, &i) in free.iter().enumerate() {
        for (s, &j) in free.iter().enumerate() {
            kkt[r][s] = q[i][j];
        }
        kkt[r][r] += ridge;
        for k in 0..m {
            kkt[r][f + k] = a[k][i];
            kkt[f + k][r] = a[k][i];
        }
        rhs[r] = -c[i];
    }
    for k in 0..m {
        kkt[f + k][f + k] = -DUAL_REGULARISATION;
        rhs[f + k] = b[k];
    }

    let solution = solve_linear_system(kkt, rhs)
        .map_err(|_| PortfolioRiskError::optimization(label, "KKT system is singular"))?;
    let lambda = solution[f..].to_vec();
    let mut x_free = solution;
    x_free.truncate(f);
    Ok((x_free, lambda))
}

fn check_feasible(a: &[Vec<f64>], b: &[f64], x: &[f64], label: &str) -> PortfolioRiskResult<()> {
    let residual = mat_vec_multiply(a, x)
        .iter()
        .zip(b)
        .fold(0.0_f64, |acc, (ax, bi)| acc.max((ax - bi).abs()));
    let scale = 1.0 + b.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !residual.is_finite() || residual > 1e-7 * scale {
        return Err(PortfolioRiskError::optimization(
            label,
            format!("Equality constraints cannot be satisfied (residual {residual:.3e})"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(n: usize) -> Vec<Vec<f64>> {
        vec![vec![1.0; n]]
    }

    // ------------------------------------------------------------------
    // 1. Unbounded problem: closed-form minimum variance
    // ------------------------------------------------------------------
    #[test]
    fn test_two_asset_min_variance_closed_form() {
        // σ1² = 0.04, σ2² = 0.01, cov = 0 -> w1 = 0.01 / 0.05 = 0.2
        let qp = QuadraticProgram {
            hessian: vec![vec![0.04, 0.0], vec![0.0, 0.01]],
            linear: vec![0.0, 0.0],
            equalities: budget(2),
            rhs: vec![1.0],
            non_negative: false,
        };
        let sol = solve_qp(&qp, "min variance", 100).unwrap();
        assert!((sol.x[0] - 0.2).abs() < 1e-8);
        assert!((sol.x[1] - 0.8).abs() < 1e-8);
    }

    // ------------------------------------------------------------------
    // 2. Bounds bind: the unconstrained optimum shorts asset 2
    // ------------------------------------------------------------------
    #[test]
    fn test_bound_becomes_active() {
        // Highly correlated pair with unequal vols: unconstrained solution
        // shorts the riskier asset.
        let hessian = vec![vec![0.01, 0.018], vec![0.018, 0.04]];
        let free = solve_qp(
            &QuadraticProgram {
                hessian: hessian.clone(),
                linear: vec![0.0, 0.0],
                equalities: budget(2),
                rhs: vec![1.0],
                non_negative: false,
            },
            "free",
            100,
        )
        .unwrap();
        assert!(free.x[1] < 0.0);

        let bounded = solve_qp(
            &QuadraticProgram {
                hessian,
                linear: vec![0.0, 0.0],
                equalities: budget(2),
                rhs: vec![1.0],
                non_negative: true,
            },
            "bounded",
            100,
        )
        .unwrap();
        assert!((bounded.x[0] - 1.0).abs() < 1e-8);
        assert!(bounded.x[1].abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 3. Linear term and a released bound
    // ------------------------------------------------------------------
    #[test]
    fn test_linear_term_three_assets() {
        // min ½xᵀx - x3 s.t. Σx = 1, x ≥ 0  -> x = (0, 0, 1) shifted:
        // stationarity gives x_i = -λ + [i == 2], interior while all > 0.
        let qp = QuadraticProgram {
            hessian: vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
            linear: vec![0.0, 0.0, -0.3],
            equalities: budget(3),
            rhs: vec![1.0],
            non_negative: true,
        };
        let sol = solve_qp(&qp, "linear", 100).unwrap();
        // x = (1/3 - 0.1, 1/3 - 0.1, 1/3 + 0.2)
        assert!((sol.x[0] - (1.0 / 3.0 - 0.1)).abs() < 1e-8);
        assert!((sol.x[2] - (1.0 / 3.0 + 0.2)).abs() < 1e-8);
        let total: f64 = sol.x.iter().sum();
        assert!((total - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_infeasible_bounded_problem() {
        // Σx = 1 and Σx = 2 cannot hold together
        let qp = QuadraticProgram {
            hessian: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            linear: vec![0.0, 0.0],
            equalities: vec![vec![1.0, 1.0], vec![2.0, 2.0]],
            rhs: vec![1.0, 4.0],
            non_negative: true,
        };
        assert!(solve_qp(&qp, "infeasible", 100).unwrap_err().is_optimization_error());
    }

    #[test]
    fn test_infeasible_unbounded_problem() {
        let qp = QuadraticProgram {
            hessian: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            linear: vec![0.0, 0.0],
            equalities: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            rhs: vec![1.0, 2.0],
            non_negative: false,
        };
        assert!(solve_qp(&qp, "infeasible", 100).unwrap_err().is_optimization_error());
    }
}
