//! Minimum conditional value-at-risk over historical scenarios
//! (Rockafellar-Uryasev):
//!
//! ```text
//! min  ζ + 1/(αT) Σ u_t
//! s.t. u_t ≥ -r_tᵀw - ζ,  u ≥ 0,  Σw = 1,  w ≥ 0
//! ```
//!
//! ζ is split into ζ⁺ - ζ⁻ and each scenario row gets a slack s_t, which
//! also serves as its starting basic variable.

use crate::data::returns::ReturnMatrix;
use crate::error::PortfolioRiskError;
use crate::optimization::linear_program::{solve_lp, LinearProgram};
use crate::optimization::{normalize_weights, Allocation, AllocationObjective};
use crate::portfolio::tail::validate_alpha;
use crate::PortfolioRiskResult;

/// Long-only weights minimising historical CVaR at tail probability
/// `alpha`.
///
/// The LP is solved on a dense tableau of about T × (2T + N) entries and each
/// pivot touches all of it, so a three-year daily window (T ≈ 750) takes
/// seconds in a debug build. Use a release build for long histories.
pub fn optimize_min_cvar(returns: &ReturnMatrix, alpha: f64) -> PortfolioRiskResult<Allocation> {
    validate_alpha(alpha)?;
    let objective = AllocationObjective::MinCvar;
    let n = returns.num_assets();
    let t = returns.num_observations();
    if t == 0 {
        return Err(PortfolioRiskError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    // Column layout: w | ζ⁺ ζ⁻ | u | s
    let zeta_plus = n;
    let zeta_minus = n + 1;
    let u0 = n + 2;
    let s0 = u0 + t;
    let cols = s0 + t;

    let mut cost = vec![0.0; cols];
    cost[zeta_plus] = 1.0;
    cost[zeta_minus] = -1.0;
    let tail_weight = 1.0 / (alpha * t as f64);
    for c in cost.iter_mut().skip(u0).take(t) {
        *c = tail_weight;
    }

    let mut constraints = Vec::with_capacity(t + 1);
    for (k, scenario) in returns.rows().iter().enumerate() {
        // -r_tᵀw - ζ⁺ + ζ⁻ - u_t + s_t = 0
        let mut row = vec![0.0; cols];
        for (j, r) in scenario.iter().enumerate() {
            row[j] = -r;
        }
        row[zeta_plus] = -1.0;
        row[zeta_minus] = 1.0;
        row[u0 + k] = -1.0;
        row[s0 + k] = 1.0;
        constraints.push(row);
    }
    let mut budget = vec![0.0; cols];
    for b in budget.iter_mut().take(n) {
        *b = 1.0;
    }
    constraints.push(budget);

    let mut rhs = vec![0.0; t];
    rhs.push(1.0);

    let lp = LinearProgram {
        objective: cost,
        constraints,
        rhs,
    };
    let max_pivots = 50 * (t + 1 + cols) as u32;
    let solution = solve_lp(&lp, objective.label(), max_pivots)?;
    log::debug!(
        "min CVaR: {} scenarios, {} pivots, objective {:.6}",
        t,
        solution.pivots,
        solution.objective_value
    );

    let weights = normalize_weights(returns.tickers(), &solution.x[..n], objective, true)?;
    Ok(Allocation {
        objective,
        weights,
        iterations: solution.pivots,
        objective_value: solution.objective_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::returns::DataOrigin;
    use crate::portfolio::tail::historical_tail_risk;
    use chrono::NaiveDate;

    fn matrix(rows: Vec<Vec<f64>>) -> ReturnMatrix {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..rows.len())
            .map(|i| start + chrono::Days::new(i as u64))
            .collect();
        let n = rows[0].len();
        let tickers = (0..n).map(|i| format!("A{i}")).collect();
        ReturnMatrix::new(dates, tickers, rows, DataOrigin::Historical).unwrap()
    }

    /// Deterministic, mildly correlated scenarios.
    fn scenarios(t: usize) -> Vec<Vec<f64>> {
        (0..t)
            .map(|k| {
                let x = (k as f64 * 0.7).sin();
                let y = (k as f64 * 1.3 + 0.5).cos();
                let z = (k as f64 * 2.1 + 1.0).sin();
                vec![
                    0.001 + 0.02 * x,
                    0.0005 + 0.01 * (0.5 * x + 0.5 * y),
                    0.0003 + 0.006 * z,
                ]
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // 1. LP value equals the historical CVaR of the solution
    // ------------------------------------------------------------------
    #[test]
    fn test_objective_matches_historical_cvar() {
        let m = matrix(scenarios(40));
        let a = optimize_min_cvar(&m, 0.1).unwrap();
        let w = a.weights.resolve(m.tickers(), "return matrix").unwrap();
        assert!(w.iter().all(|v| *v >= 0.0));
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        // α·T = 4 is integral, so the RU value is the mean of the 4 worst
        let tail = historical_tail_risk(&m.portfolio_returns(&w), 0.1).unwrap();
        assert!((a.objective_value - tail.cvar).abs() < 1e-9);
    }

    // ------------------------------------------------------------------
    // 2. Optimum is no worse than equal weight or any single asset
    // ------------------------------------------------------------------
    #[test]
    fn test_beats_simple_portfolios() {
        let m = matrix(scenarios(60));
        let a = optimize_min_cvar(&m, 0.05).unwrap();
        let candidates = [
            vec![1.0 / 3.0; 3],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        for w in candidates {
            let cvar = historical_tail_risk(&m.portfolio_returns(&w), 0.05).unwrap().cvar;
            assert!(a.objective_value <= cvar + 1e-9);
        }
    }

    // ------------------------------------------------------------------
    // 3. A crash-prone asset is avoided
    // ------------------------------------------------------------------
    #[test]
    fn test_avoids_crash_asset() {
        let rows = (0..20)
            .map(|k| {
                let crash = if k == 7 || k == 13 { -0.25 } else { 0.004 };
                let steady = if k % 2 == 0 { 0.002 } else { -0.001 };
                vec![crash, steady]
            })
            .collect();
        let m = matrix(rows);
        let a = optimize_min_cvar(&m, 0.1).unwrap();
        assert!(a.weights.get("A1") > 0.95);
    }

    #[test]
    fn test_invalid_alpha() {
        let m = matrix(scenarios(10));
        assert!(optimize_min_cvar(&m, 1.5).is_err());
    }

    // ------------------------------------------------------------------
    // 4. A one-year daily window stays within the pivot cap
    // ------------------------------------------------------------------
    #[test]
    fn test_one_year_daily_window() {
        // α·T = 13, so the RU value and the historical CVaR coincide
        let m = matrix(scenarios(260));
        let a = optimize_min_cvar(&m, 0.05).unwrap();
        let w = a.weights.resolve(m.tickers(), "return matrix").unwrap();
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let equal = historical_tail_risk(&m.portfolio_returns(&[1.0 / 3.0; 3]), 0.05).unwrap();
        assert!(a.objective_value <= equal.cvar + 1e-9);
    }
}
