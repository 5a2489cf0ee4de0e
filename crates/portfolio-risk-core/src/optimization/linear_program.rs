//! Dense two-phase simplex for problems in standard form:
//!
//! ```text
//! min  cᵀx   s.t.  A x = b,  x ≥ 0
//! ```
//!
//! Columns that are already unit vectors seed the initial basis; artificial
//! variables are added only for the remaining rows. Pricing is Dantzig's
//! most-negative reduced cost, switching to Bland's rule after a streak of
//! degenerate pivots.

use crate::error::PortfolioRiskError;
use crate::PortfolioRiskResult;

const PIVOT_TOLERANCE: f64 = 1e-9;
const COST_TOLERANCE: f64 = 1e-11;
const DEGENERATE_STREAK: u32 = 50;

/// A linear program in standard form.
#[derive(Debug, Clone)]
pub(crate) struct LinearProgram {
    pub objective: Vec<f64>,
    pub constraints: Vec<Vec<f64>>,
    pub rhs: Vec<f64>,
}

#[derive(Debug, Clone)]
pub(crate) struct LpSolution {
    pub x: Vec<f64>,
    pub objective_value: f64,
    pub pivots: u32,
}

/// Solve `lp` to optimality. `label` names the problem in errors.
pub(crate) fn solve_lp(lp: &LinearProgram, label: &str, max_pivots: u32) -> PortfolioRiskResult<LpSolution> {
    validate(lp, label)?;
    let mut tableau = Tableau::build(&lp.constraints, &lp.rhs);
    let mut pivots = tableau.phase_one(label, max_pivots)?;

    tableau.set_objective(&lp.objective);
    pivots += tableau.optimize(label, max_pivots.saturating_sub(pivots), false)?;

    let x = tableau.primal(lp.objective.len());
    let objective_value = lp.objective.iter().zip(&x).map(|(c, v)| c * v).sum();
    Ok(LpSolution {
        x,
        objective_value,
        pivots,
    })
}

/// A vertex of `{x ≥ 0 : A x = b}`.
pub(crate) fn feasible_point(
    constraints: &[Vec<f64>],
    rhs: &[f64],
    label: &str,
    max_pivots: u32,
) -> PortfolioRiskResult<Vec<f64>> {
    let n = constraints.first().map_or(0, |row| row.len());
    let lp = LinearProgram {
        objective: vec![0.0; n],
        constraints: constraints.to_vec(),
        rhs: rhs.to_vec(),
    };
    validate(&lp, label)?;
    let mut tableau = Tableau::build(&lp.constraints, &lp.rhs);
    tableau.phase_one(label, max_pivots)?;
    Ok(tableau.primal(n))
}

fn validate(lp: &LinearProgram, label: &str) -> PortfolioRiskResult<()> {
    let n = lp.objective.len();
    if lp.constraints.is_empty() || n == 0 {
        return Err(PortfolioRiskError::optimization(label, "Linear program has no constraints or variables"));
    }
    if lp.rhs.len() != lp.constraints.len() {
        return Err(PortfolioRiskError::optimization(
            label,
            format!("{} constraint rows but {} right-hand sides", lp.constraints.len(), lp.rhs.len()),
        ));
    }
    if let Some(i) = lp.constraints.iter().position(|row| row.len() != n) {
        return Err(PortfolioRiskError::optimization(
            label,
            format!("Constraint row {i} has the wrong number of coefficients"),
        ));
    }
    let finite = lp.objective.iter().chain(&lp.rhs).all(|v| v.is_finite())
        && lp.constraints.iter().flatten().all(|v| v.is_finite());
    if !finite {
        return Err(PortfolioRiskError::optimization(label, "Linear program contains non-finite coefficients"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tableau
// ---------------------------------------------------------------------------

struct Tableau {
    /// m rows of `cols + 1` entries; the last entry is the right-hand side.
    rows: Vec<Vec<f64>>,
    /// Reduced costs (`cols` entries) followed by minus the objective value.
    costs: Vec<f64>,
    basis: Vec<usize>,
    structural: usize,
    artificial: Vec<usize>,
}

impl Tableau {
    fn build(constraints: &[Vec<f64>], rhs: &[f64]) -> Self {
        let m = constraints.len();
        let n = constraints[0].len();

        let mut rows: Vec<Vec<f64>> = constraints
            .iter()
            .zip(rhs)
            .map(|(row, &b)| {
                let sign = if b < 0.0 { -1.0 } else { 1.0 };
                let mut r: Vec<f64> = row.iter().map(|v| v * sign).collect();
                r.push(b * sign);
                r
            })
            .collect();

        let mut basis = vec![usize::MAX; m];
        for j in 0..n {
            if let Some(r) = unit_row(&rows, j) {
                if basis[r] == usize::MAX {
                    basis[r] = j;
                }
            }
        }

        let missing: Vec<usize> = (0..m).filter(|&i| basis[i] == usize::MAX).collect();
        let cols = n + missing.len();
        let mut artificial = Vec::with_capacity(missing.len());
        for row in rows.iter_mut() {
            let b = row.pop().unwrap_or(0.0);
            row.resize(cols, 0.0);
            row.push(b);
        }
        for (k, &i) in missing.iter().enumerate() {
            rows[i][n + k] = 1.0;
            basis[i] = n + k;
            artificial.push(n + k);
        }

        Tableau {
            rows,
            costs: vec![0.0; cols + 1],
            basis,
            structural: n,
            artificial,
        }
    }

    fn cols(&self) -> usize {
        self.costs.len() - 1
    }

    fn is_artificial(&self, j: usize) -> bool {
        j >= self.structural
    }

    /// Drive the artificial variables to zero. Returns the pivots used.
    fn phase_one(&mut self, label: &str, max_pivots: u32) -> PortfolioRiskResult<u32> {
        if self.artificial.is_empty() {
            return Ok(0);
        }
        let mut cost = vec![0.0; self.cols()];
        for &j in &self.artificial {
            cost[j] = 1.0;
        }
        self.price(&cost);
        let pivots = self.optimize(label, max_pivots, true)?;

        let infeasibility = -self.costs[self.cols()];
        let scale = 1.0 + self.rows.iter().map(|r| r[r.len() - 1].abs()).fold(0.0, f64::max);
        if infeasibility > 1e-9 * scale {
            return Err(PortfolioRiskError::optimization(
                label,
                format!("Constraints are infeasible (phase-one residual {infeasibility:.3e})"),
            ));
        }

        // Pivot zero-valued artificials out of the basis where possible;
        // rows without a structural entry are redundant and keep theirs.
        for i in 0..self.rows.len() {
            if !self.is_artificial(self.basis[i]) {
                continue;
            }
            if let Some(j) = (0..self.structural).find(|&j| self.rows[i][j].abs() > PIVOT_TOLERANCE) {
                self.pivot(i, j);
            }
        }
        log::debug!("{label}: phase one feasible after {pivots} pivots");
        Ok(pivots)
    }

    /// Install a structural objective; artificial columns cost nothing and
    /// never re-enter.
    fn set_objective(&mut self, objective: &[f64]) {
        let mut cost = vec![0.0; self.cols()];
        cost[..objective.len()].copy_from_slice(objective);
        self.price(&cost);
    }

    /// Reduced costs of `cost` relative to the current basis.
    fn price(&mut self, cost: &[f64]) {
        let cols = self.cols();
        let mut costs = cost.to_vec();
        costs.push(0.0);
        for (i, row) in self.rows.iter().enumerate() {
            let cb = cost[self.basis[i]];
            if cb == 0.0 {
                continue;
            }
            for j in 0..=cols {
                costs[j] -= cb * row[j];
            }
        }
        self.costs = costs;
    }

    fn optimize(&mut self, label: &str, max_pivots: u32, allow_artificial: bool) -> PortfolioRiskResult<u32> {
        let cols = self.cols();
        let mut pivots = 0u32;
        let mut degenerate = 0u32;

        loop {
            let bland = degenerate > DEGENERATE_STREAK;
            let candidates = (0..cols).filter(|&j| allow_artificial || !self.is_artificial(j));
            let entering = if bland {
                candidates.into_iter().find(|&j| self.costs[j] < -COST_TOLERANCE)
            } else {
                candidates
                    .filter(|&j| self.costs[j] < -COST_TOLERANCE)
                    .min_by(|&a, &b| self.costs[a].total_cmp(&self.costs[b]))
            };
            let Some(entering) = entering else {
                return Ok(pivots);
            };

            let mut leaving: Option<(usize, f64)> = None;
            for (i, row) in self.rows.iter().enumerate() {
                let coef = row[entering];
                if coef <= PIVOT_TOLERANCE {
                    continue;
                }
                let ratio = row[cols].max(0.0) / coef;
                leaving = match leaving {
                    None => Some((i, ratio)),
                    Some((best, best_ratio)) => {
                        if ratio < best_ratio - 1e-12
                            || (ratio <= best_ratio + 1e-12 && self.basis[i] < self.basis[best])
                        {
                            Some((i, ratio))
                        } else {
                            Some((best, best_ratio))
                        }
                    }
                };
            }
            let Some((leaving, step)) = leaving else {
                return Err(PortfolioRiskError::optimization(label, "Linear program is unbounded"));
            };

            if pivots >= max_pivots {
                return Err(PortfolioRiskError::ConvergenceFailure {
                    function: format!("{label} simplex"),
                    iterations: pivots,
                    last_delta: -self.costs[entering],
                });
            }

            self.pivot(leaving, entering);
            pivots += 1;
            if step <= 1e-12 {
                degenerate += 1;
            } else {
                degenerate = 0;
            }
        }
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let width = self.rows[row].len();
        let p = self.rows[row][col];
        for v in self.rows[row].iter_mut() {
            *v /= p;
        }
        let pivot_row = self.rows[row].clone();

        for (i, r) in self.rows.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = r[col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..width {
                r[j] -= factor * pivot_row[j];
            }
            r[col] = 0.0;
        }
        let factor = self.costs[col];
        if factor != 0.0 {
            for j in 0..width {
                self.costs[j] -= factor * pivot_row[j];
            }
            self.costs[col] = 0.0;
        }
        self.basis[row] = col;
    }

    /// Values of the first `n` structural variables.
    fn primal(&self, n: usize) -> Vec<f64> {
        let rhs = self.cols();
        let mut x = vec![0.0; n];
        for (i, &j) in self.basis.iter().enumerate() {
            if j < n {
                x[j] = self.rows[i][rhs].max(0.0);
            }
        }
        x
    }
}

/// Row index of the single 1.0 in column `j`, if the column is a unit vector.
fn unit_row(rows: &[Vec<f64>], j: usize) -> Option<usize> {
    let mut found = None;
    for (i, row) in rows.iter().enumerate() {
        let v = row[j];
        if v == 0.0 {
            continue;
        }
        if (v - 1.0).abs() > 1e-12 || found.is_some() {
            return None;
        }
        found = Some(i);
    }
    found
}
