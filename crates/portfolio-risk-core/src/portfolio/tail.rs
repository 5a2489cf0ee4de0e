use serde::{Deserialize, Serialize};

use crate::data::returns::ReturnMatrix;
use crate::error::PortfolioRiskError;
use crate::portfolio::weights::WeightVector;
use crate::PortfolioRiskResult;

/// Default tail probability for VaR/CVaR.
pub const DEFAULT_TAIL_ALPHA: f64 = 0.05;

/// Historical tail risk of a portfolio, expressed as positive losses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailRisk {
    pub alpha: f64,
    /// Loss at the α-quantile of realised portfolio returns
    pub var: f64,
    /// Mean loss over the worst ceil(α·T) realisations
    pub cvar: f64,
    pub tail_observations: usize,
}

/// Historical VaR/CVaR of the weighted portfolio over every row of
/// `returns`.
pub fn tail_risk(
    returns: &ReturnMatrix,
    weights: &WeightVector,
    alpha: f64,
) -> PortfolioRiskResult<TailRisk> {
    let w = weights.resolve(returns.tickers(), "return matrix")?;
    historical_tail_risk(&returns.portfolio_returns(&w), alpha)
}

pub(crate) fn historical_tail_risk(portfolio_returns: &[f64], alpha: f64) -> PortfolioRiskResult<TailRisk> {
    validate_alpha(alpha)?;
    let t = portfolio_returns.len();
    if t == 0 {
        return Err(PortfolioRiskError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let mut sorted = portfolio_returns.to_vec();
    sorted.sort_by(f64::total_cmp);

    let k = tail_count(alpha, t);
    let tail = &sorted[..k];
    let cvar = -tail.iter().sum::<f64>() / k as f64;

    Ok(TailRisk {
        alpha,
        var: -sorted[k - 1],
        cvar,
        tail_observations: k,
    })
}

/// ceil(α·T) clamped to [1, T]. Products within 1e-9 of an integer count
/// as that integer (0.07 × 100 evaluates to 7.000000000000001).
fn tail_count(alpha: f64, t: usize) -> usize {
    let x = alpha * t as f64;
    let k = if (x - x.round()).abs() < 1e-9 { x.round() } else { x.ceil() };
    (k as usize).clamp(1, t)
}

pub(crate) fn validate_alpha(alpha: f64) -> PortfolioRiskResult<()> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(PortfolioRiskError::InvalidInput {
            field: "alpha".into(),
            reason: format!("Tail probability must be in (0, 1), got {alpha}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_outcomes_averaged() {
        // 20 outcomes, alpha 0.1 -> worst 2
        let mut r: Vec<f64> = (0..18).map(|i| 0.001 * i as f64).collect();
        r.push(-0.05);
        r.push(-0.03);
        let tail = historical_tail_risk(&r, 0.1).unwrap();
        assert_eq!(tail.tail_observations, 2);
        assert!((tail.cvar - 0.04).abs() < 1e-12);
        assert!((tail.var - 0.03).abs() < 1e-12);
        assert!(tail.cvar >= tail.var);
    }

    #[test]
    fn test_tail_rounds_up() {
        let r = vec![0.01, -0.02, 0.03];
        let tail = historical_tail_risk(&r, 0.05).unwrap();
        assert_eq!(tail.tail_observations, 1);
        assert!((tail.cvar - 0.02).abs() < 1e-15);
    }

    #[test]
    fn test_integer_tail_size_not_inflated_by_rounding() {
        // 100 outcomes -0.100, -0.099, ..., -0.001; alpha 0.07 -> worst 7
        let r: Vec<f64> = (0..100).map(|i| -0.001 * (100 - i) as f64).collect();
        let tail = historical_tail_risk(&r, 0.07).unwrap();
        assert_eq!(tail.tail_observations, 7);
        assert!((tail.var - 0.094).abs() < 1e-12);
        // mean of 0.100 ..= 0.094
        assert!((tail.cvar - 0.097).abs() < 1e-12);

        assert_eq!(tail_count(0.07, 200), 14);
        assert_eq!(tail_count(0.05, 30), 2);
        assert_eq!(tail_count(1e-6, 10), 1);
    }

    #[test]
    fn test_invalid_alpha() {
        assert!(historical_tail_risk(&[0.01], 0.0).is_err());
        assert!(historical_tail_risk(&[0.01], 1.0).is_err());
    }

    #[test]
    fn test_empty_series() {
        assert!(matches!(
            historical_tail_risk(&[], 0.05),
            Err(PortfolioRiskError::InsufficientData { .. })
        ));
    }
}
