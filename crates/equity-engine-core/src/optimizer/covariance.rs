use nalgebra::DMatrix;

use crate::error::EngineError;
use crate::panel::PricePanel;
use crate::EngineResult;

/// Shrunk covariance together with the shrinkage intensity that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceEstimate {
    pub matrix: DMatrix<f64>,
    pub shrinkage: f64,
}

/// Daily simple returns of a complete panel, one row per consecutive pair.
pub fn simple_returns(panel: &PricePanel) -> EngineResult<DMatrix<f64>> {
    if panel.n_rows() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "{} price rows, need at least 2 for returns",
            panel.n_rows()
        )));
    }
    let (n, p) = (panel.n_rows() - 1, panel.n_cols());
    let mut out = DMatrix::zeros(n, p);
    for t in 0..n {
        for j in 0..p {
            let (prev, next) = match (panel.rows[t][j], panel.rows[t + 1][j]) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(EngineError::InvalidInput {
                        field: "prices".into(),
                        reason: format!("{} missing on {}", panel.tickers[j], panel.dates[t + 1]),
                    })
                }
            };
            if prev <= 0.0 {
                return Err(EngineError::DivisionByZero {
                    context: format!("return of {} on {}", panel.tickers[j], panel.dates[t + 1]),
                });
            }
            out[(t, j)] = next / prev - 1.0;
        }
    }
    Ok(out)
}

/// Ledoit-Wolf shrinkage of the sample covariance toward `mu * I`, where `mu`
/// is the average sample variance. Rows of `returns` are observations.
pub fn ledoit_wolf(returns: &DMatrix<f64>) -> EngineResult<CovarianceEstimate> {
    let (n, p) = returns.shape();
    if n < 2 || p == 0 {
        return Err(EngineError::InsufficientData(format!(
            "{} observations of {} assets, cannot estimate covariance",
            n, p
        )));
    }
    let nf = n as f64;
    let pf = p as f64;

    let mut x = returns.clone();
    for j in 0..p {
        let mean = x.column(j).mean();
        x.column_mut(j).add_scalar_mut(-mean);
    }
    let x2 = x.component_mul(&x);

    let emp_cov = x.transpose() * &x / nf;
    let trace_terms: Vec<f64> = (0..p).map(|j| x2.column(j).sum() / nf).collect();
    let trace_sum: f64 = trace_terms.iter().sum();
    let mu = trace_sum / pf;

    let beta_raw = (x2.transpose() * &x2).sum();
    let delta_raw = (x.transpose() * &x).map(|v| v * v).sum() / (nf * nf);

    let beta = (beta_raw / nf - delta_raw) / (pf * nf);
    let delta = (delta_raw - 2.0 * mu * trace_sum + pf * mu * mu) / pf;
    let beta = beta.min(delta);
    let shrinkage = if beta <= 0.0 || delta <= 0.0 {
        0.0
    } else {
        beta / delta
    };

    let mut matrix = emp_cov * (1.0 - shrinkage);
    for j in 0..p {
        matrix[(j, j)] += shrinkage * mu;
    }
    Ok(CovarianceEstimate { matrix, shrinkage })
}

/// Annualized Ledoit-Wolf covariance of a price panel.
pub fn annualized_covariance(
    panel: &PricePanel,
    trading_days: f64,
) -> EngineResult<CovarianceEstimate> {
    let returns = simple_returns(panel)?;
    let mut estimate = ledoit_wolf(&returns)?;
    estimate.matrix *= trading_days;
    Ok(estimate)
}
