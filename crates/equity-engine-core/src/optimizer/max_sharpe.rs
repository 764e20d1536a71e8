use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::covariance::annualized_covariance;
use super::qp::{self, AdmmSettings, QuadraticProgram};
use crate::error::EngineError;
use crate::types::Weight;
use crate::universe::FilteredUniverse;
use crate::EngineResult;

const BOUND_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerParameters {
    /// Fraction of the risk-free rate used as the Sharpe hurdle.
    pub risk_free_haircut: f64,
    pub trading_days: f64,
    pub weight_decimals: u32,
    pub solver: AdmmSettings,
}

impl Default for OptimizerParameters {
    fn default() -> Self {
        Self {
            risk_free_haircut: 0.9,
            trading_days: 252.0,
            weight_decimals: 5,
            solver: AdmmSettings::default(),
        }
    }
}

/// A bound on the summed weight of a group of assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorConstraint {
    pub name: String,
    pub asset_indices: Vec<usize>,
    pub min_weight: f64,
    pub max_weight: f64,
}

/// Constraints of one optimization, indexed like the universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConstraints {
    /// Per-asset upper bounds.
    pub max_weights: Vec<f64>,
    pub sectors: Vec<SectorConstraint>,
    /// L2 regularization strength.
    pub gamma: f64,
    /// Weights below this are zeroed after the solve.
    pub min_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPortfolio {
    pub weights: BTreeMap<String, Weight>,
    pub performance: PortfolioPerformance,
    /// Hurdle rate used in the Sharpe ratio.
    pub risk_free_hurdle: f64,
    pub shrinkage: f64,
    pub iterations: u32,
}

// ---------------------------------------------------------------------------
// Constraint construction
// ---------------------------------------------------------------------------

/// One constraint per distinct sector: `[0, max_per_sector]` for equity
/// sectors, `[min_fixed_income, 1]` for the risk-free sector.
pub fn sector_constraints(
    sectors: &[String],
    risk_free_sector: &str,
    max_per_sector: f64,
    min_fixed_income: f64,
) -> Vec<SectorConstraint> {
    let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, s) in sectors.iter().enumerate() {
        members.entry(s.as_str()).or_default().push(i);
    }
    members
        .into_iter()
        .map(|(name, asset_indices)| {
            let (min_weight, max_weight) = if name == risk_free_sector {
                (min_fixed_income, 1.0)
            } else {
                (0.0, max_per_sector)
            };
            SectorConstraint {
                name: name.to_string(),
                asset_indices,
                min_weight,
                max_weight,
            }
        })
        .collect()
}

impl PortfolioConstraints {
    /// Per-asset cap on every asset but the risk-free one.
    pub fn for_universe(
        universe: &FilteredUniverse,
        risk_free_sector: &str,
        max_per_asset: f64,
        max_per_sector: f64,
        min_fixed_income: f64,
        gamma: f64,
        min_weight: f64,
    ) -> Self {
        let max_weights = (0..universe.len())
            .map(|i| {
                if i == universe.risk_free_index {
                    1.0
                } else {
                    max_per_asset
                }
            })
            .collect();
        Self {
            max_weights,
            sectors: sector_constraints(
                &universe.sectors,
                risk_free_sector,
                max_per_sector,
                min_fixed_income,
            ),
            gamma,
            min_weight,
        }
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PortfolioOptimizer {
    params: OptimizerParameters,
}

impl PortfolioOptimizer {
    pub fn new(params: OptimizerParameters) -> Self {
        Self { params }
    }

    /// Maximum-Sharpe weights over a filtered universe.
    pub fn optimize(
        &self,
        universe: &FilteredUniverse,
        constraints: &PortfolioConstraints,
    ) -> EngineResult<OptimizedPortfolio> {
        let estimate = annualized_covariance(&universe.prices, self.params.trading_days)?;
        let mu = DVector::from_column_slice(&universe.expected_returns);
        let hurdle = universe.risk_free_rate * self.params.risk_free_haircut;

        let (raw, iterations) = self.max_sharpe(&mu, &estimate.matrix, hurdle, constraints)?;
        let cleaned = clean_weights(raw.as_slice(), constraints.min_weight, self.params.weight_decimals);
        let w = DVector::from_column_slice(&cleaned);
        let performance = portfolio_performance(&w, &mu, &estimate.matrix, hurdle);

        info!(
            assets = universe.len(),
            held = cleaned.iter().filter(|w| **w > 0.0).count(),
            shrinkage = estimate.shrinkage,
            sharpe = performance.sharpe_ratio,
            "max-sharpe portfolio solved"
        );

        Ok(OptimizedPortfolio {
            weights: universe.tickers.iter().cloned().zip(cleaned).collect(),
            performance,
            risk_free_hurdle: hurdle,
            shrinkage: estimate.shrinkage,
            iterations,
        })
    }

    /// Solve `max (μ − rf)ᵀw / √(wᵀΣw)` with an L2 penalty through the
    /// homogenized problem in `(y, k)`, returning raw weights `y / k`.
    pub fn max_sharpe(
        &self,
        mu: &DVector<f64>,
        sigma: &DMatrix<f64>,
        hurdle: f64,
        constraints: &PortfolioConstraints,
    ) -> EngineResult<(DVector<f64>, u32)> {
        validate_input(mu, sigma, constraints)?;
        check_feasibility(mu, hurdle, constraints)?;

        let problem = homogenized_program(mu, sigma, hurdle, constraints);
        let solution = qp::solve(&problem, &self.params.solver)?;
        let n = mu.len();
        let k = solution.x[n];
        if k <= 0.0 || !k.is_finite() {
            return Err(EngineError::Infeasible(format!(
                "degenerate scaling variable k = {}",
                k
            )));
        }
        debug!(k, iterations = solution.iterations, "homogenized solve");
        let weights = solution.x.rows(0, n).map(|y| y / k);
        Ok((weights, solution.iterations))
    }
}

/// Variables `[y₁..yₙ, k]`.
fn homogenized_program(
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    hurdle: f64,
    constraints: &PortfolioConstraints,
) -> QuadraticProgram {
    let n = mu.len();
    let nv = n + 1;
    let inf = qp::unbounded();

    let mut p = DMatrix::zeros(nv, nv);
    for i in 0..n {
        for j in 0..n {
            p[(i, j)] = 2.0 * sigma[(i, j)];
        }
        p[(i, i)] += 2.0 * constraints.gamma;
    }

    let mut rows: Vec<(Vec<f64>, f64, f64)> = Vec::new();

    let mut excess = vec![0.0; nv];
    for i in 0..n {
        excess[i] = mu[i] - hurdle;
    }
    rows.push((excess, 1.0, 1.0));

    let mut budget = vec![1.0; nv];
    budget[n] = -1.0;
    rows.push((budget, 0.0, 0.0));

    for i in 0..n {
        let mut long_only = vec![0.0; nv];
        long_only[i] = 1.0;
        rows.push((long_only, 0.0, inf));

        let cap = constraints.max_weights[i];
        if cap < 1.0 {
            let mut row = vec![0.0; nv];
            row[i] = 1.0;
            row[n] = -cap;
            rows.push((row, -inf, 0.0));
        }
    }

    for sector in &constraints.sectors {
        if sector.max_weight < 1.0 {
            let mut row = vec![0.0; nv];
            for &i in &sector.asset_indices {
                row[i] = 1.0;
            }
            row[n] = -sector.max_weight;
            rows.push((row, -inf, 0.0));
        }
        if sector.min_weight > 0.0 {
            let mut row = vec![0.0; nv];
            for &i in &sector.asset_indices {
                row[i] = 1.0;
            }
            row[n] = -sector.min_weight;
            rows.push((row, 0.0, inf));
        }
    }

    let mut scale = vec![0.0; nv];
    scale[n] = 1.0;
    rows.push((scale, 0.0, inf));

    let m = rows.len();
    let mut a = DMatrix::zeros(m, nv);
    let mut lower = DVector::zeros(m);
    let mut upper = DVector::zeros(m);
    for (r, (coefs, lo, hi)) in rows.into_iter().enumerate() {
        for (c, v) in coefs.into_iter().enumerate() {
            a[(r, c)] = v;
        }
        lower[r] = lo;
        upper[r] = hi;
    }

    QuadraticProgram {
        p,
        q: DVector::zeros(nv),
        a,
        lower,
        upper,
    }
}

/// Reject constraint sets that obviously cannot hold a fully invested,
/// positive-excess portfolio before calling the solver.
fn check_feasibility(
    mu: &DVector<f64>,
    hurdle: f64,
    constraints: &PortfolioConstraints,
) -> EngineResult<()> {
    if !mu.iter().any(|m| *m - hurdle > 0.0) {
        return Err(EngineError::Infeasible(format!(
            "no asset has an expected return above the hurdle {:.4}",
            hurdle
        )));
    }

    let n = mu.len();
    let mut covered = vec![false; n];
    let mut capacity = 0.0;
    let mut floor = 0.0;
    for sector in &constraints.sectors {
        let member_capacity: f64 = sector
            .asset_indices
            .iter()
            .map(|&i| constraints.max_weights[i])
            .sum();
        if sector.min_weight > member_capacity + BOUND_TOLERANCE {
            return Err(EngineError::Infeasible(format!(
                "sector {} needs {:.4} but its assets can hold at most {:.4}",
                sector.name, sector.min_weight, member_capacity
            )));
        }
        capacity += sector.max_weight.min(member_capacity);
        floor += sector.min_weight;
        for &i in &sector.asset_indices {
            covered[i] = true;
        }
    }
    capacity += (0..n)
        .filter(|&i| !covered[i])
        .map(|i| constraints.max_weights[i])
        .sum::<f64>();

    if capacity < 1.0 - BOUND_TOLERANCE {
        return Err(EngineError::Infeasible(format!(
            "upper bounds sum to {:.4}, below full investment",
            capacity
        )));
    }
    if floor > 1.0 + BOUND_TOLERANCE {
        return Err(EngineError::Infeasible(format!(
            "sector minimums sum to {:.4}, above full investment",
            floor
        )));
    }
    Ok(())
}

fn validate_input(
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    constraints: &PortfolioConstraints,
) -> EngineResult<()> {
    let n = mu.len();
    if n == 0 {
        return Err(EngineError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if sigma.shape() != (n, n) {
        return Err(EngineError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected {}x{} but got {:?}", n, n, sigma.shape()),
        });
    }
    if constraints.max_weights.len() != n {
        return Err(EngineError::InvalidInput {
            field: "constraints.max_weights".into(),
            reason: format!("Expected {} values but got {}", n, constraints.max_weights.len()),
        });
    }
    if constraints.gamma < 0.0 {
        return Err(EngineError::InvalidInput {
            field: "constraints.gamma".into(),
            reason: "must be non-negative".into(),
        });
    }
    for (si, sc) in constraints.sectors.iter().enumerate() {
        if let Some(&idx) = sc.asset_indices.iter().find(|&&i| i >= n) {
            return Err(EngineError::InvalidInput {
                field: format!("constraints.sectors[{}]", si),
                reason: format!("Asset index {} out of range (n={})", idx, n),
            });
        }
        if sc.min_weight > sc.max_weight {
            return Err(EngineError::Infeasible(format!(
                "sector {} has min_weight {} above max_weight {}",
                sc.name, sc.min_weight, sc.max_weight
            )));
        }
    }
    if mu.iter().any(|m| !m.is_finite()) || sigma.iter().any(|s| !s.is_finite()) {
        return Err(EngineError::InvalidInput {
            field: "expected_returns".into(),
            reason: "non-finite value".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// Zero weights below `cutoff` in magnitude, then round.
pub fn clean_weights(weights: &[f64], cutoff: f64, decimals: u32) -> Vec<f64> {
    let factor = 10f64.powi(decimals as i32);
    weights
        .iter()
        .map(|w| {
            if w.abs() < cutoff {
                0.0
            } else {
                (w * factor).round() / factor
            }
        })
        .collect()
}

pub fn portfolio_performance(
    weights: &DVector<f64>,
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    hurdle: f64,
) -> PortfolioPerformance {
    let expected_return = weights.dot(mu);
    let volatility = (weights.transpose() * sigma * weights)[(0, 0)].max(0.0).sqrt();
    let sharpe_ratio = if volatility == 0.0 {
        0.0
    } else {
        (expected_return - hurdle) / volatility
    };
    PortfolioPerformance {
        expected_return,
        volatility,
        sharpe_ratio,
    }
}
