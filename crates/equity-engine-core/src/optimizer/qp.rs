//! Dense ADMM solver for convex quadratic programs
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  l ≤ Ax ≤ u
//! ```
//!
//! Operator splitting with a cached Cholesky factor of the reduced KKT
//! matrix, over-relaxation and periodic step-size adaptation. Problems here
//! have a few dozen variables, so dense factorizations are enough.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::EngineResult;

const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;
const RHO_EQUALITY_SCALE: f64 = 1e3;
const BOUND_INFINITY: f64 = 1e20;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    pub p: DMatrix<f64>,
    pub q: DVector<f64>,
    pub a: DMatrix<f64>,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmSettings {
    pub rho: f64,
    pub sigma: f64,
    /// Over-relaxation in (0, 2).
    pub alpha: f64,
    pub eps_abs: f64,
    pub eps_rel: f64,
    pub eps_primal_infeasible: f64,
    pub max_iter: u32,
    /// Iterations between convergence checks and step-size updates.
    pub check_every: u32,
}

impl Default for AdmmSettings {
    fn default() -> Self {
        Self {
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            eps_abs: 1e-7,
            eps_rel: 1e-7,
            eps_primal_infeasible: 1e-5,
            max_iter: 50_000,
            check_every: 25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: DVector<f64>,
    /// Constraint duals.
    pub y: DVector<f64>,
    pub iterations: u32,
    pub primal_residual: f64,
    pub dual_residual: f64,
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

pub fn solve(qp: &QuadraticProgram, settings: &AdmmSettings) -> EngineResult<QpSolution> {
    validate(qp)?;
    let n = qp.p.nrows();
    let m = qp.a.nrows();

    let row_kind: Vec<RowKind> = (0..m)
        .map(|i| RowKind::of(qp.lower[i], qp.upper[i]))
        .collect();
    let mut rho_scalar = settings.rho;
    let mut rho = rho_vector(&row_kind, rho_scalar);
    let mut kkt = factor(qp, &rho, settings.sigma)?;

    let at = qp.a.transpose();
    let mut x = DVector::<f64>::zeros(n);
    let mut z = DVector::<f64>::zeros(m);
    let mut y = DVector::<f64>::zeros(m);
    let mut primal_residual = f64::INFINITY;
    let mut dual_residual = f64::INFINITY;

    for iter in 1..=settings.max_iter {
        let y_prev = y.clone();

        let rhs = &x * settings.sigma - &qp.q + &at * (rho.component_mul(&z) - &y);
        let x_tilde = kkt.solve(&rhs);
        let z_tilde = &qp.a * &x_tilde;

        let x_next = &x_tilde * settings.alpha + &x * (1.0 - settings.alpha);
        let z_relaxed = &z_tilde * settings.alpha + &z * (1.0 - settings.alpha);
        let mut z_next = &z_relaxed + y.component_div(&rho);
        for i in 0..m {
            z_next[i] = z_next[i].clamp(qp.lower[i], qp.upper[i]);
        }
        y += rho.component_mul(&(&z_relaxed - &z_next));
        x = x_next;
        z = z_next;

        if iter % settings.check_every != 0 && iter != settings.max_iter {
            continue;
        }

        let ax = &qp.a * &x;
        let px = &qp.p * &x;
        let aty = &at * &y;
        primal_residual = (&ax - &z).amax();
        dual_residual = (&px + &qp.q + &aty).amax();

        let primal_scale = ax.amax().max(z.amax());
        let dual_scale = px.amax().max(aty.amax()).max(qp.q.amax());
        let eps_primal = settings.eps_abs + settings.eps_rel * primal_scale;
        let eps_dual = settings.eps_abs + settings.eps_rel * dual_scale;

        if primal_residual <= eps_primal && dual_residual <= eps_dual {
            debug!(iterations = iter, primal_residual, dual_residual, "qp converged");
            return Ok(QpSolution {
                x,
                y,
                iterations: iter,
                primal_residual,
                dual_residual,
            });
        }

        let delta_y = &y - &y_prev;
        if certifies_primal_infeasibility(qp, &at, &delta_y, settings.eps_primal_infeasible) {
            return Err(EngineError::Infeasible(format!(
                "constraints admit no solution (certificate found after {} iterations)",
                iter
            )));
        }

        // Balance the residuals by rescaling the step size.
        let primal_ratio = primal_residual / (primal_scale + 1e-30);
        let dual_ratio = dual_residual / (dual_scale + 1e-30);
        let proposal = (rho_scalar * (primal_ratio / (dual_ratio + 1e-30)).sqrt())
            .clamp(RHO_MIN, RHO_MAX);
        if proposal > 5.0 * rho_scalar || proposal < rho_scalar / 5.0 {
            rho_scalar = proposal;
            rho = rho_vector(&row_kind, rho_scalar);
            kkt = factor(qp, &rho, settings.sigma)?;
        }
    }

    Err(EngineError::ConvergenceFailure {
        function: "admm quadratic program".into(),
        iterations: settings.max_iter,
        last_delta: primal_residual.max(dual_residual),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RowKind {
    Free,
    Equality,
    Inequality,
}

impl RowKind {
    fn of(lower: f64, upper: f64) -> Self {
        if lower <= -BOUND_INFINITY && upper >= BOUND_INFINITY {
            RowKind::Free
        } else if (upper - lower).abs() < 1e-12 {
            RowKind::Equality
        } else {
            RowKind::Inequality
        }
    }
}

fn rho_vector(kinds: &[RowKind], rho: f64) -> DVector<f64> {
    DVector::from_iterator(
        kinds.len(),
        kinds.iter().map(|k| match k {
            RowKind::Free => RHO_MIN,
            RowKind::Equality => RHO_EQUALITY_SCALE * rho,
            RowKind::Inequality => rho,
        }),
    )
}

/// Factor `P + σI + Aᵀ diag(ρ) A`.
fn factor(
    qp: &QuadraticProgram,
    rho: &DVector<f64>,
    sigma: f64,
) -> EngineResult<Cholesky<f64, Dyn>> {
    let n = qp.p.nrows();
    let mut scaled_a = qp.a.clone();
    for (i, mut row) in scaled_a.row_iter_mut().enumerate() {
        row *= rho[i];
    }
    let kkt = &qp.p + DMatrix::<f64>::identity(n, n) * sigma + qp.a.transpose() * scaled_a;
    Cholesky::new(kkt).ok_or_else(|| EngineError::InvalidInput {
        field: "p".into(),
        reason: "objective matrix is not positive semidefinite".into(),
    })
}

/// A dual step `δy` with `Aᵀδy ≈ 0` and `uᵀδy₊ + lᵀδy₋ < 0` proves that no
/// `x` satisfies the bounds.
fn certifies_primal_infeasibility(
    qp: &QuadraticProgram,
    at: &DMatrix<f64>,
    delta_y: &DVector<f64>,
    eps: f64,
) -> bool {
    let norm = delta_y.amax();
    if norm <= eps {
        return false;
    }
    if (at * delta_y).amax() > eps * norm {
        return false;
    }
    let mut support = 0.0;
    for i in 0..delta_y.len() {
        let d = delta_y[i];
        if d > 0.0 {
            if qp.upper[i] >= BOUND_INFINITY {
                return false;
            }
            support += qp.upper[i] * d;
        } else if d < 0.0 {
            if qp.lower[i] <= -BOUND_INFINITY {
                return false;
            }
            support += qp.lower[i] * d;
        }
    }
    support < -eps * norm
}

fn validate(qp: &QuadraticProgram) -> EngineResult<()> {
    let n = qp.p.nrows();
    let m = qp.a.nrows();
    if n == 0 || qp.p.ncols() != n {
        return Err(EngineError::InvalidInput {
            field: "p".into(),
            reason: format!("expected a non-empty square matrix, got {:?}", qp.p.shape()),
        });
    }
    if qp.q.len() != n || qp.a.ncols() != n {
        return Err(EngineError::InvalidInput {
            field: "a".into(),
            reason: format!("dimension mismatch with {} variables", n),
        });
    }
    if qp.lower.len() != m || qp.upper.len() != m {
        return Err(EngineError::InvalidInput {
            field: "bounds".into(),
            reason: format!("expected {} bounds", m),
        });
    }
    for i in 0..m {
        if qp.lower[i] > qp.upper[i] {
            return Err(EngineError::Infeasible(format!(
                "row {} has lower bound {} above upper bound {}",
                i, qp.lower[i], qp.upper[i]
            )));
        }
    }
    Ok(())
}

/// Stand-in for an absent bound.
pub fn unbounded() -> f64 {
    BOUND_INFINITY
}
