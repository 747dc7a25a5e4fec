//! Augmented Newton iteration for a single eigenpair.
//!
//! Newton's method applied to the extended system [M(λ)v; cᴴv − 1] = 0 with c = v. Each step
//! costs one linear solve with M(λ):
//!
//! t = M(λ)⁻¹ M'(λ) v,    λ ← λ − (vᴴv)/(vᴴt),    v ← t / ‖t‖.
//!
//! The iteration converges quadratically to a simple eigenvalue from a good enough starting
//! guess and is used both as a standalone refinement tool and as one of the inner strategies of
//! the projection method.

use crate::error::NepError;
use crate::errmeasure::ErrMeasure;
use crate::linsolve::{DefaultLinSolverCreator, LinSolverCreator};
use crate::logger::{default_logger, Logger};
use crate::nep::Nep;
use crate::results::{Eigenpairs, PartialSolution, SolveResult};
use crate::utils::{dot, normalized};
use derive_builder::Builder;
use faer::{c64, MatRef};
use std::sync::Arc;

/// Settings for [`augnewton`].
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct NewtonSettings {
    /// Convergence tolerance on the error measure.
    #[builder(default = "100.0 * f64::EPSILON")]
    pub tol: f64,

    /// Maximum number of Newton steps.
    #[builder(default = "10")]
    pub maxit: usize,

    #[builder(default)]
    pub errmeasure: ErrMeasure,

    #[builder(default = "Arc::new(DefaultLinSolverCreator)")]
    pub linsolvercreator: Arc<dyn LinSolverCreator>,

    #[builder(default = "default_logger()")]
    pub logger: Arc<dyn Logger>,
}

impl NewtonSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(tol) = self.tol {
            if !(tol > 0.0) {
                return Err(format!("tol must be positive, got {tol}"));
            }
        }
        Ok(())
    }
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            tol: 100.0 * f64::EPSILON,
            maxit: 10,
            errmeasure: ErrMeasure::default(),
            linsolvercreator: Arc::new(DefaultLinSolverCreator),
            logger: default_logger(),
        }
    }
}

/// Refines the eigenpair guess `(lambda, v)` with augmented Newton.
///
/// # Arguments
/// * `nep`: The problem.
/// * `lambda`: Starting eigenvalue guess.
/// * `v`: Starting eigenvector guess (n×1, nonzero).
/// * `settings`: Tolerance, iteration budget and collaborators.
///
/// # Returns
/// [`SolveResult::Converged`] with one eigenpair, or [`SolveResult::Partial`] whose single
/// candidate is the last iterate when the budget runs out. Linear-solve failures propagate.
pub fn augnewton(
    nep: &dyn Nep,
    lambda: c64,
    v: MatRef<'_, c64>,
    settings: &NewtonSettings,
) -> Result<SolveResult, NepError> {
    let n = nep.size();
    if v.nrows() != n || v.ncols() != 1 {
        return Err(NepError::invalid(format!(
            "start vector must be {n}×1, got {}×{}",
            v.nrows(),
            v.ncols()
        )));
    }
    let mut v = normalized(v);
    if v.norm_l2() == 0.0 {
        return Err(NepError::invalid("start vector must be nonzero"));
    }
    let mut lambda = lambda;
    let mut err = f64::INFINITY;

    for k in 0..=settings.maxit {
        err = settings.errmeasure.measure(nep, lambda, v.as_ref());
        settings.logger.push_info(
            &format!("augnewton iteration {k}: err = {err:.3e}, λ = {lambda}"),
            2,
            false,
        );
        if err < settings.tol {
            let mut pairs = Eigenpairs::empty(n);
            pairs.push(lambda, v.as_ref());
            return Ok(SolveResult::Converged(pairs));
        }
        if k == settings.maxit {
            break;
        }

        let z = nep.compute_mlincomb(lambda, v.as_ref(), &[c64::new(1.0, 0.0)], 1);
        let solver = settings.linsolvercreator.create(nep, lambda)?;
        let t = solver.solve(z.as_ref(), settings.tol)?;
        let denom = dot(v.as_ref(), t.as_ref());
        if denom == c64::new(0.0, 0.0) || !denom.re.is_finite() || !denom.im.is_finite() {
            return Err(NepError::breakdown("augmented Newton correction is orthogonal to the iterate"));
        }
        lambda -= dot(v.as_ref(), v.as_ref()) / denom;
        v = normalized(t.as_ref());
    }

    let mut candidates = Eigenpairs::empty(n);
    candidates.push(lambda, v.as_ref());
    Ok(SolveResult::Partial(PartialSolution {
        converged: Eigenpairs::empty(n),
        candidates,
        last_error: err,
        message: format!(
            "augmented Newton did not converge in {} iterations (err = {err:.3e})",
            settings.maxit
        ),
    }))
}
