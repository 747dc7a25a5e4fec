//! Jacobi–Davidson for nonlinear eigenvalue problems (Betcke–Voss variant).
//!
//! The method grows a search space V (and, in the two-sided variant, a test space W) by one
//! vector per iteration. Each iteration:
//!
//! 1. projects the problem onto (V, W), giving a small NEP Wᴴ M(λ) V;
//! 2. solves the projected problem around the origin with an inner strategy (see
//!    [`super::inner`]);
//! 3. selects the Ritz pair nearest the target that is not yet deflated;
//! 4. accepts it if its error is below tolerance and it is well separated from the eigenvalues
//!    accepted so far;
//! 5. expands V with the correction Δu = M(λ)⁻¹ M'(λ) u.
//!
//! The bases live in pre-allocated buffers of `maxit + 1` columns and are never shrunk.

use super::inner::{inner_solve, InnerSolveOptions, InnerSolver};
use super::orthogonalization::{OrthMethod, SubspaceBasis};
use crate::error::NepError;
use crate::errmeasure::ErrMeasure;
use crate::linsolve::{DefaultLinSolverCreator, LinSolverCreator};
use crate::logger::{default_logger, Logger};
use crate::nep::{polynomial_coefficients, Nep};
use crate::projection::ProjectedNep;
use crate::results::{Eigenpairs, PartialSolution, SolveResult};
use crate::utils::{normalized, random_vector, sort_by_distance};
use derive_builder::Builder;
use faer::{c64, Mat, MatRef};
use std::sync::Arc;

/// How the test space W is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProjectionType {
    /// W = V.
    Galerkin,
    /// W spanned by M(λ) applied to the search directions.
    #[default]
    PetrovGalerkin,
}

/// Settings for [`jacobi_davidson`].
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct JacobiDavidsonSettings {
    /// Number of wanted eigenpairs.
    #[builder(default = "1")]
    pub neigs: usize,

    #[builder(default = "1e-10")]
    pub tol: f64,

    /// Iteration budget; must not exceed the problem dimension.
    #[builder(default = "100")]
    pub maxit: usize,

    /// Eigenvalue used to seed the test space of the two-sided variant.
    #[builder(default = "c64::new(0.0, 0.0)")]
    pub lambda: c64,

    /// Start vector (n×1, nonzero). A seeded random vector is used when absent.
    #[builder(default, setter(strip_option))]
    pub v: Option<Mat<c64>>,

    /// Eigenvalues closest to the target are found first.
    #[builder(default = "c64::new(0.0, 0.0)")]
    pub target: c64,

    #[builder(default)]
    pub projection: ProjectionType,

    #[builder(default)]
    pub orthmethod: OrthMethod,

    #[builder(default)]
    pub inner_solver: InnerSolver,

    #[builder(default)]
    pub errmeasure: ErrMeasure,

    #[builder(default = "Arc::new(DefaultLinSolverCreator)")]
    pub linsolvercreator: Arc<dyn LinSolverCreator>,

    #[builder(default = "default_logger()")]
    pub logger: Arc<dyn Logger>,
}

impl JacobiDavidsonSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.neigs == Some(0) {
            return Err("neigs must be at least 1".to_string());
        }
        if self.maxit == Some(0) {
            return Err("maxit must be at least 1".to_string());
        }
        if let Some(tol) = self.tol {
            if !(tol > 0.0) {
                return Err(format!("tol must be positive, got {tol}"));
            }
        }
        if self.inner_solver == Some(InnerSolver::SgIter)
            && self.projection.unwrap_or_default() == ProjectionType::PetrovGalerkin
        {
            return Err("the SGIter inner solver requires a Galerkin projection".to_string());
        }
        Ok(())
    }
}

impl Default for JacobiDavidsonSettings {
    fn default() -> Self {
        Self {
            neigs: 1,
            tol: 1e-10,
            maxit: 100,
            lambda: c64::new(0.0, 0.0),
            v: None,
            target: c64::new(0.0, 0.0),
            projection: ProjectionType::default(),
            orthmethod: OrthMethod::default(),
            inner_solver: InnerSolver::default(),
            errmeasure: ErrMeasure::default(),
            linsolvercreator: Arc::new(DefaultLinSolverCreator),
            logger: default_logger(),
        }
    }
}

/// Seed of the default start vector.
const START_SEED: u64 = 0x5EED;

/// Computes `settings.neigs` eigenpairs of `nep` closest to `settings.target`.
///
/// # Arguments
/// * `nep`: The problem.
/// * `settings`: Tolerances, budget, start data and strategy choices.
///
/// # Returns
/// [`SolveResult::Converged`] with exactly `neigs` eigenpairs, in the order they were accepted, or
/// [`SolveResult::Partial`] with the accepted pairs and the current candidate when `maxit`
/// iterations were not enough.
///
/// # Errors
/// * `InvalidConfiguration` for `maxit > n`, `neigs > n`, a bad start vector, or an inner
///   strategy that cannot handle the problem or the projection type.
/// * `NumericalBreakdown` when the inner solver returns nothing or the subspace cannot be
///   expanded.
pub fn jacobi_davidson(nep: &dyn Nep, settings: &JacobiDavidsonSettings) -> Result<SolveResult, NepError> {
    let n = nep.size();
    check_configuration(nep, settings)?;
    let v0 = match &settings.v {
        Some(v) => normalized(v.as_ref()),
        None => normalized(random_vector(n, START_SEED).as_ref()),
    };

    let logger = settings.logger.as_ref();
    let capacity = settings.maxit + 1;
    let mut vb = SubspaceBasis::with_capacity(n, capacity);
    let mut wb = SubspaceBasis::with_capacity(n, capacity);
    vb.push(v0.as_ref(), settings.orthmethod)?;
    if settings.projection == ProjectionType::PetrovGalerkin {
        let w0 = nep.apply(settings.lambda, v0.as_ref());
        wb.push(w0.as_ref(), settings.orthmethod)?;
    }
    let mut projected = ProjectedNep::new(nep, capacity);

    let deflation_radius = f64::EPSILON.powf(0.25);
    let mut accepted = Eigenpairs::empty(n);
    let mut lambda = settings.lambda;
    let mut u = v0;
    let mut err = f64::INFINITY;

    for k in 0..settings.maxit {
        let test_space = match settings.projection {
            ProjectionType::Galerkin => vb.active(),
            ProjectionType::PetrovGalerkin => wb.active(),
        };
        projected.set_projection(test_space, vb.active())?;

        let conveig = accepted.len();
        let options = inner_options(settings, conveig);
        let inner = inner_solve(settings.inner_solver, &projected, &options)?;
        if inner.is_empty() {
            return Err(NepError::breakdown(format!(
                "inner solver returned no eigenpairs at iteration {k}"
            )));
        }

        let order = sort_by_distance(&inner.eigenvalues, settings.target);
        let pick = order[(conveig + 1).min(order.len()) - 1];
        lambda = inner.eigenvalues[pick];
        let s = inner.eigenvectors.as_ref().get(.., pick..pick + 1);
        u = normalized((vb.active() * s).as_ref());
        err = settings.errmeasure.measure(nep, lambda, u.as_ref());
        logger.push_info(
            &format!(
                "JD iteration {k}: {conveig} converged, err = {err:.3e}, λ = {lambda}, subspace {}",
                vb.width()
            ),
            1,
            false,
        );

        if err < settings.tol {
            let separated = accepted
                .eigenvalues
                .iter()
                .all(|&mu| (lambda - mu).norm() > deflation_radius * mu.norm());
            if separated {
                accepted.push(lambda, u.as_ref());
                logger.push_info(&format!("JD accepted eigenvalue {} : {lambda}", accepted.len()), 1, false);
                if accepted.len() == settings.neigs {
                    return Ok(SolveResult::Converged(accepted));
                }
            } else {
                logger.push_info(
                    &format!("JD: λ = {lambda} is within the deflation radius of an accepted eigenvalue"),
                    2,
                    false,
                );
            }
        }

        if k + 1 == settings.maxit {
            break;
        }
        expand(nep, settings, lambda, u.as_ref(), &mut vb, &mut wb)?;
    }

    let message = format!(
        "Jacobi-Davidson reached maxit = {} with {} of {} eigenpairs",
        settings.maxit,
        accepted.len(),
        settings.neigs
    );
    logger.push_warning(&message);
    let mut candidates = Eigenpairs::empty(n);
    candidates.push(lambda, u.as_ref());
    Ok(SolveResult::Partial(PartialSolution {
        converged: accepted,
        candidates,
        last_error: err,
        message,
    }))
}

/// Options of the projected solve once `conveig` eigenpairs have been accepted.
///
/// The projected problem is always solved around the origin with guesses at zero; the target
/// only enters through the selection of the returned eigenpairs.
fn inner_options(settings: &JacobiDavidsonSettings, conveig: usize) -> InnerSolveOptions {
    let zero = c64::new(0.0, 0.0);
    InnerSolveOptions {
        neigs: conveig + 1,
        sigma: zero,
        lambda_guesses: vec![zero; conveig + 1],
        vector_guesses: None,
        tol: settings.tol,
        index: conveig + 1,
        logger: settings.logger.clone(),
    }
}

fn check_configuration(nep: &dyn Nep, settings: &JacobiDavidsonSettings) -> Result<(), NepError> {
    let n = nep.size();
    if settings.maxit > n {
        return Err(NepError::invalid(format!(
            "maxit = {} exceeds the problem dimension {n}",
            settings.maxit
        )));
    }
    if settings.neigs == 0 || settings.neigs > n {
        return Err(NepError::invalid(format!("neigs = {} outside 1..={n}", settings.neigs)));
    }
    if settings.maxit == 0 || !(settings.tol > 0.0) {
        return Err(NepError::invalid("maxit and tol must be positive"));
    }
    if settings.inner_solver == InnerSolver::SgIter && settings.projection == ProjectionType::PetrovGalerkin {
        return Err(NepError::invalid("the SGIter inner solver requires a Galerkin projection"));
    }
    if settings.inner_solver == InnerSolver::Polyeig && polynomial_coefficients(nep).is_none() {
        return Err(NepError::invalid("the Polyeig inner solver requires a polynomial problem"));
    }
    if let Some(v) = &settings.v {
        if v.nrows() != n || v.ncols() != 1 {
            return Err(NepError::invalid(format!(
                "start vector must be {n}×1, got {}×{}",
                v.nrows(),
                v.ncols()
            )));
        }
        if v.norm_l2() == 0.0 {
            return Err(NepError::invalid("start vector must be nonzero"));
        }
    }
    Ok(())
}

/// Appends the correction direction to V, and its image under M(λ) to W in the two-sided
/// variant.
///
/// Right after an eigenpair has been accepted the correction is nearly parallel to u and may
/// vanish after orthogonalization; the residual M(λ)u is used instead in that case.
fn expand(
    nep: &dyn Nep,
    settings: &JacobiDavidsonSettings,
    lambda: c64,
    u: MatRef<'_, c64>,
    vb: &mut SubspaceBasis,
    wb: &mut SubspaceBasis,
) -> Result<(), NepError> {
    let solver = settings.linsolvercreator.create(nep, lambda)?;
    let rhs = nep.compute_mlincomb(lambda, u, &[c64::new(1.0, 0.0)], 1);
    let correction = solver.solve(rhs.as_ref(), settings.tol)?;
    match vb.push(correction.as_ref(), settings.orthmethod) {
        Ok(_) => {}
        Err(err) if err.is_breakdown() => {
            settings
                .logger
                .push_info("JD: correction in the search space, expanding with the residual", 2, false);
            let residual = nep.apply(lambda, u);
            vb.push(residual.as_ref(), settings.orthmethod)?;
        }
        Err(err) => return Err(err),
    }

    if settings.projection == ProjectionType::PetrovGalerkin {
        let newest = vb.column(vb.width() - 1);
        let image = nep.apply(lambda, newest);
        wb.push(image.as_ref(), settings.orthmethod)?;
    }
    Ok(())
}
