//! Infinite Arnoldi (IAR) with a Taylor basis.
//!
//! The nonlinear problem M(λ)v = 0 is equivalent to a linear eigenproblem for the operator
//! 𝓑 acting on functions ψ: [−∞, 0] → ℂⁿ,
//!
//! 𝓑ψ = C + ∫₀^θ ψ,    with the constant C fixed by Σ_j M^{(j)}(σ) (𝓑ψ)^{(j)}(0)/j! = 0.
//!
//! An eigenvalue μ of 𝓑 gives the eigenvalue λ = σ + 1/μ of M. Arnoldi on 𝓑 started from a
//! constant function only ever produces polynomials, so the k-th Krylov vector is stored as k+1
//! coefficient blocks of length n and the basis lives in ℂ^{n(maxit+1)}.
//!
//! [`infinite_arnoldi`] is the basis-independent driver; this module supplies the monomial
//! expansion and [`super::iar_chebyshev`] a Chebyshev one.

use super::dense_eigen;
use super::orthogonalization::{OrthMethod, SubspaceBasis};
use crate::error::NepError;
use crate::errmeasure::ErrMeasure;
use crate::linsolve::{DefaultLinSolverCreator, LinSolverCreator};
use crate::logger::{default_logger, Logger};
use crate::nep::Nep;
use crate::results::{Eigenpairs, PartialSolution, SolveResult};
use crate::utils::{normalized, random_vector, sort_by_distance};
use derive_builder::Builder;
use faer::{c64, Mat, MatRef, Scale};
use std::sync::Arc;

/// Settings shared by [`iar`] and [`super::iar_chebyshev::iar_chebyshev`].
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct IarSettings {
    /// Expansion point; the eigenvalues closest to it converge first.
    #[builder(default = "c64::new(0.0, 0.0)")]
    pub sigma: c64,

    /// Number of wanted eigenpairs.
    #[builder(default = "6")]
    pub neigs: usize,

    /// Maximum number of Arnoldi steps.
    #[builder(default = "30")]
    pub maxit: usize,

    #[builder(default = "1e4 * f64::EPSILON")]
    pub tol: f64,

    /// Starting vector (n×1). A seeded random vector is used when absent.
    #[builder(default, setter(strip_option))]
    pub v: Option<Mat<c64>>,

    /// Interval [a, b] of the Chebyshev basis (Chebyshev variant only). Defaults to [−τ_max, 0]
    /// for delay problems and [−1, 1] otherwise.
    #[builder(default, setter(strip_option))]
    pub interval: Option<(f64, f64)>,

    #[builder(default)]
    pub errmeasure: ErrMeasure,

    #[builder(default)]
    pub orthmethod: OrthMethod,

    #[builder(default = "Arc::new(DefaultLinSolverCreator)")]
    pub linsolvercreator: Arc<dyn LinSolverCreator>,

    #[builder(default = "default_logger()")]
    pub logger: Arc<dyn Logger>,
}

impl IarSettingsBuilder {
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
        if let Some(Some((a, b))) = self.interval {
            if !(b > a) {
                return Err(format!("interval [{a}, {b}] is empty"));
            }
        }
        Ok(())
    }
}

impl Default for IarSettings {
    fn default() -> Self {
        Self {
            sigma: c64::new(0.0, 0.0),
            neigs: 6,
            maxit: 30,
            tol: 1e4 * f64::EPSILON,
            v: None,
            interval: None,
            errmeasure: ErrMeasure::default(),
            orthmethod: OrthMethod::default(),
            linsolvercreator: Arc::new(DefaultLinSolverCreator),
            logger: default_logger(),
        }
    }
}

/// Seed of the default starting vector.
const START_SEED: u64 = 0x1A2;

/// Infinite Arnoldi in the Taylor (monomial) basis.
///
/// # Returns
/// [`SolveResult::Converged`] with the `neigs` eigenpairs closest to σ, or
/// [`SolveResult::Partial`] carrying the converged pairs and the `neigs` Ritz pairs nearest to σ
/// when the Arnoldi budget runs out.
pub fn iar(nep: &dyn Nep, settings: &IarSettings) -> Result<SolveResult, NepError> {
    let n = nep.size();
    let sigma = settings.sigma;
    let tol = settings.tol;
    let solver = settings.linsolvercreator.create(nep, sigma)?;

    let expand = |x: MatRef<'_, c64>| -> Result<Mat<c64>, NepError> {
        let k1 = x.ncols();
        let mut y = Mat::<c64>::zeros(n, k1 + 1);
        for j in 1..=k1 {
            let integrated = Scale(c64::new((j as f64).recip(), 0.0)) * x.get(.., j - 1..j);
            y.as_mut().get_mut(.., j..j + 1).copy_from(&integrated);
        }
        let ones = vec![c64::new(1.0, 0.0); k1];
        let rhs = nep.compute_mlincomb(sigma, y.as_ref().get(.., 1..k1 + 1), &ones, 1);
        let y0 = solver.solve(rhs.as_ref(), tol)?;
        y.as_mut().get_mut(.., 0..1).copy_from(&(Scale(c64::new(-1.0, 0.0)) * &y0));
        Ok(y)
    };

    infinite_arnoldi(nep, settings, "IAR", expand, |y| y.get(.., 0..1).to_owned())
}

/// One Ritz pair of the truncated operator.
struct Ritz {
    lambda: c64,
    vector: Mat<c64>,
    err: f64,
}

/// Arnoldi on a polynomial function space.
///
/// `expand` maps the coefficient blocks of φ (n×(k+1)) to those of 𝓑φ (n×(k+2)); `evaluate`
/// maps coefficient blocks to the function value at θ = 0, which is the eigenvector
/// approximation.
pub(crate) fn infinite_arnoldi(
    nep: &dyn Nep,
    settings: &IarSettings,
    label: &str,
    mut expand: impl FnMut(MatRef<'_, c64>) -> Result<Mat<c64>, NepError>,
    evaluate: impl Fn(MatRef<'_, c64>) -> Mat<c64>,
) -> Result<SolveResult, NepError> {
    let n = nep.size();
    let maxit = settings.maxit;
    if n == 0 || settings.neigs == 0 || maxit == 0 {
        return Err(NepError::invalid(format!(
            "{label} needs n, neigs and maxit positive (n = {n}, neigs = {}, maxit = {maxit})",
            settings.neigs
        )));
    }
    let v0 = match &settings.v {
        Some(v) if v.nrows() == n && v.ncols() == 1 => v.clone(),
        Some(v) => {
            return Err(NepError::invalid(format!(
                "start vector must be {n}×1, got {}×{}",
                v.nrows(),
                v.ncols()
            )))
        }
        None => random_vector(n, START_SEED),
    };

    let rows = n * (maxit + 1);
    let mut basis = SubspaceBasis::with_capacity(rows, maxit + 1);
    let mut start = Mat::<c64>::zeros(rows, 1);
    start.as_mut().get_mut(0..n, ..).copy_from(&v0);
    basis.push(start.as_ref(), settings.orthmethod)?;
    let mut h = Mat::<c64>::zeros(maxit + 1, maxit);

    for k in 0..maxit {
        let column = basis.column(k);
        let x = Mat::from_fn(n, k + 1, |i, j| column[(j * n + i, 0)]);
        let y = expand(x.as_ref())?;
        let mut w = Mat::<c64>::zeros(rows, 1);
        for j in 0..y.ncols() {
            w.as_mut().get_mut(j * n..(j + 1) * n, ..).copy_from(y.get(.., j..j + 1));
        }

        let (hcol, invariant) = match basis.push(w.as_ref(), settings.orthmethod) {
            Ok(hcol) => (hcol, false),
            Err(err) if err.is_breakdown() => {
                let coeffs = basis.active().adjoint() * w.as_ref();
                let mut hcol: Vec<c64> = (0..coeffs.nrows()).map(|i| coeffs[(i, 0)]).collect();
                hcol.push(c64::new(0.0, 0.0));
                (hcol, true)
            }
            Err(err) => return Err(err),
        };
        for (i, &value) in hcol.iter().enumerate() {
            h[(i, k)] = value;
        }

        let ritz = ritz_pairs(nep, settings, &basis, h.as_ref(), k + 1, &evaluate)?;
        let converged: Vec<&Ritz> = ritz.iter().filter(|r| r.err < settings.tol).collect();
        let best = ritz.first().map_or(f64::INFINITY, |r| r.err);
        settings.logger.push_info(
            &format!(
                "{label} iteration {k}: {} converged, nearest err = {best:.3e}",
                converged.len()
            ),
            1,
            false,
        );

        if converged.len() >= settings.neigs {
            let mut pairs = Eigenpairs::empty(n);
            for r in converged.iter().take(settings.neigs) {
                pairs.push(r.lambda, r.vector.as_ref());
            }
            return Ok(SolveResult::Converged(pairs));
        }
        if invariant || k + 1 == maxit {
            let mut done = Eigenpairs::empty(n);
            for r in &converged {
                done.push(r.lambda, r.vector.as_ref());
            }
            let mut candidates = Eigenpairs::empty(n);
            for r in ritz.iter().take(settings.neigs) {
                candidates.push(r.lambda, r.vector.as_ref());
            }
            let reason = if invariant {
                format!("invariant subspace found after {} iterations", k + 1)
            } else {
                format!("reached maxit = {maxit}")
            };
            return Ok(SolveResult::Partial(PartialSolution {
                converged: done,
                candidates,
                last_error: best,
                message: format!(
                    "{label} {reason} with {} of {} eigenpairs",
                    converged.len(),
                    settings.neigs
                ),
            }));
        }
    }
    Err(NepError::invalid(format!("{label} needs maxit positive")))
}

/// Ritz pairs of the leading `size`×`size` Hessenberg block, nearest to σ first.
fn ritz_pairs(
    nep: &dyn Nep,
    settings: &IarSettings,
    basis: &SubspaceBasis,
    h: MatRef<'_, c64>,
    size: usize,
    evaluate: &impl Fn(MatRef<'_, c64>) -> Mat<c64>,
) -> Result<Vec<Ritz>, NepError> {
    let n = nep.size();
    let (mu, z) = dense_eigen(h.get(0..size, 0..size))?;
    let largest = mu.iter().map(|m| m.norm()).fold(0.0, f64::max);
    let vk = basis.active().get(.., 0..size);

    let mut pairs = Vec::with_capacity(size);
    for (i, &m) in mu.iter().enumerate() {
        if m.norm() <= f64::EPSILON * largest || m.norm() == 0.0 {
            continue;
        }
        let lambda = settings.sigma + m.inv();
        let y = vk * z.as_ref().get(.., i..i + 1);
        let blocks = Mat::from_fn(n, size, |r, j| y[(j * n + r, 0)]);
        let vector = normalized(evaluate(blocks.as_ref()).as_ref());
        let err = settings.errmeasure.measure(nep, lambda, vector.as_ref());
        pairs.push(Ritz { lambda, vector, err });
    }
    let values: Vec<c64> = pairs.iter().map(|r| r.lambda).collect();
    let order = sort_by_distance(&values, settings.sigma);
    let mut slots: Vec<Option<Ritz>> = pairs.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::polyeig::polyeig;
    use crate::logger::NoLogger;
    use crate::nep::SpmfNep;
    use crate::utils::to_complex;
    use faer::mat;

    const OMEGA: f64 = 0.567_143_290_409_783_8;

    fn scalar_dep() -> SpmfNep {
        SpmfNep::delay(vec![Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0))], &[1.0]).unwrap()
    }

    #[test]
    fn scalar_delay_problem_converges_to_omega() {
        let nep = scalar_dep();
        let settings = IarSettingsBuilder::default()
            .neigs(1)
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        let pairs = iar(&nep, &settings).unwrap().into_result().unwrap();
        assert_eq!(pairs.len(), 1);
        assert!((pairs.eigenvalues[0] - c64::new(OMEGA, 0.0)).norm() < 1e-10);
    }

    #[test]
    fn quadratic_eigenvalues_match_companion_linearization() {
        let nep = SpmfNep::polynomial(vec![
            to_complex(mat![[1.0, 3.0], [5.0, 6.0]].as_ref()),
            to_complex(mat![[3.0, 4.0], [6.0, 6.0]].as_ref()),
            to_complex(mat![[1.0, 0.0], [0.0, 1.0]].as_ref()),
        ])
        .unwrap();
        let reference = polyeig(&nep).unwrap();
        let settings = IarSettingsBuilder::default().neigs(2).build().unwrap();
        let pairs = iar(&nep, &settings).unwrap().into_result().unwrap();
        for &lambda in &pairs.eigenvalues {
            let closest = reference
                .eigenvalues
                .iter()
                .map(|r| (r - lambda).norm())
                .fold(f64::INFINITY, f64::min);
            assert!(closest < 1e-8, "λ = {lambda} is not an eigenvalue");
        }
    }

    #[test]
    fn tiny_budget_returns_candidates() {
        let nep = scalar_dep();
        let settings = IarSettingsBuilder::default().neigs(3).maxit(2).build().unwrap();
        match iar(&nep, &settings).unwrap() {
            SolveResult::Partial(partial) => {
                assert!(partial.converged.len() < 3);
                assert!(!partial.candidates.is_empty());
            }
            SolveResult::Converged(_) => panic!("two steps cannot produce three eigenpairs"),
        }
    }

    #[test]
    fn builder_rejects_zero_neigs() {
        assert!(IarSettingsBuilder::default().neigs(0).build().is_err());
    }
}
