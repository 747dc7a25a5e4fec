//! Safeguarded iteration for Hermitian problems with a min-max characterization.
//!
//! For Hermitian M(λ) on a real interval, the j-th eigenvalue is the fixed point of
//! λ ← p(v_j(λ)), where v_j(λ) is the eigenvector of the j-th largest eigenvalue of M(λ) and
//! p(v) is the Rayleigh functional, the root of vᴴM(p)v = 0 inside the interval.

use super::dense_eigen;
use crate::error::NepError;
use crate::errmeasure::ErrMeasure;
use crate::logger::{default_logger, Logger};
use crate::nep::Nep;
use crate::results::{Eigenpairs, PartialSolution, SolveResult};
use crate::utils::dot;
use derive_builder::Builder;
use faer::{c64, Mat, MatRef};
use std::sync::Arc;

/// Settings for [`sgiter`].
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SgIterSettings {
    #[builder(default = "f64::NEG_INFINITY")]
    pub lambda_min: f64,

    #[builder(default = "f64::INFINITY")]
    pub lambda_max: f64,

    /// Starting point. Defaults to the midpoint of a finite interval, 0 otherwise (clamped).
    #[builder(default, setter(strip_option))]
    pub lambda: Option<f64>,

    #[builder(default = "1e4 * f64::EPSILON")]
    pub tol: f64,

    #[builder(default = "100")]
    pub maxit: usize,

    #[builder(default)]
    pub errmeasure: ErrMeasure,

    #[builder(default = "default_logger()")]
    pub logger: Arc<dyn Logger>,
}

impl SgIterSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        let lo = self.lambda_min.unwrap_or(f64::NEG_INFINITY);
        let hi = self.lambda_max.unwrap_or(f64::INFINITY);
        if !(lo < hi) {
            return Err(format!("empty interval ({lo}, {hi})"));
        }
        Ok(())
    }
}

impl Default for SgIterSettings {
    fn default() -> Self {
        Self {
            lambda_min: f64::NEG_INFINITY,
            lambda_max: f64::INFINITY,
            lambda: None,
            tol: 1e4 * f64::EPSILON,
            maxit: 100,
            errmeasure: ErrMeasure::default(),
            logger: default_logger(),
        }
    }
}

const RAYLEIGH_MAXIT: usize = 50;

/// Computes the `j`-th eigenvalue (j = 1 is the largest) of a Hermitian problem.
///
/// # Errors
/// `InvalidConfiguration` when `j` is outside `1..=n`; `NumericalBreakdown` when the Rayleigh
/// functional cannot be evaluated (vanishing derivative).
pub fn sgiter(nep: &dyn Nep, j: usize, settings: &SgIterSettings) -> Result<SolveResult, NepError> {
    let n = nep.size();
    if j == 0 || j > n {
        return Err(NepError::invalid(format!("eigenvalue index {j} outside 1..={n}")));
    }
    let (lo, hi) = (settings.lambda_min, settings.lambda_max);
    if !(lo < hi) {
        return Err(NepError::invalid(format!("empty interval ({lo}, {hi})")));
    }
    let start = settings.lambda.unwrap_or(if lo.is_finite() && hi.is_finite() {
        0.5 * (lo + hi)
    } else {
        0.0
    });
    let mut lambda = start.clamp(lo, hi);
    let mut v = jth_eigenvector(nep, lambda, j)?;
    let mut err = f64::INFINITY;

    for k in 0..settings.maxit {
        lambda = rayleigh_functional(nep, v.as_ref(), lambda, lo, hi)?;
        err = settings.errmeasure.measure(nep, c64::new(lambda, 0.0), v.as_ref());
        settings
            .logger
            .push_info(&format!("sgiter iteration {k}: err = {err:.3e}, λ = {lambda}"), 2, false);
        if err < settings.tol {
            let mut pairs = Eigenpairs::empty(n);
            pairs.push(c64::new(lambda, 0.0), v.as_ref());
            return Ok(SolveResult::Converged(pairs));
        }
        v = jth_eigenvector(nep, lambda, j)?;
    }

    let mut candidates = Eigenpairs::empty(n);
    candidates.push(c64::new(lambda, 0.0), v.as_ref());
    Ok(SolveResult::Partial(PartialSolution {
        converged: Eigenpairs::empty(n),
        candidates,
        last_error: err,
        message: format!("sgiter did not converge in {} iterations", settings.maxit),
    }))
}

/// Eigenvector of the j-th largest eigenvalue of the Hermitian part of M(λ).
fn jth_eigenvector(nep: &dyn Nep, lambda: f64, j: usize) -> Result<Mat<c64>, NepError> {
    let m = nep.compute_mm(c64::new(lambda, 0.0));
    let hermitian = Mat::from_fn(m.nrows(), m.ncols(), |r, c| (m[(r, c)] + m[(c, r)].conj()) * 0.5);
    let (values, vectors) = dense_eigen(hermitian.as_ref())?;
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].re.total_cmp(&values[a].re));
    let idx = order[j - 1];
    Ok(vectors.as_ref().get(.., idx..idx + 1).to_owned())
}

/// Root of vᴴM(p)v = 0 by Newton's method, kept inside [lo, hi] by halving towards the violated
/// bound.
fn rayleigh_functional(nep: &dyn Nep, v: MatRef<'_, c64>, start: f64, lo: f64, hi: f64) -> Result<f64, NepError> {
    let mut p = start;
    let one = [c64::new(1.0, 0.0)];
    for _ in 0..RAYLEIGH_MAXIT {
        let at = c64::new(p, 0.0);
        let f = dot(v, nep.compute_mlincomb(at, v, &one, 0).as_ref()).re;
        let df = dot(v, nep.compute_mlincomb(at, v, &one, 1).as_ref()).re;
        if df == 0.0 || !df.is_finite() {
            return Err(NepError::breakdown(format!(
                "Rayleigh functional has a vanishing derivative at {p}"
            )));
        }
        let mut next = p - f / df;
        if next < lo {
            next = 0.5 * (p + lo);
        } else if next > hi {
            next = 0.5 * (p + hi);
        }
        if (next - p).abs() <= 100.0 * f64::EPSILON * p.abs().max(1.0) {
            return Ok(next);
        }
        p = next;
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nep::{NepTerm, ScalarFunction, SpmfNep};
    use crate::utils::identity;

    fn hermitian_linear(diagonal: &[f64]) -> SpmfNep {
        let n = diagonal.len();
        let a = Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(diagonal[i], 0.0)
            } else {
                c64::new(0.0, 0.0)
            }
        });
        let id = identity(n);
        let minus_identity = Mat::from_fn(n, n, |i, j| -id[(i, j)]);
        SpmfNep::new(vec![
            NepTerm::new(a, ScalarFunction::Power(0)),
            NepTerm::new(minus_identity, ScalarFunction::Power(1)),
        ])
        .unwrap()
    }

    #[test]
    fn index_counts_from_the_largest_eigenvalue() {
        let nep = hermitian_linear(&[1.0, 4.0, 2.0, 3.0]);
        let settings = SgIterSettings::default();
        for (j, want) in [(1, 4.0), (2, 3.0), (4, 1.0)] {
            let pairs = sgiter(&nep, j, &settings).unwrap().into_result().unwrap();
            assert!((pairs.eigenvalues[0].re - want).abs() < 1e-10, "j = {j}");
        }
    }

    #[test]
    fn index_out_of_range_is_rejected() {
        let nep = hermitian_linear(&[1.0, 2.0]);
        assert!(sgiter(&nep, 0, &SgIterSettings::default()).is_err());
        assert!(sgiter(&nep, 3, &SgIterSettings::default()).is_err());
    }

    #[test]
    fn empty_interval_is_rejected_by_builder() {
        assert!(SgIterSettingsBuilder::default()
            .lambda_min(1.0)
            .lambda_max(0.0)
            .build()
            .is_err());
    }
}
