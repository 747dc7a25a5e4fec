//! This module provides a high-level API for the eigensolvers.
//!
//! The functions here wrap the algorithms in [`crate::algorithms`] and surface budget
//! exhaustion as [`NepErrorKind::NoConvergence`] instead of a partial result, so a caller who
//! only wants eigenpairs can use `?` throughout. The partial data is still reachable through
//! [`NepError::partial`].
//!
//! [`NepErrorKind::NoConvergence`]: crate::error::NepErrorKind::NoConvergence

use crate::{
    algorithms::{
        beyn::{self, BeynSettings},
        iar::{self, IarSettings},
        iar_chebyshev,
        jacobi_davidson::{self, JacobiDavidsonSettings},
        newton::{self, NewtonSettings},
        sgiter::{self, SgIterSettings},
    },
    error::NepError,
    nep::Nep,
    results::Eigenpairs,
};
use faer::{c64, MatRef};

pub use crate::algorithms::inner::inner_solve;
pub use crate::algorithms::nleigs::nleigs;
pub use crate::algorithms::polyeig::polyeig;
pub use crate::quadrature::integrate_interval;

/// Computes eigenpairs of `nep` closest to a target with the Jacobi–Davidson method.
///
/// # Arguments
/// * `nep`: The nonlinear eigenvalue problem. `settings.maxit` must not exceed its dimension.
/// * `settings`: Number of wanted eigenpairs, tolerance, start data, projection type,
///   orthogonalization method and inner-solver strategy.
///
/// # Returns
/// A `Result` containing exactly `settings.neigs` eigenpairs in the order they were accepted,
/// or a `NepError`. Each accepted pair satisfies the error measure to `settings.tol`, and the
/// accepted eigenvalues are pairwise separated by a relative distance of ε^{1/4}.
pub fn jacobi_davidson(nep: &dyn Nep, settings: &JacobiDavidsonSettings) -> Result<Eigenpairs, NepError> {
    jacobi_davidson::jacobi_davidson(nep, settings)?.into_result()
}

/// Computes the eigenvalues inside a circle with Beyn's contour-integral method.
///
/// # Arguments
/// * `nep`: The nonlinear eigenvalue problem.
/// * `settings`: Contour, number of probes, quadrature rule and number of points.
///
/// # Returns
/// A `Result` containing the eigenpairs found inside the contour, closest to its center first.
pub fn contour_beyn(nep: &dyn Nep, settings: &BeynSettings) -> Result<Eigenpairs, NepError> {
    beyn::contour_beyn(nep, settings)?.into_result()
}

/// Computes eigenpairs closest to `settings.sigma` with the infinite Arnoldi method in the
/// Taylor basis.
///
/// # Returns
/// A `Result` containing `settings.neigs` eigenpairs, or a `NepError`.
pub fn iar(nep: &dyn Nep, settings: &IarSettings) -> Result<Eigenpairs, NepError> {
    iar::iar(nep, settings)?.into_result()
}

/// Computes eigenpairs closest to `settings.sigma` with the infinite Arnoldi method in a
/// Chebyshev basis. This is the method of choice for delay problems.
///
/// # Returns
/// A `Result` containing `settings.neigs` eigenpairs, or a `NepError`.
pub fn iar_chebyshev(nep: &dyn Nep, settings: &IarSettings) -> Result<Eigenpairs, NepError> {
    iar_chebyshev::iar_chebyshev(nep, settings)?.into_result()
}

/// Refines an eigenpair approximation with augmented Newton.
///
/// # Arguments
/// * `nep`: The nonlinear eigenvalue problem.
/// * `lambda`: The eigenvalue guess.
/// * `v`: The eigenvector guess, an n×1 nonzero column.
/// * `settings`: Tolerance and iteration budget.
///
/// # Returns
/// A `Result` containing the single refined eigenpair, or a `NepError`.
pub fn augnewton(
    nep: &dyn Nep,
    lambda: c64,
    v: MatRef<'_, c64>,
    settings: &NewtonSettings,
) -> Result<Eigenpairs, NepError> {
    newton::augnewton(nep, lambda, v, settings)?.into_result()
}

/// Computes the `j`-th largest eigenvalue of a Hermitian problem with the safeguarded
/// iteration.
///
/// # Returns
/// A `Result` containing one eigenpair with a real eigenvalue, or a `NepError`.
pub fn sgiter(nep: &dyn Nep, j: usize, settings: &SgIterSettings) -> Result<Eigenpairs, NepError> {
    sgiter::sgiter(nep, j, settings)?.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NepErrorKind;
    use crate::logger::NoLogger;
    use crate::nep::SpmfNep;
    use faer::Mat;
    use std::sync::Arc;

    #[test]
    fn exhausted_budget_becomes_no_convergence() {
        let nep = SpmfNep::delay(vec![Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0))], &[1.0]).unwrap();
        let settings = newton::NewtonSettingsBuilder::default()
            .maxit(1)
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        let v = Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0));
        let err = augnewton(&nep, c64::new(3.0, 0.0), v.as_ref(), &settings).unwrap_err();
        assert!(matches!(err.kind(), NepErrorKind::NoConvergence(_)));
        assert_eq!(err.partial().map(|p| p.candidates.len()), Some(1));
    }

    #[test]
    fn converged_runs_return_eigenpairs() {
        let nep = SpmfNep::delay(vec![Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0))], &[1.0]).unwrap();
        let settings = newton::NewtonSettingsBuilder::default()
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        let v = Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0));
        let pairs = augnewton(&nep, c64::new(0.5, 0.0), v.as_ref(), &settings).unwrap();
        assert_eq!(pairs.len(), 1);
    }
}
