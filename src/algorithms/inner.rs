//! Dispatch of projected problems to a concrete eigensolver.
//!
//! Projection methods reduce the original problem to a small dense NEP at every iteration and
//! need a handful of its eigenpairs. Which small solver fits depends on the structure of the
//! original problem, so the projected problem reports the original [`NepKind`] and
//! [`InnerSolver::resolve`] maps it to a strategy. Every strategy returns the same shape,
//! [`InnerSolution`], and absorbs partial convergence instead of failing the whole call.

use super::beyn::{contour_beyn, BeynSettingsBuilder};
use super::iar::{iar, IarSettings};
use super::iar_chebyshev::iar_chebyshev;
use super::newton::{augnewton, NewtonSettings};
use super::polyeig::polyeig;
use super::sgiter::{sgiter, SgIterSettings};
use crate::error::NepError;
use crate::errmeasure::ErrMeasure;
use crate::logger::{default_logger, Logger};
use crate::nep::{Nep, NepKind};
use crate::results::{Eigenpairs, SolveResult};
use faer::{c64, Mat};
use std::sync::Arc;

/// The strategy used for projected problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum InnerSolver {
    /// Pick from the kind of the original problem, see [`InnerSolver::resolve`].
    #[default]
    Default,
    /// Augmented Newton from every supplied guess.
    Newton,
    /// Companion linearization, polynomial problems only.
    Polyeig,
    /// Infinite Arnoldi, Taylor basis.
    Iar,
    /// Infinite Arnoldi, Chebyshev basis.
    IarChebyshev,
    /// Safeguarded iteration for Hermitian problems.
    SgIter,
    /// Beyn's contour-integral method.
    ContourBeyn,
}

impl InnerSolver {
    /// Replaces [`InnerSolver::Default`] by the strategy suited to `kind`; other strategies are
    /// returned unchanged.
    pub const fn resolve(self, kind: NepKind) -> InnerSolver {
        match self {
            InnerSolver::Default => match kind {
                NepKind::Polynomial => InnerSolver::Polyeig,
                NepKind::Delay => InnerSolver::IarChebyshev,
                NepKind::SumOfProducts => InnerSolver::Iar,
                NepKind::Generic => InnerSolver::Newton,
            },
            other => other,
        }
    }
}

/// Options understood by [`inner_solve`]. Strategies ignore the ones they have no use for.
#[derive(Debug, Clone)]
pub struct InnerSolveOptions {
    /// Number of wanted eigenpairs.
    pub neigs: usize,
    /// Target; Arnoldi-type strategies expand around it.
    pub sigma: c64,
    /// Eigenvalue guesses (Newton, contour radius).
    pub lambda_guesses: Vec<c64>,
    /// Eigenvector guesses, one column per eigenvalue guess (Newton).
    pub vector_guesses: Option<Mat<c64>>,
    pub tol: f64,
    /// Eigenvalue index for SGIter, 1 being the largest.
    pub index: usize,
    pub logger: Arc<dyn Logger>,
}

impl InnerSolveOptions {
    pub fn new(neigs: usize, tol: f64) -> Self {
        Self {
            neigs,
            sigma: c64::new(0.0, 0.0),
            lambda_guesses: Vec::new(),
            vector_guesses: None,
            tol,
            index: 1,
            logger: default_logger(),
        }
    }
}

/// Eigenpairs of a projected problem.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerSolution {
    pub eigenvalues: Vec<c64>,
    /// One unit column per eigenvalue.
    pub eigenvectors: Mat<c64>,
    /// Positions of returned pairs that did not meet the tolerance.
    pub unconverged: Vec<usize>,
}

impl InnerSolution {
    fn from_pairs(pairs: Eigenpairs, unconverged: Vec<usize>) -> Self {
        Self {
            eigenvalues: pairs.eigenvalues,
            eigenvectors: pairs.eigenvectors,
            unconverged,
        }
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }
}

const NEWTON_MAXIT: usize = 50;

/// Computes eigenpairs of `nep` with `strategy`.
///
/// # Errors
/// Configuration and numerical failures of the chosen strategy propagate. Running out of
/// iterations does not: the best available pairs are returned and listed in
/// [`InnerSolution::unconverged`].
pub fn inner_solve(strategy: InnerSolver, nep: &dyn Nep, options: &InnerSolveOptions) -> Result<InnerSolution, NepError> {
    let strategy = strategy.resolve(nep.kind());
    let n = nep.size();
    options
        .logger
        .push_info(&format!("inner solve with {strategy:?} on a {n}×{n} problem"), 2, false);

    match strategy {
        InnerSolver::Default | InnerSolver::Newton => newton_batch(nep, options),
        InnerSolver::Polyeig => Ok(InnerSolution::from_pairs(polyeig(nep)?, Vec::new())),
        InnerSolver::Iar | InnerSolver::IarChebyshev => {
            let settings = IarSettings {
                sigma: options.sigma,
                neigs: options.neigs.max(1),
                tol: options.tol,
                logger: options.logger.clone(),
                ..IarSettings::default()
            };
            let result = if strategy == InnerSolver::Iar {
                iar(nep, &settings)?
            } else {
                iar_chebyshev(nep, &settings)?
            };
            Ok(absorb(nep, result, options.tol))
        }
        InnerSolver::SgIter => {
            let settings = SgIterSettings {
                tol: options.tol,
                logger: options.logger.clone(),
                ..SgIterSettings::default()
            };
            Ok(absorb(nep, sgiter(nep, options.index, &settings)?, options.tol))
        }
        InnerSolver::ContourBeyn => {
            let radius = options
                .lambda_guesses
                .iter()
                .map(|g| (options.sigma - g).norm())
                .fold(0.0, f64::max)
                * 1.5;
            let settings = BeynSettingsBuilder::default()
                .sigma(options.sigma)
                .radius(if radius > 0.0 { radius } else { 1.0 })
                .neigs(options.neigs.min(n).max(1))
                .sanity_check(false)
                .tol(options.tol)
                .logger(options.logger.clone())
                .build()
                .map_err(|e| NepError::invalid(e.to_string()))?;
            Ok(absorb(nep, contour_beyn(nep, &settings)?, options.tol))
        }
    }
}

/// Refines every guess independently. A guess that runs out of iterations keeps its last
/// iterate and is reported as unconverged.
fn newton_batch(nep: &dyn Nep, options: &InnerSolveOptions) -> Result<InnerSolution, NepError> {
    let n = nep.size();
    let count = options.neigs.max(options.lambda_guesses.len()).max(1);
    let settings = NewtonSettings {
        tol: options.tol / 10.0,
        maxit: NEWTON_MAXIT,
        logger: options.logger.clone(),
        ..NewtonSettings::default()
    };
    let ones = Mat::from_fn(n, 1, |_, _| c64::new(1.0, 0.0));

    let mut pairs = Eigenpairs::empty(n);
    let mut unconverged = Vec::new();
    for i in 0..count {
        let lambda0 = options.lambda_guesses.get(i).copied().unwrap_or(options.sigma);
        let v0 = match &options.vector_guesses {
            Some(v) if v.nrows() == n && i < v.ncols() => v.as_ref().get(.., i..i + 1).to_owned(),
            _ => ones.clone(),
        };
        match augnewton(nep, lambda0, v0.as_ref(), &settings)? {
            SolveResult::Converged(found) => {
                pairs.push(found.eigenvalues[0], found.vector(0));
            }
            SolveResult::Partial(partial) => {
                options
                    .logger
                    .push_info(&format!("Newton guess {i} kept unconverged: {}", partial.message), 2, false);
                pairs.push(partial.candidates.eigenvalues[0], partial.candidates.vector(0));
                unconverged.push(i);
            }
        }
    }
    Ok(InnerSolution::from_pairs(pairs, unconverged))
}

/// Flattens a strategy result: converged pairs first, then the remaining candidates, which are
/// flagged as unconverged.
fn absorb(nep: &dyn Nep, result: SolveResult, tol: f64) -> InnerSolution {
    match result {
        SolveResult::Converged(pairs) => InnerSolution::from_pairs(pairs, Vec::new()),
        SolveResult::Partial(partial) => {
            let mut pairs = partial.converged;
            let mut unconverged = Vec::new();
            for (lambda, v) in partial.candidates.iter() {
                if pairs.eigenvalues.contains(&lambda) {
                    continue;
                }
                if ErrMeasure::Standard.measure(nep, lambda, v) >= tol {
                    unconverged.push(pairs.len());
                }
                pairs.push(lambda, v);
            }
            InnerSolution::from_pairs(pairs, unconverged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoLogger;
    use crate::nep::SpmfNep;
    use crate::projection::ProjectedNep;
    use crate::utils::{identity, sort_by_distance};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_matrix(rng: &mut StdRng, n: usize, m: usize) -> Mat<c64> {
        Mat::from_fn(n, m, |_, _| c64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
    }

    fn orthonormal(rng: &mut StdRng, n: usize, k: usize) -> Mat<c64> {
        let mut basis = crate::algorithms::orthogonalization::SubspaceBasis::with_capacity(n, k);
        let cand = random_matrix(rng, n, k);
        for j in 0..k {
            basis
                .push(cand.as_ref().get(.., j..j + 1), Default::default())
                .unwrap();
        }
        basis.active().to_owned()
    }

    fn options(neigs: usize) -> InnerSolveOptions {
        InnerSolveOptions {
            logger: Arc::new(NoLogger),
            ..InnerSolveOptions::new(neigs, 1e-10)
        }
    }

    fn sorted(values: &[c64]) -> Vec<c64> {
        sort_by_distance(values, c64::new(0.0, 0.0))
            .into_iter()
            .map(|i| values[i])
            .collect()
    }

    #[test]
    fn routing_table() {
        let d = InnerSolver::Default;
        assert_eq!(d.resolve(NepKind::Polynomial), InnerSolver::Polyeig);
        assert_eq!(d.resolve(NepKind::Delay), InnerSolver::IarChebyshev);
        assert_eq!(d.resolve(NepKind::SumOfProducts), InnerSolver::Iar);
        assert_eq!(d.resolve(NepKind::Generic), InnerSolver::Newton);
        assert_eq!(InnerSolver::SgIter.resolve(NepKind::Polynomial), InnerSolver::SgIter);
    }

    #[test]
    fn default_on_projected_polynomial_matches_polyeig() {
        let mut rng = StdRng::seed_from_u64(21);
        let n = 12;
        let nep = SpmfNep::polynomial(vec![
            random_matrix(&mut rng, n, n),
            random_matrix(&mut rng, n, n),
            identity(n),
        ])
        .unwrap();
        let v = orthonormal(&mut rng, n, 4);
        let mut pnep = ProjectedNep::new(&nep, 4);
        pnep.set_projection(v.as_ref(), v.as_ref()).unwrap();

        let by_default = inner_solve(InnerSolver::Default, &pnep, &options(2)).unwrap();
        let direct = inner_solve(InnerSolver::Polyeig, &pnep, &options(2)).unwrap();
        assert_eq!(by_default.len(), 8);
        for (a, b) in sorted(&by_default.eigenvalues).iter().zip(sorted(&direct.eigenvalues)) {
            assert!((a - b).norm() < 1e-10);
        }
    }

    #[test]
    fn default_on_projected_delay_problem_matches_chebyshev() {
        let mut rng = StdRng::seed_from_u64(4);
        let n = 10;
        let nep = SpmfNep::delay(
            vec![random_matrix(&mut rng, n, n), random_matrix(&mut rng, n, n)],
            &[0.0, 1.0],
        )
        .unwrap();
        let v = orthonormal(&mut rng, n, 3);
        let mut pnep = ProjectedNep::new(&nep, 3);
        pnep.set_projection(v.as_ref(), v.as_ref()).unwrap();

        let by_default = inner_solve(InnerSolver::Default, &pnep, &options(1)).unwrap();
        let direct = inner_solve(InnerSolver::IarChebyshev, &pnep, &options(1)).unwrap();
        assert_eq!(by_default, direct);
        assert!(!by_default.is_empty());
    }

    fn scalar_polynomial(coefficients: &[f64]) -> SpmfNep {
        SpmfNep::polynomial(
            coefficients
                .iter()
                .map(|&c| Mat::from_fn(1, 1, |_, _| c64::new(c, 0.0)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn newton_reports_guesses_that_did_not_converge() {
        // λ² + 1: Newton from a real start never leaves the real axis.
        let nep = scalar_polynomial(&[1.0, 0.0, 1.0]);
        let opts = InnerSolveOptions {
            lambda_guesses: vec![c64::new(0.0, 1.2), c64::new(0.5, 0.0)],
            ..options(2)
        };
        let solution = inner_solve(InnerSolver::Newton, &nep, &opts).unwrap();
        assert_eq!(solution.len(), 2);
        assert!((solution.eigenvalues[0] - c64::new(0.0, 1.0)).norm() < 1e-10);
        assert_eq!(solution.unconverged, vec![1]);
    }

    #[test]
    fn newton_uses_sigma_when_guesses_are_missing() {
        let nep = scalar_polynomial(&[-0.75, 1.0]);
        let opts = InnerSolveOptions {
            sigma: c64::new(0.5, 0.0),
            ..options(1)
        };
        let solution = inner_solve(InnerSolver::Newton, &nep, &opts).unwrap();
        assert_eq!(solution.len(), 1);
        assert!(solution.unconverged.is_empty());
        assert!((solution.eigenvalues[0] - c64::new(0.75, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn explicit_polyeig_on_delay_problem_fails() {
        let one = Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0));
        let nep = SpmfNep::delay(vec![one], &[1.0]).unwrap();
        assert!(inner_solve(InnerSolver::Polyeig, &nep, &options(1)).is_err());
    }
}
