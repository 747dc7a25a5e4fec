//! Integration test suite to verify the mathematical correctness of the eigensolvers.
//!
//! # Test Methodology
//!
//! An eigensolver can be validated without knowing the exact eigenvalues: a returned pair
//! (λ, v) is checked directly through the error measure ‖M(λ)v‖ / (Σ_i |f_i(λ)|‖A_i‖ ‖v‖).
//! On top of that, different methods applied to the same problem must agree:
//!
//! 1.  **Residual check:** every pair a solver reports as converged satisfies its tolerance.
//! 2.  **Structural invariants:** Jacobi–Davidson never returns more than the requested number
//!     of pairs, and the accepted eigenvalues are separated by the deflation radius ε^{1/4}.
//! 3.  **Cross-validation:** eigenvalues from Jacobi–Davidson are compared with the companion
//!     linearization (polynomial problems) and with Beyn's contour method (delay problems).
//! 4.  **End-to-end scenarios:** NLEIGS on a quadratic problem and on the scalar problem
//!     0.2·√λ − 0.6·sin(2λ), with polynomial and rational interpolation.

use anyhow::{Result, anyhow, ensure};
use faer::{Mat, c64, mat};
use nep_solvers::{
    BeynSettingsBuilder, Eigenpairs, ErrMeasure, InnerSolver, JacobiDavidsonSettings, JacobiDavidsonSettingsBuilder,
    Logger, Nep, NepErrorKind, NepTerm, NewtonSettingsBuilder, NleigsSettingsBuilder, NoLogger, ProjectionType, Region,
    ScalarFunction, SolveResult, SpmfNep, augnewton, contour_beyn, jacobi_davidson, nleigs, polyeig,
    utils::to_complex,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::{Arc, Mutex};

/// Tolerance on the error measure requested from the iterative solvers.
///
/// The error measure is relative to the size of the terms of M(λ), so 1e-10 leaves four to five
/// digits of headroom above what a backward-stable method reaches in double precision.
const SOLVER_TOLERANCE: f64 = 1e-10;

/// Error measure required after Newton refinement.
///
/// Augmented Newton converges quadratically once close to a simple eigenvalue, so a refined pair
/// must be accurate to nearly machine precision.
const REFINED_TOLERANCE: f64 = 1e-12;

/// Distance under which two eigenvalues computed by different methods are considered equal.
///
/// The eigenvalues in these tests are simple and well conditioned, so an error measure of
/// `SOLVER_TOLERANCE` translates into an eigenvalue error of the same order.
const MATCH_TOLERANCE: f64 = 1e-8;

/// Deflation radius of Jacobi–Davidson (relative distance between accepted eigenvalues).
fn deflation_radius() -> f64 {
    f64::EPSILON.powf(0.25)
}

/// Keeps warnings and drops progress.
#[derive(Debug, Default)]
struct WarningLogger {
    warnings: Mutex<Vec<String>>,
}

impl WarningLogger {
    fn messages(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Logger for WarningLogger {
    fn push_info(&self, _message: &str, _level: usize, _continues: bool) {}

    fn push_warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

fn random_matrix(rng: &mut StdRng, n: usize) -> Mat<c64> {
    Mat::from_fn(n, n, |_, _| c64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
}

/// λ²I + λA₁ + A₀ with random A₀, A₁.
fn random_quadratic(seed: u64, n: usize) -> Result<SpmfNep> {
    let mut rng = StdRng::seed_from_u64(seed);
    let a0 = random_matrix(&mut rng, n);
    let a1 = random_matrix(&mut rng, n);
    let a2 = Mat::from_fn(n, n, |i, j| if i == j { c64::new(1.0, 0.0) } else { c64::new(0.0, 0.0) });
    Ok(SpmfNep::polynomial(vec![a0, a1, a2])?)
}

/// −λI + A₀ + A₁e^{−λ} with A₀ = diag(−0.2, −1.2, −2.2, ...) and a small random A₁.
///
/// The eigenvalue closest to the origin is a small perturbation of −0.2, well separated from the
/// rest of the spectrum.
fn random_delay(seed: u64, n: usize) -> Result<SpmfNep> {
    let mut rng = StdRng::seed_from_u64(seed);
    let a0 = Mat::from_fn(n, n, |i, j| {
        if i == j {
            c64::new(-0.2 - i as f64, 0.0)
        } else {
            c64::new(0.0, 0.0)
        }
    });
    let a1 = Mat::from_fn(n, n, |_, _| c64::new(0.1 * (rng.random::<f64>() - 0.5), 0.0));
    Ok(SpmfNep::delay(vec![a0, a1], &[0.0, 1.0])?)
}

fn quadratic_2x2() -> Result<SpmfNep> {
    Ok(SpmfNep::polynomial(vec![
        to_complex(mat![[1.0, 3.0], [5.0, 6.0]].as_ref()),
        to_complex(mat![[3.0, 4.0], [6.0, 6.0]].as_ref()),
        to_complex(mat![[1.0, 0.0], [0.0, 1.0]].as_ref()),
    ])?)
}

fn sqrt_sin() -> Result<SpmfNep> {
    let scalar = |x: f64| Mat::from_fn(1, 1, |_, _| c64::new(x, 0.0));
    Ok(SpmfNep::new(vec![
        NepTerm::new(scalar(0.2), ScalarFunction::Sqrt),
        NepTerm::new(scalar(-0.6), ScalarFunction::Sin { rate: c64::new(2.0, 0.0) }),
    ])?)
}

fn closest_distance(values: &[c64], lambda: c64) -> f64 {
    values.iter().map(|v| (v - lambda).norm()).fold(f64::INFINITY, f64::min)
}

/// Checks the residual, count and separation invariants of a Jacobi–Davidson result.
fn check_jacobi_davidson_invariants(nep: &dyn Nep, pairs: &Eigenpairs, settings: &JacobiDavidsonSettings) -> Result<()> {
    ensure!(
        pairs.len() <= settings.neigs,
        "returned {} pairs for neigs = {}",
        pairs.len(),
        settings.neigs
    );
    for (lambda, v) in pairs.iter() {
        let err = ErrMeasure::Standard.measure(nep, lambda, v);
        ensure!(err < settings.tol, "accepted λ = {lambda} has error {err:.3e}");
    }
    for (i, &li) in pairs.eigenvalues.iter().enumerate() {
        for &lj in &pairs.eigenvalues[..i] {
            ensure!(
                (li - lj).norm() > deflation_radius() * lj.norm(),
                "accepted eigenvalues {li} and {lj} are not separated"
            );
        }
    }
    Ok(())
}

/// Every pair of a solver result, converged or not.
fn all_pairs(result: &SolveResult) -> Eigenpairs {
    match result {
        SolveResult::Converged(pairs) => pairs.clone(),
        SolveResult::Partial(partial) => {
            let mut all = partial.converged.clone();
            for (lambda, v) in partial.candidates.iter() {
                all.push(lambda, v);
            }
            all
        }
    }
}

/// Refines every pair with augmented Newton and keeps the distinct eigenvalues inside `region`.
fn refine_in_region(nep: &dyn Nep, region: &Region, pairs: &Eigenpairs) -> Result<Vec<c64>> {
    let settings = NewtonSettingsBuilder::default()
        .tol(1e-13)
        .maxit(30)
        .logger(Arc::new(NoLogger))
        .build()?;
    let mut refined: Vec<c64> = Vec::new();
    for (lambda, v) in pairs.iter() {
        let Ok(pair) = augnewton(nep, lambda, v, &settings) else {
            continue;
        };
        let mu = pair.eigenvalues[0];
        let err = ErrMeasure::Standard.measure(nep, mu, pair.vector(0));
        if err < REFINED_TOLERANCE && region.contains(mu) && closest_distance(&refined, mu) > MATCH_TOLERANCE {
            refined.push(mu);
        }
    }
    Ok(refined)
}

#[test]
fn test_jacobi_davidson_petrov_galerkin_on_quadratic() -> Result<()> {
    let n = 20;
    let nep = random_quadratic(11, n)?;
    let settings = JacobiDavidsonSettingsBuilder::default()
        .neigs(2)
        .maxit(n)
        .tol(SOLVER_TOLERANCE)
        .projection(ProjectionType::PetrovGalerkin)
        .logger(Arc::new(NoLogger))
        .build()?;
    let pairs = jacobi_davidson(&nep, &settings)?;
    ensure!(pairs.len() == 2, "expected 2 eigenpairs, got {}", pairs.len());
    check_jacobi_davidson_invariants(&nep, &pairs, &settings)?;

    let reference = polyeig(&nep)?;
    for &lambda in &pairs.eigenvalues {
        let distance = closest_distance(&reference.eigenvalues, lambda);
        ensure!(distance < MATCH_TOLERANCE, "λ = {lambda} is {distance:.3e} away from the spectrum");
    }
    Ok(())
}

#[test]
fn test_jacobi_davidson_galerkin_on_delay_problem_agrees_with_beyn() -> Result<()> {
    let n = 15;
    let nep = random_delay(5, n)?;
    let settings = JacobiDavidsonSettingsBuilder::default()
        .neigs(1)
        .maxit(n)
        .tol(SOLVER_TOLERANCE)
        .projection(ProjectionType::Galerkin)
        .logger(Arc::new(NoLogger))
        .build()?;
    let pairs = jacobi_davidson(&nep, &settings)?;
    check_jacobi_davidson_invariants(&nep, &pairs, &settings)?;
    let lambda = pairs.eigenvalues[0];

    let beyn = BeynSettingsBuilder::default()
        .sigma(c64::new(-0.2, 0.0))
        .radius(0.4)
        .neigs(1)
        .n_quad(200)
        .logger(Arc::new(NoLogger))
        .build()?;
    let contour = contour_beyn(&nep, &beyn)?;
    ensure!(contour.len() == 1, "Beyn found {} eigenvalues", contour.len());
    let distance = (contour.eigenvalues[0] - lambda).norm();
    ensure!(distance < MATCH_TOLERANCE, "Jacobi-Davidson and Beyn differ by {distance:.3e}");
    Ok(())
}

#[test]
fn test_jacobi_davidson_budget_exhaustion_is_reported() -> Result<()> {
    let nep = random_quadratic(2, 12)?;
    let settings = JacobiDavidsonSettingsBuilder::default()
        .neigs(3)
        .maxit(2)
        .logger(Arc::new(NoLogger))
        .build()?;
    let err = jacobi_davidson(&nep, &settings)
        .err()
        .ok_or_else(|| anyhow!("two iterations cannot produce three eigenpairs"))?;
    let partial = err
        .partial()
        .ok_or_else(|| anyhow!("expected a partial solution, got {err}"))?;
    ensure!(partial.converged.len() <= 2);
    ensure!(partial.candidates.len() == 1);
    Ok(())
}

#[test]
fn test_jacobi_davidson_rejects_invalid_configurations() -> Result<()> {
    let nep = random_quadratic(3, 5)?;
    let too_long = JacobiDavidsonSettingsBuilder::default()
        .maxit(6)
        .logger(Arc::new(NoLogger))
        .build()?;
    let err = jacobi_davidson(&nep, &too_long)
        .err()
        .ok_or_else(|| anyhow!("maxit > n must be rejected"))?;
    ensure!(matches!(err.kind(), NepErrorKind::InvalidConfiguration(_)));

    let incompatible = JacobiDavidsonSettingsBuilder::default()
        .projection(ProjectionType::PetrovGalerkin)
        .inner_solver(InnerSolver::SgIter)
        .build();
    ensure!(incompatible.is_err(), "SGIter requires a Galerkin projection");
    Ok(())
}

#[test]
fn test_nleigs_quadratic_in_polygon() -> Result<()> {
    let nep = quadratic_2x2()?;
    let region = Region::from_points(&[
        c64::new(-10.0, -2.0),
        c64::new(10.0, -2.0),
        c64::new(10.0, 2.0),
        c64::new(-10.0, 2.0),
    ])?;
    let check_pairs = |pairs: &Eigenpairs| -> Result<()> {
        ensure!(pairs.len() == 4, "found {} eigenvalues", pairs.len());
        for (lambda, v) in pairs.iter() {
            ensure!(region.contains(lambda));
            ensure!(ErrMeasure::Standard.measure(&nep, lambda, v) < SOLVER_TOLERANCE);
        }
        Ok(())
    };

    let settings = NleigsSettingsBuilder::default()
        .maxit(10)
        .blksize(5)
        .tol(SOLVER_TOLERANCE)
        .logger(Arc::new(NoLogger))
        .build()?;
    let solution = nleigs(&nep, &region, &settings)?;
    ensure!(solution.linearization_converged);
    ensure!(solution.iterations <= 10);
    check_pairs(&solution.result.into_result()?)?;

    // Five divided differences are too few to confirm the degree, yet the eigenvalues survive.
    let warnings = Arc::new(WarningLogger::default());
    let settings = NleigsSettingsBuilder::default()
        .maxdgr(5)
        .maxit(10)
        .blksize(5)
        .tol(SOLVER_TOLERANCE)
        .logger(warnings.clone())
        .build()?;
    let solution = nleigs(&nep, &region, &settings)?;
    ensure!(!solution.linearization_converged);
    ensure!(
        warnings.messages().iter().any(|w| w.contains("Linearization not converged")),
        "no linearization warning in {:?}",
        warnings.messages()
    );
    check_pairs(&solution.result.into_result()?)?;

    let capped = NleigsSettingsBuilder::default()
        .maxdgr(5)
        .maxit(5)
        .blksize(5)
        .tol(SOLVER_TOLERANCE)
        .logger(Arc::new(NoLogger))
        .build()?;
    let solution = nleigs(&nep, &region, &capped)?;
    ensure!(solution.result.eigenpairs().len() < 4);
    Ok(())
}

#[test]
fn test_nleigs_sqrt_sin_polynomial_and_rational() -> Result<()> {
    let nep = sqrt_sin()?;
    let region = Region::from_points(&[c64::new(0.01, 0.0), c64::new(4.0, 0.0)])?;

    // Polynomial interpolation cannot resolve the branch point at the origin, so the Ritz values
    // are only approximate and are refined with Newton.
    let settings = NleigsSettingsBuilder::default()
        .tol(SOLVER_TOLERANCE)
        .logger(Arc::new(NoLogger))
        .build()?;
    let polynomial = nleigs(&nep, &region, &settings)?;
    ensure!(!polynomial.linearization_converged);
    let from_polynomial = refine_in_region(&nep, &region, &all_pairs(&polynomial.result))?;
    ensure!(!from_polynomial.is_empty(), "no Ritz value refined to an eigenvalue");

    // Rational interpolation with poles on the branch cut (−∞, 0].
    let poles: Vec<c64> = (0..10_000)
        .map(|i| c64::new(-(10f64.powf(-8.0 + 16.0 * i as f64 / 9_999.0)), 0.0))
        .collect();
    let settings = NleigsSettingsBuilder::default()
        .tol(SOLVER_TOLERANCE)
        .neigs(3)
        .poles(poles)
        .logger(Arc::new(NoLogger))
        .build()?;
    let rational = nleigs(&nep, &region, &settings)?;
    let from_rational = refine_in_region(&nep, &region, &all_pairs(&rational.result))?;
    ensure!(
        from_rational.len() >= 3,
        "rational interpolation recovered {} eigenvalues",
        from_rational.len()
    );

    for &lambda in &from_polynomial {
        let distance = closest_distance(&from_rational, lambda);
        ensure!(distance < MATCH_TOLERANCE, "λ = {lambda} not found by the rational run");
    }
    Ok(())
}
