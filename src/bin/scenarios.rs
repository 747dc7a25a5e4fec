//! Scenario Runner for the nonlinear eigensolvers.
//!
//! This executable solves a small set of reference problems end to end and writes one CSV row per
//! computed eigenvalue, together with its error measure. The scenarios are:
//! - a 2×2 quadratic problem solved by NLEIGS on a polygon, and by Jacobi–Davidson;
//! - the scalar problem 0.2·√λ − 0.6·sin(2λ) on [0.01, 4], solved by NLEIGS with polynomial and
//!   rational interpolation, the polynomial result refined by augmented Newton;
//! - a random delay problem solved by Jacobi–Davidson and by Beyn's contour method.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use faer::{Mat, c64, mat};
use nep_solvers::{
    BeynSettingsBuilder, Eigenpairs, ErrMeasure, InnerSolver, JacobiDavidsonSettingsBuilder, LogLogger, Logger, Nep,
    NepTerm, NewtonSettingsBuilder, NleigsSettingsBuilder, ProjectionType, Region, ScalarFunction, SolveResult,
    SpmfNep,
    algorithms::{beyn, jacobi_davidson as jd},
    augnewton, nleigs,
    utils::to_complex,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// The reference problem to solve.
#[derive(ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
enum Scenario {
    /// Quadratic problem with coefficients [[1,3],[5,6]], [[3,4],[6,6]], I.
    Quadratic,
    /// Scalar problem 0.2·√λ − 0.6·sin(2λ) on the interval [0.01, 4].
    SqrtSin,
    /// Random delay problem −λI + A₀ + A₁e^{−λ}.
    Delay,
}

/// Command-line arguments for the scenario runner.
#[derive(Parser, Debug)]
#[clap(
    name = "scenarios",
    about = "Solves reference nonlinear eigenvalue problems and records the eigenvalues found."
)]
struct ScenarioArgs {
    /// The problem to solve.
    #[clap(long, value_enum)]
    scenario: Scenario,

    /// Convergence tolerance on the error measure.
    #[clap(long, default_value_t = 1e-10)]
    tol: f64,

    /// Maximum interpolation degree for NLEIGS.
    #[clap(long, default_value_t = 100)]
    maxdgr: usize,

    /// Iteration budget for NLEIGS.
    #[clap(long, default_value_t = 100)]
    maxit: usize,

    /// Dimension of the random delay problem.
    #[clap(long, default_value_t = 20)]
    n: usize,

    /// Inner solver of the Jacobi–Davidson runs.
    #[clap(long, value_enum, default_value_t = InnerSolver::Default)]
    inner_solver: InnerSolver,

    /// Projection type of the Jacobi–Davidson runs.
    #[clap(long, value_enum, default_value_t = ProjectionType::PetrovGalerkin)]
    projection: ProjectionType,

    /// Solver verbosity (0 = warnings only, 1 = progress, 2 = per-step detail).
    #[clap(long, default_value_t = 1)]
    verbosity: usize,

    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Represents a single row of data for the scenario CSV.
#[derive(Debug, Serialize)]
struct EigenvalueRecord {
    scenario: String,
    /// Solver (and variant) that produced the eigenvalue.
    method: String,
    /// Position in the solver output.
    index: usize,
    re: f64,
    im: f64,
    /// Standard error measure of the returned eigenpair.
    error: f64,
    /// Whether the solver reported the pair as converged.
    converged: bool,
}

fn push_pairs(
    records: &mut Vec<EigenvalueRecord>,
    nep: &dyn Nep,
    scenario: Scenario,
    method: &str,
    pairs: &Eigenpairs,
    converged: bool,
) {
    let offset = records.iter().filter(|r| r.method == method).count();
    for (i, (lambda, v)) in pairs.iter().enumerate() {
        records.push(EigenvalueRecord {
            scenario: format!("{scenario:?}"),
            method: method.to_string(),
            index: offset + i,
            re: lambda.re,
            im: lambda.im,
            error: ErrMeasure::Standard.measure(nep, lambda, v),
            converged,
        });
    }
}

fn push_result(
    records: &mut Vec<EigenvalueRecord>,
    nep: &dyn Nep,
    scenario: Scenario,
    method: &str,
    result: &SolveResult,
) {
    match result {
        SolveResult::Converged(pairs) => push_pairs(records, nep, scenario, method, pairs, true),
        SolveResult::Partial(partial) => {
            log::warn!("{method}: {}", partial.message);
            push_pairs(records, nep, scenario, method, &partial.converged, true);
            push_pairs(records, nep, scenario, method, &partial.candidates, false);
        }
    }
}

fn quadratic() -> Result<SpmfNep> {
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

/// −λI + A₀ + A₁e^{−λ} with A₀ diagonal and a small random A₁.
fn random_delay(n: usize, seed: u64) -> Result<SpmfNep> {
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

fn run_quadratic(args: &ScenarioArgs, logger: Arc<dyn Logger>, records: &mut Vec<EigenvalueRecord>) -> Result<()> {
    let nep = quadratic()?;
    let region = Region::from_points(&[
        c64::new(-10.0, -2.0),
        c64::new(10.0, -2.0),
        c64::new(10.0, 2.0),
        c64::new(-10.0, 2.0),
    ])?;
    let settings = NleigsSettingsBuilder::default()
        .maxdgr(args.maxdgr)
        .maxit(args.maxit)
        .tol(args.tol)
        .blksize(5)
        .logger(logger.clone())
        .build()?;
    let solution = nleigs(&nep, &region, &settings)?;
    log::info!(
        "NLEIGS: degree {}, {} iterations, linearization converged: {}",
        solution.degree,
        solution.iterations,
        solution.linearization_converged
    );
    push_result(records, &nep, args.scenario, "nleigs", &solution.result);

    let settings = JacobiDavidsonSettingsBuilder::default()
        .neigs(2)
        .maxit(nep.size())
        .tol(args.tol)
        .inner_solver(args.inner_solver)
        .projection(args.projection)
        .logger(logger)
        .build()?;
    let result = jd::jacobi_davidson(&nep, &settings)?;
    push_result(records, &nep, args.scenario, "jacobi-davidson", &result);
    Ok(())
}

fn run_sqrt_sin(args: &ScenarioArgs, logger: Arc<dyn Logger>, records: &mut Vec<EigenvalueRecord>) -> Result<()> {
    let nep = sqrt_sin()?;
    let region = Region::from_points(&[c64::new(0.01, 0.0), c64::new(4.0, 0.0)])?;

    // Polynomial interpolation: the branch point at 0 keeps the interpolant from converging, so
    // the Ritz values are refined with Newton afterwards.
    let settings = NleigsSettingsBuilder::default()
        .maxdgr(args.maxdgr)
        .maxit(args.maxit)
        .tol(args.tol)
        .logger(logger.clone())
        .build()?;
    let polynomial = nleigs(&nep, &region, &settings)?;
    push_result(records, &nep, args.scenario, "nleigs-polynomial", &polynomial.result);

    let newton = NewtonSettingsBuilder::default()
        .tol(1e-13)
        .maxit(30)
        .logger(logger.clone())
        .build()?;
    let mut refined = Eigenpairs::empty(1);
    let guesses = match &polynomial.result {
        SolveResult::Converged(pairs) => pairs.clone(),
        SolveResult::Partial(partial) => {
            let mut all = partial.converged.clone();
            for (lambda, v) in partial.candidates.iter() {
                all.push(lambda, v);
            }
            all
        }
    };
    for (lambda, v) in guesses.iter() {
        match augnewton(&nep, lambda, v, &newton) {
            Ok(pairs) => {
                for (mu, w) in pairs.iter() {
                    refined.push(mu, w);
                }
            }
            Err(err) => log::warn!("Newton refinement from λ = {lambda} failed: {err}"),
        }
    }
    push_pairs(records, &nep, args.scenario, "nleigs-polynomial+newton", &refined, true);

    // Rational interpolation with poles on the branch cut.
    let poles: Vec<c64> = (0..10_000)
        .map(|i| c64::new(-(10f64.powf(-8.0 + 16.0 * i as f64 / 9_999.0)), 0.0))
        .collect();
    let settings = NleigsSettingsBuilder::default()
        .maxdgr(args.maxdgr)
        .maxit(args.maxit)
        .tol(args.tol)
        .poles(poles)
        .logger(logger)
        .build()?;
    let rational = nleigs(&nep, &region, &settings)?;
    push_result(records, &nep, args.scenario, "nleigs-rational", &rational.result);
    Ok(())
}

fn run_delay(args: &ScenarioArgs, logger: Arc<dyn Logger>, records: &mut Vec<EigenvalueRecord>) -> Result<()> {
    if args.n == 0 {
        return Err(anyhow!("the delay scenario needs n ≥ 1"));
    }
    let nep = random_delay(args.n, 42)?;
    let settings = JacobiDavidsonSettingsBuilder::default()
        .neigs(args.n.min(2))
        .maxit(args.n)
        .tol(args.tol)
        .inner_solver(args.inner_solver)
        .projection(args.projection)
        .logger(logger.clone())
        .build()?;
    let result = jd::jacobi_davidson(&nep, &settings)?;
    push_result(records, &nep, args.scenario, "jacobi-davidson", &result);

    let settings = BeynSettingsBuilder::default()
        .radius(1.0)
        .neigs(args.n.min(3))
        .n_quad(400)
        .tol(1e-8)
        .logger(logger)
        .build()?;
    let result = beyn::contour_beyn(&nep, &settings)?;
    push_result(records, &nep, args.scenario, "beyn", &result);
    Ok(())
}

/// The main entry point for the scenario runner.
fn main() -> Result<()> {
    let args = ScenarioArgs::parse();
    let level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).try_init()?;
    log::info!("Running scenario {:?} with tol = {:e}", args.scenario, args.tol);

    let logger: Arc<dyn Logger> = Arc::new(LogLogger::new(args.verbosity));
    let mut records = Vec::new();
    match args.scenario {
        Scenario::Quadratic => run_quadratic(&args, logger, &mut records)?,
        Scenario::SqrtSin => run_sqrt_sin(&args, logger, &mut records)?,
        Scenario::Delay => run_delay(&args, logger, &mut records)?,
    }

    log::info!("Writing {} eigenvalues to {:?}...", records.len(), &args.output);
    let mut writer = csv::Writer::from_path(&args.output)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    log::info!("Scenario complete.");
    Ok(())
}
