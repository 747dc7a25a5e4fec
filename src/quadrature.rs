//! Numerical integration of matrix-valued functions against scalar weights.
//!
//! Contour-integral eigensolvers need moments of the form ∫ₐᵇ f(t)·g_j(t) dt, where f returns a
//! matrix (typically M(z(t))⁻¹V̂) and every g_j is a scalar function. This module provides the
//! [`QuadratureRule`] strategy together with two rules:
//!
//! - [`Trapezoidal`]: N equally spaced points on [a, b−h], h = (b−a)/N. The endpoint b is not
//!   resampled, which is the right convention for periodic integrands such as a parametrized
//!   circle and gives geometric convergence there.
//! - [`GaussLegendre`]: N Gauss–Legendre nodes (Golub–Welsch), exact for polynomials of degree
//!   up to 2N−1.
//!
//! The sum over quadrature points is embarrassingly parallel. When a rule is configured with
//! `parallel = true` and the rayon pool has more than one thread, the samples are evaluated with
//! a parallel map followed by a reduction by matrix addition; otherwise a sequential loop is used.
//! Both paths agree up to floating-point summation order.

use crate::error::{NepError, NepErrorKind};
use crate::logger::Logger;
use faer::{c64, Mat, Scale, Side};
use rayon::prelude::*;
use std::fmt;

/// A matrix-valued integrand. Failures (e.g. a singular linear solve) abort the integration.
pub type SampleFn<'a> = dyn Fn(f64) -> Result<Mat<c64>, NepError> + Sync + 'a;

/// A scalar weighting function g_j(t).
pub type WeightFn<'a> = dyn Fn(f64) -> c64 + Sync + 'a;

/// Quadrature points and weights on a concrete interval.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureNodes {
    pub points: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Integrates a matrix-valued function times a set of scalar weighting functions.
pub trait QuadratureRule: fmt::Debug + Send + Sync {
    /// Returns one matrix per weighting function, slice j approximating ∫ₐᵇ f(t)·g_j(t) dt.
    fn integrate(
        &self,
        f: &SampleFn<'_>,
        weights: &[&WeightFn<'_>],
        a: f64,
        b: f64,
        n: usize,
        logger: &dyn Logger,
    ) -> Result<Vec<Mat<c64>>, NepError>;
}

/// Trapezoidal rule for periodic integrands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trapezoidal {
    pub parallel: bool,
}

impl Default for Trapezoidal {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl Trapezoidal {
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    /// N points t_i = a + i·h, i = 0..N−1, each with weight h.
    pub fn nodes(a: f64, b: f64, n: usize) -> QuadratureNodes {
        let h = (b - a) / n as f64;
        QuadratureNodes {
            points: (0..n).map(|i| a + i as f64 * h).collect(),
            weights: vec![h; n],
        }
    }
}

impl QuadratureRule for Trapezoidal {
    fn integrate(
        &self,
        f: &SampleFn<'_>,
        weights: &[&WeightFn<'_>],
        a: f64,
        b: f64,
        n: usize,
        logger: &dyn Logger,
    ) -> Result<Vec<Mat<c64>>, NepError> {
        validate(weights, n)?;
        accumulate(&Self::nodes(a, b, n), f, weights, self.parallel, logger)
    }
}

/// Gauss–Legendre rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaussLegendre {
    pub parallel: bool,
}

impl Default for GaussLegendre {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl GaussLegendre {
    pub fn sequential() -> Self {
        Self { parallel: false }
    }

    /// Nodes and weights on [a, b] from the eigendecomposition of the Jacobi matrix of the
    /// Legendre polynomials.
    pub fn nodes(a: f64, b: f64, n: usize) -> Result<QuadratureNodes, NepError> {
        let jacobi = Mat::<f64>::from_fn(n, n, |i, j| {
            if i + 1 == j || j + 1 == i {
                let k = i.max(j) as f64;
                k / (4.0 * k * k - 1.0).sqrt()
            } else {
                0.0
            }
        });
        let evd = jacobi.self_adjoint_eigen(Side::Lower)?;
        let nodes = evd.S().column_vector();
        let vectors = evd.U();

        let half = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        let mut points = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for i in 0..n {
            points.push(mid + half * nodes[i]);
            weights.push(half * 2.0 * vectors[(0, i)] * vectors[(0, i)]);
        }
        Ok(QuadratureNodes { points, weights })
    }
}

impl QuadratureRule for GaussLegendre {
    fn integrate(
        &self,
        f: &SampleFn<'_>,
        weights: &[&WeightFn<'_>],
        a: f64,
        b: f64,
        n: usize,
        logger: &dyn Logger,
    ) -> Result<Vec<Mat<c64>>, NepError> {
        validate(weights, n)?;
        accumulate(&Self::nodes(a, b, n)?, f, weights, self.parallel, logger)
    }
}

/// Tag selecting one of the built-in rules with its default configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum QuadRule {
    #[default]
    Trapezoidal,
    GaussLegendre,
}

impl QuadratureRule for QuadRule {
    fn integrate(
        &self,
        f: &SampleFn<'_>,
        weights: &[&WeightFn<'_>],
        a: f64,
        b: f64,
        n: usize,
        logger: &dyn Logger,
    ) -> Result<Vec<Mat<c64>>, NepError> {
        match self {
            QuadRule::Trapezoidal => Trapezoidal::default().integrate(f, weights, a, b, n, logger),
            QuadRule::GaussLegendre => GaussLegendre::default().integrate(f, weights, a, b, n, logger),
        }
    }
}

/// Approximates ∫ₐᵇ f(t)·g_j(t) dt for every weighting function g_j with `n` points of `rule`.
///
/// # Arguments
/// * `rule`: The quadrature strategy, e.g. [`QuadRule::Trapezoidal`] or a configured [`GaussLegendre`].
/// * `f`: The matrix-valued integrand. All samples must have the same shape.
/// * `weights`: The scalar weighting functions, at least one.
/// * `a`, `b`: The integration interval.
/// * `n`: The number of quadrature points, at least one.
/// * `logger`: Progress sink. Sequential runs push dots at level 1 and one line per point at
///   level 2; parallel runs push a single summary line at level 1.
///
/// # Returns
/// One matrix per weighting function, or an error if the arguments are invalid, the samples
/// disagree in shape, or `f` fails.
pub fn integrate_interval(
    rule: &dyn QuadratureRule,
    f: &SampleFn<'_>,
    weights: &[&WeightFn<'_>],
    a: f64,
    b: f64,
    n: usize,
    logger: &dyn Logger,
) -> Result<Vec<Mat<c64>>, NepError> {
    rule.integrate(f, weights, a, b, n, logger)
}

fn validate(weights: &[&WeightFn<'_>], n: usize) -> Result<(), NepError> {
    if n == 0 {
        return Err(NepError::invalid("quadrature needs at least one point"));
    }
    if weights.is_empty() {
        return Err(NepError::invalid("quadrature needs at least one weighting function"));
    }
    Ok(())
}

/// Samples f once at `t` and scales it by w·g_j(t) for every weighting function.
fn contributions(
    f: &SampleFn<'_>,
    weights: &[&WeightFn<'_>],
    t: f64,
    w: f64,
) -> Result<Vec<Mat<c64>>, NepError> {
    let sample = f(t)?;
    Ok(weights.iter().map(|g| Scale(g(t) * w) * &sample).collect())
}

fn add_into(acc: &mut [Mat<c64>], other: &[Mat<c64>]) -> Result<(), NepError> {
    for (x, y) in acc.iter_mut().zip(other) {
        if x.nrows() != y.nrows() || x.ncols() != y.ncols() {
            return Err(NepErrorKind::DimensionMismatch {
                expected: x.nrows() * x.ncols(),
                actual: y.nrows() * y.ncols(),
            }
            .into());
        }
        *x += y;
    }
    Ok(())
}

fn report_progress(logger: &dyn Logger, i: usize, nodes: &QuadratureNodes) {
    let n = nodes.points.len();
    let stride = n.div_ceil(50).max(1);
    if i % stride == 0 {
        logger.push_info(".", 1, true);
    }
    logger.push_info(
        &format!("quadrature point {}/{} at t = {:.6e}", i + 1, n, nodes.points[i]),
        2,
        false,
    );
}

fn accumulate(
    nodes: &QuadratureNodes,
    f: &SampleFn<'_>,
    weights: &[&WeightFn<'_>],
    parallel: bool,
    logger: &dyn Logger,
) -> Result<Vec<Mat<c64>>, NepError> {
    let n = nodes.points.len();
    let threads = rayon::current_num_threads();
    let result = if parallel && threads > 1 {
        // Progress is reported once, after the reduction.
        let sum = (0..n)
            .into_par_iter()
            .map(|i| contributions(f, weights, nodes.points[i], nodes.weights[i]))
            .reduce_with(|a, b| {
                let mut a = a?;
                add_into(&mut a, &b?)?;
                Ok(a)
            });
        logger.push_info(&format!("quadrature: {n} points evaluated on {threads} threads"), 1, false);
        sum
    } else {
        let mut acc: Option<Vec<Mat<c64>>> = None;
        for i in 0..n {
            report_progress(logger, i, nodes);
            let contrib = contributions(f, weights, nodes.points[i], nodes.weights[i])?;
            match acc.as_mut() {
                Some(acc) => add_into(acc, &contrib)?,
                None => acc = Some(contrib),
            }
        }
        logger.push_info(" done", 1, false);
        acc.map(Ok)
    };
    result.unwrap_or_else(|| Err(NepError::invalid("quadrature needs at least one point")))
}
