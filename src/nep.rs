//! This module defines the core abstraction for nonlinear eigenvalue problems.
//!
//! A nonlinear eigenvalue problem (NEP) is a matrix-valued function M(λ) of a complex scalar;
//! we look for pairs (λ, v) with M(λ)v = 0. None of the solvers in this crate need the entries
//! of M(λ) directly for every λ. Their fundamental operations are:
//!
//! 1.  **Derivative evaluation**: the matrix M^{(k)}(λ) for a given order k.
//! 2.  **Linear combinations of derivative actions** ("M-lincomb"):
//!     Σ_j a_j M^{(s+j)}(λ) v_j, which is what Krylov-type methods actually consume.
//! 3.  **Kind introspection**: a tag telling whether the problem is polynomial, a delay
//!     problem, a general sum of products, or opaque. Only the inner-solver dispatcher
//!     reads it.
//!
//! The central piece of this module is the [`Nep`] trait, which formalizes this contract.
//! [`SpmfNep`] implements it for problems written as a sum of products of constant matrices
//! and scalar functions, M(λ) = Σ_i A_i f_i(λ), and [`FnNep`] wraps an arbitrary closure.

use crate::error::{NepError, NepErrorKind};
use crate::utils::axpy;
use faer::{c64, Mat, MatRef};

/// Structural kind of a NEP, used to pick a default inner solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NepKind {
    /// M(λ) = Σ_k A_k λ^k.
    Polynomial,
    /// M(λ) = −λI + Σ_i A_i e^{−τ_i λ}.
    Delay,
    /// M(λ) = Σ_i A_i f_i(λ) with general analytic f_i.
    SumOfProducts,
    /// Nothing is known about the structure.
    Generic,
}

/// Scalar functions that can appear in a sum-of-products representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarFunction {
    /// λ^p.
    Power(u32),
    /// e^{rate·λ}.
    Exp { rate: c64 },
    /// Principal branch of √λ.
    Sqrt,
    /// sin(rate·λ).
    Sin { rate: c64 },
    /// cos(rate·λ).
    Cos { rate: c64 },
}

impl ScalarFunction {
    /// Evaluates the function at `lambda`.
    pub fn eval(&self, lambda: c64) -> c64 {
        self.derivative(lambda, 0)
    }

    /// Evaluates the `order`-th derivative at `lambda`.
    pub fn derivative(&self, lambda: c64, order: usize) -> c64 {
        match *self {
            ScalarFunction::Power(p) => {
                let p = p as usize;
                if order > p {
                    return c64::new(0.0, 0.0);
                }
                // p!/(p-k)!
                let falling: f64 = ((p - order + 1)..=p).map(|i| i as f64).product();
                lambda.powu((p - order) as u32) * falling
            }
            ScalarFunction::Exp { rate } => rate.powu(order as u32) * (rate * lambda).exp(),
            ScalarFunction::Sqrt => {
                let mut coeff = 1.0;
                for i in 0..order {
                    coeff *= 0.5 - i as f64;
                }
                if order == 0 {
                    lambda.sqrt()
                } else {
                    lambda.sqrt() / lambda.powu(order as u32) * coeff
                }
            }
            ScalarFunction::Sin { rate } => {
                let z = rate * lambda;
                let base = match order % 4 {
                    0 => z.sin(),
                    1 => z.cos(),
                    2 => -z.sin(),
                    _ => -z.cos(),
                };
                rate.powu(order as u32) * base
            }
            ScalarFunction::Cos { rate } => {
                let z = rate * lambda;
                let base = match order % 4 {
                    0 => z.cos(),
                    1 => -z.sin(),
                    2 => -z.cos(),
                    _ => z.sin(),
                };
                rate.powu(order as u32) * base
            }
        }
    }
}

/// One term A·f(λ) of a sum-of-products representation.
#[derive(Debug, Clone, PartialEq)]
pub struct NepTerm {
    pub matrix: Mat<c64>,
    pub function: ScalarFunction,
}

impl NepTerm {
    pub fn new(matrix: Mat<c64>, function: ScalarFunction) -> Self {
        Self { matrix, function }
    }
}

/// A matrix-valued function of a complex scalar whose singular points are sought.
///
/// Implementors must be shareable across threads: the quadrature layer evaluates the
/// problem at independent points in parallel.
pub trait Nep: Send + Sync {
    /// Returns the dimension `n` of the (square) problem.
    fn size(&self) -> usize;

    /// Returns the structural kind of the problem.
    fn kind(&self) -> NepKind {
        NepKind::Generic
    }

    /// The sum-of-products structure M(λ) = Σ_i A_i f_i(λ), when it is known.
    fn terms(&self) -> Option<&[NepTerm]> {
        None
    }

    /// Computes the `order`-th derivative M^{(order)}(λ). Order 0 is the operator value.
    fn compute_mder(&self, lambda: c64, order: usize) -> Mat<c64>;

    /// Computes the operator value M(λ).
    fn compute_mm(&self, lambda: c64) -> Mat<c64> {
        self.compute_mder(lambda, 0)
    }

    /// Computes Σ_j a_j M^{(start_order + j)}(λ) V[:, j] as an n×1 matrix.
    ///
    /// Only the first `min(coefficients.len(), vectors.ncols())` columns take part.
    fn compute_mlincomb(
        &self,
        lambda: c64,
        vectors: MatRef<'_, c64>,
        coefficients: &[c64],
        start_order: usize,
    ) -> Mat<c64> {
        let mut acc = Mat::zeros(self.size(), 1);
        for (j, &a) in coefficients.iter().enumerate().take(vectors.ncols()) {
            if a == c64::new(0.0, 0.0) {
                continue;
            }
            let der = self.compute_mder(lambda, start_order + j);
            let prod = der.as_ref() * vectors.get(.., j..j + 1);
            axpy(&mut acc, a, prod.as_ref());
        }
        acc
    }

    /// Applies M(λ) to an n×1 vector.
    fn apply(&self, lambda: c64, v: MatRef<'_, c64>) -> Mat<c64> {
        self.compute_mlincomb(lambda, v, &[c64::new(1.0, 0.0)], 0)
    }
}

/// A NEP given as a sum of products of constant matrices and scalar functions.
#[derive(Debug, Clone, PartialEq)]
pub struct SpmfNep {
    n: usize,
    terms: Vec<NepTerm>,
    kind: NepKind,
}

impl SpmfNep {
    /// Creates M(λ) = Σ_i A_i f_i(λ). The kind is `Polynomial` when every function is a power,
    /// `SumOfProducts` otherwise.
    pub fn new(terms: Vec<NepTerm>) -> Result<Self, NepError> {
        let kind = if terms
            .iter()
            .all(|t| matches!(t.function, ScalarFunction::Power(_)))
        {
            NepKind::Polynomial
        } else {
            NepKind::SumOfProducts
        };
        Self::with_kind(terms, kind)
    }

    /// Creates the polynomial problem Σ_k A_k λ^k from `coefficients = [A_0, A_1, ...]`.
    pub fn polynomial(coefficients: Vec<Mat<c64>>) -> Result<Self, NepError> {
        let terms = coefficients
            .into_iter()
            .enumerate()
            .map(|(k, a)| NepTerm::new(a, ScalarFunction::Power(k as u32)))
            .collect();
        Self::with_kind(terms, NepKind::Polynomial)
    }

    /// Creates the delay problem M(λ) = −λI + Σ_i A_i e^{−τ_i λ}.
    pub fn delay(matrices: Vec<Mat<c64>>, delays: &[f64]) -> Result<Self, NepError> {
        if matrices.len() != delays.len() {
            return Err(NepErrorKind::DimensionMismatch {
                expected: matrices.len(),
                actual: delays.len(),
            }
            .into());
        }
        if delays.iter().any(|&tau| !(tau >= 0.0)) {
            return Err(NepError::invalid("delays must be non-negative"));
        }
        let n = matrices.first().map(|a| a.nrows()).unwrap_or(0);
        let mut terms = vec![NepTerm::new(
            Mat::from_fn(n, n, |i, j| if i == j { c64::new(-1.0, 0.0) } else { c64::new(0.0, 0.0) }),
            ScalarFunction::Power(1),
        )];
        for (a, &tau) in matrices.into_iter().zip(delays) {
            terms.push(NepTerm::new(
                a,
                ScalarFunction::Exp {
                    rate: c64::new(-tau, 0.0),
                },
            ));
        }
        Self::with_kind(terms, NepKind::Delay)
    }

    fn with_kind(terms: Vec<NepTerm>, kind: NepKind) -> Result<Self, NepError> {
        let n = match terms.first() {
            Some(term) => term.matrix.nrows(),
            None => return Err(NepError::invalid("a sum-of-products problem needs at least one term")),
        };
        for term in &terms {
            for dim in [term.matrix.nrows(), term.matrix.ncols()] {
                if dim != n {
                    return Err(NepErrorKind::DimensionMismatch {
                        expected: n,
                        actual: dim,
                    }
                    .into());
                }
            }
        }
        Ok(Self { n, terms, kind })
    }
}

impl Nep for SpmfNep {
    fn size(&self) -> usize {
        self.n
    }

    fn kind(&self) -> NepKind {
        self.kind
    }

    fn terms(&self) -> Option<&[NepTerm]> {
        Some(&self.terms)
    }

    fn compute_mder(&self, lambda: c64, order: usize) -> Mat<c64> {
        spmf_mder(self.n, &self.terms, lambda, order)
    }

    fn compute_mlincomb(
        &self,
        lambda: c64,
        vectors: MatRef<'_, c64>,
        coefficients: &[c64],
        start_order: usize,
    ) -> Mat<c64> {
        spmf_mlincomb(self.n, &self.terms, lambda, vectors, coefficients, start_order)
    }
}

/// Σ_i A_i f_i^{(order)}(λ).
pub(crate) fn spmf_mder(n: usize, terms: &[NepTerm], lambda: c64, order: usize) -> Mat<c64> {
    let mut acc = Mat::zeros(n, n);
    for term in terms {
        let f = term.function.derivative(lambda, order);
        axpy(&mut acc, f, term.matrix.as_ref());
    }
    acc
}

/// Σ_i A_i (Σ_j a_j f_i^{(s+j)}(λ) V[:, j]): one matrix-vector product per term.
pub(crate) fn spmf_mlincomb(
    n: usize,
    terms: &[NepTerm],
    lambda: c64,
    vectors: MatRef<'_, c64>,
    coefficients: &[c64],
    start_order: usize,
) -> Mat<c64> {
    let mut acc = Mat::zeros(n, 1);
    let width = coefficients.len().min(vectors.ncols());
    for term in terms {
        let mut combined = Mat::<c64>::zeros(n, 1);
        for (j, &a) in coefficients.iter().enumerate().take(width) {
            let weight = a * term.function.derivative(lambda, start_order + j);
            if weight != c64::new(0.0, 0.0) {
                axpy(&mut combined, weight, vectors.get(.., j..j + 1));
            }
        }
        let prod = term.matrix.as_ref() * combined.as_ref();
        axpy(&mut acc, c64::new(1.0, 0.0), prod.as_ref());
    }
    acc
}

/// Extracts the coefficients `[A_0, ..., A_d]` of a polynomial problem.
///
/// Returns `None` when the problem does not expose a structure made only of powers.
pub fn polynomial_coefficients(nep: &dyn Nep) -> Option<Vec<Mat<c64>>> {
    let terms = nep.terms()?;
    let n = nep.size();
    let mut degree = 0;
    for term in terms {
        match term.function {
            ScalarFunction::Power(p) => degree = degree.max(p as usize),
            _ => return None,
        }
    }
    let mut coefficients = vec![Mat::zeros(n, n); degree + 1];
    for term in terms {
        if let ScalarFunction::Power(p) = term.function {
            axpy(&mut coefficients[p as usize], c64::new(1.0, 0.0), term.matrix.as_ref());
        }
    }
    Some(coefficients)
}

/// A NEP defined by a closure returning M^{(order)}(λ).
pub struct FnNep<F> {
    n: usize,
    derivative: F,
}

impl<F> FnNep<F>
where
    F: Fn(c64, usize) -> Mat<c64> + Send + Sync,
{
    pub fn new(n: usize, derivative: F) -> Self {
        Self { n, derivative }
    }
}

impl<F> Nep for FnNep<F>
where
    F: Fn(c64, usize) -> Mat<c64> + Send + Sync,
{
    fn size(&self) -> usize {
        self.n
    }

    fn compute_mder(&self, lambda: c64, order: usize) -> Mat<c64> {
        (self.derivative)(lambda, order)
    }
}

impl<F> std::fmt::Debug for FnNep<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnNep").field("n", &self.n).finish()
    }
}
