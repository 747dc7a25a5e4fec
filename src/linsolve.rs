//! Linear solves with M(λ).
//!
//! Solvers never factorize M(λ) themselves; they ask a [`LinSolverCreator`] for a solver at a
//! given λ and reuse it for as many right-hand sides as they need. The default creator performs
//! a dense LU factorization with partial pivoting through [`faer`].

use crate::error::NepError;
use crate::nep::Nep;
use crate::utils::is_finite;
use faer::{c64, linalg::solvers::PartialPivLu, prelude::*, Mat, MatRef};
use std::fmt;

/// A factorized M(λ) able to solve M(λ)x = b.
pub trait LinSolver {
    /// Solves for every column of `rhs`. `tol` is a hint for iterative implementations.
    fn solve(&self, rhs: MatRef<'_, c64>, tol: f64) -> Result<Mat<c64>, NepError>;
}

/// Creates a [`LinSolver`] for M(λ).
pub trait LinSolverCreator: fmt::Debug + Send + Sync {
    fn create(&self, nep: &dyn Nep, lambda: c64) -> Result<Box<dyn LinSolver>, NepError>;
}

/// Dense LU factorization of M(λ).
#[derive(Debug)]
pub struct LuLinSolver {
    lu: PartialPivLu<c64>,
    lambda: c64,
}

impl LuLinSolver {
    pub fn new(nep: &dyn Nep, lambda: c64) -> Self {
        let m = nep.compute_mm(lambda);
        Self {
            lu: m.partial_piv_lu(),
            lambda,
        }
    }
}

impl LinSolver for LuLinSolver {
    fn solve(&self, rhs: MatRef<'_, c64>, _tol: f64) -> Result<Mat<c64>, NepError> {
        let x = self.lu.solve(rhs);
        if !is_finite(x.as_ref()) {
            return Err(NepError::breakdown(format!(
                "M(λ) is numerically singular at λ = {}",
                self.lambda
            )));
        }
        Ok(x)
    }
}

/// Creates an [`LuLinSolver`] for every requested λ.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultLinSolverCreator;

impl LinSolverCreator for DefaultLinSolverCreator {
    fn create(&self, nep: &dyn Nep, lambda: c64) -> Result<Box<dyn LinSolver>, NepError> {
        Ok(Box::new(LuLinSolver::new(nep, lambda)))
    }
}
