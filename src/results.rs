//! Result types shared by every solver.
//!
//! A solver run either reaches the requested number of eigenpairs ([`SolveResult::Converged`]) or
//! exhausts its budget ([`SolveResult::Partial`]). The partial variant is ordinary data, not an
//! error: callers may salvage it, or turn it into a [`NepError`] with [`SolveResult::into_result`].

use crate::error::{NepError, NepErrorKind};
use faer::{c64, Mat, MatRef};

/// An ordered set of eigenpairs. Column `i` of `eigenvectors` belongs to `eigenvalues[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Eigenpairs {
    pub eigenvalues: Vec<c64>,
    pub eigenvectors: Mat<c64>,
}

impl Eigenpairs {
    /// An empty set for problems of dimension `n`.
    pub fn empty(n: usize) -> Self {
        Self {
            eigenvalues: Vec::new(),
            eigenvectors: Mat::zeros(n, 0),
        }
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Appends `(lambda, v)`, where `v` is an n×1 column.
    pub fn push(&mut self, lambda: c64, v: MatRef<'_, c64>) {
        let n = self.eigenvectors.nrows();
        let m = self.eigenvectors.ncols();
        let old = std::mem::replace(&mut self.eigenvectors, Mat::zeros(0, 0));
        self.eigenvectors = Mat::from_fn(n, m + 1, |i, j| if j < m { old[(i, j)] } else { v[(i, 0)] });
        self.eigenvalues.push(lambda);
    }

    /// The eigenvector belonging to `eigenvalues[i]` as an n×1 view.
    pub fn vector(&self, i: usize) -> MatRef<'_, c64> {
        self.eigenvectors.as_ref().get(.., i..i + 1)
    }

    /// Iterates over `(λ_i, v_i)`.
    pub fn iter(&self) -> impl Iterator<Item = (c64, MatRef<'_, c64>)> + '_ {
        self.eigenvalues
            .iter()
            .enumerate()
            .map(move |(i, &lambda)| (lambda, self.vector(i)))
    }
}

/// The data carried by a run that ran out of budget.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSolution {
    /// Eigenpairs that passed the convergence test.
    pub converged: Eigenpairs,
    /// The best unconverged approximations at the time the run stopped.
    pub candidates: Eigenpairs,
    /// The last error measure that was evaluated.
    pub last_error: f64,
    pub message: String,
}

/// Outcome of a solver run.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveResult {
    Converged(Eigenpairs),
    Partial(PartialSolution),
}

impl SolveResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveResult::Converged(_))
    }

    /// The accepted eigenpairs, whichever way the run ended.
    pub fn eigenpairs(&self) -> &Eigenpairs {
        match self {
            SolveResult::Converged(pairs) => pairs,
            SolveResult::Partial(partial) => &partial.converged,
        }
    }

    /// Converts a partial result into [`NepErrorKind::NoConvergence`].
    pub fn into_result(self) -> Result<Eigenpairs, NepError> {
        match self {
            SolveResult::Converged(pairs) => Ok(pairs),
            SolveResult::Partial(partial) => Err(NepErrorKind::NoConvergence(Box::new(partial)).into()),
        }
    }
}
