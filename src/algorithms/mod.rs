//! Eigensolver implementations.
//!
//! ** NOTE: We recommend using the high-level entry points re-exported from [`crate::solvers`].
//! The submodules expose the individual algorithms and their settings for callers who need
//! fine-grained control.
//!
//! - [`jacobi_davidson`]: the projection method (outer iteration) and its deflation bookkeeping.
//! - [`inner`]: the dispatcher routing projected problems to a concrete strategy.
//! - [`newton`], [`polyeig`], [`iar`], [`iar_chebyshev`], [`sgiter`], [`beyn`]: the strategies.
//! - [`nleigs`]: rational Krylov on a Leja–Bagby interpolant of the problem.
//! - [`orthogonalization`]: incremental orthonormal bases shared by the Krylov-type methods.

pub mod beyn;
pub mod iar;
pub mod iar_chebyshev;
pub mod inner;
pub mod jacobi_davidson;
pub mod newton;
pub mod nleigs;
pub mod orthogonalization;
pub mod polyeig;
pub mod sgiter;

use crate::error::NepError;
use faer::{c64, Mat, MatRef};

/// Relative size below which an orthogonalized vector is considered to lie in the span of the
/// basis.
pub(crate) fn breakdown_tolerance() -> f64 {
    100.0 * f64::EPSILON
}

/// Eigendecomposition of a small dense matrix, `(values, vectors)` with unit-norm columns.
pub(crate) fn dense_eigen(m: MatRef<'_, c64>) -> Result<(Vec<c64>, Mat<c64>), NepError> {
    let evd = m.eigen()?;
    let values: Vec<c64> = evd.S().column_vector().iter().copied().collect();
    let u = evd.U();
    let norms: Vec<f64> = (0..u.ncols())
        .map(|j| u.get(.., j..j + 1).norm_l2())
        .collect();
    let vectors = Mat::from_fn(u.nrows(), u.ncols(), |i, j| {
        if norms[j] > 0.0 {
            u[(i, j)] / norms[j]
        } else {
            u[(i, j)]
        }
    });
    Ok((values, vectors))
}
