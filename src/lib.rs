//! Solvers for nonlinear eigenvalue problems.
//!
//! This crate computes pairs (λ, v), v ≠ 0, with M(λ)v = 0 for a matrix-valued function
//! M: ℂ → ℂ^{n×n}. Problems are described through the [`Nep`] capability: evaluating
//! derivatives of M, linear combinations of derivatives applied to vectors, and (optionally) a
//! sum-of-products structure M(λ) = Σ_i A_i f_i(λ) that some methods exploit.
//!
//! Built on the [`faer`] linear algebra framework, every algorithm works on dense complex
//! matrices and reports progress through a pluggable [`Logger`].
//!
//! ## Algorithms
//!
//! **Jacobi–Davidson** ([`jacobi_davidson`]): Projects the problem onto a growing search space
//! and solves the small projected problem with an inner strategy chosen from the problem
//! kind (see [`algorithms::inner`]). Converged eigenvalues are deflated by requesting one more
//! eigenvalue from the inner solver than have been accepted so far.
//!
//! **Contour integration** ([`contour_beyn`]): Beyn's method, built on
//! [`integrate_interval`] with a pluggable [`QuadratureRule`].
//!
//! **Infinite Arnoldi** ([`iar`], [`iar_chebyshev`]): Arnoldi on an operator acting on a
//! function space, in a Taylor or Chebyshev basis.
//!
//! **NLEIGS** ([`nleigs`]): Shift-invert Arnoldi on a linearization of a rational Leja–Bagby
//! interpolant of M on a target region.
//!
//! The remaining strategies ([`polyeig`], [`augnewton`], [`sgiter`]) are usable on their own as
//! well.
//!
//! ## Example Usage
//!
//! The eigenvalue of a quadratic eigenvalue problem (λ²I + λA₁ + A₀)v = 0 closest to the
//! origin.
//!
//! ```rust
//! use faer::{c64, mat};
//! use nep_solvers::{jacobi_davidson, JacobiDavidsonSettingsBuilder, SpmfNep};
//! use nep_solvers::utils::to_complex;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let nep = SpmfNep::polynomial(vec![
//!     to_complex(mat![[1.0, 3.0], [5.0, 6.0]].as_ref()),
//!     to_complex(mat![[3.0, 4.0], [6.0, 6.0]].as_ref()),
//!     to_complex(mat![[1.0, 0.0], [0.0, 1.0]].as_ref()),
//! ])?;
//!
//! // The search space may not grow beyond the problem dimension.
//! let settings = JacobiDavidsonSettingsBuilder::default()
//!     .neigs(1)
//!     .maxit(2)
//!     .target(c64::new(0.0, 0.0))
//!     .build()?;
//!
//! let pairs = jacobi_davidson(&nep, &settings)?;
//! assert_eq!(pairs.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Budget exhaustion is ordinary data for the algorithms in [`algorithms`], which return a
//! [`SolveResult`]. The wrappers exported at the crate root turn a partial result into
//! [`error::NepErrorKind::NoConvergence`], which still carries the partial data.

pub mod algorithms;
pub mod errmeasure;
pub mod error;
pub mod linsolve;
pub mod logger;
pub mod nep;
pub mod projection;
pub mod quadrature;
pub mod results;
pub mod solvers;
pub mod utils;

// Re-export the main API from solvers for convenient access.
pub use solvers::{
    augnewton, contour_beyn, iar, iar_chebyshev, inner_solve, integrate_interval, jacobi_davidson, nleigs,
    polyeig, sgiter,
};

pub use algorithms::beyn::{BeynSettings, BeynSettingsBuilder};
pub use algorithms::iar::{IarSettings, IarSettingsBuilder};
pub use algorithms::inner::{InnerSolution, InnerSolveOptions, InnerSolver};
pub use algorithms::jacobi_davidson::{JacobiDavidsonSettings, JacobiDavidsonSettingsBuilder, ProjectionType};
pub use algorithms::newton::{NewtonSettings, NewtonSettingsBuilder};
pub use algorithms::nleigs::{NleigsSettings, NleigsSettingsBuilder, NleigsSolution, Region};
pub use algorithms::orthogonalization::OrthMethod;
pub use algorithms::sgiter::{SgIterSettings, SgIterSettingsBuilder};
pub use errmeasure::ErrMeasure;
pub use error::{NepError, NepErrorKind};
pub use logger::{LogLogger, Logger, NoLogger};
pub use nep::{FnNep, Nep, NepKind, NepTerm, ScalarFunction, SpmfNep};
pub use quadrature::{QuadRule, QuadratureRule};
pub use results::{Eigenpairs, PartialSolution, SolveResult};
