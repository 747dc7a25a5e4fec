//! This module defines the custom error types for the library.
//!
//! Every fallible operation in the crate reports a [`NepError`]. The public type is a thin
//! transparent wrapper around [`NepErrorKind`], which enumerates the distinct failure modes:
//! budget exhaustion, contract violations detected at entry, and numerical breakdowns.
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types with minimal
//! boilerplate. Note that [`faer::linalg::evd::EvdError`] and [`faer::linalg::svd::SvdError`]
//! do not implement the standard [`std::error::Error`] trait, so we wrap them manually.
use crate::results::PartialSolution;
use thiserror::Error;

/// Represents all possible errors that can occur while solving a nonlinear eigenproblem.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct NepError(#[from] NepErrorKind);

/// The distinct kinds of errors.
///
/// The separation from [`NepError`] keeps the `Display` implementation in one place while
/// letting callers match on the kind through [`NepError::kind`].
#[derive(Error, Debug, PartialEq)]
pub enum NepErrorKind {
    /// An iteration exhausted its budget before reaching the requested number of eigenpairs.
    /// The payload holds whatever was accepted plus the best current candidate.
    #[error("No convergence: {}", .0.message)]
    NoConvergence(Box<PartialSolution>),

    /// A contract violation detected before any iteration started.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Orthogonalization or a linear solve failed to produce a numerically meaningful result.
    #[error("Numerical breakdown: {0}")]
    NumericalBreakdown(String),

    /// The dimensions of two operands are incompatible.
    #[error("Dimension mismatch: expected {expected} but found {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Wraps an error originating from [`faer`]'s eigendecomposition module.
    #[error("A numerical error occurred during an eigendecomposition: {0:?}")]
    Evd(faer::linalg::evd::EvdError),

    /// Wraps an error originating from [`faer`]'s singular value decomposition module.
    #[error("A numerical error occurred during a singular value decomposition: {0:?}")]
    Svd(faer::linalg::svd::SvdError),
}

impl NepError {
    /// Returns the underlying error kind.
    pub fn kind(&self) -> &NepErrorKind {
        &self.0
    }

    /// `true` for [`NepErrorKind::NumericalBreakdown`].
    pub fn is_breakdown(&self) -> bool {
        matches!(self.0, NepErrorKind::NumericalBreakdown(_))
    }

    /// The partial result carried by a [`NepErrorKind::NoConvergence`] error, if any.
    pub fn partial(&self) -> Option<&PartialSolution> {
        match &self.0 {
            NepErrorKind::NoConvergence(partial) => Some(partial),
            _ => None,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        NepErrorKind::InvalidConfiguration(message.into()).into()
    }

    pub(crate) fn breakdown(message: impl Into<String>) -> Self {
        NepErrorKind::NumericalBreakdown(message.into()).into()
    }
}

impl From<faer::linalg::evd::EvdError> for NepError {
    fn from(e: faer::linalg::evd::EvdError) -> Self {
        NepErrorKind::Evd(e).into()
    }
}

impl From<faer::linalg::svd::SvdError> for NepError {
    fn from(e: faer::linalg::svd::SvdError) -> Self {
        NepErrorKind::Svd(e).into()
    }
}

// Manually implement PartialEq for the public error type.
// We compare the inner `NepErrorKind`.
impl PartialEq for NepError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

// Unit tests to ensure error messages are formatted correctly.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Eigenpairs;

    #[test]
    fn test_no_convergence_error_message() {
        let partial = PartialSolution {
            converged: Eigenpairs::empty(3),
            candidates: Eigenpairs::empty(3),
            last_error: 1e-3,
            message: "Jacobi-Davidson reached maxit = 10 with 0 of 2 eigenpairs".to_string(),
        };
        let error = NepError(NepErrorKind::NoConvergence(Box::new(partial)));
        assert_eq!(
            error.to_string(),
            "No convergence: Jacobi-Davidson reached maxit = 10 with 0 of 2 eigenpairs"
        );
        assert_eq!(error.partial().map(|p| p.last_error), Some(1e-3));
    }

    #[test]
    fn test_invalid_configuration_error_message() {
        let error = NepError::invalid("maxit (12) exceeds the problem size (10)");
        assert_eq!(
            error.to_string(),
            "Invalid configuration: maxit (12) exceeds the problem size (10)"
        );
        assert!(!error.is_breakdown());
    }

    #[test]
    fn test_breakdown_error_message() {
        let error = NepError::breakdown("vector is numerically in the span of the basis");
        assert_eq!(
            error.to_string(),
            "Numerical breakdown: vector is numerically in the span of the basis"
        );
        assert!(error.is_breakdown());
    }

    #[test]
    fn test_dimension_mismatch_error_message() {
        let error = NepError(NepErrorKind::DimensionMismatch {
            expected: 100,
            actual: 99,
        });
        assert_eq!(error.to_string(), "Dimension mismatch: expected 100 but found 99.");
    }

    #[test]
    fn test_decomposition_error_messages() {
        let error = NepError::from(faer::linalg::evd::EvdError::NoConvergence);
        assert_eq!(
            error.to_string(),
            "A numerical error occurred during an eigendecomposition: NoConvergence"
        );
        let error = NepError::from(faer::linalg::svd::SvdError::NoConvergence);
        assert_eq!(
            error.to_string(),
            "A numerical error occurred during a singular value decomposition: NoConvergence"
        );
    }
}
