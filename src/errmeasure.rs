//! Error measures for approximate eigenpairs.

use crate::nep::Nep;
use faer::{c64, MatRef};
use std::fmt;
use std::sync::Arc;

/// A user-supplied error measure `(λ, v) ↦ err`.
pub type CustomErrMeasure = Arc<dyn Fn(c64, MatRef<'_, c64>) -> f64 + Send + Sync>;

/// How the quality of an approximate eigenpair (λ, v) is judged.
#[derive(Clone, Default)]
pub enum ErrMeasure {
    /// Backward error: ‖M(λ)v‖ / (‖v‖ Σ_i |f_i(λ)| ‖A_i‖_F) for sum-of-products problems,
    /// ‖M(λ)v‖ / (‖v‖ ‖M(λ)‖_F) otherwise.
    #[default]
    Standard,
    /// ‖M(λ)v‖ / ‖v‖.
    Residual,
    Custom(CustomErrMeasure),
}

impl ErrMeasure {
    /// Wraps a closure as a [`ErrMeasure::Custom`] measure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(c64, MatRef<'_, c64>) -> f64 + Send + Sync + 'static,
    {
        ErrMeasure::Custom(Arc::new(f))
    }

    /// Evaluates the measure for the n×1 vector `v`.
    pub fn measure(&self, nep: &dyn Nep, lambda: c64, v: MatRef<'_, c64>) -> f64 {
        match self {
            ErrMeasure::Custom(f) => f(lambda, v),
            ErrMeasure::Residual | ErrMeasure::Standard => {
                let vnorm = v.norm_l2();
                if vnorm == 0.0 {
                    return f64::INFINITY;
                }
                let residual = nep.apply(lambda, v).norm_l2() / vnorm;
                if matches!(self, ErrMeasure::Residual) {
                    return residual;
                }
                let scale = match nep.terms() {
                    Some(terms) => terms
                        .iter()
                        .map(|t| t.function.eval(lambda).norm() * t.matrix.norm_l2())
                        .sum::<f64>(),
                    None => nep.compute_mm(lambda).norm_l2(),
                };
                if scale > 0.0 && scale.is_finite() {
                    residual / scale
                } else {
                    residual
                }
            }
        }
    }
}

impl fmt::Debug for ErrMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrMeasure::Standard => f.write_str("Standard"),
            ErrMeasure::Residual => f.write_str("Residual"),
            ErrMeasure::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
