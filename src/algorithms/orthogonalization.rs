//! Incremental orthonormal bases.
//!
//! Subspace methods grow their search spaces one column at a time. [`SubspaceBasis`] owns a
//! pre-allocated n×capacity buffer together with an explicit active width, so that growth never
//! reallocates and views of the active part are cheap. New columns enter the basis through
//! [`orthogonalize_and_normalize`], which supports the classical, modified and
//! twice-iterated (DGKS) Gram–Schmidt variants.

use super::breakdown_tolerance;
use crate::error::NepError;
use crate::utils::dot;
use faer::{
    c64,
    prelude::{Reborrow, ReborrowMut},
    Mat, MatMut, MatRef, Scale,
};

/// Gram–Schmidt variant used to orthogonalize a new vector against a basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OrthMethod {
    /// One pass of classical Gram–Schmidt.
    ClassicalGramSchmidt,
    /// One pass of modified Gram–Schmidt.
    ModifiedGramSchmidt,
    /// Classical Gram–Schmidt with one re-orthogonalization pass (Daniel–Gragg–Kaufman–Stewart).
    #[default]
    Dgks,
}

/// Orthogonalizes the n×1 vector `v` against the orthonormal columns of `basis` and normalizes it
/// in place.
///
/// The projection coefficients are accumulated into `h[..basis.ncols()]`, which makes the routine
/// directly usable for Arnoldi-type recurrences. On success, the norm of the orthogonalized vector
/// before normalization is returned.
///
/// # Errors
/// Returns a numerical breakdown when the orthogonalized vector is too small relative to the
/// original one to be normalized reliably (the vector lies numerically in the span of `basis`).
/// In that case `h` is still filled and `v` holds the unnormalized residual.
pub fn orthogonalize_and_normalize(
    basis: MatRef<'_, c64>,
    mut v: MatMut<'_, c64>,
    h: &mut [c64],
    method: OrthMethod,
) -> Result<f64, NepError> {
    let k = basis.ncols();
    let original_norm = v.rb().norm_l2();
    h.iter_mut().take(k).for_each(|x| *x = c64::new(0.0, 0.0));

    let passes = match method {
        OrthMethod::Dgks => 2,
        OrthMethod::ClassicalGramSchmidt | OrthMethod::ModifiedGramSchmidt => 1,
    };

    for _ in 0..passes {
        match method {
            OrthMethod::ModifiedGramSchmidt => {
                for j in 0..k {
                    let qj = basis.get(.., j..j + 1);
                    let coeff = dot(qj, v.rb());
                    v -= Scale(coeff) * qj;
                    h[j] += coeff;
                }
            }
            OrthMethod::ClassicalGramSchmidt | OrthMethod::Dgks => {
                let coeffs = basis.adjoint() * v.rb();
                v -= basis * &coeffs;
                for (j, hj) in h.iter_mut().take(k).enumerate() {
                    *hj += coeffs[(j, 0)];
                }
            }
        }
    }

    let norm = v.rb().norm_l2();
    if original_norm == 0.0 || norm <= breakdown_tolerance() * original_norm {
        return Err(NepError::breakdown(format!(
            "vector is numerically in the span of the basis (residual {norm:.3e}, original {original_norm:.3e})"
        )));
    }
    let unit = Scale(c64::new(norm.recip(), 0.0)) * v.rb();
    v.copy_from(&unit);
    Ok(norm)
}

/// An orthonormal basis grown one column at a time inside a fixed buffer.
#[derive(Debug, Clone)]
pub struct SubspaceBasis {
    buffer: Mat<c64>,
    width: usize,
}

impl SubspaceBasis {
    /// Reserves room for `capacity` columns of length `n`.
    pub fn with_capacity(n: usize, capacity: usize) -> Self {
        Self {
            buffer: Mat::zeros(n, capacity),
            width: 0,
        }
    }

    /// Number of columns currently in the basis.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn capacity(&self) -> usize {
        self.buffer.ncols()
    }

    /// A view of the active columns.
    pub fn active(&self) -> MatRef<'_, c64> {
        self.buffer.as_ref().get(.., 0..self.width)
    }

    /// Column `j` of the basis as an n×1 view.
    pub fn column(&self, j: usize) -> MatRef<'_, c64> {
        self.buffer.as_ref().get(.., j..j + 1)
    }

    /// Orthonormalizes `candidate` against the basis and appends it.
    ///
    /// Returns the projection coefficients on the existing columns followed by the norm of the
    /// orthogonal part, i.e. one column of an Arnoldi Hessenberg matrix. On breakdown the basis is
    /// left unchanged.
    pub fn push(&mut self, candidate: MatRef<'_, c64>, method: OrthMethod) -> Result<Vec<c64>, NepError> {
        if self.width == self.capacity() {
            return Err(NepError::invalid(format!(
                "subspace basis is full ({} columns)",
                self.capacity()
            )));
        }
        let mut v = candidate.to_owned();
        let mut h = vec![c64::new(0.0, 0.0); self.width + 1];
        let (basis, mut rest) = self.buffer.split_at_col_mut(self.width);
        let beta = orthogonalize_and_normalize(basis.rb(), v.as_mut(), &mut h, method)?;
        h[self.width] = c64::new(beta, 0.0);
        rest.rb_mut().col_mut(0).copy_from(v.col(0));
        self.width += 1;
        Ok(h)
    }
}
