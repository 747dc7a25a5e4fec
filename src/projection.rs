//! Projection of a NEP onto a pair of subspaces.
//!
//! Given bases V (trial) and W (test) with k columns, the projected problem is
//! Wᴴ M(λ) V, a k×k NEP. For sum-of-products problems the projection is carried out term by
//! term, Wᴴ A_i V, so the projected problem keeps the scalar functions f_i of the original and
//! evaluating it costs nothing beyond k×k arithmetic. Other problems are projected on the fly at
//! every evaluation.
//!
//! A [`ProjectedNep`] is created once per solver run with a fixed capacity. Its buffers are
//! allocated up front; [`ProjectedNep::set_projection`] only computes the rows and columns that
//! correspond to newly appended basis vectors.

use crate::error::{NepError, NepErrorKind};
use crate::nep::{spmf_mder, spmf_mlincomb, Nep, NepKind, NepTerm, ScalarFunction};
use crate::utils::dot;
use faer::{c64, Mat, MatRef};

/// Cached per-term products for sum-of-products originals.
#[derive(Debug, Clone)]
struct TermProjection {
    functions: Vec<ScalarFunction>,
    /// A_i V, n × capacity.
    av: Vec<Mat<c64>>,
    /// Wᴴ A_i V, capacity × capacity.
    blocks: Vec<Mat<c64>>,
}

/// The NEP Wᴴ M(λ) V for growing bases V and W.
pub struct ProjectedNep<'a> {
    original: &'a dyn Nep,
    width: usize,
    v: Mat<c64>,
    w: Mat<c64>,
    structured: Option<TermProjection>,
    terms: Vec<NepTerm>,
}

impl<'a> ProjectedNep<'a> {
    /// Creates an empty projection with room for `capacity` basis vectors.
    pub fn new(original: &'a dyn Nep, capacity: usize) -> Self {
        let n = original.size();
        let structured = original.terms().map(|terms| TermProjection {
            functions: terms.iter().map(|t| t.function).collect(),
            av: vec![Mat::zeros(n, capacity); terms.len()],
            blocks: vec![Mat::zeros(capacity, capacity); terms.len()],
        });
        Self {
            original,
            width: 0,
            v: Mat::zeros(n, capacity),
            w: Mat::zeros(n, capacity),
            structured,
            terms: Vec::new(),
        }
    }

    /// The problem being projected.
    pub fn original(&self) -> &dyn Nep {
        self.original
    }

    pub fn capacity(&self) -> usize {
        self.v.ncols()
    }

    /// Updates the projection to the bases `w` and `v` (both n×k).
    ///
    /// The first columns must coincide with the ones passed previously; only the columns beyond
    /// the previous width are read.
    pub fn set_projection(&mut self, w: MatRef<'_, c64>, v: MatRef<'_, c64>) -> Result<(), NepError> {
        let n = self.original.size();
        let k = v.ncols();
        for rows in [v.nrows(), w.nrows()] {
            if rows != n {
                return Err(NepErrorKind::DimensionMismatch { expected: n, actual: rows }.into());
            }
        }
        if w.ncols() != k {
            return Err(NepErrorKind::DimensionMismatch {
                expected: k,
                actual: w.ncols(),
            }
            .into());
        }
        if k > self.capacity() || k < self.width {
            return Err(NepError::invalid(format!(
                "projection width {k} outside [{}, {}]",
                self.width,
                self.capacity()
            )));
        }

        let old = self.width;
        for j in old..k {
            self.v.col_mut(j).copy_from(v.col(j));
            self.w.col_mut(j).copy_from(w.col(j));
        }

        if let (Some(proj), Some(terms)) = (self.structured.as_mut(), self.original.terms()) {
            for (i, term) in terms.iter().enumerate() {
                for j in old..k {
                    let product = term.matrix.as_ref() * self.v.as_ref().get(.., j..j + 1);
                    proj.av[i].col_mut(j).copy_from(product.col(0));
                }
                for r in 0..k {
                    for j in 0..k {
                        if r >= old || j >= old {
                            proj.blocks[i][(r, j)] = dot(
                                self.w.as_ref().get(.., r..r + 1),
                                proj.av[i].as_ref().get(.., j..j + 1),
                            );
                        }
                    }
                }
            }
            self.terms = proj
                .blocks
                .iter()
                .zip(&proj.functions)
                .map(|(block, &function)| NepTerm::new(block.as_ref().get(0..k, 0..k).to_owned(), function))
                .collect();
        }
        self.width = k;
        Ok(())
    }

    fn active_v(&self) -> MatRef<'_, c64> {
        self.v.as_ref().get(.., 0..self.width)
    }

    fn active_w(&self) -> MatRef<'_, c64> {
        self.w.as_ref().get(.., 0..self.width)
    }
}

impl Nep for ProjectedNep<'_> {
    fn size(&self) -> usize {
        self.width
    }

    /// The kind of the original problem.
    fn kind(&self) -> NepKind {
        self.original.kind()
    }

    fn terms(&self) -> Option<&[NepTerm]> {
        self.structured.as_ref().map(|_| self.terms.as_slice())
    }

    fn compute_mder(&self, lambda: c64, order: usize) -> Mat<c64> {
        if self.structured.is_some() {
            return spmf_mder(self.width, &self.terms, lambda, order);
        }
        let der = self.original.compute_mder(lambda, order);
        let dv = der.as_ref() * self.active_v();
        self.active_w().adjoint() * dv.as_ref()
    }

    fn compute_mlincomb(
        &self,
        lambda: c64,
        vectors: MatRef<'_, c64>,
        coefficients: &[c64],
        start_order: usize,
    ) -> Mat<c64> {
        if self.structured.is_some() {
            return spmf_mlincomb(self.width, &self.terms, lambda, vectors, coefficients, start_order);
        }
        // Wᴴ Σ_j a_j M^{(s+j)}(λ) (V x_j)
        let lifted = self.active_v() * vectors;
        let full = self
            .original
            .compute_mlincomb(lambda, lifted.as_ref(), coefficients, start_order);
        self.active_w().adjoint() * full.as_ref()
    }
}

impl std::fmt::Debug for ProjectedNep<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectedNep")
            .field("width", &self.width)
            .field("capacity", &self.capacity())
            .field("structured", &self.structured.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::orthogonalization::{OrthMethod, SubspaceBasis};
    use crate::nep::{FnNep, SpmfNep};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_matrix(rng: &mut StdRng, n: usize, m: usize) -> Mat<c64> {
        Mat::from_fn(n, m, |_, _| c64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
    }

    fn sample_problem(rng: &mut StdRng, n: usize) -> SpmfNep {
        let a0 = random_matrix(rng, n, n);
        let a1 = random_matrix(rng, n, n);
        SpmfNep::delay(vec![a0, a1], &[0.0, 1.0]).unwrap()
    }

    fn bases(rng: &mut StdRng, n: usize, k: usize) -> (SubspaceBasis, SubspaceBasis) {
        let cand = random_matrix(rng, n, 2 * k);
        let mut v = SubspaceBasis::with_capacity(n, k);
        let mut w = SubspaceBasis::with_capacity(n, k);
        for j in 0..k {
            v.push(cand.as_ref().get(.., j..j + 1), OrthMethod::Dgks).unwrap();
            w.push(cand.as_ref().get(.., k + j..k + j + 1), OrthMethod::Dgks).unwrap();
        }
        (v, w)
    }

    #[test]
    fn incremental_projection_matches_direct_product() {
        let mut rng = StdRng::seed_from_u64(5);
        let nep = sample_problem(&mut rng, 8);
        let (v, w) = bases(&mut rng, 8, 4);

        let mut pnep = ProjectedNep::new(&nep, 4);
        for k in 1..=4 {
            pnep.set_projection(w.active().get(.., 0..k), v.active().get(.., 0..k))
                .unwrap();
        }
        assert_eq!(pnep.size(), 4);
        assert_eq!(pnep.kind(), NepKind::Delay);

        let lambda = c64::new(0.4, -0.2);
        let mv = nep.compute_mm(lambda).as_ref() * v.active();
        let direct = w.active().adjoint() * mv.as_ref();
        let projected = pnep.compute_mm(lambda);
        assert!((direct.as_ref() - projected.as_ref()).norm_l2() < 1e-12);
    }

    #[test]
    fn generic_projection_evaluates_on_the_fly() {
        let mut rng = StdRng::seed_from_u64(9);
        let nep = sample_problem(&mut rng, 6);
        let generic = FnNep::new(6, |lambda, order| nep.compute_mder(lambda, order));
        let (v, w) = bases(&mut rng, 6, 3);

        let mut structured = ProjectedNep::new(&nep, 3);
        let mut opaque = ProjectedNep::new(&generic, 3);
        structured.set_projection(w.active(), v.active()).unwrap();
        opaque.set_projection(w.active(), v.active()).unwrap();
        assert!(opaque.terms().is_none());

        let x = random_matrix(&mut rng, 3, 2);
        let coeffs = [c64::new(1.0, 0.0), c64::new(0.3, 0.1)];
        let lambda = c64::new(-0.3, 0.7);
        let a = structured.compute_mlincomb(lambda, x.as_ref(), &coeffs, 0);
        let b = opaque.compute_mlincomb(lambda, x.as_ref(), &coeffs, 0);
        assert!((a.as_ref() - b.as_ref()).norm_l2() < 1e-12);
        let d1 = structured.compute_mder(lambda, 1);
        let d2 = opaque.compute_mder(lambda, 1);
        assert!((d1.as_ref() - d2.as_ref()).norm_l2() < 1e-12);
    }

    #[test]
    fn projection_beyond_capacity_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let nep = sample_problem(&mut rng, 5);
        let (v, w) = bases(&mut rng, 5, 3);
        let mut pnep = ProjectedNep::new(&nep, 2);
        assert!(pnep.set_projection(w.active(), v.active()).is_err());
    }
}
