//! Small dense helpers shared by the solvers.
//!
//! These operate on n×1 `Mat<c64>` columns, the representation every solver in the crate uses
//! for vectors.

use faer::{c64, Mat, MatRef, Scale};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// `y += alpha * x`, elementwise over matching shapes.
pub fn axpy(y: &mut Mat<c64>, alpha: c64, x: MatRef<'_, c64>) {
    *y += Scale(alpha) * x;
}

/// Hermitian inner product `aᴴb` of two columns.
pub fn dot(a: MatRef<'_, c64>, b: MatRef<'_, c64>) -> c64 {
    (a.adjoint() * b)[(0, 0)]
}

/// Returns `x / ‖x‖₂`, or `x` unchanged when it is zero.
pub fn normalized(x: MatRef<'_, c64>) -> Mat<c64> {
    let norm = x.norm_l2();
    if norm == 0.0 {
        return x.to_owned();
    }
    Scale(c64::new(norm.recip(), 0.0)) * x
}

/// Converts a real matrix into a complex one.
pub fn to_complex(m: MatRef<'_, f64>) -> Mat<c64> {
    Mat::from_fn(m.nrows(), m.ncols(), |i, j| c64::new(m[(i, j)], 0.0))
}

/// The n×n complex identity.
pub fn identity(n: usize) -> Mat<c64> {
    Mat::identity(n, n)
}

/// A reproducible real random column with entries in [-0.5, 0.5).
pub fn random_vector(n: usize, seed: u64) -> Mat<c64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Mat::from_fn(n, 1, |_, _| c64::new(rng.random::<f64>() - 0.5, 0.0))
}

/// `true` when every entry is finite.
pub fn is_finite(m: MatRef<'_, c64>) -> bool {
    (0..m.ncols()).all(|j| (0..m.nrows()).all(|i| m[(i, j)].re.is_finite() && m[(i, j)].im.is_finite()))
}

/// Indices of `values` ordered by distance to `target`.
///
/// The sort is stable, so equally distant values keep their original order.
pub fn sort_by_distance(values: &[c64], target: c64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        (values[a] - target)
            .norm()
            .total_cmp(&(values[b] - target).norm())
    });
    order
}
