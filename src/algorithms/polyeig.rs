//! Polynomial eigenvalue problems through companion linearization.
//!
//! For P(λ) = Σ_{k=0}^{d} A_k λ^k with an invertible leading coefficient, the eigenpairs of P are
//! those of the nd×nd block companion matrix
//!
//! ```text
//!     [ 0     I                 ]
//! C = [             ...         ]
//!     [                   I     ]
//!     [ -K_0  -K_1  ...  -K_{d-1} ],   K_j = A_d⁻¹ A_j,
//! ```
//!
//! acting on y = [v; λv; ...; λ^{d-1}v]. When A_d is singular or badly conditioned the problem is
//! first rewritten in the variable μ = 1/(λ − s): the reversed polynomial μ^d P(s + 1/μ) has
//! leading coefficient P(s), which is well conditioned for a generic shift s. Eigenvalues at
//! μ ≈ 0 correspond to infinite eigenvalues of P and are dropped.

use super::dense_eigen;
use crate::error::NepError;
use crate::nep::{polynomial_coefficients, Nep};
use crate::results::Eigenpairs;
use crate::utils::{axpy, identity, is_finite, normalized};
use faer::{c64, prelude::*, Mat, MatRef};

/// Condition number estimate above which a leading coefficient is not inverted.
const CONDITION_LIMIT: f64 = 1e12;

/// Shifts tried, in order, for the reversed problem.
const REVERSAL_SHIFTS: [(f64, f64); 4] = [
    (0.0, 0.0),
    (0.4286, 0.8123),
    (-0.7361, 0.3319),
    (1.9271, -0.6113),
];

/// Computes all finite eigenpairs of a polynomial problem.
///
/// # Errors
/// * `InvalidConfiguration` if `nep` is not polynomial or has degree zero.
/// * `NumericalBreakdown` if neither the leading coefficient nor any reversal shift gives a
///   well-conditioned linearization.
pub fn polyeig(nep: &dyn Nep) -> Result<Eigenpairs, NepError> {
    let mut coeffs = polynomial_coefficients(nep)
        .ok_or_else(|| NepError::invalid("polyeig requires a polynomial problem"))?;
    while coeffs.len() > 1 && coeffs.last().is_some_and(|a| a.norm_l2() == 0.0) {
        coeffs.pop();
    }
    let n = nep.size();
    let degree = coeffs.len() - 1;
    if degree == 0 {
        return Err(NepError::invalid("polyeig requires a polynomial of degree at least one"));
    }

    if let Some(lead_inv) = well_conditioned_inverse(&coeffs[degree]) {
        let (values, vectors) = companion_eigen(&coeffs, lead_inv.as_ref())?;
        return Ok(extract(n, degree, &values, vectors.as_ref(), Some));
    }

    for (re, im) in REVERSAL_SHIFTS {
        let shift = c64::new(re, im);
        let reversed = shifted_reversal(&coeffs, shift);
        let Some(lead_inv) = well_conditioned_inverse(&reversed[degree]) else {
            continue;
        };
        let (values, vectors) = companion_eigen(&reversed, lead_inv.as_ref())?;
        let largest = values.iter().map(|mu| mu.norm()).fold(0.0, f64::max);
        let threshold = 100.0 * f64::EPSILON * largest;
        return Ok(extract(n, degree, &values, vectors.as_ref(), |mu: c64| {
            (mu.norm() > threshold).then(|| shift + mu.inv())
        }));
    }

    Err(NepError::breakdown(
        "no well-conditioned companion linearization found for the polynomial problem",
    ))
}

/// A⁻¹ when ‖A‖_F‖A⁻¹‖_F stays below [`CONDITION_LIMIT`].
fn well_conditioned_inverse(a: &Mat<c64>) -> Option<Mat<c64>> {
    let n = a.nrows();
    let inv = a.partial_piv_lu().solve(identity(n).as_ref());
    if !is_finite(inv.as_ref()) {
        return None;
    }
    let cond = a.norm_l2() * inv.norm_l2();
    (cond < CONDITION_LIMIT).then_some(inv)
}

fn companion_eigen(coeffs: &[Mat<c64>], lead_inv: MatRef<'_, c64>) -> Result<(Vec<c64>, Mat<c64>), NepError> {
    let n = lead_inv.nrows();
    let d = coeffs.len() - 1;
    let blocks: Vec<Mat<c64>> = coeffs[..d].iter().map(|a| lead_inv * a.as_ref()).collect();
    let zero = c64::new(0.0, 0.0);
    let companion = Mat::from_fn(n * d, n * d, |i, j| {
        let (bi, bj) = (i / n, j / n);
        if bi + 1 < d {
            if bj == bi + 1 && i % n == j % n {
                c64::new(1.0, 0.0)
            } else {
                zero
            }
        } else {
            -blocks[bj][(i % n, j % n)]
        }
    });
    dense_eigen(companion.as_ref())
}

/// Coefficients of μ^d P(s + 1/μ) = Σ_i A_i (sμ + 1)^i μ^{d-i}.
fn shifted_reversal(coeffs: &[Mat<c64>], shift: c64) -> Vec<Mat<c64>> {
    let n = coeffs[0].nrows();
    let d = coeffs.len() - 1;
    let mut out = vec![Mat::zeros(n, n); d + 1];
    for (i, a) in coeffs.iter().enumerate() {
        let mut binom = 1.0;
        for m in 0..=i {
            axpy(&mut out[m + d - i], shift.powu(m as u32) * binom, a.as_ref());
            binom = binom * (i - m) as f64 / (m + 1) as f64;
        }
    }
    out
}

/// Maps companion eigenpairs back to eigenpairs of P. The eigenvector is read from the block of
/// y with the largest norm.
fn extract(
    n: usize,
    degree: usize,
    values: &[c64],
    vectors: MatRef<'_, c64>,
    transform: impl Fn(c64) -> Option<c64>,
) -> Eigenpairs {
    let mut pairs = Eigenpairs::empty(n);
    for (idx, &value) in values.iter().enumerate() {
        let Some(lambda) = transform(value) else {
            continue;
        };
        let y = vectors.get(.., idx..idx + 1);
        let best = (0..degree)
            .max_by(|&a, &b| {
                y.get(a * n..(a + 1) * n, ..)
                    .norm_l2()
                    .total_cmp(&y.get(b * n..(b + 1) * n, ..).norm_l2())
            })
            .unwrap_or(0);
        let v = normalized(y.get(best * n..(best + 1) * n, ..));
        pairs.push(lambda, v.as_ref());
    }
    pairs
}
