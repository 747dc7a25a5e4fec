//! Infinite Arnoldi with a Chebyshev basis.
//!
//! Same operator as [`super::iar`], but functions on [a, b] are represented by their coefficients
//! in the scaled Chebyshev polynomials T_j(ω(θ)), ω(θ) = αθ + β, α = 2/(b − a),
//! β = −(a + b)/(b − a). For delay problems the natural interval is [−τ_max, 0], on which the
//! Chebyshev basis is much better conditioned than monomials.
//!
//! Integration is carried out on the coefficients directly; the integration constant is first
//! chosen so that Ψ(0) = 0 and then corrected by the constant C from the nonlinear condition. For
//! problems composed only of constant, linear and exponential terms C has a closed form. Other
//! problems go through an explicit conversion to monomial coefficients.

use super::iar::{infinite_arnoldi, IarSettings};
use crate::error::NepError;
use crate::nep::{Nep, ScalarFunction};
use crate::results::SolveResult;
use crate::utils::axpy;
use faer::{c64, Mat, MatRef, Scale};

/// T_0(ω), ..., T_{count-1}(ω).
fn chebyshev_values(omega: c64, count: usize) -> Vec<c64> {
    let mut values = Vec::with_capacity(count);
    for j in 0..count {
        let t = match j {
            0 => c64::new(1.0, 0.0),
            1 => omega,
            _ => omega * values[j - 1] * 2.0 - values[j - 2],
        };
        values.push(t);
    }
    values
}

/// Σ_j coeffs[:, j] · weights[j].
fn combine(coeffs: MatRef<'_, c64>, weights: &[c64]) -> Mat<c64> {
    let mut out = Mat::zeros(coeffs.nrows(), 1);
    for (j, &w) in weights.iter().enumerate().take(coeffs.ncols()) {
        axpy(&mut out, w, coeffs.get(.., j..j + 1));
    }
    out
}

/// [−τ_max, 0] when the problem has exponential terms e^{−τλ} with τ > 0, [−1, 1] otherwise.
fn default_interval(nep: &dyn Nep) -> (f64, f64) {
    let tau_max = nep
        .terms()
        .into_iter()
        .flatten()
        .filter_map(|t| match t.function {
            ScalarFunction::Exp { rate } if rate.im == 0.0 && rate.re < 0.0 => Some(-rate.re),
            _ => None,
        })
        .fold(0.0, f64::max);
    if tau_max > 0.0 {
        (-tau_max, 0.0)
    } else {
        (-1.0, 1.0)
    }
}

/// M(σ + s) = K + sL + Σ_e E_e e^{r_e s}, with every term already shifted to σ.
struct ShiftedDelayStructure {
    linear: Mat<c64>,
    exponentials: Vec<(c64, Mat<c64>)>,
}

impl ShiftedDelayStructure {
    fn from_nep(nep: &dyn Nep, sigma: c64) -> Option<Self> {
        let terms = nep.terms()?;
        let n = nep.size();
        let mut linear = Mat::zeros(n, n);
        let mut exponentials = Vec::new();
        for term in terms {
            match term.function {
                ScalarFunction::Power(0) => {}
                ScalarFunction::Power(1) => axpy(&mut linear, c64::new(1.0, 0.0), term.matrix.as_ref()),
                ScalarFunction::Exp { rate } => {
                    let scaled = Mat::from_fn(n, n, |i, j| term.matrix[(i, j)] * (rate * sigma).exp());
                    exponentials.push((rate, scaled));
                }
                _ => return None,
            }
        }
        Some(Self { linear, exponentials })
    }
}

/// Infinite Arnoldi in a Chebyshev basis on `settings.interval`.
///
/// # Returns
/// Same contract as [`super::iar::iar`].
pub fn iar_chebyshev(nep: &dyn Nep, settings: &IarSettings) -> Result<SolveResult, NepError> {
    let (a, b) = settings.interval.unwrap_or_else(|| default_interval(nep));
    if !(b > a) {
        return Err(NepError::invalid(format!("interval [{a}, {b}] is empty")));
    }
    let n = nep.size();
    let sigma = settings.sigma;
    let tol = settings.tol;
    let alpha = 2.0 / (b - a);
    let beta = -(a + b) / (b - a);
    let half_width = (b - a) / 2.0;
    let structure = ShiftedDelayStructure::from_nep(nep, sigma);
    let solver = settings.linsolvercreator.create(nep, sigma)?;
    settings.logger.push_info(
        &format!(
            "IAR (Chebyshev) on [{a}, {b}], {} constant",
            if structure.is_some() { "closed-form" } else { "monomial" }
        ),
        2,
        false,
    );

    let expand = |x: MatRef<'_, c64>| -> Result<Mat<c64>, NepError> {
        let k1 = x.ncols();
        let mut c = Mat::<c64>::zeros(n, k1 + 1);
        for j in 0..k1 {
            let xj = x.get(.., j..j + 1);
            match j {
                0 => axpy_col(&mut c, 1, half_width, xj),
                1 => axpy_col(&mut c, 2, half_width / 4.0, xj),
                _ => {
                    axpy_col(&mut c, j + 1, half_width / (2.0 * (j + 1) as f64), xj);
                    axpy_col(&mut c, j - 1, -half_width / (2.0 * (j - 1) as f64), xj);
                }
            }
        }

        let at_zero = chebyshev_values(c64::new(beta, 0.0), k1 + 1);
        let psi0 = combine(c.as_ref().get(.., 1..k1 + 1), &at_zero[1..]);
        c.as_mut().get_mut(.., 0..1).copy_from(&(Scale(c64::new(-1.0, 0.0)) * &psi0));

        let rhs = match &structure {
            Some(s) => {
                // −L φ(0) − Σ_e E_e Ψ(r_e)
                let phi0 = combine(x, &at_zero[..k1]);
                let mut rhs = s.linear.as_ref() * phi0.as_ref();
                for (rate, e) in &s.exponentials {
                    let at_rate = chebyshev_values(*rate * alpha + beta, k1 + 1);
                    let psi = combine(c.as_ref(), &at_rate);
                    let prod = e.as_ref() * psi.as_ref();
                    axpy(&mut rhs, c64::new(1.0, 0.0), prod.as_ref());
                }
                rhs
            }
            None => {
                let monomial = to_monomial(c.as_ref(), alpha, beta);
                let ones = vec![c64::new(1.0, 0.0); k1];
                nep.compute_mlincomb(sigma, monomial.as_ref().get(.., 1..k1 + 1), &ones, 1)
            }
        };
        let constant = solver.solve(rhs.as_ref(), tol)?;
        let mut c0 = c.as_mut().get_mut(.., 0..1);
        c0 -= &constant;
        Ok(c)
    };

    let evaluate = |y: MatRef<'_, c64>| combine(y, &chebyshev_values(c64::new(beta, 0.0), y.ncols()));
    infinite_arnoldi(nep, settings, "IAR (Chebyshev)", expand, evaluate)
}

fn axpy_col(target: &mut Mat<c64>, col: usize, scale: f64, x: MatRef<'_, c64>) {
    let mut column = target.as_mut().get_mut(.., col..col + 1);
    column += Scale(c64::new(scale, 0.0)) * x;
}

/// Converts Chebyshev coefficients in ω = αθ + β to monomial coefficients in θ.
fn to_monomial(coeffs: MatRef<'_, c64>, alpha: f64, beta: f64) -> Mat<c64> {
    let m = coeffs.ncols();
    // polys[j][p]: coefficient of θ^p in T_j(αθ + β)
    let mut polys: Vec<Vec<f64>> = Vec::with_capacity(m);
    for j in 0..m {
        let mut p = vec![0.0; m];
        match j {
            0 => p[0] = 1.0,
            1 => {
                p[0] = beta;
                if m > 1 {
                    p[1] = alpha;
                }
            }
            _ => {
                for q in 0..m {
                    let shifted = if q > 0 { polys[j - 1][q - 1] } else { 0.0 };
                    p[q] = 2.0 * beta * polys[j - 1][q] + 2.0 * alpha * shifted - polys[j - 2][q];
                }
            }
        }
        polys.push(p);
    }
    let mut out = Mat::zeros(coeffs.nrows(), m);
    for (j, poly) in polys.iter().enumerate() {
        for (q, &weight) in poly.iter().enumerate() {
            if weight != 0.0 {
                axpy_col(&mut out, q, weight, coeffs.get(.., j..j + 1));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::iar::IarSettingsBuilder;
    use crate::algorithms::polyeig::polyeig;
    use crate::logger::NoLogger;
    use crate::nep::SpmfNep;
    use crate::utils::to_complex;
    use faer::mat;
    use std::sync::Arc;

    const OMEGA: f64 = 0.567_143_290_409_783_8;

    #[test]
    fn chebyshev_recurrence() {
        let t = chebyshev_values(c64::new(0.5, 0.0), 4);
        // T_2(x) = 2x² − 1, T_3(x) = 4x³ − 3x
        assert!((t[2] - c64::new(-0.5, 0.0)).norm() < 1e-15);
        assert!((t[3] - c64::new(-1.0, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn monomial_conversion_reproduces_values() {
        let coeffs = Mat::from_fn(1, 4, |_, j| c64::new(1.0 + j as f64, -0.5 * j as f64));
        let (alpha, beta) = (2.0, 1.0);
        let monomial = to_monomial(coeffs.as_ref(), alpha, beta);
        let theta = -0.3;
        let cheb = combine(coeffs.as_ref(), &chebyshev_values(c64::new(alpha * theta + beta, 0.0), 4));
        let powers: Vec<c64> = (0..4).map(|p| c64::new(f64::powi(theta, p), 0.0)).collect();
        let mono = combine(monomial.as_ref(), &powers);
        assert!((cheb[(0, 0)] - mono[(0, 0)]).norm() < 1e-13);
    }

    #[test]
    fn delay_interval_follows_largest_delay() {
        let one = Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0));
        let nep = SpmfNep::delay(vec![one.clone(), one], &[0.5, 2.0]).unwrap();
        assert_eq!(default_interval(&nep), (-2.0, 0.0));
    }

    #[test]
    fn scalar_delay_problem_converges_to_omega() {
        let nep = SpmfNep::delay(vec![Mat::from_fn(1, 1, |_, _| c64::new(1.0, 0.0))], &[1.0]).unwrap();
        let settings = IarSettingsBuilder::default()
            .neigs(1)
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        let pairs = iar_chebyshev(&nep, &settings).unwrap().into_result().unwrap();
        assert!((pairs.eigenvalues[0] - c64::new(OMEGA, 0.0)).norm() < 1e-10);
    }

    #[test]
    fn polynomial_problem_uses_monomial_constant() {
        let nep = SpmfNep::polynomial(vec![
            to_complex(mat![[1.0, 3.0], [5.0, 6.0]].as_ref()),
            to_complex(mat![[3.0, 4.0], [6.0, 6.0]].as_ref()),
            to_complex(mat![[1.0, 0.0], [0.0, 1.0]].as_ref()),
        ])
        .unwrap();
        let reference = polyeig(&nep).unwrap();
        let settings = IarSettingsBuilder::default().neigs(1).build().unwrap();
        let pairs = iar_chebyshev(&nep, &settings).unwrap().into_result().unwrap();
        let lambda = pairs.eigenvalues[0];
        let closest = reference
            .eigenvalues
            .iter()
            .map(|r| (r - lambda).norm())
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 1e-8);
    }
}
