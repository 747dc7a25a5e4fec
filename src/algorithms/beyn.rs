//! Beyn's contour-integral method.
//!
//! For a circle Γ = {σ + r e^{it}} and a random probe matrix V̂ (n×k), the moments
//!
//! A_p = (1/2πi) ∮_Γ z^p M(z)⁻¹ V̂ dz,   p = 0, 1,
//!
//! span the eigenvectors belonging to the eigenvalues inside Γ (as long as there are at most k of
//! them). With the thin SVD A_0 = V_0 Σ_0 W_0ᴴ, truncated to its numerical rank, the eigenvalues
//! inside Γ are those of the small matrix B = V_0ᴴ A_1 W_0 Σ_0⁻¹, and the eigenvectors of M are
//! V_0 times those of B.
//!
//! The moments are computed through [`integrate_interval`] over t ∈ [0, 2π) with the
//! weighting functions g_0(t) = r e^{it}/(2π) and g_1(t) = z(t) g_0(t).

use super::dense_eigen;
use crate::error::NepError;
use crate::errmeasure::ErrMeasure;
use crate::linsolve::{DefaultLinSolverCreator, LinSolverCreator};
use crate::logger::{default_logger, Logger};
use crate::nep::Nep;
use crate::quadrature::{integrate_interval, QuadRule, QuadratureRule, SampleFn, WeightFn};
use crate::results::{Eigenpairs, PartialSolution, SolveResult};
use crate::utils::{normalized, sort_by_distance};
use derive_builder::Builder;
use faer::{c64, Mat};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::f64::consts::PI;
use std::sync::Arc;

/// Settings for [`contour_beyn`].
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct BeynSettings {
    /// Center of the circular contour.
    #[builder(default = "c64::new(0.0, 0.0)")]
    pub sigma: c64,

    #[builder(default = "1.0")]
    pub radius: f64,

    /// Number of probe columns, an upper bound on the eigenvalues that can be found.
    #[builder(default = "3")]
    pub neigs: usize,

    /// Number of quadrature points.
    #[builder(default = "1000")]
    pub n_quad: usize,

    /// Singular values below `rank_drop_tol · σ_max` are discarded.
    #[builder(default = "1e-10")]
    pub rank_drop_tol: f64,

    /// Drop pairs outside the contour or with error ≥ `tol`.
    #[builder(default = "true")]
    pub sanity_check: bool,

    #[builder(default = "1e-8")]
    pub tol: f64,

    #[builder(default = "Arc::new(QuadRule::Trapezoidal)")]
    pub quadrature: Arc<dyn QuadratureRule>,

    #[builder(default)]
    pub errmeasure: ErrMeasure,

    #[builder(default = "Arc::new(DefaultLinSolverCreator)")]
    pub linsolvercreator: Arc<dyn LinSolverCreator>,

    /// Seed of the random probe matrix.
    #[builder(default = "42")]
    pub seed: u64,

    #[builder(default = "default_logger()")]
    pub logger: Arc<dyn Logger>,
}

impl BeynSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(radius) = self.radius {
            if !(radius > 0.0) {
                return Err(format!("radius must be positive, got {radius}"));
            }
        }
        if self.neigs == Some(0) {
            return Err("neigs must be at least 1".to_string());
        }
        if self.n_quad == Some(0) {
            return Err("n_quad must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Computes the eigenvalues of `nep` inside the circle of `settings.radius` around
/// `settings.sigma`.
///
/// # Returns
/// The eigenpairs sorted by distance to σ, as [`SolveResult::Converged`]. With `sanity_check`
/// enabled, a run keeping fewer than `neigs` pairs is reported as [`SolveResult::Partial`] with
/// the kept pairs as converged and the discarded ones as candidates.
pub fn contour_beyn(nep: &dyn Nep, settings: &BeynSettings) -> Result<SolveResult, NepError> {
    let n = nep.size();
    let k = settings.neigs.min(n);
    if k == 0 {
        return Err(NepError::invalid("contour_beyn needs neigs ≥ 1 and a nonempty problem"));
    }
    if !(settings.radius > 0.0) {
        return Err(NepError::invalid(format!(
            "radius must be positive, got {}",
            settings.radius
        )));
    }
    let (sigma, radius) = (settings.sigma, settings.radius);

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let probes = Mat::from_fn(n, k, |_, _| c64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5));

    let contour = |t: f64| sigma + c64::new(0.0, t).exp() * radius;
    let creator = settings.linsolvercreator.as_ref();
    let tol = settings.tol;
    let sample = |t: f64| -> Result<Mat<c64>, NepError> {
        let solver = creator.create(nep, contour(t))?;
        solver.solve(probes.as_ref(), tol)
    };
    let g0 = |t: f64| c64::new(0.0, t).exp() * (radius / (2.0 * PI));
    let g1 = |t: f64| contour(t) * c64::new(0.0, t).exp() * (radius / (2.0 * PI));
    let f: &SampleFn = &sample;
    let weights: [&WeightFn; 2] = [&g0, &g1];

    settings.logger.push_info(
        &format!("Beyn: {} quadrature points, {k} probes, radius {radius}", settings.n_quad),
        1,
        false,
    );
    let moments = integrate_interval(
        settings.quadrature.as_ref(),
        f,
        &weights,
        0.0,
        2.0 * PI,
        settings.n_quad,
        settings.logger.as_ref(),
    )?;
    let (a0, a1) = (&moments[0], &moments[1]);

    let svd = a0.thin_svd()?;
    let singular: Vec<f64> = svd.S().column_vector().iter().map(|s| s.re).collect();
    let largest = singular.iter().copied().fold(0.0, f64::max);
    let kept: Vec<usize> = (0..singular.len())
        .filter(|&i| largest > 0.0 && singular[i] > settings.rank_drop_tol * largest)
        .collect();
    let rank = kept.len();
    settings
        .logger
        .push_info(&format!("Beyn: numerical rank {rank} of {k}"), 1, false);
    if rank == k {
        settings.logger.push_warning(&format!(
            "Beyn: rank equals the number of probes ({k}); there may be more eigenvalues inside the contour"
        ));
    }
    if rank == 0 {
        return Ok(finish(n, settings, Eigenpairs::empty(n), Eigenpairs::empty(n), f64::INFINITY));
    }

    let (u, v) = (svd.U(), svd.V());
    let v0 = Mat::from_fn(n, rank, |i, j| u[(i, kept[j])]);
    let w0 = Mat::from_fn(v.nrows(), rank, |i, j| v[(i, kept[j])] / singular[kept[j]]);
    let a1w = a1.as_ref() * w0.as_ref();
    let b = v0.as_ref().adjoint() * a1w.as_ref();
    let (values, small_vectors) = dense_eigen(b.as_ref())?;
    let lifted = v0.as_ref() * small_vectors.as_ref();

    let mut accepted = Eigenpairs::empty(n);
    let mut rejected = Eigenpairs::empty(n);
    let mut worst = 0.0f64;
    for idx in sort_by_distance(&values, sigma) {
        let lambda = values[idx];
        let vector = normalized(lifted.as_ref().get(.., idx..idx + 1));
        let err = settings.errmeasure.measure(nep, lambda, vector.as_ref());
        let inside = (lambda - sigma).norm() < radius;
        if settings.sanity_check && (!inside || err >= settings.tol) {
            settings
                .logger
                .push_info(&format!("Beyn: discarding λ = {lambda} (err = {err:.3e}, inside = {inside})"), 2, false);
            rejected.push(lambda, vector.as_ref());
            worst = worst.max(err);
        } else {
            accepted.push(lambda, vector.as_ref());
        }
    }
    Ok(finish(n, settings, accepted, rejected, worst))
}

fn finish(n: usize, settings: &BeynSettings, accepted: Eigenpairs, rejected: Eigenpairs, worst: f64) -> SolveResult {
    if !settings.sanity_check || accepted.len() >= settings.neigs.min(n) {
        return SolveResult::Converged(accepted);
    }
    let message = format!(
        "Beyn kept {} of {} requested eigenpairs inside the contour",
        accepted.len(),
        settings.neigs
    );
    SolveResult::Partial(PartialSolution {
        converged: accepted,
        candidates: rejected,
        last_error: worst,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoLogger;
    use crate::nep::SpmfNep;
    use crate::utils::identity;

    /// diag(d) − λI.
    fn diagonal_problem(d: &[c64]) -> SpmfNep {
        let n = d.len();
        let a = Mat::from_fn(n, n, |i, j| if i == j { d[i] } else { c64::new(0.0, 0.0) });
        let id = identity(n);
        let minus_identity = Mat::from_fn(n, n, |i, j| -id[(i, j)]);
        SpmfNep::polynomial(vec![a, minus_identity]).unwrap()
    }

    fn spectrum() -> Vec<c64> {
        vec![
            c64::new(0.1, 0.0),
            c64::new(0.5, 0.2),
            c64::new(3.0, 0.0),
            c64::new(-4.0, 0.0),
            c64::new(0.0, 0.9),
        ]
    }

    #[test]
    fn recovers_eigenvalues_inside_the_circle() {
        let nep = diagonal_problem(&spectrum());
        let settings = BeynSettingsBuilder::default()
            .radius(1.5)
            .neigs(3)
            .n_quad(200)
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        let pairs = contour_beyn(&nep, &settings).unwrap().into_result().unwrap();
        let expected = [c64::new(0.1, 0.0), c64::new(0.5, 0.2), c64::new(0.0, 0.9)];
        assert_eq!(pairs.len(), 3);
        for (got, want) in pairs.eigenvalues.iter().zip(expected) {
            assert!((got - want).norm() < 1e-10, "{got} vs {want}");
        }
    }

    #[test]
    fn extra_probes_are_truncated_by_rank() {
        let nep = diagonal_problem(&spectrum());
        let settings = BeynSettingsBuilder::default()
            .radius(1.5)
            .neigs(4)
            .n_quad(200)
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        match contour_beyn(&nep, &settings).unwrap() {
            SolveResult::Partial(partial) => assert_eq!(partial.converged.len(), 3),
            SolveResult::Converged(_) => panic!("only three eigenvalues lie inside the contour"),
        }

        let unchecked = BeynSettingsBuilder::default()
            .radius(1.5)
            .neigs(4)
            .n_quad(200)
            .sanity_check(false)
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        let pairs = contour_beyn(&nep, &unchecked).unwrap().into_result().unwrap();
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn gauss_legendre_rule_can_be_plugged_in() {
        let nep = diagonal_problem(&spectrum());
        let settings = BeynSettingsBuilder::default()
            .radius(1.5)
            .neigs(3)
            .n_quad(400)
            .quadrature(Arc::new(QuadRule::GaussLegendre))
            .tol(1e-6)
            .logger(Arc::new(NoLogger))
            .build()
            .unwrap();
        let pairs = contour_beyn(&nep, &settings).unwrap().into_result().unwrap();
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn invalid_radius_is_rejected() {
        assert!(BeynSettingsBuilder::default().radius(0.0).build().is_err());
    }
}
