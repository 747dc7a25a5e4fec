//! NLEIGS: rational Krylov on a Leja–Bagby interpolant.
//!
//! M(λ) is replaced on a target region Σ by the rational interpolant
//!
//! Q_N(λ) = Σ_{j=0}^{N} b_j(λ) D_j,   b_0 = 1,   b_{j+1}(λ) = b_j(λ)(λ − σ_j) / (β_{j+1}(1 − λ/ξ_{j+1})),
//!
//! with nodes σ_j on the boundary of Σ, poles ξ_j outside it (all infinite for polynomial
//! interpolation) and the scalings β_j chosen so that max_Σ |b_j| = 1. The matrices D_j are
//! divided differences of M at the nodes. The degree N is increased until the divided
//! differences have decayed below tolerance.
//!
//! Q_N(λ)x = 0 is equivalent to the linear pencil (A − λB)y = 0 of size nN with
//! y = [b_0(λ)x; ...; b_{N−1}(λ)x]. Its eigenvalues near a shift s are computed by Arnoldi on
//! (A − sB)⁻¹B, and the first block of a Ritz vector is the eigenvector approximation.

use super::dense_eigen;
use super::orthogonalization::{OrthMethod, SubspaceBasis};
use crate::error::NepError;
use crate::errmeasure::ErrMeasure;
use crate::logger::{default_logger, Logger};
use crate::nep::Nep;
use crate::results::{Eigenpairs, PartialSolution, SolveResult};
use crate::utils::{axpy, is_finite, normalized, random_vector, sort_by_distance};
use derive_builder::Builder;
use faer::{c64, prelude::*, Mat, MatRef, Scale};
use std::sync::Arc;

/// The target region Σ.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// The segment between two points of the complex plane.
    Interval(c64, c64),
    /// A polygon given by its vertices in order.
    Polygon(Vec<c64>),
}

impl Region {
    /// Two points give an interval, three or more a polygon.
    pub fn from_points(points: &[c64]) -> Result<Self, NepError> {
        match points.len() {
            2 => Ok(Region::Interval(points[0], points[1])),
            k if k >= 3 => Ok(Region::Polygon(points.to_vec())),
            k => Err(NepError::invalid(format!(
                "a region needs two points (interval) or at least three (polygon), got {k}"
            ))),
        }
    }

    /// Mean of the defining points.
    pub fn centroid(&self) -> c64 {
        let points = self.points();
        points.iter().fold(c64::new(0.0, 0.0), |acc, &p| acc + p) / points.len() as f64
    }

    /// Whether `z` lies in Σ. The boundary counts as inside, up to a relative tolerance.
    pub fn contains(&self, z: c64) -> bool {
        let slack = f64::EPSILON.sqrt() * self.diameter();
        match self {
            Region::Interval(a, b) => segment_distance(z, *a, *b) <= slack,
            Region::Polygon(vertices) => {
                let m = vertices.len();
                let mut inside = false;
                for i in 0..m {
                    let (p, q) = (vertices[i], vertices[(i + 1) % m]);
                    if segment_distance(z, p, q) <= slack {
                        return true;
                    }
                    if (p.im > z.im) != (q.im > z.im) {
                        let crossing = p.re + (z.im - p.im) / (q.im - p.im) * (q.re - p.re);
                        if z.re < crossing {
                            inside = !inside;
                        }
                    }
                }
                inside
            }
        }
    }

    /// About `npoints` points on the interval or along the polygon edges.
    pub fn discretize(&self, npoints: usize) -> Vec<c64> {
        match self {
            Region::Interval(a, b) => linspace(*a, *b, npoints.max(2), true),
            Region::Polygon(vertices) => {
                let m = vertices.len();
                let perimeter: f64 = (0..m).map(|i| (vertices[(i + 1) % m] - vertices[i]).norm()).sum();
                let mut points = Vec::with_capacity(npoints + m);
                for i in 0..m {
                    let (p, q) = (vertices[i], vertices[(i + 1) % m]);
                    let share = if perimeter > 0.0 { (q - p).norm() / perimeter } else { 1.0 / m as f64 };
                    let count = ((npoints as f64 * share).round() as usize).max(2);
                    points.extend(linspace(p, q, count, false));
                }
                points
            }
        }
    }

    fn points(&self) -> Vec<c64> {
        match self {
            Region::Interval(a, b) => vec![*a, *b],
            Region::Polygon(vertices) => vertices.clone(),
        }
    }

    fn diameter(&self) -> f64 {
        let points = self.points();
        let mut d = 0.0f64;
        for (i, &p) in points.iter().enumerate() {
            for &q in &points[i + 1..] {
                d = d.max((p - q).norm());
            }
        }
        d
    }
}

fn linspace(a: c64, b: c64, count: usize, inclusive: bool) -> Vec<c64> {
    let steps = if inclusive { count.saturating_sub(1).max(1) } else { count };
    (0..count).map(|i| a + (b - a) * (i as f64 / steps as f64)).collect()
}

fn segment_distance(z: c64, a: c64, b: c64) -> f64 {
    let d = b - a;
    let len2 = d.norm_sqr();
    if len2 == 0.0 {
        return (z - a).norm();
    }
    let t = ((z - a) * d.conj()).re / len2;
    (z - (a + d * t.clamp(0.0, 1.0))).norm()
}

/// Settings for [`nleigs`].
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct NleigsSettings {
    /// Largest interpolation degree.
    #[builder(default = "100")]
    pub maxdgr: usize,

    /// Maximum number of Arnoldi steps.
    #[builder(default = "100")]
    pub maxit: usize,

    #[builder(default = "1e-10")]
    pub tol: f64,

    /// Ritz pairs are checked every `blksize` steps.
    #[builder(default = "20")]
    pub blksize: usize,

    /// Stop after this many eigenvalues in Σ. When absent, stop once every Ritz value in Σ
    /// has converged.
    #[builder(default, setter(strip_option))]
    pub neigs: Option<usize>,

    /// Number of points used to discretize Σ.
    #[builder(default = "1000")]
    pub npoints: usize,

    /// Candidate poles. Empty means polynomial interpolation.
    #[builder(default)]
    pub poles: Vec<c64>,

    /// Shift of the Arnoldi operator. Defaults to the centroid of Σ.
    #[builder(default, setter(strip_option))]
    pub shift: Option<c64>,

    #[builder(default)]
    pub errmeasure: ErrMeasure,

    #[builder(default)]
    pub orthmethod: OrthMethod,

    #[builder(default = "default_logger()")]
    pub logger: Arc<dyn Logger>,
}

impl NleigsSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("maxdgr", self.maxdgr),
            ("maxit", self.maxit),
            ("blksize", self.blksize),
        ] {
            if value == Some(0) {
                return Err(format!("{name} must be at least 1"));
            }
        }
        if let Some(Some(0)) = self.neigs {
            return Err("neigs must be at least 1".to_string());
        }
        if let Some(npoints) = self.npoints {
            if npoints < 2 {
                return Err(format!("npoints must be at least 2, got {npoints}"));
            }
        }
        if let Some(tol) = self.tol {
            if !(tol > 0.0) {
                return Err(format!("tol must be positive, got {tol}"));
            }
        }
        Ok(())
    }
}

impl Default for NleigsSettings {
    fn default() -> Self {
        Self {
            maxdgr: 100,
            maxit: 100,
            tol: 1e-10,
            blksize: 20,
            neigs: None,
            npoints: 1000,
            poles: Vec::new(),
            shift: None,
            errmeasure: ErrMeasure::default(),
            orthmethod: OrthMethod::default(),
            logger: default_logger(),
        }
    }
}

/// Outcome of [`nleigs`].
#[derive(Debug, Clone)]
pub struct NleigsSolution {
    /// Eigenpairs in Σ, nearest to the shift first.
    pub result: SolveResult,
    /// Whether the divided differences decayed below tolerance before `maxdgr`.
    pub linearization_converged: bool,
    /// Degree N of the interpolant actually used.
    pub degree: usize,
    /// Arnoldi steps taken.
    pub iterations: usize,
}

/// Seed of the Arnoldi start vector.
const START_SEED: u64 = 0x4E4C;

/// Leja–Bagby nodes, poles and scalings. Index 0 holds σ_0, an unused pole and β_0 = 1.
#[derive(Debug, Clone)]
struct LejaBagby {
    nodes: Vec<c64>,
    poles: Vec<Option<c64>>,
    scalings: Vec<f64>,
}

impl LejaBagby {
    fn new(region_points: &[c64], candidate_poles: &[c64], count: usize) -> Result<Self, NepError> {
        let one = c64::new(1.0, 0.0);
        let mut nodes = vec![region_points[0]];
        let mut poles = vec![None];
        let mut scalings = vec![1.0];
        let mut sz = vec![one; region_points.len()];
        let mut sx = vec![one; candidate_poles.len()];

        for _ in 1..count {
            let prev = nodes[nodes.len() - 1];
            for (s, &z) in sz.iter_mut().zip(region_points) {
                *s *= z - prev;
            }
            for (s, &x) in sx.iter_mut().zip(candidate_poles) {
                *s *= x - prev;
            }
            let pole = sx
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
                .map(|(i, _)| candidate_poles[i]);
            if let Some(xi) = pole {
                for (s, &z) in sz.iter_mut().zip(region_points) {
                    *s /= pole_factor(z, Some(xi));
                }
                for (s, &x) in sx.iter_mut().zip(candidate_poles) {
                    let factor = pole_factor(x, Some(xi));
                    *s = if factor.norm() == 0.0 {
                        c64::new(f64::INFINITY, 0.0)
                    } else {
                        *s / factor
                    };
                }
            }
            let (imax, beta) = sz
                .iter()
                .enumerate()
                .map(|(i, s)| (i, s.norm()))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((0, 0.0));
            if !(beta > 0.0) || !beta.is_finite() {
                return Err(NepError::invalid(format!(
                    "the discretization of the region ({} points) is too coarse for degree {}",
                    region_points.len(),
                    nodes.len()
                )));
            }
            for s in sz.iter_mut().chain(sx.iter_mut()) {
                *s /= beta;
            }
            nodes.push(region_points[imax]);
            poles.push(pole);
            scalings.push(beta);
        }
        Ok(Self { nodes, poles, scalings })
    }

    /// b_0(z), ..., b_{count−1}(z).
    fn basis_values(&self, z: c64, count: usize) -> Vec<c64> {
        let mut b = Vec::with_capacity(count);
        b.push(c64::new(1.0, 0.0));
        for j in 1..count {
            let next = b[j - 1] * (z - self.nodes[j - 1]) / (pole_factor(z, self.poles[j]) * self.scalings[j]);
            b.push(next);
        }
        b
    }
}

/// 1 − z/ξ, or 1 for a pole at infinity.
fn pole_factor(z: c64, xi: Option<c64>) -> c64 {
    match xi {
        Some(x) => c64::new(1.0, 0.0) - z / x,
        None => c64::new(1.0, 0.0),
    }
}

/// Divided differences D_0, ..., D_N of the interpolant.
#[derive(Debug)]
struct Interpolant {
    points: LejaBagby,
    differences: Vec<Mat<c64>>,
    degree: usize,
    converged: bool,
}

/// Consecutive negligible divided differences required before a degree is accepted.
///
/// A single small difference is not enough: on symmetric node sets, differences of even or odd
/// order can nearly vanish long before the interpolant has converged.
const CONFIRMATION_WINDOW: usize = 4;

fn interpolate(nep: &dyn Nep, region: &Region, settings: &NleigsSettings) -> Result<Interpolant, NepError> {
    let points = LejaBagby::new(
        &region.discretize(settings.npoints),
        &settings.poles,
        settings.maxdgr + 1,
    )?;
    let tol_lin = (settings.tol / 10.0).max(100.0 * f64::EPSILON);
    let mut differences: Vec<Mat<c64>> = Vec::with_capacity(settings.maxdgr + 1);
    let mut largest = 0.0f64;
    let mut negligible = 0;

    for k in 0..=settings.maxdgr {
        let node = points.nodes[k];
        let b = points.basis_values(node, k + 1);
        let mut d = nep.compute_mm(node);
        for (j, dj) in differences.iter().enumerate() {
            axpy(&mut d, -b[j], dj.as_ref());
        }
        let d = Scale(c64::new(1.0, 0.0) / b[k]) * &d;
        let norm = d.norm_l2();
        largest = largest.max(norm);
        settings
            .logger
            .push_info(&format!("NLEIGS divided difference {k}: ‖D‖ = {norm:.3e}"), 2, false);
        differences.push(d);
        negligible = if k >= 1 && norm <= tol_lin * largest { negligible + 1 } else { 0 };
        if negligible == CONFIRMATION_WINDOW {
            let degree = (k - CONFIRMATION_WINDOW).max(1);
            differences.truncate(degree + 1);
            return Ok(Interpolant { points, differences, degree, converged: true });
        }
    }

    settings.logger.push_warning(&format!(
        "Linearization not converged after maxdgr = {} divided differences",
        settings.maxdgr
    ));
    Ok(Interpolant {
        points,
        degree: settings.maxdgr,
        differences,
        converged: false,
    })
}

/// The pencil (A, B) of size nN.
fn linearize(interpolant: &Interpolant, n: usize) -> (Mat<c64>, Mat<c64>) {
    let big_n = interpolant.degree;
    let dim = n * big_n;
    let lb = &interpolant.points;
    let d = &interpolant.differences;
    let mut a = Mat::<c64>::zeros(dim, dim);
    let mut b = Mat::<c64>::zeros(dim, dim);
    // First block row: β_N(1 − λ/ξ_N) Σ_{j<N} D_j y_j + (λ − σ_{N−1}) D_N y_{N−1} = 0.
    let beta_n = c64::new(lb.scalings[big_n], 0.0);
    let b_scale = match lb.poles[big_n] {
        Some(xi) => beta_n / xi,
        None => c64::new(0.0, 0.0),
    };
    for (j, dj) in d.iter().enumerate().take(big_n) {
        add_block(&mut a, n, 0, j, beta_n, Some(dj.as_ref()));
        if b_scale != c64::new(0.0, 0.0) {
            add_block(&mut b, n, 0, j, b_scale, Some(dj.as_ref()));
        }
    }
    let sigma_last = lb.nodes[big_n - 1];
    add_block(&mut a, n, 0, big_n - 1, -sigma_last, Some(d[big_n].as_ref()));
    add_block(&mut b, n, 0, big_n - 1, c64::new(-1.0, 0.0), Some(d[big_n].as_ref()));

    // (λ − σ_j) y_j − β_{j+1}(1 − λ/ξ_{j+1}) y_{j+1} = 0.
    for j in 0..big_n - 1 {
        let row = j + 1;
        let beta = c64::new(lb.scalings[j + 1], 0.0);
        add_block(&mut a, n, row, j, -lb.nodes[j], None);
        add_block(&mut a, n, row, j + 1, -beta, None);
        add_block(&mut b, n, row, j, c64::new(-1.0, 0.0), None);
        if let Some(xi) = lb.poles[j + 1] {
            add_block(&mut b, n, row, j + 1, -beta / xi, None);
        }
    }
    (a, b)
}

/// Adds `scale · block` (or `scale · I` when `block` is `None`) to block (row, col) of `m`.
fn add_block(m: &mut Mat<c64>, n: usize, row: usize, col: usize, scale: c64, block: Option<MatRef<'_, c64>>) {
    let mut target = m.as_mut().submatrix_mut(row * n, col * n, n, n);
    match block {
        Some(blk) => target += Scale(scale) * blk,
        None => {
            for i in 0..n {
                target[(i, i)] += scale;
            }
        }
    }
}

struct RitzPair {
    lambda: c64,
    vector: Mat<c64>,
    err: f64,
    inside: bool,
}

/// Computes eigenvalues of `nep` inside `region`.
///
/// # Arguments
/// * `nep`: The problem; only evaluations M(λ) on the discretized region are needed.
/// * `region`: The target region Σ.
/// * `settings`: Interpolation and Arnoldi parameters.
///
/// # Returns
/// An [`NleigsSolution`] whose `result` is [`SolveResult::Converged`] when the stopping rule was
/// met and [`SolveResult::Partial`] otherwise, with the unconverged Ritz pairs in Σ as candidates.
pub fn nleigs(nep: &dyn Nep, region: &Region, settings: &NleigsSettings) -> Result<NleigsSolution, NepError> {
    let n = nep.size();
    if n == 0 || settings.maxdgr == 0 || settings.maxit == 0 || settings.blksize == 0 {
        return Err(NepError::invalid("nleigs needs n, maxdgr, maxit and blksize positive"));
    }
    if settings.neigs == Some(0) {
        return Err(NepError::invalid("neigs must be at least 1"));
    }
    if let Region::Polygon(vertices) = region {
        if vertices.len() < 3 {
            return Err(NepError::invalid("a polygon needs at least three vertices"));
        }
    }
    let logger = settings.logger.as_ref();
    let interpolant = interpolate(nep, region, settings)?;
    let degree = interpolant.degree;
    logger.push_info(
        &format!(
            "NLEIGS interpolant of degree {degree} ({})",
            if interpolant.converged { "converged" } else { "not converged" }
        ),
        1,
        false,
    );

    let (a, b) = linearize(&interpolant, n);
    let shift = settings.shift.unwrap_or_else(|| region.centroid());
    let shifted = Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] - b[(i, j)] * shift);
    let lu = shifted.partial_piv_lu();

    let dim = n * degree;
    let steps = settings.maxit.min(dim);
    let mut basis = SubspaceBasis::with_capacity(dim, steps + 1);
    basis.push(random_vector(dim, START_SEED).as_ref(), settings.orthmethod)?;
    let mut h = Mat::<c64>::zeros(steps + 1, steps);

    for k in 0..steps {
        let bv = b.as_ref() * basis.column(k);
        let w = lu.solve(bv.as_ref());
        if !is_finite(w.as_ref()) {
            return Err(NepError::breakdown(format!(
                "the shifted pencil is singular at s = {shift}"
            )));
        }
        let (hcol, invariant) = match basis.push(w.as_ref(), settings.orthmethod) {
            Ok(hcol) => (hcol, false),
            Err(err) if err.is_breakdown() => {
                let coeffs = basis.active().adjoint() * w.as_ref();
                let mut hcol: Vec<c64> = (0..coeffs.nrows()).map(|i| coeffs[(i, 0)]).collect();
                hcol.push(c64::new(0.0, 0.0));
                (hcol, true)
            }
            Err(err) => return Err(err),
        };
        for (i, &value) in hcol.iter().enumerate() {
            h[(i, k)] = value;
        }

        let last = invariant || k + 1 == steps;
        if (k + 1) % settings.blksize != 0 && !last {
            continue;
        }
        let ritz = ritz_pairs(nep, region, settings, shift, &basis, h.as_ref(), k + 1)?;
        let in_region: Vec<&RitzPair> = ritz.iter().filter(|r| r.inside).collect();
        let converged: Vec<&RitzPair> = in_region.iter().copied().filter(|r| r.err < settings.tol).collect();
        logger.push_info(
            &format!(
                "NLEIGS iteration {}: {} Ritz values in the region, {} converged",
                k + 1,
                in_region.len(),
                converged.len()
            ),
            1,
            false,
        );

        let done = match settings.neigs {
            Some(wanted) => converged.len() >= wanted,
            None => !in_region.is_empty() && converged.len() == in_region.len(),
        };
        if done {
            let mut pairs = Eigenpairs::empty(n);
            let take = settings.neigs.unwrap_or(converged.len());
            for r in converged.iter().take(take) {
                pairs.push(r.lambda, r.vector.as_ref());
            }
            return Ok(NleigsSolution {
                result: SolveResult::Converged(pairs),
                linearization_converged: interpolant.converged,
                degree,
                iterations: k + 1,
            });
        }
        if last {
            let mut done_pairs = Eigenpairs::empty(n);
            let mut candidates = Eigenpairs::empty(n);
            let mut last_error = f64::INFINITY;
            for r in &in_region {
                if r.err < settings.tol {
                    done_pairs.push(r.lambda, r.vector.as_ref());
                } else {
                    candidates.push(r.lambda, r.vector.as_ref());
                    last_error = last_error.min(r.err);
                }
            }
            let reason = if invariant {
                "found an invariant subspace"
            } else if k + 1 == dim {
                "exhausted the linearization"
            } else {
                "reached maxit"
            };
            let message = format!(
                "NLEIGS {reason} after {} iterations with {} converged eigenvalues in the region",
                k + 1,
                done_pairs.len()
            );
            logger.push_warning(&message);
            return Ok(NleigsSolution {
                result: SolveResult::Partial(PartialSolution {
                    converged: done_pairs,
                    candidates,
                    last_error,
                    message,
                }),
                linearization_converged: interpolant.converged,
                degree,
                iterations: k + 1,
            });
        }
    }
    Err(NepError::invalid("nleigs needs maxit positive"))
}

/// Ritz pairs of the leading `size`×`size` Hessenberg block, nearest to the shift first.
fn ritz_pairs(
    nep: &dyn Nep,
    region: &Region,
    settings: &NleigsSettings,
    shift: c64,
    basis: &SubspaceBasis,
    h: MatRef<'_, c64>,
    size: usize,
) -> Result<Vec<RitzPair>, NepError> {
    let n = nep.size();
    let (theta, z) = dense_eigen(h.get(0..size, 0..size))?;
    let largest = theta.iter().map(|t| t.norm()).fold(0.0, f64::max);
    let vk = basis.active().get(.., 0..size);

    let mut pairs = Vec::with_capacity(size);
    for (i, &t) in theta.iter().enumerate() {
        if t.norm() <= f64::EPSILON * largest || t.norm() == 0.0 {
            continue;
        }
        let lambda = shift + t.inv();
        let y = vk * z.as_ref().get(.., i..i + 1);
        let vector = normalized(y.as_ref().get(0..n, ..));
        let err = settings.errmeasure.measure(nep, lambda, vector.as_ref());
        pairs.push(RitzPair { lambda, vector, err, inside: region.contains(lambda) });
    }
    let values: Vec<c64> = pairs.iter().map(|r| r.lambda).collect();
    let order = sort_by_distance(&values, shift);
    let mut slots: Vec<Option<RitzPair>> = pairs.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
