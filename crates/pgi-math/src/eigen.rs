// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Probe Eigenvalue Estimates
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Largest-eigenvalue estimates of symmetric positive semi-definite
//! operators from random probe vectors.
//!
//! Each probe is a standard-normal vector refined by a few power
//! iterations; its Rayleigh quotient is one estimate. The estimates of
//! `ninit` probes are averaged. Only operator applications are used, so
//! curvature ratios between misfit and regularization can be taken
//! without forming a Hessian.

use ndarray::Array1;
use rand::Rng;
use rand_distr::StandardNormal;

/// Standard-normal probe of length `n`, normalized to unit length.
pub fn random_unit_vector<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Array1<f64> {
    let mut v: Array1<f64> = Array1::from_shape_fn(n, |_| rng.sample(StandardNormal));
    let norm = v.dot(&v).sqrt();
    if norm > 0.0 {
        v /= norm;
    }
    v
}

/// Rayleigh quotient of one probe after `power_iterations` power steps.
pub fn rayleigh_estimate<A>(apply: &mut A, mut x: Array1<f64>, power_iterations: usize) -> f64
where
    A: FnMut(&Array1<f64>) -> Array1<f64>,
{
    for _ in 0..power_iterations {
        let y = apply(&x);
        let norm = y.dot(&y).sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return 0.0;
        }
        x = y / norm;
    }
    let ax = apply(&x);
    let xx = x.dot(&x);
    if xx == 0.0 {
        return 0.0;
    }
    x.dot(&ax) / xx
}

/// Mean of `ninit` probe estimates of the largest eigenvalue of the
/// `n × n` operator `apply`.
pub fn estimate_max_eigenvalue<A, R>(
    mut apply: A,
    n: usize,
    ninit: usize,
    power_iterations: usize,
    rng: &mut R,
) -> f64
where
    A: FnMut(&Array1<f64>) -> Array1<f64>,
    R: Rng + ?Sized,
{
    if n == 0 || ninit == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for _ in 0..ninit {
        let probe = random_unit_vector(n, rng);
        total += rayleigh_estimate(&mut apply, probe, power_iterations);
    }
    total / ninit as f64
}
