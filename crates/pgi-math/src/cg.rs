// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Preconditioned Conjugate Gradient
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Matrix-free preconditioned conjugate gradient for the Gauss-Newton
//! normal equations `(Jᵀ W² J + β R) p = −g`.
//!
//! The operator is supplied as a closure so the Hessian is never formed.
//! A Jacobi (inverse diagonal) preconditioner is optional. The iteration
//! stops on the relative residual `‖r‖ / ‖b‖`; a non-positive curvature
//! direction ends the solve early with the current iterate.

use ndarray::Array1;

// ───────────────────────────── configuration ─────────────────────────

/// Configuration for the CG solver.
#[derive(Debug, Clone)]
pub struct CgConfig {
    /// Maximum number of iterations (default: 100).
    pub max_iter: usize,
    /// Convergence tolerance on the relative residual norm (default: 1e-3).
    pub tol: f64,
}

impl Default for CgConfig {
    fn default() -> Self {
        CgConfig {
            max_iter: 100,
            tol: 1e-3,
        }
    }
}

/// Result of a CG solve.
#[derive(Debug, Clone)]
pub struct CgResult {
    pub solution: Array1<f64>,
    /// Number of operator applications.
    pub iterations: usize,
    /// Final relative residual norm.
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

// ──────────────────────────────── solver ─────────────────────────────

/// Solve `A x = b` from `x = 0`.
///
/// `inv_diag`, when given, is the elementwise inverse of `diag(A)`.
pub fn pcg<A>(
    mut apply: A,
    rhs: &Array1<f64>,
    inv_diag: Option<&Array1<f64>>,
    config: &CgConfig,
) -> CgResult
where
    A: FnMut(&Array1<f64>) -> Array1<f64>,
{
    let n = rhs.len();
    let mut x = Array1::zeros(n);
    let b_norm = rhs.dot(rhs).sqrt();
    if b_norm == 0.0 || !b_norm.is_finite() {
        return CgResult {
            solution: x,
            iterations: 0,
            residual: 0.0,
            converged: b_norm == 0.0,
        };
    }

    let precondition = |r: &Array1<f64>| -> Array1<f64> {
        match inv_diag {
            Some(d) => r * d,
            None => r.clone(),
        }
    };

    let mut r = rhs.clone();
    let mut z = precondition(&r);
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut residual = 1.0;
    let mut iterations = 0;

    for _ in 0..config.max_iter {
        let ap = apply(&p);
        iterations += 1;
        let p_ap = p.dot(&ap);
        if p_ap <= 0.0 || !p_ap.is_finite() {
            break;
        }
        let alpha = rz / p_ap;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);

        residual = r.dot(&r).sqrt() / b_norm;
        if residual < config.tol {
            return CgResult {
                solution: x,
                iterations,
                residual,
                converged: true,
            };
        }

        z = precondition(&r);
        let rz_next = r.dot(&z);
        let beta = rz_next / rz;
        rz = rz_next;
        p = &z + &(&p * beta);
    }

    CgResult {
        solution: x,
        iterations,
        residual,
        converged: false,
    }
}
