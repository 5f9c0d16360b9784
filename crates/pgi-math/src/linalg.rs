//! Linear algebra utilities.
//!
//! Cholesky factorization, triangular solves, precision matrices and
//! log-sum-exp for the small (d × d) covariances of the cluster model.

use ndarray::{Array1, Array2, ArrayView1};
use pgi_types::error::{PgiError, PgiResult};

/// Lower Cholesky factor `L` with `A = L Lᵀ`.
///
/// Fails with `LinAlg` when `A` is not square, not finite, or not
/// positive definite.
pub fn cholesky(a: &Array2<f64>) -> PgiResult<Array2<f64>> {
    let (n, m) = a.dim();
    if n != m {
        return Err(PgiError::LinAlg(format!(
            "Cholesky requires a square matrix, got {n}x{m}"
        )));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(PgiError::LinAlg(
            "Cholesky input contains non-finite values".to_string(),
        ));
    }

    let mut l = Array2::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if diag <= 0.0 {
            return Err(PgiError::LinAlg(format!(
                "Matrix is not positive definite (pivot {j} = {diag:e})"
            )));
        }
        let ljj = diag.sqrt();
        l[[j, j]] = ljj;
        for i in (j + 1)..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / ljj;
        }
    }
    Ok(l)
}

/// Solve `L y = b` for lower-triangular `L`.
pub fn solve_lower(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    y
}

/// Solve `Lᵀ x = y` for lower-triangular `L`.
pub fn solve_lower_transpose(l: &Array2<f64>, y: ArrayView1<f64>) -> Array1<f64> {
    let n = y.len();
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve `A x = b` given the Cholesky factor of `A`.
pub fn cholesky_solve(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let y = solve_lower(l, b);
    solve_lower_transpose(l, y.view())
}

/// `A⁻¹` from the Cholesky factor of `A`, symmetrized.
pub fn cholesky_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::zeros((n, n));
    let mut e = Array1::zeros(n);
    for j in 0..n {
        e.fill(0.0);
        e[j] = 1.0;
        let col = cholesky_solve(l, e.view());
        inv.column_mut(j).assign(&col);
    }
    (&inv + &inv.t()) * 0.5
}

/// `ln det A` from the Cholesky factor of `A`.
pub fn log_det_cholesky(l: &Array2<f64>) -> f64 {
    2.0 * l.diag().iter().map(|v| v.ln()).sum::<f64>()
}

/// `zᵀ P z` for a symmetric matrix `P`.
pub fn quadratic_form(p: &Array2<f64>, z: ArrayView1<f64>) -> f64 {
    z.dot(&p.dot(&z))
}

/// Numerically stable `ln Σ exp(v)`. Empty input gives `-∞`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Copy of `a` with `eps` added to its diagonal.
pub fn load_diagonal(a: &Array2<f64>, eps: f64) -> Array2<f64> {
    let mut out = a.clone();
    out.diag_mut().mapv_inplace(|v| v + eps);
    out
}
