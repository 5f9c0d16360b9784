// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Forward Simulation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Forward models mapping one property channel to predicted data.
//!
//! The inversion only needs predictions and products with the
//! sensitivity `J = ∂d/∂m` and its transpose, so the trait exposes
//! exactly those. `LinearSimulation` is the dense linear case `d = G m`.

use ndarray::{Array1, Array2, ArrayView1};
use pgi_types::error::{PgiError, PgiResult};

/// Forward operator of a single channel.
pub trait ForwardModel {
    fn n_data(&self) -> usize;
    fn n_params(&self) -> usize;
    /// Predicted data `F(m)`.
    fn predict(&self, m: ArrayView1<f64>) -> Array1<f64>;
    /// `J(m) v`
    fn jvec(&self, m: ArrayView1<f64>, v: ArrayView1<f64>) -> Array1<f64>;
    /// `J(m)ᵀ v`
    fn jtvec(&self, m: ArrayView1<f64>, v: ArrayView1<f64>) -> Array1<f64>;
    /// `diag(Jᵀ diag(w²) J)` for data weights `w`.
    fn weighted_sensitivity_diag(&self, m: ArrayView1<f64>, w: ArrayView1<f64>) -> Array1<f64>;
}

/// Dense linear forward operator `d = G m`.
#[derive(Debug, Clone)]
pub struct LinearSimulation {
    g: Array2<f64>,
}

impl LinearSimulation {
    pub fn new(g: Array2<f64>) -> PgiResult<Self> {
        if g.nrows() == 0 || g.ncols() == 0 {
            return Err(PgiError::ConfigError(format!(
                "Forward operator must be non-empty, got {}x{}",
                g.nrows(),
                g.ncols()
            )));
        }
        if g.iter().any(|v| !v.is_finite()) {
            return Err(PgiError::ConfigError(
                "Forward operator contains non-finite entries".to_string(),
            ));
        }
        Ok(LinearSimulation { g })
    }

    /// Build `G[k, j] = kernel(k, x_j)` from cell centers `x_j`.
    pub fn from_kernel<K>(n_data: usize, centers: &Array1<f64>, kernel: K) -> PgiResult<Self>
    where
        K: Fn(usize, f64) -> f64,
    {
        let g = Array2::from_shape_fn((n_data, centers.len()), |(k, j)| kernel(k, centers[j]));
        LinearSimulation::new(g)
    }

    pub fn g(&self) -> &Array2<f64> {
        &self.g
    }

    /// Sensitivity-based cell weights `sqrt(Σ_k G_kj²)`, max-normalized.
    pub fn sensitivity_weights(&self) -> PgiResult<Array1<f64>> {
        let w = self
            .g
            .columns()
            .into_iter()
            .map(|col| col.dot(&col).sqrt())
            .collect::<Array1<f64>>();
        let max = w.iter().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return Err(PgiError::NumericalDegeneracy(
                "Forward operator has no sensitivity to any cell".to_string(),
            ));
        }
        Ok(w / max)
    }
}

impl ForwardModel for LinearSimulation {
    fn n_data(&self) -> usize {
        self.g.nrows()
    }

    fn n_params(&self) -> usize {
        self.g.ncols()
    }

    fn predict(&self, m: ArrayView1<f64>) -> Array1<f64> {
        self.g.dot(&m)
    }

    fn jvec(&self, _m: ArrayView1<f64>, v: ArrayView1<f64>) -> Array1<f64> {
        self.g.dot(&v)
    }

    fn jtvec(&self, _m: ArrayView1<f64>, v: ArrayView1<f64>) -> Array1<f64> {
        self.g.t().dot(&v)
    }

    fn weighted_sensitivity_diag(&self, _m: ArrayView1<f64>, w: ArrayView1<f64>) -> Array1<f64> {
        let w2 = w.mapv(|x| x * x);
        self.g
            .columns()
            .into_iter()
            .map(|col| col.iter().zip(w2.iter()).map(|(g, w)| g * g * w).sum())
            .collect()
    }
}

/// Centers of `n_cells` uniform cells of width `h` starting at zero.
pub fn uniform_cell_centers(n_cells: usize, h: f64) -> Array1<f64> {
    Array1::from_shape_fn(n_cells, |i| (i as f64 + 0.5) * h)
}
