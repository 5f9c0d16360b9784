// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — First-Difference Smoothness
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `φ_x = ½ Σ_f w_f (m_{f+1} − m_f)² / h` on one channel of a uniform
//! 1-D mesh. Face weights are the mean of the two adjacent cell weights.

use ndarray::{s, Array1, ArrayView1};
use pgi_types::error::PgiResult;
use pgi_types::state::Wires;

use crate::regularization::validate_weight_map;

#[derive(Debug, Clone)]
pub struct SmoothDeriv {
    wires: Wires,
    channel: usize,
    cell_width: f64,
    face_weights: Array1<f64>,
}

impl SmoothDeriv {
    pub fn new(
        wires: &Wires,
        channel: usize,
        cell_width: f64,
        cell_weights: Option<&Array1<f64>>,
    ) -> PgiResult<Self> {
        let n = wires.channel_len(channel);
        let face_weights = match cell_weights {
            Some(w) => {
                validate_weight_map(&wires.channels()[channel].name, w, n)?;
                Array1::from_shape_fn(n - 1, |f| 0.5 * (w[f] + w[f + 1]))
            }
            None => Array1::ones(n - 1),
        };
        Ok(SmoothDeriv {
            wires: wires.clone(),
            channel,
            cell_width,
            face_weights,
        })
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn face_weights(&self) -> &Array1<f64> {
        &self.face_weights
    }

    fn differences(&self, x: ArrayView1<f64>) -> Array1<f64> {
        &x.slice(s![1..]) - &x.slice(s![..-1])
    }

    pub fn value(&self, model: &Array1<f64>) -> f64 {
        let diff = self.differences(self.wires.project(model, self.channel));
        0.5 * diff
            .iter()
            .zip(self.face_weights.iter())
            .map(|(d, w)| w * d * d)
            .sum::<f64>()
            / self.cell_width
    }

    /// `Dᵀ W D x / h` for a channel-sized `x`.
    pub fn channel_hessian_apply(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let flux = self.differences(x) * &self.face_weights / self.cell_width;
        let mut out = Array1::zeros(x.len());
        for (f, q) in flux.iter().enumerate() {
            out[f] -= q;
            out[f + 1] += q;
        }
        out
    }

    pub fn gradient(&self, model: &Array1<f64>) -> Array1<f64> {
        let g = self.channel_hessian_apply(self.wires.project(model, self.channel));
        self.wires.embed(self.channel, g.view())
    }

    pub fn hessian_apply(&self, v: &Array1<f64>) -> Array1<f64> {
        self.gradient(v)
    }

    pub fn hessian_diag(&self) -> Array1<f64> {
        let n = self.wires.channel_len(self.channel);
        let mut diag = Array1::zeros(n);
        for (f, w) in self.face_weights.iter().enumerate() {
            diag[f] += w / self.cell_width;
            diag[f + 1] += w / self.cell_width;
        }
        self.wires.embed(self.channel, diag.view())
    }
}
