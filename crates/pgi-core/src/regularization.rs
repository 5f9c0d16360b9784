// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — PGI Regularization
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Combined petrophysically guided regularization
//!
//! ```text
//! φ_m = α_pgi · φ_petro + Σ_c α_x[c] · φ_x,c
//! ```
//!
//! A channel with `α_x[c] == 0` contributes nothing to the penalty,
//! gradient or Hessian.

use ndarray::Array1;
use pgi_types::config::{EvalMode, RegularizationConfig};
use pgi_types::constants::WEIGHT_MAP_TOLERANCE;
use pgi_types::error::{PgiError, PgiResult};
use pgi_types::state::{AlphaSchedule, ReferenceModel, Wires};

use crate::mixture::GaussianMixture;
use crate::petro::PetroSmallness;
use crate::smoothness::SmoothDeriv;

/// Check a per-cell weight map: right length, finite, `>= 0`, max 1.
pub fn validate_weight_map(name: &str, weights: &Array1<f64>, n_cells: usize) -> PgiResult<()> {
    if weights.len() != n_cells {
        return Err(PgiError::mismatch(
            format!("weight map of channel '{name}'"),
            n_cells,
            weights.len(),
        ));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(PgiError::ConfigError(format!(
            "Weight map of channel '{name}' must be finite and >= 0"
        )));
    }
    let max = weights.iter().copied().fold(0.0_f64, f64::max);
    if (max - 1.0).abs() > WEIGHT_MAP_TOLERANCE {
        return Err(PgiError::ConfigError(format!(
            "Weight map of channel '{name}' must be max-normalized, max is {max}"
        )));
    }
    Ok(())
}

/// Penalty and gradient of one evaluation.
#[derive(Debug, Clone)]
pub struct RegEvaluation {
    pub penalty: f64,
    pub gradient: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct PgiRegularization {
    wires: Wires,
    petro: PetroSmallness,
    smooth: Vec<SmoothDeriv>,
}

impl PgiRegularization {
    /// `cell_weights` holds one max-normalized map per channel; `None`
    /// weights every cell equally.
    pub fn new(
        wires: Wires,
        mixture: GaussianMixture,
        config: &RegularizationConfig,
        cell_weights: Option<Vec<Array1<f64>>>,
    ) -> PgiResult<Self> {
        config.validate()?;
        let petro = PetroSmallness::new(
            wires.clone(),
            mixture,
            config.eval_mode,
            cell_weights.as_deref(),
        )?;
        let smooth = (0..wires.n_channels())
            .map(|c| {
                SmoothDeriv::new(
                    &wires,
                    c,
                    config.cell_width,
                    cell_weights.as_ref().map(|w| &w[c]),
                )
            })
            .collect::<PgiResult<Vec<_>>>()?;
        Ok(PgiRegularization {
            wires,
            petro,
            smooth,
        })
    }

    pub fn wires(&self) -> &Wires {
        &self.wires
    }

    pub fn petro(&self) -> &PetroSmallness {
        &self.petro
    }

    pub fn smooth(&self, channel: usize) -> &SmoothDeriv {
        &self.smooth[channel]
    }

    pub fn mixture(&self) -> &GaussianMixture {
        self.petro.mixture()
    }

    pub fn eval_mode(&self) -> EvalMode {
        self.petro.eval_mode()
    }

    fn check_alphas(&self, alphas: &AlphaSchedule) -> PgiResult<()> {
        if alphas.alpha_x.len() != self.smooth.len() {
            return Err(PgiError::mismatch(
                "alpha_x",
                self.smooth.len(),
                alphas.alpha_x.len(),
            ));
        }
        Ok(())
    }

    /// Smoothness terms with a non-zero weight.
    fn active_smooth<'a>(
        &'a self,
        alphas: &'a AlphaSchedule,
    ) -> impl Iterator<Item = (f64, &'a SmoothDeriv)> + 'a {
        alphas
            .alpha_x
            .iter()
            .zip(self.smooth.iter())
            .filter(|(a, _)| **a != 0.0)
            .map(|(a, s)| (*a, s))
    }

    pub fn classify(&self, model: &Array1<f64>) -> PgiResult<ReferenceModel> {
        self.petro.classify(model)
    }

    pub fn value(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
        alphas: &AlphaSchedule,
    ) -> PgiResult<f64> {
        Ok(self.evaluate(model, reference, alphas)?.penalty)
    }

    pub fn evaluate(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
        alphas: &AlphaSchedule,
    ) -> PgiResult<RegEvaluation> {
        self.check_alphas(alphas)?;
        let (petro, petro_grad) = self.petro.evaluate(model, reference)?;
        let mut penalty = alphas.alpha_pgi * petro;
        let mut gradient = petro_grad * alphas.alpha_pgi;
        for (alpha, smooth) in self.active_smooth(alphas) {
            penalty += alpha * smooth.value(model);
            gradient.scaled_add(alpha, &smooth.gradient(model));
        }
        if !penalty.is_finite() || gradient.iter().any(|g| !g.is_finite()) {
            return Err(PgiError::NumericalDegeneracy(format!(
                "Regularization is not finite (penalty = {penalty})"
            )));
        }
        Ok(RegEvaluation { penalty, gradient })
    }

    pub fn hessian_apply(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
        alphas: &AlphaSchedule,
        v: &Array1<f64>,
    ) -> PgiResult<Array1<f64>> {
        self.check_alphas(alphas)?;
        let mut hv = self.petro.hessian_apply(model, reference, v)? * alphas.alpha_pgi;
        for (alpha, smooth) in self.active_smooth(alphas) {
            hv.scaled_add(alpha, &smooth.hessian_apply(v));
        }
        Ok(hv)
    }

    pub fn hessian_diag(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
        alphas: &AlphaSchedule,
    ) -> PgiResult<Array1<f64>> {
        self.check_alphas(alphas)?;
        let mut diag = self.petro.hessian_diag(model, reference)? * alphas.alpha_pgi;
        for (alpha, smooth) in self.active_smooth(alphas) {
            diag.scaled_add(alpha, &smooth.hessian_diag());
        }
        Ok(diag)
    }

    /// Petrophysical misfit without `α_pgi`, compared against the
    /// petrophysical target.
    pub fn petro_value(&self, model: &Array1<f64>, reference: &ReferenceModel) -> PgiResult<f64> {
        self.petro.value(model, reference)
    }
}
