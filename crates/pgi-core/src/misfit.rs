// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Data Misfit
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Weighted least-squares data misfit per channel and their combination.
//!
//! Each term is `φ_d = ½‖W (F(m_c) − d_obs)‖²` with `W = diag(1/σ)`, so a
//! model fitting the data to within the noise has `φ_d ≈ nD / 2`.

use ndarray::Array1;
use pgi_types::error::{PgiError, PgiResult};
use pgi_types::state::Wires;

use crate::simulation::ForwardModel;

/// Observed data of one survey with per-datum standard deviations.
#[derive(Debug, Clone)]
pub struct SurveyData {
    dobs: Array1<f64>,
    standard_deviation: Array1<f64>,
}

impl SurveyData {
    pub fn new(dobs: Array1<f64>, standard_deviation: Array1<f64>) -> PgiResult<Self> {
        if dobs.len() != standard_deviation.len() {
            return Err(PgiError::mismatch(
                "standard deviations",
                dobs.len(),
                standard_deviation.len(),
            ));
        }
        if dobs.iter().any(|v| !v.is_finite()) {
            return Err(PgiError::ConfigError(
                "Observed data contain non-finite values".to_string(),
            ));
        }
        if let Some(i) = standard_deviation
            .iter()
            .position(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(PgiError::ConfigError(format!(
                "Standard deviation of datum {i} must be finite and > 0, got {}",
                standard_deviation[i]
            )));
        }
        Ok(SurveyData {
            dobs,
            standard_deviation,
        })
    }

    /// `σ = relative_error · |d_obs| + noise_floor`.
    pub fn from_relative_error(
        dobs: Array1<f64>,
        relative_error: f64,
        noise_floor: f64,
    ) -> PgiResult<Self> {
        let std = dobs.mapv(|d| relative_error * d.abs() + noise_floor);
        SurveyData::new(dobs, std)
    }

    pub fn dobs(&self) -> &Array1<f64> {
        &self.dobs
    }

    pub fn standard_deviation(&self) -> &Array1<f64> {
        &self.standard_deviation
    }

    pub fn n_data(&self) -> usize {
        self.dobs.len()
    }
}

/// `½‖W (F(m_c) − d_obs)‖²` for the channel `channel` of a joint model.
pub struct L2DataMisfit {
    simulation: Box<dyn ForwardModel>,
    data: SurveyData,
    channel: usize,
    weights: Array1<f64>,
}

impl std::fmt::Debug for L2DataMisfit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2DataMisfit")
            .field("channel", &self.channel)
            .field("n_data", &self.data.n_data())
            .field("n_params", &self.simulation.n_params())
            .finish()
    }
}

impl L2DataMisfit {
    pub fn new(
        simulation: Box<dyn ForwardModel>,
        data: SurveyData,
        channel: usize,
    ) -> PgiResult<Self> {
        if simulation.n_data() != data.n_data() {
            return Err(PgiError::mismatch(
                "observed data",
                simulation.n_data(),
                data.n_data(),
            ));
        }
        let weights = data.standard_deviation.mapv(|s| 1.0 / s);
        Ok(L2DataMisfit {
            simulation,
            data,
            channel,
            weights,
        })
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn n_data(&self) -> usize {
        self.data.n_data()
    }

    pub fn n_params(&self) -> usize {
        self.simulation.n_params()
    }

    pub fn data(&self) -> &SurveyData {
        &self.data
    }

    pub fn simulation(&self) -> &dyn ForwardModel {
        self.simulation.as_ref()
    }

    /// `W (F(m_c) − d_obs)`
    pub fn residual(&self, wires: &Wires, model: &Array1<f64>) -> Array1<f64> {
        let mc = wires.project(model, self.channel);
        (self.simulation.predict(mc) - &self.data.dobs) * &self.weights
    }

    pub fn value(&self, wires: &Wires, model: &Array1<f64>) -> f64 {
        let r = self.residual(wires, model);
        0.5 * r.dot(&r)
    }

    /// Joint gradient `Jᵀ W r`, zero outside the channel.
    pub fn gradient(&self, wires: &Wires, model: &Array1<f64>) -> Array1<f64> {
        let r = self.residual(wires, model) * &self.weights;
        let mc = wires.project(model, self.channel);
        wires.embed(self.channel, self.simulation.jtvec(mc, r.view()).view())
    }

    /// Gauss-Newton product `Jᵀ W² J v` on the channel block.
    pub fn hessian_apply(&self, wires: &Wires, model: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
        let hv = self.channel_hessian_apply(wires, model, &wires.project(v, self.channel).to_owned());
        wires.embed(self.channel, hv.view())
    }

    /// `Jᵀ W² J v` for a channel-sized `v`.
    pub fn channel_hessian_apply(
        &self,
        wires: &Wires,
        model: &Array1<f64>,
        v: &Array1<f64>,
    ) -> Array1<f64> {
        let mc = wires.project(model, self.channel);
        let w2 = self.weights.mapv(|w| w * w);
        let jv = self.simulation.jvec(mc, v.view()) * &w2;
        self.simulation.jtvec(mc, jv.view())
    }

    pub fn hessian_diag(&self, wires: &Wires, model: &Array1<f64>) -> Array1<f64> {
        let mc = wires.project(model, self.channel);
        let diag = self
            .simulation
            .weighted_sensitivity_diag(mc, self.weights.view());
        wires.embed(self.channel, diag.view())
    }
}

/// Sum of per-channel misfits, each scaled by a multiplier.
#[derive(Debug)]
pub struct ComboDataMisfit {
    wires: Wires,
    terms: Vec<L2DataMisfit>,
}

impl ComboDataMisfit {
    pub fn new(wires: Wires, terms: Vec<L2DataMisfit>) -> PgiResult<Self> {
        if terms.is_empty() {
            return Err(PgiError::ConfigError(
                "At least one data misfit term is required".to_string(),
            ));
        }
        for term in &terms {
            if term.channel >= wires.n_channels() {
                return Err(PgiError::ConfigError(format!(
                    "Misfit term refers to channel {} but only {} exist",
                    term.channel,
                    wires.n_channels()
                )));
            }
            if term.n_params() != wires.channel_len(term.channel) {
                return Err(PgiError::mismatch(
                    format!("parameters of channel '{}'", wires.channels()[term.channel].name),
                    wires.channel_len(term.channel),
                    term.n_params(),
                ));
            }
        }
        Ok(ComboDataMisfit { wires, terms })
    }

    pub fn wires(&self) -> &Wires {
        &self.wires
    }

    pub fn terms(&self) -> &[L2DataMisfit] {
        &self.terms
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    fn check_multipliers(&self, multipliers: &[f64]) -> PgiResult<()> {
        if multipliers.len() != self.terms.len() {
            return Err(PgiError::mismatch(
                "misfit multipliers",
                self.terms.len(),
                multipliers.len(),
            ));
        }
        Ok(())
    }

    /// Unscaled misfit of every term.
    pub fn values(&self, model: &Array1<f64>) -> PgiResult<Vec<f64>> {
        self.wires.check_len(model)?;
        Ok(self
            .terms
            .iter()
            .map(|t| t.value(&self.wires, model))
            .collect())
    }

    pub fn value(&self, model: &Array1<f64>, multipliers: &[f64]) -> PgiResult<f64> {
        self.check_multipliers(multipliers)?;
        Ok(self
            .values(model)?
            .iter()
            .zip(multipliers)
            .map(|(v, w)| v * w)
            .sum())
    }

    pub fn gradient(&self, model: &Array1<f64>, multipliers: &[f64]) -> PgiResult<Array1<f64>> {
        self.check_multipliers(multipliers)?;
        self.wires.check_len(model)?;
        let mut g = Array1::zeros(model.len());
        for (term, w) in self.terms.iter().zip(multipliers) {
            g.scaled_add(*w, &term.gradient(&self.wires, model));
        }
        Ok(g)
    }

    pub fn hessian_apply(
        &self,
        model: &Array1<f64>,
        multipliers: &[f64],
        v: &Array1<f64>,
    ) -> PgiResult<Array1<f64>> {
        self.check_multipliers(multipliers)?;
        self.wires.check_len(v)?;
        let mut hv = Array1::zeros(v.len());
        for (term, w) in self.terms.iter().zip(multipliers) {
            hv.scaled_add(*w, &term.hessian_apply(&self.wires, model, v));
        }
        Ok(hv)
    }

    pub fn hessian_diag(&self, model: &Array1<f64>, multipliers: &[f64]) -> PgiResult<Array1<f64>> {
        self.check_multipliers(multipliers)?;
        let mut d = Array1::zeros(model.len());
        for (term, w) in self.terms.iter().zip(multipliers) {
            d.scaled_add(*w, &term.hessian_diag(&self.wires, model));
        }
        Ok(d)
    }
}
