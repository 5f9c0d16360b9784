// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Inverse Problem
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Objective `φ(m) = Σ_c s_c φ_d,c(m) + β φ_m(m)` assembled from the data
//! misfit and the regularization, with the weights read from the
//! inversion state.

use ndarray::Array1;
use pgi_types::error::{PgiError, PgiResult};
use pgi_types::state::{AlphaSchedule, InversionState, ReferenceModel, Wires};

use crate::misfit::ComboDataMisfit;
use crate::regularization::PgiRegularization;

/// Everything the objective depends on besides the model.
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveWeights<'a> {
    pub beta: f64,
    pub alphas: &'a AlphaSchedule,
    pub multipliers: &'a [f64],
    pub reference: &'a ReferenceModel,
}

impl<'a> ObjectiveWeights<'a> {
    pub fn from_state(state: &'a InversionState) -> Self {
        ObjectiveWeights {
            beta: state.beta.value(),
            alphas: &state.alphas,
            multipliers: &state.misfit_multipliers,
            reference: &state.reference,
        }
    }
}

/// Value, gradient and the two parts of one objective evaluation.
#[derive(Debug, Clone)]
pub struct ObjectiveEvaluation {
    pub value: f64,
    /// Weighted data misfit `Σ_c s_c φ_d,c`.
    pub phi_d: f64,
    pub phi_m: f64,
    pub gradient: Array1<f64>,
}

#[derive(Debug)]
pub struct InverseProblem {
    misfit: ComboDataMisfit,
    regularization: PgiRegularization,
}

impl InverseProblem {
    pub fn new(misfit: ComboDataMisfit, regularization: PgiRegularization) -> PgiResult<Self> {
        if misfit.wires() != regularization.wires() {
            return Err(PgiError::ConfigError(
                "Data misfit and regularization use different channel layouts".to_string(),
            ));
        }
        Ok(InverseProblem {
            misfit,
            regularization,
        })
    }

    pub fn wires(&self) -> &Wires {
        self.misfit.wires()
    }

    pub fn n_params(&self) -> usize {
        self.wires().total_len()
    }

    pub fn misfit(&self) -> &ComboDataMisfit {
        &self.misfit
    }

    pub fn regularization(&self) -> &PgiRegularization {
        &self.regularization
    }

    /// Unscaled misfit of every data term.
    pub fn misfit_values(&self, model: &Array1<f64>) -> PgiResult<Vec<f64>> {
        self.misfit.values(model)
    }

    pub fn evaluate(
        &self,
        model: &Array1<f64>,
        weights: &ObjectiveWeights<'_>,
    ) -> PgiResult<ObjectiveEvaluation> {
        let phi_d = self.misfit.value(model, weights.multipliers)?;
        let reg = self
            .regularization
            .evaluate(model, weights.reference, weights.alphas)?;
        let mut gradient = self.misfit.gradient(model, weights.multipliers)?;
        gradient.scaled_add(weights.beta, &reg.gradient);
        let value = phi_d + weights.beta * reg.penalty;
        if !value.is_finite() {
            return Err(PgiError::NumericalDegeneracy(format!(
                "Objective is not finite (phi_d = {phi_d}, phi_m = {})",
                reg.penalty
            )));
        }
        Ok(ObjectiveEvaluation {
            value,
            phi_d,
            phi_m: reg.penalty,
            gradient,
        })
    }

    pub fn value(&self, model: &Array1<f64>, weights: &ObjectiveWeights<'_>) -> PgiResult<f64> {
        let phi_d = self.misfit.value(model, weights.multipliers)?;
        let phi_m = self
            .regularization
            .value(model, weights.reference, weights.alphas)?;
        Ok(phi_d + weights.beta * phi_m)
    }

    /// Gauss-Newton product `(Σ s_c J_cᵀ W_c² J_c + β H_m) v`.
    pub fn hessian_apply(
        &self,
        model: &Array1<f64>,
        weights: &ObjectiveWeights<'_>,
        v: &Array1<f64>,
    ) -> PgiResult<Array1<f64>> {
        let mut hv = self.misfit.hessian_apply(model, weights.multipliers, v)?;
        let reg = self
            .regularization
            .hessian_apply(model, weights.reference, weights.alphas, v)?;
        hv.scaled_add(weights.beta, &reg);
        Ok(hv)
    }

    pub fn hessian_diag(
        &self,
        model: &Array1<f64>,
        weights: &ObjectiveWeights<'_>,
    ) -> PgiResult<Array1<f64>> {
        let mut diag = self.misfit.hessian_diag(model, weights.multipliers)?;
        let reg = self
            .regularization
            .hessian_diag(model, weights.reference, weights.alphas)?;
        diag.scaled_add(weights.beta, &reg);
        Ok(diag)
    }
}
