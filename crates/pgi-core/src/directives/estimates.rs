// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Curvature Estimates
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Start-up weights chosen from ratios of largest Hessian eigenvalues.
//!
//! Every eigenvalue is a probe estimate (`pgi_math::eigen`): random
//! Gaussian vectors refined by a few power iterations, Rayleigh
//! quotients averaged. Only Hessian products are evaluated.

use ndarray::Array1;
use rand::rngs::StdRng;
use tracing::{debug, info};

use pgi_math::eigen::estimate_max_eigenvalue;
use pgi_types::config::{broadcast, AlphaEstimateConfig, BetaEstimateConfig, ScalingEstimateConfig};
use pgi_types::error::{PgiError, PgiResult};
use pgi_types::state::InversionState;

use super::Directive;
use crate::problem::InverseProblem;

/// Probe estimate over a fallible operator; the first error wins.
fn probe<F>(
    mut apply: F,
    n: usize,
    ninit: usize,
    power_iterations: usize,
    rng: &mut StdRng,
) -> PgiResult<f64>
where
    F: FnMut(&Array1<f64>) -> PgiResult<Array1<f64>>,
{
    let mut error = None;
    let lambda = estimate_max_eigenvalue(
        |v| match apply(v) {
            Ok(hv) => hv,
            Err(e) => {
                error.get_or_insert(e);
                Array1::zeros(n)
            }
        },
        n,
        ninit,
        power_iterations,
        rng,
    );
    match error {
        Some(e) => Err(e),
        None => Ok(lambda),
    }
}

fn positive(what: &str, lambda: f64) -> PgiResult<f64> {
    if lambda > 0.0 && lambda.is_finite() {
        Ok(lambda)
    } else {
        Err(PgiError::NumericalDegeneracy(format!(
            "Largest eigenvalue of the {what} Hessian is {lambda}"
        )))
    }
}

/// `α_x[c] = ratio_c · α_pgi · λ(H_petro restricted to c) / λ(H_smooth,c)`.
#[derive(Debug, Clone)]
pub struct AlphaSmoothEstimate {
    config: AlphaEstimateConfig,
}

impl AlphaSmoothEstimate {
    pub fn new(config: AlphaEstimateConfig) -> Self {
        AlphaSmoothEstimate { config }
    }
}

impl Directive for AlphaSmoothEstimate {
    fn name(&self) -> &'static str {
        "alpha_smooth_estimate"
    }

    fn initialize(
        &mut self,
        problem: &InverseProblem,
        state: &mut InversionState,
        rng: &mut StdRng,
    ) -> PgiResult<()> {
        let wires = problem.wires();
        let reg = problem.regularization();
        let ratios = broadcast(
            "alpha_estimate.alpha0_ratio",
            &self.config.alpha0_ratio,
            wires.n_channels(),
        )?;
        let mut alpha_x = Vec::with_capacity(ratios.len());
        for (c, ratio) in ratios.iter().enumerate() {
            if *ratio == 0.0 {
                alpha_x.push(0.0);
                continue;
            }
            let len = wires.channel_len(c);
            let petro = probe(
                |v| {
                    let hv = reg.petro().hessian_apply(
                        &state.model,
                        &state.reference,
                        &wires.embed(c, v.view()),
                    )?;
                    Ok(wires.project(&hv, c).to_owned())
                },
                len,
                self.config.ninit,
                self.config.power_iterations,
                rng,
            )?;
            let smooth = probe(
                |v| Ok(reg.smooth(c).channel_hessian_apply(v.view())),
                len,
                self.config.ninit,
                self.config.power_iterations,
                rng,
            )?;
            let alpha = if smooth > 0.0 {
                ratio * state.alphas.alpha_pgi * petro / smooth
            } else {
                0.0
            };
            debug!(channel = c, petro, smooth, alpha, "smoothness weight estimated");
            alpha_x.push(alpha);
        }
        info!(?alpha_x, "alpha_x initialized");
        state.alphas.alpha_x = alpha_x;
        Ok(())
    }
}

/// Misfit multipliers `[1, χ₀ · λ₀ / λ_c, ...]` balancing the curvature
/// of every data term against the first one.
#[derive(Debug, Clone)]
pub struct ScalingEstimate {
    config: ScalingEstimateConfig,
}

impl ScalingEstimate {
    pub fn new(config: ScalingEstimateConfig) -> Self {
        ScalingEstimate { config }
    }
}

impl Directive for ScalingEstimate {
    fn name(&self) -> &'static str {
        "scaling_estimate"
    }

    fn initialize(
        &mut self,
        problem: &InverseProblem,
        state: &mut InversionState,
        rng: &mut StdRng,
    ) -> PgiResult<()> {
        let wires = problem.wires();
        let mut lambdas = Vec::with_capacity(problem.misfit().n_terms());
        for term in problem.misfit().terms() {
            let len = wires.channel_len(term.channel());
            let lambda = probe(
                |v| Ok(term.channel_hessian_apply(wires, &state.model, v)),
                len,
                self.config.ninit,
                self.config.power_iterations,
                rng,
            )?;
            lambdas.push(positive("data misfit", lambda)?);
        }
        let multipliers: Vec<f64> = lambdas
            .iter()
            .enumerate()
            .map(|(c, l)| {
                if c == 0 {
                    1.0
                } else {
                    self.config.chi0_ratio * lambdas[0] / l
                }
            })
            .collect();
        info!(?lambdas, ?multipliers, "misfit multipliers initialized");
        state.misfit_multipliers = multipliers;
        Ok(())
    }
}

/// `β₀ = ratio · λ(H_data) / λ(H_reg)`.
#[derive(Debug, Clone)]
pub struct BetaEstimate {
    config: BetaEstimateConfig,
}

impl BetaEstimate {
    pub fn new(config: BetaEstimateConfig) -> Self {
        BetaEstimate { config }
    }
}

impl Directive for BetaEstimate {
    fn name(&self) -> &'static str {
        "beta_estimate"
    }

    fn initialize(
        &mut self,
        problem: &InverseProblem,
        state: &mut InversionState,
        rng: &mut StdRng,
    ) -> PgiResult<()> {
        let n = problem.n_params();
        let data = probe(
            |v| {
                problem
                    .misfit()
                    .hessian_apply(&state.model, &state.misfit_multipliers, v)
            },
            n,
            self.config.ninit,
            self.config.power_iterations,
            rng,
        )?;
        let reg = probe(
            |v| {
                problem.regularization().hessian_apply(
                    &state.model,
                    &state.reference,
                    &state.alphas,
                    v,
                )
            },
            n,
            self.config.ninit,
            self.config.power_iterations,
            rng,
        )?;
        let beta0 =
            self.config.beta0_ratio * positive("data misfit", data)? / positive("regularization", reg)?;
        state.beta.reset(beta0)?;
        info!(beta0, data, reg, "beta initialized");
        Ok(())
    }
}
