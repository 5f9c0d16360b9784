// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Multi-Target Misfits
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! One misfit target per data term, `chifact · ½ nD`, plus an optional
//! petrophysical target `chi_small · ½ n_params` on the alpha-free
//! smallness term. Convergence needs every target met for `sustain`
//! consecutive iterations, and not before `min_iterations`.

use rand::rngs::StdRng;
use tracing::info;

use pgi_types::config::TargetConfig;
use pgi_types::error::PgiResult;
use pgi_types::state::{InversionState, InversionStatus, MultiTargetState};

use super::Directive;
use crate::problem::InverseProblem;

#[derive(Debug, Clone)]
pub struct MultiTargetMisfits {
    config: TargetConfig,
    tolerance: f64,
    sustain: usize,
    min_iterations: usize,
}

impl MultiTargetMisfits {
    pub fn new(config: TargetConfig, tolerance: f64, sustain: usize, min_iterations: usize) -> Self {
        MultiTargetMisfits {
            config,
            tolerance,
            sustain,
            min_iterations,
        }
    }

    pub fn data_targets(&self, problem: &InverseProblem) -> Vec<f64> {
        problem
            .misfit()
            .terms()
            .iter()
            .map(|t| self.config.chifact * 0.5 * t.n_data() as f64)
            .collect()
    }

    pub fn petro_target(&self, problem: &InverseProblem) -> Option<f64> {
        self.config
            .chi_small
            .map(|chi| chi * 0.5 * problem.n_params() as f64)
    }
}

impl Directive for MultiTargetMisfits {
    fn name(&self) -> &'static str {
        "multi_target_misfits"
    }

    fn initialize(
        &mut self,
        problem: &InverseProblem,
        state: &mut InversionState,
        _rng: &mut StdRng,
    ) -> PgiResult<()> {
        let targets = self.data_targets(problem);
        let mut tracker = MultiTargetState::new(
            targets.clone(),
            self.tolerance,
            self.sustain,
            self.min_iterations,
            self.petro_target(problem),
        )?;
        tracker.prime(&problem.misfit_values(&state.model)?);
        info!(?targets, petro = ?self.petro_target(problem), "misfit targets set");
        state.targets = tracker;
        Ok(())
    }

    fn end_iteration(&mut self, problem: &InverseProblem, state: &mut InversionState) -> PgiResult<()> {
        let misfits = problem.misfit_values(&state.model)?;
        let petro = problem
            .regularization()
            .petro_value(&state.model, &state.reference)?;
        if state.targets.observe(state.iteration, &misfits, petro) {
            info!(iteration = state.iteration, ?misfits, "all misfit targets reached");
            state.status = InversionStatus::Converged;
            state.stop = true;
        }
        Ok(())
    }
}
