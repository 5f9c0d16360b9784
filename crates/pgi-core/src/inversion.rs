// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Inversion Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Outer loop: one projected Gauss-Newton step per iteration, with the
//! directives run around it.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use pgi_types::config::InversionConfig;
use pgi_types::error::{PgiError, PgiResult};
use pgi_types::state::{
    AlphaSchedule, BetaSchedule, InversionState, InversionStatus, IterationRecord,
    MultiTargetState, ReferenceModel,
};

use crate::directives::{
    AlphaSmoothEstimate, BetaAlphaSchedule, BetaEstimate, Directive, MultiTargetMisfits,
    ScalingEstimate, UpdateReference,
};
use crate::optimization::ProjectedGnCg;
use crate::problem::InverseProblem;

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct InversionResult {
    pub model: Array1<f64>,
    pub status: InversionStatus,
    pub iterations: usize,
    pub beta: f64,
    pub alphas: AlphaSchedule,
    /// Unscaled misfit of every data term at the final model.
    pub misfits: Vec<f64>,
    pub misfit_multipliers: Vec<f64>,
    pub reference: ReferenceModel,
    pub history: Vec<IterationRecord>,
}

impl InversionResult {
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }
}

pub struct BaseInversion {
    problem: InverseProblem,
    optimizer: ProjectedGnCg,
    directives: Vec<Box<dyn Directive>>,
    beta: BetaSchedule,
    alphas: AlphaSchedule,
    seed: u64,
}

impl std::fmt::Debug for BaseInversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseInversion")
            .field("optimizer", &self.optimizer)
            .field("directives", &self.directive_names())
            .field("beta", &self.beta)
            .field("alphas", &self.alphas)
            .field("seed", &self.seed)
            .finish()
    }
}

impl BaseInversion {
    /// Driver with beta 1 in `[0, 1e3]`, `alpha_pgi = 1` and no smoothness.
    pub fn new(
        problem: InverseProblem,
        optimizer: ProjectedGnCg,
        directives: Vec<Box<dyn Directive>>,
    ) -> PgiResult<Self> {
        let n_channels = problem.wires().n_channels();
        Ok(BaseInversion {
            problem,
            optimizer,
            directives,
            beta: BetaSchedule::new(1.0, 0.0, 1e3)?,
            alphas: AlphaSchedule {
                alpha_pgi: 1.0,
                alpha_x: vec![0.0; n_channels],
            },
            seed: 0,
        })
    }

    /// Standard directive list: alpha, scaling and beta estimates (when
    /// configured), reference update, misfit targets, beta schedule.
    pub fn from_config(problem: InverseProblem, config: &InversionConfig) -> PgiResult<Self> {
        config.validate()?;
        let optimizer = ProjectedGnCg::new(config.optimizer.clone())?;
        let schedule = &config.schedule;
        let beta = BetaSchedule::new(
            config.initial_beta,
            schedule.beta_min,
            schedule.beta_max_multiple,
        )?;
        let alphas = AlphaSchedule {
            alpha_pgi: config.regularization.alpha_pgi,
            alpha_x: config
                .regularization
                .alpha_x_for(problem.wires().n_channels())?,
        };

        let mut directives: Vec<Box<dyn Directive>> = Vec::new();
        if let Some(alpha) = &config.alpha_estimate {
            directives.push(Box::new(AlphaSmoothEstimate::new(alpha.clone())));
        }
        if let Some(scaling) = &config.scaling_estimate {
            directives.push(Box::new(ScalingEstimate::new(scaling.clone())));
        }
        if let Some(beta) = &config.beta_estimate {
            directives.push(Box::new(BetaEstimate::new(beta.clone())));
        }
        if config.update_reference {
            directives.push(Box::new(UpdateReference));
        }
        directives.push(Box::new(MultiTargetMisfits::new(
            config.targets.clone(),
            schedule.tolerance,
            schedule.update_rate,
            schedule.min_iterations(config.optimizer.max_iter),
        )));
        directives.push(Box::new(BetaAlphaSchedule::new(schedule.clone())));

        Ok(BaseInversion::new(problem, optimizer, directives)?
            .with_beta(beta)
            .with_alphas(alphas)?
            .with_seed(config.seed))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_beta(mut self, beta: BetaSchedule) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_alphas(mut self, alphas: AlphaSchedule) -> PgiResult<Self> {
        let n_channels = self.problem.wires().n_channels();
        if alphas.alpha_x.len() != n_channels {
            return Err(PgiError::mismatch("alpha_x entries", n_channels, alphas.alpha_x.len()));
        }
        if !alphas.alpha_pgi.is_finite()
            || alphas.alpha_pgi < 0.0
            || alphas.alpha_x.iter().any(|a| !a.is_finite() || *a < 0.0)
        {
            return Err(PgiError::ConfigError(
                "alpha weights must be finite and >= 0".to_string(),
            ));
        }
        self.alphas = alphas;
        Ok(self)
    }

    pub fn problem(&self) -> &InverseProblem {
        &self.problem
    }

    pub fn directive_names(&self) -> Vec<&'static str> {
        self.directives.iter().map(|d| d.name()).collect()
    }

    /// Run from `m0` until a directive stops the loop, the step stalls,
    /// or `optimizer.max_iter` is reached.
    pub fn run(&mut self, m0: &Array1<f64>) -> PgiResult<InversionResult> {
        self.problem.wires().check_len(m0)?;
        if m0.iter().any(|v| !v.is_finite()) {
            return Err(PgiError::ConfigError(
                "Starting model contains non-finite values".to_string(),
            ));
        }
        let model = self.optimizer.project(m0);
        let reference = self.problem.regularization().classify(&model)?;
        let mut state = InversionState {
            iteration: 0,
            model,
            beta: self.beta.clone(),
            alphas: self.alphas.clone(),
            misfit_multipliers: vec![1.0; self.problem.misfit().n_terms()],
            reference,
            targets: MultiTargetState::default(),
            status: InversionStatus::Running,
            stop: false,
            step_accepted: true,
            history: Vec::new(),
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        for directive in self.directives.iter_mut() {
            directive.initialize(&self.problem, &mut state, &mut rng)?;
        }
        info!(
            beta = state.beta.value(),
            alpha_x = ?state.alphas.alpha_x,
            multipliers = ?state.misfit_multipliers,
            directives = ?self.directive_names(),
            "inversion initialized"
        );

        let max_iter = self.optimizer.config().max_iter;
        let tol_x = self.optimizer.config().tol_x;
        for iteration in 1..=max_iter {
            state.iteration = iteration;
            let beta_used = state.beta.value();
            let alpha_used = state.alphas.alpha_pgi;
            let multipliers_used = state.misfit_multipliers.clone();
            let report = self.optimizer.step(&self.problem, &state)?;
            if !report.accepted {
                warn!(iteration, "step rejected; model unchanged");
            }
            state.model = report.model;
            state.step_accepted = report.accepted;

            for directive in self.directives.iter_mut() {
                directive.end_iteration(&self.problem, &mut state)?;
            }

            let phi_d = self.problem.misfit_values(&state.model)?;
            let phi_petro = self
                .problem
                .regularization()
                .petro_value(&state.model, &state.reference)?;
            info!(
                iteration,
                beta = beta_used,
                alpha_pgi = alpha_used,
                ?phi_d,
                phi_petro,
                objective = report.objective,
                cg_iterations = report.cg_iterations,
                step_norm = report.step_norm,
                "iteration complete"
            );
            state.history.push(IterationRecord {
                iteration,
                beta: beta_used,
                alpha_pgi: alpha_used,
                misfit_multipliers: multipliers_used,
                phi_d,
                phi_petro,
                objective: report.objective,
                cg_iterations: report.cg_iterations,
                cg_converged: report.cg_converged,
                step_norm: report.step_norm,
            });

            if state.stop {
                break;
            }
            if report.accepted && report.step_norm < tol_x {
                info!(iteration, step_norm = report.step_norm, "step below tol_x; stopping");
                state.status = InversionStatus::Stalled;
                break;
            }
        }
        if state.status == InversionStatus::Running {
            state.status = InversionStatus::MaxIterations;
        }

        let misfits = self.problem.misfit_values(&state.model)?;
        info!(status = ?state.status, iterations = state.iteration, ?misfits, "inversion finished");
        Ok(InversionResult {
            model: state.model,
            status: state.status,
            iterations: state.iteration,
            beta: state.beta.value(),
            alphas: state.alphas,
            misfits,
            misfit_multipliers: state.misfit_multipliers,
            reference: state.reference,
            history: state.history,
        })
    }
}
