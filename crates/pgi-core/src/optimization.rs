// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Projected Gauss-Newton / CG
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! One damped Gauss-Newton step per outer iteration, with bound
//! constraints handled by projection.
//!
//! Parameters sitting on a bound with the gradient pushing outward form
//! the binding set; they are frozen while CG solves the Gauss-Newton
//! system on the remaining free parameters. The step is then accepted
//! by projected Armijo backtracking.

use ndarray::Array1;
use tracing::{debug, warn};

use pgi_math::cg::{pcg, CgConfig};
use pgi_types::config::OptimizerConfig;
use pgi_types::constants::BOUND_SLACK;
use pgi_types::error::{PgiError, PgiResult};
use pgi_types::state::InversionState;

use crate::problem::{InverseProblem, ObjectiveWeights};

/// Outcome of one outer iteration.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Model after the step; the starting model if the line search failed.
    pub model: Array1<f64>,
    pub objective_before: f64,
    pub objective: f64,
    pub gradient_norm: f64,
    pub step_norm: f64,
    pub cg_iterations: usize,
    pub cg_converged: bool,
    pub line_search_iterations: usize,
    pub accepted: bool,
    /// Parameters in the binding set.
    pub n_active: usize,
}

#[derive(Debug, Clone)]
pub struct ProjectedGnCg {
    config: OptimizerConfig,
}

impl ProjectedGnCg {
    pub fn new(config: OptimizerConfig) -> PgiResult<Self> {
        config.validate()?;
        Ok(ProjectedGnCg { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Clip into `[lower, upper]`.
    pub fn project(&self, model: &Array1<f64>) -> Array1<f64> {
        let (lo, hi) = (self.config.lower_bound(), self.config.upper_bound());
        model.mapv(|v| v.clamp(lo, hi))
    }

    fn binding_set(&self, model: &Array1<f64>, gradient: &Array1<f64>) -> Vec<bool> {
        let (lo, hi) = (self.config.lower_bound(), self.config.upper_bound());
        model
            .iter()
            .zip(gradient.iter())
            .map(|(m, g)| (*m <= lo + BOUND_SLACK && *g > 0.0) || (*m >= hi - BOUND_SLACK && *g < 0.0))
            .collect()
    }

    pub fn step(&self, problem: &InverseProblem, state: &InversionState) -> PgiResult<StepReport> {
        let weights = ObjectiveWeights::from_state(state);
        let model = &state.model;
        let eval = problem.evaluate(model, &weights)?;
        let gradient = eval.gradient;
        let active = self.binding_set(model, &gradient);
        let n_active = active.iter().filter(|a| **a).count();

        let freeze = |v: &Array1<f64>| -> Array1<f64> {
            let mut out = v.clone();
            for (x, a) in out.iter_mut().zip(active.iter()) {
                if *a {
                    *x = 0.0;
                }
            }
            out
        };

        let rhs = freeze(&gradient.mapv(|g| -g));
        let gradient_norm = rhs.dot(&rhs).sqrt();

        let diag = problem.hessian_diag(model, &weights)?;
        let inv_diag: Array1<f64> = diag
            .iter()
            .zip(active.iter())
            .map(|(d, a)| if *a || *d <= 0.0 || !d.is_finite() { 1.0 } else { 1.0 / d })
            .collect();

        let mut apply_error = None;
        let cg_config = CgConfig {
            max_iter: self.config.max_iter_cg,
            tol: self.config.tol_cg,
        };
        let cg = pcg(
            |v| {
                let free = freeze(v);
                let mut hv = match problem.hessian_apply(model, &weights, &free) {
                    Ok(hv) => freeze(&hv),
                    Err(e) => {
                        apply_error.get_or_insert(e);
                        Array1::zeros(v.len())
                    }
                };
                for ((h, x), a) in hv.iter_mut().zip(v.iter()).zip(active.iter()) {
                    if *a {
                        *h = *x;
                    }
                }
                hv
            },
            &rhs,
            Some(&inv_diag),
            &cg_config,
        );
        if let Some(e) = apply_error {
            return Err(e);
        }
        if !cg.converged {
            warn!(
                iterations = cg.iterations,
                residual = cg.residual,
                "CG did not reach tolerance; using the partial solution"
            );
        }

        let mut direction = cg.solution;
        let not_descent =
            direction.dot(&gradient) >= 0.0 || direction.iter().any(|d| !d.is_finite());
        if gradient_norm > 0.0 && not_descent {
            warn!("CG direction is not a descent direction; falling back to steepest descent");
            direction = rhs.clone();
        }

        let mut t = 1.0;
        for ls in 1..=self.config.max_iter_ls {
            let trial = self.project(&(model + &(&direction * t)));
            let step = &trial - model;
            let value = match problem.value(&trial, &weights) {
                Ok(v) if v.is_finite() => v,
                Ok(_) | Err(PgiError::NumericalDegeneracy(_)) => {
                    t *= 0.5;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if value <= eval.value + self.config.armijo * gradient.dot(&step) {
                let step_norm = step.dot(&step).sqrt();
                debug!(
                    objective = value,
                    step_norm,
                    cg_iterations = cg.iterations,
                    line_search = ls,
                    n_active,
                    "Gauss-Newton step accepted"
                );
                return Ok(StepReport {
                    model: trial,
                    objective_before: eval.value,
                    objective: value,
                    gradient_norm,
                    step_norm,
                    cg_iterations: cg.iterations,
                    cg_converged: cg.converged,
                    line_search_iterations: ls,
                    accepted: true,
                    n_active,
                });
            }
            t *= 0.5;
        }

        warn!(
            max_iter_ls = self.config.max_iter_ls,
            "Line search failed; keeping the current model"
        );
        Ok(StepReport {
            model: model.clone(),
            objective_before: eval.value,
            objective: eval.value,
            gradient_norm,
            step_norm: 0.0,
            cg_iterations: cg.iterations,
            cg_converged: cg.converged,
            line_search_iterations: self.config.max_iter_ls,
            accepted: false,
            n_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::misfit::{ComboDataMisfit, L2DataMisfit, SurveyData};
    use crate::mixture::GaussianMixture;
    use crate::regularization::PgiRegularization;
    use crate::simulation::LinearSimulation;
    use ndarray::{array, Array2};
    use pgi_types::config::RegularizationConfig;
    use pgi_types::state::{
        AlphaSchedule, BetaSchedule, InversionStatus, MultiTargetState, Wires,
    };

    fn setup(dobs: Array1<f64>) -> (InverseProblem, InversionState) {
        let wires = Wires::uniform(1, 2).unwrap();
        let term = L2DataMisfit::new(
            Box::new(LinearSimulation::new(Array2::eye(2)).unwrap()),
            SurveyData::new(dobs, array![1.0, 1.0]).unwrap(),
            0,
        )
        .unwrap();
        let misfit = ComboDataMisfit::new(wires.clone(), vec![term]).unwrap();
        let gmm = GaussianMixture::new(array![1.0], array![[0.0]], vec![array![[1.0]]], vec![])
            .unwrap();
        let reg = PgiRegularization::new(wires, gmm, &RegularizationConfig::default(), None)
            .unwrap();
        let problem = InverseProblem::new(misfit, reg).unwrap();
        let model = Array1::zeros(2);
        let reference = problem.regularization().classify(&model).unwrap();
        let state = InversionState {
            iteration: 0,
            model,
            beta: BetaSchedule::new(1.0, 0.0, 10.0).unwrap(),
            alphas: AlphaSchedule {
                alpha_pgi: 1.0,
                alpha_x: vec![0.0],
            },
            misfit_multipliers: vec![1.0],
            reference,
            targets: MultiTargetState::default(),
            status: InversionStatus::Running,
            stop: false,
            step_accepted: true,
            history: Vec::new(),
        };
        (problem, state)
    }

    #[test]
    fn test_unconstrained_step_reaches_minimizer() {
        // ½|m − d|² + ½|m|² is minimized at d / 2.
        let (problem, state) = setup(array![2.0, -4.0]);
        let opt = ProjectedGnCg::new(OptimizerConfig {
            tol_cg: 1e-10,
            ..Default::default()
        })
        .unwrap();
        let report = opt.step(&problem, &state).unwrap();
        assert!(report.accepted);
        assert!(report.cg_converged);
        assert!((report.model[0] - 1.0).abs() < 1e-8);
        assert!((report.model[1] + 2.0).abs() < 1e-8);
        assert!(report.objective < report.objective_before);
    }

    #[test]
    fn test_bounds_are_respected_and_bind() {
        let (problem, mut state) = setup(array![2.0, -4.0]);
        let opt = ProjectedGnCg::new(OptimizerConfig {
            lower: Some(-0.5),
            upper: Some(0.5),
            ..Default::default()
        })
        .unwrap();
        let first = opt.step(&problem, &state).unwrap();
        assert!(first.model.iter().all(|v| (-0.5..=0.5).contains(v)));
        assert!((first.model[0] - 0.5).abs() < 1e-12);
        assert!((first.model[1] + 0.5).abs() < 1e-12);

        state.model = first.model;
        let second = opt.step(&problem, &state).unwrap();
        assert_eq!(second.n_active, 2);
        assert!(second.step_norm < 1e-12);
    }

    #[test]
    fn test_at_minimum_line_search_keeps_model() {
        let (problem, mut state) = setup(array![2.0, -4.0]);
        state.model = array![1.0, -2.0];
        let opt = ProjectedGnCg::new(OptimizerConfig::default()).unwrap();
        let report = opt.step(&problem, &state).unwrap();
        assert!(report.step_norm < 1e-12);
        assert_eq!(report.model, state.model);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(ProjectedGnCg::new(OptimizerConfig {
            lower: Some(1.0),
            upper: Some(0.0),
            ..Default::default()
        })
        .is_err());
    }
}
