// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Unit Test Fixtures
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Small fixtures shared by the unit tests.

use ndarray::{array, Array1, Array2};
use pgi_types::config::{EvalMode, RegularizationConfig};
use pgi_types::state::{
    AlphaSchedule, BetaSchedule, InversionState, InversionStatus, MultiTargetState, Wires,
};

use crate::misfit::{ComboDataMisfit, L2DataMisfit, SurveyData};
use crate::mixture::GaussianMixture;
use crate::problem::InverseProblem;
use crate::regularization::PgiRegularization;
use crate::simulation::{uniform_cell_centers, LinearSimulation};

pub const N_CELLS: usize = 12;
pub const N_DATA: usize = 6;

/// Two channels of `N_CELLS` observed through decaying cosine kernels.
pub fn small_problem(mode: EvalMode) -> InverseProblem {
    let wires = Wires::uniform(2, N_CELLS).unwrap();
    let centers = uniform_cell_centers(N_CELLS, 1.0 / N_CELLS as f64);
    let sim = LinearSimulation::from_kernel(N_DATA, &centers, |k, x| {
        let j = 1.0 + 3.0 * k as f64;
        (-0.25 * j * x).exp() * (std::f64::consts::PI * 0.25 * j * x).cos()
    })
    .unwrap();
    let weights = sim.sensitivity_weights().unwrap();
    let truth = Array1::from_shape_fn(N_CELLS, |i| if (4..8).contains(&i) { 1.0 } else { 0.0 });
    let terms = (0..2)
        .map(|c| {
            let scale = if c == 0 { 1.0 } else { -2.0 };
            let dobs = sim.g().dot(&(&truth * scale));
            let data = SurveyData::from_relative_error(dobs, 0.05, 1e-3).unwrap();
            L2DataMisfit::new(Box::new(sim.clone()), data, c).unwrap()
        })
        .collect();
    let misfit = ComboDataMisfit::new(wires.clone(), terms).unwrap();
    let gmm = GaussianMixture::new(
        array![0.6, 0.4],
        array![[0.0, 0.0], [1.0, -2.0]],
        vec![Array2::eye(2) * 0.01, Array2::eye(2) * 0.02],
        vec![],
    )
    .unwrap();
    let config = RegularizationConfig {
        eval_mode: mode,
        cell_width: 1.0 / N_CELLS as f64,
        ..Default::default()
    };
    let reg = PgiRegularization::new(wires, gmm, &config, Some(vec![weights.clone(), weights]))
        .unwrap();
    InverseProblem::new(misfit, reg).unwrap()
}

pub fn state_at(problem: &InverseProblem, model: Array1<f64>) -> InversionState {
    let reference = problem.regularization().classify(&model).unwrap();
    InversionState {
        iteration: 0,
        model,
        beta: BetaSchedule::new(1.0, 1e-10, 1e3).unwrap(),
        alphas: AlphaSchedule {
            alpha_pgi: 1.0,
            alpha_x: vec![0.0; problem.wires().n_channels()],
        },
        misfit_multipliers: vec![1.0; problem.misfit().n_terms()],
        reference,
        targets: MultiTargetState::default(),
        status: InversionStatus::Running,
        stop: false,
        step_accepted: true,
        history: Vec::new(),
    }
}
