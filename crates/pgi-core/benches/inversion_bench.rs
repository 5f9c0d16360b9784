// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Regularizer and Gauss-Newton Step Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::{array, Array1, Array2};
use pgi_core::misfit::{ComboDataMisfit, L2DataMisfit, SurveyData};
use pgi_core::mixture::GaussianMixture;
use pgi_core::optimization::ProjectedGnCg;
use pgi_core::problem::InverseProblem;
use pgi_core::regularization::PgiRegularization;
use pgi_core::simulation::{uniform_cell_centers, LinearSimulation};
use pgi_types::config::{EvalMode, OptimizerConfig, RegularizationConfig};
use pgi_types::state::{
    AlphaSchedule, BetaSchedule, InversionState, InversionStatus, MultiTargetState, Wires,
};
use std::hint::black_box;

const N_CELLS: usize = 100;
const N_DATA: usize = 30;

fn synthetic_problem(mode: EvalMode) -> InverseProblem {
    let wires = Wires::uniform(2, N_CELLS).expect("valid wires");
    let centers = uniform_cell_centers(N_CELLS, 1.0 / N_CELLS as f64);
    let sim = LinearSimulation::from_kernel(N_DATA, &centers, |k, x| {
        let j = 1.0 + 59.0 * k as f64 / (N_DATA - 1) as f64;
        (-0.25 * j * x).exp() * (std::f64::consts::PI * 0.25 * j * x).cos()
    })
    .expect("valid kernel");
    let truth = Array1::from_shape_fn(N_CELLS, |i| if (30..60).contains(&i) { 1.0 } else { 0.0 });
    let terms = (0..2)
        .map(|c| {
            let scale = if c == 0 { 1.0 } else { -1.5 };
            let dobs = sim.g().dot(&(&truth * scale));
            let data = SurveyData::from_relative_error(dobs, 0.02, 1e-3).expect("valid data");
            L2DataMisfit::new(Box::new(sim.clone()), data, c).expect("valid misfit")
        })
        .collect();
    let misfit = ComboDataMisfit::new(wires.clone(), terms).expect("valid combo");
    let gmm = GaussianMixture::new(
        array![0.6, 0.3, 0.1],
        array![[0.0, 0.0], [1.0, -1.5], [-0.5, 1.0]],
        vec![
            Array2::eye(2) * 1e-3,
            array![[0.02, -0.01], [-0.01, 0.03]],
            Array2::eye(2) * 0.05,
        ],
        vec![],
    )
    .expect("valid mixture");
    let config = RegularizationConfig {
        eval_mode: mode,
        alpha_x: vec![0.1],
        cell_width: 1.0 / N_CELLS as f64,
        ..Default::default()
    };
    let weights = sim.sensitivity_weights().expect("sensitive kernel");
    let reg = PgiRegularization::new(wires, gmm, &config, Some(vec![weights.clone(), weights]))
        .expect("valid regularization");
    InverseProblem::new(misfit, reg).expect("valid problem")
}

fn starting_state(problem: &InverseProblem) -> InversionState {
    let model = Array1::from_shape_fn(2 * N_CELLS, |i| 0.1 * ((i as f64) * 0.37).sin());
    let reference = problem
        .regularization()
        .classify(&model)
        .expect("classification should succeed");
    InversionState {
        iteration: 0,
        model,
        beta: BetaSchedule::new(1e-2, 1e-10, 1e3).expect("valid beta"),
        alphas: AlphaSchedule {
            alpha_pgi: 1.0,
            alpha_x: vec![0.1, 0.1],
        },
        misfit_multipliers: vec![1.0, 1.0],
        reference,
        targets: MultiTargetState::default(),
        status: InversionStatus::Running,
        stop: false,
        step_accepted: true,
        history: Vec::new(),
    }
}

fn bench_regularization(c: &mut Criterion) {
    let mut group = c.benchmark_group("pgi_regularization_100x2");
    for (name, mode) in [("approx", EvalMode::Approx), ("exact", EvalMode::Exact)] {
        let problem = synthetic_problem(mode);
        let state = starting_state(&problem);
        let reg = problem.regularization();
        group.bench_function(format!("evaluate_{name}"), |b| {
            b.iter(|| {
                let eval = reg
                    .evaluate(&state.model, &state.reference, &state.alphas)
                    .expect("evaluation should succeed");
                black_box(eval.penalty)
            })
        });
        group.bench_function(format!("classify_{name}"), |b| {
            b.iter(|| black_box(reg.classify(&state.model).expect("classify").membership.len()))
        });
    }
    group.finish();
}

fn bench_gauss_newton_step(c: &mut Criterion) {
    let problem = synthetic_problem(EvalMode::Approx);
    let state = starting_state(&problem);
    let optimizer = ProjectedGnCg::new(OptimizerConfig::default()).expect("valid optimizer");
    let mut group = c.benchmark_group("projected_gn_cg");
    group.sample_size(20);
    group.bench_function("step_100x2", |b| {
        b.iter(|| {
            let report = optimizer.step(&problem, &state).expect("step should succeed");
            black_box(report.objective)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_regularization, bench_gauss_newton_step);
criterion_main!(benches);
