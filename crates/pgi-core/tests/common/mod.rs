// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Shared Scenario Fixture
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Two linear 1-D problems over 100 cells sharing exponential-cosine
//! kernels. The second property is a polynomial function of the first
//! inside two rock units.

#![allow(dead_code)]

use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use pgi_core::maps::{CouplingMap, PolynomialCouplingMap};
use pgi_core::misfit::{ComboDataMisfit, L2DataMisfit, SurveyData};
use pgi_core::mixture::GaussianMixture;
use pgi_core::problem::InverseProblem;
use pgi_core::regularization::PgiRegularization;
use pgi_core::simulation::{uniform_cell_centers, LinearSimulation};
use pgi_types::config::RegularizationConfig;
use pgi_types::state::Wires;

pub const N_CELLS: usize = 100;
pub const N_DATA: usize = 30;
pub const CELL_WIDTH: f64 = 0.01;
pub const UNIT_1: std::ops::Range<usize> = 20..41;
pub const UNIT_2: std::ops::Range<usize> = 41..57;

/// Coefficients of `m₂ − offset` as a polynomial in `m₁`, per unit.
pub const UNIT_1_POLY: [f64; 3] = [0.0, -2.0, 2.0];
pub const UNIT_2_POLY: [f64; 4] = [0.0, 3.0, 6.0, 4.0];

fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn linspace(start: f64, end: f64, n: usize) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| start + (end - start) * i as f64 / (n - 1) as f64)
}

pub struct Scenario {
    pub wires: Wires,
    pub simulation: LinearSimulation,
    pub truth: Array1<f64>,
    pub dobs: Vec<Array1<f64>>,
    pub cell_weights: Array1<f64>,
}

impl Scenario {
    pub fn new(noise_seed: u64) -> Self {
        let wires = Wires::uniform(2, N_CELLS).unwrap();
        let centers = uniform_cell_centers(N_CELLS, CELL_WIDTH);
        let jk = linspace(1.0, 60.0, N_DATA);
        let (p, q) = (-0.25, 0.25);
        let simulation = LinearSimulation::from_kernel(N_DATA, &centers, |k, x| {
            (p * jk[k] * x).exp() * (std::f64::consts::PI * q * jk[k] * x).cos()
        })
        .unwrap();

        let mut m1 = Array1::zeros(N_CELLS);
        m1.slice_mut(s![UNIT_1]).assign(&linspace(0.0, 1.0, UNIT_1.len()));
        m1.slice_mut(s![UNIT_2]).assign(&linspace(-1.0, 0.0, UNIT_2.len()));
        let mut m2 = Array1::zeros(N_CELLS);
        for i in UNIT_1 {
            m2[i] = 1.0 + polyval(&UNIT_1_POLY, m1[i]);
        }
        for i in UNIT_2 {
            m2[i] = -1.0 + polyval(&UNIT_2_POLY, m1[i]);
        }
        let truth = wires.stack(&[m1, m2]).unwrap();

        let mut rng = StdRng::seed_from_u64(noise_seed);
        let dobs = (0..2)
            .map(|c| {
                let clean = simulation.g().dot(&wires.project(&truth, c));
                clean.mapv(|d| {
                    let n: f64 = rng.sample(StandardNormal);
                    d + 0.01 * d.abs() * n
                })
            })
            .collect();
        let cell_weights = simulation.sensitivity_weights().unwrap();

        Scenario {
            wires,
            simulation,
            truth,
            dobs,
            cell_weights,
        }
    }

    /// Cells as rows of (property 1, property 2).
    pub fn samples(&self) -> Array2<f64> {
        self.wires.cell_matrix(&self.truth).unwrap()
    }

    /// Rock unit that generated every cell: 0 background, 1 and 2 the units.
    pub fn labels(&self) -> Vec<usize> {
        (0..N_CELLS)
            .map(|i| {
                if UNIT_1.contains(&i) {
                    1
                } else if UNIT_2.contains(&i) {
                    2
                } else {
                    0
                }
            })
            .collect()
    }

    /// Maps that straighten each unit into a constant second property.
    pub fn coupling_maps(&self) -> Vec<CouplingMap> {
        let inverse = |coeffs: &[f64]| {
            CouplingMap::Polynomial(PolynomialCouplingMap::with_yx(
                coeffs.iter().map(|c| -c).collect(),
            ))
        };
        vec![
            CouplingMap::Identity,
            inverse(&UNIT_1_POLY),
            inverse(&UNIT_2_POLY),
        ]
    }

    /// Observed-space starting means: background and the unit averages.
    pub fn unit_means(&self) -> Vec<Vec<f64>> {
        let samples = self.samples();
        let mean = |range: std::ops::Range<usize>| -> Vec<f64> {
            let block = samples.slice(s![range, ..]);
            (0..2)
                .map(|c| block.column(c).sum() / block.nrows() as f64)
                .collect()
        };
        vec![vec![0.0, 0.0], mean(UNIT_1), mean(UNIT_2)]
    }

    /// 1 % relative error on the observed data, no floor.
    pub fn misfit(&self) -> ComboDataMisfit {
        let terms = self
            .dobs
            .iter()
            .enumerate()
            .map(|(c, d)| {
                let data = SurveyData::from_relative_error(d.clone(), 0.01, 0.0).unwrap();
                L2DataMisfit::new(Box::new(self.simulation.clone()), data, c).unwrap()
            })
            .collect();
        ComboDataMisfit::new(self.wires.clone(), terms).unwrap()
    }

    pub fn problem(&self, mixture: GaussianMixture, config: &RegularizationConfig) -> InverseProblem {
        let reg = PgiRegularization::new(
            self.wires.clone(),
            mixture,
            config,
            Some(vec![self.cell_weights.clone(), self.cell_weights.clone()]),
        )
        .unwrap();
        InverseProblem::new(self.misfit(), reg).unwrap()
    }
}
