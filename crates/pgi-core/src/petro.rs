// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Petrophysical Smallness
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Mixture-guided smallness term coupling every channel of a cell.
//!
//! For cell `i` with property vector `x_i`, sqrt weights
//! `D_i = diag(√w_{i,c})` and latent residual
//! `z_ik = D_i (φ_k(x_i) − μ_k)`:
//!
//! ```text
//! φ_petro = Σ_i Σ_k r_ik · ½ z_ikᵀ P_k z_ik
//! ```
//!
//! `r_ik` is the soft responsibility of the reference classification in
//! [`EvalMode::Exact`], and the indicator of the reference membership in
//! [`EvalMode::Approx`]. The Gauss-Newton Hessian is block diagonal with
//! one `d × d` block `Σ_k r_ik J_kᵀ D_i P_k D_i J_k` per cell.

use ndarray::{Array1, Array2, ArrayView1};
use pgi_types::config::EvalMode;
use pgi_types::constants::MIN_RESPONSIBILITY;
use pgi_types::error::{PgiError, PgiResult};
use pgi_types::state::{ReferenceModel, Wires};

use crate::mixture::{argmax, GaussianMixture};
use crate::regularization::validate_weight_map;

#[derive(Debug, Clone)]
pub struct PetroSmallness {
    wires: Wires,
    mixture: GaussianMixture,
    mode: EvalMode,
    /// `√w`, shape (n_cells, n_channels).
    sqrt_weights: Array2<f64>,
}

/// Contribution of one cell: value, gradient and Hessian block.
struct CellTerm {
    value: f64,
    gradient: Array1<f64>,
    hessian: Array2<f64>,
}

impl PetroSmallness {
    pub fn new(
        wires: Wires,
        mixture: GaussianMixture,
        mode: EvalMode,
        cell_weights: Option<&[Array1<f64>]>,
    ) -> PgiResult<Self> {
        let n_cells = wires.n_cells()?;
        let d = wires.n_channels();
        if mixture.dim() != d {
            return Err(PgiError::mismatch("mixture dimension", d, mixture.dim()));
        }
        let mut sqrt_weights = Array2::ones((n_cells, d));
        if let Some(weights) = cell_weights {
            if weights.len() != d {
                return Err(PgiError::mismatch("cell weight maps", d, weights.len()));
            }
            for (c, w) in weights.iter().enumerate() {
                validate_weight_map(&wires.channels()[c].name, w, n_cells)?;
                sqrt_weights.column_mut(c).assign(&w.mapv(f64::sqrt));
            }
        }
        Ok(PetroSmallness {
            wires,
            mixture,
            mode,
            sqrt_weights,
        })
    }

    pub fn mixture(&self) -> &GaussianMixture {
        &self.mixture
    }

    pub fn eval_mode(&self) -> EvalMode {
        self.mode
    }

    pub fn n_cells(&self) -> usize {
        self.sqrt_weights.nrows()
    }

    /// Classify every cell of `model` under the mixture.
    pub fn classify(&self, model: &Array1<f64>) -> PgiResult<ReferenceModel> {
        let cells = self.wires.cell_matrix(model)?;
        let responsibilities = self.mixture.responsibilities(&cells)?;
        let membership: Vec<usize> = responsibilities
            .rows()
            .into_iter()
            .map(|r| argmax(&r.to_vec()))
            .collect();
        let mut reference_cells = Array2::zeros(cells.dim());
        for (i, &k) in membership.iter().enumerate() {
            reference_cells.row_mut(i).assign(&self.mixture.mean(k));
        }
        Ok(ReferenceModel {
            membership,
            responsibilities,
            reference: self.wires.from_cell_matrix(&reference_cells)?,
        })
    }

    fn check_reference(&self, reference: &ReferenceModel) -> PgiResult<()> {
        if reference.n_cells() != self.n_cells() {
            return Err(PgiError::mismatch(
                "reference cells",
                self.n_cells(),
                reference.n_cells(),
            ));
        }
        if reference.responsibilities.ncols() != self.mixture.n_components() {
            return Err(PgiError::mismatch(
                "reference components",
                self.mixture.n_components(),
                reference.responsibilities.ncols(),
            ));
        }
        Ok(())
    }

    /// Components contributing to cell `i` and their weights.
    fn cell_components(&self, reference: &ReferenceModel, i: usize) -> Vec<(usize, f64)> {
        match self.mode {
            EvalMode::Approx => vec![(reference.membership[i], 1.0)],
            EvalMode::Exact => reference
                .responsibilities
                .row(i)
                .iter()
                .enumerate()
                .filter(|(_, r)| **r >= MIN_RESPONSIBILITY)
                .map(|(k, r)| (k, *r))
                .collect(),
        }
    }

    fn cell_term(&self, x: ArrayView1<f64>, i: usize, reference: &ReferenceModel) -> CellTerm {
        let d = x.len();
        let sw = self.sqrt_weights.row(i);
        let mut term = CellTerm {
            value: 0.0,
            gradient: Array1::zeros(d),
            hessian: Array2::zeros((d, d)),
        };
        for (k, r) in self.cell_components(reference, i) {
            let p = self.mixture.precision(k);
            let z = (self.mixture.latent(k, x) - &self.mixture.mean(k)) * &sw;
            let pz = p.dot(&z);
            term.value += r * 0.5 * z.dot(&pz);
            // D J, then chain rule through the map.
            let mut dj = self.mixture.map(k).jacobian(x);
            for (mut row, s) in dj.rows_mut().into_iter().zip(sw.iter()) {
                row *= *s;
            }
            term.gradient.scaled_add(r, &dj.t().dot(&pz));
            term.hessian.scaled_add(r, &dj.t().dot(&p.dot(&dj)));
        }
        term
    }

    fn cell_terms(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
    ) -> PgiResult<(Array2<f64>, Vec<CellTerm>)> {
        self.check_reference(reference)?;
        let cells = self.wires.cell_matrix(model)?;
        let terms = cells
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, x)| self.cell_term(x, i, reference))
            .collect();
        Ok((cells, terms))
    }

    /// Alpha-free petrophysical misfit.
    pub fn value(&self, model: &Array1<f64>, reference: &ReferenceModel) -> PgiResult<f64> {
        Ok(self.evaluate(model, reference)?.0)
    }

    pub fn evaluate(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
    ) -> PgiResult<(f64, Array1<f64>)> {
        let (cells, terms) = self.cell_terms(model, reference)?;
        let mut value = 0.0;
        let mut grad_cells = Array2::zeros(cells.dim());
        for (i, term) in terms.iter().enumerate() {
            value += term.value;
            grad_cells.row_mut(i).assign(&term.gradient);
        }
        if !value.is_finite() || grad_cells.iter().any(|g| !g.is_finite()) {
            return Err(PgiError::NumericalDegeneracy(
                "Petrophysical term is not finite".to_string(),
            ));
        }
        Ok((value, self.wires.from_cell_matrix(&grad_cells)?))
    }

    pub fn hessian_apply(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
        v: &Array1<f64>,
    ) -> PgiResult<Array1<f64>> {
        let (cells, terms) = self.cell_terms(model, reference)?;
        let v_cells = self.wires.cell_matrix(v)?;
        let mut out = Array2::zeros(cells.dim());
        for (i, term) in terms.iter().enumerate() {
            out.row_mut(i).assign(&term.hessian.dot(&v_cells.row(i)));
        }
        self.wires.from_cell_matrix(&out)
    }

    pub fn hessian_diag(
        &self,
        model: &Array1<f64>,
        reference: &ReferenceModel,
    ) -> PgiResult<Array1<f64>> {
        let (cells, terms) = self.cell_terms(model, reference)?;
        let mut out = Array2::zeros(cells.dim());
        for (i, term) in terms.iter().enumerate() {
            out.row_mut(i).assign(&term.hessian.diag());
        }
        self.wires.from_cell_matrix(&out)
    }
}
