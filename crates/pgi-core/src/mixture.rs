// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Gaussian Mixture Cluster Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Gaussian mixture over the per-cell property vectors, one coupling
//! map per component.
//!
//! Component `k` scores a property vector `x` through its latent image
//! `φ_k(x)`: `ln w_k + ln N(φ_k(x); μ_k, Σ_k)`. Precisions and Cholesky
//! factors are cached at construction, so a constructed mixture is
//! always usable.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use pgi_math::linalg::{
    cholesky, cholesky_inverse, load_diagonal, log_det_cholesky, log_sum_exp, quadratic_form,
};
use pgi_types::constants::{LN_2PI, WEIGHT_SUM_TOLERANCE};
use pgi_types::error::{PgiError, PgiResult};

use crate::maps::CouplingMap;

/// Plain serialized form of a [`GaussianMixture`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixtureParams {
    pub weights: Vec<f64>,
    pub means: Vec<Vec<f64>>,
    pub covariances: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub maps: Vec<CouplingMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MixtureParams", into = "MixtureParams")]
pub struct GaussianMixture {
    weights: Array1<f64>,
    means: Array2<f64>,
    covariances: Vec<Array2<f64>>,
    maps: Vec<CouplingMap>,
    precisions: Vec<Array2<f64>>,
    log_dets: Vec<f64>,
}

impl GaussianMixture {
    /// Validate and cache a mixture. `maps` empty means identity maps.
    pub fn new(
        weights: Array1<f64>,
        means: Array2<f64>,
        covariances: Vec<Array2<f64>>,
        maps: Vec<CouplingMap>,
    ) -> PgiResult<Self> {
        let (k, d) = means.dim();
        if k == 0 || d == 0 {
            return Err(PgiError::ConfigError(
                "Mixture needs at least one component and one property".to_string(),
            ));
        }
        if weights.len() != k {
            return Err(PgiError::mismatch("mixture weights", k, weights.len()));
        }
        if covariances.len() != k {
            return Err(PgiError::mismatch("mixture covariances", k, covariances.len()));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(PgiError::ConfigError(
                "Mixture weights must be finite and >= 0".to_string(),
            ));
        }
        let total: f64 = weights.sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PgiError::ConfigError(format!(
                "Mixture weights must sum to 1, got {total}"
            )));
        }
        if means.iter().any(|v| !v.is_finite()) {
            return Err(PgiError::ConfigError(
                "Mixture means must be finite".to_string(),
            ));
        }
        let maps = if maps.is_empty() {
            vec![CouplingMap::Identity; k]
        } else {
            maps
        };
        if maps.len() != k {
            return Err(PgiError::mismatch("coupling maps", k, maps.len()));
        }
        for map in &maps {
            map.validate(d)?;
        }

        let mut precisions = Vec::with_capacity(k);
        let mut log_dets = Vec::with_capacity(k);
        for (component, cov) in covariances.iter().enumerate() {
            if cov.dim() != (d, d) {
                return Err(PgiError::mismatch(
                    format!("covariance {component} size"),
                    d,
                    cov.nrows(),
                ));
            }
            let l = cholesky(cov).map_err(|e| PgiError::DegenerateCluster {
                component,
                message: e.to_string(),
            })?;
            precisions.push(cholesky_inverse(&l));
            log_dets.push(log_det_cholesky(&l));
        }

        Ok(GaussianMixture {
            weights,
            means,
            covariances,
            maps,
            precisions,
            log_dets,
        })
    }

    /// Copy with `eps` added to every covariance diagonal.
    pub fn with_covariance_loading(&self, eps: f64) -> PgiResult<Self> {
        GaussianMixture::new(
            self.weights.clone(),
            self.means.clone(),
            self.covariances
                .iter()
                .map(|c| load_diagonal(c, eps))
                .collect(),
            self.maps.clone(),
        )
    }

    pub fn n_components(&self) -> usize {
        self.means.nrows()
    }

    pub fn dim(&self) -> usize {
        self.means.ncols()
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    pub fn mean(&self, k: usize) -> ArrayView1<f64> {
        self.means.row(k)
    }

    pub fn covariances(&self) -> &[Array2<f64>] {
        &self.covariances
    }

    pub fn precision(&self, k: usize) -> &Array2<f64> {
        &self.precisions[k]
    }

    pub fn maps(&self) -> &[CouplingMap] {
        &self.maps
    }

    pub fn map(&self, k: usize) -> &CouplingMap {
        &self.maps[k]
    }

    /// `φ_k(x)`
    pub fn latent(&self, k: usize, x: ArrayView1<f64>) -> Array1<f64> {
        self.maps[k].transform(x)
    }

    /// `ln w_k + ln N(φ_k(x); μ_k, Σ_k)` for every component.
    pub fn component_log_prob(&self, x: ArrayView1<f64>) -> Vec<f64> {
        let d = self.dim() as f64;
        (0..self.n_components())
            .map(|k| {
                let z = self.latent(k, x) - &self.means.row(k);
                let maha = quadratic_form(&self.precisions[k], z.view());
                self.weights[k].ln() - 0.5 * (d * LN_2PI + self.log_dets[k] + maha)
            })
            .collect()
    }

    fn check_samples(&self, samples: &Array2<f64>) -> PgiResult<()> {
        if samples.ncols() != self.dim() {
            return Err(PgiError::mismatch(
                "sample properties",
                self.dim(),
                samples.ncols(),
            ));
        }
        Ok(())
    }

    /// Posterior component probabilities, shape (n_samples, K).
    pub fn responsibilities(&self, samples: &Array2<f64>) -> PgiResult<Array2<f64>> {
        self.check_samples(samples)?;
        let mut resp = Array2::zeros((samples.nrows(), self.n_components()));
        for (i, x) in samples.rows().into_iter().enumerate() {
            let lp = self.component_log_prob(x);
            let norm = log_sum_exp(&lp);
            if !norm.is_finite() {
                return Err(PgiError::NumericalDegeneracy(format!(
                    "Sample {i} has zero likelihood under every component"
                )));
            }
            for (k, v) in lp.iter().enumerate() {
                resp[[i, k]] = (v - norm).exp();
            }
        }
        Ok(resp)
    }

    /// Most probable component of every sample.
    pub fn predict(&self, samples: &Array2<f64>) -> PgiResult<Vec<usize>> {
        self.check_samples(samples)?;
        Ok(samples
            .rows()
            .into_iter()
            .map(|x| argmax(&self.component_log_prob(x)))
            .collect())
    }

    /// Mixture log-density of every sample.
    pub fn score_samples(&self, samples: &Array2<f64>) -> PgiResult<Array1<f64>> {
        self.check_samples(samples)?;
        Ok(samples
            .rows()
            .into_iter()
            .map(|x| log_sum_exp(&self.component_log_prob(x)))
            .collect())
    }
}

/// Index of the largest value; ties and NaN resolve to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (k, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = k;
        }
    }
    best
}

impl TryFrom<MixtureParams> for GaussianMixture {
    type Error = PgiError;

    fn try_from(p: MixtureParams) -> PgiResult<Self> {
        let k = p.means.len();
        let d = p.means.first().map_or(0, Vec::len);
        if p.means.iter().any(|row| row.len() != d) {
            return Err(PgiError::ConfigError(
                "Mixture means have ragged rows".to_string(),
            ));
        }
        let means = Array2::from_shape_vec((k, d), p.means.into_iter().flatten().collect())
            .map_err(|e| PgiError::ConfigError(e.to_string()))?;
        let covariances = p
            .covariances
            .into_iter()
            .map(|rows| {
                let n = rows.len();
                if rows.iter().any(|r| r.len() != n) {
                    return Err(PgiError::ConfigError(
                        "Mixture covariances must be square".to_string(),
                    ));
                }
                Array2::from_shape_vec((n, n), rows.into_iter().flatten().collect())
                    .map_err(|e| PgiError::ConfigError(e.to_string()))
            })
            .collect::<PgiResult<Vec<_>>>()?;
        GaussianMixture::new(Array1::from(p.weights), means, covariances, p.maps)
    }
}

impl From<GaussianMixture> for MixtureParams {
    fn from(g: GaussianMixture) -> Self {
        MixtureParams {
            weights: g.weights.to_vec(),
            means: g.means.rows().into_iter().map(|r| r.to_vec()).collect(),
            covariances: g
                .covariances
                .iter()
                .map(|c| c.rows().into_iter().map(|r| r.to_vec()).collect())
                .collect(),
            maps: g.maps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::PolynomialCouplingMap;
    use ndarray::array;

    fn two_clusters() -> GaussianMixture {
        GaussianMixture::new(
            array![0.5, 0.5],
            array![[0.0, 0.0], [2.0, 2.0]],
            vec![Array2::eye(2) * 0.1, Array2::eye(2) * 0.1],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_log_prob_matches_closed_form() {
        let gmm = GaussianMixture::new(
            array![1.0],
            array![[1.0, -1.0]],
            vec![array![[2.0, 0.0], [0.0, 0.5]]],
            vec![],
        )
        .unwrap();
        let lp = gmm.component_log_prob(array![2.0, -1.0].view());
        // ln N = −ln 2π − ½ ln det − ½ (1/2)
        let expected = -LN_2PI - 0.5 * 1.0f64.ln() - 0.25;
        assert!((lp[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_responsibilities_rows_sum_to_one() {
        let gmm = two_clusters();
        let x = array![[0.1, -0.1], [1.0, 1.0], [2.2, 1.9]];
        let resp = gmm.responsibilities(&x).unwrap();
        for row in resp.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!((resp[[1, 0]] - 0.5).abs() < 1e-12);
        assert_eq!(gmm.predict(&x).unwrap(), vec![0, 0, 1]);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let cov = vec![Array2::eye(2), Array2::eye(2)];
        let means = array![[0.0, 0.0], [1.0, 1.0]];
        assert!(GaussianMixture::new(array![0.7, 0.7], means.clone(), cov.clone(), vec![]).is_err());
        assert!(GaussianMixture::new(array![-0.5, 1.5], means.clone(), cov, vec![]).is_err());
        let singular = vec![Array2::eye(2), array![[1.0, 1.0], [1.0, 1.0]]];
        let err = GaussianMixture::new(array![0.5, 0.5], means, singular, vec![]).unwrap_err();
        assert!(matches!(err, PgiError::DegenerateCluster { component: 1, .. }));
    }

    #[test]
    fn test_covariance_loading_keeps_means() {
        let gmm = two_clusters().with_covariance_loading(0.9).unwrap();
        assert!((gmm.covariances()[0][[0, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(gmm.means(), two_clusters().means());
    }

    #[test]
    fn test_mapped_component_scores_latent_image() {
        let map = CouplingMap::Polynomial(PolynomialCouplingMap::with_yx(vec![0.0, 2.0, -2.0]));
        let gmm = GaussianMixture::new(
            array![0.5, 0.5],
            array![[0.0, 0.0], [0.5, 1.0]],
            vec![Array2::eye(2) * 1e-2, array![[0.1, 0.0], [0.0, 1e-3]]],
            vec![CouplingMap::Identity, map],
        )
        .unwrap();
        // On the curve x₁ = 1 − 2x₀ + 2x₀², far from the first mean.
        let x = array![[0.8, 1.0 - 1.6 + 1.28]];
        assert_eq!(gmm.predict(&x).unwrap(), vec![1]);
    }

    #[test]
    fn test_json_roundtrip() {
        let map = CouplingMap::Polynomial(PolynomialCouplingMap::with_yx(vec![0.0, -3.0]));
        let gmm = GaussianMixture::new(
            array![0.25, 0.75],
            array![[0.0, 0.0], [1.0, 2.0]],
            vec![Array2::eye(2), array![[2.0, 0.3], [0.3, 1.0]]],
            vec![CouplingMap::Identity, map],
        )
        .unwrap();
        let json = serde_json::to_string(&gmm).unwrap();
        let back: GaussianMixture = serde_json::from_str(&json).unwrap();
        assert_eq!(back.means(), gmm.means());
        assert_eq!(back.covariances(), gmm.covariances());
        assert_eq!(back.maps(), gmm.maps());
        let bad = r#"{"weights":[1.0],"means":[[0.0]],"covariances":[[[-1.0]]]}"#;
        assert!(serde_json::from_str::<GaussianMixture>(bad).is_err());
    }
}
