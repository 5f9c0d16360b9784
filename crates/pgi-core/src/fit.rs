// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Gaussian Mixture EM Fit
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Expectation-maximization fit of a [`GaussianMixture`] to property
//! samples.
//!
//! Every component is fitted in its own latent space `φ_k(x)`, which lets
//! a coupling map straighten a curved rock unit before its Gaussian is
//! estimated. Full covariances receive `reg_covar` diagonal loading.
//! Restarts keep the fit with the best mean log-likelihood.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use pgi_math::linalg::log_sum_exp;
use pgi_types::config::{MixtureConfig, MixtureInit};
use pgi_types::constants::MIN_COMPONENT_MASS;
use pgi_types::error::{PgiError, PgiResult};

use crate::maps::CouplingMap;
use crate::mixture::GaussianMixture;

/// Lloyd iterations of the k-means initialization.
const KMEANS_MAX_ITER: usize = 100;

/// Outcome of a fit, including the EM diagnostics.
#[derive(Debug, Clone)]
pub struct MixtureFit {
    pub mixture: GaussianMixture,
    pub converged: bool,
    pub n_iter: usize,
    /// Mean per-sample log-likelihood at the last E-step.
    pub lower_bound: f64,
}

/// Fits Gaussian mixtures with optional per-component coupling maps.
#[derive(Debug, Clone)]
pub struct GaussianMixtureFitter {
    config: MixtureConfig,
    maps: Vec<CouplingMap>,
}

impl GaussianMixtureFitter {
    pub fn new(config: MixtureConfig) -> PgiResult<Self> {
        config.validate()?;
        let maps = vec![CouplingMap::Identity; config.n_components];
        Ok(GaussianMixtureFitter { config, maps })
    }

    pub fn with_maps(mut self, maps: Vec<CouplingMap>) -> PgiResult<Self> {
        if maps.len() != self.config.n_components {
            return Err(PgiError::mismatch(
                "coupling maps",
                self.config.n_components,
                maps.len(),
            ));
        }
        self.maps = maps;
        Ok(self)
    }

    pub fn config(&self) -> &MixtureConfig {
        &self.config
    }

    /// Fit and return the mixture only.
    pub fn fit(&self, samples: &Array2<f64>) -> PgiResult<GaussianMixture> {
        Ok(self.fit_detailed(samples)?.mixture)
    }

    pub fn fit_detailed(&self, samples: &Array2<f64>) -> PgiResult<MixtureFit> {
        let (n, d) = samples.dim();
        let k = self.config.n_components;
        if d == 0 {
            return Err(PgiError::ConfigError(
                "Samples need at least one property".to_string(),
            ));
        }
        if n < k {
            return Err(PgiError::ConfigError(format!(
                "Cannot fit {k} components to {n} samples"
            )));
        }
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(PgiError::ConfigError(
                "Samples contain non-finite values".to_string(),
            ));
        }
        for map in &self.maps {
            map.validate(d)?;
        }

        let latents: Vec<Array2<f64>> = self
            .maps
            .iter()
            .map(|map| latent_samples(map, samples))
            .collect();
        let means_override = self.latent_means_init(d)?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let n_runs = if means_override.is_some() {
            1
        } else {
            self.config.n_init
        };

        let mut best: Option<MixtureFit> = None;
        let mut last_error = None;
        for run in 0..n_runs {
            let resp0 = match &means_override {
                Some(means) => nearest_latent_mean(&latents, means),
                None => match self.config.init {
                    MixtureInit::KMeans => kmeans_responsibilities(samples, k, &mut rng),
                    MixtureInit::Random => random_responsibilities(n, k, &mut rng),
                },
            };
            match self.run_em(samples, &latents, &resp0, means_override.as_ref()) {
                Ok(fit) => {
                    debug!(
                        run,
                        lower_bound = fit.lower_bound,
                        n_iter = fit.n_iter,
                        converged = fit.converged,
                        "EM run finished"
                    );
                    if best
                        .as_ref()
                        .map_or(true, |b| fit.lower_bound > b.lower_bound)
                    {
                        best = Some(fit);
                    }
                }
                Err(e) => {
                    warn!(run, error = %e, "EM run degenerated");
                    last_error = Some(e);
                }
            }
        }

        let best = match (best, last_error) {
            (Some(fit), _) => fit,
            (None, Some(e)) => return Err(e),
            (None, None) => {
                return Err(PgiError::DegenerateCluster {
                    component: 0,
                    message: "no EM run completed".to_string(),
                })
            }
        };
        if !best.converged {
            warn!(
                max_iter = self.config.max_iter,
                lower_bound = best.lower_bound,
                "EM did not converge; consider a larger max_iter or tol"
            );
        }
        Ok(best)
    }

    /// `means_init` mapped into each component's latent space.
    fn latent_means_init(&self, d: usize) -> PgiResult<Option<Array2<f64>>> {
        let Some(points) = &self.config.means_init else {
            return Ok(None);
        };
        let k = self.config.n_components;
        let mut means = Array2::zeros((k, d));
        for (c, point) in points.iter().enumerate() {
            if point.len() != d {
                return Err(PgiError::mismatch(
                    format!("mixture.means_init[{c}] length"),
                    d,
                    point.len(),
                ));
            }
            let x = Array1::from(point.clone());
            means.row_mut(c).assign(&self.maps[c].transform(x.view()));
        }
        Ok(Some(means))
    }

    fn run_em(
        &self,
        samples: &Array2<f64>,
        latents: &[Array2<f64>],
        resp0: &Array2<f64>,
        means_override: Option<&Array2<f64>>,
    ) -> PgiResult<MixtureFit> {
        let mut mixture = self.m_step(latents, resp0, means_override)?;
        let mut lower_bound = f64::NEG_INFINITY;
        let mut converged = false;
        let mut n_iter = 0;

        for iter in 1..=self.config.max_iter {
            let (resp, bound) = e_step(&mixture, samples)?;
            mixture = self.m_step(latents, &resp, None)?;
            n_iter = iter;
            let change = bound - lower_bound;
            lower_bound = bound;
            if change.abs() < self.config.tol {
                converged = true;
                break;
            }
        }

        Ok(MixtureFit {
            mixture,
            converged,
            n_iter,
            lower_bound,
        })
    }

    fn m_step(
        &self,
        latents: &[Array2<f64>],
        resp: &Array2<f64>,
        means_override: Option<&Array2<f64>>,
    ) -> PgiResult<GaussianMixture> {
        let k = self.config.n_components;
        let d = latents[0].ncols();
        let mass: Array1<f64> = resp.sum_axis(ndarray::Axis(0)) + MIN_COMPONENT_MASS;
        let weights = &mass / mass.sum();

        let mut means = Array2::zeros((k, d));
        let mut covariances = Vec::with_capacity(k);
        for c in 0..k {
            let z = &latents[c];
            let r = resp.column(c);
            let mean = r.dot(z) / mass[c];
            let mut cov = Array2::<f64>::zeros((d, d));
            for (i, row) in z.rows().into_iter().enumerate() {
                let diff = &row - &mean;
                for a in 0..d {
                    for b in 0..d {
                        cov[[a, b]] += r[i] * diff[a] * diff[b];
                    }
                }
            }
            cov /= mass[c];
            cov.diag_mut().mapv_inplace(|v| v + self.config.reg_covar);
            covariances.push(cov);
            match means_override {
                Some(fixed) => means.row_mut(c).assign(&fixed.row(c)),
                None => means.row_mut(c).assign(&mean),
            }
        }

        GaussianMixture::new(weights, means, covariances, self.maps.clone())
    }
}

fn latent_samples(map: &CouplingMap, samples: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(samples.dim());
    for (i, x) in samples.rows().into_iter().enumerate() {
        out.row_mut(i).assign(&map.transform(x));
    }
    out
}

/// Responsibilities and mean log-likelihood.
fn e_step(mixture: &GaussianMixture, samples: &Array2<f64>) -> PgiResult<(Array2<f64>, f64)> {
    let n = samples.nrows();
    let mut resp = Array2::zeros((n, mixture.n_components()));
    let mut total = 0.0;
    for (i, x) in samples.rows().into_iter().enumerate() {
        let lp = mixture.component_log_prob(x);
        let norm = log_sum_exp(&lp);
        if !norm.is_finite() {
            return Err(PgiError::NumericalDegeneracy(format!(
                "Sample {i} has zero likelihood during EM"
            )));
        }
        for (c, v) in lp.iter().enumerate() {
            resp[[i, c]] = (v - norm).exp();
        }
        total += norm;
    }
    Ok((resp, total / n as f64))
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Hard assignment of every sample to the component whose latent image
/// of the sample is closest to that component's starting mean.
fn nearest_latent_mean(latents: &[Array2<f64>], means: &Array2<f64>) -> Array2<f64> {
    let n = latents[0].nrows();
    let k = latents.len();
    let mut resp = Array2::zeros((n, k));
    for i in 0..n {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for c in 0..k {
            let dist = squared_distance(latents[c].row(i), means.row(c));
            if dist < best_dist {
                best = c;
                best_dist = dist;
            }
        }
        resp[[i, best]] = 1.0;
    }
    resp
}

/// k-means++ seeding followed by Lloyd iterations, as one-hot responsibilities.
fn kmeans_responsibilities(samples: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = samples.nrows();
    let mut centers = Array2::zeros((k, samples.ncols()));
    centers.row_mut(0).assign(&samples.row(rng.gen_range(0..n)));

    let mut d2 = vec![f64::INFINITY; n];
    for c in 1..k {
        for (i, x) in samples.rows().into_iter().enumerate() {
            d2[i] = d2[i].min(squared_distance(x, centers.row(c - 1)));
        }
        let total: f64 = d2.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, w) in d2.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            rng.gen_range(0..n)
        };
        centers.row_mut(c).assign(&samples.row(pick));
    }

    let mut labels = vec![usize::MAX; n];
    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (i, x) in samples.rows().into_iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, center) in centers.rows().into_iter().enumerate() {
                let dist = squared_distance(x, center);
                if dist < best_dist {
                    best = c;
                    best_dist = dist;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        for c in 0..k {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
            if members.is_empty() {
                continue;
            }
            let mut center = Array1::zeros(samples.ncols());
            for &i in &members {
                center += &samples.row(i);
            }
            center /= members.len() as f64;
            centers.row_mut(c).assign(&center);
        }
    }

    let mut resp = Array2::zeros((n, k));
    for (i, &label) in labels.iter().enumerate() {
        resp[[i, label]] = 1.0;
    }
    resp
}

fn random_responsibilities(n: usize, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let mut resp = Array2::from_shape_fn((n, k), |_| rng.gen::<f64>());
    for mut row in resp.rows_mut() {
        let total = row.sum();
        row /= total;
    }
    resp
}
