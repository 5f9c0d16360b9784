// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::error::{PgiError, PgiResult};

/// Evaluation strategy of the petrophysical smallness term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// Soft responsibilities of every component.
    Exact,
    /// Single most-probable component per cell.
    #[default]
    Approx,
}

/// Initialization of the EM responsibilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixtureInit {
    #[default]
    KMeans,
    Random,
}

/// Gaussian-mixture fit options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureConfig {
    pub n_components: usize,
    /// Convergence tolerance on the mean log-likelihood lower bound.
    pub tol: f64,
    /// Diagonal loading added to every covariance.
    pub reg_covar: f64,
    pub max_iter: usize,
    pub n_init: usize,
    pub init: MixtureInit,
    /// Optional fixed starting means, one observed-space point per component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub means_init: Option<Vec<Vec<f64>>>,
    pub seed: u64,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            n_components: 1,
            tol: 1e-3,
            reg_covar: 1e-6,
            max_iter: 100,
            n_init: 1,
            init: MixtureInit::KMeans,
            means_init: None,
            seed: 0,
        }
    }
}

impl MixtureConfig {
    pub fn validate(&self) -> PgiResult<()> {
        if self.n_components == 0 {
            return Err(PgiError::ConfigError(
                "mixture.n_components must be >= 1".to_string(),
            ));
        }
        if !self.tol.is_finite() || self.tol <= 0.0 {
            return Err(PgiError::ConfigError(
                "mixture.tol must be finite and > 0".to_string(),
            ));
        }
        if !self.reg_covar.is_finite() || self.reg_covar < 0.0 {
            return Err(PgiError::ConfigError(
                "mixture.reg_covar must be finite and >= 0".to_string(),
            ));
        }
        if self.max_iter == 0 || self.n_init == 0 {
            return Err(PgiError::ConfigError(
                "mixture.max_iter and mixture.n_init must be >= 1".to_string(),
            ));
        }
        if let Some(means) = &self.means_init {
            if means.len() != self.n_components {
                return Err(PgiError::mismatch(
                    "mixture.means_init rows",
                    self.n_components,
                    means.len(),
                ));
            }
            if means.iter().flatten().any(|v| !v.is_finite()) {
                return Err(PgiError::ConfigError(
                    "mixture.means_init must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Projected Gauss-Newton / CG options. `max_iter` caps the outer loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iter: usize,
    pub tol_x: f64,
    pub max_iter_cg: usize,
    pub tol_cg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    pub max_iter_ls: usize,
    /// Sufficient-decrease constant of the Armijo line search.
    pub armijo: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iter: 20,
            tol_x: 1e-6,
            max_iter_cg: 100,
            tol_cg: 1e-3,
            lower: None,
            upper: None,
            max_iter_ls: 10,
            armijo: 1e-4,
        }
    }
}

impl OptimizerConfig {
    pub fn lower_bound(&self) -> f64 {
        self.lower.unwrap_or(f64::NEG_INFINITY)
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper.unwrap_or(f64::INFINITY)
    }

    pub fn validate(&self) -> PgiResult<()> {
        if self.max_iter == 0 {
            return Err(PgiError::ConfigError(
                "optimizer.max_iter must be >= 1".to_string(),
            ));
        }
        if !self.tol_x.is_finite() || self.tol_x < 0.0 {
            return Err(PgiError::ConfigError(
                "optimizer.tol_x must be finite and >= 0".to_string(),
            ));
        }
        if self.max_iter_cg == 0 {
            return Err(PgiError::ConfigError(
                "optimizer.max_iter_cg must be >= 1".to_string(),
            ));
        }
        if !self.tol_cg.is_finite() || self.tol_cg <= 0.0 {
            return Err(PgiError::ConfigError(
                "optimizer.tol_cg must be finite and > 0".to_string(),
            ));
        }
        if self.lower_bound() >= self.upper_bound() {
            return Err(PgiError::ConfigError(format!(
                "optimizer bounds are empty: lower={}, upper={}",
                self.lower_bound(),
                self.upper_bound()
            )));
        }
        if self.max_iter_ls == 0 {
            return Err(PgiError::ConfigError(
                "optimizer.max_iter_ls must be >= 1".to_string(),
            ));
        }
        if !(self.armijo > 0.0 && self.armijo < 1.0) {
            return Err(PgiError::ConfigError(
                "optimizer.armijo must be in (0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegularizationConfig {
    pub eval_mode: EvalMode,
    /// Weight of the petrophysical smallness term.
    pub alpha_pgi: f64,
    /// Smoothness weight per channel; a single value applies to every channel.
    pub alpha_x: Vec<f64>,
    /// Uniform 1-D cell width.
    pub cell_width: f64,
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            eval_mode: EvalMode::Approx,
            alpha_pgi: 1.0,
            alpha_x: vec![0.0],
            cell_width: 1.0,
        }
    }
}

impl RegularizationConfig {
    pub fn validate(&self) -> PgiResult<()> {
        if !self.alpha_pgi.is_finite() || self.alpha_pgi < 0.0 {
            return Err(PgiError::ConfigError(
                "regularization.alpha_pgi must be finite and >= 0".to_string(),
            ));
        }
        if self.alpha_x.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(PgiError::ConfigError(
                "regularization.alpha_x must be finite and >= 0".to_string(),
            ));
        }
        if !self.cell_width.is_finite() || self.cell_width <= 0.0 {
            return Err(PgiError::ConfigError(
                "regularization.cell_width must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-channel smoothness weights, broadcasting a single value.
    pub fn alpha_x_for(&self, n_channels: usize) -> PgiResult<Vec<f64>> {
        broadcast("regularization.alpha_x", &self.alpha_x, n_channels)
    }
}

/// Expand a one-element list to `n` entries, or check it already has `n`.
pub fn broadcast(what: &str, values: &[f64], n: usize) -> PgiResult<Vec<f64>> {
    match values.len() {
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values.to_vec()),
        len => Err(PgiError::mismatch(what, n, len)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaEstimateConfig {
    /// Ratio of smoothness to petrophysical curvature, per channel.
    pub alpha0_ratio: Vec<f64>,
    pub ninit: usize,
    pub power_iterations: usize,
}

impl Default for AlphaEstimateConfig {
    fn default() -> Self {
        Self {
            alpha0_ratio: vec![1.0],
            ninit: 10,
            power_iterations: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingEstimateConfig {
    /// Relative weight of every channel after the first once curvatures are balanced.
    pub chi0_ratio: f64,
    pub ninit: usize,
    pub power_iterations: usize,
}

impl Default for ScalingEstimateConfig {
    fn default() -> Self {
        Self {
            chi0_ratio: 1.0,
            ninit: 10,
            power_iterations: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaEstimateConfig {
    pub beta0_ratio: f64,
    pub ninit: usize,
    pub power_iterations: usize,
}

impl Default for BetaEstimateConfig {
    fn default() -> Self {
        Self {
            beta0_ratio: 1.0,
            ninit: 10,
            power_iterations: 4,
        }
    }
}

fn validate_probes(what: &str, ninit: usize, power_iterations: usize) -> PgiResult<()> {
    if ninit == 0 {
        return Err(PgiError::ConfigError(format!("{what}.ninit must be >= 1")));
    }
    if power_iterations == 0 {
        return Err(PgiError::ConfigError(format!(
            "{what}.power_iterations must be >= 1"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Multiplier on the expected misfit 0.5·nD of every channel.
    pub chifact: f64,
    /// Optional multiplier on 0.5·n_params for the petrophysical target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chi_small: Option<f64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            chifact: 1.0,
            chi_small: None,
        }
    }
}

/// When the schedule is allowed to cool beta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoolingTrigger {
    /// Cool when a channel above target failed to drop by `min_decrease`.
    Plateau { min_decrease: f64 },
    /// Cool when the channels above target dropped by at least `min_decrease`.
    Decrease { min_decrease: f64 },
}

impl Default for CoolingTrigger {
    fn default() -> Self {
        CoolingTrigger::Plateau { min_decrease: 0.02 }
    }
}

/// Size of a cooling step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoolingRate {
    /// beta /= rate_cooling
    #[default]
    Fixed,
    /// beta /= rate_cooling · min(max_c misfit_c / target_c, max_ratio)
    MisfitRatio { max_ratio: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub rate_cooling: f64,
    pub rate_warming: f64,
    /// Relative tolerance around every misfit target.
    pub tolerance: f64,
    /// Update cadence; also the number of consecutive on-target iterations
    /// required to converge.
    pub update_rate: usize,
    /// Fraction of `optimizer.max_iter` that must elapse before convergence.
    pub progress: f64,
    pub cooling_trigger: CoolingTrigger,
    pub cooling_rate: CoolingRate,
    pub beta_min: f64,
    pub beta_max_multiple: f64,
    /// Upper bound on `alpha_pgi`, as a multiple of its starting value.
    pub alpha_max_multiple: f64,
    /// Rescale the misfit multipliers of channels `1..` toward the
    /// relative misfit of channel 0 while any channel is off target.
    pub balance_channels: bool,
    /// Beta direction reversals tolerated; each one also takes the
    /// square root of both live rates.
    pub max_reversals: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rate_cooling: 2.0,
            rate_warming: 1.0,
            tolerance: 0.0,
            update_rate: 1,
            progress: 0.02,
            cooling_trigger: CoolingTrigger::default(),
            cooling_rate: CoolingRate::Fixed,
            beta_min: 1e-10,
            beta_max_multiple: 1e3,
            alpha_max_multiple: 1e3,
            balance_channels: true,
            max_reversals: 8,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> PgiResult<()> {
        if !self.rate_cooling.is_finite() || self.rate_cooling < 1.0 {
            return Err(PgiError::ConfigError(
                "schedule.rate_cooling must be finite and >= 1".to_string(),
            ));
        }
        if !self.rate_warming.is_finite() || self.rate_warming < 1.0 {
            return Err(PgiError::ConfigError(
                "schedule.rate_warming must be finite and >= 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || !(0.0..1.0).contains(&self.tolerance) {
            return Err(PgiError::ConfigError(
                "schedule.tolerance must be finite and in [0, 1)".to_string(),
            ));
        }
        if self.update_rate == 0 {
            return Err(PgiError::ConfigError(
                "schedule.update_rate must be >= 1".to_string(),
            ));
        }
        if !self.progress.is_finite() || !(0.0..=1.0).contains(&self.progress) {
            return Err(PgiError::ConfigError(
                "schedule.progress must be finite and in [0, 1]".to_string(),
            ));
        }
        let min_decrease = match self.cooling_trigger {
            CoolingTrigger::Plateau { min_decrease } => min_decrease,
            CoolingTrigger::Decrease { min_decrease } => min_decrease,
        };
        if !min_decrease.is_finite() || !(0.0..1.0).contains(&min_decrease) {
            return Err(PgiError::ConfigError(
                "schedule.cooling_trigger.min_decrease must be in [0, 1)".to_string(),
            ));
        }
        if let CoolingRate::MisfitRatio { max_ratio } = self.cooling_rate {
            if !max_ratio.is_finite() || max_ratio < 1.0 {
                return Err(PgiError::ConfigError(
                    "schedule.cooling_rate.max_ratio must be finite and >= 1".to_string(),
                ));
            }
        }
        if !self.beta_min.is_finite() || self.beta_min < 0.0 {
            return Err(PgiError::ConfigError(
                "schedule.beta_min must be finite and >= 0".to_string(),
            ));
        }
        if !self.beta_max_multiple.is_finite() || self.beta_max_multiple < 1.0 {
            return Err(PgiError::ConfigError(
                "schedule.beta_max_multiple must be finite and >= 1".to_string(),
            ));
        }
        if !self.alpha_max_multiple.is_finite() || self.alpha_max_multiple < 1.0 {
            return Err(PgiError::ConfigError(
                "schedule.alpha_max_multiple must be finite and >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// First iteration at which convergence may be declared.
    pub fn min_iterations(&self, max_iter: usize) -> usize {
        ((self.progress * max_iter as f64).ceil() as usize).max(1)
    }
}

/// Full inversion setup. Estimates that are `None` are skipped; the
/// corresponding quantity then keeps its configured value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InversionConfig {
    pub seed: u64,
    /// Starting beta, used when no beta estimate is configured.
    pub initial_beta: f64,
    pub optimizer: OptimizerConfig,
    pub regularization: RegularizationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_estimate: Option<AlphaEstimateConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaling_estimate: Option<ScalingEstimateConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta_estimate: Option<BetaEstimateConfig>,
    pub targets: TargetConfig,
    pub schedule: ScheduleConfig,
    pub update_reference: bool,
}

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            initial_beta: 1.0,
            optimizer: OptimizerConfig::default(),
            regularization: RegularizationConfig::default(),
            alpha_estimate: None,
            scaling_estimate: None,
            beta_estimate: Some(BetaEstimateConfig::default()),
            targets: TargetConfig::default(),
            schedule: ScheduleConfig::default(),
            update_reference: true,
        }
    }
}

impl InversionConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> PgiResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PgiResult<()> {
        if !self.initial_beta.is_finite() || self.initial_beta <= 0.0 {
            return Err(PgiError::ConfigError(
                "initial_beta must be finite and > 0".to_string(),
            ));
        }
        self.optimizer.validate()?;
        self.regularization.validate()?;
        self.schedule.validate()?;
        if let Some(alpha) = &self.alpha_estimate {
            validate_probes("alpha_estimate", alpha.ninit, alpha.power_iterations)?;
            if alpha
                .alpha0_ratio
                .iter()
                .any(|r| !r.is_finite() || *r < 0.0)
            {
                return Err(PgiError::ConfigError(
                    "alpha_estimate.alpha0_ratio must be finite and >= 0".to_string(),
                ));
            }
        }
        if let Some(scaling) = &self.scaling_estimate {
            validate_probes("scaling_estimate", scaling.ninit, scaling.power_iterations)?;
            if !scaling.chi0_ratio.is_finite() || scaling.chi0_ratio <= 0.0 {
                return Err(PgiError::ConfigError(
                    "scaling_estimate.chi0_ratio must be finite and > 0".to_string(),
                ));
            }
        }
        if let Some(beta) = &self.beta_estimate {
            validate_probes("beta_estimate", beta.ninit, beta.power_iterations)?;
            if !beta.beta0_ratio.is_finite() || beta.beta0_ratio <= 0.0 {
                return Err(PgiError::ConfigError(
                    "beta_estimate.beta0_ratio must be finite and > 0".to_string(),
                ));
            }
        }
        if !self.targets.chifact.is_finite() || self.targets.chifact <= 0.0 {
            return Err(PgiError::ConfigError(
                "targets.chifact must be finite and > 0".to_string(),
            ));
        }
        if let Some(chi_small) = self.targets.chi_small {
            if !chi_small.is_finite() || chi_small <= 0.0 {
                return Err(PgiError::ConfigError(
                    "targets.chi_small must be finite and > 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}
