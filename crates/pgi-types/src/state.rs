// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::ops::Range;

use ndarray::{s, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{PgiError, PgiResult};

/// One named physical-property channel of a joint model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub len: usize,
}

/// Wiring map of a joint model: channel `c` occupies
/// `offset(c)..offset(c) + len(c)` of the concatenated vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wires {
    channels: Vec<Channel>,
}

impl Wires {
    pub fn new<S: Into<String>>(channels: impl IntoIterator<Item = (S, usize)>) -> PgiResult<Self> {
        let channels: Vec<Channel> = channels
            .into_iter()
            .map(|(name, len)| Channel {
                name: name.into(),
                len,
            })
            .collect();
        if channels.is_empty() {
            return Err(PgiError::ConfigError(
                "Wires require at least one channel".to_string(),
            ));
        }
        for (i, ch) in channels.iter().enumerate() {
            if ch.len == 0 {
                return Err(PgiError::ConfigError(format!(
                    "Channel '{}' has zero length",
                    ch.name
                )));
            }
            if channels[..i].iter().any(|other| other.name == ch.name) {
                return Err(PgiError::ConfigError(format!(
                    "Duplicate channel name '{}'",
                    ch.name
                )));
            }
        }
        Ok(Wires { channels })
    }

    /// `n_channels` channels of `n_cells` each, named m1, m2, ...
    pub fn uniform(n_channels: usize, n_cells: usize) -> PgiResult<Self> {
        Wires::new((1..=n_channels).map(|i| (format!("m{i}"), n_cells)))
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn total_len(&self) -> usize {
        self.channels.iter().map(|c| c.len).sum()
    }

    pub fn channel_len(&self, channel: usize) -> usize {
        self.channels[channel].len
    }

    pub fn offset(&self, channel: usize) -> usize {
        self.channels[..channel].iter().map(|c| c.len).sum()
    }

    pub fn range(&self, channel: usize) -> Range<usize> {
        let start = self.offset(channel);
        start..start + self.channels[channel].len
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    pub fn check_len(&self, model: &Array1<f64>) -> PgiResult<()> {
        if model.len() != self.total_len() {
            return Err(PgiError::mismatch(
                "joint model length",
                self.total_len(),
                model.len(),
            ));
        }
        Ok(())
    }

    /// Channel view of a joint vector.
    pub fn project<'a>(&self, model: &'a Array1<f64>, channel: usize) -> ArrayView1<'a, f64> {
        let range = self.range(channel);
        model.slice(s![range.start..range.end])
    }

    /// Joint vector that is zero outside `channel`.
    pub fn embed(&self, channel: usize, values: ArrayView1<f64>) -> Array1<f64> {
        let mut out = Array1::zeros(self.total_len());
        let range = self.range(channel);
        out.slice_mut(s![range.start..range.end]).assign(&values);
        out
    }

    /// Common channel length, required by cell-wise (petrophysical) terms.
    pub fn n_cells(&self) -> PgiResult<usize> {
        let n = self.channels[0].len;
        match self.channels.iter().find(|c| c.len != n) {
            Some(ch) => Err(PgiError::mismatch(
                format!("length of channel '{}'", ch.name),
                n,
                ch.len,
            )),
            None => Ok(n),
        }
    }

    /// Per-cell property matrix, shape (n_cells, n_channels).
    pub fn cell_matrix(&self, model: &Array1<f64>) -> PgiResult<Array2<f64>> {
        self.check_len(model)?;
        let n = self.n_cells()?;
        let mut out = Array2::zeros((n, self.n_channels()));
        for c in 0..self.n_channels() {
            out.column_mut(c).assign(&self.project(model, c));
        }
        Ok(out)
    }

    /// Inverse of [`Wires::cell_matrix`].
    pub fn from_cell_matrix(&self, cells: &Array2<f64>) -> PgiResult<Array1<f64>> {
        let n = self.n_cells()?;
        if cells.dim() != (n, self.n_channels()) {
            return Err(PgiError::mismatch(
                "cell matrix rows",
                n,
                cells.nrows(),
            ));
        }
        let mut out = Array1::zeros(self.total_len());
        for c in 0..self.n_channels() {
            let range = self.range(c);
            out.slice_mut(s![range.start..range.end])
                .assign(&cells.column(c));
        }
        Ok(out)
    }

    /// Concatenate per-channel vectors.
    pub fn stack(&self, parts: &[Array1<f64>]) -> PgiResult<Array1<f64>> {
        if parts.len() != self.n_channels() {
            return Err(PgiError::mismatch(
                "stacked channels",
                self.n_channels(),
                parts.len(),
            ));
        }
        let mut out = Vec::with_capacity(self.total_len());
        for (c, part) in parts.iter().enumerate() {
            if part.len() != self.channel_len(c) {
                return Err(PgiError::mismatch(
                    format!("length of channel '{}'", self.channels[c].name),
                    self.channel_len(c),
                    part.len(),
                ));
            }
            out.extend(part.iter().copied());
        }
        Ok(Array1::from(out))
    }
}

/// Serializable snapshot of a joint model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointModel {
    pub wires: Wires,
    pub values: Vec<f64>,
}

impl JointModel {
    pub fn new(wires: Wires, values: &Array1<f64>) -> PgiResult<Self> {
        wires.check_len(values)?;
        Ok(JointModel {
            wires,
            values: values.to_vec(),
        })
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.values.clone())
    }

    pub fn channel(&self, channel: usize) -> Array1<f64> {
        let range = self.wires.range(channel);
        Array1::from(self.values[range].to_vec())
    }
}

/// Per-cell classification of a joint model under the cluster model.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceModel {
    /// Most probable component per cell.
    pub membership: Vec<usize>,
    /// Responsibilities, shape (n_cells, n_components).
    pub responsibilities: Array2<f64>,
    /// Latent mean of each cell's membership, as a joint vector.
    pub reference: Array1<f64>,
}

impl ReferenceModel {
    pub fn n_cells(&self) -> usize {
        self.membership.len()
    }

    /// Number of cells whose membership differs from `other`.
    pub fn changed_cells(&self, other: &ReferenceModel) -> usize {
        self.membership
            .iter()
            .zip(other.membership.iter())
            .filter(|(a, b)| a != b)
            .count()
    }
}

/// Regularization weights adapted by the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaSchedule {
    pub alpha_pgi: f64,
    pub alpha_x: Vec<f64>,
}

/// Trade-off parameter with hard bounds `[beta_min, max_multiple · initial]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaSchedule {
    beta: f64,
    initial: f64,
    beta_min: f64,
    max_multiple: f64,
}

impl BetaSchedule {
    pub fn new(initial: f64, beta_min: f64, max_multiple: f64) -> PgiResult<Self> {
        if !initial.is_finite() || initial <= 0.0 {
            return Err(PgiError::ConfigError(format!(
                "beta must be finite and > 0, got {initial}"
            )));
        }
        if !beta_min.is_finite() || beta_min < 0.0 {
            return Err(PgiError::ConfigError(
                "beta_min must be finite and >= 0".to_string(),
            ));
        }
        if !max_multiple.is_finite() || max_multiple < 1.0 {
            return Err(PgiError::ConfigError(
                "beta_max_multiple must be finite and >= 1".to_string(),
            ));
        }
        Ok(BetaSchedule {
            beta: initial,
            initial,
            beta_min,
            max_multiple,
        })
    }

    pub fn value(&self) -> f64 {
        self.beta
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn upper_bound(&self) -> f64 {
        self.initial * self.max_multiple
    }

    pub fn lower_bound(&self) -> f64 {
        self.beta_min.min(self.upper_bound())
    }

    /// Restart from a fresh estimate, keeping the bounds policy.
    pub fn reset(&mut self, initial: f64) -> PgiResult<()> {
        *self = BetaSchedule::new(initial, self.beta_min, self.max_multiple)?;
        Ok(())
    }

    /// Multiply beta by `factor`, clamped into the bounds. Returns the
    /// factor actually applied; invalid factors leave beta untouched.
    pub fn scale(&mut self, factor: f64) -> f64 {
        if !factor.is_finite() || factor <= 0.0 {
            return 1.0;
        }
        let next = (self.beta * factor).clamp(self.lower_bound(), self.upper_bound());
        let applied = next / self.beta;
        self.beta = next;
        applied
    }
}

/// Per-channel misfit targets and the sustained all-met counter.
///
/// A channel is met while its misfit lies in the band
/// `[(1 - tolerance) · target, (1 + tolerance) · target]`; the optional
/// petrophysical target is an upper bound only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiTargetState {
    targets: Vec<f64>,
    tolerance: f64,
    sustain: usize,
    min_iterations: usize,
    petro_target: Option<f64>,
    misfits: Vec<f64>,
    previous_misfits: Vec<f64>,
    met: Vec<bool>,
    petro_met: bool,
    consecutive: usize,
    converged: bool,
}

impl MultiTargetState {
    pub fn new(
        targets: Vec<f64>,
        tolerance: f64,
        sustain: usize,
        min_iterations: usize,
        petro_target: Option<f64>,
    ) -> PgiResult<Self> {
        if targets.is_empty() {
            return Err(PgiError::ConfigError(
                "At least one misfit target is required".to_string(),
            ));
        }
        if targets.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(PgiError::ConfigError(
                "Misfit targets must be finite and > 0".to_string(),
            ));
        }
        let n = targets.len();
        Ok(MultiTargetState {
            targets,
            tolerance,
            sustain: sustain.max(1),
            min_iterations,
            petro_target,
            misfits: vec![f64::INFINITY; n],
            previous_misfits: vec![f64::INFINITY; n],
            met: vec![false; n],
            petro_met: petro_target.is_none(),
            consecutive: 0,
            converged: false,
        })
    }

    /// Record starting misfits without counting an iteration.
    pub fn prime(&mut self, misfits: &[f64]) {
        self.misfits = misfits.to_vec();
        self.previous_misfits = misfits.to_vec();
    }

    /// Record the misfits of `iteration`; returns whether the inversion
    /// has converged.
    pub fn observe(&mut self, iteration: usize, misfits: &[f64], petro: f64) -> bool {
        self.previous_misfits = std::mem::replace(&mut self.misfits, misfits.to_vec());
        self.met = misfits
            .iter()
            .zip(self.targets.iter())
            .map(|(m, t)| self.in_band(*m, *t))
            .collect();
        self.petro_met = self.petro_target.map_or(true, |t| petro <= t);

        if self.all_met() && self.petro_met {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.converged = self.consecutive >= self.sustain && iteration >= self.min_iterations;
        self.converged
    }

    fn in_band(&self, misfit: f64, target: f64) -> bool {
        (1.0 - self.tolerance) * target <= misfit && misfit <= (1.0 + self.tolerance) * target
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn misfits(&self) -> &[f64] {
        &self.misfits
    }

    pub fn previous_misfits(&self) -> &[f64] {
        &self.previous_misfits
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn met(&self, channel: usize) -> bool {
        self.met.get(channel).copied().unwrap_or(false)
    }

    pub fn all_met(&self) -> bool {
        !self.met.is_empty() && self.met.iter().all(|m| *m)
    }

    pub fn petro_met(&self) -> bool {
        self.petro_met
    }

    pub fn unmet_channels(&self) -> Vec<usize> {
        (0..self.targets.len()).filter(|&c| !self.met(c)).collect()
    }

    /// Channels whose misfit exceeds `(1 + tolerance) · target`.
    pub fn above_channels(&self) -> Vec<usize> {
        self.channels_where(|m, t| m > (1.0 + self.tolerance) * t)
    }

    /// Channels whose misfit fell below `(1 - tolerance) · target`.
    pub fn below_channels(&self) -> Vec<usize> {
        self.channels_where(|m, t| m < (1.0 - self.tolerance) * t)
    }

    fn channels_where(&self, pred: impl Fn(f64, f64) -> bool) -> Vec<usize> {
        self.misfits
            .iter()
            .zip(self.targets.iter())
            .enumerate()
            .filter(|(_, (m, t))| pred(**m, **t))
            .map(|(c, _)| c)
            .collect()
    }

    /// No channel is above its band and at least one is below it.
    pub fn undershoot(&self) -> bool {
        self.above_channels().is_empty() && !self.below_channels().is_empty()
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionStatus {
    #[default]
    Running,
    Converged,
    MaxIterations,
    Stalled,
    ScheduleInstability,
}

impl InversionStatus {
    pub fn is_converged(self) -> bool {
        matches!(self, InversionStatus::Converged)
    }
}

/// Summary of one outer iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub beta: f64,
    pub alpha_pgi: f64,
    pub misfit_multipliers: Vec<f64>,
    pub phi_d: Vec<f64>,
    pub phi_petro: f64,
    pub objective: f64,
    pub cg_iterations: usize,
    pub cg_converged: bool,
    pub step_norm: f64,
}

/// Typed state shared by the driver and the directives. The optimizer
/// only ever sees it by shared reference.
#[derive(Debug, Clone)]
pub struct InversionState {
    pub iteration: usize,
    pub model: Array1<f64>,
    pub beta: BetaSchedule,
    pub alphas: AlphaSchedule,
    pub misfit_multipliers: Vec<f64>,
    pub reference: ReferenceModel,
    pub targets: MultiTargetState,
    pub status: InversionStatus,
    pub stop: bool,
    /// Whether the last optimizer step passed its line search.
    pub step_accepted: bool,
    pub history: Vec<IterationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wires_layout() {
        let wires = Wires::new([("m1", 3), ("m2", 2)]).unwrap();
        assert_eq!(wires.total_len(), 5);
        assert_eq!(wires.offset(1), 3);
        assert_eq!(wires.range(1), 3..5);
        assert_eq!(wires.index_of("m2"), Some(1));
        let m = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(wires.project(&m, 1).to_vec(), vec![4.0, 5.0]);
        assert!(wires.n_cells().is_err());
    }

    #[test]
    fn test_wires_rejects_duplicates_and_empty() {
        assert!(Wires::new([("m1", 3), ("m1", 3)]).is_err());
        assert!(Wires::new([("m1", 0)]).is_err());
        assert!(Wires::new(Vec::<(String, usize)>::new()).is_err());
    }

    #[test]
    fn test_cell_matrix_roundtrip() {
        let wires = Wires::uniform(2, 3).unwrap();
        let m = Array1::from(vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]);
        let cells = wires.cell_matrix(&m).unwrap();
        assert_eq!(cells.row(1).to_vec(), vec![2.0, 20.0]);
        let back = wires.from_cell_matrix(&cells).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_beta_schedule_clamps() {
        let mut beta = BetaSchedule::new(10.0, 1.0, 4.0).unwrap();
        beta.scale(1e-6);
        assert!((beta.value() - 1.0).abs() < 1e-12);
        beta.scale(1e6);
        assert!((beta.value() - 40.0).abs() < 1e-12);
        assert!((beta.scale(-2.0) - 1.0).abs() < 1e-12);
        assert!((beta.value() - 40.0).abs() < 1e-12);
    }

    #[test]
    fn test_multi_target_sustain() {
        let mut state = MultiTargetState::new(vec![10.0, 10.0], 0.1, 2, 1, None).unwrap();
        assert!(!state.observe(1, &[9.5, 10.8], 0.0));
        assert_eq!(state.consecutive(), 1);
        assert!(state.observe(2, &[10.0, 9.1], 0.0));
        assert!(!state.observe(3, &[10.0, 50.0], 0.0));
        assert_eq!(state.unmet_channels(), vec![1]);
        assert_eq!(state.consecutive(), 0);
    }

    #[test]
    fn test_multi_target_band_rejects_overfit() {
        let mut state = MultiTargetState::new(vec![10.0, 10.0], 0.1, 1, 1, None).unwrap();
        assert!(!state.observe(1, &[5.0, 10.0], 0.0));
        assert!(!state.met(0));
        assert!(state.met(1));
        assert_eq!(state.below_channels(), vec![0]);
        assert!(state.above_channels().is_empty());
        assert!(state.undershoot());

        // Band edges are inclusive.
        assert!(state.observe(2, &[9.0, 11.0], 0.0));

        assert!(!state.observe(3, &[20.0, 1.0], 0.0));
        assert_eq!(state.above_channels(), vec![0]);
        assert_eq!(state.below_channels(), vec![1]);
        assert!(!state.undershoot());
    }

    #[test]
    fn test_zero_tolerance_needs_exact_target() {
        let mut state = MultiTargetState::new(vec![10.0], 0.0, 1, 1, None).unwrap();
        assert!(!state.observe(1, &[0.0], 0.0));
        assert!(state.observe(2, &[10.0], 0.0));
    }

    #[test]
    fn test_multi_target_petro_gate() {
        let mut state = MultiTargetState::new(vec![10.0], 0.05, 1, 1, Some(3.0)).unwrap();
        assert!(!state.observe(1, &[10.2], 4.0));
        assert!(state.all_met());
        assert!(!state.petro_met());
        // The petrophysical target has no lower edge.
        assert!(state.observe(2, &[9.8], 0.0));
    }

    #[test]
    fn test_joint_model_json() {
        let wires = Wires::uniform(2, 2).unwrap();
        let model = JointModel::new(wires, &Array1::from(vec![0.1, 0.2, 0.3, 0.4])).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: JointModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
        assert_eq!(back.channel(1).to_vec(), vec![0.3, 0.4]);
    }
}
