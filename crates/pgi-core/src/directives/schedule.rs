// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Beta Schedule
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Cooling and warming of the trade-off parameter against the
//! per-channel misfit bands, with channel balancing and the
//! petrophysical weight.
//!
//! Every `update_rate` iterations the schedule picks one action:
//!
//! - **cool** (`β /= rate_cooling · ratio`) when some channel is above
//!   `(1 + tol) · target`, the last step was accepted and the cooling
//!   trigger fires on the channels above target;
//! - **warm** (`β *= rate_warming`) when no channel is above its band
//!   and some channel is below `(1 − tol) · target`;
//! - **raise alpha** (`α_pgi *= rate_warming`, capped at
//!   `alpha_max_multiple` times its starting value) when every data
//!   channel is in band but the petrophysical target is not met.
//!
//! While any channel is off target, the multipliers of channels `1..`
//! are also rescaled by `√((φ_c / t_c) / (φ_0 / t_0))`, clamped to
//! `[1 / rate_cooling, rate_cooling]`, so the channels approach their
//! targets together.
//!
//! Beta is clamped by [`BetaSchedule`]. A change opposite to the previous
//! one is a reversal: both live rates drop to their square root, and past
//! `max_reversals` the inversion stops with
//! [`InversionStatus::ScheduleInstability`].
//!
//! [`BetaSchedule`]: pgi_types::state::BetaSchedule

use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use pgi_types::config::{CoolingRate, CoolingTrigger, ScheduleConfig};
use pgi_types::error::PgiResult;
use pgi_types::state::{InversionState, InversionStatus, MultiTargetState};

use super::Directive;
use crate::problem::InverseProblem;

/// Relative change below which a clamped update counts as no change.
const MIN_EFFECTIVE_CHANGE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Cooling,
    Warming,
}

/// Decision taken by the schedule for one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleAction {
    Hold,
    /// Cool by the live cooling rate times `ratio`.
    Cool { ratio: f64 },
    Warm,
    RaiseAlpha,
}

#[derive(Debug, Clone)]
pub struct BetaAlphaSchedule {
    config: ScheduleConfig,
    rate_cooling: f64,
    rate_warming: f64,
    alpha_ceiling: Option<f64>,
    last_direction: Option<Direction>,
    reversals: usize,
}

impl BetaAlphaSchedule {
    pub fn new(config: ScheduleConfig) -> Self {
        BetaAlphaSchedule {
            rate_cooling: config.rate_cooling,
            rate_warming: config.rate_warming,
            config,
            alpha_ceiling: None,
            last_direction: None,
            reversals: 0,
        }
    }

    pub fn reversals(&self) -> usize {
        self.reversals
    }

    /// Live (cooling, warming) rates after reversal damping.
    pub fn rates(&self) -> (f64, f64) {
        (self.rate_cooling, self.rate_warming)
    }

    fn trigger_fires(&self, targets: &MultiTargetState, above: &[usize]) -> bool {
        let current = targets.misfits();
        let previous = targets.previous_misfits();
        match self.config.cooling_trigger {
            CoolingTrigger::Plateau { min_decrease } => above
                .iter()
                .any(|&c| current[c] > (1.0 - min_decrease) * previous[c]),
            CoolingTrigger::Decrease { min_decrease } => above
                .iter()
                .all(|&c| current[c] <= (1.0 - min_decrease) * previous[c]),
        }
    }

    fn cooling_ratio(&self, targets: &MultiTargetState, above: &[usize]) -> f64 {
        match self.config.cooling_rate {
            CoolingRate::Fixed => 1.0,
            CoolingRate::MisfitRatio { max_ratio } => above
                .iter()
                .map(|&c| targets.misfits()[c] / targets.targets()[c])
                .fold(1.0_f64, f64::max)
                .min(max_ratio),
        }
    }

    /// Action for the current misfits; `accepted` is whether the last
    /// step passed its line search.
    pub fn decide(&self, targets: &MultiTargetState, accepted: bool) -> ScheduleAction {
        if targets.targets().is_empty() {
            return ScheduleAction::Hold;
        }
        let above = targets.above_channels();
        if !above.is_empty() {
            if accepted && self.trigger_fires(targets, &above) {
                return ScheduleAction::Cool {
                    ratio: self.cooling_ratio(targets, &above),
                };
            }
            return ScheduleAction::Hold;
        }
        if !targets.below_channels().is_empty() {
            return ScheduleAction::Warm;
        }
        if !targets.petro_met() {
            return ScheduleAction::RaiseAlpha;
        }
        ScheduleAction::Hold
    }

    /// Multiplier factors for channels `1..`, relative to channel 0.
    /// Channel 0 always keeps factor 1.
    pub fn balance_factors(&self, targets: &MultiTargetState) -> Vec<f64> {
        let misfits = targets.misfits();
        let goals = targets.targets();
        let reference = misfits.first().zip(goals.first()).map(|(m, t)| m / t);
        let limit = self.config.rate_cooling.max(1.0);
        misfits
            .iter()
            .zip(goals.iter())
            .enumerate()
            .map(|(c, (m, t))| match reference {
                Some(r0) if c > 0 && r0 > 0.0 && r0.is_finite() => {
                    let factor = ((m / t) / r0).sqrt();
                    if factor.is_finite() && factor > 0.0 {
                        factor.clamp(1.0 / limit, limit)
                    } else {
                        1.0
                    }
                }
                _ => 1.0,
            })
            .collect()
    }

    fn balance(&self, state: &mut InversionState) {
        let factors = self.balance_factors(&state.targets);
        if factors.len() != state.misfit_multipliers.len() || factors.iter().all(|f| *f == 1.0) {
            return;
        }
        for (mult, f) in state.misfit_multipliers.iter_mut().zip(factors.iter()) {
            *mult *= f;
        }
        debug!(
            iteration = state.iteration,
            multipliers = ?state.misfit_multipliers,
            "misfit multipliers rebalanced"
        );
    }

    fn raise_alpha(&mut self, state: &mut InversionState) {
        let ceiling = *self
            .alpha_ceiling
            .get_or_insert(state.alphas.alpha_pgi * self.config.alpha_max_multiple);
        let before = state.alphas.alpha_pgi;
        let next = (before * self.config.rate_warming).min(ceiling).max(0.0);
        if (next - before).abs() <= MIN_EFFECTIVE_CHANGE * before.max(1.0) {
            debug!(alpha_pgi = before, "alpha_pgi at its bound; unchanged");
            return;
        }
        state.alphas.alpha_pgi = next;
        info!(
            iteration = state.iteration,
            alpha_pgi = next,
            "petrophysical target unmet; alpha_pgi raised"
        );
    }

    fn move_beta(&mut self, state: &mut InversionState, direction: Direction, ratio: f64) {
        let reversal = self.last_direction.is_some_and(|last| last != direction);
        let (cooling, warming) = if reversal {
            (self.rate_cooling.sqrt(), self.rate_warming.sqrt())
        } else {
            (self.rate_cooling, self.rate_warming)
        };
        let factor = match direction {
            Direction::Cooling => 1.0 / (cooling * ratio),
            Direction::Warming => warming,
        };
        let before = state.beta.value();
        let applied = state.beta.scale(factor);
        if (applied - 1.0).abs() <= MIN_EFFECTIVE_CHANGE {
            debug!(beta = before, factor, "beta at its bound; unchanged");
            return;
        }
        info!(
            iteration = state.iteration,
            beta = state.beta.value(),
            ?direction,
            "beta updated"
        );
        self.last_direction = Some(direction);
        if !reversal {
            return;
        }
        self.rate_cooling = cooling;
        self.rate_warming = warming;
        self.reversals += 1;
        warn!(
            iteration = state.iteration,
            reversals = self.reversals,
            rate_cooling = cooling,
            rate_warming = warming,
            "beta schedule reversed direction"
        );
        if self.reversals > self.config.max_reversals {
            warn!(
                max_reversals = self.config.max_reversals,
                "beta schedule oscillates; stopping"
            );
            state.status = InversionStatus::ScheduleInstability;
            state.stop = true;
        }
    }
}

impl Directive for BetaAlphaSchedule {
    fn name(&self) -> &'static str {
        "beta_alpha_schedule"
    }

    fn initialize(
        &mut self,
        _problem: &InverseProblem,
        state: &mut InversionState,
        _rng: &mut StdRng,
    ) -> PgiResult<()> {
        self.rate_cooling = self.config.rate_cooling;
        self.rate_warming = self.config.rate_warming;
        self.alpha_ceiling = Some(state.alphas.alpha_pgi * self.config.alpha_max_multiple);
        self.last_direction = None;
        self.reversals = 0;
        Ok(())
    }

    fn end_iteration(&mut self, _problem: &InverseProblem, state: &mut InversionState) -> PgiResult<()> {
        if state.stop || state.iteration % self.config.update_rate != 0 {
            return Ok(());
        }
        if self.config.balance_channels && !state.targets.all_met() {
            self.balance(state);
        }
        match self.decide(&state.targets, state.step_accepted) {
            ScheduleAction::Hold => {}
            ScheduleAction::Cool { ratio } => self.move_beta(state, Direction::Cooling, ratio),
            ScheduleAction::Warm => self.move_beta(state, Direction::Warming, 1.0),
            ScheduleAction::RaiseAlpha => self.raise_alpha(state),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{small_problem, state_at, N_CELLS};
    use ndarray::Array1;
    use pgi_types::config::EvalMode;
    use rand::SeedableRng;

    fn tracker(misfits_before: &[f64], misfits: &[f64], petro_target: Option<f64>) -> MultiTargetState {
        let mut t = MultiTargetState::new(vec![10.0, 10.0], 0.1, 1, 100, petro_target).unwrap();
        t.prime(misfits_before);
        t.observe(1, misfits, 5.0);
        t
    }

    fn fixed(sched: &BetaAlphaSchedule, targets: &MultiTargetState) -> f64 {
        match sched.decide(targets, true) {
            ScheduleAction::Cool { ratio } => 1.0 / (sched.rates().0 * ratio),
            ScheduleAction::Warm => sched.rates().1,
            _ => 1.0,
        }
    }

    #[test]
    fn test_plateau_cools_only_when_stalled() {
        let sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_cooling: 4.0,
            ..Default::default()
        });
        // Large decrease: keep beta.
        assert_eq!(fixed(&sched, &tracker(&[100.0, 100.0], &[50.0, 50.0], None)), 1.0);
        // Channel 1 stalled above target: cool.
        assert_eq!(fixed(&sched, &tracker(&[100.0, 51.0], &[50.0, 50.5], None)), 0.25);
        // An in-band channel that stalls does not trigger cooling.
        assert_eq!(fixed(&sched, &tracker(&[100.0, 10.0], &[50.0, 10.0], None)), 1.0);
    }

    #[test]
    fn test_decrease_trigger_and_misfit_ratio() {
        let sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_cooling: 2.0,
            cooling_trigger: CoolingTrigger::Decrease { min_decrease: 0.1 },
            cooling_rate: CoolingRate::MisfitRatio { max_ratio: 3.0 },
            ..Default::default()
        });
        // Both above and decreasing; ratio capped at 3.
        assert_eq!(fixed(&sched, &tracker(&[100.0, 100.0], &[50.0, 20.0], None)), 1.0 / 6.0);
        // Only channel 1 is above: ratio 2, channel 0 undershoots.
        assert_eq!(fixed(&sched, &tracker(&[100.0, 100.0], &[5.0, 20.0], None)), 0.25);
        // Not decreasing: keep.
        assert_eq!(fixed(&sched, &tracker(&[30.0, 30.0], &[29.0, 29.0], None)), 1.0);
    }

    #[test]
    fn test_rejected_step_never_cools() {
        let sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_cooling: 4.0,
            ..Default::default()
        });
        let stalled = tracker(&[50.0, 50.0], &[50.0, 50.0], None);
        assert_eq!(sched.decide(&stalled, false), ScheduleAction::Hold);
        assert_eq!(sched.decide(&stalled, true), ScheduleAction::Cool { ratio: 1.0 });

        let problem = small_problem(EvalMode::Approx);
        let mut state = state_at(&problem, Array1::zeros(2 * N_CELLS));
        let mut sched = sched;
        state.iteration = 1;
        state.targets = stalled;
        state.step_accepted = false;
        sched.end_iteration(&problem, &mut state).unwrap();
        assert_eq!(state.beta.value(), 1.0);
        state.step_accepted = true;
        sched.end_iteration(&problem, &mut state).unwrap();
        assert_eq!(state.beta.value(), 0.25);
    }

    #[test]
    fn test_warming_only_without_channels_above() {
        let sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_warming: 1.5,
            ..Default::default()
        });
        assert_eq!(fixed(&sched, &tracker(&[9.5, 9.5], &[2.0, 3.0], None)), 1.5);
        // One channel in band, one below: still warm.
        assert_eq!(fixed(&sched, &tracker(&[9.5, 9.5], &[10.0, 3.0], None)), 1.5);
        // Within the band: no change.
        assert_eq!(sched.decide(&tracker(&[9.5, 9.5], &[9.5, 10.5], None), true), ScheduleAction::Hold);
        // Data in band, petro target 4 < 5 unmet: alpha, not beta.
        assert_eq!(
            sched.decide(&tracker(&[9.5, 9.5], &[9.5, 10.5], Some(4.0)), true),
            ScheduleAction::RaiseAlpha
        );
    }

    #[test]
    fn test_alpha_raised_up_to_ceiling() {
        let problem = small_problem(EvalMode::Approx);
        let mut state = state_at(&problem, Array1::zeros(2 * N_CELLS));
        let mut sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_warming: 2.0,
            alpha_max_multiple: 5.0,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(0);
        sched.initialize(&problem, &mut state, &mut rng).unwrap();
        state.targets = tracker(&[9.5, 9.5], &[9.5, 10.5], Some(4.0));

        let mut seen = Vec::new();
        for it in 1..=4 {
            state.iteration = it;
            sched.end_iteration(&problem, &mut state).unwrap();
            seen.push(state.alphas.alpha_pgi);
        }
        assert_eq!(seen, vec![2.0, 4.0, 5.0, 5.0]);
        assert_eq!(state.beta.value(), 1.0);
        assert_eq!(state.misfit_multipliers, vec![1.0, 1.0]);
        assert_eq!(sched.reversals(), 0);
    }

    #[test]
    fn test_balancing_moves_channels_together() {
        let problem = small_problem(EvalMode::Approx);
        let mut state = state_at(&problem, Array1::zeros(2 * N_CELLS));
        let mut sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_cooling: 2.0,
            ..Default::default()
        });
        // Channel 1 four times further off than channel 0.
        state.targets = tracker(&[50.0, 200.0], &[20.0, 80.0], None);
        state.iteration = 1;
        sched.end_iteration(&problem, &mut state).unwrap();
        assert_eq!(state.misfit_multipliers, vec![1.0, 2.0]);

        // Ratio 100 is clamped to rate_cooling; channel 0 never moves.
        let factors = sched.balance_factors(&tracker(&[1.0, 1.0], &[0.5, 50.0], None));
        assert_eq!(factors, vec![1.0, 2.0]);
        let factors = sched.balance_factors(&tracker(&[1.0, 1.0], &[12.0, 0.12], None));
        assert_eq!(factors, vec![1.0, 0.5]);

        // Disabled, or with both channels in band, multipliers stay put.
        let mut off = BetaAlphaSchedule::new(ScheduleConfig {
            balance_channels: false,
            ..Default::default()
        });
        state.misfit_multipliers = vec![1.0, 1.0];
        state.targets = tracker(&[50.0, 200.0], &[20.0, 80.0], None);
        off.end_iteration(&problem, &mut state).unwrap();
        assert_eq!(state.misfit_multipliers, vec![1.0, 1.0]);
        state.targets = tracker(&[10.0, 10.0], &[9.5, 10.8], None);
        sched.end_iteration(&problem, &mut state).unwrap();
        assert_eq!(state.misfit_multipliers, vec![1.0, 1.0]);
    }

    #[test]
    fn test_reversals_damp_rates_and_stop_inversion() {
        let problem = small_problem(EvalMode::Approx);
        let mut state = state_at(&problem, Array1::zeros(2 * N_CELLS));
        let mut sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_cooling: 16.0,
            rate_warming: 16.0,
            tolerance: 0.1,
            balance_channels: false,
            max_reversals: 2,
            ..Default::default()
        });
        let cool = tracker(&[50.0, 50.0], &[49.9, 49.9], None);
        let warm = tracker(&[5.0, 5.0], &[1.0, 1.0], None);

        let expected = [
            (16.0, 1.0 / 16.0),
            (4.0, 0.25),
            (2.0, 0.125),
            (2.0_f64.sqrt(), 0.125 * 2.0_f64.sqrt()),
        ];
        for (it, (rate, beta)) in (1..=4).zip(expected) {
            state.iteration = it;
            state.targets = if it % 2 == 1 { cool.clone() } else { warm.clone() };
            sched.end_iteration(&problem, &mut state).unwrap();
            assert!((sched.rates().0 - rate).abs() < 1e-12);
            assert!((state.beta.value() - beta).abs() < 1e-12, "iteration {it}");
        }
        assert_eq!(sched.reversals(), 3);
        assert!(state.stop);
        assert_eq!(state.status, InversionStatus::ScheduleInstability);
    }

    #[test]
    fn test_update_rate_skips_iterations() {
        let problem = small_problem(EvalMode::Approx);
        let mut state = state_at(&problem, Array1::zeros(2 * N_CELLS));
        let mut sched = BetaAlphaSchedule::new(ScheduleConfig {
            rate_cooling: 2.0,
            update_rate: 2,
            ..Default::default()
        });
        state.targets = tracker(&[50.0, 50.0], &[49.9, 49.9], None);
        state.iteration = 1;
        sched.end_iteration(&problem, &mut state).unwrap();
        assert_eq!(state.beta.value(), 1.0);
        state.iteration = 2;
        sched.end_iteration(&problem, &mut state).unwrap();
        assert_eq!(state.beta.value(), 0.5);
    }
}
