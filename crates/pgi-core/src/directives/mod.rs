// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Directives
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Phase objects run by the inversion driver around the optimizer.
//!
//! `initialize` runs once before the first iteration, in list order;
//! `end_iteration` runs after every accepted or rejected step, in list
//! order. Directives communicate only through [`InversionState`].

pub mod estimates;
pub mod reference;
pub mod schedule;
pub mod targets;

use rand::rngs::StdRng;

use pgi_types::error::PgiResult;
use pgi_types::state::InversionState;

use crate::problem::InverseProblem;

pub use estimates::{AlphaSmoothEstimate, BetaEstimate, ScalingEstimate};
pub use reference::UpdateReference;
pub use schedule::BetaAlphaSchedule;
pub use targets::MultiTargetMisfits;

pub trait Directive {
    fn name(&self) -> &'static str;

    fn initialize(
        &mut self,
        _problem: &InverseProblem,
        _state: &mut InversionState,
        _rng: &mut StdRng,
    ) -> PgiResult<()> {
        Ok(())
    }

    fn end_iteration(
        &mut self,
        _problem: &InverseProblem,
        _state: &mut InversionState,
    ) -> PgiResult<()> {
        Ok(())
    }
}
