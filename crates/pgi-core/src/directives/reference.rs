// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Reference Update
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use tracing::debug;

use pgi_types::error::PgiResult;
use pgi_types::state::InversionState;

use super::Directive;
use crate::problem::InverseProblem;

/// Reclassifies every cell under the current model at the end of each
/// iteration. The mixture and its coupling maps stay fixed.
#[derive(Debug, Clone, Default)]
pub struct UpdateReference;

impl Directive for UpdateReference {
    fn name(&self) -> &'static str {
        "update_reference"
    }

    fn end_iteration(&mut self, problem: &InverseProblem, state: &mut InversionState) -> PgiResult<()> {
        let next = problem.regularization().classify(&state.model)?;
        let changed = next.changed_cells(&state.reference);
        debug!(iteration = state.iteration, changed, "reference model updated");
        state.reference = next;
        Ok(())
    }
}
