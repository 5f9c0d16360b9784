// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// ln(2π), used by Gaussian log-densities.
pub const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Mass floor added to every mixture component in the M-step
/// (matches the 10·eps guard of common EM implementations).
pub const MIN_COMPONENT_MASS: f64 = 10.0 * f64::EPSILON;

/// Responsibilities below this are skipped in the exact petrophysical term.
pub const MIN_RESPONSIBILITY: f64 = 1e-12;

/// Tolerance on mixture weights summing to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-8;

/// Tolerance on the max-normalization of a weight map.
pub const WEIGHT_MAP_TOLERANCE: f64 = 1e-9;

/// Bound-activity slack used by the projected optimizer.
pub const BOUND_SLACK: f64 = 1e-12;
