//! Petrophysically guided joint inversion.
//!
//! Forward models and data misfits, the Gaussian-mixture cluster model
//! and its fit, the petrophysical regularizer, the schedule directives
//! and the Gauss-Newton driver.

pub mod directives;
pub mod fit;
pub mod inversion;
pub mod maps;
pub mod misfit;
pub mod mixture;
pub mod optimization;
pub mod petro;
pub mod problem;
pub mod regularization;
pub mod simulation;
pub mod smoothness;

#[cfg(test)]
mod testing;
