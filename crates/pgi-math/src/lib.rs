//! Mathematical primitives for SCPN joint inversion.

pub mod cg;
pub mod eigen;
pub mod linalg;
