// ─────────────────────────────────────────────────────────────────────
// SCPN Joint Inversion — Petrophysical Coupling Maps
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-cluster maps from observed property space into the latent space
//! where a mixture component is Gaussian.
//!
//! A rock unit whose two properties follow a curved relationship is
//! straightened by a polynomial map, so one Gaussian can describe it.

use ndarray::{array, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use pgi_types::error::{PgiError, PgiResult};

/// Evaluate `Σ c_k x^k` (coefficients from low to high order).
fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Derivative of [`polyval`] with respect to `x`.
fn polyval_deriv(coeffs: &[f64], x: f64) -> f64 {
    coeffs
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .fold(0.0, |acc, (k, c)| acc * x + k as f64 * c)
}

/// Two-property polynomial map
///
/// ```text
/// latent₀ = p_xx(x₀) + p_xy(x₁)
/// latent₁ = p_yx(x₀) + p_yy(x₁)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolynomialCouplingMap {
    pub coeff_xx: Vec<f64>,
    pub coeff_xy: Vec<f64>,
    pub coeff_yx: Vec<f64>,
    pub coeff_yy: Vec<f64>,
}

impl Default for PolynomialCouplingMap {
    fn default() -> Self {
        Self {
            coeff_xx: vec![0.0, 1.0],
            coeff_xy: vec![0.0],
            coeff_yx: vec![0.0],
            coeff_yy: vec![0.0, 1.0],
        }
    }
}

impl PolynomialCouplingMap {
    /// Identity on the first property, `latent₁ = x₁ + p_yx(x₀)`.
    pub fn with_yx(coeff_yx: Vec<f64>) -> Self {
        Self {
            coeff_yx,
            ..Default::default()
        }
    }

    pub fn transform(&self, x: ArrayView1<f64>) -> Array1<f64> {
        array![
            polyval(&self.coeff_xx, x[0]) + polyval(&self.coeff_xy, x[1]),
            polyval(&self.coeff_yx, x[0]) + polyval(&self.coeff_yy, x[1]),
        ]
    }

    pub fn jacobian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        array![
            [
                polyval_deriv(&self.coeff_xx, x[0]),
                polyval_deriv(&self.coeff_xy, x[1])
            ],
            [
                polyval_deriv(&self.coeff_yx, x[0]),
                polyval_deriv(&self.coeff_yy, x[1])
            ],
        ]
    }

    fn coefficients(&self) -> impl Iterator<Item = &f64> {
        self.coeff_xx
            .iter()
            .chain(&self.coeff_xy)
            .chain(&self.coeff_yx)
            .chain(&self.coeff_yy)
    }
}

/// Map of one mixture component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouplingMap {
    #[default]
    Identity,
    Polynomial(PolynomialCouplingMap),
}

impl CouplingMap {
    pub fn is_identity(&self) -> bool {
        matches!(self, CouplingMap::Identity)
    }

    /// Check the map applies to `dim`-dimensional property vectors.
    pub fn validate(&self, dim: usize) -> PgiResult<()> {
        match self {
            CouplingMap::Identity => Ok(()),
            CouplingMap::Polynomial(p) => {
                if dim != 2 {
                    return Err(PgiError::ConfigError(format!(
                        "Polynomial coupling maps need 2 properties, got {dim}"
                    )));
                }
                if p.coefficients().any(|c| !c.is_finite()) {
                    return Err(PgiError::ConfigError(
                        "Polynomial coupling coefficients must be finite".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn transform(&self, x: ArrayView1<f64>) -> Array1<f64> {
        match self {
            CouplingMap::Identity => x.to_owned(),
            CouplingMap::Polynomial(p) => p.transform(x),
        }
    }

    /// `∂ latent / ∂ x`
    pub fn jacobian(&self, x: ArrayView1<f64>) -> Array2<f64> {
        match self {
            CouplingMap::Identity => Array2::eye(x.len()),
            CouplingMap::Polynomial(p) => p.jacobian(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyval_low_to_high() {
        assert!((polyval(&[1.0, 2.0, 3.0], 2.0) - 17.0).abs() < 1e-15);
        assert!((polyval_deriv(&[1.0, 2.0, 3.0], 2.0) - 14.0).abs() < 1e-15);
        assert_eq!(polyval(&[], 3.0), 0.0);
        assert_eq!(polyval_deriv(&[5.0], 3.0), 0.0);
    }

    #[test]
    fn test_default_polynomial_is_identity() {
        let map = CouplingMap::Polynomial(PolynomialCouplingMap::default());
        let x = array![0.3, -1.2];
        assert_eq!(map.transform(x.view()), x);
        assert_eq!(map.jacobian(x.view()), Array2::<f64>::eye(2));
    }

    #[test]
    fn test_straightens_quadratic_unit() {
        // x₁ = 1 − 2x₀ + 2x₀² is mapped onto the line latent₁ = 1.
        let map = CouplingMap::Polynomial(PolynomialCouplingMap::with_yx(vec![0.0, 2.0, -2.0]));
        for t in [0.0, 0.25, 0.5, 1.0] {
            let x = array![t, 1.0 - 2.0 * t + 2.0 * t * t];
            let z = map.transform(x.view());
            assert!((z[0] - t).abs() < 1e-15);
            assert!((z[1] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let map = PolynomialCouplingMap {
            coeff_xx: vec![0.1, 1.0, 0.5],
            coeff_xy: vec![0.0, -0.3],
            coeff_yx: vec![0.0, -3.0, -6.0, -4.0],
            coeff_yy: vec![0.0, 1.0],
        };
        let x = array![-0.4, 0.7];
        let jac = map.jacobian(x.view());
        let eps = 1e-6;
        for j in 0..2 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += eps;
            xm[j] -= eps;
            let fd = (map.transform(xp.view()) - map.transform(xm.view())) / (2.0 * eps);
            for i in 0..2 {
                assert!((fd[i] - jac[[i, j]]).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn test_validate_dimension_and_serde_tag() {
        let map = CouplingMap::Polynomial(PolynomialCouplingMap::with_yx(vec![0.0, 1.0]));
        assert!(map.validate(2).is_ok());
        assert!(map.validate(3).is_err());
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"kind\":\"polynomial\""));
        let back: CouplingMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
        let id: CouplingMap = serde_json::from_str(r#"{"kind":"identity"}"#).unwrap();
        assert!(id.is_identity());
    }
}
