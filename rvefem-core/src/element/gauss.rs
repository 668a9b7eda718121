//! Gauss quadrature rules on the reference cells.
//!
//! Every rule is returned as a list of [`GaussPoint`]s holding natural
//! coordinates `[ξ, η, ζ]` and a weight scaled to the reference cell measure:
//!
//! - line `[-1, 1]`: weights sum to 2
//! - quadrilateral `[-1, 1]²`: weights sum to 4
//! - hexahedron `[-1, 1]³`: weights sum to 8
//! - unit tetrahedron: weights sum to 1/6, with `ξ = L2`, `η = L3`, `ζ = L4`

/// A quadrature point with natural coordinates and weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    /// Natural coordinates `[ξ, η, ζ]`; unused trailing entries are zero.
    pub coords: [f64; 3],
    /// Integration weight.
    pub weight: f64,
}

impl GaussPoint {
    pub fn new(coords: [f64; 3], weight: f64) -> Self {
        Self { coords, weight }
    }
}

/// 1D Gauss-Legendre points and weights on `[-1, 1]`.
///
/// # Panics
///
/// Panics if `n` is not in 1..=3.
pub fn gauss_1d(n: usize) -> Vec<(f64, f64)> {
    match n {
        1 => vec![(0.0, 2.0)],
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        _ => panic!("gauss_1d: n must be 1, 2, or 3, got {}", n),
    }
}

/// Tensor-product rule on `[-1, 1]²`, `n` points per direction.
pub fn gauss_quad(n: usize) -> Vec<GaussPoint> {
    let line = gauss_1d(n);
    let mut points = Vec::with_capacity(n * n);
    for &(eta, w_eta) in &line {
        for &(xi, w_xi) in &line {
            points.push(GaussPoint::new([xi, eta, 0.0], w_xi * w_eta));
        }
    }
    points
}

/// Tensor-product rule on `[-1, 1]³`, `n` points per direction.
pub fn gauss_hex(n: usize) -> Vec<GaussPoint> {
    let line = gauss_1d(n);
    let mut points = Vec::with_capacity(n * n * n);
    for &(zeta, w_zeta) in &line {
        for &(eta, w_eta) in &line {
            for &(xi, w_xi) in &line {
                points.push(GaussPoint::new([xi, eta, zeta], w_xi * w_eta * w_zeta));
            }
        }
    }
    points
}

/// Rule on the unit tetrahedron.
///
/// - n=1: centroid, exact for linear integrands
/// - n=4: exact for quadratic integrands (consistent mass of Tet4)
///
/// # Panics
///
/// Panics if `n` is not 1 or 4.
pub fn gauss_tet(n: usize) -> Vec<GaussPoint> {
    match n {
        1 => vec![GaussPoint::new([0.25, 0.25, 0.25], 1.0 / 6.0)],
        4 => {
            let sqrt5 = 5.0_f64.sqrt();
            let a = (5.0 + 3.0 * sqrt5) / 20.0;
            let b = (5.0 - sqrt5) / 20.0;
            let w = 1.0 / 24.0;
            vec![
                GaussPoint::new([b, b, b], w),
                GaussPoint::new([a, b, b], w),
                GaussPoint::new([b, a, b], w),
                GaussPoint::new([b, b, a], w),
            ]
        }
        _ => panic!("gauss_tet: n must be 1 or 4, got {}", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gauss_1d_integrates_polynomials() {
        // 2-point rule integrates x² exactly: ∫ x² dx = 2/3
        let rule = gauss_1d(2);
        let integral: f64 = rule.iter().map(|&(x, w)| x.powi(2) * w).sum();
        assert_relative_eq!(integral, 2.0 / 3.0, epsilon = 1e-14);

        // 3-point rule integrates x⁴ exactly: ∫ x⁴ dx = 2/5
        let rule = gauss_1d(3);
        let integral: f64 = rule.iter().map(|&(x, w)| x.powi(4) * w).sum();
        assert_relative_eq!(integral, 0.4, epsilon = 1e-14);
    }

    #[test]
    fn test_reference_measures() {
        for n in 1..=3 {
            let quad: f64 = gauss_quad(n).iter().map(|gp| gp.weight).sum();
            let hex: f64 = gauss_hex(n).iter().map(|gp| gp.weight).sum();
            assert_relative_eq!(quad, 4.0, epsilon = 1e-14);
            assert_relative_eq!(hex, 8.0, epsilon = 1e-14);
        }
        for n in [1, 4] {
            let tet: f64 = gauss_tet(n).iter().map(|gp| gp.weight).sum();
            assert_relative_eq!(tet, 1.0 / 6.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_gauss_tet_integrates_quadratic() {
        // ∫ ξ² dV over the unit tet = 1/60
        let integral: f64 = gauss_tet(4)
            .iter()
            .map(|gp| gp.coords[0].powi(2) * gp.weight)
            .sum();
        assert_relative_eq!(integral, 1.0 / 60.0, epsilon = 1e-14);
    }

    #[test]
    fn test_point_counts() {
        assert_eq!(gauss_quad(2).len(), 4);
        assert_eq!(gauss_hex(2).len(), 8);
        assert_eq!(gauss_tet(1).len(), 1);
    }

    #[test]
    #[should_panic(expected = "gauss_1d: n must be")]
    fn test_gauss_1d_invalid_n() {
        gauss_1d(5);
    }

    #[test]
    #[should_panic(expected = "gauss_tet: n must be")]
    fn test_gauss_tet_invalid_n() {
        gauss_tet(3);
    }
}
