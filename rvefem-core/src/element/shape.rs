//! Reference cells and their linear Lagrange shape functions.
//!
//! # Node Numbering
//!
//! Quadrilateral, counterclockwise:
//! ```text
//! 3-------2
//! |       |
//! |       |
//! 0-------1      (-1,-1) (1,-1) (1,1) (-1,1)
//! ```
//!
//! Hexahedron, bottom face then top face:
//! ```text
//!        7-------6
//!       /|      /|
//!      / |     / |
//!     4-------5  |
//!     |  3----|--2
//!     | /     | /
//!     |/      |/
//!     0-------1
//! ```
//!
//! Tetrahedron: vertices (0,0,0), (1,0,0), (0,1,0), (0,0,1), with
//! `N = [1 - ξ - η - ζ, ξ, η, ζ]`.

use nalgebra::DMatrix;

const QUAD_XI: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const QUAD_ETA: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

const HEX_XI: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
const HEX_ETA: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
const HEX_ZETA: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

/// Reference cell of an element family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceCell {
    /// `[-1, 1]²`, bilinear.
    Quadrilateral,
    /// `[-1, 1]³`, trilinear.
    Hexahedron,
    /// Unit tetrahedron, linear.
    Tetrahedron,
}

impl ReferenceCell {
    /// Topological dimension.
    pub fn dim(self) -> usize {
        match self {
            ReferenceCell::Quadrilateral => 2,
            ReferenceCell::Hexahedron | ReferenceCell::Tetrahedron => 3,
        }
    }

    /// Number of nodes.
    pub fn n_nodes(self) -> usize {
        match self {
            ReferenceCell::Quadrilateral | ReferenceCell::Tetrahedron => 4,
            ReferenceCell::Hexahedron => 8,
        }
    }

    /// Shape function values at a point in natural coordinates.
    pub fn shape_functions(self, p: &[f64; 3]) -> Vec<f64> {
        let [xi, eta, zeta] = *p;
        match self {
            ReferenceCell::Quadrilateral => (0..4)
                .map(|i| 0.25 * (1.0 + QUAD_XI[i] * xi) * (1.0 + QUAD_ETA[i] * eta))
                .collect(),
            ReferenceCell::Hexahedron => (0..8)
                .map(|i| {
                    0.125
                        * (1.0 + HEX_XI[i] * xi)
                        * (1.0 + HEX_ETA[i] * eta)
                        * (1.0 + HEX_ZETA[i] * zeta)
                })
                .collect(),
            ReferenceCell::Tetrahedron => vec![1.0 - xi - eta - zeta, xi, eta, zeta],
        }
    }

    /// Shape function derivatives, `dim × n_nodes`; row `a` holds `∂N/∂ξ_a`.
    pub fn shape_derivatives(self, p: &[f64; 3]) -> DMatrix<f64> {
        let [xi, eta, zeta] = *p;
        match self {
            ReferenceCell::Quadrilateral => {
                let mut d = DMatrix::zeros(2, 4);
                for i in 0..4 {
                    d[(0, i)] = 0.25 * QUAD_XI[i] * (1.0 + QUAD_ETA[i] * eta);
                    d[(1, i)] = 0.25 * (1.0 + QUAD_XI[i] * xi) * QUAD_ETA[i];
                }
                d
            }
            ReferenceCell::Hexahedron => {
                let mut d = DMatrix::zeros(3, 8);
                for i in 0..8 {
                    let (a, b, c) = (HEX_XI[i], HEX_ETA[i], HEX_ZETA[i]);
                    d[(0, i)] = 0.125 * a * (1.0 + b * eta) * (1.0 + c * zeta);
                    d[(1, i)] = 0.125 * (1.0 + a * xi) * b * (1.0 + c * zeta);
                    d[(2, i)] = 0.125 * (1.0 + a * xi) * (1.0 + b * eta) * c;
                }
                d
            }
            ReferenceCell::Tetrahedron => DMatrix::from_row_slice(
                3,
                4,
                &[
                    -1.0, 1.0, 0.0, 0.0, //
                    -1.0, 0.0, 1.0, 0.0, //
                    -1.0, 0.0, 0.0, 1.0,
                ],
            ),
        }
    }

    /// Natural coordinates of the nodes, in node order.
    pub fn nodal_coords(self) -> Vec<[f64; 3]> {
        match self {
            ReferenceCell::Quadrilateral => {
                (0..4).map(|i| [QUAD_XI[i], QUAD_ETA[i], 0.0]).collect()
            }
            ReferenceCell::Hexahedron => {
                (0..8).map(|i| [HEX_XI[i], HEX_ETA[i], HEX_ZETA[i]]).collect()
            }
            ReferenceCell::Tetrahedron => vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
        }
    }

    /// Natural coordinates of the cell centre.
    pub fn center(self) -> [f64; 3] {
        match self {
            ReferenceCell::Quadrilateral | ReferenceCell::Hexahedron => [0.0; 3],
            ReferenceCell::Tetrahedron => [0.25; 3],
        }
    }
}
