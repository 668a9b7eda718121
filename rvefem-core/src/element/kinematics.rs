//! Strain-displacement layouts and model stiffness per element family.
//!
//! A B-matrix is described by a static table of [`BEntry`]s. Each entry adds
//! `sign * source_i` to `B[row, NDOFN * i + dof]` for every node `i`, where
//! `source_i` is a shape function value or one of its physical derivatives.

use crate::error::{Error, Result};
use crate::mesh::ElementType;
use nalgebra::DMatrix;

/// Quantity of node `i` an entry draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// `∂N_i/∂x`
    Dx,
    /// `∂N_i/∂y`
    Dy,
    /// `∂N_i/∂z`
    Dz,
    /// `N_i`
    N,
}

/// One term of a strain-displacement layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BEntry {
    pub row: usize,
    pub dof: usize,
    pub source: Source,
    pub sign: f64,
}

const fn entry(row: usize, dof: usize, source: Source, sign: f64) -> BEntry {
    BEntry { row, dof, source, sign }
}

/// Small-strain solid: `[εxx, εyy, εzz, γxy, γyz, γxz]` from `[UX, UY, UZ]`.
pub const SOLID: [BEntry; 9] = [
    entry(0, 0, Source::Dx, 1.0),
    entry(1, 1, Source::Dy, 1.0),
    entry(2, 2, Source::Dz, 1.0),
    entry(3, 0, Source::Dy, 1.0),
    entry(3, 1, Source::Dx, 1.0),
    entry(4, 1, Source::Dz, 1.0),
    entry(4, 2, Source::Dy, 1.0),
    entry(5, 0, Source::Dz, 1.0),
    entry(5, 2, Source::Dx, 1.0),
];

/// Mindlin plate: `[κx, κy, κxy, γxz, γyz]` from `[UZ, ROTX, ROTY]`.
pub const PLATE: [BEntry; 8] = [
    entry(0, 2, Source::Dx, 1.0),
    entry(1, 1, Source::Dy, -1.0),
    entry(2, 1, Source::Dx, -1.0),
    entry(2, 2, Source::Dy, 1.0),
    entry(3, 0, Source::Dx, 1.0),
    entry(3, 2, Source::N, 1.0),
    entry(4, 0, Source::Dy, 1.0),
    entry(4, 1, Source::N, -1.0),
];

/// Mindlin shell: `[εx, εy, γxy, κx, κy, κxy, γxz, γyz]` from
/// `[UX, UY, UZ, ROTX, ROTY, ROTZ]`.
pub const SHELL: [BEntry; 12] = [
    entry(0, 0, Source::Dx, 1.0),
    entry(1, 1, Source::Dy, 1.0),
    entry(2, 0, Source::Dy, 1.0),
    entry(2, 1, Source::Dx, 1.0),
    entry(3, 4, Source::Dx, 1.0),
    entry(4, 3, Source::Dy, -1.0),
    entry(5, 3, Source::Dx, -1.0),
    entry(5, 4, Source::Dy, 1.0),
    entry(6, 2, Source::Dx, 1.0),
    entry(6, 4, Source::N, 1.0),
    entry(7, 2, Source::Dy, 1.0),
    entry(7, 3, Source::N, -1.0),
];

/// Drilling constraint of the shell: `ROTZ - ½(∂UY/∂x - ∂UX/∂y)`.
///
/// Vanishes for rigid in-plane rotations.
pub const DRILLING: [BEntry; 3] = [
    entry(0, 5, Source::N, 1.0),
    entry(0, 0, Source::Dy, 0.5),
    entry(0, 1, Source::Dx, -0.5),
];

/// Factor applied to the in-plane shear membrane stiffness `A66` to obtain the
/// drilling penalty.
pub const DRILLING_FACTOR: f64 = 1e-3;

/// Shear correction factor of first-order shear deformation theory.
pub const SHEAR_CORRECTION: f64 = 5.0 / 6.0;

/// Fill a B-matrix from a layout table.
///
/// `grads` is `dim × n_nodes` with physical derivatives; rows beyond `dim`
/// are treated as zero.
pub fn strain_displacement(
    table: &[BEntry],
    n_rows: usize,
    ndofn: usize,
    shape: &[f64],
    grads: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n_nodes = shape.len();
    let mut b = DMatrix::zeros(n_rows, n_nodes * ndofn);
    for e in table {
        for i in 0..n_nodes {
            let value = match e.source {
                Source::N => shape[i],
                Source::Dx => grads[(0, i)],
                Source::Dy => grads[(1, i)],
                Source::Dz if grads.nrows() > 2 => grads[(2, i)],
                Source::Dz => 0.0,
            };
            b[(e.row, i * ndofn + e.dof)] += e.sign * value;
        }
    }
    b
}

/// Stiffness of the element's model strains from the material matrix.
///
/// Solids use the 6x6 matrix as-is. Plates get `diag(D, S)` and shells
/// `diag(A, D, S)` with `A = C₃·t`, `D = C₃·t³/12`, `S = C₂·t·5/6`, where
/// `C₃`/`C₂` are the in-plane and transverse-shear blocks of the 5x5
/// surface matrix.
pub fn model_stiffness(
    element_type: ElementType,
    hooke: &DMatrix<f64>,
    thickness: Option<f64>,
) -> Result<DMatrix<f64>> {
    if element_type.is_solid() {
        return Ok(hooke.clone());
    }
    let t = thickness.ok_or_else(|| {
        Error::Config(format!("{:?} blocks require a thickness", element_type))
    })?;
    if t <= 0.0 {
        return Err(Error::Config(format!(
            "thickness must be positive, got {}",
            t
        )));
    }
    let in_plane = hooke.view((0, 0), (3, 3)).clone_owned();
    let shear = hooke.view((3, 3), (2, 2)).clone_owned();
    let n = element_type.n_strains();
    let mut c = DMatrix::zeros(n, n);
    let bending_offset = if element_type == ElementType::ShellQ4 {
        c.view_mut((0, 0), (3, 3)).copy_from(&(&in_plane * t));
        3
    } else {
        0
    };
    c.view_mut((bending_offset, bending_offset), (3, 3))
        .copy_from(&(&in_plane * (t.powi(3) / 12.0)));
    c.view_mut((bending_offset + 3, bending_offset + 3), (2, 2))
        .copy_from(&(&shear * (t * SHEAR_CORRECTION)));
    Ok(c)
}

/// Per-DOF inertia weights multiplying `ρ NᵀN`.
pub fn inertia_weights(element_type: ElementType, thickness: Option<f64>) -> Vec<f64> {
    let t = thickness.unwrap_or(1.0);
    let rot = t.powi(3) / 12.0;
    match element_type {
        ElementType::Hex8 | ElementType::Tet4 => vec![1.0; 3],
        ElementType::PlateQ4 => vec![t, rot, rot],
        ElementType::ShellQ4 => vec![t, t, t, rot, rot, rot],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{HookeLayout, Material, MaterialModel};
    use approx::assert_relative_eq;

    #[test]
    fn test_tables_stay_in_bounds() {
        for (table, rows, ndofn) in [
            (&SOLID[..], 6, 3),
            (&PLATE[..], 5, 3),
            (&SHELL[..], 8, 6),
            (&DRILLING[..], 1, 6),
        ] {
            for e in table {
                assert!(e.row < rows);
                assert!(e.dof < ndofn);
            }
        }
    }

    #[test]
    fn test_solid_b_of_linear_field() {
        // u = (a·x, 0, 0) with constant gradient gives εxx = a only
        let shape = [0.25; 4];
        let grads = DMatrix::from_row_slice(3, 4, &[
            -1.0, 1.0, 0.0, 0.0,
            -1.0, 0.0, 1.0, 0.0,
            -1.0, 0.0, 0.0, 1.0,
        ]);
        let b = strain_displacement(&SOLID, 6, 3, &shape, &grads);
        // Tet vertices (0,0,0),(1,0,0),(0,1,0),(0,0,1), u_x = 2x
        let mut u = nalgebra::DVector::zeros(12);
        u[3] = 2.0;
        let eps = b * u;
        assert_relative_eq!(eps[0], 2.0, epsilon = 1e-14);
        for k in 1..6 {
            assert_relative_eq!(eps[k], 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_drilling_row_vanishes_for_rigid_rotation() {
        // Bilinear quad on the unit square at its centre
        let shape = [0.25; 4];
        let grads = DMatrix::from_row_slice(2, 4, &[
            -0.5, 0.5, 0.5, -0.5,
            -0.5, -0.5, 0.5, 0.5,
        ]);
        let xy = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let omega = 0.01;
        let mut u = nalgebra::DVector::zeros(24);
        for (i, &(x, y)) in xy.iter().enumerate() {
            u[6 * i] = -omega * y;
            u[6 * i + 1] = omega * x;
            u[6 * i + 5] = omega;
        }
        let d = strain_displacement(&DRILLING, 1, 6, &shape, &grads);
        assert_relative_eq!((d * &u)[0], 0.0, epsilon = 1e-15);
        let b = strain_displacement(&SHELL, 8, 6, &shape, &grads);
        assert_relative_eq!((b * u).norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_shell_model_stiffness_blocks() {
        let c = Material::new(1000.0, 0.3)
            .unwrap()
            .stiffness_matrix(HookeLayout::Surface)
            .unwrap();
        let t = 0.2;
        let k = model_stiffness(ElementType::ShellQ4, &c, Some(t)).unwrap();
        assert_eq!(k.shape(), (8, 8));
        assert_relative_eq!(k[(0, 0)], c[(0, 0)] * t, epsilon = 1e-10);
        assert_relative_eq!(k[(3, 4)], c[(0, 1)] * t.powi(3) / 12.0, epsilon = 1e-10);
        assert_relative_eq!(k[(6, 6)], c[(3, 3)] * t * 5.0 / 6.0, epsilon = 1e-10);
        assert_relative_eq!(k[(0, 3)], 0.0);
    }

    #[test]
    fn test_plate_model_stiffness_requires_thickness() {
        let c = DMatrix::identity(5, 5);
        assert!(matches!(
            model_stiffness(ElementType::PlateQ4, &c, None),
            Err(Error::Config(_))
        ));
        let k = model_stiffness(ElementType::PlateQ4, &c, Some(2.0)).unwrap();
        assert_eq!(k.shape(), (5, 5));
        assert_relative_eq!(k[(0, 0)], 8.0 / 12.0, epsilon = 1e-14);
        assert_relative_eq!(k[(3, 3)], 2.0 * 5.0 / 6.0, epsilon = 1e-14);
    }
}
