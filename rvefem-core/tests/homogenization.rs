mod common;

use approx::assert_relative_eq;
use common::{quad_cells, solid_mesh, unit_square};
use nalgebra::Matrix3;
use rvefem_core::{
    homogenize, ElementBlock, ElementType, Frame, HomogenizationConfig, Hooke, Material, Mesh,
    OrthotropicLamina, PlateModel, Structure,
};

const E: f64 = 1000.0;
const NU: f64 = 0.3;

/// 2×2×2 Hex8 slab of unit thickness on `[0, 1]² × [-0.5, 0.5]`.
fn solid_slab() -> Structure {
    let material = Material::new(E, NU).unwrap();
    Structure::new(solid_mesh(
        [2, 2, 2],
        [0.0, 0.0, -0.5],
        [1.0, 1.0, 0.5],
        material,
    ))
}

#[test]
fn solid_slab_membrane_and_shear_stiffness() {
    let mut slab = solid_slab();
    let result = slab.homogenize("MR").unwrap();
    assert_eq!(result.model, PlateModel::MindlinReissner);
    assert_relative_eq!(result.area, 1.0);

    // Free faces let the slab contract through the thickness: plane stress
    let q = Material::new(E, NU).unwrap().constitutive_plane_stress();
    assert_relative_eq!(result.a(), q, epsilon = 1e-6 * q.amax());
    assert_relative_eq!(result.b(), Matrix3::zeros(), epsilon = 1e-6 * q.amax());

    let g = E / (2.0 * (1.0 + NU));
    let s = result.s().unwrap();
    // Periodic ties hold to about 1 / penalty_ratio
    assert_relative_eq!(s[(0, 0)], 5.0 / 6.0 * g, max_relative = 1e-5);
    assert_relative_eq!(s[(1, 1)], 5.0 / 6.0 * g, max_relative = 1e-5);
    assert_relative_eq!(s[(0, 1)], 0.0, epsilon = 1e-6 * g);

    let abds = result.abds().unwrap();
    assert_relative_eq!(abds, abds.transpose(), epsilon = 1e-6 * abds.amax());
}

#[test]
fn solid_slab_bending_lies_between_bounds() {
    let mut slab = solid_slab();
    let d = slab.homogenize("KL").unwrap().d();

    // Two layers relax the transverse normal stress only in part
    let q = Material::new(E, NU).unwrap().constitutive_plane_stress();
    let c11 = E * (1.0 - NU) / ((1.0 + NU) * (1.0 - 2.0 * NU));
    assert!(d[(0, 0)] >= q[(0, 0)] / 12.0 * (1.0 - 1e-6), "D11 = {}", d[(0, 0)]);
    assert!(d[(0, 0)] <= c11 / 12.0, "D11 = {}", d[(0, 0)]);
    assert_relative_eq!(d[(2, 2)], g_over_12(), max_relative = 1e-6);
    assert_relative_eq!(d[(0, 0)], d[(1, 1)], max_relative = 1e-9);
}

fn g_over_12() -> f64 {
    E / (2.0 * (1.0 + NU)) / 12.0
}

#[test]
fn homogenization_leaves_the_structure_reusable() {
    let mut slab = solid_slab();
    let first = slab.abd().unwrap();
    let second = slab.abd().unwrap();
    assert_relative_eq!(first, second, epsilon = 1e-12 * first.amax());
    assert_eq!(slab.mesh().fields().n_cases(), 1);
    assert!(slab.constraints().is_empty());
}

const SOFT: f64 = 100.0;
const STIFF: f64 = 1000.0;
const T: f64 = 0.1;

/// Unit-square shell cell of two strips along y: soft for `x < 0.5`,
/// stiff beyond. Both materials have `ν = 0`.
fn striped_cell() -> Structure {
    let mut mesh = unit_square(4, 2);
    let laminate = mesh.add_group(Mesh::ROOT, "strips").unwrap();
    let (soft, stiff): (Vec<_>, Vec<_>) = quad_cells(4, 2)
        .into_iter()
        .partition(|((i, _), _)| *i < 2);
    for (name, e, cells) in [("soft", SOFT, soft), ("stiff", STIFF, stiff)] {
        let cells = cells.into_iter().map(|(_, c)| c).collect();
        let block = ElementBlock::new(ElementType::ShellQ4, cells)
            .unwrap()
            .with_thickness(T)
            .unwrap();
        let id = mesh.add_block(laminate, name, block).unwrap();
        mesh.set_hooke(id, Hooke::model(Material::new(e, 0.0).unwrap()))
            .unwrap();
    }
    Structure::new(mesh)
}

/// One anchor at the centroid; periodicity in x and y removes the rotations.
fn centroid_anchor(model: &str) -> HomogenizationConfig {
    HomogenizationConfig::from_json(&format!(
        r#"{{ "model": "{}", "penalty_ratio": 1e7,
            "anchors": [{{ "target": "centroid", "dofs": [0, 1, 2] }}] }}"#,
        model
    ))
    .unwrap()
}

#[test]
fn striped_cell_membrane_bounds_are_attained() {
    let mut cell = striped_cell();
    let result = cell.homogenize("KL").unwrap();
    let a = result.a();

    let reuss = 2.0 * SOFT * STIFF / (SOFT + STIFF);
    let voigt = (SOFT + STIFF) / 2.0;
    // Strips in series across x, in parallel along y
    assert_relative_eq!(a[(0, 0)], reuss * T, max_relative = 1e-6);
    assert_relative_eq!(a[(1, 1)], voigt * T, max_relative = 1e-6);
    assert_relative_eq!(a[(0, 1)], 0.0, epsilon = 1e-6 * voigt * T);
    // The drilling penalty adds a little to the in-plane shear
    assert_relative_eq!(a[(2, 2)], reuss / 2.0 * T, max_relative = 1e-2);
}

#[test]
fn striped_cell_bending() {
    let mut cell = striped_cell();
    let result = homogenize(&mut cell, &centroid_anchor("MR")).unwrap();
    let d = result.d();

    let bending = T.powi(3) / 12.0;
    let reuss = 2.0 * SOFT * STIFF / (SOFT + STIFF);
    let voigt = (SOFT + STIFF) / 2.0;
    assert_relative_eq!(d[(1, 1)], voigt * bending, max_relative = 1e-6);
    assert!(d[(0, 0)] >= reuss * bending * (1.0 - 1e-6));
    assert!(d[(0, 0)] <= voigt * bending * (1.0 + 1e-6));
    assert_relative_eq!(result.b(), Matrix3::zeros(), epsilon = 1e-6 * voigt * T);
    assert!(result.abd().is_err());
}

/// `nx × ny` two-material cell, stiff where `i >= split`; `ν = 0.3` throughout.
fn split_cell(nx: usize, ny: usize, split: usize) -> Structure {
    let mut mesh = unit_square(nx, ny);
    for (name, e, stiff) in [("soft", SOFT, false), ("stiff", STIFF, true)] {
        let cells: Vec<Vec<usize>> = quad_cells(nx, ny)
            .into_iter()
            .filter(|((i, _), _)| (*i >= split) == stiff)
            .map(|(_, c)| c)
            .collect();
        let block = ElementBlock::new(ElementType::ShellQ4, cells)
            .unwrap()
            .with_thickness(T)
            .unwrap();
        let id = mesh.add_block(Mesh::ROOT, name, block).unwrap();
        mesh.set_hooke(id, Hooke::model(Material::new(e, NU).unwrap()))
            .unwrap();
    }
    Structure::new(mesh)
}

#[test]
fn thin_two_material_cells_solve_with_default_settings() {
    for (nx, ny, split) in [(4, 2, 2), (3, 3, 1)] {
        let mut cell = split_cell(nx, ny, split);
        let abds = cell
            .abds()
            .unwrap_or_else(|e| panic!("{}x{} cell: {}", nx, ny, e));
        assert_relative_eq!(abds, abds.transpose(), epsilon = 1e-6 * abds.amax());
        // Along the strips the layers act in parallel
        let fraction = (nx - split) as f64 / nx as f64;
        let voigt = SOFT + (STIFF - SOFT) * fraction;
        let a22 = abds[(1, 1)];
        assert!(a22 <= voigt / (1.0 - NU * NU) * T * (1.0 + 1e-6), "A22 = {}", a22);
        assert!(a22 >= SOFT / (1.0 - NU * NU) * T, "A22 = {}", a22);
        assert!(abds[(0, 0)] < a22, "A11 = {}", abds[(0, 0)]);
    }
}

#[test]
fn lamina_frames_rotate_the_membrane_stiffness() {
    let (e1, e2, nu12, g12) = (140.0, 10.0, 0.3, 5.0);
    let mut mesh = unit_square(2, 2);
    mesh.set_hooke(
        Mesh::ROOT,
        Hooke::model(OrthotropicLamina::new(e1, e2, nu12, g12, g12, 3.5).unwrap()),
    )
    .unwrap();
    // Fibres along global y
    let across = Frame::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let cells: Vec<Vec<usize>> = quad_cells(2, 2).into_iter().map(|(_, c)| c).collect();
    let block = ElementBlock::new(ElementType::ShellQ4, cells)
        .unwrap()
        .with_thickness(T)
        .unwrap()
        .with_frames(vec![across; 4])
        .unwrap();
    mesh.add_block(Mesh::ROOT, "ply", block).unwrap();

    let a = Structure::new(mesh).homogenize("KL").unwrap().a();
    let denom = 1.0 - nu12 * nu12 * e2 / e1;
    assert_relative_eq!(a[(1, 1)], e1 / denom * T, max_relative = 1e-6);
    assert_relative_eq!(a[(0, 0)], e2 / denom * T, max_relative = 1e-6);
    assert_relative_eq!(a[(0, 1)], nu12 * e2 / denom * T, max_relative = 1e-6);
    assert_relative_eq!(a[(2, 2)], g12 * T, max_relative = 1e-6);
}
