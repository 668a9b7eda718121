//! Parallel finite element assembly.
//!
//! Assembles global stiffness and mass matrices and the load array from the
//! block kernels. Element matrices are computed with Rayon; every worker
//! folds into its own triplet list and the lists are merged sequentially
//! before conversion to CSR.

use crate::element::kernel::BlockKernel;
use crate::error::{Error, Result};
use crate::mesh::{ElementType, Mesh};
use crate::sparse::{add_load_rows, CsrMatrix, LoadMatrix, TripletMatrix};
use log::{debug, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Assembly options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// Remove entries that sum to exactly zero from the sparsity pattern.
    pub drop_zeros: bool,
    /// Spread point masses over the neighbouring elements instead of adding
    /// them to the diagonal.
    pub distribute_point_masses: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            drop_zeros: true,
            distribute_point_masses: false,
        }
    }
}

/// Stiffness-quadrature kernels of every block, in leaf order.
pub fn block_kernels(mesh: &Mesh) -> Result<Vec<BlockKernel>> {
    mesh.leaf_blocks()
        .into_iter()
        .map(|id| BlockKernel::build(mesh, id))
        .collect()
}

/// Fold element matrices of one block into per-worker triplet lists.
fn fold_block<F>(kernel: &BlockKernel, n_dofs: usize, element_matrix: F) -> Vec<TripletMatrix>
where
    F: Fn(usize) -> Option<DMatrix<f64>> + Sync,
{
    (0..kernel.n_elements())
        .into_par_iter()
        .fold(
            || TripletMatrix::new(n_dofs, n_dofs),
            |mut triplets, e| {
                if let Some(me) = element_matrix(e) {
                    triplets.add_submatrix(&kernel.elements[e].dofs, &me);
                }
                triplets
            },
        )
        .collect()
}

fn merge(lists: Vec<TripletMatrix>, n_dofs: usize) -> TripletMatrix {
    let mut global = TripletMatrix::new(n_dofs, n_dofs);
    for list in lists {
        global.extend(list);
    }
    global
}

/// Assemble the global stiffness matrix.
pub fn assemble_stiffness(mesh: &Mesh, options: &AssemblyOptions) -> Result<CsrMatrix> {
    let kernels = block_kernels(mesh)?;
    assemble_stiffness_from(&kernels, mesh.n_dofs(), options)
}

/// Assemble the global stiffness matrix from prebuilt kernels.
pub fn assemble_stiffness_from(
    kernels: &[BlockKernel],
    n_dofs: usize,
    options: &AssemblyOptions,
) -> Result<CsrMatrix> {
    stiffness_triplets(kernels, n_dofs).to_csr(options.drop_zeros)
}

/// Unconverted stiffness triplets, for callers that add penalty terms.
pub fn stiffness_triplets(kernels: &[BlockKernel], n_dofs: usize) -> TripletMatrix {
    let mut lists = Vec::new();
    for kernel in kernels {
        debug!(
            "stiffness of block '{}': {} {:?} elements",
            kernel.name,
            kernel.n_elements(),
            kernel.element_type
        );
        lists.extend(fold_block(kernel, n_dofs, |e| Some(kernel.stiffness(e))));
    }
    merge(lists, n_dofs)
}

/// Local DOFs carrying translational inertia in this mesh.
fn translational_dofs(mesh: &Mesh) -> Vec<usize> {
    mesh.leaf_blocks()
        .first()
        .and_then(|&id| mesh.block(id))
        .map(|b| b.element_type().translational_dofs().to_vec())
        .unwrap_or_else(|| (0..mesh.ndofn().min(3)).collect())
}

/// Assemble the consistent mass matrix.
///
/// Elements without a density contribute nothing. Point masses are added to
/// the translational DOFs of their point, or with
/// [`AssemblyOptions::distribute_point_masses`] smeared over the elements
/// sharing the point in proportion to their measure.
pub fn assemble_mass(mesh: &Mesh, options: &AssemblyOptions) -> Result<CsrMatrix> {
    let n_dofs = mesh.n_dofs();
    let ndofn = mesh.ndofn();
    let kernels = mesh
        .leaf_blocks()
        .into_iter()
        .map(|id| BlockKernel::for_mass(mesh, id))
        .collect::<Result<Vec<_>>>()?;

    let point_masses = mesh.fields().point_masses();
    let extra_density = match (point_masses, options.distribute_point_masses) {
        (Some(masses), true) => Some(distribute_point_masses(mesh, &kernels, masses)?),
        _ => None,
    };

    let mut lists = Vec::new();
    for (b, kernel) in kernels.iter().enumerate() {
        let block = mesh
            .block(kernel.block)
            .ok_or_else(|| Error::Assembly(format!("block '{}' vanished", kernel.name)))?;
        let extra = extra_density.as_ref().map(|d| &d.per_block[b]);
        lists.extend(fold_block(kernel, n_dofs, |e| {
            let rho = block.density(e).unwrap_or(0.0) + extra.map_or(0.0, |x| x[e]);
            (rho != 0.0).then(|| kernel.mass(e, rho))
        }));
    }

    let mut global = merge(lists, n_dofs);
    if let Some(masses) = point_masses {
        let lumped = extra_density
            .as_ref()
            .map(|d| d.unplaced.clone())
            .unwrap_or_else(|| masses.to_vec());
        let dofs = translational_dofs(mesh);
        for (p, &m) in lumped.iter().enumerate() {
            for &d in &dofs {
                global.add(p * ndofn + d, p * ndofn + d, m);
            }
        }
    }
    global.to_csr(options.drop_zeros)
}

struct ExtraDensity {
    per_block: Vec<Vec<f64>>,
    /// Point masses that had no neighbouring element.
    unplaced: Vec<f64>,
}

fn distribute_point_masses(
    mesh: &Mesh,
    kernels: &[BlockKernel],
    masses: &[f64],
) -> Result<ExtraDensity> {
    let measures: Vec<Vec<f64>> = kernels.iter().map(|k| k.measures()).collect();

    // Total measure of the elements around every point
    let mut around = vec![0.0; masses.len()];
    for (kernel, vols) in kernels.iter().zip(&measures) {
        let block = mesh.block(kernel.block).ok_or_else(|| {
            Error::Assembly(format!("block '{}' vanished", kernel.name))
        })?;
        for (nodes, v) in block.connectivity().iter().zip(vols) {
            for &p in nodes {
                around[p] += v;
            }
        }
    }

    let mut per_block = Vec::with_capacity(kernels.len());
    for (kernel, vols) in kernels.iter().zip(&measures) {
        let block = mesh.block(kernel.block).ok_or_else(|| {
            Error::Assembly(format!("block '{}' vanished", kernel.name))
        })?;
        let et = kernel.element_type;
        let density = block
            .connectivity()
            .iter()
            .zip(vols)
            .enumerate()
            .map(|(e, (nodes, &v))| {
                // Mass share of the element, spread as ρ' with ∫ ρ' w_t dV = share
                let share: f64 = nodes
                    .iter()
                    .filter(|&&p| around[p] > 0.0)
                    .map(|&p| masses[p] * v / around[p])
                    .sum();
                let w_t = match et {
                    ElementType::Hex8 | ElementType::Tet4 => 1.0,
                    _ => block.thickness(e).unwrap_or(1.0),
                };
                if v > 0.0 {
                    share / (v * w_t)
                } else {
                    0.0
                }
            })
            .collect();
        per_block.push(density);
    }

    let unplaced: Vec<f64> = masses
        .iter()
        .zip(&around)
        .map(|(&m, &a)| if a > 0.0 { 0.0 } else { m })
        .collect();
    if unplaced.iter().any(|&m| m != 0.0) {
        warn!("point masses on points without elements are lumped on the diagonal");
    }
    Ok(ExtraDensity {
        per_block,
        unplaced,
    })
}

/// Assemble the load array: nodal loads plus body loads plus initial-strain loads.
pub fn assemble_load(mesh: &Mesh) -> Result<LoadMatrix> {
    let kernels = block_kernels(mesh)?;
    assemble_load_from(mesh, &kernels)
}

/// Assemble the load array from prebuilt kernels.
pub fn assemble_load_from(mesh: &Mesh, kernels: &[BlockKernel]) -> Result<LoadMatrix> {
    let mut f = mesh.fields().loads().clone();
    let n_cases = f.ncols();

    for kernel in kernels {
        let block = mesh
            .block(kernel.block)
            .ok_or_else(|| Error::Assembly(format!("block '{}' vanished", kernel.name)))?;
        let check_cases = |what: &str, arrays: &[DMatrix<f64>]| -> Result<()> {
            match arrays.first() {
                Some(a) if a.ncols() != n_cases => Err(Error::Config(format!(
                    "{} of block '{}' have {} load cases, nodal loads have {}",
                    what,
                    kernel.name,
                    a.ncols(),
                    n_cases
                ))),
                _ => Ok(()),
            }
        };

        if let Some(q) = block.body_loads() {
            check_cases("body loads", q)?;
            let parts: Vec<DMatrix<f64>> = (0..kernel.n_elements())
                .into_par_iter()
                .map(|e| kernel.body_load(e, &q[e]))
                .collect();
            for (e, fe) in parts.iter().enumerate() {
                add_load_rows(&mut f, &kernel.elements[e].dofs, fe);
            }
        }
        if let Some(eps0) = block.strain_loads() {
            check_cases("strain loads", eps0)?;
            let parts: Vec<DMatrix<f64>> = (0..kernel.n_elements())
                .into_par_iter()
                .map(|e| kernel.strain_load(e, &eps0[e]))
                .collect();
            for (e, fe) in parts.iter().enumerate() {
                add_load_rows(&mut f, &kernel.elements[e].dofs, fe);
            }
        }
    }
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Hooke, Material, OrthotropicLamina};
    use crate::mesh::{ElementBlock, PointSet};
    use approx::assert_relative_eq;

    /// Two unit Hex8 cells side by side along x.
    fn two_hex_points() -> PointSet {
        let mut rows = Vec::new();
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..3 {
                    rows.push([i as f64, j as f64, k as f64]);
                }
            }
        }
        PointSet::from_rows(&rows)
    }

    fn hex(i0: usize) -> Vec<usize> {
        // index = i + 3 j + 6 k
        let id = |i: usize, j: usize, k: usize| i0 + i + 3 * j + 6 * k;
        vec![
            id(0, 0, 0),
            id(1, 0, 0),
            id(1, 1, 0),
            id(0, 1, 0),
            id(0, 0, 1),
            id(1, 0, 1),
            id(1, 1, 1),
            id(0, 1, 1),
        ]
    }

    fn two_hex_mesh(split: bool) -> Mesh {
        let mut mesh = Mesh::new(two_hex_points(), 3).unwrap();
        mesh.set_hooke(Mesh::ROOT, Hooke::model(Material::new(1000.0, 0.3).unwrap()))
            .unwrap();
        if split {
            let g = mesh.add_group(Mesh::ROOT, "halves").unwrap();
            mesh.add_block(g, "left", ElementBlock::new(ElementType::Hex8, vec![hex(0)]).unwrap())
                .unwrap();
            mesh.add_block(g, "right", ElementBlock::new(ElementType::Hex8, vec![hex(1)]).unwrap())
                .unwrap();
        } else {
            mesh.add_block(
                Mesh::ROOT,
                "both",
                ElementBlock::new(ElementType::Hex8, vec![hex(0), hex(1)]).unwrap(),
            )
            .unwrap();
        }
        mesh
    }

    fn shell_square() -> Mesh {
        let points = PointSet::from_rows(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ]);
        let mut mesh = Mesh::new(points, 6).unwrap();
        mesh.set_hooke(
            Mesh::ROOT,
            Hooke::model(OrthotropicLamina::new(140.0, 10.0, 0.3, 5.0, 5.0, 3.5).unwrap()),
        )
        .unwrap();
        let block = ElementBlock::new(ElementType::ShellQ4, vec![vec![0, 1, 2, 3]])
            .unwrap()
            .with_thickness(0.2)
            .unwrap()
            .with_density(2.0)
            .unwrap();
        mesh.add_block(Mesh::ROOT, "plate", block).unwrap();
        mesh
    }

    #[test]
    fn test_additivity_of_split_blocks() {
        let options = AssemblyOptions::default();
        let whole = DMatrix::from(&assemble_stiffness(&two_hex_mesh(false), &options).unwrap());
        let split = DMatrix::from(&assemble_stiffness(&two_hex_mesh(true), &options).unwrap());
        assert_relative_eq!(whole, split, epsilon = 1e-9);
    }

    #[test]
    fn test_stiffness_is_symmetric_with_rigid_null_space() {
        let k = DMatrix::from(
            &assemble_stiffness(&two_hex_mesh(false), &AssemblyOptions::default()).unwrap(),
        );
        assert_eq!(k.shape(), (36, 36));
        assert_relative_eq!(k, k.transpose(), epsilon = 1e-9);
        for d in 0..3 {
            let mut u = nalgebra::DVector::zeros(36);
            for p in 0..12 {
                u[3 * p + d] = 1.0;
            }
            assert!((&k * &u).norm() < 1e-9 * k.amax());
        }
    }

    #[test]
    fn test_orthotropic_shell_stiffness_is_symmetric() {
        let k = DMatrix::from(&assemble_stiffness(&shell_square(), &AssemblyOptions::default()).unwrap());
        assert_relative_eq!(k, k.transpose(), epsilon = 1e-10);
    }

    #[test]
    fn test_mass_totals() {
        let mut mesh = Mesh::new(two_hex_points(), 3).unwrap();
        mesh.set_hooke(Mesh::ROOT, Hooke::model(Material::new(200e9, 0.3).unwrap())).unwrap();
        let block = ElementBlock::new(ElementType::Hex8, vec![hex(0), hex(1)])
            .unwrap()
            .with_density(3.0)
            .unwrap();
        mesh.add_block(Mesh::ROOT, "both", block).unwrap();
        mesh.fields_mut().set_point_mass(0, 5.0).unwrap();

        let ux = |n: usize| {
            let mut u = nalgebra::DVector::zeros(3 * n);
            for p in 0..n {
                u[3 * p] = 1.0;
            }
            u
        };
        let u = ux(12);
        for distribute in [false, true] {
            let options = AssemblyOptions {
                distribute_point_masses: distribute,
                ..AssemblyOptions::default()
            };
            let m = DMatrix::from(&assemble_mass(&mesh, &options).unwrap());
            // 2 unit cells at density 3, plus the point mass
            assert_relative_eq!((u.transpose() * &m * &u)[0], 11.0, epsilon = 1e-10);
            assert_relative_eq!(m, m.transpose(), epsilon = 1e-12);
            if !distribute {
                assert_relative_eq!(m[(0, 0)] - m[(3 * 11, 3 * 11)], 5.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_shell_mass_weights_rotations() {
        let m = DMatrix::from(&assemble_mass(&shell_square(), &AssemblyOptions::default()).unwrap());
        let total = |dof: usize| -> f64 {
            let mut u = nalgebra::DVector::zeros(24);
            for p in 0..4 {
                u[6 * p + dof] = 1.0;
            }
            (u.transpose() * &m * &u)[0]
        };
        // ρ t A and ρ t³/12 A
        assert_relative_eq!(total(2), 2.0 * 0.2, epsilon = 1e-12);
        assert_relative_eq!(total(4), 2.0 * 0.008 / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_load_combines_nodal_body_and_strain_parts() {
        let points = two_hex_points();
        let mut mesh = Mesh::new(points, 3).unwrap();
        mesh.set_hooke(Mesh::ROOT, Hooke::model(Material::new(1000.0, 0.0).unwrap()))
            .unwrap();
        let q = DMatrix::from_column_slice(3, 2, &[0.0, 0.0, -1.0, 0.0, 0.0, 0.0]);
        let block = ElementBlock::new(ElementType::Hex8, vec![hex(0), hex(1)])
            .unwrap()
            .with_body_loads(vec![q.clone(), q])
            .unwrap();
        let id = mesh.add_block(Mesh::ROOT, "both", block).unwrap();
        mesh.fields_mut().reset_loads(2);
        mesh.fields_mut().add_load(2, 0, 1, 4.0).unwrap();

        let eps0 = DMatrix::from_column_slice(6, 2, &[0.0; 12]);
        mesh.block_mut(id)
            .unwrap()
            .set_strain_loads(vec![eps0.clone(), eps0])
            .unwrap();

        let f = assemble_load(&mesh).unwrap();
        assert_eq!(f.shape(), (36, 2));
        let fz: f64 = (0..12).map(|p| f[(3 * p + 2, 0)]).sum();
        assert_relative_eq!(fz, -2.0, epsilon = 1e-12);
        assert_relative_eq!(f[(6, 1)], 4.0);
    }

    #[test]
    fn test_load_case_mismatch_is_config_error() {
        let mut mesh = two_hex_mesh(false);
        let id = mesh.find("both").unwrap();
        mesh.block_mut(id)
            .unwrap()
            .set_strain_loads(vec![DMatrix::zeros(6, 3), DMatrix::zeros(6, 3)])
            .unwrap();
        assert!(matches!(assemble_load(&mesh), Err(Error::Config(_))));
    }
}
