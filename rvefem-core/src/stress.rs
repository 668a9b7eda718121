//! Strain and stress recovery from the displacement solution.
//!
//! After solving `K u = f`, every block is recovered from its kernel:
//! 1. Gather the element DOF values from the global solution
//! 2. Model strains: `ε = B uₑ`
//! 3. Generalized stresses: `σ = C ε` with the element model stiffness
//!
//! Recovery happens at the quadrature points of the block, or at the element
//! nodes for nodal output (values are then averaged over the elements sharing
//! a point). Plates and shells additionally recover material stresses at a
//! height `z` through the thickness.

use crate::element::kernel::BlockKernel;
use crate::error::{Error, Result};
use crate::mesh::{ElementType, Mesh, NodeId};
use crate::types::{Point3, StressTensor};
use nalgebra::{DMatrix, DVector, Vector6};
use rayon::prelude::*;

/// Stress result for a single element.
#[derive(Debug, Clone)]
pub struct ElementStress {
    /// Element index in its block.
    pub element_id: usize,
    /// Stress tensors at each recovery point.
    pub integration_point_stresses: Vec<StressTensor>,
}

impl ElementStress {
    /// Average stress across all recovery points.
    pub fn average_stress(&self) -> StressTensor {
        if self.integration_point_stresses.is_empty() {
            return StressTensor::zero();
        }
        let n = self.integration_point_stresses.len() as f64;
        let sum = self
            .integration_point_stresses
            .iter()
            .fold(Vector6::zeros(), |acc, s| acc + s.0);
        StressTensor(sum / n)
    }

    /// Maximum von Mises stress among all recovery points.
    pub fn max_von_mises(&self) -> f64 {
        self.integration_point_stresses
            .iter()
            .map(|s| s.von_mises())
            .fold(0.0, f64::max)
    }
}

/// Material stresses of one block for one load case.
#[derive(Debug, Clone)]
pub struct StressField {
    /// Element stresses indexed by element ID.
    pub element_stresses: Vec<ElementStress>,
}

impl StressField {
    pub fn element(&self, elem_id: usize) -> Option<&ElementStress> {
        self.element_stresses.get(elem_id)
    }

    /// Maximum von Mises stress across all elements.
    pub fn max_von_mises(&self) -> f64 {
        self.element_stresses
            .iter()
            .map(|es| es.max_von_mises())
            .fold(0.0, f64::max)
    }

    pub fn average_stresses(&self) -> Vec<StressTensor> {
        self.element_stresses
            .iter()
            .map(|es| es.average_stress())
            .collect()
    }

    pub fn n_elements(&self) -> usize {
        self.element_stresses.len()
    }

    /// One von Mises value per element, from the averaged stress.
    pub fn von_mises_stresses(&self) -> Vec<f64> {
        self.element_stresses
            .iter()
            .map(|es| es.average_stress().von_mises())
            .collect()
    }
}

/// Material strain `[εx, εy, γxy, γxz, γyz]` at height `z` of a plate or shell.
///
/// In-plane strains are the membrane strains (shells only) plus `z` times the
/// curvatures. Transverse shear follows the parabolic distribution
/// `(5/4)(1 - 4(z/t)²) γ`, whose thickness average is `γ`.
pub fn through_thickness(
    element_type: ElementType,
    model_strain: &[f64],
    z: f64,
    thickness: f64,
) -> Result<[f64; 5]> {
    let bending = match element_type {
        ElementType::ShellQ4 => 3,
        ElementType::PlateQ4 => 0,
        other => {
            return Err(Error::Config(format!(
                "{:?} has no through-thickness distribution",
                other
            )))
        }
    };
    if model_strain.len() != element_type.n_strains() {
        return Err(Error::Config(format!(
            "{:?} has {} strains, got {}",
            element_type,
            element_type.n_strains(),
            model_strain.len()
        )));
    }
    let membrane = if bending == 3 {
        [model_strain[0], model_strain[1], model_strain[2]]
    } else {
        [0.0; 3]
    };
    let kappa = &model_strain[bending..bending + 3];
    let gamma = &model_strain[bending + 3..bending + 5];
    let shear = 1.25 * (1.0 - 4.0 * (z / thickness).powi(2));
    Ok([
        membrane[0] + z * kappa[0],
        membrane[1] + z * kappa[1],
        membrane[2] + z * kappa[2],
        shear * gamma[0],
        shear * gamma[1],
    ])
}

/// Recovered strains and generalized stresses of one block.
#[derive(Debug, Clone)]
pub struct BlockRecovery {
    pub block: NodeId,
    pub name: String,
    pub element_type: ElementType,
    /// True when recovered at the element nodes instead of quadrature points.
    pub at_nodes: bool,
    /// Material matrix (6x6 solid or 5x5 surface).
    pub hooke: DMatrix<f64>,
    pub thickness: Vec<Option<f64>>,
    /// Point indices of every element.
    pub nodes: Vec<Vec<usize>>,
    /// Physical position of every recovery point.
    pub positions: Vec<Vec<Point3>>,
    /// Model strains per element and point, `n_strains × n_cases`.
    pub strains: Vec<Vec<DMatrix<f64>>>,
    /// Generalized stresses `C ε` per element and point.
    pub forces: Vec<Vec<DMatrix<f64>>>,
}

impl BlockRecovery {
    /// Recover from a kernel and a global `n_dofs × n_cases` solution.
    pub fn from_kernel(kernel: &BlockKernel, solution: &DMatrix<f64>, at_nodes: bool) -> Self {
        let per_element: Vec<(Vec<DMatrix<f64>>, Vec<DMatrix<f64>>)> = (0..kernel.n_elements())
            .into_par_iter()
            .map(|e| {
                let strains = kernel.strains(e, solution);
                let model = &kernel.elements[e].model;
                let forces = strains.iter().map(|s| model * s).collect();
                (strains, forces)
            })
            .collect();
        let (strains, forces) = per_element.into_iter().unzip();

        let ndofn = kernel.ndofn;
        Self {
            block: kernel.block,
            name: kernel.name.clone(),
            element_type: kernel.element_type,
            at_nodes,
            hooke: kernel.hooke.clone(),
            thickness: kernel.elements.iter().map(|el| el.thickness).collect(),
            nodes: kernel
                .elements
                .iter()
                .map(|el| el.dofs.iter().step_by(ndofn).map(|d| d / ndofn).collect())
                .collect(),
            positions: kernel
                .elements
                .iter()
                .map(|el| el.points.iter().map(|p| p.position).collect())
                .collect(),
            strains,
            forces,
        }
    }

    pub fn n_elements(&self) -> usize {
        self.strains.len()
    }

    pub fn n_cases(&self) -> usize {
        self.strains
            .iter()
            .flatten()
            .next()
            .map_or(0, |s| s.ncols())
    }

    /// Material stresses of one load case.
    ///
    /// Solids ignore `z` and recover `C ε`. Plates and shells recover at
    /// height `z` from the mid-surface, in the element frame.
    pub fn stresses(&self, z: f64, case: usize) -> Result<StressField> {
        if case >= self.n_cases() {
            return Err(Error::Config(format!(
                "load case {} out of range ({} cases)",
                case,
                self.n_cases()
            )));
        }
        let element_stresses = self
            .strains
            .iter()
            .enumerate()
            .map(|(e, points)| {
                let integration_point_stresses = points
                    .iter()
                    .map(|strain| {
                        let column: Vec<f64> = strain.column(case).iter().copied().collect();
                        self.material_stress(e, &column, z)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ElementStress {
                    element_id: e,
                    integration_point_stresses,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|err| err.in_block(&self.name))?;
        Ok(StressField { element_stresses })
    }

    fn material_stress(&self, e: usize, strain: &[f64], z: f64) -> Result<StressTensor> {
        if self.element_type.is_solid() {
            let sigma = &self.hooke * DVector::from_column_slice(strain);
            return Ok(StressTensor(Vector6::from_iterator(sigma.iter().copied())));
        }
        let t = self.thickness[e]
            .ok_or_else(|| Error::Config(format!("element {} has no thickness", e)))?;
        let eps = through_thickness(self.element_type, strain, z, t)?;
        let sigma = &self.hooke * DVector::from_column_slice(&eps);
        Ok(StressTensor::from_surface(sigma.as_slice()))
    }

    /// Strains averaged over the elements sharing each point.
    pub fn nodal_strains(&self, n_points: usize) -> Result<Vec<Option<DMatrix<f64>>>> {
        self.nodal_average(&self.strains, n_points)
    }

    /// Generalized stresses averaged over the elements sharing each point.
    pub fn nodal_forces(&self, n_points: usize) -> Result<Vec<Option<DMatrix<f64>>>> {
        self.nodal_average(&self.forces, n_points)
    }

    /// Material stresses averaged over the elements sharing each point.
    pub fn nodal_stresses(&self, z: f64, case: usize, n_points: usize) -> Result<Vec<Option<StressTensor>>> {
        let field = self.stresses(z, case)?;
        let values: Vec<Vec<DMatrix<f64>>> = field
            .element_stresses
            .iter()
            .map(|es| {
                es.integration_point_stresses
                    .iter()
                    .map(|s| DMatrix::from_column_slice(6, 1, s.0.as_slice()))
                    .collect()
            })
            .collect();
        Ok(self
            .nodal_average(&values, n_points)?
            .into_iter()
            .map(|v| v.map(|m| StressTensor(Vector6::from_iterator(m.iter().copied()))))
            .collect())
    }

    fn nodal_average(
        &self,
        values: &[Vec<DMatrix<f64>>],
        n_points: usize,
    ) -> Result<Vec<Option<DMatrix<f64>>>> {
        if !self.at_nodes {
            return Err(Error::Config(format!(
                "block '{}' was recovered at quadrature points, not at nodes",
                self.name
            )));
        }
        let mut sums: Vec<Option<DMatrix<f64>>> = vec![None; n_points];
        let mut counts = vec![0usize; n_points];
        for (nodes, element_values) in self.nodes.iter().zip(values) {
            for (&p, v) in nodes.iter().zip(element_values) {
                if p >= n_points {
                    return Err(Error::Mesh(format!("point {} out of range", p)));
                }
                match &mut sums[p] {
                    Some(sum) => *sum += v,
                    slot @ None => *slot = Some(v.clone()),
                }
                counts[p] += 1;
            }
        }
        Ok(sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| sum.map(|s| s / count as f64))
            .collect())
    }
}

fn stored_solution(mesh: &Mesh) -> Result<&DMatrix<f64>> {
    mesh.fields()
        .solution()
        .ok_or_else(|| Error::Config("no solution stored; run the analysis first".into()))
}

/// Recover every block at its quadrature points.
pub fn recover(mesh: &Mesh) -> Result<Vec<BlockRecovery>> {
    let solution = stored_solution(mesh)?;
    mesh.leaf_blocks()
        .into_iter()
        .map(|id| {
            let kernel = BlockKernel::build(mesh, id)?;
            Ok(BlockRecovery::from_kernel(&kernel, solution, false))
        })
        .collect()
}

/// Recover every block at its element nodes.
pub fn recover_at_nodes(mesh: &Mesh) -> Result<Vec<BlockRecovery>> {
    let solution = stored_solution(mesh)?;
    mesh.leaf_blocks()
        .into_iter()
        .map(|id| {
            let kernel = BlockKernel::at_nodes(mesh, id)?;
            Ok(BlockRecovery::from_kernel(&kernel, solution, true))
        })
        .collect()
}
