//! Linear static analysis.
//!
//! A [`Structure`] owns a mesh, its linear constraints and the analysis
//! settings. [`Structure::linear_static_analysis`] assembles the penalized
//! system for every load case, solves it with one factorization and writes
//! the solution into the nodal fields of the mesh.

use crate::assembly::{assemble_load_from, block_kernels, stiffness_triplets};
use crate::bc::{constraint_load, constraint_matrix, penalty_matrix, prescribed_load, LinearConstraint};
use crate::config::AnalysisConfig;
use crate::element::kernel::BlockKernel;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::solver::solve_checked;
use crate::sparse::{CsrMatrix, LoadMatrix};
use log::{debug, info};
use nalgebra::DMatrix;

/// Assembled system ready for solving.
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    /// Global stiffness matrix including support and constraint penalties.
    pub stiffness: CsrMatrix,
    /// Right-hand side, `n_dofs × n_cases`.
    pub rhs: LoadMatrix,
    /// Number of DOFs in the system.
    pub n_dofs: usize,
    /// Penalty used for supports and constraints.
    pub penalty: f64,
}

/// A mesh together with its constraints and analysis settings.
#[derive(Debug, Clone)]
pub struct Structure {
    mesh: Mesh,
    constraints: Vec<LinearConstraint>,
    config: AnalysisConfig,
}

impl Structure {
    pub fn new(mesh: Mesh) -> Self {
        Self::with_config(mesh, AnalysisConfig::default())
    }

    pub fn with_config(mesh: Mesh, config: AnalysisConfig) -> Self {
        Self {
            mesh,
            constraints: Vec::new(),
            config,
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AnalysisConfig {
        &mut self.config
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn add_constraint(&mut self, constraint: LinearConstraint) {
        self.constraints.push(constraint);
    }

    pub fn add_constraints(&mut self, constraints: impl IntoIterator<Item = LinearConstraint>) {
        self.constraints.extend(constraints);
    }

    /// Replace all constraints, returning the previous ones.
    pub fn replace_constraints(&mut self, constraints: Vec<LinearConstraint>) -> Vec<LinearConstraint> {
        std::mem::replace(&mut self.constraints, constraints)
    }

    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    /// Assemble the penalized system `K u = F`.
    pub fn assemble_system(&self) -> Result<AssembledSystem> {
        let kernels = block_kernels(&self.mesh)?;
        self.assemble_system_with(&kernels)
    }

    /// Assemble the penalized system from prebuilt kernels.
    pub fn assemble_system_with(&self, kernels: &[BlockKernel]) -> Result<AssembledSystem> {
        self.config.validate()?;
        let n_dofs = self.mesh.n_dofs();
        let fields = self.mesh.fields();

        let fixed = fields.fixed_dofs();
        let mut triplets = stiffness_triplets(kernels, n_dofs);
        let penalty = self.config.penalty_for(triplets.max_diagonal())?;
        triplets.extend(penalty_matrix(n_dofs, &fixed, penalty));
        triplets.extend(constraint_matrix(&self.constraints, n_dofs, penalty)?);
        let stiffness = triplets.to_csr(self.config.assembly.drop_zeros)?;

        let n_cases = fields.n_cases();
        let mut rhs = assemble_load_from(&self.mesh, kernels)?;
        rhs += prescribed_load(fields, penalty)?;
        rhs += constraint_load(&self.constraints, n_dofs, n_cases, penalty)?;

        debug!(
            "assembled {} DOFs ({} nnz), {} supported DOFs, {} constraints, {} load cases, penalty {:e}",
            n_dofs,
            stiffness.nnz(),
            fixed.len(),
            self.constraints.len(),
            n_cases,
            penalty
        );

        Ok(AssembledSystem {
            stiffness,
            rhs,
            n_dofs,
            penalty,
        })
    }

    /// Solve for every load case and store the solution in the mesh fields.
    pub fn linear_static_analysis(&mut self) -> Result<&DMatrix<f64>> {
        let kernels = block_kernels(&self.mesh)?;
        self.solve_with(&kernels)
    }

    /// Static solve reusing prebuilt kernels.
    pub(crate) fn solve_with(&mut self, kernels: &[BlockKernel]) -> Result<&DMatrix<f64>> {
        let system = self.assemble_system_with(kernels)?;
        info!(
            "linear static analysis: {} DOFs, {} load cases",
            system.n_dofs,
            system.rhs.ncols()
        );
        let solution = solve_checked(&system.stiffness, &system.rhs, &self.config.solver)?;
        let fields = self.mesh.fields_mut();
        fields.set_solution(solution)?;
        fields
            .solution()
            .ok_or_else(|| Error::Solver("solution was not stored".into()))
    }
}
