//! rvefem Core - structural finite elements with RVE homogenization
//!
//! Linear finite element analysis library with:
//! - Hierarchical meshes of element blocks sharing one point set
//! - Data-driven element kernels for solids, Mindlin plates and shells
//! - Parallel assembly using Rayon
//! - Penalty supports, linear constraints and periodic boundary conditions
//! - Sparse Cholesky solves for many load cases at once
//! - Homogenization of periodic cells into ABD / ABDS plate stiffness
//!
//! # Architecture
//!
//! - [`Mesh`]: point set, tree of groups and [`ElementBlock`]s, nodal fields
//! - [`BlockKernel`]: per-block kinematics shared by assembly and recovery
//! - [`Structure`]: a mesh with constraints and settings; linear static analysis
//! - [`Solver`] trait: linear system solution strategies
//! - [`homogenize`]: effective plate stiffness of a representative cell
//!
//! # Example
//!
//! ```ignore
//! use rvefem_core::{ElementBlock, ElementType, Hooke, Material, Mesh, PointSet, Structure};
//!
//! let mut mesh = Mesh::new(PointSet::from_rows(&rows), 6)?;
//! mesh.set_hooke(Mesh::ROOT, Hooke::model(Material::new(1000.0, 0.3)?))?;
//! let skin = ElementBlock::new(ElementType::ShellQ4, cells)?.with_thickness(1.0)?;
//! mesh.add_block(Mesh::ROOT, "skin", skin)?;
//!
//! let abds = Structure::new(mesh).abds()?;
//! ```

pub mod analysis;
pub mod assembly;
pub mod bc;
pub mod config;
pub mod element;
pub mod error;
pub mod fields;
pub mod homogenization;
pub mod material;
pub mod mesh;
pub mod solver;
pub mod sparse;
pub mod stress;
pub mod types;

pub use analysis::{AssembledSystem, Structure};
pub use assembly::{assemble_load, assemble_mass, assemble_stiffness, AssemblyOptions};
pub use bc::{Anchor, AnchorTarget, LinearConstraint};
pub use config::AnalysisConfig;
pub use element::{BlockKernel, GaussPoint, ReferenceCell};
pub use error::{Error, Result};
pub use fields::NodalFields;
pub use homogenization::{homogenize, HomogenizationConfig, HomogenizationResult, PlateModel};
pub use material::{Hooke, HookeLayout, Material, MaterialModel, OrthotropicLamina};
pub use mesh::{ElementBlock, ElementType, Mesh, NodeId, PointSet};
pub use solver::{solve_checked, Solver, SolverConfig, SolverType};
pub use sparse::{CsrMatrix, LoadMatrix};
pub use stress::{recover, recover_at_nodes, BlockRecovery, StressField};
pub use types::{Frame, Point3, StrainTensor, StressTensor};
