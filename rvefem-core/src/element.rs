//! Element kernel library.
//!
//! Elements are described by data rather than by one type per element:
//! a reference cell with its shape functions, a static strain-displacement
//! layout and a rule for the model stiffness. The block kernel combines these
//! for every element of a block.
//!
//! # Submodules
//!
//! - [`gauss`] - Gauss quadrature rules for numerical integration
//! - [`shape`] - reference cells and shape functions
//! - [`kinematics`] - B-matrix layouts, model stiffness and inertia weights
//! - [`kernel`] - per-block evaluation and element matrix integration

pub mod gauss;
pub mod kernel;
pub mod kinematics;
pub mod shape;

pub use gauss::{gauss_1d, gauss_hex, gauss_quad, gauss_tet, GaussPoint};
pub use kernel::{BlockKernel, ElementKernel, KernelPoint};
pub use shape::ReferenceCell;
