//! Material property definitions.
//!
//! Constitutive ("Hooke") matrices come in two layouts:
//!
//! - [`HookeLayout::Solid`]: 6x6, Voigt order [ε_xx, ε_yy, ε_zz, γ_xy, γ_yz, γ_xz]
//! - [`HookeLayout::Surface`]: 5x5, order [ε_x, ε_y, γ_xy, γ_xz, γ_yz] (plane stress
//!   plus transverse shear), used by plate and shell elements
//!
//! A block either carries a raw matrix or a [`MaterialModel`] that is queried once
//! per kernel build, see [`Hooke`].

use crate::error::{Error, Result};
use crate::types::ConstitutiveMatrix;
use nalgebra::{DMatrix, Matrix3, Matrix6};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Shape of a constitutive matrix expected by an element family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookeLayout {
    /// Full 3D elasticity, 6x6.
    Solid,
    /// Plane stress with transverse shear, 5x5.
    Surface,
}

impl HookeLayout {
    /// Number of rows/columns of a matrix in this layout.
    pub fn size(self) -> usize {
        match self {
            HookeLayout::Solid => 6,
            HookeLayout::Surface => 5,
        }
    }
}

/// Anything that can produce a constitutive matrix.
pub trait MaterialModel: Debug + Send + Sync {
    /// Constitutive matrix in the requested layout.
    fn stiffness_matrix(&self, layout: HookeLayout) -> Result<DMatrix<f64>>;
}

/// Constitutive data attached to a mesh node.
#[derive(Debug, Clone)]
pub enum Hooke {
    /// A raw matrix, used as-is. Its size must match the layout of the block.
    Matrix(DMatrix<f64>),
    /// A material model queried for the layout of the block.
    Model(Arc<dyn MaterialModel>),
}

impl Hooke {
    /// Wrap a material model.
    pub fn model(model: impl MaterialModel + 'static) -> Self {
        Hooke::Model(Arc::new(model))
    }

    /// Resolve the constitutive matrix for the given layout.
    pub fn stiffness_matrix(&self, layout: HookeLayout) -> Result<DMatrix<f64>> {
        let matrix = match self {
            Hooke::Matrix(m) => m.clone(),
            Hooke::Model(model) => model.stiffness_matrix(layout)?,
        };
        let n = layout.size();
        if matrix.nrows() != n || matrix.ncols() != n {
            return Err(Error::Config(format!(
                "{:?} layout requires a {}x{} constitutive matrix, got {}x{}",
                layout,
                n,
                n,
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        Ok(matrix)
    }
}

impl From<DMatrix<f64>> for Hooke {
    fn from(matrix: DMatrix<f64>) -> Self {
        Hooke::Matrix(matrix)
    }
}

/// Isotropic linear elastic material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Young's modulus (Pa).
    pub youngs_modulus: f64,
    /// Poisson's ratio (dimensionless).
    pub poissons_ratio: f64,
}

impl Material {
    /// Create a new isotropic linear elastic material.
    ///
    /// # Arguments
    ///
    /// * `youngs_modulus` - Young's modulus E (Pa)
    /// * `poissons_ratio` - Poisson's ratio ν (dimensionless, -1 < ν < 0.5)
    ///
    /// # Errors
    ///
    /// Returns error if material properties are physically invalid.
    pub fn new(youngs_modulus: f64, poissons_ratio: f64) -> Result<Self> {
        if youngs_modulus <= 0.0 {
            return Err(Error::InvalidMaterial(
                "Young's modulus must be positive".into(),
            ));
        }
        if poissons_ratio <= -1.0 || poissons_ratio >= 0.5 {
            return Err(Error::InvalidMaterial(
                "Poisson's ratio must be in range (-1, 0.5)".into(),
            ));
        }
        Ok(Self {
            youngs_modulus,
            poissons_ratio,
        })
    }

    /// Shear modulus G = E / (2(1 + ν)).
    pub fn shear_modulus(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poissons_ratio))
    }

    /// 3D constitutive matrix for isotropic linear elasticity.
    ///
    /// Returns the 6x6 matrix D such that σ = D * ε in Voigt notation.
    pub fn constitutive_3d(&self) -> ConstitutiveMatrix {
        let e = self.youngs_modulus;
        let nu = self.poissons_ratio;

        let factor = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let c11 = factor * (1.0 - nu);
        let c12 = factor * nu;
        let c44 = factor * (1.0 - 2.0 * nu) / 2.0; // = G

        Matrix6::new(
            c11, c12, c12, 0.0, 0.0, 0.0,
            c12, c11, c12, 0.0, 0.0, 0.0,
            c12, c12, c11, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, c44, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, c44, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, c44,
        )
    }

    /// Plane stress constitutive matrix.
    ///
    /// Returns a 3x3 matrix for [σ_xx, σ_yy, τ_xy] = D * [ε_xx, ε_yy, γ_xy].
    pub fn constitutive_plane_stress(&self) -> Matrix3<f64> {
        let e = self.youngs_modulus;
        let nu = self.poissons_ratio;

        let factor = e / (1.0 - nu * nu);

        Matrix3::new(
            factor,         factor * nu, 0.0,
            factor * nu,    factor,      0.0,
            0.0,            0.0,         factor * (1.0 - nu) / 2.0,
        )
    }

    /// Surface constitutive matrix: plane stress plus transverse shear moduli.
    pub fn constitutive_surface(&self) -> DMatrix<f64> {
        let mut d = DMatrix::zeros(5, 5);
        d.view_mut((0, 0), (3, 3))
            .copy_from(&self.constitutive_plane_stress());
        let g = self.shear_modulus();
        d[(3, 3)] = g;
        d[(4, 4)] = g;
        d
    }
}

impl MaterialModel for Material {
    fn stiffness_matrix(&self, layout: HookeLayout) -> Result<DMatrix<f64>> {
        Ok(match layout {
            HookeLayout::Solid => DMatrix::from_iterator(6, 6, self.constitutive_3d().iter().cloned()),
            HookeLayout::Surface => self.constitutive_surface(),
        })
    }
}

/// Orthotropic lamina in its material axes, for plate and shell blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrthotropicLamina {
    pub e1: f64,
    pub e2: f64,
    pub nu12: f64,
    pub g12: f64,
    pub g13: f64,
    pub g23: f64,
}

impl OrthotropicLamina {
    /// Validate and create a lamina.
    pub fn new(e1: f64, e2: f64, nu12: f64, g12: f64, g13: f64, g23: f64) -> Result<Self> {
        if [e1, e2, g12, g13, g23].iter().any(|&v| v <= 0.0) {
            return Err(Error::InvalidMaterial(
                "Orthotropic moduli must be positive".into(),
            ));
        }
        // ν21 = ν12 E2 / E1, positive definiteness needs ν12 ν21 < 1
        if nu12 * nu12 * e2 / e1 >= 1.0 {
            return Err(Error::InvalidMaterial(
                "Orthotropic Poisson's ratios violate positive definiteness".into(),
            ));
        }
        Ok(Self { e1, e2, nu12, g12, g13, g23 })
    }
}

impl MaterialModel for OrthotropicLamina {
    fn stiffness_matrix(&self, layout: HookeLayout) -> Result<DMatrix<f64>> {
        if layout != HookeLayout::Surface {
            return Err(Error::InvalidMaterial(
                "an orthotropic lamina only provides a surface constitutive matrix".into(),
            ));
        }
        let nu21 = self.nu12 * self.e2 / self.e1;
        let denom = 1.0 - self.nu12 * nu21;
        let mut d = DMatrix::zeros(5, 5);
        d[(0, 0)] = self.e1 / denom;
        d[(1, 1)] = self.e2 / denom;
        d[(0, 1)] = self.nu12 * self.e2 / denom;
        d[(1, 0)] = d[(0, 1)];
        d[(2, 2)] = self.g12;
        d[(3, 3)] = self.g13;
        d[(4, 4)] = self.g23;
        Ok(d)
    }
}
