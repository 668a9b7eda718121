//! Core data types for FE operations.
//!
//! This module defines fundamental types used throughout rvefem:
//! - Geometric primitives (points, local frames)
//! - Stress and strain tensors in Voigt notation

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

/// A point in 3D space.
pub type Point3 = Vector3<f64>;

/// Orthonormal local frame. Rows are the local axes expressed in global
/// coordinates, so `frame * v_global = v_local`.
pub type Frame = Matrix3<f64>;

/// 6x6 constitutive matrix for 3D elasticity in Voigt notation.
pub type ConstitutiveMatrix = Matrix6<f64>;

/// Symmetric stress tensor in Voigt notation.
///
/// Components are ordered as: [σ_xx, σ_yy, σ_zz, τ_xy, τ_yz, τ_xz]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressTensor(pub Vector6<f64>);

impl StressTensor {
    /// Create a new stress tensor from Voigt components.
    pub fn new(components: [f64; 6]) -> Self {
        Self(Vector6::from_row_slice(&components))
    }

    /// Zero stress state.
    pub fn zero() -> Self {
        Self(Vector6::zeros())
    }

    /// Embed a surface stress state `[σ_x, σ_y, τ_xy, τ_xz, τ_yz]` (σ_z = 0).
    pub fn from_surface(s: &[f64]) -> Self {
        Self::new([s[0], s[1], 0.0, s[2], s[4], s[3]])
    }

    /// Hencky-Mises-Huber (von Mises) equivalent stress.
    pub fn von_mises(&self) -> f64 {
        let s = &self.0;
        let s_xx = s[0];
        let s_yy = s[1];
        let s_zz = s[2];
        let t_xy = s[3];
        let t_yz = s[4];
        let t_xz = s[5];

        let term1 = (s_xx - s_yy).powi(2) + (s_yy - s_zz).powi(2) + (s_zz - s_xx).powi(2);
        let term2 = 6.0 * (t_xy.powi(2) + t_yz.powi(2) + t_xz.powi(2));

        ((term1 + term2) / 2.0).sqrt()
    }

    /// Extract the full 3x3 symmetric stress matrix.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let s = &self.0;
        Matrix3::new(
            s[0], s[3], s[5],
            s[3], s[1], s[4],
            s[5], s[4], s[2],
        )
    }

    /// Inverse of [`StressTensor::to_matrix`].
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Self::new([m[(0, 0)], m[(1, 1)], m[(2, 2)], m[(0, 1)], m[(1, 2)], m[(0, 2)]])
    }

    /// Express the tensor in another frame: σ' = R σ Rᵀ.
    ///
    /// Element-frame results of plates and shells come back to global axes
    /// with `rotated(&frame.transpose())`.
    pub fn rotated(&self, frame: &Frame) -> Self {
        Self::from_matrix(&(frame * self.to_matrix() * frame.transpose()))
    }
}

/// Symmetric strain tensor in Voigt notation.
///
/// Components are ordered as: [ε_xx, ε_yy, ε_zz, γ_xy, γ_yz, γ_xz]
/// where γ = 2ε for engineering shear strain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrainTensor(pub Vector6<f64>);

impl StrainTensor {
    /// Create a new strain tensor from Voigt components.
    pub fn new(components: [f64; 6]) -> Self {
        Self(Vector6::from_row_slice(&components))
    }

    /// Zero strain state.
    pub fn zero() -> Self {
        Self(Vector6::zeros())
    }

    /// Extract the full 3x3 symmetric strain matrix.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let e = &self.0;
        // Note: off-diagonal terms are γ/2 = ε
        Matrix3::new(
            e[0],       e[3] / 2.0, e[5] / 2.0,
            e[3] / 2.0, e[1],       e[4] / 2.0,
            e[5] / 2.0, e[4] / 2.0, e[2],
        )
    }

    /// Inverse of [`StrainTensor::to_matrix`]; the matrix is assumed symmetric.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        Self::new([
            m[(0, 0)],
            m[(1, 1)],
            m[(2, 2)],
            2.0 * m[(0, 1)],
            2.0 * m[(1, 2)],
            2.0 * m[(0, 2)],
        ])
    }

    /// Express the tensor in a local frame: ε' = R ε Rᵀ.
    pub fn rotated(&self, frame: &Frame) -> Self {
        Self::from_matrix(&(frame * self.to_matrix() * frame.transpose()))
    }
}
