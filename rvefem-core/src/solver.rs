//! Linear system solvers.
//!
//! Solves `K X = F` for a symmetric positive definite `K` and a right-hand
//! side with one column per load case. One factorization is reused for all
//! cases.
//!
//! # Solver Backends
//!
//! - [`FaerCholeskySolver`]: Sparse Cholesky factorization using the faer library.
//!   The production choice for penalized stiffness matrices.
//! - [`DenseLUSolver`]: nalgebra dense LU, used for very small systems.
//!
//! [`solve_checked`] wraps either backend with the singularity diagnostics
//! used by the analysis drivers.

use crate::error::{Error, Result};
use crate::sparse::{diagonal, norm_inf, CsrMatrix};
use faer::linalg::cholesky::llt::factor::LltError;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::linalg::LltError as SparseLltError;
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use log::{debug, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Linear solver interface.
pub trait Solver: Send + Sync {
    /// Solve `A X = B`.
    ///
    /// # Arguments
    ///
    /// * `matrix` - System matrix, `n × n`
    /// * `rhs` - Right-hand sides, `n × n_cases`
    ///
    /// # Returns
    ///
    /// Solutions, `n × n_cases`
    fn solve(&self, matrix: &CsrMatrix, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Solver selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverType {
    /// Sparse Cholesky.
    Direct,
    /// Dense LU.
    Dense,
    /// Dense LU for small systems, sparse Cholesky otherwise.
    #[default]
    Auto,
}

/// Solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Solver type to use.
    pub solver_type: SolverType,
    /// Largest system solved densely under [`SolverType::Auto`].
    pub dense_threshold: usize,
    /// Condition estimates above this value are reported as singular.
    pub max_condition: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            solver_type: SolverType::Auto,
            dense_threshold: 64,
            max_condition: 1e15,
        }
    }
}

fn check_dimensions(matrix: &CsrMatrix, rhs: &DMatrix<f64>) -> Result<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(Error::Solver("Matrix must be square".into()));
    }
    if matrix.nrows() != rhs.nrows() {
        return Err(Error::Solver(format!(
            "RHS size mismatch: matrix is {}x{}, RHS has {} rows",
            matrix.nrows(),
            matrix.ncols(),
            rhs.nrows()
        )));
    }
    Ok(())
}

/// Direct solver using nalgebra dense LU.
///
/// Only suitable for small systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLUSolver;

impl DenseLUSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for DenseLUSolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_dimensions(matrix, rhs)?;
        if matrix.nrows() == 0 {
            return Ok(DMatrix::zeros(0, rhs.ncols()));
        }

        let dense = DMatrix::from(matrix);
        dense
            .lu()
            .solve(rhs)
            .ok_or_else(|| Error::SingularMatrix("LU factorization failed".into()))
    }

    fn name(&self) -> &str {
        "Dense LU"
    }
}

/// Convert nalgebra-sparse CSR matrix to faer SparseColMat (CSC format).
///
/// Each CSR row becomes a CSC column, which is the same matrix for symmetric K.
fn csr_to_faer_csc(csr: &CsrMatrix) -> SparseColMat<usize, f64> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();
    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    let mut col_offsets = vec![0usize; ncols + 1];
    for &col in col_indices {
        col_offsets[col + 1] += 1;
    }
    for i in 0..ncols {
        col_offsets[i + 1] += col_offsets[i];
    }

    let nnz = values.len();
    let mut csc_row_indices = vec![0usize; nnz];
    let mut csc_values = vec![0.0f64; nnz];
    let mut next = col_offsets[..ncols].to_vec();

    for row in 0..nrows {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            let pos = next[col];
            csc_row_indices[pos] = row;
            csc_values[pos] = values[idx];
            next[col] += 1;
        }
    }

    // SAFETY: offsets are monotone and row indices are sorted within each column
    // because rows are visited in ascending order.
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_offsets, None, csc_row_indices),
            csc_values,
        )
    }
}

/// Sparse Cholesky solver using the faer library.
///
/// Uses faer's sparse LLᵀ factorization; all load cases are solved against
/// one numeric factorization.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerCholeskySolver;

impl FaerCholeskySolver {
    /// Create a new sparse Cholesky solver.
    pub fn new() -> Self {
        Self
    }
}

impl Solver for FaerCholeskySolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_dimensions(matrix, rhs)?;
        let n = matrix.nrows();
        let n_cases = rhs.ncols();
        if n == 0 {
            return Ok(DMatrix::zeros(0, n_cases));
        }

        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        let symbolic = SymbolicLlt::try_new(csc_ref.symbolic(), faer::Side::Lower)
            .map_err(|_| Error::Solver("Symbolic Cholesky analysis failed".into()))?;

        let llt = Llt::try_new_with_symbolic(symbolic, csc_ref, faer::Side::Lower)
            .map_err(|e| match e {
                SparseLltError::Generic(err) => {
                    Error::Solver(format!("Sparse Cholesky error: {:?}", err))
                }
                SparseLltError::Numeric(LltError::NonPositivePivot { index }) => {
                    Error::SingularMatrix(format!(
                        "Matrix is not positive definite at pivot {}",
                        index
                    ))
                }
            })?;

        let mut x = faer::Mat::from_fn(n, n_cases, |i, j| rhs[(i, j)]);
        llt.solve_in_place(x.as_mut());

        Ok(DMatrix::from_fn(n, n_cases, |i, j| x[(i, j)]))
    }

    fn name(&self) -> &str {
        "faer Sparse Cholesky (LLᵀ)"
    }
}

/// Select solver based on configuration and problem size.
pub fn select_solver(config: &SolverConfig, n_dofs: usize) -> Box<dyn Solver> {
    match config.solver_type {
        SolverType::Direct => Box::new(FaerCholeskySolver::new()),
        SolverType::Dense => Box::new(DenseLUSolver::new()),
        SolverType::Auto if n_dofs <= config.dense_threshold => Box::new(DenseLUSolver::new()),
        SolverType::Auto => Box::new(FaerCholeskySolver::new()),
    }
}

/// Solve with singularity diagnostics.
///
/// Fails with [`Error::SingularMatrix`] when a diagonal entry is not positive
/// (the DOF is reported), when the solution is not finite, or when the lower
/// bound `‖A‖∞‖X‖∞/‖B‖∞` on the condition number exceeds
/// `config.max_condition`.
pub fn solve_checked(
    matrix: &CsrMatrix,
    rhs: &DMatrix<f64>,
    config: &SolverConfig,
) -> Result<DMatrix<f64>> {
    check_dimensions(matrix, rhs)?;

    if let Some((dof, d)) = diagonal(matrix)
        .into_iter()
        .enumerate()
        .find(|&(_, d)| !(d > 0.0))
    {
        return Err(Error::SingularMatrix(format!(
            "diagonal entry {} at DOF {} is not positive; the DOF is unsupported",
            d, dof
        )));
    }

    let solver = select_solver(config, matrix.nrows());
    debug!(
        "solving {} DOFs x {} cases with {}",
        matrix.nrows(),
        rhs.ncols(),
        solver.name()
    );
    let x = solver.solve(matrix, rhs)?;

    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularMatrix("solution contains non-finite values".into()));
    }

    let a_norm = norm_inf(matrix);
    let mut estimate: f64 = 0.0;
    for c in 0..rhs.ncols() {
        let b_norm = rhs.column(c).amax();
        if b_norm > 0.0 {
            estimate = estimate.max(a_norm * x.column(c).amax() / b_norm);
        }
    }
    if estimate > config.max_condition {
        return Err(Error::SingularMatrix(format!(
            "condition number estimate {:e} exceeds {:e}",
            estimate, config.max_condition
        )));
    }
    if estimate > config.max_condition * 1e-3 {
        warn!("system is poorly conditioned (estimate {:e})", estimate);
    }

    Ok(x)
}
