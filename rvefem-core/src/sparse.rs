//! Sparse matrix operations.
//!
//! Global matrices are accumulated as COO triplets and converted to CSR
//! (Compressed Sparse Row), summing duplicates. Right-hand sides are dense
//! `n_dofs × n_cases` arrays.

use crate::error::{Error, Result};
use nalgebra::DMatrix;
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Dense load array with one column per load case.
pub type LoadMatrix = DMatrix<f64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
/// Exact zeros are skipped on insertion.
#[derive(Debug, Clone)]
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self::with_capacity(n_rows, n_cols, 0)
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Add a value at (row, col). Duplicates are summed during conversion.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows, "Row index out of bounds");
        debug_assert!(col < self.n_cols, "Column index out of bounds");

        if value != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }

    /// Scatter a dense element matrix at the given global DOF indices.
    pub fn add_submatrix(&mut self, dof_indices: &[usize], submatrix: &DMatrix<f64>) {
        debug_assert_eq!(submatrix.nrows(), dof_indices.len());
        debug_assert_eq!(submatrix.ncols(), dof_indices.len());

        for (j, &cj) in dof_indices.iter().enumerate() {
            for (i, &ri) in dof_indices.iter().enumerate() {
                self.add(ri, cj, submatrix[(i, j)]);
            }
        }
    }

    /// Append all triplets of another builder of the same shape.
    pub fn extend(&mut self, other: TripletMatrix) {
        debug_assert_eq!((self.n_rows, self.n_cols), (other.n_rows, other.n_cols));
        self.rows.extend(other.rows);
        self.cols.extend(other.cols);
        self.values.extend(other.values);
    }

    /// Largest absolute diagonal entry after summing duplicates.
    pub fn max_diagonal(&self) -> f64 {
        let mut diag = vec![0.0; self.n_rows.min(self.n_cols)];
        for ((&i, &j), &v) in self.rows.iter().zip(&self.cols).zip(&self.values) {
            if i != j {
                continue;
            }
            if let Some(d) = diag.get_mut(i) {
                *d += v;
            }
        }
        diag.into_iter().fold(0.0, |m, d: f64| m.max(d.abs()))
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Convert to CSR format, summing duplicate entries.
    ///
    /// With `drop_zeros`, entries that cancel to exactly zero are removed from
    /// the pattern.
    pub fn to_csr(self, drop_zeros: bool) -> Result<CsrMatrix> {
        let coo = CooMatrix::try_from_triplets(
            self.n_rows,
            self.n_cols,
            self.rows,
            self.cols,
            self.values,
        )
        .map_err(|e| Error::Assembly(format!("invalid triplet data: {}", e)))?;

        let csr = CsrMatrix::from(&coo);
        Ok(if drop_zeros {
            csr.filter(|_, _, &v| v != 0.0)
        } else {
            csr
        })
    }
}

/// Scatter-add element load rows into a global load array.
pub fn add_load_rows(global: &mut LoadMatrix, dof_indices: &[usize], local: &DMatrix<f64>) {
    debug_assert_eq!(local.nrows(), dof_indices.len());
    debug_assert_eq!(local.ncols(), global.ncols());
    for (i, &dof) in dof_indices.iter().enumerate() {
        for c in 0..local.ncols() {
            global[(dof, c)] += local[(i, c)];
        }
    }
}

/// Diagonal entries of a CSR matrix (zero where not stored).
pub fn diagonal(matrix: &CsrMatrix) -> Vec<f64> {
    let mut diag = vec![0.0; matrix.nrows().min(matrix.ncols())];
    for (i, j, &v) in matrix.triplet_iter() {
        if i == j {
            diag[i] += v;
        }
    }
    diag
}

/// Infinity norm (maximum absolute row sum).
pub fn norm_inf(matrix: &CsrMatrix) -> f64 {
    matrix
        .row_iter()
        .map(|row| row.values().iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}
