//! Nodal field arrays owned by the mesh root.
//!
//! All arrays are indexed by global DOF `NDOFN * point + dof`, with a trailing
//! load-case axis where applicable.

use crate::error::{Error, Result};
use nalgebra::DMatrix;

/// Loads, supports, prescribed values, solution and point masses of a mesh.
#[derive(Debug, Clone)]
pub struct NodalFields {
    n_points: usize,
    ndofn: usize,
    loads: DMatrix<f64>,
    fixity: Vec<bool>,
    prescribed: Option<DMatrix<f64>>,
    solution: Option<DMatrix<f64>>,
    point_masses: Option<Vec<f64>>,
}

impl NodalFields {
    /// Empty fields with a single load case.
    pub fn new(n_points: usize, ndofn: usize) -> Self {
        let n_dofs = n_points * ndofn;
        Self {
            n_points,
            ndofn,
            loads: DMatrix::zeros(n_dofs, 1),
            fixity: vec![false; n_dofs],
            prescribed: None,
            solution: None,
            point_masses: None,
        }
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn ndofn(&self) -> usize {
        self.ndofn
    }

    /// Total number of degrees of freedom.
    pub fn n_dofs(&self) -> usize {
        self.n_points * self.ndofn
    }

    /// Number of load cases.
    pub fn n_cases(&self) -> usize {
        self.loads.ncols()
    }

    #[inline]
    fn dof(&self, point: usize, dof: usize) -> Result<usize> {
        if point >= self.n_points || dof >= self.ndofn {
            return Err(Error::Mesh(format!(
                "DOF ({}, {}) out of range for {} points with {} DOFs each",
                point, dof, self.n_points, self.ndofn
            )));
        }
        Ok(point * self.ndofn + dof)
    }

    /// Reset all nodal loads to zero with `n_cases` load cases.
    pub fn reset_loads(&mut self, n_cases: usize) {
        self.loads = DMatrix::zeros(self.n_dofs(), n_cases.max(1));
        if let Some(p) = &mut self.prescribed {
            *p = DMatrix::zeros(p.nrows(), n_cases.max(1));
        }
    }

    /// Add a concentrated load.
    pub fn add_load(&mut self, point: usize, dof: usize, case: usize, value: f64) -> Result<()> {
        let i = self.dof(point, dof)?;
        if case >= self.n_cases() {
            return Err(Error::Config(format!(
                "load case {} out of range ({} cases)",
                case,
                self.n_cases()
            )));
        }
        self.loads[(i, case)] += value;
        Ok(())
    }

    /// Replace the load array, shape `n_dofs × n_cases`.
    pub fn set_loads(&mut self, loads: DMatrix<f64>) -> Result<()> {
        if loads.nrows() != self.n_dofs() || loads.ncols() == 0 {
            return Err(Error::Config(format!(
                "nodal loads must have {} rows and at least one case, got {}x{}",
                self.n_dofs(),
                loads.nrows(),
                loads.ncols()
            )));
        }
        self.loads = loads;
        Ok(())
    }

    pub fn loads(&self) -> &DMatrix<f64> {
        &self.loads
    }

    /// Support a single DOF.
    pub fn fix(&mut self, point: usize, dof: usize) -> Result<()> {
        let i = self.dof(point, dof)?;
        self.fixity[i] = true;
        Ok(())
    }

    /// Support every DOF of a point.
    pub fn fix_point(&mut self, point: usize) -> Result<()> {
        for d in 0..self.ndofn {
            self.fix(point, d)?;
        }
        Ok(())
    }

    pub fn is_fixed(&self, point: usize, dof: usize) -> bool {
        self.dof(point, dof).map(|i| self.fixity[i]).unwrap_or(false)
    }

    /// Global indices of all supported DOFs, ascending.
    pub fn fixed_dofs(&self) -> Vec<usize> {
        self.fixity
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect()
    }

    pub fn clear_fixity(&mut self) {
        self.fixity.iter_mut().for_each(|f| *f = false);
        self.prescribed = None;
    }

    /// Support a DOF with a non-zero value in one load case.
    pub fn prescribe(&mut self, point: usize, dof: usize, case: usize, value: f64) -> Result<()> {
        let i = self.dof(point, dof)?;
        let n_cases = self.n_cases();
        if case >= n_cases {
            return Err(Error::Config(format!(
                "load case {} out of range ({} cases)",
                case, n_cases
            )));
        }
        let n_dofs = self.n_dofs();
        let values = self
            .prescribed
            .get_or_insert_with(|| DMatrix::zeros(n_dofs, n_cases));
        values[(i, case)] = value;
        self.fixity[i] = true;
        Ok(())
    }

    /// Prescribed values of supported DOFs, if any were set.
    pub fn prescribed(&self) -> Option<&DMatrix<f64>> {
        self.prescribed.as_ref()
    }

    /// Store the solution, shape `n_dofs × n_cases`.
    pub fn set_solution(&mut self, solution: DMatrix<f64>) -> Result<()> {
        if solution.nrows() != self.n_dofs() {
            return Err(Error::Solver(format!(
                "solution has {} rows, expected {}",
                solution.nrows(),
                self.n_dofs()
            )));
        }
        self.solution = Some(solution);
        Ok(())
    }

    pub fn solution(&self) -> Option<&DMatrix<f64>> {
        self.solution.as_ref()
    }

    /// Solution value of one DOF in one case.
    pub fn displacement(&self, point: usize, dof: usize, case: usize) -> Option<f64> {
        let i = self.dof(point, dof).ok()?;
        let sol = self.solution.as_ref()?;
        (case < sol.ncols()).then(|| sol[(i, case)])
    }

    pub fn clear_solution(&mut self) {
        self.solution = None;
    }

    /// Attach a concentrated mass to a point.
    pub fn set_point_mass(&mut self, point: usize, mass: f64) -> Result<()> {
        if point >= self.n_points {
            return Err(Error::Mesh(format!("point {} out of range", point)));
        }
        let n_points = self.n_points;
        self.point_masses.get_or_insert_with(|| vec![0.0; n_points])[point] = mass;
        Ok(())
    }

    pub fn point_masses(&self) -> Option<&[f64]> {
        self.point_masses.as_deref()
    }
}
