//! Homogenization of periodic plate and shell microstructures.
//!
//! A representative volume element (RVE) is loaded with one unit macro
//! strain per load case, expressed as initial strains of its elements.
//! Periodic constraints tie the opposite sides of the cell in the plane and a
//! few anchors remove rigid translations. The fluctuation field `u_k` of each
//! case gives the response
//!
//! ```text
//! R  = Σ w|J| Pᵀ C B u_k        Ā = Σ w|J| Pᵀ C P
//! C* = (Ā - R) / area
//! ```
//!
//! where `P` maps macro strains to the element strains. The macro strains are
//! `[εx, εy, γxy, κx, κy, κxy]` for a Kirchhoff-Love plate, extended with
//! `[γxz, γyz]` for a Mindlin-Reissner plate.

use crate::analysis::Structure;
use crate::assembly::block_kernels;
use crate::bc::{apply_anchors, link_opposite_sides, periodic_constraints, Anchor, AnchorTarget};
use crate::config::{check_penalty, parse_json, AnalysisConfig, DEFAULT_PENALTY_RATIO};
use crate::element::kernel::BlockKernel;
use crate::element::kinematics::SHEAR_CORRECTION;
use crate::error::{Error, Result};
use crate::mesh::{BlockLoads, ElementType, Mesh, NodeId};
use crate::solver::SolverConfig;
use crate::types::{Frame, Point3, StrainTensor};
use log::{debug, info};
use nalgebra::{DMatrix, Matrix3, Matrix6, SMatrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Plate theory of the homogenized stiffness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PlateModel {
    /// Shear-deformable plate, 8 generalized strains (ABDS).
    #[default]
    MindlinReissner,
    /// Thin plate, 6 generalized strains (ABD).
    KirchhoffLove,
}

impl PlateModel {
    /// Number of generalized strains.
    pub fn n_strains(self) -> usize {
        match self {
            PlateModel::MindlinReissner => 8,
            PlateModel::KirchhoffLove => 6,
        }
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            PlateModel::MindlinReissner => "MR",
            PlateModel::KirchhoffLove => "KL",
        }
    }
}

impl FromStr for PlateModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mr" | "mindlin" | "mindlinreissner" | "mindlin-reissner" => {
                Ok(PlateModel::MindlinReissner)
            }
            "kl" | "kirchhoff" | "kirchhofflove" | "kirchhoff-love" => {
                Ok(PlateModel::KirchhoffLove)
            }
            _ => Err(Error::Config(format!("unknown plate model '{}'", s))),
        }
    }
}

impl TryFrom<String> for PlateModel {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PlateModel> for String {
    fn from(model: PlateModel) -> Self {
        model.abbreviation().to_string()
    }
}

impl fmt::Display for PlateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Homogenization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomogenizationConfig {
    pub model: PlateModel,
    /// Absolute penalty for anchors and periodic constraints.
    pub penalty: Option<f64>,
    /// Penalty relative to the largest diagonal stiffness, used without `penalty`.
    pub penalty_ratio: f64,
    /// Rigid-body anchors; `None` uses [`default_anchors`].
    pub anchors: Option<Vec<Anchor>>,
    /// Axes along which opposite sides of the cell are tied.
    pub periodic_axes: Vec<usize>,
    /// Distance tolerance for matching opposite sides.
    pub tolerance: f64,
    /// Height of the reference plane; `None` uses mid-height of the cell.
    pub reference_z: Option<f64>,
    pub solver: SolverConfig,
}

impl Default for HomogenizationConfig {
    fn default() -> Self {
        Self {
            model: PlateModel::default(),
            penalty: None,
            penalty_ratio: DEFAULT_PENALTY_RATIO,
            anchors: None,
            periodic_axes: vec![0, 1],
            tolerance: 1e-6,
            reference_z: None,
            solver: SolverConfig::default(),
        }
    }
}

impl HomogenizationConfig {
    pub fn new(model: PlateModel) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Parse from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_penalty(self.penalty, self.penalty_ratio)?;
        if let Some(&axis) = self.periodic_axes.iter().find(|&&a| a > 2) {
            return Err(Error::Config(format!("invalid periodic axis {}", axis)));
        }
        if !(self.tolerance > 0.0) {
            return Err(Error::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Anchors removing the rigid-body motion left free by `periodic_axes`.
///
/// With both in-plane axes periodic only rigid translations remain, and the
/// point closest to the centroid is supported in `UX, UY, UZ`. Otherwise the
/// rotations are removed as well: the point closest to the middle of the
/// `x = xmax` side is supported in `UY, UZ` and the point closest to the
/// middle of the `y = ymax` side in `UZ`. Those extra anchors also pin any
/// fluctuation that is periodic along the supported direction, so they are
/// only used where periodicity does not already fix the rotations.
pub fn default_anchors(min: &Point3, max: &Point3, periodic_axes: &[usize]) -> Vec<Anchor> {
    let centroid = Anchor::new(AnchorTarget::Centroid, vec![0, 1, 2]);
    if periodic_axes.contains(&0) && periodic_axes.contains(&1) {
        return vec![centroid];
    }
    let c = (min + max) / 2.0;
    vec![
        centroid,
        Anchor::new(AnchorTarget::Nearest([max.x, c.y, c.z]), vec![1, 2]),
        Anchor::new(AnchorTarget::Nearest([c.x, max.y, c.z]), vec![2]),
    ]
}

/// Homogenized stiffness of a cell.
#[derive(Debug, Clone)]
pub struct HomogenizationResult {
    pub model: PlateModel,
    /// Effective stiffness per unit area, `NSTRE × NSTRE`.
    pub stiffness: DMatrix<f64>,
    /// Integrated stiffness of the imposed macro strains, `Ā`.
    pub average: DMatrix<f64>,
    /// Integrated response of the fluctuation fields, `R`.
    pub response: DMatrix<f64>,
    /// Projected area of the cell.
    pub area: f64,
}

impl HomogenizationResult {
    /// Kirchhoff-Love `[[A, B], [B, D]]`.
    pub fn abd(&self) -> Result<Matrix6<f64>> {
        if self.model != PlateModel::KirchhoffLove {
            return Err(Error::Config(format!(
                "ABD requires a KL result, this one is {}",
                self.model
            )));
        }
        Ok(Matrix6::from_fn(|i, j| self.stiffness[(i, j)]))
    }

    /// Mindlin-Reissner `[[A, B, 0], [B, D, 0], [0, 0, S]]`.
    pub fn abds(&self) -> Result<SMatrix<f64, 8, 8>> {
        if self.model != PlateModel::MindlinReissner {
            return Err(Error::Config(format!(
                "ABDS requires an MR result, this one is {}",
                self.model
            )));
        }
        Ok(SMatrix::<f64, 8, 8>::from_fn(|i, j| self.stiffness[(i, j)]))
    }

    fn block3(&self, row: usize, col: usize) -> Matrix3<f64> {
        Matrix3::from_fn(|i, j| self.stiffness[(row + i, col + j)])
    }

    /// Membrane stiffness.
    pub fn a(&self) -> Matrix3<f64> {
        self.block3(0, 0)
    }

    /// Membrane-bending coupling.
    pub fn b(&self) -> Matrix3<f64> {
        self.block3(0, 3)
    }

    /// Bending stiffness.
    pub fn d(&self) -> Matrix3<f64> {
        self.block3(3, 3)
    }

    /// Transverse shear stiffness `[γxz, γyz]`, MR only.
    pub fn s(&self) -> Option<nalgebra::Matrix2<f64>> {
        (self.model == PlateModel::MindlinReissner)
            .then(|| nalgebra::Matrix2::from_fn(|i, j| self.stiffness[(6 + i, 6 + j)]))
    }
}

/// Bulk strains `[εx, εy, εz, γxy, γyz, γxz]` at height `z` for every macro strain.
fn solid_map(z: f64, n_strains: usize) -> DMatrix<f64> {
    let mut p = DMatrix::zeros(6, n_strains);
    p[(0, 0)] = 1.0;
    p[(0, 3)] = z;
    p[(1, 1)] = 1.0;
    p[(1, 4)] = z;
    p[(3, 2)] = 1.0;
    p[(3, 5)] = z;
    if n_strains == 8 {
        p[(4, 7)] = 1.0;
        p[(5, 6)] = 1.0;
    }
    p
}

/// Shell model strains in the element frame for every macro strain.
fn shell_map(frame: &Frame, z: f64, n_strains: usize) -> DMatrix<f64> {
    let mut p = DMatrix::zeros(8, n_strains);
    for k in 0..n_strains {
        let mut m = [0.0; 8];
        m[k] = 1.0;
        let membrane = StrainTensor::new([m[0] + z * m[3], m[1] + z * m[4], 0.0, m[2] + z * m[5], 0.0, 0.0])
            .rotated(frame);
        let curvature = StrainTensor::new([m[3], m[4], 0.0, m[5], 0.0, 0.0]).rotated(frame);
        let shear = StrainTensor::new([0.0, 0.0, 0.0, 0.0, m[7], m[6]]).rotated(frame);
        let column = [
            membrane.0[0],
            membrane.0[1],
            membrane.0[3],
            curvature.0[0],
            curvature.0[1],
            curvature.0[3],
            shear.0[5],
            shear.0[4],
        ];
        for (r, v) in column.into_iter().enumerate() {
            p[(r, k)] = v;
        }
    }
    p
}

fn macro_map(element_type: ElementType, frame: &Frame, z: f64, n_strains: usize) -> DMatrix<f64> {
    match element_type {
        ElementType::ShellQ4 => shell_map(frame, z, n_strains),
        _ => solid_map(z, n_strains),
    }
}

/// Mesh state overwritten by the homogenization solve.
struct SavedState {
    fields: crate::fields::NodalFields,
    constraints: Vec<crate::bc::LinearConstraint>,
    config: AnalysisConfig,
    loads: Vec<(NodeId, BlockLoads)>,
}

impl SavedState {
    fn capture(structure: &mut Structure, blocks: &[NodeId]) -> Self {
        let fields = structure.mesh().fields().clone();
        let constraints = structure.replace_constraints(Vec::new());
        let config = structure.config().clone();
        let mesh = structure.mesh_mut();
        let loads = blocks
            .iter()
            .filter_map(|&id| mesh.block_mut(id).map(|b| (id, b.take_loads())))
            .collect();
        Self {
            fields,
            constraints,
            config,
            loads,
        }
    }

    fn restore(self, structure: &mut Structure) {
        structure.replace_constraints(self.constraints);
        *structure.config_mut() = self.config;
        let mesh = structure.mesh_mut();
        *mesh.fields_mut() = self.fields;
        for (id, loads) in self.loads {
            if let Some(block) = mesh.block_mut(id) {
                block.restore_loads(loads);
            }
        }
    }
}

fn check_blocks(mesh: &Mesh, blocks: &[NodeId]) -> Result<()> {
    if blocks.is_empty() {
        return Err(Error::Config("the cell has no element blocks".into()));
    }
    for &id in blocks {
        if let Some(block) = mesh.block(id) {
            let et = block.element_type();
            if !(et.is_solid() || et == ElementType::ShellQ4) {
                return Err(Error::Config(format!(
                    "block '{}' of type {:?} cannot be homogenized; use solids or shells",
                    mesh.name(id),
                    et
                )));
            }
        }
    }
    Ok(())
}

/// Install the unit macro strains as initial strains of every element.
fn install_strain_loads(mesh: &mut Mesh, kernels: &[BlockKernel], z_ref: f64, n_strains: usize) -> Result<()> {
    for kernel in kernels {
        let centers = match mesh.block(kernel.block) {
            Some(block) => block.centers(mesh.points()),
            None => continue,
        };
        let loads: Vec<DMatrix<f64>> = centers
            .iter()
            .zip(&kernel.elements)
            .map(|(c, el)| macro_map(kernel.element_type, &el.frame, c.z - z_ref, n_strains))
            .collect();
        if let Some(block) = mesh.block_mut(kernel.block) {
            block
                .set_strain_loads(loads)
                .map_err(|e| e.in_block(&kernel.name))?;
        }
    }
    Ok(())
}

/// Solve the cell problem, leaving strain loads installed on success or failure.
fn solve_cell(
    structure: &mut Structure,
    config: &HomogenizationConfig,
    min: &Point3,
    max: &Point3,
    z_ref: f64,
) -> Result<(Vec<BlockKernel>, DMatrix<f64>)> {
    let n_strains = config.model.n_strains();
    let anchors = config
        .anchors
        .clone()
        .unwrap_or_else(|| default_anchors(min, max, &config.periodic_axes));

    let analysis = structure.config_mut();
    analysis.penalty = config.penalty;
    analysis.penalty_ratio = config.penalty_ratio;
    analysis.solver = config.solver.clone();

    let mesh = structure.mesh_mut();
    let links = link_opposite_sides(mesh.points(), &config.periodic_axes, config.tolerance)?;
    let ndofn = mesh.ndofn();
    let points = mesh.points().clone();
    let fields = mesh.fields_mut();
    fields.reset_loads(n_strains);
    fields.clear_fixity();
    fields.clear_solution();
    apply_anchors(fields, &points, &anchors)?;
    debug!(
        "cell constraints: {} anchors, {} periodic pairs",
        anchors.len(),
        links.len()
    );
    structure.add_constraints(periodic_constraints(&links, ndofn));

    let kernels = block_kernels(structure.mesh())?;
    install_strain_loads(structure.mesh_mut(), &kernels, z_ref, n_strains)?;
    let solution = structure.solve_with(&kernels)?.clone();
    Ok((kernels, solution))
}

/// Integrate `R = Σ w|J| PᵀCBu` and `Ā = Σ w|J| PᵀCP` over every block.
fn integrate(
    mesh: &Mesh,
    kernels: &[BlockKernel],
    solution: &DMatrix<f64>,
    z_ref: f64,
    n_strains: usize,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let zero = || (DMatrix::zeros(n_strains, n_strains), DMatrix::zeros(n_strains, n_strains));
    let mut response = DMatrix::zeros(n_strains, n_strains);
    let mut average = DMatrix::zeros(n_strains, n_strains);
    for kernel in kernels {
        let centers = mesh
            .block(kernel.block)
            .map(|b| b.centers(mesh.points()))
            .unwrap_or_default();
        let (r, a) = (0..kernel.n_elements())
            .into_par_iter()
            .map(|e| {
                let el = &kernel.elements[e];
                let ue = kernel.gather(e, solution);
                let (mut r, mut a) = zero();
                for p in &el.points {
                    // Shells use the same map as their loads, solids the height of the point
                    let z = match kernel.element_type {
                        ElementType::ShellQ4 => centers.get(e).map_or(0.0, |c| c.z) - z_ref,
                        _ => p.position.z - z_ref,
                    };
                    let map = macro_map(kernel.element_type, &el.frame, z, n_strains);
                    let ptc = map.transpose() * &el.model;
                    r += (&ptc * (&p.b * &ue)) * p.dv();
                    a += (&ptc * &map) * p.dv();
                }
                (r, a)
            })
            .reduce(|| zero(), |x, y| (x.0 + y.0, x.1 + y.1));
        response += r;
        average += a;
    }
    (response, average)
}

/// Homogenize the cell owned by `structure`.
///
/// Loads, supports, constraints and block loads of the structure are
/// restored afterwards, whether or not the solve succeeds.
pub fn homogenize(structure: &mut Structure, config: &HomogenizationConfig) -> Result<HomogenizationResult> {
    config.validate()?;
    let n_strains = config.model.n_strains();
    let blocks = structure.mesh().leaf_blocks();
    check_blocks(structure.mesh(), &blocks)?;

    let (min, max) = structure
        .mesh()
        .bounds()
        .ok_or_else(|| Error::Mesh("the cell has no points".into()))?;
    let area = (max.x - min.x) * (max.y - min.y);
    if !(area > 0.0) {
        return Err(Error::Config(format!(
            "the cell has no extent in the xy-plane (area {})",
            area
        )));
    }
    let z_ref = config.reference_z.unwrap_or((min.z + max.z) / 2.0);
    info!(
        "homogenizing {} blocks as {} plate, area {:e}, reference plane z = {}",
        blocks.len(),
        config.model,
        area,
        z_ref
    );

    let saved = SavedState::capture(structure, &blocks);
    let outcome = solve_cell(structure, config, &min, &max, z_ref);
    let mesh = structure.mesh_mut();
    for &id in &blocks {
        if let Some(block) = mesh.block_mut(id) {
            block.clear_strain_loads();
        }
    }
    let (kernels, solution) = match outcome {
        Ok(solved) => solved,
        Err(err) => {
            saved.restore(structure);
            return Err(err);
        }
    };

    let (response, average) = integrate(structure.mesh(), &kernels, &solution, z_ref, n_strains);
    saved.restore(structure);

    let mut stiffness = (&average - &response) / area;
    if config.model == PlateModel::MindlinReissner {
        let shear = response.view((6, 6), (2, 2)) * (SHEAR_CORRECTION / area);
        stiffness.view_mut((6, 6), (2, 2)).copy_from(&shear);
    }
    debug!("homogenized stiffness:{}", stiffness);

    Ok(HomogenizationResult {
        model: config.model,
        stiffness,
        average,
        response,
        area,
    })
}

impl Structure {
    /// Homogenized stiffness with default settings for the given model name
    /// (`"MR"` or `"KL"`).
    pub fn homogenize(&mut self, model: &str) -> Result<HomogenizationResult> {
        homogenize(self, &HomogenizationConfig::new(model.parse()?))
    }

    /// Kirchhoff-Love ABD matrix.
    pub fn abd(&mut self) -> Result<Matrix6<f64>> {
        homogenize(self, &HomogenizationConfig::new(PlateModel::KirchhoffLove))?.abd()
    }

    /// Mindlin-Reissner ABDS matrix.
    pub fn abds(&mut self) -> Result<SMatrix<f64, 8, 8>> {
        homogenize(self, &HomogenizationConfig::new(PlateModel::MindlinReissner))?.abds()
    }
}
