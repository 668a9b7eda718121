//! Hierarchical mesh: one shared point set, a tree of groups and element blocks.
//!
//! The tree is stored as an arena of [`MeshNode`]s. The root (id 0) owns the
//! point set, the number of DOFs per node and the nodal fields. Constitutive
//! data may be attached to any node and is inherited by every block below it.

use crate::element::gauss::{gauss_hex, gauss_quad, gauss_tet, GaussPoint};
use crate::element::kinematics::{self, BEntry};
use crate::element::shape::ReferenceCell;
use crate::error::{Error, Result};
use crate::fields::NodalFields;
use crate::material::{Hooke, HookeLayout};
use crate::types::{Frame, Point3};
use nalgebra::DMatrix;
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// Supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 8-node hexahedron (trilinear solid).
    Hex8,
    /// 4-node tetrahedron (linear solid).
    Tet4,
    /// 4-node Mindlin-Reissner plate, DOFs `[UZ, ROTX, ROTY]`.
    PlateQ4,
    /// 4-node Mindlin-Reissner shell, DOFs `[UX, UY, UZ, ROTX, ROTY, ROTZ]`.
    ShellQ4,
}

impl ElementType {
    /// Number of nodes for this element type.
    pub fn n_nodes(self) -> usize {
        self.cell().n_nodes()
    }

    /// Spatial dimension of the reference cell (2D or 3D).
    pub fn dimension(self) -> usize {
        self.cell().dim()
    }

    pub fn cell(self) -> ReferenceCell {
        match self {
            ElementType::Hex8 => ReferenceCell::Hexahedron,
            ElementType::Tet4 => ReferenceCell::Tetrahedron,
            ElementType::PlateQ4 | ElementType::ShellQ4 => ReferenceCell::Quadrilateral,
        }
    }

    pub fn dofs_per_node(self) -> usize {
        match self {
            ElementType::ShellQ4 => 6,
            _ => 3,
        }
    }

    /// Number of model strain components.
    pub fn n_strains(self) -> usize {
        match self {
            ElementType::Hex8 | ElementType::Tet4 => 6,
            ElementType::PlateQ4 => 5,
            ElementType::ShellQ4 => 8,
        }
    }

    pub fn is_solid(self) -> bool {
        self.dimension() == 3
    }

    pub fn hooke_layout(self) -> HookeLayout {
        if self.is_solid() {
            HookeLayout::Solid
        } else {
            HookeLayout::Surface
        }
    }

    /// Quadrature shared by stiffness, loads and recovery.
    pub fn quadrature(self) -> Vec<GaussPoint> {
        match self {
            ElementType::Hex8 => gauss_hex(2),
            ElementType::Tet4 => gauss_tet(1),
            ElementType::PlateQ4 | ElementType::ShellQ4 => gauss_quad(2),
        }
    }

    /// Quadrature for the consistent mass matrix (exact for `NᵀN`).
    pub fn mass_quadrature(self) -> Vec<GaussPoint> {
        match self {
            ElementType::Tet4 => gauss_tet(4),
            other => other.quadrature(),
        }
    }

    /// Strain-displacement layout.
    pub fn strain_table(self) -> &'static [BEntry] {
        match self {
            ElementType::Hex8 | ElementType::Tet4 => &kinematics::SOLID,
            ElementType::PlateQ4 => &kinematics::PLATE,
            ElementType::ShellQ4 => &kinematics::SHELL,
        }
    }

    /// Local DOF indices that carry translational inertia.
    pub fn translational_dofs(self) -> &'static [usize] {
        match self {
            ElementType::PlateQ4 => &[0],
            _ => &[0, 1, 2],
        }
    }
}

/// Ordered set of 3D points shared by all blocks.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    coords: Vec<Point3>,
}

impl PointSet {
    pub fn new(coords: Vec<Point3>) -> Self {
        Self { coords }
    }

    /// Build from plain coordinate rows.
    pub fn from_rows(rows: &[[f64; 3]]) -> Self {
        Self::new(rows.iter().map(|r| Point3::new(r[0], r[1], r[2])).collect())
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Point3> {
        self.coords.get(idx)
    }

    pub fn as_slice(&self) -> &[Point3] {
        &self.coords
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point3> {
        self.coords.iter()
    }

    /// Axis-aligned bounding box.
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = self.coords.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.coords[1..] {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some((min, max))
    }

    /// Arithmetic mean of the points.
    pub fn centroid(&self) -> Option<Point3> {
        if self.coords.is_empty() {
            return None;
        }
        let sum = self.coords.iter().fold(Point3::zeros(), |acc, p| acc + p);
        Some(sum / self.coords.len() as f64)
    }

    /// Spatial index for repeated nearest-point queries.
    pub fn spatial_index(&self) -> PointIndex {
        let entries = self
            .coords
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.x, p.y, p.z], i))
            .collect();
        PointIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Index of the point closest to `target`, by a linear scan.
    ///
    /// Build a [`PointSet::spatial_index`] once for repeated queries.
    pub fn index_of_closest(&self, target: &Point3) -> Option<usize> {
        self.coords
            .iter()
            .map(|p| (p - target).norm_squared())
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}

/// R-tree over the points of a [`PointSet`].
#[derive(Debug)]
pub struct PointIndex {
    tree: RTree<GeomWithData<[f64; 3], usize>>,
}

impl PointIndex {
    pub fn nearest(&self, target: &Point3) -> Option<usize> {
        self.tree
            .nearest_neighbor(&[target.x, target.y, target.z])
            .map(|entry| entry.data)
    }
}

/// Per-element loads detached from a block.
#[derive(Debug, Clone, Default)]
pub struct BlockLoads {
    pub body: Option<Vec<DMatrix<f64>>>,
    pub strain: Option<Vec<DMatrix<f64>>>,
}

/// Cells of a single element type plus their per-element data.
#[derive(Debug, Clone)]
pub struct ElementBlock {
    element_type: ElementType,
    connectivity: Vec<Vec<usize>>,
    thickness: Option<Vec<f64>>,
    density: Option<Vec<f64>>,
    frames: Option<Vec<Frame>>,
    body_loads: Option<Vec<DMatrix<f64>>>,
    strain_loads: Option<Vec<DMatrix<f64>>>,
}

impl ElementBlock {
    /// Create a block, checking every connectivity row has the right length.
    pub fn new(element_type: ElementType, connectivity: Vec<Vec<usize>>) -> Result<Self> {
        let n = element_type.n_nodes();
        if let Some((e, row)) = connectivity.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(Error::Mesh(format!(
                "Element type {:?} requires {} nodes, element {} has {}",
                element_type,
                n,
                e,
                row.len()
            )));
        }
        Ok(Self {
            element_type,
            connectivity,
            thickness: None,
            density: None,
            frames: None,
            body_loads: None,
            strain_loads: None,
        })
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.n_elements() {
            return Err(Error::Config(format!(
                "{} given for {} elements, block has {}",
                what,
                len,
                self.n_elements()
            )));
        }
        Ok(())
    }

    /// Uniform thickness.
    pub fn with_thickness(self, t: f64) -> Result<Self> {
        let n = self.n_elements();
        self.with_thicknesses(vec![t; n])
    }

    /// Per-element thickness.
    pub fn with_thicknesses(mut self, t: Vec<f64>) -> Result<Self> {
        self.check_len("thickness", t.len())?;
        if t.iter().any(|&v| !(v > 0.0)) {
            return Err(Error::Config("thickness must be positive".into()));
        }
        self.thickness = Some(t);
        Ok(self)
    }

    /// Uniform mass density.
    pub fn with_density(self, rho: f64) -> Result<Self> {
        let n = self.n_elements();
        self.with_densities(vec![rho; n])
    }

    pub fn with_densities(mut self, rho: Vec<f64>) -> Result<Self> {
        self.check_len("density", rho.len())?;
        if rho.iter().any(|&v| v < 0.0) {
            return Err(Error::Config("density must not be negative".into()));
        }
        self.density = Some(rho);
        Ok(self)
    }

    /// Per-element local frames (rows are the local axes).
    pub fn with_frames(mut self, frames: Vec<Frame>) -> Result<Self> {
        self.check_len("frames", frames.len())?;
        for (e, f) in frames.iter().enumerate() {
            if (f * f.transpose() - Frame::identity()).amax() > 1e-8 {
                return Err(Error::Config(format!(
                    "frame of element {} is not orthonormal",
                    e
                )));
            }
        }
        self.frames = Some(frames);
        Ok(self)
    }

    /// Per-element body-load intensities, each `NDOFN × n_cases`.
    pub fn with_body_loads(mut self, loads: Vec<DMatrix<f64>>) -> Result<Self> {
        self.check_len("body loads", loads.len())?;
        check_case_arrays("body load", &loads, self.element_type.dofs_per_node())?;
        self.body_loads = Some(loads);
        Ok(self)
    }

    /// Install initial-strain loads, each `n_strains × n_cases`.
    pub fn set_strain_loads(&mut self, loads: Vec<DMatrix<f64>>) -> Result<()> {
        self.check_len("strain loads", loads.len())?;
        check_case_arrays("strain load", &loads, self.element_type.n_strains())?;
        self.strain_loads = Some(loads);
        Ok(())
    }

    pub fn clear_strain_loads(&mut self) {
        self.strain_loads = None;
    }

    /// Remove the body and strain loads, leaving the block unloaded.
    pub fn take_loads(&mut self) -> BlockLoads {
        BlockLoads {
            body: self.body_loads.take(),
            strain: self.strain_loads.take(),
        }
    }

    /// Reinstall loads removed with [`ElementBlock::take_loads`].
    pub fn restore_loads(&mut self, loads: BlockLoads) {
        self.body_loads = loads.body;
        self.strain_loads = loads.strain;
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn n_elements(&self) -> usize {
        self.connectivity.len()
    }

    pub fn connectivity(&self) -> &[Vec<usize>] {
        &self.connectivity
    }

    pub fn thickness(&self, e: usize) -> Option<f64> {
        self.thickness.as_ref().and_then(|t| t.get(e).copied())
    }

    pub fn density(&self, e: usize) -> Option<f64> {
        self.density.as_ref().and_then(|d| d.get(e).copied())
    }

    pub fn frame(&self, e: usize) -> Option<&Frame> {
        self.frames.as_ref().and_then(|f| f.get(e))
    }

    pub fn body_loads(&self) -> Option<&[DMatrix<f64>]> {
        self.body_loads.as_deref()
    }

    pub fn strain_loads(&self) -> Option<&[DMatrix<f64>]> {
        self.strain_loads.as_deref()
    }

    /// Coordinates of the nodes of one element.
    pub fn cell_coords(&self, points: &PointSet, e: usize) -> Vec<Point3> {
        self.connectivity[e]
            .iter()
            .map(|&i| points.as_slice()[i])
            .collect()
    }

    /// Mean of the nodal coordinates of every element.
    pub fn centers(&self, points: &PointSet) -> Vec<Point3> {
        (0..self.n_elements())
            .map(|e| {
                let coords = self.cell_coords(points, e);
                coords.iter().fold(Point3::zeros(), |acc, p| acc + p) / coords.len() as f64
            })
            .collect()
    }

    /// Global DOF indices per element: `NDOFN * node + local_dof`.
    pub fn global_dof_numbering(&self, ndofn: usize) -> Vec<Vec<usize>> {
        self.connectivity
            .iter()
            .map(|nodes| {
                nodes
                    .iter()
                    .flat_map(|&node| (0..ndofn).map(move |d| node * ndofn + d))
                    .collect()
            })
            .collect()
    }
}

fn check_case_arrays(what: &str, arrays: &[DMatrix<f64>], rows: usize) -> Result<()> {
    let n_cases = arrays.first().map(|a| a.ncols()).unwrap_or(0);
    for (e, a) in arrays.iter().enumerate() {
        if a.nrows() != rows || a.ncols() != n_cases {
            return Err(Error::Config(format!(
                "{} of element {} must be {}x{}, got {}x{}",
                what,
                e,
                rows,
                n_cases,
                a.nrows(),
                a.ncols()
            )));
        }
    }
    Ok(())
}

/// Identifier of a node in the mesh tree.
pub type NodeId = usize;

/// A group or block in the mesh tree.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub hooke: Option<Hooke>,
    pub block: Option<ElementBlock>,
}

/// Finite element mesh.
#[derive(Debug, Clone)]
pub struct Mesh {
    points: PointSet,
    ndofn: usize,
    nodes: Vec<MeshNode>,
    fields: NodalFields,
}

impl Mesh {
    /// Root node id.
    pub const ROOT: NodeId = 0;

    /// Create a mesh over `points` with `ndofn` DOFs per node.
    pub fn new(points: PointSet, ndofn: usize) -> Result<Self> {
        if ndofn == 0 {
            return Err(Error::Config("a mesh needs at least one DOF per node".into()));
        }
        let fields = NodalFields::new(points.len(), ndofn);
        Ok(Self {
            points,
            ndofn,
            nodes: vec![MeshNode {
                name: "root".into(),
                parent: None,
                children: Vec::new(),
                hooke: None,
                block: None,
            }],
            fields,
        })
    }

    fn push_node(&mut self, parent: NodeId, name: &str, block: Option<ElementBlock>) -> Result<NodeId> {
        match self.nodes.get(parent) {
            None => return Err(Error::Mesh(format!("parent node {} does not exist", parent))),
            Some(p) if p.block.is_some() => {
                return Err(Error::Mesh(format!(
                    "'{}' is an element block and cannot have children",
                    p.name
                )))
            }
            Some(_) => {}
        }
        if self.find(name).is_some() {
            return Err(Error::Mesh(format!("duplicate mesh node name '{}'", name)));
        }
        let id = self.nodes.len();
        self.nodes.push(MeshNode {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            hooke: None,
            block: None,
        });
        self.nodes[id].block = block;
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Add an empty group under `parent`.
    pub fn add_group(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.push_node(parent, name, None)
    }

    /// Add an element block under `parent`.
    pub fn add_block(&mut self, parent: NodeId, name: &str, block: ElementBlock) -> Result<NodeId> {
        let et = block.element_type();
        if et.dofs_per_node() != self.ndofn {
            return Err(Error::Config(format!(
                "block '{}' of type {:?} has {} DOFs per node, mesh has {}",
                name,
                et,
                et.dofs_per_node(),
                self.ndofn
            )));
        }
        if !et.is_solid() && block.thickness.is_none() {
            return Err(Error::Config(format!(
                "block '{}' of type {:?} requires a thickness",
                name, et
            )));
        }
        let n_points = self.points.len();
        for (e, nodes) in block.connectivity().iter().enumerate() {
            if let Some(&bad) = nodes.iter().find(|&&i| i >= n_points) {
                return Err(Error::Mesh(format!(
                    "block '{}', element {}: node index {} out of bounds (mesh has {} points)",
                    name, e, bad, n_points
                )));
            }
        }
        self.push_node(parent, name, Some(block))
    }

    /// Attach constitutive data to a node.
    pub fn set_hooke(&mut self, id: NodeId, hooke: impl Into<Hooke>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::Mesh(format!("mesh node {} does not exist", id)))?;
        node.hooke = Some(hooke.into());
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&MeshNode> {
        self.nodes.get(id)
    }

    /// Look up a node by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn block(&self, id: NodeId) -> Option<&ElementBlock> {
        self.nodes.get(id).and_then(|n| n.block.as_ref())
    }

    pub fn block_mut(&mut self, id: NodeId) -> Option<&mut ElementBlock> {
        self.nodes.get_mut(id).and_then(|n| n.block.as_mut())
    }

    /// Name of a node, empty for unknown ids.
    pub fn name(&self, id: NodeId) -> &str {
        self.nodes.get(id).map(|n| n.name.as_str()).unwrap_or("")
    }

    /// Every block in depth-first insertion order.
    pub fn leaf_blocks(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.block.is_some() {
                out.push(id);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Nearest non-empty property along the parent chain, starting at `id`.
    pub fn resolve<'a, T: ?Sized>(
        &'a self,
        id: NodeId,
        selector: impl Fn(&'a MeshNode) -> Option<&'a T>,
    ) -> Option<&'a T> {
        let mut current = Some(id);
        while let Some(i) = current {
            let node = self.nodes.get(i)?;
            if let Some(value) = selector(node) {
                return Some(value);
            }
            current = node.parent;
        }
        None
    }

    /// Constitutive matrix of a block in the given layout.
    pub fn resolve_hooke(&self, id: NodeId, layout: HookeLayout) -> Result<DMatrix<f64>> {
        self.resolve(id, |n| n.hooke.as_ref())
            .ok_or_else(|| {
                Error::Config(format!(
                    "no constitutive data found for '{}' or any of its ancestors",
                    self.name(id)
                ))
            })?
            .stiffness_matrix(layout)
    }

    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn ndofn(&self) -> usize {
        self.ndofn
    }

    pub fn n_dofs(&self) -> usize {
        self.points.len() * self.ndofn
    }

    pub fn fields(&self) -> &NodalFields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut NodalFields {
        &mut self.fields
    }

    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        self.points.bounds()
    }

    pub fn centroid(&self) -> Option<Point3> {
        self.points.centroid()
    }

    pub fn index_of_closest(&self, target: &Point3) -> Option<usize> {
        self.points.index_of_closest(target)
    }
}
