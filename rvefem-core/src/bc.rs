//! Boundary conditions enforced with the penalty method.
//!
//! Supported DOFs get a penalty `P` on the diagonal of the stiffness matrix and
//! `P · value` on the right-hand side. A linear constraint `aᵀu = c` adds
//! `P · a aᵀ` to the matrix and `P · a c` to every load case.

use crate::error::{Error, Result};
use crate::fields::NodalFields;
use crate::mesh::{PointIndex, PointSet};
use crate::sparse::{LoadMatrix, TripletMatrix};
use crate::types::Point3;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

/// Linear multi-point constraint `Σ coeff · u[dof] = value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub terms: Vec<(usize, f64)>,
    pub value: f64,
}

impl LinearConstraint {
    pub fn new(terms: Vec<(usize, f64)>, value: f64) -> Self {
        Self { terms, value }
    }

    /// `u[a] - u[b] = 0`.
    pub fn tie(a: usize, b: usize) -> Self {
        Self::new(vec![(a, 1.0), (b, -1.0)], 0.0)
    }
}

/// Penalty on the diagonal of every supported DOF.
pub fn penalty_matrix(n_dofs: usize, fixed: &[usize], penalty: f64) -> TripletMatrix {
    let mut t = TripletMatrix::with_capacity(n_dofs, n_dofs, fixed.len());
    for &dof in fixed {
        t.add(dof, dof, penalty);
    }
    t
}

/// `P · value` for prescribed DOFs, zero when nothing is prescribed.
///
/// Prescribed values must cover every load case.
pub fn prescribed_load(fields: &NodalFields, penalty: f64) -> Result<LoadMatrix> {
    let mut f = LoadMatrix::zeros(fields.n_dofs(), fields.n_cases());
    let Some(values) = fields.prescribed() else {
        return Ok(f);
    };
    if values.shape() != f.shape() {
        return Err(Error::Config(format!(
            "prescribed values are {}x{}, loads are {}x{}",
            values.nrows(),
            values.ncols(),
            f.nrows(),
            f.ncols()
        )));
    }
    for dof in fields.fixed_dofs() {
        for c in 0..f.ncols() {
            f[(dof, c)] = penalty * values[(dof, c)];
        }
    }
    Ok(f)
}

/// Penalty rows `P · a aᵀ` of all constraints.
pub fn constraint_matrix(
    constraints: &[LinearConstraint],
    n_dofs: usize,
    penalty: f64,
) -> Result<TripletMatrix> {
    let nnz = constraints.iter().map(|c| c.terms.len().pow(2)).sum();
    let mut t = TripletMatrix::with_capacity(n_dofs, n_dofs, nnz);
    for (k, c) in constraints.iter().enumerate() {
        check_terms(k, c, n_dofs)?;
        for &(i, ai) in &c.terms {
            for &(j, aj) in &c.terms {
                t.add(i, j, penalty * ai * aj);
            }
        }
    }
    Ok(t)
}

/// Right-hand side `P · a · value` of all constraints, repeated for every case.
pub fn constraint_load(
    constraints: &[LinearConstraint],
    n_dofs: usize,
    n_cases: usize,
    penalty: f64,
) -> Result<LoadMatrix> {
    let mut f = LoadMatrix::zeros(n_dofs, n_cases);
    for (k, c) in constraints.iter().enumerate() {
        check_terms(k, c, n_dofs)?;
        if c.value == 0.0 {
            continue;
        }
        for &(i, ai) in &c.terms {
            for case in 0..n_cases {
                f[(i, case)] += penalty * ai * c.value;
            }
        }
    }
    Ok(f)
}

fn check_terms(k: usize, c: &LinearConstraint, n_dofs: usize) -> Result<()> {
    match c.terms.iter().find(|(dof, _)| *dof >= n_dofs) {
        Some((dof, _)) => Err(Error::Config(format!(
            "constraint {} refers to DOF {}, system has {}",
            k, dof, n_dofs
        ))),
        None => Ok(()),
    }
}

/// Pair every point on the minimum face of the bounding box with its
/// counterpart on the maximum face, for each of the given axes.
///
/// Points are matched by the nearest remaining coordinates; a point without
/// a counterpart within `tol` is a mesh error. Returns `(min_side, max_side)`
/// pairs.
pub fn link_opposite_sides(
    points: &PointSet,
    axes: &[usize],
    tol: f64,
) -> Result<Vec<(usize, usize)>> {
    let (min, max) = points
        .bounds()
        .ok_or_else(|| Error::Mesh("cannot link sides of an empty point set".into()))?;
    let mut links = Vec::new();

    for &axis in axes {
        if axis > 2 {
            return Err(Error::Config(format!("invalid axis {}", axis)));
        }
        let others: Vec<usize> = (0..3).filter(|&a| a != axis).collect();
        let key = |p: &Point3| [p[others[0]], p[others[1]]];

        let on_side = |value: f64| -> Vec<usize> {
            points
                .iter()
                .enumerate()
                .filter(|(_, p)| (p[axis] - value).abs() <= tol)
                .map(|(i, _)| i)
                .collect()
        };
        let low = on_side(min[axis]);
        let high = on_side(max[axis]);
        if low.len() != high.len() {
            return Err(Error::Mesh(format!(
                "opposite faces along axis {} have {} and {} points",
                axis,
                low.len(),
                high.len()
            )));
        }

        let tree = RTree::bulk_load(
            high.iter()
                .map(|&i| GeomWithData::new(key(&points.as_slice()[i]), i))
                .collect(),
        );
        for &i in &low {
            let target = key(&points.as_slice()[i]);
            let partner = tree
                .nearest_neighbor(&target)
                .filter(|entry| {
                    let g = entry.geom();
                    ((g[0] - target[0]).powi(2) + (g[1] - target[1]).powi(2)).sqrt() <= tol
                })
                .ok_or_else(|| {
                    Error::Mesh(format!(
                        "point {} has no periodic counterpart along axis {}",
                        i, axis
                    ))
                })?;
            links.push((i, partner.data));
        }
    }
    Ok(links)
}

/// `u_a - u_b = 0` for every DOF of every linked pair.
pub fn periodic_constraints(links: &[(usize, usize)], ndofn: usize) -> Vec<LinearConstraint> {
    links
        .iter()
        .flat_map(|&(a, b)| {
            (0..ndofn).map(move |d| LinearConstraint::tie(a * ndofn + d, b * ndofn + d))
        })
        .collect()
}

/// Which point an [`Anchor`] fixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorTarget {
    /// Point closest to the centroid of the point set.
    Centroid,
    /// Point closest to a coordinate.
    Nearest([f64; 3]),
    /// A point index.
    Index(usize),
}

/// Rigid-body anchor: supports the listed DOFs of one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub target: AnchorTarget,
    pub dofs: Vec<usize>,
}

impl Anchor {
    pub fn new(target: AnchorTarget, dofs: Vec<usize>) -> Self {
        Self { target, dofs }
    }

    /// Index of the anchored point.
    pub fn resolve(&self, points: &PointSet) -> Result<usize> {
        let index = match &self.target {
            AnchorTarget::Centroid => points
                .centroid()
                .and_then(|c| points.index_of_closest(&c)),
            AnchorTarget::Nearest(x) => points.index_of_closest(&Point3::new(x[0], x[1], x[2])),
            AnchorTarget::Index(i) => (*i < points.len()).then_some(*i),
        };
        index.ok_or_else(|| self.unresolved())
    }

    /// Like [`Anchor::resolve`], answering nearest-point queries from `tree`.
    pub fn resolve_in(&self, points: &PointSet, tree: &PointIndex) -> Result<usize> {
        let index = match &self.target {
            AnchorTarget::Centroid => points.centroid().and_then(|c| tree.nearest(&c)),
            AnchorTarget::Nearest(x) => tree.nearest(&Point3::new(x[0], x[1], x[2])),
            AnchorTarget::Index(i) => (*i < points.len()).then_some(*i),
        };
        index.ok_or_else(|| self.unresolved())
    }

    fn unresolved(&self) -> Error {
        Error::Mesh(format!("cannot resolve anchor {:?}", self.target))
    }
}

/// Support the anchored DOFs.
pub fn apply_anchors(fields: &mut NodalFields, points: &PointSet, anchors: &[Anchor]) -> Result<()> {
    let tree = points.spatial_index();
    for anchor in anchors {
        let point = anchor.resolve_in(points, &tree)?;
        for &dof in &anchor.dofs {
            fields.fix(point, dof)?;
        }
    }
    Ok(())
}
