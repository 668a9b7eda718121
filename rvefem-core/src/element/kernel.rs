//! Batched evaluation of element kinematics for one block.
//!
//! A [`BlockKernel`] evaluates shape functions, Jacobians and B-matrices of
//! every element of a block at one set of natural points, together with the
//! model stiffness of every element. Stiffness assembly, load integration,
//! stress recovery and homogenization all consume the same kernel, so they
//! share the quadrature rule of the element type.

use crate::element::gauss::GaussPoint;
use crate::element::kinematics::{self, model_stiffness, strain_displacement, DRILLING_FACTOR};
use crate::error::{Error, Result};
use crate::mesh::{ElementBlock, ElementType, Mesh, NodeId};
use crate::types::{Frame, Point3};
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;

/// Kinematics at one natural point of one element.
#[derive(Debug, Clone)]
pub struct KernelPoint {
    /// Natural coordinates.
    pub natural: [f64; 3],
    /// Quadrature weight (zero for pure evaluation points).
    pub weight: f64,
    /// Jacobian determinant.
    pub det_j: f64,
    /// Shape function values.
    pub shape: Vec<f64>,
    /// Strain-displacement matrix in global DOFs, `n_strains × n_dofs`.
    pub b: DMatrix<f64>,
    /// Drilling constraint row of shells, `1 × n_dofs`.
    pub drilling: Option<DMatrix<f64>>,
    /// Physical position.
    pub position: Point3,
}

impl KernelPoint {
    /// Integration factor `w |J|`.
    #[inline]
    pub fn dv(&self) -> f64 {
        self.weight * self.det_j
    }
}

/// Kinematics and model stiffness of one element.
#[derive(Debug, Clone)]
pub struct ElementKernel {
    /// Global DOF indices, `NDOFN * node + dof`.
    pub dofs: Vec<usize>,
    pub points: Vec<KernelPoint>,
    /// Stiffness of the model strains (`C`, `diag(D, S)` or `diag(A, D, S)`).
    pub model: DMatrix<f64>,
    /// Penalty on the drilling constraint, zero for non-shells.
    pub drilling_stiffness: f64,
    pub thickness: Option<f64>,
    /// Local frame of surface elements, identity for solids.
    pub frame: Frame,
}

/// Kernel evaluation of all elements of a block.
#[derive(Debug, Clone)]
pub struct BlockKernel {
    pub block: NodeId,
    pub name: String,
    pub element_type: ElementType,
    pub ndofn: usize,
    /// Resolved material matrix (6x6 solid or 5x5 surface).
    pub hooke: DMatrix<f64>,
    pub elements: Vec<ElementKernel>,
}

impl BlockKernel {
    /// Evaluate at the quadrature points of the element type.
    pub fn build(mesh: &Mesh, id: NodeId) -> Result<Self> {
        let rule = Self::element_type_of(mesh, id)?.quadrature();
        Self::with_rule(mesh, id, &rule)
    }

    /// Evaluate at the quadrature used for consistent mass.
    pub fn for_mass(mesh: &Mesh, id: NodeId) -> Result<Self> {
        let rule = Self::element_type_of(mesh, id)?.mass_quadrature();
        Self::with_rule(mesh, id, &rule)
    }

    /// Evaluate at the element nodes (zero weights), for nodal recovery.
    pub fn at_nodes(mesh: &Mesh, id: NodeId) -> Result<Self> {
        let rule: Vec<GaussPoint> = Self::element_type_of(mesh, id)?
            .cell()
            .nodal_coords()
            .into_iter()
            .map(|p| GaussPoint::new(p, 0.0))
            .collect();
        Self::with_rule(mesh, id, &rule)
    }

    fn element_type_of(mesh: &Mesh, id: NodeId) -> Result<ElementType> {
        mesh.block(id)
            .map(|b| b.element_type())
            .ok_or_else(|| Error::Mesh(format!("mesh node {} is not an element block", id)))
    }

    /// Evaluate at arbitrary natural points.
    pub fn with_rule(mesh: &Mesh, id: NodeId, rule: &[GaussPoint]) -> Result<Self> {
        let name = mesh.name(id).to_string();
        let block = mesh
            .block(id)
            .ok_or_else(|| Error::Mesh(format!("mesh node {} is not an element block", id)))?;
        let element_type = block.element_type();
        let hooke = mesh
            .resolve_hooke(id, element_type.hooke_layout())
            .map_err(|e| e.in_block(&name))?;
        let ndofn = mesh.ndofn();
        let dofs = block.global_dof_numbering(ndofn);

        let elements = (0..block.n_elements())
            .into_par_iter()
            .map(|e| {
                evaluate_element(mesh, block, &name, e, &hooke, rule, dofs[e].clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            block: id,
            name,
            element_type,
            ndofn,
            hooke,
            elements,
        })
    }

    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Element stiffness `Σ w|J| BᵀCB` plus the drilling penalty of shells.
    pub fn stiffness(&self, e: usize) -> DMatrix<f64> {
        let el = &self.elements[e];
        let n = el.dofs.len();
        let mut ke = DMatrix::zeros(n, n);
        for p in &el.points {
            let bt = p.b.transpose();
            ke += (&bt * &el.model * &p.b) * p.dv();
            if let Some(d) = &p.drilling {
                ke += (d.transpose() * d) * (el.drilling_stiffness * p.dv());
            }
        }
        ke
    }

    /// Consistent mass `Σ w|J| ρ (NᵀN ⊗ diag(m))`.
    pub fn mass(&self, e: usize, density: f64) -> DMatrix<f64> {
        let el = &self.elements[e];
        let ndofn = self.ndofn;
        let weights = kinematics::inertia_weights(self.element_type, el.thickness);
        let n = el.dofs.len();
        let mut me = DMatrix::zeros(n, n);
        for p in &el.points {
            let f = p.dv() * density;
            for (i, ni) in p.shape.iter().enumerate() {
                for (j, nj) in p.shape.iter().enumerate() {
                    for (a, m) in weights.iter().enumerate() {
                        me[(i * ndofn + a, j * ndofn + a)] += f * ni * nj * m;
                    }
                }
            }
        }
        me
    }

    /// Body-load vector `Σ w|J| Nᵀq`; `q` is `NDOFN × n_cases`.
    pub fn body_load(&self, e: usize, q: &DMatrix<f64>) -> DMatrix<f64> {
        let el = &self.elements[e];
        let ndofn = self.ndofn;
        let mut fe = DMatrix::zeros(el.dofs.len(), q.ncols());
        for p in &el.points {
            for (i, ni) in p.shape.iter().enumerate() {
                for a in 0..ndofn {
                    for c in 0..q.ncols() {
                        fe[(i * ndofn + a, c)] += p.dv() * ni * q[(a, c)];
                    }
                }
            }
        }
        fe
    }

    /// Initial-strain load vector `Σ w|J| BᵀCε₀`; `eps0` is `n_strains × n_cases`.
    pub fn strain_load(&self, e: usize, eps0: &DMatrix<f64>) -> DMatrix<f64> {
        let el = &self.elements[e];
        let sigma0 = &el.model * eps0;
        let mut fe = DMatrix::zeros(el.dofs.len(), eps0.ncols());
        for p in &el.points {
            fe += (p.b.transpose() * &sigma0) * p.dv();
        }
        fe
    }

    /// Length, area or volume of an element.
    pub fn measure(&self, e: usize) -> f64 {
        self.elements[e].points.iter().map(KernelPoint::dv).sum()
    }

    pub fn measures(&self) -> Vec<f64> {
        (0..self.n_elements()).map(|e| self.measure(e)).collect()
    }

    /// Element DOF values gathered from a global `n_dofs × n_cases` array.
    pub fn gather(&self, e: usize, global: &DMatrix<f64>) -> DMatrix<f64> {
        let dofs = &self.elements[e].dofs;
        DMatrix::from_fn(dofs.len(), global.ncols(), |i, c| global[(dofs[i], c)])
    }

    /// Model strains `B uₑ` per point, each `n_strains × n_cases`.
    pub fn strains(&self, e: usize, solution: &DMatrix<f64>) -> Vec<DMatrix<f64>> {
        let ue = self.gather(e, solution);
        self.elements[e].points.iter().map(|p| &p.b * &ue).collect()
    }
}

/// Frame of a flat quadrilateral from its first two edges.
pub fn default_frame(coords: &[Point3]) -> Frame {
    let e1 = (coords[1] - coords[0]).normalize();
    let normal = (coords[1] - coords[0]).cross(&(coords[3] - coords[0])).normalize();
    let e2 = normal.cross(&e1);
    Frame::from_rows(&[e1.transpose(), e2.transpose(), normal.transpose()])
}

fn evaluate_element(
    mesh: &Mesh,
    block: &ElementBlock,
    name: &str,
    e: usize,
    hooke: &DMatrix<f64>,
    rule: &[GaussPoint],
    dofs: Vec<usize>,
) -> Result<ElementKernel> {
    let et = block.element_type();
    let cell = et.cell();
    let dim = cell.dim();
    let ndofn = et.dofs_per_node();
    let coords = block.cell_coords(mesh.points(), e);

    let frame = match et {
        ElementType::ShellQ4 => block
            .frame(e)
            .copied()
            .unwrap_or_else(|| default_frame(&coords)),
        _ => Frame::identity(),
    };

    // Local coordinates, n_nodes × dim
    let local = DMatrix::from_fn(coords.len(), dim, |i, k| (frame * coords[i])[k]);

    let transform = (et == ElementType::ShellQ4).then(|| {
        let n = dofs.len();
        let mut t = DMatrix::zeros(n, n);
        for g in 0..n / 3 {
            t.view_mut((3 * g, 3 * g), (3, 3)).copy_from(&frame);
        }
        t
    });

    let thickness = block.thickness(e);
    let model = model_stiffness(et, hooke, thickness).map_err(|err| err.in_block(name))?;
    let drilling_stiffness = match et {
        ElementType::ShellQ4 => DRILLING_FACTOR * model[(2, 2)],
        _ => 0.0,
    };

    let geometry_error = |point: usize, det_j: f64| Error::Geometry {
        block: name.to_string(),
        element: e,
        point,
        det_j,
    };

    let mut points = Vec::with_capacity(rule.len());
    for (q, gp) in rule.iter().enumerate() {
        let shape = cell.shape_functions(&gp.coords);
        let dn = cell.shape_derivatives(&gp.coords);
        let jac = &dn * &local;
        let det_j = jac.determinant();
        if !(det_j > 0.0) {
            return Err(geometry_error(q, det_j));
        }
        let jinv = jac
            .try_inverse()
            .ok_or_else(|| geometry_error(q, det_j))?;
        let grads = jinv * dn;

        let mut b = strain_displacement(et.strain_table(), et.n_strains(), ndofn, &shape, &grads);
        let mut drilling = (et == ElementType::ShellQ4).then(|| {
            strain_displacement(&kinematics::DRILLING, 1, ndofn, &shape, &grads)
        });
        if let Some(t) = &transform {
            b = b * t;
            drilling = drilling.map(|d| d * t);
        }

        let position = coords
            .iter()
            .zip(&shape)
            .fold(Vector3::zeros(), |acc, (x, n)| acc + x * *n);

        points.push(KernelPoint {
            natural: gp.coords,
            weight: gp.weight,
            det_j,
            shape,
            b,
            drilling,
            position,
        });
    }

    Ok(ElementKernel {
        dofs,
        points,
        model,
        drilling_stiffness,
        thickness,
        frame,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Hooke, Material};
    use crate::mesh::PointSet;
    use approx::assert_relative_eq;
    use nalgebra::DVector;
    use proptest::prelude::*;

    const UNIT_CUBE: [[f64; 3]; 8] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ];

    fn single_element_mesh(rows: &[[f64; 3]], et: ElementType) -> (Mesh, NodeId) {
        let mut mesh = Mesh::new(PointSet::from_rows(rows), et.dofs_per_node()).unwrap();
        mesh.set_hooke(Mesh::ROOT, Hooke::model(Material::new(1000.0, 0.3).unwrap()))
            .unwrap();
        let mut block =
            ElementBlock::new(et, vec![(0..et.n_nodes()).collect()]).unwrap();
        if !et.is_solid() {
            block = block.with_thickness(0.1).unwrap();
        }
        let id = mesh.add_block(Mesh::ROOT, "single", block).unwrap();
        (mesh, id)
    }

    fn assert_symmetric(k: &DMatrix<f64>) {
        let scale = k.amax();
        for i in 0..k.nrows() {
            for j in 0..k.ncols() {
                assert_relative_eq!(k[(i, j)], k[(j, i)], epsilon = 1e-12 * scale);
            }
        }
    }

    #[test]
    fn test_hex8_volume_and_symmetry() {
        let (mesh, id) = single_element_mesh(&UNIT_CUBE, ElementType::Hex8);
        let kernel = BlockKernel::build(&mesh, id).unwrap();
        assert_eq!(kernel.elements[0].points.len(), 8);
        assert_relative_eq!(kernel.measure(0), 1.0, epsilon = 1e-14);
        let k = kernel.stiffness(0);
        assert_eq!(k.shape(), (24, 24));
        assert_symmetric(&k);
        for i in 0..24 {
            assert!(k[(i, i)] > 0.0, "Diagonal {} is not positive", i);
        }
    }

    #[test]
    fn test_tet4_volume() {
        let rows = [
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 2.0],
        ];
        let (mesh, id) = single_element_mesh(&rows, ElementType::Tet4);
        let kernel = BlockKernel::build(&mesh, id).unwrap();
        assert_relative_eq!(kernel.measure(0), 8.0 / 6.0, epsilon = 1e-14);
    }

    #[test]
    fn test_inverted_element_is_a_geometry_error() {
        let mut rows = UNIT_CUBE;
        rows.swap(1, 3);
        rows.swap(5, 7);
        let (mesh, id) = single_element_mesh(&rows, ElementType::Hex8);
        match BlockKernel::build(&mesh, id) {
            Err(Error::Geometry { block, element, det_j, .. }) => {
                assert_eq!(block, "single");
                assert_eq!(element, 0);
                assert!(det_j < 0.0);
            }
            other => panic!("expected a geometry error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_degenerate_element_is_a_geometry_error() {
        let rows = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [3.0, 0.0, 0.0],
        ];
        let (mesh, id) = single_element_mesh(&rows, ElementType::Tet4);
        assert!(matches!(
            BlockKernel::build(&mesh, id),
            Err(Error::Geometry { .. })
        ));
    }

    #[test]
    fn test_missing_hooke_names_block() {
        let mut mesh = Mesh::new(PointSet::from_rows(&UNIT_CUBE), 3).unwrap();
        let block = ElementBlock::new(ElementType::Hex8, vec![(0..8).collect()]).unwrap();
        let id = mesh.add_block(Mesh::ROOT, "bare", block).unwrap();
        let err = BlockKernel::build(&mesh, id).unwrap_err();
        assert!(matches!(err, Error::Block { ref block, .. } if block == "bare"));
    }

    #[test]
    fn test_hex8_mass_sums_to_total_mass() {
        let (mesh, id) = single_element_mesh(&UNIT_CUBE, ElementType::Hex8);
        let kernel = BlockKernel::for_mass(&mesh, id).unwrap();
        let m = kernel.mass(0, 7.0);
        // Each translational direction carries the full mass
        let mut ux = DVector::zeros(24);
        for i in 0..8 {
            ux[3 * i] = 1.0;
        }
        assert_relative_eq!((ux.transpose() * &m * &ux)[0], 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tet4_mass_uses_exact_rule() {
        let rows = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let (mesh, id) = single_element_mesh(&rows, ElementType::Tet4);
        let m = BlockKernel::for_mass(&mesh, id).unwrap().mass(0, 1.0);
        // Consistent Tet4 mass: ρV/10 on the diagonal, ρV/20 off it
        let v = 1.0 / 6.0;
        assert_relative_eq!(m[(0, 0)], v / 10.0, epsilon = 1e-14);
        assert_relative_eq!(m[(0, 3)], v / 20.0, epsilon = 1e-14);
        assert_relative_eq!(m[(0, 1)], 0.0);
    }

    #[test]
    fn test_body_load_distributes_total_force() {
        let (mesh, id) = single_element_mesh(&UNIT_CUBE, ElementType::Hex8);
        let kernel = BlockKernel::build(&mesh, id).unwrap();
        let q = DMatrix::from_column_slice(3, 2, &[0.0, 0.0, -10.0, 1.0, 0.0, 0.0]);
        let f = kernel.body_load(0, &q);
        let fz: f64 = (0..8).map(|i| f[(3 * i + 2, 0)]).sum();
        let fx: f64 = (0..8).map(|i| f[(3 * i, 1)]).sum();
        assert_relative_eq!(fz, -10.0, epsilon = 1e-12);
        assert_relative_eq!(fx, 1.0, epsilon = 1e-12);
        assert_relative_eq!(f[(2, 0)], -10.0 / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_strain_load_reproduces_imposed_strain() {
        // A uniform initial strain produces the same load as a compatible displacement
        // field with that strain: f = K u for u = ε₀ x
        let (mesh, id) = single_element_mesh(&UNIT_CUBE, ElementType::Hex8);
        let kernel = BlockKernel::build(&mesh, id).unwrap();
        let eps0 = DMatrix::from_column_slice(6, 1, &[1e-3, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let f = kernel.strain_load(0, &eps0);
        let mut u = DMatrix::zeros(24, 1);
        for (i, row) in UNIT_CUBE.iter().enumerate() {
            u[(3 * i, 0)] = 1e-3 * row[0];
        }
        let ku = kernel.stiffness(0) * u;
        assert_relative_eq!(f, ku, epsilon = 1e-10);
    }

    #[test]
    fn test_shell_in_plane_rotation_is_energy_free() {
        let rows = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let (mesh, id) = single_element_mesh(&rows, ElementType::ShellQ4);
        let kernel = BlockKernel::build(&mesh, id).unwrap();
        let k = kernel.stiffness(0);
        assert_symmetric(&k);
        let omega = 1e-3;
        let mut u = DVector::zeros(24);
        for (i, r) in rows.iter().enumerate() {
            u[6 * i] = -omega * r[1];
            u[6 * i + 1] = omega * r[0];
            u[6 * i + 5] = omega;
        }
        assert_relative_eq!((&k * &u).norm(), 0.0, epsilon = 1e-12);
        // The drilling DOF alone is penalized
        let mut rz = DVector::zeros(24);
        rz[5] = 1.0;
        assert!((rz.transpose() * &k * &rz)[0] > 0.0);
    }

    #[test]
    fn test_shell_frame_rotates_b_to_global() {
        // A shell in the xz-plane stretched along global x only sees εx
        let rows = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
        ];
        let (mesh, id) = single_element_mesh(&rows, ElementType::ShellQ4);
        let kernel = BlockKernel::build(&mesh, id).unwrap();
        let frame = kernel.elements[0].frame;
        assert_relative_eq!(frame.row(2).transpose(), Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-14);
        let mut u = DMatrix::zeros(24, 1);
        for (i, r) in rows.iter().enumerate() {
            u[(6 * i, 0)] = 0.01 * r[0];
        }
        let eps = &kernel.elements[0].points[0].b * u;
        assert_relative_eq!(eps[(0, 0)], 0.01, epsilon = 1e-14);
        for k in 1..8 {
            assert_relative_eq!(eps[(k, 0)], 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_nodal_evaluation_points() {
        let (mesh, id) = single_element_mesh(&UNIT_CUBE, ElementType::Hex8);
        let kernel = BlockKernel::at_nodes(&mesh, id).unwrap();
        let el = &kernel.elements[0];
        assert_eq!(el.points.len(), 8);
        for (p, row) in el.points.iter().zip(UNIT_CUBE.iter()) {
            assert_relative_eq!(p.position, Point3::new(row[0], row[1], row[2]), epsilon = 1e-14);
            assert_eq!(p.weight, 0.0);
        }
    }

    proptest! {
        #[test]
        fn hex8_rigid_translation_is_in_null_space(
            a in 0.5..2.0f64, b in 0.5..2.0f64, c in 0.5..2.0f64,
            shear in -0.3..0.3f64,
            tx in -1.0..1.0f64, ty in -1.0..1.0f64, tz in -1.0..1.0f64,
        ) {
            let rows: Vec<[f64; 3]> = UNIT_CUBE
                .iter()
                .map(|p| [a * p[0] + shear * p[1], b * p[1], c * p[2]])
                .collect();
            let (mesh, id) = single_element_mesh(&rows, ElementType::Hex8);
            let kernel = BlockKernel::build(&mesh, id).unwrap();
            let k = kernel.stiffness(0);
            let mut u = DVector::zeros(24);
            for i in 0..8 {
                u[3 * i] = tx;
                u[3 * i + 1] = ty;
                u[3 * i + 2] = tz;
            }
            let residual = (&k * &u).norm();
            prop_assert!(residual <= 1e-9 * k.amax());
            prop_assert!((kernel.measure(0) - a * b * c).abs() < 1e-12);
        }
    }
}
