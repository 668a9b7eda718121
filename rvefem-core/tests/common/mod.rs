//! Structured grids shared by the integration tests.

#![allow(dead_code)]

use rvefem_core::{ElementBlock, ElementType, Hooke, Material, Mesh, PointSet};

/// Points of a regular `nx × ny × nz` cell grid on the box `[lo, hi]`,
/// indexed `i + (nx + 1) (j + (ny + 1) k)`.
pub fn box_points(n: [usize; 3], lo: [f64; 3], hi: [f64; 3]) -> PointSet {
    let mut rows = Vec::new();
    for k in 0..=n[2] {
        for j in 0..=n[1] {
            for i in 0..=n[0] {
                let at = |d: usize, m: usize| {
                    if n[d] == 0 {
                        lo[d]
                    } else {
                        lo[d] + (hi[d] - lo[d]) * m as f64 / n[d] as f64
                    }
                };
                rows.push([at(0, i), at(1, j), at(2, k)]);
            }
        }
    }
    PointSet::from_rows(&rows)
}

pub fn grid_index(n: [usize; 3], i: usize, j: usize, k: usize) -> usize {
    i + (n[0] + 1) * (j + (n[1] + 1) * k)
}

/// Hex8 connectivity of the cells of a `box_points` grid.
pub fn hex_cells(n: [usize; 3]) -> Vec<Vec<usize>> {
    let mut cells = Vec::new();
    for k in 0..n[2] {
        for j in 0..n[1] {
            for i in 0..n[0] {
                let p = |di, dj, dk| grid_index(n, i + di, j + dj, k + dk);
                cells.push(vec![
                    p(0, 0, 0),
                    p(1, 0, 0),
                    p(1, 1, 0),
                    p(0, 1, 0),
                    p(0, 0, 1),
                    p(1, 0, 1),
                    p(1, 1, 1),
                    p(0, 1, 1),
                ]);
            }
        }
    }
    cells
}

/// Quadrilateral connectivity of an `nx × ny` grid in the plane `z = 0`,
/// with the cell index of each quad.
pub fn quad_cells(nx: usize, ny: usize) -> Vec<((usize, usize), Vec<usize>)> {
    let n = [nx, ny, 0];
    let mut cells = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let p = |di, dj| grid_index(n, i + di, j + dj, 0);
            cells.push(((i, j), vec![p(0, 0), p(1, 0), p(1, 1), p(0, 1)]));
        }
    }
    cells
}

/// A single Hex8 block of one isotropic material.
pub fn solid_mesh(n: [usize; 3], lo: [f64; 3], hi: [f64; 3], material: Material) -> Mesh {
    let mut mesh = Mesh::new(box_points(n, lo, hi), 3).unwrap();
    mesh.set_hooke(Mesh::ROOT, Hooke::model(material)).unwrap();
    let block = ElementBlock::new(ElementType::Hex8, hex_cells(n)).unwrap();
    mesh.add_block(Mesh::ROOT, "solid", block).unwrap();
    mesh
}

/// An `nx × ny` ShellQ4 mesh of the unit square, without blocks.
pub fn unit_square(nx: usize, ny: usize) -> Mesh {
    let points = box_points([nx, ny, 0], [0.0; 3], [1.0, 1.0, 0.0]);
    Mesh::new(points, 6).unwrap()
}
