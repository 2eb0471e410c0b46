//! Small deterministic meshes.
//!
//! All faces are wound counter-clockwise when seen from outside (from +Z for
//! the planar meshes).

use std::f32::consts::TAU;

use glam::Vec3;

use crate::customdata::{LayerFlags, LayerType};
use crate::mesh::Mesh;
use crate::types::ElemFlags;

/// `nx` by `ny` quads in the XY plane, centered on the origin, `size` wide.
///
/// Vertex `(x, y)` has index `y * (nx + 1) + x`.
pub fn grid(nx: u32, ny: u32, size: f32) -> Mesh {
    let positions = grid_positions(nx, ny, size);
    let mut faces = Vec::with_capacity((nx * ny) as usize);
    for y in 0..ny {
        for x in 0..nx {
            let a = y * (nx + 1) + x;
            faces.push(vec![a, a + 1, a + nx + 2, a + nx + 1]);
        }
    }
    build(positions, &faces)
}

/// Like [`grid`] with every quad split into `(a, b, c)` and `(a, c, d)`
pub fn triangle_grid(nx: u32, ny: u32, size: f32) -> Mesh {
    let positions = grid_positions(nx, ny, size);
    let mut faces = Vec::with_capacity((nx * ny * 2) as usize);
    for y in 0..ny {
        for x in 0..nx {
            let a = y * (nx + 1) + x;
            let (b, c, d) = (a + 1, a + nx + 2, a + nx + 1);
            faces.push(vec![a, b, c]);
            faces.push(vec![a, c, d]);
        }
    }
    build(positions, &faces)
}

/// Closed triangle fan: hub vertex 0 at the origin and `n` rim vertices on a
/// circle of `radius`.
pub fn fan(n: u32, radius: f32) -> Mesh {
    let mut positions = vec![Vec3::ZERO];
    for i in 0..n {
        let angle = TAU * i as f32 / n as f32;
        positions.push(Vec3::new(angle.cos(), angle.sin(), 0.0) * radius);
    }
    let faces: Vec<Vec<u32>> = (0..n).map(|i| vec![0, 1 + i, 1 + (i + 1) % n]).collect();
    build(positions, &faces)
}

/// Axis-aligned cube with quad faces
pub fn cube(size: f32) -> Mesh {
    let h = size * 0.5;
    let positions = vec![
        Vec3::new(-h, -h, -h),
        Vec3::new(h, -h, -h),
        Vec3::new(h, h, -h),
        Vec3::new(-h, h, -h),
        Vec3::new(-h, -h, h),
        Vec3::new(h, -h, h),
        Vec3::new(h, h, h),
        Vec3::new(-h, h, h),
    ];
    let faces = vec![
        vec![0, 3, 2, 1],
        vec![4, 5, 6, 7],
        vec![0, 1, 5, 4],
        vec![1, 2, 6, 5],
        vec![2, 3, 7, 6],
        vec![3, 0, 4, 7],
    ];
    build(positions, &faces)
}

/// Unit square split into `(0, 1, 2)` and `(1, 3, 2)` along a seam edge.
///
/// Carries a `"UVMap"` layer in which the second triangle is shifted one unit
/// along U, so the two corners on each seam vertex have different UVs.
pub fn seam_pair() -> Mesh {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
    ];
    let mut mesh = build(positions, &[vec![0, 1, 2], vec![1, 3, 2]]);
    if mesh.face_count() != 2 {
        return mesh;
    }

    let index = mesh.ldata.add_layer(LayerType::LoopUv, "UVMap", LayerFlags::empty());
    let offset = mesh.ldata.layers()[index].offset;
    for p in 0..mesh.face_count() {
        let shift = p as f32;
        for c in mesh.poly_corners(p) {
            let co = mesh.positions[mesh.corner_verts[c] as usize];
            mesh.ldata.set(c, offset, [co.x + shift, co.y]);
        }
    }

    for (e, &[a, b]) in mesh.edges.iter().enumerate() {
        if (a.min(b), a.max(b)) == (1, 2) {
            mesh.edge_flags[e] |= ElemFlags::SEAM;
        }
    }
    mesh
}

fn grid_positions(nx: u32, ny: u32, size: f32) -> Vec<Vec3> {
    let step = size / nx.max(ny).max(1) as f32;
    let origin = Vec3::new(nx as f32 * step, ny as f32 * step, 0.0) * -0.5;
    let mut positions = Vec::with_capacity(((nx + 1) * (ny + 1)) as usize);
    for y in 0..=ny {
        for x in 0..=nx {
            positions.push(origin + Vec3::new(x as f32 * step, y as f32 * step, 0.0));
        }
    }
    positions
}

fn build(positions: Vec<Vec3>, faces: &[Vec<u32>]) -> Mesh {
    Mesh::from_polygons(positions, faces).unwrap_or_else(|err| {
        tracing::error!("primitive construction failed: {}", err);
        Mesh::default()
    })
}
