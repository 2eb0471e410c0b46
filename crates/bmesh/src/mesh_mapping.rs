//! Adjacency maps over the flat mesh.

use glam::Vec3;

use crate::disk::{angular_order, fan_order};
use crate::mesh::Mesh;

/// Incident edges of every vertex.
///
/// With `sorted`, each list is in the same rotational order that
/// [`BMesh::sort_disk_cycle`](crate::BMesh::sort_disk_cycle) produces.
pub fn vert_edge_map(mesh: &Mesh, sorted: bool) -> Vec<Vec<u32>> {
    let mut map: Vec<Vec<u32>> = vec![Vec::new(); mesh.vert_count()];
    for (e, &[a, b]) in mesh.edges.iter().enumerate() {
        map[a as usize].push(e as u32);
        map[b as usize].push(e as u32);
    }

    if !sorted {
        return map;
    }

    // (outgoing, incoming) edge pair of every corner, grouped by vertex
    let mut wedges: Vec<Vec<(u32, u32)>> = vec![Vec::new(); mesh.vert_count()];
    for p in 0..mesh.face_count() {
        let corners = mesh.poly_corners(p);
        let len = corners.len();
        for (i, c) in corners.clone().enumerate() {
            let prev = corners.start + (i + len - 1) % len;
            let v = mesh.corner_verts[c] as usize;
            wedges[v].push((mesh.corner_edges[c], mesh.corner_edges[prev]));
        }
    }

    for (v, edges) in map.iter_mut().enumerate() {
        if edges.len() < 3 {
            continue;
        }
        *edges = match fan_order(edges, &wedges[v]) {
            Some(order) => order,
            None => {
                let hub = mesh.positions[v];
                let normal = mesh.vert_normals.get(v).copied().unwrap_or(Vec3::Z);
                let spokes: Vec<(u32, Vec3)> = edges
                    .iter()
                    .map(|&e| {
                        let [a, b] = mesh.edges[e as usize];
                        let other = if a as usize == v { b } else { a };
                        (e, mesh.positions[other as usize])
                    })
                    .collect();
                angular_order(hub, normal, &spokes)
            }
        };
    }
    map
}

/// Other vertex of edge `e` of `mesh`
pub fn edge_other_vert(mesh: &Mesh, e: u32, v: u32) -> u32 {
    let [a, b] = mesh.edges[e as usize];
    if a == v { b } else { a }
}
