//! Element access and adjacency queries.

use glam::Vec3;

use super::types::{Edge, EdgeId, ElemFlags, Face, FaceId, Loop, LoopId, Vert, VertId};
use super::BMesh;

/// Upper bound on cycle walks, guards against corrupted links
const MAX_CYCLE: usize = 1 << 20;

impl BMesh {
    pub fn vert_count(&self) -> usize {
        self.totvert
    }

    pub fn edge_count(&self) -> usize {
        self.totedge
    }

    pub fn loop_count(&self) -> usize {
        self.totloop
    }

    pub fn face_count(&self) -> usize {
        self.totface
    }

    /// Number of vertex slots, including killed ones
    pub fn vert_capacity(&self) -> usize {
        self.verts.len()
    }

    pub fn face_capacity(&self) -> usize {
        self.faces.len()
    }

    pub fn vert(&self, id: VertId) -> Option<&Vert> {
        self.verts.get(id.index())?.as_ref()
    }

    pub fn vert_mut(&mut self, id: VertId) -> Option<&mut Vert> {
        self.verts.get_mut(id.index())?.as_mut()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())?.as_ref()
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id.index())?.as_mut()
    }

    pub fn get_loop(&self, id: LoopId) -> Option<&Loop> {
        self.loops.get(id.index())?.as_ref()
    }

    pub(crate) fn get_loop_mut(&mut self, id: LoopId) -> Option<&mut Loop> {
        self.loops.get_mut(id.index())?.as_mut()
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id.index())?.as_ref()
    }

    pub fn face_mut(&mut self, id: FaceId) -> Option<&mut Face> {
        self.faces.get_mut(id.index())?.as_mut()
    }

    /// Ids of all live vertices
    pub fn verts(&self) -> impl Iterator<Item = VertId> + '_ {
        live_ids(&self.verts).map(VertId)
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        live_ids(&self.edges).map(EdgeId)
    }

    pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        live_ids(&self.faces).map(FaceId)
    }

    pub fn edge_other_vert(&self, e: EdgeId, v: VertId) -> Option<VertId> {
        self.edge(e)?.other_vert(v)
    }

    /// Edges around `v`, following `next` links from the vertex's first edge
    pub fn disk_edges(&self, v: VertId) -> Vec<EdgeId> {
        self.disk_walk(v, |link| link.next)
    }

    /// Edges around `v`, following `prev` links
    pub fn disk_edges_reverse(&self, v: VertId) -> Vec<EdgeId> {
        self.disk_walk(v, |link| link.prev)
    }

    fn disk_walk(&self, v: VertId, step: impl Fn(&super::DiskLink) -> EdgeId) -> Vec<EdgeId> {
        let mut result = Vec::new();
        let Some(start) = self.vert(v).and_then(|vert| vert.e) else {
            return result;
        };

        let mut e = start;
        loop {
            result.push(e);
            let Some(link) = self.edge(e).and_then(|edge| edge.disk_link(v)) else {
                break;
            };
            e = step(link);
            if e == start || result.len() >= MAX_CYCLE {
                break;
            }
        }
        result
    }

    pub fn vert_valence(&self, v: VertId) -> usize {
        self.disk_edges(v).len()
    }

    /// Existing edge between `a` and `b`
    pub fn edge_exists(&self, a: VertId, b: VertId) -> Option<EdgeId> {
        self.disk_edges(a)
            .into_iter()
            .find(|&e| self.edge(e).is_some_and(|edge| edge.other_vert(a) == Some(b)))
    }

    /// Loops of `f` in winding order
    pub fn face_loops(&self, f: FaceId) -> Vec<LoopId> {
        let mut result = Vec::new();
        let Some(face) = self.face(f) else {
            return result;
        };

        let start = face.l_first;
        let mut l = start;
        loop {
            result.push(l);
            let Some(lp) = self.get_loop(l) else {
                break;
            };
            l = lp.next;
            if l == start || result.len() >= MAX_CYCLE {
                break;
            }
        }
        result
    }

    pub fn face_verts(&self, f: FaceId) -> Vec<VertId> {
        self.face_loops(f)
            .into_iter()
            .filter_map(|l| self.get_loop(l).map(|lp| lp.v))
            .collect()
    }

    /// Loops in the radial cycle of `e`
    pub fn edge_loops(&self, e: EdgeId) -> Vec<LoopId> {
        let mut result = Vec::new();
        let Some(start) = self.edge(e).and_then(|edge| edge.l) else {
            return result;
        };

        let mut l = start;
        loop {
            result.push(l);
            let Some(lp) = self.get_loop(l) else {
                break;
            };
            l = lp.radial_next;
            if l == start || result.len() >= MAX_CYCLE {
                break;
            }
        }
        result
    }

    pub fn edge_faces(&self, e: EdgeId) -> Vec<FaceId> {
        self.edge_loops(e)
            .into_iter()
            .filter_map(|l| self.get_loop(l).map(|lp| lp.f))
            .collect()
    }

    /// Face corners that sit on `v`
    pub fn vert_loops(&self, v: VertId) -> Vec<LoopId> {
        let mut result = Vec::new();
        for e in self.disk_edges(v) {
            for l in self.edge_loops(e) {
                if self.get_loop(l).is_some_and(|lp| lp.v == v) {
                    result.push(l);
                }
            }
        }
        result
    }

    pub fn vert_faces(&self, v: VertId) -> Vec<FaceId> {
        self.vert_loops(v)
            .into_iter()
            .filter_map(|l| self.get_loop(l).map(|lp| lp.f))
            .collect()
    }

    pub fn edge_is_wire(&self, e: EdgeId) -> bool {
        self.edge(e).is_some_and(|edge| edge.l.is_none())
    }

    /// Edge used by exactly one face
    pub fn edge_is_boundary(&self, e: EdgeId) -> bool {
        self.edge_loops(e).len() == 1
    }

    pub fn edge_is_manifold(&self, e: EdgeId) -> bool {
        self.edge_loops(e).len() == 2
    }

    /// Vertex on an open boundary or touching a wire edge
    pub fn vert_is_boundary(&self, v: VertId) -> bool {
        self.disk_edges(v)
            .into_iter()
            .any(|e| self.edge_loops(e).len() < 2)
    }

    /// Newell normal of the face from current vertex positions
    pub fn calc_face_normal(&self, f: FaceId) -> Vec3 {
        let cos: Vec<Vec3> = self.face_verts(f).iter().map(|&v| self.co(v)).collect();
        newell_normal(&cos).normalize_or_zero()
    }

    pub fn face_area(&self, f: FaceId) -> f32 {
        let cos: Vec<Vec3> = self.face_verts(f).iter().map(|&v| self.co(v)).collect();
        newell_normal(&cos).length() * 0.5
    }

    pub fn face_center(&self, f: FaceId) -> Vec3 {
        let verts = self.face_verts(f);
        if verts.is_empty() {
            return Vec3::ZERO;
        }
        verts.iter().map(|&v| self.co(v)).sum::<Vec3>() / verts.len() as f32
    }

    /// Position of `v`, zero for killed vertices
    pub fn co(&self, v: VertId) -> Vec3 {
        self.vert(v).map(|vert| vert.co).unwrap_or(Vec3::ZERO)
    }

    /// Recompute face normals, then vertex normals as the normalized sum of
    /// the normals of adjacent faces. Isolated vertices keep their normal.
    pub fn normals_update(&mut self) {
        let faces: Vec<FaceId> = self.faces().collect();
        for &f in &faces {
            let no = self.calc_face_normal(f);
            if let Some(face) = self.face_mut(f) {
                face.no = no;
            }
        }

        let verts: Vec<VertId> = self.verts().collect();
        for v in verts {
            let sum: Vec3 = self
                .vert_faces(v)
                .into_iter()
                .filter_map(|f| self.face(f).map(|face| face.no))
                .sum();
            if let Some(no) = sum.try_normalize()
                && let Some(vert) = self.vert_mut(v)
            {
                vert.no = no;
            }
        }
    }

    /// Remove `SELECT` from every vertex, edge and face
    pub fn clear_selection(&mut self) {
        for vert in self.verts.iter_mut().flatten() {
            vert.flag.remove(ElemFlags::SELECT);
        }
        for edge in self.edges.iter_mut().flatten() {
            edge.flag.remove(ElemFlags::SELECT);
        }
        for face in self.faces.iter_mut().flatten() {
            face.flag.remove(ElemFlags::SELECT);
        }
    }
}

/// Unnormalized polygon normal, its length is twice the polygon area
pub(crate) fn newell_normal(cos: &[Vec3]) -> Vec3 {
    let mut n = Vec3::ZERO;
    for (i, a) in cos.iter().enumerate() {
        let b = cos[(i + 1) % cos.len()];
        n += Vec3::new(
            (a.y - b.y) * (a.z + b.z),
            (a.z - b.z) * (a.x + b.x),
            (a.x - b.x) * (a.y + b.y),
        );
    }
    n
}

fn live_ids<T>(arena: &[Option<T>]) -> impl Iterator<Item = u32> + '_ {
    arena
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_some())
        .map(|(i, _)| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;

    #[test]
    fn test_grid_boundary_and_valence() {
        let mesh = primitives::grid(2, 2, 2.0);
        let bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();

        // Center of a 3x3 vertex grid
        let center = VertId(4);
        assert_eq!(bm.vert_valence(center), 4);
        assert!(!bm.vert_is_boundary(center));
        assert_eq!(bm.vert_faces(center).len(), 4);

        let corner = VertId(0);
        assert_eq!(bm.vert_valence(corner), 2);
        assert!(bm.vert_is_boundary(corner));
    }

    #[test]
    fn test_face_area_and_center() {
        let mesh = primitives::grid(1, 1, 2.0);
        let bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();
        let f = FaceId(0);
        assert!((bm.face_area(f) - 4.0).abs() < 1e-5);
        assert!(bm.face_center(f).length() < 1e-6);
    }

    #[test]
    fn test_disk_walks_are_reverse_of_each_other() {
        let mesh = primitives::fan(6, 1.0);
        let bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();
        let forward = bm.disk_edges(VertId(0));
        let mut backward = bm.disk_edges_reverse(VertId(0));
        assert_eq!(forward.len(), 6);
        backward[1..].reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_clear_selection() {
        let mut mesh = primitives::triangle_grid(1, 1, 1.0);
        for flag in &mut mesh.vert_flags {
            flag.insert(crate::MeshVertFlags::SELECT);
        }
        for flag in &mut mesh.edge_flags {
            flag.insert(ElemFlags::SELECT);
        }
        let mut bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();
        bm.face_mut(FaceId(0)).unwrap().flag.insert(ElemFlags::SELECT);

        bm.clear_selection();
        assert!(bm.verts().all(|v| !bm.vert(v).unwrap().flag.contains(ElemFlags::SELECT)));
        assert!(bm.edges().all(|e| !bm.edge(e).unwrap().flag.contains(ElemFlags::SELECT)));
        assert!(bm.faces().all(|f| !bm.face(f).unwrap().flag.contains(ElemFlags::SELECT)));
    }
}
