//! Element creation and removal, with disk and radial cycle maintenance.

use glam::Vec3;

use super::types::{BMeshError, DiskLink, Edge, EdgeId, ElemFlags, Face, FaceId, Loop, LoopId, Vert, VertId};
use super::BMesh;

impl BMesh {
    /// Add an isolated vertex
    pub fn create_vert(&mut self, co: Vec3) -> VertId {
        let id = VertId(self.verts.len() as u32);
        self.verts.push(Some(Vert {
            co,
            no: Vec3::ZERO,
            e: None,
            flag: ElemFlags::empty(),
        }));
        self.vdata.push_row();
        self.totvert += 1;
        id
    }

    /// Return the edge between `v1` and `v2`, creating it if needed
    pub fn create_edge(&mut self, v1: VertId, v2: VertId) -> Result<EdgeId, BMeshError> {
        if v1 == v2 {
            return Err(BMeshError::InvalidTopology(format!(
                "edge from {v1:?} to itself"
            )));
        }
        for v in [v1, v2] {
            if self.vert(v).is_none() {
                return Err(BMeshError::MissingElement(format!("{v:?}")));
            }
        }
        if let Some(e) = self.edge_exists(v1, v2) {
            return Ok(e);
        }

        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(Edge {
            v1,
            v2,
            v1_disk: DiskLink::unlinked(id),
            v2_disk: DiskLink::unlinked(id),
            l: None,
            flag: ElemFlags::empty(),
        }));
        self.edata.push_row();
        self.totedge += 1;

        self.disk_append(id, v1);
        self.disk_append(id, v2);
        Ok(id)
    }

    /// Create a face over `verts` in winding order, creating missing edges.
    ///
    /// With `example`, face attributes and flags are copied from that face.
    pub fn create_face(
        &mut self,
        verts: &[VertId],
        example: Option<FaceId>,
    ) -> Result<FaceId, BMeshError> {
        let n = verts.len();
        if n < 3 {
            return Err(BMeshError::DegenerateFace(n));
        }
        for (i, a) in verts.iter().enumerate() {
            if verts[i + 1..].contains(a) {
                return Err(BMeshError::DegenerateFace(n));
            }
        }

        let mut edges = Vec::with_capacity(n);
        for i in 0..n {
            edges.push(self.create_edge(verts[i], verts[(i + 1) % n])?);
        }

        let f = FaceId(self.faces.len() as u32);
        let first = self.loops.len() as u32;
        for i in 0..n {
            let next = LoopId(first + ((i + 1) % n) as u32);
            let prev = LoopId(first + ((i + n - 1) % n) as u32);
            let id = LoopId(first + i as u32);
            self.loops.push(Some(Loop {
                v: verts[i],
                e: edges[i],
                f,
                next,
                prev,
                radial_next: id,
                radial_prev: id,
            }));
            self.ldata.push_row();
            self.totloop += 1;
        }

        let flag = example
            .and_then(|ex| self.face(ex))
            .map(|face| face.flag - ElemFlags::TAG)
            .unwrap_or_default();
        self.faces.push(Some(Face {
            l_first: LoopId(first),
            len: n as u32,
            no: Vec3::ZERO,
            flag,
        }));
        let row = self.pdata.push_row();
        if let Some(ex) = example.filter(|ex| self.face(*ex).is_some()) {
            let bytes = self.pdata.row(ex.index()).to_vec();
            self.pdata.set_row(row, &bytes);
        }
        self.totface += 1;

        for i in 0..n {
            self.radial_append(edges[i], LoopId(first + i as u32));
        }

        let no = self.calc_face_normal(f);
        if let Some(face) = self.face_mut(f) {
            face.no = no;
        }
        Ok(f)
    }

    /// Remove a face and its loops. Edges and vertices are kept.
    pub fn kill_face(&mut self, f: FaceId) {
        let loops = self.face_loops(f);
        if loops.is_empty() {
            return;
        }
        for l in loops {
            if let Some(e) = self.get_loop(l).map(|lp| lp.e) {
                self.radial_remove(e, l);
            }
            self.loops[l.index()] = None;
            self.totloop -= 1;
        }
        self.faces[f.index()] = None;
        self.totface -= 1;
    }

    /// Remove an edge together with every face that uses it
    pub fn kill_edge(&mut self, e: EdgeId) {
        let Some((v1, v2)) = self.edge(e).map(|edge| (edge.v1, edge.v2)) else {
            return;
        };
        for f in self.edge_faces(e) {
            self.kill_face(f);
        }
        self.disk_remove(e, v1);
        self.disk_remove(e, v2);
        self.edges[e.index()] = None;
        self.totedge -= 1;
    }

    /// Remove a vertex together with all of its edges and faces
    pub fn kill_vert(&mut self, v: VertId) {
        if self.vert(v).is_none() {
            return;
        }
        for e in self.disk_edges(v) {
            self.kill_edge(e);
        }
        self.verts[v.index()] = None;
        self.totvert -= 1;
    }

    /// Insert `e` into the disk cycle of `v`, before the vertex's first edge
    pub(crate) fn disk_append(&mut self, e: EdgeId, v: VertId) {
        let first = self.vert(v).and_then(|vert| vert.e);
        let Some(first) = first else {
            if let Some(link) = self.edge_mut(e).and_then(|edge| edge.disk_link_mut(v)) {
                *link = DiskLink::unlinked(e);
            }
            if let Some(vert) = self.vert_mut(v) {
                vert.e = Some(e);
            }
            return;
        };

        let Some(last) = self
            .edge(first)
            .and_then(|edge| edge.disk_link(v))
            .map(|link| link.prev)
        else {
            return;
        };

        if let Some(link) = self.edge_mut(e).and_then(|edge| edge.disk_link_mut(v)) {
            link.next = first;
            link.prev = last;
        }
        if let Some(link) = self.edge_mut(first).and_then(|edge| edge.disk_link_mut(v)) {
            link.prev = e;
        }
        if let Some(link) = self.edge_mut(last).and_then(|edge| edge.disk_link_mut(v)) {
            link.next = e;
        }
    }

    /// Unlink `e` from the disk cycle of `v`
    pub(crate) fn disk_remove(&mut self, e: EdgeId, v: VertId) {
        let Some(link) = self.edge(e).and_then(|edge| edge.disk_link(v)).copied() else {
            return;
        };

        if link.prev != e
            && let Some(prev) = self.edge_mut(link.prev).and_then(|edge| edge.disk_link_mut(v))
        {
            prev.next = link.next;
        }
        if link.next != e
            && let Some(next) = self.edge_mut(link.next).and_then(|edge| edge.disk_link_mut(v))
        {
            next.prev = link.prev;
        }

        if let Some(vert) = self.vert_mut(v)
            && vert.e == Some(e)
        {
            vert.e = (link.next != e).then_some(link.next);
        }
        if let Some(own) = self.edge_mut(e).and_then(|edge| edge.disk_link_mut(v)) {
            *own = DiskLink::unlinked(e);
        }
    }

    /// Add `l` to the radial cycle of `e`
    pub(crate) fn radial_append(&mut self, e: EdgeId, l: LoopId) {
        let existing = self.edge(e).and_then(|edge| edge.l);
        match existing {
            None => {
                if let Some(lp) = self.get_loop_mut(l) {
                    lp.radial_next = l;
                    lp.radial_prev = l;
                }
            }
            Some(first) => {
                let Some(after) = self.get_loop(first).map(|lp| lp.radial_next) else {
                    return;
                };
                if let Some(lp) = self.get_loop_mut(l) {
                    lp.radial_prev = first;
                    lp.radial_next = after;
                }
                if let Some(lp) = self.get_loop_mut(after) {
                    lp.radial_prev = l;
                }
                if let Some(lp) = self.get_loop_mut(first) {
                    lp.radial_next = l;
                }
            }
        }
        if let Some(edge) = self.edge_mut(e) {
            edge.l = Some(l);
        }
    }

    /// Remove `l` from the radial cycle of `e`
    pub(crate) fn radial_remove(&mut self, e: EdgeId, l: LoopId) {
        let Some((next, prev)) = self.get_loop(l).map(|lp| (lp.radial_next, lp.radial_prev)) else {
            return;
        };

        if next != l {
            if let Some(lp) = self.get_loop_mut(prev) {
                lp.radial_next = next;
            }
            if let Some(lp) = self.get_loop_mut(next) {
                lp.radial_prev = prev;
            }
        }
        if let Some(edge) = self.edge_mut(e)
            && edge.l == Some(l)
        {
            edge.l = (next != l).then_some(next);
        }
        if let Some(lp) = self.get_loop_mut(l) {
            lp.radial_next = l;
            lp.radial_prev = l;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (BMesh, [VertId; 4]) {
        let mut bm = BMesh::new();
        let v = [
            bm.create_vert(Vec3::ZERO),
            bm.create_vert(Vec3::X),
            bm.create_vert(Vec3::new(1.0, 1.0, 0.0)),
            bm.create_vert(Vec3::Y),
        ];
        (bm, v)
    }

    #[test]
    fn test_create_face_rejects_degenerate() {
        let (mut bm, v) = quad();
        assert!(matches!(
            bm.create_face(&[v[0], v[1]], None),
            Err(BMeshError::DegenerateFace(2))
        ));
        assert!(bm.create_face(&[v[0], v[1], v[0]], None).is_err());
        assert!(bm.create_edge(v[0], v[0]).is_err());
    }

    #[test]
    fn test_kill_face_keeps_edges() {
        let (mut bm, v) = quad();
        let f = bm.create_face(&v, None).unwrap();
        bm.kill_face(f);

        assert_eq!(bm.face_count(), 0);
        assert_eq!(bm.loop_count(), 0);
        assert_eq!(bm.edge_count(), 4);
        assert!(bm.edges().all(|e| bm.edge_is_wire(e)));
        assert!(bm.validate().is_ok());
    }

    #[test]
    fn test_kill_vert_removes_adjacent() {
        let (mut bm, v) = quad();
        bm.create_face(&[v[0], v[1], v[2]], None).unwrap();
        bm.create_face(&[v[0], v[2], v[3]], None).unwrap();
        bm.kill_vert(v[0]);

        assert_eq!(bm.vert_count(), 3);
        assert_eq!(bm.face_count(), 0);
        // Only 1-2 and 2-3 remain
        assert_eq!(bm.edge_count(), 2);
        assert_eq!(bm.vert_valence(v[2]), 2);
        assert!(bm.validate().is_ok());
    }

    #[test]
    fn test_face_copies_example_flags() {
        let (mut bm, v) = quad();
        let f = bm.create_face(&[v[0], v[1], v[2]], None).unwrap();
        bm.face_mut(f).unwrap().flag = ElemFlags::SELECT | ElemFlags::TAG;
        let g = bm.create_face(&[v[0], v[2], v[3]], Some(f)).unwrap();
        assert_eq!(bm.face(g).unwrap().flag, ElemFlags::SELECT);
    }
}
