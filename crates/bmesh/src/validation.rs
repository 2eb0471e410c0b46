//! Structural validation of a [`BMesh`].
//!
//! Checks:
//! - disk cycles are closed and `next`/`prev` links are symmetric
//! - radial cycles are closed and every loop lies on its edge
//! - face loop cycles match the face length

use super::types::{BMeshError, LoopId};
use super::BMesh;

impl BMesh {
    /// Full structural check, returns the first inconsistency found
    pub fn validate(&self) -> Result<(), BMeshError> {
        self.validate_disks()?;
        self.validate_loops()?;
        Ok(())
    }

    fn validate_disks(&self) -> Result<(), BMeshError> {
        for v in self.verts() {
            let edges = self.disk_edges(v);
            for &e in &edges {
                let edge = self
                    .edge(e)
                    .ok_or_else(|| topology(format!("{v:?}: disk references dead {e:?}")))?;
                let link = edge
                    .disk_link(v)
                    .ok_or_else(|| topology(format!("{v:?}: {e:?} does not use the vertex")))?;
                let next_prev = self
                    .edge(link.next)
                    .and_then(|n| n.disk_link(v))
                    .map(|l| l.prev);
                if next_prev != Some(e) {
                    return Err(topology(format!(
                        "{v:?}: {e:?}.next = {:?} but next.prev = {next_prev:?}",
                        link.next
                    )));
                }
            }
        }

        for e in self.edges() {
            let Some(edge) = self.edge(e) else { continue };
            if edge.v1 == edge.v2 {
                return Err(topology(format!("{e:?} is a loop edge")));
            }
            for v in [edge.v1, edge.v2] {
                if !self.disk_edges(v).contains(&e) {
                    return Err(topology(format!("{e:?} missing from disk of {v:?}")));
                }
            }
        }
        Ok(())
    }

    fn validate_loops(&self) -> Result<(), BMeshError> {
        for (i, slot) in self.loops.iter().enumerate() {
            let Some(l) = slot else { continue };
            let id = LoopId(i as u32);

            if self.face(l.f).is_none() {
                return Err(topology(format!("{id:?} belongs to dead {:?}", l.f)));
            }
            let edge = self
                .edge(l.e)
                .ok_or_else(|| topology(format!("{id:?} uses dead {:?}", l.e)))?;
            let next_v = self.get_loop(l.next).map(|n| n.v);
            let spans = next_v.is_some_and(|nv| {
                (edge.v1 == l.v && edge.v2 == nv) || (edge.v2 == l.v && edge.v1 == nv)
            });
            if !spans {
                return Err(topology(format!("{id:?}: edge {:?} does not span the corner", l.e)));
            }
            if self.get_loop(l.next).map(|n| n.prev) != Some(id) {
                return Err(topology(format!("{id:?}: next.prev mismatch")));
            }
            if self.get_loop(l.radial_next).map(|n| n.radial_prev) != Some(id) {
                return Err(topology(format!("{id:?}: radial_next.radial_prev mismatch")));
            }
            if !self.edge_loops(l.e).contains(&id) {
                return Err(topology(format!("{id:?} missing from radial cycle of {:?}", l.e)));
            }
        }

        for f in self.faces() {
            let Some(face) = self.face(f) else { continue };
            let count = self.face_loops(f).len();
            if count != face.len as usize {
                return Err(topology(format!(
                    "{f:?}: {count} loops in cycle, face says {}",
                    face.len
                )));
            }
        }
        Ok(())
    }
}

fn topology(msg: String) -> BMeshError {
    BMeshError::InvalidTopology(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use crate::types::EdgeId;

    #[test]
    fn test_valid_primitives() {
        for mesh in [
            primitives::cube(1.0),
            primitives::grid(3, 2, 1.0),
            primitives::fan(5, 1.0),
        ] {
            let bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();
            assert!(bm.validate().is_ok());
        }
    }

    #[test]
    fn test_broken_disk_link_is_reported() {
        let mesh = primitives::fan(4, 1.0);
        let mut bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();
        let hub = crate::VertId(0);
        let e = bm.disk_edges(hub)[0];
        let link = bm.edge_mut(e).unwrap().disk_link_mut(hub).unwrap();
        link.next = EdgeId(e.0);
        assert!(matches!(bm.validate(), Err(BMeshError::InvalidTopology(_))));
    }
}
