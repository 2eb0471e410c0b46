//! Flat array mesh used as the persistent representation.

use std::collections::HashMap;

use bitflags::bitflags;
use glam::Vec3;

use crate::customdata::CustomData;
use crate::types::{BMeshError, ElemFlags};

bitflags! {
    /// Per-vertex flags of the flat mesh
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MeshVertFlags: u8 {
        const SELECT = 1 << 0;
        const HIDE = 1 << 1;
        /// Vertex needs its spatial partition node refreshed
        const PBVH_UPDATE = 1 << 2;
    }
}

bitflags! {
    /// Mesh-level flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MeshFlags: u8 {
        /// The mesh is being edited through a boundary-rep mesh
        const SCULPT_DYNAMIC_TOPOLOGY = 1 << 0;
    }
}

/// A polygon as a run of corners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poly {
    pub loop_start: u32,
    pub len: u32,
    pub flag: ElemFlags,
}

/// Relative vertex positions
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeKey {
    pub name: String,
    pub positions: Vec<Vec3>,
}

/// Selection history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectHistory {
    Vert(u32),
    Edge(u32),
    Face(u32),
}

/// Flat array mesh
///
/// Corner `c` of a polygon uses vertex `corner_verts[c]` and edge
/// `corner_edges[c]`, the edge from that vertex to the next corner's vertex.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub vert_normals: Vec<Vec3>,
    pub vert_flags: Vec<MeshVertFlags>,
    pub edges: Vec<[u32; 2]>,
    pub edge_flags: Vec<ElemFlags>,
    pub polys: Vec<Poly>,
    pub corner_verts: Vec<u32>,
    pub corner_edges: Vec<u32>,
    pub vdata: CustomData,
    pub edata: CustomData,
    pub ldata: CustomData,
    pub pdata: CustomData,
    pub shape_keys: Vec<ShapeKey>,
    pub mselect: Vec<SelectHistory>,
    pub flag: MeshFlags,
}

impl Mesh {
    /// Build a mesh from positions and polygons given as vertex index lists.
    /// Edges are derived from polygon sides.
    pub fn from_polygons(positions: Vec<Vec3>, polygons: &[Vec<u32>]) -> Result<Self, BMeshError> {
        let mut mesh = Mesh {
            vert_flags: vec![MeshVertFlags::empty(); positions.len()],
            vert_normals: vec![Vec3::ZERO; positions.len()],
            positions,
            ..Default::default()
        };
        for _ in 0..mesh.positions.len() {
            mesh.vdata.push_row();
        }

        let mut edge_lookup: HashMap<(u32, u32), u32> = HashMap::new();
        for poly in polygons {
            if poly.len() < 3 {
                return Err(BMeshError::DegenerateFace(poly.len()));
            }
            if let Some(&bad) = poly.iter().find(|&&v| v as usize >= mesh.positions.len()) {
                return Err(BMeshError::InvalidTopology(format!(
                    "polygon references vertex {bad} of {}",
                    mesh.positions.len()
                )));
            }

            let loop_start = mesh.corner_verts.len() as u32;
            for (i, &v) in poly.iter().enumerate() {
                let w = poly[(i + 1) % poly.len()];
                if v == w {
                    return Err(BMeshError::DegenerateFace(poly.len()));
                }
                let key = (v.min(w), v.max(w));
                let e = *edge_lookup.entry(key).or_insert_with(|| {
                    mesh.edges.push([v, w]);
                    mesh.edge_flags.push(ElemFlags::empty());
                    mesh.edata.push_row();
                    mesh.edges.len() as u32 - 1
                });
                mesh.corner_verts.push(v);
                mesh.corner_edges.push(e);
                mesh.ldata.push_row();
            }
            mesh.polys.push(Poly {
                loop_start,
                len: poly.len() as u32,
                flag: ElemFlags::empty(),
            });
            mesh.pdata.push_row();
        }

        mesh.calc_normals();
        Ok(mesh)
    }

    pub fn vert_count(&self) -> usize {
        self.positions.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.polys.len()
    }

    pub fn loop_count(&self) -> usize {
        self.corner_verts.len()
    }

    /// Corner range of polygon `p`
    pub fn poly_corners(&self, p: usize) -> std::ops::Range<usize> {
        let poly = &self.polys[p];
        poly.loop_start as usize..(poly.loop_start + poly.len) as usize
    }

    pub fn poly_verts(&self, p: usize) -> &[u32] {
        &self.corner_verts[self.poly_corners(p)]
    }

    /// Vertex normals as the normalized sum of adjacent polygon normals
    pub fn calc_normals(&mut self) {
        let mut sums = vec![Vec3::ZERO; self.positions.len()];
        for p in 0..self.polys.len() {
            let cos: Vec<Vec3> = self
                .poly_verts(p)
                .iter()
                .map(|&v| self.positions[v as usize])
                .collect();
            let no = crate::topology::newell_normal(&cos).normalize_or_zero();
            for &v in self.poly_verts(p) {
                sums[v as usize] += no;
            }
        }
        self.vert_normals = sums.into_iter().map(Vec3::normalize_or_zero).collect();
    }

    /// Drop all selection state and history
    pub fn clear_selection(&mut self) {
        for flag in &mut self.vert_flags {
            flag.remove(MeshVertFlags::SELECT);
        }
        for flag in &mut self.edge_flags {
            flag.remove(ElemFlags::SELECT);
        }
        for poly in &mut self.polys {
            poly.flag.remove(ElemFlags::SELECT);
        }
        self.mselect.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_polygons_shares_edges() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y];
        let mesh = Mesh::from_polygons(positions, &[vec![0, 1, 2], vec![0, 2, 3]]).unwrap();
        assert_eq!(mesh.edge_count(), 5);
        assert_eq!(mesh.loop_count(), 6);
        assert_eq!(mesh.ldata.len(), 6);
        assert_eq!(mesh.poly_verts(1), &[0, 2, 3]);
        // Corner edge runs from the corner's vertex to the next one
        let e = mesh.corner_edges[4] as usize;
        assert!(mesh.edges[e].contains(&2) && mesh.edges[e].contains(&3));
        assert!((mesh.vert_normals[0] - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_from_polygons_rejects_bad_input() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        assert!(Mesh::from_polygons(positions.clone(), &[vec![0, 1]]).is_err());
        assert!(Mesh::from_polygons(positions.clone(), &[vec![0, 1, 5]]).is_err());
        assert!(Mesh::from_polygons(positions, &[vec![0, 1, 1]]).is_err());
    }

    #[test]
    fn test_clear_selection() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let mut mesh = Mesh::from_polygons(positions, &[vec![0, 1, 2]]).unwrap();
        mesh.vert_flags[1] |= MeshVertFlags::SELECT | MeshVertFlags::HIDE;
        mesh.polys[0].flag |= ElemFlags::SELECT;
        mesh.mselect.push(SelectHistory::Face(0));
        mesh.clear_selection();
        assert_eq!(mesh.vert_flags[1], MeshVertFlags::HIDE);
        assert!(mesh.polys[0].flag.is_empty());
        assert!(mesh.mselect.is_empty());
    }
}
