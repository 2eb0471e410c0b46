//! Conversion between the flat [`Mesh`] and [`BMesh`].

use glam::Vec3;

use super::customdata::{CustomData, LayerFlags};
use super::mesh::{Mesh, MeshVertFlags};
use super::types::{BMeshError, ElemFlags, VertId};
use super::BMesh;

/// Options for [`BMesh::from_mesh`]
#[derive(Debug, Clone, Default)]
pub struct FromMeshParams {
    /// Compute face normals from positions
    pub calc_face_normal: bool,
    /// Load positions from the active shape key instead of the basis
    pub use_shapekey: bool,
    pub active_shapekey: Option<usize>,
}

/// Options for [`BMesh::to_mesh_into`]
#[derive(Debug, Clone, Default)]
pub struct ToMeshParams {
    /// Shape key that receives the edited positions
    pub active_shapekey: Option<usize>,
}

impl BMesh {
    /// Build a boundary-rep mesh from a flat mesh, copying all attribute
    /// layers.
    pub fn from_mesh(mesh: &Mesh, params: &FromMeshParams) -> Result<Self, BMeshError> {
        let mut bm = BMesh {
            vdata: CustomData::copy_layout(&mesh.vdata, LayerFlags::empty()),
            edata: CustomData::copy_layout(&mesh.edata, LayerFlags::empty()),
            ldata: CustomData::copy_layout(&mesh.ldata, LayerFlags::empty()),
            pdata: CustomData::copy_layout(&mesh.pdata, LayerFlags::empty()),
            ..Default::default()
        };

        let key_positions = params
            .active_shapekey
            .filter(|_| params.use_shapekey)
            .and_then(|k| mesh.shape_keys.get(k))
            .map(|key| &key.positions)
            .filter(|positions| positions.len() == mesh.positions.len());
        let positions = key_positions.unwrap_or(&mesh.positions);

        for (i, &co) in positions.iter().enumerate() {
            let v = bm.create_vert(co);
            let vert_flags = mesh.vert_flags.get(i).copied().unwrap_or_default();
            if let Some(vert) = bm.vert_mut(v) {
                vert.no = mesh.vert_normals.get(i).copied().unwrap_or(Vec3::ZERO);
                if vert_flags.contains(MeshVertFlags::SELECT) {
                    vert.flag |= ElemFlags::SELECT;
                }
                if vert_flags.contains(MeshVertFlags::HIDE) {
                    vert.flag |= ElemFlags::HIDDEN;
                }
            }
            bm.vdata.copy_from(&mesh.vdata, i, v.index());
        }

        for (i, &[a, b]) in mesh.edges.iter().enumerate() {
            let e = bm.create_edge(VertId(a), VertId(b))?;
            if e.index() != i {
                return Err(BMeshError::InvalidTopology(format!(
                    "duplicate edge {a}-{b}"
                )));
            }
            if let Some(edge) = bm.edge_mut(e) {
                edge.flag = mesh.edge_flags.get(i).copied().unwrap_or_default();
            }
            bm.edata.copy_from(&mesh.edata, i, e.index());
        }

        for (p, poly) in mesh.polys.iter().enumerate() {
            let verts: Vec<VertId> = mesh.poly_verts(p).iter().map(|&v| VertId(v)).collect();
            let f = bm.create_face(&verts, None)?;
            if let Some(face) = bm.face_mut(f) {
                face.flag = poly.flag;
                if !params.calc_face_normal {
                    face.no = Vec3::ZERO;
                }
            }
            bm.pdata.copy_from(&mesh.pdata, p, f.index());
            for (corner, l) in mesh.poly_corners(p).zip(bm.face_loops(f)) {
                bm.ldata.copy_from(&mesh.ldata, corner, l.index());
            }
        }

        tracing::debug!(
            "BMesh::from_mesh: {} verts, {} edges, {} faces",
            bm.totvert,
            bm.totedge,
            bm.totface
        );
        Ok(bm)
    }

    /// Write this mesh back into the flat arrays of `mesh`.
    ///
    /// Element ids are compacted, temporary attribute layers are dropped and
    /// the selection history is cleared.
    pub fn to_mesh_into(&self, mesh: &mut Mesh, params: &ToMeshParams) {
        let mut vert_map = vec![u32::MAX; self.verts.len()];
        let mut edge_map = vec![u32::MAX; self.edges.len()];

        let mut out = Mesh {
            vdata: CustomData::copy_layout(&self.vdata, LayerFlags::TEMPORARY),
            edata: CustomData::copy_layout(&self.edata, LayerFlags::TEMPORARY),
            ldata: CustomData::copy_layout(&self.ldata, LayerFlags::TEMPORARY),
            pdata: CustomData::copy_layout(&self.pdata, LayerFlags::TEMPORARY),
            flag: mesh.flag,
            ..Default::default()
        };

        for v in self.verts() {
            let Some(vert) = self.vert(v) else { continue };
            vert_map[v.index()] = out.positions.len() as u32;
            out.positions.push(vert.co);
            out.vert_normals.push(vert.no);
            let mut flag = MeshVertFlags::empty();
            if vert.flag.contains(ElemFlags::SELECT) {
                flag |= MeshVertFlags::SELECT;
            }
            if vert.flag.contains(ElemFlags::HIDDEN) {
                flag |= MeshVertFlags::HIDE;
            }
            out.vert_flags.push(flag);
            let row = out.vdata.push_row();
            out.vdata.copy_from(&self.vdata, v.index(), row);
        }

        for e in self.edges() {
            let Some(edge) = self.edge(e) else { continue };
            edge_map[e.index()] = out.edges.len() as u32;
            out.edges.push([vert_map[edge.v1.index()], vert_map[edge.v2.index()]]);
            out.edge_flags.push(edge.flag);
            let row = out.edata.push_row();
            out.edata.copy_from(&self.edata, e.index(), row);
        }

        for f in self.faces() {
            let Some(face) = self.face(f) else { continue };
            let loops = self.face_loops(f);
            out.polys.push(super::mesh::Poly {
                loop_start: out.corner_verts.len() as u32,
                len: loops.len() as u32,
                flag: face.flag,
            });
            let row = out.pdata.push_row();
            out.pdata.copy_from(&self.pdata, f.index(), row);

            for l in loops {
                let Some(lp) = self.get_loop(l) else { continue };
                out.corner_verts.push(vert_map[lp.v.index()]);
                out.corner_edges.push(edge_map[lp.e.index()]);
                let row = out.ldata.push_row();
                out.ldata.copy_from(&self.ldata, l.index(), row);
            }
        }

        out.shape_keys = std::mem::take(&mut mesh.shape_keys);
        for (k, key) in out.shape_keys.iter_mut().enumerate() {
            if Some(k) == params.active_shapekey || key.positions.len() != out.positions.len() {
                if key.positions.len() != out.positions.len() {
                    tracing::warn!(
                        "to_mesh_into: shape key '{}' reset, vertex count changed",
                        key.name
                    );
                }
                key.positions = out.positions.clone();
            }
        }

        tracing::debug!(
            "BMesh::to_mesh_into: {} verts, {} edges, {} faces",
            out.positions.len(),
            out.edges.len(),
            out.polys.len()
        );
        *mesh = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customdata::LayerType;
    use crate::mesh::ShapeKey;
    use crate::primitives;

    #[test]
    fn test_round_trip_keeps_counts_and_positions() {
        let mesh = primitives::cube(2.0);
        let bm = BMesh::from_mesh(&mesh, &FromMeshParams::default()).unwrap();
        assert!(bm.validate().is_ok());

        let mut out = Mesh::default();
        bm.to_mesh_into(&mut out, &ToMeshParams::default());
        assert_eq!(out.vert_count(), mesh.vert_count());
        assert_eq!(out.edge_count(), mesh.edge_count());
        assert_eq!(out.face_count(), mesh.face_count());
        assert_eq!(out.corner_verts, mesh.corner_verts);
        for (a, b) in out.positions.iter().zip(&mesh.positions) {
            assert!((*a - *b).length() < 1e-6);
        }
    }

    #[test]
    fn test_temporary_layers_are_not_written_back() {
        let mesh = primitives::grid(1, 1, 1.0);
        let mut bm = BMesh::from_mesh(&mesh, &FromMeshParams::default()).unwrap();
        bm.vdata.add_layer(LayerType::PaintMask, "", LayerFlags::empty());
        bm.vdata.add_layer(LayerType::DynTopoVert, "", LayerFlags::TEMPORARY);
        bm.vdata.set(2, 0, 0.75f32);

        let mut out = Mesh::default();
        bm.to_mesh_into(&mut out, &ToMeshParams::default());
        assert!(out.vdata.has_layer(LayerType::PaintMask));
        assert!(!out.vdata.has_layer(LayerType::DynTopoVert));
        assert_eq!(out.vdata.get::<f32>(2, 0), 0.75);
    }

    #[test]
    fn test_killed_elements_are_compacted() {
        let mesh = primitives::grid(2, 1, 2.0);
        let mut bm = BMesh::from_mesh(&mesh, &FromMeshParams::default()).unwrap();
        bm.kill_vert(VertId(0));

        let mut out = Mesh::default();
        bm.to_mesh_into(&mut out, &ToMeshParams::default());
        assert_eq!(out.vert_count(), 5);
        assert_eq!(out.face_count(), 1);
        assert!(out.corner_verts.iter().all(|&v| (v as usize) < out.vert_count()));
        assert!(out.edges.iter().flatten().all(|&v| (v as usize) < out.vert_count()));
    }

    #[test]
    fn test_shape_key_positions() {
        let mut mesh = primitives::grid(1, 1, 1.0);
        let lifted: Vec<Vec3> = mesh.positions.iter().map(|p| *p + Vec3::Z).collect();
        mesh.shape_keys.push(ShapeKey {
            name: "Key 1".into(),
            positions: lifted,
        });

        let params = FromMeshParams {
            use_shapekey: true,
            active_shapekey: Some(0),
            ..Default::default()
        };
        let mut bm = BMesh::from_mesh(&mesh, &params).unwrap();
        assert!((bm.co(VertId(0)).z - 1.0).abs() < 1e-6);

        bm.vert_mut(VertId(0)).unwrap().co.z = 2.0;
        bm.to_mesh_into(
            &mut mesh,
            &ToMeshParams {
                active_shapekey: Some(0),
            },
        );
        assert!((mesh.shape_keys[0].positions[0].z - 2.0).abs() < 1e-6);
    }
}
