//! Conversion between [`Mesh`] and bevy render meshes.

use std::collections::HashMap;

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, Mesh as BevyMesh, PrimitiveTopology};
use glam::Vec3;

use crate::customdata::{LayerFlags, LayerType};
use crate::mesh::Mesh;
use crate::types::BMeshError;

impl Mesh {
    /// Build a mesh from an indexed triangle list.
    ///
    /// Vertices duplicated at UV seams are welded by position; the UVs are
    /// kept per corner in a `UVMap` layer.
    pub fn from_bevy_mesh(mesh: &BevyMesh) -> Result<Self, BMeshError> {
        let positions = mesh
            .attribute(BevyMesh::ATTRIBUTE_POSITION)
            .and_then(|attr| attr.as_float3())
            .ok_or(BMeshError::NoPositions)?;

        let uvs: Option<Vec<[f32; 2]>> = mesh.attribute(BevyMesh::ATTRIBUTE_UV_0).and_then(|attr| {
            match attr {
                bevy::mesh::VertexAttributeValues::Float32x2(v) => Some(v.clone()),
                _ => None,
            }
        });

        let indices: Vec<u32> = match mesh.indices() {
            Some(Indices::U16(idx)) => idx.iter().map(|&i| i as u32).collect(),
            Some(Indices::U32(idx)) => idx.to_vec(),
            None => return Err(BMeshError::NoIndices),
        };
        if indices.len() % 3 != 0 {
            return Err(BMeshError::InvalidTopology(
                "Index count not divisible by 3".to_string(),
            ));
        }

        let quantize = |p: &[f32; 3]| -> [i64; 3] {
            [
                (p[0] * 1_000_000.0) as i64,
                (p[1] * 1_000_000.0) as i64,
                (p[2] * 1_000_000.0) as i64,
            ]
        };
        let mut welded: HashMap<[i64; 3], u32> = HashMap::new();
        let mut unique: Vec<Vec3> = Vec::new();
        let remap: Vec<u32> = positions
            .iter()
            .map(|p| {
                *welded.entry(quantize(p)).or_insert_with(|| {
                    unique.push(Vec3::from_array(*p));
                    unique.len() as u32 - 1
                })
            })
            .collect();

        let mut faces = Vec::with_capacity(indices.len() / 3);
        let mut face_corners = Vec::with_capacity(indices.len() / 3);
        for tri in indices.chunks(3) {
            let verts: Vec<u32> = tri.iter().map(|&i| remap[i as usize]).collect();
            if verts[0] == verts[1] || verts[1] == verts[2] || verts[0] == verts[2] {
                continue;
            }
            faces.push(verts);
            face_corners.push([tri[0], tri[1], tri[2]]);
        }

        let mut out = Mesh::from_polygons(unique, &faces)?;
        if let Some(uvs) = uvs {
            out.ldata.add_layer(LayerType::LoopUv, "UVMap", LayerFlags::empty());
            let offset = out.ldata.named_offset(LayerType::LoopUv, "UVMap").unwrap_or(0);
            for (p, corners) in face_corners.iter().enumerate() {
                for (corner, &source) in out.poly_corners(p).zip(corners) {
                    // Corners without a source UV keep the zeroed default
                    if let Some(&uv) = uvs.get(source as usize) {
                        out.ldata.set(corner, offset, uv);
                    }
                }
            }
        }

        tracing::debug!(
            "Mesh::from_bevy_mesh: {} verts from {} source vertices",
            out.vert_count(),
            positions.len()
        );
        Ok(out)
    }

    /// Fan-triangulated render mesh with one vertex per corner
    pub fn to_bevy_mesh(&self) -> BevyMesh {
        let uv_offset = self.ldata.offset(LayerType::LoopUv);
        let mut positions: Vec<[f32; 3]> = Vec::with_capacity(self.loop_count());
        let mut normals: Vec<[f32; 3]> = Vec::with_capacity(self.loop_count());
        let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(self.loop_count());
        let mut indices: Vec<u32> = Vec::new();

        for p in 0..self.face_count() {
            let base = positions.len() as u32;
            let corners = self.poly_corners(p);
            let len = corners.len() as u32;
            for c in corners {
                let v = self.corner_verts[c] as usize;
                positions.push(self.positions[v].to_array());
                normals.push(self.vert_normals[v].to_array());
                uvs.push(uv_offset.map(|o| self.ldata.get(c, o)).unwrap_or([0.0, 0.0]));
            }
            for i in 1..len.saturating_sub(1) {
                indices.extend([base, base + i, base + i + 1]);
            }
        }

        let mut mesh = BevyMesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        mesh.insert_attribute(BevyMesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(BevyMesh::ATTRIBUTE_NORMAL, normals);
        mesh.insert_attribute(BevyMesh::ATTRIBUTE_UV_0, uvs);
        mesh.insert_indices(Indices::U32(indices));
        mesh
    }
}
