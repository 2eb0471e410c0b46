//! Spatial partition of the boundary-rep mesh into leaf nodes.
//!
//! Faces are recursively split along the longest axis of their bounds until
//! each leaf holds at most `leaf_limit` faces. Every face and vertex records
//! its owning leaf in the node-index layers so brush code can go from an
//! element back to its node.

use glam::Vec3;

use bmesh::{BMesh, FaceId, LayerHandle, VertId};
use dyntopo_config::PartitionConfig;

use crate::layers::NodeLayers;
use crate::types::{DynVertFlags, PbvhType};

/// Node index stored for elements outside every leaf
pub const NO_NODE: i32 = -1;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn include_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }
}

/// A leaf of the partition
#[derive(Debug, Clone)]
pub struct PbvhNode {
    pub faces: Vec<FaceId>,
    /// Vertices owned by this leaf
    pub verts: Vec<VertId>,
    /// Vertices used by this leaf's faces but owned by another leaf
    pub other_verts: Vec<VertId>,
    pub bounds: Aabb,
}

/// Flat list of partition leaves over a [`BMesh`]
#[derive(Debug, Clone)]
pub struct Pbvh {
    nodes: Vec<PbvhNode>,
    vert_node: Option<LayerHandle>,
    face_node: Option<LayerHandle>,
    dyn_vert: Option<LayerHandle>,
    face_areas: Option<LayerHandle>,
}

impl Pbvh {
    /// Partition every face of `bm` and write node indices into the node
    /// layers.
    pub fn build(bm: &mut BMesh, layers: &NodeLayers, config: &PartitionConfig) -> Self {
        let mut pbvh = Self {
            nodes: Vec::new(),
            vert_node: None,
            face_node: None,
            dyn_vert: None,
            face_areas: None,
        };
        pbvh.update_offsets(layers);

        let faces: Vec<FaceId> = bm.faces().collect();
        let leaf_limit = config.leaf_limit.max(1);
        if !faces.is_empty() {
            pbvh.recursive_partition(bm, faces, leaf_limit);
        }
        pbvh.assign_nodes(bm);

        tracing::debug!(
            "Pbvh::build: {} faces in {} leaves (limit {})",
            bm.face_count(),
            pbvh.nodes.len(),
            leaf_limit
        );
        pbvh
    }

    fn recursive_partition(&mut self, bm: &BMesh, faces: Vec<FaceId>, leaf_limit: usize) {
        if faces.len() <= leaf_limit {
            self.nodes.push(PbvhNode {
                faces,
                verts: Vec::new(),
                other_verts: Vec::new(),
                bounds: Aabb::empty(),
            });
            return;
        }

        let mut centroid_bounds = Aabb::empty();
        for &f in &faces {
            centroid_bounds.include_point(bm.face_center(f));
        }
        let axis = centroid_bounds.longest_axis();
        let split_point = centroid_bounds.center()[axis];

        let (left, right): (Vec<FaceId>, Vec<FaceId>) = faces
            .iter()
            .partition(|&&f| bm.face_center(f)[axis] < split_point);

        if left.is_empty() || right.is_empty() {
            // All centroids coincide on this axis, fall back to an index split
            let mut left = faces;
            let right = left.split_off(left.len() / 2);
            self.recursive_partition(bm, left, leaf_limit);
            self.recursive_partition(bm, right, leaf_limit);
        } else {
            self.recursive_partition(bm, left, leaf_limit);
            self.recursive_partition(bm, right, leaf_limit);
        }
    }

    /// Write owning node indices and collect per-leaf vertices and bounds
    fn assign_nodes(&mut self, bm: &mut BMesh) {
        let vert_offset = self.vert_node.as_ref().and_then(|h| bm.vdata.resolve(h));
        let face_offset = self.face_node.as_ref().and_then(|h| bm.pdata.resolve(h));

        let verts: Vec<VertId> = bm.verts().collect();
        let mut owner = vec![NO_NODE; bm.vert_capacity()];
        if let Some(offset) = vert_offset {
            for &v in &verts {
                bm.vdata.set(v.index(), offset, NO_NODE);
            }
        }
        if let Some(offset) = face_offset {
            let faces: Vec<FaceId> = bm.faces().collect();
            for f in faces {
                bm.pdata.set(f.index(), offset, NO_NODE);
            }
        }

        for (i, node) in self.nodes.iter_mut().enumerate() {
            let index = i as i32;
            let mut bounds = Aabb::empty();
            for &f in &node.faces {
                if let Some(offset) = face_offset {
                    bm.pdata.set(f.index(), offset, index);
                }
                for v in bm.face_verts(f) {
                    bounds.include_point(bm.co(v));
                    let slot = &mut owner[v.index()];
                    if *slot == NO_NODE {
                        *slot = index;
                        node.verts.push(v);
                    } else if *slot != index && !node.other_verts.contains(&v) {
                        node.other_verts.push(v);
                    }
                }
            }
            node.bounds = bounds;
        }

        if let Some(offset) = vert_offset {
            for &v in &verts {
                bm.vdata.set(v.index(), offset, owner[v.index()]);
            }
        }
    }

    pub fn pbvh_type(&self) -> PbvhType {
        PbvhType::BMesh
    }

    pub fn nodes(&self) -> &[PbvhNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_faces(&self, node: usize) -> &[FaceId] {
        self.nodes.get(node).map(|n| n.faces.as_slice()).unwrap_or(&[])
    }

    /// Owned vertices of `node`
    pub fn node_verts(&self, node: usize) -> &[VertId] {
        self.nodes.get(node).map(|n| n.verts.as_slice()).unwrap_or(&[])
    }

    /// Leaves whose bounds touch the sphere
    pub fn search_sphere(&self, center: Vec3, radius: f32) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.bounds.intersects_sphere(center, radius))
            .map(|(i, _)| i)
            .collect()
    }

    /// Adopt the layer handles of `layers` after a layout change
    pub fn update_offsets(&mut self, layers: &NodeLayers) {
        self.vert_node = layers.vert_node.clone();
        self.face_node = layers.face_node.clone();
        self.dyn_vert = layers.dyn_vert.clone();
        self.face_areas = layers.face_areas.clone();
    }

    /// Flag every vertex of every leaf as needing a disk sort
    pub fn flag_all_disk_sort(&self, bm: &mut BMesh) {
        let Some(offset) = self.dyn_vert.as_ref().and_then(|h| bm.vdata.resolve(h)) else {
            return;
        };
        for node in &self.nodes {
            for &v in &node.verts {
                let mut mv: bmesh::DynTopoVert = bm.vdata.get(v.index(), offset);
                mv.flag |= DynVertFlags::NEED_DISK_SORT.bits();
                bm.vdata.set(v.index(), offset, mv);
            }
        }
    }

    /// Refresh the cached face areas of the faces in `nodes`
    pub fn update_face_areas(&self, bm: &mut BMesh, nodes: &[usize]) {
        let Some(offset) = self.face_areas.as_ref().and_then(|h| bm.pdata.resolve(h)) else {
            return;
        };
        for &n in nodes {
            for &f in self.node_faces(n) {
                let area = bm.face_area(f);
                bm.pdata.set(f.index(), offset, area);
            }
        }
    }
}
