//! Auxiliary attribute layers used while dynamic topology is active.
//!
//! The session keeps [`LayerHandle`]s rather than raw byte offsets. Adding a
//! layer can shift the offsets of every other layer of the same element class;
//! a handle detects that through the layout generation and looks its layer up
//! again.

use bmesh::{BMesh, CustomData, DynTopoVert, LayerFlags, LayerHandle, LayerType, Mesh, VertId};

use crate::types::{DynVertFlags, FACE_AREAS_LAYER, NODE_ID_LAYER};

/// Cached handles to the layers the sculpt core reads on every stroke
#[derive(Debug, Clone, Default)]
pub struct NodeLayers {
    pub mask: Option<LayerHandle>,
    pub dyn_vert: Option<LayerHandle>,
    /// Owning partition node of each vertex (i32, -1 for none)
    pub vert_node: Option<LayerHandle>,
    /// Owning partition node of each face (i32, -1 for none)
    pub face_node: Option<LayerHandle>,
    /// Cached face areas (f32)
    pub face_areas: Option<LayerHandle>,
    /// Active vertex color layer, if the mesh has one
    pub vcol: Option<LayerHandle>,
    /// Active face set layer, if the mesh has one
    pub faceset: Option<LayerHandle>,
}

impl NodeLayers {
    /// Ensure every node layer exists on `bm` and cache handles to them
    pub fn add(bm: &mut BMesh) -> Self {
        bm.vdata.ensure_layers(&[
            (LayerType::PaintMask, "", LayerFlags::empty()),
            (LayerType::DynTopoVert, "", LayerFlags::TEMPORARY),
            (LayerType::PropInt32, NODE_ID_LAYER, LayerFlags::TEMPORARY),
        ]);
        bm.pdata.ensure_layers(&[
            (LayerType::PropInt32, NODE_ID_LAYER, LayerFlags::TEMPORARY),
            (LayerType::PropFloat, FACE_AREAS_LAYER, LayerFlags::TEMPORARY),
        ]);

        // Layers that came from the mesh keep their own flags; ours are
        // always session-only.
        mark_temporary(&mut bm.vdata, LayerType::PropInt32, NODE_ID_LAYER);
        mark_temporary(&mut bm.pdata, LayerType::PropInt32, NODE_ID_LAYER);

        let layers = Self {
            mask: active_handle(&bm.vdata, LayerType::PaintMask),
            dyn_vert: bm.vdata.handle(LayerType::DynTopoVert, ""),
            vert_node: bm.vdata.handle(LayerType::PropInt32, NODE_ID_LAYER),
            face_node: bm.pdata.handle(LayerType::PropInt32, NODE_ID_LAYER),
            face_areas: bm.pdata.handle(LayerType::PropFloat, FACE_AREAS_LAYER),
            vcol: active_handle(&bm.vdata, LayerType::PropColor),
            faceset: active_handle(&bm.pdata, LayerType::FaceSet),
        };
        tracing::trace!(
            "node layers: vdata generation {}, pdata generation {}",
            bm.vdata.generation(),
            bm.pdata.generation()
        );
        layers
    }

    /// Re-ensure the node layers and rebuild every cached handle.
    ///
    /// Called after any layer add or remove on `bm`.
    pub fn update_offsets(&mut self, bm: &mut BMesh) {
        *self = Self::add(bm);
    }

    pub fn dyn_vert_offset(&self, bm: &BMesh) -> Option<usize> {
        bm.vdata.resolve(self.dyn_vert.as_ref()?)
    }

    pub fn mask_offset(&self, bm: &BMesh) -> Option<usize> {
        bm.vdata.resolve(self.mask.as_ref()?)
    }

    pub fn vcol_offset(&self, bm: &BMesh) -> Option<usize> {
        bm.vdata.resolve(self.vcol.as_ref()?)
    }

    pub fn vert_node_offset(&self, bm: &BMesh) -> Option<usize> {
        bm.vdata.resolve(self.vert_node.as_ref()?)
    }

    pub fn face_node_offset(&self, bm: &BMesh) -> Option<usize> {
        bm.pdata.resolve(self.face_node.as_ref()?)
    }

    pub fn face_areas_offset(&self, bm: &BMesh) -> Option<usize> {
        bm.pdata.resolve(self.face_areas.as_ref()?)
    }

    pub fn faceset_offset(&self, bm: &BMesh) -> Option<usize> {
        bm.pdata.resolve(self.faceset.as_ref()?)
    }

    /// Sculpt bookkeeping of `v`
    pub fn dyn_vert(&self, bm: &BMesh, v: VertId) -> Option<DynTopoVert> {
        let offset = self.dyn_vert_offset(bm)?;
        bm.vert(v)?;
        Some(bm.vdata.get(v.index(), offset))
    }

    /// Read-modify-write the bookkeeping of `v`. Returns false if `v` is dead
    /// or the layer is missing.
    pub fn update_dyn_vert(
        &self,
        bm: &mut BMesh,
        v: VertId,
        f: impl FnOnce(&mut DynTopoVert),
    ) -> bool {
        let Some(offset) = self.dyn_vert_offset(bm) else {
            return false;
        };
        if bm.vert(v).is_none() {
            return false;
        }
        let mut mv: DynTopoVert = bm.vdata.get(v.index(), offset);
        f(&mut mv);
        bm.vdata.set(v.index(), offset, mv);
        true
    }

    pub fn vert_flags(&self, bm: &BMesh, v: VertId) -> DynVertFlags {
        self.dyn_vert(bm, v)
            .map(|mv| DynVertFlags::from_bits_truncate(mv.flag))
            .unwrap_or_default()
    }

    pub fn set_vert_flags(&self, bm: &mut BMesh, v: VertId, flags: DynVertFlags, value: bool) {
        self.update_dyn_vert(bm, v, |mv| {
            let mut current = DynVertFlags::from_bits_truncate(mv.flag);
            current.set(flags, value);
            mv.flag = current.bits();
        });
    }
}

/// Vertex-domain temporary layer lookup, without allocation
pub fn get_templayer(bm: &BMesh, ty: LayerType, name: &str) -> Option<usize> {
    bm.vdata.named_offset(ty, name)
}

pub fn has_templayer(bm: &BMesh, ty: LayerType, name: &str) -> bool {
    bm.vdata.named_layer_index(ty, name).is_some()
}

/// Add a temporary vertex layer if it is missing. Returns true when a layer
/// was added, in which case cached handles must be refreshed.
pub fn ensure_templayer(bm: &mut BMesh, ty: LayerType, name: &str) -> bool {
    if has_templayer(bm, ty, name) {
        return false;
    }
    let index = bm.vdata.add_layer(ty, name, LayerFlags::TEMPORARY);
    bm.vdata.set_layer_flag(index, LayerFlags::TEMPORARY);
    tracing::debug!("added temporary {:?} layer '{}'", ty, name);
    true
}

/// Add layers present on `mesh` but missing on `bm` and copy the active
/// layer of every type across. Layers removed from `mesh` are left alone.
///
/// Returns true if anything changed.
pub fn sync_layers(mesh: &Mesh, bm: &mut BMesh) -> bool {
    let mut modified = false;
    let pairs: [(&CustomData, &mut CustomData); 4] = [
        (&mesh.vdata, &mut bm.vdata),
        (&mesh.edata, &mut bm.edata),
        (&mesh.ldata, &mut bm.ldata),
        (&mesh.pdata, &mut bm.pdata),
    ];

    for (src, dst) in pairs {
        for layer in src.layers().iter().filter(|l| syncable(l.ty)) {
            if dst.named_layer_index(layer.ty, &layer.name).is_none() {
                dst.add_layer(layer.ty, &layer.name, LayerFlags::empty());
                modified = true;
            }
        }

        let mut seen = Vec::new();
        for layer in src.layers().iter().filter(|l| syncable(l.ty)) {
            if seen.contains(&layer.ty) {
                continue;
            }
            seen.push(layer.ty);

            let Some(active) = src.active_name(layer.ty) else {
                continue;
            };
            if dst.active_name(layer.ty) != Some(active) {
                dst.set_active(layer.ty, active);
                modified = true;
            }
        }
    }

    if modified {
        tracing::debug!("sync_layers: attribute layout changed");
    }
    modified
}

fn syncable(ty: LayerType) -> bool {
    ty != LayerType::Origindex
}

fn mark_temporary(cd: &mut CustomData, ty: LayerType, name: &str) {
    if let Some(index) = cd.named_layer_index(ty, name) {
        cd.set_layer_flag(index, LayerFlags::TEMPORARY);
    }
}

fn active_handle(cd: &CustomData, ty: LayerType) -> Option<LayerHandle> {
    let name = cd.active_name(ty)?;
    cd.handle(ty, name)
}
