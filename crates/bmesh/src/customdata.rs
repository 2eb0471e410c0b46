//! Typed per-element attribute layers.
//!
//! Every element class owns one [`CustomData`]: an ordered list of layers and
//! one raw byte row per element. Layers are kept sorted by [`LayerType`], so
//! adding a layer can move the byte offset of layers that already exist.
//! Each layout change bumps a generation counter; [`LayerHandle`] records the
//! generation its offset was computed against and is re-resolved when stale.

use std::collections::HashMap;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// Attribute layer types, in storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerType {
    /// Index of the originating element (i32)
    Origindex,
    /// Single deform-group weight (f32)
    DeformWeight,
    /// Subdivision crease (f32)
    Crease,
    /// Bevel weight (f32)
    BevelWeight,
    /// Sculpt mask (f32)
    PaintMask,
    /// Sculpt bookkeeping, see [`DynTopoVert`]
    DynTopoVert,
    /// Face set id (i32)
    FaceSet,
    /// Generic attribute (i32)
    PropInt32,
    /// Generic attribute (f32)
    PropFloat,
    /// Generic attribute ([f32; 3])
    PropFloat3,
    /// Vertex color ([f32; 4])
    PropColor,
    /// UV coordinate ([f32; 2])
    LoopUv,
    /// Custom split normal ([f32; 3])
    CustomNormal,
}

impl LayerType {
    /// Size in bytes of one value of this type
    pub const fn size(self) -> usize {
        match self {
            LayerType::Origindex
            | LayerType::DeformWeight
            | LayerType::Crease
            | LayerType::BevelWeight
            | LayerType::PaintMask
            | LayerType::FaceSet
            | LayerType::PropInt32
            | LayerType::PropFloat => 4,
            LayerType::LoopUv => 8,
            LayerType::PropFloat3 | LayerType::CustomNormal => 12,
            LayerType::PropColor => 16,
            LayerType::DynTopoVert => std::mem::size_of::<DynTopoVert>(),
        }
    }

    /// Types that survive conversion to and from the boundary-rep mesh
    /// without interpolation loss.
    pub const fn is_interpolation_safe(self) -> bool {
        matches!(self, LayerType::PaintMask | LayerType::Origindex)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerFlags: u8 {
        /// Session-only layer, never written back to the persistent mesh
        const TEMPORARY = 1 << 0;
    }
}

/// Per-vertex sculpt bookkeeping stored in a [`LayerType::DynTopoVert`] layer
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct DynTopoVert {
    pub origco: [f32; 3],
    pub origno: [f32; 3],
    pub origcolor: [f32; 4],
    /// Raw dirty/state bits
    pub flag: u32,
    pub valence: u32,
}

/// One attribute layer
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub ty: LayerType,
    pub name: String,
    /// Byte offset inside each element row
    pub offset: usize,
    pub flag: LayerFlags,
}

/// Generation-checked reference to a layer offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerHandle {
    pub ty: LayerType,
    pub name: String,
    offset: usize,
    generation: u64,
}

impl LayerHandle {
    /// Generation the cached offset was computed against
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Attribute storage for one element class
#[derive(Debug, Clone, Default)]
pub struct CustomData {
    layers: Vec<Layer>,
    row_size: usize,
    rows: usize,
    data: Vec<u8>,
    generation: u64,
    active: HashMap<LayerType, String>,
}

impl CustomData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty storage with the same layers as `other`, optionally skipping
    /// layers that carry any of `skip` flags.
    pub fn copy_layout(other: &CustomData, skip: LayerFlags) -> Self {
        let mut cd = Self::new();
        for layer in other.layers.iter().filter(|l| !l.flag.intersects(skip)) {
            cd.add_layer(layer.ty, &layer.name, layer.flag);
        }
        cd.active = other
            .active
            .iter()
            .filter(|(ty, name)| cd.named_layer_index(**ty, name).is_some())
            .map(|(ty, name)| (*ty, name.clone()))
            .collect();
        cd
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn has_layer(&self, ty: LayerType) -> bool {
        self.layers.iter().any(|l| l.ty == ty)
    }

    pub fn layer_index(&self, ty: LayerType) -> Option<usize> {
        self.layers.iter().position(|l| l.ty == ty)
    }

    pub fn named_layer_index(&self, ty: LayerType, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.ty == ty && l.name == name)
    }

    /// Offset of the active layer of `ty`, falling back to the first one
    pub fn offset(&self, ty: LayerType) -> Option<usize> {
        match self.active.get(&ty) {
            Some(name) => self.named_offset(ty, name),
            None => self.layer_index(ty).map(|i| self.layers[i].offset),
        }
    }

    pub fn named_offset(&self, ty: LayerType, name: &str) -> Option<usize> {
        self.named_layer_index(ty, name)
            .map(|i| self.layers[i].offset)
    }

    /// Offset of the `n`th layer of `ty`
    pub fn n_offset(&self, ty: LayerType, n: usize) -> Option<usize> {
        self.layers
            .iter()
            .filter(|l| l.ty == ty)
            .nth(n)
            .map(|l| l.offset)
    }

    /// Add a layer, returning its index. Existing layers of the same type and
    /// name are reused.
    pub fn add_layer(&mut self, ty: LayerType, name: &str, flag: LayerFlags) -> usize {
        if let Some(index) = self.named_layer_index(ty, name) {
            return index;
        }

        let index = self.layers.partition_point(|l| l.ty <= ty);
        let old_offsets: Vec<usize> = self.layers.iter().map(|l| l.offset).collect();
        let old_row_size = self.row_size;
        self.layers.insert(
            index,
            Layer {
                ty,
                name: name.to_string(),
                offset: 0,
                flag,
            },
        );
        self.relayout();

        // Move existing rows into the new layout
        let mut data = vec![0u8; self.row_size * self.rows];
        for row in 0..self.rows {
            let src = &self.data[row * old_row_size..(row + 1) * old_row_size];
            let dst = &mut data[row * self.row_size..(row + 1) * self.row_size];
            for (old_index, old) in old_offsets.iter().enumerate() {
                let layer = &self.layers[if old_index < index { old_index } else { old_index + 1 }];
                let size = layer.ty.size();
                dst[layer.offset..layer.offset + size].copy_from_slice(&src[*old..*old + size]);
            }
        }
        self.data = data;
        self.generation += 1;

        tracing::trace!(
            "CustomData: added {:?} layer '{}' (generation {})",
            ty,
            name,
            self.generation
        );
        index
    }

    /// Add every missing `(type, name)` pair in one pass
    pub fn ensure_layers(&mut self, wanted: &[(LayerType, &str, LayerFlags)]) {
        for (ty, name, flag) in wanted {
            if self.named_layer_index(*ty, name).is_none() {
                self.add_layer(*ty, name, *flag);
            }
        }
    }

    /// Remove a layer. Returns false if it did not exist.
    pub fn remove_layer(&mut self, ty: LayerType, name: &str) -> bool {
        let Some(index) = self.named_layer_index(ty, name) else {
            return false;
        };

        let removed = self.layers.remove(index);
        let old_row_size = self.row_size;
        let kept: Vec<usize> = self.layers.iter().map(|l| l.offset).collect();
        self.relayout();

        let mut data = vec![0u8; self.row_size * self.rows];
        for row in 0..self.rows {
            let src = &self.data[row * old_row_size..(row + 1) * old_row_size];
            let dst = &mut data[row * self.row_size..(row + 1) * self.row_size];
            for (layer, old) in self.layers.iter().zip(&kept) {
                let size = layer.ty.size();
                dst[layer.offset..layer.offset + size].copy_from_slice(&src[*old..*old + size]);
            }
        }
        self.data = data;
        if self.active.get(&ty) == Some(&removed.name) {
            self.active.remove(&ty);
        }
        self.generation += 1;
        true
    }

    pub fn set_layer_flag(&mut self, index: usize, flag: LayerFlags) {
        if let Some(layer) = self.layers.get_mut(index) {
            layer.flag |= flag;
        }
    }

    pub fn set_active(&mut self, ty: LayerType, name: &str) {
        if self.named_layer_index(ty, name).is_some() {
            self.active.insert(ty, name.to_string());
        }
    }

    pub fn active_name(&self, ty: LayerType) -> Option<&str> {
        self.active.get(&ty).map(String::as_str).or_else(|| {
            self.layer_index(ty)
                .map(|i| self.layers[i].name.as_str())
        })
    }

    /// Build a handle for an existing layer
    pub fn handle(&self, ty: LayerType, name: &str) -> Option<LayerHandle> {
        self.named_offset(ty, name).map(|offset| LayerHandle {
            ty,
            name: name.to_string(),
            offset,
            generation: self.generation,
        })
    }

    /// Current offset for `handle`, looked up again if the layout changed
    /// since the handle was made.
    pub fn resolve(&self, handle: &LayerHandle) -> Option<usize> {
        if handle.generation == self.generation {
            Some(handle.offset)
        } else {
            self.named_offset(handle.ty, &handle.name)
        }
    }

    /// Like [`resolve`](Self::resolve) but also updates the handle
    pub fn refresh(&self, handle: &mut LayerHandle) -> Option<usize> {
        let offset = self.resolve(handle)?;
        handle.offset = offset;
        handle.generation = self.generation;
        Some(offset)
    }

    /// Append a zeroed row, returning its index
    pub fn push_row(&mut self) -> usize {
        self.data.resize(self.data.len() + self.row_size, 0);
        self.rows += 1;
        self.rows - 1
    }

    pub fn row(&self, elem: usize) -> &[u8] {
        &self.data[elem * self.row_size..(elem + 1) * self.row_size]
    }

    pub fn row_mut(&mut self, elem: usize) -> &mut [u8] {
        &mut self.data[elem * self.row_size..(elem + 1) * self.row_size]
    }

    pub fn set_row(&mut self, elem: usize, bytes: &[u8]) {
        self.row_mut(elem).copy_from_slice(bytes);
    }

    pub fn get<T: Pod>(&self, elem: usize, offset: usize) -> T {
        let row = self.row(elem);
        bytemuck::pod_read_unaligned(&row[offset..offset + std::mem::size_of::<T>()])
    }

    pub fn set<T: Pod>(&mut self, elem: usize, offset: usize, value: T) {
        let row = self.row_mut(elem);
        row[offset..offset + std::mem::size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Copy every layer that exists in both `src` and `self`, matched by type
    /// and name.
    pub fn copy_from(&mut self, src: &CustomData, src_elem: usize, dst_elem: usize) {
        for layer in &src.layers {
            if let Some(dst_offset) = self.named_offset(layer.ty, &layer.name) {
                let size = layer.ty.size();
                let bytes = &src.row(src_elem)[layer.offset..layer.offset + size];
                self.row_mut(dst_elem)[dst_offset..dst_offset + size].copy_from_slice(bytes);
            }
        }
    }

    fn relayout(&mut self) {
        let mut offset = 0;
        for layer in &mut self.layers {
            layer.offset = offset;
            offset += layer.ty.size();
        }
        self.row_size = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_sorted_by_type() {
        let mut cd = CustomData::new();
        cd.add_layer(LayerType::PropFloat, "a", LayerFlags::empty());
        cd.add_layer(LayerType::PaintMask, "", LayerFlags::empty());
        let types: Vec<_> = cd.layers().iter().map(|l| l.ty).collect();
        assert_eq!(types, vec![LayerType::PaintMask, LayerType::PropFloat]);
        assert_eq!(cd.named_offset(LayerType::PaintMask, ""), Some(0));
        assert_eq!(cd.named_offset(LayerType::PropFloat, "a"), Some(4));
        assert_eq!(cd.row_size(), 8);
    }

    #[test]
    fn test_add_layer_preserves_values() {
        let mut cd = CustomData::new();
        cd.add_layer(LayerType::PropFloat, "height", LayerFlags::empty());
        let row = cd.push_row();
        let offset = cd.named_offset(LayerType::PropFloat, "height").unwrap();
        cd.set(row, offset, 2.5f32);

        // Inserted in front, which moves "height"
        cd.add_layer(LayerType::DynTopoVert, "", LayerFlags::TEMPORARY);
        let moved = cd.named_offset(LayerType::PropFloat, "height").unwrap();
        assert_ne!(moved, offset);
        assert_eq!(cd.get::<f32>(row, moved), 2.5);
        assert_eq!(cd.get::<DynTopoVert>(row, 0), DynTopoVert::default());
    }

    #[test]
    fn test_add_layer_is_idempotent() {
        let mut cd = CustomData::new();
        let first = cd.add_layer(LayerType::PropInt32, "_node", LayerFlags::empty());
        let generation = cd.generation();
        let second = cd.add_layer(LayerType::PropInt32, "_node", LayerFlags::empty());
        assert_eq!(first, second);
        assert_eq!(cd.layers().len(), 1);
        assert_eq!(cd.generation(), generation);
    }

    #[test]
    fn test_stale_handle_is_resolved_again() {
        let mut cd = CustomData::new();
        cd.add_layer(LayerType::PropFloat, "area", LayerFlags::empty());
        let mut handle = cd.handle(LayerType::PropFloat, "area").unwrap();
        assert_eq!(cd.resolve(&handle), Some(0));

        cd.add_layer(LayerType::PaintMask, "", LayerFlags::empty());
        assert_ne!(handle.generation(), cd.generation());
        assert_eq!(cd.resolve(&handle), Some(4));
        assert_eq!(cd.refresh(&mut handle), Some(4));
        assert_eq!(handle.generation(), cd.generation());
    }

    #[test]
    fn test_remove_layer() {
        let mut cd = CustomData::new();
        cd.add_layer(LayerType::PaintMask, "", LayerFlags::empty());
        cd.add_layer(LayerType::PropFloat, "keep", LayerFlags::empty());
        let row = cd.push_row();
        cd.set(row, 4, 7.0f32);

        assert!(cd.remove_layer(LayerType::PaintMask, ""));
        assert!(!cd.remove_layer(LayerType::PaintMask, ""));
        assert_eq!(cd.named_offset(LayerType::PropFloat, "keep"), Some(0));
        assert_eq!(cd.get::<f32>(row, 0), 7.0);
    }

    #[test]
    fn test_copy_layout_skips_temporary() {
        let mut cd = CustomData::new();
        cd.add_layer(LayerType::PaintMask, "", LayerFlags::empty());
        cd.add_layer(LayerType::DynTopoVert, "", LayerFlags::TEMPORARY);
        let copy = CustomData::copy_layout(&cd, LayerFlags::TEMPORARY);
        assert!(copy.has_layer(LayerType::PaintMask));
        assert!(!copy.has_layer(LayerType::DynTopoVert));
    }

    #[test]
    fn test_active_layer_offset() {
        let mut cd = CustomData::new();
        cd.add_layer(LayerType::LoopUv, "UVMap", LayerFlags::empty());
        cd.add_layer(LayerType::LoopUv, "Second", LayerFlags::empty());
        assert_eq!(cd.offset(LayerType::LoopUv), Some(0));
        cd.set_active(LayerType::LoopUv, "Second");
        assert_eq!(cd.offset(LayerType::LoopUv), Some(8));
        assert_eq!(cd.n_offset(LayerType::LoopUv, 1), Some(8));
        assert_eq!(cd.active_name(LayerType::LoopUv), Some("Second"));
    }
}
