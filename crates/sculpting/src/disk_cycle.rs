//! Lazy disk-cycle ordering.
//!
//! Topology edits only raise [`DynVertFlags::NEED_DISK_SORT`]; the sort runs
//! the next time a caller needs the rotational order of a vertex.

use bmesh::{BMesh, VertId};

use crate::layers::NodeLayers;
use crate::types::DynVertFlags;

/// Sort the disk cycle of `v` if it is flagged dirty.
///
/// Returns true if a sort happened. Repeated calls without an intervening
/// topology change return false.
pub fn check_disk_sort(bm: &mut BMesh, layers: &NodeLayers, v: VertId) -> bool {
    if !layers.vert_flags(bm, v).contains(DynVertFlags::NEED_DISK_SORT) {
        return false;
    }
    layers.set_vert_flags(bm, v, DynVertFlags::NEED_DISK_SORT, false);
    let sorted = bm.sort_disk_cycle(v);
    tracing::trace!("check_disk_sort: {:?} sorted={}", v, sorted);
    sorted
}

/// Mark every vertex of `bm` as needing a disk sort
pub fn flag_all_disk_sort(bm: &mut BMesh, layers: &NodeLayers) {
    let verts: Vec<VertId> = bm.verts().collect();
    for v in verts {
        layers.set_vert_flags(bm, v, DynVertFlags::NEED_DISK_SORT, true);
    }
}

/// Sort every dirty vertex, returning how many were sorted
pub fn sort_all_dirty(bm: &mut BMesh, layers: &NodeLayers) -> usize {
    let verts: Vec<VertId> = bm.verts().collect();
    verts
        .into_iter()
        .filter(|&v| check_disk_sort(bm, layers, v))
        .count()
}
