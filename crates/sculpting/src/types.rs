//! Core dynamic topology types.
//!
//! Flags stored in the per-vertex [`DynTopoVert`](bmesh::DynTopoVert) layer,
//! advisory warnings returned by the enable check, and the error type of the
//! session controller.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use bmesh::BMeshError;

/// Vertex node index layer, shared by the vertex and face domains
pub const NODE_ID_LAYER: &str = "_dyntopo_node_id";
/// Face area cache layer
pub const FACE_AREAS_LAYER: &str = "__dyntopo_face_areas";
/// Persistent base position layer
pub const PERS_CO_LAYER: &str = "__dyntopo_layer_pers_co";
/// Persistent base normal layer
pub const PERS_NO_LAYER: &str = "__dyntopo_layer_pers_no";
/// Persistent base displacement layer
pub const PERS_DISP_LAYER: &str = "__dyntopo_layer_pers_disp";
/// Layer brush displacement accumulated during the current stroke
pub const LAYER_DISP_LAYER: &str = "__dyntopo_layer_disp";

bitflags! {
    /// State bits kept in [`DynTopoVert::flag`](bmesh::DynTopoVert)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DynVertFlags: u32 {
        /// Disk cycle order is stale
        const NEED_DISK_SORT = 1 << 0;
        /// Cached valence is stale
        const NEED_VALENCE = 1 << 1;
        /// Boundary bits are stale
        const NEED_BOUNDARY = 1 << 2;
        /// Vertex lies on an open mesh boundary
        const BOUNDARY = 1 << 3;
        /// Vertex touches more than one face set
        const FSET_BOUNDARY = 1 << 4;
    }
}

bitflags! {
    /// Result of [`SculptSession::dynamic_topology_check`](crate::SculptSession::dynamic_topology_check)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DyntopoWarnings: u8 {
        /// Vertex attributes that will not be interpolated
        const WARN_VDATA = 1 << 0;
        /// Edge attributes that will not be interpolated
        const WARN_EDATA = 1 << 1;
        /// Face corner attributes that will not be interpolated
        const WARN_LDATA = 1 << 2;
        /// A constructive modifier is enabled in the viewport
        const WARN_MODIFIER = 1 << 3;
        /// A multiresolution modifier is enabled, enabling is refused
        const ERROR_MULTIRES = 1 << 4;
    }
}

impl DyntopoWarnings {
    /// Any advisory bit, ignoring the fatal one
    pub fn has_advisory(self) -> bool {
        self.intersects(Self::WARN_VDATA | Self::WARN_EDATA | Self::WARN_LDATA | Self::WARN_MODIFIER)
    }
}

/// Vertex handle that is valid for every partition type.
///
/// Indexes the boundary-rep vertex arena when dynamic topology is active and
/// the flat mesh arrays otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexRef(pub u32);

impl From<bmesh::VertId> for VertexRef {
    fn from(v: bmesh::VertId) -> Self {
        VertexRef(v.0)
    }
}

/// Which representation the spatial partition was built over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PbvhType {
    /// Flat mesh with static topology
    #[default]
    Faces,
    /// Multiresolution grids
    Grids,
    /// Boundary-rep mesh with dynamic topology
    BMesh,
}

/// Saved reference pose of one vertex for the layer brush
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistentBase {
    pub co: [f32; 3],
    pub no: [f32; 3],
    pub disp: f32,
}

/// Errors raised by the session controller
#[derive(Debug, thiserror::Error)]
pub enum DyntopoError {
    /// Dynamic topology and multiresolution cannot be used together
    #[error("Dynamic topology cannot be enabled while a multires modifier is active")]
    MultiresConflict,

    #[error("Dynamic topology is already enabled")]
    AlreadyEnabled,

    #[error("Mesh conversion failed: {0}")]
    Mesh(#[from] BMeshError),
}
