//! Boundary-representation mesh for topology editing
//!
//! [`BMesh`] stores vertices, edges, face corners (loops) and faces in index
//! arenas with explicit adjacency:
//! - every edge is threaded into the *disk cycle* of both of its vertices
//! - every edge owns the *radial cycle* of loops that use it
//! - every face owns the cycle of its loops
//!
//! Killed elements leave a tombstone so ids stay stable for the lifetime of
//! the mesh. [`Mesh`] is the flat array form used for storage, converted with
//! [`BMesh::from_mesh`] and [`BMesh::to_mesh_into`].

pub mod customdata;
mod construction;
mod disk;
mod euler;
pub mod mesh;
pub mod mesh_mapping;
pub mod primitives;
mod topology;
mod triangulate;
mod types;
mod validation;

#[cfg(feature = "bevy")]
mod bevy_mesh;

pub use construction::{FromMeshParams, ToMeshParams};
pub use customdata::{CustomData, DynTopoVert, Layer, LayerFlags, LayerHandle, LayerType};
pub use disk::{angular_order, fan_order};
pub use mesh::{Mesh, MeshFlags, MeshVertFlags, Poly, SelectHistory, ShapeKey};
pub use types::{BMeshError, DiskLink, Edge, EdgeId, ElemFlags, Face, FaceId, Loop, LoopId, Vert, VertId};

/// Boundary-representation mesh
#[derive(Debug, Clone, Default)]
pub struct BMesh {
    pub(crate) verts: Vec<Option<Vert>>,
    pub(crate) edges: Vec<Option<Edge>>,
    pub(crate) loops: Vec<Option<Loop>>,
    pub(crate) faces: Vec<Option<Face>>,
    pub(crate) totvert: usize,
    pub(crate) totedge: usize,
    pub(crate) totloop: usize,
    pub(crate) totface: usize,
    /// Vertex attributes, one row per vertex slot
    pub vdata: CustomData,
    /// Edge attributes, one row per edge slot
    pub edata: CustomData,
    /// Loop attributes, one row per loop slot
    pub ldata: CustomData,
    /// Face attributes, one row per face slot
    pub pdata: CustomData,
}

impl BMesh {
    pub fn new() -> Self {
        Self::default()
    }
}
