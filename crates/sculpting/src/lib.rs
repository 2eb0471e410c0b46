//! Dynamic topology sculpting core.
//!
//! This crate provides the state a sculpt session needs while the mesh is in
//! its editable boundary-rep form:
//! - Switching between the flat mesh and the boundary-rep mesh with undo
//! - Auxiliary per-element layers (node indices, per-vertex sculpt state,
//!   face areas, persistent base)
//! - Lazy disk-cycle sorting and cotangent weights for smoothing
//! - A flat spatial partition for brush queries
//! - A UV relaxation brush
//!
//! # Architecture
//!
//! [`SculptSession`] owns the [`BMesh`](bmesh::BMesh) while dynamic topology
//! is enabled. Layers are referenced through
//! [`LayerHandle`](bmesh::LayerHandle)s that re-resolve their byte offsets
//! whenever a layer is added. Brush applications record first-touch snapshots
//! into a [`BmLog`] entry and emit [`SculptEvent`]s for downstream
//! re-evaluation.
//!
//! ## Key Components
//!
//! - **Session**: Enable/disable state machine and per-vertex bookkeeping
//! - **Layers**: Creation and offset caching of auxiliary attribute layers
//! - **Disk cycle**: Rotational edge order around vertices
//! - **Cotangent**: Laplacian weights over the one-ring
//! - **Pbvh**: Leaf partition with node-index layers
//! - **Uv**: Angle and area preserving UV relaxation

pub mod brush;
pub mod cotangent;
pub mod disk_cycle;
pub mod events;
pub mod layers;
pub mod object;
pub mod pbvh;
pub mod session;
pub mod types;
pub mod undo;
pub mod uv;

pub use brush::{BrushTest, FalloffShape, StrokeCache};
pub use cotangent::{CotangentWeights, WeightEngine};
pub use events::{EventBus, SculptEvent};
pub use layers::NodeLayers;
pub use object::{Modifier, ModifierKind, ModifierTypeClass, SculptObject};
pub use pbvh::{Pbvh, PbvhNode};
pub use session::SculptSession;
pub use types::{
    DynVertFlags, DyntopoError, DyntopoWarnings, PbvhType, PersistentBase, VertexRef,
};
pub use undo::{BmLog, UndoNodeKind, UndoStack};
pub use uv::{UvSolver, UvSolverError, uv_brush};
