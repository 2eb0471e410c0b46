//! UV relaxation brush for dynamic topology sessions.
//!
//! [`UvSolver`] relaxes the UV layer over the triangles under the brush
//! toward angles and relative areas that match the 3D surface.
//! [`uv_brush`] drives one brush application over a set of partition leaves.

mod brush;
mod solver;

pub use brush::uv_brush;
pub use solver::{ConstraintKind, UvConstraint, UvSolver, UvTri, UvVert};

use bmesh::FaceId;

/// Errors from building the solver's working set
#[derive(Debug, thiserror::Error)]
pub enum UvSolverError {
    /// Only triangles can be relaxed
    #[error("Face {face:?} has {len} corners, expected 3")]
    NonTriangularFace { face: FaceId, len: usize },

    #[error("Face {0:?} references a removed corner")]
    DeadFace(FaceId),
}
