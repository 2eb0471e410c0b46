//! Element and identifier types for the boundary-representation mesh.

use bitflags::bitflags;
use glam::Vec3;

macro_rules! elem_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

elem_id!(
    /// Type-safe vertex identifier
    VertId
);
elem_id!(
    /// Type-safe edge identifier
    EdgeId
);
elem_id!(
    /// Type-safe loop (face corner) identifier
    LoopId
);
elem_id!(
    /// Type-safe face identifier
    FaceId
);

bitflags! {
    /// Header flags shared by every element class
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ElemFlags: u8 {
        const SELECT = 1 << 0;
        const HIDDEN = 1 << 1;
        /// UV seam (edges only)
        const SEAM = 1 << 2;
        /// Smooth shading (faces only)
        const SMOOTH = 1 << 3;
        /// Scratch tag, owned by whichever operator is running
        const TAG = 1 << 4;
    }
}

/// Links of one edge inside the disk cycle of one of its vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLink {
    pub prev: EdgeId,
    pub next: EdgeId,
}

impl DiskLink {
    pub(crate) fn unlinked(e: EdgeId) -> Self {
        Self { prev: e, next: e }
    }
}

/// A vertex
#[derive(Debug, Clone)]
pub struct Vert {
    pub co: Vec3,
    pub no: Vec3,
    /// Any edge of the disk cycle (None for isolated vertices)
    pub e: Option<EdgeId>,
    pub flag: ElemFlags,
}

/// An edge between two vertices
///
/// Each edge is threaded into the disk cycle of both of its vertices and
/// owns the radial cycle of loops that use it.
#[derive(Debug, Clone)]
pub struct Edge {
    pub v1: VertId,
    pub v2: VertId,
    pub v1_disk: DiskLink,
    pub v2_disk: DiskLink,
    /// Any loop of the radial cycle (None for wire edges)
    pub l: Option<LoopId>,
    pub flag: ElemFlags,
}

impl Edge {
    pub fn contains(&self, v: VertId) -> bool {
        self.v1 == v || self.v2 == v
    }

    pub fn other_vert(&self, v: VertId) -> Option<VertId> {
        if self.v1 == v {
            Some(self.v2)
        } else if self.v2 == v {
            Some(self.v1)
        } else {
            None
        }
    }

    pub fn disk_link(&self, v: VertId) -> Option<&DiskLink> {
        if self.v1 == v {
            Some(&self.v1_disk)
        } else if self.v2 == v {
            Some(&self.v2_disk)
        } else {
            None
        }
    }

    pub(crate) fn disk_link_mut(&mut self, v: VertId) -> Option<&mut DiskLink> {
        if self.v1 == v {
            Some(&mut self.v1_disk)
        } else if self.v2 == v {
            Some(&mut self.v2_disk)
        } else {
            None
        }
    }
}

/// A face corner
///
/// `e` runs from `v` to `next.v`.
#[derive(Debug, Clone)]
pub struct Loop {
    pub v: VertId,
    pub e: EdgeId,
    pub f: FaceId,
    pub next: LoopId,
    pub prev: LoopId,
    pub radial_next: LoopId,
    pub radial_prev: LoopId,
}

/// A polygon
#[derive(Debug, Clone)]
pub struct Face {
    pub l_first: LoopId,
    pub len: u32,
    /// Cached face normal
    pub no: Vec3,
    pub flag: ElemFlags,
}

/// Errors that can occur during mesh operations
#[derive(Debug, thiserror::Error)]
pub enum BMeshError {
    #[error("Mesh has no position attribute")]
    NoPositions,
    #[error("Mesh has no indices")]
    NoIndices,
    #[error("Invalid mesh topology: {0}")]
    InvalidTopology(String),
    #[error("Face needs at least 3 distinct vertices, got {0}")]
    DegenerateFace(usize),
    #[error("Missing element: {0}")]
    MissingElement(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_other_vert() {
        let e = Edge {
            v1: VertId(3),
            v2: VertId(7),
            v1_disk: DiskLink::unlinked(EdgeId(0)),
            v2_disk: DiskLink::unlinked(EdgeId(0)),
            l: None,
            flag: ElemFlags::empty(),
        };
        assert_eq!(e.other_vert(VertId(3)), Some(VertId(7)));
        assert_eq!(e.other_vert(VertId(7)), Some(VertId(3)));
        assert_eq!(e.other_vert(VertId(1)), None);
        assert!(e.disk_link(VertId(1)).is_none());
    }
}
