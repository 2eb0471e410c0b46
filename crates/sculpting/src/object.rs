//! Scene object wrapper around the sculpted mesh.
//!
//! Only the parts the session controller touches are modelled: the mesh, the
//! modifier stack it inspects before enabling dynamic topology, the active
//! shape key, and the physics caches reset when topology may have changed.

use bmesh::Mesh;
use serde::{Deserialize, Serialize};

/// How a modifier affects geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierTypeClass {
    /// Generates new geometry
    Constructive,
    /// Moves existing vertices
    Deform,
    /// Leaves geometry untouched
    NonGeometrical,
}

/// Modifier kinds relevant to dynamic topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierKind {
    Multires,
    Subsurf,
    Mirror,
    Array,
    Solidify,
    Armature,
    Displace,
    Smooth,
    UvProject,
}

impl ModifierKind {
    pub fn type_class(self) -> ModifierTypeClass {
        match self {
            ModifierKind::Multires
            | ModifierKind::Subsurf
            | ModifierKind::Mirror
            | ModifierKind::Array
            | ModifierKind::Solidify => ModifierTypeClass::Constructive,
            ModifierKind::Armature | ModifierKind::Displace | ModifierKind::Smooth => {
                ModifierTypeClass::Deform
            }
            ModifierKind::UvProject => ModifierTypeClass::NonGeometrical,
        }
    }
}

/// One entry of the modifier stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub name: String,
    pub kind: ModifierKind,
    /// Evaluated in the viewport
    pub show_realtime: bool,
}

impl Modifier {
    pub fn new(name: impl Into<String>, kind: ModifierKind) -> Self {
        Self {
            name: name.into(),
            kind,
            show_realtime: true,
        }
    }
}

/// Object being sculpted
#[derive(Debug, Clone, Default)]
pub struct SculptObject {
    pub mesh: Mesh,
    pub modifiers: Vec<Modifier>,
    /// Index into `mesh.shape_keys` of the key being edited
    pub active_shape_key: Option<usize>,
    /// Number of times particle systems were reset
    pub particle_resets: u32,
    /// Number of times point caches were reset
    pub point_cache_resets: u32,
}

impl SculptObject {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            ..Default::default()
        }
    }

    /// Modifiers enabled in the viewport
    pub fn realtime_modifiers(&self) -> impl Iterator<Item = &Modifier> {
        self.modifiers.iter().filter(|md| md.show_realtime)
    }

    /// Multires modifier enabled in the viewport
    pub fn has_active_multires(&self) -> bool {
        self.realtime_modifiers()
            .any(|md| md.kind == ModifierKind::Multires)
    }

    /// Particle state depends on vertex indices and must be rebuilt
    pub fn reset_particle_systems(&mut self) {
        self.particle_resets += 1;
        tracing::trace!("particle systems reset ({})", self.particle_resets);
    }

    /// Cached simulation frames depend on vertex indices and must be dropped
    pub fn reset_point_caches(&mut self) {
        self.point_cache_resets += 1;
        tracing::trace!("point caches reset ({})", self.point_cache_resets);
    }
}
