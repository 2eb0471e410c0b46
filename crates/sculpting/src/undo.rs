//! Undo recording for dynamic topology sessions.
//!
//! [`BmLog`] records first-touch snapshots of boundary-rep elements, one entry
//! per brush application, so a whole application can be rolled back.
//! [`UndoStack`] holds the coarse named steps pushed around enabling and
//! disabling dynamic topology.

use std::collections::HashMap;

use glam::Vec3;
use tracing::{debug, warn};

use bmesh::{BMesh, DynTopoVert, ElemFlags, FaceId, LayerHandle, LoopId, Mesh, VertId};

/// Vertex state before its first modification in an entry
#[derive(Debug, Clone)]
pub struct VertSnapshot {
    pub co: Vec3,
    pub no: Vec3,
    pub flag: ElemFlags,
    /// Raw attribute row
    pub row: Vec<u8>,
}

/// Face state before its first modification in an entry
#[derive(Debug, Clone)]
pub struct FaceSnapshot {
    pub flag: ElemFlags,
    pub row: Vec<u8>,
    /// Attribute rows of the face corners
    pub loop_rows: Vec<(LoopId, Vec<u8>)>,
}

/// Mutations recorded for one brush application
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub name: String,
    pub verts: HashMap<VertId, VertSnapshot>,
    pub faces: HashMap<FaceId, FaceSnapshot>,
    /// Attribute layout generations (vdata, ldata, pdata) the rows belong to
    generations: [u64; 3],
}

impl LogEntry {
    pub fn is_empty(&self) -> bool {
        self.verts.is_empty() && self.faces.is_empty()
    }
}

/// Append-only log of boundary-rep mutations
#[derive(Debug, Clone, Default)]
pub struct BmLog {
    entries: Vec<LogEntry>,
    open: bool,
    dyn_vert: Option<LayerHandle>,
}

impl BmLog {
    pub fn new(dyn_vert: Option<LayerHandle>) -> Self {
        Self {
            dyn_vert,
            ..Default::default()
        }
    }

    /// Start a new entry. Any entry still open is closed first.
    pub fn entry_add(&mut self, bm: &BMesh, name: impl Into<String>) {
        let name = name.into();
        debug!("BmLog: entry '{}' ({} recorded)", name, self.entries.len());
        self.entries.push(LogEntry {
            name,
            verts: HashMap::new(),
            faces: HashMap::new(),
            generations: generations(bm),
        });
        self.open = true;
    }

    /// Close the current entry. Returns false if no entry was open.
    pub fn entry_end(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn current_entry(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Record `v` before it is modified. Only the first call per entry stores
    /// a snapshot.
    pub fn vert_modified(&mut self, bm: &BMesh, v: VertId) {
        let Some(entry) = self.entries.last_mut().filter(|_| self.open) else {
            return;
        };
        if entry.verts.contains_key(&v) {
            return;
        }
        let Some(vert) = bm.vert(v) else { return };
        entry.verts.insert(
            v,
            VertSnapshot {
                co: vert.co,
                no: vert.no,
                flag: vert.flag,
                row: bm.vdata.row(v.index()).to_vec(),
            },
        );
    }

    /// Record `f` and its corners before they are modified
    pub fn face_modified(&mut self, bm: &BMesh, f: FaceId) {
        let Some(entry) = self.entries.last_mut().filter(|_| self.open) else {
            return;
        };
        if entry.faces.contains_key(&f) {
            return;
        }
        let Some(face) = bm.face(f) else { return };
        let loop_rows = bm
            .face_loops(f)
            .into_iter()
            .map(|l| (l, bm.ldata.row(l.index()).to_vec()))
            .collect();
        entry.faces.insert(
            f,
            FaceSnapshot {
                flag: face.flag,
                row: bm.pdata.row(f.index()).to_vec(),
                loop_rows,
            },
        );
    }

    /// Roll back the most recent entry and drop it.
    ///
    /// If the attribute layout changed since the entry was recorded only
    /// positions, normals and flags are restored.
    pub fn undo_entry(&mut self, bm: &mut BMesh) -> bool {
        let Some(entry) = self.entries.pop() else {
            debug!("BmLog: nothing to undo");
            return false;
        };
        self.open = false;

        let [vgen, lgen, pgen] = generations(bm);
        let rows_valid = [vgen, lgen, pgen] == entry.generations;
        if !rows_valid {
            warn!(
                "BmLog: attribute layout changed since '{}', restoring geometry only",
                entry.name
            );
        }

        for (v, snap) in &entry.verts {
            let Some(vert) = bm.vert_mut(*v) else { continue };
            vert.co = snap.co;
            vert.no = snap.no;
            vert.flag = snap.flag;
            if rows_valid {
                bm.vdata.set_row(v.index(), &snap.row);
            }
        }
        for (f, snap) in &entry.faces {
            let Some(face) = bm.face_mut(*f) else { continue };
            face.flag = snap.flag;
            if !rows_valid {
                continue;
            }
            bm.pdata.set_row(f.index(), &snap.row);
            for (l, row) in &snap.loop_rows {
                if bm.get_loop(*l).is_some() {
                    bm.ldata.set_row(l.index(), row);
                }
            }
        }

        debug!(
            "BmLog: undid '{}' ({} verts, {} faces)",
            entry.name,
            entry.verts.len(),
            entry.faces.len()
        );
        true
    }

    /// Adopt a new dyn-vert layer handle after a layout change
    pub fn set_cd_offsets(&mut self, dyn_vert: Option<LayerHandle>) {
        self.dyn_vert = dyn_vert;
    }

    /// Original position recorded in the dyn-vert layer of `v`
    pub fn original_co(&self, bm: &BMesh, v: VertId) -> Option<Vec3> {
        let offset = bm.vdata.resolve(self.dyn_vert.as_ref()?)?;
        bm.vert(v)?;
        let mv: DynTopoVert = bm.vdata.get(v.index(), offset);
        Some(Vec3::from_array(mv.origco))
    }
}

fn generations(bm: &BMesh) -> [u64; 3] {
    [bm.vdata.generation(), bm.ldata.generation(), bm.pdata.generation()]
}

/// Kind of an undo node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoNodeKind {
    /// Dynamic topology was switched on
    DyntopoBegin,
    /// Dynamic topology was switched off
    DyntopoEnd,
    /// Whole-mesh geometry snapshot
    Geometry,
}

#[derive(Debug, Clone)]
pub struct UndoNode {
    pub kind: UndoNodeKind,
    /// Flat mesh at the time the node was pushed
    pub mesh: Option<Mesh>,
}

/// A named group of undo nodes
#[derive(Debug, Clone)]
pub struct UndoStep {
    pub name: String,
    pub nodes: Vec<UndoNode>,
}

/// Coarse undo steps of a sculpt session
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    steps: Vec<UndoStep>,
    pending: Option<UndoStep>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a step. A step that is still open is finished first.
    pub fn push_begin(&mut self, name: impl Into<String>) {
        if self.pending.is_some() {
            warn!("UndoStack: push_begin with an open step, closing it");
            self.push_end();
        }
        self.pending = Some(UndoStep {
            name: name.into(),
            nodes: Vec::new(),
        });
    }

    /// Add a node to the open step. Returns false if no step is open.
    pub fn push_node(&mut self, kind: UndoNodeKind, mesh: Option<Mesh>) -> bool {
        let Some(step) = self.pending.as_mut() else {
            warn!("UndoStack: push_node({:?}) without an open step", kind);
            return false;
        };
        step.nodes.push(UndoNode { kind, mesh });
        true
    }

    /// Close the open step and append it. Returns false if none was open.
    pub fn push_end(&mut self) -> bool {
        let Some(step) = self.pending.take() else {
            return false;
        };
        debug!("UndoStack: step '{}' with {} nodes", step.name, step.nodes.len());
        self.steps.push(step);
        true
    }

    /// Drop the open step without recording it
    pub fn push_discard(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn steps(&self) -> &[UndoStep] {
        &self.steps
    }

    pub fn last(&self) -> Option<&UndoStep> {
        self.steps.last()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
