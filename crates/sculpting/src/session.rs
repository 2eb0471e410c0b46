//! Sculpt session state and the dynamic topology state machine.
//!
//! A session is **static** while only the flat [`Mesh`] exists and
//! **dynamic** while it owns a [`BMesh`]. [`SculptSession::enable`] and
//! [`SculptSession::disable`] move between the two; everything the
//! boundary-rep mesh needs while dynamic (layer handles, partition, undo log,
//! persistent base) lives on the session.

use glam::Vec3;
use tracing::{debug, warn};

use bmesh::mesh_mapping::vert_edge_map;
use bmesh::{
    BMesh, ElemFlags, FromMeshParams, LayerFlags, LayerHandle, LayerType, MeshFlags,
    MeshVertFlags, ToMeshParams, VertId,
};
use dyntopo_config::DyntopoConfig;

use crate::cotangent::{CotangentWeights, WeightEngine};
use crate::disk_cycle;
use crate::events::{EventBus, SculptEvent};
use crate::layers::{self, NodeLayers};
use crate::object::{ModifierKind, ModifierTypeClass, SculptObject};
use crate::pbvh::Pbvh;
use crate::types::{
    DynVertFlags, DyntopoError, DyntopoWarnings, LAYER_DISP_LAYER, PERS_CO_LAYER,
    PERS_DISP_LAYER, PERS_NO_LAYER, PbvhType, PersistentBase, VertexRef,
};
use crate::undo::{BmLog, UndoNodeKind, UndoStack};

/// Sculpt state of one object
#[derive(Debug)]
pub struct SculptSession {
    pub object: SculptObject,
    pub(crate) config: DyntopoConfig,
    pub(crate) bm: Option<BMesh>,
    pub(crate) log: Option<BmLog>,
    pub(crate) pbvh: Option<Pbvh>,
    pub(crate) layers: NodeLayers,
    /// Layer brush reference pose, kept across enable/disable cycles
    persistent_base: Option<Vec<PersistentBase>>,
    /// Sorted vertex to edge map of the flat mesh
    vemap: Vec<Vec<u32>>,
    cd_layer_disp: Option<LayerHandle>,
    undo: UndoStack,
    events: EventBus,
}

impl SculptSession {
    pub fn new(object: SculptObject, config: DyntopoConfig) -> Self {
        Self {
            object,
            config,
            bm: None,
            log: None,
            pbvh: None,
            layers: NodeLayers::default(),
            persistent_base: None,
            vemap: Vec::new(),
            cd_layer_disp: None,
            undo: UndoStack::new(),
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &DyntopoConfig {
        &self.config
    }

    /// Whether dynamic topology is active
    pub fn is_enabled(&self) -> bool {
        self.bm.is_some()
    }

    pub fn bm(&self) -> Option<&BMesh> {
        self.bm.as_ref()
    }

    pub fn bm_mut(&mut self) -> Option<&mut BMesh> {
        self.bm.as_mut()
    }

    pub fn log(&self) -> Option<&BmLog> {
        self.log.as_ref()
    }

    pub fn pbvh(&self) -> Option<&Pbvh> {
        self.pbvh.as_ref()
    }

    pub fn layers(&self) -> &NodeLayers {
        &self.layers
    }

    pub fn persistent_base(&self) -> Option<&[PersistentBase]> {
        self.persistent_base.as_deref()
    }

    /// Replace the layer brush reference pose
    pub fn set_persistent_base(&mut self, base: Option<Vec<PersistentBase>>) {
        self.persistent_base = base;
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    /// Offset of the layer brush displacement layer, if it exists
    pub fn layer_disp_offset(&self) -> Option<usize> {
        let bm = self.bm.as_ref()?;
        bm.vdata.resolve(self.cd_layer_disp.as_ref()?)
    }

    pub fn add_event_listener<F>(&mut self, listener: F)
    where
        F: Fn(&SculptEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(listener);
    }

    pub(crate) fn emit(&self, event: SculptEvent) {
        self.events.emit(event);
    }

    // ── Enable / disable ───────────────────────────────────────────────

    /// Report attribute layers that will not survive the conversion and
    /// modifiers that conflict with dynamic topology.
    pub fn dynamic_topology_check(&self) -> DyntopoWarnings {
        let mesh = &self.object.mesh;
        let mut flag = DyntopoWarnings::empty();

        let lossy = |cd: &bmesh::CustomData| {
            cd.layers().iter().any(|l| !l.ty.is_interpolation_safe())
        };
        if lossy(&mesh.vdata) {
            flag |= DyntopoWarnings::WARN_VDATA;
        }
        if lossy(&mesh.edata) {
            flag |= DyntopoWarnings::WARN_EDATA;
        }
        if lossy(&mesh.ldata) {
            flag |= DyntopoWarnings::WARN_LDATA;
        }

        for md in self.object.realtime_modifiers() {
            if md.kind == ModifierKind::Multires {
                flag |= DyntopoWarnings::ERROR_MULTIRES;
            }
            if md.kind.type_class() == ModifierTypeClass::Constructive {
                flag |= DyntopoWarnings::WARN_MODIFIER;
                break;
            }
        }

        if flag.has_advisory() {
            warn!("dynamic_topology_check: {:?}", flag);
        }
        flag
    }

    /// Build the boundary-rep mesh and switch to dynamic topology.
    ///
    /// Nothing is modified when an error is returned.
    pub fn enable(&mut self) -> Result<(), DyntopoError> {
        if self.bm.is_some() {
            return Err(DyntopoError::AlreadyEnabled);
        }
        if self.object.has_active_multires() {
            return Err(DyntopoError::MultiresConflict);
        }

        let params = FromMeshParams {
            calc_face_normal: true,
            use_shapekey: true,
            active_shapekey: self.object.active_shape_key,
        };
        let mut bm = BMesh::from_mesh(&self.object.mesh, &params)?;

        self.pbvh_clear();
        let mesh = &mut self.object.mesh;
        if self.config.smooth_shading {
            for poly in &mut mesh.polys {
                poly.flag |= ElemFlags::SMOOTH;
            }
            let faces: Vec<_> = bm.faces().collect();
            for f in faces {
                if let Some(face) = bm.face_mut(f) {
                    face.flag |= ElemFlags::SMOOTH;
                }
            }
        }
        // Selection state is not maintained by topology edits
        mesh.clear_selection();
        bm.clear_selection();

        self.bm = Some(bm);
        if self.config.triangulate {
            self.triangulate();
        }

        if let Some(bm) = self.bm.as_mut() {
            self.layers = NodeLayers::add(bm);
        }
        self.save_origverts();

        let totvert = self.bm.as_ref().map_or(0, BMesh::vert_count);
        if let Some(base) = &self.persistent_base
            && base.len() != totvert
        {
            warn!(
                "enable: persistent base has {} entries for {} vertices, discarding",
                base.len(),
                totvert
            );
            self.persistent_base = None;
        }

        let has_base = self.persistent_base.is_some();
        if let Some(bm) = self.bm.as_mut() {
            if has_base {
                bm.vdata.ensure_layers(&[
                    (LayerType::PropFloat3, PERS_CO_LAYER, LayerFlags::TEMPORARY),
                    (LayerType::PropFloat3, PERS_NO_LAYER, LayerFlags::TEMPORARY),
                    (LayerType::PropFloat, PERS_DISP_LAYER, LayerFlags::TEMPORARY),
                    (LayerType::PropFloat, LAYER_DISP_LAYER, LayerFlags::TEMPORARY),
                ]);
            }
            self.cd_layer_disp = bm.vdata.handle(LayerType::PropFloat, LAYER_DISP_LAYER);
        }
        self.node_layers_update_offsets();

        let verts: Vec<VertId> = self.bm.as_ref().map(|bm| bm.verts().collect()).unwrap_or_default();
        let pers_offsets = self.bm.as_ref().filter(|_| has_base).and_then(|bm| {
            Some((
                layers::get_templayer(bm, LayerType::PropFloat3, PERS_CO_LAYER)?,
                layers::get_templayer(bm, LayerType::PropFloat3, PERS_NO_LAYER)?,
                layers::get_templayer(bm, LayerType::PropFloat, PERS_DISP_LAYER)?,
            ))
        });
        let layer_disp = self.layer_disp_offset();
        for (i, &v) in verts.iter().enumerate() {
            if let Some(bm) = self.bm.as_mut() {
                self.layers.set_vert_flags(
                    bm,
                    v,
                    DynVertFlags::NEED_DISK_SORT | DynVertFlags::NEED_VALENCE,
                    true,
                );
            }
            self.update_vert_boundary(v);
            self.update_valence(v);

            let Some(bm) = self.bm.as_mut() else { break };
            if let (Some((co, no, disp)), Some(base)) = (
                pers_offsets,
                self.persistent_base.as_ref().and_then(|b| b.get(i)),
            ) {
                bm.vdata.set(v.index(), co, base.co);
                bm.vdata.set(v.index(), no, base.no);
                bm.vdata.set(v.index(), disp, base.disp);
            }
            if let Some(offset) = layer_disp {
                bm.vdata.set(v.index(), offset, 0.0f32);
            }
        }

        let Some(bm) = self.bm.as_mut() else {
            return Ok(());
        };
        if self.object.mesh.face_count() != bm.face_count() {
            bm.normals_update();
        }

        self.object.mesh.flag |= MeshFlags::SCULPT_DYNAMIC_TOPOLOGY;
        self.log = Some(BmLog::new(self.layers.dyn_vert.clone()));

        debug!(
            "enable: {} verts, {} faces, persistent base {}",
            bm.vert_count(),
            bm.face_count(),
            self.persistent_base.is_some()
        );
        self.emit(SculptEvent::TopologyEnabled);
        self.emit(SculptEvent::GeometryChanged);
        Ok(())
    }

    /// Write the boundary-rep mesh back and return to static topology.
    ///
    /// Safe to call without a boundary-rep mesh; the flat mesh is then left
    /// as it is apart from its flags.
    pub fn disable(&mut self) {
        self.pbvh_clear();

        if let Some(bm) = self.bm.as_ref() {
            let params = ToMeshParams {
                active_shapekey: self.object.active_shape_key,
            };
            bm.to_mesh_into(&mut self.object.mesh, &params);
        }

        let mesh = &mut self.object.mesh;
        for flag in &mut mesh.vert_flags {
            flag.remove(MeshVertFlags::HIDE);
            flag.insert(MeshVertFlags::PBVH_UPDATE);
        }
        mesh.flag.remove(MeshFlags::SCULPT_DYNAMIC_TOPOLOGY);

        self.log = None;
        self.save_persistent_base();
        self.bm = None;
        self.layers = NodeLayers::default();
        self.cd_layer_disp = None;

        self.object.reset_particle_systems();
        self.object.reset_point_caches();
        self.emit(SculptEvent::PointCachesReset);

        debug!("disable: {} verts", self.object.mesh.vert_count());
        self.emit(SculptEvent::TopologyDisabled);
        self.emit(SculptEvent::GeometryChanged);
    }

    /// [`enable`](Self::enable) recorded as one undo step
    pub fn enable_with_undo(&mut self) -> Result<(), DyntopoError> {
        if self.bm.is_some() {
            return Ok(());
        }
        let use_undo = self.config.use_undo;
        let snapshot = use_undo.then(|| self.object.mesh.clone());
        if use_undo {
            self.undo.push_begin("Dynamic topology enable");
        }
        if let Err(err) = self.enable() {
            if use_undo {
                self.undo.push_discard();
            }
            return Err(err);
        }
        if use_undo {
            self.undo.push_node(UndoNodeKind::DyntopoBegin, snapshot);
            self.undo.push_end();
        }
        Ok(())
    }

    /// [`disable`](Self::disable) recorded as one undo step
    pub fn disable_with_undo(&mut self) {
        let Some(bm) = self.bm.as_ref() else {
            return;
        };
        let use_undo = self.config.use_undo;
        if use_undo {
            let mut snapshot = self.object.mesh.clone();
            bm.to_mesh_into(
                &mut snapshot,
                &ToMeshParams {
                    active_shapekey: self.object.active_shape_key,
                },
            );
            self.undo.push_begin("Dynamic topology disable");
            self.undo.push_node(UndoNodeKind::DyntopoEnd, Some(snapshot));
        }
        self.disable();
        if use_undo {
            self.undo.push_end();
        }
    }

    /// Switch to the other topology mode
    pub fn toggle(&mut self) -> Result<(), DyntopoError> {
        if self.bm.is_some() {
            self.disable_with_undo();
            Ok(())
        } else {
            self.enable_with_undo()
        }
    }

    /// Triangulate every face with more than three sides. Returns the
    /// number of faces split.
    pub fn triangulate(&mut self) -> usize {
        let Some(bm) = self.bm.as_mut() else {
            return 0;
        };
        if bm.loop_count() == bm.face_count() * 3 {
            return 0;
        }
        bm.triangulate_all()
    }

    // ── Per-vertex bookkeeping ────────────────────────────────────────

    /// Snapshot current position, normal and color as the original state of
    /// every vertex.
    pub fn save_origverts(&mut self) {
        let Some(bm) = self.bm.as_mut() else { return };
        let vcol = self.layers.vcol_offset(bm);
        let verts: Vec<VertId> = bm.verts().collect();
        for v in verts {
            let Some((co, no)) = bm.vert(v).map(|vert| (vert.co, vert.no)) else {
                continue;
            };
            let color: Option<[f32; 4]> = vcol.map(|offset| bm.vdata.get(v.index(), offset));
            self.layers.update_dyn_vert(bm, v, |mv| {
                mv.origco = co.to_array();
                mv.origno = no.to_array();
                if let Some(color) = color {
                    mv.origcolor = color;
                }
            });
        }
    }

    /// Copy the persistent base layers out of the boundary-rep mesh.
    ///
    /// Does nothing unless the layers exist.
    pub fn save_persistent_base(&mut self) {
        let Some(bm) = self.bm.as_ref() else { return };
        let Some(co) = layers::get_templayer(bm, LayerType::PropFloat3, PERS_CO_LAYER) else {
            return;
        };
        let no = layers::get_templayer(bm, LayerType::PropFloat3, PERS_NO_LAYER);
        let disp = layers::get_templayer(bm, LayerType::PropFloat, PERS_DISP_LAYER);

        let base: Vec<PersistentBase> = bm
            .verts()
            .map(|v| PersistentBase {
                co: bm.vdata.get(v.index(), co),
                no: no.map(|offset| bm.vdata.get(v.index(), offset)).unwrap_or_default(),
                disp: disp.map(|offset| bm.vdata.get(v.index(), offset)).unwrap_or_default(),
            })
            .collect();
        debug!("save_persistent_base: {} vertices", base.len());
        self.persistent_base = Some(base);
    }

    /// Recompute the boundary bits of `v`
    pub fn update_vert_boundary(&mut self, v: VertId) {
        let Some(bm) = self.bm.as_mut() else { return };
        let boundary = bm.vert_is_boundary(v);
        let fset_boundary = self.layers.faceset_offset(bm).is_some_and(|offset| {
            let mut sets = bm
                .vert_faces(v)
                .into_iter()
                .map(|f| bm.pdata.get::<i32>(f.index(), offset));
            match sets.next() {
                Some(first) => sets.any(|s| s != first),
                None => false,
            }
        });

        self.layers.update_dyn_vert(bm, v, |mv| {
            let mut flag = DynVertFlags::from_bits_truncate(mv.flag);
            flag.set(DynVertFlags::BOUNDARY, boundary);
            flag.set(DynVertFlags::FSET_BOUNDARY, fset_boundary);
            flag.remove(DynVertFlags::NEED_BOUNDARY);
            mv.flag = flag.bits();
        });
    }

    /// Recompute the cached valence of `v`
    pub fn update_valence(&mut self, v: VertId) {
        let Some(bm) = self.bm.as_mut() else { return };
        let valence = bm.vert_valence(v) as u32;
        self.layers.update_dyn_vert(bm, v, |mv| {
            mv.valence = valence;
            mv.flag &= !DynVertFlags::NEED_VALENCE.bits();
        });
    }

    // ── Spatial partition ─────────────────────────────────────────────

    /// Drop the partition and the flat mesh adjacency map
    pub fn pbvh_clear(&mut self) {
        self.pbvh = None;
        self.vemap.clear();
    }

    /// Build the partition over the boundary-rep mesh if it is missing
    pub fn pbvh_ensure(&mut self) -> Option<&Pbvh> {
        if self.pbvh.is_none() {
            let bm = self.bm.as_mut()?;
            self.pbvh = Some(Pbvh::build(bm, &self.layers, &self.config.partition));
        }
        self.pbvh.as_ref()
    }

    pub fn pbvh_type(&self) -> PbvhType {
        if self.bm.is_some() {
            PbvhType::BMesh
        } else if self.object.has_active_multires() {
            PbvhType::Grids
        } else {
            PbvhType::Faces
        }
    }

    /// Refresh the cached areas of the faces in `nodes`
    pub fn update_face_areas(&mut self, nodes: &[usize]) {
        if let (Some(bm), Some(pbvh)) = (self.bm.as_mut(), self.pbvh.as_ref()) {
            pbvh.update_face_areas(bm, nodes);
        }
    }

    // ── Cotangent weights ─────────────────────────────────────────────

    /// Prepare adjacency for [`get_cotangents`](Self::get_cotangents)
    pub fn cotangents_begin(&mut self) {
        match self.pbvh_type() {
            PbvhType::BMesh => {
                if let Some(bm) = self.bm.as_mut() {
                    disk_cycle::sort_all_dirty(bm, &self.layers);
                }
            }
            PbvhType::Faces => {
                if self.vemap.is_empty() {
                    self.vemap = vert_edge_map(&self.object.mesh, true);
                }
            }
            PbvhType::Grids => {}
        }
    }

    pub fn get_cotangents(&mut self, vertex: VertexRef) -> CotangentWeights {
        match self.pbvh_type() {
            PbvhType::BMesh => match self.bm.as_mut() {
                Some(bm) => WeightEngine::BMesh {
                    bm,
                    layers: &self.layers,
                }
                .get_cotangents(vertex),
                None => CotangentWeights::default(),
            },
            PbvhType::Faces => {
                if self.vemap.is_empty() {
                    self.vemap = vert_edge_map(&self.object.mesh, true);
                }
                WeightEngine::Faces {
                    mesh: &self.object.mesh,
                    vemap: &self.vemap,
                }
                .get_cotangents(vertex)
            }
            PbvhType::Grids => WeightEngine::Grids {
                mesh: &self.object.mesh,
            }
            .get_cotangents(vertex),
        }
    }

    // ── Attribute layers ──────────────────────────────────────────────

    /// Rebuild every cached layer handle and hand them to the partition and
    /// the undo log.
    pub fn node_layers_update_offsets(&mut self) {
        let Some(bm) = self.bm.as_mut() else { return };
        self.layers.update_offsets(bm);
        if let Some(pbvh) = self.pbvh.as_mut() {
            pbvh.update_offsets(&self.layers);
        }
        if let Some(log) = self.log.as_mut() {
            log.set_cd_offsets(self.layers.dyn_vert.clone());
        }
    }

    /// Add a temporary vertex layer if it is missing and refresh handles
    pub fn ensure_templayer(&mut self, ty: LayerType, name: &str) -> bool {
        let Some(bm) = self.bm.as_mut() else {
            return false;
        };
        let added = layers::ensure_templayer(bm, ty, name);
        if added {
            self.node_layers_update_offsets();
        }
        added
    }

    pub fn get_templayer(&self, ty: LayerType, name: &str) -> Option<usize> {
        layers::get_templayer(self.bm.as_ref()?, ty, name)
    }

    pub fn has_templayer(&self, ty: LayerType, name: &str) -> bool {
        self.bm
            .as_ref()
            .is_some_and(|bm| layers::has_templayer(bm, ty, name))
    }

    /// Pull layers added to the flat mesh into the boundary-rep mesh
    pub fn sync_layers(&mut self) -> bool {
        let Some(bm) = self.bm.as_mut() else {
            return false;
        };
        let modified = layers::sync_layers(&self.object.mesh, bm);
        if modified {
            self.node_layers_update_offsets();
        }
        modified
    }

    /// Original position of `v` recorded on enable or by the last stroke
    pub fn original_co(&self, v: VertId) -> Option<Vec3> {
        let bm = self.bm.as_ref()?;
        let mv = self.layers.dyn_vert(bm, v)?;
        Some(Vec3::from_array(mv.origco))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Modifier;
    use bmesh::primitives;
    use std::sync::{Arc, Mutex};

    fn session(mesh: bmesh::Mesh) -> SculptSession {
        SculptSession::new(SculptObject::new(mesh), DyntopoConfig::default())
    }

    fn record_events(ss: &mut SculptSession) -> Arc<Mutex<Vec<SculptEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        ss.add_event_listener(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn test_round_trip_keeps_geometry() {
        let mesh = primitives::triangle_grid(3, 3, 2.0);
        let original = mesh.positions.clone();
        let mut ss = session(mesh);

        ss.enable().unwrap();
        assert!(ss.is_enabled());
        assert_eq!(ss.pbvh_type(), PbvhType::BMesh);
        assert!(ss.object.mesh.flag.contains(MeshFlags::SCULPT_DYNAMIC_TOPOLOGY));
        ss.disable();

        assert!(!ss.is_enabled());
        let mesh = &ss.object.mesh;
        assert_eq!(mesh.vert_count(), original.len());
        assert_eq!(mesh.face_count(), 18);
        for (a, b) in mesh.positions.iter().zip(&original) {
            assert!(a.distance(*b) < 1e-6);
        }
        assert!(!mesh.flag.contains(MeshFlags::SCULPT_DYNAMIC_TOPOLOGY));
        assert!(mesh.vert_flags.iter().all(|f| f.contains(MeshVertFlags::PBVH_UPDATE)));
    }

    #[test]
    fn test_multires_blocks_enable() {
        let mut ss = session(primitives::grid(2, 2, 1.0));
        ss.object.modifiers.push(Modifier::new("Multires", ModifierKind::Multires));
        let events = record_events(&mut ss);

        assert!(matches!(ss.enable(), Err(DyntopoError::MultiresConflict)));
        assert!(!ss.is_enabled());
        assert!(ss.log().is_none());
        assert!(!ss.object.mesh.flag.contains(MeshFlags::SCULPT_DYNAMIC_TOPOLOGY));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(ss.pbvh_type(), PbvhType::Grids);

        // A multires hidden from the viewport does not count
        ss.object.modifiers[0].show_realtime = false;
        assert!(ss.enable().is_ok());
    }

    #[test]
    fn test_selection_cleared_across_round_trip() {
        let mut mesh = primitives::triangle_grid(2, 2, 2.0);
        for flag in &mut mesh.vert_flags {
            flag.insert(MeshVertFlags::SELECT);
        }
        for flag in &mut mesh.edge_flags {
            flag.insert(ElemFlags::SELECT);
        }
        let mut ss = session(mesh);

        ss.enable().unwrap();
        let bm = ss.bm().unwrap();
        assert!(bm.verts().all(|v| !bm.vert(v).unwrap().flag.contains(ElemFlags::SELECT)));
        assert!(bm.edges().all(|e| !bm.edge(e).unwrap().flag.contains(ElemFlags::SELECT)));

        ss.disable();
        let mesh = &ss.object.mesh;
        assert_eq!(mesh.vert_count(), 9);
        assert!(mesh.vert_flags.iter().all(|f| !f.contains(MeshVertFlags::SELECT)));
        assert!(mesh.edge_flags.iter().all(|f| !f.contains(ElemFlags::SELECT)));
        assert!(mesh.polys.iter().all(|p| !p.flag.contains(ElemFlags::SELECT)));
    }

    #[test]
    fn test_enable_twice_is_an_error() {
        let mut ss = session(primitives::grid(1, 1, 1.0));
        ss.enable().unwrap();
        assert!(matches!(ss.enable(), Err(DyntopoError::AlreadyEnabled)));
    }

    #[test]
    fn test_dynamic_topology_check() {
        let mut mesh = primitives::grid(1, 1, 1.0);
        mesh.vdata.add_layer(LayerType::PaintMask, "", LayerFlags::empty());
        let mut ss = session(mesh);
        assert_eq!(ss.dynamic_topology_check(), DyntopoWarnings::empty());

        ss.object.mesh.ldata.add_layer(LayerType::LoopUv, "UVMap", LayerFlags::empty());
        ss.object.mesh.edata.add_layer(LayerType::Crease, "", LayerFlags::empty());
        assert_eq!(
            ss.dynamic_topology_check(),
            DyntopoWarnings::WARN_LDATA | DyntopoWarnings::WARN_EDATA
        );

        ss.object.modifiers.push(Modifier::new("Armature", ModifierKind::Armature));
        assert!(!ss.dynamic_topology_check().contains(DyntopoWarnings::WARN_MODIFIER));
        ss.object.modifiers.push(Modifier::new("Subsurf", ModifierKind::Subsurf));
        assert!(ss.dynamic_topology_check().contains(DyntopoWarnings::WARN_MODIFIER));

        ss.object.modifiers.insert(0, Modifier::new("Multires", ModifierKind::Multires));
        let flag = ss.dynamic_topology_check();
        assert!(flag.contains(DyntopoWarnings::ERROR_MULTIRES | DyntopoWarnings::WARN_MODIFIER));
    }

    #[test]
    fn test_enable_initializes_vertices() {
        let mut ss = session(primitives::triangle_grid(2, 2, 2.0));
        ss.enable().unwrap();
        let bm = ss.bm().unwrap();
        let layers = ss.layers();

        for v in bm.verts() {
            let mv = layers.dyn_vert(bm, v).unwrap();
            let flag = DynVertFlags::from_bits_truncate(mv.flag);
            assert!(flag.contains(DynVertFlags::NEED_DISK_SORT));
            assert!(!flag.contains(DynVertFlags::NEED_VALENCE));
            assert_eq!(mv.valence as usize, bm.vert_valence(v));
            assert_eq!(flag.contains(DynVertFlags::BOUNDARY), bm.vert_is_boundary(v));
            assert_eq!(Vec3::from_array(mv.origco), bm.co(v));
        }
        // Only the center of a 2x2 grid is interior
        let interior: Vec<_> = bm
            .verts()
            .filter(|&v| !layers.vert_flags(bm, v).contains(DynVertFlags::BOUNDARY))
            .collect();
        assert_eq!(interior, vec![VertId(4)]);
        assert_eq!(ss.original_co(VertId(4)), Some(Vec3::ZERO));
    }

    #[test]
    fn test_triangulate_follows_config() {
        let mut ss = session(primitives::cube(1.0));
        ss.enable().unwrap();
        assert_eq!(ss.bm().unwrap().face_count(), 12);
        assert_eq!(ss.triangulate(), 0);
        ss.disable();
        assert_eq!(ss.object.mesh.face_count(), 12);

        let config = DyntopoConfig {
            triangulate: false,
            ..Default::default()
        };
        let mut ss = SculptSession::new(SculptObject::new(primitives::cube(1.0)), config);
        ss.enable().unwrap();
        assert_eq!(ss.bm().unwrap().face_count(), 6);
    }

    #[test]
    fn test_disable_without_bmesh() {
        let mut ss = session(primitives::grid(1, 1, 1.0));
        let events = record_events(&mut ss);
        ss.disable();

        assert_eq!(ss.object.mesh.vert_count(), 4);
        assert!(ss.persistent_base().is_none());
        assert_eq!(ss.object.point_cache_resets, 1);
        let events = events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| **e == SculptEvent::GeometryChanged).count(), 1);
    }

    #[test]
    fn test_one_geometry_event_per_transition() {
        let mut ss = session(primitives::grid(2, 2, 1.0));
        let events = record_events(&mut ss);

        ss.enable().unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![SculptEvent::TopologyEnabled, SculptEvent::GeometryChanged]
        );

        events.lock().unwrap().clear();
        ss.disable();
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                SculptEvent::PointCachesReset,
                SculptEvent::TopologyDisabled,
                SculptEvent::GeometryChanged
            ]
        );
        assert_eq!(ss.object.particle_resets, 1);
    }

    #[test]
    fn test_toggle_pushes_named_undo_steps() {
        let mut ss = session(primitives::grid(2, 2, 1.0));
        ss.toggle().unwrap();
        assert!(ss.is_enabled());
        ss.toggle().unwrap();
        assert!(!ss.is_enabled());

        let steps = ss.undo_stack().steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "Dynamic topology enable");
        assert_eq!(steps[0].nodes[0].kind, UndoNodeKind::DyntopoBegin);
        assert_eq!(steps[1].name, "Dynamic topology disable");
        assert_eq!(steps[1].nodes[0].kind, UndoNodeKind::DyntopoEnd);
        // The disable snapshot holds the triangulated mesh
        assert_eq!(steps[1].nodes[0].mesh.as_ref().unwrap().face_count(), 8);
    }

    #[test]
    fn test_failed_enable_leaves_no_undo_step() {
        let mut ss = session(primitives::grid(1, 1, 1.0));
        ss.object.modifiers.push(Modifier::new("Multires", ModifierKind::Multires));
        assert!(ss.toggle().is_err());
        assert!(ss.undo_stack().is_empty());
    }

    #[test]
    fn test_persistent_base_survives_cycle() {
        let mut ss = session(primitives::triangle_grid(1, 1, 1.0));
        ss.enable().unwrap();
        assert!(ss.layer_disp_offset().is_none());

        for (ty, name) in [
            (LayerType::PropFloat3, PERS_CO_LAYER),
            (LayerType::PropFloat3, PERS_NO_LAYER),
            (LayerType::PropFloat, PERS_DISP_LAYER),
        ] {
            assert!(ss.ensure_templayer(ty, name));
        }
        let co = ss.get_templayer(LayerType::PropFloat3, PERS_CO_LAYER).unwrap();
        let disp = ss.get_templayer(LayerType::PropFloat, PERS_DISP_LAYER).unwrap();
        let bm = ss.bm_mut().unwrap();
        let verts: Vec<VertId> = bm.verts().collect();
        for &v in &verts {
            bm.vdata.set(v.index(), co, [v.0 as f32, 1.0, 2.0]);
            bm.vdata.set(v.index(), disp, 0.25f32);
        }

        ss.disable();
        let base = ss.persistent_base().unwrap();
        assert_eq!(base.len(), 4);
        assert_eq!(base[3].co, [3.0, 1.0, 2.0]);

        ss.enable().unwrap();
        assert!(ss.has_templayer(LayerType::PropFloat, LAYER_DISP_LAYER));
        let layer_disp = ss.layer_disp_offset().unwrap();
        let co = ss.get_templayer(LayerType::PropFloat3, PERS_CO_LAYER).unwrap();
        let disp = ss.get_templayer(LayerType::PropFloat, PERS_DISP_LAYER).unwrap();
        let bm = ss.bm().unwrap();
        for v in bm.verts() {
            assert_eq!(bm.vdata.get::<[f32; 3]>(v.index(), co), [v.0 as f32, 1.0, 2.0]);
            assert_eq!(bm.vdata.get::<f32>(v.index(), disp), 0.25);
            assert_eq!(bm.vdata.get::<f32>(v.index(), layer_disp), 0.0);
        }
    }

    #[test]
    fn test_stale_persistent_base_is_discarded() {
        let mut ss = session(primitives::grid(1, 1, 1.0));
        ss.set_persistent_base(Some(vec![PersistentBase::default(); 3]));
        ss.enable().unwrap();
        assert!(ss.persistent_base().is_none());
        assert!(!ss.has_templayer(LayerType::PropFloat3, PERS_CO_LAYER));
    }

    #[test]
    fn test_templayer_refreshes_handles() {
        let mut ss = session(primitives::triangle_grid(2, 2, 1.0));
        ss.enable().unwrap();
        assert!(ss.pbvh_ensure().is_some());

        assert!(ss.ensure_templayer(LayerType::DeformWeight, "__weights"));
        assert!(!ss.ensure_templayer(LayerType::DeformWeight, "__weights"));
        let bm = ss.bm().unwrap();
        let offset = ss.layers().dyn_vert_offset(bm).unwrap();
        assert_eq!(bm.vdata.named_offset(LayerType::DynTopoVert, ""), Some(offset));
        assert_eq!(ss.log().unwrap().original_co(bm, VertId(4)), Some(Vec3::ZERO));
    }

    #[test]
    fn test_sync_layers_after_mesh_edit() {
        let mut ss = session(primitives::triangle_grid(1, 1, 1.0));
        ss.enable().unwrap();
        assert!(!ss.sync_layers());
        ss.object.mesh.ldata.add_layer(LayerType::LoopUv, "UVMap", LayerFlags::empty());
        assert!(ss.sync_layers());
        assert!(ss.bm().unwrap().ldata.has_layer(LayerType::LoopUv));
    }

    #[test]
    fn test_cotangents_agree_across_modes() {
        let mut ss = session(primitives::triangle_grid(2, 2, 2.0));
        ss.cotangents_begin();
        let flat = ss.get_cotangents(VertexRef(4));

        ss.enable().unwrap();
        ss.cotangents_begin();
        let dynamic = ss.get_cotangents(VertexRef(4));

        assert_eq!(flat.len(), 6);
        assert_eq!(dynamic.len(), 6);
        assert!((flat.total_area - dynamic.total_area).abs() < 1e-5);
        let sum = |w: &CotangentWeights| w.partition_of_unity().unwrap().iter().sum::<f32>();
        assert!((sum(&flat) - 1.0).abs() < 1e-5);
        assert!((sum(&dynamic) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_face_areas_through_partition() {
        let mut ss = session(primitives::triangle_grid(2, 2, 2.0));
        ss.enable().unwrap();
        let nodes: Vec<usize> = (0..ss.pbvh_ensure().unwrap().node_count()).collect();
        ss.update_face_areas(&nodes);

        let bm = ss.bm().unwrap();
        let offset = ss.layers().face_areas_offset(bm).unwrap();
        for f in bm.faces() {
            assert!((bm.pdata.get::<f32>(f.index(), offset) - 0.5).abs() < 1e-5);
        }
    }
}
