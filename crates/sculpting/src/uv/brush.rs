//! Brush application driving the UV solver.

use glam::DVec2;
use tracing::{debug, warn};

use bmesh::{BMesh, ElemFlags, FaceId, LayerType, LoopId};

use crate::brush::{BrushTest, StrokeCache};
use crate::events::SculptEvent;
use crate::pbvh::Pbvh;
use crate::session::SculptSession;
use crate::undo::BmLog;

use super::solver::UvSolver;

/// Relax the UV layer over the faces of `nodes` that lie inside the brush.
///
/// Records every touched face in the undo log as one entry and emits a single
/// [`SculptEvent::GeometryChanged`]. Returns false when the session has no
/// boundary-rep mesh, no UV layer or no partition.
pub fn uv_brush(session: &mut SculptSession, nodes: &[usize], cache: &StrokeCache) -> bool {
    let config = session.config.uv.clone();
    let (Some(bm), Some(pbvh)) = (session.bm.as_mut(), session.pbvh.as_ref()) else {
        return false;
    };
    let Some(cd_uv) = bm.ldata.offset(LayerType::LoopUv) else {
        debug!("uv_brush: no UV layer");
        return false;
    };

    let log = session.log.get_or_insert_with(|| BmLog::new(session.layers.dyn_vert.clone()));
    log.entry_add(bm, "UV relax");

    let iterations = config.iterations;
    let mut solver = UvSolver::new(cd_uv, config);
    solver.strength = cache.bstrength as f64;

    let mut test = BrushTest::new(cache);
    for &node in nodes {
        gather_node(bm, pbvh, node, log, &mut solver, &mut test);
    }

    solver.solve_begin(bm);
    let mut residual = 0.0;
    for _ in 0..iterations {
        residual = solver.solve_step(bm);
    }
    log.entry_end();

    debug!(
        "uv_brush: {} tris over {} nodes, final residual {:.6}",
        solver.tris().len(),
        nodes.len(),
        residual
    );
    session.emit(SculptEvent::GeometryChanged);
    true
}

/// Add the brushed faces of `node` to the solver, marking UV splits and
/// seams as boundary and welding nearly coincident corners.
fn gather_node(
    bm: &mut BMesh,
    pbvh: &Pbvh,
    node: usize,
    log: &mut BmLog,
    solver: &mut UvSolver,
    test: &mut BrushTest,
) {
    let cd_uv = solver.cd_uv();
    let weld_distance = solver.config().weld_distance as f64;
    for &f in pbvh.node_faces(node) {
        let Some(face) = bm.face(f) else { continue };
        if face.flag.contains(ElemFlags::HIDDEN) || !test.test(bm.face_center(f)) {
            continue;
        }

        log_corner_faces(bm, log, f);
        if let Err(err) = solver.ensure_face(bm, f) {
            warn!("uv_brush: skipping face: {}", err);
            continue;
        }

        for l in bm.face_loops(f) {
            let Some(v) = bm.get_loop(l).map(|lp| lp.v) else { continue };
            let corners = bm.vert_loops(v);

            let mut ok = true;
            let mut last: Option<usize> = None;
            let mut sum = DVec2::ZERO;
            let mut welded: Vec<(LoopId, usize)> = Vec::with_capacity(corners.len());
            for &l2 in &corners {
                let Some(sv) = solver.get_vert(bm, l2) else { continue };
                if let Some(prev) = last
                    && prev != sv
                {
                    ok = false;
                    solver.verts_mut()[prev].boundary = true;
                    solver.verts_mut()[sv].boundary = true;
                }
                last = Some(sv);

                let uv: [f32; 2] = bm.ldata.get(l2.index(), cd_uv);
                sum += DVec2::new(uv[0] as f64, uv[1] as f64);
                welded.push((l2, sv));

                let seam = bm
                    .get_loop(l2)
                    .and_then(|lp| bm.edge(lp.e))
                    .is_some_and(|e| e.flag.contains(ElemFlags::SEAM));
                if seam {
                    ok = false;
                    solver.verts_mut()[sv].boundary = true;
                }
            }

            if !ok || welded.is_empty() {
                continue;
            }
            let avg = sum / welded.len() as f64;
            for (l2, sv) in welded {
                let uv: [f32; 2] = bm.ldata.get(l2.index(), cd_uv);
                let uv = DVec2::new(uv[0] as f64, uv[1] as f64);
                if uv.distance(avg) < weld_distance {
                    bm.ldata.set(l2.index(), cd_uv, [avg.x as f32, avg.y as f32]);
                    solver.verts_mut()[sv].uv = avg;
                }
            }
        }
    }
}

/// Record every face with a corner on `f`'s vertices, since merged and
/// welded corners outside the brush are written too
fn log_corner_faces(bm: &BMesh, log: &mut BmLog, f: FaceId) {
    for v in bm.face_verts(f) {
        for g in bm.vert_faces(v) {
            log.face_modified(bm, g);
        }
    }
}

impl SculptSession {
    /// Apply the UV relax brush at the stroke location. Builds the partition
    /// if needed.
    pub fn apply_uv_brush(&mut self, cache: &StrokeCache) -> bool {
        let Some(pbvh) = self.pbvh_ensure() else {
            return false;
        };
        let nodes = pbvh.search_sphere(cache.location, cache.radius);
        if nodes.is_empty() {
            return false;
        }
        uv_brush(self, &nodes, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SculptObject;
    use bmesh::{primitives, LayerFlags, Mesh, VertId};
    use dyntopo_config::DyntopoConfig;
    use glam::Vec3;
    use std::sync::{Arc, Mutex};

    fn with_uvs(mut mesh: Mesh, offset: Vec3) -> Mesh {
        let index = mesh.ldata.add_layer(LayerType::LoopUv, "UVMap", LayerFlags::empty());
        let cd = mesh.ldata.layers()[index].offset;
        for c in 0..mesh.loop_count() {
            let v = mesh.corner_verts[c];
            let mut co = mesh.positions[v as usize];
            if v == 12 {
                co += offset;
            }
            mesh.ldata.set(c, cd, [co.x, co.y]);
        }
        mesh
    }

    fn session(mesh: Mesh) -> SculptSession {
        let mut ss = SculptSession::new(SculptObject::new(mesh), DyntopoConfig::default());
        ss.enable().unwrap();
        ss
    }

    fn corner_uvs(ss: &SculptSession, v: VertId) -> Vec<[f32; 2]> {
        let bm = ss.bm().unwrap();
        let cd = bm.ldata.offset(LayerType::LoopUv).unwrap();
        bm.vert_loops(v).into_iter().map(|l| bm.ldata.get(l.index(), cd)).collect()
    }

    #[test]
    fn test_brush_pulls_center_back() {
        let mesh = with_uvs(primitives::triangle_grid(4, 4, 4.0), Vec3::new(0.3, 0.2, 0.0));
        let mut ss = session(mesh);
        let before = corner_uvs(&ss, VertId(12));
        assert!(before.iter().all(|uv| (uv[0] - 0.3).abs() < 1e-6));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        ss.add_event_listener(move |e| sink.lock().unwrap().push(e.clone()));

        let cache = StrokeCache::new(Vec3::ZERO, 1.2, 1.0);
        assert!(ss.apply_uv_brush(&cache));
        assert_eq!(*events.lock().unwrap(), vec![SculptEvent::GeometryChanged]);

        let after = corner_uvs(&ss, VertId(12));
        let first = after[0];
        assert!(after.iter().all(|uv| *uv == first));
        let dist_before = (0.3f32 * 0.3 + 0.2 * 0.2).sqrt();
        let dist_after = (first[0] * first[0] + first[1] * first[1]).sqrt();
        assert!(dist_after < dist_before, "{dist_before} -> {dist_after}");
    }

    #[test]
    fn test_brush_is_one_undo_entry() {
        let mesh = with_uvs(primitives::triangle_grid(4, 4, 4.0), Vec3::new(0.3, 0.2, 0.0));
        let mut ss = session(mesh);
        let before = corner_uvs(&ss, VertId(12));

        let cache = StrokeCache::new(Vec3::ZERO, 1.2, 1.0);
        assert!(ss.apply_uv_brush(&cache));
        assert_ne!(corner_uvs(&ss, VertId(12)), before);

        let log = ss.log().unwrap();
        assert!(!log.is_open());
        let entries = log.entry_count();
        assert!(!log.current_entry().unwrap().faces.is_empty());

        let mut log = ss.log.take().unwrap();
        assert!(log.undo_entry(ss.bm.as_mut().unwrap()));
        assert_eq!(log.entry_count(), entries - 1);
        assert_eq!(corner_uvs(&ss, VertId(12)), before);
    }

    #[test]
    fn test_seam_keeps_islands_apart() {
        let mut ss = session(primitives::seam_pair());
        let cache = StrokeCache::new(Vec3::new(0.5, 0.5, 0.0), 2.0, 1.0);
        assert!(ss.apply_uv_brush(&cache));

        // Both seam vertices keep one corner per island
        for v in [VertId(1), VertId(2)] {
            let uvs = corner_uvs(&ss, v);
            assert_eq!(uvs.len(), 2);
            assert!((uvs[0][0] - uvs[1][0]).abs() > 0.5, "{uvs:?}");
        }
    }

    #[test]
    fn test_no_uv_layer_is_noop() {
        let mut ss = session(primitives::triangle_grid(2, 2, 2.0));
        let events = Arc::new(Mutex::new(0usize));
        let sink = events.clone();
        ss.add_event_listener(move |_| *sink.lock().unwrap() += 1);

        let cache = StrokeCache::new(Vec3::ZERO, 2.0, 1.0);
        assert!(!ss.apply_uv_brush(&cache));
        assert_eq!(*events.lock().unwrap(), 0);
        assert_eq!(ss.log().unwrap().entry_count(), 0);
    }

    #[test]
    fn test_static_session_is_noop() {
        let mesh = with_uvs(primitives::triangle_grid(2, 2, 2.0), Vec3::ZERO);
        let mut ss = SculptSession::new(SculptObject::new(mesh), DyntopoConfig::default());
        let cache = StrokeCache::new(Vec3::ZERO, 2.0, 1.0);
        assert!(!ss.apply_uv_brush(&cache));
        assert!(!uv_brush(&mut ss, &[0], &cache));
    }
}
