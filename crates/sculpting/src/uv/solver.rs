//! Angle and area preserving UV relaxation.
//!
//! Face corners are merged into solver vertices by mesh vertex and quantized
//! UV, so corners split by a seam stay apart. Each triangle without a seam
//! edge contributes one angle and one area constraint per corner. A step is a
//! short neighbor-averaging pass followed by one projected-gradient
//! correction per constraint, with gradients taken by finite differences.

use std::collections::HashMap;

use glam::{DVec2, DVec3};

use bmesh::{BMesh, ElemFlags, FaceId, LoopId, VertId};
use dyntopo_config::UvSolverConfig;

use super::UvSolverError;

/// Corners of one mesh vertex that share a UV position
#[derive(Debug, Clone)]
pub struct UvVert {
    pub v: VertId,
    pub uv: DVec2,
    /// World position of the mesh vertex
    pub co: DVec3,
    pub loops: Vec<LoopId>,
    /// Solver vertices sharing a triangle edge with this one
    pub neighbors: Vec<usize>,
    /// The mesh vertex also has faces outside the solved region
    pub pinned: bool,
    /// On a seam or UV split
    pub boundary: bool,
}

#[derive(Debug, Clone)]
pub struct UvTri {
    pub face: FaceId,
    pub verts: [usize; 3],
    /// Unsigned UV area when the triangle was added
    pub area2d: f64,
    pub area3d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintKind {
    /// Keep the UV corner angle at the 3D corner angle
    Angle { target: f64 },
    /// Keep the UV area at the triangle's share of the total
    Area { tri: usize },
}

/// A constraint over the corner `verts[1]` with neighbors `verts[0]` and
/// `verts[2]`
#[derive(Debug, Clone, Copy)]
pub struct UvConstraint {
    pub kind: ConstraintKind,
    pub verts: [usize; 3],
    /// Stiffness
    pub k: f64,
}

/// Working set of one UV brush application
#[derive(Debug, Clone)]
pub struct UvSolver {
    config: UvSolverConfig,
    /// Offset of the UV layer in the loop attributes
    cd_uv: usize,
    /// Relaxation strength; negative values only smooth
    pub strength: f64,
    verts: Vec<UvVert>,
    tris: Vec<UvTri>,
    constraints: Vec<UvConstraint>,
    vert_map: HashMap<(VertId, i64, i64), usize>,
    face_map: HashMap<FaceId, usize>,
    totarea2d: f64,
    totarea3d: f64,
}

impl UvSolver {
    pub fn new(cd_uv: usize, config: UvSolverConfig) -> Self {
        Self {
            config,
            cd_uv,
            strength: 1.0,
            verts: Vec::new(),
            tris: Vec::new(),
            constraints: Vec::new(),
            vert_map: HashMap::new(),
            face_map: HashMap::new(),
            totarea2d: 0.0,
            totarea3d: 0.0,
        }
    }

    pub fn config(&self) -> &UvSolverConfig {
        &self.config
    }

    pub fn cd_uv(&self) -> usize {
        self.cd_uv
    }

    pub fn verts(&self) -> &[UvVert] {
        &self.verts
    }

    pub fn verts_mut(&mut self) -> &mut [UvVert] {
        &mut self.verts
    }

    pub fn tris(&self) -> &[UvTri] {
        &self.tris
    }

    pub fn constraints(&self) -> &[UvConstraint] {
        &self.constraints
    }

    pub fn contains_face(&self, f: FaceId) -> bool {
        self.face_map.contains_key(&f)
    }

    fn loop_uv(&self, bm: &BMesh, l: LoopId) -> DVec2 {
        let uv: [f32; 2] = bm.ldata.get(l.index(), self.cd_uv);
        DVec2::new(uv[0] as f64, uv[1] as f64)
    }

    /// Solver vertex of corner `l`, created on first use
    pub fn get_vert(&mut self, bm: &BMesh, l: LoopId) -> Option<usize> {
        let v = bm.get_loop(l)?.v;
        let uv = self.loop_uv(bm, l);
        let snap = self.config.snap_limit.max(f32::EPSILON) as f64;
        let key = (v, (uv.x / snap).floor() as i64, (uv.y / snap).floor() as i64);

        let index = match self.vert_map.get(&key) {
            Some(&index) => index,
            None => {
                let index = self.verts.len();
                self.verts.push(UvVert {
                    v,
                    uv,
                    co: bm.co(v).as_dvec3(),
                    loops: Vec::new(),
                    neighbors: Vec::new(),
                    pinned: false,
                    boundary: false,
                });
                self.vert_map.insert(key, index);
                index
            }
        };

        let sv = &mut self.verts[index];
        if !sv.loops.contains(&l) {
            sv.loops.push(l);
        }
        Some(index)
    }

    /// Add triangle `f` and its constraints. Adding a face twice returns
    /// the existing triangle.
    pub fn ensure_face(&mut self, bm: &BMesh, f: FaceId) -> Result<usize, UvSolverError> {
        if let Some(&tri) = self.face_map.get(&f) {
            return Ok(tri);
        }

        let loops = bm.face_loops(f);
        if loops.len() != 3 {
            return Err(UvSolverError::NonTriangularFace {
                face: f,
                len: loops.len(),
            });
        }

        let mut vs = [0usize; 3];
        let mut seam = false;
        for (slot, &l) in vs.iter_mut().zip(&loops) {
            *slot = self.get_vert(bm, l).ok_or(UvSolverError::DeadFace(f))?;
            let on_seam = bm
                .get_loop(l)
                .and_then(|lp| bm.edge(lp.e))
                .is_some_and(|e| e.flag.contains(ElemFlags::SEAM));
            seam |= on_seam;
        }

        let [a, b, c] = vs.map(|i| self.verts[i].co);
        let area3d = (a - b).cross(b - c).length() * 0.5;
        let [a, b, c] = vs.map(|i| self.verts[i].uv);
        let area2d = signed_area(a, b, c).abs();

        if area2d < self.config.degenerate_area {
            let nudge = self.config.degenerate_nudge;
            self.verts[vs[0]].uv -= DVec2::splat(nudge);
            self.verts[vs[1]].uv.x += nudge;
            self.verts[vs[2]].uv.y += nudge;
        }

        self.totarea2d += area2d;
        self.totarea3d += area3d;

        let tri = self.tris.len();
        self.tris.push(UvTri {
            face: f,
            verts: vs,
            area2d,
            area3d,
        });
        self.face_map.insert(f, tri);

        if !seam {
            for i in 0..3 {
                let verts = [vs[(i + 2) % 3], vs[i], vs[(i + 1) % 3]];
                let corner = self.verts[verts[1]].co;
                let t1 = (self.verts[verts[0]].co - corner).normalize_or_zero();
                let t2 = (self.verts[verts[2]].co - corner).normalize_or_zero();
                let target = t1.dot(t2).clamp(-1.0, 1.0).acos();

                self.constraints.push(UvConstraint {
                    kind: ConstraintKind::Angle { target },
                    verts,
                    k: self.config.angle_stiffness,
                });
                self.constraints.push(UvConstraint {
                    kind: ConstraintKind::Area { tri },
                    verts,
                    k: self.config.area_stiffness,
                });
            }
        }

        for i in 0..3 {
            let (v1, v2) = (vs[i], vs[(i + 1) % 3]);
            if v1 == v2 || self.verts[v1].neighbors.contains(&v2) {
                continue;
            }
            self.verts[v1].neighbors.push(v2);
            self.verts[v2].neighbors.push(v1);
        }

        Ok(tri)
    }

    /// Pin every solver vertex whose mesh vertex has a face outside the
    /// solved region.
    pub fn solve_begin(&mut self, bm: &BMesh) {
        let face_map = &self.face_map;
        for sv in &mut self.verts {
            sv.pinned = bm.vert_faces(sv.v).iter().any(|f| !face_map.contains_key(f));
        }
        tracing::trace!(
            "UvSolver: {} verts ({} pinned), {} tris, {} constraints",
            self.verts.len(),
            self.verts.iter().filter(|sv| sv.pinned).count(),
            self.tris.len(),
            self.constraints.len()
        );
    }

    fn vert_weight(&self, i: usize) -> f64 {
        let sv = &self.verts[i];
        if sv.pinned || sv.boundary {
            self.config.pinned_weight
        } else {
            1.0
        }
    }

    /// Residual of `con` at the current UVs
    fn eval_constraint(&self, con: &UvConstraint) -> f64 {
        let [v0, v1, v2] = con.verts.map(|i| self.verts[i].uv);
        match con.kind {
            ConstraintKind::Angle { target } => {
                let t1 = normalize_or_zero(v0 - v1);
                let t2 = normalize_or_zero(v2 - v1);
                let mut th = t1.dot(t2).clamp(-1.0, 1.0).acos();
                if t1.perp_dot(t2) >= 0.0 {
                    th = std::f64::consts::PI - th;
                }
                th - target
            }
            ConstraintKind::Area { tri } => {
                let area3d = self.tris.get(tri).map_or(0.0, |t| t.area3d);
                if area3d == 0.0 || self.totarea3d == 0.0 {
                    return 0.0;
                }
                let goal = area3d * self.totarea2d / self.totarea3d;
                (signed_area(v0, v1, v2) - goal) * self.config.area_residual_scale
            }
        }
    }

    /// Move every free vertex toward the average of its neighbors
    pub fn simple_relax(&mut self, bm: &mut BMesh, strength: f64) {
        for i in 0..self.verts.len() {
            let sv = &self.verts[i];
            if sv.neighbors.len() < 2 || sv.pinned || sv.boundary {
                continue;
            }
            let avg = sv.neighbors.iter().map(|&n| self.verts[n].uv).sum::<DVec2>()
                / sv.neighbors.len() as f64;
            let sv = &mut self.verts[i];
            sv.uv += (avg - sv.uv) * strength;
        }
        self.write_back(bm);
    }

    /// One relaxation step. Returns the mean absolute residual of the
    /// constraints before the step.
    pub fn solve_step(&mut self, bm: &mut BMesh) -> f64 {
        if self.strength < 0.0 {
            self.simple_relax(bm, self.strength.abs());
            return 0.0;
        }
        self.simple_relax(bm, self.strength * self.config.relax_factor);

        let eval_limit = self.config.eval_limit;
        let df = self.config.finite_difference_step;
        let mut error = 0.0;
        let mut totcon = 0usize;

        for ci in 0..self.constraints.len() {
            let con = self.constraints[ci];
            let mut r1 = self.eval_constraint(&con);
            totcon += 1;
            if r1.abs() < eval_limit {
                continue;
            }
            error += r1.abs();

            let mut gs = [DVec2::ZERO; 3];
            let mut totg = 0.0;
            let mut totw = 0.0;
            for (i, &sv) in con.verts.iter().enumerate() {
                for j in 0..2 {
                    let orig = self.verts[sv].uv[j];
                    self.verts[sv].uv[j] += df;
                    let r2 = self.eval_constraint(&con);
                    self.verts[sv].uv[j] = orig;

                    let g = (r2 - r1) / df;
                    gs[i][j] = g;
                    totg += g * g;
                    totw += 1.0 / self.vert_weight(sv);
                }
            }

            if totg < eval_limit {
                continue;
            }

            r1 *= -self.strength * self.config.correction_factor * con.k / totg;
            for (i, &sv) in con.verts.iter().enumerate() {
                let w = 1.0 / (self.vert_weight(sv) * totw);
                self.verts[sv].uv += gs[i] * (r1 * w);
            }
        }

        self.write_back(bm);

        let mean = if totcon > 0 { error / totcon as f64 } else { 0.0 };
        tracing::trace!("UvSolver::solve_step: mean residual {:.6}", mean);
        mean
    }

    /// Summed deviation of every triangle's signed UV area from its fair
    /// share of the total.
    pub fn area_error(&self) -> f64 {
        if self.totarea3d == 0.0 {
            return 0.0;
        }
        self.tris
            .iter()
            .map(|t| {
                let [a, b, c] = t.verts.map(|i| self.verts[i].uv);
                let goal = t.area3d * self.totarea2d / self.totarea3d;
                (signed_area(a, b, c) - goal).abs()
            })
            .sum()
    }

    /// Store every solver UV in all of its corners
    pub fn write_back(&self, bm: &mut BMesh) {
        for sv in &self.verts {
            let uv = [sv.uv.x as f32, sv.uv.y as f32];
            for &l in &sv.loops {
                if bm.get_loop(l).is_some() {
                    bm.ldata.set(l.index(), self.cd_uv, uv);
                }
            }
        }
    }
}

/// Signed area of the UV triangle, positive for counter-clockwise winding
fn signed_area(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    0.5 * ((a.x - b.x) * (b.y - c.y) + (a.y - b.y) * (c.x - b.x))
}

fn normalize_or_zero(v: DVec2) -> DVec2 {
    if v.length_squared() < 1e-7 {
        DVec2::ZERO
    } else {
        v.normalize()
    }
}
