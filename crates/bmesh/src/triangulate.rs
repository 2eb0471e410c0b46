//! Face triangulation.
//!
//! Quads are split along their shorter diagonal, larger polygons are ear
//! clipped in the plane of the face. Face attributes, flags and per-corner
//! attributes carry over to the new triangles.

use glam::{Vec2, Vec3};

use super::types::{ElemFlags, FaceId, VertId};
use super::BMesh;

impl BMesh {
    /// Triangulate every face with more than three sides.
    ///
    /// Returns the number of faces that were split.
    pub fn triangulate_all(&mut self) -> usize {
        if self.totloop == self.totface * 3 {
            return 0;
        }

        let ngons: Vec<FaceId> = self
            .faces()
            .filter(|&f| self.face(f).is_some_and(|face| face.len > 3))
            .collect();
        for &f in &ngons {
            self.face_triangulate(f);
        }
        tracing::debug!("triangulate_all: split {} faces", ngons.len());
        ngons.len()
    }

    /// Replace `f` with triangles, returning the new faces.
    ///
    /// Triangles are returned unchanged.
    pub fn face_triangulate(&mut self, f: FaceId) -> Vec<FaceId> {
        let loops = self.face_loops(f);
        if loops.len() <= 3 {
            return vec![f];
        }
        let Some((face_flag, face_no)) = self.face(f).map(|face| (face.flag, face.no)) else {
            return Vec::new();
        };

        let verts: Vec<VertId> = self.face_verts(f);
        let cos: Vec<Vec3> = verts.iter().map(|&v| self.co(v)).collect();
        let corner_rows: Vec<Vec<u8>> = loops.iter().map(|l| self.ldata.row(l.index()).to_vec()).collect();
        let face_row = self.pdata.row(f.index()).to_vec();

        let tris = if verts.len() == 4 {
            quad_split(&cos)
        } else {
            let normal = if face_no.length_squared() > 0.0 { face_no } else { self.calc_face_normal(f) };
            ear_clip(&cos, normal)
        };

        self.kill_face(f);

        let flag = face_flag - ElemFlags::TAG;
        let mut created = Vec::with_capacity(tris.len());
        for tri in tris {
            let tri_verts = [verts[tri[0]], verts[tri[1]], verts[tri[2]]];
            let Ok(new_f) = self.create_face(&tri_verts, None) else {
                tracing::warn!("face_triangulate: skipped degenerate triangle {:?}", tri_verts);
                continue;
            };
            if let Some(face) = self.face_mut(new_f) {
                face.flag = flag;
            }
            self.pdata.set_row(new_f.index(), &face_row);
            for (corner, l) in tri.iter().zip(self.face_loops(new_f)) {
                self.ldata.set_row(l.index(), &corner_rows[*corner]);
            }

            // Selection spreads to the new diagonal edges
            if flag.contains(ElemFlags::SELECT) {
                for l in self.face_loops(new_f) {
                    if let Some(e) = self.get_loop(l).map(|lp| lp.e)
                        && let Some(edge) = self.edge_mut(e)
                    {
                        edge.flag |= ElemFlags::SELECT;
                    }
                }
            }
            created.push(new_f);
        }
        created
    }
}

/// Split a quad along its shorter diagonal
fn quad_split(cos: &[Vec3]) -> Vec<[usize; 3]> {
    let d02 = cos[0].distance_squared(cos[2]);
    let d13 = cos[1].distance_squared(cos[3]);
    if d02 <= d13 {
        vec![[0, 1, 2], [0, 2, 3]]
    } else {
        vec![[1, 2, 3], [1, 3, 0]]
    }
}

/// Ear clipping of a simple polygon projected onto the plane of `normal`
fn ear_clip(cos: &[Vec3], normal: Vec3) -> Vec<[usize; 3]> {
    let n = normal.try_normalize().unwrap_or(Vec3::Z);
    let a = n.any_orthonormal_vector();
    let b = n.cross(a);
    let pts: Vec<Vec2> = cos.iter().map(|p| Vec2::new(p.dot(a), p.dot(b))).collect();

    let mut remaining: Vec<usize> = (0..pts.len()).collect();
    let mut tris = Vec::with_capacity(pts.len() - 2);

    while remaining.len() > 3 {
        let k = remaining.len();
        let ear = (0..k).find(|&i| {
            let (p, c, nx) = (remaining[(i + k - 1) % k], remaining[i], remaining[(i + 1) % k]);
            let convex = (pts[c] - pts[p]).perp_dot(pts[nx] - pts[c]) > 0.0;
            convex
                && remaining
                    .iter()
                    .filter(|&&q| q != p && q != c && q != nx)
                    .all(|&q| !point_in_triangle(pts[q], pts[p], pts[c], pts[nx]))
        });

        // Degenerate or self-intersecting input, clip the first corner
        let i = ear.unwrap_or(0);
        tris.push([remaining[(i + k - 1) % k], remaining[i], remaining[(i + 1) % k]]);
        remaining.remove(i);
    }
    tris.push([remaining[0], remaining[1], remaining[2]]);
    tris
}

fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let d1 = (b - a).perp_dot(p - a);
    let d2 = (c - b).perp_dot(p - b);
    let d3 = (a - c).perp_dot(p - c);
    d1 >= 0.0 && d2 >= 0.0 && d3 >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customdata::{LayerFlags, LayerType};
    use crate::primitives;

    #[test]
    fn test_quad_uses_shorter_diagonal() {
        let cos = [
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.5, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
        ];
        assert_eq!(quad_split(&cos).len(), 2);

        let kite = [
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(-3.0, 0.0, 0.0),
        ];
        // 0-2 is the short diagonal
        assert_eq!(quad_split(&kite), vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_concave_polygon_ear_clip() {
        // L shape, concave at index 3
        let cos = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        let tris = ear_clip(&cos, Vec3::Z);
        assert_eq!(tris.len(), 4);
        let area: f32 = tris
            .iter()
            .map(|t| (cos[t[1]] - cos[t[0]]).cross(cos[t[2]] - cos[t[0]]).z * 0.5)
            .sum();
        assert!((area - 3.0).abs() < 1e-5);
        assert!(tris.iter().all(|t| {
            (cos[t[1]] - cos[t[0]]).cross(cos[t[2]] - cos[t[0]]).z > 0.0
        }));
    }

    #[test]
    fn test_triangulate_all_carries_attributes() {
        let mut mesh = primitives::grid(2, 1, 2.0);
        mesh.ldata.add_layer(LayerType::LoopUv, "UVMap", LayerFlags::empty());
        mesh.pdata.add_layer(LayerType::FaceSet, "", LayerFlags::empty());
        for corner in 0..mesh.loop_count() {
            let v = mesh.corner_verts[corner] as usize;
            let p = mesh.positions[v];
            mesh.ldata.set(corner, 0, [p.x, p.y]);
        }
        mesh.pdata.set(1, 0, 7i32);
        mesh.polys[1].flag |= ElemFlags::SELECT;

        let mut bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();
        assert_eq!(bm.triangulate_all(), 2);
        assert_eq!(bm.face_count(), 4);
        assert_eq!(bm.loop_count(), 12);
        assert!(bm.validate().is_ok());
        // Already triangulated
        assert_eq!(bm.triangulate_all(), 0);

        let uv = bm.ldata.offset(LayerType::LoopUv).unwrap();
        let fset = bm.pdata.offset(LayerType::FaceSet).unwrap();
        let mut selected = 0;
        for f in bm.faces().collect::<Vec<_>>() {
            for l in bm.face_loops(f) {
                let co = bm.co(bm.get_loop(l).unwrap().v);
                let stored: [f32; 2] = bm.ldata.get(l.index(), uv);
                assert_eq!(stored, [co.x, co.y]);
            }
            if bm.face(f).unwrap().flag.contains(ElemFlags::SELECT) {
                selected += 1;
                assert_eq!(bm.pdata.get::<i32>(f.index(), fset), 7);
            }
        }
        assert_eq!(selected, 2);
    }
}
