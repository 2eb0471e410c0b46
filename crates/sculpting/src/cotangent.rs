//! Cotangent edge weights and mixed Voronoi areas around a vertex.
//!
//! For edge `i` of the one-ring, with neighbours `v1` (previous edge), `v2`
//! (this edge) and `v3` (next edge):
//!
//! ```text
//! w_i = (cot ∠(v1) + cot ∠(v3)) / (2 · A)
//! ```
//!
//! where the angles are opposite the edge `v–v2` and `A` is the sum of the
//! mixed Voronoi areas of the wedges `(v, v1, v2)`. The one-ring must be in
//! rotational order, see [`crate::disk_cycle`].

use glam::Vec3;

use bmesh::mesh_mapping::edge_other_vert;
use bmesh::{BMesh, Mesh, VertId};

use crate::disk_cycle::check_disk_sort;
use crate::layers::NodeLayers;
use crate::types::VertexRef;

/// Below this the cross product of two triangle edges counts as zero
const COT_EPSILON: f32 = f32::EPSILON;

/// Total areas at or below this leave the weights undefined
const AREA_EPSILON: f32 = 1e-12;

/// Weights of one vertex, one entry per incident edge in rotational order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CotangentWeights {
    /// Normalized per-edge weights
    pub weights: Vec<f32>,
    /// Cotangent of the angle at the previous neighbour
    pub cot1: Vec<f32>,
    /// Cotangent of the angle at the next neighbour
    pub cot2: Vec<f32>,
    /// Mixed Voronoi area of the wedge before each edge
    pub areas: Vec<f32>,
    pub total_area: f32,
    /// Sum of the raw cotangent sums
    pub weight_sum: f32,
    /// Total area was zero; `weights` are all zero
    pub degenerate: bool,
}

impl CotangentWeights {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Weights rescaled to sum to one, or `None` when that is undefined
    pub fn partition_of_unity(&self) -> Option<Vec<f32>> {
        let sum: f32 = self.weights.iter().sum();
        if self.degenerate || sum.abs() <= AREA_EPSILON {
            return None;
        }
        Some(self.weights.iter().map(|w| w / sum).collect())
    }

    /// Uniform unit weights, used where cotangents are not available
    pub fn uniform(valence: usize) -> Self {
        Self {
            weights: vec![1.0; valence],
            cot1: vec![0.0; valence],
            cot2: vec![0.0; valence],
            areas: vec![0.0; valence],
            ..Default::default()
        }
    }
}

/// Cotangent of the angle at `v1` in the triangle `(v1, v2, v3)`.
///
/// Zero for degenerate triangles.
pub fn cotangent_tri_weight(v1: Vec3, v2: Vec3, v3: Vec3) -> f32 {
    let a = v2 - v1;
    let b = v3 - v1;
    let c_len = a.cross(b).length();
    if c_len > COT_EPSILON {
        a.dot(b) / c_len
    } else {
        0.0
    }
}

/// Mixed Voronoi area of the triangle `(p, q, r)` as seen from `p`
pub fn tri_voronoi_area(p: Vec3, q: Vec3, r: Vec3) -> f32 {
    let area = (q - p).cross(r - p).length() * 0.5;
    let right = std::f32::consts::FRAC_PI_2;

    if (q - p).angle_between(r - p) > right {
        return area / 2.0;
    }
    if (p - q).angle_between(r - q) > right || (p - r).angle_between(q - r) > right {
        return area / 4.0;
    }

    let pr = p - r;
    let pq = p - q;
    (1.0 / 8.0)
        * (pr.length_squared() * cotangent_tri_weight(q, p, r)
            + pq.length_squared() * cotangent_tri_weight(r, q, p))
}

/// Weights of `hub` given the far ends of its incident edges in rotational
/// order.
pub fn accumulate(hub: Vec3, ring: &[Vec3]) -> CotangentWeights {
    let k = ring.len();
    let mut out = CotangentWeights {
        weights: Vec::with_capacity(k),
        cot1: Vec::with_capacity(k),
        cot2: Vec::with_capacity(k),
        areas: Vec::with_capacity(k),
        ..Default::default()
    };
    if k == 0 {
        out.degenerate = true;
        return out;
    }

    for i in 0..k {
        let v1 = ring[(i + k - 1) % k];
        let v2 = ring[i];
        let v3 = ring[(i + 1) % k];

        let cot1 = cotangent_tri_weight(v1, hub, v2);
        let cot2 = cotangent_tri_weight(v3, v2, hub);
        let area = tri_voronoi_area(hub, v1, v2);

        out.weights.push(cot1 + cot2);
        out.cot1.push(cot1);
        out.cot2.push(cot2);
        out.areas.push(area);
        out.weight_sum += cot1 + cot2;
        out.total_area += area;
    }

    if out.total_area <= AREA_EPSILON || !out.total_area.is_finite() {
        tracing::trace!("cotangent weights: degenerate one-ring, area {}", out.total_area);
        out.degenerate = true;
        out.weights.iter_mut().for_each(|w| *w = 0.0);
        return out;
    }

    let mul = 1.0 / (out.total_area * 2.0);
    out.weights.iter_mut().for_each(|w| *w *= mul);
    out
}

/// Weight computation over one of the three partition representations
pub enum WeightEngine<'a> {
    /// Walks disk cycles, sorting them first when flagged dirty
    BMesh {
        bm: &'a mut BMesh,
        layers: &'a NodeLayers,
    },
    /// Walks a vertex to edge map built in rotational order
    Faces {
        mesh: &'a Mesh,
        vemap: &'a [Vec<u32>],
    },
    /// Multiresolution grids: unit weights only
    Grids { mesh: &'a Mesh },
}

impl WeightEngine<'_> {
    pub fn get_cotangents(&mut self, vertex: VertexRef) -> CotangentWeights {
        match self {
            WeightEngine::BMesh { bm, layers } => {
                let v = VertId(vertex.0);
                check_disk_sort(bm, layers, v);
                let hub = bm.co(v);
                let ring: Vec<Vec3> = bm
                    .disk_edges(v)
                    .into_iter()
                    .filter_map(|e| bm.edge_other_vert(e, v))
                    .map(|o| bm.co(o))
                    .collect();
                accumulate(hub, &ring)
            }
            WeightEngine::Faces { mesh, vemap } => {
                let index = vertex.0 as usize;
                let (Some(&hub), Some(edges)) = (mesh.positions.get(index), vemap.get(index)) else {
                    return CotangentWeights::default();
                };
                let ring: Vec<Vec3> = edges
                    .iter()
                    .map(|&e| mesh.positions[edge_other_vert(mesh, e, vertex.0) as usize])
                    .collect();
                accumulate(hub, &ring)
            }
            WeightEngine::Grids { mesh } => {
                let valence = mesh
                    .edges
                    .iter()
                    .filter(|edge| edge.contains(&vertex.0))
                    .count();
                CotangentWeights::uniform(valence)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmesh::mesh_mapping::vert_edge_map;
    use bmesh::primitives;

    /// Planar star around the origin with uneven spokes
    fn irregular_fan() -> Mesh {
        let spokes = [
            (0.0f32, 1.0f32),
            (0.9, 1.4),
            (2.0, 0.8),
            (2.9, 1.1),
            (3.9, 1.3),
            (5.1, 0.9),
        ];
        let mut positions = vec![Vec3::ZERO];
        positions.extend(spokes.iter().map(|&(a, r)| Vec3::new(a.cos(), a.sin(), 0.0) * r));
        let n = spokes.len() as u32;
        let faces: Vec<Vec<u32>> = (0..n).map(|i| vec![0, 1 + i, 1 + (i + 1) % n]).collect();
        Mesh::from_polygons(positions, &faces).unwrap()
    }

    #[test]
    fn test_cotangent_tri_weight() {
        // Right angle
        assert!(cotangent_tri_weight(Vec3::ZERO, Vec3::X, Vec3::Y).abs() < 1e-6);
        // 45 degrees
        let c = cotangent_tri_weight(Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0));
        assert!((c - 1.0).abs() < 1e-6);
        // Collinear
        assert_eq!(cotangent_tri_weight(Vec3::ZERO, Vec3::X, Vec3::X * 2.0), 0.0);
    }

    #[test]
    fn test_voronoi_area_cases() {
        // Equilateral: Voronoi area is a third of the triangle
        let p = Vec3::ZERO;
        let q = Vec3::X;
        let r = Vec3::new(0.5, 3f32.sqrt() / 2.0, 0.0);
        let area = 3f32.sqrt() / 4.0;
        assert!((tri_voronoi_area(p, q, r) - area / 3.0).abs() < 1e-5);

        // Obtuse at p
        let q = Vec3::new(1.0, 0.1, 0.0);
        let r = Vec3::new(-1.0, 0.1, 0.0);
        let area = (q - p).cross(r - p).length() * 0.5;
        assert!((tri_voronoi_area(p, q, r) - area / 2.0).abs() < 1e-6);

        // Obtuse at q
        assert!((tri_voronoi_area(q, p, r) - area / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_weights_normalize_to_one() {
        let mesh = irregular_fan();
        let vemap = vert_edge_map(&mesh, true);
        let mut engine = WeightEngine::Faces { mesh: &mesh, vemap: &vemap };
        let w = engine.get_cotangents(VertexRef(0));

        assert_eq!(w.len(), 6);
        assert!(!w.is_degenerate());
        assert!(w.weights.iter().all(|&x| x > 0.0));
        let unit = w.partition_of_unity().unwrap();
        assert!((unit.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        let expected = 1.0 / (2.0 * w.total_area);
        for (weight, (c1, c2)) in w.weights.iter().zip(w.cot1.iter().zip(&w.cot2)) {
            assert!((weight - (c1 + c2) * expected).abs() < 1e-5);
        }
        assert!((w.weight_sum - w.cot1.iter().chain(&w.cot2).sum::<f32>()).abs() < 1e-4);
    }

    #[test]
    fn test_planar_laplacian_vanishes() {
        let mesh = irregular_fan();
        let vemap = vert_edge_map(&mesh, true);
        let mut engine = WeightEngine::Faces { mesh: &mesh, vemap: &vemap };
        let w = engine.get_cotangents(VertexRef(0));

        let lap: Vec3 = vemap[0]
            .iter()
            .zip(&w.weights)
            .map(|(&e, &weight)| mesh.positions[edge_other_vert(&mesh, e, 0) as usize] * weight)
            .sum();
        assert!(lap.length() < 1e-4, "laplacian {lap:?}");
    }

    #[test]
    fn test_degenerate_ring_has_no_nan() {
        let w = accumulate(Vec3::ZERO, &[Vec3::ZERO, Vec3::ZERO, Vec3::ZERO]);
        assert!(w.is_degenerate());
        assert!(w.weights.iter().all(|x| *x == 0.0));
        assert!(w.partition_of_unity().is_none());

        let empty = accumulate(Vec3::ZERO, &[]);
        assert!(empty.is_empty());
        assert!(empty.is_degenerate());
    }

    #[test]
    fn test_bmesh_and_faces_agree() {
        let mesh = irregular_fan();
        let vemap = vert_edge_map(&mesh, true);
        let faces = WeightEngine::Faces { mesh: &mesh, vemap: &vemap }.get_cotangents(VertexRef(0));

        let mut bm = BMesh::from_mesh(&mesh, &Default::default()).unwrap();
        let layers = NodeLayers::add(&mut bm);
        crate::disk_cycle::flag_all_disk_sort(&mut bm, &layers);
        let dynamic = WeightEngine::BMesh { bm: &mut bm, layers: &layers }
            .get_cotangents(VertexRef(0));

        assert!((faces.total_area - dynamic.total_area).abs() < 1e-5);
        let mut a = faces.weights.clone();
        let mut b = dynamic.weights.clone();
        a.sort_by(f32::total_cmp);
        b.sort_by(f32::total_cmp);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_grids_use_unit_weights() {
        let mesh = primitives::grid(2, 2, 1.0);
        let w = WeightEngine::Grids { mesh: &mesh }.get_cotangents(VertexRef(4));
        assert_eq!(w.weights, vec![1.0; 4]);
    }
}
