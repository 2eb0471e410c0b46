//! Rotational ordering of disk cycles.
//!
//! Euler operators append edges to a vertex's disk cycle in creation order,
//! which says nothing about their rotation around the vertex. Sorting walks
//! the fan of faces around the vertex: for a face corner at the hub, the
//! outgoing edge is followed (counter-clockwise for consistently wound faces)
//! by the corner's incoming edge. Fans that do not form a single chain or
//! ring fall back to sorting by angle around the vertex normal.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use glam::Vec3;

use super::types::{EdgeId, VertId};
use super::BMesh;

/// Order `edges` by chaining `wedges` of `(outgoing, incoming)` edge pairs.
///
/// Returns `None` if the wedges do not link every edge into one chain or one
/// ring, or if an edge has more than one successor or predecessor.
pub fn fan_order<K>(edges: &[K], wedges: &[(K, K)]) -> Option<Vec<K>>
where
    K: Copy + Eq + Hash,
{
    if edges.is_empty() {
        return Some(Vec::new());
    }

    let mut next: HashMap<K, K> = HashMap::with_capacity(wedges.len());
    let mut has_prev: HashSet<K> = HashSet::with_capacity(wedges.len());
    for &(from, to) in wedges {
        if from == to || next.insert(from, to).is_some() || !has_prev.insert(to) {
            return None;
        }
    }

    // An open fan starts at the only edge with no predecessor
    let mut starts = edges.iter().filter(|e| !has_prev.contains(e));
    let start = match (starts.next(), starts.next()) {
        (Some(&s), None) => s,
        (None, _) => edges[0],
        (Some(_), Some(_)) => return None,
    };

    let mut order = Vec::with_capacity(edges.len());
    let mut seen: HashSet<K> = HashSet::with_capacity(edges.len());
    let mut e = start;
    loop {
        if !seen.insert(e) {
            break;
        }
        order.push(e);
        match next.get(&e) {
            Some(&n) if n != start => e = n,
            _ => break,
        }
    }

    (order.len() == edges.len() && edges.iter().all(|e| seen.contains(e))).then_some(order)
}

/// Order `spokes` counter-clockwise around `normal` by the angle of the
/// direction from `hub` to each spoke's far end.
pub fn angular_order<K: Copy>(hub: Vec3, normal: Vec3, spokes: &[(K, Vec3)]) -> Vec<K> {
    let n = normal.try_normalize().unwrap_or(Vec3::Z);
    let a = n.any_orthonormal_vector();
    let b = n.cross(a);

    let mut keyed: Vec<(f32, K)> = spokes
        .iter()
        .map(|&(key, co)| {
            let d = co - hub;
            (d.dot(b).atan2(d.dot(a)), key)
        })
        .collect();
    keyed.sort_by(|x, y| x.0.total_cmp(&y.0));
    keyed.into_iter().map(|(_, key)| key).collect()
}

impl BMesh {
    /// Reorder the disk cycle of `v` rotationally.
    ///
    /// Returns false for isolated vertices, which have nothing to sort.
    pub fn sort_disk_cycle(&mut self, v: VertId) -> bool {
        let edges = self.disk_edges(v);
        if edges.is_empty() {
            return false;
        }
        if edges.len() < 3 {
            // Any order of one or two edges is rotationally consistent
            return true;
        }

        let mut wedges = Vec::new();
        for l in self.vert_loops(v) {
            if let Some(lp) = self.get_loop(l)
                && let Some(prev) = self.get_loop(lp.prev)
            {
                wedges.push((lp.e, prev.e));
            }
        }

        let order = match fan_order(&edges, &wedges) {
            Some(order) => order,
            None => {
                let hub = self.co(v);
                let normal = self.disk_normal(v);
                let spokes: Vec<(EdgeId, Vec3)> = edges
                    .iter()
                    .filter_map(|&e| self.edge_other_vert(e, v).map(|o| (e, self.co(o))))
                    .collect();
                tracing::trace!("sort_disk_cycle: angular fallback for {:?}", v);
                angular_order(hub, normal, &spokes)
            }
        };

        self.relink_disk(v, &order);
        true
    }

    /// Rewrite the disk links of `v` so `next` follows `order`
    fn relink_disk(&mut self, v: VertId, order: &[EdgeId]) {
        let k = order.len();
        for (i, &e) in order.iter().enumerate() {
            let next = order[(i + 1) % k];
            let prev = order[(i + k - 1) % k];
            if let Some(link) = self.edge_mut(e).and_then(|edge| edge.disk_link_mut(v)) {
                link.next = next;
                link.prev = prev;
            }
        }
        if let Some(vert) = self.vert_mut(v) {
            vert.e = order.first().copied();
        }
    }

    /// Vertex normal, or the summed normal of adjacent faces if it is unset
    fn disk_normal(&self, v: VertId) -> Vec3 {
        let no = self.vert(v).map(|vert| vert.no).unwrap_or(Vec3::ZERO);
        if no.length_squared() > 0.0 {
            return no;
        }
        self.vert_faces(v)
            .into_iter()
            .map(|f| self.calc_face_normal(f))
            .sum()
    }
}
