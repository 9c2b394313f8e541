use assert2::debug_assert;

use super::{Bvh, BvhTriangle, HitResult, InnerNode, NodeLink, TriangleIdx, TriangleRange};
use crate::geometry::{FloatType, Ray, RayIntersectionExt as _};

/// Reusable traversal stack for `Bvh::intersect_with_stack`.
/// Keeping one per worker thread avoids allocating for every ray.
#[derive(Clone, Debug, Default)]
#[repr(transparent)]
pub struct StackCache {
    stack: Vec<(NodeLink, FloatType)>,
}

/// Work done by a single query.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub inner_nodes_visited: usize,
    pub leaves_visited: usize,
    pub boxes_tested: usize,
    pub triangles_tested: usize,
}

impl Bvh {
    /// Finds the closest triangle hit by the ray.
    /// `triangles` must be the slice that was passed to (and reordered by) `Bvh::build`.
    pub fn intersect<P>(&self, ray: &Ray, triangles: &[BvhTriangle<P>]) -> HitResult {
        self.intersect_with_stats(ray, triangles).0
    }

    /// Same as `intersect`, also counting the work done.
    pub fn intersect_with_stats<P>(
        &self,
        ray: &Ray,
        triangles: &[BvhTriangle<P>],
    ) -> (HitResult, TraversalStats) {
        debug_assert!(triangles.len() == self.triangle_count);

        let mut stats = TraversalStats {
            boxes_tested: 1,
            ..TraversalStats::default()
        };

        let hit = if self.bounding_box.padded_for(ray).hit_distance(ray).is_some() {
            self.intersect_recursive(self.root, ray, triangles, &mut stats)
        } else {
            HitResult::miss()
        };

        (hit, stats)
    }

    /// Visits every subtree whose box is hit, the closer of the two child results wins.
    /// Boxes are padded, so that hits on shared edges and vertices are never pruned.
    fn intersect_recursive<P>(
        &self,
        link: NodeLink,
        ray: &Ray,
        triangles: &[BvhTriangle<P>],
        stats: &mut TraversalStats,
    ) -> HitResult {
        match link {
            NodeLink::Null => HitResult::miss(),
            NodeLink::Leaf { triangles: range } => {
                stats.leaves_visited += 1;
                let mut best = HitResult::miss();
                intersect_triangles(range, ray, triangles, &mut best, stats);
                best
            }
            NodeLink::Inner { index } => {
                stats.inner_nodes_visited += 1;
                let node = &self.inner_nodes[index];

                let [r1, r2] = [0, 1].map(|i| {
                    stats.boxes_tested += 1;
                    if node.child_bounds[i].padded_for(ray).hit_distance(ray).is_some() {
                        self.intersect_recursive(node.child_links[i], ray, triangles, stats)
                    } else {
                        HitResult::miss()
                    }
                });

                if r1.distance < r2.distance { r1 } else { r2 }
            }
        }
    }

    /// Finds the closest hit using an explicit stack, descending into the nearer child first
    /// and skipping subtrees that start beyond the closest hit found so far.
    /// Returns a hit at the same distance as `intersect`.
    pub fn intersect_with_stack<P>(
        &self,
        ray: &Ray,
        triangles: &[BvhTriangle<P>],
        stack: &mut StackCache,
    ) -> HitResult {
        debug_assert!(triangles.len() == self.triangle_count);
        debug_assert!(stack.stack.is_empty());

        let mut best = HitResult::miss();
        let mut stats = TraversalStats::default();

        let Some((root_t1, _)) = self.bounding_box.padded_for(ray).hit_interval(ray) else {
            return best;
        };
        stack.stack.push((self.root, root_t1));

        while let Some((link, node_t1)) = stack.stack.pop() {
            if node_t1 > best.distance {
                // The node's entry is further away than the best hit found so far,
                // nothing inside it can improve the result.
                continue;
            }

            match link {
                NodeLink::Null => continue,
                NodeLink::Inner { index } => {
                    let [near, far] = self.inner_nodes[index].intersect_ordered(ray);
                    // Far child goes on the stack first, so that the near one is popped first
                    stack.stack.extend(far);
                    stack.stack.extend(near);
                }
                NodeLink::Leaf { triangles: range } => {
                    intersect_triangles(range, ray, triangles, &mut best, &mut stats);
                }
            }
        }

        best
    }
}

impl InnerNode {
    /// Intersects both child boxes with the ray.
    /// Returns (link, entry distance) of the hit children, nearer child first.
    fn intersect_ordered(&self, ray: &Ray) -> [Option<(NodeLink, FloatType)>; 2] {
        let [a, b] = [0, 1].map(|i| {
            self.child_bounds[i]
                .padded_for(ray)
                .hit_interval(ray)
                .map(|(t1, _t2)| (self.child_links[i], t1))
        });

        match (a, b) {
            (Some(a), Some(b)) if b.1 < a.1 => [Some(b), Some(a)],
            (None, Some(b)) => [Some(b), None],
            _ => [a, b],
        }
    }
}

/// Tests all triangles in the range, updating `best` with any strictly closer hit.
fn intersect_triangles<P>(
    range: TriangleRange,
    ray: &Ray,
    triangles: &[BvhTriangle<P>],
    best: &mut HitResult,
    stats: &mut TraversalStats,
) {
    for i in range.iter() {
        stats.triangles_tested += 1;
        if let Some((distance, normal)) = triangles[i.index()].geometry().intersect(ray) {
            if distance < best.distance {
                *best = HitResult::new(ray, distance, normal, i);
            }
        }
    }
}

/// Closest hit by testing every triangle in the slice, without any acceleration structure.
pub fn intersect_brute_force<P>(ray: &Ray, triangles: &[BvhTriangle<P>]) -> HitResult {
    let mut best = HitResult::miss();
    for (i, triangle) in triangles.iter().enumerate() {
        if let Some((distance, normal)) = triangle.geometry().intersect(ray) {
            if distance < best.distance {
                best = HitResult::new(ray, distance, normal, TriangleIdx::from_usize(i));
            }
        }
    }
    best
}
