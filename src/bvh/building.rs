use std::{num::NonZeroUsize, ops::Range};

use bon::bon;
use index_vec::IndexVec;
use ordered_float::OrderedFloat;

use crate::geometry::{Axis, FloatType, WorldBox};

use super::{Bvh, BvhTriangle, InnerNode, NodeLink, TriangleIdx, TriangleRange};

pub const DEFAULT_LEAF_SIZE: NonZeroUsize = NonZeroUsize::new(8).unwrap();
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// How inner nodes divide their triangles between the two children.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Split at the median centroid along the longest axis of the node.
    Median,
    /// Split minimizing the surface area heuristic over all axes and split positions.
    #[default]
    Sah,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildSettings {
    /// Nodes with at most this many triangles become leaves.
    pub leaf_size: NonZeroUsize,
    pub split_policy: SplitPolicy,
    /// Nodes at this depth become leaves regardless of their size.
    /// Protects against stack exhaustion on inputs that can't be split well
    /// (eg. many triangles with the same centroid).
    pub max_depth: usize,
}

#[bon]
impl BuildSettings {
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_LEAF_SIZE)] leaf_size: NonZeroUsize,
        #[builder(default)] split_policy: SplitPolicy,
        #[builder(default = DEFAULT_MAX_DEPTH)] max_depth: usize,
    ) -> Self {
        BuildSettings {
            leaf_size,
            split_policy,
            max_depth,
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings::builder().build()
    }
}

impl Bvh {
    /// Builds the tree over the triangles, reordering the slice in place.
    /// Leaf ranges and hit results of the returned tree index into the reordered slice.
    pub fn build<P>(triangles: &mut [BvhTriangle<P>], settings: &BuildSettings) -> Bvh {
        let bounding_box = range_bounds(triangles);
        let triangle_count = triangles.len();

        let mut bvh = Bvh {
            bounding_box,
            root: NodeLink::Null,
            inner_nodes: IndexVec::new(),
            triangle_count,
        };

        bvh.root = bvh.build_recursive(triangles, 0..triangle_count, &bounding_box, 0, settings);

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Built {:?} BVH: {}",
                settings.split_policy,
                bvh.statistics()
            );
        }

        bvh
    }

    /// Builds the subtree over `triangles[range]`.
    /// `enclosing_box` must be the tight bounding box of the range.
    fn build_recursive<P>(
        &mut self,
        triangles: &mut [BvhTriangle<P>],
        range: Range<usize>,
        enclosing_box: &WorldBox,
        depth: usize,
        settings: &BuildSettings,
    ) -> NodeLink {
        if range.is_empty() {
            return NodeLink::Null;
        }

        let count = range.len();
        if count <= settings.leaf_size.get() || depth >= settings.max_depth {
            if count > settings.leaf_size.get() {
                log::trace!("Depth limit reached, forcing a leaf with {count} triangles");
            }
            return NodeLink::Leaf {
                triangles: TriangleRange::new(TriangleIdx::from_usize(range.start), count),
            };
        }

        let node_triangles = &mut triangles[range.clone()];
        let left_count = match settings.split_policy {
            SplitPolicy::Median => median_split(node_triangles, enclosing_box),
            SplitPolicy::Sah => sah_split(node_triangles),
        };
        debug_assert!(left_count >= 1 && left_count < count);

        let split_index = range.start + left_count;
        let child_ranges = [range.start..split_index, split_index..range.end];
        let child_bounds = child_ranges
            .clone()
            .map(|child_range| range_bounds(&triangles[child_range]));

        // Create placeholder node that will be overwriten later
        let node_index = self.inner_nodes.push(InnerNode::default());

        let [left_range, right_range] = child_ranges;
        let child_links = [
            self.build_recursive(triangles, left_range, &child_bounds[0], depth + 1, settings),
            self.build_recursive(triangles, right_range, &child_bounds[1], depth + 1, settings),
        ];

        // Replace the placeholder with an actual inner node
        self.inner_nodes[node_index] = InnerNode {
            child_bounds,
            child_links,
        };

        NodeLink::Inner { index: node_index }
    }
}

/// Tight bounding box of all triangle vertices, empty box for no triangles.
fn range_bounds<P>(triangles: &[BvhTriangle<P>]) -> WorldBox {
    WorldBox::from_points(triangles.iter().flat_map(|t| t.geometry().iter()))
        .unwrap_or_else(WorldBox::empty)
}

fn sort_by_centroid<P>(triangles: &mut [BvhTriangle<P>], axis: Axis) {
    triangles.sort_by_key(|t| OrderedFloat(t.centroid()[axis.index()]));
}

/// Number of triangles that go to the left child when splitting the closed index range
/// [lo, hi] at (lo + hi) / 2. The left half gets the extra triangle on odd counts.
fn median_split_count(count: usize) -> usize {
    (count - 1) / 2 + 1
}

/// Sorts the triangles along the longest axis of the enclosing box and
/// returns number of triangles going to the left child.
fn median_split<P>(triangles: &mut [BvhTriangle<P>], enclosing_box: &WorldBox) -> usize {
    let axis = enclosing_box.longest_axis();
    sort_by_centroid(triangles, axis);
    log::trace!("Median split of {} triangles along {axis:?}", triangles.len());
    median_split_count(triangles.len())
}

/// Sorts the triangles along the best SAH axis and returns number of triangles
/// going to the left child.
fn sah_split<P>(triangles: &mut [BvhTriangle<P>]) -> usize {
    let split = find_sah_split(triangles);
    sort_by_centroid(triangles, split.axis);
    log::trace!(
        "SAH split of {} triangles along {:?} at {}, cost {}",
        triangles.len(),
        split.axis,
        split.left_count,
        split.cost
    );
    split.left_count
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct SplitCandidate {
    axis: Axis,
    left_count: usize,
    cost: FloatType,
}

/// Evaluates the SAH cost of every split position along every axis without modifying
/// the slice, returns the first candidate with minimal cost.
///
/// Candidate orders are stable sorts of the unmodified slice, so sorting the slice itself
/// by the winning axis reproduces exactly the order that was evaluated.
fn find_sah_split<P>(triangles: &[BvhTriangle<P>]) -> SplitCandidate {
    let count = triangles.len();
    debug_assert!(count >= 2);

    let mut best = SplitCandidate {
        axis: Axis::X,
        left_count: median_split_count(count),
        cost: FloatType::INFINITY,
    };

    let mut order: Vec<usize> = Vec::with_capacity(count);
    let mut suffix_bounds = vec![WorldBox::empty(); count];

    for axis in Axis::ALL {
        order.clear();
        order.extend(0..count);
        order.sort_by_key(|&i| OrderedFloat(triangles[i].centroid()[axis.index()]));

        // suffix_bounds[i] encloses triangles order[i..]
        let mut acc = WorldBox::empty();
        for (i, &triangle_index) in order.iter().enumerate().rev() {
            acc.extend_triangle(triangles[triangle_index].geometry());
            suffix_bounds[i] = acc;
        }

        let mut prefix_bounds = WorldBox::empty();
        for (i, &triangle_index) in order[..count - 1].iter().enumerate() {
            prefix_bounds.extend_triangle(triangles[triangle_index].geometry());

            let left_count = i + 1;
            let cost = split_cost(&prefix_bounds, left_count, &suffix_bounds[left_count], count);
            if cost < best.cost {
                best = SplitCandidate {
                    axis,
                    left_count,
                    cost,
                };
            }
        }
    }

    best
}

fn split_cost(left: &WorldBox, left_count: usize, right: &WorldBox, count: usize) -> FloatType {
    left.surface_area() * left_count as FloatType
        + right.surface_area() * (count - left_count) as FloatType
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::{assert, let_assert};
    use test_case::test_case;
    use test_strategy::proptest;

    use crate::{
        bvh::test::{triangle_soup, unit_cube},
        geometry::{Triangle, WorldPoint},
    };

    fn settings(leaf_size: usize, split_policy: SplitPolicy) -> BuildSettings {
        BuildSettings::builder()
            .leaf_size(NonZeroUsize::new(leaf_size).unwrap())
            .split_policy(split_policy)
            .build()
    }

    /// Triangles with centroids at x = 0, 1, 2, ... stacked along the x axis
    fn row_of_triangles(count: usize) -> Vec<BvhTriangle<usize>> {
        (0..count)
            .map(|i| {
                let x = i as FloatType;
                BvhTriangle::new(
                    WorldPoint::new(x - 0.25, 0.0, 0.0),
                    WorldPoint::new(x + 0.25, 0.0, 0.0),
                    WorldPoint::new(x, 0.5, 0.0),
                    i,
                )
            })
            .rev()
            .collect()
    }

    #[test]
    fn default_settings() {
        let s = BuildSettings::default();
        assert!(s.leaf_size.get() == 8);
        assert!(s.split_policy == SplitPolicy::Sah);
        assert!(s.max_depth == DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn empty_input_builds_empty_tree() {
        let mut triangles: Vec<BvhTriangle> = Vec::new();
        let bvh = Bvh::build(&mut triangles, &BuildSettings::default());
        assert!(bvh.is_empty());
        assert!(bvh.bounding_box().is_empty());
        assert!(bvh.inner_nodes.is_empty());
        assert!(bvh.leaf_ranges().is_empty());
    }

    #[test_case(SplitPolicy::Median)]
    #[test_case(SplitPolicy::Sah)]
    fn small_input_is_single_leaf(policy: SplitPolicy) {
        let mut triangles = unit_cube();
        let bvh = Bvh::build(&mut triangles, &settings(12, policy));
        let_assert!(NodeLink::Leaf { triangles: range } = bvh.root);
        assert!(range.into_range() == (0..12));
        assert!(bvh.inner_nodes.is_empty());
    }

    #[test_case(1, 1)]
    #[test_case(2, 1)]
    #[test_case(3, 2)]
    #[test_case(4, 2)]
    #[test_case(5, 3)]
    fn median_split_count_favours_left(count: usize, expected: usize) {
        assert!(median_split_count(count) == expected);
    }

    #[test]
    fn median_split_sorts_along_longest_axis() {
        let mut triangles = row_of_triangles(5);
        let enclosing_box = range_bounds(&triangles);
        let left_count = median_split(&mut triangles, &enclosing_box);

        assert!(left_count == 3);
        let payloads: Vec<_> = triangles.iter().map(|t| t.payload).collect();
        assert!(payloads == vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn median_tree_splits_in_halves() {
        let mut triangles = row_of_triangles(8);
        let bvh = Bvh::build(&mut triangles, &settings(2, SplitPolicy::Median));
        assert!(bvh.leaf_ranges() == vec![0..2, 2..4, 4..6, 6..8]);
    }

    #[test]
    fn sah_separates_clusters() {
        // Three triangles near the origin and one far away along z.
        // Along x and y the far triangle sits between the near ones,
        // only a split along z isolates it.
        let t = |z: FloatType, shift: FloatType, payload: usize| {
            BvhTriangle::new(
                WorldPoint::new(shift, shift, z),
                WorldPoint::new(1.0 + shift, shift, z),
                WorldPoint::new(shift, 1.0 + shift, z + 0.1),
                payload,
            )
        };
        let mut triangles = vec![t(100.0, 0.1, 3), t(0.0, 0.0, 0), t(0.2, 0.2, 1), t(0.4, 0.3, 2)];

        let split = find_sah_split(&triangles);
        assert!(split.axis == Axis::Z);
        assert!(split.left_count == 3);

        let left_count = sah_split(&mut triangles);
        assert!(left_count == 3);
        assert!(triangles[3].payload == 3);
    }

    #[test]
    fn coincident_triangles_respect_depth_limit() {
        let triangle = Triangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 0.0, 0.0),
            WorldPoint::new(0.0, 1.0, 0.0),
        );
        let mut triangles: Vec<_> = (0..1000)
            .map(|i| BvhTriangle::from_triangle(triangle, i))
            .collect();
        let settings = BuildSettings::builder()
            .leaf_size(NonZeroUsize::new(1).unwrap())
            .max_depth(16)
            .build();

        let bvh = Bvh::build(&mut triangles, &settings);

        let depth = bvh.depth_statistics();
        assert!(depth.max <= 17);
        assert!(bvh.leaf_ranges().iter().map(|r| r.len()).sum::<usize>() == 1000);
    }

    #[test]
    fn degenerate_triangles_have_zero_cost() {
        let p = WorldPoint::new(1.0, 1.0, 1.0);
        let triangles: Vec<_> = (0..4).map(|i| BvhTriangle::new(p, p, p, i)).collect();
        let split = find_sah_split(&triangles);
        assert!(split.cost == 0.0);
        assert!(split.axis == Axis::X);
        assert!(split.left_count == 1);
    }

    /// Cost of a split of the slice in its current order
    fn cost_of_current_order<P>(triangles: &[BvhTriangle<P>], left_count: usize) -> FloatType {
        split_cost(
            &range_bounds(&triangles[..left_count]),
            left_count,
            &range_bounds(&triangles[left_count..]),
            triangles.len(),
        )
    }

    #[proptest]
    fn sah_cost_is_at_most_median_cost(
        #[strategy(triangle_soup(2..40))] triangles: Vec<BvhTriangle<usize>>,
    ) {
        let mut median_triangles = triangles.clone();
        let enclosing_box = range_bounds(&median_triangles);
        let median_left_count = median_split(&mut median_triangles, &enclosing_box);
        let median_cost = cost_of_current_order(&median_triangles, median_left_count);

        let split = find_sah_split(&triangles);
        assert!(split.cost <= median_cost * (1.0 + 1e-6));
    }

    #[proptest]
    fn sah_sort_reproduces_evaluated_order(
        #[strategy(triangle_soup(2..40))] mut triangles: Vec<BvhTriangle<usize>>,
    ) {
        let split = find_sah_split(&triangles);
        let left_count = sah_split(&mut triangles);
        assert!(left_count == split.left_count);
        assert!(cost_of_current_order(&triangles, left_count) == split.cost);
    }

    #[proptest]
    fn leaves_respect_leaf_size(
        #[strategy(triangle_soup(0..100))] mut triangles: Vec<BvhTriangle<usize>>,
        #[strategy(1usize..10)] leaf_size: usize,
        sah: bool,
    ) {
        let policy = if sah { SplitPolicy::Sah } else { SplitPolicy::Median };
        let bvh = Bvh::build(&mut triangles, &settings(leaf_size, policy));
        for range in bvh.leaf_ranges() {
            assert!(!range.is_empty());
            assert!(range.len() <= leaf_size);
        }
    }
}
