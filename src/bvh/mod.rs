//! Binary bounding volume hierarchy over a triangle slice.
//!
//! The tree does not own the triangles. `Bvh::build` reorders the caller's slice in place
//! and leaf nodes refer to contiguous ranges of the reordered slice. Queries take the same
//! slice again.

mod building;
mod consistency;
mod printing;
mod ray_bvh_intersection;

use std::ops::Range;

use assert2::assert;
use index_vec::IndexVec;

use crate::geometry::{FloatType, Ray, Triangle, WorldBox, WorldPoint, WorldVector};

pub use building::{BuildSettings, DEFAULT_LEAF_SIZE, DEFAULT_MAX_DEPTH, SplitPolicy};
pub use consistency::ConsistencyError;
pub use printing::BvhStatistics;
pub use ray_bvh_intersection::{StackCache, TraversalStats, intersect_brute_force};

/// Triangle as stored in the caller's slice, together with its opaque payload.
/// The payload travels with the triangle when the builder reorders the slice.
#[derive(Clone, Debug, PartialEq)]
pub struct BvhTriangle<P = ()> {
    geometry: Triangle<WorldPoint>,
    centroid: WorldPoint,
    pub payload: P,
}

impl<P> BvhTriangle<P> {
    pub fn new(a: WorldPoint, b: WorldPoint, c: WorldPoint, payload: P) -> Self {
        Self::from_triangle(Triangle::new(a, b, c), payload)
    }

    pub fn from_triangle(geometry: Triangle<WorldPoint>, payload: P) -> Self {
        let centroid = geometry.centroid();
        BvhTriangle {
            geometry,
            centroid,
            payload,
        }
    }

    pub fn geometry(&self) -> &Triangle<WorldPoint> {
        &self.geometry
    }

    /// Mean of the three vertices, used for ordering triangles when splitting nodes.
    pub fn centroid(&self) -> &WorldPoint {
        &self.centroid
    }
}

#[derive(Clone, Debug)]
pub struct Bvh {
    bounding_box: WorldBox,
    root: NodeLink,

    inner_nodes: IndexVec<InnerNodeIdx, InnerNode>,

    triangle_count: usize,
}

impl Bvh {
    /// Bounding box of the whole tree, empty if the tree has no triangles.
    pub fn bounding_box(&self) -> &WorldBox {
        &self.bounding_box
    }

    /// Number of triangles the tree was built over.
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn is_empty(&self) -> bool {
        self.root == NodeLink::Null
    }

    /// Triangle ranges of all leaves, in depth first left to right order.
    /// For a correctly built tree these ranges are adjacent and cover
    /// `0..triangle_count()`.
    pub fn leaf_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        self.leaf_ranges_recursive(self.root, &mut ranges);
        ranges
    }

    fn leaf_ranges_recursive(&self, link: NodeLink, ranges: &mut Vec<Range<usize>>) {
        match link {
            NodeLink::Null => {}
            NodeLink::Leaf { triangles } => ranges.push(triangles.into_range()),
            NodeLink::Inner { index } => {
                for child in self.inner_nodes[index].child_links {
                    self.leaf_ranges_recursive(child, ranges);
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
struct InnerNode {
    child_bounds: [WorldBox; 2],
    child_links: [NodeLink; 2],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum NodeLink {
    #[default]
    Null,
    Inner {
        index: InnerNodeIdx,
    },
    Leaf {
        triangles: TriangleRange,
    },
}

index_vec::define_index_type! {
    struct InnerNodeIdx = u32;
}

index_vec::define_index_type! {
    /// Index of a triangle in the slice reordered by `Bvh::build`.
    pub struct TriangleIdx = usize;
}

/// Non-empty contiguous range of triangles referenced by a leaf
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct TriangleRange {
    first: TriangleIdx,
    count: usize,
}

impl TriangleRange {
    /// Create a new range, panics if count is zero
    fn new(first: TriangleIdx, count: usize) -> TriangleRange {
        assert!(count >= 1);
        TriangleRange { first, count }
    }

    fn into_range(self) -> Range<usize> {
        self.first.index()..self.first.index() + self.count
    }

    fn iter(&self) -> impl Iterator<Item = TriangleIdx> + use<> {
        self.into_range().map(TriangleIdx::from_usize)
    }
}

/// Result of a closest hit query.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HitResult {
    /// Distance along the ray, infinite if nothing was hit
    pub distance: FloatType,
    /// Hit position, meaningless if nothing was hit
    pub point: WorldPoint,
    /// Unit geometric normal of the hit triangle, facing the ray origin
    pub normal: WorldVector,
    /// Index of the hit triangle in the reordered slice
    pub triangle: Option<TriangleIdx>,
}

impl HitResult {
    pub fn miss() -> HitResult {
        HitResult {
            distance: FloatType::INFINITY,
            point: WorldPoint::origin(),
            normal: WorldVector::zeros(),
            triangle: None,
        }
    }

    fn new(ray: &Ray, distance: FloatType, normal: WorldVector, triangle: TriangleIdx) -> HitResult {
        HitResult {
            distance,
            point: ray.point_at(distance),
            normal,
            triangle: Some(triangle),
        }
    }

    pub fn is_hit(&self) -> bool {
        self.triangle.is_some()
    }

    /// Looks up the hit triangle in the slice the tree was built over.
    pub fn triangle_in<'a, P>(&self, triangles: &'a [BvhTriangle<P>]) -> Option<&'a BvhTriangle<P>> {
        self.triangle.map(|i| &triangles[i.index()])
    }
}

impl Default for HitResult {
    fn default() -> Self {
        Self::miss()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    use assert2::{assert, let_assert};
    use proptest::prelude::*;

    use crate::geometry::test::simple_float;

    /// Cube [-1, 1]^3, two triangles per face.
    /// Payload is the index of the triangle in the original order.
    pub fn unit_cube() -> Vec<BvhTriangle<usize>> {
        let v = |x: f32, y: f32, z: f32| WorldPoint::new(x, y, z);
        let faces = [
            // +x
            [v(1.0, -1.0, -1.0), v(1.0, 1.0, -1.0), v(1.0, 1.0, 1.0), v(1.0, -1.0, 1.0)],
            // -x
            [v(-1.0, -1.0, -1.0), v(-1.0, -1.0, 1.0), v(-1.0, 1.0, 1.0), v(-1.0, 1.0, -1.0)],
            // +y
            [v(-1.0, 1.0, -1.0), v(-1.0, 1.0, 1.0), v(1.0, 1.0, 1.0), v(1.0, 1.0, -1.0)],
            // -y
            [v(-1.0, -1.0, -1.0), v(1.0, -1.0, -1.0), v(1.0, -1.0, 1.0), v(-1.0, -1.0, 1.0)],
            // +z
            [v(-1.0, -1.0, 1.0), v(1.0, -1.0, 1.0), v(1.0, 1.0, 1.0), v(-1.0, 1.0, 1.0)],
            // -z
            [v(-1.0, -1.0, -1.0), v(-1.0, 1.0, -1.0), v(1.0, 1.0, -1.0), v(1.0, -1.0, -1.0)],
        ];

        faces
            .iter()
            .flat_map(|[a, b, c, d]| [Triangle::new(*a, *b, *c), Triangle::new(*a, *c, *d)])
            .enumerate()
            .map(|(i, t)| BvhTriangle::from_triangle(t, i))
            .collect()
    }

    fn point_strategy() -> impl Strategy<Value = WorldPoint> {
        (simple_float(), simple_float(), simple_float())
            .prop_map(|(x, y, z)| WorldPoint::new(x, y, z))
    }

    fn triangle_strategy() -> impl Strategy<Value = Triangle<WorldPoint>> {
        // Small triangles scattered around, so that the tree has some structure to find
        (point_strategy(), point_strategy(), point_strategy()).prop_map(|(center, a, b)| {
            Triangle::new(
                center,
                center + a.coords * 0.05,
                center + b.coords * 0.05,
            )
        })
    }

    /// Triangle soups with payload equal to the original index.
    pub fn triangle_soup(
        size: std::ops::Range<usize>,
    ) -> impl Strategy<Value = Vec<BvhTriangle<usize>>> {
        proptest::collection::vec(triangle_strategy(), size).prop_map(|triangles| {
            triangles
                .into_iter()
                .enumerate()
                .map(|(i, t)| BvhTriangle::from_triangle(t, i))
                .collect()
        })
    }

    #[test]
    fn centroid_is_computed_on_construction() {
        let t = BvhTriangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(3.0, 0.0, 0.0),
            WorldPoint::new(0.0, 6.0, 3.0),
            "payload",
        );
        assert!(*t.centroid() == WorldPoint::new(1.0, 2.0, 1.0));
        assert!(t.payload == "payload");
    }

    #[test]
    fn triangle_range() {
        let range = TriangleRange::new(TriangleIdx::from_usize(3), 4);
        assert!(range.into_range() == (3..7));
        assert!(range.iter().map(|i| i.index()).collect::<Vec<_>>() == vec![3, 4, 5, 6]);
    }

    #[test]
    #[should_panic]
    fn triangle_range_must_not_be_empty() {
        TriangleRange::new(TriangleIdx::from_usize(0), 0);
    }

    #[test]
    fn miss_is_not_a_hit() {
        let miss = HitResult::miss();
        assert!(!miss.is_hit());
        assert!(miss.distance == f32::INFINITY);
        assert!(miss.triangle_in(&unit_cube()) == None);
    }

    #[test]
    fn hit_result_looks_up_triangle() {
        let triangles = unit_cube();
        let ray = Ray::new(WorldPoint::origin(), WorldVector::x());
        let hit = HitResult::new(&ray, 1.0, -WorldVector::x(), TriangleIdx::from_usize(5));
        assert!(hit.is_hit());
        assert!(hit.point == WorldPoint::new(1.0, 0.0, 0.0));
        let_assert!(Some(t) = hit.triangle_in(&triangles));
        assert!(t.payload == 5);
    }

    #[test]
    fn unit_cube_has_twelve_triangles() {
        let cube = unit_cube();
        assert!(cube.len() == 12);
        for t in &cube {
            assert!(t.geometry().normal().norm() > 0.0);
        }
    }
}
