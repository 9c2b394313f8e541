use std::ops::Range;

use thiserror::Error;

use crate::geometry::{FloatType, WorldBox, WorldPoint};

use super::{Bvh, BvhTriangle, NodeLink};

/// Tolerance for comparing stored boxes against boxes recomputed from the triangles.
const BOX_TOLERANCE: FloatType = 1e-5;

#[derive(Debug, Error, PartialEq)]
pub enum ConsistencyError {
    #[error("Tree was built over {expected} triangles, but {actual} were given")]
    TriangleCountMismatch { expected: usize, actual: usize },
    #[error("Leaf range {range:?} is outside of the triangle slice")]
    RangeOutOfBounds { range: Range<usize> },
    #[error("Vertex {vertex:?} of triangle {triangle} is outside of its node's box {bounds:?}")]
    NotContained {
        triangle: usize,
        vertex: WorldPoint,
        bounds: WorldBox,
    },
    #[error("Stored box {stored:?} does not match the triangles' bounds {actual:?}")]
    NotTight { stored: WorldBox, actual: WorldBox },
    #[error("Triangle {triangle} is referenced by {count} leaves")]
    Coverage { triangle: usize, count: usize },
}

impl Bvh {
    /// Verifies the structural invariants of the tree against the triangle slice it was built
    /// over: every node's box is the tight bounds of the triangles below it, and every
    /// triangle belongs to exactly one leaf.
    pub fn check_consistency<P>(&self, triangles: &[BvhTriangle<P>]) -> Result<(), ConsistencyError> {
        if triangles.len() != self.triangle_count {
            return Err(ConsistencyError::TriangleCountMismatch {
                expected: self.triangle_count,
                actual: triangles.len(),
            });
        }

        let mut coverage = vec![0usize; triangles.len()];
        self.check_recursive(self.root, &self.bounding_box, triangles, &mut coverage)?;

        if let Some((triangle, &count)) = coverage.iter().enumerate().find(|(_, c)| **c != 1) {
            return Err(ConsistencyError::Coverage { triangle, count });
        }

        Ok(())
    }

    /// Returns the bounds of all triangles in the subtree
    fn check_recursive<P>(
        &self,
        node: NodeLink,
        enclosing_box: &WorldBox,
        triangles: &[BvhTriangle<P>],
        coverage: &mut [usize],
    ) -> Result<WorldBox, ConsistencyError> {
        let actual = match node {
            NodeLink::Null => WorldBox::empty(),
            NodeLink::Leaf { triangles: range } => {
                let range = range.into_range();
                if range.end > triangles.len() {
                    return Err(ConsistencyError::RangeOutOfBounds { range });
                }

                let mut actual = WorldBox::empty();
                for i in range {
                    coverage[i] += 1;
                    for vertex in triangles[i].geometry().iter() {
                        if !enclosing_box.contains_point(vertex, BOX_TOLERANCE) {
                            return Err(ConsistencyError::NotContained {
                                triangle: i,
                                vertex: *vertex,
                                bounds: *enclosing_box,
                            });
                        }
                        actual.extend_point(vertex);
                    }
                }
                actual
            }
            NodeLink::Inner { index } => {
                let node = &self.inner_nodes[index];
                let mut actual = WorldBox::empty();
                for (child_link, child_box) in node.child_links.iter().zip(&node.child_bounds) {
                    if !enclosing_box.is_empty() && !child_box.is_empty() {
                        // Child boxes must lie within the parent
                        for corner in [child_box.min, child_box.max] {
                            if !enclosing_box.contains_point(&corner, BOX_TOLERANCE) {
                                return Err(ConsistencyError::NotTight {
                                    stored: *enclosing_box,
                                    actual: enclosing_box.union(child_box),
                                });
                            }
                        }
                    }
                    let child_actual =
                        self.check_recursive(*child_link, child_box, triangles, coverage)?;
                    actual = actual.union(&child_actual);
                }
                actual
            }
        };

        let tight = if actual.is_empty() {
            enclosing_box.is_empty()
        } else {
            enclosing_box.approx_eq(&actual, BOX_TOLERANCE)
        };
        if !tight {
            return Err(ConsistencyError::NotTight {
                stored: *enclosing_box,
                actual,
            });
        }

        Ok(actual)
    }
}
