use std::fmt;

use crate::{geometry::WorldBox, util::Stats};

use super::{Bvh, NodeLink};

/// Shape of a built tree.
#[derive(Clone, Debug, PartialEq)]
pub struct BvhStatistics {
    pub triangle_count: usize,
    pub inner_node_count: usize,
    pub leaf_count: usize,
    /// Depth of leaves, root is at depth 1
    pub depth: Stats,
    /// Number of triangles per leaf
    pub leaf_fill: Stats,
}

impl fmt::Display for BvhStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} triangles, {} inner nodes, {} leaves; depth: {}; leaf fill: {}",
            self.triangle_count, self.inner_node_count, self.leaf_count, self.depth, self.leaf_fill
        )
    }
}

impl Bvh {
    pub fn statistics(&self) -> BvhStatistics {
        let leaf_fill = self.leaf_fill_statistics();
        BvhStatistics {
            triangle_count: self.triangle_count,
            inner_node_count: self.inner_nodes.len(),
            leaf_count: leaf_fill.count,
            depth: self.depth_statistics(),
            leaf_fill,
        }
    }

    /// Writes an indented outline of the tree, one node per line.
    pub fn print_tree(&self, out: &mut impl fmt::Write) -> fmt::Result {
        self.print_recursive(out, 0, self.root, &self.bounding_box)
    }

    fn print_recursive(
        &self,
        out: &mut impl fmt::Write,
        indent: usize,
        node: NodeLink,
        enclosing_box: &WorldBox,
    ) -> fmt::Result {
        let indent_str = "  ".repeat(indent);
        match node {
            NodeLink::Null => writeln!(out, "{indent_str}- <EMPTY>"),
            NodeLink::Leaf { triangles } => writeln!(
                out,
                "{indent_str}- L{:?}: {:?}-{:?}",
                triangles.into_range(),
                enclosing_box.min,
                enclosing_box.max,
            ),
            NodeLink::Inner { index } => {
                writeln!(
                    out,
                    "{indent_str}- I{}: {:?}-{:?}",
                    index.index(),
                    enclosing_box.min,
                    enclosing_box.max,
                )?;

                let node = &self.inner_nodes[index];
                for (child_link, child_box) in node.child_links.iter().zip(&node.child_bounds) {
                    self.print_recursive(out, indent + 1, *child_link, child_box)?;
                }
                Ok(())
            }
        }
    }

    /// Bounding boxes of all nodes at the given depth, root is at depth 0.
    /// Leaves shallower than `depth` contribute nothing.
    pub fn boxes_at_depth(&self, depth: usize) -> Vec<WorldBox> {
        let mut boxes = Vec::new();
        self.boxes_at_depth_recursive(self.root, &self.bounding_box, depth, &mut boxes);
        boxes
    }

    fn boxes_at_depth_recursive(
        &self,
        node: NodeLink,
        enclosing_box: &WorldBox,
        remaining_depth: usize,
        boxes: &mut Vec<WorldBox>,
    ) {
        match node {
            NodeLink::Null => {}
            _ if remaining_depth == 0 => boxes.push(*enclosing_box),
            NodeLink::Leaf { .. } => {}
            NodeLink::Inner { index } => {
                let node = &self.inner_nodes[index];
                for (child_link, child_box) in node.child_links.iter().zip(&node.child_bounds) {
                    self.boxes_at_depth_recursive(*child_link, child_box, remaining_depth - 1, boxes);
                }
            }
        }
    }

    /// Depth statistics over all leaves; root is at depth 1.
    pub(super) fn depth_statistics(&self) -> Stats {
        self.depth_statistics_recursive(self.root)
    }

    fn depth_statistics_recursive(&self, node: NodeLink) -> Stats {
        match node {
            NodeLink::Null => Stats::default(),
            NodeLink::Leaf { .. } => Stats::new_single(1),
            NodeLink::Inner { index } => {
                let mut ret = self.inner_nodes[index]
                    .child_links
                    .iter()
                    .map(|child| self.depth_statistics_recursive(*child))
                    .fold(Stats::default(), |a, b| a.merge(&b));

                ret.min += 1;
                ret.max += 1;
                ret.avg += 1.0;

                ret
            }
        }
    }

    fn leaf_fill_statistics(&self) -> Stats {
        let mut stats = Stats::default();
        stats.add_samples(self.leaf_ranges().iter().map(|range| range.len()));
        stats
    }
}
