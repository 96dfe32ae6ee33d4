use std::fmt::Display;

use crate::util::Stats;

use super::{NodeIdx, TriangleBvh};

/// Shape of a built hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct BvhStatistics {
    pub node_count: usize,
    pub leaf_count: usize,
    pub triangle_count: usize,
    pub triangle_group_count: usize,
    /// Depth of leaves, root has depth 1
    pub leaf_depth: Stats,
    /// Triangles per leaf
    pub leaf_triangles: Stats,
}

impl TriangleBvh {
    pub fn statistics(&self) -> BvhStatistics {
        let mut leaf_depth = Stats::default();
        let mut leaf_triangles = Stats::default();

        if !self.is_empty() {
            self.statistics_recursive(
                NodeIdx::from_usize(0),
                1,
                &mut leaf_depth,
                &mut leaf_triangles,
            );
        }

        BvhStatistics {
            node_count: self.nodes.len(),
            leaf_count: leaf_depth.count,
            triangle_count: leaf_triangles.sum,
            triangle_group_count: self.triangle_groups.len(),
            leaf_depth,
            leaf_triangles,
        }
    }

    fn statistics_recursive(
        &self,
        index: NodeIdx,
        depth: usize,
        leaf_depth: &mut Stats,
        leaf_triangles: &mut Stats,
    ) {
        let node = &self.nodes[index];
        if node.is_leaf() {
            leaf_depth.add_sample(depth);
            leaf_triangles.add_sample(node.triangle_count as usize);
            return;
        }

        self.statistics_recursive(index + 1, depth + 1, leaf_depth, leaf_triangles);
        self.statistics_recursive(
            NodeIdx::from_raw(node.offset),
            depth + 1,
            leaf_depth,
            leaf_triangles,
        );
    }
}

impl Display for BvhStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} nodes, {} leaves, {} triangles in {} groups",
            self.node_count, self.leaf_count, self.triangle_count, self.triangle_group_count
        )?;
        writeln!(f, "Leaf depth: {}", self.leaf_depth)?;
        write!(f, "Leaf triangles: {}", self.leaf_triangles)
    }
}
