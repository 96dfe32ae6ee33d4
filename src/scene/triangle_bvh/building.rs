use std::{array, ops::Range};

use assert2::debug_assert;
use index_vec::IndexVec;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::{
    geometry::{FloatType, SIMD_LANES, Triangle, WorldBox, WorldPoint, WorldPoint4},
    util::{MemoryPool, simba::simd_windows},
};

use super::{
    BuildError, BuildNodeIdx, BuildSettings, TriangleGroup, TriangleGroupIdx, TriangleRef,
    extraction::BuildGeometry,
};

/// Per triangle record that gets reordered while partitioning.
#[derive(Clone, Debug)]
struct TriangleInfo {
    /// Index into `BuildGeometry::triangles`
    index: u32,
    centroid: WorldPoint,
    bounds: WorldBox,
}

#[derive(Clone, Debug)]
pub(super) enum BuildNode {
    Leaf {
        groups: Range<TriangleGroupIdx>,
        triangle_count: u32,
    },
    Inner {
        child_bounds: [WorldBox; 2],
        children: [BuildNodeIdx; 2],
        /// Node count of the subtree rooted in the first child
        first_subtree_size: u32,
    },
}

/// Summary of a built subtree.
#[derive(Clone, Debug)]
pub(super) struct BuildResult {
    pub node: BuildNodeIdx,
    pub bounds: WorldBox,
    pub node_count: usize,
    /// Depth of the deepest leaf in the subtree
    pub depth: usize,
}

#[derive(Debug)]
pub(super) struct BuildTree {
    pub nodes: IndexVec<BuildNodeIdx, BuildNode>,
    pub groups: IndexVec<TriangleGroupIdx, TriangleGroup>,
    /// None if there were no triangles
    pub root: Option<BuildResult>,
}

pub(super) fn build_tree(
    geometry: &BuildGeometry,
    settings: &BuildSettings,
) -> Result<BuildTree, BuildError> {
    Builder::new(
        geometry,
        settings,
        BuildNodeIdx::MAX_INDEX,
        TriangleGroupIdx::MAX_INDEX,
    )
    .run()
}

enum Split {
    Leaf,
    At(usize),
}

#[derive(Clone, Debug)]
struct Bucket {
    count: usize,
    bounds: WorldBox,
}

impl Bucket {
    fn empty() -> Bucket {
        Bucket {
            count: 0,
            bounds: WorldBox::empty(),
        }
    }

    fn add(&mut self, bounds: &WorldBox, count: usize) {
        self.count += count;
        self.bounds = self.bounds.union(bounds);
    }
}

/// Number of triangle groups needed for `count` triangles.
fn group_count(count: usize) -> FloatType {
    count.div_ceil(SIMD_LANES) as FloatType
}

struct Builder<'a> {
    geometry: &'a BuildGeometry,
    settings: &'a BuildSettings,
    nodes: MemoryPool<BuildNodeIdx, BuildNode>,
    groups: MemoryPool<TriangleGroupIdx, TriangleGroup>,
}

impl<'a> Builder<'a> {
    fn new(
        geometry: &'a BuildGeometry,
        settings: &'a BuildSettings,
        node_limit: usize,
        group_limit: usize,
    ) -> Self {
        Builder {
            geometry,
            settings,
            nodes: MemoryPool::with_limit(node_limit),
            groups: MemoryPool::with_limit(group_limit),
        }
    }

    fn run(self) -> Result<BuildTree, BuildError> {
        let mut infos: Vec<TriangleInfo> = self
            .geometry
            .triangles
            .par_iter()
            .enumerate()
            .map(|(index, triangle)| {
                let bounds = self.geometry.bounding_box(triangle);
                TriangleInfo {
                    index: index as u32,
                    centroid: bounds.center(),
                    bounds,
                }
            })
            .collect();

        let root = if infos.is_empty() {
            None
        } else {
            Some(self.build_recursive(&mut infos, 1)?)
        };

        Ok(BuildTree {
            nodes: self.nodes.into_inner(),
            groups: self.groups.into_inner(),
            root,
        })
    }

    fn build_recursive(
        &self,
        infos: &mut [TriangleInfo],
        depth: usize,
    ) -> Result<BuildResult, BuildError> {
        debug_assert!(!infos.is_empty());

        let bounds = infos
            .iter()
            .fold(WorldBox::empty(), |acc, info| acc.union(&info.bounds));

        if infos.len() <= self.settings.leaf_size || depth >= self.settings.max_depth {
            return self.build_leaf(infos, bounds, depth);
        }

        let mid = match self.split(infos, &bounds) {
            Split::Leaf => return self.build_leaf(infos, bounds, depth),
            Split::At(mid) => mid,
        };
        debug_assert!(mid > 0 && mid < infos.len());

        let parallel = infos.len() >= self.settings.parallel_threshold;
        let (left, right) = infos.split_at_mut(mid);
        let (left, right) = if parallel {
            rayon::join(
                || self.build_recursive(left, depth + 1),
                || self.build_recursive(right, depth + 1),
            )
        } else {
            (
                self.build_recursive(left, depth + 1),
                self.build_recursive(right, depth + 1),
            )
        };
        let (left, right) = (left?, right?);

        let node = self.nodes.allocate(BuildNode::Inner {
            child_bounds: [left.bounds, right.bounds],
            children: [left.node, right.node],
            first_subtree_size: left.node_count as u32,
        })?;

        Ok(BuildResult {
            node,
            bounds,
            node_count: 1 + left.node_count + right.node_count,
            depth: left.depth.max(right.depth),
        })
    }

    fn build_leaf(
        &self,
        infos: &[TriangleInfo],
        bounds: WorldBox,
        depth: usize,
    ) -> Result<BuildResult, BuildError> {
        let triangles = &self.geometry.triangles;

        let groups: Vec<TriangleGroup> = simd_windows::<Triangle<WorldPoint4>>(
            infos
                .iter()
                .map(|info| self.geometry.triangle(&triangles[info.index as usize])),
        )
        .zip(infos.chunks(SIMD_LANES))
        .map(|((geometry, used), chunk)| {
            debug_assert!(used == chunk.len());
            TriangleGroup {
                geometry,
                refs: array::from_fn(|lane| {
                    TriangleRef::from(&triangles[chunk[lane.min(used - 1)].index as usize])
                }),
            }
        })
        .collect();

        let groups = self.groups.allocate_many(groups)?;
        let node = self.nodes.allocate(BuildNode::Leaf {
            groups,
            triangle_count: infos.len() as u32,
        })?;

        Ok(BuildResult {
            node,
            bounds,
            node_count: 1,
            depth,
        })
    }

    /// Decides how to split the range, reorders the triangles so that the split
    /// is at the returned position.
    fn split(&self, infos: &mut [TriangleInfo], bounds: &WorldBox) -> Split {
        let centroid_bounds = infos.iter().fold(WorldBox::empty(), |mut acc, info| {
            acc.grow(&info.centroid);
            acc
        });
        let axis = centroid_bounds.largest_axis();
        let extent = centroid_bounds.extent(axis);

        if extent <= 0.0 {
            return Split::At(median_split(infos, axis));
        }

        let bucket_count = self.settings.bucket_count;
        let min = centroid_bounds.min[axis];
        let scale = bucket_count as FloatType / extent;
        let bucket_index = |info: &TriangleInfo| {
            (((info.centroid[axis] - min) * scale) as usize).min(bucket_count - 1)
        };

        let mut buckets = vec![Bucket::empty(); bucket_count];
        for info in infos.iter() {
            buckets[bucket_index(info)].add(&info.bounds, 1);
        }

        // Cost of the right side of a split after bucket i is stored at index i
        let mut right_sides = vec![(0.0, 0); bucket_count - 1];
        let mut accumulator = Bucket::empty();
        for i in (1..bucket_count).rev() {
            accumulator.add(&buckets[i].bounds, buckets[i].count);
            right_sides[i - 1] = (accumulator.bounds.surface_area(), accumulator.count);
        }

        let area = bounds.surface_area();
        let inv_area = if area > 0.0 { area.recip() } else { 0.0 };
        let settings = self.settings;

        let mut accumulator = Bucket::empty();
        let Some((best_bucket, best_cost)) = right_sides
            .iter()
            .enumerate()
            .map(|(i, (right_area, right_count))| {
                accumulator.add(&buckets[i].bounds, buckets[i].count);
                let left = accumulator.bounds.surface_area() * group_count(accumulator.count);
                let right = right_area * group_count(*right_count);
                let cost = settings.traversal_cost
                    + settings.intersection_cost * (left + right) * inv_area;
                (i, cost)
            })
            .min_by_key(|(_, cost)| OrderedFloat(*cost))
        else {
            return Split::At(median_split(infos, axis));
        };

        let leaf_cost = settings.intersection_cost * group_count(infos.len());
        if infos.len() <= settings.max_leaf_size && leaf_cost <= best_cost {
            return Split::Leaf;
        }

        let mid = itertools::partition(infos.iter_mut(), |info| bucket_index(info) <= best_bucket);
        if mid == 0 || mid == infos.len() {
            Split::At(median_split(infos, axis))
        } else {
            Split::At(mid)
        }
    }
}

/// Splits the range in half by centroid position along the axis.
fn median_split(infos: &mut [TriangleInfo], axis: usize) -> usize {
    let mid = infos.len() / 2;
    infos.select_nth_unstable_by(mid, |a, b| a.centroid[axis].total_cmp(&b.centroid[axis]));
    mid
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{WorldVector, test::WorldPointWrapper},
        scene::{Primitive, TriangleMesh},
    };

    use std::sync::Arc;

    use assert2::{assert, let_assert};
    use itertools::Itertools as _;
    use simba::simd::SimdValue as _;
    use test_case::test_case;
    use test_strategy::proptest;

    fn geometry_of(meshes: Vec<TriangleMesh>) -> BuildGeometry {
        let primitives: Vec<Arc<dyn Primitive>> = meshes
            .into_iter()
            .map(|m| Arc::new(m) as Arc<dyn Primitive>)
            .collect();
        BuildGeometry::extract(&primitives).unwrap()
    }

    /// Small triangles with corners at the given points.
    fn triangles_at(points: &[WorldPoint]) -> TriangleMesh {
        let positions = points
            .iter()
            .flat_map(|p| {
                [
                    *p,
                    p + WorldVector::new(0.1, 0.0, 0.0),
                    p + WorldVector::new(0.0, 0.1, 0.0),
                ]
            })
            .collect_vec();
        let indices = (0..points.len() as u32)
            .map(|i| Triangle::new(3 * i, 3 * i + 1, 3 * i + 2))
            .collect_vec();
        TriangleMesh::new(positions, indices)
    }

    fn line_of_triangles(count: usize) -> TriangleMesh {
        triangles_at(
            &(0..count)
                .map(|i| WorldPoint::new(i as f32, 0.0, 0.0))
                .collect_vec(),
        )
    }

    /// Collects triangle indices of the subtree and checks the structural invariants on the way.
    fn check_subtree(
        tree: &BuildTree,
        node: BuildNodeIdx,
        bounds: &WorldBox,
        depth: usize,
        max_depth: usize,
        out: &mut Vec<u32>,
    ) -> usize {
        assert!(depth <= max_depth);
        match &tree.nodes[node] {
            BuildNode::Leaf {
                groups,
                triangle_count,
            } => {
                assert!(*triangle_count > 0);
                let group_count = groups.end.index() - groups.start.index();
                assert!(group_count == (*triangle_count as usize).div_ceil(SIMD_LANES));

                let refs = tree.groups[groups.clone()]
                    .iter()
                    .flat_map(|g| g.refs.iter())
                    .take(*triangle_count as usize)
                    .collect_vec();
                for group in tree.groups[groups.clone()].iter() {
                    for lane in 0..SIMD_LANES {
                        let triangle = group.geometry.extract(lane);
                        assert!(bounds.contains_box(&triangle.bounding_box()));
                    }
                }
                out.extend(refs.iter().map(|r| r.triangle));
                1
            }
            BuildNode::Inner {
                child_bounds,
                children,
                first_subtree_size,
            } => {
                assert!(bounds.contains_box(&child_bounds[0]));
                assert!(bounds.contains_box(&child_bounds[1]));
                let first =
                    check_subtree(tree, children[0], &child_bounds[0], depth + 1, max_depth, out);
                let second =
                    check_subtree(tree, children[1], &child_bounds[1], depth + 1, max_depth, out);
                assert!(first == *first_subtree_size as usize);
                1 + first + second
            }
        }
    }

    fn check_tree(tree: &BuildTree, triangle_count: usize, max_depth: usize) {
        let_assert!(Some(root) = &tree.root);
        let mut seen = Vec::new();
        let node_count = check_subtree(tree, root.node, &root.bounds, 1, max_depth, &mut seen);

        assert!(node_count == root.node_count);
        assert!(node_count == tree.nodes.len());
        assert!(root.depth <= max_depth);

        seen.sort();
        assert!(seen == (0..triangle_count as u32).collect_vec());
    }

    #[test_case(1)]
    #[test_case(4)]
    #[test_case(5)]
    #[test_case(17)]
    #[test_case(1000)]
    fn every_triangle_in_one_leaf(count: usize) {
        let geometry = geometry_of(vec![line_of_triangles(count)]);
        let tree = build_tree(&geometry, &BuildSettings::default()).unwrap();
        check_tree(&tree, count, BuildSettings::default().max_depth);
    }

    #[proptest(cases = 32)]
    fn random_scenes_are_valid(
        #[strategy(proptest::collection::vec(proptest::prelude::any::<WorldPointWrapper>(), 1..300))]
        points: Vec<WorldPointWrapper>,
    ) {
        let points = points.iter().map(|p| p.0).collect_vec();
        let geometry = geometry_of(vec![triangles_at(&points)]);
        let settings = BuildSettings::builder().parallel_threshold(64).build();
        let tree = build_tree(&geometry, &settings).unwrap();
        check_tree(&tree, points.len(), settings.max_depth);
    }

    #[test]
    fn identical_triangles_respect_depth_limit() {
        let points = vec![WorldPoint::new(1.0, 2.0, 3.0); 500];
        let geometry = geometry_of(vec![triangles_at(&points)]);
        let settings = BuildSettings::builder().max_depth(3).build();
        let tree = build_tree(&geometry, &settings).unwrap();

        check_tree(&tree, 500, 3);
        let_assert!(Some(root) = &tree.root);
        assert!(root.depth == 3);
    }

    #[test]
    fn small_input_is_single_leaf() {
        let geometry = geometry_of(vec![line_of_triangles(3)]);
        let tree = build_tree(&geometry, &BuildSettings::default()).unwrap();

        let_assert!(Some(root) = &tree.root);
        let_assert!(BuildNode::Leaf { triangle_count: 3, .. } = &tree.nodes[root.node]);
        assert!(tree.groups.len() == 1);
    }

    #[test]
    fn partial_group_repeats_last_triangle() {
        let geometry = geometry_of(vec![line_of_triangles(3)]);
        let tree = build_tree(&geometry, &BuildSettings::default()).unwrap();

        let group = &tree.groups[TriangleGroupIdx::from_usize(0)];
        assert!(group.geometry.extract(3) == group.geometry.extract(2));
        assert!(group.refs[3] == group.refs[2]);
    }

    #[test]
    fn separated_clusters_are_split_apart() {
        let mut points = (0..8)
            .map(|i| WorldPoint::new(i as f32 * 0.01, 0.0, 0.0))
            .collect_vec();
        points.extend((0..8).map(|i| WorldPoint::new(100.0 + i as f32 * 0.01, 0.0, 0.0)));
        let geometry = geometry_of(vec![triangles_at(&points)]);
        let tree = build_tree(&geometry, &BuildSettings::default()).unwrap();

        let_assert!(Some(root) = &tree.root);
        let_assert!(BuildNode::Inner { child_bounds, .. } = &tree.nodes[root.node]);
        assert!(child_bounds[0].max.x < 1.0);
        assert!(child_bounds[1].min.x > 99.0);
    }

    #[test]
    fn empty_geometry_has_no_root() {
        let geometry = BuildGeometry::default();
        let tree = build_tree(&geometry, &BuildSettings::default()).unwrap();
        assert!(tree.root.is_none());
        assert!(tree.nodes.is_empty());
    }

    #[test]
    fn node_pool_exhaustion_is_reported() {
        let geometry = geometry_of(vec![line_of_triangles(100)]);
        let settings = BuildSettings::default();
        let result = Builder::new(&geometry, &settings, 3, usize::MAX).run();
        let_assert!(Err(BuildError::PoolExhausted(_)) = result);
    }
}
