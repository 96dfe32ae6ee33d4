mod building;
mod extraction;
mod linearization;
mod ray_bvh_intersection;
mod settings;
mod statistics;

use std::{sync::Arc, time::Instant};

use index_vec::IndexVec;
use simba::simd::SimdValue as _;
use thiserror::Error;

use crate::{
    geometry::{SIMD_LANES, Triangle, WorldBox, WorldBox4, WorldPoint4},
    scene::Primitive,
};

pub use crate::util::{PoolExhausted, Stats};
pub use settings::{BuildSettings, WorkerCount};
pub use statistics::BvhStatistics;

use extraction::{BuildGeometry, BuildTriangle};

/// Upper bound of the tree depth, root has depth 1.
pub const MAX_DEPTH: usize = 128;

/// Lanes of `Node::child_bounds` that hold actual children.
const CHILD_LANES: u32 = 0b11;

/// Binary bounding volume hierarchy over the triangles of a set of primitives.
///
/// The tree is stored as a flat array of nodes in depth first order. The first child of an
/// interior node directly follows it, the second child is pointed to by `Node::offset`.
/// Leaves reference runs of four-wide triangle groups.
///
/// Default value is an empty hierarchy that never reports a hit.
#[derive(Clone)]
pub struct TriangleBvh {
    primitives: Vec<Arc<dyn Primitive>>,
    settings: BuildSettings,

    bounds: WorldBox,
    depth: usize,

    nodes: IndexVec<NodeIdx, Node>,
    triangle_groups: IndexVec<TriangleGroupIdx, TriangleGroup>,
}

#[derive(Clone, Debug, Default)]
struct Node {
    /// Lane 0 is the first child, lane 1 the second one. Unused for leaves.
    child_bounds: WorldBox4,
    /// Zero for interior nodes
    triangle_count: u32,
    /// Index of the second child for interior nodes, of the first triangle group for leaves
    offset: u32,
}

impl Node {
    fn inner(child_bounds: &[WorldBox; 2], second_child: usize) -> Node {
        let mut packed = WorldBox4::splat(WorldBox::empty());
        packed.replace(0, child_bounds[0].clone());
        packed.replace(1, child_bounds[1].clone());
        Node {
            child_bounds: packed,
            triangle_count: 0,
            offset: second_child as u32,
        }
    }

    fn leaf(first_group: TriangleGroupIdx, triangle_count: u32) -> Node {
        assert2::debug_assert!(triangle_count > 0);
        Node {
            child_bounds: WorldBox4::default(),
            triangle_count,
            offset: first_group.raw(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.triangle_count > 0
    }

    fn triangle_groups(&self) -> impl Iterator<Item = TriangleGroupIdx> + use<> {
        let first = self.offset as usize;
        let group_count = (self.triangle_count as usize).div_ceil(SIMD_LANES);
        (first..first + group_count).map(TriangleGroupIdx::from_usize)
    }
}

/// Up to four triangles, the last one repeated to fill the unused lanes.
#[derive(Clone, Debug)]
struct TriangleGroup {
    geometry: Triangle<WorldPoint4>,
    refs: [TriangleRef; SIMD_LANES],
}

/// Where a triangle of a group came from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct TriangleRef {
    primitive: u32,
    triangle: u32,
    alpha_tested: bool,
}

impl From<&BuildTriangle> for TriangleRef {
    fn from(value: &BuildTriangle) -> Self {
        TriangleRef {
            primitive: value.primitive,
            triangle: value.triangle,
            alpha_tested: value.alpha_tested,
        }
    }
}

index_vec::define_index_type! {
    struct NodeIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    struct TriangleGroupIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    struct BuildNodeIdx = u32;
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "Triangle {triangle} of primitive {primitive} references vertex {vertex}, but the primitive has {vertex_count} vertices"
    )]
    InvalidVertexIndex {
        primitive: usize,
        triangle: usize,
        vertex: u32,
        vertex_count: usize,
    },

    #[error("Scene too large ({vertex_count} vertices, {triangle_count} triangles)")]
    TooManyTriangles {
        vertex_count: usize,
        triangle_count: usize,
    },

    #[error("Out of build memory: {0}")]
    PoolExhausted(#[from] PoolExhausted),

    #[error("Failed to start build threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl TriangleBvh {
    /// Builds a hierarchy over all triangles of the primitives.
    /// Blocks until the construction is finished.
    pub fn build(
        primitives: &[Arc<dyn Primitive>],
        settings: BuildSettings,
    ) -> Result<TriangleBvh, BuildError> {
        let start = Instant::now();

        let geometry = BuildGeometry::extract(primitives)?;
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_count.get())
            .thread_name(|i| format!("bvh-build-{i}"))
            .build()?;

        let (tree, nodes) = thread_pool.install(|| -> Result<_, BuildError> {
            let tree = building::build_tree(&geometry, &settings)?;
            let nodes = linearization::linearize(&tree, settings.parallel_threshold);
            Ok((tree, nodes))
        })?;

        let (bounds, depth) = match &tree.root {
            Some(root) => (root.bounds.clone(), root.depth),
            None => (WorldBox::empty(), 0),
        };

        let bvh = TriangleBvh {
            primitives: primitives.to_vec(),
            settings,
            bounds,
            depth,
            nodes,
            triangle_groups: tree.groups,
        };

        log::debug!(
            "Built hierarchy over {} triangles of {} primitives in {:?}",
            geometry.triangles.len(),
            primitives.len(),
            start.elapsed()
        );
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}", bvh.statistics());
        }

        Ok(bvh)
    }

    /// Rebuilds the hierarchy over a new set of primitives, reusing the current settings.
    /// Nothing of the previous content is kept. On error the hierarchy is left unchanged.
    pub fn construct(&mut self, primitives: &[Arc<dyn Primitive>]) -> Result<(), BuildError> {
        *self = Self::build(primitives, self.settings.clone())?;
        Ok(())
    }

    /// Union of bounds of all triangles, empty box if there are none.
    pub fn world_bounds(&self) -> WorldBox {
        self.bounds.clone()
    }

    pub fn primitive(&self, index: usize) -> Option<&Arc<dyn Primitive>> {
        self.primitives.get(index)
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for TriangleBvh {
    fn default() -> Self {
        TriangleBvh::with_settings(BuildSettings::default())
    }
}

impl TriangleBvh {
    /// Empty hierarchy that will use the given settings in `construct`.
    pub fn with_settings(settings: BuildSettings) -> Self {
        TriangleBvh {
            primitives: Vec::new(),
            settings,
            bounds: WorldBox::empty(),
            depth: 0,
            nodes: IndexVec::new(),
            triangle_groups: IndexVec::new(),
        }
    }
}

impl std::fmt::Debug for TriangleBvh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriangleBvh")
            .field("primitive_count", &self.primitives.len())
            .field("bounds", &self.bounds)
            .field("depth", &self.depth)
            .field("node_count", &self.nodes.len())
            .field("triangle_group_count", &self.triangle_groups.len())
            .finish()
    }
}
