use std::num::NonZeroUsize;

use assert2::assert;
use bon::bon;

use super::MAX_DEPTH;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WorkerCount {
    #[default]
    Auto,
    Manual(NonZeroUsize),
}

impl WorkerCount {
    pub fn get(self) -> usize {
        match self {
            WorkerCount::Auto => num_cpus::get(),
            WorkerCount::Manual(num) => num.get(),
        }
    }
}

/// Tuning of the hierarchy construction.
/// None of the values affect query results, only the speed of building and traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildSettings {
    pub(super) max_depth: usize,
    pub(super) leaf_size: usize,
    pub(super) max_leaf_size: usize,
    pub(super) bucket_count: usize,
    pub(super) traversal_cost: f32,
    pub(super) intersection_cost: f32,
    pub(super) parallel_threshold: usize,
    pub(super) worker_count: WorkerCount,
}

#[bon]
impl BuildSettings {
    #[builder]
    pub fn new(
        /// Nodes at this depth become leaves regardless of their size.
        #[builder(default = MAX_DEPTH)]
        max_depth: usize,
        /// Ranges up to this size become leaves without evaluating any split.
        #[builder(default = 4)]
        leaf_size: usize,
        /// Largest range that may become a leaf when splitting is more expensive.
        #[builder(default = 16)]
        max_leaf_size: usize,
        /// Number of SAH bins per split.
        #[builder(default = 12)]
        bucket_count: usize,
        /// Cost of visiting an interior node, relative to `intersection_cost`.
        #[builder(default = 1.0)]
        traversal_cost: f32,
        /// Cost of intersecting one group of triangles.
        #[builder(default = 1.0)]
        intersection_cost: f32,
        /// Ranges at least this long build their children in parallel.
        #[builder(default = 4096)]
        parallel_threshold: usize,
        #[builder(default)]
        worker_count: WorkerCount,
    ) -> Self {
        assert!(max_depth >= 1);
        assert!(max_depth <= MAX_DEPTH);
        assert!(leaf_size >= 1);
        assert!(max_leaf_size >= leaf_size);
        assert!(bucket_count >= 2);
        assert!(traversal_cost >= 0.0);
        assert!(intersection_cost > 0.0);
        assert!(parallel_threshold >= 2);

        BuildSettings {
            max_depth,
            leaf_size,
            max_leaf_size,
            bucket_count,
            traversal_cost,
            intersection_cost,
            parallel_threshold,
            worker_count,
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings::builder().build()
    }
}
