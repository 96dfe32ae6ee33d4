pub mod geometry;
pub mod scene;
mod util;

pub use scene::triangle_bvh::{
    BuildError, BuildSettings, BvhStatistics, MAX_DEPTH, PoolExhausted, Stats, TriangleBvh,
    WorkerCount,
};
pub use scene::{AlphaMask, Intersection, ObjOpenError, Primitive, TriangleMesh};
pub use util::MemoryPool;
