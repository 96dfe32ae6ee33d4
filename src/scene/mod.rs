mod mesh;
pub mod triangle_bvh;

use crate::geometry::{BarycentricCoordinates, FloatType, Triangle, WorldPoint, WorldVector};

pub use mesh::{AlphaMask, ObjOpenError, TriangleMesh};

/// Indexed triangle geometry that can be put into a hierarchy.
pub trait Primitive: Send + Sync {
    fn positions(&self) -> &[WorldPoint];

    /// Vertex index triples into `positions()`.
    fn indices(&self) -> &[Triangle<u32>];

    fn vertex_count(&self) -> usize {
        self.positions().len()
    }

    fn triangle_count(&self) -> usize {
        self.indices().len()
    }

    /// True if the triangle's material needs a per-hit opacity check.
    fn is_alpha_tested(&self, _triangle: usize) -> bool {
        false
    }

    /// Opacity lookup for alpha tested triangles.
    fn is_opaque_at(&self, _triangle: usize, _uv: &BarycentricCoordinates<FloatType>) -> bool {
        true
    }
}

/// Closest hit found by `TriangleBvh::intersect`.
#[derive(Clone, Debug, PartialEq)]
pub struct Intersection {
    pub t: FloatType,
    pub point: WorldPoint,
    /// Index of the primitive in the slice the hierarchy was constructed from
    pub primitive: usize,
    /// Index of the triangle within the primitive
    pub triangle: usize,
    pub uv: BarycentricCoordinates<FloatType>,
    /// Unnormalized, follows the triangle winding
    pub geometric_normal: WorldVector,
}
