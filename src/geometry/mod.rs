mod aabb;
mod ray_box_intersection;
mod ray_triangle_intersection;
mod triangle;

use nalgebra::{Point2, Point3, Vector3};
use simba::simd::{WideBoolF32x4, WideF32x4};

pub use aabb::AABB;
pub use ray_box_intersection::RayIntersectionExt;
pub use triangle::{BarycentricCoordinates, Triangle};

pub type FloatType = f32;
pub type SimdFloatType = WideF32x4;
pub type SimdMaskType = WideBoolF32x4;

/// Width of the box groups in inner nodes and of the triangle groups in leaves.
pub const SIMD_LANES: usize = 4;

pub const EPSILON: FloatType = 1e-6;

pub type WorldPoint = Point3<FloatType>;
pub type WorldVector = Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;
pub type WorldPoint4 = Point3<SimdFloatType>;
pub type WorldVector4 = Vector3<SimdFloatType>;
pub type WorldBox4 = AABB<WorldPoint4>;
pub type TexturePoint = Point2<FloatType>;

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: WorldPoint,
    /// Normalized direction of the ray
    pub direction: WorldVector,

    /// Componentwise inverse of the ray direction
    /// Zeros in direction get turned into positive infinity regardless of the sign of the zero
    pub inv_direction: WorldVector,

    /// Valid distance interval along the ray, inclusive on both ends.
    pub min_t: FloatType,
    pub max_t: FloatType,
}

impl Ray {
    /// Creates a ray valid for all non-negative distances.
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        Self::with_interval(origin, direction, 0.0, FloatType::INFINITY)
    }

    /// Creates a ray that only reports intersections with distance in `min_t..=max_t`.
    pub fn with_interval(
        origin: WorldPoint,
        direction: WorldVector,
        min_t: FloatType,
        max_t: FloatType,
    ) -> Ray {
        assert2::debug_assert!(direction.norm_squared() > 0.0);
        let direction = direction.normalize();
        let inv_direction = direction.map(|x| if x == 0.0 { f32::INFINITY } else { 1.0 / x });

        Ray {
            origin,
            direction,
            inv_direction,
            min_t,
            max_t,
        }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction * distance
    }
}
