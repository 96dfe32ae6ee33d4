use simba::simd::SimdValue;

use crate::{
    geometry::{FloatType, Ray, WorldBox, WorldBox4},
    util::simba::{SimbaWorkarounds as _, fast_max, fast_min},
};

use super::SimdFloatType;

pub trait RayIntersectionExt {
    type DistanceType;
    /// Calculate first and last ray intersection with the box
    fn intersect(&self, ray: &Ray) -> (Self::DistanceType, Self::DistanceType);
}

impl RayIntersectionExt for WorldBox4 {
    type DistanceType = SimdFloatType;

    /// Calculates ray intersection with the box group.
    /// Returns minimum and maximum distance along the ray, ray intersects is min <= max.
    /// The ray's distance interval is not applied.
    fn intersect(&self, ray: &Ray) -> (SimdFloatType, SimdFloatType) {
        let ray_origin = ray.origin.map(|x| SimdFloatType::splat(x));
        let ray_inv_direction = ray.inv_direction.map(|x| SimdFloatType::splat(x));

        // Componentwise distances along the ray to the box's min and max corners
        // The multiplication is NAN if the ray is starting inside the slab bounding plane
        // and is parallel to it. In this case we blend to +-infinity, so that the range becomes infinite
        let to_box_min = (self.min - ray_origin)
            .component_mul(&ray_inv_direction)
            .map(|x| SimdFloatType::neg_infinity().select(x.is_nan(), x));
        let to_box_max = (self.max - ray_origin)
            .component_mul(&ray_inv_direction)
            .map(|x| SimdFloatType::infinity().select(x.is_nan(), x));

        // Correctly ordered (min_t <= max_t)
        let componentwise_min_t = to_box_min.zip_map(&to_box_max, fast_min);
        let componentwise_max_t = to_box_min.zip_map(&to_box_max, fast_max);

        let min_t = fast_max(
            componentwise_min_t.x,
            fast_max(componentwise_min_t.y, componentwise_min_t.z),
        );
        let max_t = fast_min(
            componentwise_max_t.x,
            fast_min(componentwise_max_t.y, componentwise_max_t.z),
        );

        (min_t, max_t)
    }
}

impl RayIntersectionExt for WorldBox {
    type DistanceType = FloatType;

    /// Scalar version of the slab test, used for the whole-hierarchy bounds.
    /// Same NaN handling as the vectorized one.
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType) {
        let mut min_t = FloatType::NEG_INFINITY;
        let mut max_t = FloatType::INFINITY;

        for axis in 0..3 {
            let t1 = (self.min[axis] - ray.origin[axis]) * ray.inv_direction[axis];
            let t2 = (self.max[axis] - ray.origin[axis]) * ray.inv_direction[axis];
            let t1 = if t1.is_nan() { FloatType::NEG_INFINITY } else { t1 };
            let t2 = if t2.is_nan() { FloatType::INFINITY } else { t2 };

            min_t = min_t.max(t1.min(t2));
            max_t = max_t.min(t1.max(t2));
        }

        (min_t, max_t)
    }
}
