use crate::{
    geometry::{Ray, SimdFloatType, SimdMaskType},
    util::simba::fma_dot,
};

use simba::simd::{SimdPartialOrd as _, SimdValue};

use super::{BarycentricCoordinates, Triangle, WorldPoint4};

impl Triangle<WorldPoint4> {
    /// Calculates ray intersection with the (two sided) triangle group.
    /// Returns mask of valid intersections, distance along ray, and barycentric uv coordinates.
    /// The ray's distance interval is not applied.
    /// Adapted from https://en.wikipedia.org/wiki/M%C3%B6ller%E2%80%93Trumbore_intersection_algorithm#Rust_implementation
    pub fn intersect(
        &self,
        ray: &Ray,
    ) -> (
        SimdMaskType,
        SimdFloatType,
        BarycentricCoordinates<SimdFloatType>,
    ) {
        let zero = SimdFloatType::splat(0.0);
        let one = SimdFloatType::splat(1.0);

        let origin = ray.origin.map(|x| SimdFloatType::splat(x));
        let direction = ray.direction.map(|x| SimdFloatType::splat(x));

        let e1 = self[1] - self[0];
        let e2 = self[2] - self[0];

        let ray_cross_e2 = direction.cross(&e2);
        let det = fma_dot(&e1, &ray_cross_e2);

        // Infinite for rays parallel to the triangle plane, that turns u, v and t into
        // NaNs or infinities and the comparisons below reject the lane.
        let inv_det = one / det;
        let s = origin - self[0];
        let u = inv_det * fma_dot(&s, &ray_cross_e2);

        let s_cross_e1 = s.cross(&e1);
        let v = inv_det * fma_dot(&direction, &s_cross_e1);
        let t = inv_det * fma_dot(&e2, &s_cross_e1);

        let mask = u.simd_ge(zero) & v.simd_ge(zero) & (u + v).simd_le(one) & t.simd_eq(t);
        (mask, t, BarycentricCoordinates { u, v })
    }
}
