use arrayvec::ArrayVec;
use simba::simd::{SimdPartialOrd as _, SimdValue as _};

use super::{CHILD_LANES, MAX_DEPTH, Node, NodeIdx, TriangleBvh, TriangleGroupIdx};
use crate::{
    geometry::{BarycentricCoordinates, FloatType, Ray, RayIntersectionExt as _, SimdFloatType},
    scene::Intersection,
    util::bit_iter,
};

/// Pending nodes with their entry distance.
/// Every level of the tree leaves at most one sibling behind.
type Stack = ArrayVec<(NodeIdx, FloatType), { 2 * MAX_DEPTH }>;

#[derive(Clone, Debug)]
struct LeafHit {
    t: FloatType,
    uv: BarycentricCoordinates<FloatType>,
    group: TriangleGroupIdx,
    lane: usize,
}

impl TriangleBvh {
    /// Finds the closest triangle hit within the ray's distance interval.
    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        let mut stack = Stack::new();
        stack.push((NodeIdx::from_usize(0), self.entry_distance(ray)?));

        let mut best: Option<LeafHit> = None;

        while let Some((index, node_t1)) = stack.pop() {
            let max_t = best.as_ref().map_or(ray.max_t, |hit| hit.t);
            if node_t1 > max_t {
                // Something closer than the whole node was already found
                continue;
            }

            let node = &self.nodes[index];
            if node.is_leaf() {
                self.intersect_triangles(node, ray, &mut best);
            } else {
                let (t1, hit_mask) = node.intersect_children(ray, max_t);
                let first = (index + 1, t1.extract(0));
                let second = (NodeIdx::from_raw(node.offset), t1.extract(1));
                match hit_mask {
                    0b01 => stack.push(first),
                    0b10 => stack.push(second),
                    0b11 => {
                        // Nearer child goes last, to be popped first
                        if first.1 <= second.1 {
                            stack.push(second);
                            stack.push(first);
                        } else {
                            stack.push(first);
                            stack.push(second);
                        }
                    }
                    _ => {}
                }
            }
        }

        let best = best?;
        let group = &self.triangle_groups[best.group];
        let triangle_ref = group.refs[best.lane];
        Some(Intersection {
            t: best.t,
            point: ray.point_at(best.t),
            primitive: triangle_ref.primitive as usize,
            triangle: triangle_ref.triangle as usize,
            uv: best.uv,
            geometric_normal: group.geometry.extract(best.lane).normal(),
        })
    }

    /// Returns true if any triangle is hit within the ray's distance interval.
    pub fn occluded(&self, ray: &Ray) -> bool {
        let mut stack = ArrayVec::<NodeIdx, { 2 * MAX_DEPTH }>::new();
        if self.entry_distance(ray).is_none() {
            return false;
        }
        stack.push(NodeIdx::from_usize(0));

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                if self.any_triangle_hit(node, ray) {
                    return true;
                }
            } else {
                let (_t1, hit_mask) = node.intersect_children(ray, ray.max_t);
                if hit_mask & 0b01 != 0 {
                    stack.push(index + 1);
                }
                if hit_mask & 0b10 != 0 {
                    stack.push(NodeIdx::from_raw(node.offset));
                }
            }
        }

        false
    }

    /// Distance at which the ray enters the whole hierarchy, None if it misses.
    fn entry_distance(&self, ray: &Ray) -> Option<FloatType> {
        if self.is_empty() {
            return None;
        }

        let (t1, t2) = self.bounds.intersect(ray);
        let t1 = t1.max(ray.min_t);
        let t2 = t2.min(ray.max_t);
        (t1 <= t2).then_some(t1)
    }

    fn intersect_triangles(&self, node: &Node, ray: &Ray, best: &mut Option<LeafHit>) {
        let min_t = SimdFloatType::splat(ray.min_t);

        for group_index in node.triangle_groups() {
            let group = &self.triangle_groups[group_index];
            let max_t = best.as_ref().map_or(ray.max_t, |hit| hit.t);

            let (mask, t, uv) = group.geometry.intersect(ray);
            let mask = mask & t.simd_ge(min_t) & t.simd_le(SimdFloatType::splat(max_t));

            for lane in bit_iter(mask.0.move_mask() as u32) {
                let t = t.extract(lane);
                // Strict comparison also drops the repeated padding lanes
                if best.as_ref().is_some_and(|hit| t >= hit.t) {
                    continue;
                }

                let uv = uv.extract(lane);
                let triangle_ref = group.refs[lane];
                if triangle_ref.alpha_tested
                    && !self.primitives[triangle_ref.primitive as usize]
                        .is_opaque_at(triangle_ref.triangle as usize, &uv)
                {
                    continue;
                }

                *best = Some(LeafHit {
                    t,
                    uv,
                    group: group_index,
                    lane,
                });
            }
        }
    }

    fn any_triangle_hit(&self, node: &Node, ray: &Ray) -> bool {
        let min_t = SimdFloatType::splat(ray.min_t);
        let max_t = SimdFloatType::splat(ray.max_t);

        node.triangle_groups().any(|group_index| {
            let group = &self.triangle_groups[group_index];
            let (mask, t, uv) = group.geometry.intersect(ray);
            let mask = mask & t.simd_ge(min_t) & t.simd_le(max_t);

            bit_iter(mask.0.move_mask() as u32).any(|lane| {
                let triangle_ref = group.refs[lane];
                !triangle_ref.alpha_tested
                    || self.primitives[triangle_ref.primitive as usize]
                        .is_opaque_at(triangle_ref.triangle as usize, &uv.extract(lane))
            })
        })
    }
}

impl Node {
    /// Tests both children boxes at once.
    /// Returns entry distances and bit mask of children hit within `ray.min_t..=max_t`
    fn intersect_children(&self, ray: &Ray, max_t: FloatType) -> (SimdFloatType, u32) {
        let (t1, t2) = self.child_bounds.intersect(ray);
        let t1 = t1.simd_max(SimdFloatType::splat(ray.min_t));
        let t2 = t2.simd_min(SimdFloatType::splat(max_t));
        let mask = t1.simd_le(t2).0.move_mask() as u32 & CHILD_LANES;
        (t1, mask)
    }
}
