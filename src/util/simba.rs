use simba::simd::{SimdValue, WideBoolF32x4, WideF32x4};

use crate::geometry::{SimdFloatType, WorldVector4};

pub trait SimbaWorkarounds: SimdValue {
    fn is_nan(self) -> Self::SimdBool;

    fn infinity() -> Self;
    fn neg_infinity() -> Self;
}

impl SimbaWorkarounds for WideF32x4 {
    #[inline(always)]
    fn is_nan(self) -> Self::SimdBool {
        WideBoolF32x4(self.0.is_nan())
    }

    #[inline(always)]
    fn infinity() -> Self {
        Self::splat(f32::INFINITY)
    }

    #[inline(always)]
    fn neg_infinity() -> Self {
        Self::splat(f32::NEG_INFINITY)
    }
}

/// Lanewise minimum, unspecified result for NaN inputs.
#[inline(always)]
pub fn fast_min(a: SimdFloatType, b: SimdFloatType) -> SimdFloatType {
    WideF32x4(a.0.fast_min(b.0))
}

/// Lanewise maximum, unspecified result for NaN inputs.
#[inline(always)]
pub fn fast_max(a: SimdFloatType, b: SimdFloatType) -> SimdFloatType {
    WideF32x4(a.0.fast_max(b.0))
}

/// Converts a flat iterator of elements into an iterator of SIMD values and the number of
/// elements used in each.
/// If input iterator length is not divisible by T::LANES, remainder of the last
/// vector is filled with copies of the last element, so that every lane holds valid data.
pub fn simd_windows<T: SimdValue>(
    value: impl IntoIterator<Item = T::Element>,
) -> impl Iterator<Item = (T, usize)>
where
    T::Element: Clone,
{
    let mut iter = value.into_iter();
    std::iter::from_fn(move || {
        let first = iter.next()?;
        let mut t = T::splat(first);
        let mut used = 1;

        while used < T::LANES {
            let Some(v) = iter.next() else {
                break;
            };
            t.replace(used, v);
            used += 1;
        }

        if used < T::LANES {
            let last = t.extract(used - 1);
            for j in used..T::LANES {
                t.replace(j, last.clone());
            }
        }

        Some((t, used))
    })
}

pub fn fma_dot(a: &WorldVector4, b: &WorldVector4) -> SimdFloatType {
    WideF32x4(a.z.0.mul_add(b.z.0, a.y.0.mul_add(b.y.0, a.x.0 * b.x.0)))
}
