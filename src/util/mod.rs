mod memory_pool;
pub mod simba;
mod stats;

pub use memory_pool::{MemoryPool, PoolExhausted};
pub use stats::Stats;

/// Iterates indices of the set bits, lowest first.
/// Typically fed with a lane mask from `move_mask`.
pub fn bit_iter(bits: u32) -> BitIter {
    BitIter { bits }
}

#[derive(Copy, Clone, Debug)]
pub struct BitIter {
    bits: u32,
}

impl Iterator for BitIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.bits == 0 {
            return None;
        }
        let tz = self.bits.trailing_zeros() as usize;
        self.bits &= self.bits - 1;
        Some(tz)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.bits.count_ones() as usize;
        (count, Some(count))
    }
}

impl ExactSizeIterator for BitIter {}
