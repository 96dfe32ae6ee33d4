use std::ops::Range;

use index_vec::{Idx, IndexVec};
use parking_lot::Mutex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("memory pool exhausted ({limit} items)")]
pub struct PoolExhausted {
    pub limit: usize,
}

/// Append-only arena shared between build tasks.
/// Items are addressed by index and only released all at once.
#[derive(Debug)]
pub struct MemoryPool<I: Idx, T> {
    items: Mutex<IndexVec<I, T>>,
    limit: usize,
}

impl<I: Idx, T> MemoryPool<I, T> {
    /// Creates a pool holding at most `limit` items.
    pub fn with_limit(limit: usize) -> Self {
        MemoryPool {
            items: Mutex::new(IndexVec::new()),
            limit,
        }
    }

    pub fn allocate(&self, value: T) -> Result<I, PoolExhausted> {
        let mut items = self.items.lock();
        if items.len() >= self.limit {
            return Err(PoolExhausted { limit: self.limit });
        }
        Ok(items.push(value))
    }

    /// Allocates all values as one contiguous run.
    pub fn allocate_many(
        &self,
        values: impl IntoIterator<Item = T>,
    ) -> Result<Range<I>, PoolExhausted> {
        let values = values.into_iter();
        let mut items = self.items.lock();
        let start = items.len();
        items.extend(values);
        if items.len() > self.limit {
            items.truncate(start);
            return Err(PoolExhausted { limit: self.limit });
        }
        Ok(I::from_usize(start)..I::from_usize(items.len()))
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Drops all items, previously returned indices become invalid.
    pub fn reset(&mut self) {
        self.items.get_mut().clear();
    }

    pub fn into_inner(self) -> IndexVec<I, T> {
        self.items.into_inner()
    }
}
