use crate::base::dnserror::DnsError;
use std::fmt;
use std::mem;

/// Handle to a block inside a [`Pool`].
///
/// The generation changes every time the block is freed, so a handle kept
/// past `free` no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    index: u32,
    generation: u32,
}

impl BlockId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

struct Block<T> {
    value: T,
    generation: u32,
    in_use: bool,
}

/// Usage snapshot of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub label: &'static str,
    pub capacity: usize,
    pub in_use: usize,
}

impl PoolStats {
    pub fn available(&self) -> usize {
        self.capacity - self.in_use
    }
}

/// Fixed block-size, fixed-capacity allocator.
///
/// Every block is built up front by `new`; `get` and `free` only move
/// indices on and off a free stack, so neither allocates nor fragments.
/// Running out of blocks is reported as [`DnsError::MemAlloc`].
pub struct Pool<T> {
    label: &'static str,
    blocks: Vec<Block<T>>,
    free: Vec<u32>,
}

impl<T> Pool<T> {
    /// Build a pool of `capacity` blocks, each initialised by `init`.
    pub fn new(label: &'static str, capacity: usize, mut init: impl FnMut() -> T) -> Self {
        let blocks = (0..capacity)
            .map(|_| Block { value: init(), generation: 0, in_use: false })
            .collect();
        // Lowest index is handed out first.
        let free = (0..capacity as u32).rev().collect();
        Self { label, blocks, free }
    }

    /// Take a block out of the pool.
    pub fn get(&mut self) -> Result<BlockId, DnsError> {
        let Some(index) = self.free.pop() else {
            tracing::trace!(pool = self.label, capacity = self.blocks.len(), "pool exhausted");
            return Err(DnsError::MemAlloc);
        };
        let block = &mut self.blocks[index as usize];
        block.in_use = true;
        Ok(BlockId { index, generation: block.generation })
    }

    /// Return a block to the pool.
    ///
    /// A stale or already freed handle is a programming error and yields
    /// [`DnsError::Fault`] without touching the pool.
    pub fn free(&mut self, id: BlockId) -> Result<(), DnsError> {
        let Some(block) = self.blocks.get_mut(id.index()) else {
            return Err(DnsError::Fault);
        };
        if !block.in_use || block.generation != id.generation {
            tracing::warn!(pool = self.label, index = id.index, "free of stale block");
            return Err(DnsError::Fault);
        }
        block.in_use = false;
        block.generation = block.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(())
    }

    /// Whether `id` refers to a live block.
    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks
            .get(id.index())
            .is_some_and(|block| block.in_use && block.generation == id.generation)
    }

    pub fn block(&self, id: BlockId) -> Option<&T> {
        self.blocks
            .get(id.index())
            .filter(|block| block.in_use && block.generation == id.generation)
            .map(|block| &block.value)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut T> {
        self.blocks
            .get_mut(id.index())
            .filter(|block| block.in_use && block.generation == id.generation)
            .map(|block| &mut block.value)
    }

    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    pub fn in_use(&self) -> usize {
        self.blocks.len() - self.free.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats { label: self.label, capacity: self.capacity(), in_use: self.in_use() }
    }

    /// Bytes reserved by the block table and the free stack.
    pub fn footprint(&self) -> usize {
        self.blocks.len() * (mem::size_of::<Block<T>>() + mem::size_of::<u32>())
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("label", &self.label)
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_until_exhausted() {
        let mut pool = Pool::new("test", 2, || 0u32);
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert_ne!(a, b);
        assert!(pool.is_exhausted());
        assert_eq!(pool.get(), Err(DnsError::MemAlloc));
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_free_and_reuse() {
        let mut pool = Pool::new("test", 1, || 0u32);
        let a = pool.get().unwrap();
        *pool.block_mut(a).unwrap() = 7;
        pool.free(a).unwrap();

        let b = pool.get().unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        // Stale handle no longer resolves, the value itself is left to the caller.
        assert!(pool.block(a).is_none());
        assert_eq!(pool.block(b), Some(&7));
    }

    #[test]
    fn test_double_free_is_fault() {
        let mut pool = Pool::new("test", 2, || ());
        let a = pool.get().unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.free(a), Err(DnsError::Fault));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_stats() {
        let mut pool = Pool::new("names", 3, || [0u8; 8]);
        pool.get().unwrap();
        let stats = pool.stats();
        assert_eq!(stats.label, "names");
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.available(), 2);
        assert!(pool.footprint() >= 3 * 8);
    }

    #[test]
    fn test_zero_capacity() {
        let mut pool: Pool<u8> = Pool::new("empty", 0, || 0);
        assert_eq!(pool.get(), Err(DnsError::MemAlloc));
    }
}
