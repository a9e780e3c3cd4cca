//! The fixed-block pool.

use core::{fmt, ptr::NonNull};

use snafu::{Location, OptionExt as _, Snafu, ensure};

use crate::{arena::ArenaList, free_list::FreeList};

/// Smallest stride a block can have: a free block must hold a list link.
const WORD: usize = size_of::<usize>();

/// Errors returned by [`Pool::allocate`].
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum PoolError {
    #[snafu(display("pool `{name}` reached its limit of {max_blocks} blocks"))]
    LimitReached {
        name: &'static str,
        max_blocks: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("pool `{name}` failed to obtain an arena of {blocks} blocks"))]
    OutOfMemory {
        name: &'static str,
        blocks: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "pool `{name}` cannot serve {requested_size} bytes, block size is {block_size}"
    ))]
    OversizedRequest {
        name: &'static str,
        block_size: usize,
        requested_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Construction parameters of a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size in bytes of every block handed out by the pool.
    pub block_size: usize,
    /// Number of blocks carved per arena. `0` carves one block at a time.
    pub growth: usize,
    /// Maximum number of blocks the pool may ever carve. `0` is unbounded.
    pub max_blocks: usize,
    /// Name used in diagnostics and usage reports.
    pub name: &'static str,
}

impl PoolConfig {
    /// Creates a configuration for an unbounded pool growing one block at a
    /// time.
    #[must_use]
    pub const fn new(block_size: usize) -> Self {
        Self {
            block_size,
            growth: 0,
            max_blocks: 0,
            name: "pool",
        }
    }

    #[must_use]
    pub const fn with_growth(mut self, growth: usize) -> Self {
        self.growth = growth;
        self
    }

    #[must_use]
    pub const fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    #[must_use]
    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

/// A fixed-block allocator for exactly one block size.
///
/// Blocks are carved from arenas obtained from the global heap. An arena holds
/// [`PoolConfig::growth`] blocks (at least one), and a new arena is requested
/// only when the free list is empty. Arenas are never returned to the heap
/// before the pool is dropped.
///
/// # Performance Characteristics
///
/// - O(1) allocation, except when a new arena has to be carved
/// - O(1) deallocation
/// - No per-block overhead besides the padding up to a machine word
pub struct Pool {
    config: PoolConfig,
    stride: usize,
    free_list: FreeList,
    arenas: ArenaList,
    block_count: usize,
    blocks_in_use: usize,
    allocations: usize,
    deallocations: usize,
}

unsafe impl Send for Pool {}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.config.name)
            .field("block_size", &self.config.block_size)
            .field("block_count", &self.block_count)
            .field("blocks_in_use", &self.blocks_in_use)
            .field("arenas", &self.arenas.count())
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Creates an empty pool. No memory is requested until the first
    /// allocation.
    ///
    /// # Panics
    ///
    /// Panics if the block size is zero.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        assert!(config.block_size > 0, "block size must not be zero");
        let stride = config.block_size.max(WORD).next_multiple_of(WORD);
        Self {
            config,
            stride,
            free_list: FreeList::new(),
            arenas: ArenaList::new(),
            block_count: 0,
            blocks_in_use: 0,
            allocations: 0,
            deallocations: 0,
        }
    }

    /// Creates a pool and immediately carves its first arena.
    ///
    /// With `growth == max_blocks` the whole capacity is reserved up front and
    /// the pool never requests memory again.
    pub fn with_reserved(config: PoolConfig) -> Result<Self, PoolError> {
        let mut pool = Self::new(config);
        let first = pool.grow()?;
        unsafe {
            pool.free_list.push(first);
        }
        Ok(pool)
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Number of blocks carved so far, free or in use.
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    #[must_use]
    pub const fn blocks_in_use(&self) -> usize {
        self.blocks_in_use
    }

    /// Number of successful allocations over the lifetime of the pool.
    #[must_use]
    pub const fn allocations(&self) -> usize {
        self.allocations
    }

    /// Number of deallocations over the lifetime of the pool.
    #[must_use]
    pub const fn deallocations(&self) -> usize {
        self.deallocations
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.config.name
    }

    /// Returns `true` if `ptr` is the start of a block carved by this pool.
    ///
    /// This walks every arena and is meant for assertions and tests.
    #[must_use]
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.arenas.contains_block(ptr, self.stride)
    }

    /// Allocates one block able to hold `requested_size` bytes.
    ///
    /// The returned block is aligned to `usize` and is
    /// [`block_size`](Self::block_size) bytes long.
    pub fn allocate(&mut self, requested_size: usize) -> Result<NonNull<u8>, PoolError> {
        ensure!(
            requested_size <= self.config.block_size,
            pool_error::OversizedRequestSnafu {
                name: self.config.name,
                block_size: self.config.block_size,
                requested_size,
            }
        );

        let block = match self.free_list.pop() {
            Some(block) => block,
            None => self.grow()?,
        };
        self.blocks_in_use += 1;
        self.allocations += 1;
        Ok(block)
    }

    /// Returns a block to the pool.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `ptr` was returned by [`allocate`](Self::allocate) on this pool
    /// - `ptr` has not been deallocated since
    /// - the block is not accessed after this call
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        debug_assert!(
            self.owns(ptr),
            "block {ptr:p} does not belong to pool `{}`",
            self.config.name
        );
        debug_assert!(self.blocks_in_use > 0, "pool `{}` has no block in use", self.config.name);

        unsafe {
            self.free_list.push(ptr);
        }
        self.blocks_in_use -= 1;
        self.deallocations += 1;
    }

    /// Carves a new arena, queues all but its first block on the free list and
    /// returns the first block.
    fn grow(&mut self) -> Result<NonNull<u8>, PoolError> {
        let mut blocks = self.config.growth.max(1);
        if self.config.max_blocks != 0 {
            let remaining = self.config.max_blocks.saturating_sub(self.block_count);
            ensure!(
                remaining > 0,
                pool_error::LimitReachedSnafu {
                    name: self.config.name,
                    max_blocks: self.config.max_blocks,
                }
            );
            blocks = blocks.min(remaining);
        }

        let start = self
            .stride
            .checked_mul(blocks)
            .and_then(|size| self.arenas.push_new(size))
            .context(pool_error::OutOfMemorySnafu {
                name: self.config.name,
                blocks,
            })?;

        // Queue from the top so that lower addresses are handed out first.
        for i in (1..blocks).rev() {
            unsafe {
                self.free_list.push(start.add(i * self.stride));
            }
        }
        self.block_count += blocks;
        debug_assert_eq!(
            self.free_list.len() + self.blocks_in_use + 1,
            self.block_count
        );
        Ok(start)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    struct TestPool {
        pool: Pool,
    }

    impl TestPool {
        fn new(config: PoolConfig) -> Self {
            Self {
                pool: Pool::new(config),
            }
        }

        fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, PoolError> {
            let ptr = self.pool.allocate(size)?;
            unsafe {
                ptr.write_bytes(0x33, self.pool.block_size());
            }
            Ok(ptr)
        }

        unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
            unsafe {
                for i in 0..self.pool.block_size() {
                    assert_eq!(ptr.add(i).read(), 0x33);
                }
                ptr.write_bytes(0x55, self.pool.block_size());
                self.pool.deallocate(ptr);
            }
        }
    }

    #[test]
    fn test_empty_pool() {
        let pool = Pool::new(PoolConfig::new(64).with_name("empty"));
        assert_eq!(pool.block_size(), 64);
        assert_eq!(pool.block_count(), 0);
        assert_eq!(pool.blocks_in_use(), 0);
        assert_eq!(pool.name(), "empty");
    }

    #[test]
    #[should_panic = "block size must not be zero"]
    fn test_zero_block_size() {
        let _ = Pool::new(PoolConfig::new(0));
    }

    #[test]
    fn test_basic_allocation() {
        let mut pool = TestPool::new(PoolConfig::new(64));
        let ptr = pool.allocate(64).unwrap();
        assert!(pool.pool.owns(ptr));
        assert_eq!(pool.pool.block_count(), 1);
        assert_eq!(pool.pool.blocks_in_use(), 1);

        unsafe { pool.deallocate(ptr) };
        assert_eq!(pool.pool.block_count(), 1);
        assert_eq!(pool.pool.blocks_in_use(), 0);
    }

    #[test]
    fn test_growth_increment() {
        let mut pool = TestPool::new(PoolConfig::new(32).with_growth(4));
        let ptrs = (0..5).map(|_| pool.allocate(32).unwrap()).collect::<Vec<_>>();
        assert_eq!(pool.pool.block_count(), 8);
        assert_eq!(pool.pool.blocks_in_use(), 5);

        // The first arena is handed out in address order.
        for pair in ptrs[..4].windows(2) {
            assert_eq!(pair[1].addr().get() - pair[0].addr().get(), 32);
        }

        for ptr in ptrs {
            unsafe { pool.deallocate(ptr) };
        }
        assert_eq!(pool.pool.blocks_in_use(), 0);
        assert_eq!(pool.pool.allocations(), 5);
        assert_eq!(pool.pool.deallocations(), 5);
    }

    #[test]
    fn test_block_reuse() {
        let mut pool = TestPool::new(PoolConfig::new(128).with_growth(2));
        let ptr1 = pool.allocate(100).unwrap();
        unsafe { pool.deallocate(ptr1) };
        let ptr2 = pool.allocate(100).unwrap();
        assert_eq!(ptr1, ptr2);
        assert_eq!(pool.pool.block_count(), 2);
        unsafe { pool.deallocate(ptr2) };
    }

    #[test]
    fn test_distinct_blocks() {
        let mut pool = TestPool::new(PoolConfig::new(16));
        let ptr1 = pool.allocate(16).unwrap();
        let ptr2 = pool.allocate(16).unwrap();
        let ptr3 = pool.allocate(16).unwrap();
        assert_ne!(ptr1, ptr2);
        assert_ne!(ptr2, ptr3);
        assert_ne!(ptr1, ptr3);
        unsafe {
            pool.deallocate(ptr1);
            pool.deallocate(ptr2);
            pool.deallocate(ptr3);
        }
    }

    #[test]
    fn test_odd_block_size_alignment() {
        let mut pool = TestPool::new(PoolConfig::new(396).with_growth(8));
        let ptrs = (0..8).map(|_| pool.allocate(396).unwrap()).collect::<Vec<_>>();
        for ptr in &ptrs {
            assert!(ptr.cast::<usize>().is_aligned());
        }
        for ptr in ptrs {
            unsafe { pool.deallocate(ptr) };
        }
    }

    #[test]
    fn test_tiny_block_size() {
        let mut pool = TestPool::new(PoolConfig::new(1).with_growth(4));
        let ptr1 = pool.allocate(1).unwrap();
        let ptr2 = pool.allocate(1).unwrap();
        assert_eq!(ptr2.addr().get() - ptr1.addr().get(), WORD);
        unsafe {
            pool.deallocate(ptr2);
            pool.deallocate(ptr1);
        }
    }

    #[test]
    fn test_limit_reached() {
        let mut pool = TestPool::new(PoolConfig::new(64).with_growth(3).with_max_blocks(4));
        let ptrs = (0..4).map(|_| pool.allocate(64).unwrap()).collect::<Vec<_>>();
        assert_eq!(pool.pool.block_count(), 4);

        let err = pool.allocate(64).unwrap_err();
        assert!(matches!(err, PoolError::LimitReached { max_blocks: 4, .. }));
        assert_eq!(pool.pool.blocks_in_use(), 4);

        // A freed block can be reused even though the limit is reached.
        let mut ptrs = ptrs.into_iter();
        let freed = ptrs.next().unwrap();
        unsafe { pool.deallocate(freed) };
        let again = pool.allocate(64).unwrap();
        assert_eq!(again, freed);

        unsafe { pool.deallocate(again) };
        for ptr in ptrs {
            unsafe { pool.deallocate(ptr) };
        }
    }

    #[test]
    fn test_oversized_request() {
        let mut pool = TestPool::new(PoolConfig::new(32));
        let err = pool.allocate(33).unwrap_err();
        assert!(matches!(
            err,
            PoolError::OversizedRequest {
                block_size: 32,
                requested_size: 33,
                ..
            }
        ));
        assert_eq!(pool.pool.block_count(), 0);
    }

    #[test]
    fn test_reserved_pool() {
        let config = PoolConfig::new(8).with_growth(32).with_max_blocks(32);
        let mut pool = Pool::with_reserved(config).unwrap();
        assert_eq!(pool.block_count(), 32);
        assert_eq!(pool.blocks_in_use(), 0);

        let ptrs = (0..32).map(|_| pool.allocate(8).unwrap()).collect::<Vec<_>>();
        assert!(pool.allocate(8).is_err());
        assert_eq!(pool.block_count(), 32);

        for ptr in ptrs {
            unsafe { pool.deallocate(ptr) };
        }
        assert_eq!(pool.blocks_in_use(), 0);
    }

    #[test]
    fn test_owns() {
        let mut pool = Pool::new(PoolConfig::new(64).with_growth(2));
        let mut other = Pool::new(PoolConfig::new(64).with_growth(2));
        let ptr = pool.allocate(64).unwrap();
        let foreign = other.allocate(64).unwrap();

        assert!(pool.owns(ptr));
        assert!(!pool.owns(foreign));
        assert!(!pool.owns(unsafe { ptr.add(8) }));

        unsafe {
            pool.deallocate(ptr);
            other.deallocate(foreign);
        }
    }

    #[test]
    fn test_debug_format() {
        let pool = Pool::new(PoolConfig::new(64).with_name("debug"));
        let s = format!("{pool:?}");
        assert!(s.contains("debug"));
        assert!(s.contains("64"));
    }
}
