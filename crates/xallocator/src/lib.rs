//! Size-class front end over fixed-block pools.
//!
//! [`XAllocator`] routes every request to the [`Pool`](block_pool::Pool) serving its size
//! class, so allocation and deallocation are O(1) and the heap never
//! fragments. A one-word header in front of every block names the pool that
//! owns it, which lets [`deallocate`](XAllocator::deallocate) find the pool
//! without being told the size.
//!
//! The deployment mode is the [`PoolStrategy`] type parameter:
//!
//! - [`DynamicPools`] creates pools on first use and drops them at teardown.
//! - [`StaticPools`] serves a fixed table of pools reserved up front.
//!
//! # Usage Example
//!
//! ```rust
//! use xallocator::{DynamicPools, XAllocator};
//!
//! static ALLOCATOR: XAllocator<DynamicPools> = unsafe { XAllocator::new(DynamicPools::new()) };
//!
//! unsafe { ALLOCATOR.init() };
//!
//! let ptr = ALLOCATOR.allocate(100).unwrap();
//! let ptr = unsafe { ALLOCATOR.resize(Some(ptr), 1000) }.unwrap();
//! assert!(unsafe { ALLOCATOR.usable_size(ptr.unwrap()) } >= 1000);
//! unsafe { ALLOCATOR.deallocate(ptr) };
//!
//! assert!(ALLOCATOR.report_usage().iter().all(|pool| pool.blocks_in_use == 0));
//! unsafe { ALLOCATOR.destroy() };
//! ```
//!
//! # Thread Safety
//!
//! Every registry and pool access is serialized by one spin lock. The lock
//! only starts excluding threads after [`init`](XAllocator::init), so `init`
//! must run before a second thread touches the allocator, and
//! [`destroy`](XAllocator::destroy) after every other thread stopped.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use core::ptr::{self, NonNull};

use block_pool::PoolError;
use snafu::{Location, OptionExt as _, ResultExt as _, Snafu};

pub use self::{
    registry::{MAX_POOLS, PoolId, Registry},
    stats::{PoolUsage, Usage},
    strategy::{DynamicPools, PoolStrategy, Resolved, StaticPoolDecl, StaticPools},
};
use self::{guard::BootstrapMutex, header::HEADER_SIZE};

pub mod error;
pub mod global;
pub mod guard;
pub mod header;
pub mod registry;
pub mod size_class;
pub mod stats;
pub mod strategy;

/// Misconfiguration of the size classes. Always fatal.
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum ConfigurationError {
    #[snafu(display(
        "cannot register block size {block_size}: all {capacity} size classes are in use"
    ))]
    RegistryFull {
        block_size: usize,
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no static pool is declared for block size {block_size}"))]
    UndeclaredSizeClass {
        block_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block size {block_size} is declared twice"))]
    DuplicateSizeClass {
        block_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to reserve the static pool for block size {block_size}"))]
    ReserveStaticPool {
        block_size: usize,
        #[snafu(implicit)]
        location: Location,
        source: PoolError,
    },
}

/// Failure to serve an allocation. The allocator state is left unchanged.
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum AllocError {
    #[snafu(display("no size class can hold {size} bytes"))]
    SizeOverflow {
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("pool for block size {block_size} is exhausted"))]
    PoolExhausted {
        block_size: usize,
        #[snafu(implicit)]
        location: Location,
        source: PoolError,
    },
}

#[derive(Debug)]
struct State<S> {
    registry: Registry,
    strategy: S,
}

/// The size-class allocator.
#[derive(Debug)]
pub struct XAllocator<S> {
    state: BootstrapMutex<State<S>>,
}

impl<S> XAllocator<S>
where
    S: PoolStrategy,
{
    /// Creates an allocator with no pools.
    ///
    /// # Safety
    ///
    /// Until [`init`](Self::init) returns, the allocator must be used by one
    /// thread at a time.
    pub const unsafe fn new(strategy: S) -> Self {
        let state = State {
            registry: Registry::new(),
            strategy,
        };
        Self {
            state: unsafe { BootstrapMutex::new(state) },
        }
    }

    /// Prepares the pools of the deployment mode and enables locking.
    ///
    /// # Safety
    ///
    /// Must be called once, before any second thread uses the allocator.
    ///
    /// # Panics
    ///
    /// Panics if the pool table cannot be set up.
    pub unsafe fn init(&self) {
        let res = {
            let mut state = self.state.lock();
            let State { registry, strategy } = &mut *state;
            strategy.prepare(registry)
        };
        if let Err(err) = res {
            error::report(err);
        }
        unsafe { self.state.initialize() };
        log::debug!("xallocator initialized");
    }

    /// Tears the pools down and returns to the single-threaded state.
    ///
    /// In dynamic mode every pool is dropped, so every outstanding pointer
    /// becomes dangling.
    ///
    /// # Safety
    ///
    /// Must be called once, after every other thread stopped using the
    /// allocator.
    pub unsafe fn destroy(&self) {
        let remaining = {
            let mut state = self.state.lock();
            let State { registry, strategy } = &mut *state;
            strategy.teardown(registry);
            registry.len()
        };
        unsafe { self.state.destroy() };
        log::debug!("xallocator destroyed, {remaining} pools kept");
    }

    /// Allocates at least `size` bytes.
    ///
    /// The returned pointer is aligned to `usize`.
    ///
    /// # Panics
    ///
    /// Panics if the size class cannot be registered.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let block_size =
            size_class::block_size_for(size).context(alloc_error::SizeOverflowSnafu { size })?;

        let res = {
            let mut state = self.state.lock();
            let State { registry, strategy } = &mut *state;
            strategy
                .get_or_create(registry, block_size)
                .map(|resolved| {
                    let id = resolved.id();
                    let raw = registry[id].allocate(size + HEADER_SIZE);
                    // A pool that never served a block is not kept.
                    if raw.is_err() && resolved.is_created() {
                        registry.discard_last(id);
                    }
                    (resolved, raw)
                })
        };
        let (resolved, raw) = res.unwrap_or_else(|err| error::report(err));
        if resolved.is_created() && raw.is_ok() {
            log::debug!(
                "created pool {} for block size {block_size}",
                resolved.id()
            );
        }
        let raw = raw.context(alloc_error::PoolExhaustedSnafu { block_size })?;
        Ok(unsafe { header::wrap(raw, resolved.id()) })
    }

    /// Returns a block to its pool. `None` is ignored.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `ptr` was returned by this allocator and has not been freed since
    /// - the block is not accessed after this call
    pub unsafe fn deallocate(&self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };
        let (owner, raw) = unsafe { (header::owner_of(ptr), header::raw_of(ptr)) };

        let mut state = self.state.lock();
        let pool = state.registry.get_mut(owner);
        debug_assert!(pool.is_some(), "block {ptr:p} names unknown pool {owner}");
        if let Some(pool) = pool {
            unsafe { pool.deallocate(raw) };
        }
    }

    /// Resizes a block, moving its contents.
    ///
    /// - `None` allocates `new_size` bytes.
    /// - A `new_size` of `0` frees `ptr` and returns `Ok(None)`.
    /// - Otherwise the contents are copied up to the smaller of both sizes
    ///   into a new block and `ptr` is freed.
    ///
    /// On error `ptr` is left untouched.
    ///
    /// # Safety
    ///
    /// Same as [`deallocate`](Self::deallocate).
    pub unsafe fn resize(
        &self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(old) = ptr else {
            return self.allocate(new_size).map(Some);
        };
        if new_size == 0 {
            unsafe { self.deallocate(Some(old)) };
            return Ok(None);
        }

        let new = self.allocate(new_size)?;
        unsafe {
            let len = self.usable_size(old).min(new_size);
            ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), len);
            self.deallocate(Some(old));
        }
        Ok(Some(new))
    }

    /// Number of payload bytes the block behind `ptr` can hold.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not freed since.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        let owner = unsafe { header::owner_of(ptr) };
        let block_size = self.state.lock().registry[owner].block_size();
        block_size - HEADER_SIZE
    }

    /// Snapshot of every registered pool.
    #[must_use]
    pub fn report_usage(&self) -> Usage {
        stats::collect(&self.state.lock().registry)
    }

    /// Logs one line per registered pool at info level.
    pub fn log_usage(&self) {
        let usage = self.report_usage();
        for pool in &usage {
            log::info!("{pool}");
        }
    }
}

impl<S> XAllocator<S> {
    /// Returns `true` between [`init`](Self::init) and
    /// [`destroy`](Self::destroy).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// Returns the pool owning a client pointer, for diagnostics.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not freed since.
    pub unsafe fn owner_of(&self, ptr: NonNull<u8>) -> PoolId {
        unsafe { header::owner_of(ptr) }
    }
}
