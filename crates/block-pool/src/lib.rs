//! Fixed-block pool allocator.
//!
//! A [`Pool`] hands out blocks of exactly one size. Blocks are carved from
//! arenas requested from the global heap, a configurable number of blocks at
//! a time, and recycled through an intrusive free list, so allocation and
//! deallocation are O(1) and a pool never fragments.
//!
//! The crate is `no_std` and only needs `alloc` for the arenas themselves.
//!
//! # Usage Example
//!
//! ```rust
//! use block_pool::{Pool, PoolConfig};
//!
//! let mut pool = Pool::new(PoolConfig::new(64).with_growth(16).with_name("small"));
//! assert_eq!(pool.block_count(), 0);
//!
//! let block = pool.allocate(48).unwrap();
//! assert_eq!(pool.block_count(), 16);
//! assert_eq!(pool.blocks_in_use(), 1);
//!
//! unsafe {
//!     pool.deallocate(block);
//! }
//! assert_eq!(pool.blocks_in_use(), 0);
//! ```
//!
//! # Memory Layout
//!
//! ```text
//! Arena:
//! ┌──────────────────────┬──────────┬──────────┬─────┬──────────┐
//! │ ArenaHeader (16 B)   │ block 0  │ block 1  │ ... │ block n  │
//! │ ┌──────┬───────────┐ │          │          │     │          │
//! │ │ next │ size      │ │ <stride> │ <stride> │     │ <stride> │
//! │ └──────┴───────────┘ │          │          │     │          │
//! └──────────────────────┴──────────┴──────────┴─────┴──────────┘
//! ```
//!
//! The stride is the block size rounded up to a machine word, so every block
//! starts word-aligned even when the configured block size is not a power of
//! two.
//!
//! # Thread Safety
//!
//! A pool is `Send` but not `Sync`. Concurrent use needs an external lock.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub use self::pool::{Pool, PoolConfig, PoolError};

mod arena;
mod free_list;
mod pool;
