//! Usage reporting.
//!
//! Reports are built into fixed-capacity buffers so that asking for
//! statistics never allocates.

use arrayvec::ArrayVec;
use block_pool::Pool;

use crate::registry::{MAX_POOLS, Registry};

/// Snapshot of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display(
    "{name} Block Size: {block_size} Block Count: {block_count} Blocks In Use: {blocks_in_use}"
)]
pub struct PoolUsage {
    pub name: &'static str,
    pub block_size: usize,
    pub block_count: usize,
    pub blocks_in_use: usize,
    pub allocations: usize,
    pub deallocations: usize,
}

impl From<&Pool> for PoolUsage {
    fn from(pool: &Pool) -> Self {
        Self {
            name: pool.name(),
            block_size: pool.block_size(),
            block_count: pool.block_count(),
            blocks_in_use: pool.blocks_in_use(),
            allocations: pool.allocations(),
            deallocations: pool.deallocations(),
        }
    }
}

/// Snapshot of every registered pool, in registration order.
pub type Usage = ArrayVec<PoolUsage, MAX_POOLS>;

pub(crate) fn collect(registry: &Registry) -> Usage {
    registry.iter().map(|(_, pool)| PoolUsage::from(pool)).collect()
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use block_pool::PoolConfig;

    use super::*;

    #[test]
    fn test_display() {
        let usage = PoolUsage {
            name: "xallocator",
            block_size: 64,
            block_count: 64,
            blocks_in_use: 3,
            allocations: 10,
            deallocations: 7,
        };
        assert_eq!(
            usage.to_string(),
            "xallocator Block Size: 64 Block Count: 64 Blocks In Use: 3"
        );
    }

    #[test]
    fn test_collect() {
        let mut registry = Registry::new();
        let id = registry
            .insert(Pool::new(PoolConfig::new(32).with_growth(4).with_name("a")))
            .unwrap();
        registry
            .insert(Pool::new(PoolConfig::new(16).with_name("b")))
            .unwrap();

        let ptr = registry[id].allocate(32).unwrap();
        let usage = collect(&registry);
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].name, "a");
        assert_eq!(usage[0].block_count, 4);
        assert_eq!(usage[0].blocks_in_use, 1);
        assert_eq!(usage[0].allocations, 1);
        assert_eq!(usage[1].name, "b");
        assert_eq!(usage[1].block_count, 0);

        unsafe { registry[id].deallocate(ptr) };
        let usage = collect(&registry);
        assert_eq!(usage[0].deallocations, 1);
        assert_eq!(usage[0].blocks_in_use, 0);
    }
}
