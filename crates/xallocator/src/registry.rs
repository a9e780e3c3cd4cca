//! The size-class registry.
//!
//! A fixed-capacity, append-only list of pools with pairwise distinct block
//! sizes. Populated slots always form a contiguous prefix, and a pool keeps
//! its slot until the registry is cleared, so the slot index is a stable
//! identity for the pool.

use core::ops::{Index, IndexMut};

use arrayvec::ArrayVec;
use block_pool::Pool;
use snafu::ensure;

use crate::{ConfigurationError, configuration_error};

/// Maximum number of size classes a registry can hold.
pub const MAX_POOLS: usize = 15;

/// Identity of a pool: its slot in the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
#[display("#{_0}")]
pub struct PoolId(usize);

impl PoolId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct Registry {
    pools: ArrayVec<Pool, MAX_POOLS>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pools: ArrayVec::new_const(),
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.pools.is_full()
    }

    /// Returns the pool serving exactly `block_size`.
    #[must_use]
    pub fn find(&self, block_size: usize) -> Option<PoolId> {
        self.pools
            .iter()
            .position(|pool| pool.block_size() == block_size)
            .map(PoolId)
    }

    /// Appends `pool` to the registry.
    ///
    /// Fails if a pool with the same block size is already registered or if
    /// every slot is taken.
    pub fn insert(&mut self, pool: Pool) -> Result<PoolId, ConfigurationError> {
        let block_size = pool.block_size();
        ensure!(
            self.find(block_size).is_none(),
            configuration_error::DuplicateSizeClassSnafu { block_size }
        );
        ensure!(
            !self.pools.is_full(),
            configuration_error::RegistryFullSnafu {
                block_size,
                capacity: MAX_POOLS,
            }
        );

        let id = PoolId(self.pools.len());
        self.pools.push(pool);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(id.0)
    }

    pub fn get_mut(&mut self, id: PoolId) -> Option<&mut Pool> {
        self.pools.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &Pool)> {
        self.pools
            .iter()
            .enumerate()
            .map(|(index, pool)| (PoolId(index), pool))
    }

    /// Drops the most recently inserted pool, which must be `id`.
    ///
    /// Only the newest pool can be removed, so every other [`PoolId`] keeps
    /// naming the same pool.
    pub(crate) fn discard_last(&mut self, id: PoolId) {
        debug_assert_eq!(id.0 + 1, self.pools.len(), "pool {id} is not the newest");
        if id.0 + 1 == self.pools.len() {
            self.pools.pop();
        }
    }

    /// Drops every pool, returning their arenas to the heap.
    pub fn clear(&mut self) {
        self.pools.clear();
    }
}

impl Index<PoolId> for Registry {
    type Output = Pool;

    fn index(&self, id: PoolId) -> &Self::Output {
        &self.pools[id.0]
    }
}

impl IndexMut<PoolId> for Registry {
    fn index_mut(&mut self, id: PoolId) -> &mut Self::Output {
        &mut self.pools[id.0]
    }
}
