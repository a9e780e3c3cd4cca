//! Deployment modes: where pools come from and what teardown does to them.
//!
//! [`DynamicPools`] creates a pool the first time a size class is requested
//! and drops every pool at teardown. [`StaticPools`] serves a hand-declared
//! table of pools whose whole capacity is reserved before first use; an
//! undeclared size class is a configuration error and teardown leaves the
//! pools in place.

use block_pool::{Pool, PoolConfig};
use snafu::{IntoError as _, ensure};

use crate::{
    ConfigurationError, configuration_error,
    registry::{PoolId, Registry},
};

/// Name given to every pool created on demand.
pub const DYNAMIC_POOL_NAME: &str = "xallocator";

/// Arena size targeted when a dynamic pool grows.
pub const DEFAULT_ARENA_BYTES: usize = 4096;

/// Outcome of a size class lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum Resolved {
    /// The pool was already registered.
    Found(PoolId),
    /// The pool was created by this lookup.
    Created(PoolId),
}

impl Resolved {
    #[must_use]
    pub const fn id(self) -> PoolId {
        match self {
            Self::Found(id) | Self::Created(id) => id,
        }
    }
}

/// How a registry is populated and torn down.
pub trait PoolStrategy {
    /// Registers pools that must exist before the first allocation.
    fn prepare(&mut self, registry: &mut Registry) -> Result<(), ConfigurationError> {
        let _ = registry;
        Ok(())
    }

    /// Returns the pool serving `block_size`, creating it if the strategy
    /// allows.
    fn get_or_create(
        &mut self,
        registry: &mut Registry,
        block_size: usize,
    ) -> Result<Resolved, ConfigurationError>;

    /// Releases the pools at shutdown.
    fn teardown(&mut self, registry: &mut Registry);
}

/// Pools created lazily from the heap, owned by the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicPools;

impl DynamicPools {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Configuration of the pool created for `block_size`.
    #[must_use]
    pub const fn pool_config(block_size: usize) -> PoolConfig {
        let growth = DEFAULT_ARENA_BYTES / block_size;
        PoolConfig::new(block_size)
            .with_growth(if growth == 0 { 1 } else { growth })
            .with_name(DYNAMIC_POOL_NAME)
    }
}

impl PoolStrategy for DynamicPools {
    fn get_or_create(
        &mut self,
        registry: &mut Registry,
        block_size: usize,
    ) -> Result<Resolved, ConfigurationError> {
        if let Some(id) = registry.find(block_size) {
            return Ok(Resolved::Found(id));
        }
        let pool = Pool::new(Self::pool_config(block_size));
        registry.insert(pool).map(Resolved::Created)
    }

    fn teardown(&mut self, registry: &mut Registry) {
        registry.clear();
    }
}

/// One entry of a static pool table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPoolDecl {
    pub block_size: usize,
    /// Number of blocks reserved up front. The pool never grows beyond it.
    pub blocks: usize,
    pub name: &'static str,
}

impl StaticPoolDecl {
    #[must_use]
    pub const fn new(block_size: usize, blocks: usize, name: &'static str) -> Self {
        Self {
            block_size,
            blocks,
            name,
        }
    }

    #[must_use]
    pub const fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.block_size)
            .with_growth(self.blocks)
            .with_max_blocks(self.blocks)
            .with_name(self.name)
    }
}

/// A fixed table of pre-reserved pools.
#[derive(Debug, Clone, Copy)]
pub struct StaticPools {
    table: &'static [StaticPoolDecl],
    prepared: bool,
}

impl StaticPools {
    /// Blocks reserved per pool in [`DEFAULT_TABLE`](Self::DEFAULT_TABLE).
    pub const DEFAULT_BLOCKS: usize = 32;

    /// Every size class produced by [`block_size_for`] up to 2048 bytes.
    ///
    /// [`block_size_for`]: crate::size_class::block_size_for
    pub const DEFAULT_TABLE: &'static [StaticPoolDecl] = &[
        StaticPoolDecl::new(8, Self::DEFAULT_BLOCKS, "static8"),
        StaticPoolDecl::new(16, Self::DEFAULT_BLOCKS, "static16"),
        StaticPoolDecl::new(32, Self::DEFAULT_BLOCKS, "static32"),
        StaticPoolDecl::new(64, Self::DEFAULT_BLOCKS, "static64"),
        StaticPoolDecl::new(128, Self::DEFAULT_BLOCKS, "static128"),
        StaticPoolDecl::new(256, Self::DEFAULT_BLOCKS, "static256"),
        StaticPoolDecl::new(396, Self::DEFAULT_BLOCKS, "static396"),
        StaticPoolDecl::new(512, Self::DEFAULT_BLOCKS, "static512"),
        StaticPoolDecl::new(768, Self::DEFAULT_BLOCKS, "static768"),
        StaticPoolDecl::new(1024, Self::DEFAULT_BLOCKS, "static1024"),
        StaticPoolDecl::new(2048, Self::DEFAULT_BLOCKS, "static2048"),
    ];

    #[must_use]
    pub const fn new(table: &'static [StaticPoolDecl]) -> Self {
        Self {
            table,
            prepared: false,
        }
    }
}

impl PoolStrategy for StaticPools {
    fn prepare(&mut self, registry: &mut Registry) -> Result<(), ConfigurationError> {
        if self.prepared {
            return Ok(());
        }
        for decl in self.table {
            let block_size = decl.block_size;
            ensure!(
                registry.find(block_size).is_none(),
                configuration_error::DuplicateSizeClassSnafu { block_size }
            );
            let pool = Pool::with_reserved(decl.pool_config()).map_err(|source| {
                configuration_error::ReserveStaticPoolSnafu { block_size }.into_error(source)
            })?;
            registry.insert(pool)?;
        }
        self.prepared = true;
        Ok(())
    }

    fn get_or_create(
        &mut self,
        registry: &mut Registry,
        block_size: usize,
    ) -> Result<Resolved, ConfigurationError> {
        self.prepare(registry)?;
        let id = registry.find(block_size).ok_or_else(|| {
            configuration_error::UndeclaredSizeClassSnafu { block_size }.build()
        })?;
        Ok(Resolved::Found(id))
    }

    fn teardown(&mut self, _registry: &mut Registry) {}
}
