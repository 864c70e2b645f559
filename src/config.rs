//! Configuration for blockheap
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{HeapError, Result};
use crate::storage::BLOCK_HEADER_SIZE;

/// Main configuration for a blockheap data directory
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory holding one file per table
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── users.tdb
    ///     └── orders.tdb
    pub data_dir: PathBuf,

    /// Size of every block (in bytes) for tables created through this config.
    /// Existing tables keep the block size recorded in their trailer.
    pub block_size: u32,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// How each block/trailer write reaches the device
    pub sync_strategy: SyncStrategy,
}

/// Sync strategy for block and trailer writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every block or trailer write (durable on return)
    EveryWrite,

    /// Leave flushing to the OS page cache (benchmarks, throwaway tables)
    OsBuffered,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./blockheap_data"),
            block_size: 4096,
            sync_strategy: SyncStrategy::EveryWrite,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings no table file could be built from
    pub fn validate(&self) -> Result<()> {
        if self.block_size as usize <= BLOCK_HEADER_SIZE {
            return Err(HeapError::Config(format!(
                "block size {} leaves no room for rows (header alone is {} bytes)",
                self.block_size, BLOCK_HEADER_SIZE
            )));
        }
        if self.block_size > i32::MAX as u32 {
            return Err(HeapError::Config(format!(
                "block size {} does not fit the on-disk i32 field",
                self.block_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all table files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the block size used when creating tables (in bytes)
    pub fn block_size(mut self, size: u32) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
