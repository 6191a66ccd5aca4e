// rust/shardset-core/src/config.rs

//! Configuration management for sharded datasets.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::codec::Codec;
use crate::error::{Result, ShardsetError};

/// Default file extension of shard stores inside `dataset.src`.
pub const DEFAULT_SHARD_EXTENSION: &str = "lmdb";

/// Default upper bound on a shard's size: 1 TiB of address space, not memory.
pub const DEFAULT_MAP_SIZE: u64 = 1 << 40;

// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardsetConfig {
    pub dataset: DatasetConfig,
    pub distributed: DistributedConfig,
    pub store: StoreConfig,
}

/// Dataset location and decoding options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding the shard stores. Required.
    pub src: PathBuf,
    /// Extension (without the dot) that marks a directory entry as a shard.
    pub extension: String,
    /// Encoding of record payloads and the length metadata.
    pub codec: Codec,
    /// Whether graphs are built downstream, which disables neighbor counting.
    pub otf_graph: bool,
}

// World size and rank of this worker. Filled in by the launcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    pub world_size: u32,
    pub rank: u32,
}

/// Options for each opened shard store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Size in bytes of the memory map of each store. Must be at least as
    /// large as any shard written with these options.
    pub map_size: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            src: PathBuf::new(),
            extension: DEFAULT_SHARD_EXTENSION.to_string(),
            codec: Codec::default(),
            otf_graph: false,
        }
    }
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            world_size: 1,
            rank: 0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
        }
    }
}

/// Position of this worker among all workers reading the same dataset.
///
/// Unlike [`DistributedConfig`], a context is always valid: `world_size > 0`
/// and `rank < world_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DistributedContext {
    world_size: u32,
    rank: u32,
}

impl DistributedContext {
    /// Creates a context, rejecting a zero world size or an out-of-range rank.
    pub fn new(world_size: u32, rank: u32) -> Result<Self> {
        if world_size == 0 {
            return Err(ShardsetError::config(
                "distributed.world_size must be greater than 0",
            ));
        }
        if rank >= world_size {
            return Err(ShardsetError::invalid_rank(rank, world_size));
        }
        Ok(Self { world_size, rank })
    }

    /// A single worker that owns everything.
    pub fn single() -> Self {
        Self {
            world_size: 1,
            rank: 0,
        }
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Every rank of this world, in order.
    pub fn peers(&self) -> impl Iterator<Item = DistributedContext> {
        let world_size = self.world_size;
        (0..world_size).map(move |rank| DistributedContext { world_size, rank })
    }
}

impl Default for DistributedContext {
    fn default() -> Self {
        Self::single()
    }
}

impl DistributedConfig {
    /// Converts to a validated [`DistributedContext`].
    pub fn context(&self) -> Result<DistributedContext> {
        DistributedContext::new(self.world_size, self.rank)
    }
}

impl FromStr for ShardsetConfig {
    type Err = ShardsetError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ShardsetError::config_with_source("failed to parse TOML config", e))
    }
}

impl ShardsetConfig {
    /// Configuration for `src` with every other option at its default.
    pub fn for_src(src: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.dataset.src = src.into();
        config
    }

    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShardsetError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `SHARDSET_` and use underscores
    // to separate nested fields. For example:
    // - `SHARDSET_DATASET_SRC` overrides `dataset.src`
    // - `SHARDSET_DATASET_CODEC` overrides `dataset.codec` ("bincode" or "json")
    // - `SHARDSET_DISTRIBUTED_RANK` overrides `distributed.rank`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Dataset overrides
        if let Ok(val) = std::env::var("SHARDSET_DATASET_SRC") {
            self.dataset.src = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SHARDSET_DATASET_EXTENSION") {
            self.dataset.extension = val;
        }
        if let Ok(val) = std::env::var("SHARDSET_DATASET_CODEC") {
            if let Ok(v) = val.parse() {
                self.dataset.codec = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDSET_DATASET_OTF_GRAPH") {
            if let Ok(v) = val.parse() {
                self.dataset.otf_graph = v;
            }
        }

        // Distributed overrides
        if let Ok(val) = std::env::var("SHARDSET_DISTRIBUTED_WORLD_SIZE") {
            if let Ok(v) = val.parse() {
                self.distributed.world_size = v;
            }
        }
        if let Ok(val) = std::env::var("SHARDSET_DISTRIBUTED_RANK") {
            if let Ok(v) = val.parse() {
                self.distributed.rank = v;
            }
        }

        // Store overrides
        if let Ok(val) = std::env::var("SHARDSET_STORE_MAP_SIZE") {
            if let Ok(v) = val.parse() {
                self.store.map_size = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error naming the first invalid key.
    pub fn validate(&self) -> Result<()> {
        self.dataset.validate()?;
        self.distributed.context()?;
        self.store.validate()?;
        Ok(())
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.src.as_os_str().is_empty() {
            return Err(ShardsetError::config("dataset.src must be set"));
        }
        if self.extension.is_empty() {
            return Err(ShardsetError::config(
                "dataset.extension must not be empty",
            ));
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.map_size == 0 {
            return Err(ShardsetError::config(
                "store.map_size must be greater than 0",
            ));
        }
        Ok(())
    }
}
