// rust/shardset-core/src/dataset/partition.rs

//! Assignment of shard files to ranks.
//!
//! The first `n - n % world_size` shards ("full" shards) are dealt round-robin,
//! so each one is owned exclusively by a single rank. The remaining shards are
//! opened by every rank, which then reads a rank-strided subset of their keys.

use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use twox_hash::XxHash64;

use crate::config::DistributedContext;
use crate::error::{Result, ShardsetError};

/// How a rank owns one of its shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Every key belongs to this rank.
    Exclusive,
    /// Keys are strided across all ranks.
    Shared,
}

/// The shards one rank must open, in shard-index order.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    ctx: DistributedContext,
    exclusive: Vec<PathBuf>,
    shared: Vec<PathBuf>,
    total_shards: usize,
    fingerprint: u64,
}

impl PartitionPlan {
    /// Partitions a sorted list of shard paths for the rank in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `NoShardsFound` if `shard_paths` is empty.
    pub fn new(shard_paths: &[PathBuf], ctx: DistributedContext) -> Result<Self> {
        if shard_paths.is_empty() {
            return Err(ShardsetError::no_shards("shard list is empty"));
        }

        let world_size = ctx.world_size() as usize;
        let rank = ctx.rank() as usize;
        let n = shard_paths.len();
        let num_full = n - n % world_size;

        let exclusive = shard_paths[..num_full]
            .iter()
            .skip(rank)
            .step_by(world_size)
            .cloned()
            .collect();
        let shared = shard_paths[num_full..].to_vec();

        Ok(Self {
            ctx,
            exclusive,
            shared,
            total_shards: n,
            fingerprint: fingerprint(shard_paths, ctx.world_size()),
        })
    }

    /// Shards owned by this rank alone.
    pub fn exclusive(&self) -> &[PathBuf] {
        &self.exclusive
    }

    /// Shards opened by every rank.
    pub fn shared(&self) -> &[PathBuf] {
        &self.shared
    }

    /// Every shard this rank opens with its ownership: exclusive shards first,
    /// then shared ones, each group in sorted-path order. Position in this
    /// sequence is the shard index.
    pub fn assignments(&self) -> impl Iterator<Item = (&Path, Ownership)> + '_ {
        let exclusive = self
            .exclusive
            .iter()
            .map(|p| (p.as_path(), Ownership::Exclusive));
        let shared = self.shared.iter().map(|p| (p.as_path(), Ownership::Shared));
        exclusive.chain(shared)
    }

    /// Number of shards this rank opens.
    pub fn len(&self) -> usize {
        self.exclusive.len() + self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of shards across the whole world, before partitioning.
    pub fn total_shards(&self) -> usize {
        self.total_shards
    }

    pub fn context(&self) -> DistributedContext {
        self.ctx
    }

    /// Hash of the world size and the shard file names, identical on every
    /// rank that listed the same directory contents.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

fn fingerprint(shard_paths: &[PathBuf], world_size: u32) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(&world_size.to_le_bytes());
    for path in shard_paths {
        let name = path.file_name().unwrap_or(path.as_os_str());
        hasher.write(name.to_string_lossy().as_bytes());
        hasher.write_u8(0);
    }
    hasher.finish()
}

/// Lists the entries of `dir` whose extension is `extension`, sorted by path.
///
/// Shards may be files or directories, depending on the store.
///
/// # Errors
///
/// Returns a `Storage` error if `dir` cannot be read and `NoShardsFound` if
/// nothing matches.
pub fn discover_shards(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ShardsetError::storage_with_source(dir, "failed to list shard directory", e)
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            ShardsetError::storage_with_source(dir, "failed to read directory entry", e)
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(ShardsetError::no_shards_in(dir, extension));
    }

    paths.sort();
    Ok(paths)
}
