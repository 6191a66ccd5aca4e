// rust/shardset-core/src/dataset/sharded.rs

use std::path::{Path, PathBuf};

use crate::codec::Codec;
use crate::config::{DistributedContext, ShardsetConfig, StoreConfig};
use crate::error::{Result, ShardsetError};
use crate::record::Record;
use crate::store::{read_declared_length, record_key, LmdbStore, ShardStore};

use super::collate::{collate, Collate, Collated};
use super::index::{GlobalIndex, KeyStride, ResolvedLocation};
use super::partition::{discover_shards, Ownership, PartitionPlan};

/// Function applied to every record after it is decoded.
pub type Transform<R> = Box<dyn Fn(R) -> R + Send + Sync>;

/// One opened shard and the keys this rank reads from it.
pub struct ShardDescriptor<S> {
    path: PathBuf,
    ownership: Ownership,
    declared_length: u64,
    owned_keys: KeyStride,
    store: S,
}

impl<S> ShardDescriptor<S> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Record count stored in the shard's `length` metadata.
    pub fn declared_length(&self) -> u64 {
        self.declared_length
    }

    pub fn owned_keys(&self) -> KeyStride {
        self.owned_keys
    }
}

impl<S> std::fmt::Debug for ShardDescriptor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardDescriptor")
            .field("path", &self.path)
            .field("ownership", &self.ownership)
            .field("declared_length", &self.declared_length)
            .field("owned", &self.owned_keys.len())
            .finish()
    }
}

/// Where a global index lives: its resolved location and the store key there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordAddress {
    pub index: u64,
    pub location: ResolvedLocation,
    pub key: u64,
}

impl RecordAddress {
    fn corrupt(
        &self,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> ShardsetError {
        ShardsetError::CorruptRecord {
            index: self.index,
            shard_index: self.location.shard_index,
            local_offset: self.location.local_offset,
            key: self.key,
            message: message.into(),
            source,
        }
    }
}

/// A randomly indexable view over the records this rank owns.
///
/// The dataset opens each of its shards once and holds the handles until it
/// is closed or dropped. Global indices run from 0 to `len() - 1` over the
/// shards in partition order; the mapping is fixed for a given world size,
/// rank, and shard directory listing.
///
/// Records are decoded on every access and never cached. Store handles are
/// read-only and unlocked, so every rank on a host can hold the same shared
/// shard open at once.
pub struct ShardedDataset<R, S = LmdbStore> {
    shards: Vec<ShardDescriptor<S>>,
    index: GlobalIndex,
    plan: PartitionPlan,
    codec: Codec,
    transform: Option<Transform<R>>,
}

impl<R: Record, S: ShardStore> ShardedDataset<R, S> {
    /// Opens the shards under `config.dataset.src` that belong to the rank
    /// in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset or store configuration is invalid,
    /// no shards are found, or any owned shard cannot be opened or lacks a
    /// readable `length`. No handles stay open on failure.
    pub fn open(config: &ShardsetConfig, ctx: DistributedContext) -> Result<Self> {
        config.dataset.validate()?;
        config.store.validate()?;

        let paths = discover_shards(&config.dataset.src, &config.dataset.extension)?;
        Self::from_paths(&paths, ctx, config.dataset.codec, &config.store)
    }

    /// Opens the rank's share of an explicit, sorted list of shard paths.
    pub fn from_paths(
        shard_paths: &[PathBuf],
        ctx: DistributedContext,
        codec: Codec,
        store_config: &StoreConfig,
    ) -> Result<Self> {
        let plan = PartitionPlan::new(shard_paths, ctx)?;

        let mut shards = Vec::with_capacity(plan.len());
        for (path, ownership) in plan.assignments() {
            let store = S::open(path, store_config)?;
            let declared_length = read_declared_length(&store, codec)?;
            let owned_keys = KeyStride::for_ownership(ownership, declared_length, ctx);

            if ownership == Ownership::Shared {
                let dropped = declared_length % u64::from(ctx.world_size());
                if dropped > 0 {
                    tracing::warn!(
                        path = %path.display(),
                        dropped,
                        "shared shard length not divisible by world size; tail records are skipped by every rank"
                    );
                }
            }

            tracing::debug!(
                path = %path.display(),
                ?ownership,
                declared_length,
                owned = owned_keys.len(),
                "opened shard"
            );

            shards.push(ShardDescriptor {
                path: path.to_path_buf(),
                ownership,
                declared_length,
                owned_keys,
                store,
            });
        }

        let index = GlobalIndex::from_lengths(shards.iter().map(|s| s.owned_keys.len()));

        tracing::info!(
            world_size = ctx.world_size(),
            rank = ctx.rank(),
            exclusive = plan.exclusive().len(),
            shared = plan.shared().len(),
            records = index.len(),
            fingerprint = format_args!("{:016x}", plan.fingerprint()),
            "dataset ready"
        );

        Ok(Self {
            shards,
            index,
            plan,
            codec,
            transform: None,
        })
    }

    /// Applies `transform` to every record returned from now on.
    #[must_use]
    pub fn with_transform(mut self, transform: impl Fn(R) -> R + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Number of records this rank owns.
    pub fn len(&self) -> u64 {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Resolves a global index to its shard, offset and store key.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index >= len()`.
    pub fn locate(&self, index: u64) -> Result<RecordAddress> {
        let location = self.index.resolve(index)?;
        let shard = &self.shards[location.shard_index];
        let key = shard
            .owned_keys
            .get(location.local_offset)
            .ok_or_else(|| ShardsetError::index_out_of_range(index, self.len()))?;

        Ok(RecordAddress {
            index,
            location,
            key,
        })
    }

    /// Reads, decodes and transforms the record at `index`, then stamps it
    /// with the id `"{shard_index}_{local_offset}"`.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for an index past the end and
    /// `CorruptRecord` if the record is missing or cannot be decoded. Both
    /// leave the dataset usable.
    pub fn get(&self, index: u64) -> Result<R> {
        let address = self.locate(index)?;
        let shard = &self.shards[address.location.shard_index];

        let bytes = shard
            .store
            .get(&record_key(address.key))
            .map_err(|e| address.corrupt("store read failed", Some(Box::new(e))))?
            .ok_or_else(|| address.corrupt("key not present in store", None))?;

        let mut record: R = self
            .codec
            .decode(&bytes)
            .map_err(|e| address.corrupt(format!("{} decode failed", self.codec), Some(e)))?;

        if let Some(transform) = &self.transform {
            record = transform(record);
        }
        record.set_id(address.location.provenance_id());

        tracing::trace!(
            index,
            shard_index = address.location.shard_index,
            local_offset = address.location.local_offset,
            key = address.key,
            "read record"
        );

        Ok(record)
    }

    /// Iterates over every record in index order.
    pub fn iter(&self) -> Records<'_, R, S> {
        Records {
            dataset: self,
            next: 0,
            end: self.len(),
        }
    }

    /// Iterates over consecutive batches of `batch_size` records; the last
    /// batch may be shorter.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `batch_size` is zero.
    pub fn batches(&self, batch_size: usize, otf_graph: bool) -> Result<Batches<'_, R, S>>
    where
        R: Collate,
    {
        if batch_size == 0 {
            return Err(ShardsetError::config("batch_size must be greater than 0"));
        }
        Ok(Batches {
            dataset: self,
            next: 0,
            batch_size: batch_size as u64,
            otf_graph,
        })
    }

    /// Closes every store handle.
    ///
    /// All handles are released even if some fail to close; the first
    /// failure is returned.
    pub fn close(self) -> Result<()> {
        let mut first_error = None;
        for shard in self.shards {
            let path = shard.path;
            if let Err(e) = shard.store.close() {
                tracing::warn!(path = %path.display(), "failed to close shard: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<R, S> ShardedDataset<R, S> {
    pub fn shards(&self) -> &[ShardDescriptor<S>] {
        &self.shards
    }

    /// Paths of the opened shards, in shard-index order.
    pub fn shard_paths(&self) -> Vec<&Path> {
        self.shards.iter().map(|s| s.path.as_path()).collect()
    }

    /// Number of records owned in each shard, in shard-index order.
    pub fn shard_lengths(&self) -> Vec<u64> {
        self.shards.iter().map(|s| s.owned_keys.len()).collect()
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn index(&self) -> &GlobalIndex {
        &self.index
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

impl<R, S> std::fmt::Debug for ShardedDataset<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedDataset")
            .field("context", &self.plan.context())
            .field("shards", &self.shards)
            .field("len", &self.index.len())
            .field("codec", &self.codec)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Iterator over a dataset's records. See [`ShardedDataset::iter`].
pub struct Records<'a, R, S> {
    dataset: &'a ShardedDataset<R, S>,
    next: u64,
    end: u64,
}

impl<R: Record, S: ShardStore> Iterator for Records<'_, R, S> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.dataset.get(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.end - self.next) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl<R: Record, S: ShardStore> ExactSizeIterator for Records<'_, R, S> {}

/// Iterator over collated batches. See [`ShardedDataset::batches`].
pub struct Batches<'a, R, S> {
    dataset: &'a ShardedDataset<R, S>,
    next: u64,
    batch_size: u64,
    otf_graph: bool,
}

impl<R: Collate, S: ShardStore> Iterator for Batches<'_, R, S> {
    type Item = Result<Collated<R::Batch>>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.dataset.len();
        if self.next >= len {
            return None;
        }

        // Advance first so a failed batch is not retried forever
        let start = self.next;
        let end = start.saturating_add(self.batch_size).min(len);
        self.next = end;

        let records = (start..end)
            .map(|index| self.dataset.get(index))
            .collect::<Result<Vec<R>>>();
        Some(records.map(|records| collate(records, self.otf_graph)))
    }
}
