// rust/shardset-core/src/store/traits.rs

//! Contract between datasets and the embedded stores that hold each shard.

use std::path::Path;

use crate::codec::Codec;
use crate::config::StoreConfig;
use crate::error::{Result, ShardsetError};

/// Key under which every shard records how many records it holds.
pub const LENGTH_KEY: &[u8] = b"length";

/// Canonical store key of the record at `key`: its decimal ASCII form.
pub fn record_key(key: u64) -> Vec<u8> {
    key.to_string().into_bytes()
}

/// A read-only handle to one shard store.
///
/// Handles are opened once when a dataset is built and released together
/// with it. Implementations expose no write path and must allow several
/// handles, in this or other processes, to read the same store at once.
pub trait ShardStore: Send + Sync {
    /// Opens the store at `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing exists at `path` or the store cannot be opened.
    fn open(path: &Path, config: &StoreConfig) -> Result<Self>
    where
        Self: Sized;

    /// Fetches the value stored under `key`, or `None` if the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Path this store was opened from.
    fn path(&self) -> &Path;

    /// Releases the handle, reporting any failure to do so.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Reads the record count a shard declares under [`LENGTH_KEY`].
///
/// # Errors
///
/// Returns `MalformedShard` if the key is absent or its value does not
/// decode as a `u64` under `codec`.
pub fn read_declared_length<S: ShardStore + ?Sized>(store: &S, codec: Codec) -> Result<u64> {
    let bytes = store.get(LENGTH_KEY)?.ok_or_else(|| {
        ShardsetError::malformed_shard(store.path(), "missing 'length' metadata")
    })?;
    codec.decode(&bytes).map_err(|e| {
        ShardsetError::malformed_shard_with_source(
            store.path(),
            format!("'length' metadata is not a {codec} u64"),
            e,
        )
    })
}
