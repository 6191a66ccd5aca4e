// rust/shardset-core/src/store/lmdb_store.rs

//! Shard stores backed by LMDB, one single-file environment per shard.

use std::path::{Path, PathBuf};

use lmdb::{Database, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags};
use serde::Serialize;

use super::traits::{record_key, ShardStore, LENGTH_KEY};
use crate::codec::Codec;
use crate::config::StoreConfig;
use crate::error::{Result, ShardsetError};

/// Records buffered by [`ShardWriter`] before they are committed.
const WRITE_BATCH: usize = 1024;

fn map_size(path: &Path, config: &StoreConfig) -> Result<usize> {
    usize::try_from(config.map_size).map_err(|_| {
        ShardsetError::storage(
            path,
            format!("store.map_size {} exceeds the address space", config.map_size),
        )
    })
}

/// Read-only view of an LMDB environment holding one shard.
///
/// Opened without locking, so any number of processes (or ranks sharing a
/// host) can hold the same shard at once. Nothing may write to a shard while
/// it is being read.
pub struct LmdbStore {
    path: PathBuf,
    env: Environment,
    db: Database,
}

impl ShardStore for LmdbStore {
    fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        if !path.is_file() {
            return Err(ShardsetError::storage(path, "shard does not exist"));
        }

        let env = Environment::new()
            .set_flags(
                EnvironmentFlags::READ_ONLY
                    | EnvironmentFlags::NO_LOCK
                    | EnvironmentFlags::NO_SUB_DIR
                    | EnvironmentFlags::NO_READAHEAD,
            )
            .set_map_size(map_size(path, config)?)
            .open(path)
            .map_err(|e| ShardsetError::store_with_source(path, "failed to open store", e))?;
        let db = env
            .open_db(None)
            .map_err(|e| ShardsetError::store_with_source(path, "failed to open database", e))?;

        Ok(Self {
            path: path.to_path_buf(),
            env,
            db,
        })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| ShardsetError::store_with_source(&self.path, "read failed", e))?;
        let value = match txn.get(self.db, &key) {
            Ok(value) => Some(value.to_vec()),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(ShardsetError::store_with_source(&self.path, "read failed", e)),
        };
        Ok(value)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Unmaps the shard. A read-only, unlocked environment has no pending
    /// state, so closing cannot fail.
    fn close(self) -> Result<()> {
        drop(self.env);
        Ok(())
    }
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore").field("path", &self.path).finish()
    }
}

/// Writes a new shard: records under keys `"0"`, `"1"`, ... followed by the
/// record count under `"length"`.
///
/// A shard is only readable after [`ShardWriter::finish`] has stored its length.
/// The writer assumes it is the only process touching `path`.
pub struct ShardWriter {
    path: PathBuf,
    env: Environment,
    db: Database,
    codec: Codec,
    count: u64,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
}

impl ShardWriter {
    /// Creates an empty shard at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if something already exists at `path` or the store
    /// cannot be created.
    pub fn create(path: impl AsRef<Path>, codec: Codec, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ShardsetError::storage(path, "refusing to overwrite existing shard"));
        }

        // Durability comes from the explicit sync in `finish`
        let env = Environment::new()
            .set_flags(
                EnvironmentFlags::NO_SUB_DIR | EnvironmentFlags::NO_LOCK | EnvironmentFlags::NO_SYNC,
            )
            .set_map_size(map_size(path, config)?)
            .open(path)
            .map_err(|e| ShardsetError::store_with_source(path, "failed to create store", e))?;
        let db = env
            .create_db(None, DatabaseFlags::empty())
            .map_err(|e| ShardsetError::store_with_source(path, "failed to create database", e))?;

        Ok(Self {
            path: path.to_path_buf(),
            env,
            db,
            codec,
            count: 0,
            pending: Vec::with_capacity(WRITE_BATCH),
        })
    }

    /// Appends a record and returns the local key it was stored under.
    pub fn append<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<u64> {
        let key = self.count;
        let bytes = self.codec.encode(record)?;
        self.pending.push((record_key(key), bytes));
        self.count += 1;

        if self.pending.len() >= WRITE_BATCH {
            self.commit_pending()?;
        }
        Ok(key)
    }

    /// Number of records appended so far.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores the record count and syncs the shard to disk.
    ///
    /// Returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        let length = self.codec.encode(&self.count)?;
        self.pending.push((LENGTH_KEY.to_vec(), length));
        self.commit_pending()?;
        self.env
            .sync(true)
            .map_err(|e| ShardsetError::store_with_source(&self.path, "sync failed", e))?;

        tracing::debug!(path = %self.path.display(), records = self.count, "shard written");
        Ok(self.count)
    }

    fn commit_pending(&mut self) -> Result<()> {
        let write_failed = |e| ShardsetError::store_with_source(&self.path, "write failed", e);

        let mut txn = self.env.begin_rw_txn().map_err(write_failed)?;
        for (key, value) in &self.pending {
            txn.put(self.db, key, value, WriteFlags::empty())
                .map_err(write_failed)?;
        }
        txn.commit().map_err(write_failed)?;

        self.pending.clear();
        Ok(())
    }
}

/// Writes `entries` verbatim into a new shard, bypassing the length and key
/// conventions of [`ShardWriter`].
#[cfg(test)]
pub(crate) fn write_raw(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let env = Environment::new()
        .set_flags(EnvironmentFlags::NO_SUB_DIR | EnvironmentFlags::NO_LOCK)
        .set_map_size(1 << 20)
        .open(path)
        .unwrap();
    let db = env.create_db(None, DatabaseFlags::empty()).unwrap();
    let mut txn = env.begin_rw_txn().unwrap();
    for (key, value) in entries {
        txn.put(db, &key.as_bytes(), value, WriteFlags::empty()).unwrap();
    }
    txn.commit().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_shard() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.lmdb");

        let result = LmdbStore::open(&path, &StoreConfig::default());
        assert!(matches!(result, Err(ShardsetError::Storage { .. })));
        // Opening must not create the shard as a side effect
        assert!(!path.exists());
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.0000.lmdb");

        let mut writer = ShardWriter::create(&path, Codec::Bincode, &StoreConfig::default()).unwrap();
        assert!(writer.is_empty());
        assert_eq!(writer.append("first").unwrap(), 0);
        assert_eq!(writer.append("second").unwrap(), 1);
        assert_eq!(writer.len(), 2);
        assert_eq!(writer.finish().unwrap(), 2);

        let store = LmdbStore::open(&path, &StoreConfig::default()).unwrap();
        assert_eq!(store.path(), path.as_path());

        let length = store.get(LENGTH_KEY).unwrap().unwrap();
        let length: u64 = Codec::Bincode.decode(&length).unwrap();
        assert_eq!(length, 2);

        let second = store.get(&record_key(1)).unwrap().unwrap();
        let second: String = Codec::Bincode.decode(&second).unwrap();
        assert_eq!(second, "second");

        assert!(store.get(&record_key(2)).unwrap().is_none());
        store.close().unwrap();
    }

    #[test]
    fn test_writes_span_several_batches() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.0000.lmdb");
        let total = WRITE_BATCH as u64 * 2 + 7;

        let mut writer = ShardWriter::create(&path, Codec::Json, &StoreConfig::default()).unwrap();
        for i in 0..total {
            writer.append(&i).unwrap();
        }
        writer.finish().unwrap();

        let store = LmdbStore::open(&path, &StoreConfig::default()).unwrap();
        for key in [0, WRITE_BATCH as u64, total - 1] {
            let value: u64 = Codec::Json.decode(&store.get(&record_key(key)).unwrap().unwrap()).unwrap();
            assert_eq!(value, key);
        }
    }

    #[test]
    fn test_concurrent_readers_share_one_shard() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.0000.lmdb");
        let mut writer = ShardWriter::create(&path, Codec::Bincode, &StoreConfig::default()).unwrap();
        writer.append("only").unwrap();
        writer.finish().unwrap();

        let first = LmdbStore::open(&path, &StoreConfig::default()).unwrap();
        let second = LmdbStore::open(&path, &StoreConfig::default()).unwrap();
        assert!(first.get(&record_key(0)).unwrap().is_some());
        assert!(second.get(&record_key(0)).unwrap().is_some());

        first.close().unwrap();
        // The other handle is unaffected
        assert!(second.get(LENGTH_KEY).unwrap().is_some());
        second.close().unwrap();

        // Readers leave no lock file behind
        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_create_refuses_existing_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.lmdb");
        std::fs::write(&path, b"").unwrap();

        let result = ShardWriter::create(&path, Codec::Json, &StoreConfig::default());
        assert!(matches!(result, Err(ShardsetError::Storage { .. })));
    }

    #[test]
    fn test_open_rejects_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.lmdb");
        std::fs::create_dir(&path).unwrap();

        let result = LmdbStore::open(&path, &StoreConfig::default());
        assert!(matches!(result, Err(ShardsetError::Storage { .. })));
    }

    #[test]
    fn test_record_key_is_decimal() {
        assert_eq!(record_key(0), b"0".to_vec());
        assert_eq!(record_key(1234), b"1234".to_vec());
    }
}
