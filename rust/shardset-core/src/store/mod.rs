// rust/shardset-core/src/store/mod.rs

//! Embedded key-value stores holding individual shards.
//!
//! A dataset only ever reads through [`ShardStore`]: fetch a value by key.
//! Every shard stores its record count under [`LENGTH_KEY`] and each record
//! under the decimal form of its local key (see [`record_key`]).
//!
//! # Example
//!
//! ```no_run
//! use shardset_core::codec::Codec;
//! use shardset_core::config::StoreConfig;
//! use shardset_core::store::{LmdbStore, ShardStore, ShardWriter, LENGTH_KEY};
//!
//! let config = StoreConfig::default();
//! let mut writer = ShardWriter::create("train/data.0000.lmdb", Codec::Bincode, &config).unwrap();
//! writer.append(&"record").unwrap();
//! writer.finish().unwrap();
//!
//! let store = LmdbStore::open("train/data.0000.lmdb".as_ref(), &config).unwrap();
//! assert!(store.get(LENGTH_KEY).unwrap().is_some());
//! ```

mod lmdb_store;
mod traits;

pub use lmdb_store::{LmdbStore, ShardWriter};
#[cfg(test)]
pub(crate) use lmdb_store::write_raw;
pub use traits::{read_declared_length, record_key, ShardStore, LENGTH_KEY};
