// rust/shardset-core/src/lib.rs

//! Sharded Dataset - Core Library
//!
//! This crate presents a directory of read-only key-value shards as one
//! randomly indexable dataset, split deterministically between the workers
//! of a distributed job so that each reads its share without coordination.

pub mod codec;
pub mod config;
pub mod error;
pub mod record;
pub mod store;

// Re-export commonly used types for convenience
pub use codec::Codec;
pub use config::{DistributedContext, ShardsetConfig};
pub use error::{Result, ShardsetError};
pub use record::{EdgeIndex, GraphRecord, Record};
pub use store::{LmdbStore, ShardStore, ShardWriter};

pub mod dataset;
pub use dataset::{
    collate, Collate, Collated, GlobalIndex, GraphBatch, KeyStride, PartitionPlan,
    ResolvedLocation, ShardedDataset,
};
