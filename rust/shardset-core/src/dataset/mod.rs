// rust/shardset-core/src/dataset/mod.rs

//! Rank-partitioned datasets over a directory of shard stores.
//!
//! Building a dataset happens once per worker:
//!
//! 1. [`discover_shards`] lists the shard stores, sorted by path.
//! 2. [`PartitionPlan`] decides which shards this rank opens: full shards are
//!    dealt round-robin, the remainder is shared by every rank.
//! 3. Each opened shard contributes a [`KeyStride`] of owned keys, and a
//!    [`GlobalIndex`] of prefix sums maps global indices onto them.
//!
//! After that, [`ShardedDataset::get`] resolves an index by binary search,
//! fetches and decodes one record, and stamps its provenance id.
//!
//! # Example
//!
//! ```no_run
//! use shardset_core::config::{DistributedContext, ShardsetConfig};
//! use shardset_core::dataset::{collate, ShardedDataset};
//! use shardset_core::record::GraphRecord;
//!
//! let config = ShardsetConfig::for_src("/data/s2ef/train");
//! let ctx = DistributedContext::new(4, 1).unwrap();
//! let dataset: ShardedDataset<GraphRecord> = ShardedDataset::open(&config, ctx).unwrap();
//!
//! let first = dataset.get(0).unwrap();
//! println!("{:?} has {} atoms", first.id, first.natoms);
//!
//! let records = (0..8).map(|i| dataset.get(i)).collect::<Result<Vec<_>, _>>().unwrap();
//! let batch = collate(records, false);
//! println!("neighbors: {:?}", batch.neighbors);
//!
//! dataset.close().unwrap();
//! ```

mod collate;
mod index;
mod partition;
mod sharded;

pub use collate::{collate, neighbor_counts, Collate, Collated, GraphBatch};
pub use index::{GlobalIndex, KeyStride, ResolvedLocation};
pub use partition::{discover_shards, Ownership, PartitionPlan};
pub use sharded::{
    Batches, RecordAddress, Records, ShardDescriptor, ShardedDataset, Transform,
};
