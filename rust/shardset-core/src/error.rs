// rust/shardset-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ShardsetError {

    #[error("No shards found: {detail}")]
    NoShardsFound {
        detail: String,
    },

    #[error("Malformed shard '{path}': {message}")]
    MalformedShard {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Index {index} out of range (dataset length: {len})")]
    IndexOutOfRange {
        index: u64,
        len: u64,
    },

    #[error(
        "Corrupt record at index {index} (shard {shard_index}, offset {local_offset}, key '{key}'): {message}"
    )]
    CorruptRecord {
        index: u64,
        shard_index: usize,
        local_offset: u64,
        key: u64,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Record {position} in batch has no edge_index; set otf_graph to build graphs on the fly")]
    MissingGraphField {
        position: usize,
    },

    #[error("Rank {rank} out of range (world size: {world_size})")]
    InvalidRank {
        rank: u32,
        world_size: u32,
    },

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Store error at '{path}': {message}")]
    Store {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ShardsetError>;

// Convenience constructors
impl ShardsetError {

    pub fn no_shards(detail: impl Into<String>) -> Self {
        Self::NoShardsFound {
            detail: detail.into(),
        }
    }

    pub fn no_shards_in(dir: &std::path::Path, extension: &str) -> Self {
        Self::no_shards(format!(
            "no '*.{extension}' entries in '{}'",
            dir.display()
        ))
    }

    pub fn malformed_shard(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedShard {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn malformed_shard_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::MalformedShard {
            path: path.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn index_out_of_range(index: u64, len: u64) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn store_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_rank(rank: u32, world_size: u32) -> Self {
        Self::InvalidRank { rank, world_size }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether this error was raised while reading a single record, leaving
    /// the dataset itself usable.
    pub fn is_per_access(&self) -> bool {
        matches!(
            self,
            Self::IndexOutOfRange { .. } | Self::CorruptRecord { .. }
        )
    }
}
