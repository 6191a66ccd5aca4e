//! Sharded Dataset Command-Line Tool
//!
//! Inspects how a shard directory is split between the ranks of a job,
//! prints individual records, and packs newline-delimited JSON into shards.
//!
//! # Usage
//!
//! ```bash
//! # What rank 1 of 4 reads
//! shardset info --src /data/s2ef/train --world-size 4 --rank 1
//!
//! # Print records by global index
//! shardset get --src /data/s2ef/train 0 17 42
//!
//! # Check that every record is read exactly once across 8 ranks
//! shardset coverage --src /data/s2ef/train --world-size 8
//!
//! # Pack records into 16 shards
//! shardset pack --input structures.jsonl --out /data/s2ef/train --shards 16
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardset_core::{Codec, Result, ShardsetConfig};

/// Sharded dataset inspection and packing
#[derive(Parser, Debug)]
#[command(name = "shardset")]
#[command(about = "Inspect, verify and pack sharded key-value datasets")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Shard directory, overrides dataset.src
    #[arg(short, long, global = true)]
    src: Option<PathBuf>,

    /// Number of workers, overrides distributed.world_size
    #[arg(short, long, global = true)]
    world_size: Option<u32>,

    /// This worker's rank, overrides distributed.rank
    #[arg(short, long, global = true)]
    rank: Option<u32>,

    /// Record codec (bincode, json), overrides dataset.codec
    #[arg(long, global = true)]
    codec: Option<Codec>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the shards this rank opens and how many records it owns
    Info,

    /// Print records as JSON
    Get {
        /// Global indices to read
        #[arg(required = true)]
        indices: Vec<u64>,
    },

    /// Compute ownership for every rank and report dropped records
    Coverage,

    /// Write newline-delimited JSON records into new shards
    Pack {
        /// Input file, one JSON record per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Number of shards to create
        #[arg(long, default_value = "1")]
        shards: usize,
    },
}

impl CommonArgs {
    /// Layers file, environment and flag settings, in that order.
    fn load_config(&self) -> Result<ShardsetConfig> {
        let mut config = match &self.config {
            Some(path) => ShardsetConfig::from_file(path)?,
            None => ShardsetConfig::default(),
        }
        .with_env_overrides();

        if let Some(src) = &self.src {
            config.dataset.src = src.clone();
        }
        if let Some(world_size) = self.world_size {
            config.distributed.world_size = world_size;
        }
        if let Some(rank) = self.rank {
            config.distributed.rank = rank;
        }
        if let Some(codec) = self.codec {
            config.dataset.codec = codec;
        }
        Ok(config)
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&cli.common.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.common.load_config()?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::Info => commands::info(&config, &mut stdout)?,
        Command::Get { indices } => commands::get(&config, &indices, &mut stdout)?,
        Command::Coverage => commands::coverage(&config, &mut stdout)?,
        Command::Pack { input, out, shards } => {
            commands::pack(&config, &input, &out, shards, &mut stdout)?
        }
    }

    Ok(())
}
