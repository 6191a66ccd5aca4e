//! Subcommand implementations. Each writes its report to `out`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use shardset_core::dataset::{discover_shards, KeyStride, Ownership, PartitionPlan};
use shardset_core::store::{read_declared_length, ShardStore};
use shardset_core::{
    GraphRecord, LmdbStore, ShardWriter, ShardedDataset, ShardsetConfig, ShardsetError,
};

type CmdResult = std::result::Result<(), Box<dyn std::error::Error>>;

pub fn info(config: &ShardsetConfig, out: &mut impl Write) -> CmdResult {
    config.validate()?;
    let ctx = config.distributed.context()?;
    let dataset: ShardedDataset<GraphRecord> = ShardedDataset::open(config, ctx)?;

    let plan = dataset.plan();
    writeln!(out, "source:      {}", config.dataset.src.display())?;
    writeln!(out, "world size:  {}", ctx.world_size())?;
    writeln!(out, "rank:        {}", ctx.rank())?;
    writeln!(out, "shards:      {} of {}", plan.len(), plan.total_shards())?;
    writeln!(out, "fingerprint: {:016x}", plan.fingerprint())?;
    writeln!(out, "codec:       {}", dataset.codec())?;
    writeln!(
        out,
        "neighbors:   {}",
        if config.dataset.otf_graph { "built on the fly" } else { "from edge_index" }
    )?;
    writeln!(out)?;

    for (shard_index, shard) in dataset.shards().iter().enumerate() {
        let kind = match shard.ownership() {
            Ownership::Exclusive => "exclusive",
            Ownership::Shared => "shared",
        };
        writeln!(
            out,
            "{shard_index:>5}  {kind:<9}  {:>10} / {:<10}  {}",
            shard.owned_keys().len(),
            shard.declared_length(),
            shard.path().display()
        )?;
    }

    writeln!(out)?;
    writeln!(out, "records:     {}", dataset.len())?;
    dataset.close()?;
    Ok(())
}

pub fn get(config: &ShardsetConfig, indices: &[u64], out: &mut impl Write) -> CmdResult {
    config.validate()?;
    let ctx = config.distributed.context()?;
    let dataset: ShardedDataset<GraphRecord> = ShardedDataset::open(config, ctx)?;

    let mut failed = 0usize;
    for &index in indices {
        match dataset.get(index) {
            Ok(record) => {
                writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
            }
            Err(e) if e.is_per_access() => {
                tracing::error!("{e}");
                failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    dataset.close()?;

    if failed > 0 {
        return Err(format!("{failed} of {} reads failed", indices.len()).into());
    }
    Ok(())
}

/// Ownership totals of one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankCoverage {
    pub rank: u32,
    pub exclusive_shards: usize,
    pub shared_shards: usize,
    pub records: u64,
}

/// Ownership of every rank, computed from shard metadata alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    pub ranks: Vec<RankCoverage>,
    /// Sum of declared lengths over all shards.
    pub declared: u64,
    /// Tail records of shared shards that no rank reads.
    pub dropped: u64,
}

impl Coverage {
    pub fn owned(&self) -> u64 {
        self.ranks.iter().map(|r| r.records).sum()
    }

    /// Every declared record is either owned by exactly one rank or dropped.
    pub fn is_complete(&self) -> bool {
        self.owned() + self.dropped == self.declared
    }
}

/// Opens each shard once to read its length, then partitions for every rank.
pub fn compute_coverage(config: &ShardsetConfig) -> std::result::Result<Coverage, ShardsetError> {
    config.validate()?;
    let ctx = config.distributed.context()?;
    let paths = discover_shards(&config.dataset.src, &config.dataset.extension)?;

    let mut declared_lengths = Vec::with_capacity(paths.len());
    for path in &paths {
        let store = LmdbStore::open(path, &config.store)?;
        declared_lengths.push((path.clone(), read_declared_length(&store, config.dataset.codec)?));
        store.close()?;
    }
    let declared_of = |path: &Path| {
        declared_lengths
            .iter()
            .find(|(p, _)| p == path)
            .map_or(0, |(_, len)| *len)
    };

    let mut ranks = Vec::with_capacity(ctx.world_size() as usize);
    for peer in ctx.peers() {
        let plan = PartitionPlan::new(&paths, peer)?;
        let records = plan
            .assignments()
            .map(|(path, ownership)| {
                KeyStride::for_ownership(ownership, declared_of(path), peer).len()
            })
            .sum();
        ranks.push(RankCoverage {
            rank: peer.rank(),
            exclusive_shards: plan.exclusive().len(),
            shared_shards: plan.shared().len(),
            records,
        });
    }

    let world_size = u64::from(ctx.world_size());
    let plan = PartitionPlan::new(&paths, ctx)?;
    let dropped = plan
        .shared()
        .iter()
        .map(|path| declared_of(path.as_path()) % world_size)
        .sum();

    Ok(Coverage {
        ranks,
        declared: declared_lengths.iter().map(|(_, len)| len).sum(),
        dropped,
    })
}

pub fn coverage(config: &ShardsetConfig, out: &mut impl Write) -> CmdResult {
    let coverage = compute_coverage(config)?;

    writeln!(out, "{:>6}  {:>9}  {:>6}  {:>12}", "rank", "exclusive", "shared", "records")?;
    for rank in &coverage.ranks {
        writeln!(
            out,
            "{:>6}  {:>9}  {:>6}  {:>12}",
            rank.rank, rank.exclusive_shards, rank.shared_shards, rank.records
        )?;
    }
    writeln!(out)?;
    writeln!(out, "declared: {}", coverage.declared)?;
    writeln!(out, "owned:    {}", coverage.owned())?;
    writeln!(out, "dropped:  {}", coverage.dropped)?;

    if !coverage.is_complete() {
        return Err("owned and dropped records do not add up to the declared total".into());
    }
    Ok(())
}

/// Writes the records of `input` into `shards` new shards under `out_dir`, in
/// contiguous runs so that shard order preserves input order.
pub fn pack(
    config: &ShardsetConfig,
    input: &Path,
    out_dir: &Path,
    shards: usize,
    out: &mut impl Write,
) -> CmdResult {
    if shards == 0 {
        return Err(ShardsetError::config("--shards must be greater than 0").into());
    }

    // First pass only counts, so the input is never held in memory
    let total = read_lines(input)?
        .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
        .count();
    let per_shard = total.div_ceil(shards).max(1);

    fs::create_dir_all(out_dir).map_err(|e| {
        ShardsetError::storage_with_source(out_dir, "failed to create output directory", e)
    })?;

    let codec = config.dataset.codec;
    let mut writer: Option<ShardWriter> = None;
    let mut shard_index = 0usize;
    let mut written = Vec::new();

    for (line_no, line) in read_lines(input)?.enumerate() {
        let line = line.map_err(|e| ShardsetError::storage_with_source(input, "read failed", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut record: GraphRecord = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {e}", input.display(), line_no + 1))?;
        // Ids are assigned on read
        record.id = None;

        if writer.as_ref().map_or(true, |w| w.len() as usize >= per_shard) {
            if let Some(full) = writer.take() {
                written.push((full.path().to_path_buf(), full.finish()?));
            }
            let path = out_dir.join(format!(
                "data.{shard_index:04}.{}",
                config.dataset.extension
            ));
            writer = Some(ShardWriter::create(&path, codec, &config.store)?);
            shard_index += 1;
        }
        if let Some(w) = writer.as_mut() {
            w.append(&record)?;
        }
    }
    if let Some(last) = writer.take() {
        written.push((last.path().to_path_buf(), last.finish()?));
    }

    for (path, count) in &written {
        writeln!(out, "{count:>10}  {}", path.display())?;
    }
    writeln!(out, "{total} records in {} shards", written.len())?;
    tracing::info!(records = total, shards = written.len(), %codec, "pack complete");
    Ok(())
}

fn read_lines(
    path: &Path,
) -> std::result::Result<std::io::Lines<BufReader<File>>, ShardsetError> {
    let file = File::open(path)
        .map_err(|e| ShardsetError::storage_with_source(path, "failed to open input", e))?;
    Ok(BufReader::new(file).lines())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardset_core::{Codec, DistributedContext};
    use tempfile::TempDir;

    fn write_jsonl(dir: &Path, count: usize) -> std::path::PathBuf {
        let path = dir.join("input.jsonl");
        let mut file = File::create(&path).unwrap();
        for i in 0..count {
            writeln!(
                file,
                r#"{{"sid": {i}, "natoms": 1, "atomic_numbers": [6], "pos": [[0.0, 0.0, 0.0]]}}"#
            )
            .unwrap();
            if i == 2 {
                writeln!(file).unwrap();
            }
        }
        path
    }

    fn packed(count: usize, shards: usize) -> (TempDir, ShardsetConfig) {
        let temp_dir = TempDir::new().unwrap();
        let input = write_jsonl(temp_dir.path(), count);
        let out_dir = temp_dir.path().join("shards");

        let config = ShardsetConfig::for_src(&out_dir);
        let mut report = Vec::new();
        pack(&config, &input, &out_dir, shards, &mut report).unwrap();

        let report = String::from_utf8(report).unwrap();
        assert!(report.contains(&format!("{count} records")));
        (temp_dir, config)
    }

    #[test]
    fn test_pack_preserves_order() {
        let (_temp, config) = packed(10, 3);

        let paths = discover_shards(&config.dataset.src, "lmdb").unwrap();
        assert_eq!(paths.len(), 3);

        let dataset: ShardedDataset<GraphRecord> =
            ShardedDataset::open(&config, DistributedContext::single()).unwrap();
        assert_eq!(dataset.shard_lengths(), vec![4, 4, 2]);

        let sids: Vec<i64> = dataset.iter().map(|r| r.unwrap().sid.unwrap()).collect();
        assert_eq!(sids, (0..10).collect::<Vec<i64>>());
    }

    #[test]
    fn test_pack_json_codec() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_jsonl(temp_dir.path(), 4);
        let out_dir = temp_dir.path().join("shards");

        let mut config = ShardsetConfig::for_src(&out_dir);
        config.dataset.codec = Codec::Json;
        pack(&config, &input, &out_dir, 2, &mut Vec::new()).unwrap();

        let dataset: ShardedDataset<GraphRecord> =
            ShardedDataset::open(&config, DistributedContext::single()).unwrap();
        assert_eq!(dataset.len(), 4);
    }

    #[test]
    fn test_pack_rejects_zero_shards() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_jsonl(temp_dir.path(), 1);
        let config = ShardsetConfig::for_src(temp_dir.path());
        assert!(pack(&config, &input, temp_dir.path(), 0, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_pack_reports_bad_line() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("input.jsonl");
        fs::write(&input, "{\"natoms\": 1}\nnot json\n").unwrap();
        let out_dir = temp_dir.path().join("shards");

        let config = ShardsetConfig::for_src(&out_dir);
        let err = pack(&config, &input, &out_dir, 1, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("input.jsonl:2"));
    }

    #[test]
    fn test_coverage_counts_dropped_tail() {
        // 11 records in 4 shards of 3, 3, 3, 2; world size 3 shares the last shard
        let (_temp, mut config) = packed(11, 4);
        config.distributed.world_size = 3;

        let coverage = compute_coverage(&config).unwrap();
        assert_eq!(coverage.declared, 11);
        assert_eq!(coverage.dropped, 2);
        assert!(coverage.is_complete());
        assert_eq!(
            coverage.ranks.iter().map(|r| r.records).collect::<Vec<_>>(),
            vec![3, 3, 3]
        );
        assert!(coverage.ranks.iter().all(|r| r.shared_shards == 1));
    }

    #[test]
    fn test_coverage_matches_opened_datasets() {
        let (_temp, mut config) = packed(23, 5);
        config.distributed.world_size = 2;
        let coverage = compute_coverage(&config).unwrap();

        for rank in &coverage.ranks {
            let ctx = DistributedContext::new(2, rank.rank).unwrap();
            let dataset: ShardedDataset<GraphRecord> = ShardedDataset::open(&config, ctx).unwrap();
            assert_eq!(dataset.len(), rank.records);
            dataset.close().unwrap();
        }
    }

    #[test]
    fn test_info_report() {
        let (_temp, mut config) = packed(6, 3);
        config.distributed.world_size = 2;
        config.distributed.rank = 1;

        let mut report = Vec::new();
        info(&config, &mut report).unwrap();
        let report = String::from_utf8(report).unwrap();

        assert!(report.contains("shards:      2 of 3"));
        assert!(report.contains("exclusive"));
        assert!(report.contains("shared"));
        assert!(report.contains("records:     3"));
    }

    #[test]
    fn test_get_prints_ids() {
        let (_temp, config) = packed(3, 1);

        let mut report = Vec::new();
        get(&config, &[2], &mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("\"0_2\""));

        assert!(get(&config, &[0, 3], &mut Vec::new()).is_err());
    }
}
