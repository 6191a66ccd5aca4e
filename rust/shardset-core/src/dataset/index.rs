// rust/shardset-core/src/dataset/index.rs

//! Global-to-local index mapping.
//!
//! Everything here is pure: owned keys are derived from a shard's declared
//! length, and a [`GlobalIndex`] is a prefix sum over owned lengths, so the
//! whole mapping can be tested without opening a single store.

use crate::config::DistributedContext;
use crate::error::{Result, ShardsetError};

use super::partition::Ownership;

/// The local keys a rank owns in one shard, held as an arithmetic
/// progression `start, start + step, ...` of `len` terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStride {
    start: u64,
    step: u64,
    len: u64,
}

impl KeyStride {
    /// Keys `0..declared_length`.
    pub fn full(declared_length: u64) -> Self {
        Self {
            start: 0,
            step: 1,
            len: declared_length,
        }
    }

    /// Keys `rank, rank + world_size, ...` below the largest multiple of
    /// `world_size` not exceeding `declared_length`. Records past that
    /// multiple are read by no rank.
    pub fn strided(declared_length: u64, ctx: DistributedContext) -> Self {
        let world_size = u64::from(ctx.world_size());
        let trimmed = declared_length - declared_length % world_size;
        Self {
            start: u64::from(ctx.rank()),
            step: world_size,
            len: trimmed / world_size,
        }
    }

    /// Keys owned under `ownership`.
    pub fn for_ownership(
        ownership: Ownership,
        declared_length: u64,
        ctx: DistributedContext,
    ) -> Self {
        match ownership {
            Ownership::Exclusive => Self::full(declared_length),
            Ownership::Shared => Self::strided(declared_length, ctx),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Key at position `offset` of the sequence.
    pub fn get(&self, offset: u64) -> Option<u64> {
        (offset < self.len).then(|| self.start + offset * self.step)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> {
        let Self { start, step, len } = *self;
        (0..len).map(move |offset| start + offset * step)
    }
}

/// Location of a record inside this rank's shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedLocation {
    /// Position of the shard in the rank's shard order.
    pub shard_index: usize,
    /// Position within the shard's owned-key sequence.
    pub local_offset: u64,
}

impl ResolvedLocation {
    /// Provenance id stamped on records read from this location.
    pub fn provenance_id(&self) -> String {
        format!("{}_{}", self.shard_index, self.local_offset)
    }
}

/// Prefix sums over per-shard owned lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalIndex {
    cumulative: Vec<u64>,
}

impl GlobalIndex {
    /// Builds the index from the owned length of each shard, in shard order.
    pub fn from_lengths(lengths: impl IntoIterator<Item = u64>) -> Self {
        let cumulative = lengths
            .into_iter()
            .scan(0u64, |total, len| {
                *total += len;
                Some(*total)
            })
            .collect();
        Self { cumulative }
    }

    /// Total number of records addressed.
    pub fn len(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_shards(&self) -> usize {
        self.cumulative.len()
    }

    pub fn cumulative_lengths(&self) -> &[u64] {
        &self.cumulative
    }

    /// Maps a global index to its shard and offset.
    ///
    /// The shard is the first whose cumulative length exceeds `index`, found
    /// by binary search.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index >= self.len()`.
    pub fn resolve(&self, index: u64) -> Result<ResolvedLocation> {
        let len = self.len();
        if index >= len {
            return Err(ShardsetError::index_out_of_range(index, len));
        }

        let shard_index = self.cumulative.partition_point(|&c| c <= index);
        let preceding = match shard_index {
            0 => 0,
            i => self.cumulative[i - 1],
        };

        Ok(ResolvedLocation {
            shard_index,
            local_offset: index - preceding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ctx(world_size: u32, rank: u32) -> DistributedContext {
        DistributedContext::new(world_size, rank).unwrap()
    }

    #[test]
    fn test_full_keys() {
        let keys = KeyStride::full(4);
        assert_eq!(keys.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(keys.get(3), Some(3));
        assert_eq!(keys.get(4), None);
    }

    #[test]
    fn test_strided_keys_drop_tail() {
        // Declared length 10 across 3 ranks trims to 9
        let owned: Vec<Vec<u64>> = (0..3)
            .map(|rank| KeyStride::strided(10, ctx(3, rank)).iter().collect())
            .collect();

        assert_eq!(owned[0], vec![0, 3, 6]);
        assert_eq!(owned[1], vec![1, 4, 7]);
        assert_eq!(owned[2], vec![2, 5, 8]);
        assert!(owned.iter().all(|keys| !keys.contains(&9)));
    }

    #[test]
    fn test_strided_shorter_than_world() {
        let keys = KeyStride::strided(2, ctx(4, 1));
        assert!(keys.is_empty());
        assert_eq!(keys.get(0), None);
    }

    #[test]
    fn test_strided_single_rank_is_full() {
        assert_eq!(
            KeyStride::strided(7, DistributedContext::single()).iter().collect::<Vec<_>>(),
            KeyStride::full(7).iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_strided_keys_disjoint_across_ranks() {
        let world_size = 4;
        let declared = 103;
        let mut seen = HashSet::new();
        for rank in 0..world_size {
            for key in KeyStride::strided(declared, ctx(world_size, rank)).iter() {
                assert!(seen.insert(key), "key {key} owned twice");
            }
        }
        assert_eq!(seen.len() as u64, declared - declared % u64::from(world_size));
    }

    #[test]
    fn test_cumulative_lengths() {
        let index = GlobalIndex::from_lengths([5, 0, 3]);
        assert_eq!(index.cumulative_lengths(), &[5, 5, 8]);
        assert_eq!(index.len(), 8);
        assert_eq!(index.num_shards(), 3);
    }

    #[test]
    fn test_resolve_two_shards() {
        let index = GlobalIndex::from_lengths([5, 3]);

        let loc = index.resolve(6).unwrap();
        assert_eq!(loc.shard_index, 1);
        assert_eq!(loc.local_offset, 1);
        assert_eq!(loc.provenance_id(), "1_1");

        let loc = index.resolve(4).unwrap();
        assert_eq!((loc.shard_index, loc.local_offset), (0, 4));

        let loc = index.resolve(5).unwrap();
        assert_eq!((loc.shard_index, loc.local_offset), (1, 0));
    }

    #[test]
    fn test_resolve_boundaries() {
        let index = GlobalIndex::from_lengths([5, 3]);
        assert!(index.resolve(0).is_ok());
        assert!(index.resolve(7).is_ok());
        assert!(matches!(
            index.resolve(8),
            Err(ShardsetError::IndexOutOfRange { index: 8, len: 8 })
        ));
        assert!(index.resolve(u64::MAX).is_err());
    }

    #[test]
    fn test_resolve_skips_empty_shards() {
        let index = GlobalIndex::from_lengths([0, 2, 0, 0, 1]);
        let shards: Vec<usize> = (0..index.len())
            .map(|i| index.resolve(i).unwrap().shard_index)
            .collect();
        assert_eq!(shards, vec![1, 1, 4]);
    }

    #[test]
    fn test_resolve_empty_index() {
        let index = GlobalIndex::from_lengths(Vec::new());
        assert!(index.is_empty());
        assert!(index.resolve(0).is_err());
    }

    #[test]
    fn test_resolve_is_bijection() {
        let lengths = [4u64, 1, 0, 7, 2];
        let index = GlobalIndex::from_lengths(lengths);

        let resolved: HashSet<(usize, u64)> = (0..index.len())
            .map(|i| {
                let loc = index.resolve(i).unwrap();
                (loc.shard_index, loc.local_offset)
            })
            .collect();

        let expected: HashSet<(usize, u64)> = lengths
            .iter()
            .enumerate()
            .flat_map(|(shard, &len)| (0..len).map(move |offset| (shard, offset)))
            .collect();

        assert_eq!(resolved.len() as u64, index.len());
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_resolve_deterministic() {
        let a = GlobalIndex::from_lengths([3, 9, 2]);
        let b = GlobalIndex::from_lengths([3, 9, 2]);
        for i in 0..a.len() {
            assert_eq!(a.resolve(i).unwrap(), b.resolve(i).unwrap());
            assert_eq!(a.resolve(i).unwrap(), a.resolve(i).unwrap());
        }
    }
}
