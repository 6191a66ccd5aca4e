// rust/shardset-core/src/record.rs

//! Record payloads stored in shards.
//!
//! The dataset layer only needs two things from a payload: a provenance id
//! it can overwrite on every read, and optionally the edge connectivity used
//! to derive neighbor counts at collation time. Everything else is schema.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A structured payload that can be read from a shard.
pub trait Record: Serialize + DeserializeOwned + Send {
    /// Provenance id of the form `"{shard_index}_{local_offset}"`, if stamped.
    fn id(&self) -> Option<&str>;

    /// Overwrites the provenance id.
    fn set_id(&mut self, id: String);

    /// Edge connectivity, when the record carries a precomputed graph.
    fn edge_index(&self) -> Option<&EdgeIndex> {
        None
    }
}

/// Edge connectivity as two parallel rows of node indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeIndex {
    /// Source node of each edge.
    pub source: Vec<i64>,
    /// Target node of each edge.
    pub target: Vec<i64>,
}

impl EdgeIndex {
    pub fn new(source: Vec<i64>, target: Vec<i64>) -> Self {
        Self { source, target }
    }

    /// Number of entries in the target row.
    pub fn num_edges(&self) -> usize {
        self.target.len()
    }

    /// Copy with every node index shifted by `offset`.
    pub fn shifted(&self, offset: i64) -> Self {
        Self {
            source: self.source.iter().map(|n| n + offset).collect(),
            target: self.target.iter().map(|n| n + offset).collect(),
        }
    }
}

/// One atomistic structure: atoms, their positions, and optional labels
/// and graph connectivity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphRecord {
    pub id: Option<String>,
    /// System id of the originating trajectory.
    pub sid: Option<i64>,
    /// Frame id within the trajectory.
    pub fid: Option<i64>,
    pub natoms: usize,
    pub atomic_numbers: Vec<u32>,
    pub pos: Vec<[f32; 3]>,
    pub cell: Option<[[f32; 3]; 3]>,
    /// Energy target.
    pub y: Option<f64>,
    /// Per-atom force targets.
    pub force: Option<Vec<[f32; 3]>>,
    pub tags: Vec<i64>,
    pub fixed: Vec<bool>,
    pub edge_index: Option<EdgeIndex>,
    pub cell_offsets: Option<Vec<[i32; 3]>>,
}

impl Record for GraphRecord {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn edge_index(&self) -> Option<&EdgeIndex> {
        self.edge_index.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    #[test]
    fn test_set_id_overwrites() {
        let mut record = GraphRecord {
            id: Some("stale".to_string()),
            ..Default::default()
        };
        record.set_id("1_1".to_string());
        assert_eq!(record.id(), Some("1_1"));
    }

    #[test]
    fn test_edge_index_shifted() {
        let edges = EdgeIndex::new(vec![0, 1], vec![1, 0]);
        let shifted = edges.shifted(3);
        assert_eq!(shifted.source, vec![3, 4]);
        assert_eq!(shifted.target, vec![4, 3]);
        assert_eq!(shifted.num_edges(), 2);
    }

    #[test]
    fn test_json_fields_default() {
        // Records written by other tools may omit optional fields
        let record: GraphRecord = Codec::Json
            .decode(br#"{"natoms": 2, "atomic_numbers": [1, 8]}"#)
            .unwrap();
        assert_eq!(record.natoms, 2);
        assert!(record.edge_index.is_none());
        assert!(record.id().is_none());
    }

    #[test]
    fn test_bincode_keeps_edge_index() {
        let record = GraphRecord {
            natoms: 2,
            atomic_numbers: vec![1, 1],
            pos: vec![[0.0, 0.0, 0.0], [0.74, 0.0, 0.0]],
            edge_index: Some(EdgeIndex::new(vec![0, 1], vec![1, 0])),
            ..Default::default()
        };
        let bytes = Codec::Bincode.encode(&record).unwrap();
        let decoded: GraphRecord = Codec::Bincode.decode(&bytes).unwrap();
        assert_eq!(decoded.edge_index().map(EdgeIndex::num_edges), Some(2));
    }
}
