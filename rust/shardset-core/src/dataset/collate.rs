// rust/shardset-core/src/dataset/collate.rs

//! Merging individually read records into batches.

use crate::error::{Result, ShardsetError};
use crate::record::{EdgeIndex, GraphRecord, Record};

/// Records that can be merged field by field into one batch value.
pub trait Collate: Record + Sized {
    type Batch;

    /// Concatenates `records`, preserving their order.
    fn from_data_list(records: Vec<Self>) -> Self::Batch;
}

/// A collated batch plus the per-record neighbor counts, when derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Collated<B> {
    pub batch: B,
    /// Number of edges (target-row entries) of each record, in batch order.
    /// `None` when graphs are built on the fly or a record lacks edges.
    pub neighbors: Option<Vec<usize>>,
}

/// Neighbor count of every record, failing on the first record without an
/// edge index.
pub fn neighbor_counts<R: Record>(records: &[R]) -> Result<Vec<usize>> {
    records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            record
                .edge_index()
                .map(EdgeIndex::num_edges)
                .ok_or(ShardsetError::MissingGraphField { position })
        })
        .collect()
}

/// Collates `records` into one batch.
///
/// Unless `otf_graph` is set, neighbor counts are derived from each record's
/// edge index. A single record without one disables the counts for the
/// whole batch; that is logged and the batch is still returned.
pub fn collate<R: Collate>(records: Vec<R>, otf_graph: bool) -> Collated<R::Batch> {
    let neighbors = if otf_graph {
        None
    } else {
        match neighbor_counts(&records) {
            Ok(counts) => Some(counts),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    };

    Collated {
        batch: R::from_data_list(records),
        neighbors,
    }
}

/// Several [`GraphRecord`]s laid end to end.
///
/// Per-atom fields are concatenated and `batch` maps every atom to the
/// position of its record. Optional per-record fields are kept only when
/// every record has them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphBatch {
    pub ids: Vec<Option<String>>,
    pub sid: Vec<Option<i64>>,
    pub fid: Vec<Option<i64>>,
    pub natoms: Vec<usize>,
    pub atomic_numbers: Vec<u32>,
    pub pos: Vec<[f32; 3]>,
    pub batch: Vec<usize>,
    pub cell: Option<Vec<[[f32; 3]; 3]>>,
    pub y: Option<Vec<f64>>,
    pub force: Option<Vec<[f32; 3]>>,
    pub tags: Vec<i64>,
    pub fixed: Vec<bool>,
    /// Edges with node indices shifted into the concatenated atom numbering.
    pub edge_index: Option<EdgeIndex>,
    pub cell_offsets: Option<Vec<[i32; 3]>>,
}

impl GraphBatch {
    /// Number of records in the batch.
    pub fn num_graphs(&self) -> usize {
        self.natoms.len()
    }
}

impl Collate for GraphRecord {
    type Batch = GraphBatch;

    fn from_data_list(records: Vec<Self>) -> GraphBatch {
        let all_have = |f: fn(&GraphRecord) -> bool| records.iter().all(f);
        let keep_cell = all_have(|r| r.cell.is_some());
        let keep_y = all_have(|r| r.y.is_some());
        let keep_force = all_have(|r| r.force.is_some());
        let keep_edges = all_have(|r| r.edge_index.is_some());
        let keep_offsets = all_have(|r| r.cell_offsets.is_some());

        let mut out = GraphBatch {
            cell: keep_cell.then(Vec::new),
            y: keep_y.then(Vec::new),
            force: keep_force.then(Vec::new),
            edge_index: keep_edges.then(EdgeIndex::default),
            cell_offsets: keep_offsets.then(Vec::new),
            ..Default::default()
        };

        let mut node_offset = 0i64;
        for (graph, record) in records.into_iter().enumerate() {
            out.ids.push(record.id);
            out.sid.push(record.sid);
            out.fid.push(record.fid);
            out.natoms.push(record.natoms);
            out.batch.extend(std::iter::repeat(graph).take(record.natoms));
            out.atomic_numbers.extend(record.atomic_numbers);
            out.pos.extend(record.pos);
            out.tags.extend(record.tags);
            out.fixed.extend(record.fixed);

            if let (Some(cells), Some(cell)) = (out.cell.as_mut(), record.cell) {
                cells.push(cell);
            }
            if let (Some(ys), Some(y)) = (out.y.as_mut(), record.y) {
                ys.push(y);
            }
            if let (Some(forces), Some(force)) = (out.force.as_mut(), record.force) {
                forces.extend(force);
            }
            if let (Some(edges), Some(local)) = (out.edge_index.as_mut(), record.edge_index) {
                let shifted = local.shifted(node_offset);
                edges.source.extend(shifted.source);
                edges.target.extend(shifted.target);
            }
            if let (Some(offsets), Some(local)) = (out.cell_offsets.as_mut(), record.cell_offsets) {
                offsets.extend(local);
            }

            node_offset += record.natoms as i64;
        }

        out
    }
}
