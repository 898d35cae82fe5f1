//! Append-only history of (node index, hash vector) pairs, plus candidate
//! ranking over that history.

use ordered_float::OrderedFloat;

use crate::hasher::{HashVector, Hasher};
use crate::types::NodeIndex;

/// Ordered sequence of `(node index, hash vector)`, appended in ingestion
/// order. Only nodes with non-empty descriptors are appended (per the
/// invariant in spec §3).
#[derive(Default)]
pub struct HashIndex {
    entries: Vec<(NodeIndex, HashVector)>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, index: NodeIndex, hash: HashVector) {
        self.entries.push((index, hash));
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NodeIndex, HashVector)> {
        self.entries.iter()
    }
}

/// Rank hash-index entries by distance to `query`, keeping only entries that
/// respect the `min_neighbour` temporal gap. Ties broken by smaller index.
pub fn rank_candidates(
    index: &HashIndex,
    query: &HashVector,
    current: NodeIndex,
    min_neighbour: usize,
    hasher: &Hasher,
) -> Vec<(NodeIndex, f32)> {
    let mut candidates: Vec<(NodeIndex, f32)> = index
        .iter()
        .filter(|(i, _)| current.get().saturating_sub(i.get()) > min_neighbour)
        .map(|(i, h)| (*i, hasher.distance(query, h)))
        .collect();

    candidates.sort_unstable_by(|a, b| {
        (OrderedFloat(a.1), a.0).cmp(&(OrderedFloat(b.1), b.0))
    });

    candidates
}
