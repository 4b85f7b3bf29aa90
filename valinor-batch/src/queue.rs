use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use valinor_graphtile::GraphId;

/// A fixed list of tiles, handed out one at a time to any number of workers.
///
/// IDs are reduced to their tile (the index part is dropped),
/// and each tile is queued once, at its first occurrence.
/// Every tile is returned by [`TileQueue::pop`] exactly once.
/// Nothing is ever put back, so a failed tile is not retried.
#[derive(Debug)]
pub struct TileQueue {
    graph_ids: Box<[GraphId]>,
    next: Mutex<usize>,
}

impl TileQueue {
    pub fn new(graph_ids: impl IntoIterator<Item = GraphId>) -> Self {
        let mut seen = HashSet::new();
        Self {
            graph_ids: graph_ids
                .into_iter()
                .map(|graph_id| graph_id.tile_base_id())
                .filter(|graph_id| seen.insert(*graph_id))
                .collect(),
            next: Mutex::new(0),
        }
    }

    /// Creates a queue in a (seeded, so reproducible) random order.
    ///
    /// Neighboring tiles tend to be similar in size,
    /// so shuffling spreads the big ones across workers.
    pub fn shuffled(graph_ids: impl IntoIterator<Item = GraphId>, seed: u64) -> Self {
        let mut graph_ids = Self::new(graph_ids).graph_ids;
        graph_ids.shuffle(&mut StdRng::seed_from_u64(seed));
        Self::new(graph_ids.into_vec())
    }

    /// Takes the next tile, or returns `None` once the queue is drained.
    pub fn pop(&self) -> Option<GraphId> {
        // The cursor is a single integer, so a panic elsewhere can't leave it half updated
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let graph_id = self.graph_ids.get(*next).copied()?;
        *next += 1;
        Some(graph_id)
    }

    /// The total number of tiles, including those already taken.
    pub fn len(&self) -> usize {
        self.graph_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph_ids.is_empty()
    }

    /// The number of tiles not yet taken.
    pub fn remaining(&self) -> usize {
        let next = *self.next.lock().unwrap_or_else(PoisonError::into_inner);
        self.graph_ids.len() - next
    }
}
