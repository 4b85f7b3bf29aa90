use crate::TileOperationError;
use valinor_graphtile::GraphId;

/// Per-tile results that can be summed across tiles and workers.
///
/// Each worker starts from [`Default::default`] and absorbs the output of every tile it processes;
/// the driver then absorbs each worker's total once.
pub trait Accumulate: Default + Send {
    fn absorb(&mut self, other: Self);
}

/// Discards per-tile results.
impl Accumulate for () {
    fn absorb(&mut self, (): Self) {}
}

/// Work done to a single tile, given a storage handle owned by the calling worker.
///
/// Operations are shared by reference across every worker thread,
/// so any state they keep must be thread safe.
pub trait TileOperation<P>: Sync {
    type Output: Accumulate;

    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Processes one tile.
    ///
    /// # Errors
    ///
    /// Any failure is scoped to this tile; the driver logs it and moves on to the next one.
    fn process(&self, provider: &P, graph_id: GraphId) -> Result<Self::Output, TileOperationError>;
}
