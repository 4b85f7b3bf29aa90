use crate::TileOperationError;
use crate::operation::TileOperation;
use tracing::debug;
use valinor_graphtile::GraphId;
use valinor_graphtile::graph_tile::strip_predicted_speeds;
use valinor_graphtile::tile_provider::{GraphTileProvider, GraphTileWriter};

/// Strips predicted traffic from tiles, rewriting each one in place.
///
/// The rewrite is not atomic, so nothing else may read the dataset while this runs.
#[derive(Debug, Default, Copy, Clone)]
pub struct RemovePredictedSpeeds;

impl<P: GraphTileProvider + GraphTileWriter> TileOperation<P> for RemovePredictedSpeeds {
    type Output = ();

    fn name(&self) -> &'static str {
        "remove-predicted-traffic"
    }

    fn process(&self, provider: &P, graph_id: GraphId) -> Result<(), TileOperationError> {
        provider.with_tile(graph_id, |tile| -> Result<(), TileOperationError> {
            let stripped = strip_predicted_speeds(tile)?;
            // The tile is already in memory, so it's safe to replace the file
            provider.overwrite_tile_in_place(graph_id, &stripped.sections())?;

            debug!(
                tile = %graph_id,
                bytes_removed = stripped.bytes_removed(),
                edges_cleared = stripped.edges_cleared(),
                "Removed predicted speeds"
            );
            Ok(())
        })?
    }
}
