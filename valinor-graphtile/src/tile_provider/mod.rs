//! # Graph tile providers
//!
//! Providers locate tiles by graph ID and hand out parsed views of them.
//! Writable providers can also replace a tile in place.

use crate::GraphId;
use crate::graph_id::InvalidGraphIdError;
use crate::graph_tile::{GraphTileDecodingError, GraphTileView};
use thiserror::Error;

mod directory;

pub use directory::DirectoryGraphTileProvider;

#[derive(Debug, Error)]
pub enum GraphTileProviderError {
    #[error("Tile {0} does not exist")]
    TileDoesNotExist(GraphId),
    #[error("Invalid graph ID: {0}")]
    InvalidGraphId(#[from] InvalidGraphIdError),
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Decoding error: {0}")]
    DecodingError(#[from] GraphTileDecodingError),
    #[error("Unable to list tiles: {0}")]
    Enumeration(#[from] walkdir::Error),
}

pub trait GraphTileProvider {
    /// Gets the tile containing the given graph ID,
    /// and does some work in a closure which takes the reference as a parameter.
    ///
    /// # Errors
    ///
    /// This operation may fail for several reasons,
    /// including the tile not existing, I/O errors, and more.
    /// Refer to [`GraphTileProviderError`] for details.
    fn with_tile<F, T>(&self, graph_id: GraphId, process: F) -> Result<T, GraphTileProviderError>
    where
        F: FnOnce(&GraphTileView<'_>) -> T;

    /// Lists the base IDs of every tile the provider can load, in ascending order.
    ///
    /// # Errors
    ///
    /// Fails if the underlying storage can't be listed.
    fn enumerate_tiles(&self) -> Result<Vec<GraphId>, GraphTileProviderError>;
}

pub trait GraphTileWriter {
    /// Replaces the tile with the concatenation of `sections`.
    ///
    /// # Errors
    ///
    /// Fails if the tile can't be written.
    fn overwrite_tile_in_place(
        &self,
        graph_id: GraphId,
        sections: &[&[u8]],
    ) -> Result<(), GraphTileProviderError>;
}
