use std::fmt::{Display, Formatter};
use thiserror::Error;
use valinor_graphtile::{GraphId, InvalidGraphIdError};
use valinor_graphtile::graph_tile::{
    GraphTileDecodingError, LayoutError, PredictedSpeedRemovalError,
};
use valinor_graphtile::tile_provider::GraphTileProviderError;

/// Coarse classification of per-tile failures, for logs and reports.
///
/// Every [`TileOperationError`] falls into exactly one of these.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileErrorKind {
    /// The header disagrees with the tile contents, or the bytes can't be read as a tile at all
    /// (corrupt or unsupported tile).
    LayoutMismatch,
    /// Creating, opening, reading or writing a file failed.
    Io,
    /// Offset arithmetic produced an impossible value, or the operation panicked.
    InvariantViolation,
    /// The tile is not in the dataset, or the ID doesn't name a tile.
    NotFound,
}

impl Display for TileErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TileErrorKind::LayoutMismatch => "layout mismatch",
            TileErrorKind::Io => "I/O error",
            TileErrorKind::InvariantViolation => "invariant violation",
            TileErrorKind::NotFound => "not found",
        })
    }
}

/// A failure processing a single tile.
///
/// These never stop a batch; the driver records them and moves on.
#[derive(Debug, Error)]
pub enum TileOperationError {
    #[error("Tile {0} does not exist")]
    NotFound(GraphId),
    #[error("Not a tile in the hierarchy: {0}")]
    InvalidGraphId(#[from] InvalidGraphIdError),
    #[error("Layout mismatch: {0}")]
    LayoutMismatch(String),
    #[error("Layout invariant violated: {0}")]
    InvariantViolation(#[from] LayoutError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The operation panicked; the payload message, if it had one.
    #[error("Tile operation panicked: {0}")]
    Panicked(String),
}

impl TileOperationError {
    pub fn kind(&self) -> TileErrorKind {
        match self {
            TileOperationError::NotFound(_) | TileOperationError::InvalidGraphId(_) => {
                TileErrorKind::NotFound
            }
            TileOperationError::LayoutMismatch(_) => TileErrorKind::LayoutMismatch,
            TileOperationError::InvariantViolation(_) | TileOperationError::Panicked(_) => {
                TileErrorKind::InvariantViolation
            }
            TileOperationError::Io(_) => TileErrorKind::Io,
        }
    }
}

impl From<GraphTileProviderError> for TileOperationError {
    fn from(value: GraphTileProviderError) -> Self {
        match value {
            GraphTileProviderError::TileDoesNotExist(graph_id) => Self::NotFound(graph_id),
            GraphTileProviderError::IoError(e) => Self::Io(e),
            GraphTileProviderError::Enumeration(e) => Self::Io(std::io::Error::other(e)),
            GraphTileProviderError::DecodingError(e) => e.into(),
            GraphTileProviderError::InvalidGraphId(e) => Self::InvalidGraphId(e),
        }
    }
}

// A header that can't be mapped onto the bytes is the same failure as one that disagrees with them
impl From<GraphTileDecodingError> for TileOperationError {
    fn from(value: GraphTileDecodingError) -> Self {
        Self::LayoutMismatch(value.to_string())
    }
}

impl From<PredictedSpeedRemovalError> for TileOperationError {
    fn from(value: PredictedSpeedRemovalError) -> Self {
        match value {
            PredictedSpeedRemovalError::LayoutMismatch(message) => Self::LayoutMismatch(message),
            PredictedSpeedRemovalError::InvariantViolation(e) => Self::InvariantViolation(e),
        }
    }
}

impl From<serde_json::Error> for TileOperationError {
    fn from(value: serde_json::Error) -> Self {
        Self::Io(value.into())
    }
}
