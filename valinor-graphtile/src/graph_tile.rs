use enumset::EnumSet;
use self_cell::self_cell;
use thiserror::Error;
use zerocopy::{FromBytes, I16, LE, U32};

// Each record type lives in its own internal module; the public types are re-exported here.

mod access_restriction;
mod builder;
mod directed_edge;
mod header;
pub mod layout;
mod node;
pub mod predicted_speed_removal;
pub mod predicted_speeds;

pub use crate::{
    Access,
    graph_id::{GraphId, InvalidGraphIdError},
};
pub use access_restriction::{AccessRestriction, AccessRestrictionType};
pub use builder::GraphTileBuilder;
pub use directed_edge::DirectedEdge;
pub use header::{BIN_COUNT, GraphTileHeader, HeaderFieldOverflow, TILE_VERSION};
pub use layout::{LayoutError, Section, TileLayout};
pub use node::{NodeInfo, NodeTransition};
pub use predicted_speed_removal::{
    PredictedSpeedRemovalError, StrippedTile, strip_predicted_speeds,
};
use predicted_speeds::{PredictedSpeedCodecError, PredictedSpeeds};

#[derive(Debug, Error)]
pub enum GraphTileDecodingError {
    #[error("Data cast failed (this almost always means invalid data): {0}")]
    CastError(String),
    #[error("The header claims the tile is {end_offset} bytes long, but there are only {len}")]
    EndOffsetOutOfBounds { end_offset: u32, len: usize },
    #[error("Invalid graph ID: {0}")]
    GraphIdParseError(#[from] InvalidGraphIdError),
}

#[derive(Debug, Error)]
pub enum GraphTileBuildError {
    #[error("Value for {0} does not fit in its bit field")]
    BitfieldOverflow(&'static str),
    #[error(transparent)]
    HeaderField(#[from] HeaderFieldOverflow),
    #[error("Invalid index: {0}")]
    InvalidIndex(String),
    #[error("The tile would be larger than 4GB")]
    TooLarge,
    #[error("Unable to decode speed profile: {0}")]
    PredictedSpeeds(#[from] PredictedSpeedCodecError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read access to the sections of a graph tile.
///
/// This is the whole contract that tile operations (stats, export, compaction) rely on,
/// so anything that can hand out these slices can be processed.
pub trait GraphTile {
    /// The (base) ID of the tile.
    fn graph_id(&self) -> GraphId;

    /// Gets a reference to the [`GraphTileHeader`].
    fn header(&self) -> &GraphTileHeader;

    /// The raw tile bytes, up to `end_offset`.
    fn memory(&self) -> &[u8];

    fn nodes(&self) -> &[NodeInfo];

    /// Transitions between nodes on different hierarchy levels.
    fn transitions(&self) -> &[NodeTransition];

    /// A raw slice of the tile's directed edges (i.e. for iteration).
    fn directed_edges(&self) -> &[DirectedEdge];

    /// Access restrictions, sorted by directed edge index.
    fn access_restrictions(&self) -> &[AccessRestriction];

    /// The predicted speed sections, if the tile has any profiles.
    fn predicted_speeds(&self) -> Option<PredictedSpeeds<'_>>;

    /// Byte ranges of every section, as the header describes them.
    fn layout(&self) -> TileLayout {
        TileLayout::from_header(self.header())
    }

    /// Gets access restrictions for a directed edge.
    ///
    /// The returned list includes restrictions that apply
    /// to *any* of the supplied access modes (ex: auto, bicycle, etc.).
    fn get_access_restrictions(
        &self,
        directed_edge_index: u32,
        access_modes: EnumSet<Access>,
    ) -> Vec<&AccessRestriction> {
        let restrictions = self.access_restrictions();
        // Everything before this point belongs to lower edge indexes
        let index = restrictions.partition_point(|r| r.edge_index() < directed_edge_index);

        restrictions[index..]
            .iter()
            .take_while(|r| r.edge_index() == directed_edge_index)
            .filter(|r| !r.affected_access_modes().is_disjoint(access_modes))
            .collect()
    }

    /// Gets predicted speed information for a directed edge.
    ///
    /// `seconds_from_start_of_week` is measured from midnight Sunday **local time**.
    /// The output is measured in kilometers per hour.
    /// Returns `None` if the edge at this index does not have predicted speed information.
    fn get_predicted_speed(
        &self,
        directed_edge_index: usize,
        seconds_from_start_of_week: u32,
    ) -> Option<f32> {
        let edge = self.directed_edges().get(directed_edge_index)?;
        if !edge.has_predicted_speed() {
            return None;
        }

        self.predicted_speeds()?
            .speed(directed_edge_index, seconds_from_start_of_week)
    }
}

/// A zero-copy view over the bytes of a single tile.
#[derive(Debug, Clone)]
pub struct GraphTileView<'a> {
    memory: &'a [u8],
    graph_id: GraphId,
    header: GraphTileHeader,
    nodes: &'a [NodeInfo],
    transitions: &'a [NodeTransition],
    directed_edges: &'a [DirectedEdge],
    access_restrictions: &'a [AccessRestriction],
    predicted_speeds: Option<PredictedSpeeds<'a>>,
}

impl GraphTile for GraphTileView<'_> {
    #[inline]
    fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    #[inline]
    fn header(&self) -> &GraphTileHeader {
        &self.header
    }

    #[inline]
    fn memory(&self) -> &[u8] {
        self.memory
    }

    #[inline]
    fn nodes(&self) -> &[NodeInfo] {
        self.nodes
    }

    #[inline]
    fn transitions(&self) -> &[NodeTransition] {
        self.transitions
    }

    #[inline]
    fn directed_edges(&self) -> &[DirectedEdge] {
        self.directed_edges
    }

    #[inline]
    fn access_restrictions(&self) -> &[AccessRestriction] {
        self.access_restrictions
    }

    #[inline]
    fn predicted_speeds(&self) -> Option<PredictedSpeeds<'_>> {
        self.predicted_speeds
    }
}

fn cast_error(e: impl std::fmt::Display) -> GraphTileDecodingError {
    GraphTileDecodingError::CastError(e.to_string())
}

impl<'a> TryFrom<&'a [u8]> for GraphTileView<'a> {
    type Error = GraphTileDecodingError;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        let (header, _) = GraphTileHeader::read_from_prefix(bytes)
            .map_err(|_| cast_error("the buffer is smaller than a tile header"))?;
        let graph_id = header.graph_id()?;

        // Anything past end_offset is not part of the tile
        let memory = bytes.get(..header.end_offset() as usize).ok_or(
            GraphTileDecodingError::EndOffsetOutOfBounds {
                end_offset: header.end_offset(),
                len: bytes.len(),
            },
        )?;
        // Every section is located through the header;
        // records this crate doesn't interpret are skipped over.
        let layout = TileLayout::from_header(&header);
        let section = |kind: Section| -> Result<&'a [u8], GraphTileDecodingError> {
            memory
                .get(layout.range(kind))
                .ok_or_else(|| cast_error(format!("the {kind} section extends past end_offset")))
        };

        // Header section lengths are exact multiples of the record size
        let nodes = <[NodeInfo]>::ref_from_bytes(section(Section::Nodes)?).map_err(cast_error)?;
        let transitions =
            <[NodeTransition]>::ref_from_bytes(section(Section::Transitions)?).map_err(cast_error)?;
        let directed_edges =
            <[DirectedEdge]>::ref_from_bytes(section(Section::DirectedEdges)?).map_err(cast_error)?;
        let access_restrictions =
            <[AccessRestriction]>::ref_from_bytes(section(Section::AccessRestrictions)?)
                .map_err(cast_error)?;

        let predicted_speeds = if header.predicted_speeds_count() > 0 {
            let offsets = <[U32<LE>]>::ref_from_bytes(section(Section::PredictedSpeedIndex)?)
                .map_err(cast_error)?;
            let profiles = <[I16<LE>]>::ref_from_bytes(section(Section::PredictedSpeedProfiles)?)
                .map_err(cast_error)?;

            Some(PredictedSpeeds::new(offsets, profiles))
        } else {
            None
        };

        Ok(Self {
            memory,
            graph_id,
            header,
            nodes,
            transitions,
            directed_edges,
            access_restrictions,
            predicted_speeds,
        })
    }
}

self_cell! {
    /// An owned graph tile.
    ///
    /// An owned graph tile can be constructed from an owned byte array, `Vec<u8>`.
    pub struct OwnedGraphTile {
        owner: Vec<u8>,
        #[covariant]
        dependent: GraphTileView,
    }
}

impl TryFrom<Vec<u8>> for OwnedGraphTile {
    type Error = GraphTileDecodingError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        OwnedGraphTile::try_new(value, |data| GraphTileView::try_from(data.as_slice()))
    }
}

impl GraphTile for OwnedGraphTile {
    #[inline]
    fn graph_id(&self) -> GraphId {
        self.borrow_dependent().graph_id()
    }

    #[inline]
    fn header(&self) -> &GraphTileHeader {
        self.borrow_dependent().header()
    }

    #[inline]
    fn memory(&self) -> &[u8] {
        self.borrow_dependent().memory()
    }

    #[inline]
    fn nodes(&self) -> &[NodeInfo] {
        self.borrow_dependent().nodes()
    }

    #[inline]
    fn transitions(&self) -> &[NodeTransition] {
        self.borrow_dependent().transitions()
    }

    #[inline]
    fn directed_edges(&self) -> &[DirectedEdge] {
        self.borrow_dependent().directed_edges()
    }

    #[inline]
    fn access_restrictions(&self) -> &[AccessRestriction] {
        self.borrow_dependent().access_restrictions()
    }

    #[inline]
    fn predicted_speeds(&self) -> Option<PredictedSpeeds<'_>> {
        self.borrow_dependent().predicted_speeds()
    }
}
