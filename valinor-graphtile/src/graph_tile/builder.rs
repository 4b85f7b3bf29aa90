use super::header::{BIN_COUNT, SectionOffsets};
use super::layout::{Section, section_size};
use super::predicted_speeds::{COEFFICIENT_COUNT, decode_compressed_speeds};
use super::{
    AccessRestriction, DirectedEdge, GraphTileBuildError, GraphTileHeader, NodeInfo,
    NodeTransition,
};
use crate::GraphId;
use crate::tile_hierarchy::TileLevel;
use geo::{Coord, coord};
use std::io::Write;
use zerocopy::{I16, IntoBytes, LE, U32};

/// A builder for constructing new graph tiles.
///
/// Sections are accumulated in memory;
/// the header (counts, section offsets and `end_offset`) is derived when the tile is written,
/// so it always agrees with the data.
#[derive(Debug, Clone)]
pub struct GraphTileBuilder {
    graph_id: GraphId,
    sw_corner: Coord<f32>,
    dataset_id: u64,
    nodes: Vec<NodeInfo>,
    transitions: Vec<NodeTransition>,
    directed_edges: Vec<DirectedEdge>,
    access_restrictions: Vec<AccessRestriction>,
    edge_bins: [Vec<GraphId>; BIN_COUNT],
    complex_forward_restrictions: Vec<u8>,
    complex_reverse_restrictions: Vec<u8>,
    edge_info: Vec<u8>,
    text_list: Vec<u8>,
    lane_connectivity: Vec<u8>,
    /// Empty until the first profile is added; one entry per directed edge after that.
    predicted_speed_offsets: Vec<U32<LE>>,
    /// Raw profile memory (n_profiles x COEFFICIENT_COUNT entries back to back)
    predicted_speed_profiles: Vec<I16<LE>>,
}

impl GraphTileBuilder {
    /// An empty tile.
    ///
    /// Only the tile part of `graph_id` is used.
    /// The south-west corner comes from the tile hierarchy.
    pub fn new(graph_id: GraphId, dataset_id: u64) -> Self {
        let graph_id = graph_id.tile_base_id();
        let sw_corner = TileLevel::for_level(graph_id.level())
            .and_then(|level| level.tiling_system.tile_sw_corner(graph_id.tile_id()))
            .unwrap_or_default();
        // Tile corners sit on a coarse grid, so f32 is exact
        #[expect(clippy::cast_possible_truncation)]
        let sw_corner = coord! { x: sw_corner.x as f32, y: sw_corner.y as f32 };

        Self {
            graph_id,
            sw_corner,
            dataset_id,
            nodes: Vec::new(),
            transitions: Vec::new(),
            directed_edges: Vec::new(),
            access_restrictions: Vec::new(),
            edge_bins: Default::default(),
            complex_forward_restrictions: Vec::new(),
            complex_reverse_restrictions: Vec::new(),
            edge_info: Vec::new(),
            text_list: Vec::new(),
            lane_connectivity: Vec::new(),
            predicted_speed_offsets: Vec::new(),
            predicted_speed_profiles: Vec::new(),
        }
    }

    #[inline]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// The reference point for node locations in this tile.
    #[inline]
    pub fn sw_corner(&self) -> Coord<f32> {
        self.sw_corner
    }

    #[must_use]
    pub fn with_node(mut self, node: NodeInfo) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn with_transition(mut self, transition: NodeTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    #[must_use]
    pub fn with_directed_edge(mut self, edge: DirectedEdge) -> Self {
        self.directed_edges.push(edge);
        if !self.predicted_speed_offsets.is_empty() {
            self.predicted_speed_offsets.push(U32::new(0));
        }
        self
    }

    /// Adds an access restriction, keeping the list sorted by edge index.
    #[must_use]
    pub fn with_access_restriction(mut self, restriction: AccessRestriction) -> Self {
        let index = self
            .access_restrictions
            .partition_point(|r| r.edge_index() <= restriction.edge_index());
        self.access_restrictions.insert(index, restriction);
        self
    }

    /// Sets the edges listed in one cell of the tile's spatial index.
    ///
    /// # Errors
    ///
    /// Fails if `bin` is not below [`BIN_COUNT`].
    pub fn with_edge_bin(
        mut self,
        bin: usize,
        edges: Vec<GraphId>,
    ) -> Result<Self, GraphTileBuildError> {
        let slot = self.edge_bins.get_mut(bin).ok_or_else(|| {
            GraphTileBuildError::InvalidIndex(format!(
                "Edge bin {bin} is out of range (a tile has {BIN_COUNT})"
            ))
        })?;
        *slot = edges;
        Ok(self)
    }

    /// Sets the (opaque) forward and reverse complex restriction sections.
    #[must_use]
    pub fn with_complex_restrictions(mut self, forward: Vec<u8>, reverse: Vec<u8>) -> Self {
        self.complex_forward_restrictions = forward;
        self.complex_reverse_restrictions = reverse;
        self
    }

    #[must_use]
    pub fn with_edge_info(mut self, edge_info: Vec<u8>) -> Self {
        self.edge_info = edge_info;
        self
    }

    #[must_use]
    pub fn with_text_list(mut self, text_list: Vec<u8>) -> Self {
        self.text_list = text_list;
        self
    }

    #[must_use]
    pub fn with_lane_connectivity(mut self, lane_connectivity: Vec<u8>) -> Self {
        self.lane_connectivity = lane_connectivity;
        self
    }

    /// Attaches a predicted speed profile to a directed edge, and flags the edge as having one.
    ///
    /// See the [`crate::graph_tile::predicted_speeds`] module for more details
    /// on predicted speeds.
    ///
    /// # Errors
    ///
    /// Fails if the directed edge index is out of bounds.
    pub fn with_predicted_speeds(
        mut self,
        directed_edge_index: usize,
        coefficients: [i16; COEFFICIENT_COUNT],
    ) -> Result<Self, GraphTileBuildError> {
        let edge_count = self.directed_edges.len();
        let Some(edge) = self.directed_edges.get_mut(directed_edge_index) else {
            return Err(GraphTileBuildError::InvalidIndex(format!(
                "Attempted to set predicted speeds for directed edge index {directed_edge_index}, but tile only has {edge_count} edges"
            )));
        };
        edge.set_has_predicted_speed(true);

        // Profiles aren't deduplicated; each one is appended, so the offset is the current length.
        let offset = u32::try_from(self.predicted_speed_profiles.len())
            .map_err(|_| GraphTileBuildError::TooLarge)?;
        self.predicted_speed_offsets.resize(edge_count, U32::new(0));
        self.predicted_speed_offsets[directed_edge_index] = U32::new(offset);
        self.predicted_speed_profiles
            .extend(coefficients.map(I16::<LE>::new));

        Ok(self)
    }

    /// Adds predicted speeds to a directed edge from a base64 encoded profile.
    ///
    /// # Errors
    ///
    /// Fails if the directed edge index is out of bounds,
    /// or the profile doesn't decode to exactly [`COEFFICIENT_COUNT`] coefficients.
    pub fn with_predicted_encoded_speeds(
        self,
        directed_edge_index: usize,
        encoded: &str,
    ) -> Result<Self, GraphTileBuildError> {
        self.with_predicted_speeds(directed_edge_index, decode_compressed_speeds(encoded)?)
    }

    fn profile_count(&self) -> usize {
        self.predicted_speed_profiles.len() / COEFFICIENT_COUNT
    }

    /// Derives the header from the current contents.
    ///
    /// # Errors
    ///
    /// Fails if a count overflows its header field, or the tile would exceed 4GB.
    pub fn header(&self) -> Result<GraphTileHeader, GraphTileBuildError> {
        fn offset(value: usize) -> Result<u32, GraphTileBuildError> {
            u32::try_from(value).map_err(|_| GraphTileBuildError::TooLarge)
        }

        let mut header = GraphTileHeader::new(self.graph_id, self.sw_corner, self.dataset_id);
        header.set_counts(
            offset(self.nodes.len())?,
            offset(self.directed_edges.len())?,
            offset(self.profile_count())?,
        )?;
        header.set_transition_count(offset(self.transitions.len())?)?;
        header.set_access_restriction_count(offset(self.access_restrictions.len())?)?;

        let mut bin_offsets = [0; BIN_COUNT];
        let mut bin_end = 0;
        for (bin, edges) in bin_offsets.iter_mut().zip(&self.edge_bins) {
            bin_end += edges.len();
            *bin = offset(bin_end)?;
        }
        header.set_bin_offsets(bin_offsets);

        let complex_restriction_forward = section_size(Section::Header, 1)
            + section_size(Section::Nodes, self.nodes.len())
            + section_size(Section::Transitions, self.transitions.len())
            + section_size(Section::DirectedEdges, self.directed_edges.len())
            + section_size(Section::AccessRestrictions, self.access_restrictions.len())
            + section_size(Section::EdgeBins, bin_end);
        let complex_restriction_reverse =
            complex_restriction_forward + self.complex_forward_restrictions.len();
        let edge_info = complex_restriction_reverse + self.complex_reverse_restrictions.len();
        let text_list = edge_info + self.edge_info.len();
        let lane_connectivity = text_list + self.text_list.len();
        let lane_connectivity_end = lane_connectivity + self.lane_connectivity.len();

        let (predicted_speeds, end) = if self.predicted_speed_profiles.is_empty() {
            (0, lane_connectivity_end)
        } else {
            let span = self.predicted_speed_offsets.as_bytes().len()
                + self.predicted_speed_profiles.as_bytes().len();
            (lane_connectivity_end, lane_connectivity_end + span)
        };

        header.set_section_offsets(SectionOffsets {
            complex_restriction_forward: offset(complex_restriction_forward)?,
            complex_restriction_reverse: offset(complex_restriction_reverse)?,
            edge_info: offset(edge_info)?,
            text_list: offset(text_list)?,
            lane_connectivity: offset(lane_connectivity)?,
            predicted_speeds: offset(predicted_speeds)?,
            end: offset(end)?,
        });

        Ok(header)
    }

    /// Writes the tile, section by section.
    ///
    /// # Errors
    ///
    /// Fails if the header can't be derived (see [`GraphTileBuilder::header`]) or on I/O errors.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), GraphTileBuildError> {
        let header = self.header()?;

        writer.write_all(header.as_bytes())?;
        writer.write_all(self.nodes.as_bytes())?;
        writer.write_all(self.transitions.as_bytes())?;
        writer.write_all(self.directed_edges.as_bytes())?;
        writer.write_all(self.access_restrictions.as_bytes())?;
        for bin in &self.edge_bins {
            writer.write_all(bin.as_bytes())?;
        }
        for section in [
            self.complex_forward_restrictions.as_slice(),
            self.complex_reverse_restrictions.as_slice(),
            self.edge_info.as_slice(),
            self.text_list.as_slice(),
            self.lane_connectivity.as_slice(),
            self.predicted_speed_offsets.as_bytes(),
            self.predicted_speed_profiles.as_bytes(),
        ] {
            writer.write_all(section)?;
        }

        Ok(())
    }

    /// Serializes the tile as owned bytes.
    ///
    /// # Errors
    ///
    /// See [`GraphTileBuilder::write_to`].
    pub fn into_bytes(self) -> Result<Vec<u8>, GraphTileBuildError> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}
