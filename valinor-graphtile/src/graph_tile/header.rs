use crate::graph_id::{GraphId, InvalidGraphIdError};
use bitfield_struct::bitfield;
use geo::{Coord, coord};
use std::borrow::Cow;
use thiserror::Error;
use zerocopy::{F32, LE, U32, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, Unaligned};

/// Length of the (NUL padded) version string.
pub const VERSION_LEN: usize = 16;

/// Version written by [`GraphTileBuilder`](super::GraphTileBuilder).
pub const TILE_VERSION: &str = concat!("valinor-", env!("CARGO_PKG_VERSION"));

/// Number of cells in the spatial index grid of each tile.
pub const BIN_COUNT: usize = 25;

// Unused offset slots at the end of the header.
const EMPTY_SLOTS: usize = 11;

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct IdBitfield {
    #[bits(46)]
    graph_id: u64,
    #[bits(4)]
    density: u8,
    #[bits(4)]
    _name_quality: u8,
    #[bits(4)]
    _speed_quality: u8,
    #[bits(4)]
    _exit_quality: u8,
    #[bits(1)]
    has_elevation: u8,
    #[bits(1)]
    has_ext_directed_edge: u8,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct CountsBitfield {
    #[bits(21)]
    node_count: u32,
    #[bits(21)]
    directed_edge_count: u32,
    #[bits(21)]
    predicted_speeds_count: u32,
    #[bits(1)]
    __: u8,
}

#[bitfield(u32,
    repr = U32<LE>,
    from = crate::endian::u32le::from_inner,
    into = crate::endian::u32le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct TransitionCountBitfield {
    #[bits(22)]
    transition_count: u32,
    #[bits(10)]
    __: u16,
}

#[bitfield(u32,
    repr = U32<LE>,
    from = crate::endian::u32le::from_inner,
    into = crate::endian::u32le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct TurnLaneCountBitfield {
    #[bits(21)]
    turn_lane_count: u32,
    #[bits(11)]
    __: u16,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct TransitCountsBitfield {
    #[bits(16)]
    transfer_count: u32,
    #[bits(7)]
    __: u8,
    #[bits(24)]
    departure_count: u32,
    #[bits(16)]
    stop_count: u32,
    #[bits(1)]
    __: u8,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct ScheduleCountsBitfield {
    #[bits(12)]
    route_count: u32,
    #[bits(12)]
    schedule_count: u32,
    #[bits(24)]
    sign_count: u32,
    #[bits(16)]
    __: u16,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct RestrictionCountsBitfield {
    #[bits(24)]
    access_restriction_count: u32,
    #[bits(16)]
    admin_count: u32,
    #[bits(24)]
    __: u32,
}

/// Summary information about the tile: its ID and location, element counts,
/// and the byte offsets of the variable size sections.
///
/// Fixed size sections (nodes, transitions, directed edges, access restrictions,
/// transit records, signs, turn lanes, admins and the edge bins)
/// follow the header back to back, so they are located by their counts alone.
/// The rest are located by the offsets stored here.
/// `end_offset` (`tile_size` on disk) is the total valid length of the tile.
#[derive(FromBytes, IntoBytes, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct GraphTileHeader {
    ids: IdBitfield,
    base_lon_lat: [F32<LE>; 2],
    version: [u8; VERSION_LEN],
    dataset_id: U64<LE>,
    counts: CountsBitfield,
    transition_count: TransitionCountBitfield,
    turn_lane_count: TurnLaneCountBitfield,
    transit_counts: TransitCountsBitfield,
    schedule_counts: ScheduleCountsBitfield,
    restriction_counts: RestrictionCountsBitfield,
    reserved: [U64<LE>; 2],
    complex_restriction_forward_offset: U32<LE>,
    complex_restriction_reverse_offset: U32<LE>,
    edge_info_offset: U32<LE>,
    text_list_offset: U32<LE>,
    create_date: U32<LE>,
    // Cumulative end of each bin, in graph IDs
    bin_offsets: [U32<LE>; BIN_COUNT],
    lane_connectivity_offset: U32<LE>,
    predicted_speeds_offset: U32<LE>,
    tile_size: U32<LE>,
    empty_slots: [U32<LE>; EMPTY_SLOTS],
}

impl GraphTileHeader {
    /// An empty header for the given tile, with its south-west corner at `sw_corner`.
    pub(crate) fn new(graph_id: GraphId, sw_corner: Coord<f32>, dataset_id: u64) -> Self {
        let mut version = [0; VERSION_LEN];
        let len = TILE_VERSION.len().min(VERSION_LEN);
        version[..len].copy_from_slice(&TILE_VERSION.as_bytes()[..len]);

        Self {
            ids: IdBitfield::new().with_graph_id(graph_id.tile_base_id().value()),
            base_lon_lat: [F32::new(sw_corner.x), F32::new(sw_corner.y)],
            version,
            dataset_id: U64::new(dataset_id),
            counts: CountsBitfield::new(),
            transition_count: TransitionCountBitfield::new(),
            turn_lane_count: TurnLaneCountBitfield::new(),
            transit_counts: TransitCountsBitfield::new(),
            schedule_counts: ScheduleCountsBitfield::new(),
            restriction_counts: RestrictionCountsBitfield::new(),
            reserved: [U64::new(0); 2],
            complex_restriction_forward_offset: U32::new(0),
            complex_restriction_reverse_offset: U32::new(0),
            edge_info_offset: U32::new(0),
            text_list_offset: U32::new(0),
            create_date: U32::new(0),
            bin_offsets: [U32::new(0); BIN_COUNT],
            lane_connectivity_offset: U32::new(0),
            predicted_speeds_offset: U32::new(0),
            tile_size: U32::new(0),
            empty_slots: [U32::new(0); EMPTY_SLOTS],
        }
    }

    /// The (base) ID of the tile.
    ///
    /// # Errors
    ///
    /// Fails if the stored value is not a valid graph ID (i.e. a corrupt header).
    #[inline]
    pub const fn graph_id(&self) -> Result<GraphId, InvalidGraphIdError> {
        GraphId::try_from_id(self.ids.graph_id())
    }

    /// The relative road density within this tile (0-15).
    #[inline]
    pub const fn density(&self) -> u8 {
        self.ids.density()
    }

    #[inline]
    pub const fn has_elevation(&self) -> bool {
        self.ids.has_elevation() != 0
    }

    /// Does every directed edge have an extended record after the directed edges?
    #[inline]
    pub const fn has_ext_directed_edge(&self) -> bool {
        self.ids.has_ext_directed_edge() != 0
    }

    /// The south-west corner of the tile; node locations are offsets from here.
    #[inline]
    pub fn sw_corner(&self) -> Coord<f32> {
        coord! { x: self.base_lon_lat[0].get(), y: self.base_lon_lat[1].get() }
    }

    /// Identifies the build the tile came from.
    #[inline]
    pub const fn dataset_id(&self) -> u64 {
        self.dataset_id.get()
    }

    /// The writer's version string, without NUL padding.
    pub fn version(&self) -> Cow<'_, str> {
        let len = self
            .version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(VERSION_LEN);
        String::from_utf8_lossy(&self.version[..len])
    }

    #[inline]
    pub const fn node_count(&self) -> u32 {
        self.counts.node_count()
    }

    #[inline]
    pub const fn directed_edge_count(&self) -> u32 {
        self.counts.directed_edge_count()
    }

    /// The number of predicted speed profiles in the tile.
    ///
    /// Zero means the predicted speed sections are absent entirely.
    #[inline]
    pub const fn predicted_speeds_count(&self) -> u32 {
        self.counts.predicted_speeds_count()
    }

    #[inline]
    pub const fn transition_count(&self) -> u32 {
        self.transition_count.transition_count()
    }

    #[inline]
    pub const fn turn_lane_count(&self) -> u32 {
        self.turn_lane_count.turn_lane_count()
    }

    #[inline]
    pub const fn transfer_count(&self) -> u32 {
        self.transit_counts.transfer_count()
    }

    #[inline]
    pub const fn departure_count(&self) -> u32 {
        self.transit_counts.departure_count()
    }

    #[inline]
    pub const fn stop_count(&self) -> u32 {
        self.transit_counts.stop_count()
    }

    #[inline]
    pub const fn route_count(&self) -> u32 {
        self.schedule_counts.route_count()
    }

    #[inline]
    pub const fn schedule_count(&self) -> u32 {
        self.schedule_counts.schedule_count()
    }

    #[inline]
    pub const fn sign_count(&self) -> u32 {
        self.schedule_counts.sign_count()
    }

    #[inline]
    pub const fn access_restriction_count(&self) -> u32 {
        self.restriction_counts.access_restriction_count()
    }

    #[inline]
    pub const fn admin_count(&self) -> u32 {
        self.restriction_counts.admin_count()
    }

    /// Number of graph IDs in the edge bins (the end of the last bin).
    #[inline]
    pub const fn edge_bin_count(&self) -> u32 {
        self.bin_offsets[BIN_COUNT - 1].get()
    }

    /// Days since the pivot date when the tile was created.
    #[inline]
    pub const fn create_date(&self) -> u32 {
        self.create_date.get()
    }

    #[inline]
    pub const fn complex_restriction_forward_offset(&self) -> u32 {
        self.complex_restriction_forward_offset.get()
    }

    #[inline]
    pub const fn complex_restriction_reverse_offset(&self) -> u32 {
        self.complex_restriction_reverse_offset.get()
    }

    #[inline]
    pub const fn edge_info_offset(&self) -> u32 {
        self.edge_info_offset.get()
    }

    #[inline]
    pub const fn text_list_offset(&self) -> u32 {
        self.text_list_offset.get()
    }

    #[inline]
    pub const fn lane_connectivity_offset(&self) -> u32 {
        self.lane_connectivity_offset.get()
    }

    /// Byte offset of the predicted speed offsets array (zero when absent).
    #[inline]
    pub const fn predicted_speeds_offset(&self) -> u32 {
        self.predicted_speeds_offset.get()
    }

    /// Total length of the tile, in bytes.
    #[inline]
    pub const fn end_offset(&self) -> u32 {
        self.tile_size.get()
    }

    /// Size of the forward complex restriction section, in bytes.
    #[inline]
    pub const fn complex_restriction_forward_size(&self) -> u32 {
        self.complex_restriction_reverse_offset()
            .saturating_sub(self.complex_restriction_forward_offset())
    }

    /// Size of the reverse complex restriction section, in bytes.
    #[inline]
    pub const fn complex_restriction_reverse_size(&self) -> u32 {
        self.edge_info_offset()
            .saturating_sub(self.complex_restriction_reverse_offset())
    }

    // Setters are crate-private; headers are only rewritten by the builder and the remover.

    pub(crate) fn set_counts(
        &mut self,
        node_count: u32,
        directed_edge_count: u32,
        predicted_speeds_count: u32,
    ) -> Result<(), HeaderFieldOverflow> {
        self.counts
            .set_node_count_checked(node_count)
            .map_err(|()| HeaderFieldOverflow("node_count"))?;
        self.counts
            .set_directed_edge_count_checked(directed_edge_count)
            .map_err(|()| HeaderFieldOverflow("directed_edge_count"))?;
        self.counts
            .set_predicted_speeds_count_checked(predicted_speeds_count)
            .map_err(|()| HeaderFieldOverflow("predicted_speeds_count"))
    }

    pub(crate) fn set_transition_count(&mut self, count: u32) -> Result<(), HeaderFieldOverflow> {
        self.transition_count
            .set_transition_count_checked(count)
            .map_err(|()| HeaderFieldOverflow("transition_count"))
    }

    pub(crate) fn set_access_restriction_count(
        &mut self,
        count: u32,
    ) -> Result<(), HeaderFieldOverflow> {
        self.restriction_counts
            .set_access_restriction_count_checked(count)
            .map_err(|()| HeaderFieldOverflow("access_restriction_count"))
    }

    /// Sets the cumulative end of each edge bin, in graph IDs.
    pub(crate) fn set_bin_offsets(&mut self, offsets: [u32; BIN_COUNT]) {
        self.bin_offsets = offsets.map(U32::new);
    }

    #[cfg(test)]
    pub(crate) fn set_has_ext_directed_edge(&mut self, has_ext_directed_edge: bool) {
        self.ids
            .set_has_ext_directed_edge(u8::from(has_ext_directed_edge));
    }

    pub(crate) fn set_section_offsets(&mut self, offsets: SectionOffsets) {
        self.complex_restriction_forward_offset = U32::new(offsets.complex_restriction_forward);
        self.complex_restriction_reverse_offset = U32::new(offsets.complex_restriction_reverse);
        self.edge_info_offset = U32::new(offsets.edge_info);
        self.text_list_offset = U32::new(offsets.text_list);
        self.lane_connectivity_offset = U32::new(offsets.lane_connectivity);
        self.predicted_speeds_offset = U32::new(offsets.predicted_speeds);
        self.tile_size = U32::new(offsets.end);
    }

    /// Marks the predicted speed sections as absent.
    pub(crate) fn clear_predicted_speeds(&mut self) {
        self.counts.set_predicted_speeds_count(0);
        self.predicted_speeds_offset = U32::new(0);
    }

    pub(crate) fn set_end_offset(&mut self, offset: u32) {
        self.tile_size = U32::new(offset);
    }
}

/// Byte offsets of the variable size sections.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SectionOffsets {
    pub complex_restriction_forward: u32,
    pub complex_restriction_reverse: u32,
    pub edge_info: u32,
    pub text_list: u32,
    pub lane_connectivity: u32,
    pub predicted_speeds: u32,
    pub end: u32,
}

#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
#[error("{0} does not fit in its header field")]
pub struct HeaderFieldOverflow(pub &'static str);
