//! # Tile layout
//!
//! Pure arithmetic over the header: where each section lives,
//! how big it is, and what `end_offset` becomes when predicted speeds are removed.
//! Nothing in here touches tile memory.

use super::predicted_speeds::COEFFICIENT_COUNT;
use super::{AccessRestriction, DirectedEdge, GraphTileHeader, NodeInfo, NodeTransition};
use crate::GraphId;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

// Records that are carried through without being interpreted, by size in bytes.
const DIRECTED_EDGE_EXT_SIZE: usize = 8;
const TRANSIT_DEPARTURE_SIZE: usize = 24;
const TRANSIT_STOP_SIZE: usize = 8;
const TRANSIT_ROUTE_SIZE: usize = 40;
const TRANSIT_SCHEDULE_SIZE: usize = 16;
const TRANSIT_TRANSFER_SIZE: usize = 12;
const SIGN_SIZE: usize = 8;
const TURN_LANE_SIZE: usize = 8;
const ADMIN_SIZE: usize = 16;

/// The sections of a tile, in layout order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Section {
    Header,
    Nodes,
    Transitions,
    DirectedEdges,
    /// One extension record per directed edge, only when the header flags them.
    DirectedEdgeExts,
    AccessRestrictions,
    TransitDepartures,
    TransitStops,
    TransitRoutes,
    TransitSchedules,
    TransitTransfers,
    Signs,
    TurnLanes,
    Admins,
    /// Graph IDs of the edges in each cell of the tile's spatial index.
    EdgeBins,
    ComplexRestrictionsForward,
    ComplexRestrictionsReverse,
    EdgeInfo,
    TextList,
    LaneConnectivity,
    /// One `u32` per directed edge: the start of the edge's profile, in coefficients.
    PredictedSpeedIndex,
    /// [`COEFFICIENT_COUNT`] `i16`s per profile.
    PredictedSpeedProfiles,
}

impl Section {
    pub const COUNT: usize = 22;

    /// Every section, in layout order.
    pub const ALL: [Section; Self::COUNT] = [
        Self::Header,
        Self::Nodes,
        Self::Transitions,
        Self::DirectedEdges,
        Self::DirectedEdgeExts,
        Self::AccessRestrictions,
        Self::TransitDepartures,
        Self::TransitStops,
        Self::TransitRoutes,
        Self::TransitSchedules,
        Self::TransitTransfers,
        Self::Signs,
        Self::TurnLanes,
        Self::Admins,
        Self::EdgeBins,
        Self::ComplexRestrictionsForward,
        Self::ComplexRestrictionsReverse,
        Self::EdgeInfo,
        Self::TextList,
        Self::LaneConnectivity,
        Self::PredictedSpeedIndex,
        Self::PredictedSpeedProfiles,
    ];

    /// Size of one element of the section, in bytes.
    ///
    /// Opaque byte sections count single bytes.
    pub const fn record_size(self) -> usize {
        match self {
            Self::Header => size_of::<GraphTileHeader>(),
            Self::Nodes => size_of::<NodeInfo>(),
            Self::Transitions => size_of::<NodeTransition>(),
            Self::DirectedEdges => size_of::<DirectedEdge>(),
            Self::DirectedEdgeExts => DIRECTED_EDGE_EXT_SIZE,
            Self::AccessRestrictions => size_of::<AccessRestriction>(),
            Self::TransitDepartures => TRANSIT_DEPARTURE_SIZE,
            Self::TransitStops => TRANSIT_STOP_SIZE,
            Self::TransitRoutes => TRANSIT_ROUTE_SIZE,
            Self::TransitSchedules => TRANSIT_SCHEDULE_SIZE,
            Self::TransitTransfers => TRANSIT_TRANSFER_SIZE,
            Self::Signs => SIGN_SIZE,
            Self::TurnLanes => TURN_LANE_SIZE,
            Self::Admins => ADMIN_SIZE,
            Self::EdgeBins => size_of::<GraphId>(),
            Self::ComplexRestrictionsForward
            | Self::ComplexRestrictionsReverse
            | Self::EdgeInfo
            | Self::TextList
            | Self::LaneConnectivity => 1,
            Self::PredictedSpeedIndex => size_of::<u32>(),
            Self::PredictedSpeedProfiles => COEFFICIENT_COUNT * size_of::<i16>(),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Nodes => "nodes",
            Self::Transitions => "node transitions",
            Self::DirectedEdges => "directed edges",
            Self::DirectedEdgeExts => "directed edge extensions",
            Self::AccessRestrictions => "access restrictions",
            Self::TransitDepartures => "transit departures",
            Self::TransitStops => "transit stops",
            Self::TransitRoutes => "transit routes",
            Self::TransitSchedules => "transit schedules",
            Self::TransitTransfers => "transit transfers",
            Self::Signs => "signs",
            Self::TurnLanes => "turn lanes",
            Self::Admins => "admins",
            Self::EdgeBins => "edge bins",
            Self::ComplexRestrictionsForward => "forward complex restrictions",
            Self::ComplexRestrictionsReverse => "reverse complex restrictions",
            Self::EdgeInfo => "edge info",
            Self::TextList => "text list",
            Self::LaneConnectivity => "lane connectivity",
            Self::PredictedSpeedIndex => "predicted speed index",
            Self::PredictedSpeedProfiles => "predicted speed profiles",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error(
        "removing {removed} bytes from a tile ending at {end_offset} is impossible (predicted speeds start at {predicted_speeds_offset})"
    )]
    InvariantViolation {
        end_offset: u32,
        removed: usize,
        predicted_speeds_offset: u32,
    },
    #[error("the {section} section spans {start}..{end}, but the previous section ends at {expected_start}")]
    Discontiguous {
        section: Section,
        start: usize,
        end: usize,
        expected_start: usize,
    },
    #[error("end_offset is {end_offset}, but the sections add up to {expected}")]
    EndOffsetMismatch { end_offset: u32, expected: usize },
}

/// Size of a section with `count` elements, in bytes.
#[inline]
pub const fn section_size(kind: Section, count: usize) -> usize {
    kind.record_size().saturating_mul(count)
}

/// Bytes occupied by the predicted speed index and profiles.
///
/// Every directed edge has a slot in the index, whether or not it has a profile.
/// A tile without profiles has neither section.
pub const fn predicted_speed_span(directed_edge_count: u32, profile_count: u32) -> usize {
    if profile_count == 0 {
        0
    } else {
        section_size(Section::PredictedSpeedIndex, directed_edge_count as usize)
            + section_size(Section::PredictedSpeedProfiles, profile_count as usize)
    }
}

/// The tile length after cutting `removed` bytes off the end.
///
/// # Errors
///
/// Fails if the result would be negative, or would end before the predicted speeds start
/// (when `predicted_speeds_offset` is non-zero).
pub fn recompute_end_offset(
    end_offset: u32,
    removed: usize,
    predicted_speeds_offset: u32,
) -> Result<u32, LayoutError> {
    let violation = || LayoutError::InvariantViolation {
        end_offset,
        removed,
        predicted_speeds_offset,
    };

    let new_end = (end_offset as usize)
        .checked_sub(removed)
        .ok_or_else(violation)?;
    if predicted_speeds_offset != 0 && new_end < predicted_speeds_offset as usize {
        return Err(violation());
    }

    u32::try_from(new_end).map_err(|_| violation())
}

/// Byte ranges of every section of a tile, as described by its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    ranges: [Range<usize>; Section::COUNT],
    end_offset: u32,
}

impl TileLayout {
    pub fn from_header(header: &GraphTileHeader) -> Self {
        let mut ranges: [Range<usize>; Section::COUNT] = Default::default();
        let edge_count = header.directed_edge_count();
        let ext_count = if header.has_ext_directed_edge() {
            edge_count
        } else {
            0
        };

        // Fixed size records follow the header back to back
        let mut cursor = 0;
        for (section, count) in [
            (Section::Header, 1),
            (Section::Nodes, header.node_count()),
            (Section::Transitions, header.transition_count()),
            (Section::DirectedEdges, edge_count),
            (Section::DirectedEdgeExts, ext_count),
            (Section::AccessRestrictions, header.access_restriction_count()),
            (Section::TransitDepartures, header.departure_count()),
            (Section::TransitStops, header.stop_count()),
            (Section::TransitRoutes, header.route_count()),
            (Section::TransitSchedules, header.schedule_count()),
            (Section::TransitTransfers, header.transfer_count()),
            (Section::Signs, header.sign_count()),
            (Section::TurnLanes, header.turn_lane_count()),
            (Section::Admins, header.admin_count()),
            (Section::EdgeBins, header.edge_bin_count()),
        ] {
            let end = cursor + section_size(section, count as usize);
            ranges[section as usize] = cursor..end;
            cursor = end;
        }

        let end_offset = header.end_offset() as usize;
        let has_predicted_speeds = header.predicted_speeds_count() > 0;
        let lane_connectivity_end = if has_predicted_speeds {
            header.predicted_speeds_offset() as usize
        } else {
            end_offset
        };

        // Variable size sections run from their offset to the next one
        let offsets = [
            (
                Section::ComplexRestrictionsForward,
                header.complex_restriction_forward_offset(),
            ),
            (
                Section::ComplexRestrictionsReverse,
                header.complex_restriction_reverse_offset(),
            ),
            (Section::EdgeInfo, header.edge_info_offset()),
            (Section::TextList, header.text_list_offset()),
            (Section::LaneConnectivity, header.lane_connectivity_offset()),
        ];
        for (i, &(section, start)) in offsets.iter().enumerate() {
            let end = offsets
                .get(i + 1)
                .map_or(lane_connectivity_end, |&(_, next)| next as usize);
            ranges[section as usize] = start as usize..end;
        }

        if has_predicted_speeds {
            let index_end = lane_connectivity_end
                + section_size(Section::PredictedSpeedIndex, edge_count as usize);
            let profiles_end = index_end
                + section_size(
                    Section::PredictedSpeedProfiles,
                    header.predicted_speeds_count() as usize,
                );
            ranges[Section::PredictedSpeedIndex as usize] = lane_connectivity_end..index_end;
            ranges[Section::PredictedSpeedProfiles as usize] = index_end..profiles_end;
        } else {
            ranges[Section::PredictedSpeedIndex as usize] = end_offset..end_offset;
            ranges[Section::PredictedSpeedProfiles as usize] = end_offset..end_offset;
        }

        Self {
            ranges,
            end_offset: header.end_offset(),
        }
    }

    /// The byte range of a section.
    #[inline]
    pub fn range(&self, section: Section) -> Range<usize> {
        self.ranges[section as usize].clone()
    }

    #[inline]
    pub const fn end_offset(&self) -> u32 {
        self.end_offset
    }

    /// Checks that the sections are contiguous, in layout order,
    /// and that `end_offset` is exactly the sum of their sizes.
    ///
    /// # Errors
    ///
    /// Returns the first section that doesn't line up.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let mut expected_start = 0;
        for section in Section::ALL {
            let Range { start, end } = self.range(section);
            if start != expected_start || end < start {
                return Err(LayoutError::Discontiguous {
                    section,
                    start,
                    end,
                    expected_start,
                });
            }
            expected_start = end;
        }

        if expected_start == self.end_offset as usize {
            Ok(())
        } else {
            Err(LayoutError::EndOffsetMismatch {
                end_offset: self.end_offset,
                expected: expected_start,
            })
        }
    }
}
