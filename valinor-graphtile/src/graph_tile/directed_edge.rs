use super::GraphTileBuildError;
use crate::{Access, GraphId, InvalidGraphIdError, RoadClass, RoadUse, Surface};
use bitfield_struct::bitfield;
use enumset::EnumSet;
use zerocopy::{LE, U32, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, Unaligned};

// Booleans are represented as single bit integers so that any bit pattern is a valid record.
// Fields with a leading underscore are carried through untouched but not exposed.

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct EndpointBitfield {
    #[bits(46)]
    end_node: u64,
    #[bits(8)]
    _restrictions: u8,
    #[bits(7)]
    opposing_edge_index: u8,
    #[bits(1)]
    forward: u8,
    #[bits(1)]
    leaves_tile: u8,
    #[bits(1)]
    _country_crossing: u8,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct RestrictionBitfield {
    #[bits(25)]
    edge_info_offset: u32,
    #[bits(12)]
    access_restrictions: u16,
    #[bits(12)]
    _start_restriction: u16,
    #[bits(12)]
    _end_restriction: u16,
    #[bits(1)]
    complex_restriction: u8,
    #[bits(1)]
    dest_only: u8,
    #[bits(1)]
    no_thru: u8,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct AttributeBitfield {
    #[bits(8)]
    speed: u8,
    #[bits(8)]
    free_flow_speed: u8,
    #[bits(8)]
    constrained_flow_speed: u8,
    #[bits(8)]
    truck_speed: u8,
    #[bits(8)]
    _name_consistency: u8,
    #[bits(6)]
    edge_use: RoadUse,
    #[bits(4)]
    lane_count: u8,
    #[bits(4)]
    density: u8,
    #[bits(3)]
    classification: RoadClass,
    #[bits(3)]
    surface: Surface,
    #[bits(1)]
    toll: u8,
    #[bits(1)]
    roundabout: u8,
    #[bits(1)]
    truck_route: u8,
    #[bits(1)]
    has_predicted_speed: u8,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct AccessBitfield {
    #[bits(12)]
    forward_access: u16,
    #[bits(12)]
    reverse_access: u16,
    #[bits(5)]
    _max_up_slope: u8,
    #[bits(5)]
    _max_down_slope: u8,
    #[bits(3)]
    _sac_scale: u8,
    #[bits(2)]
    _cycle_lane: u8,
    // One bit each: bike network, use sidepath, dismount, sidewalk left,
    // sidewalk right, shoulder, lane connectivity, turn lanes, exit signs
    // and intersection internal.
    #[bits(10)]
    _flags: u16,
    #[bits(1)]
    is_tunnel: u8,
    #[bits(1)]
    is_bridge: u8,
    // Traffic signal, seasonal, dead end, bike share, stop sign, yield sign,
    // HOV type, indoor, lit and HGV destination only.
    #[bits(10)]
    _more_flags: u16,
    #[bits(3)]
    __: u8,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct GeometryBitfield {
    #[bits(24)]
    _turn_type: u32,
    #[bits(8)]
    _edge_to_left: u8,
    #[bits(24)]
    length: u32,
    #[bits(4)]
    _weighted_grade: u8,
    #[bits(4)]
    _curvature: u8,
}

#[bitfield(u32,
    repr = U32<LE>,
    from = crate::endian::u32le::from_inner,
    into = crate::endian::u32le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct HierarchyBitfield {
    #[bits(7)]
    _local_level_edge_index: u8,
    #[bits(7)]
    _local_level_opp_edge_index: u8,
    #[bits(7)]
    _shortcut: u8,
    #[bits(7)]
    _superseded: u8,
    #[bits(1)]
    is_shortcut: u8,
    #[bits(1)]
    _speed_type: u8,
    #[bits(1)]
    _is_named: u8,
    #[bits(1)]
    _link_tag: u8,
}

/// A directed edge within the routing graph.
///
/// Only the attributes needed for routing decisions live here;
/// names and shapes are in the edge info section.
#[derive(FromBytes, IntoBytes, Immutable, Unaligned, Debug, Clone)]
#[repr(C)]
pub struct DirectedEdge {
    endpoint: EndpointBitfield,
    restrictions: RestrictionBitfield,
    attributes: AttributeBitfield,
    access: AccessBitfield,
    geometry: GeometryBitfield,
    // Stop impact between edges, or the transit line ID on transit levels.
    stop_impact_or_line: U32<LE>,
    hierarchy: HierarchyBitfield,
}

impl DirectedEdge {
    /// Creates an edge ending at `end_node`, `length` meters long.
    ///
    /// Every other attribute starts zeroed; use the `with_` methods to fill them in.
    ///
    /// # Errors
    ///
    /// Fails if the length does not fit in 24 bits.
    pub fn try_new(end_node: GraphId, length: u32) -> Result<Self, GraphTileBuildError> {
        Ok(Self {
            endpoint: EndpointBitfield::new().with_end_node(end_node.value()),
            restrictions: RestrictionBitfield::new(),
            attributes: AttributeBitfield::new(),
            access: AccessBitfield::new(),
            geometry: GeometryBitfield::new()
                .with_length_checked(length)
                .map_err(|()| GraphTileBuildError::BitfieldOverflow("length"))?,
            stop_impact_or_line: U32::new(0),
            hierarchy: HierarchyBitfield::new(),
        })
    }

    /// Sets the regular, free flow and constrained flow speeds (kph).
    #[must_use]
    pub fn with_speeds(mut self, speed: u8, free_flow_speed: u8, constrained_flow_speed: u8) -> Self {
        self.attributes = self
            .attributes
            .with_speed(speed)
            .with_free_flow_speed(free_flow_speed)
            .with_constrained_flow_speed(constrained_flow_speed);
        self
    }

    #[must_use]
    pub fn with_truck_speed(mut self, truck_speed: u8) -> Self {
        self.attributes.set_truck_speed(truck_speed);
        self
    }

    #[must_use]
    pub fn with_classification(mut self, classification: RoadClass) -> Self {
        self.attributes.set_classification(classification);
        self
    }

    #[must_use]
    pub fn with_road_use(mut self, road_use: RoadUse) -> Self {
        self.attributes.set_edge_use(road_use);
        self
    }

    #[must_use]
    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.attributes.set_surface(surface);
        self
    }

    /// # Errors
    ///
    /// Fails if the density is larger than 15.
    pub fn with_density(mut self, density: u8) -> Result<Self, GraphTileBuildError> {
        self.attributes = self
            .attributes
            .with_density_checked(density)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("density"))?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Fails if the lane count is larger than 15.
    pub fn with_lane_count(mut self, lane_count: u8) -> Result<Self, GraphTileBuildError> {
        self.attributes = self
            .attributes
            .with_lane_count_checked(lane_count)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("lane_count"))?;
        Ok(self)
    }

    /// Sets the access masks in the direction of the edge and against it.
    #[must_use]
    pub fn with_access(mut self, forward: EnumSet<Access>, reverse: EnumSet<Access>) -> Self {
        self.access = self
            .access
            .with_forward_access(forward.as_repr())
            .with_reverse_access(reverse.as_repr());
        self
    }

    /// Marks the modes which have entries in the access restriction section.
    #[must_use]
    pub fn with_access_restrictions(mut self, modes: EnumSet<Access>) -> Self {
        self.restrictions.set_access_restrictions(modes.as_repr());
        self
    }

    /// # Errors
    ///
    /// Fails if the offset does not fit in 25 bits.
    pub fn with_edge_info_offset(mut self, offset: u32) -> Result<Self, GraphTileBuildError> {
        self.restrictions = self
            .restrictions
            .with_edge_info_offset_checked(offset)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("edge_info_offset"))?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Fails if the index is larger than 127.
    pub fn with_opposing_edge_index(mut self, index: u8) -> Result<Self, GraphTileBuildError> {
        self.endpoint = self
            .endpoint
            .with_opposing_edge_index_checked(index)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("opposing_edge_index"))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_forward(mut self, forward: bool) -> Self {
        self.endpoint.set_forward(u8::from(forward));
        self
    }

    #[must_use]
    pub fn with_shortcut(mut self, is_shortcut: bool) -> Self {
        self.hierarchy.set_is_shortcut(u8::from(is_shortcut));
        self
    }

    #[must_use]
    pub fn with_tunnel(mut self, is_tunnel: bool) -> Self {
        self.access.set_is_tunnel(u8::from(is_tunnel));
        self
    }

    #[must_use]
    pub fn with_bridge(mut self, is_bridge: bool) -> Self {
        self.access.set_is_bridge(u8::from(is_bridge));
        self
    }

    #[must_use]
    pub fn with_toll(mut self, toll: bool) -> Self {
        self.attributes.set_toll(u8::from(toll));
        self
    }

    #[must_use]
    pub fn with_complex_restriction(mut self, complex_restriction: bool) -> Self {
        self.restrictions
            .set_complex_restriction(u8::from(complex_restriction));
        self
    }

    pub(crate) fn set_has_predicted_speed(&mut self, has_predicted_speed: bool) {
        self.attributes
            .set_has_predicted_speed(u8::from(has_predicted_speed));
    }

    /// Drops every trace of predicted traffic from the edge:
    /// the predicted speed flag, and the free flow and constrained flow speeds
    /// (which are derived from the same historical data).
    pub(crate) fn clear_predicted_speed(&mut self) {
        self.attributes = self
            .attributes
            .with_has_predicted_speed(0)
            .with_free_flow_speed(0)
            .with_constrained_flow_speed(0);
    }

    /// The node at the end of this edge.
    ///
    /// # Errors
    ///
    /// Fails on a corrupt record.
    #[inline]
    pub const fn end_node_id(&self) -> Result<GraphId, InvalidGraphIdError> {
        GraphId::try_from_id(self.endpoint.end_node())
    }

    /// Index of the opposing edge among the end node's outbound edges.
    #[inline]
    pub const fn opposing_edge_index(&self) -> u8 {
        self.endpoint.opposing_edge_index()
    }

    /// Is the edge info stored in the direction of this edge?
    #[inline]
    pub const fn forward(&self) -> bool {
        self.endpoint.forward() != 0
    }

    #[inline]
    pub const fn leaves_tile(&self) -> bool {
        self.endpoint.leaves_tile() != 0
    }

    /// Offset into the edge info section.
    #[inline]
    pub const fn edge_info_offset(&self) -> u32 {
        self.restrictions.edge_info_offset()
    }

    /// Modes with entries in the access restriction section.
    #[inline]
    pub fn access_restrictions(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.restrictions.access_restrictions())
    }

    #[inline]
    pub const fn has_complex_restriction(&self) -> bool {
        self.restrictions.complex_restriction() != 0
    }

    /// Is the edge destination-only (ex: private roads)?
    #[inline]
    pub const fn dest_only(&self) -> bool {
        self.restrictions.dest_only() != 0
    }

    /// Does the edge lead into a "no-through" region?
    #[inline]
    pub const fn no_thru(&self) -> bool {
        self.restrictions.no_thru() != 0
    }

    /// The typical edge speed, in kph.
    #[inline]
    pub const fn speed(&self) -> u8 {
        self.attributes.speed()
    }

    /// The speed when there is no traffic (ex: at night), in kph.
    ///
    /// Zero means unknown.
    #[inline]
    pub const fn free_flow_speed(&self) -> u8 {
        self.attributes.free_flow_speed()
    }

    /// The speed in congested conditions, in kph.
    ///
    /// Zero means unknown.
    #[inline]
    pub const fn constrained_flow_speed(&self) -> u8 {
        self.attributes.constrained_flow_speed()
    }

    #[inline]
    pub const fn truck_speed(&self) -> u8 {
        self.attributes.truck_speed()
    }

    #[inline]
    pub const fn road_use(&self) -> RoadUse {
        self.attributes.edge_use()
    }

    #[inline]
    pub const fn lane_count(&self) -> u8 {
        self.attributes.lane_count()
    }

    #[inline]
    pub const fn density(&self) -> u8 {
        self.attributes.density()
    }

    #[inline]
    pub const fn classification(&self) -> RoadClass {
        self.attributes.classification()
    }

    #[inline]
    pub const fn surface(&self) -> Surface {
        self.attributes.surface()
    }

    #[inline]
    pub const fn toll(&self) -> bool {
        self.attributes.toll() != 0
    }

    #[inline]
    pub const fn roundabout(&self) -> bool {
        self.attributes.roundabout() != 0
    }

    #[inline]
    pub const fn truck_route(&self) -> bool {
        self.attributes.truck_route() != 0
    }

    /// Does the edge have a profile in the predicted speed section?
    #[inline]
    pub const fn has_predicted_speed(&self) -> bool {
        self.attributes.has_predicted_speed() != 0
    }

    /// Modes allowed in the direction of the edge.
    #[inline]
    pub fn forward_access(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.access.forward_access())
    }

    /// Modes allowed against the direction of the edge.
    #[inline]
    pub fn reverse_access(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.access.reverse_access())
    }

    /// Length in meters.
    #[inline]
    pub const fn length(&self) -> u32 {
        self.geometry.length()
    }

    #[inline]
    pub const fn is_shortcut(&self) -> bool {
        self.hierarchy.is_shortcut() != 0
    }

    #[inline]
    pub const fn is_tunnel(&self) -> bool {
        self.access.is_tunnel() != 0
    }

    #[inline]
    pub const fn is_bridge(&self) -> bool {
        self.access.is_bridge() != 0
    }
}
