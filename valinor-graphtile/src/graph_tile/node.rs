use super::GraphTileBuildError;
use crate::GraphId;
use bitfield_struct::bitfield;
use geo::{Coord, coord};
use zerocopy::{LE, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, Unaligned};

// Fields with a leading underscore are carried through untouched but not exposed.

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct LocationBitfield {
    #[bits(22)]
    lat_offset: u32,
    #[bits(4)]
    lat_offset7: u8,
    #[bits(22)]
    lon_offset: u32,
    #[bits(4)]
    lon_offset7: u8,
    #[bits(12)]
    _access: u16,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct EdgeBitfield {
    #[bits(21)]
    edge_index: u32,
    #[bits(7)]
    edge_count: u8,
    #[bits(12)]
    _admin_index: u16,
    #[bits(9)]
    _time_zone_index: u16,
    #[bits(4)]
    _intersection_type: u8,
    #[bits(4)]
    node_type: u8,
    #[bits(4)]
    density: u8,
    // Booleans are stored as single bit integers, like every other flag in the tile.
    #[bits(1)]
    is_traffic_signal: u8,
    #[bits(1)]
    _mode_change_allowed: u8,
    #[bits(1)]
    _is_named_intersection: u8,
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct TransitionBitfield {
    #[bits(21)]
    transition_index: u32,
    #[bits(3)]
    transition_count: u8,
    #[bits(16)]
    _local_driveability: u16,
    #[bits(3)]
    _local_edge_count: u8,
    #[bits(4)]
    _flags: u8,
    #[bits(15)]
    _elevation: u16,
    #[bits(2)]
    __: u8,
}

/// A node in the graph.
///
/// The graph uses a forward star structure:
/// each node points at its first outbound directed edge,
/// and its outbound edges are stored contiguously from there.
///
/// Locations are stored as offsets from the south-west corner of the tile,
/// in 1e-7 degree steps.
#[derive(FromBytes, IntoBytes, Immutable, Unaligned, Debug, Clone)]
#[repr(C)]
pub struct NodeInfo {
    location: LocationBitfield,
    edges: EdgeBitfield,
    transitions: TransitionBitfield,
    _headings: U64<LE>,
}

/// Splits a non-negative offset in degrees into whole microdegrees and the remaining tenth.
fn encode_offset(degrees: f64, field: &'static str) -> Result<(u32, u8), GraphTileBuildError> {
    let tenths = (degrees * 1e7).round();
    if tenths.is_nan() || tenths < 0.0 {
        return Err(GraphTileBuildError::BitfieldOverflow(field));
    }
    let micro = (tenths / 10.0).floor();
    let seventh = tenths - micro * 10.0;
    // Out of range values saturate, and are caught by the checked setters
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok((micro as u32, seventh as u8))
}

impl NodeInfo {
    /// Creates a node at `location` whose outbound edges are
    /// `edge_index..edge_index + edge_count` in the tile.
    ///
    /// `sw_corner` is the south-west corner of the tile the node belongs to.
    ///
    /// # Errors
    ///
    /// Fails if the location is outside the tile, or if the index or count does not fit in the record.
    pub fn try_new(
        location: Coord<f32>,
        sw_corner: Coord<f32>,
        edge_index: u32,
        edge_count: u8,
    ) -> Result<Self, GraphTileBuildError> {
        let (lat, lat7) = encode_offset(
            f64::from(location.y) - f64::from(sw_corner.y),
            "lat_offset",
        )?;
        let (lon, lon7) = encode_offset(
            f64::from(location.x) - f64::from(sw_corner.x),
            "lon_offset",
        )?;
        let location = LocationBitfield::new()
            .with_lat_offset_checked(lat)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("lat_offset"))?
            .with_lat_offset7(lat7)
            .with_lon_offset_checked(lon)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("lon_offset"))?
            .with_lon_offset7(lon7);

        let edges = EdgeBitfield::new()
            .with_edge_index_checked(edge_index)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("edge_index"))?
            .with_edge_count_checked(edge_count)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("edge_count"))?;

        Ok(Self {
            location,
            edges,
            transitions: TransitionBitfield::new(),
            _headings: U64::new(0),
        })
    }

    /// Points this node at a run of transitions to other hierarchy levels.
    ///
    /// # Errors
    ///
    /// Fails if the index or count does not fit in the record.
    pub fn with_transitions(
        mut self,
        transition_index: u32,
        transition_count: u8,
    ) -> Result<Self, GraphTileBuildError> {
        self.transitions = self
            .transitions
            .with_transition_index_checked(transition_index)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("transition_index"))?
            .with_transition_count_checked(transition_count)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("transition_count"))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_traffic_signal(mut self, is_traffic_signal: bool) -> Self {
        self.edges.set_is_traffic_signal(u8::from(is_traffic_signal));
        self
    }

    /// # Errors
    ///
    /// Fails if the density is larger than 15.
    pub fn with_density(mut self, density: u8) -> Result<Self, GraphTileBuildError> {
        self.edges = self
            .edges
            .with_density_checked(density)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("density"))?;
        Ok(self)
    }

    /// Index of the first outbound directed edge in the tile.
    #[inline]
    pub const fn edge_index(&self) -> u32 {
        self.edges.edge_index()
    }

    /// Number of outbound directed edges.
    #[inline]
    pub const fn edge_count(&self) -> u8 {
        self.edges.edge_count()
    }

    #[inline]
    pub const fn transition_index(&self) -> u32 {
        self.transitions.transition_index()
    }

    #[inline]
    pub const fn transition_count(&self) -> u8 {
        self.transitions.transition_count()
    }

    #[inline]
    pub const fn node_type(&self) -> u8 {
        self.edges.node_type()
    }

    /// Relative road density (0-15).
    #[inline]
    pub const fn density(&self) -> u8 {
        self.edges.density()
    }

    #[inline]
    pub const fn is_traffic_signal(&self) -> bool {
        self.edges.is_traffic_signal() != 0
    }

    /// The node location (x = longitude, y = latitude).
    ///
    /// Only offsets are stored, so this needs the south-west corner of the tile
    /// (see [`GraphTileHeader::sw_corner`](super::GraphTileHeader::sw_corner)).
    #[inline]
    pub fn coordinate(&self, sw_corner: Coord<f32>) -> Coord<f32> {
        let location = &self.location;
        let lat = f64::from(location.lat_offset()) * 1e-6 + f64::from(location.lat_offset7()) * 1e-7;
        let lon = f64::from(location.lon_offset()) * 1e-6 + f64::from(location.lon_offset7()) * 1e-7;
        #[expect(clippy::cast_possible_truncation)]
        let offset = coord! { x: lon as f32, y: lat as f32 };
        sw_corner + offset
    }
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
pub struct NodeTransition {
    #[bits(46)]
    end_node_id: u64,
    #[bits(1)]
    up: u8,
    #[bits(17)]
    __: u32,
}

impl NodeTransition {
    /// A transition to the corresponding node on another level.
    pub fn to_node(end_node: GraphId, up: bool) -> Self {
        // Graph IDs never use more than 46 bits
        Self::new()
            .with_end_node_id(end_node.value())
            .with_up(u8::from(up))
    }

    /// The ID of the corresponding node on the other level.
    ///
    /// # Errors
    ///
    /// Fails on a corrupt record.
    #[inline]
    pub const fn corresponding_end_node_id(&self) -> Result<GraphId, crate::InvalidGraphIdError> {
        GraphId::try_from_id(self.end_node_id())
    }

    /// Is the transition to a higher (less detailed) level?
    #[inline]
    pub const fn is_up(&self) -> bool {
        self.up() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(size_of::<NodeInfo>(), 32);
        assert_eq!(size_of::<NodeTransition>(), 8);
    }

    const SW_CORNER: Coord<f32> = coord! { x: 1.25, y: 42.25 };

    #[test]
    fn test_node_fields() {
        let node = NodeInfo::try_new(coord! { x: 1.5, y: 42.375 }, SW_CORNER, 1000, 4)
            .unwrap()
            .with_transitions(7, 2)
            .unwrap()
            .with_density(9)
            .unwrap()
            .with_traffic_signal(true);

        assert_eq!(node.edge_index(), 1000);
        assert_eq!(node.edge_count(), 4);
        assert_eq!(node.transition_index(), 7);
        assert_eq!(node.transition_count(), 2);
        assert_eq!(node.density(), 9);
        assert!(node.is_traffic_signal());
        assert_eq!(node.coordinate(SW_CORNER), coord! { x: 1.5, y: 42.375 });
    }

    #[test]
    fn test_location_keeps_seven_digits() {
        let node = NodeInfo::try_new(coord! { x: 1.523_456_7, y: 42.5 }, SW_CORNER, 0, 0).unwrap();
        assert_eq!(node.location.lon_offset(), 273_456);
        assert_eq!(node.location.lon_offset7(), 7);
        assert_eq!(node.location.lat_offset(), 250_000);
        assert_eq!(node.location.lat_offset7(), 0);

        let location = node.coordinate(SW_CORNER);
        assert!((location.x - 1.523_456_7).abs() < 1e-6);
        assert_eq!(location.y, 42.5);
    }

    #[test]
    fn test_node_overflow() {
        assert!(matches!(
            NodeInfo::try_new(SW_CORNER, SW_CORNER, 1 << 21, 0),
            Err(GraphTileBuildError::BitfieldOverflow("edge_index"))
        ));
        assert!(matches!(
            NodeInfo::try_new(SW_CORNER, SW_CORNER, 0, 128),
            Err(GraphTileBuildError::BitfieldOverflow("edge_count"))
        ));
        // South of the tile
        assert!(matches!(
            NodeInfo::try_new(coord! { x: 1.3, y: 42.0 }, SW_CORNER, 0, 0),
            Err(GraphTileBuildError::BitfieldOverflow("lat_offset"))
        ));
        // Further away than the offset can reach
        assert!(matches!(
            NodeInfo::try_new(coord! { x: 7.0, y: 42.3 }, SW_CORNER, 0, 0),
            Err(GraphTileBuildError::BitfieldOverflow("lon_offset"))
        ));
    }

    #[test]
    fn test_transition() {
        let end_node = GraphId::try_from_components(1, 47_701, 12).unwrap();
        let transition = NodeTransition::to_node(end_node, true);
        assert_eq!(transition.corresponding_end_node_id(), Ok(end_node));
        assert!(transition.is_up());
    }
}
