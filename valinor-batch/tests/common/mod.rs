//! Helpers for building small on-disk tile datasets.

#![allow(dead_code)]

use enumset::EnumSet;
use geo::coord;
use std::fs;
use std::path::{Path, PathBuf};
use valinor_graphtile::graph_tile::predicted_speeds::{BUCKETS_PER_WEEK, compress_speed_buckets};
use valinor_graphtile::graph_tile::{
    AccessRestriction, AccessRestrictionType, DirectedEdge, GraphTile, GraphTileBuilder,
    NodeInfo, OwnedGraphTile,
};
use valinor_graphtile::{Access, GraphId, RoadClass, RoadUse, Surface};

/// Bytes 224..228 of the header hold the tile size, which is `end_offset`.
const END_OFFSET_FIELD: std::ops::Range<usize> = 224..228;
/// The node, directed edge and predicted speed counts.
const COUNTS_FIELD: std::ops::Range<usize> = 40..48;
/// The access restriction count is in the low 24 bits.
const RESTRICTION_COUNTS_FIELD: std::ops::Range<usize> = 72..80;

pub fn local_tile(tile_id: u64) -> GraphId {
    GraphId::try_from_components(2, tile_id, 0).unwrap()
}

/// Two nodes and three directed edges (the middle one is a shortcut),
/// with a truck restriction on the last edge.
///
/// With `traffic`, every edge gets free flow and constrained speeds,
/// and the first edge gets a flat 40 kph predicted speed profile.
pub fn build_tile(graph_id: GraphId, traffic: bool) -> Vec<u8> {
    let (free_flow, constrained) = if traffic { (60, 30) } else { (0, 0) };
    let edge = |end_index, length| {
        DirectedEdge::try_new(graph_id.with_index(end_index).unwrap(), length)
            .unwrap()
            .with_speeds(50, free_flow, constrained)
            .with_classification(RoadClass::Residential)
            .with_road_use(RoadUse::Road)
            .with_surface(Surface::Paved)
            .with_access(EnumSet::all(), Access::Pedestrian | Access::Bicycle)
    };

    let builder = GraphTileBuilder::new(graph_id, 1);
    let sw_corner = builder.sw_corner();
    let builder = builder
        .with_node(NodeInfo::try_new(coord! { x: 1.5, y: 42.5 }, sw_corner, 0, 2).unwrap())
        .with_node(NodeInfo::try_new(coord! { x: 1.75, y: 42.25 }, sw_corner, 2, 1).unwrap())
        .with_directed_edge(edge(1, 100).with_tunnel(true))
        .with_directed_edge(edge(1, 90).with_shortcut(true))
        .with_directed_edge(edge(0, 100).with_bridge(true))
        .with_access_restriction(
            AccessRestriction::try_new(
                2,
                AccessRestrictionType::MaxWeight,
                EnumSet::only(Access::Truck),
                35,
            )
            .unwrap(),
        )
        .with_complex_restrictions(vec![1, 2, 3, 4], vec![5, 6])
        .with_edge_info(b"edge info".to_vec())
        .with_text_list(b"Carrer Major\0".to_vec());

    let builder = if traffic {
        builder
            .with_predicted_speeds(0, compress_speed_buckets(&[40.0; BUCKETS_PER_WEEK]))
            .unwrap()
    } else {
        builder
    };
    builder.into_bytes().unwrap()
}

/// Appends some junk after the predicted speeds, so they are no longer the last section.
pub fn misplace_predicted_speeds(mut bytes: Vec<u8>) -> Vec<u8> {
    let end_offset = u32::from_le_bytes(bytes[END_OFFSET_FIELD].try_into().unwrap());
    bytes.extend_from_slice(&[0xAB; 4]);
    bytes[END_OFFSET_FIELD].copy_from_slice(&(end_offset + 4).to_le_bytes());

    let tile = OwnedGraphTile::try_from(bytes.clone()).unwrap();
    assert_eq!(tile.header().end_offset(), end_offset + 4);
    bytes
}

/// Claims one more directed edge and no access restrictions,
/// leaving the section offsets as they were.
///
/// The tile still decodes, but its sections no longer line up with the header.
pub fn miscount_sections(mut bytes: Vec<u8>) -> Vec<u8> {
    let edge_count = OwnedGraphTile::try_from(bytes.clone())
        .unwrap()
        .header()
        .directed_edge_count();
    let counts = u64::from_le_bytes(bytes[COUNTS_FIELD].try_into().unwrap());
    bytes[COUNTS_FIELD].copy_from_slice(&(counts + (1 << 21)).to_le_bytes());
    let restrictions = u64::from_le_bytes(bytes[RESTRICTION_COUNTS_FIELD].try_into().unwrap());
    bytes[RESTRICTION_COUNTS_FIELD]
        .copy_from_slice(&(restrictions & !((1 << 24) - 1)).to_le_bytes());

    let tile = OwnedGraphTile::try_from(bytes.clone()).unwrap();
    assert_eq!(tile.header().directed_edge_count(), edge_count + 1);
    assert_eq!(tile.header().access_restriction_count(), 0);
    bytes
}

pub fn tile_path(root: &Path, graph_id: GraphId) -> PathBuf {
    root.join(graph_id.file_path("gph").unwrap())
}

pub fn write_tile(root: &Path, graph_id: GraphId, bytes: &[u8]) -> PathBuf {
    let path = tile_path(root, graph_id);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

pub fn config_json(tile_dir: &Path) -> String {
    serde_json::json!({ "mjolnir": { "tile_dir": tile_dir, "concurrency": 2 } }).to_string()
}
