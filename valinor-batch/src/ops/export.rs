//! # Tile attribute export
//!
//! Writes the attributes of every (non-shortcut) edge, and optionally every node,
//! of a tile to a JSON document.
//! Output files mirror the tile directory layout under the output directory.

use crate::TileOperationError;
use crate::operation::{Accumulate, TileOperation};
use enumset::{EnumSet, EnumSetType};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::AddAssign;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use valinor_graphtile::graph_tile::GraphTile;
use valinor_graphtile::graph_tile::predicted_speeds::{
    BUCKETS_PER_WEEK, SPEED_BUCKET_SIZE_MINUTES,
};
use valinor_graphtile::tile_provider::GraphTileProvider;
use valinor_graphtile::{Access, GraphId, RoadClass, RoadUse, Surface};

const SECONDS_PER_BUCKET: u32 = SPEED_BUCKET_SIZE_MINUTES * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportConfigError {
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),
    #[error("Predicted speed bucket {0} is out of range (there are {BUCKETS_PER_WEEK} per week)")]
    BucketOutOfRange(usize),
    #[error("Unknown feature type: {0} (expected edges or nodes)")]
    UnknownFeatureType(String),
}

/// An exportable edge attribute.
#[derive(Debug, EnumSetType)]
pub enum EdgeAttribute {
    Id,
    RoadClass,
    Use,
    Speed,
    Tunnel,
    Bridge,
    Traversability,
    Surface,
    Density,
    Urban,
    PredictedSpeeds,
}

impl EdgeAttribute {
    /// The name used to select this attribute.
    pub const fn name(self) -> &'static str {
        match self {
            EdgeAttribute::Id => "edge.id",
            EdgeAttribute::RoadClass => "edge.road_class",
            EdgeAttribute::Use => "edge.use",
            EdgeAttribute::Speed => "edge.speed",
            EdgeAttribute::Tunnel => "edge.tunnel",
            EdgeAttribute::Bridge => "edge.bridge",
            EdgeAttribute::Traversability => "edge.traversability",
            EdgeAttribute::Surface => "edge.surface",
            EdgeAttribute::Density => "edge.density",
            EdgeAttribute::Urban => "edge.is_urban",
            EdgeAttribute::PredictedSpeeds => "edge.predicted_speeds",
        }
    }
}

impl FromStr for EdgeAttribute {
    type Err = ExportConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnumSet::<EdgeAttribute>::all()
            .iter()
            .find(|attribute| attribute.name() == s)
            .ok_or_else(|| ExportConfigError::UnknownAttribute(s.to_string()))
    }
}

/// Selects which edge attributes end up in the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilter {
    attributes: EnumSet<EdgeAttribute>,
    predicted_speed_buckets: Vec<usize>,
}

impl Default for AttributeFilter {
    /// Edge ID, road class and use.
    fn default() -> Self {
        Self {
            attributes: EdgeAttribute::Id | EdgeAttribute::RoadClass | EdgeAttribute::Use,
            predicted_speed_buckets: Vec::new(),
        }
    }
}

impl AttributeFilter {
    /// Starts from the defaults, adds `include`, then removes `exclude`.
    ///
    /// # Errors
    ///
    /// Fails on any unknown attribute name.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, ExportConfigError> {
        let parse = |names: &[S]| {
            names
                .iter()
                .map(|name| name.as_ref().parse::<EdgeAttribute>())
                .collect::<Result<EnumSet<_>, _>>()
        };

        let mut filter = Self::default();
        filter.attributes |= parse(include)?;
        filter.attributes -= parse(exclude)?;
        Ok(filter)
    }

    /// Sets which week buckets are exported when predicted speeds are included.
    ///
    /// # Errors
    ///
    /// Fails if any bucket is past the end of the week.
    pub fn with_predicted_speed_buckets(
        mut self,
        buckets: Vec<usize>,
    ) -> Result<Self, ExportConfigError> {
        if let Some(&bucket) = buckets.iter().find(|&&bucket| bucket >= BUCKETS_PER_WEEK) {
            return Err(ExportConfigError::BucketOutOfRange(bucket));
        }
        self.predicted_speed_buckets = buckets;
        Ok(self)
    }

    #[inline]
    pub fn contains(&self, attribute: EdgeAttribute) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn attributes(&self) -> EnumSet<EdgeAttribute> {
        self.attributes
    }
}

/// Which kinds of features to export.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FeatureTypes {
    pub edges: bool,
    pub nodes: bool,
}

impl Default for FeatureTypes {
    /// Edges only.
    fn default() -> Self {
        Self {
            edges: true,
            nodes: false,
        }
    }
}

impl FeatureTypes {
    /// Parses a list of feature type names (`edges` or `nodes`).
    /// An empty list means the default.
    ///
    /// # Errors
    ///
    /// Fails on anything other than `edges` or `nodes`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ExportConfigError> {
        if names.is_empty() {
            return Ok(Self::default());
        }

        let mut features = Self {
            edges: false,
            nodes: false,
        };
        for name in names {
            match name.as_ref() {
                "edges" => features.edges = true,
                "nodes" => features.nodes = true,
                other => return Err(ExportConfigError::UnknownFeatureType(other.to_string())),
            }
        }
        Ok(features)
    }
}

/// Totals over all exported tiles.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTotals {
    pub tiles: usize,
    pub edges: usize,
    pub nodes: usize,
}

impl AddAssign for ExportTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.tiles += rhs.tiles;
        self.edges += rhs.edges;
        self.nodes += rhs.nodes;
    }
}

impl Accumulate for ExportTotals {
    fn absorb(&mut self, other: Self) {
        *self += other;
    }
}

/// Serializes as `predspeed_<bucket>` entries, in the requested order.
#[derive(Debug, Default)]
struct PredictedSpeedFields(Vec<(usize, i32)>);

impl Serialize for PredictedSpeedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (bucket, speed) in &self.0 {
            map.serialize_entry(&format!("predspeed_{bucket}"), speed)?;
        }
        map.end()
    }
}

#[derive(Debug, Default, Serialize)]
struct EdgeRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    edgeid: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    road_class: Option<RoadClass>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    road_use: Option<RoadUse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tunnel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bridge: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    forward_access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reverse_access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface: Option<Surface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    density: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    urban: Option<bool>,
    #[serde(flatten)]
    predicted_speeds: PredictedSpeedFields,
}

#[derive(Debug, Serialize)]
struct NodeRecord {
    nodeid: usize,
    lon: f32,
    lat: f32,
}

#[derive(Debug, Serialize)]
struct TileDocument {
    graph_id: GraphId,
    #[serde(skip_serializing_if = "Option::is_none")]
    edges: Option<Vec<EdgeRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodes: Option<Vec<NodeRecord>>,
}

fn access_string(access: EnumSet<Access>) -> String {
    access.iter().map(Access::as_char).collect()
}

/// Writes one JSON document per tile to `<output_dir>/<tile path>.json`.
#[derive(Debug, Clone)]
pub struct ExportTileAttributes {
    output_dir: PathBuf,
    features: FeatureTypes,
    filter: AttributeFilter,
}

impl ExportTileAttributes {
    pub fn new(output_dir: PathBuf, features: FeatureTypes, filter: AttributeFilter) -> Self {
        Self {
            output_dir,
            features,
            filter,
        }
    }

    /// Where the document for a tile is written.
    ///
    /// # Errors
    ///
    /// Fails if the ID has no file path (ex: an unknown level).
    pub fn output_path(&self, graph_id: GraphId) -> Result<PathBuf, TileOperationError> {
        Ok(self
            .output_dir
            .join(graph_id.tile_base_id().file_path("json")?))
    }

    fn edge_record<T: GraphTile + ?Sized>(&self, tile: &T, index: usize) -> EdgeRecord {
        let filter = &self.filter;
        let edge = &tile.directed_edges()[index];
        let has = |attribute| filter.contains(attribute);

        let predicted_speeds = if has(EdgeAttribute::PredictedSpeeds) {
            filter
                .predicted_speed_buckets
                .iter()
                .map(|&bucket| {
                    #[expect(
                        clippy::cast_possible_truncation,
                        reason = "buckets are validated to be within a week"
                    )]
                    let seconds = bucket as u32 * SECONDS_PER_BUCKET;
                    let speed = tile.get_predicted_speed(index, seconds).unwrap_or(0.0);
                    #[expect(
                        clippy::cast_possible_truncation,
                        reason = "speeds are well within the range of an i32"
                    )]
                    let speed = speed.round() as i32;
                    (bucket, speed)
                })
                .collect()
        } else {
            Vec::new()
        };

        EdgeRecord {
            edgeid: has(EdgeAttribute::Id).then_some(index),
            road_class: has(EdgeAttribute::RoadClass).then_some(edge.classification()),
            road_use: has(EdgeAttribute::Use).then_some(edge.road_use()),
            speed: has(EdgeAttribute::Speed).then_some(edge.speed()),
            tunnel: has(EdgeAttribute::Tunnel).then_some(edge.is_tunnel()),
            bridge: has(EdgeAttribute::Bridge).then_some(edge.is_bridge()),
            forward_access: has(EdgeAttribute::Traversability)
                .then(|| access_string(edge.forward_access())),
            reverse_access: has(EdgeAttribute::Traversability)
                .then(|| access_string(edge.reverse_access())),
            surface: has(EdgeAttribute::Surface).then_some(edge.surface()),
            density: has(EdgeAttribute::Density).then_some(edge.density()),
            urban: has(EdgeAttribute::Urban).then_some(edge.density() > 8),
            predicted_speeds: PredictedSpeedFields(predicted_speeds),
        }
    }

    fn document<T: GraphTile + ?Sized>(&self, tile: &T) -> TileDocument {
        let edges = self.features.edges.then(|| {
            tile.directed_edges()
                .iter()
                .enumerate()
                .filter(|(_, edge)| !edge.is_shortcut())
                .map(|(index, _)| self.edge_record(tile, index))
                .collect()
        });
        let nodes = self.features.nodes.then(|| {
            let sw_corner = tile.header().sw_corner();
            tile.nodes()
                .iter()
                .enumerate()
                .map(|(nodeid, node)| {
                    let coordinate = node.coordinate(sw_corner);
                    NodeRecord {
                        nodeid,
                        lon: coordinate.x,
                        lat: coordinate.y,
                    }
                })
                .collect()
        });

        TileDocument {
            graph_id: tile.graph_id(),
            edges,
            nodes,
        }
    }
}

impl<P: GraphTileProvider> TileOperation<P> for ExportTileAttributes {
    type Output = ExportTotals;

    fn name(&self) -> &'static str {
        "export-tiles"
    }

    fn process(&self, provider: &P, graph_id: GraphId) -> Result<ExportTotals, TileOperationError> {
        let document = provider.with_tile(graph_id, |tile| self.document(tile))?;
        let totals = ExportTotals {
            tiles: 1,
            edges: document.edges.as_ref().map_or(0, Vec::len),
            nodes: document.nodes.as_ref().map_or(0, Vec::len),
        };

        let path = self.output_path(graph_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush()?;

        debug!(
            tile = %graph_id,
            path = %path.display(),
            edges = totals.edges,
            nodes = totals.nodes,
            "Exported tile"
        );
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names_round_trip() {
        for attribute in EnumSet::<EdgeAttribute>::all() {
            assert_eq!(attribute.name().parse::<EdgeAttribute>(), Ok(attribute));
        }
        assert_eq!(
            "edge.colour".parse::<EdgeAttribute>(),
            Err(ExportConfigError::UnknownAttribute("edge.colour".to_string()))
        );
    }

    #[test]
    fn test_default_filter() {
        let filter = AttributeFilter::new::<&str>(&[], &[]).unwrap();
        assert_eq!(filter, AttributeFilter::default());
        assert!(filter.contains(EdgeAttribute::Id));
        assert!(filter.contains(EdgeAttribute::RoadClass));
        assert!(filter.contains(EdgeAttribute::Use));
        assert_eq!(filter.attributes().len(), 3);
    }

    #[test]
    fn test_include_and_exclude() {
        let filter = AttributeFilter::new(
            &["edge.speed", "edge.traversability", "edge.road_class"],
            &["edge.id", "edge.road_class"],
        )
        .unwrap();
        assert_eq!(
            filter.attributes(),
            EdgeAttribute::Use | EdgeAttribute::Speed | EdgeAttribute::Traversability
        );

        assert_eq!(
            AttributeFilter::new(&["edge.speed"], &["edge.nope"]),
            Err(ExportConfigError::UnknownAttribute("edge.nope".to_string()))
        );
    }

    #[test]
    fn test_bucket_range() {
        let filter = AttributeFilter::default()
            .with_predicted_speed_buckets(vec![0, 2015])
            .unwrap();
        assert_eq!(filter.predicted_speed_buckets, vec![0, 2015]);

        assert_eq!(
            AttributeFilter::default().with_predicted_speed_buckets(vec![3, 2016]),
            Err(ExportConfigError::BucketOutOfRange(2016))
        );
    }

    #[test]
    fn test_feature_types() {
        assert_eq!(
            FeatureTypes::from_names::<&str>(&[]).unwrap(),
            FeatureTypes::default()
        );
        assert_eq!(
            FeatureTypes::from_names(&["nodes"]).unwrap(),
            FeatureTypes {
                edges: false,
                nodes: true
            }
        );
        assert_eq!(
            FeatureTypes::from_names(&["edges", "nodes"]).unwrap(),
            FeatureTypes {
                edges: true,
                nodes: true
            }
        );
        assert_eq!(
            FeatureTypes::from_names(&["ways"]),
            Err(ExportConfigError::UnknownFeatureType("ways".to_string()))
        );
    }

    #[test]
    fn test_access_string() {
        assert_eq!(access_string(EnumSet::empty()), "");
        assert_eq!(access_string(Access::Truck | Access::Auto), "at");
        assert_eq!(access_string(EnumSet::all()), "apbtexuhwmcg");
    }

    #[test]
    fn test_predicted_speed_fields() {
        let fields = PredictedSpeedFields(vec![(12, 40), (3, 0)]);
        assert_eq!(
            serde_json::to_string(&fields).unwrap(),
            r#"{"predspeed_12":40,"predspeed_3":0}"#
        );
    }
}
