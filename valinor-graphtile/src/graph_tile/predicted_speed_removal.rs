//! # Predicted speed removal
//!
//! Strips predicted (historical) traffic from a tile, producing a byte-exact replacement.
//!
//! Every directed edge loses its predicted speed flag along with its free flow and constrained flow speeds.
//! The predicted speed index and profiles are cut off the end of the tile,
//! and the header is updated to match.
//! Everything else is copied verbatim,
//! including the records after the directed edges that are never interpreted here
//! (edge extensions, transit records, signs, turn lanes, admins and edge bins).
//!
//! The header has to describe the tile exactly: every section contiguous, in layout order,
//! with the predicted speeds last.
//! Anything else is reported as a mismatch before a single byte is produced.

use super::layout::{
    LayoutError, Section, TileLayout, predicted_speed_span, recompute_end_offset,
};
use super::{DirectedEdge, GraphTile, GraphTileHeader};
use std::io::Write;
use thiserror::Error;
use zerocopy::IntoBytes;

#[derive(Debug, Error)]
pub enum PredictedSpeedRemovalError {
    /// The header and the tile contents disagree.
    #[error("Layout mismatch: {0}")]
    LayoutMismatch(String),
    /// Offset arithmetic produced an impossible layout.
    #[error("Layout invariant violated: {0}")]
    InvariantViolation(#[from] LayoutError),
}

/// A tile with its predicted speeds removed, ready to be written.
///
/// Borrows the unchanged sections from the source tile.
#[derive(Debug)]
pub struct StrippedTile<'a> {
    header: GraphTileHeader,
    nodes: &'a [u8],
    transitions: &'a [u8],
    directed_edges: Vec<DirectedEdge>,
    /// Everything from the end of the directed edges up to the new `end_offset`.
    trailing: &'a [u8],
    bytes_removed: usize,
    edges_cleared: usize,
}

impl StrippedTile<'_> {
    /// The rewritten header.
    #[inline]
    pub fn header(&self) -> &GraphTileHeader {
        &self.header
    }

    /// The rewritten directed edges.
    #[inline]
    pub fn directed_edges(&self) -> &[DirectedEdge] {
        &self.directed_edges
    }

    /// How much shorter the tile got.
    #[inline]
    pub fn bytes_removed(&self) -> usize {
        self.bytes_removed
    }

    /// The number of edges that carried any predicted traffic.
    #[inline]
    pub fn edges_cleared(&self) -> usize {
        self.edges_cleared
    }

    /// The bytes of the new tile, in layout order.
    pub fn sections(&self) -> [&[u8]; 5] {
        [
            self.header.as_bytes(),
            self.nodes,
            self.transitions,
            self.directed_edges.as_bytes(),
            self.trailing,
        ]
    }

    /// Writes the new tile.
    ///
    /// # Errors
    ///
    /// Passes on any I/O errors from the writer.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for section in self.sections() {
            writer.write_all(section)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.sections().concat()
    }
}

/// Removes all predicted traffic from a tile.
///
/// Nothing is written; see [`StrippedTile::write_to`].
///
/// # Errors
///
/// - [`PredictedSpeedRemovalError::LayoutMismatch`] if the header counts don't match the records,
///   or the sections the header describes don't add up to the tile
///   (gaps, overlaps, or anything after the predicted speeds).
/// - [`PredictedSpeedRemovalError::InvariantViolation`] if the new `end_offset`
///   would cut into the sections that are kept, or the rewritten header doesn't describe the output.
pub fn strip_predicted_speeds<T: GraphTile + ?Sized>(
    tile: &T,
) -> Result<StrippedTile<'_>, PredictedSpeedRemovalError> {
    let header = tile.header();
    let memory = tile.memory();

    let edge_count = header.directed_edge_count();
    for (name, expected, actual) in [
        ("node", header.node_count(), tile.nodes().len()),
        ("transition", header.transition_count(), tile.transitions().len()),
        ("directed edge", edge_count, tile.directed_edges().len()),
    ] {
        if expected as usize != actual {
            return Err(PredictedSpeedRemovalError::LayoutMismatch(format!(
                "header claims {expected} {name} records, but the tile has {actual}"
            )));
        }
    }

    let end_offset = header.end_offset();
    if end_offset as usize > memory.len() {
        return Err(PredictedSpeedRemovalError::LayoutMismatch(format!(
            "end_offset is {end_offset}, but the tile is {} bytes long",
            memory.len()
        )));
    }

    let layout = tile.layout();
    layout
        .validate()
        .map_err(|e| PredictedSpeedRemovalError::LayoutMismatch(e.to_string()))?;

    let removed = predicted_speed_span(edge_count, header.predicted_speeds_count());
    let new_end_offset =
        recompute_end_offset(end_offset, removed, header.predicted_speeds_offset())?;

    let kept = layout.range(Section::DirectedEdges).end..new_end_offset as usize;
    let trailing = memory.get(kept).ok_or(LayoutError::InvariantViolation {
        end_offset,
        removed,
        predicted_speeds_offset: header.predicted_speeds_offset(),
    })?;

    let mut edges_cleared = 0;
    let directed_edges = tile
        .directed_edges()
        .iter()
        .map(|edge| {
            let mut edge = edge.clone();
            if edge.has_predicted_speed()
                || edge.free_flow_speed() != 0
                || edge.constrained_flow_speed() != 0
            {
                edges_cleared += 1;
            }
            edge.clear_predicted_speed();
            edge
        })
        .collect();

    let mut new_header = *header;
    new_header.clear_predicted_speeds();
    new_header.set_end_offset(new_end_offset);
    TileLayout::from_header(&new_header).validate()?;

    Ok(StrippedTile {
        header: new_header,
        nodes: tile.nodes().as_bytes(),
        transitions: tile.transitions().as_bytes(),
        directed_edges,
        trailing,
        bytes_removed: removed,
        edges_cleared,
    })
}
