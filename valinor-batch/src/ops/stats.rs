use crate::operation::{Accumulate, TileOperation};
use crate::TileOperationError;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;
use valinor_graphtile::GraphId;
use valinor_graphtile::graph_tile::GraphTile;
use valinor_graphtile::tile_provider::GraphTileProvider;

/// Summary counts over one or more tiles.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct TileStats {
    pub tiles: usize,
    pub nodes: usize,
    pub directed_edges: usize,
    pub shortcuts: usize,
    pub access_restrictions: usize,
    pub complex_restriction_forward_bytes: usize,
    pub complex_restriction_reverse_bytes: usize,
    pub edges_with_predicted_speeds: usize,
    pub predicted_speed_profiles: usize,
}

impl TileStats {
    pub fn for_tile<T: GraphTile + ?Sized>(tile: &T) -> Self {
        let header = tile.header();
        let edges = tile.directed_edges();
        Self {
            tiles: 1,
            nodes: tile.nodes().len(),
            directed_edges: edges.len(),
            shortcuts: edges.iter().filter(|edge| edge.is_shortcut()).count(),
            access_restrictions: tile.access_restrictions().len(),
            complex_restriction_forward_bytes: header.complex_restriction_forward_size() as usize,
            complex_restriction_reverse_bytes: header.complex_restriction_reverse_size() as usize,
            edges_with_predicted_speeds: edges
                .iter()
                .filter(|edge| edge.has_predicted_speed())
                .count(),
            predicted_speed_profiles: header.predicted_speeds_count() as usize,
        }
    }
}

impl AddAssign for TileStats {
    fn add_assign(&mut self, rhs: Self) {
        self.tiles += rhs.tiles;
        self.nodes += rhs.nodes;
        self.directed_edges += rhs.directed_edges;
        self.shortcuts += rhs.shortcuts;
        self.access_restrictions += rhs.access_restrictions;
        self.complex_restriction_forward_bytes += rhs.complex_restriction_forward_bytes;
        self.complex_restriction_reverse_bytes += rhs.complex_restriction_reverse_bytes;
        self.edges_with_predicted_speeds += rhs.edges_with_predicted_speeds;
        self.predicted_speed_profiles += rhs.predicted_speed_profiles;
    }
}

impl Accumulate for TileStats {
    fn absorb(&mut self, other: Self) {
        *self += other;
    }
}

impl Display for TileStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tiles: {}", self.tiles)?;
        writeln!(f, "Nodes: {}", self.nodes)?;
        writeln!(
            f,
            "Directed edges: {} ({} shortcuts)",
            self.directed_edges, self.shortcuts
        )?;
        writeln!(f, "Access restrictions: {}", self.access_restrictions)?;
        writeln!(
            f,
            "Complex restriction bytes: {} forward, {} reverse",
            self.complex_restriction_forward_bytes, self.complex_restriction_reverse_bytes
        )?;
        writeln!(
            f,
            "Edges with predicted speeds: {}",
            self.edges_with_predicted_speeds
        )?;
        write!(f, "Predicted speed profiles: {}", self.predicted_speed_profiles)
    }
}

/// Counts the contents of every tile.
#[derive(Debug, Default, Copy, Clone)]
pub struct CollectTileStats;

impl<P: GraphTileProvider> TileOperation<P> for CollectTileStats {
    type Output = TileStats;

    fn name(&self) -> &'static str {
        "tile-stats"
    }

    fn process(&self, provider: &P, graph_id: GraphId) -> Result<TileStats, TileOperationError> {
        Ok(provider.with_tile(graph_id, |tile| TileStats::for_tile(tile))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(scale: usize) -> TileStats {
        TileStats {
            tiles: scale,
            nodes: 2 * scale,
            directed_edges: 3 * scale,
            shortcuts: scale,
            access_restrictions: scale,
            complex_restriction_forward_bytes: 4 * scale,
            complex_restriction_reverse_bytes: 2 * scale,
            edges_with_predicted_speeds: scale,
            predicted_speed_profiles: scale,
        }
    }

    #[test]
    fn test_sum() {
        let mut total = TileStats::default();
        total.absorb(stats(1));
        total.absorb(stats(2));
        assert_eq!(total, stats(3));

        // Absorbing nothing is a no-op
        total.absorb(TileStats::default());
        assert_eq!(total, stats(3));
    }

    #[test]
    fn test_display() {
        insta::assert_snapshot!(stats(2), @r"
        Tiles: 2
        Nodes: 4
        Directed edges: 6 (2 shortcuts)
        Access restrictions: 2
        Complex restriction bytes: 8 forward, 4 reverse
        Edges with predicted speeds: 2
        Predicted speed profiles: 2
        ");
    }
}
