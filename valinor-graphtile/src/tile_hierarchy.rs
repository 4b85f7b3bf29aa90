//! # Tile hierarchy
//!
//! The graph is split into levels by road class, and each level into a grid of square tiles.
//! Every level uses the same global WGS84 extent, just with different tile sizes.

use super::{GraphId, RoadClass};
use geo::{Coord, Rect, coord};
use std::sync::LazyLock;

/// A regular grid of square tiles.
pub struct TilingSystem {
    /// The extent covered by the grid.
    pub bounding_box: Rect<f64>,
    /// Side length of each tile, in degrees.
    pub tile_size: f64,
    pub n_rows: u32,
    pub n_cols: u32,
}

impl TilingSystem {
    fn global(tile_size: f64) -> Self {
        let bounding_box = Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 });
        Self {
            bounding_box,
            tile_size,
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            n_rows: (bounding_box.height() / tile_size).round() as u32,
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            n_cols: (bounding_box.width() / tile_size).round() as u32,
        }
    }

    pub const fn tile_count(&self) -> u32 {
        self.n_rows * self.n_cols
    }

    /// The south-west corner of a tile, or `None` if the tile is not part of the grid.
    pub fn tile_sw_corner(&self, tile_id: u64) -> Option<Coord<f64>> {
        let tile_id = u32::try_from(tile_id)
            .ok()
            .filter(|&id| id < self.tile_count())?;
        let (row, col) = (tile_id / self.n_cols, tile_id % self.n_cols);
        Some(coord! {
            x: self.bounding_box.min().x + f64::from(col) * self.tile_size,
            y: self.bounding_box.min().y + f64::from(row) * self.tile_size,
        })
    }

    /// Grid column containing `lon`, clamped to the grid.
    fn col(&self, lon: f64) -> u32 {
        let offset = (lon - self.bounding_box.min().x) / self.tile_size;
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let col = offset.floor().clamp(0.0, f64::from(self.n_cols - 1)) as u32;
        col
    }

    /// Grid row containing `lat`, clamped to the grid.
    fn row(&self, lat: f64) -> u32 {
        let offset = (lat - self.bounding_box.min().y) / self.tile_size;
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let row = offset.floor().clamp(0.0, f64::from(self.n_rows - 1)) as u32;
        row
    }
}

/// A level in the tile hierarchy.
pub struct TileLevel {
    pub level: u8,
    /// The least important class of road contained in this level.
    pub minimum_road_class: RoadClass,
    pub name: &'static str,
    pub tiling_system: TilingSystem,
}

impl TileLevel {
    /// Looks up a level (standard or transit) by number.
    pub fn for_level(level: u8) -> Option<&'static TileLevel> {
        STANDARD_LEVELS
            .iter()
            .chain(std::iter::once(&*TRANSIT_LEVEL))
            .find(|candidate| candidate.level == level)
    }

    /// Base IDs (row-major) of every tile in this level intersecting the given box.
    ///
    /// Coordinates are in degrees.
    /// If `west > east`, the box is taken to cross the antimeridian,
    /// and is treated as `[west, 180] ∪ [-180, east]`.
    /// Out of range coordinates are clamped to the grid.
    pub fn tiles_intersecting_bbox(
        &self,
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    ) -> Vec<GraphId> {
        if west > east {
            let mut tiles = self.tiles_intersecting_bbox(west, south, 180.0, north);
            tiles.extend(self.tiles_intersecting_bbox(-180.0, south, east, north));
            return tiles;
        }

        let grid = &self.tiling_system;
        let (min_col, max_col) = (grid.col(west), grid.col(east));
        let (min_row, max_row) = (grid.row(south.min(north)), grid.row(north.max(south)));

        (min_row..=max_row)
            .flat_map(|row| (min_col..=max_col).map(move |col| row * grid.n_cols + col))
            .filter_map(|tile_id| GraphId::try_from_components(self.level, u64::from(tile_id), 0).ok())
            .collect()
    }
}

/// The standard road hierarchy: highway, arterial and local levels.
pub static STANDARD_LEVELS: LazyLock<[TileLevel; 3]> = LazyLock::new(|| {
    [
        TileLevel {
            level: 0,
            minimum_road_class: RoadClass::Primary,
            name: "highway",
            tiling_system: TilingSystem::global(4.0),
        },
        TileLevel {
            level: 1,
            minimum_road_class: RoadClass::Tertiary,
            name: "arterial",
            tiling_system: TilingSystem::global(1.0),
        },
        TileLevel {
            level: 2,
            minimum_road_class: RoadClass::ServiceOther,
            name: "local",
            tiling_system: TilingSystem::global(0.25),
        },
    ]
});

pub static TRANSIT_LEVEL: LazyLock<TileLevel> = LazyLock::new(|| TileLevel {
    level: 3,
    minimum_road_class: RoadClass::ServiceOther,
    name: "transit",
    tiling_system: TilingSystem::global(0.25),
});
