use crate::tile_hierarchy::TileLevel;
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use zerocopy::{LE, U64};
use zerocopy_derive::{Immutable, IntoBytes, Unaligned};

/// 3 bits for the hierarchy level.
const MAX_HIERARCHY_LEVEL: u8 = (1 << 3) - 1;
/// 22 bits for the tile ID.
const MAX_GRAPH_TILE_ID: u64 = (1 << 22) - 1;
/// 21 bits for the index within the tile.
const MAX_TILE_INDEX: u64 = (1 << 21) - 1;
/// All 46 bits set; reserved as the "no such object" sentinel.
const INVALID_GRAPH_ID: u64 = (1 << 46) - 1;

const TILE_ID_SHIFT: u32 = 3;
const INDEX_SHIFT: u32 = 25;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidGraphIdError {
    #[error("Level is larger than the maximum allowed value.")]
    Level,
    #[error("Tile ID is larger than the maximum allowed value.")]
    GraphTileId,
    #[error("Tile index is larger than the maximum allowed value.")]
    TileIndex,
    #[error("Graph ID is invalid")]
    InvalidGraphId,
    #[error("Unrecognized graph ID format: {0} (expected a u64 or level/tile/index)")]
    Format(String),
    #[error("Not a tile path: {0}")]
    TilePath(PathBuf),
}

/// Identifier of a tile, or of a node/edge within a tile.
///
/// Packs a hierarchy level, a tile ID and an index within the tile into 46 bits:
///
/// ```text
/// bit   64         46        25         3        0
///        ┌──────────┬─────────┬─────────┬────────┐
///        │ RESERVED │ index   │ tile id │ level  │
///        └──────────┴─────────┴─────────┴────────┘
/// size     18         21        22        3
/// ```
///
/// The ID with index zero is the "base" ID of a tile, and determines its file path.
#[repr(C)]
#[derive(IntoBytes, Immutable, Unaligned, Copy, Clone, Eq, PartialEq, Hash)]
pub struct GraphId(U64<LE>);

impl GraphId {
    /// Tries to construct a Graph ID from the given components.
    ///
    /// # Errors
    ///
    /// Fails if any component exceeds its bit width
    /// (3 bits of level, 22 bits of tile ID, 21 bits of index).
    #[inline]
    pub const fn try_from_components(
        level: u8,
        tile_id: u64,
        index: u64,
    ) -> Result<Self, InvalidGraphIdError> {
        if level > MAX_HIERARCHY_LEVEL {
            Err(InvalidGraphIdError::Level)
        } else if tile_id > MAX_GRAPH_TILE_ID {
            Err(InvalidGraphIdError::GraphTileId)
        } else if index > MAX_TILE_INDEX {
            Err(InvalidGraphIdError::TileIndex)
        } else {
            Ok(Self(U64::<LE>::new(
                level as u64 | (tile_id << TILE_ID_SHIFT) | (index << INDEX_SHIFT),
            )))
        }
    }

    /// Creates a graph ID from its packed value.
    ///
    /// # Errors
    ///
    /// Fails for the reserved sentinel value and for values using the reserved high bits.
    pub const fn try_from_id(id: u64) -> Result<Self, InvalidGraphIdError> {
        if id == INVALID_GRAPH_ID || id > INVALID_GRAPH_ID {
            Err(InvalidGraphIdError::InvalidGraphId)
        } else {
            Ok(GraphId(U64::<LE>::new(id)))
        }
    }

    /// A new ID in the same tile, with a different index.
    ///
    /// # Errors
    ///
    /// Fails if `index` does not fit in 21 bits.
    #[inline]
    pub const fn with_index(&self, index: u64) -> Result<Self, InvalidGraphIdError> {
        Self::try_from_components(self.level(), self.tile_id(), index)
    }

    /// The raw (packed) value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0.get()
    }

    /// The hierarchy level.
    #[inline]
    #[expect(clippy::cast_possible_truncation, reason = "masked to 3 bits")]
    pub const fn level(&self) -> u8 {
        (self.value() & MAX_HIERARCHY_LEVEL as u64) as u8
    }

    #[inline]
    pub const fn tile_id(&self) -> u64 {
        (self.value() >> TILE_ID_SHIFT) & MAX_GRAPH_TILE_ID
    }

    /// The index of a node or edge within the tile.
    #[inline]
    pub const fn index(&self) -> u64 {
        (self.value() >> INDEX_SHIFT) & MAX_TILE_INDEX
    }

    /// The ID of the tile itself (index zeroed).
    #[inline]
    #[must_use]
    pub const fn tile_base_id(&self) -> GraphId {
        GraphId(U64::<LE>::new(self.value() & ((1 << INDEX_SHIFT) - 1)))
    }

    /// Relative path of the tile containing this ID.
    ///
    /// The tile ID is zero padded to a multiple of three digits
    /// (enough for the largest tile ID in the level),
    /// and every group of three digits becomes a path component.
    /// Level 2 tile 762485 is `2/000/762/485.gph`.
    ///
    /// # Errors
    ///
    /// Fails if the level is unknown or the tile ID is out of range for the level.
    pub fn file_path(&self, extension: &str) -> Result<PathBuf, InvalidGraphIdError> {
        let level = TileLevel::for_level(self.level()).ok_or(InvalidGraphIdError::Level)?;
        let max_tile_id = u64::from(level.tiling_system.tile_count()) - 1;
        let tile_id = self.tile_id();
        if tile_id > max_tile_id {
            return Err(InvalidGraphIdError::GraphTileId);
        }

        let digits = path_digit_count(max_tile_id);
        let padded = format!("{tile_id:0>digits$}");

        let mut path = PathBuf::from(self.level().to_string());
        // Every char is an ASCII digit, so splitting on byte boundaries is fine
        for group in padded.as_bytes().chunks(3) {
            path.push(String::from_utf8_lossy(group).as_ref());
        }
        path.set_extension(extension);

        Ok(path)
    }

    /// Parses a tile path (relative, or ending in `level/ddd/ddd.ext`) back into a base ID.
    ///
    /// Only the trailing components are examined,
    /// so both `2/000/762/485.gph` and `/data/tiles/2/000/762/485.gph` work.
    /// The number of digit groups must match what [`GraphId::file_path`] would produce.
    ///
    /// # Errors
    ///
    /// Fails if the path does not have the shape of a tile path for a known level.
    pub fn from_file_path(path: &Path) -> Result<Self, InvalidGraphIdError> {
        let not_a_tile = || InvalidGraphIdError::TilePath(path.to_path_buf());

        let stem = path.file_stem().ok_or_else(not_a_tile)?;
        let mut groups: Vec<&str> = vec![stem.to_str().ok_or_else(not_a_tile)?];
        let mut parents = path
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .rev()
            .map(|component| match component {
                Component::Normal(name) => name.to_str(),
                _ => None,
            });

        // Walk up until we hit something that isn't a 3-digit group; that's the level
        let level = loop {
            let component = parents.next().flatten().ok_or_else(not_a_tile)?;
            if component.len() == 3 && component.bytes().all(|b| b.is_ascii_digit()) {
                groups.push(component);
            } else {
                break component.parse::<u8>().map_err(|_| not_a_tile())?;
            }
        };
        groups.reverse();

        // A lone three digit level directory ("000") is indistinguishable from a group,
        // but level numbers are single digits, so that can't happen in practice.
        let tile_level = TileLevel::for_level(level).ok_or_else(not_a_tile)?;
        let digits = path_digit_count(u64::from(tile_level.tiling_system.tile_count()) - 1);
        if groups.len() * 3 != digits || groups.iter().any(|g| g.len() != 3) {
            return Err(not_a_tile());
        }

        let tile_id = groups
            .concat()
            .parse::<u64>()
            .map_err(|_| not_a_tile())?;

        Self::try_from_components(level, tile_id, 0)
    }
}

/// Number of digits in a tile path: the digits of `max_tile_id`, rounded up to a multiple of 3.
fn path_digit_count(max_tile_id: u64) -> usize {
    let digits = max_tile_id.max(1).ilog10() as usize + 1;
    digits.div_ceil(3) * 3
}

impl FromStr for GraphId {
    type Err = InvalidGraphIdError;

    /// Accepts either the packed `u64` value or `level/tile/index`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u64>() {
            return Self::try_from_id(id);
        }

        let format_error = || InvalidGraphIdError::Format(s.to_string());
        let mut parts = s.split('/');
        let (Some(level), Some(tile_id), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format_error());
        };

        Self::try_from_components(
            level.parse().map_err(|_| format_error())?,
            tile_id.parse().map_err(|_| format_error())?,
            index.parse().map_err(|_| format_error())?,
        )
    }
}

impl Display for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.level(), self.tile_id(), self.index())
    }
}

impl std::fmt::Debug for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GraphId({self})")
    }
}

impl PartialOrd for GraphId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GraphId {
    /// Orders by level, then tile, then index (rather than by packed value).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.level(), self.tile_id(), self.index()).cmp(&(
            other.level(),
            other.tile_id(),
            other.index(),
        ))
    }
}

#[cfg(feature = "serde")]
impl Serialize for GraphId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_limits() {
        assert_eq!(
            GraphId::try_from_components(MAX_HIERARCHY_LEVEL + 1, 0, 0),
            Err(InvalidGraphIdError::Level)
        );
        assert_eq!(
            GraphId::try_from_components(0, MAX_GRAPH_TILE_ID + 1, 0),
            Err(InvalidGraphIdError::GraphTileId)
        );
        assert_eq!(
            GraphId::try_from_components(0, 0, MAX_TILE_INDEX + 1),
            Err(InvalidGraphIdError::TileIndex)
        );
    }

    #[test]
    fn test_components_roundtrip() {
        let id = GraphId::try_from_components(2, 762_485, 1234).unwrap();
        assert_eq!(id.level(), 2);
        assert_eq!(id.tile_id(), 762_485);
        assert_eq!(id.index(), 1234);
        assert_eq!(GraphId::try_from_id(id.value()), Ok(id));
        assert_eq!(id.tile_base_id(), id.with_index(0).unwrap());
    }

    #[test]
    fn test_sentinel_is_rejected() {
        assert_eq!(
            GraphId::try_from_id(INVALID_GRAPH_ID),
            Err(InvalidGraphIdError::InvalidGraphId)
        );
        assert_eq!(
            GraphId::try_from_id(1 << 50),
            Err(InvalidGraphIdError::InvalidGraphId)
        );
    }

    #[test]
    fn test_file_paths() {
        let path = |level, tile| {
            GraphId::try_from_components(level, tile, 0)
                .unwrap()
                .file_path("gph")
        };
        assert_eq!(path(0, 3015), Ok("0/003/015.gph".into()));
        assert_eq!(path(0, 49), Ok("0/000/049.gph".into()));
        assert_eq!(path(1, 64799), Ok("1/064/799.gph".into()));
        assert_eq!(path(2, 762_485), Ok("2/000/762/485.gph".into()));
        assert_eq!(path(3, 1_000_000), Ok("3/001/000/000.gph".into()));
        assert_eq!(path(0, 4050), Err(InvalidGraphIdError::GraphTileId));
        assert_eq!(path(5, 0), Err(InvalidGraphIdError::Level));
    }

    #[test]
    fn test_from_file_path() {
        for (level, tile) in [(0, 3015), (1, 47_701), (2, 762_485), (3, 12)] {
            let id = GraphId::try_from_components(level, tile, 0).unwrap();
            let relative = id.file_path("gph").unwrap();
            assert_eq!(GraphId::from_file_path(&relative), Ok(id));

            let absolute = Path::new("/srv/valhalla/tiles").join(&relative);
            assert_eq!(GraphId::from_file_path(&absolute), Ok(id));
        }
    }

    #[test]
    fn test_from_file_path_rejects_other_files() {
        for path in [
            "0/003.gph",
            "2/762/485.gph",
            "x/003/015.gph",
            "0/03/015.gph",
            "valhalla.json",
        ] {
            assert!(
                GraphId::from_file_path(Path::new(path)).is_err(),
                "{path} should not parse"
            );
        }
    }

    #[test]
    fn test_from_str() {
        let expected = GraphId::try_from_components(1, 47_701, 5).unwrap();
        assert_eq!("1/47701/5".parse(), Ok(expected));
        assert_eq!(expected.value().to_string().parse(), Ok(expected));
        assert_eq!(expected.to_string(), "1/47701/5");
        assert!(matches!(
            "1/2".parse::<GraphId>(),
            Err(InvalidGraphIdError::Format(_))
        ));
        assert!(matches!(
            "1/2/3/4".parse::<GraphId>(),
            Err(InvalidGraphIdError::Format(_))
        ));
    }

    #[test]
    fn test_ordering_follows_components() {
        let mut ids = vec![
            GraphId::try_from_components(2, 1, 0).unwrap(),
            GraphId::try_from_components(0, 5, 0).unwrap(),
            GraphId::try_from_components(1, 0, 0).unwrap(),
        ];
        ids.sort();
        let levels: Vec<_> = ids.iter().map(GraphId::level).collect();
        assert_eq!(levels, [0, 1, 2]);
    }
}
