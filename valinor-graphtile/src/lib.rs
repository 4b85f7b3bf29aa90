//! # Graph tile access and compaction
//!
//! Binary graph tiles (nodes, directed edges and a handful of variable length sections)
//! as zero-copy views, a builder for assembling new tiles,
//! and the predicted speed compaction used by the batch tools.

mod endian;
mod graph_id;
pub mod graph_tile;
pub mod tile_hierarchy;
pub mod tile_provider;

// Flattened re-exports; most modules only have one or two useful definitions.
pub use graph_id::{GraphId, InvalidGraphIdError};

use enumset::EnumSetType;
#[cfg(feature = "serde")]
use serde::Serialize;

/// Functional road class.
///
/// The hierarchy levels are partitioned by the minimum road class they contain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Unclassified,
    Residential,
    ServiceOther,
}

impl RoadClass {
    // 3 bits, so every value is a valid class
    pub(crate) const fn from_bits(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::Motorway,
            1 => Self::Trunk,
            2 => Self::Primary,
            3 => Self::Secondary,
            4 => Self::Tertiary,
            5 => Self::Unclassified,
            6 => Self::Residential,
            _ => Self::ServiceOther,
        }
    }

    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// What a road (or path) is used for.
///
/// Discriminants are stable on disk.
/// Unknown values decode as [`RoadUse::Other`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum RoadUse {
    Road = 0,
    Ramp = 1,
    TurnChannel = 2,
    Track = 3,
    Driveway = 4,
    Alley = 5,
    ParkingAisle = 6,
    EmergencyAccess = 7,
    DriveThru = 8,
    Culdesac = 9,
    LivingStreet = 10,
    ServiceRoad = 11,
    Cycleway = 20,
    MountainBike = 21,
    Sidewalk = 24,
    Footway = 25,
    Steps = 27,
    Path = 28,
    Pedestrian = 29,
    Bridleway = 30,
    Other = 40,
    Ferry = 41,
    RailFerry = 42,
    Construction = 43,
    Rail = 50,
    Bus = 51,
}

impl RoadUse {
    pub(crate) const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::Road,
            1 => Self::Ramp,
            2 => Self::TurnChannel,
            3 => Self::Track,
            4 => Self::Driveway,
            5 => Self::Alley,
            6 => Self::ParkingAisle,
            7 => Self::EmergencyAccess,
            8 => Self::DriveThru,
            9 => Self::Culdesac,
            10 => Self::LivingStreet,
            11 => Self::ServiceRoad,
            20 => Self::Cycleway,
            21 => Self::MountainBike,
            24 => Self::Sidewalk,
            25 => Self::Footway,
            27 => Self::Steps,
            28 => Self::Path,
            29 => Self::Pedestrian,
            30 => Self::Bridleway,
            41 => Self::Ferry,
            42 => Self::RailFerry,
            43 => Self::Construction,
            50 => Self::Rail,
            51 => Self::Bus,
            _ => Self::Other,
        }
    }

    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// Road surface, ordered from smoothest to roughest.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Surface {
    PavedSmooth,
    Paved,
    PavedRough,
    Compacted,
    Dirt,
    Gravel,
    Path,
    Impassable,
}

impl Surface {
    pub(crate) const fn from_bits(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::PavedSmooth,
            1 => Self::Paved,
            2 => Self::PavedRough,
            3 => Self::Compacted,
            4 => Self::Dirt,
            5 => Self::Gravel,
            6 => Self::Path,
            _ => Self::Impassable,
        }
    }

    pub(crate) const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// Travel modes which may (or may not) be allowed on an edge.
///
/// Stored on disk as a 12-bit mask in declaration order.
#[derive(Debug, EnumSetType)]
#[enumset(repr = "u16")]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "snake_case"))]
pub enum Access {
    Auto,
    Pedestrian,
    Bicycle,
    Truck,
    Emergency,
    Taxi,
    Bus,
    HOV,
    Wheelchair,
    Moped,
    Motorcycle,
    GolfCart,
}

impl Access {
    /// A single character code, used for compact textual access masks.
    pub const fn as_char(self) -> char {
        match self {
            Access::Auto => 'a',
            Access::Pedestrian => 'p',
            Access::Bicycle => 'b',
            Access::Truck => 't',
            Access::Emergency => 'e',
            Access::Taxi => 'x',
            Access::Bus => 'u',
            Access::HOV => 'h',
            Access::Wheelchair => 'w',
            Access::Moped => 'm',
            Access::Motorcycle => 'c',
            Access::GolfCart => 'g',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumset::EnumSet;

    #[test]
    fn road_use_roundtrips_known_values() {
        for value in 0..=u8::MAX {
            let decoded = RoadUse::from_bits(value);
            if decoded != RoadUse::Other {
                assert_eq!(decoded.into_bits(), value);
            }
        }
        assert_eq!(RoadUse::from_bits(63), RoadUse::Other);
    }

    #[test]
    fn road_class_bits() {
        assert_eq!(RoadClass::from_bits(2), RoadClass::Primary);
        assert_eq!(RoadClass::ServiceOther.into_bits(), 7);
        assert!(RoadClass::Motorway < RoadClass::Residential);
    }

    #[test]
    fn access_mask_fits_in_12_bits() {
        let all: EnumSet<Access> = EnumSet::all();
        assert_eq!(all.len(), 12);
        assert_eq!(all.as_repr(), 0x0fff);
        let codes: String = all.iter().map(Access::as_char).collect();
        assert_eq!(codes, "apbtexuhwmcg");
    }
}
