use super::GraphTileBuildError;
use crate::Access;
use bitfield_struct::bitfield;
use enumset::EnumSet;
use zerocopy::{LE, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, Unaligned};

/// Kinds of access restriction.
///
/// The meaning of the restriction value depends on the kind
/// (ex: a weight in metric tons for [`AccessRestrictionType::MaxWeight`]).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum AccessRestrictionType {
    Hazmat,
    MaxHeight,
    MaxWidth,
    MaxLength,
    MaxWeight,
    MaxAxleLoad,
    TimedAllowed,
    TimedDenied,
    DestinationAllowed,
    MaxAxles,
    /// A kind this crate doesn't know about (yet).
    Unknown = 63,
}

impl AccessRestrictionType {
    const fn into_bits(self) -> u8 {
        self as _
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::Hazmat,
            1 => Self::MaxHeight,
            2 => Self::MaxWidth,
            3 => Self::MaxLength,
            4 => Self::MaxWeight,
            5 => Self::MaxAxleLoad,
            6 => Self::TimedAllowed,
            7 => Self::TimedDenied,
            8 => Self::DestinationAllowed,
            9 => Self::MaxAxles,
            _ => Self::Unknown,
        }
    }
}

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::endian::u64le::from_inner,
    into = crate::endian::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct AccessRestrictionBitfield {
    #[bits(22)]
    edge_index: u32,
    #[bits(6)]
    restriction_type: AccessRestrictionType,
    #[bits(12)]
    modes: u16,
    #[bits(24)]
    __: u32,
}

/// An access restriction beyond the plain access masks on the edge.
///
/// Restrictions are sorted by edge index within a tile.
#[derive(FromBytes, IntoBytes, Immutable, Unaligned, Debug, Clone)]
#[repr(C)]
pub struct AccessRestriction {
    bitfield: AccessRestrictionBitfield,
    value: U64<LE>,
}

impl AccessRestriction {
    /// # Errors
    ///
    /// Fails if the edge index does not fit in 22 bits.
    pub fn try_new(
        edge_index: u32,
        restriction_type: AccessRestrictionType,
        modes: EnumSet<Access>,
        value: u64,
    ) -> Result<Self, GraphTileBuildError> {
        let bitfield = AccessRestrictionBitfield::new()
            .with_edge_index_checked(edge_index)
            .map_err(|()| GraphTileBuildError::BitfieldOverflow("edge_index"))?
            .with_restriction_type(restriction_type)
            .with_modes(modes.as_repr());

        Ok(Self {
            bitfield,
            value: U64::new(value),
        })
    }

    /// The index (within the tile) of the restricted directed edge.
    #[inline]
    pub const fn edge_index(&self) -> u32 {
        self.bitfield.edge_index()
    }

    #[inline]
    pub const fn restriction_type(&self) -> AccessRestrictionType {
        self.bitfield.restriction_type()
    }

    /// The access modes affected by this restriction.
    #[inline]
    pub fn affected_access_modes(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.bitfield.modes())
    }

    #[inline]
    pub const fn value(&self) -> u64 {
        self.value.get()
    }
}
