//! Const conversions between native integers and their little-endian wrappers.
//!
//! `bitfield-struct` needs a `from`/`into` function pair when the backing
//! storage is not a primitive. Records on disk are unaligned little-endian,
//! so the bitfields are backed by the zerocopy byte order types.

macro_rules! le_conversions {
    ($($module:ident => $wrapper:ident($native:ty)),+ $(,)?) => {
        $(
            pub(crate) mod $module {
                use zerocopy::{$wrapper, LE};

                pub(crate) const fn from_inner(value: $native) -> $wrapper<LE> {
                    $wrapper::<LE>::new(value)
                }

                pub(crate) const fn into_inner(value: $wrapper<LE>) -> $native {
                    value.get()
                }
            }
        )+
    };
}

le_conversions! {
    u32le => U32(u32),
    u64le => U64(u64),
}
