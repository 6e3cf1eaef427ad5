//! GR2 magic registry
//!
//! The first 16 bytes of a GR2 file identify the layout of everything
//! after them: byte order, pointer width, and whether the file info
//! carries the 16 extra bytes introduced with file format 7. Magics are
//! compared as four little-endian u32 words, the same way they are
//! written by the exporter.

use crate::error::{Error, Result};

/// Layout flags carried by a magic signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MagicFlags {
    /// File data is big-endian.
    pub big_endian: bool,
    /// Pointers embedded in sector data are 8 bytes wide.
    pub is_64bit: bool,
    /// File info is 0x48 bytes (file format 7) instead of 0x38.
    pub extra_16: bool,
}

struct MagicEntry {
    flags: MagicFlags,
    magic: [u32; 4],
}

const FLAGS_NONE: MagicFlags = MagicFlags {
    big_endian: false,
    is_64bit: false,
    extra_16: false,
};

const FLAGS_BE: MagicFlags = MagicFlags {
    big_endian: true,
    is_64bit: false,
    extra_16: false,
};

const FLAGS_EXTRA16: MagicFlags = MagicFlags {
    big_endian: false,
    is_64bit: false,
    extra_16: true,
};

const FLAGS_EXTRA16_64: MagicFlags = MagicFlags {
    big_endian: false,
    is_64bit: true,
    extra_16: true,
};

const FLAGS_EXTRA16_BE: MagicFlags = MagicFlags {
    big_endian: true,
    is_64bit: false,
    extra_16: true,
};

const FLAGS_EXTRA16_BE_64: MagicFlags = MagicFlags {
    big_endian: true,
    is_64bit: true,
    extra_16: true,
};

/// Every production magic seen in the wild, format 6 and 7 variants.
const MAGIC_TABLE: &[MagicEntry] = &[
    // Little-endian 32-bit, file format 6
    MagicEntry {
        flags: FLAGS_NONE,
        magic: [0xCAB067B8, 0x0FB16DF8, 0x7E8C7284, 0x1E00195E],
    },
    // Big-endian 32-bit, file format 6
    MagicEntry {
        flags: FLAGS_BE,
        magic: [0xB867B0CA, 0xF86DB10F, 0x84728C7E, 0x5E19001E],
    },
    // Little-endian 32-bit, file format 7 (Granny 2.9+)
    MagicEntry {
        flags: FLAGS_EXTRA16,
        magic: [0xC06CDE29, 0x2B53A4BA, 0xA5B7F525, 0xEEE266F6],
    },
    // Little-endian 64-bit, file format 7
    MagicEntry {
        flags: FLAGS_EXTRA16_64,
        magic: [0x5E499BE5, 0x141F636F, 0xA9EB131E, 0xC4EDBE90],
    },
    // Big-endian 32-bit, file format 7
    MagicEntry {
        flags: FLAGS_EXTRA16_BE,
        magic: [0xB595110E, 0x4BB5A56A, 0x502828EB, 0x04B37825],
    },
    // Big-endian 64-bit, file format 7
    MagicEntry {
        flags: FLAGS_EXTRA16_BE_64,
        magic: [0xE3D49531, 0x624FDC20, 0x3AD036CC, 0x89FF82B1],
    },
];

/// Look up the layout flags for a magic. Unknown magics fail the load.
pub fn lookup(magic: [u32; 4]) -> Result<MagicFlags> {
    MAGIC_TABLE
        .iter()
        .find(|entry| entry.magic == magic)
        .map(|entry| entry.flags)
        .ok_or(Error::InvalidMagic(magic))
}

/// Canonical magic for a flag combination, if one is registered.
pub fn encode(flags: MagicFlags) -> Option<[u32; 4]> {
    MAGIC_TABLE
        .iter()
        .find(|entry| entry.flags == flags)
        .map(|entry| entry.magic)
}
