//! GR2 on-disk structures
//!
//! Basic layout of a GR2 file:
//!
//! `[Header] [File info] [Sector table] [Data]`
//!
//! The data region holds fix-up tables, marshalling tables and the
//! sector payloads. Sector payloads concatenate (after decompression)
//! into the arena; the file info carries two (sector, position)
//! references locating the type-node sequence and the root data inside
//! that arena.
//!
//! Structures are parsed with `NativeEndian` from blocks that the reader
//! has already word-swapped when the file's byte order differs from the
//! host's.

use byteorder::{NativeEndian, ReadBytesExt};
use std::io::Read;

use crate::error::{Error, Result};

/// Sector compression kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Compression {
    /// No compression; the payload is the sector data.
    None = 0,
    /// Oodle0 (recognised, not decoded)
    Oodle0 = 1,
    /// Oodle1 adaptive arithmetic coding
    Oodle1 = 2,
    /// BitKnit1 (recognised, not decoded)
    BitKnit1 = 3,
    /// BitKnit2 (recognised, not decoded)
    BitKnit2 = 4,
}

impl Compression {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Oodle0),
            2 => Ok(Compression::Oodle1),
            3 => Ok(Compression::BitKnit1),
            4 => Ok(Compression::BitKnit2),
            _ => Err(Error::UnsupportedCompression(value)),
        }
    }

    /// Extra zeroed bytes appended to the compressed staging buffer; the
    /// Oodle decoder refills read up to 4 bytes past the payload.
    pub fn extra_len(self) -> usize {
        match self {
            Compression::Oodle0 | Compression::Oodle1 => 4,
            _ => 0,
        }
    }
}

/// File header (28 bytes at offset 0).
#[derive(Debug, Clone, Default)]
pub struct Header {
    /// Identification magic, compared as four little-endian words.
    pub magic: [u32; 4],
    /// Size of the file info together with the sector table.
    pub size_with_sectors: u32,
    /// Header format, always 0.
    pub format: u32,
    /// Unknown bytes.
    pub extra: [u8; 8],
}

impl Header {
    pub const SIZE: usize = 28;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u32; 4];
        for word in &mut magic {
            *word = reader.read_u32::<byteorder::LittleEndian>()?;
        }

        let size_with_sectors = reader.read_u32::<NativeEndian>()?;
        let format = reader.read_u32::<NativeEndian>()?;

        let mut extra = [0u8; 8];
        reader.read_exact(&mut extra)?;

        Ok(Self {
            magic,
            size_with_sectors,
            format,
            extra,
        })
    }
}

/// Reference to a place in the decompressed data.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reference {
    /// Sector the reference points into.
    pub sector: u32,
    /// Byte position within that sector's decompressed data.
    pub position: u32,
}

impl Reference {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            sector: reader.read_u32::<NativeEndian>()?,
            position: reader.read_u32::<NativeEndian>()?,
        })
    }
}

/// File info (0x38 bytes, or 0x48 with the magic's extra-16 flag).
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    /// File format, 6 or 7.
    pub format: i32,
    /// Total size of the file.
    pub total_size: u32,
    /// CRC32 of the file contents after the file info.
    pub crc32: u32,
    /// Size of the file info itself.
    pub file_info_size: u32,
    /// Number of sectors (usually 8).
    pub sector_count: u32,
    /// Where the type node sequence lives.
    pub type_ref: Reference,
    /// Where the root data lives.
    pub root_ref: Reference,
    /// Version tag of the type layout.
    pub tag: u32,
    /// Unknown bytes; only the first 16 exist in format-6 files.
    pub extra: [u8; 32],
}

impl FileInfo {
    pub const BASE_SIZE: usize = 0x38;

    /// On-disk size for a magic flag set.
    pub fn required_size(extra_16: bool) -> usize {
        if extra_16 {
            Self::BASE_SIZE + 16
        } else {
            Self::BASE_SIZE
        }
    }

    pub fn read<R: Read>(reader: &mut R, extra_16: bool) -> Result<Self> {
        let format = reader.read_i32::<NativeEndian>()?;
        let total_size = reader.read_u32::<NativeEndian>()?;
        let crc32 = reader.read_u32::<NativeEndian>()?;
        let file_info_size = reader.read_u32::<NativeEndian>()?;
        let sector_count = reader.read_u32::<NativeEndian>()?;
        let type_ref = Reference::read(reader)?;
        let root_ref = Reference::read(reader)?;
        let tag = reader.read_u32::<NativeEndian>()?;

        let mut extra = [0u8; 32];
        let present = if extra_16 { 32 } else { 16 };
        reader.read_exact(&mut extra[..present])?;

        Ok(Self {
            format,
            total_size,
            crc32,
            file_info_size,
            sector_count,
            type_ref,
            root_ref,
            tag,
            extra,
        })
    }
}

/// Sector descriptor (44 bytes each).
#[derive(Debug, Clone)]
pub struct Sector {
    /// Compression kind of the payload.
    pub compression: Compression,
    /// Offset of the payload in the source file.
    pub data_offset: u32,
    /// Payload length as stored in the file.
    pub compressed_len: u32,
    /// Payload length after decompression.
    pub decompressed_len: u32,
    /// Alignment of the decompressed data (usually 4).
    pub alignment: u32,
    /// First Oodle stop; also bounds the word-swap region.
    pub oodle_stop0: u32,
    /// Second Oodle stop; also bounds the pair-swap region.
    pub oodle_stop1: u32,
    /// Offset of this sector's fix-up table, relative to the file.
    pub fixup_offset: u32,
    /// Number of fix-up records.
    pub fixup_count: u32,
    /// Offset of this sector's marshalling table, relative to the file.
    pub marshal_offset: u32,
    /// Number of marshalling records.
    pub marshal_count: u32,
}

impl Sector {
    pub const SIZE: usize = 44;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let compression = Compression::from_u32(reader.read_u32::<NativeEndian>()?)?;

        Ok(Self {
            compression,
            data_offset: reader.read_u32::<NativeEndian>()?,
            compressed_len: reader.read_u32::<NativeEndian>()?,
            decompressed_len: reader.read_u32::<NativeEndian>()?,
            alignment: reader.read_u32::<NativeEndian>()?,
            oodle_stop0: reader.read_u32::<NativeEndian>()?,
            oodle_stop1: reader.read_u32::<NativeEndian>()?,
            fixup_offset: reader.read_u32::<NativeEndian>()?,
            fixup_count: reader.read_u32::<NativeEndian>()?,
            marshal_offset: reader.read_u32::<NativeEndian>()?,
            marshal_count: reader.read_u32::<NativeEndian>()?,
        })
    }

    /// Length of the payload as stored in the source file.
    pub fn stored_len(&self) -> u32 {
        if self.compression == Compression::None {
            self.decompressed_len
        } else {
            self.compressed_len
        }
    }

    pub fn is_empty(&self) -> bool {
        self.decompressed_len == 0
    }

    pub fn compression_ratio(&self) -> Option<f64> {
        if self.compression != Compression::None && self.compressed_len > 0 {
            Some(f64::from(self.decompressed_len) / f64::from(self.compressed_len))
        } else {
            None
        }
    }
}

/// Fix-up record (12 bytes): rewrites the pointer stored at
/// `src_offset` of the owning sector to refer to
/// `(dst_sector, dst_offset)`.
#[derive(Debug, Clone, Copy)]
pub struct FixUp {
    pub src_offset: u32,
    pub dst_sector: u32,
    pub dst_offset: u32,
}

impl FixUp {
    pub const SIZE: usize = 12;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            src_offset: reader.read_u32::<NativeEndian>()?,
            dst_sector: reader.read_u32::<NativeEndian>()?,
            dst_offset: reader.read_u32::<NativeEndian>()?,
        })
    }
}

/// Marshalling record (16 bytes): byte-swaps `count` consecutive
/// elements at `src_offset`, driven by the type-node descriptor found at
/// `(dst_sector, dst_offset)`.
#[derive(Debug, Clone, Copy)]
pub struct Marshal {
    pub count: u32,
    pub src_offset: u32,
    pub dst_sector: u32,
    pub dst_offset: u32,
}

impl Marshal {
    pub const SIZE: usize = 16;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            count: reader.read_u32::<NativeEndian>()?,
            src_offset: reader.read_u32::<NativeEndian>()?,
            dst_sector: reader.read_u32::<NativeEndian>()?,
            dst_offset: reader.read_u32::<NativeEndian>()?,
        })
    }
}

/// Mesh transformation (68 bytes): translation, rotation and scale/shear.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub flags: u32,
    /// X, Y, Z translation.
    pub translation: [f32; 3],
    /// X, Y, Z, W rotation quaternion.
    pub rotation: [f32; 4],
    /// Scale/shear matrix.
    pub scale_shear: [[f32; 3]; 3],
}

impl Transform {
    pub const SIZE: usize = 68;

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let flags = reader.read_u32::<NativeEndian>()?;

        let mut translation = [0f32; 3];
        for value in &mut translation {
            *value = reader.read_f32::<NativeEndian>()?;
        }

        let mut rotation = [0f32; 4];
        for value in &mut rotation {
            *value = reader.read_f32::<NativeEndian>()?;
        }

        let mut scale_shear = [[0f32; 3]; 3];
        for row in &mut scale_shear {
            for value in row {
                *value = reader.read_f32::<NativeEndian>()?;
            }
        }

        Ok(Self {
            flags,
            translation,
            rotation,
            scale_shear,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_compression_parsing() {
        assert_eq!(Compression::from_u32(0).unwrap(), Compression::None);
        assert_eq!(Compression::from_u32(2).unwrap(), Compression::Oodle1);
        assert!(Compression::from_u32(9).is_err());
    }

    #[test]
    fn test_compression_extra_len() {
        assert_eq!(Compression::Oodle1.extra_len(), 4);
        assert_eq!(Compression::Oodle0.extra_len(), 4);
        assert_eq!(Compression::None.extra_len(), 0);
        assert_eq!(Compression::BitKnit2.extra_len(), 0);
    }

    #[test]
    fn test_sector_read() {
        let mut bytes = Vec::new();
        for value in [2u32, 0x100, 50, 200, 4, 10, 20, 0x500, 3, 0x600, 1] {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }

        let sector = Sector::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(sector.compression, Compression::Oodle1);
        assert_eq!(sector.data_offset, 0x100);
        assert_eq!(sector.stored_len(), 50);
        assert_eq!(sector.decompressed_len, 200);
        assert_eq!(sector.fixup_count, 3);
        assert_eq!(sector.marshal_count, 1);
        assert_eq!(sector.compression_ratio(), Some(4.0));
    }

    #[test]
    fn test_uncompressed_sector_stored_len() {
        let mut bytes = Vec::new();
        for value in [0u32, 0, 0, 123, 4, 0, 0, 0, 0, 0, 0] {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }

        let sector = Sector::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(sector.stored_len(), 123);
        assert_eq!(sector.compression_ratio(), None);
    }

    #[test]
    fn test_file_info_required_size() {
        assert_eq!(FileInfo::required_size(false), 0x38);
        assert_eq!(FileInfo::required_size(true), 0x48);
    }

    #[test]
    fn test_transform_read() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_ne_bytes());
        for value in 0..16 {
            bytes.extend_from_slice(&(value as f32).to_ne_bytes());
        }

        let transform = Transform::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(transform.flags, 7);
        assert_eq!(transform.translation, [0.0, 1.0, 2.0]);
        assert_eq!(transform.rotation, [3.0, 4.0, 5.0, 6.0]);
        assert_eq!(transform.scale_shear[2], [13.0, 14.0, 15.0]);
    }
}
