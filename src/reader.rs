//! GR2 container reading
//!
//! [`Gr2`] owns everything a loaded file materialises: the decompressed
//! arena, the sector table and per-sector offsets, the virtual pointer
//! table, the global element index and the synthetic root. `load` runs
//! the whole pipeline: magic classification, header and file-info
//! validation, sector decompression, endianness repair, pointer fix-up,
//! marshalling, and the element parse.

use std::io::Cursor;

use crate::elements::{Element, ElementData, ElementId, ElementParser, read_string_at};
use crate::endian::{is_host_big_endian, pair_swap, word_swap};
use crate::error::{Error, Result};
use crate::magic;
use crate::oodle1;
use crate::pointers::PointerTable;
use crate::structures::{Compression, FileInfo, FixUp, Header, Marshal, Sector, Transform};
use crate::typeinfo::{TypeId, TypeNode};

/// Marshalling walks descriptor graphs that hostile files can cycle.
const MAX_MARSHAL_DEPTH: usize = 100;

/// Decoded scalar payload of one element.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValues {
    Real32(Vec<f32>),
    Real16(Vec<half::f16>),
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Transform(Vec<Transform>),
}

/// A loaded GR2 file.
#[derive(Debug)]
pub struct Gr2 {
    /// File byte order differs from the host's.
    pub mismatch_endianness: bool,
    /// Pointers in sector data are 8 bytes wide.
    pub is_64bit: bool,
    /// File header.
    pub header: Header,
    /// File info.
    pub file_info: FileInfo,
    /// Sector table.
    pub sectors: Vec<Sector>,
    /// Start of each sector's decompressed data within the arena.
    pub sector_offsets: Vec<usize>,
    /// Decompressed sector data, back to back.
    pub data: Vec<u8>,
    /// Handle table every rewritten pointer goes through.
    pub pointers: PointerTable,
    /// Global element index; owns every parsed element.
    pub elements: Vec<Element>,
    /// Synthetic root the top-level elements hang off.
    pub root: Element,
}

impl Default for Gr2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Gr2 {
    pub fn new() -> Self {
        Self {
            mismatch_endianness: false,
            is_64bit: false,
            header: Header::default(),
            file_info: FileInfo::default(),
            sectors: Vec::new(),
            sector_offsets: Vec::new(),
            data: Vec::new(),
            pointers: PointerTable::new(),
            elements: Vec::new(),
            root: Element::synthetic(TypeId::Inline, "Root"),
        }
    }

    /// Load a GR2 file from bytes.
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        let mut gr2 = Self::new();
        gr2.load(input)?;
        Ok(gr2)
    }

    /// Run the read pipeline over `input`. Not idempotent: a context is
    /// loaded once. On failure the context stays partially populated but
    /// releases everything it allocated.
    pub fn load(&mut self, input: &[u8]) -> Result<()> {
        if input.len() < Header::SIZE {
            return Err(Error::Truncated {
                needed: Header::SIZE,
                actual: input.len(),
            });
        }

        // Magic classification drives everything downstream.
        let mut raw_magic = [0u32; 4];
        for (i, word) in raw_magic.iter_mut().enumerate() {
            *word = u32::from_le_bytes(
                input[i * 4..i * 4 + 4].try_into().unwrap_or([0; 4]),
            );
        }
        let flags = magic::lookup(raw_magic)?;

        self.is_64bit = flags.is_64bit;
        self.mismatch_endianness = is_host_big_endian() != flags.big_endian;
        tracing::debug!(
            is_64bit = self.is_64bit,
            big_endian = flags.big_endian,
            mismatch = self.mismatch_endianness,
            "classified magic"
        );

        // Header: only the size field is endian-sensitive; format 0 reads
        // the same either way.
        let mut header_block = input[..Header::SIZE].to_vec();
        if self.mismatch_endianness {
            word_swap(&mut header_block[16..20]);
        }
        self.header = Header::read(&mut Cursor::new(&header_block))?;
        if self.header.format != 0 {
            return Err(Error::InvalidHeaderFormat(self.header.format));
        }

        self.load_file_info(input, flags.extra_16)?;
        self.load_sector_table(input)?;

        let (mut arena, mut pointers) = self.decompress_sectors(input)?;
        self.apply_fixups(input, &mut arena, &mut pointers)?;
        self.apply_marshalling(input, &mut arena, &pointers)?;

        let mut elements = Vec::new();
        let mut root_children = Vec::new();
        if self.file_info.sector_count > 0 {
            let type_offset = self.reference_offset(
                self.file_info.type_ref.sector,
                self.file_info.type_ref.position,
            )?;
            let data_offset = self.reference_offset(
                self.file_info.root_ref.sector,
                self.file_info.root_ref.position,
            )?;

            let mut cursor = data_offset;
            ElementParser::new(&arena, &pointers, self.is_64bit).parse_sequence(
                type_offset,
                &mut cursor,
                &mut elements,
                &mut root_children,
            )?;
        }

        self.data = arena;
        self.pointers = pointers;
        self.elements = elements;
        self.root.children.extend(root_children);

        tracing::debug!(
            elements = self.elements.len(),
            arena = self.data.len(),
            "load complete"
        );
        Ok(())
    }

    fn load_file_info(&mut self, input: &[u8], extra_16: bool) -> Result<()> {
        let required = FileInfo::required_size(extra_16);
        let needed = Header::SIZE + required;
        if input.len() < needed {
            return Err(Error::Truncated {
                needed,
                actual: input.len(),
            });
        }

        let mut block = input[Header::SIZE..needed].to_vec();
        if self.mismatch_endianness {
            word_swap(&mut block);
        }
        self.file_info = FileInfo::read(&mut Cursor::new(&block), extra_16)?;

        if self.file_info.file_info_size != required as u32 {
            return Err(Error::FileInfoSizeMismatch {
                expected: required as u32,
                actual: self.file_info.file_info_size,
            });
        }
        if self.file_info.format != 6 && self.file_info.format != 7 {
            return Err(Error::UnsupportedFileFormat(self.file_info.format));
        }
        if self.file_info.total_size as usize != input.len() {
            return Err(Error::TotalSizeMismatch {
                stored: self.file_info.total_size,
                actual: input.len(),
            });
        }

        let stored_crc = self.file_info.crc32;
        let actual_crc = crc32fast::hash(&input[needed..]);
        if stored_crc != actual_crc {
            tracing::warn!(stored_crc, actual_crc, "file CRC32 does not match contents");
        }

        Ok(())
    }

    fn load_sector_table(&mut self, input: &[u8]) -> Result<()> {
        let table_offset = Header::SIZE + self.file_info.file_info_size as usize;
        let count = self.file_info.sector_count as usize;
        let table_end = table_offset + count * Sector::SIZE;
        if input.len() < table_end {
            return Err(Error::Truncated {
                needed: table_end,
                actual: input.len(),
            });
        }

        self.sectors = Vec::with_capacity(count);
        for i in 0..count {
            let at = table_offset + i * Sector::SIZE;
            let mut block = input[at..at + Sector::SIZE].to_vec();
            if self.mismatch_endianness {
                word_swap(&mut block);
            }
            let sector = Sector::read(&mut Cursor::new(&block))?;

            let end = sector.data_offset as usize + sector.stored_len() as usize;
            if end > input.len() {
                return Err(Error::OutOfBounds(format!(
                    "sector {i} data [{:#x}..{end:#x}] outside the file",
                    sector.data_offset
                )));
            }

            self.sectors.push(sector);
        }

        Ok(())
    }

    /// Decompress every sector into the arena, applying the stop-bounded
    /// endianness repair, and record per-sector offsets.
    fn decompress_sectors(&mut self, input: &[u8]) -> Result<(Vec<u8>, PointerTable)> {
        let arena_size: usize = self
            .sectors
            .iter()
            .map(|s| s.decompressed_len as usize)
            .sum();
        let mut arena = Vec::with_capacity(arena_size);
        let pointers = PointerTable::new();

        self.sector_offsets = Vec::with_capacity(self.sectors.len());
        for (i, sector) in self.sectors.iter().enumerate() {
            let start = arena.len();
            self.sector_offsets.push(start);

            let data_offset = sector.data_offset as usize;
            let decompressed_len = sector.decompressed_len as usize;

            if sector.compression == Compression::None {
                arena.extend_from_slice(&input[data_offset..data_offset + decompressed_len]);
            } else {
                let compressed_len = sector.compressed_len as usize;
                let mut staging =
                    Vec::with_capacity(compressed_len + sector.compression.extra_len());
                staging.extend_from_slice(&input[data_offset..data_offset + compressed_len]);
                staging.resize(compressed_len + sector.compression.extra_len(), 0);
                if self.mismatch_endianness {
                    word_swap(&mut staging[..compressed_len]);
                }

                let decompressed = match sector.compression {
                    Compression::Oodle1 => oodle1::decompress(
                        &staging,
                        decompressed_len,
                        sector.oodle_stop0,
                        sector.oodle_stop1,
                    )?,
                    other => return Err(Error::UnsupportedCompression(other as u32)),
                };
                arena.extend_from_slice(&decompressed);
            }

            if self.mismatch_endianness {
                let stop0 = sector.oodle_stop0 as usize;
                let stop1 = sector.oodle_stop1 as usize;
                if stop0 > stop1 || stop1 > decompressed_len {
                    return Err(Error::OutOfBounds(format!(
                        "sector {i} stop offsets {stop0}/{stop1} outside {decompressed_len} bytes"
                    )));
                }
                word_swap(&mut arena[start..start + stop0]);
                pair_swap(&mut arena[start + stop0..start + stop1]);
            }

            tracing::debug!(
                sector = i,
                offset = start,
                len = decompressed_len,
                compression = ?sector.compression,
                "sector decompressed"
            );
        }

        Ok((arena, pointers))
    }

    /// Rewrite every fixed-up pointer slot to a virtual handle resolving
    /// into the arena.
    fn apply_fixups(
        &self,
        input: &[u8],
        arena: &mut [u8],
        pointers: &mut PointerTable,
    ) -> Result<()> {
        for (i, sector) in self.sectors.iter().enumerate() {
            let table_offset = sector.fixup_offset as usize;
            let table_end = table_offset + sector.fixup_count as usize * FixUp::SIZE;
            if table_end > input.len() {
                return Err(Error::OutOfBounds(format!(
                    "sector {i} fix-up table [{table_offset:#x}..{table_end:#x}] outside the file"
                )));
            }

            for k in 0..sector.fixup_count as usize {
                let at = table_offset + k * FixUp::SIZE;
                let mut block = input[at..at + FixUp::SIZE].to_vec();
                if self.mismatch_endianness {
                    word_swap(&mut block);
                }
                let fixup = FixUp::read(&mut Cursor::new(&block))?;

                if fixup.dst_sector as usize >= self.sector_offsets.len() {
                    return Err(Error::OutOfBounds(format!(
                        "fix-up destination sector {} does not exist",
                        fixup.dst_sector
                    )));
                }
                let src = self.sector_offsets[i] + fixup.src_offset as usize;
                let dst = self.sector_offsets[fixup.dst_sector as usize]
                    + fixup.dst_offset as usize;
                if src + 4 > arena.len() || dst > arena.len() {
                    return Err(Error::OutOfBounds(format!(
                        "fix-up {src:#x} -> {dst:#x} outside the arena"
                    )));
                }

                let handle = pointers.encode(dst);
                arena[src..src + 4].copy_from_slice(&handle.to_ne_bytes());
            }
        }

        Ok(())
    }

    /// Repair the byte order of marshalled element runs. A no-op when
    /// the file already matches the host.
    fn apply_marshalling(
        &self,
        input: &[u8],
        arena: &mut [u8],
        pointers: &PointerTable,
    ) -> Result<()> {
        for (i, sector) in self.sectors.iter().enumerate() {
            let table_offset = sector.marshal_offset as usize;
            let table_end = table_offset + sector.marshal_count as usize * Marshal::SIZE;
            if table_end > input.len() {
                return Err(Error::OutOfBounds(format!(
                    "sector {i} marshal table [{table_offset:#x}..{table_end:#x}] outside the file"
                )));
            }

            if !self.mismatch_endianness {
                continue;
            }

            for k in 0..sector.marshal_count as usize {
                let at = table_offset + k * Marshal::SIZE;
                let mut block = input[at..at + Marshal::SIZE].to_vec();
                word_swap(&mut block);
                let marshal = Marshal::read(&mut Cursor::new(&block))?;

                if marshal.dst_sector as usize >= self.sector_offsets.len() {
                    return Err(Error::OutOfBounds(format!(
                        "marshal destination sector {} does not exist",
                        marshal.dst_sector
                    )));
                }
                let type_offset = self.sector_offsets[marshal.dst_sector as usize]
                    + marshal.dst_offset as usize;
                let mut pos = self.sector_offsets[i] + marshal.src_offset as usize;

                for _ in 0..marshal.count {
                    pos = marshal_walk(arena, pointers, self.is_64bit, type_offset, pos, 0)?;
                }
            }
        }

        Ok(())
    }

    fn reference_offset(&self, sector: u32, position: u32) -> Result<usize> {
        let sector = sector as usize;
        if sector >= self.sector_offsets.len() {
            return Err(Error::OutOfBounds(format!(
                "reference names sector {sector} of {}",
                self.sector_offsets.len()
            )));
        }
        Ok(self.sector_offsets[sector] + position as usize)
    }

    /// Look up an element of the global index.
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    /// The root's direct children.
    pub fn root_children(&self) -> impl Iterator<Item = &Element> {
        self.root.children.iter().filter_map(|&id| self.element(id))
    }

    /// Decode the scalar payload of a primitive or transform element.
    pub fn scalar_values(&self, element: &Element) -> Option<ScalarValues> {
        let ElementData::Scalars { offset } = element.data else {
            return None;
        };
        let type_id = element.type_id().ok()?;
        let count = element.size as usize;
        let width = type_id.layout_size(self.is_64bit) as usize;
        let bytes = self.data.get(offset..offset + width * count)?;

        Some(match type_id {
            TypeId::Real32 => ScalarValues::Real32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_ne_bytes(c.try_into().unwrap_or([0; 4])))
                    .collect(),
            ),
            TypeId::Real16 => ScalarValues::Real16(
                bytes
                    .chunks_exact(2)
                    .map(|c| half::f16::from_bits(u16::from_ne_bytes(c.try_into().unwrap_or([0; 2]))))
                    .collect(),
            ),
            TypeId::Int8 | TypeId::BinormalInt8 => {
                ScalarValues::Int8(bytes.iter().map(|&b| b as i8).collect())
            }
            TypeId::Uint8 | TypeId::NormalUint8 => ScalarValues::Uint8(bytes.to_vec()),
            TypeId::Int16 | TypeId::BinormalInt16 => ScalarValues::Int16(
                bytes
                    .chunks_exact(2)
                    .map(|c| i16::from_ne_bytes(c.try_into().unwrap_or([0; 2])))
                    .collect(),
            ),
            TypeId::Uint16 | TypeId::NormalUint16 => ScalarValues::Uint16(
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_ne_bytes(c.try_into().unwrap_or([0; 2])))
                    .collect(),
            ),
            TypeId::Int32 => ScalarValues::Int32(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_ne_bytes(c.try_into().unwrap_or([0; 4])))
                    .collect(),
            ),
            TypeId::Uint32 => ScalarValues::Uint32(
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_ne_bytes(c.try_into().unwrap_or([0; 4])))
                    .collect(),
            ),
            TypeId::Transform => {
                let mut transforms = Vec::with_capacity(count);
                for chunk in bytes.chunks_exact(Transform::SIZE) {
                    transforms.push(Transform::read(&mut Cursor::new(chunk)).ok()?);
                }
                ScalarValues::Transform(transforms)
            }
            _ => return None,
        })
    }

    /// Decode a `Real32` element's values.
    pub fn real32_values(&self, element: &Element) -> Option<Vec<f32>> {
        match self.scalar_values(element)? {
            ScalarValues::Real32(values) => Some(values),
            _ => None,
        }
    }

    /// Decode a `String` element's text.
    pub fn string_value(&self, element: &Element) -> Option<String> {
        let ElementData::String { handle } = element.data else {
            return None;
        };
        let offset = self.pointers.decode(handle)?;
        read_string_at(&self.data, offset)
    }
}

/// Walk one descriptor sequence over the marshalled data at `pos`,
/// swapping each primitive field's extent by its swap unit and recursing
/// into inline children. Returns the position after the walked element.
fn marshal_walk(
    arena: &mut [u8],
    pointers: &PointerTable,
    is_64bit: bool,
    type_offset: usize,
    mut pos: usize,
    depth: usize,
) -> Result<usize> {
    if depth >= MAX_MARSHAL_DEPTH {
        return Err(Error::NestingTooDeep);
    }

    let mut type_cursor = type_offset;
    while let Some(node) = TypeNode::parse(arena, &mut type_cursor, is_64bit)? {
        let type_id = node.type_id()?;

        if type_id == TypeId::Inline {
            if let Some(child_root) = pointers.decode(node.children_offset as u32) {
                pos = marshal_walk(arena, pointers, is_64bit, child_root, pos, depth + 1)?;
            }
            continue;
        }

        let reps = if node.array_size > 0 {
            node.array_size as usize
        } else {
            1
        };
        let extent = type_id.layout_size(is_64bit) as usize * reps;
        if pos + extent > arena.len() {
            return Err(Error::OutOfBounds(format!(
                "marshalled element [{pos:#x}..{:#x}] outside the arena",
                pos + extent
            )));
        }

        // Only primitives are swapped; pointer-bearing fields hold
        // virtual handles already written in host order.
        let unit = type_id.swap_size() as usize;
        if (unit == 2 || unit == 4) && !type_id.requires_zero_array_size() {
            for group in arena[pos..pos + extent].chunks_exact_mut(unit) {
                group.reverse();
            }
        }
        pos += extent;
    }

    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_context_is_empty() {
        let gr2 = Gr2::new();
        assert_eq!(gr2.root.name.as_deref(), Some("Root"));
        assert!(gr2.root.children.is_empty());
        assert!(gr2.elements.is_empty());
        assert!(gr2.data.is_empty());
        assert!(gr2.pointers.is_empty());
    }

    #[test]
    fn test_marshal_walk_swaps_primitives() {
        // Descriptor: Uint32[1] then Uint16[2]; data follows.
        let mut arena = Vec::new();
        let type_at = arena.len();
        for (type_id, array_size) in [(TypeId::Uint32 as u32, 0i32), (TypeId::Uint16 as u32, 2)] {
            arena.extend_from_slice(&type_id.to_ne_bytes());
            arena.extend_from_slice(&0u32.to_ne_bytes());
            arena.extend_from_slice(&0u32.to_ne_bytes());
            arena.extend_from_slice(&array_size.to_ne_bytes());
            arena.extend_from_slice(&[0u8; 12]);
            arena.extend_from_slice(&0u32.to_ne_bytes());
        }
        arena.extend_from_slice(&[0u8; 32]); // terminator descriptor

        let data_at = arena.len();
        arena.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0xAA, 0xBB, 0xCC, 0xDD]);

        let pointers = PointerTable::new();
        let end = marshal_walk(&mut arena, &pointers, false, type_at, data_at, 0).unwrap();

        assert_eq!(end, data_at + 8);
        assert_eq!(
            &arena[data_at..],
            &[0x44, 0x33, 0x22, 0x11, 0xBB, 0xAA, 0xDD, 0xCC]
        );
    }
}
