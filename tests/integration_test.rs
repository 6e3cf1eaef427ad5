use macgranny::prelude::*;
use pretty_assertions::assert_eq;

/// Little-endian 32-bit format-6 magic words.
const MAGIC_LE32_V6: [u32; 4] = [3400558520, 263286264, 2123133572, 503322974];

/// Little-endian 32-bit format-7 magic words.
const MAGIC_LE32_V7: [u32; 4] = [3228360233, 726901946, 2780296485, 4007814902];

fn header_bytes(magic: [u32; 4], size_with_sectors: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(28);
    for word in magic {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.extend_from_slice(&size_with_sectors.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // header format
    bytes.extend_from_slice(&[0u8; 8]);
    bytes
}

#[allow(clippy::too_many_arguments)]
fn file_info_bytes(
    format: i32,
    total_size: u32,
    file_info_size: u32,
    sector_count: u32,
    type_ref: (u32, u32),
    root_ref: (u32, u32),
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(file_info_size as usize);
    bytes.extend_from_slice(&format.to_le_bytes());
    bytes.extend_from_slice(&total_size.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // crc32
    bytes.extend_from_slice(&file_info_size.to_le_bytes());
    bytes.extend_from_slice(&sector_count.to_le_bytes());
    bytes.extend_from_slice(&type_ref.0.to_le_bytes());
    bytes.extend_from_slice(&type_ref.1.to_le_bytes());
    bytes.extend_from_slice(&root_ref.0.to_le_bytes());
    bytes.extend_from_slice(&root_ref.1.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // tag
    bytes.resize(bytes.len() + (file_info_size as usize - 0x28), 0); // extra
    bytes
}

fn sector_bytes(
    data_offset: u32,
    decompressed_len: u32,
    fixup_offset: u32,
    fixup_count: u32,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(44);
    for value in [
        0u32, // compression: none
        data_offset,
        decompressed_len, // compressed_len, unused when uncompressed
        decompressed_len,
        4, // alignment
        0, // oodle stop 0
        0, // oodle stop 1
        fixup_offset,
        fixup_count,
        0, // marshal offset
        0, // marshal count
    ] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn fixup_bytes(src_offset: u32, dst_sector: u32, dst_offset: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12);
    bytes.extend_from_slice(&src_offset.to_le_bytes());
    bytes.extend_from_slice(&dst_sector.to_le_bytes());
    bytes.extend_from_slice(&dst_offset.to_le_bytes());
    bytes
}

/// 32-bit type-node descriptor (32 bytes).
fn descriptor_bytes(type_id: u32, name_ptr: u32, children_ptr: u32, array_size: i32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(&type_id.to_le_bytes());
    bytes.extend_from_slice(&name_ptr.to_le_bytes());
    bytes.extend_from_slice(&children_ptr.to_le_bytes());
    bytes.extend_from_slice(&array_size.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 12]); // extra
    bytes.extend_from_slice(&0u32.to_le_bytes()); // extra4
    bytes
}

/// Minimal valid format-6 file: header + file info, no sectors.
fn empty_format6_file() -> Vec<u8> {
    let mut file = header_bytes(MAGIC_LE32_V6, 56);
    file.extend(file_info_bytes(6, 84, 0x38, 0, (0, 0), (0, 0)));
    file
}

#[test]
fn test_reject_short_input() {
    let err = Gr2::from_bytes(&[0u8; 10]).unwrap_err();
    assert!(matches!(err, Error::Truncated { .. }));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[test]
fn test_reject_unknown_magic() {
    let err = Gr2::from_bytes(&[0u8; 28]).unwrap_err();
    assert!(matches!(err, Error::InvalidMagic(_)));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[test]
fn test_accept_empty_format6_file() {
    let file = empty_format6_file();
    assert_eq!(file.len(), 84);

    let gr2 = Gr2::from_bytes(&file).unwrap();
    assert!(!gr2.is_64bit);
    assert!(!gr2.mismatch_endianness);
    assert_eq!(gr2.file_info.format, 6);
    assert_eq!(gr2.file_info.sector_count, 0);
    assert!(gr2.elements.is_empty());
    assert!(gr2.root.children.is_empty());
    assert_eq!(gr2.root.name.as_deref(), Some("Root"));
}

#[test]
fn test_accept_empty_format7_file() {
    let mut file = header_bytes(MAGIC_LE32_V7, 72);
    file.extend(file_info_bytes(7, 100, 0x48, 0, (0, 0), (0, 0)));
    assert_eq!(file.len(), 100);

    let gr2 = Gr2::from_bytes(&file).unwrap();
    assert_eq!(gr2.file_info.format, 7);
    assert!(gr2.elements.is_empty());
}

#[test]
fn test_reject_file_format_mismatch() {
    let mut file = header_bytes(MAGIC_LE32_V6, 56);
    file.extend(file_info_bytes(5, 84, 0x38, 0, (0, 0), (0, 0)));

    let err = Gr2::from_bytes(&file).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFileFormat(5)));
}

#[test]
fn test_reject_total_size_mismatch() {
    let mut file = header_bytes(MAGIC_LE32_V6, 56);
    file.extend(file_info_bytes(6, 999, 0x38, 0, (0, 0), (0, 0)));

    let err = Gr2::from_bytes(&file).unwrap_err();
    assert!(matches!(err, Error::TotalSizeMismatch { stored: 999, .. }));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[test]
fn test_reject_header_format() {
    let mut file = empty_format6_file();
    file[20..24].copy_from_slice(&1u32.to_le_bytes());

    let err = Gr2::from_bytes(&file).unwrap_err();
    assert!(matches!(err, Error::InvalidHeaderFormat(1)));
}

#[test]
fn test_reject_truncated_file_info() {
    let file = header_bytes(MAGIC_LE32_V6, 56);
    let err = Gr2::from_bytes(&file).unwrap_err();
    assert!(matches!(err, Error::Truncated { .. }));
}

#[test]
fn test_reject_sector_outside_file() {
    // One uncompressed sector whose payload would end past the file.
    let mut file = header_bytes(MAGIC_LE32_V6, 56 + 44);
    file.extend(file_info_bytes(6, 128, 0x38, 1, (0, 0), (0, 0)));
    file.extend(sector_bytes(1000, 64, 0, 0));
    file.resize(128, 0);

    let err = Gr2::from_bytes(&file).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds(_)));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[test]
fn test_reject_unsupported_compression() {
    // One sector marked BitKnit2; recognised but not decoded.
    let mut file = header_bytes(MAGIC_LE32_V6, 56 + 44);
    file.extend(file_info_bytes(6, 144, 0x38, 1, (0, 0), (0, 0)));
    let mut sector = sector_bytes(128, 16, 0, 0);
    sector[0..4].copy_from_slice(&4u32.to_le_bytes());
    file.extend(sector);
    file.resize(144, 0);

    let err = Gr2::from_bytes(&file).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCompression(4)));
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

/// Uncompressed single-sector round trip: a `Real32[3]` named "v".
///
/// Sector layout: name string at 0, descriptor at 4, terminator at 36,
/// data stream at 40.
#[test]
fn test_uncompressed_scalar_round_trip() {
    let mut sector_data = Vec::new();
    sector_data.extend_from_slice(b"v\0\0\0");
    sector_data.extend(descriptor_bytes(10, 0xDEAD_BEEF, 0, 3)); // Real32[3]; name pointer fixed up below
    sector_data.extend_from_slice(&0u32.to_le_bytes()); // terminator
    for value in [1.0f32, 2.0, 3.0] {
        sector_data.extend_from_slice(&value.to_le_bytes());
    }
    assert_eq!(sector_data.len(), 52);

    // header (28) + file info (56) + sector table (44) = 128,
    // fix-up table at 128, sector data at 140
    let total = 140 + sector_data.len() as u32;
    let mut file = header_bytes(MAGIC_LE32_V6, 56 + 44);
    file.extend(file_info_bytes(6, total, 0x38, 1, (0, 4), (0, 40)));
    file.extend(sector_bytes(140, 52, 128, 1));
    file.extend(fixup_bytes(8, 0, 0)); // descriptor name slot -> "v"
    file.extend(sector_data);
    assert_eq!(file.len(), total as usize);

    let gr2 = Gr2::from_bytes(&file).unwrap();

    assert_eq!(gr2.elements.len(), 1);
    assert_eq!(gr2.root.children.len(), 1);
    assert_eq!(gr2.data.len(), 52);
    assert_eq!(gr2.sector_offsets, vec![0]);

    let element = gr2.element(gr2.root.children[0]).unwrap();
    assert_eq!(element.name.as_deref(), Some("v"));
    assert_eq!(element.type_id().unwrap(), TypeId::Real32);
    assert_eq!(element.size, 3);
    assert_eq!(gr2.real32_values(element), Some(vec![1.0, 2.0, 3.0]));

    // The rewritten name pointer resolves inside the arena.
    let handle = element.info.name_offset as u32;
    let offset = gr2.pointers.decode(handle).unwrap();
    assert!(offset < gr2.data.len());
}

/// String element: both the descriptor name and the data pointer go
/// through fix-ups.
///
/// Sector layout: name at 0, string value at 4, descriptor at 12,
/// terminator at 44, data stream (one pointer slot) at 48.
#[test]
fn test_string_element_round_trip() {
    let mut sector_data = Vec::new();
    sector_data.extend_from_slice(b"s\0\0\0");
    sector_data.extend_from_slice(b"hello\0\0\0");
    sector_data.extend(descriptor_bytes(8, 0, 0, 0)); // String
    sector_data.extend_from_slice(&0u32.to_le_bytes()); // terminator
    sector_data.extend_from_slice(&0u32.to_le_bytes()); // pointer slot, fixed up
    assert_eq!(sector_data.len(), 52);

    // header + file info + sector table = 128, two fix-ups at 128,
    // sector data at 152
    let total = 152 + sector_data.len() as u32;
    let mut file = header_bytes(MAGIC_LE32_V6, 56 + 44);
    file.extend(file_info_bytes(6, total, 0x38, 1, (0, 12), (0, 48)));
    file.extend(sector_bytes(152, 52, 128, 2));
    file.extend(fixup_bytes(16, 0, 0)); // descriptor name slot -> "s"
    file.extend(fixup_bytes(48, 0, 4)); // data pointer slot -> "hello"
    file.extend(sector_data);
    assert_eq!(file.len(), total as usize);

    let gr2 = Gr2::from_bytes(&file).unwrap();

    assert_eq!(gr2.elements.len(), 1);
    let element = gr2.element(gr2.root.children[0]).unwrap();
    assert_eq!(element.name.as_deref(), Some("s"));
    assert_eq!(element.type_id().unwrap(), TypeId::String);
    assert_eq!(element.size, 1);
    assert_eq!(gr2.string_value(element).as_deref(), Some("hello"));
}

/// Pointer-bearing kinds must carry a zero descriptor array size.
#[test]
fn test_reject_array_sized_reference() {
    let mut sector_data = Vec::new();
    sector_data.extend(descriptor_bytes(2, 0, 0, 5)); // Reference with array_size 5
    sector_data.extend_from_slice(&0u32.to_le_bytes());
    sector_data.extend_from_slice(&0u32.to_le_bytes());

    let total = 128 + sector_data.len() as u32;
    let mut file = header_bytes(MAGIC_LE32_V6, 56 + 44);
    file.extend(file_info_bytes(6, total, 0x38, 1, (0, 0), (0, 36)));
    file.extend(sector_bytes(128, sector_data.len() as u32, 0, 0));
    file.extend(sector_data);

    let err = Gr2::from_bytes(&file).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidArraySize { type_id: 2, size: 5 }
    ));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}
