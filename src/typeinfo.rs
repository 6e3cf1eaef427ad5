//! Granny2 element type system
//!
//! Every GR2 file carries its own schema: a null-terminated sequence of
//! type-node descriptors describing the fields of each structure in the
//! data stream. The 23 element type ids are closed; each id has a fixed
//! storage width per pointer size and a swap unit for marshalling.

use crate::error::{Error, Result};

/// Element type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeId {
    /// Sequence terminator, never materialised as an element.
    None = 0,
    /// Node with children only, laid out inline in the parent's data.
    Inline = 1,
    /// Pointer to a single structure.
    Reference = 2,
    /// Pointer to an array (count + data pointer).
    ReferenceToArray = 3,
    /// Array of pointers to structures.
    ArrayOfReferences = 4,
    /// Reference with an offset.
    VariantReference = 5,
    /// Retired id, kept so the sequence cursor stays honest.
    Removed = 6,
    /// Reference to an array with an offset.
    ReferenceToVariantArray = 7,
    /// Null-terminated string.
    String = 8,
    /// Translation + rotation + scale/shear block.
    Transform = 9,
    /// 32-bit float.
    Real32 = 10,
    /// 8-bit signed integer.
    Int8 = 11,
    /// 8-bit unsigned integer.
    Uint8 = 12,
    /// 8-bit signed, binormal-encoded.
    BinormalInt8 = 13,
    /// 8-bit unsigned, normal-encoded.
    NormalUint8 = 14,
    /// 16-bit signed integer.
    Int16 = 15,
    /// 16-bit unsigned integer.
    Uint16 = 16,
    /// 16-bit signed, binormal-encoded.
    BinormalInt16 = 17,
    /// 16-bit unsigned, normal-encoded.
    NormalUint16 = 18,
    /// 32-bit signed integer.
    Int32 = 19,
    /// 32-bit unsigned integer.
    Uint32 = 20,
    /// Half-precision float.
    Real16 = 21,
    /// Reference to nothing.
    EmptyReference = 22,
}

/// Storage widths for one element type: 32-bit layout width, 64-bit
/// layout width, and the marshalling swap unit.
struct TypeLayout {
    size32: u32,
    size64: u32,
    swap_size: u32,
}

const TYPE_LAYOUTS: [TypeLayout; 23] = [
    TypeLayout { size32: 0, size64: 0, swap_size: 0 },  // None
    TypeLayout { size32: 0, size64: 0, swap_size: 0 },  // Inline
    TypeLayout { size32: 4, size64: 8, swap_size: 0 },  // Reference
    TypeLayout { size32: 8, size64: 12, swap_size: 4 }, // ReferenceToArray
    TypeLayout { size32: 8, size64: 12, swap_size: 4 }, // ArrayOfReferences
    TypeLayout { size32: 8, size64: 16, swap_size: 0 }, // VariantReference
    TypeLayout { size32: 0, size64: 0, swap_size: 0 },  // Removed
    TypeLayout { size32: 12, size64: 20, swap_size: 4 }, // ReferenceToVariantArray
    TypeLayout { size32: 4, size64: 8, swap_size: 4 },  // String
    TypeLayout { size32: 68, size64: 68, swap_size: 4 }, // Transform
    TypeLayout { size32: 4, size64: 4, swap_size: 4 },  // Real32
    TypeLayout { size32: 1, size64: 1, swap_size: 1 },  // Int8
    TypeLayout { size32: 1, size64: 1, swap_size: 1 },  // Uint8
    TypeLayout { size32: 1, size64: 1, swap_size: 1 },  // BinormalInt8
    TypeLayout { size32: 1, size64: 1, swap_size: 1 },  // NormalUint8
    TypeLayout { size32: 2, size64: 2, swap_size: 2 },  // Int16
    TypeLayout { size32: 2, size64: 2, swap_size: 2 },  // Uint16
    TypeLayout { size32: 2, size64: 2, swap_size: 2 },  // BinormalInt16
    TypeLayout { size32: 2, size64: 2, swap_size: 2 },  // NormalUint16
    TypeLayout { size32: 4, size64: 4, swap_size: 4 },  // Int32
    TypeLayout { size32: 4, size64: 4, swap_size: 4 },  // Uint32
    TypeLayout { size32: 2, size64: 2, swap_size: 2 },  // Real16
    TypeLayout { size32: 4, size64: 8, swap_size: 0 },  // EmptyReference
];

impl TypeId {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Inline),
            2 => Ok(Self::Reference),
            3 => Ok(Self::ReferenceToArray),
            4 => Ok(Self::ArrayOfReferences),
            5 => Ok(Self::VariantReference),
            6 => Ok(Self::Removed),
            7 => Ok(Self::ReferenceToVariantArray),
            8 => Ok(Self::String),
            9 => Ok(Self::Transform),
            10 => Ok(Self::Real32),
            11 => Ok(Self::Int8),
            12 => Ok(Self::Uint8),
            13 => Ok(Self::BinormalInt8),
            14 => Ok(Self::NormalUint8),
            15 => Ok(Self::Int16),
            16 => Ok(Self::Uint16),
            17 => Ok(Self::BinormalInt16),
            18 => Ok(Self::NormalUint16),
            19 => Ok(Self::Int32),
            20 => Ok(Self::Uint32),
            21 => Ok(Self::Real16),
            22 => Ok(Self::EmptyReference),
            other => Err(Error::InvalidTypeId(other)),
        }
    }

    /// Human-readable name for dump output.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Inline => "Inline",
            Self::Reference => "Reference",
            Self::ReferenceToArray => "ReferenceToArray",
            Self::ArrayOfReferences => "ArrayOfReferences",
            Self::VariantReference => "VariantReference",
            Self::Removed => "Removed",
            Self::ReferenceToVariantArray => "ReferenceToVariantArray",
            Self::String => "String",
            Self::Transform => "Transform",
            Self::Real32 => "Real32",
            Self::Int8 => "Int8",
            Self::Uint8 => "Uint8",
            Self::BinormalInt8 => "BinormalInt8",
            Self::NormalUint8 => "NormalUint8",
            Self::Int16 => "Int16",
            Self::Uint16 => "Uint16",
            Self::BinormalInt16 => "BinormalInt16",
            Self::NormalUint16 => "NormalUint16",
            Self::Int32 => "Int32",
            Self::Uint32 => "Uint32",
            Self::Real16 => "Real16",
            Self::EmptyReference => "EmptyReference",
        }
    }

    /// Storage width of one element for the given pointer size.
    pub fn layout_size(self, is_64bit: bool) -> u32 {
        let layout = &TYPE_LAYOUTS[self as usize];
        if is_64bit {
            layout.size64
        } else {
            layout.size32
        }
    }

    /// Marshalling swap unit (4 = word swap, 2 = pair swap, 0/1 = none).
    pub fn swap_size(self) -> u32 {
        TYPE_LAYOUTS[self as usize].swap_size
    }

    /// Pointer-bearing kinds carry their arity in the data stream, so
    /// their descriptor array size must be 0.
    pub fn requires_zero_array_size(self) -> bool {
        matches!(
            self,
            Self::Reference
                | Self::ReferenceToArray
                | Self::ArrayOfReferences
                | Self::VariantReference
                | Self::ReferenceToVariantArray
                | Self::String
                | Self::EmptyReference
        )
    }

    /// Kinds whose descriptor children are materialised as child elements.
    pub fn can_have_children(self) -> bool {
        matches!(
            self,
            Self::Inline
                | Self::Reference
                | Self::ReferenceToArray
                | Self::ArrayOfReferences
                | Self::VariantReference
                | Self::ReferenceToVariantArray
        )
    }
}

/// One type-node descriptor, decoded from the arena.
#[derive(Debug, Clone, Default)]
pub struct TypeNode {
    /// Raw type id (1..=22 for materialised nodes).
    pub type_id: u32,
    /// Pointer to the node name (virtual handle after fix-up).
    pub name_offset: u64,
    /// Pointer to the children sequence (virtual handle after fix-up).
    pub children_offset: u64,
    /// Fixed arity for array-capable kinds; 0 otherwise.
    pub array_size: i32,
    /// Unknown bytes.
    pub extra: [u8; 12],
    /// Pointer-sized trailing field.
    pub extra4: u64,
}

pub(crate) fn read_u32_at(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(|bytes| u32::from_ne_bytes(bytes.try_into().unwrap_or([0; 4])))
        .ok_or_else(|| Error::OutOfBounds(format!("u32 read at {offset:#x}")))
}

pub(crate) fn read_u64_at(data: &[u8], offset: usize) -> Result<u64> {
    data.get(offset..offset + 8)
        .map(|bytes| u64::from_ne_bytes(bytes.try_into().unwrap_or([0; 8])))
        .ok_or_else(|| Error::OutOfBounds(format!("u64 read at {offset:#x}")))
}

/// Read one pointer-sized word (zero-extended on 32-bit layouts).
pub(crate) fn read_ptr_at(data: &[u8], offset: usize, is_64bit: bool) -> Result<u64> {
    if is_64bit {
        read_u64_at(data, offset)
    } else {
        read_u32_at(data, offset).map(u64::from)
    }
}

impl TypeNode {
    /// Decode the descriptor at `*offset`, advancing the cursor.
    ///
    /// Returns `None` at the sequence terminator (type id 0); type ids
    /// above 22 reject the file.
    pub fn parse(data: &[u8], offset: &mut usize, is_64bit: bool) -> Result<Option<TypeNode>> {
        let type_id = read_u32_at(data, *offset)?;
        if type_id == 0 {
            return Ok(None);
        }
        TypeId::from_u32(type_id)?;
        *offset += 4;

        let name_offset;
        let children_offset;
        if is_64bit {
            name_offset = read_u64_at(data, *offset)?;
            *offset += 8;
            children_offset = read_u64_at(data, *offset)?;
            // 8 bytes of padding follow the children pointer
            *offset += 16;
        } else {
            name_offset = u64::from(read_u32_at(data, *offset)?);
            *offset += 4;
            children_offset = u64::from(read_u32_at(data, *offset)?);
            *offset += 4;
        }

        let array_size = read_u32_at(data, *offset)? as i32;
        *offset += 4;

        let extra_bytes = data
            .get(*offset..*offset + 12)
            .ok_or_else(|| Error::OutOfBounds(format!("descriptor extra at {offset:#x}")))?;
        let mut extra = [0u8; 12];
        extra.copy_from_slice(extra_bytes);
        *offset += 12;

        let extra4 = read_ptr_at(data, *offset, is_64bit)?;
        *offset += if is_64bit { 8 } else { 4 };

        Ok(Some(TypeNode {
            type_id,
            name_offset,
            children_offset,
            array_size,
            extra,
            extra4,
        }))
    }

    pub fn type_id(&self) -> Result<TypeId> {
        TypeId::from_u32(self.type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor_32(type_id: u32, name: u32, children: u32, array_size: i32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&type_id.to_ne_bytes());
        bytes.extend_from_slice(&name.to_ne_bytes());
        bytes.extend_from_slice(&children.to_ne_bytes());
        bytes.extend_from_slice(&array_size.to_ne_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        bytes
    }

    #[test]
    fn test_type_id_round_trip() {
        for raw in 0..=22u32 {
            let id = TypeId::from_u32(raw).unwrap();
            assert_eq!(id as u32, raw);
        }
        assert!(TypeId::from_u32(23).is_err());
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(TypeId::Reference.layout_size(false), 4);
        assert_eq!(TypeId::Reference.layout_size(true), 8);
        assert_eq!(TypeId::ReferenceToVariantArray.layout_size(false), 12);
        assert_eq!(TypeId::ReferenceToVariantArray.layout_size(true), 20);
        assert_eq!(TypeId::Transform.layout_size(false), 68);
        assert_eq!(TypeId::Transform.layout_size(true), 68);
        assert_eq!(TypeId::Real16.layout_size(true), 2);
    }

    #[test]
    fn test_swap_sizes() {
        assert_eq!(TypeId::Real32.swap_size(), 4);
        assert_eq!(TypeId::Uint16.swap_size(), 2);
        assert_eq!(TypeId::Uint8.swap_size(), 1);
        assert_eq!(TypeId::Reference.swap_size(), 0);
    }

    #[test]
    fn test_zero_array_rule_covers_pointer_kinds() {
        for id in [
            TypeId::Reference,
            TypeId::ReferenceToArray,
            TypeId::ArrayOfReferences,
            TypeId::VariantReference,
            TypeId::ReferenceToVariantArray,
            TypeId::String,
            TypeId::EmptyReference,
        ] {
            assert!(id.requires_zero_array_size());
        }
        assert!(!TypeId::Real32.requires_zero_array_size());
        assert!(!TypeId::Inline.requires_zero_array_size());
    }

    #[test]
    fn test_parse_sequence_32bit() {
        let mut data = descriptor_32(10, 7, 0, 3);
        data.extend_from_slice(&descriptor_32(0, 0, 0, 0));

        let mut offset = 0;
        let node = TypeNode::parse(&data, &mut offset, false).unwrap().unwrap();
        assert_eq!(node.type_id, 10);
        assert_eq!(node.name_offset, 7);
        assert_eq!(node.array_size, 3);
        assert_eq!(offset, 32);

        assert!(TypeNode::parse(&data, &mut offset, false).unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let data = descriptor_32(23, 0, 0, 0);
        let mut offset = 0;
        assert!(TypeNode::parse(&data, &mut offset, false).is_err());
    }

    #[test]
    fn test_parse_64bit_descriptor_stride() {
        let mut data = Vec::new();
        data.extend_from_slice(&19u32.to_ne_bytes());
        data.extend_from_slice(&5u64.to_ne_bytes());
        data.extend_from_slice(&0u64.to_ne_bytes());
        data.extend_from_slice(&[0u8; 8]); // padding after children
        data.extend_from_slice(&2i32.to_ne_bytes());
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(&9u64.to_ne_bytes());
        data.extend_from_slice(&0u32.to_ne_bytes()); // terminator

        let mut offset = 0;
        let node = TypeNode::parse(&data, &mut offset, true).unwrap().unwrap();
        assert_eq!(node.type_id, 19);
        assert_eq!(node.name_offset, 5);
        assert_eq!(node.array_size, 2);
        assert_eq!(node.extra4, 9);
        assert_eq!(offset, 52);
    }
}
