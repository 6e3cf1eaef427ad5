//! GR2 element tree
//!
//! An element is the runtime counterpart of one type-node descriptor:
//! the parser walks the descriptor sequence and the data stream in
//! lockstep, binding each element's payload and recursing into children
//! where the descriptor graph says so.
//!
//! Ownership is flat: the reader's global index owns every element, and
//! children lists (including the synthetic root's) hold indices into
//! that index. Payloads never hold addresses; bulk data is kept as arena
//! offsets and pointer-valued fields as virtual handles.

use crate::error::{Error, Result};
use crate::pointers::PointerTable;
use crate::typeinfo::{TypeId, TypeNode, read_ptr_at, read_u32_at};

/// Index of an element in the reader's global element index.
pub type ElementId = usize;

/// Hostile files can make descriptor graphs cycle through references.
const MAX_PARSE_DEPTH: usize = 100;

/// Payload of one element, keyed by its type id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementData {
    /// No payload (`Inline`, `Removed`, the synthetic root).
    None,
    /// Primitive or transform data: a view into the arena, `size`
    /// consecutive elements starting at `offset`.
    Scalars { offset: usize },
    /// Null-terminated string; handle of its first byte.
    String { handle: u32 },
    /// Single reference: handle plus the byte offset applied when
    /// following it (non-zero for variant references).
    Reference { handle: u32, offset: u64 },
    /// Array reference: handle of the array base plus the byte offset
    /// applied when following it; the arity lives in `Element::size`.
    Array { handle: u32, offset: u64 },
    /// Array of references: one handle per element.
    References { handles: Vec<u32> },
}

/// One node of the parsed tree.
#[derive(Debug, Clone)]
pub struct Element {
    /// The descriptor this element was built from.
    pub info: TypeNode,
    /// Decoded node name, if the descriptor carries one.
    pub name: Option<String>,
    /// Element count: 1 for plain nodes, the descriptor arity for fixed
    /// arrays, the stream-read arity for array references.
    pub size: u32,
    /// Typed payload.
    pub data: ElementData,
    /// Children, as indices into the global element index.
    pub children: Vec<ElementId>,
}

impl Element {
    /// Element type id. Descriptors are validated during parsing, so
    /// this never fails for parsed elements.
    pub fn type_id(&self) -> Result<TypeId> {
        self.info.type_id()
    }

    /// Build a free-standing element that is not backed by file data,
    /// such as the reader's `"Root"` node.
    pub fn synthetic(type_id: TypeId, name: &str) -> Self {
        Self {
            info: TypeNode {
                type_id: type_id as u32,
                ..TypeNode::default()
            },
            name: Some(name.to_string()),
            size: 1,
            data: ElementData::None,
            children: Vec::new(),
        }
    }
}

/// Read the null-terminated string starting at `offset`.
pub(crate) fn read_string_at(arena: &[u8], offset: usize) -> Option<String> {
    let tail = arena.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Walks a type-node sequence against the data stream.
pub(crate) struct ElementParser<'a> {
    arena: &'a [u8],
    pointers: &'a PointerTable,
    is_64bit: bool,
    depth: usize,
}

impl<'a> ElementParser<'a> {
    pub fn new(arena: &'a [u8], pointers: &'a PointerTable, is_64bit: bool) -> Self {
        Self {
            arena,
            pointers,
            is_64bit,
            depth: 0,
        }
    }

    fn ptr_width(&self) -> usize {
        if self.is_64bit { 8 } else { 4 }
    }

    /// Parse the descriptor sequence at `type_offset` against the data
    /// cursor, appending constructed elements to `index` and their ids
    /// to `children_out`.
    pub fn parse_sequence(
        &mut self,
        type_offset: usize,
        cursor: &mut usize,
        index: &mut Vec<Element>,
        children_out: &mut Vec<ElementId>,
    ) -> Result<()> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(Error::NestingTooDeep);
        }
        self.depth += 1;

        let mut type_cursor = type_offset;
        while let Some(info) = TypeNode::parse(self.arena, &mut type_cursor, self.is_64bit)? {
            let mut element = self.build_element(&info, cursor)?;

            tracing::debug!(
                name = element.name.as_deref().unwrap_or(""),
                type_id = info.type_id,
                size = element.size,
                cursor = *cursor,
                "parsed element"
            );

            self.parse_children(&mut element, cursor, index)?;

            let id = index.len();
            index.push(element);
            children_out.push(id);
        }

        self.depth -= 1;
        Ok(())
    }

    /// Construct one element and bind its payload, advancing the data
    /// cursor by the element's layout width.
    fn build_element(&self, info: &TypeNode, cursor: &mut usize) -> Result<Element> {
        let type_id = info.type_id()?;

        if type_id.requires_zero_array_size() && info.array_size != 0 {
            return Err(Error::InvalidArraySize {
                type_id: info.type_id,
                size: info.array_size,
            });
        }

        let name = self
            .pointers
            .decode(info.name_offset as u32)
            .and_then(|offset| read_string_at(self.arena, offset));

        let mut size = 1u32;
        let data = match type_id {
            TypeId::None | TypeId::Inline | TypeId::Removed => ElementData::None,

            TypeId::Transform
            | TypeId::Real32
            | TypeId::Int8
            | TypeId::Uint8
            | TypeId::BinormalInt8
            | TypeId::NormalUint8
            | TypeId::Int16
            | TypeId::Uint16
            | TypeId::BinormalInt16
            | TypeId::NormalUint16
            | TypeId::Int32
            | TypeId::Uint32
            | TypeId::Real16 => {
                if info.array_size != 0 {
                    size = info.array_size as u32;
                }
                let offset = *cursor;
                let extent = type_id.layout_size(self.is_64bit) as usize * size as usize;
                if offset + extent > self.arena.len() {
                    return Err(Error::OutOfBounds(format!(
                        "element data [{offset:#x}..{:#x}] outside the arena",
                        offset + extent
                    )));
                }
                *cursor += extent;
                ElementData::Scalars { offset }
            }

            TypeId::String => {
                let handle = read_ptr_at(self.arena, *cursor, self.is_64bit)? as u32;
                *cursor += self.ptr_width();
                ElementData::String { handle }
            }

            TypeId::Reference | TypeId::EmptyReference => {
                let handle = read_ptr_at(self.arena, *cursor, self.is_64bit)? as u32;
                *cursor += self.ptr_width();
                ElementData::Reference { handle, offset: 0 }
            }

            TypeId::VariantReference => {
                let offset = read_ptr_at(self.arena, *cursor, self.is_64bit)?;
                *cursor += self.ptr_width();
                let handle = read_ptr_at(self.arena, *cursor, self.is_64bit)? as u32;
                *cursor += self.ptr_width();
                ElementData::Reference { handle, offset }
            }

            TypeId::ReferenceToArray => {
                size = read_u32_at(self.arena, *cursor)?;
                *cursor += 4;
                let handle = read_ptr_at(self.arena, *cursor, self.is_64bit)? as u32;
                *cursor += self.ptr_width();
                ElementData::Array { handle, offset: 0 }
            }

            TypeId::ReferenceToVariantArray => {
                let offset = read_ptr_at(self.arena, *cursor, self.is_64bit)?;
                *cursor += self.ptr_width();
                size = read_u32_at(self.arena, *cursor)?;
                *cursor += 4;
                let handle = read_ptr_at(self.arena, *cursor, self.is_64bit)? as u32;
                *cursor += self.ptr_width();
                ElementData::Array { handle, offset }
            }

            TypeId::ArrayOfReferences => {
                size = read_u32_at(self.arena, *cursor)?;
                *cursor += 4;
                let base_handle = read_ptr_at(self.arena, *cursor, self.is_64bit)? as u32;
                *cursor += self.ptr_width();

                let mut handles = Vec::with_capacity(size as usize);
                if size > 0 {
                    let base = self.pointers.decode(base_handle).ok_or_else(|| {
                        Error::OutOfBounds(format!(
                            "reference array base handle {base_handle} does not resolve"
                        ))
                    })?;
                    for i in 0..size as usize {
                        let word =
                            read_ptr_at(self.arena, base + i * self.ptr_width(), self.is_64bit)?;
                        handles.push(word as u32);
                    }
                }
                ElementData::References { handles }
            }
        };

        Ok(Element {
            info: info.clone(),
            name,
            size,
            data,
            children: Vec::new(),
        })
    }

    /// Recurse into the element's children sequence where its kind says
    /// children exist.
    fn parse_children(
        &mut self,
        element: &mut Element,
        cursor: &mut usize,
        index: &mut Vec<Element>,
    ) -> Result<()> {
        let type_id = element.info.type_id()?;
        if !type_id.can_have_children() {
            return Ok(());
        }

        let Some(type_root) = self.pointers.decode(element.info.children_offset as u32) else {
            return Ok(());
        };

        match (type_id, &element.data) {
            (
                TypeId::Reference | TypeId::VariantReference,
                &ElementData::Reference { handle, offset },
            ) => {
                if let Some(base) = self.pointers.decode(handle) {
                    let mut child_cursor = base + offset as usize;
                    self.parse_sequence(type_root, &mut child_cursor, index, &mut element.children)?;
                }
            }

            (
                TypeId::ReferenceToArray | TypeId::ReferenceToVariantArray,
                &ElementData::Array { handle, offset },
            ) => {
                if let Some(base) = self.pointers.decode(handle) {
                    let mut child_cursor = base + offset as usize;
                    self.parse_sequence(type_root, &mut child_cursor, index, &mut element.children)?;
                }
            }

            (TypeId::ArrayOfReferences, ElementData::References { handles }) => {
                let handles = handles.clone();
                for handle in handles {
                    if let Some(base) = self.pointers.decode(handle) {
                        let mut child_cursor = base;
                        self.parse_sequence(
                            type_root,
                            &mut child_cursor,
                            index,
                            &mut element.children,
                        )?;
                    }
                }
            }

            (TypeId::Inline, _) => {
                // Inline children share the parent's data cursor
                self.parse_sequence(type_root, cursor, index, &mut element.children)?;
            }

            _ => {}
        }

        Ok(())
    }
}
