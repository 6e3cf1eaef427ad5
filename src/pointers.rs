//! Virtual pointer table
//!
//! GR2 sector data embeds pointer-valued fields whose stored bit
//! patterns are meaningless outside the process that wrote the file.
//! During fix-up every such field is overwritten with an opaque handle
//! issued by this table; every later dereference goes back through
//! [`PointerTable::decode`] and yields an offset into the decompressed
//! arena. Handle 0 is reserved for null, so the arena never carries a
//! live address.

/// Handle <-> arena-offset mapping owned by a reader context.
#[derive(Debug, Default)]
pub struct PointerTable {
    offsets: Vec<usize>,
}

impl PointerTable {
    pub fn new() -> Self {
        Self {
            offsets: Vec::with_capacity(100),
        }
    }

    /// Register an arena offset and return its handle (always non-zero).
    pub fn encode(&mut self, offset: usize) -> u32 {
        self.offsets.push(offset);
        self.offsets.len() as u32
    }

    /// Resolve a handle back to its arena offset. Handle 0 and handles
    /// never issued decode to `None`.
    pub fn decode(&self, handle: u32) -> Option<usize> {
        if handle == 0 {
            return None;
        }
        self.offsets.get(handle as usize - 1).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_decode_round_trip() {
        let mut table = PointerTable::new();
        let a = table.encode(0x10);
        let b = table.encode(0x2000);

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(table.decode(a), Some(0x10));
        assert_eq!(table.decode(b), Some(0x2000));
    }

    #[test]
    fn test_null_and_out_of_range() {
        let mut table = PointerTable::new();
        table.encode(42);

        assert_eq!(table.decode(0), None);
        assert_eq!(table.decode(2), None);
        assert_eq!(table.decode(u32::MAX), None);
    }
}
