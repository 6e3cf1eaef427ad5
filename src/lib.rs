//! # `macgranny`
//!
//! A pure-Rust reader for RAD Game Tools Granny2 (GR2) asset files.
//!
//! GR2 is a closed binary container carrying rigged meshes, skeletal
//! animation and art-tool metadata. This crate decodes the container
//! (magic classification, header/file-info validation, sector table),
//! decompresses Oodle1 sectors with a clean-room arithmetic decoder,
//! rewrites embedded pointers to safe virtual handles, and walks the
//! file's own type descriptions to build a traversable tree of typed
//! elements.
//!
//! ## Quick Start
//!
//! ```no_run
//! use macgranny::Gr2;
//!
//! let bytes = std::fs::read("mesh.gr2")?;
//! let gr2 = Gr2::from_bytes(&bytes)?;
//!
//! println!("{} sectors, {} elements", gr2.sectors.len(), gr2.elements.len());
//! for element in gr2.root_children() {
//!     println!("{}", element.name.as_deref().unwrap_or("<unnamed>"));
//! }
//! # Ok::<(), macgranny::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - `endian.rs`: host endianness probe and the two 4-byte-group swaps
//! - `magic.rs`: registry of known magics and their layout flags
//! - `pointers.rs`: virtual handle table replacing raw file pointers
//! - `oodle1.rs`: Oodle1 arithmetic decoder and dictionary
//! - `structures.rs`: bit-exact on-disk structures
//! - `typeinfo.rs`: element type ids, widths, descriptor decoding
//! - `elements.rs`: element tree and the type-driven parser
//! - `reader.rs`: the `Gr2` context and the `load` pipeline
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `macgranny` command-line binary

pub mod elements;
pub mod endian;
pub mod error;
pub mod magic;
pub mod oodle1;
pub mod pointers;
pub mod reader;
pub mod structures;
pub mod typeinfo;

// Re-exports for convenience
pub use error::{Error, ErrorKind, Result};
pub use reader::{Gr2, ScalarValues};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::elements::{Element, ElementData, ElementId};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::magic::MagicFlags;
    pub use crate::oodle1::decompress as decompress_oodle1;
    pub use crate::pointers::PointerTable;
    pub use crate::reader::{Gr2, ScalarValues};
    pub use crate::structures::{Compression, FileInfo, Header, Sector, Transform};
    pub use crate::typeinfo::{TypeId, TypeNode};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;
