//! Error types for macgranny

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown GR2 magic: {0:08x?}")]
    InvalidMagic([u32; 4]),

    #[error("Truncated file: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Header format {0} is not 0")]
    InvalidHeaderFormat(u32),

    #[error("File info size {actual:#x} does not match expected {expected:#x}")]
    FileInfoSizeMismatch { expected: u32, actual: u32 },

    #[error("Unsupported file format: {0} (supported: 6, 7)")]
    UnsupportedFileFormat(i32),

    #[error("Total size {stored} does not match input length {actual}")]
    TotalSizeMismatch { stored: u32, actual: usize },

    #[error("Unsupported GR2 compression: {0}")]
    UnsupportedCompression(u32),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Invalid element type id: {0}")]
    InvalidTypeId(u32),

    #[error("Array size {size} is invalid for element type {type_id}")]
    InvalidArraySize { type_id: u32, size: i32 },

    #[error("Element tree nesting exceeds limit")]
    NestingTooDeep,
}

/// Coarse failure classification. Every load failure is final and
/// recoverable at the `load` boundary; the kind distinguishes broken
/// inputs from inputs this library does not decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input violates the GR2 container contract.
    Malformed,
    /// The input is recognised but uses a feature this library rejects.
    Unsupported,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedFileFormat(_) | Error::UnsupportedCompression(_) => {
                ErrorKind::Unsupported
            }
            _ => ErrorKind::Malformed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
