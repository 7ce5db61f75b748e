//! Error types for frame files

use std::io;
use thiserror::Error;

use crate::storage::{DataFormat, MatrixSignature};

/// Result type for frame file operations
pub type Result<T> = std::result::Result<T, FrameFileError>;

/// Errors that can occur while reading or writing frame files
#[derive(Debug, Error)]
pub enum FrameFileError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Leading magic matches neither byte order
    #[error("Not a frame file: unexpected magic {magic:#010x}")]
    NotAFrameFile {
        /// Magic value as read in native order
        magic: u32,
    },

    /// Header carries a version this crate cannot read
    #[error("Unsupported format version: {found}, newest supported is {supported}")]
    UnsupportedVersion {
        /// Version found in the header
        found: u32,
        /// Newest version understood
        supported: u32,
    },

    /// Structural inconsistency in frame or matrix data
    #[error("Invalid frame file format: {0}")]
    InvalidFormat(String),

    /// Table of contents is malformed or disagrees with the header
    #[error("Corrupt table of contents: {0}")]
    CorruptToc(String),

    /// File was never closed, so it has no table of contents
    #[error("File has no table of contents (it was not closed after writing)")]
    MissingToc,

    /// Data exceeds a format or configured limit
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: u64,
        /// Size limit
        limit: u64,
    },

    /// Destination buffer cannot hold the stored matrix data
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Stored byte length
        needed: usize,
        /// Buffer length supplied
        available: usize,
    },

    /// Two matrices with the same signature in one frame
    #[error("Duplicate matrix {signature} in frame {frame_index}")]
    DuplicateSignature {
        /// Offending signature
        signature: MatrixSignature,
        /// Global index of the frame
        frame_index: u32,
    },

    /// Frame index outside the stream's range
    #[error("Invalid frame index {index} for stream {stream_id} ({count} frames)")]
    InvalidFrameIndex {
        /// Stream looked up
        stream_id: u32,
        /// Requested index within the stream
        index: u32,
        /// Frames recorded for the stream
        count: u32,
    },

    /// Stream or matrix signature absent from the table of contents
    #[error("Signature not found in table of contents: {0}")]
    SignatureNotFound(String),

    /// Operation not permitted for the way the handle was opened
    #[error("Mode mismatch: {0}")]
    ModeMismatch(&'static str),

    /// Operation called in the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Typed access does not match the stored format
    #[error("Data format mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Format implied by the requested type
        expected: DataFormat,
        /// Format stored in the matrix
        found: DataFormat,
    },

    /// Element count does not match rows x cols
    #[error("Invalid matrix dimensions: {rows}x{cols} does not hold {len} elements")]
    InvalidDimensions {
        /// Row count
        rows: u32,
        /// Column count
        cols: u32,
        /// Element count supplied
        len: usize,
    },

    /// In-place update would change a matrix's stored size
    #[error("Matrix at offset {offset} changed size: stored {stored} bytes, in memory {current}")]
    SizeMismatch {
        /// File offset of the matrix header
        offset: u64,
        /// Byte count on disk
        stored: u32,
        /// Byte count in memory
        current: u32,
    },

    /// Caller used an id reserved by the format
    #[error("Reserved id: {0}")]
    ReservedId(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Embedded JSON document could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameFileError {
    /// Whether this error leaves the handle usable
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BufferTooSmall { .. }
                | Self::SignatureNotFound(_)
                | Self::InvalidFrameIndex { .. }
                | Self::TypeMismatch { .. }
        )
    }
}
