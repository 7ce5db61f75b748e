//! Binary format structures

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::{FrameFileError, Result};

/// File magic, written in the writer's native byte order
pub const FILE_MAGIC: u32 = 0x464D_5246;

/// Current format version
pub const FILE_VERSION: u32 = 1;

/// File header size
pub const HEADER_SIZE: usize = 32;

/// Frame header size
pub const FRAME_HEADER_SIZE: usize = 32;

/// Matrix header size
pub const MATRIX_HEADER_SIZE: usize = 24;

/// Matrix chunks are padded to this boundary
pub const CHUNK_ALIGN: usize = 8;

/// Header value of `toc_offset` before the table of contents is written
pub const NO_TOC_OFFSET: u64 = u64::MAX;

/// Frame type of the hidden table-of-contents frame
pub const TOC_FRAME_TYPE: u32 = 0xFFFF_FFFF;

/// Stream id of the hidden table-of-contents frame
pub const TOC_STREAM_ID: u32 = 0xFFFF_FFFF;

/// Type/units/format value marking a per-stream frame bucket
pub const NO_TYPE: u32 = 0xFFFF_FFFF;

/// Matrix type of a bucket header vector inside the ToC frame
pub const TOC_HEADER_MATRIX: u32 = 0;

/// Matrix type of a bucket offset vector inside the ToC frame
pub const TOC_OFFSET_MATRIX: u32 = 1;

/// Frame flag: time is stored in `seconds`, not `sample_idx`
pub const FLAG_TIME_SECONDS: u32 = 1 << 0;

/// File header (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FileHeader {
    /// Magic value for format and byte-order identification
    pub magic: u32,

    /// Total bytes in the file (valid after close)
    pub byte_count: u32,

    /// Number of frames, excluding the ToC frame
    pub frame_count: u32,

    /// Format version
    pub version: u32,

    /// Offset of the hidden ToC frame
    pub toc_offset: u64,

    /// Sample rate of the underlying signal
    pub sample_rate: f64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<FileHeader>(), HEADER_SIZE);

/// Frame header (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FrameHeader {
    /// Application-defined frame type
    pub frame_type: u32,

    /// Bytes in the frame, this header included
    pub byte_count: u32,

    /// Number of matrices that follow
    pub matrix_count: u32,

    /// Stream this frame belongs to
    pub stream_id: u32,

    /// Flag bits (`FLAG_*`)
    pub flags: u32,

    /// Time as a sample index, when `FLAG_TIME_SECONDS` is clear
    pub sample_idx: u32,

    /// Time in seconds, when `FLAG_TIME_SECONDS` is set
    pub seconds: f64,
}

static_assertions::const_assert_eq!(std::mem::size_of::<FrameHeader>(), FRAME_HEADER_SIZE);

/// Matrix header (24 bytes), followed by padded data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MatrixHeader {
    /// Application-defined matrix type
    pub matrix_type: u32,

    /// Logical data length, padding excluded
    pub byte_count: u32,

    /// Data format tag
    pub format_id: u32,

    /// Units tag
    pub units_id: u32,

    /// Row count
    pub rows: u32,

    /// Column count
    pub cols: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<MatrixHeader>(), MATRIX_HEADER_SIZE);
static_assertions::const_assert_eq!(MATRIX_HEADER_SIZE % CHUNK_ALIGN, 0);

impl FileHeader {
    /// Header for a freshly created file
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self {
            magic: FILE_MAGIC,
            byte_count: HEADER_SIZE as u32,
            frame_count: 0,
            version: FILE_VERSION,
            toc_offset: NO_TOC_OFFSET,
            sample_rate,
        }
    }

    /// Whether a table of contents has been written
    #[must_use]
    pub fn has_toc(&self) -> bool {
        self.toc_offset != NO_TOC_OFFSET
    }
}

/// Time stamp of a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameTime {
    /// Index of the first sample covered by the frame
    Sample(u32),
    /// Time in seconds
    Seconds(f64),
}

impl FrameTime {
    /// Encode into `(flags, sample_idx, seconds)`
    #[must_use]
    pub fn encode(self) -> (u32, u32, f64) {
        match self {
            Self::Sample(idx) => (0, idx, 0.0),
            Self::Seconds(secs) => (FLAG_TIME_SECONDS, 0, secs),
        }
    }

    /// Decode from a frame header
    #[must_use]
    pub fn decode(header: &FrameHeader) -> Self {
        if header.flags & FLAG_TIME_SECONDS != 0 {
            Self::Seconds(header.seconds)
        } else {
            Self::Sample(header.sample_idx)
        }
    }

    /// Time in seconds, converting sample indices with `sample_rate`
    #[must_use]
    pub fn as_seconds(self, sample_rate: f64) -> f64 {
        match self {
            Self::Sample(idx) if sample_rate > 0.0 => f64::from(idx) / sample_rate,
            Self::Sample(_) => 0.0,
            Self::Seconds(secs) => secs,
        }
    }
}

impl fmt::Display for FrameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sample(idx) => write!(f, "sample {idx}"),
            Self::Seconds(secs) => write!(f, "{secs:.6}s"),
        }
    }
}

/// Matrix data format tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum DataFormat {
    /// u8
    UInt8 = 0x01,
    /// i8
    Int8 = 0x02,
    /// u16
    UInt16 = 0x03,
    /// i16
    Int16 = 0x04,
    /// u32
    UInt32 = 0x05,
    /// i32
    Int32 = 0x06,
    /// u64
    UInt64 = 0x07,
    /// i64
    Int64 = 0x08,
    /// f32
    Float32 = 0x09,
    /// f64
    Float64 = 0x0A,
    /// NUL-terminated UTF-8 string
    String = 0x10,
    /// Opaque bytes
    Blob = 0x11,
    /// Serialized JSON document, opaque to the codec
    Json = 0x12,
}

impl DataFormat {
    /// Parse a raw format tag
    ///
    /// # Errors
    ///
    /// Returns error if the tag is unknown
    pub fn from_raw(value: u32) -> Result<Self> {
        Ok(match value {
            0x01 => Self::UInt8,
            0x02 => Self::Int8,
            0x03 => Self::UInt16,
            0x04 => Self::Int16,
            0x05 => Self::UInt32,
            0x06 => Self::Int32,
            0x07 => Self::UInt64,
            0x08 => Self::Int64,
            0x09 => Self::Float32,
            0x0A => Self::Float64,
            0x10 => Self::String,
            0x11 => Self::Blob,
            0x12 => Self::Json,
            other => {
                return Err(FrameFileError::InvalidFormat(format!(
                    "unknown data format tag {other:#x}"
                )))
            }
        })
    }

    /// Raw tag value
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Size in bytes of one element
    pub const fn word_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 | Self::String | Self::Blob | Self::Json => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::UInt64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Whether the data is an opaque byte sequence
    pub const fn is_opaque(self) -> bool {
        matches!(self, Self::String | Self::Blob | Self::Json)
    }

    /// Whether the data is numeric
    pub const fn is_numeric(self) -> bool {
        !self.is_opaque()
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UInt8 => "u8",
            Self::Int8 => "i8",
            Self::UInt16 => "u16",
            Self::Int16 => "i16",
            Self::UInt32 => "u32",
            Self::Int32 => "i32",
            Self::UInt64 => "u64",
            Self::Int64 => "i64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
            Self::String => "string",
            Self::Blob => "blob",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Units tag
///
/// Ids are caller defined. Bit 31 marks the first difference of the
/// underlying quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Units(pub u32);

impl Units {
    /// Bit marking a first difference
    pub const DIFFERENCE: u32 = 1 << 31;

    /// Dimensionless / unspecified
    pub const NONE: Self = Self(0);

    /// Units for a base quantity id
    pub const fn new(id: u32) -> Self {
        Self(id & !Self::DIFFERENCE)
    }

    /// Units of the first difference of this quantity
    #[must_use]
    pub const fn difference(self) -> Self {
        Self(self.0 | Self::DIFFERENCE)
    }

    /// Whether this marks a first difference
    pub const fn is_difference(self) -> bool {
        self.0 & Self::DIFFERENCE != 0
    }

    /// Underlying quantity id
    pub const fn base(self) -> u32 {
        self.0 & !Self::DIFFERENCE
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_difference() {
            write!(f, "d{}", self.base())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Zero bytes appended after `byte_len` bytes of data
pub const fn pad_len(byte_len: usize) -> usize {
    (CHUNK_ALIGN - byte_len % CHUNK_ALIGN) % CHUNK_ALIGN
}

/// On-disk size of a matrix chunk holding `byte_len` data bytes
pub const fn chunk_len(byte_len: usize) -> usize {
    MATRIX_HEADER_SIZE + byte_len + pad_len(byte_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 32);
        assert_eq!(std::mem::size_of::<FrameHeader>(), 32);
        assert_eq!(std::mem::size_of::<MatrixHeader>(), 24);
    }

    #[test]
    fn test_new_header() {
        let header = FileHeader::new(44_100.0);
        assert_eq!(header.magic, FILE_MAGIC);
        assert_eq!(header.version, FILE_VERSION);
        assert_eq!(header.frame_count, 0);
        assert!(!header.has_toc());
    }

    #[test]
    fn test_magic_not_palindromic() {
        assert_ne!(FILE_MAGIC, FILE_MAGIC.swap_bytes());
    }

    #[test]
    fn test_word_sizes() {
        assert_eq!(DataFormat::UInt8.word_size(), 1);
        assert_eq!(DataFormat::Int16.word_size(), 2);
        assert_eq!(DataFormat::Float32.word_size(), 4);
        assert_eq!(DataFormat::Int64.word_size(), 8);
        assert_eq!(DataFormat::Json.word_size(), 1);
    }

    #[test]
    fn test_format_tags() {
        for format in [
            DataFormat::UInt8,
            DataFormat::Int32,
            DataFormat::Float64,
            DataFormat::String,
            DataFormat::Json,
        ] {
            assert_eq!(DataFormat::from_raw(format.raw()).unwrap(), format);
        }
        assert!(DataFormat::from_raw(0xFF).is_err());
        assert!(DataFormat::from_raw(NO_TYPE).is_err());
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad_len(0), 0);
        assert_eq!(pad_len(1), 7);
        assert_eq!(pad_len(8), 0);
        assert_eq!(pad_len(13), 3);
        assert_eq!(chunk_len(40), 64);
        assert_eq!(chunk_len(3) % CHUNK_ALIGN, 0);
    }

    #[test]
    fn test_units_difference() {
        let hz = Units::new(7);
        assert!(!hz.is_difference());
        let delta = hz.difference();
        assert!(delta.is_difference());
        assert_eq!(delta.base(), 7);
        assert_ne!(hz, delta);
        assert_eq!(delta.to_string(), "d7");
    }

    #[test]
    fn test_frame_time() {
        let (flags, idx, secs) = FrameTime::Sample(441).encode();
        assert_eq!((flags, idx, secs), (0, 441, 0.0));

        let mut header = FrameHeader::zeroed();
        let (flags, idx, secs) = FrameTime::Seconds(1.5).encode();
        header.flags = flags;
        header.sample_idx = idx;
        header.seconds = secs;
        assert_eq!(FrameTime::decode(&header), FrameTime::Seconds(1.5));

        assert!((FrameTime::Sample(22_050).as_seconds(44_100.0) - 0.5).abs() < f64::EPSILON);
    }
}
