//! Matrix codec
//!
//! A matrix chunk is a [`MatrixHeader`] followed by `rows * cols` elements
//! of the format's word size, zero-padded to an 8-byte boundary. The header
//! records the logical length; padding is never visible to callers.

use std::fmt;
use std::io::{Read, Seek, Write};

use bytemuck::{bytes_of, Pod};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::endian::EndianReader;
use super::format::{pad_len, DataFormat, MatrixHeader, Units, CHUNK_ALIGN};
use crate::config::LimitsConfig;
use crate::{FrameFileError, Result};

/// Numeric element type with a fixed on-disk format
pub trait Element: Pod {
    /// Format tag for this type
    const FORMAT: DataFormat;

    /// Lossy conversion to `f64`
    fn to_f64(self) -> f64;

    /// Lossy conversion from `f64`
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $format:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const FORMAT: DataFormat = DataFormat::$format;

                #[allow(
                    clippy::cast_lossless,
                    clippy::cast_sign_loss,
                    clippy::cast_possible_wrap,
                    clippy::unnecessary_cast
                )]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[allow(
                    clippy::cast_lossless,
                    clippy::cast_sign_loss,
                    clippy::cast_possible_wrap,
                    clippy::unnecessary_cast
                )]
                fn from_f64(value: f64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_element!(
    u8 => UInt8,
    i8 => Int8,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    u64 => UInt64,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
);

/// Identity of a matrix lineage across frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatrixSignature {
    /// Stream the matrix was written under
    pub stream_id: u32,
    /// Application-defined matrix type
    pub matrix_type: u32,
    /// Units tag
    pub units: Units,
    /// Data format
    pub format: DataFormat,
}

impl MatrixSignature {
    /// Create a signature
    pub const fn new(stream_id: u32, matrix_type: u32, units: Units, format: DataFormat) -> Self {
        Self {
            stream_id,
            matrix_type,
            units,
            format,
        }
    }
}

impl fmt::Display for MatrixSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream {} type {} units {} format {}",
            self.stream_id, self.matrix_type, self.units, self.format
        )
    }
}

/// Descriptor of one stored matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixInfo {
    /// Application-defined matrix type
    pub matrix_type: u32,
    /// Units tag
    pub units: Units,
    /// Data format
    pub format: DataFormat,
    /// Row count
    pub rows: u32,
    /// Column count
    pub cols: u32,
    /// Logical data length
    pub byte_count: u32,
    /// File offset of the matrix header
    pub offset: u64,
}

impl MatrixInfo {
    /// Validate a header read at `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the format is unknown, the byte count disagrees with
    /// the shape, or the data exceeds the configured limit
    pub fn from_header(header: &MatrixHeader, offset: u64, limits: &LimitsConfig) -> Result<Self> {
        let format = DataFormat::from_raw(header.format_id)?;
        let expected =
            u64::from(header.rows) * u64::from(header.cols) * format.word_size() as u64;
        if expected != u64::from(header.byte_count) {
            return Err(FrameFileError::InvalidFormat(format!(
                "matrix at offset {offset}: {}x{} {format} needs {expected} bytes, header says {}",
                header.rows, header.cols, header.byte_count
            )));
        }
        if u64::from(header.byte_count) > limits.max_matrix_bytes as u64 {
            return Err(FrameFileError::DataTooLarge {
                size: u64::from(header.byte_count),
                limit: limits.max_matrix_bytes as u64,
            });
        }
        Ok(Self {
            matrix_type: header.matrix_type,
            units: Units(header.units_id),
            format,
            rows: header.rows,
            cols: header.cols,
            byte_count: header.byte_count,
            offset,
        })
    }

    /// Header as stored on disk
    #[must_use]
    pub fn to_header(&self) -> MatrixHeader {
        MatrixHeader {
            matrix_type: self.matrix_type,
            byte_count: self.byte_count,
            format_id: self.format.raw(),
            units_id: self.units.0,
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Signature of this matrix within `stream_id`
    #[must_use]
    pub fn signature(&self, stream_id: u32) -> MatrixSignature {
        MatrixSignature::new(stream_id, self.matrix_type, self.units, self.format)
    }

    /// Element count
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Whether the matrix holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes occupied on disk, header and padding included
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        super::format::chunk_len(self.byte_count as usize)
    }
}

/// Logical byte length of `rows x cols` elements of `format`
///
/// # Errors
///
/// Returns error if the length does not fit the 32-bit header field
pub fn byte_len(format: DataFormat, rows: u32, cols: u32) -> Result<u32> {
    let len = u64::from(rows) * u64::from(cols) * format.word_size() as u64;
    u32::try_from(len).map_err(|_| FrameFileError::DataTooLarge {
        size: len,
        limit: u64::from(u32::MAX),
    })
}

/// Write one matrix chunk, returning the bytes written
///
/// # Errors
///
/// Returns error if `data` does not match the header's byte count or the
/// write fails
pub fn write_matrix<W: Write>(out: &mut W, header: &MatrixHeader, data: &[u8]) -> Result<u64> {
    if data.len() != header.byte_count as usize {
        return Err(FrameFileError::InvalidFormat(format!(
            "matrix data is {} bytes, header says {}",
            data.len(),
            header.byte_count
        )));
    }
    let pad = pad_len(data.len());
    out.write_all(bytes_of(header))?;
    out.write_all(data)?;
    out.write_all(&[0u8; CHUNK_ALIGN][..pad])?;
    Ok((std::mem::size_of::<MatrixHeader>() + data.len() + pad) as u64)
}

/// Read and validate the matrix header at the reader's position
///
/// # Errors
///
/// Returns error if the read fails or the header is invalid
pub fn read_matrix_header<R: Read + Seek>(
    input: &mut EndianReader<R>,
    limits: &LimitsConfig,
) -> Result<MatrixInfo> {
    let offset = input.position();
    let header: MatrixHeader = input.read_header()?;
    MatrixInfo::from_header(&header, offset, limits)
}

/// Read the data following a matrix header into `buf`, then skip the pad
///
/// Returns the logical byte count. A buffer shorter than that is reported
/// as [`FrameFileError::BufferTooSmall`] before anything is read.
///
/// # Errors
///
/// Returns error if `buf` is too small or the read fails
pub fn read_matrix_data<R: Read + Seek>(
    input: &mut EndianReader<R>,
    info: &MatrixInfo,
    buf: &mut [u8],
) -> Result<usize> {
    let len = info.byte_count as usize;
    if buf.len() < len {
        return Err(FrameFileError::BufferTooSmall {
            needed: len,
            available: buf.len(),
        });
    }
    let target = &mut buf[..len];
    if info.format.is_opaque() {
        input.read_raw(target)?;
    } else {
        input.read_vector(target, info.format.word_size())?;
    }
    input.skip(pad_len(len) as u64)?;
    Ok(len)
}

/// Encode `values` as native-order bytes after checking the shape
///
/// # Errors
///
/// Returns error if `values.len() != rows * cols`
pub fn encode_values<T: Element>(values: &[T], rows: u32, cols: u32) -> Result<&[u8]> {
    check_shape(values.len(), rows, cols)?;
    Ok(bytemuck::cast_slice(values))
}

pub(crate) fn check_shape(len: usize, rows: u32, cols: u32) -> Result<()> {
    if u64::from(rows) * u64::from(cols) != len as u64 {
        return Err(FrameFileError::InvalidDimensions { rows, cols, len });
    }
    Ok(())
}

fn decode_as<T: Element>(data: &[u8]) -> Vec<T> {
    data.chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect()
}

fn decode_to_f64<T: Element>(data: &[u8]) -> Vec<f64> {
    data.chunks_exact(std::mem::size_of::<T>())
        .map(|chunk| bytemuck::pod_read_unaligned::<T>(chunk).to_f64())
        .collect()
}

/// Borrowed view of a matrix and its data
#[derive(Debug, Clone, Copy)]
pub struct MatrixRef<'a> {
    info: &'a MatrixInfo,
    data: &'a [u8],
}

impl<'a> MatrixRef<'a> {
    pub(crate) fn new(info: &'a MatrixInfo, data: &'a [u8]) -> Self {
        Self { info, data }
    }

    /// Descriptor
    pub fn info(&self) -> &'a MatrixInfo {
        self.info
    }

    /// Raw native-order data
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Decode to a typed vector
    ///
    /// # Errors
    ///
    /// Returns error if `T` does not match the stored format
    pub fn values<T: Element>(&self) -> Result<Vec<T>> {
        if T::FORMAT != self.info.format {
            return Err(FrameFileError::TypeMismatch {
                expected: T::FORMAT,
                found: self.info.format,
            });
        }
        Ok(decode_as(self.data))
    }

    /// Decode any numeric format to `f64`
    ///
    /// # Errors
    ///
    /// Returns error if the format is not numeric
    pub fn to_f64(&self) -> Result<Vec<f64>> {
        let data = self.data;
        Ok(match self.info.format {
            DataFormat::UInt8 => decode_to_f64::<u8>(data),
            DataFormat::Int8 => decode_to_f64::<i8>(data),
            DataFormat::UInt16 => decode_to_f64::<u16>(data),
            DataFormat::Int16 => decode_to_f64::<i16>(data),
            DataFormat::UInt32 => decode_to_f64::<u32>(data),
            DataFormat::Int32 => decode_to_f64::<i32>(data),
            DataFormat::UInt64 => decode_to_f64::<u64>(data),
            DataFormat::Int64 => decode_to_f64::<i64>(data),
            DataFormat::Float32 => decode_to_f64::<f32>(data),
            DataFormat::Float64 => decode_to_f64::<f64>(data),
            found => {
                return Err(FrameFileError::TypeMismatch {
                    expected: DataFormat::Float64,
                    found,
                })
            }
        })
    }

    /// Text of a string matrix, up to its NUL terminator
    ///
    /// # Errors
    ///
    /// Returns error if the format is not `String` or the text is not UTF-8
    pub fn as_str(&self) -> Result<&'a str> {
        if self.info.format != DataFormat::String {
            return Err(FrameFileError::TypeMismatch {
                expected: DataFormat::String,
                found: self.info.format,
            });
        }
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        std::str::from_utf8(&self.data[..end]).map_err(|e| {
            FrameFileError::InvalidFormat(format!(
                "string matrix at offset {} is not UTF-8: {e}",
                self.info.offset
            ))
        })
    }

    /// Deserialize an embedded JSON document
    ///
    /// # Errors
    ///
    /// Returns error if the format is not `Json` or deserialization fails
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.info.format != DataFormat::Json {
            return Err(FrameFileError::TypeMismatch {
                expected: DataFormat::Json,
                found: self.info.format,
            });
        }
        Ok(serde_json::from_slice(self.data)?)
    }

    /// Copy the data into `buf`, returning the byte count
    ///
    /// # Errors
    ///
    /// Returns [`FrameFileError::BufferTooSmall`] if `buf` is shorter than
    /// the data
    pub fn copy_into(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.data.len();
        if buf.len() < len {
            return Err(FrameFileError::BufferTooSmall {
                needed: len,
                available: buf.len(),
            });
        }
        buf[..len].copy_from_slice(self.data);
        Ok(len)
    }
}

/// Matrix loaded by random access, owning its data
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedMatrix {
    /// Descriptor
    pub info: MatrixInfo,
    /// Native-order data
    pub data: Vec<u8>,
}

impl OwnedMatrix {
    /// Borrowed view
    pub fn view(&self) -> MatrixRef<'_> {
        MatrixRef::new(&self.info, &self.data)
    }
}
