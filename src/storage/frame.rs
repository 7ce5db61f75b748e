//! Frame headers and loaded frame contents

use std::collections::HashSet;
use std::io::{Read, Seek, Write};
use std::ops::Range;

use bytemuck::bytes_of;

use super::endian::EndianReader;
use super::format::{
    DataFormat, FrameHeader, FrameTime, Units, CHUNK_ALIGN, FRAME_HEADER_SIZE, TOC_FRAME_TYPE,
    TOC_STREAM_ID,
};
use super::matrix::{
    check_shape, read_matrix_data, read_matrix_header, Element, MatrixInfo, MatrixRef,
};
use crate::config::LimitsConfig;
use crate::{FrameFileError, Result};

/// Header fields of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Global index of the frame in the file
    pub index: u32,
    /// Application-defined frame type
    pub frame_type: u32,
    /// Stream the frame belongs to
    pub stream_id: u32,
    /// Time stamp
    pub time: FrameTime,
    /// Number of matrices
    pub matrix_count: u32,
    /// Bytes in the frame, header included
    pub byte_count: u32,
    /// File offset of the frame header
    pub offset: u64,
}

impl FrameInfo {
    /// Offset just past the frame
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.byte_count)
    }

    /// Whether the frame passes a type and stream filter (`None` = any)
    #[must_use]
    pub fn matches(&self, frame_type: Option<u32>, stream_id: Option<u32>) -> bool {
        frame_type.map_or(true, |t| t == self.frame_type)
            && stream_id.map_or(true, |s| s == self.stream_id)
    }

    /// Whether this is the hidden table-of-contents frame
    #[must_use]
    pub fn is_toc(&self) -> bool {
        self.frame_type == TOC_FRAME_TYPE && self.stream_id == TOC_STREAM_ID
    }
}

/// Build the on-disk header for a frame being opened
pub(crate) fn new_frame_header(frame_type: u32, stream_id: u32, time: FrameTime) -> FrameHeader {
    let (flags, sample_idx, seconds) = time.encode();
    FrameHeader {
        frame_type,
        byte_count: FRAME_HEADER_SIZE as u32,
        matrix_count: 0,
        stream_id,
        flags,
        sample_idx,
        seconds,
    }
}

pub(crate) fn write_frame_header<W: Write>(out: &mut W, header: &FrameHeader) -> Result<()> {
    out.write_all(bytes_of(header))?;
    Ok(())
}

/// Read and validate the frame header at the reader's position
///
/// # Errors
///
/// Returns error if the read fails or the header is inconsistent
pub fn read_frame_header<R: Read + Seek>(
    input: &mut EndianReader<R>,
    index: u32,
    limits: &LimitsConfig,
) -> Result<FrameInfo> {
    let offset = input.position();
    let header: FrameHeader = input.read_header()?;

    if (header.byte_count as usize) < FRAME_HEADER_SIZE
        || header.byte_count as usize % CHUNK_ALIGN != 0
    {
        return Err(FrameFileError::InvalidFormat(format!(
            "frame at offset {offset} has byte count {}",
            header.byte_count
        )));
    }
    if header.matrix_count > limits.max_frame_matrices {
        return Err(FrameFileError::InvalidFormat(format!(
            "frame at offset {offset} claims {} matrices, limit is {}",
            header.matrix_count, limits.max_frame_matrices
        )));
    }

    Ok(FrameInfo {
        index,
        frame_type: header.frame_type,
        stream_id: header.stream_id,
        time: FrameTime::decode(&header),
        matrix_count: header.matrix_count,
        byte_count: header.byte_count,
        offset,
    })
}

/// A frame read into memory: matrix descriptors plus one data buffer
#[derive(Debug, Clone)]
pub struct LoadedFrame {
    info: FrameInfo,
    matrices: Vec<MatrixInfo>,
    ranges: Vec<Range<usize>>,
    data: Vec<u8>,
}

impl LoadedFrame {
    /// Read every matrix of the frame whose header was just read
    ///
    /// `buffer` is reused as the data buffer.
    pub(crate) fn read<R: Read + Seek>(
        input: &mut EndianReader<R>,
        info: FrameInfo,
        limits: &LimitsConfig,
        mut buffer: Vec<u8>,
    ) -> Result<Self> {
        buffer.clear();
        let count = info.matrix_count as usize;
        let mut matrices = Vec::with_capacity(count);
        let mut ranges = Vec::with_capacity(count);

        for _ in 0..count {
            let matrix = read_matrix_header(input, limits)?;
            let start = buffer.len();
            buffer.resize(start + matrix.byte_count as usize, 0);
            read_matrix_data(input, &matrix, &mut buffer[start..])?;
            ranges.push(start..buffer.len());
            matrices.push(matrix);
        }

        if input.position() != info.end() {
            return Err(FrameFileError::InvalidFormat(format!(
                "frame at offset {} declares {} bytes, matrices span {}",
                info.offset,
                info.byte_count,
                input.position() - info.offset
            )));
        }

        let frame = Self {
            info,
            matrices,
            ranges,
            data: buffer,
        };
        frame.check_unique()?;
        Ok(frame)
    }

    fn check_unique(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.matrices.len());
        for matrix in &self.matrices {
            if !seen.insert((matrix.matrix_type, matrix.units, matrix.format)) {
                return Err(FrameFileError::DuplicateSignature {
                    signature: matrix.signature(self.info.stream_id),
                    frame_index: self.info.index,
                });
            }
        }
        Ok(())
    }

    /// Frame header fields
    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// Number of matrices
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// Whether the frame holds no matrices
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Matrix descriptors in stored order
    pub fn matrices(&self) -> &[MatrixInfo] {
        &self.matrices
    }

    /// Matrix at `index`
    pub fn matrix(&self, index: usize) -> Option<MatrixRef<'_>> {
        let info = self.matrices.get(index)?;
        Some(MatrixRef::new(info, &self.data[self.ranges[index].clone()]))
    }

    /// Position of the matrix with the given signature
    pub fn position(&self, matrix_type: u32, units: Units, format: DataFormat) -> Option<usize> {
        self.matrices
            .iter()
            .position(|m| m.matrix_type == matrix_type && m.units == units && m.format == format)
    }

    /// Matrix with the given signature
    pub fn find(
        &self,
        matrix_type: u32,
        units: Units,
        format: DataFormat,
    ) -> Option<MatrixRef<'_>> {
        self.position(matrix_type, units, format)
            .and_then(|index| self.matrix(index))
    }

    /// First matrix of the given type, whatever its units and format
    pub fn find_type(&self, matrix_type: u32) -> Option<MatrixRef<'_>> {
        self.matrices
            .iter()
            .position(|m| m.matrix_type == matrix_type)
            .and_then(|index| self.matrix(index))
    }

    /// Iterate over matrices in stored order
    pub fn iter(&self) -> impl Iterator<Item = MatrixRef<'_>> {
        (0..self.matrices.len()).filter_map(|index| self.matrix(index))
    }

    /// Mutable data of the matrix at `index`
    ///
    /// The slice has the stored length, so modifications keep the frame
    /// rewritable in place.
    pub fn bytes_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let range = self.ranges.get(index)?.clone();
        Some(&mut self.data[range])
    }

    /// Replace the values of the matrix at `index`
    ///
    /// # Errors
    ///
    /// Returns error if the index is out of range, `T` does not match the
    /// stored format, or the element count differs
    pub fn set_values<T: Element>(&mut self, index: usize, values: &[T]) -> Result<()> {
        let info = *self
            .matrices
            .get(index)
            .ok_or(FrameFileError::InvalidState("matrix index out of range"))?;
        if T::FORMAT != info.format {
            return Err(FrameFileError::TypeMismatch {
                expected: T::FORMAT,
                found: info.format,
            });
        }
        check_shape(values.len(), info.rows, info.cols)?;
        let range = self.ranges[index].clone();
        self.data[range].copy_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    /// Descriptors paired with their current data
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&MatrixInfo, &[u8])> {
        self.matrices
            .iter()
            .zip(&self.ranges)
            .map(|(info, range)| (info, &self.data[range.clone()]))
    }

    /// Give the data buffer back for reuse
    pub(crate) fn into_buffer(self) -> Vec<u8> {
        self.data
    }
}
