//! Table of contents
//!
//! While writing, every frame start is recorded under its stream and every
//! matrix under its signature. Nothing is written until close, when the whole
//! index becomes one hidden frame appended after the last real frame. Each
//! bucket is stored as a pair of vectors:
//!
//! ```text
//! header  (u32): [stream, type, units, format, frame_0, frame_1, ...]
//! offsets (u64): [offset_0, offset_1, ...]
//! ```
//!
//! Stream buckets carry `NO_TYPE` in the type, units and format slots.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Seek, Write};

use tracing::debug;

use super::endian::EndianReader;
use super::format::{
    DataFormat, FileHeader, FrameTime, MatrixHeader, Units, FRAME_HEADER_SIZE,
    MATRIX_HEADER_SIZE, NO_TYPE, TOC_FRAME_TYPE, TOC_HEADER_MATRIX, TOC_OFFSET_MATRIX,
    TOC_STREAM_ID,
};
use super::frame::{new_frame_header, read_frame_header, write_frame_header, LoadedFrame};
use super::matrix::{byte_len, write_matrix, MatrixSignature};
use crate::config::LimitsConfig;
use crate::{FrameFileError, Result};

/// Bucket identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TocKey {
    /// Frame starts of one stream
    Stream(u32),
    /// Occurrences of one matrix signature
    Matrix(MatrixSignature),
}

impl TocKey {
    /// Stream the bucket belongs to
    #[must_use]
    pub fn stream_id(&self) -> u32 {
        match self {
            Self::Stream(stream_id) => *stream_id,
            Self::Matrix(signature) => signature.stream_id,
        }
    }

    fn encode(&self) -> [u32; 4] {
        match self {
            Self::Stream(stream_id) => [*stream_id, NO_TYPE, NO_TYPE, NO_TYPE],
            Self::Matrix(sig) => [
                sig.stream_id,
                sig.matrix_type,
                sig.units.0,
                sig.format.raw(),
            ],
        }
    }

    fn decode(head: [u32; 4]) -> Result<Self> {
        let [stream_id, matrix_type, units, format] = head;
        if matrix_type == NO_TYPE && units == NO_TYPE && format == NO_TYPE {
            return Ok(Self::Stream(stream_id));
        }
        let format = DataFormat::from_raw(format)
            .map_err(|_| FrameFileError::CorruptToc(format!("bad format tag {format:#x}")))?;
        Ok(Self::Matrix(MatrixSignature::new(
            stream_id,
            matrix_type,
            Units(units),
            format,
        )))
    }
}

impl fmt::Display for TocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(stream_id) => write!(f, "stream {stream_id}"),
            Self::Matrix(signature) => write!(f, "{signature}"),
        }
    }
}

/// One recorded occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocPoint {
    /// Global index of the frame
    pub frame_index: u32,
    /// File offset of the frame or matrix header
    pub offset: u64,
}

#[derive(Debug, Clone)]
struct TocEntry {
    key: TocKey,
    points: Vec<TocPoint>,
}

/// In-memory index of frame and matrix offsets
///
/// Buckets live in one vector in creation order; the map only resolves keys
/// to positions.
#[derive(Debug, Clone, Default)]
pub struct Toc {
    entries: Vec<TocEntry>,
    lookup: HashMap<TocKey, usize>,
}

impl Toc {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an occurrence of `key` in frame `frame_index`
    ///
    /// # Errors
    ///
    /// Returns [`FrameFileError::DuplicateSignature`] if the matrix signature
    /// already occurred in this frame, and [`FrameFileError::CorruptToc`] if
    /// frame indices go backwards
    pub fn append(&mut self, key: TocKey, frame_index: u32, offset: u64) -> Result<()> {
        let slot = match self.lookup.get(&key) {
            Some(&slot) => slot,
            None => {
                self.entries.push(TocEntry {
                    key,
                    points: Vec::new(),
                });
                self.lookup.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        let points = &mut self.entries[slot].points;
        if let Some(last) = points.last() {
            if last.frame_index == frame_index {
                return Err(match key {
                    TocKey::Matrix(signature) => FrameFileError::DuplicateSignature {
                        signature,
                        frame_index,
                    },
                    TocKey::Stream(_) => FrameFileError::CorruptToc(format!(
                        "frame {frame_index} recorded twice for {key}"
                    )),
                });
            }
            if last.frame_index > frame_index {
                return Err(FrameFileError::CorruptToc(format!(
                    "{key}: frame {frame_index} recorded after frame {}",
                    last.frame_index
                )));
            }
        }
        points.push(TocPoint {
            frame_index,
            offset,
        });
        Ok(())
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn points(&self, key: &TocKey) -> Option<&[TocPoint]> {
        self.lookup
            .get(key)
            .map(|&slot| self.entries[slot].points.as_slice())
    }

    /// Total frames across all streams
    pub fn frame_count(&self) -> u32 {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.key, TocKey::Stream(_)))
            .map(|entry| entry.points.len() as u32)
            .sum()
    }

    /// Stream ids in ascending order
    pub fn streams(&self) -> Vec<u32> {
        let mut streams: Vec<u32> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.key {
                TocKey::Stream(stream_id) => Some(stream_id),
                TocKey::Matrix(_) => None,
            })
            .collect();
        streams.sort_unstable();
        streams
    }

    /// Frame starts recorded for `stream_id`
    pub fn stream_frames(&self, stream_id: u32) -> &[TocPoint] {
        self.points(&TocKey::Stream(stream_id)).unwrap_or(&[])
    }

    /// Number of frames recorded for `stream_id`
    pub fn stream_frame_count(&self, stream_id: u32) -> u32 {
        self.stream_frames(stream_id).len() as u32
    }

    /// The `index`-th frame recorded for `stream_id`
    ///
    /// # Errors
    ///
    /// Returns error if the stream is unknown or has fewer frames
    pub fn stream_frame(&self, stream_id: u32, index: u32) -> Result<TocPoint> {
        let points = self.points(&TocKey::Stream(stream_id)).ok_or_else(|| {
            FrameFileError::SignatureNotFound(TocKey::Stream(stream_id).to_string())
        })?;
        points
            .iter()
            .nth(index as usize)
            .copied()
            .ok_or(FrameFileError::InvalidFrameIndex {
                stream_id,
                index,
                count: points.len() as u32,
            })
    }

    /// File offset of the `index`-th frame of `stream_id`
    ///
    /// # Errors
    ///
    /// Returns error if the stream is unknown or has fewer frames
    pub fn frame_offset(&self, stream_id: u32, index: u32) -> Result<u64> {
        self.stream_frame(stream_id, index).map(|point| point.offset)
    }

    /// Matrix signatures in first-seen order
    pub fn signatures(&self) -> impl Iterator<Item = &MatrixSignature> {
        self.entries.iter().filter_map(|entry| match &entry.key {
            TocKey::Matrix(signature) => Some(signature),
            TocKey::Stream(_) => None,
        })
    }

    /// Occurrences of a matrix signature
    ///
    /// # Errors
    ///
    /// Returns error if the signature was never written
    pub fn matrix_points(&self, signature: &MatrixSignature) -> Result<&[TocPoint]> {
        self.points(&TocKey::Matrix(*signature))
            .ok_or_else(|| FrameFileError::SignatureNotFound(signature.to_string()))
    }

    /// Write the index as the hidden frame, returning the bytes written
    ///
    /// # Errors
    ///
    /// Returns error if a bucket is too large for the format or the write
    /// fails
    pub(crate) fn flush<W: Write>(&self, out: &mut W) -> Result<u64> {
        let mut chunks = Vec::with_capacity(self.entries.len() * 2);
        let mut body_len = 0u64;

        for (bucket, entry) in self.entries.iter().enumerate() {
            let mut head: Vec<u32> = entry.key.encode().to_vec();
            head.extend(entry.points.iter().map(|point| point.frame_index));
            let offsets: Vec<u64> = entry.points.iter().map(|point| point.offset).collect();
            let units = bucket as u32;

            let head_header =
                toc_matrix_header(TOC_HEADER_MATRIX, units, DataFormat::UInt32, head.len())?;
            let offsets_header =
                toc_matrix_header(TOC_OFFSET_MATRIX, units, DataFormat::UInt64, offsets.len())?;
            body_len += super::format::chunk_len(head_header.byte_count as usize) as u64;
            body_len += super::format::chunk_len(offsets_header.byte_count as usize) as u64;
            chunks.push((head_header, bytemuck::cast_slice::<u32, u8>(&head).to_vec()));
            chunks.push((offsets_header, bytemuck::cast_slice::<u64, u8>(&offsets).to_vec()));
        }

        let byte_count = FRAME_HEADER_SIZE as u64 + body_len;
        let mut header = new_frame_header(TOC_FRAME_TYPE, TOC_STREAM_ID, FrameTime::Sample(0));
        header.byte_count = u32::try_from(byte_count).map_err(|_| FrameFileError::DataTooLarge {
            size: byte_count,
            limit: u64::from(u32::MAX),
        })?;
        header.matrix_count = chunks.len() as u32;

        write_frame_header(out, &header)?;
        for (matrix_header, data) in &chunks {
            write_matrix(out, matrix_header, data)?;
        }

        debug!(
            buckets = self.entries.len(),
            bytes = byte_count,
            "Flushed table of contents"
        );
        Ok(byte_count)
    }

    /// Rebuild the index from the hidden frame named by `header`
    ///
    /// Leaves the reader just past the hidden frame. The hidden frame is
    /// bounded by its own extent in the file rather than by the per-frame
    /// limits applied to user frames.
    ///
    /// # Errors
    ///
    /// Returns error if the hidden frame is missing, malformed, or disagrees
    /// with the file header
    pub(crate) fn load<R: Read + Seek>(
        input: &mut EndianReader<R>,
        header: &FileHeader,
    ) -> Result<Self> {
        if !header.has_toc() {
            return Err(FrameFileError::MissingToc);
        }
        let limits = toc_limits(header)?;
        input.seek_to(header.toc_offset)?;

        let info = read_frame_header(input, header.frame_count, &limits)?;
        if !info.is_toc() {
            return Err(FrameFileError::CorruptToc(format!(
                "frame at offset {} is not a table of contents",
                header.toc_offset
            )));
        }
        if info.end() != u64::from(header.byte_count) {
            return Err(FrameFileError::CorruptToc(format!(
                "table of contents ends at {}, file is {} bytes",
                info.end(),
                header.byte_count
            )));
        }

        let frame = LoadedFrame::read(input, info, &limits, Vec::new())?;
        if frame.len() % 2 != 0 {
            return Err(FrameFileError::CorruptToc(format!(
                "odd number of vectors ({})",
                frame.len()
            )));
        }

        let mut toc = Self::new();
        for pair in 0..frame.len() / 2 {
            let (Some(head), Some(offsets)) = (frame.matrix(2 * pair), frame.matrix(2 * pair + 1))
            else {
                return Err(FrameFileError::CorruptToc(format!("bucket {pair} is incomplete")));
            };
            if head.info().matrix_type != TOC_HEADER_MATRIX
                || offsets.info().matrix_type != TOC_OFFSET_MATRIX
            {
                return Err(FrameFileError::CorruptToc(format!(
                    "bucket {pair}: unexpected vector types"
                )));
            }
            let head: Vec<u32> = head
                .values()
                .map_err(|e| FrameFileError::CorruptToc(format!("bucket {pair} header: {e}")))?;
            let offsets: Vec<u64> = offsets
                .values()
                .map_err(|e| FrameFileError::CorruptToc(format!("bucket {pair} offsets: {e}")))?;
            if head.len() < 4 || head.len() - 4 != offsets.len() {
                return Err(FrameFileError::CorruptToc(format!(
                    "bucket {pair}: {} header slots for {} offsets",
                    head.len(),
                    offsets.len()
                )));
            }

            let key = TocKey::decode([head[0], head[1], head[2], head[3]])?;
            for (&frame_index, &offset) in head[4..].iter().zip(&offsets) {
                if offset >= header.toc_offset {
                    return Err(FrameFileError::CorruptToc(format!(
                        "{key}: offset {offset} lies past the data"
                    )));
                }
                toc.append(key, frame_index, offset).map_err(|e| match e {
                    FrameFileError::CorruptToc(_) => e,
                    other => FrameFileError::CorruptToc(other.to_string()),
                })?;
            }
        }

        if toc.frame_count() != header.frame_count {
            return Err(FrameFileError::CorruptToc(format!(
                "{} frames indexed, header says {}",
                toc.frame_count(),
                header.frame_count
            )));
        }

        debug!(
            buckets = toc.len(),
            frames = toc.frame_count(),
            "Loaded table of contents"
        );
        Ok(toc)
    }
}

/// Limits covering everything between the ToC offset and the end of file
fn toc_limits(header: &FileHeader) -> Result<LimitsConfig> {
    let extent = u64::from(header.byte_count)
        .checked_sub(header.toc_offset)
        .filter(|&extent| extent >= FRAME_HEADER_SIZE as u64)
        .ok_or_else(|| {
            FrameFileError::CorruptToc(format!(
                "offset {} leaves no room for a table of contents in {} bytes",
                header.toc_offset, header.byte_count
            ))
        })?;
    Ok(LimitsConfig {
        max_matrix_bytes: usize::try_from(extent).unwrap_or(usize::MAX),
        max_frame_matrices: u32::try_from(extent / MATRIX_HEADER_SIZE as u64)
            .unwrap_or(u32::MAX),
    })
}

fn toc_matrix_header(
    matrix_type: u32,
    units: u32,
    format: DataFormat,
    len: usize,
) -> Result<MatrixHeader> {
    let cols = u32::try_from(len).map_err(|_| FrameFileError::DataTooLarge {
        size: len as u64,
        limit: u64::from(u32::MAX),
    })?;
    Ok(MatrixHeader {
        matrix_type,
        byte_count: byte_len(format, 1, cols)?,
        format_id: format.raw(),
        units_id: units,
        rows: 1,
        cols,
    })
}
