//! Frame file reader

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::endian::{detect, EndianReader, SwapBytes};
use super::format::{
    FileHeader, MatrixHeader, FILE_VERSION, FRAME_HEADER_SIZE, HEADER_SIZE, MATRIX_HEADER_SIZE,
};
use super::frame::{read_frame_header, FrameInfo, LoadedFrame};
use super::matrix::{
    read_matrix_data, read_matrix_header, MatrixInfo, MatrixSignature, OwnedMatrix,
};
use super::report::StructureReport;
use super::toc::{Toc, TocPoint};
use crate::config::{FileConfig, LimitsConfig};
use crate::{FrameFileError, Result};

type Input = EndianReader<BufReader<File>>;

/// How a file is opened for reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Navigation and loading only
    #[default]
    ReadOnly,
    /// Loaded frames may also be rewritten in place
    Update,
}

/// Navigation state of a reader
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadState {
    /// Before a frame header (after open, rewind, seek or skip)
    Positioned,
    /// A frame header has been read, its matrices have not
    HeaderLoaded(FrameInfo),
    /// A frame has been read completely
    DataLoaded(FrameInfo),
    /// No frames remain; `rewind` or `seek` leave this state
    EndOfData,
}

/// Every occurrence of one signature stacked by rows
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSeries {
    /// Concatenated matrix; `offset` is that of the first occurrence
    pub matrix: OwnedMatrix,
    /// Global frame index of each occurrence, in file order
    pub frame_indices: Vec<u32>,
}

/// Reader for frame files
pub struct FrameReader {
    input: Input,
    path: PathBuf,
    header: FileHeader,
    config: FileConfig,
    toc: Toc,
    access: Access,
    state: ReadState,
    cursor: u64,
    next_index: u32,
    current: Option<LoadedFrame>,
    spare: Vec<u8>,
}

impl FrameReader {
    /// Open an existing frame file read-only
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be opened or is invalid
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Access::ReadOnly, FileConfig::default())
    }

    /// Open an existing frame file for in-place updates
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be opened for writing or is invalid
    pub fn open_for_update(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Access::Update, FileConfig::default())
    }

    /// Open an existing frame file
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, the file cannot be
    /// opened, its header is invalid, or its table of contents is missing
    /// or corrupt
    pub fn open_with(path: impl AsRef<Path>, access: Access, config: FileConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(access == Access::Update)
            .open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(FrameFileError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        let mut buffered = BufReader::with_capacity(config.io.buffer_size, file);
        let mut raw = [0u8; HEADER_SIZE];
        buffered.read_exact(&mut raw)?;

        let swap = detect([raw[0], raw[1], raw[2], raw[3]])?;
        let mut header: FileHeader = bytemuck::pod_read_unaligned(&raw);
        if swap {
            header.swap_bytes_in_place();
        }
        validate_header(&header, file_len)?;

        let mut input = EndianReader::new(buffered, swap, HEADER_SIZE as u64);
        let toc = Toc::load(&mut input, &header)?;
        input.seek_to(HEADER_SIZE as u64)?;

        info!(
            path = %path.display(),
            frames = header.frame_count,
            version = header.version,
            swapped = swap,
            "Opened frame file"
        );

        Ok(Self {
            input,
            path: path.to_path_buf(),
            header,
            config,
            toc,
            access,
            state: ReadState::Positioned,
            cursor: HEADER_SIZE as u64,
            next_index: 0,
            current: None,
            spare: Vec::new(),
        })
    }

    /// Path of the open file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File header as read, in native order
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Sample rate stored in the header
    pub fn sample_rate(&self) -> f64 {
        self.header.sample_rate
    }

    /// Number of frames, the hidden table of contents excluded
    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    /// Format version of the file
    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Total file length recorded in the header
    pub fn byte_count(&self) -> u32 {
        self.header.byte_count
    }

    /// Whether the file was written in the opposite byte order
    pub fn is_swapped(&self) -> bool {
        self.input.swaps()
    }

    /// How the file was opened
    pub fn access(&self) -> Access {
        self.access
    }

    /// Current navigation state
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Table of contents
    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    /// Stream ids present in the file, ascending
    pub fn streams(&self) -> Vec<u32> {
        self.toc.streams()
    }

    /// Number of frames in a stream (0 if absent)
    pub fn stream_frame_count(&self, stream_id: u32) -> u32 {
        self.toc.stream_frame_count(stream_id)
    }

    /// Every matrix signature in the file, in order of first appearance
    pub fn signatures(&self) -> impl Iterator<Item = &MatrixSignature> {
        self.toc.signatures()
    }

    /// Number of occurrences of a signature (0 if absent)
    pub fn matrix_count(&self, signature: &MatrixSignature) -> usize {
        self.toc.matrix_points(signature).map_or(0, <[TocPoint]>::len)
    }

    /// The loaded frame, if the state is [`ReadState::DataLoaded`]
    pub fn current_frame(&self) -> Option<&LoadedFrame> {
        match self.state {
            ReadState::DataLoaded(_) => self.current.as_ref(),
            _ => None,
        }
    }

    /// Mutable access to the loaded frame, for use with [`Self::frame_update`]
    pub fn current_frame_mut(&mut self) -> Option<&mut LoadedFrame> {
        match self.state {
            ReadState::DataLoaded(_) => self.current.as_mut(),
            _ => None,
        }
    }

    fn release_frame(&mut self) {
        if let Some(frame) = self.current.take() {
            self.spare = frame.into_buffer();
        }
    }

    fn reposition(&mut self, offset: u64, frame_index: u32) {
        self.release_frame();
        self.cursor = offset;
        self.next_index = frame_index;
        self.state = ReadState::Positioned;
    }

    /// Advance to the next frame header passing the filters (`None` = any)
    ///
    /// Returns `Ok(None)` once no frames remain.
    ///
    /// # Errors
    ///
    /// Returns error if a frame header is unreadable or malformed
    pub fn frame_next(
        &mut self,
        frame_type: Option<u32>,
        stream_id: Option<u32>,
    ) -> Result<Option<FrameInfo>> {
        let (mut offset, mut index) = match self.state {
            ReadState::Positioned => (self.cursor, self.next_index),
            ReadState::HeaderLoaded(info) | ReadState::DataLoaded(info) => {
                (info.end(), info.index + 1)
            }
            ReadState::EndOfData => return Ok(None),
        };
        self.release_frame();

        let end = self.header.toc_offset;
        while offset < end {
            if self.input.position() != offset {
                self.input.seek_to(offset)?;
            }
            let info = read_frame_header(&mut self.input, index, &self.config.limits)?;
            if info.end() > end {
                return Err(FrameFileError::InvalidFormat(format!(
                    "frame {index} at offset {offset} overruns the table of contents"
                )));
            }
            if info.matches(frame_type, stream_id) {
                self.state = ReadState::HeaderLoaded(info);
                return Ok(Some(info));
            }
            offset = info.end();
            index += 1;
        }

        self.state = ReadState::EndOfData;
        Ok(None)
    }

    /// Read every matrix of the frame whose header was just read
    ///
    /// Calling it again while the frame is loaded returns the same frame.
    ///
    /// # Errors
    ///
    /// Returns error if no frame header is loaded, the data is unreadable,
    /// or the frame is malformed
    pub fn frame_load(&mut self) -> Result<&LoadedFrame> {
        if let ReadState::HeaderLoaded(info) = self.state {
            let data_start = info.offset + FRAME_HEADER_SIZE as u64;
            if self.input.position() != data_start {
                self.input.seek_to(data_start)?;
            }
            let buffer = std::mem::take(&mut self.spare);
            let frame = LoadedFrame::read(&mut self.input, info, &self.config.limits, buffer)?;
            debug!(
                index = info.index,
                stream_id = info.stream_id,
                matrices = frame.len(),
                "Loaded frame"
            );
            self.current = Some(frame);
            self.state = ReadState::DataLoaded(info);
        }

        self.current_frame()
            .ok_or(FrameFileError::InvalidState("no frame header loaded"))
    }

    /// Advance to the next matching frame and load it
    ///
    /// # Errors
    ///
    /// See [`Self::frame_next`] and [`Self::frame_load`]
    pub fn frame_load_next(
        &mut self,
        frame_type: Option<u32>,
        stream_id: Option<u32>,
    ) -> Result<Option<&LoadedFrame>> {
        if self.frame_next(frame_type, stream_id)?.is_none() {
            return Ok(None);
        }
        self.frame_load().map(Some)
    }

    /// Move past the current frame without loading it
    ///
    /// # Errors
    ///
    /// Returns error if no frame header is loaded
    pub fn frame_skip(&mut self) -> Result<()> {
        match self.state {
            ReadState::HeaderLoaded(info) | ReadState::DataLoaded(info) => {
                self.reposition(info.end(), info.index + 1);
                Ok(())
            }
            _ => Err(FrameFileError::InvalidState("no frame header loaded")),
        }
    }

    /// Rewrite the loaded frame's matrix data in place
    ///
    /// Every matrix header on disk is checked against the loaded descriptor
    /// before anything is written.
    ///
    /// # Errors
    ///
    /// Returns error if the handle is read-only, the file is in foreign byte
    /// order, no frame is loaded, a matrix changed size, or a write fails
    pub fn frame_update(&mut self) -> Result<()> {
        if self.access != Access::Update {
            return Err(FrameFileError::ModeMismatch("file was opened read-only"));
        }
        if self.input.swaps() {
            return Err(FrameFileError::ModeMismatch(
                "cannot update a file in foreign byte order",
            ));
        }
        let ReadState::DataLoaded(info) = self.state else {
            return Err(FrameFileError::InvalidState("no frame data loaded"));
        };
        let frame = self
            .current
            .as_ref()
            .ok_or(FrameFileError::InvalidState("no frame data loaded"))?;
        let input = &mut self.input;

        for (matrix, data) in frame.entries() {
            input.seek_to(matrix.offset)?;
            let stored: MatrixHeader = input.read_header()?;
            if stored != matrix.to_header() || data.len() != stored.byte_count as usize {
                return Err(FrameFileError::SizeMismatch {
                    offset: matrix.offset,
                    stored: stored.byte_count,
                    current: data.len() as u32,
                });
            }
        }

        for (matrix, data) in frame.entries() {
            // Seeking discards read-ahead so the file sits at the data start
            input.seek_to(matrix.offset + MATRIX_HEADER_SIZE as u64)?;
            input.get_mut().get_mut().write_all(data)?;
        }
        input.get_mut().get_mut().flush()?;
        input.seek_to(info.end())?;

        debug!(index = info.index, matrices = frame.len(), "Updated frame");
        Ok(())
    }

    /// Return to the first frame
    pub fn rewind(&mut self) {
        self.reposition(HEADER_SIZE as u64, 0);
    }

    /// Position before the `index`-th frame of a stream
    ///
    /// # Errors
    ///
    /// Returns error if the stream is absent or `index` is out of range
    pub fn seek(&mut self, stream_id: u32, index: u32) -> Result<()> {
        let point = self.toc.stream_frame(stream_id, index)?;
        self.reposition(point.offset, point.frame_index);
        Ok(())
    }

    fn occurrence(&self, signature: &MatrixSignature, occurrence: usize) -> Result<TocPoint> {
        let points = self.toc.matrix_points(signature)?;
        points
            .get(occurrence)
            .copied()
            .ok_or(FrameFileError::InvalidFrameIndex {
                stream_id: signature.stream_id,
                index: occurrence as u32,
                count: points.len() as u32,
            })
    }

    /// Run `f` at `offset`, then restore the navigation position
    fn at_offset<T>(
        &mut self,
        offset: u64,
        f: impl FnOnce(&mut Input, &LimitsConfig) -> Result<T>,
    ) -> Result<T> {
        let saved = self.input.position();
        self.input.seek_to(offset)?;
        let result = f(&mut self.input, &self.config.limits);
        self.input.seek_to(saved)?;
        result
    }

    fn read_indexed_header(
        &mut self,
        signature: &MatrixSignature,
        point: TocPoint,
    ) -> Result<MatrixInfo> {
        let info = self.at_offset(point.offset, read_matrix_header)?;
        check_signature(signature, &info)?;
        Ok(info)
    }

    /// Descriptor of one occurrence of a signature
    ///
    /// # Errors
    ///
    /// Returns error if the signature or occurrence is absent, or the
    /// indexed header does not match
    pub fn matrix_header(
        &mut self,
        signature: &MatrixSignature,
        occurrence: usize,
    ) -> Result<MatrixInfo> {
        let point = self.occurrence(signature, occurrence)?;
        self.read_indexed_header(signature, point)
    }

    /// Read one occurrence of a signature into memory
    ///
    /// # Errors
    ///
    /// See [`Self::matrix_header`]; also fails if the data is unreadable
    pub fn load_matrix(
        &mut self,
        signature: &MatrixSignature,
        occurrence: usize,
    ) -> Result<OwnedMatrix> {
        let point = self.occurrence(signature, occurrence)?;
        let info = self.read_indexed_header(signature, point)?;
        let mut data = vec![0u8; info.byte_count as usize];
        self.at_offset(info.offset + MATRIX_HEADER_SIZE as u64, |input, _| {
            read_matrix_data(input, &info, &mut data)
        })?;
        Ok(OwnedMatrix { info, data })
    }

    /// Read one occurrence of a signature into a caller buffer
    ///
    /// Returns the number of bytes stored. A short buffer fails with
    /// [`FrameFileError::BufferTooSmall`] and leaves the reader usable.
    ///
    /// # Errors
    ///
    /// See [`Self::load_matrix`]
    pub fn read_matrix_into(
        &mut self,
        signature: &MatrixSignature,
        occurrence: usize,
        buf: &mut [u8],
    ) -> Result<usize> {
        let point = self.occurrence(signature, occurrence)?;
        let info = self.read_indexed_header(signature, point)?;
        self.at_offset(info.offset + MATRIX_HEADER_SIZE as u64, |input, _| {
            read_matrix_data(input, &info, buf)
        })
    }

    /// Stack every occurrence of a numeric signature by rows
    ///
    /// # Errors
    ///
    /// Returns error if the signature is absent or not numeric, the column
    /// counts differ, or the result exceeds the matrix size limit
    pub fn load_series(&mut self, signature: &MatrixSignature) -> Result<MatrixSeries> {
        if !signature.format.is_numeric() {
            return Err(FrameFileError::InvalidFormat(format!(
                "cannot stack {} matrices",
                signature.format
            )));
        }
        let points = self.toc.matrix_points(signature)?.to_vec();
        let limit = self.config.limits.max_matrix_bytes;

        let mut series: Option<MatrixInfo> = None;
        let mut data = Vec::new();
        let mut frame_indices = Vec::with_capacity(points.len());

        for point in points {
            let info = self.read_indexed_header(signature, point)?;
            let total = data.len() + info.byte_count as usize;
            if total > limit || total > u32::MAX as usize {
                return Err(FrameFileError::DataTooLarge {
                    size: total as u64,
                    limit: limit.min(u32::MAX as usize) as u64,
                });
            }

            let merged = match series {
                None => info,
                Some(mut merged) => {
                    if merged.cols != info.cols {
                        return Err(FrameFileError::InvalidFormat(format!(
                            "{signature} has {} columns in frame {}, expected {}",
                            info.cols, point.frame_index, merged.cols
                        )));
                    }
                    let rows = u64::from(merged.rows) + u64::from(info.rows);
                    merged.rows = u32::try_from(rows).map_err(|_| FrameFileError::DataTooLarge {
                        size: rows,
                        limit: u64::from(u32::MAX),
                    })?;
                    merged.byte_count =
                        u32::try_from(total).map_err(|_| FrameFileError::DataTooLarge {
                            size: total as u64,
                            limit: u64::from(u32::MAX),
                        })?;
                    merged
                }
            };
            series = Some(merged);

            let start = data.len();
            data.resize(total, 0);
            self.at_offset(info.offset + MATRIX_HEADER_SIZE as u64, |input, _| {
                read_matrix_data(input, &info, &mut data[start..])
            })?;
            frame_indices.push(point.frame_index);
        }

        let info = series.ok_or_else(|| FrameFileError::SignatureNotFound(signature.to_string()))?;
        Ok(MatrixSeries {
            matrix: OwnedMatrix { info, data },
            frame_indices,
        })
    }

    /// Summarize the file's structure using the table of contents
    ///
    /// # Errors
    ///
    /// Returns error if an indexed frame header is unreadable
    pub fn report(&mut self) -> Result<StructureReport> {
        let mut points: Vec<TocPoint> = self
            .toc
            .streams()
            .into_iter()
            .flat_map(|stream| self.toc.stream_frames(stream).iter().copied())
            .collect();
        points.sort_by_key(|point| point.frame_index);

        let mut frames = Vec::with_capacity(points.len());
        for point in points {
            let frame = self.at_offset(point.offset, |input, limits| {
                read_frame_header(input, point.frame_index, limits)
            })?;
            frames.push(frame);
        }

        let signatures = self
            .toc
            .signatures()
            .map(|sig| (*sig, self.matrix_count(sig)))
            .collect();

        Ok(StructureReport {
            path: self.path.clone(),
            version: self.header.version,
            swapped: self.input.swaps(),
            sample_rate: self.header.sample_rate,
            byte_count: self.header.byte_count,
            frames,
            signatures,
        })
    }

    /// Release the file, syncing it if it was opened for update
    ///
    /// # Errors
    ///
    /// Returns error if the sync fails
    pub fn close(self) -> Result<()> {
        if self.access == Access::Update {
            self.input.into_inner().into_inner().sync_all()?;
        }
        info!(path = %self.path.display(), "Closed frame file");
        Ok(())
    }
}

/// Validate a native-order file header against the file length
///
/// # Errors
///
/// Returns error if the version is unsupported, the file was never closed,
/// or the recorded lengths are inconsistent
pub fn validate_header(header: &FileHeader, file_len: u64) -> Result<()> {
    if header.version == 0 || header.version > FILE_VERSION {
        return Err(FrameFileError::UnsupportedVersion {
            found: header.version,
            supported: FILE_VERSION,
        });
    }

    if !header.has_toc() {
        return Err(FrameFileError::MissingToc);
    }

    if u64::from(header.byte_count) > file_len {
        return Err(FrameFileError::InvalidFormat(format!(
            "Header records {} bytes, file has {file_len}",
            header.byte_count
        )));
    }

    if header.toc_offset < HEADER_SIZE as u64 || header.toc_offset >= u64::from(header.byte_count)
    {
        return Err(FrameFileError::CorruptToc(format!(
            "offset {} outside file of {} bytes",
            header.toc_offset, header.byte_count
        )));
    }

    Ok(())
}

fn check_signature(signature: &MatrixSignature, info: &MatrixInfo) -> Result<()> {
    if info.matrix_type != signature.matrix_type
        || info.units != signature.units
        || info.format != signature.format
    {
        return Err(FrameFileError::CorruptToc(format!(
            "entry for {signature} points at a {} matrix of type {}",
            info.format, info.matrix_type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::format::{FrameTime, Units};
    use crate::storage::writer::FrameWriter;
    use tempfile::NamedTempFile;

    fn write_sample(path: &Path) {
        let mut writer = FrameWriter::create(path, 100.0).unwrap();
        for i in 0..4u32 {
            writer
                .frame_create(10 + i % 2, i % 2, FrameTime::Sample(i * 10))
                .unwrap();
            writer
                .write_vector(1, Units::NONE, &[f64::from(i), f64::from(i) + 0.5])
                .unwrap();
            writer.frame_close().unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_open_and_iterate() {
        let file = NamedTempFile::new().unwrap();
        write_sample(file.path());

        let mut reader = FrameReader::open(file.path()).unwrap();
        assert_eq!(reader.frame_count(), 4);
        assert!(!reader.is_swapped());

        let mut seen = Vec::new();
        while let Some(info) = reader.frame_next(None, None).unwrap() {
            seen.push(info.index);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(reader.state(), ReadState::EndOfData);
        assert!(reader.frame_next(None, None).unwrap().is_none());

        reader.rewind();
        assert_eq!(reader.state(), ReadState::Positioned);
        assert!(reader.frame_next(None, None).unwrap().is_some());
    }

    #[test]
    fn test_filters() {
        let file = NamedTempFile::new().unwrap();
        write_sample(file.path());

        let mut reader = FrameReader::open(file.path()).unwrap();
        let mut seen = Vec::new();
        while let Some(info) = reader.frame_next(None, Some(1)).unwrap() {
            assert_eq!(info.frame_type, 11);
            seen.push(info.index);
        }
        assert_eq!(seen, vec![1, 3]);

        reader.rewind();
        assert!(reader.frame_next(Some(99), None).unwrap().is_none());
    }

    #[test]
    fn test_load_requires_header() {
        let file = NamedTempFile::new().unwrap();
        write_sample(file.path());

        let mut reader = FrameReader::open(file.path()).unwrap();
        assert!(matches!(
            reader.frame_load(),
            Err(FrameFileError::InvalidState(_))
        ));
        assert!(matches!(
            reader.frame_skip(),
            Err(FrameFileError::InvalidState(_))
        ));
    }

    #[test]
    fn test_skip_then_load() {
        let file = NamedTempFile::new().unwrap();
        write_sample(file.path());

        let mut reader = FrameReader::open(file.path()).unwrap();
        reader.frame_next(None, None).unwrap();
        reader.frame_skip().unwrap();
        let frame = reader.frame_load_next(None, None).unwrap().unwrap();
        assert_eq!(frame.info().index, 1);
        let values: Vec<f64> = frame.matrix(0).unwrap().values().unwrap();
        assert_eq!(values, vec![1.0, 1.5]);
    }

    #[test]
    fn test_update_read_only_rejected() {
        let file = NamedTempFile::new().unwrap();
        write_sample(file.path());

        let mut reader = FrameReader::open(file.path()).unwrap();
        reader.frame_load_next(None, None).unwrap();
        assert!(matches!(
            reader.frame_update(),
            Err(FrameFileError::ModeMismatch(_))
        ));
    }

    #[test]
    fn test_random_access_restores_position() {
        let file = NamedTempFile::new().unwrap();
        write_sample(file.path());

        let mut reader = FrameReader::open(file.path()).unwrap();
        reader.frame_next(None, None).unwrap();

        let sig = MatrixSignature::new(1, 1, Units::NONE, crate::storage::DataFormat::Float64);
        assert_eq!(reader.matrix_count(&sig), 2);
        let matrix = reader.load_matrix(&sig, 1).unwrap();
        assert_eq!(matrix.view().values::<f64>().unwrap(), vec![3.0, 3.5]);

        let mut small = [0u8; 8];
        assert!(matches!(
            reader.read_matrix_into(&sig, 0, &mut small),
            Err(FrameFileError::BufferTooSmall { needed: 16, .. })
        ));

        let frame = reader.frame_load().unwrap();
        assert_eq!(frame.info().index, 0);
        assert_eq!(frame.matrix(0).unwrap().values::<f64>().unwrap(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_unclosed_file_rejected() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut writer = FrameWriter::create(file.path(), 1.0).unwrap();
            writer.frame_create(0, 0, FrameTime::Sample(0)).unwrap();
            writer.frame_close().unwrap();
        }
        assert!(matches!(
            FrameReader::open(file.path()),
            Err(FrameFileError::MissingToc)
        ));
    }

    #[test]
    fn test_not_a_frame_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xAB; 64]).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            FrameReader::open(file.path()),
            Err(FrameFileError::NotAFrameFile { .. })
        ));
    }

    #[test]
    fn test_validate_header_version() {
        let mut header = FileHeader::new(1.0);
        header.toc_offset = HEADER_SIZE as u64;
        header.byte_count = 64;
        assert!(validate_header(&header, 64).is_ok());

        header.version = FILE_VERSION + 1;
        assert!(matches!(
            validate_header(&header, 64),
            Err(FrameFileError::UnsupportedVersion { .. })
        ));
    }
}
