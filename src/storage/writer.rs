//! Frame file writer

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytemuck::bytes_of;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::format::{
    chunk_len, DataFormat, FileHeader, FrameTime, MatrixHeader, Units, FILE_VERSION,
    FRAME_HEADER_SIZE, HEADER_SIZE, NO_TYPE, TOC_FRAME_TYPE, TOC_STREAM_ID,
};
use super::frame::{new_frame_header, write_frame_header};
use super::matrix::{byte_len, encode_values, write_matrix, Element, MatrixSignature};
use super::toc::{Toc, TocKey};
use crate::config::{FileConfig, RealFormat};
use crate::{FrameFileError, Result};

/// Frame currently being written
#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    index: u32,
    offset: u64,
    stream_id: u32,
    byte_count: u64,
    matrix_count: u32,
}

/// Writer for frame files
///
/// Frames are appended one at a time. The table of contents is kept in
/// memory and written by [`FrameWriter::close`]; a writer dropped without
/// closing leaves a file that cannot be opened.
pub struct FrameWriter {
    out: BufWriter<File>,
    path: PathBuf,
    header: FileHeader,
    config: FileConfig,
    toc: Toc,
    position: u64,
    open_frame: Option<OpenFrame>,
    poisoned: bool,
    closed: bool,
}

impl FrameWriter {
    /// Create a new frame file with default configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be created
    pub fn create(path: impl AsRef<Path>, sample_rate: f64) -> Result<Self> {
        Self::create_with_config(path, sample_rate, FileConfig::default())
    }

    /// Create a new frame file
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or file cannot be
    /// created
    pub fn create_with_config(
        path: impl AsRef<Path>,
        sample_rate: f64,
        config: FileConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut out = BufWriter::with_capacity(config.io.buffer_size, file);

        let header = FileHeader::new(sample_rate);
        out.write_all(bytes_of(&header))?;

        info!(path = %path.display(), sample_rate, "Created frame file");

        Ok(Self {
            out,
            path: path.to_path_buf(),
            header,
            config,
            toc: Toc::new(),
            position: HEADER_SIZE as u64,
            open_frame: None,
            poisoned: false,
            closed: false,
        })
    }

    /// Path of the file being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample rate stored in the header
    pub fn sample_rate(&self) -> f64 {
        self.header.sample_rate
    }

    /// Frames created so far, the open one included
    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether a frame is open
    pub fn is_frame_open(&self) -> bool {
        self.open_frame.is_some()
    }

    /// Index built so far
    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(FrameFileError::InvalidState(
                "writer is unusable after a failed write",
            ));
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(FrameFileError::Io(_))) {
            self.poisoned = true;
        }
        result
    }

    fn fits(&self, extra: u64) -> Result<()> {
        let size = self.position + extra;
        if size > u64::from(u32::MAX) {
            return Err(FrameFileError::DataTooLarge {
                size,
                limit: u64::from(u32::MAX),
            });
        }
        Ok(())
    }

    /// Open a new frame
    ///
    /// # Errors
    ///
    /// Returns error if a frame is already open, the ids are reserved, or
    /// the write fails
    pub fn frame_create(&mut self, frame_type: u32, stream_id: u32, time: FrameTime) -> Result<()> {
        self.check_usable()?;
        if self.open_frame.is_some() {
            return Err(FrameFileError::InvalidState("a frame is already open"));
        }
        if frame_type == TOC_FRAME_TYPE || stream_id == TOC_STREAM_ID {
            return Err(FrameFileError::ReservedId(format!(
                "frame type {frame_type:#x} / stream {stream_id:#x}"
            )));
        }
        self.fits(FRAME_HEADER_SIZE as u64)?;

        let index = self.header.frame_count;
        let offset = self.position;
        self.toc.append(TocKey::Stream(stream_id), index, offset)?;

        let header = new_frame_header(frame_type, stream_id, time);
        let result = write_frame_header(&mut self.out, &header);
        self.track(result)?;

        self.position += FRAME_HEADER_SIZE as u64;
        self.header.frame_count += 1;
        self.open_frame = Some(OpenFrame {
            index,
            offset,
            stream_id,
            byte_count: FRAME_HEADER_SIZE as u64,
            matrix_count: 0,
        });

        debug!(index, frame_type, stream_id, %time, "Opened frame");
        Ok(())
    }

    /// Append a matrix of raw native-order bytes to the open frame
    ///
    /// # Errors
    ///
    /// Returns error if no frame is open, the signature already occurs in
    /// this frame, `data` does not hold `rows x cols` elements, or the write
    /// fails
    pub fn write_matrix(
        &mut self,
        matrix_type: u32,
        units: Units,
        format: DataFormat,
        data: &[u8],
        rows: u32,
        cols: u32,
    ) -> Result<()> {
        self.check_usable()?;
        let mut frame = self
            .open_frame
            .ok_or(FrameFileError::InvalidState("no frame is open"))?;
        if matrix_type == NO_TYPE {
            return Err(FrameFileError::ReservedId(format!(
                "matrix type {matrix_type:#x}"
            )));
        }

        let byte_count = byte_len(format, rows, cols)?;
        if data.len() != byte_count as usize {
            return Err(FrameFileError::InvalidDimensions {
                rows,
                cols,
                len: data.len() / format.word_size(),
            });
        }
        let limits = &self.config.limits;
        if data.len() > limits.max_matrix_bytes {
            return Err(FrameFileError::DataTooLarge {
                size: data.len() as u64,
                limit: limits.max_matrix_bytes as u64,
            });
        }
        if frame.matrix_count >= limits.max_frame_matrices {
            return Err(FrameFileError::InvalidState("frame holds the maximum number of matrices"));
        }
        let chunk = chunk_len(data.len()) as u64;
        self.fits(chunk)?;

        let signature = MatrixSignature::new(frame.stream_id, matrix_type, units, format);
        self.toc
            .append(TocKey::Matrix(signature), frame.index, self.position)?;

        let header = MatrixHeader {
            matrix_type,
            byte_count,
            format_id: format.raw(),
            units_id: units.0,
            rows,
            cols,
        };
        let result = write_matrix(&mut self.out, &header, data);
        let written = self.track(result)?;

        self.position += written;
        frame.byte_count += written;
        frame.matrix_count += 1;
        self.open_frame = Some(frame);
        Ok(())
    }

    /// Append a typed matrix to the open frame
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::write_matrix`]
    pub fn write_values<T: Element>(
        &mut self,
        matrix_type: u32,
        units: Units,
        values: &[T],
        rows: u32,
        cols: u32,
    ) -> Result<()> {
        let data = encode_values(values, rows, cols)?;
        self.write_matrix(matrix_type, units, T::FORMAT, data, rows, cols)
    }

    /// Append a typed row vector to the open frame
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::write_matrix`]
    pub fn write_vector<T: Element>(
        &mut self,
        matrix_type: u32,
        units: Units,
        values: &[T],
    ) -> Result<()> {
        let cols = u32::try_from(values.len()).map_err(|_| FrameFileError::DataTooLarge {
            size: values.len() as u64,
            limit: u64::from(u32::MAX),
        })?;
        self.write_values(matrix_type, units, values, 1, cols)
    }

    /// Append real values at the configured width
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::write_matrix`]
    pub fn write_real(
        &mut self,
        matrix_type: u32,
        units: Units,
        values: &[f64],
        rows: u32,
        cols: u32,
    ) -> Result<()> {
        match self.config.real_format {
            RealFormat::F64 => self.write_values(matrix_type, units, values, rows, cols),
            RealFormat::F32 => {
                let narrowed: Vec<f32> = values.iter().map(|&v| f32::from_f64(v)).collect();
                self.write_values(matrix_type, units, &narrowed, rows, cols)
            }
        }
    }

    /// Append a NUL-terminated string
    ///
    /// # Errors
    ///
    /// Returns error if `text` contains NUL, or see
    /// [`FrameWriter::write_matrix`]
    pub fn write_str(&mut self, matrix_type: u32, units: Units, text: &str) -> Result<()> {
        if text.as_bytes().contains(&0) {
            return Err(FrameFileError::InvalidFormat(
                "string matrix text contains NUL".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        self.write_bytes(matrix_type, units, DataFormat::String, &data)
    }

    /// Append opaque bytes
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::write_matrix`]
    pub fn write_blob(&mut self, matrix_type: u32, units: Units, bytes: &[u8]) -> Result<()> {
        self.write_bytes(matrix_type, units, DataFormat::Blob, bytes)
    }

    /// Append a value serialized as a JSON document
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails, or see
    /// [`FrameWriter::write_matrix`]
    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        matrix_type: u32,
        units: Units,
        value: &T,
    ) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.write_bytes(matrix_type, units, DataFormat::Json, &data)
    }

    fn write_bytes(
        &mut self,
        matrix_type: u32,
        units: Units,
        format: DataFormat,
        data: &[u8],
    ) -> Result<()> {
        let cols = u32::try_from(data.len()).map_err(|_| FrameFileError::DataTooLarge {
            size: data.len() as u64,
            limit: u64::from(u32::MAX),
        })?;
        self.write_matrix(matrix_type, units, format, data, 1, cols)
    }

    /// Seal the open frame, patching its byte and matrix counts
    ///
    /// # Errors
    ///
    /// Returns error if no frame is open or the write fails
    pub fn frame_close(&mut self) -> Result<()> {
        self.check_usable()?;
        let frame = self
            .open_frame
            .take()
            .ok_or(FrameFileError::InvalidState("no frame is open"))?;
        let result = self.patch_frame(&frame);
        self.track(result)?;

        debug!(
            index = frame.index,
            stream_id = frame.stream_id,
            matrices = frame.matrix_count,
            bytes = frame.byte_count,
            "Closed frame"
        );
        Ok(())
    }

    fn patch_frame(&mut self, frame: &OpenFrame) -> Result<()> {
        // byte_count and matrix_count are adjacent, 4 bytes into the header
        let byte_count = frame.byte_count as u32;
        let mut patch = [0u8; 8];
        patch[..4].copy_from_slice(&byte_count.to_ne_bytes());
        patch[4..].copy_from_slice(&frame.matrix_count.to_ne_bytes());

        self.out.seek(SeekFrom::Start(frame.offset + 4))?;
        self.out.write_all(&patch)?;
        self.out.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    /// Finalize the file: write the table of contents and the final header
    ///
    /// An open frame is closed first.
    ///
    /// # Errors
    ///
    /// Returns error if the writer is unusable or any write fails
    pub fn close(mut self) -> Result<()> {
        self.check_usable()?;
        if self.open_frame.is_some() {
            debug!("Closing frame left open at close");
            self.frame_close()?;
        }

        let toc_offset = self.position;
        let result = self.toc.flush(&mut self.out);
        let written = self.track(result)?;
        self.position += written;

        let byte_count =
            u32::try_from(self.position).map_err(|_| FrameFileError::DataTooLarge {
                size: self.position,
                limit: u64::from(u32::MAX),
            })?;
        self.header.byte_count = byte_count;
        self.header.version = FILE_VERSION;
        self.header.toc_offset = toc_offset;

        let result = self.finish_header();
        self.track(result)?;
        self.closed = true;

        info!(
            path = %self.path.display(),
            frames = self.header.frame_count,
            bytes = byte_count,
            "Closed frame file"
        );
        Ok(())
    }

    fn finish_header(&mut self) -> Result<()> {
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(bytes_of(&self.header))?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                path = %self.path.display(),
                "Frame writer dropped without close, file has no table of contents"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_create_writer() {
        let file = NamedTempFile::new().unwrap();
        let writer = FrameWriter::create(file.path(), 44_100.0).unwrap();
        assert_eq!(writer.frame_count(), 0);
        assert_eq!(writer.position(), HEADER_SIZE as u64);
        assert!((writer.sample_rate() - 44_100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nested_frame_rejected() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = FrameWriter::create(file.path(), 1.0).unwrap();
        writer.frame_create(1, 0, FrameTime::Sample(0)).unwrap();
        let err = writer.frame_create(1, 0, FrameTime::Sample(1)).unwrap_err();
        assert!(matches!(err, FrameFileError::InvalidState(_)));
    }

    #[test]
    fn test_matrix_without_frame_rejected() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = FrameWriter::create(file.path(), 1.0).unwrap();
        let err = writer.write_vector(1, Units::NONE, &[1i32]).unwrap_err();
        assert!(matches!(err, FrameFileError::InvalidState(_)));
    }

    #[test]
    fn test_duplicate_matrix_rejected() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = FrameWriter::create(file.path(), 1.0).unwrap();
        writer.frame_create(1, 0, FrameTime::Sample(0)).unwrap();
        writer.write_vector(4, Units::NONE, &[1i32, 2]).unwrap();
        let before = writer.position();

        let err = writer.write_vector(4, Units::NONE, &[3i32, 4]).unwrap_err();
        assert!(matches!(err, FrameFileError::DuplicateSignature { .. }));
        assert_eq!(writer.position(), before);

        // Same type under different units or format is a distinct signature
        writer.write_vector(4, Units::new(2), &[3i32, 4]).unwrap();
        writer.write_vector(4, Units::NONE, &[3.0f64, 4.0]).unwrap();
    }

    #[test]
    fn test_reserved_ids_rejected() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = FrameWriter::create(file.path(), 1.0).unwrap();
        assert!(matches!(
            writer.frame_create(TOC_FRAME_TYPE, 0, FrameTime::Sample(0)),
            Err(FrameFileError::ReservedId(_))
        ));
        assert!(matches!(
            writer.frame_create(0, TOC_STREAM_ID, FrameTime::Sample(0)),
            Err(FrameFileError::ReservedId(_))
        ));
        writer.frame_create(0, 0, FrameTime::Sample(0)).unwrap();
        assert!(matches!(
            writer.write_vector(NO_TYPE, Units::NONE, &[0u8]),
            Err(FrameFileError::ReservedId(_))
        ));
    }

    #[test]
    fn test_frame_close_patches_counts() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = FrameWriter::create(file.path(), 1.0).unwrap();
        assert!(!writer.is_frame_open());
        writer.frame_create(7, 2, FrameTime::Seconds(0.5)).unwrap();
        assert!(writer.is_frame_open());
        writer.write_vector(1, Units::NONE, &[1u16, 2, 3]).unwrap();
        writer.write_str(2, Units::NONE, "label").unwrap();
        writer.frame_close().unwrap();
        assert!(!writer.is_frame_open());

        // One stream bucket and two signature buckets
        assert_eq!(writer.toc().len(), 3);
        assert_eq!(writer.toc().stream_frame_count(2), 1);
        assert_eq!(writer.toc().signatures().count(), 2);
        writer.close().unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        let frame = &bytes[HEADER_SIZE..];
        let byte_count = u32::from_ne_bytes(frame[4..8].try_into().unwrap());
        let matrix_count = u32::from_ne_bytes(frame[8..12].try_into().unwrap());
        // header + (24 + 6 + 2) + (24 + 6 + 2)
        assert_eq!(byte_count, 32 + 32 + 32);
        assert_eq!(matrix_count, 2);
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = FrameWriter::create(file.path(), 1.0).unwrap();
        writer.frame_create(0, 0, FrameTime::Sample(0)).unwrap();
        let err = writer
            .write_values(1, Units::NONE, &[1.0f64, 2.0, 3.0], 2, 2)
            .unwrap_err();
        assert!(matches!(err, FrameFileError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_write_limits_enforced() {
        let file = NamedTempFile::new().unwrap();
        let mut config = FileConfig::default();
        config.limits.max_matrix_bytes = 16;
        config.limits.max_frame_matrices = 1;
        let mut writer = FrameWriter::create_with_config(file.path(), 1.0, config).unwrap();
        writer.frame_create(0, 0, FrameTime::Sample(0)).unwrap();

        assert!(matches!(
            writer.write_vector(1, Units::NONE, &[0u8; 17]),
            Err(FrameFileError::DataTooLarge { size: 17, limit: 16 })
        ));
        writer.write_vector(1, Units::NONE, &[0u8; 16]).unwrap();
        assert!(matches!(
            writer.write_vector(2, Units::NONE, &[0u8; 1]),
            Err(FrameFileError::InvalidState(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_poisons_writer() {
        let device = Path::new("/dev/full");
        if !device.exists() {
            return;
        }
        let mut config = FileConfig::default();
        config.io.buffer_size = 64;
        let mut writer = FrameWriter::create_with_config(device, 1.0, config).unwrap();
        writer.frame_create(1, 0, FrameTime::Sample(0)).unwrap();

        // The buffer is full, so this write reaches the device
        let err = writer.write_vector(1, Units::NONE, &[0u8; 128]).unwrap_err();
        assert!(matches!(err, FrameFileError::Io(_)));

        assert!(matches!(
            writer.write_vector(2, Units::NONE, &[0u8; 1]),
            Err(FrameFileError::InvalidState(_))
        ));
        assert!(matches!(
            writer.frame_close(),
            Err(FrameFileError::InvalidState(_))
        ));
        assert!(matches!(
            writer.close(),
            Err(FrameFileError::InvalidState(_))
        ));
    }

    #[test]
    fn test_close_writes_header() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = FrameWriter::create(file.path(), 8_000.0).unwrap();
        for i in 0..3 {
            writer.frame_create(1, 0, FrameTime::Sample(i * 80)).unwrap();
            writer.write_vector(1, Units::NONE, &[i]).unwrap();
            writer.frame_close().unwrap();
        }
        writer.close().unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        let header: FileHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
        assert_eq!(header.frame_count, 3);
        assert_eq!(header.byte_count as usize, bytes.len());
        assert!(header.has_toc());
        assert_eq!(bytes.len() % 8, 0);
    }
}
