//! Byte-order detection and adaptation
//!
//! Files are always written in the writer's native order. A reader decides
//! once, from the leading magic, whether everything it reads must be
//! byte-swapped.

use std::io::{self, Read, Seek, SeekFrom};

use bytemuck::{bytes_of_mut, Pod, Zeroable};

use super::format::{FileHeader, FrameHeader, MatrixHeader, FILE_MAGIC};
use crate::{FrameFileError, Result};

/// Decide the swap flag from the first four bytes of a file
///
/// # Errors
///
/// Returns error if the magic matches neither byte order
pub fn detect(raw_magic: [u8; 4]) -> Result<bool> {
    let magic = u32::from_ne_bytes(raw_magic);
    if magic == FILE_MAGIC {
        Ok(false)
    } else if magic == FILE_MAGIC.swap_bytes() {
        Ok(true)
    } else {
        Err(FrameFileError::NotAFrameFile { magic })
    }
}

/// Reverse each `word_size`-byte word of `buf` in place
///
/// Word sizes other than 2, 4 and 8 leave the buffer untouched. A trailing
/// partial word is never touched.
pub fn swap_vector(buf: &mut [u8], word_size: usize) {
    if matches!(word_size, 2 | 4 | 8) {
        buf.chunks_exact_mut(word_size).for_each(<[u8]>::reverse);
    }
}

/// Field-wise byte swap of an on-disk structure
pub trait SwapBytes {
    /// Swap every multi-byte field in place
    fn swap_bytes_in_place(&mut self);
}

fn swap_f64(value: f64) -> f64 {
    f64::from_bits(value.to_bits().swap_bytes())
}

impl SwapBytes for FileHeader {
    fn swap_bytes_in_place(&mut self) {
        self.magic = self.magic.swap_bytes();
        self.byte_count = self.byte_count.swap_bytes();
        self.frame_count = self.frame_count.swap_bytes();
        self.version = self.version.swap_bytes();
        self.toc_offset = self.toc_offset.swap_bytes();
        self.sample_rate = swap_f64(self.sample_rate);
    }
}

impl SwapBytes for FrameHeader {
    fn swap_bytes_in_place(&mut self) {
        self.frame_type = self.frame_type.swap_bytes();
        self.byte_count = self.byte_count.swap_bytes();
        self.matrix_count = self.matrix_count.swap_bytes();
        self.stream_id = self.stream_id.swap_bytes();
        self.flags = self.flags.swap_bytes();
        self.sample_idx = self.sample_idx.swap_bytes();
        self.seconds = swap_f64(self.seconds);
    }
}

impl SwapBytes for MatrixHeader {
    fn swap_bytes_in_place(&mut self) {
        self.matrix_type = self.matrix_type.swap_bytes();
        self.byte_count = self.byte_count.swap_bytes();
        self.format_id = self.format_id.swap_bytes();
        self.units_id = self.units_id.swap_bytes();
        self.rows = self.rows.swap_bytes();
        self.cols = self.cols.swap_bytes();
    }
}

/// Positioned reader that applies the handle's swap flag to every read
pub struct EndianReader<R> {
    inner: R,
    swap: bool,
    position: u64,
}

impl<R: Read + Seek> EndianReader<R> {
    /// Wrap `inner`, which is currently at `position`
    pub fn new(inner: R, swap: bool, position: u64) -> Self {
        Self {
            inner,
            swap,
            position,
        }
    }

    /// Whether reads are byte-swapped
    pub fn swaps(&self) -> bool {
        self.swap
    }

    /// Current logical position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read one header structure, adapted to native order
    ///
    /// # Errors
    ///
    /// Returns error if the read fails
    pub fn read_header<T: Pod + SwapBytes>(&mut self) -> io::Result<T> {
        let mut value = T::zeroed();
        self.read_raw(bytes_of_mut(&mut value))?;
        if self.swap {
            value.swap_bytes_in_place();
        }
        Ok(value)
    }

    /// Read a vector of `word_size`-byte elements, adapted to native order
    ///
    /// # Errors
    ///
    /// Returns error if the read fails
    pub fn read_vector(&mut self, buf: &mut [u8], word_size: usize) -> io::Result<()> {
        self.read_raw(buf)?;
        if self.swap {
            swap_vector(buf, word_size);
        }
        Ok(())
    }

    /// Read bytes without adaptation
    ///
    /// # Errors
    ///
    /// Returns error if the read fails
    pub fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Advance by `count` bytes
    ///
    /// # Errors
    ///
    /// Returns error if the seek fails
    pub fn skip(&mut self, count: u64) -> io::Result<()> {
        self.seek_to(self.position + count)
    }

    /// Move to an absolute position
    ///
    /// # Errors
    ///
    /// Returns error if the seek fails
    pub fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.position = self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Underlying reader
    ///
    /// Anything done through it must be followed by [`Self::seek_to`].
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}
