//! Human-readable summary of a frame file's structure

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::frame::FrameInfo;
use super::matrix::MatrixSignature;

/// Header fields, frames in file order and per-signature occurrence counts
#[derive(Debug, Clone, PartialEq)]
pub struct StructureReport {
    /// File the report was built from
    pub path: PathBuf,
    /// Format version
    pub version: u32,
    /// Whether the file is in foreign byte order
    pub swapped: bool,
    /// Sample rate from the header
    pub sample_rate: f64,
    /// File length from the header
    pub byte_count: u32,
    /// Frame headers, ordered by global index
    pub frames: Vec<FrameInfo>,
    /// Signatures in order of first appearance, with occurrence counts
    pub signatures: Vec<(MatrixSignature, usize)>,
}

impl StructureReport {
    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frames per stream, ascending by stream id
    pub fn stream_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for frame in &self.frames {
            *counts.entry(frame.stream_id).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for StructureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File:        {}", self.path.display())?;
        writeln!(
            f,
            "Version:     {}{}",
            self.version,
            if self.swapped { " (byte-swapped)" } else { "" }
        )?;
        writeln!(f, "Sample rate: {}", self.sample_rate)?;
        writeln!(f, "Size:        {} bytes", self.byte_count)?;
        writeln!(f, "Frames:      {}", self.frames.len())?;

        let streams = self.stream_counts();
        if !streams.is_empty() {
            writeln!(f)?;
            writeln!(f, "  {:>10}  {:>8}", "Stream", "Frames")?;
            writeln!(f, "  {:->10}  {:->8}", "", "")?;
            for (stream, count) in &streams {
                writeln!(f, "  {stream:>10}  {count:>8}")?;
            }
        }

        if !self.frames.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "  {:>6}  {:>10}  {:>10}  {:>14}  {:>8}  {:>10}",
                "Index", "Stream", "Type", "Time", "Matrices", "Bytes"
            )?;
            writeln!(
                f,
                "  {:->6}  {:->10}  {:->10}  {:->14}  {:->8}  {:->10}",
                "", "", "", "", "", ""
            )?;
            for frame in &self.frames {
                writeln!(
                    f,
                    "  {:>6}  {:>10}  {:>10}  {:>14}  {:>8}  {:>10}",
                    frame.index,
                    frame.stream_id,
                    frame.frame_type,
                    frame.time.to_string(),
                    frame.matrix_count,
                    frame.byte_count
                )?;
            }
        }

        if !self.signatures.is_empty() {
            writeln!(f)?;
            writeln!(f, "  {:<40}  {:>8}", "Signature", "Count")?;
            writeln!(f, "  {:-<40}  {:->8}", "", "")?;
            for (signature, count) in &self.signatures {
                writeln!(f, "  {:<40}  {count:>8}", signature.to_string())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::format::{DataFormat, FrameTime, Units};

    fn frame(index: u32, stream_id: u32) -> FrameInfo {
        FrameInfo {
            index,
            frame_type: 3,
            stream_id,
            time: FrameTime::Sample(index * 64),
            matrix_count: 1,
            byte_count: 64,
            offset: 32 + u64::from(index) * 64,
        }
    }

    #[test]
    fn test_stream_counts() {
        let report = StructureReport {
            path: PathBuf::from("a.frm"),
            version: 1,
            swapped: false,
            sample_rate: 48_000.0,
            byte_count: 512,
            frames: vec![frame(0, 2), frame(1, 1), frame(2, 2)],
            signatures: Vec::new(),
        };
        let counts = report.stream_counts();
        assert_eq!(counts.get(&1), Some(&1));
        assert_eq!(counts.get(&2), Some(&2));
        assert_eq!(report.frame_count(), 3);
    }

    #[test]
    fn test_display() {
        let sig = MatrixSignature::new(2, 5, Units::NONE, DataFormat::Int16);
        let report = StructureReport {
            path: PathBuf::from("a.frm"),
            version: 1,
            swapped: true,
            sample_rate: 8_000.0,
            byte_count: 256,
            frames: vec![frame(0, 2)],
            signatures: vec![(sig, 1)],
        };
        let text = report.to_string();
        assert!(text.contains("byte-swapped"));
        assert!(text.contains("Frames:      1"));
        assert!(text.contains(&sig.to_string()));
    }
}
