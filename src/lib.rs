//! Framefile - Self-indexing binary container for time-stamped matrix frames
//!
//! A file is a header, a sequence of frames each holding typed matrices, and
//! a hidden table-of-contents frame written on close for random access by
//! stream and matrix signature.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod storage;

pub use config::{FileConfig, RealFormat};
pub use error::{FrameFileError, Result};
pub use storage::{
    Access, DataFormat, FrameInfo, FrameReader, FrameTime, FrameWriter, LoadedFrame,
    MatrixSignature, Units,
};
