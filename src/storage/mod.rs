//! Binary storage format for frame files

mod endian;
mod format;
mod frame;
mod matrix;
mod reader;
mod report;
mod toc;
mod writer;

pub use endian::{detect, swap_vector, EndianReader, SwapBytes};
pub use format::{
    chunk_len, pad_len, DataFormat, FileHeader, FrameHeader, FrameTime, MatrixHeader, Units,
    CHUNK_ALIGN, FILE_MAGIC, FILE_VERSION, FLAG_TIME_SECONDS, FRAME_HEADER_SIZE, HEADER_SIZE,
    MATRIX_HEADER_SIZE, NO_TOC_OFFSET, NO_TYPE, TOC_FRAME_TYPE, TOC_HEADER_MATRIX,
    TOC_OFFSET_MATRIX, TOC_STREAM_ID,
};
pub use frame::{read_frame_header, FrameInfo, LoadedFrame};
pub use matrix::{
    byte_len, encode_values, read_matrix_data, read_matrix_header, write_matrix, Element,
    MatrixInfo, MatrixRef, MatrixSignature, OwnedMatrix,
};
pub use reader::{validate_header, Access, FrameReader, MatrixSeries, ReadState};
pub use report::StructureReport;
pub use toc::{Toc, TocKey, TocPoint};
pub use writer::FrameWriter;
