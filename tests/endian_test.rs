//! Byte-order tests: a file rewritten in the opposite byte order must read
//! back identically

use std::path::Path;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use framefile::storage::{
    pad_len, swap_vector, write_matrix, MatrixHeader, FRAME_HEADER_SIZE, HEADER_SIZE,
    MATRIX_HEADER_SIZE,
};
use framefile::{
    DataFormat, FrameFileError, FrameReader, FrameTime, FrameWriter, MatrixSignature, Units,
};

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn swap_words(bytes: &mut [u8], at: usize, layout: &[usize]) {
    let mut pos = at;
    for &width in layout {
        bytes[pos..pos + width].reverse();
        pos += width;
    }
}

/// Rewrite a native-order frame file in the opposite byte order
fn byte_swap_file(bytes: &mut [u8]) {
    let file_len = read_u32(bytes, 4) as usize;
    assert_eq!(file_len, bytes.len());
    swap_words(bytes, 0, &[4, 4, 4, 4, 8, 8]);

    let mut pos = HEADER_SIZE;
    while pos < file_len {
        let frame_len = read_u32(bytes, pos + 4) as usize;
        let matrix_count = read_u32(bytes, pos + 8);
        swap_words(bytes, pos, &[4, 4, 4, 4, 4, 4, 8]);

        let mut cursor = pos + FRAME_HEADER_SIZE;
        for _ in 0..matrix_count {
            let data_len = read_u32(bytes, cursor + 4) as usize;
            let format = DataFormat::from_raw(read_u32(bytes, cursor + 8)).unwrap();
            swap_words(bytes, cursor, &[4; 6]);

            let data = cursor + MATRIX_HEADER_SIZE;
            if !format.is_opaque() {
                swap_vector(&mut bytes[data..data + data_len], format.word_size());
            }
            cursor = data + data_len + pad_len(data_len);
        }
        assert_eq!(cursor, pos + frame_len);
        pos = cursor;
    }
}

fn write_sample(path: &Path) {
    let mut writer = FrameWriter::create(path, 22_050.0).unwrap();
    for i in 0..5u32 {
        let stream = i % 3;
        let time = if i % 2 == 0 {
            FrameTime::Sample(i * 256)
        } else {
            FrameTime::Seconds(f64::from(i) / 8.0)
        };
        writer.frame_create(2, stream, time).unwrap();
        writer
            .write_vector(1, Units::NONE, &[i as i16, -(i as i16), 300])
            .unwrap();
        writer
            .write_values(2, Units::new(4), &[f64::from(i), 1e-3, -2.5, 7.0, 0.0, 1.0], 3, 2)
            .unwrap();
        writer
            .write_vector(3, Units::NONE, &[u64::MAX - u64::from(i)])
            .unwrap();
        writer.write_vector(4, Units::NONE, &[i as u8, 1, 2]).unwrap();
        writer.write_str(5, Units::NONE, "byte order").unwrap();
        writer.frame_close().unwrap();
    }
    writer.close().unwrap();
}

fn swapped_copy(native: &Path) -> NamedTempFile {
    let mut bytes = std::fs::read(native).unwrap();
    byte_swap_file(&mut bytes);
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &bytes).unwrap();
    file
}

#[test]
fn test_swapped_file_reads_identically() {
    let native = NamedTempFile::new().unwrap();
    write_sample(native.path());
    let swapped = swapped_copy(native.path());
    assert_ne!(
        std::fs::read(native.path()).unwrap(),
        std::fs::read(swapped.path()).unwrap()
    );

    let mut a = FrameReader::open(native.path()).unwrap();
    let mut b = FrameReader::open(swapped.path()).unwrap();
    assert!(!a.is_swapped());
    assert!(b.is_swapped());
    assert_eq!(a.frame_count(), b.frame_count());
    assert_eq!(a.sample_rate().to_bits(), b.sample_rate().to_bits());
    assert_eq!(a.streams(), b.streams());

    loop {
        let fa = a.frame_load_next(None, None).unwrap().cloned();
        let fb = b.frame_load_next(None, None).unwrap().cloned();
        match (fa, fb) {
            (None, None) => break,
            (Some(fa), Some(fb)) => {
                assert_eq!(fa.info(), fb.info());
                assert_eq!(fa.matrices(), fb.matrices());
                for (ma, mb) in fa.iter().zip(fb.iter()) {
                    assert_eq!(ma.bytes(), mb.bytes());
                }
            }
            _ => panic!("frame sequences differ in length"),
        }
    }
}

#[test]
fn test_swapped_file_random_access() {
    let native = NamedTempFile::new().unwrap();
    write_sample(native.path());
    let swapped = swapped_copy(native.path());

    let mut reader = FrameReader::open(swapped.path()).unwrap();
    reader.seek(1, 1).unwrap();
    let frame = reader.frame_load_next(None, None).unwrap().unwrap();
    assert_eq!(frame.info().index, 4);
    assert_eq!(frame.info().time, FrameTime::Sample(1024));
    assert_eq!(
        frame.matrix(0).unwrap().values::<i16>().unwrap(),
        vec![4, -4, 300]
    );

    let sig = MatrixSignature::new(0, 3, Units::NONE, DataFormat::UInt64);
    let series = reader.load_series(&sig).unwrap();
    assert_eq!(series.frame_indices, vec![0, 3]);
    assert_eq!(
        series.matrix.view().values::<u64>().unwrap(),
        vec![u64::MAX, u64::MAX - 3]
    );

    let text = MatrixSignature::new(2, 5, Units::NONE, DataFormat::String);
    assert_eq!(reader.load_matrix(&text, 0).unwrap().view().as_str().unwrap(), "byte order");
}

#[test]
fn test_swapped_file_not_updatable() {
    let native = NamedTempFile::new().unwrap();
    write_sample(native.path());
    let swapped = swapped_copy(native.path());

    let mut reader = FrameReader::open_for_update(swapped.path()).unwrap();
    reader.frame_load_next(None, None).unwrap();
    assert!(matches!(
        reader.frame_update(),
        Err(FrameFileError::ModeMismatch(_))
    ));
}

proptest! {
    #[test]
    fn prop_swap_twice_is_identity(
        words in prop::collection::vec(any::<u64>(), 0..64),
        width in prop::sample::select(vec![1usize, 2, 4, 8]),
    ) {
        let original: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        let mut buf = original.clone();
        swap_vector(&mut buf, width);
        if width == 1 {
            prop_assert_eq!(&buf, &original);
        }
        swap_vector(&mut buf, width);
        prop_assert_eq!(buf, original);
    }

    #[test]
    fn prop_matrix_chunks_are_aligned(len in 0usize..4096, fill in any::<u8>()) {
        let data = vec![fill; len];
        let header = MatrixHeader {
            matrix_type: 1,
            byte_count: len as u32,
            format_id: DataFormat::UInt8.raw(),
            units_id: 0,
            rows: 1,
            cols: len as u32,
        };
        let mut out = Vec::new();
        let written = write_matrix(&mut out, &header, &data).unwrap();

        prop_assert_eq!(written as usize, out.len());
        prop_assert_eq!(out.len() % 8, 0);
        prop_assert_eq!(out.len(), MATRIX_HEADER_SIZE + len + pad_len(len));
        prop_assert!(pad_len(len) < 8);
        prop_assert!(out[MATRIX_HEADER_SIZE + len..].iter().all(|&b| b == 0));
    }
}
