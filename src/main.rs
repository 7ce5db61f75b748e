//! Framefile CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use framefile::{FrameReader, LoadedFrame};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        usage();
        process::exit(1);
    }

    let command = &args[1];
    let path = PathBuf::from(&args[2]);

    let result = match command.as_str() {
        "info" => show_info(&path),
        "dump" => args
            .get(3)
            .map(|s| s.parse::<u32>())
            .transpose()
            .with_context(|| format!("Invalid stream id: {}", args[3]))
            .and_then(|stream| dump(&path, stream)),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'framefile' for usage information.");
            process::exit(1);
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

fn usage() {
    eprintln!("Framefile v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: framefile <command> <file> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  info <file>            Show header, streams and signatures");
    eprintln!("  dump <file> [stream]   Print every frame, optionally for one stream");
}

fn open(path: &Path) -> Result<FrameReader> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    FrameReader::open(path)
        .with_context(|| format!("Failed to open frame file: {}", path.display()))
}

fn show_info(path: &Path) -> Result<()> {
    let mut reader = open(path)?;
    let report = reader.report().context("Failed to read file structure")?;
    print!("{report}");
    reader.close()?;
    Ok(())
}

fn dump(path: &Path, stream: Option<u32>) -> Result<()> {
    let mut reader = open(path)?;
    let sample_rate = reader.sample_rate();

    while let Some(frame) = reader
        .frame_load_next(None, stream)
        .context("Failed to read frame")?
    {
        print_frame(frame, sample_rate);
    }

    reader.close()?;
    Ok(())
}

fn print_frame(frame: &LoadedFrame, sample_rate: f64) {
    let info = frame.info();
    println!(
        "frame {} stream {} type {} at {} ({:.6}s), {} matrices",
        info.index,
        info.stream_id,
        info.frame_type,
        info.time,
        info.time.as_seconds(sample_rate),
        frame.len()
    );

    for matrix in frame.iter() {
        let m = matrix.info();
        let body = if m.format.is_numeric() {
            matrix
                .to_f64()
                .map(|values| format!("{values:?}"))
                .unwrap_or_else(|e| format!("<{e}>"))
        } else if let Ok(text) = matrix.as_str() {
            format!("{text:?}")
        } else {
            format!("<{} bytes>", m.byte_count)
        };
        println!(
            "  type {} units {} {} {}x{}: {body}",
            m.matrix_type, m.units, m.format, m.rows, m.cols
        );
    }
}
