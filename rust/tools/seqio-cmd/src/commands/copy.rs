//! Copy command implementation

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result};
use seqio_io::CachedReader;
use seqio_io_impl::{DirectAsyncWriter, DirectWriterOptions, WriteSummary};

use super::WriterArgs;
use crate::utils::{format_size, format_throughput};

pub fn run(
    source: PathBuf,
    destination: PathBuf,
    read_cache_size: usize,
    writer: &WriterArgs,
) -> Result<()> {
    let start = Instant::now();
    let summary = copy_file(&source, &destination, read_cache_size, &writer.to_options())?;
    let elapsed = start.elapsed();

    println!("{} -> {}", source.display(), destination.display());
    println!("Copied: {}", format_size(summary.logical_size));
    println!(
        "Mode: {}, backend: {}, submissions: {}",
        summary.io_mode, summary.backend, summary.submissions
    );
    println!(
        "Elapsed: {:.3}s ({})",
        elapsed.as_secs_f64(),
        format_throughput(summary.logical_size, elapsed)
    );
    Ok(())
}

pub fn copy_file(
    source: &Path,
    destination: &Path,
    read_cache_size: usize,
    options: &DirectWriterOptions,
) -> Result<WriteSummary> {
    let mut reader = CachedReader::open(source, read_cache_size)
        .with_context(|| format!("Failed to open {}", source.display()))?;
    let mut writer = DirectAsyncWriter::create(destination, options)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    let mut chunk = vec![0u8; reader.cache_size()];
    while reader.remaining() > 0 {
        let n = reader.remaining().min(chunk.len() as u64) as usize;
        reader
            .read(&mut chunk[..n])
            .with_context(|| format!("Failed to read {}", source.display()))?;
        writer
            .write(&chunk[..n])
            .with_context(|| format!("Failed to write {}", destination.display()))?;
    }

    let summary = writer
        .close()
        .with_context(|| format!("Failed to close {}", destination.display()))?;
    anyhow::ensure!(
        summary.logical_size == reader.file_size(),
        "Copied {} bytes, expected {}",
        summary.logical_size,
        reader.file_size()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{checksum::checksum_file, test_writer_args};

    #[test]
    fn test_copy_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.bin");
        let destination = dir.path().join("copy.bin");
        let mut rng = fastrand::Rng::with_seed(3);
        let data: Vec<u8> = std::iter::repeat_with(|| rng.u8(..)).take(333_333).collect();
        std::fs::write(&source, &data).unwrap();

        let summary = copy_file(&source, &destination, 10_000, &test_writer_args().to_options())
            .unwrap();
        assert_eq!(summary.logical_size, data.len() as u64);
        assert_eq!(std::fs::read(&destination).unwrap(), data);
        assert_eq!(
            checksum_file(&source, 4096).unwrap(),
            checksum_file(&destination, 8192).unwrap()
        );
    }

    #[test]
    fn test_copy_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("empty.bin");
        let destination = dir.path().join("copy.bin");
        std::fs::write(&source, b"").unwrap();

        let summary = copy_file(&source, &destination, 4096, &test_writer_args().to_options())
            .unwrap();
        assert_eq!(summary.logical_size, 0);
        assert_eq!(std::fs::metadata(&destination).unwrap().len(), 0);
    }
}
