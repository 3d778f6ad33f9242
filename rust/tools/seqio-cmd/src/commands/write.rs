//! Write command implementation

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result};
use seqio_io_impl::{DirectAsyncWriter, DirectWriterOptions, WriteSummary};
use xxhash_rust::xxh3::Xxh3;

use super::WriterArgs;
use crate::utils::{format_size, format_throughput};

pub fn run(
    path: PathBuf,
    size: u64,
    seed: u64,
    block_size: usize,
    writer: &WriterArgs,
) -> Result<()> {
    let start = Instant::now();
    let (summary, checksum) = write_random(&path, size, seed, block_size, &writer.to_options())?;
    let elapsed = start.elapsed();

    println!("File: {}", path.display());
    println!("Size: {}", format_size(summary.logical_size));
    println!(
        "Mode: {}, backend: {}, submissions: {}",
        summary.io_mode, summary.backend, summary.submissions
    );
    println!(
        "Elapsed: {:.3}s ({})",
        elapsed.as_secs_f64(),
        format_throughput(summary.logical_size, elapsed)
    );
    println!("xxh3: {checksum:016x}");
    Ok(())
}

/// Streams `size` seeded pseudo-random bytes to `path` in `block_size` writes.
/// Returns the writer summary and the xxh3-64 of the data.
pub fn write_random(
    path: &Path,
    size: u64,
    seed: u64,
    block_size: usize,
    options: &DirectWriterOptions,
) -> Result<(WriteSummary, u64)> {
    anyhow::ensure!(block_size > 0, "Block size must be positive");
    let mut writer = DirectAsyncWriter::create(path, options)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut rng = fastrand::Rng::with_seed(seed);
    let mut hasher = Xxh3::new();
    let mut block = vec![0u8; block_size];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(block_size as u64) as usize;
        let block = &mut block[..n];
        rng.fill(block);
        hasher.update(block);
        writer
            .write(block)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        remaining -= n as u64;
    }

    let summary = writer
        .close()
        .with_context(|| format!("Failed to close {}", path.display()))?;
    Ok((summary, hasher.digest()))
}
