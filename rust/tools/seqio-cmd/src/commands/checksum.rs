//! Checksum command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use seqio_io::CachedReader;
use xxhash_rust::xxh3::Xxh3;

use crate::utils::format_size;

pub fn run(path: PathBuf, cache_size: usize) -> Result<()> {
    let (size, checksum) = checksum_file(&path, cache_size)?;
    println!("File: {}", path.display());
    println!("Size: {} ({size} bytes)", format_size(size));
    println!("xxh3: {checksum:016x}");
    Ok(())
}

/// Scans `path` through a [`CachedReader`] and returns its size and xxh3-64.
pub fn checksum_file(path: &Path, cache_size: usize) -> Result<(u64, u64)> {
    let mut reader = CachedReader::open(path, cache_size)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Xxh3::new();
    let mut chunk = vec![0u8; reader.cache_size()];
    while reader.remaining() > 0 {
        let n = reader.remaining().min(chunk.len() as u64) as usize;
        reader
            .read(&mut chunk[..n])
            .with_context(|| format!("Failed to read {}", path.display()))?;
        hasher.update(&chunk[..n]);
    }
    Ok((reader.file_size(), hasher.digest()))
}
