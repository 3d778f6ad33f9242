//! Platform-specific file creation for unbuffered writing.

#[cfg_attr(any(unix, target_os = "redox", target_os = "wasi"), path = "unix.rs")]
#[cfg_attr(windows, path = "windows.rs")]
mod platform;

use std::{fs::File, path::Path};

pub use platform::*;

/// Sector size assumed when the platform does not report one.
pub const DEFAULT_SECTOR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Transfers go through the OS page cache.
    Buffered,
    /// Transfers bypass the page cache (`O_DIRECT`, `FILE_FLAG_NO_BUFFERING`).
    /// Buffer addresses, lengths and file offsets must be sector-aligned.
    Unbuffered,
}

impl std::fmt::Display for IoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoMode::Buffered => f.write_str("buffered"),
            IoMode::Unbuffered => f.write_str("unbuffered"),
        }
    }
}

/// Returns the alignment required for unbuffered transfers to `file_path`:
/// the sector size reported by the platform, or [`DEFAULT_SECTOR_SIZE`].
pub fn io_alignment(file_path: &Path) -> usize {
    match sector_size(file_path) {
        Some(size) if size.is_power_of_two() => size,
        _ => DEFAULT_SECTOR_SIZE,
    }
}

/// Creates (or truncates) a write-only file in the requested mode.
///
/// When `io_mode` is [`IoMode::Unbuffered`], the filesystem refuses it (tmpfs
/// and some network filesystems reject `O_DIRECT`) and `allow_fallback` is set,
/// the file is reopened buffered. Returns the mode actually in effect.
pub fn create_for_write_with_fallback(
    file_path: &Path,
    io_mode: IoMode,
    allow_fallback: bool,
) -> std::io::Result<(File, IoMode)> {
    match create_for_write(file_path, io_mode) {
        Ok(file) => Ok((file, io_mode)),
        Err(e) if io_mode == IoMode::Unbuffered && allow_fallback => {
            log::warn!(
                "Unbuffered open of {} failed ({}), falling back to buffered I/O",
                file_path.display(),
                e
            );
            let file = create_for_write(file_path, IoMode::Buffered)?;
            Ok((file, IoMode::Buffered))
        }
        Err(e) => Err(e),
    }
}
