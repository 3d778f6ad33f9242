//! Unix-specific file creation.
//!
//! Unbuffered mode uses `O_DIRECT`, which requires the buffer address, the
//! transfer length and the file offset to be aligned to the logical block size
//! of the underlying device. Not every filesystem supports it.

use std::{fs::OpenOptions, path::Path};

use crate::fs::IoMode;

/// Creates a new file, or truncates an existing one, for writing only.
///
/// # I/O Modes
///
/// * [`IoMode::Buffered`] - Uses the system's page cache
/// * [`IoMode::Unbuffered`] - Uses direct I/O (`O_DIRECT`), bypassing the page cache
pub fn create_for_write(file_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    match io_mode {
        IoMode::Buffered => (),
        IoMode::Unbuffered => {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_DIRECT);
        }
    }
    options.open(file_path)
}

/// The logical sector size is not queried on Unix; callers fall back to the
/// default alignment or an explicit override.
pub fn sector_size(_file_path: &Path) -> Option<usize> {
    None
}
