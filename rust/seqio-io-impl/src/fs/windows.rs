//! Windows-specific file creation.
//!
//! Unbuffered mode uses `FILE_FLAG_NO_BUFFERING`, which requires sector-aligned
//! buffers, lengths and offsets.

use std::{fs::OpenOptions, path::Path};

use crate::fs::IoMode;

/// Creates a new file, or truncates an existing one, for writing only.
///
/// # I/O Modes
///
/// * [`IoMode::Buffered`] - Uses Windows' standard file caching
/// * [`IoMode::Unbuffered`] - Uses `FILE_FLAG_NO_BUFFERING` for direct I/O
pub fn create_for_write(file_path: &Path, io_mode: IoMode) -> std::io::Result<std::fs::File> {
    use windows_sys::Win32::Storage::FileSystem::{
        FILE_FLAG_NO_BUFFERING, FILE_FLAG_SEQUENTIAL_SCAN,
    };

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    match io_mode {
        IoMode::Buffered => (),
        IoMode::Unbuffered => {
            use std::os::windows::fs::OpenOptionsExt;
            options.custom_flags(FILE_FLAG_NO_BUFFERING | FILE_FLAG_SEQUENTIAL_SCAN);
        }
    }
    options.open(file_path)
}

/// Queries the bytes-per-sector of the volume holding `file_path`.
pub fn sector_size(file_path: &Path) -> Option<usize> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceW;

    let absolute;
    let file_path = if file_path.is_absolute() {
        file_path
    } else {
        absolute = std::env::current_dir().ok()?.join(file_path);
        absolute.as_path()
    };
    let root_path = file_path.ancestors().last()?;
    let root_path_wide: Vec<u16> = OsStr::new(root_path)
        .encode_wide()
        .chain(Some(0))
        .collect();

    let mut sectors_per_cluster = 0u32;
    let mut bytes_per_sector = 0u32;
    let mut free_clusters = 0u32;
    let mut total_clusters = 0u32;

    let result = unsafe {
        GetDiskFreeSpaceW(
            root_path_wide.as_ptr(),
            &mut sectors_per_cluster,
            &mut bytes_per_sector,
            &mut free_clusters,
            &mut total_clusters,
        )
    };

    (result != 0 && bytes_per_sector > 0).then_some(bytes_per_sector as usize)
}
