//! Scratch directory and file inspection helpers.

use std::path::{Path, PathBuf};

/// A scratch directory that is removed when dropped.
pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    /// Creates a scratch directory under the system temp location.
    pub fn new() -> anyhow::Result<ScratchDir> {
        Ok(ScratchDir {
            dir: tempfile::tempdir()?,
        })
    }

    /// Creates a scratch directory under `SEQIO_TEST_DIR` when set.
    ///
    /// `/tmp` is frequently tmpfs, which rejects `O_DIRECT`; pointing
    /// `SEQIO_TEST_DIR` at a disk-backed filesystem exercises the unbuffered path.
    pub fn for_direct_io() -> anyhow::Result<ScratchDir> {
        match std::env::var_os("SEQIO_TEST_DIR") {
            Some(root) => Ok(ScratchDir {
                dir: tempfile::tempdir_in(root)?,
            }),
            None => Self::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Reads the full contents of a file.
pub fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

/// Returns the size of a file in bytes.
pub fn file_size(path: &Path) -> anyhow::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}
