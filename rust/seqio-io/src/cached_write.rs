//! A sequential writer that accumulates small writes into a single cache buffer.

use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bytemuck::Pod;
use seqio_common::{Result, error::Error, verify_arg, verify_state};

/// A buffered sequential file writer with an explicit, fixed-size cache.
///
/// Writes that fit in the free part of the cache are copied into it. A write that
/// does not fit first flushes the cached bytes, then goes to the file directly,
/// leaving the cache empty. This keeps large writes from being copied twice.
///
/// The writer is closed on drop; errors from that implicit close are logged.
/// Call [`close`](Self::close) to observe them.
pub struct CachedWriter {
    path: PathBuf,
    /// `None` once the writer has been closed.
    file: Option<File>,
    cache: Vec<u8>,
    cache_size: usize,
    /// Bytes handed to the file so far, not counting the cache contents.
    flushed: u64,
}

impl CachedWriter {
    /// Creates (or truncates) `path` and allocates a cache of `cache_size` bytes.
    pub fn create(path: impl AsRef<Path>, cache_size: usize) -> Result<CachedWriter> {
        verify_arg!(cache_size, cache_size > 0);
        let path = path.as_ref().to_path_buf();
        let file =
            File::create(&path).map_err(|e| Error::setup("create", path.display().to_string(), e))?;
        log::info!("Opened: {}, cache_size: {}", path.display(), cache_size);
        Ok(CachedWriter {
            path,
            file: Some(file),
            cache: Vec::with_capacity(cache_size),
            cache_size,
            flushed: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Number of bytes currently held in the cache.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Total number of bytes accepted by `write` calls, flushed or still cached.
    pub fn bytes_written(&self) -> u64 {
        self.flushed + self.cache.len() as u64
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Writes `buf` through the cache.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        verify_state!("write after close", self.file.is_some());
        if buf.len() <= self.cache_size - self.cache.len() {
            // case 1: the cache can take all data
            self.cache.extend_from_slice(buf);
            return Ok(());
        }

        // case 2: dump the cache, then write the new data directly
        self.flush_cache()?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("write after close"))?;
        file.write_all(buf)
            .map_err(|e| Error::io(path_str(&self.path), e))?;
        self.flushed += buf.len() as u64;
        Ok(())
    }

    /// Writes one plain-old-data value, in native byte order.
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> Result<()> {
        self.write(bytemuck::bytes_of(value))
    }

    /// Writes a slice of plain-old-data values, in native byte order.
    pub fn write_pod_slice<T: Pod>(&mut self, values: &[T]) -> Result<()> {
        self.write(bytemuck::cast_slice(values))
    }

    /// Writes the cached bytes to the file and empties the cache.
    pub fn flush_cache(&mut self) -> Result<()> {
        if self.cache.is_empty() {
            return Ok(());
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("flush after close"))?;
        file.write_all(&self.cache)
            .map_err(|e| Error::io(path_str(&self.path), e))?;
        self.flushed += self.cache.len() as u64;
        self.cache.clear();
        Ok(())
    }

    /// Flushes the cache and moves the file cursor back to the start, so that
    /// subsequent writes overwrite the file from offset 0 (e.g. to patch a header
    /// once the body has been written).
    pub fn reset(&mut self) -> Result<()> {
        self.flush_cache()?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("reset after close"))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::io(path_str(&self.path), e))?;
        Ok(())
    }

    /// Flushes outstanding data, syncs the file and releases it.
    ///
    /// Calling `close` more than once is a no-op.
    pub fn close(&mut self) -> Result<u64> {
        if self.file.is_none() {
            return Ok(self.flushed);
        }
        self.flush_cache()?;
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|e| Error::io(path_str(&self.path), e))?;
        }
        log::info!("Finished writing {}B to {}", self.flushed, self.path.display());
        Ok(self.flushed)
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("write after close"))
    }
}

impl Write for CachedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        CachedWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_cache()?;
        self.file_mut()?.flush()
    }
}

impl std::fmt::Debug for CachedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedWriter")
            .field("path", &self.path)
            .field("cache_size", &self.cache_size)
            .field("cached", &self.cache.len())
            .field("flushed", &self.flushed)
            .field("closed", &self.file.is_none())
            .finish()
    }
}

impl Drop for CachedWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Error closing {}: {}", self.path.display(), e);
        }
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqio_common::error::ErrorKind;
    use seqio_testkit::data_gen::{position_pattern, random_bytes, random_chunks};

    #[test]
    fn test_small_writes_stay_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = CachedWriter::create(&path, 1024).unwrap();
        writer.write(b"hello ").unwrap();
        writer.write(b"world").unwrap();
        assert_eq!(writer.cached_len(), 11);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        assert_eq!(writer.close().unwrap(), 11);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_oversized_write_flushes_cache_and_bypasses_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = CachedWriter::create(&path, 1024).unwrap();

        let head = position_pattern(100);
        let big = random_bytes(5000, 3);
        writer.write(&head).unwrap();
        writer.write(&big).unwrap();
        assert_eq!(writer.cached_len(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5100);
        assert_eq!(writer.bytes_written(), 5100);

        writer.write(b"tail").unwrap();
        assert_eq!(writer.cached_len(), 4);
        assert_eq!(writer.close().unwrap(), 5104);

        let content = std::fs::read(&path).unwrap();
        assert_eq!(&content[..100], &head[..]);
        assert_eq!(&content[100..5100], &big[..]);
        assert_eq!(&content[5100..], b"tail");
    }

    #[test]
    fn test_size_matches_sum_of_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let data = random_bytes(100_000, 11);
        let mut writer = CachedWriter::create(&path, 4096).unwrap();
        let mut total = 0u64;
        for chunk in random_chunks(&data, 9000, 5) {
            writer.write(chunk).unwrap();
            total += chunk.len() as u64;
            assert_eq!(writer.bytes_written(), total);
        }
        assert_eq!(writer.close().unwrap(), total);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_reset_rewrites_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = CachedWriter::create(&path, 64).unwrap();
        writer.write_pod(&0u32).unwrap();
        writer.write_pod_slice(&[1u16, 2, 3, 4]).unwrap();
        writer.reset().unwrap();
        writer.write_pod(&4u32).unwrap();
        writer.close().unwrap();

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content.len(), 12);
        assert_eq!(&content[..4], &4u32.to_ne_bytes());
        assert_eq!(&content[4..6], &1u16.to_ne_bytes());
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = CachedWriter::create(&path, 16).unwrap();
        writer.write(b"abc").unwrap();
        assert_eq!(writer.close().unwrap(), 3);
        assert_eq!(writer.close().unwrap(), 3);
        assert!(writer.is_closed());
        assert!(matches!(
            writer.write(b"x").unwrap_err().kind(),
            ErrorKind::InvalidOperation { .. }
        ));
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        {
            let mut writer = CachedWriter::create(&path, 1024).unwrap();
            writer.write(b"dropped but not lost").unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"dropped but not lost");
    }
}
