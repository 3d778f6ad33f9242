//! A sequential reader that serves reads from a pre-fetched chunk of the file.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use bytemuck::Pod;
use seqio_common::{Result, error::Error, verify_arg};

use crate::file::file_read_at_exact;

/// A sequential reader that keeps a contiguous chunk of the file in memory.
///
/// On open, the first `min(cache_size, file_size)` bytes are loaded into the cache.
/// Reads that fit in the unread part of the cache are served by a memory copy.
/// A read that crosses the end of the cache consumes the cached tail, fetches the
/// remainder straight from disk, and then re-primes the cache with the next
/// chunk of the file.
///
/// Reading past the end of the file is an error rather than a short read: index
/// files have a known layout, and running off the end means the caller's idea
/// of that layout is wrong.
pub struct CachedReader {
    path: PathBuf,
    file: File,
    /// Total size of the file.
    file_size: u64,
    /// Capacity of the cache, fixed at open time.
    cache_size: usize,
    /// Cached chunk of the file; only the first `cache_len` bytes are valid.
    cache: Vec<u8>,
    cache_len: usize,
    /// Offset of the next unread byte within `cache`.
    cache_pos: usize,
    /// File offset of the first byte that has not been pulled into memory yet.
    disk_pos: u64,
}

impl CachedReader {
    /// Opens `path` and primes a cache of up to `cache_size` bytes.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if `cache_size` is zero.
    /// * `Setup` if the file cannot be opened or the initial chunk cannot be read.
    pub fn open(path: impl AsRef<Path>, cache_size: usize) -> Result<CachedReader> {
        verify_arg!(cache_size, cache_size > 0);
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::setup("open", path_str(&path), e))?;
        let file_size = file
            .metadata()
            .map_err(|e| Error::setup("stat", path_str(&path), e))?
            .len();

        let cache_size = cache_size.min(file_size.max(1) as usize);
        let mut reader = CachedReader {
            path,
            file,
            file_size,
            cache_size,
            cache: vec![0u8; cache_size],
            cache_len: 0,
            cache_pos: 0,
            disk_pos: 0,
        };
        reader.prime()?;

        log::info!(
            "Opened: {}, size: {}, cache_size: {}",
            reader.path.display(),
            file_size,
            cache_size
        );
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Logical read position: the number of bytes consumed by the caller so far.
    pub fn position(&self) -> u64 {
        self.disk_pos - self.cached_remaining() as u64
    }

    /// Number of bytes left between the read position and the end of the file.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.position()
    }

    /// Fills `buf` entirely with the next `buf.len()` bytes of the file.
    ///
    /// # Errors
    ///
    /// `ReadPastEnd` if fewer than `buf.len()` bytes remain; in that case nothing
    /// is consumed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let cached = self.cached_remaining();
        if buf.len() <= cached {
            // case 1: the cache holds everything
            buf.copy_from_slice(&self.cache[self.cache_pos..self.cache_pos + buf.len()]);
            self.cache_pos += buf.len();
            return Ok(());
        }

        // case 2: the cache holds a prefix, the rest comes from disk
        let from_disk = (buf.len() - cached) as u64;
        self.check_disk_remaining(buf.len() as u64, from_disk)?;

        let (head, tail) = buf.split_at_mut(cached);
        head.copy_from_slice(&self.cache[self.cache_pos..self.cache_len]);
        self.cache_pos = self.cache_len;

        file_read_at_exact(&self.file, self.disk_pos, tail)
            .map_err(|e| Error::io(path_str(&self.path), e))?;
        self.disk_pos += from_disk;
        self.prime()
    }

    /// Skips the next `n` bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let cached = self.cached_remaining() as u64;
        if n <= cached {
            self.cache_pos += n as usize;
            return Ok(());
        }
        let from_disk = n - cached;
        self.check_disk_remaining(n, from_disk)?;
        self.cache_pos = self.cache_len;
        self.disk_pos += from_disk;
        self.prime()
    }

    /// Reads one plain-old-data value, in native byte order.
    pub fn read_pod<T: Pod>(&mut self) -> Result<T> {
        let mut value = T::zeroed();
        self.read(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Fills `values` with plain-old-data values, in native byte order.
    pub fn read_pod_slice<T: Pod>(&mut self, values: &mut [T]) -> Result<()> {
        self.read(bytemuck::cast_slice_mut(values))
    }
}

impl CachedReader {
    #[inline]
    fn cached_remaining(&self) -> usize {
        self.cache_len - self.cache_pos
    }

    fn check_disk_remaining(&self, requested: u64, from_disk: u64) -> Result<()> {
        let disk_left = self.file_size - self.disk_pos;
        if from_disk > disk_left {
            log::debug!(
                "Reading beyond end of file {}: requested {}, cached {}, file size {}, position {}",
                self.path.display(),
                requested,
                self.cached_remaining(),
                self.file_size,
                self.position()
            );
            return Err(Error::read_past_end(
                path_str(&self.path),
                requested,
                self.remaining(),
            ));
        }
        Ok(())
    }

    /// Loads the next chunk of the file into the (fully consumed) cache.
    fn prime(&mut self) -> Result<()> {
        debug_assert_eq!(self.cached_remaining(), 0);
        let len = (self.file_size - self.disk_pos).min(self.cache_size as u64) as usize;
        file_read_at_exact(&self.file, self.disk_pos, &mut self.cache[..len])
            .map_err(|e| Error::io(path_str(&self.path), e))?;
        self.disk_pos += len as u64;
        self.cache_len = len;
        self.cache_pos = 0;
        Ok(())
    }
}

impl std::fmt::Debug for CachedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedReader")
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("cache_size", &self.cache_size)
            .field("cache_len", &self.cache_len)
            .field("cache_pos", &self.cache_pos)
            .finish()
    }
}

impl std::io::Read for CachedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = (buf.len() as u64).min(self.remaining()) as usize;
        CachedReader::read(self, &mut buf[..n])?;
        Ok(n)
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}
