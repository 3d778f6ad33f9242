//! Tuning knobs for [`DirectAsyncWriter`](crate::DirectAsyncWriter).

use seqio_bytes::align::is_aligned_usize;
use seqio_common::{Result, verify_arg};

use crate::{aio::AioBackend, fs::IoMode};

/// Configuration of a [`DirectAsyncWriter`](crate::DirectAsyncWriter).
///
/// `cache_size` and `num_buffers` are the two parameters every caller picks;
/// the rest have defaults suitable for large sequential writes to local disks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectWriterOptions {
    /// Capacity of each staging buffer, and the length of every non-final transfer.
    pub cache_size: usize,
    /// Number of staging buffers in the ring. At most `num_buffers - 1`
    /// transfers are in flight at any time.
    pub num_buffers: usize,
    pub io_mode: IoMode,
    pub backend: AioBackend,
    /// Required alignment of buffer addresses, offsets and lengths.
    /// `None` queries the platform, falling back to 512 bytes.
    pub alignment: Option<usize>,
    /// Submission queue size of the async context.
    pub queue_depth: usize,
    /// Reopen the file buffered when the filesystem rejects unbuffered I/O.
    pub allow_buffered_fallback: bool,
    /// Worker count of the thread-pool backend.
    pub io_threads: usize,
}

impl DirectWriterOptions {
    pub const DEFAULT_CACHE_SIZE: usize = 4 * 1024 * 1024;
    pub const DEFAULT_NUM_BUFFERS: usize = 4;
    pub const DEFAULT_QUEUE_DEPTH: usize = 128;
    pub const DEFAULT_IO_THREADS: usize = 4;

    pub fn new(cache_size: usize, num_buffers: usize) -> DirectWriterOptions {
        DirectWriterOptions {
            cache_size,
            num_buffers,
            ..Default::default()
        }
    }

    pub fn with_io_mode(mut self, io_mode: IoMode) -> Self {
        self.io_mode = io_mode;
        self
    }

    pub fn with_backend(mut self, backend: AioBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    pub fn with_buffered_fallback(mut self, allow: bool) -> Self {
        self.allow_buffered_fallback = allow;
        self
    }

    pub fn with_io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = io_threads;
        self
    }

    /// Alignment in effect: the explicit override, or the platform default.
    pub fn effective_alignment(&self) -> usize {
        self.alignment.unwrap_or(crate::fs::DEFAULT_SECTOR_SIZE)
    }

    /// Checks the options for consistency.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when:
    /// * `num_buffers < 2`
    /// * `cache_size` is zero, exceeds `u32::MAX`, or (unbuffered only) is not
    ///   a multiple of the alignment
    /// * the alignment is not a power of two
    /// * `queue_depth < num_buffers`, or `io_threads` is zero
    pub fn validate(&self) -> Result<()> {
        let alignment = self.effective_alignment();
        verify_arg!(num_buffers, self.num_buffers >= 2);
        verify_arg!(cache_size, self.cache_size > 0);
        verify_arg!(cache_size, self.cache_size as u64 <= u32::MAX as u64);
        verify_arg!(alignment, alignment.is_power_of_two());
        if self.io_mode == IoMode::Unbuffered {
            verify_arg!(cache_size, is_aligned_usize(self.cache_size, alignment));
        }
        verify_arg!(queue_depth, self.queue_depth >= self.num_buffers);
        verify_arg!(queue_depth, self.queue_depth as u64 <= u32::MAX as u64);
        verify_arg!(io_threads, self.io_threads > 0);
        Ok(())
    }
}

impl Default for DirectWriterOptions {
    fn default() -> Self {
        DirectWriterOptions {
            cache_size: Self::DEFAULT_CACHE_SIZE,
            num_buffers: Self::DEFAULT_NUM_BUFFERS,
            io_mode: IoMode::Unbuffered,
            backend: AioBackend::Auto,
            alignment: None,
            queue_depth: Self::DEFAULT_QUEUE_DEPTH,
            allow_buffered_fallback: true,
            io_threads: Self::DEFAULT_IO_THREADS,
        }
    }
}
