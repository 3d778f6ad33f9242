//! Sequential writer that overlaps buffer filling with asynchronous transfers.

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use seqio_bytes::align::align_down_u64;
use seqio_common::{Result, error::Error};

use crate::{
    aio::{self, AsyncIoContext, PendingRequest},
    buffer_pool::AlignedBufferPool,
    fs::{self, IoMode},
    options::DirectWriterOptions,
};

/// Totals reported by [`DirectAsyncWriter::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Bytes accepted from the caller; the final size of the file.
    pub logical_size: u64,
    /// Bytes handed to the OS, alignment padding and rewritten tails included.
    pub bytes_submitted: u64,
    /// Number of writes handed to the async context.
    pub submissions: u64,
    /// I/O mode the file was written in, after any fallback at creation.
    pub io_mode: IoMode,
    /// Name of the async backend that issued the writes.
    pub backend: &'static str,
}

/// A sequential file writer built on a ring of `N` aligned staging buffers.
///
/// The caller's bytes are copied into the current buffer. A full buffer is
/// submitted to the async context as one positional write, and the writer
/// moves on to the next buffer in the ring. Before a submission, the writer
/// waits for the outstanding write of the buffer it is about to move to, so
/// at most `N - 1` writes are in flight and no buffer is refilled while the
/// OS may still read from it. Writes are issued at strictly increasing offsets.
///
/// In unbuffered mode every transfer must be a multiple of the sector size.
/// A partial buffer submitted by [`flush`](Self::flush) is zero-padded to the
/// next sector boundary; its unaligned tail stays staged and is rewritten by
/// the next submission, and [`close`](Self::close) truncates the file to the
/// logical size.
///
/// The writer is closed on drop; errors from that implicit close are logged.
/// After an I/O failure the writer only accepts `close`.
pub struct DirectAsyncWriter {
    // Fields drop in declaration order: the context waits for in-flight writes
    // before the pool releases the memory they read from.
    context: Option<Box<dyn AsyncIoContext>>,
    pool: AlignedBufferPool,
    file: Option<Arc<File>>,
    path: PathBuf,
    io_mode: IoMode,
    backend: &'static str,
    /// Index of the buffer being filled.
    current: usize,
    /// Bytes accepted from the caller.
    position: u64,
    /// File offset of the next submission.
    file_offset: u64,
    /// Leading bytes of the current buffer that a padded submission already wrote.
    carried: usize,
    /// End of the furthest submission, padding included.
    physical_end: u64,
    bytes_submitted: u64,
    submissions: u64,
    failed: bool,
    summary: Option<WriteSummary>,
    /// Message of the error that ended a failed close.
    close_error: Option<String>,
}

impl DirectAsyncWriter {
    /// Creates (or truncates) `path` and sets up the buffers and async context
    /// described by `options`.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if the options do not validate.
    /// * `Setup` if the file cannot be created in the requested mode, or the
    ///   requested backend cannot be initialized.
    /// * `Allocation` if the staging buffers cannot be allocated.
    pub fn create(
        path: impl AsRef<Path>,
        options: &DirectWriterOptions,
    ) -> Result<DirectAsyncWriter> {
        let path = path.as_ref();
        let mut options = options.clone();
        if options.alignment.is_none() {
            options.alignment = Some(fs::io_alignment(path));
        }
        options.validate()?;

        let (file, io_mode) =
            fs::create_for_write_with_fallback(path, options.io_mode, options.allow_buffered_fallback)
                .map_err(|e| Error::setup("create", path_str(path), e))?;
        options.io_mode = io_mode;

        let file = Arc::new(file);
        let context = aio::create_context(
            options.backend,
            file.clone(),
            path,
            options.queue_depth,
            options.io_threads,
        )?;
        Self::from_parts(file, path, &options, context)
    }

    /// Assembles a writer around an already opened file and a context bound to it.
    ///
    /// `options.io_mode` must describe how `file` was opened.
    pub fn from_parts(
        file: Arc<File>,
        path: impl AsRef<Path>,
        options: &DirectWriterOptions,
        context: Box<dyn AsyncIoContext>,
    ) -> Result<DirectAsyncWriter> {
        options.validate()?;
        let alignment = options.effective_alignment();
        let pool = AlignedBufferPool::new(options.num_buffers, options.cache_size, alignment)?;
        let path = path.as_ref().to_path_buf();
        let backend = context.name();

        log::info!(
            "Opened: {}, mode: {}, backend: {}, cache_size: {}, num_buffers: {}, alignment: {}",
            path.display(),
            options.io_mode,
            backend,
            options.cache_size,
            options.num_buffers,
            alignment
        );
        Ok(DirectAsyncWriter {
            context: Some(context),
            pool,
            file: Some(file),
            path,
            io_mode: options.io_mode,
            backend,
            current: 0,
            position: 0,
            file_offset: 0,
            carried: 0,
            physical_end: 0,
            bytes_submitted: 0,
            submissions: 0,
            failed: false,
            summary: None,
            close_error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes accepted by `write` so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// File offset at which the next submission will be issued.
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Number of writes submitted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn bytes_submitted(&self) -> u64 {
        self.bytes_submitted
    }

    /// Number of submitted writes whose completion has not been observed.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight_count()
    }

    /// I/O mode in effect, after any fallback at creation.
    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    pub fn cache_size(&self) -> usize {
        self.pool.buffer_capacity()
    }

    pub fn num_buffers(&self) -> usize {
        self.pool.len()
    }

    pub fn alignment(&self) -> usize {
        self.pool.alignment()
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_none()
    }

    /// Appends `data` to the file.
    ///
    /// Returns once every byte is staged; full buffers are submitted along the
    /// way, which may block on the completion of earlier writes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        let mut rest = data;
        while !rest.is_empty() {
            let n = self.pool.buffer_at_mut(self.current).fill_from(rest)?;
            rest = &rest[n..];
            self.position += n as u64;
            if self.pool.buffer_at(self.current).is_full() {
                self.submit_current_buffer()?;
            }
        }
        Ok(())
    }

    /// Submits the current buffer, if it holds unwritten bytes, and moves on to
    /// the next buffer in the ring.
    pub fn submit_current_buffer(&mut self) -> Result<()> {
        self.check_writable()?;
        let current = self.current;
        let filled = self.pool.buffer_at(current).filled();
        if filled == self.carried {
            return Ok(());
        }
        if self.carried > 0 {
            // The previous padded write covers the sector rewritten here.
            self.wait_all()?;
        }

        let next = self.pool.next_index(current);
        self.reclaim(next)?;

        let len = match self.io_mode {
            IoMode::Unbuffered => self.pool.buffer_at_mut(current).pad_to_alignment(),
            IoMode::Buffered => filled,
        };
        let offset = self.file_offset;
        let buf = self.pool.buffer_at(current).as_ptr();
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("write after close"))?;

        log::debug!(
            "Submitting buffer {} of {}: offset {}, len {}",
            current,
            path_str(&self.path),
            offset,
            len
        );
        // SAFETY: the buffer is not filled again before its request is waited
        // on, and the context is dropped before the pool.
        let token = match unsafe { context.submit(buf, len, offset) } {
            Ok(token) => token,
            Err(e) => {
                self.failed = true;
                return Err(e);
            }
        };
        self.pool
            .buffer_at_mut(current)
            .mark_submitted(PendingRequest {
                token,
                buffer_index: current,
                offset,
                len,
                logical_len: filled,
            })?;

        self.submissions += 1;
        self.bytes_submitted += len as u64;
        self.physical_end = self.physical_end.max(offset + len as u64);

        if len > filled {
            let whole = align_down_u64(filled as u64, self.pool.alignment() as u64) as usize;
            self.pool.carry_over(current, next, whole..filled)?;
            self.file_offset += whole as u64;
            self.carried = filled - whole;
        } else {
            self.file_offset += len as u64;
            self.carried = 0;
        }
        self.current = next;
        Ok(())
    }

    /// Submits any staged bytes and waits until every submitted write has
    /// completed.
    ///
    /// This does not sync the file; [`close`](Self::close) does.
    pub fn flush(&mut self) -> Result<()> {
        self.submit_current_buffer()?;
        self.wait_all()
    }

    /// Flushes, trims any alignment padding, syncs the file and releases the
    /// async context, the buffers and the file handle.
    ///
    /// Only the first call does any I/O. Once a close has succeeded, further
    /// calls return the same summary; once it has failed, further calls return
    /// `InvalidOperation` naming the original failure.
    pub fn close(&mut self) -> Result<WriteSummary> {
        if let Some(summary) = self.summary {
            return Ok(summary);
        }
        if self.context.is_none() {
            let cause = self.close_error.as_deref().unwrap_or("writer released");
            return Err(Error::invalid_operation(format!(
                "close of a failed writer: {cause}"
            )));
        }

        let result = self.finish();
        self.release();
        if let Err(e) = result {
            self.close_error = Some(e.to_string());
            return Err(e);
        }

        let summary = WriteSummary {
            logical_size: self.position,
            bytes_submitted: self.bytes_submitted,
            submissions: self.submissions,
            io_mode: self.io_mode,
            backend: self.backend,
        };
        self.summary = Some(summary);
        log::info!(
            "Finished writing {}B to {} ({} submissions, {}B submitted, backend: {})",
            summary.logical_size,
            self.path.display(),
            summary.submissions,
            summary.bytes_submitted,
            summary.backend
        );
        Ok(summary)
    }
}

impl DirectAsyncWriter {
    fn check_writable(&self) -> Result<()> {
        if self.context.is_none() || self.summary.is_some() {
            return Err(Error::invalid_operation("write after close"));
        }
        if self.failed {
            return Err(Error::invalid_operation("write after a failed I/O"));
        }
        Ok(())
    }

    /// Waits for the outstanding write of buffer `index`, if any.
    fn reclaim(&mut self, index: usize) -> Result<()> {
        match self.pool.buffer_at(index).pending().copied() {
            Some(request) => self.wait_on(&[request]),
            None => Ok(()),
        }
    }

    fn wait_all(&mut self) -> Result<()> {
        let pending = self.pool.pending_requests();
        if pending.is_empty() {
            return Ok(());
        }
        self.wait_on(&pending)
    }

    /// Waits for `requests` and returns their buffers to the idle state. The
    /// context retires the requests even when the wait fails.
    fn wait_on(&mut self, requests: &[PendingRequest]) -> Result<()> {
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("wait after close"))?;
        let result = context.wait(requests);
        for request in requests {
            let buffer = self.pool.buffer_at_mut(request.buffer_index);
            buffer.take_pending();
            buffer.mark_idle()?;
        }
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn finish(&mut self) -> Result<()> {
        if self.failed {
            return Err(Error::invalid_operation("close after a failed I/O"));
        }
        self.flush()?;

        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::invalid_operation("close of a released file"))?;
        if self.physical_end > self.position {
            file.set_len(self.position)
                .map_err(|e| Error::io(path_str(&self.path), e))?;
        }
        file.sync_all()
            .map_err(|e| Error::io(path_str(&self.path), e))
    }

    fn release(&mut self) {
        // Blocks until the OS no longer reads from the staging buffers.
        drop(self.context.take());
        self.pool.abandon_requests();
        self.file = None;
    }
}

impl std::io::Write for DirectAsyncWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        DirectAsyncWriter::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        DirectAsyncWriter::flush(self)?;
        Ok(())
    }
}

impl Drop for DirectAsyncWriter {
    fn drop(&mut self) {
        if self.context.is_some() {
            if let Err(e) = self.close() {
                log::error!("Error closing {}: {}", self.path.display(), e);
            }
        }
    }
}

impl std::fmt::Debug for DirectAsyncWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectAsyncWriter")
            .field("path", &self.path)
            .field("io_mode", &self.io_mode)
            .field("backend", &self.backend)
            .field("position", &self.position)
            .field("file_offset", &self.file_offset)
            .field("submissions", &self.submissions)
            .finish()
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}
