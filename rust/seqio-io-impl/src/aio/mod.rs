//! Asynchronous submission of positional writes.
//!
//! An [`AsyncIoContext`] is bound to one file when it is created. `submit`
//! enqueues a write and returns immediately; `wait` blocks until a given set
//! of writes has completed. Completion order is not guaranteed.

use std::{fs::File, path::Path, sync::Arc};

use seqio_common::{Result, error::Error};

mod instrumented;
mod thread_pool;
#[cfg(target_os = "linux")]
mod uring;

pub use instrumented::{InstrumentedContext, IoStats, SubmissionRecord};
pub use thread_pool::ThreadPoolContext;
#[cfg(target_os = "linux")]
pub use uring::UringContext;

/// Opaque identifier of a submitted request, unique within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(pub u64);

/// A write that has been submitted and whose completion has not been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub token: RequestToken,
    /// Staging buffer the OS is reading from.
    pub buffer_index: usize,
    pub offset: u64,
    /// Transfer length, including any alignment padding.
    pub len: usize,
    /// Number of caller bytes in the transfer.
    pub logical_len: usize,
}

/// A queue of asynchronous writes against a single file.
///
/// Dropping a context blocks until every submitted request has completed, so
/// the memory handed to [`submit`](Self::submit) may be released afterwards.
pub trait AsyncIoContext: Send {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Enqueues a write of `len` bytes from `buf` at `offset` and returns
    /// without waiting for it.
    ///
    /// # Safety
    ///
    /// `buf` must point to `len` readable bytes that remain valid and unmodified
    /// until [`wait`](Self::wait) has reported the request complete, or until
    /// the context is dropped.
    ///
    /// # Errors
    ///
    /// `Submit` if the request is rejected (queue full, invalid descriptor).
    unsafe fn submit(&mut self, buf: *const u8, len: usize, offset: u64) -> Result<RequestToken>;

    /// Blocks until every request in `requests` has completed.
    ///
    /// # Errors
    ///
    /// * `CompletionCount` if a request is not known to this context.
    /// * `Completion` if the OS reported a failure.
    /// * `ShortWrite` if fewer bytes than requested were transferred.
    ///
    /// All listed requests are retired even when an error is returned.
    fn wait(&mut self, requests: &[PendingRequest]) -> Result<()>;

    /// Number of submitted requests whose completion has not been consumed by `wait`.
    fn in_flight(&self) -> usize;
}

/// Maps the outcome of one write to the error `wait` reports for it.
pub(crate) fn check_completion(
    request: &PendingRequest,
    result: std::io::Result<usize>,
) -> Result<()> {
    match result {
        Ok(n) if n == request.len => Ok(()),
        Ok(n) => Err(Error::short_write(request.offset, request.len, n)),
        Err(e) => Err(Error::completion(request.offset, request.len, e)),
    }
}

/// Selects the [`AsyncIoContext`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AioBackend {
    /// io_uring when the kernel allows it, the thread pool otherwise.
    #[default]
    Auto,
    /// io_uring; setup failure is an error. Linux only.
    Uring,
    /// Positional writes on an owned pool of worker threads.
    ThreadPool,
}

impl std::fmt::Display for AioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AioBackend::Auto => f.write_str("auto"),
            AioBackend::Uring => f.write_str("uring"),
            AioBackend::ThreadPool => f.write_str("thread-pool"),
        }
    }
}

/// Creates a context of the requested kind bound to `file`.
///
/// `path` is only used for error reporting.
pub fn create_context(
    backend: AioBackend,
    file: Arc<File>,
    path: &Path,
    queue_depth: usize,
    io_threads: usize,
) -> Result<Box<dyn AsyncIoContext>> {
    match backend {
        AioBackend::Uring => create_uring(file, path, queue_depth),
        AioBackend::ThreadPool => create_thread_pool(file, path, queue_depth, io_threads),
        AioBackend::Auto => match create_uring(file.clone(), path, queue_depth) {
            Ok(context) => Ok(context),
            Err(e) => {
                log::warn!("io_uring unavailable ({}), using the thread-pool backend", e);
                create_thread_pool(file, path, queue_depth, io_threads)
            }
        },
    }
}

fn create_thread_pool(
    file: Arc<File>,
    path: &Path,
    queue_depth: usize,
    io_threads: usize,
) -> Result<Box<dyn AsyncIoContext>> {
    let context = ThreadPoolContext::new(file, queue_depth, io_threads)
        .map_err(|e| Error::setup("thread pool setup", path.display().to_string(), e))?;
    Ok(Box::new(context))
}

#[cfg(target_os = "linux")]
fn create_uring(
    file: Arc<File>,
    path: &Path,
    queue_depth: usize,
) -> Result<Box<dyn AsyncIoContext>> {
    let context = UringContext::new(file, queue_depth)
        .map_err(|e| Error::setup("io_uring setup", path.display().to_string(), e))?;
    Ok(Box::new(context))
}

#[cfg(not(target_os = "linux"))]
fn create_uring(
    _file: Arc<File>,
    path: &Path,
    _queue_depth: usize,
) -> Result<Box<dyn AsyncIoContext>> {
    Err(Error::setup(
        "io_uring setup",
        path.display().to_string(),
        std::io::Error::from(std::io::ErrorKind::Unsupported),
    ))
}
