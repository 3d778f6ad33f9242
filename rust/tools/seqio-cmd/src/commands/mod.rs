//! Command implementations for seqio-cmd

use clap::{Args, ValueEnum};
use seqio_io_impl::{AioBackend, DirectWriterOptions, IoMode};

pub mod checksum;
pub mod copy;
pub mod write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Auto,
    Uring,
    ThreadPool,
}

impl From<BackendArg> for AioBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Auto => AioBackend::Auto,
            BackendArg::Uring => AioBackend::Uring,
            BackendArg::ThreadPool => AioBackend::ThreadPool,
        }
    }
}

/// Direct writer settings shared by the writing commands.
#[derive(Debug, Clone, Args)]
pub struct WriterArgs {
    /// Size of each staging buffer
    #[arg(long, default_value_t = DirectWriterOptions::DEFAULT_CACHE_SIZE)]
    pub cache_size: usize,

    /// Number of staging buffers
    #[arg(long, default_value_t = DirectWriterOptions::DEFAULT_NUM_BUFFERS)]
    pub num_buffers: usize,

    /// Write through the OS page cache
    #[arg(long)]
    pub buffered: bool,

    /// Fail instead of falling back to buffered I/O when direct I/O is refused
    #[arg(long)]
    pub strict: bool,

    /// Asynchronous I/O backend
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    pub backend: BackendArg,

    /// Submission queue depth
    #[arg(long, default_value_t = DirectWriterOptions::DEFAULT_QUEUE_DEPTH)]
    pub queue_depth: usize,

    /// Transfer alignment; queried from the platform when omitted
    #[arg(long)]
    pub alignment: Option<usize>,
}

impl WriterArgs {
    pub fn to_options(&self) -> DirectWriterOptions {
        let io_mode = if self.buffered {
            IoMode::Buffered
        } else {
            IoMode::Unbuffered
        };
        let mut options = DirectWriterOptions::new(self.cache_size, self.num_buffers)
            .with_io_mode(io_mode)
            .with_backend(self.backend.into())
            .with_queue_depth(self.queue_depth)
            .with_buffered_fallback(!self.strict);
        options.alignment = self.alignment;
        options
    }
}

#[cfg(test)]
pub(crate) fn test_writer_args() -> WriterArgs {
    WriterArgs {
        cache_size: 64 * 1024,
        num_buffers: 3,
        buffered: false,
        strict: false,
        backend: BackendArg::Auto,
        queue_depth: 16,
        alignment: Some(4096),
    }
}
