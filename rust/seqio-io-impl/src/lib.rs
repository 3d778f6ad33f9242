//! Unbuffered, asynchronous sequential file writing.
//!
//! [`DirectAsyncWriter`] stages caller data in a ring of sector-aligned buffers
//! and hands full buffers to an [`aio::AsyncIoContext`], so that filling one
//! buffer overlaps with the transfer of the others.

pub mod aio;
pub mod buffer_pool;
pub mod direct_writer;
pub mod fs;
pub mod options;

pub use aio::AioBackend;
pub use direct_writer::{DirectAsyncWriter, WriteSummary};
pub use fs::IoMode;
pub use options::DirectWriterOptions;

#[cfg(test)]
mod tests;
