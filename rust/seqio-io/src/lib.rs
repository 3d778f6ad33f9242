//! Buffered sequential file access:
//! - `CachedReader`: sequential reader serving reads from a pre-fetched chunk of the file.
//! - `CachedWriter`: sequential writer accumulating small writes into a single cache buffer.
//!
//! Also hosts the positional read/write helpers shared with the unbuffered
//! writers in `seqio-io-impl`.

pub mod cached_read;
pub mod cached_write;
pub mod file;

pub use cached_read::CachedReader;
pub use cached_write::CachedWriter;
