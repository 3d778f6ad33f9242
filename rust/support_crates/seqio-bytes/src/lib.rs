//! Aligned memory primitives for unbuffered I/O.
//!
//! - [`align`]: power-of-two rounding helpers.
//! - [`AlignedBuf`]: an owned, fixed-capacity, zero-initialized allocation whose
//!   start address honors a caller-specified alignment.

pub mod align;
pub mod aligned_buf;

pub use aligned_buf::AlignedBuf;
