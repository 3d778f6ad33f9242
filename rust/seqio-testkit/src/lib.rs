//! Test utilities and helpers for the seqio crates.
//!
//! - Data generation: deterministic byte streams for round-trip checks
//! - Scratch directories and file comparison helpers

pub mod data_gen;
pub mod dirs;
