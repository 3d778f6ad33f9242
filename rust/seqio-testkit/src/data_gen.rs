//! Data generation utilities for testing.
//!
//! All generators are deterministic for a given seed so that a failed
//! round-trip can be reproduced.

/// Generates `len` pseudo-random bytes from `seed`.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data);
    data
}

/// Generates `len` bytes where each byte encodes its own position modulo 251.
///
/// The prime modulus keeps the pattern from lining up with power-of-two
/// buffer boundaries, so misplaced chunks are detectable.
pub fn position_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Splits `data` into consecutive chunks of random lengths in `1..=max_chunk`.
pub fn random_chunks(data: &[u8], max_chunk: usize, seed: u64) -> Vec<&[u8]> {
    assert_ne!(max_chunk, 0);
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut chunks = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let n = rng.usize(1..=max_chunk).min(rest.len());
        let (head, tail) = rest.split_at(n);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Streaming source of pseudo-random bytes, for producing large files without
/// materializing them in memory.
pub struct RandomStream {
    rng: fastrand::Rng,
}

impl RandomStream {
    pub fn new(seed: u64) -> RandomStream {
        RandomStream {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        self.rng.fill(buf);
    }
}
