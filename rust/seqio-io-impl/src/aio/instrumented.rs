//! A context decorator that records what the writer asks of the OS.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use seqio_common::Result;

use super::{AsyncIoContext, PendingRequest, RequestToken};

/// Offset and length of one submitted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub offset: u64,
    pub len: usize,
}

/// Counters collected by [`InstrumentedContext`].
#[derive(Debug, Default, Clone)]
pub struct IoStats {
    /// Every submission, in issue order.
    pub submissions: Vec<SubmissionRecord>,
    /// Number of `wait` calls.
    pub waits: usize,
    /// Highest number of requests outstanding at once.
    pub max_in_flight: usize,
    /// Submissions whose memory overlapped a request still in flight.
    pub overlapping_submissions: usize,
    /// Requests whose buffer changed between submission and completion.
    pub modified_in_flight: usize,
}

struct Outstanding {
    addr: usize,
    len: usize,
    hash: u64,
}

/// Wraps another context and records submissions, waits and buffer misuse.
///
/// The content of every submitted buffer is hashed at submission and again
/// when its completion is awaited, which detects a buffer refilled while the
/// OS may still be reading from it. The statistics are shared through an
/// `Arc`, so they stay readable after the context has been moved into a writer.
pub struct InstrumentedContext {
    inner: Box<dyn AsyncIoContext>,
    stats: Arc<Mutex<IoStats>>,
    outstanding: HashMap<RequestToken, Outstanding>,
}

impl InstrumentedContext {
    pub fn new(inner: Box<dyn AsyncIoContext>) -> InstrumentedContext {
        InstrumentedContext {
            inner,
            stats: Arc::new(Mutex::new(IoStats::default())),
            outstanding: HashMap::new(),
        }
    }

    /// Shared handle to the collected statistics.
    pub fn stats(&self) -> Arc<Mutex<IoStats>> {
        self.stats.clone()
    }

    fn lock_stats(&self) -> MutexGuard<'_, IoStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// # Safety
///
/// `addr..addr + len` must be readable.
unsafe fn hash_memory(addr: usize, len: usize) -> u64 {
    let data = unsafe { std::slice::from_raw_parts(addr as *const u8, len) };
    xxhash_rust::xxh3::xxh3_64(data)
}

impl AsyncIoContext for InstrumentedContext {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    unsafe fn submit(&mut self, buf: *const u8, len: usize, offset: u64) -> Result<RequestToken> {
        let addr = buf as usize;
        let overlaps = self
            .outstanding
            .values()
            .any(|o| addr < o.addr + o.len && o.addr < addr + len);
        // SAFETY: forwarded from the caller's contract.
        let hash = unsafe { hash_memory(addr, len) };
        let token = unsafe { self.inner.submit(buf, len, offset) }?;
        self.outstanding.insert(token, Outstanding { addr, len, hash });

        let in_flight = self.outstanding.len();
        let mut stats = self.lock_stats();
        stats.submissions.push(SubmissionRecord { offset, len });
        stats.max_in_flight = stats.max_in_flight.max(in_flight);
        if overlaps {
            stats.overlapping_submissions += 1;
        }
        Ok(token)
    }

    fn wait(&mut self, requests: &[PendingRequest]) -> Result<()> {
        let mut modified = 0;
        for request in requests {
            if let Some(o) = self.outstanding.remove(&request.token) {
                // SAFETY: the memory stays valid until this wait reports completion.
                if unsafe { hash_memory(o.addr, o.len) } != o.hash {
                    modified += 1;
                }
            }
        }
        {
            let mut stats = self.lock_stats();
            stats.waits += 1;
            stats.modified_in_flight += modified;
        }
        self.inner.wait(requests)
    }

    fn in_flight(&self) -> usize {
        self.inner.in_flight()
    }
}
