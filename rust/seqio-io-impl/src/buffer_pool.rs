//! A fixed ring of sector-aligned staging buffers.

use seqio_bytes::{AlignedBuf, align::align_up_usize};
use seqio_common::{Result, error::Error, verify_arg};

use crate::aio::PendingRequest;

/// Lifecycle of a [`StagingBuffer`].
///
/// `Idle -> Filling` on the first copy, `Filling -> Submitted` when handed to
/// the async context, `Submitted -> Idle` once its completion has been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Idle,
    Filling,
    Submitted,
}

/// One aligned buffer of the pool, plus its fill level and outstanding request.
pub struct StagingBuffer {
    data: AlignedBuf,
    filled: usize,
    state: BufferState,
    pending: Option<PendingRequest>,
}

impl StagingBuffer {
    fn new(capacity: usize, alignment: usize) -> Result<StagingBuffer> {
        let data = AlignedBuf::zeroed(capacity, alignment)
            .map_err(|_| Error::allocation(capacity, alignment))?;
        Ok(StagingBuffer {
            data,
            filled: 0,
            state: BufferState::Idle,
            pending: None,
        })
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.capacity()
    }

    /// The request currently reading from this buffer, if any.
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Base address of the buffer, aligned to the pool alignment.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// The filled prefix of the buffer.
    pub fn contents(&self) -> &[u8] {
        &self.data.as_slice()[..self.filled]
    }

    /// Copies as much of `src` as fits and returns the number of bytes taken.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the buffer is `Submitted`.
    pub fn fill_from(&mut self, src: &[u8]) -> Result<usize> {
        if self.state == BufferState::Submitted {
            return Err(Error::invalid_operation("fill of a submitted buffer"));
        }
        let n = src.len().min(self.remaining());
        if n == 0 {
            return Ok(0);
        }
        self.data.as_mut_slice()[self.filled..self.filled + n].copy_from_slice(&src[..n]);
        self.filled += n;
        self.state = BufferState::Filling;
        Ok(n)
    }

    /// Zeroes the bytes between the fill level and the next multiple of the
    /// alignment, and returns that padded length. The fill level is unchanged.
    pub fn pad_to_alignment(&mut self) -> usize {
        let padded = align_up_usize(self.filled, self.data.alignment()).min(self.capacity());
        self.data.as_mut_slice()[self.filled..padded].fill(0);
        padded
    }

    /// Records `request` as reading from this buffer.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the buffer is not `Filling` or already owns a request.
    pub fn mark_submitted(&mut self, request: PendingRequest) -> Result<()> {
        if self.state != BufferState::Filling || self.pending.is_some() {
            return Err(Error::invalid_operation("submit of a buffer that is not filling"));
        }
        self.pending = Some(request);
        self.state = BufferState::Submitted;
        Ok(())
    }

    /// Detaches the outstanding request, leaving the buffer `Submitted` until
    /// [`mark_idle`](Self::mark_idle).
    pub fn take_pending(&mut self) -> Option<PendingRequest> {
        self.pending.take()
    }

    /// Returns the buffer to `Idle` with nothing filled.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if a request still reads from the buffer.
    pub fn mark_idle(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::invalid_operation("reuse of a buffer with an outstanding request"));
        }
        self.filled = 0;
        self.state = BufferState::Idle;
        Ok(())
    }
}

impl std::fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("capacity", &self.capacity())
            .field("filled", &self.filled)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .finish()
    }
}

/// `N` staging buffers of equal capacity, used round-robin.
#[derive(Debug)]
pub struct AlignedBufferPool {
    buffers: Vec<StagingBuffer>,
    capacity: usize,
    alignment: usize,
}

impl AlignedBufferPool {
    /// Allocates `num_buffers` zeroed buffers of `capacity` bytes each, every one
    /// of them starting at a multiple of `alignment`.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` for fewer than two buffers, a zero capacity or a
    ///   non-power-of-two alignment.
    /// * `Allocation` if the memory cannot be obtained.
    pub fn new(num_buffers: usize, capacity: usize, alignment: usize) -> Result<AlignedBufferPool> {
        verify_arg!(num_buffers, num_buffers >= 2);
        verify_arg!(capacity, capacity > 0);
        verify_arg!(alignment, alignment.is_power_of_two());
        let buffers = (0..num_buffers)
            .map(|_| StagingBuffer::new(capacity, alignment))
            .collect::<Result<Vec<_>>>()?;
        Ok(AlignedBufferPool {
            buffers,
            capacity,
            alignment,
        })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// # Panics
    ///
    /// If `index >= len()`.
    pub fn buffer_at(&self, index: usize) -> &StagingBuffer {
        &self.buffers[index]
    }

    /// # Panics
    ///
    /// If `index >= len()`.
    pub fn buffer_at_mut(&mut self, index: usize) -> &mut StagingBuffer {
        &mut self.buffers[index]
    }

    /// The buffer that follows `index` in the ring.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.buffers.len()
    }

    /// Number of buffers with an outstanding request.
    pub fn in_flight_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.pending.is_some()).count()
    }

    /// Outstanding requests of all buffers, in ring order.
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        self.buffers.iter().filter_map(|b| b.pending).collect()
    }

    /// Copies the filled bytes `range` of buffer `from` into the start of the
    /// idle buffer `to`, which becomes `Filling`.
    pub fn carry_over(&mut self, from: usize, to: usize, range: std::ops::Range<usize>) -> Result<()> {
        verify_arg!(from, from < self.buffers.len());
        verify_arg!(to, from != to && to < self.buffers.len());
        let (src, dst) = if from < to {
            let (head, tail) = self.buffers.split_at_mut(to);
            (&head[from], &mut tail[0])
        } else {
            let (head, tail) = self.buffers.split_at_mut(from);
            (&tail[0], &mut head[to])
        };
        if dst.state != BufferState::Idle {
            return Err(Error::invalid_operation("carry-over into a busy buffer"));
        }
        dst.fill_from(&src.contents()[range])?;
        Ok(())
    }

    /// Forgets every outstanding request and returns all buffers to `Idle`.
    ///
    /// Only valid once the context that owned the requests has been dropped,
    /// which blocks until the OS no longer reads from the buffers.
    pub(crate) fn abandon_requests(&mut self) {
        for buffer in &mut self.buffers {
            buffer.pending = None;
            buffer.filled = 0;
            buffer.state = BufferState::Idle;
        }
    }
}

impl Drop for AlignedBufferPool {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.in_flight_count(),
            0,
            "buffer pool dropped with outstanding requests"
        );
    }
}
