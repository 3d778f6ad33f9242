//! io_uring backend.

use std::{
    collections::HashMap,
    fs::File,
    os::fd::AsRawFd,
    sync::Arc,
};

use io_uring::{IoUring, Probe, opcode, types};
use seqio_common::{Result, error::Error};

use super::{AsyncIoContext, PendingRequest, RequestToken, check_completion};

/// Writes submitted through a private io_uring instance.
///
/// Each request carries its token in the SQE `user_data`. Completions that
/// arrive for requests other than the ones being waited on are parked until
/// their own `wait`.
pub struct UringContext {
    ring: IoUring,
    file: Arc<File>,
    queue_depth: usize,
    next_token: u64,
    /// Submitted and not yet reaped: token -> requested length.
    submitted: HashMap<u64, usize>,
    /// Reaped but not yet claimed by `wait`: token -> CQE result.
    completed: HashMap<u64, i32>,
}

// The ring and the descriptor are kernel resources without thread affinity,
// and every access goes through `&mut self`.
unsafe impl Send for UringContext {}

impl UringContext {
    /// Sets up a ring with `queue_depth` submission entries.
    ///
    /// Fails when the kernel (or a seccomp sandbox) refuses `io_uring_setup`,
    /// or does not support `IORING_OP_WRITE`.
    pub fn new(file: Arc<File>, queue_depth: usize) -> std::io::Result<UringContext> {
        let entries = u32::try_from(queue_depth.max(1))
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
        let ring = IoUring::new(entries)?;

        let mut probe = Probe::new();
        ring.submitter().register_probe(&mut probe)?;
        if !probe.is_supported(opcode::Write::CODE) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "io_uring WRITE not supported",
            ));
        }

        Ok(UringContext {
            ring,
            file,
            queue_depth,
            next_token: 0,
            submitted: HashMap::new(),
            completed: HashMap::new(),
        })
    }

    /// Moves queued SQEs to the kernel, retrying on `EINTR`.
    fn submit_queued(&mut self) -> std::io::Result<()> {
        loop {
            match self.ring.submit() {
                Ok(_) => return Ok(()),
                Err(ref e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Blocks until at least `count` completions are available, retrying on `EINTR`.
    fn submit_and_wait(&mut self, count: usize) -> std::io::Result<()> {
        loop {
            match self.ring.submit_and_wait(count) {
                Ok(_) => return Ok(()),
                Err(ref e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Moves every available CQE into the parked completions.
    fn reap(&mut self) {
        for cqe in self.ring.completion() {
            let token = cqe.user_data();
            if self.submitted.remove(&token).is_some() {
                self.completed.insert(token, cqe.result());
            } else {
                log::warn!("Discarding completion for unknown request {}", token);
            }
        }
    }

    fn is_known(&self, token: RequestToken) -> bool {
        self.submitted.contains_key(&token.0) || self.completed.contains_key(&token.0)
    }

    fn is_complete(&self, requests: &[PendingRequest]) -> bool {
        requests
            .iter()
            .all(|r| self.completed.contains_key(&r.token.0))
    }
}

impl AsyncIoContext for UringContext {
    fn name(&self) -> &'static str {
        "io_uring"
    }

    unsafe fn submit(&mut self, buf: *const u8, len: usize, offset: u64) -> Result<RequestToken> {
        if self.submitted.len() >= self.queue_depth {
            return Err(Error::submit(
                offset,
                len,
                std::io::Error::new(std::io::ErrorKind::WouldBlock, "submission queue full"),
            ));
        }
        let io_len = u32::try_from(len).map_err(|_| {
            Error::submit(
                offset,
                len,
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })?;

        let token = self.next_token;
        let entry = opcode::Write::new(types::Fd(self.file.as_raw_fd()), buf, io_len)
            .offset(offset)
            .build()
            .user_data(token);

        // SAFETY: the caller keeps `buf` alive and unmodified until completion.
        let pushed = unsafe { self.ring.submission().push(&entry) };
        if pushed.is_err() {
            // The SQ ring holds entries the kernel has not consumed yet.
            self.submit_queued()
                .map_err(|e| Error::submit(offset, len, e))?;
            unsafe { self.ring.submission().push(&entry) }.map_err(|_| {
                Error::submit(
                    offset,
                    len,
                    std::io::Error::new(std::io::ErrorKind::WouldBlock, "submission queue full"),
                )
            })?;
        }
        self.next_token += 1;
        self.submitted.insert(token, len);

        self.submit_queued()
            .map_err(|e| Error::submit(offset, len, e))?;
        log::debug!("Submitted write {} (offset {}, len {})", token, offset, len);
        Ok(RequestToken(token))
    }

    fn wait(&mut self, requests: &[PendingRequest]) -> Result<()> {
        let known = requests.iter().filter(|r| self.is_known(r.token)).count();
        if known != requests.len() {
            return Err(Error::completion_count(requests.len(), known));
        }

        self.reap();
        while !self.is_complete(requests) {
            let outstanding = requests
                .iter()
                .filter(|r| !self.completed.contains_key(&r.token.0))
                .count();
            if let Err(e) = self.submit_and_wait(outstanding) {
                return Err(Error::io("io_uring wait", e));
            }
            self.reap();
        }

        let mut first_error = None;
        for request in requests {
            let Some(res) = self.completed.remove(&request.token.0) else {
                first_error.get_or_insert_with(|| Error::completion_count(requests.len(), 0));
                continue;
            };
            let res = if res < 0 {
                Err(std::io::Error::from_raw_os_error(-res))
            } else {
                Ok(res as usize)
            };
            if let Err(e) = check_completion(request, res) {
                first_error.get_or_insert(e);
            }
        }
        log::debug!("Completed {} write(s)", requests.len());
        first_error.map_or(Ok(()), Err)
    }

    fn in_flight(&self) -> usize {
        self.submitted.len() + self.completed.len()
    }
}

impl Drop for UringContext {
    fn drop(&mut self) {
        // The kernel reads from caller memory until each write completes.
        while !self.submitted.is_empty() {
            let remaining = self.submitted.len();
            if self.submit_and_wait(remaining).is_err() {
                std::process::abort();
            }
            self.reap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(token: RequestToken, index: usize, len: usize) -> PendingRequest {
        PendingRequest {
            token,
            buffer_index: index,
            offset: (index * len) as u64,
            len,
            logical_len: len,
        }
    }

    #[test]
    fn test_out_of_order_completions_are_parked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let file = Arc::new(std::fs::File::create(&path).unwrap());
        let mut context = match UringContext::new(file, 8) {
            Ok(context) => context,
            Err(e) => {
                eprintln!("skipping: io_uring unavailable: {}", e);
                return;
            }
        };

        let blocks: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i + 1; 4096]).collect();
        let requests: Vec<PendingRequest> = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let offset = (i * block.len()) as u64;
                let token = unsafe { context.submit(block.as_ptr(), block.len(), offset) }.unwrap();
                pending(token, i, block.len())
            })
            .collect();
        assert_eq!(context.in_flight(), 3);

        // waiting on the last write leaves the other two parked or in flight
        context.wait(&requests[2..]).unwrap();
        assert_eq!(context.in_flight(), 2);

        context.wait(&requests[..1]).unwrap();
        assert_eq!(context.in_flight(), 1);
        // a retired request is no longer known
        assert!(context.wait(&requests[..1]).is_err());

        context.wait(&requests[1..2]).unwrap();
        assert_eq!(context.in_flight(), 0);

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content, blocks.concat());
    }
}
