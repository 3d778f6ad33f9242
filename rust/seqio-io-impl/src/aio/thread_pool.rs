//! Thread-pool backend: each submission becomes a positional write job.

use std::{
    collections::HashMap,
    fs::File,
    sync::{Arc, mpsc},
};

use seqio_common::{Result, error::Error};
use seqio_io::file::file_write_once_at;

use super::{AsyncIoContext, PendingRequest, RequestToken, check_completion};

type Completion = (u64, std::io::Result<usize>);

/// Writes executed on a private pool of worker threads.
///
/// Jobs run in FIFO order on up to `io_threads` workers, so several writes may
/// be in progress at once and complete in any order. Workers report back over
/// a channel that `wait` drains.
pub struct ThreadPoolContext {
    thread_pool: rayon::ThreadPool,
    file: Arc<File>,
    queue_depth: usize,
    next_token: u64,
    /// Submitted and not yet reported: token -> requested length.
    submitted: HashMap<u64, usize>,
    /// Reported but not yet claimed by `wait`.
    completed: HashMap<u64, std::io::Result<usize>>,
    sender: mpsc::Sender<Completion>,
    receiver: mpsc::Receiver<Completion>,
}

impl ThreadPoolContext {
    pub fn new(
        file: Arc<File>,
        queue_depth: usize,
        io_threads: usize,
    ) -> std::io::Result<ThreadPoolContext> {
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(io_threads.max(1))
            .thread_name(|i| format!("seqio_io_thread_{i}"))
            .build()
            .map_err(std::io::Error::other)?;
        let (sender, receiver) = mpsc::channel();
        Ok(ThreadPoolContext {
            thread_pool,
            file,
            queue_depth,
            next_token: 0,
            submitted: HashMap::new(),
            completed: HashMap::new(),
            sender,
            receiver,
        })
    }

    /// Blocks for the next worker report and parks it.
    fn receive_one(&mut self) -> std::io::Result<()> {
        let (token, res) = self
            .receiver
            .recv()
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
        if self.submitted.remove(&token).is_some() {
            self.completed.insert(token, res);
        }
        Ok(())
    }

    fn is_known(&self, token: RequestToken) -> bool {
        self.submitted.contains_key(&token.0) || self.completed.contains_key(&token.0)
    }
}

/// Raw buffer address moved into a worker job.
struct SendPtr(*const u8);

// The submitter guarantees the memory outlives the job.
unsafe impl Send for SendPtr {}

impl SendPtr {
    fn get(&self) -> *const u8 {
        self.0
    }
}

impl AsyncIoContext for ThreadPoolContext {
    fn name(&self) -> &'static str {
        "thread-pool"
    }

    unsafe fn submit(&mut self, buf: *const u8, len: usize, offset: u64) -> Result<RequestToken> {
        if self.submitted.len() >= self.queue_depth {
            return Err(Error::submit(
                offset,
                len,
                std::io::Error::new(std::io::ErrorKind::WouldBlock, "submission queue full"),
            ));
        }

        let token = self.next_token;
        self.next_token += 1;
        self.submitted.insert(token, len);

        let ptr = SendPtr(buf);
        let file = self.file.clone();
        let sender = self.sender.clone();
        self.thread_pool.spawn_fifo(move || {
            // SAFETY: the submitter keeps `len` bytes at `ptr` alive and unmodified
            // until this job has reported back.
            let data = unsafe { std::slice::from_raw_parts(ptr.get(), len) };
            let res = file_write_once_at(&file, offset, data);
            let _ = sender.send((token, res));
        });
        log::debug!("Submitted write {} (offset {}, len {})", token, offset, len);
        Ok(RequestToken(token))
    }

    fn wait(&mut self, requests: &[PendingRequest]) -> Result<()> {
        let known = requests.iter().filter(|r| self.is_known(r.token)).count();
        if known != requests.len() {
            return Err(Error::completion_count(requests.len(), known));
        }

        while requests
            .iter()
            .any(|r| !self.completed.contains_key(&r.token.0))
        {
            self.receive_one()
                .map_err(|e| Error::io("thread pool wait", e))?;
        }

        let mut first_error = None;
        for request in requests {
            let result = match self.completed.remove(&request.token.0) {
                Some(res) => check_completion(request, res),
                None => Err(Error::completion_count(requests.len(), 0)),
            };
            if let Err(e) = result {
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

impl Drop for ThreadPoolContext {
    fn drop(&mut self) {
        // Workers read from caller memory until they report back.
        while !self.submitted.is_empty() {
            if self.receive_one().is_err() {
                std::process::abort();
            }
        }
    }
}
