use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use seqio_common::{Result, error::Error, error::ErrorKind};
use seqio_testkit::data_gen::{position_pattern, random_bytes, random_chunks};

use crate::{
    AioBackend, DirectAsyncWriter, DirectWriterOptions, IoMode,
    aio::{
        self, AsyncIoContext, InstrumentedContext, IoStats, PendingRequest, RequestToken,
        SubmissionRecord,
    },
    fs,
};

fn instrumented_writer(
    path: &Path,
    options: &DirectWriterOptions,
) -> (DirectAsyncWriter, Arc<Mutex<IoStats>>) {
    let file = Arc::new(fs::create_for_write(path, IoMode::Buffered).unwrap());
    let inner = aio::create_context(
        AioBackend::ThreadPool,
        file.clone(),
        path,
        options.queue_depth,
        2,
    )
    .unwrap();
    let context = InstrumentedContext::new(inner);
    let stats = context.stats();
    let writer = DirectAsyncWriter::from_parts(file, path, options, Box::new(context)).unwrap();
    (writer, stats)
}

fn submissions(stats: &Arc<Mutex<IoStats>>) -> Vec<(u64, usize)> {
    stats
        .lock()
        .unwrap()
        .submissions
        .iter()
        .map(|s| (s.offset, s.len))
        .collect()
}

fn buffered(cache_size: usize, num_buffers: usize) -> DirectWriterOptions {
    DirectWriterOptions::new(cache_size, num_buffers).with_io_mode(IoMode::Buffered)
}

#[test]
fn test_partial_final_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = position_pattern(1500);
    let (mut writer, stats) = instrumented_writer(&path, &buffered(1024, 2));

    writer.write(&data).unwrap();
    assert_eq!(submissions(&stats), vec![(0, 1024)]);
    assert_eq!(writer.position(), 1500);
    assert_eq!(writer.file_offset(), 1024);

    let summary = writer.close().unwrap();
    assert_eq!(submissions(&stats), vec![(0, 1024), (1024, 476)]);
    assert_eq!(summary.logical_size, 1500);
    assert_eq!(summary.submissions, 2);
    assert_eq!(summary.bytes_submitted, 1500);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_in_flight_bounded_by_ring_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = random_bytes(1024 * 1024 + 123, 42);
    let (mut writer, stats) = instrumented_writer(&path, &buffered(4096, 3));

    for chunk in random_chunks(&data, 10_000, 7) {
        writer.write(chunk).unwrap();
        assert!(writer.in_flight() <= 2);
    }
    writer.close().unwrap();

    let stats = stats.lock().unwrap().clone();
    assert_eq!(stats.max_in_flight, 2);
    assert_eq!(stats.modified_in_flight, 0);
    assert_eq!(stats.overlapping_submissions, 0);

    let mut expected_offset = 0;
    for SubmissionRecord { offset, len } in &stats.submissions {
        assert_eq!(*offset, expected_offset);
        expected_offset += *len as u64;
    }
    assert_eq!(expected_offset, data.len() as u64);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_chunking_does_not_change_submissions() {
    let dir = tempfile::tempdir().unwrap();
    let data = random_bytes(50_000, 9);
    let options = buffered(2048, 4);

    let whole_path = dir.path().join("whole.bin");
    let (mut whole, whole_stats) = instrumented_writer(&whole_path, &options);
    whole.write(&data).unwrap();
    whole.close().unwrap();

    let split_path = dir.path().join("split.bin");
    let (mut split, split_stats) = instrumented_writer(&split_path, &options);
    for chunk in random_chunks(&data, 3000, 1) {
        split.write(chunk).unwrap();
    }
    split.close().unwrap();

    assert_eq!(submissions(&whole_stats), submissions(&split_stats));
    assert_eq!(
        std::fs::read(&whole_path).unwrap(),
        std::fs::read(&split_path).unwrap()
    );
}

#[test]
fn test_flush_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (mut writer, stats) = instrumented_writer(&path, &buffered(1024, 2));

    writer.write(&[1u8; 100]).unwrap();
    writer.flush().unwrap();
    assert_eq!(writer.submissions(), 1);
    assert_eq!(writer.in_flight(), 0);
    let waits = stats.lock().unwrap().waits;

    writer.flush().unwrap();
    assert_eq!(writer.submissions(), 1);
    assert_eq!(stats.lock().unwrap().waits, waits);
    assert_eq!(std::fs::read(&path).unwrap(), vec![1u8; 100]);

    writer.write(&[2u8; 50]).unwrap();
    writer.close().unwrap();
    assert_eq!(submissions(&stats), vec![(0, 100), (100, 50)]);
}

#[test]
fn test_unbuffered_tail_is_padded_then_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = position_pattern(1500);
    let options = DirectWriterOptions::new(1024, 2).with_alignment(512);
    let (mut writer, stats) = instrumented_writer(&path, &options);

    writer.write(&data).unwrap();
    let summary = writer.close().unwrap();

    assert_eq!(submissions(&stats), vec![(0, 1024), (1024, 512)]);
    assert_eq!(summary.logical_size, 1500);
    assert_eq!(summary.bytes_submitted, 1536);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_unbuffered_flush_then_continue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = random_bytes(1600, 3);
    let options = DirectWriterOptions::new(1024, 2).with_alignment(512);
    let (mut writer, stats) = instrumented_writer(&path, &options);

    writer.write(&data[..1500]).unwrap();
    writer.flush().unwrap();
    assert_eq!(std::fs::read(&path).unwrap()[..1500], data[..1500]);

    // nothing new since the padded write
    writer.flush().unwrap();
    assert_eq!(writer.submissions(), 2);

    writer.write(&data[1500..]).unwrap();
    writer.close().unwrap();

    // the partial sector at 1024 is written again together with the new bytes
    assert_eq!(
        submissions(&stats),
        vec![(0, 1024), (1024, 512), (1024, 1024)]
    );
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_unbuffered_random_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = random_bytes(300_001, 21);
    let options = DirectWriterOptions::new(8192, 4).with_alignment(4096);
    let (mut writer, stats) = instrumented_writer(&path, &options);

    for (i, chunk) in random_chunks(&data, 20_000, 4).into_iter().enumerate() {
        writer.write(chunk).unwrap();
        if i % 7 == 0 {
            writer.flush().unwrap();
        }
    }
    writer.close().unwrap();

    let stats = stats.lock().unwrap().clone();
    assert!(stats.max_in_flight <= 3);
    assert_eq!(stats.modified_in_flight, 0);
    assert!(
        stats
            .submissions
            .iter()
            .all(|s| s.offset % 4096 == 0 && s.len % 4096 == 0)
    );
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_close_is_idempotent_and_blocks_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (mut writer, stats) = instrumented_writer(&path, &buffered(1024, 2));

    writer.write(b"payload").unwrap();
    let first = writer.close().unwrap();
    let second = writer.close().unwrap();
    assert_eq!(first, second);
    assert_eq!(stats.lock().unwrap().submissions.len(), 1);
    assert!(writer.is_closed());

    let err = writer.write(b"more").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    assert!(writer.flush().is_err());
}

#[test]
fn test_empty_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (mut writer, stats) = instrumented_writer(&path, &buffered(1024, 2));

    writer.write(&[]).unwrap();
    writer.flush().unwrap();
    let summary = writer.close().unwrap();
    assert_eq!(summary.logical_size, 0);
    assert_eq!(summary.submissions, 0);
    assert!(stats.lock().unwrap().submissions.is_empty());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_exact_multiple_of_cache_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = random_bytes(4096, 5);
    let (mut writer, stats) = instrumented_writer(&path, &buffered(1024, 2));

    writer.write(&data).unwrap();
    writer.close().unwrap();
    assert_eq!(
        submissions(&stats),
        vec![(0, 1024), (1024, 1024), (2048, 1024), (3072, 1024)]
    );
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_std_write_adapter() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = random_bytes(10_000, 8);
    let (writer, _stats) = instrumented_writer(&path, &buffered(1024, 2));

    let mut buffered_writer = std::io::BufWriter::with_capacity(300, writer);
    buffered_writer.write_all(&data).unwrap();
    let mut writer = buffered_writer.into_inner().map_err(|e| e.into_error()).unwrap();
    assert_eq!(writer.close().unwrap().logical_size, 10_000);
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

#[test]
fn test_drop_closes_writer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let data = random_bytes(2500, 12);
    {
        let (mut writer, _stats) = instrumented_writer(&path, &buffered(1024, 2));
        writer.write(&data).unwrap();
    }
    assert_eq!(std::fs::read(&path).unwrap(), data);
}

/// Fails every submission when `fail_submit` is set; otherwise accepts every
/// submission and fails every completion.
struct FailingContext {
    fail_submit: bool,
    next_token: u64,
    in_flight: usize,
    submit_calls: Arc<Mutex<usize>>,
}

impl FailingContext {
    fn new(fail_submit: bool) -> (FailingContext, Arc<Mutex<usize>>) {
        let submit_calls = Arc::new(Mutex::new(0));
        let context = FailingContext {
            fail_submit,
            next_token: 0,
            in_flight: 0,
            submit_calls: submit_calls.clone(),
        };
        (context, submit_calls)
    }
}

impl AsyncIoContext for FailingContext {
    fn name(&self) -> &'static str {
        "failing"
    }

    unsafe fn submit(&mut self, _buf: *const u8, len: usize, offset: u64) -> Result<RequestToken> {
        *self.submit_calls.lock().unwrap() += 1;
        if self.fail_submit {
            return Err(Error::submit(
                offset,
                len,
                std::io::Error::other("injected submit failure"),
            ));
        }
        self.next_token += 1;
        self.in_flight += 1;
        Ok(RequestToken(self.next_token))
    }

    fn wait(&mut self, requests: &[PendingRequest]) -> Result<()> {
        self.in_flight -= requests.len();
        let request = &requests[0];
        Err(Error::completion(
            request.offset,
            request.len,
            std::io::Error::other("injected failure"),
        ))
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }
}

fn failing_writer(path: &Path, fail_submit: bool) -> (DirectAsyncWriter, Arc<Mutex<usize>>) {
    let file = Arc::new(fs::create_for_write(path, IoMode::Buffered).unwrap());
    let (context, submit_calls) = FailingContext::new(fail_submit);
    let writer =
        DirectAsyncWriter::from_parts(file, path, &buffered(1024, 2), Box::new(context)).unwrap();
    (writer, submit_calls)
}

#[test]
fn test_completion_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (mut writer, _) = failing_writer(&path, false);

    // the first buffer is submitted; the second submission waits for it and fails
    let err = writer.write(&[0u8; 3000]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Completion { offset: 0, len: 1024, .. }));
    assert_eq!(writer.in_flight(), 0);

    let err = writer.write(b"x").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    assert!(writer.close().is_err());
    assert!(writer.is_closed());
}

#[test]
fn test_submit_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (mut writer, submit_calls) = failing_writer(&path, true);

    let err = writer.write(&[0u8; 1500]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Submit { offset: 0, len: 1024, .. }));
    assert_eq!(writer.submissions(), 0);
    assert_eq!(writer.in_flight(), 0);
    assert_eq!(*submit_calls.lock().unwrap(), 1);

    let err = writer.write(b"x").unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    let err = writer.flush().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    assert_eq!(*submit_calls.lock().unwrap(), 1);
}

#[test]
fn test_failed_close_stays_failed_without_io() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let (mut writer, submit_calls) = failing_writer(&path, false);

    writer.write(&[1u8; 100]).unwrap();
    let err = writer.close().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Completion { offset: 0, len: 100, .. }));
    assert_eq!(*submit_calls.lock().unwrap(), 1);

    for _ in 0..2 {
        let err = writer.close().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
        assert!(err.to_string().contains("injected failure"));
    }
    assert_eq!(*submit_calls.lock().unwrap(), 1);
    assert!(writer.is_closed());
}

#[test]
fn test_invalid_options_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let err = DirectAsyncWriter::create(&path, &DirectWriterOptions::new(1024, 1)).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

    let err = DirectAsyncWriter::create(
        &path,
        &DirectWriterOptions::new(1000, 2).with_alignment(512),
    )
    .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
}
