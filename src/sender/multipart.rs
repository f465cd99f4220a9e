//! Background multipart uploads.
//!
//! A [`MultipartUploader`] drives one S3 multipart session:
//!
//! ```text
//! NotStarted -> Starting -> Started -> Finishing -> Finished
//!                   \           \           \
//!                    +-----------+-----------+--> Aborted
//! ```
//!
//! [`start`](MultipartUploader::start) opens the session on a background
//! thread and returns at once, so parts can be enqueued before the session id
//! exists. Each part is uploaded on its own background thread, which waits for
//! the session id before issuing its request. At most [`MAX_PENDING_PARTS`]
//! parts are pending at once: `enqueue_part` blocks until a slot frees up, so
//! neither threads nor buffered payloads grow past the ceiling. The ceiling
//! protects the backend and is independent of the sender's destination
//! concurrency.
//!
//! Part failures are recorded, not raised: the next
//! [`enqueue_part`](MultipartUploader::enqueue_part) is rejected with the
//! recorded error, and [`finish`](MultipartUploader::finish) aborts the session
//! and raises it (or an aggregate of every failure). Errors from aborting are
//! logged and never raised.

use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use crate::storage::{CompletedPart, S3Client};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Most parts pending (queued or in flight) at once for one session.
pub const MAX_PENDING_PARTS: usize = 100;

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    NotStarted,
    Starting,
    Started,
    Finishing,
    Finished,
    Aborted,
}

#[derive(Debug)]
struct UploadState {
    phase: UploadPhase,
    upload_id: Option<String>,
    start_error: Option<ConnectorError>,
    /// Parts enqueued and not yet settled.
    pending: usize,
    /// Parts whose request has been issued and not yet answered.
    in_flight: usize,
    parts: Vec<CompletedPart>,
    errors: Vec<ConnectorError>,
    /// Workers whose part has settled and whose thread can be joined.
    settled: Vec<u64>,
}

impl UploadState {
    fn session_unknown(&self) -> bool {
        self.upload_id.is_none() && self.start_error.is_none()
    }

    fn failed(&self) -> Option<&ConnectorError> {
        self.start_error.as_ref().or(self.errors.first())
    }
}

struct Shared {
    state: Mutex<UploadState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, UploadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, UploadState>,
        condition: impl FnMut(&mut UploadState) -> bool,
    ) -> MutexGuard<'a, UploadState> {
        self.changed
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles a part when its worker exits, even by panic.
struct PartGuard<'a> {
    shared: &'a Shared,
    worker: u64,
    part_number: i32,
    issued: bool,
}

impl Drop for PartGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if self.issued {
            state.in_flight -= 1;
        }
        state.pending -= 1;
        state.settled.push(self.worker);
        if thread::panicking() {
            state.errors.push(ConnectorError::new(
                ErrorKind::Other,
                format!("upload of part {} panicked", self.part_number),
            ));
        }
        drop(state);
        self.shared.changed.notify_all();
    }
}

/// One multipart upload session against an [`S3Client`].
///
/// Dropping a started, unfinished uploader aborts its session.
pub struct MultipartUploader<C: S3Client + ?Sized + 'static> {
    client: Arc<C>,
    bucket: String,
    key: String,
    shared: Arc<Shared>,
    starter: Option<JoinHandle<()>>,
    workers: Vec<(u64, JoinHandle<()>)>,
    next_worker: u64,
}

impl<C: S3Client + ?Sized + 'static> MultipartUploader<C> {
    pub fn new(client: Arc<C>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(UploadState {
                    phase: UploadPhase::NotStarted,
                    upload_id: None,
                    start_error: None,
                    pending: 0,
                    in_flight: 0,
                    parts: Vec::new(),
                    errors: Vec::new(),
                    settled: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
            starter: None,
            workers: Vec::new(),
            next_worker: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> UploadPhase {
        self.shared.lock().phase
    }

    /// The session id, once the backend has issued one.
    #[must_use]
    pub fn upload_id(&self) -> Option<String> {
        self.shared.lock().upload_id.clone()
    }

    /// Open the session in the background.
    ///
    /// A failure to open is stored and raised by the first part or
    /// [`finish`](Self::finish) that needs the session id.
    ///
    /// # Errors
    /// Returns an `InvalidInput` error if the uploader was already started,
    /// or an I/O error if the background thread cannot be spawned.
    pub fn start(&mut self) -> ConnectorResult<()> {
        {
            let mut state = self.shared.lock();
            if state.phase != UploadPhase::NotStarted {
                return Err(ConnectorError::new(
                    ErrorKind::InvalidInput,
                    format!("upload of {}/{} already started", self.bucket, self.key),
                ));
            }
            state.phase = UploadPhase::Starting;
        }

        let client = Arc::clone(&self.client);
        let shared = Arc::clone(&self.shared);
        let (bucket, key) = (self.bucket.clone(), self.key.clone());
        let spawned = thread::Builder::new()
            .name("multipart-start".to_string())
            .spawn(move || {
                let result = client.create_multipart_upload(&bucket, &key);
                let mut state = shared.lock();
                match result {
                    Ok(upload_id) => {
                        debug!(bucket = %bucket, key = %key, upload_id = %upload_id, "started multipart upload");
                        state.upload_id = Some(upload_id);
                        if state.phase == UploadPhase::Starting {
                            state.phase = UploadPhase::Started;
                        }
                    }
                    Err(err) => {
                        warn!(bucket = %bucket, key = %key, error = %err, "failed to start multipart upload");
                        state.start_error = Some(err);
                    }
                }
                drop(state);
                shared.changed.notify_all();
            });
        match spawned {
            Ok(handle) => {
                self.starter = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.lock().phase = UploadPhase::Aborted;
                Err(ConnectorError::io("failed to spawn multipart start thread").with_source(err.to_string()))
            }
        }
    }

    /// Upload a part in the background.
    ///
    /// Blocks while [`MAX_PENDING_PARTS`] parts are pending, then returns as
    /// soon as the part is queued; its outcome is reported by
    /// [`finish`](Self::finish).
    ///
    /// # Errors
    /// Fails without queueing if the uploader is not started, is finishing or
    /// closed, or a previous part (or the session start) already failed.
    pub fn enqueue_part(&mut self, data: Vec<u8>, part_number: i32) -> ConnectorResult<()> {
        let worker = self.next_worker;
        {
            let state = self.shared.lock();
            let mut state = self.shared.wait_while(state, |s| {
                s.pending >= MAX_PENDING_PARTS && s.failed().is_none()
            });
            let settled = std::mem::take(&mut state.settled);
            drop(state);
            self.reap(&settled);

            let mut state = self.shared.lock();
            match state.phase {
                UploadPhase::NotStarted => {
                    return Err(ConnectorError::new(
                        ErrorKind::InvalidInput,
                        "cannot enqueue a part before the upload is started",
                    ));
                }
                UploadPhase::Finishing | UploadPhase::Finished | UploadPhase::Aborted => {
                    return Err(ConnectorError::new(
                        ErrorKind::InvalidInput,
                        format!("cannot enqueue part {part_number}: upload is {:?}", state.phase),
                    ));
                }
                UploadPhase::Starting | UploadPhase::Started => {}
            }
            if let Some(err) = state.failed() {
                return Err(err.clone());
            }
            state.pending += 1;
        }
        self.next_worker += 1;

        let client = Arc::clone(&self.client);
        let shared = Arc::clone(&self.shared);
        let (bucket, key) = (self.bucket.clone(), self.key.clone());
        let spawned = thread::Builder::new()
            .name(format!("multipart-part-{part_number}"))
            .spawn(move || upload_part(&*client, &shared, &bucket, &key, worker, part_number, &data));
        match spawned {
            Ok(handle) => {
                self.workers.push((worker, handle));
                Ok(())
            }
            Err(err) => {
                self.shared.lock().pending -= 1;
                self.shared.changed.notify_all();
                Err(ConnectorError::io(format!("failed to spawn upload thread for part {part_number}"))
                    .with_source(err.to_string()))
            }
        }
    }

    /// Wait for every queued part, then complete the session.
    ///
    /// Parts are submitted in ascending part-number order whatever order they
    /// finished in. If any part failed the session is aborted instead.
    ///
    /// # Errors
    /// Returns the start failure, the single part failure, a `Multipart`
    /// aggregate of several part failures, or the completion failure. Also
    /// fails if the uploader was never started or is already closed.
    pub fn finish(&mut self) -> ConnectorResult<()> {
        let mut state = self.shared.lock();
        match state.phase {
            UploadPhase::Starting | UploadPhase::Started => {}
            phase => {
                return Err(ConnectorError::new(
                    ErrorKind::InvalidInput,
                    format!("cannot finish an upload in phase {phase:?}"),
                ));
            }
        }
        state.phase = UploadPhase::Finishing;
        let mut state = self
            .shared
            .wait_while(state, |s| s.pending > 0 || s.session_unknown());

        if let Some(err) = state.start_error.clone() {
            state.phase = UploadPhase::Aborted;
            return Err(err);
        }
        let Some(upload_id) = state.upload_id.clone() else {
            state.phase = UploadPhase::Aborted;
            return Err(ConnectorError::new(ErrorKind::Other, "multipart upload has no session id"));
        };
        if !state.errors.is_empty() {
            let errors = std::mem::take(&mut state.errors);
            state.phase = UploadPhase::Aborted;
            drop(state);
            self.join_workers();
            self.cancel(&upload_id);
            return Err(ConnectorError::aggregate(errors));
        }
        let mut parts = std::mem::take(&mut state.parts);
        drop(state);
        self.join_workers();

        parts.sort_by_key(|p| p.part_number);
        match self
            .client
            .complete_multipart_upload(&self.bucket, &self.key, &upload_id, &parts)
        {
            Ok(()) => {
                self.shared.lock().phase = UploadPhase::Finished;
                info!(
                    bucket = %self.bucket,
                    key = %self.key,
                    parts = parts.len(),
                    "completed multipart upload"
                );
                Ok(())
            }
            Err(err) => {
                self.shared.lock().phase = UploadPhase::Aborted;
                self.cancel(&upload_id);
                Err(err)
            }
        }
    }

    /// Cancel the session.
    ///
    /// A no-op before [`start`](Self::start) and once finished or aborted.
    /// Waits for queued parts to settle; parts not yet issued are dropped.
    pub fn abort(&mut self) {
        let mut state = self.shared.lock();
        if matches!(
            state.phase,
            UploadPhase::NotStarted | UploadPhase::Finished | UploadPhase::Aborted
        ) {
            return;
        }
        state.phase = UploadPhase::Aborted;
        self.shared.changed.notify_all();
        let state = self
            .shared
            .wait_while(state, |s| s.pending > 0 || s.session_unknown());
        let upload_id = state.upload_id.clone();
        drop(state);
        self.join_workers();
        if let Some(upload_id) = upload_id {
            self.cancel(&upload_id);
        }
    }

    fn cancel(&self, upload_id: &str) {
        match self
            .client
            .abort_multipart_upload(&self.bucket, &self.key, upload_id)
        {
            Ok(()) => info!(bucket = %self.bucket, key = %self.key, upload_id, "aborted multipart upload"),
            Err(err) => warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id,
                error = %err,
                "failed to abort multipart upload"
            ),
        }
    }

    /// Number of part threads not yet joined.
    #[cfg(test)]
    fn live_workers(&self) -> usize {
        self.workers.len()
    }

    /// Join the threads of settled parts; they exit right after settling.
    fn reap(&mut self, settled: &[u64]) {
        if settled.is_empty() {
            return;
        }
        let (done, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.workers)
            .into_iter()
            .partition(|(id, _)| settled.contains(id));
        self.workers = live;
        for (_, handle) in done {
            let _ = handle.join();
        }
    }

    fn join_workers(&mut self) {
        if let Some(handle) = self.starter.take() {
            let _ = handle.join();
        }
        for (_, handle) in self.workers.drain(..) {
            // A panicking part is already recorded by its guard.
            let _ = handle.join();
        }
        self.shared.lock().settled.clear();
    }
}

fn upload_part<C: S3Client + ?Sized>(
    client: &C,
    shared: &Shared,
    bucket: &str,
    key: &str,
    worker: u64,
    part_number: i32,
    data: &[u8],
) {
    let mut guard = PartGuard {
        shared,
        worker,
        part_number,
        issued: false,
    };
    let mut state = shared.wait_while(shared.lock(), |s| {
        s.phase != UploadPhase::Aborted && (s.session_unknown() || s.in_flight >= MAX_PENDING_PARTS)
    });
    if state.phase == UploadPhase::Aborted || state.start_error.is_some() {
        return;
    }
    let Some(upload_id) = state.upload_id.clone() else {
        return;
    };
    state.in_flight += 1;
    guard.issued = true;
    drop(state);

    let result = client.upload_part(bucket, key, &upload_id, part_number, data);
    let mut state = shared.lock();
    match result {
        Ok(e_tag) => {
            debug!(key, part_number, bytes = data.len(), "uploaded part");
            state.parts.push(CompletedPart { part_number, e_tag });
        }
        Err(err) => {
            warn!(key, part_number, error = %err, "part upload failed");
            state.errors.push(ConnectorError {
                message: format!("part {part_number}: {}", err.message),
                ..err
            });
        }
    }
}

impl<C: S3Client + ?Sized + 'static> Drop for MultipartUploader<C> {
    fn drop(&mut self) {
        if matches!(
            self.phase(),
            UploadPhase::Starting | UploadPhase::Started | UploadPhase::Finishing
        ) {
            warn!(bucket = %self.bucket, key = %self.key, "dropping unfinished multipart upload");
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FakeS3Client, S3Call};
    use std::time::Duration;

    fn uploader(s3: &FakeS3Client) -> MultipartUploader<FakeS3Client> {
        MultipartUploader::new(Arc::new(s3.clone()), "bucket", "out/key")
    }

    #[test]
    fn completes_with_sorted_parts() {
        let s3 = FakeS3Client::new();
        let mut up = uploader(&s3);
        up.start().unwrap();
        for n in [3, 1, 2] {
            up.enqueue_part(format!("p{n}").into_bytes(), n).unwrap();
        }
        up.finish().unwrap();
        assert_eq!(up.phase(), UploadPhase::Finished);
        assert_eq!(s3.object("bucket/out/key").unwrap(), b"p1p2p3");
        let completes: Vec<S3Call> = s3
            .calls()
            .into_iter()
            .filter(|c| matches!(c, S3Call::CompleteMultipartUpload { .. }))
            .collect();
        assert_eq!(completes.len(), 1);
        assert!(matches!(
            &completes[0],
            S3Call::CompleteMultipartUpload { part_numbers, .. } if part_numbers == &vec![1, 2, 3]
        ));
    }

    #[test]
    fn part_failure_aborts_once() {
        let s3 = FakeS3Client::new();
        s3.fail_part(2);
        let mut up = uploader(&s3);
        up.start().unwrap();
        up.enqueue_part(b"a".to_vec(), 1).unwrap();
        up.enqueue_part(b"b".to_vec(), 2).unwrap();
        let err = up.finish().unwrap_err();
        assert!(err.message.contains("part 2"));
        assert_eq!(up.phase(), UploadPhase::Aborted);
        drop(up);
        assert_eq!(s3.count_calls(|c| matches!(c, S3Call::AbortMultipartUpload { .. })), 1);
        assert_eq!(s3.count_calls(|c| matches!(c, S3Call::CompleteMultipartUpload { .. })), 0);
        assert_eq!(s3.open_uploads(), 0);
    }

    #[test]
    fn several_failures_are_aggregated() {
        let s3 = FakeS3Client::new();
        s3.fail_part(1);
        s3.fail_part(2);
        let mut up = uploader(&s3);
        up.start().unwrap();
        up.enqueue_part(b"a".to_vec(), 1).unwrap();
        up.enqueue_part(b"b".to_vec(), 2).unwrap();
        let err = up.finish().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Multipart);
    }

    #[test]
    fn enqueue_after_failure_is_rejected() {
        let s3 = FakeS3Client::new();
        s3.fail_part(1);
        let mut up = uploader(&s3);
        up.start().unwrap();
        up.enqueue_part(b"a".to_vec(), 1).unwrap();
        // Wait for the failing part to settle.
        let settled = up.shared.wait_while(up.shared.lock(), |s| s.pending > 0);
        drop(settled);
        assert!(up.enqueue_part(b"b".to_vec(), 2).is_err());
        assert!(up.finish().is_err());
    }

    #[test]
    fn start_failure_surfaces_on_finish() {
        let s3 = FakeS3Client::new();
        s3.fail_create_multipart();
        let mut up = uploader(&s3);
        up.start().unwrap();
        let _ = up.enqueue_part(b"a".to_vec(), 1);
        let err = up.finish().unwrap_err();
        assert!(err.message.contains("create_multipart_upload"));
        assert_eq!(s3.count_calls(|c| matches!(c, S3Call::UploadPart { .. })), 0);
    }

    #[test]
    fn enqueue_after_finish_is_rejected() {
        let s3 = FakeS3Client::new();
        let mut up = uploader(&s3);
        up.start().unwrap();
        up.enqueue_part(b"a".to_vec(), 1).unwrap();
        up.finish().unwrap();
        assert_eq!(up.enqueue_part(b"b".to_vec(), 2).unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn abort_is_idempotent_and_swallows_errors() {
        let s3 = FakeS3Client::new();
        s3.fail_abort();
        let mut never_started = uploader(&s3);
        never_started.abort();
        assert_eq!(s3.count_calls(|c| matches!(c, S3Call::AbortMultipartUpload { .. })), 0);

        let mut up = uploader(&s3);
        up.start().unwrap();
        up.abort();
        up.abort();
        assert_eq!(up.phase(), UploadPhase::Aborted);
        assert_eq!(s3.count_calls(|c| matches!(c, S3Call::AbortMultipartUpload { .. })), 1);
    }

    #[test]
    fn drop_aborts_unfinished_session() {
        let s3 = FakeS3Client::new();
        {
            let mut up = uploader(&s3);
            up.start().unwrap();
            up.enqueue_part(b"a".to_vec(), 1).unwrap();
        }
        assert_eq!(s3.count_calls(|c| matches!(c, S3Call::AbortMultipartUpload { .. })), 1);
        assert_eq!(s3.open_uploads(), 0);
    }

    #[test]
    fn pending_parts_and_threads_stay_under_ceiling() {
        let s3 = FakeS3Client::new().with_part_delay(Duration::from_millis(20));
        let mut up = uploader(&s3);
        up.start().unwrap();
        let total = i32::try_from(MAX_PENDING_PARTS).unwrap() * 3;
        for n in 1..=total {
            up.enqueue_part(vec![b'x'], n).unwrap();
            assert!(up.shared.lock().pending <= MAX_PENDING_PARTS);
            assert!(up.live_workers() <= MAX_PENDING_PARTS);
        }
        up.finish().unwrap();
        assert!(s3.max_parts_in_flight() <= MAX_PENDING_PARTS);
        assert_eq!(s3.object("bucket/out/key").unwrap().len(), 300);
        assert_eq!(up.live_workers(), 0);
    }

    #[test]
    fn blocked_enqueue_gives_up_once_a_part_fails() {
        let s3 = FakeS3Client::new().with_part_delay(Duration::from_millis(20));
        let ceiling = i32::try_from(MAX_PENDING_PARTS).unwrap();
        for n in 1..=ceiling {
            s3.fail_part(n);
        }
        let mut up = uploader(&s3);
        up.start().unwrap();
        for n in 1..=ceiling {
            up.enqueue_part(vec![b'x'], n).unwrap();
        }
        // The ceiling is reached, so this waits for a part to settle, and
        // every part fails.
        assert!(up.enqueue_part(vec![b'x'], ceiling + 1).is_err());
        assert_eq!(up.finish().unwrap_err().kind, ErrorKind::Multipart);
        assert_eq!(s3.count_calls(|c| matches!(c, S3Call::UploadPart { .. })), MAX_PENDING_PARTS);
        assert_eq!(s3.open_uploads(), 0);
    }
}
