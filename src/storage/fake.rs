//! In-memory fakes of the remote storage clients.
//!
//! Both fakes are cheap to clone; clones share state, so a test can hand one
//! clone to a connector and inspect the other. Every client call is recorded,
//! and individual operations can be made to fail.

use super::{CompletedPart, DEFAULT_PAGE_SIZE, HdfsClient, ListPage, ObjectEntry, ObjectReader, S3Client};
use super::{clamp_range, paginate, split_bucket_key};
use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

type ObjectStorage = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

fn injected(operation: &str) -> ConnectorError {
    ConnectorError::io(format!("injected failure: {operation}"))
}

fn read_from(storage: &ObjectStorage, path: &str, start: u64, end_inclusive: u64) -> ConnectorResult<Vec<u8>> {
    let storage = storage.lock().expect("storage mutex poisoned");
    let data = storage
        .get(path)
        .ok_or_else(|| ConnectorError::new(ErrorKind::NotFound, format!("{path} not found")))?;
    Ok(data[clamp_range(data.len(), start, end_inclusive)].to_vec())
}

fn list_from(storage: &ObjectStorage, prefix: &str, token: Option<&str>, page_size: usize) -> ListPage {
    let entries: Vec<ObjectEntry> = storage
        .lock()
        .expect("storage mutex poisoned")
        .iter()
        .filter(|(path, _)| path.starts_with(prefix))
        .map(|(path, data)| ObjectEntry::new(path.clone(), data.len() as u64))
        .collect();
    paginate(entries, token, page_size)
}

// ============================================================================
// FakeS3Client
// ============================================================================

/// A recorded [`FakeS3Client`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S3Call {
    EnsureBucket { bucket: String },
    PutObject { bucket: String, key: String },
    CreateMultipartUpload { bucket: String, key: String },
    UploadPart { upload_id: String, part_number: i32 },
    CompleteMultipartUpload { upload_id: String, part_numbers: Vec<i32> },
    AbortMultipartUpload { upload_id: String },
    ReadRange { path: String, start: u64, end_inclusive: u64 },
    List { prefix: String, token: Option<String> },
}

#[derive(Debug, Default)]
struct S3Failures {
    ensure_bucket: bool,
    put: bool,
    create: bool,
    parts: HashSet<i32>,
    complete: bool,
    abort: bool,
}

#[derive(Debug)]
struct Upload {
    path: String,
    parts: BTreeMap<i32, Vec<u8>>,
}

/// In-memory S3. Objects are keyed by `bucket/key`.
#[derive(Clone)]
pub struct FakeS3Client {
    objects: ObjectStorage,
    buckets: Arc<Mutex<HashSet<String>>>,
    uploads: Arc<Mutex<HashMap<String, Upload>>>,
    calls: Arc<Mutex<Vec<S3Call>>>,
    failures: Arc<Mutex<S3Failures>>,
    upload_counter: Arc<AtomicU64>,
    parts_in_flight: Arc<AtomicUsize>,
    max_parts_in_flight: Arc<AtomicUsize>,
    part_delay: Duration,
    page_size: usize,
}

impl Default for FakeS3Client {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeS3Client {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            buckets: Arc::new(Mutex::new(HashSet::new())),
            uploads: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(S3Failures::default())),
            upload_counter: Arc::new(AtomicU64::new(0)),
            parts_in_flight: Arc::new(AtomicUsize::new(0)),
            max_parts_in_flight: Arc::new(AtomicUsize::new(0)),
            part_delay: Duration::ZERO,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every part upload take at least `delay`.
    #[must_use]
    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = delay;
        self
    }

    /// Store an object directly, creating its bucket.
    pub fn insert_object(&self, path: &str, data: impl Into<Vec<u8>>) {
        if let Ok((bucket, _)) = split_bucket_key(path) {
            self.buckets
                .lock()
                .expect("buckets mutex poisoned")
                .insert(bucket.to_string());
        }
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .insert(path.to_string(), data.into());
    }

    #[must_use]
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("storage mutex poisoned").get(path).cloned()
    }

    /// Paths of every stored object, sorted.
    #[must_use]
    pub fn object_paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().expect("buckets mutex poisoned").contains(bucket)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<S3Call> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&S3Call) -> bool) -> usize {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    /// Multipart sessions neither completed nor aborted.
    #[must_use]
    pub fn open_uploads(&self) -> usize {
        self.uploads.lock().expect("uploads mutex poisoned").len()
    }

    /// Highest number of part uploads observed running at once.
    #[must_use]
    pub fn max_parts_in_flight(&self) -> usize {
        self.max_parts_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_ensure_bucket(&self) {
        self.failures.lock().expect("failures mutex poisoned").ensure_bucket = true;
    }

    pub fn fail_put(&self) {
        self.failures.lock().expect("failures mutex poisoned").put = true;
    }

    pub fn fail_create_multipart(&self) {
        self.failures.lock().expect("failures mutex poisoned").create = true;
    }

    pub fn fail_part(&self, part_number: i32) {
        self.failures
            .lock()
            .expect("failures mutex poisoned")
            .parts
            .insert(part_number);
    }

    pub fn fail_complete(&self) {
        self.failures.lock().expect("failures mutex poisoned").complete = true;
    }

    pub fn fail_abort(&self) {
        self.failures.lock().expect("failures mutex poisoned").abort = true;
    }

    fn record(&self, call: S3Call) {
        self.calls.lock().expect("calls mutex poisoned").push(call);
    }

    fn failing(&self, check: impl Fn(&S3Failures) -> bool) -> bool {
        check(&self.failures.lock().expect("failures mutex poisoned"))
    }
}

impl ObjectReader for FakeS3Client {
    fn read_range(&self, path: &str, start: u64, end_inclusive: u64) -> ConnectorResult<Vec<u8>> {
        self.record(S3Call::ReadRange {
            path: path.to_string(),
            start,
            end_inclusive,
        });
        read_from(&self.objects, path, start, end_inclusive)
    }

    fn list(&self, prefix: &str, token: Option<&str>) -> ConnectorResult<ListPage> {
        self.record(S3Call::List {
            prefix: prefix.to_string(),
            token: token.map(str::to_string),
        });
        Ok(list_from(&self.objects, prefix, token, self.page_size))
    }
}

impl S3Client for FakeS3Client {
    fn ensure_bucket(&self, bucket: &str) -> ConnectorResult<()> {
        self.record(S3Call::EnsureBucket {
            bucket: bucket.to_string(),
        });
        if self.failing(|f| f.ensure_bucket) {
            return Err(injected("ensure_bucket"));
        }
        self.buckets
            .lock()
            .expect("buckets mutex poisoned")
            .insert(bucket.to_string());
        Ok(())
    }

    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> ConnectorResult<()> {
        self.record(S3Call::PutObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if self.failing(|f| f.put) {
            return Err(injected("put_object"));
        }
        if !self.has_bucket(bucket) {
            return Err(ConnectorError::new(
                ErrorKind::NotFound,
                format!("bucket {bucket} not found"),
            ));
        }
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .insert(format!("{bucket}/{key}"), data.to_vec());
        Ok(())
    }

    fn create_multipart_upload(&self, bucket: &str, key: &str) -> ConnectorResult<String> {
        self.record(S3Call::CreateMultipartUpload {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if self.failing(|f| f.create) {
            return Err(injected("create_multipart_upload"));
        }
        let upload_id = format!("upload-{}", self.upload_counter.fetch_add(1, Ordering::SeqCst));
        self.uploads.lock().expect("uploads mutex poisoned").insert(
            upload_id.clone(),
            Upload {
                path: format!("{bucket}/{key}"),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        data: &[u8],
    ) -> ConnectorResult<String> {
        self.record(S3Call::UploadPart {
            upload_id: upload_id.to_string(),
            part_number,
        });
        let running = self.parts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_parts_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.part_delay.is_zero() {
            thread::sleep(self.part_delay);
        }
        let result = if self.failing(|f| f.parts.contains(&part_number)) {
            Err(injected(&format!("upload_part {part_number}")))
        } else {
            let mut uploads = self.uploads.lock().expect("uploads mutex poisoned");
            match uploads.get_mut(upload_id) {
                Some(upload) => {
                    upload.parts.insert(part_number, data.to_vec());
                    Ok(format!("etag-{upload_id}-{part_number}"))
                }
                None => Err(ConnectorError::new(
                    ErrorKind::NotFound,
                    format!("no such upload {upload_id}"),
                )),
            }
        };
        self.parts_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ConnectorResult<()> {
        self.record(S3Call::CompleteMultipartUpload {
            upload_id: upload_id.to_string(),
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });
        if self.failing(|f| f.complete) {
            return Err(injected("complete_multipart_upload"));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(ConnectorError::new(
                ErrorKind::InvalidInput,
                "parts must be listed in ascending part number order",
            ));
        }
        let mut uploads = self.uploads.lock().expect("uploads mutex poisoned");
        let upload = uploads.get(upload_id).ok_or_else(|| {
            ConnectorError::new(ErrorKind::NotFound, format!("no such upload {upload_id}"))
        })?;
        let mut body = Vec::new();
        for part in parts {
            let data = upload.parts.get(&part.part_number).ok_or_else(|| {
                ConnectorError::new(
                    ErrorKind::InvalidInput,
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            if part.e_tag != format!("etag-{upload_id}-{}", part.part_number) {
                return Err(ConnectorError::new(
                    ErrorKind::InvalidInput,
                    format!("wrong entity tag for part {}", part.part_number),
                ));
            }
            body.extend_from_slice(data);
        }
        if let Some(upload) = uploads.remove(upload_id) {
            self.objects
                .lock()
                .expect("storage mutex poisoned")
                .insert(upload.path, body);
        }
        Ok(())
    }

    fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> ConnectorResult<()> {
        self.record(S3Call::AbortMultipartUpload {
            upload_id: upload_id.to_string(),
        });
        if self.failing(|f| f.abort) {
            return Err(injected("abort_multipart_upload"));
        }
        self.uploads
            .lock()
            .expect("uploads mutex poisoned")
            .remove(upload_id);
        Ok(())
    }
}

// ============================================================================
// FakeHdfsClient
// ============================================================================

/// A recorded [`FakeHdfsClient`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HdfsCall {
    Mkdirs { path: String },
    Create { path: String, overwrite: bool },
    Append { path: String },
    ReadRange { path: String, start: u64, end_inclusive: u64 },
    List { prefix: String, token: Option<String> },
}

#[derive(Debug, Default)]
struct HdfsFailures {
    mkdirs: bool,
    writes: bool,
}

/// In-memory HDFS.
#[derive(Clone)]
pub struct FakeHdfsClient {
    files: ObjectStorage,
    dirs: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<HdfsCall>>>,
    failures: Arc<Mutex<HdfsFailures>>,
    page_size: usize,
}

impl Default for FakeHdfsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHdfsClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(BTreeMap::new())),
            dirs: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HdfsFailures::default())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .insert(path.to_string(), data.into());
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().expect("storage mutex poisoned").get(path).cloned()
    }

    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.files
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.lock().expect("dirs mutex poisoned").contains(path)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<HdfsCall> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn fail_mkdirs(&self) {
        self.failures.lock().expect("failures mutex poisoned").mkdirs = true;
    }

    pub fn fail_writes(&self) {
        self.failures.lock().expect("failures mutex poisoned").writes = true;
    }

    fn record(&self, call: HdfsCall) {
        self.calls.lock().expect("calls mutex poisoned").push(call);
    }

    fn writes_fail(&self) -> bool {
        self.failures.lock().expect("failures mutex poisoned").writes
    }
}

impl ObjectReader for FakeHdfsClient {
    fn read_range(&self, path: &str, start: u64, end_inclusive: u64) -> ConnectorResult<Vec<u8>> {
        self.record(HdfsCall::ReadRange {
            path: path.to_string(),
            start,
            end_inclusive,
        });
        read_from(&self.files, path, start, end_inclusive)
    }

    fn list(&self, prefix: &str, token: Option<&str>) -> ConnectorResult<ListPage> {
        self.record(HdfsCall::List {
            prefix: prefix.to_string(),
            token: token.map(str::to_string),
        });
        Ok(list_from(&self.files, prefix, token, self.page_size))
    }
}

impl HdfsClient for FakeHdfsClient {
    fn mkdirs(&self, path: &str) -> ConnectorResult<()> {
        self.record(HdfsCall::Mkdirs {
            path: path.to_string(),
        });
        if self.failures.lock().expect("failures mutex poisoned").mkdirs {
            return Err(injected("mkdirs"));
        }
        self.dirs
            .lock()
            .expect("dirs mutex poisoned")
            .insert(path.to_string());
        Ok(())
    }

    fn create(&self, path: &str, data: &[u8], overwrite: bool) -> ConnectorResult<()> {
        self.record(HdfsCall::Create {
            path: path.to_string(),
            overwrite,
        });
        if self.writes_fail() {
            return Err(injected("create"));
        }
        let mut files = self.files.lock().expect("storage mutex poisoned");
        if !overwrite && files.contains_key(path) {
            return Err(ConnectorError::new(
                ErrorKind::InvalidInput,
                format!("{path} already exists"),
            ));
        }
        files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn append(&self, path: &str, data: &[u8]) -> ConnectorResult<()> {
        self.record(HdfsCall::Append {
            path: path.to_string(),
        });
        if self.writes_fail() {
            return Err(injected("append"));
        }
        let mut files = self.files.lock().expect("storage mutex poisoned");
        let file = files
            .get_mut(path)
            .ok_or_else(|| ConnectorError::new(ErrorKind::NotFound, format!("{path} not found")))?;
        file.extend_from_slice(data);
        Ok(())
    }
}
