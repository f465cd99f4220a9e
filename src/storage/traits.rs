//! Client contracts for the storage backends.
//!
//! These traits are synchronous; an implementation over an async SDK blocks on
//! its own runtime internally. Paths are plain strings: a filesystem path for
//! local and HDFS storage, `bucket/key` for S3.

use crate::error::ConnectorResult;

/// A listed file or object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub path: String,
    pub size: u64,
}

impl ObjectEntry {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Pass back to `list` to fetch the next page; `None` on the last page.
    pub next_token: Option<String>,
}

/// A part accepted by a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// Read access shared by every backend.
pub trait ObjectReader: Send + Sync {
    /// Read the bytes in `[start, end_inclusive]`.
    ///
    /// Ranges running past the end of the object return the bytes that
    /// exist; a range starting at or past the end returns nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist or the read fails
    fn read_range(&self, path: &str, start: u64, end_inclusive: u64) -> ConnectorResult<Vec<u8>>;

    /// List the entries under `prefix`, in ascending path order.
    ///
    /// `token` is the `next_token` of the previous page, or `None` for the
    /// first page.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails
    fn list(&self, prefix: &str, token: Option<&str>) -> ConnectorResult<ListPage>;
}

/// Object storage with multipart upload support.
pub trait S3Client: ObjectReader {
    /// Create the bucket unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be checked or created
    fn ensure_bucket(&self, bucket: &str) -> ConnectorResult<()>;

    /// Write a whole object in one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket does not exist or the upload fails
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> ConnectorResult<()>;

    /// Open a multipart upload session and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be created
    fn create_multipart_upload(&self, bucket: &str, key: &str) -> ConnectorResult<String>;

    /// Upload one part and return its entity tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or the upload fails
    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: &[u8],
    ) -> ConnectorResult<String>;

    /// Stitch the uploaded parts into the final object.
    ///
    /// `parts` must be sorted ascending by part number.
    ///
    /// # Errors
    ///
    /// Returns an error if the parts are unsorted or unknown, or the request fails
    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ConnectorResult<()>;

    /// Discard a multipart upload session and its parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be aborted
    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> ConnectorResult<()>;
}

/// A Hadoop-compatible filesystem.
pub trait HdfsClient: ObjectReader {
    /// Create a directory and its parents; succeeds if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created
    fn mkdirs(&self, path: &str) -> ConnectorResult<()>;

    /// Create a file with `data`, replacing an existing file when `overwrite`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and `overwrite` is false, or the write fails
    fn create(&self, path: &str, data: &[u8], overwrite: bool) -> ConnectorResult<()>;

    /// Append `data` to an existing file.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the file does not exist, or an error if the write fails
    fn append(&self, path: &str, data: &[u8]) -> ConnectorResult<()>;
}
