//! Storage backends.
//!
//! The connectors talk to storage only through the traits in this module:
//!
//! - [`ObjectReader`] - ranged reads and paginated listings, used by the
//!   slicer and fetcher
//! - [`S3Client`] - object puts and multipart uploads
//! - [`HdfsClient`] - directory creation, file create and append
//!
//! [`LocalFileStore`] reads the local filesystem directly. In-memory fakes of
//! the remote clients live in [`fake`] and support failure injection and call
//! recording for tests.
//!
//! ## Unit Testing with Fakes
//! ```
//! use ironbeam_files::storage::{FakeS3Client, ObjectReader, S3Client};
//!
//! # fn main() -> ironbeam_files::ConnectorResult<()> {
//! let s3 = FakeS3Client::new();
//! s3.ensure_bucket("bucket")?;
//! s3.put_object("bucket", "a.ldjson", b"{\"a\":1}\n")?;
//! assert_eq!(s3.read_range("bucket/a.ldjson", 0, 3)?, b"{\"a\"");
//! # Ok(())
//! # }
//! ```

pub mod fake;
pub mod local;
pub mod traits;

pub use fake::{FakeHdfsClient, FakeS3Client, HdfsCall, S3Call};
pub use local::LocalFileStore;
pub use traits::{CompletedPart, HdfsClient, ListPage, ObjectEntry, ObjectReader, S3Client};

use crate::error::{ConnectorError, ConnectorResult, ErrorKind};

/// Default number of entries returned per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Split an `[s3://]bucket/key` path into its bucket and key.
///
/// The key may be empty, e.g. when listing a whole bucket.
///
/// # Errors
/// Returns an `InvalidInput` error when the bucket is missing.
pub fn split_bucket_key(path: &str) -> ConnectorResult<(&str, &str)> {
    let path = path.strip_prefix("s3://").unwrap_or(path);
    let path = path.trim_start_matches('/');
    let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
    if bucket.is_empty() {
        return Err(ConnectorError::new(
            ErrorKind::InvalidInput,
            format!("no bucket in path \"{path}\""),
        ));
    }
    Ok((bucket, key))
}

/// Cut one page out of a sorted listing.
///
/// `token` is the last path of the previous page; entries up to and including
/// it are skipped.
pub(crate) fn paginate(entries: Vec<ObjectEntry>, token: Option<&str>, page_size: usize) -> ListPage {
    let page_size = page_size.max(1);
    let mut remaining = entries
        .into_iter()
        .filter(|e| token.is_none_or(|t| e.path.as_str() > t))
        .peekable();
    let page: Vec<ObjectEntry> = remaining.by_ref().take(page_size).collect();
    let next_token = if remaining.peek().is_some() {
        page.last().map(|e| e.path.clone())
    } else {
        None
    };
    ListPage {
        entries: page,
        next_token,
    }
}

/// Clamp an inclusive range to a buffer of `len` bytes.
pub(crate) fn clamp_range(len: usize, start: u64, end_inclusive: u64) -> std::ops::Range<usize> {
    let len = len as u64;
    if start >= len || end_inclusive < start {
        return 0..0;
    }
    let end = end_inclusive.saturating_add(1).min(len);
    // Both bounds are at most `len`, which came from a usize.
    usize::try_from(start).unwrap_or(usize::MAX)..usize::try_from(end).unwrap_or(usize::MAX)
}
