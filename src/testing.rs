//! Testing utilities for connector code.
//!
//! - **Fixtures**: small record batches with predictable content
//! - **Temporary directories**: scratch space for local-file round trips
//! - **Assertions**: compare records by content, ignoring read metadata
//!
//! The in-memory storage fakes live in [`crate::storage::fake`].
//!
//! ```
//! use ironbeam_files::testing::*;
//!
//! let records = sample_records(3);
//! assert_records_equal(&records, &sample_records(3));
//! ```

use crate::record::Record;
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `n` records shaped like `{"id": i, "user": "user-i", "action": ...}`.
#[must_use]
pub fn sample_records(n: usize) -> Vec<Record> {
    const ACTIONS: [&str; 3] = ["login", "view", "logout"];
    (0..n)
        .map(|i| {
            Record::from_value(
                json!({
                    "id": i,
                    "user": format!("user-{i}"),
                    "action": ACTIONS[i % ACTIONS.len()],
                }),
                "data",
            )
        })
        .collect()
}

/// `n` records whose values are all strings, so they survive csv and tsv
/// round trips unchanged.
#[must_use]
pub fn sample_string_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::from_value(
                json!({"id": i.to_string(), "word": format!("word, {i}")}),
                "data",
            )
        })
        .collect()
}

/// The ldjson text of a list of JSON objects, one per line.
#[must_use]
pub fn ldjson_text(values: &[Value]) -> String {
    let mut out = String::new();
    for value in values {
        let _ = writeln!(out, "{value}");
    }
    out
}

/// Assert that two record lists hold the same data in the same order.
///
/// Metadata such as route overrides and read provenance is ignored.
///
/// # Panics
///
/// Panics if the lists differ in length or in any record's data.
pub fn assert_records_equal(actual: &[Record], expected: &[Record]) {
    let actual: Vec<&serde_json::Map<String, Value>> = actual.iter().map(|r| &r.data).collect();
    let expected: Vec<&serde_json::Map<String, Value>> = expected.iter().map(|r| &r.data).collect();
    assert_eq!(
        actual.len(),
        expected.len(),
        "Record count mismatch:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(a, e, "Record mismatch at index {i}");
    }
}

/// A temporary directory that is deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory as a string, the form connector configs take.
    #[must_use]
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// A path inside this directory, as a string.
    #[must_use]
    pub fn join(&self, relative: &str) -> String {
        self.path.join(relative).to_string_lossy().into_owned()
    }
}
