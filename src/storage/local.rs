//! Local filesystem storage.

use super::{DEFAULT_PAGE_SIZE, ListPage, ObjectEntry, ObjectReader, paginate};
use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use glob::glob;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Reads and writes files on the local filesystem.
///
/// A listing prefix may be a file, a directory (listed recursively) or a glob
/// pattern such as `logs/*.ldjson`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    page_size: usize,
}

impl Default for LocalFileStore {
    fn default() -> Self {
        Self::new()
    }
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

impl LocalFileStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create a directory and its parents.
    ///
    /// # Errors
    /// Returns an I/O error if the directory cannot be created.
    pub fn create_dir_all(&self, path: &str) -> ConnectorResult<()> {
        fs::create_dir_all(path)
            .map_err(|e| ConnectorError::from(e).with_source(format!("create directory {path}")))
    }

    /// Write `data` to `path`, appending or truncating.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be opened or written.
    pub fn write(&self, path: &str, data: &[u8], append: bool) -> ConnectorResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| ConnectorError::from(e).with_source(format!("open {path}")))?;
        file.write_all(data)
            .map_err(|e| ConnectorError::from(e).with_source(format!("write {path}")))
    }

    fn matching_files(&self, prefix: &str) -> ConnectorResult<Vec<ObjectEntry>> {
        let pattern = if has_glob_chars(prefix) {
            prefix.to_string()
        } else {
            let path = Path::new(prefix);
            if path.is_file() {
                let size = fs::metadata(path)?.len();
                return Ok(vec![ObjectEntry::new(prefix, size)]);
            }
            if !path.is_dir() {
                return Err(ConnectorError::new(
                    ErrorKind::NotFound,
                    format!("path {prefix} does not exist"),
                ));
            }
            format!("{}/**/*", prefix.trim_end_matches('/'))
        };

        let paths = glob(&pattern).map_err(|e| {
            ConnectorError::configuration(format!("invalid glob pattern: {pattern}")).with_source(e.to_string())
        })?;
        let mut entries = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                ConnectorError::io(format!("error reading glob entry for pattern: {pattern}"))
                    .with_source(e.to_string())
            })?;
            let metadata = fs::metadata(&path)?;
            if metadata.is_file() {
                entries.push(ObjectEntry::new(path.to_string_lossy(), metadata.len()));
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

impl ObjectReader for LocalFileStore {
    fn read_range(&self, path: &str, start: u64, end_inclusive: u64) -> ConnectorResult<Vec<u8>> {
        let mut file = File::open(path).map_err(|e| ConnectorError::from(e).with_source(format!("open {path}")))?;
        if end_inclusive < start {
            return Ok(vec![]);
        }
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        file.take(end_inclusive - start + 1).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn list(&self, prefix: &str, token: Option<&str>) -> ConnectorResult<ListPage> {
        Ok(paginate(self.matching_files(prefix)?, token, self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_directories_recursively_and_reads_ranges() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let store = LocalFileStore::new();
        store.create_dir_all(&format!("{root}/nested")).unwrap();
        store.write(&format!("{root}/a.ldjson"), b"0123456789", false).unwrap();
        store.write(&format!("{root}/nested/b.ldjson"), b"xyz", false).unwrap();

        let page = store.list(&root, None).unwrap();
        let sizes: Vec<u64> = page.entries.iter().map(|e| e.size).collect();
        assert_eq!(sizes, vec![10, 3]);
        assert_eq!(page.next_token, None);

        let path = &page.entries[0].path;
        assert_eq!(store.read_range(path, 2, 4).unwrap(), b"234");
        assert_eq!(store.read_range(path, 8, 20).unwrap(), b"89");
        assert!(store.read_range(path, 10, 12).unwrap().is_empty());
    }

    #[test]
    fn append_and_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").to_string_lossy().to_string();
        let store = LocalFileStore::new();
        store.write(&path, b"ab", true).unwrap();
        store.write(&path, b"cd", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abcd");
        store.write(&path, b"z", false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"z");
    }

    #[test]
    fn glob_prefix_and_missing_path() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let store = LocalFileStore::new().with_page_size(1);
        store.write(&format!("{root}/a.csv"), b"1", false).unwrap();
        store.write(&format!("{root}/b.csv"), b"2", false).unwrap();
        store.write(&format!("{root}/c.txt"), b"3", false).unwrap();

        let first = store.list(&format!("{root}/*.csv"), None).unwrap();
        assert_eq!(first.entries.len(), 1);
        let second = store.list(&format!("{root}/*.csv"), first.next_token.as_deref()).unwrap();
        assert!(second.entries[0].path.ends_with("b.csv"));
        assert_eq!(second.next_token, None);

        let err = store.list(&format!("{root}/missing"), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
