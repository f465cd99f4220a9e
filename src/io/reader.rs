//! Reassembly of well-formed records from a byte-range slice.
//!
//! Line-delimited slices are cut at arbitrary byte positions, so the reader:
//!
//! 1. fetches `[offset, offset + length)`;
//! 2. when the slice is not the last one of its file and does not end on a
//!    delimiter, keeps fetching `margin_size`-byte steps past its end until it
//!    finds the delimiter (or end of file), completing its last record;
//! 3. when `offset > 0`, drops everything up to and including the first
//!    delimiter, since the previous slice owns that fragment;
//! 4. drops a trailing fragment that never reached a delimiter before end
//!    of file;
//! 5. parses each remaining line, applying the reject policy to bad lines.
//!
//! Whole-file slices (`json`, file-per-slice output, or compressed content)
//! are decompressed and parsed as one unit, unterminated last line included.

use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use crate::io::compression::Compression;
use crate::io::format::{Format, Formatter, json};
use crate::io::offsets::SliceDescriptor;
use crate::record::{Record, SourceInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default step for reading past the end of a slice.
pub const DEFAULT_MARGIN_SIZE: u64 = 64 * 1024;

/// What to do with a record that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectAction {
    /// Fail the whole slice on the first bad record.
    Throw,
    /// Skip the record and log a warning.
    #[default]
    Log,
    /// Skip the record silently.
    None,
}

/// Records read from one slice, plus how many were rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadBatch {
    pub records: Vec<Record>,
    pub rejected: usize,
}

/// Turns fetched bytes of a slice into records.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    formatter: Formatter,
    compression: Compression,
    whole_file: bool,
    margin_size: u64,
    on_reject: RejectAction,
}

impl ChunkReader {
    #[must_use]
    pub fn new(formatter: Formatter, compression: Compression, whole_file: bool) -> Self {
        let whole_file =
            whole_file || formatter.kind() == Format::Json || !compression.is_none();
        Self {
            formatter,
            compression,
            whole_file,
            margin_size: DEFAULT_MARGIN_SIZE,
            on_reject: RejectAction::default(),
        }
    }

    #[must_use]
    pub fn with_margin_size(mut self, margin_size: u64) -> Self {
        self.margin_size = margin_size.max(1);
        self
    }

    #[must_use]
    pub fn with_reject_action(mut self, on_reject: RejectAction) -> Self {
        self.on_reject = on_reject;
        self
    }

    #[must_use]
    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// Read one slice.
    ///
    /// `fetch(offset, length)` returns the bytes of that range, or fewer at
    /// end of file.
    ///
    /// # Errors
    /// Propagates fetch failures; returns a format error when the reject
    /// action is `throw` and a record is bad, or when every record in the
    /// slice failed to parse.
    pub fn read<F>(&self, slice: &SliceDescriptor, mut fetch: F) -> ConnectorResult<ReadBatch>
    where
        F: FnMut(u64, u64) -> ConnectorResult<Vec<u8>>,
    {
        let fetched = fetch(slice.offset, slice.length)?;
        if fetched.is_empty() {
            return Ok(ReadBatch::default());
        }

        let mut batch = if self.whole_file {
            self.read_whole(&fetched)?
        } else {
            let buf = self.collect_margin(slice, fetched, &mut fetch)?;
            self.read_lines(&buf, slice.offset, true)?
        };

        let source = SourceInfo {
            path: slice.path.clone(),
            offset: slice.offset,
            length: slice.length,
            total: slice.total,
        };
        for record in &mut batch.records {
            record.metadata.source = Some(source.clone());
        }
        debug!(
            path = %slice.path,
            offset = slice.offset,
            length = slice.length,
            records = batch.records.len(),
            rejected = batch.rejected,
            "Read slice"
        );
        Ok(batch)
    }

    fn read_whole(&self, fetched: &[u8]) -> ConnectorResult<ReadBatch> {
        let bytes = self.compression.decompress(fetched)?;
        if self.formatter.kind() != Format::Json {
            return self.read_lines(&bytes, 0, false);
        }
        let mut tally = RejectTally::new(self.on_reject);
        for parsed in json::parse_document(&bytes, self.formatter.options())? {
            tally.accept(parsed)?;
        }
        tally.finish()
    }

    /// Extend `buf` past the slice end until it ends on a delimiter or the
    /// file ends.
    fn collect_margin<F>(
        &self,
        slice: &SliceDescriptor,
        mut buf: Vec<u8>,
        fetch: &mut F,
    ) -> ConnectorResult<Vec<u8>>
    where
        F: FnMut(u64, u64) -> ConnectorResult<Vec<u8>>,
    {
        let delimiter = self.formatter.line_delimiter().as_bytes();
        if slice.is_final() || buf.ends_with(delimiter) {
            return Ok(buf);
        }
        let mut position = slice.offset + buf.len() as u64;
        while position < slice.total {
            let step = self.margin_size.min(slice.total - position);
            let more = fetch(position, step)?;
            if more.is_empty() {
                break;
            }
            position += more.len() as u64;
            let search_from = buf.len().saturating_sub(delimiter.len() - 1);
            buf.extend_from_slice(&more);
            if let Some(idx) = find(&buf[search_from..], delimiter) {
                buf.truncate(search_from + idx + delimiter.len());
                break;
            }
        }
        Ok(buf)
    }

    fn read_lines(&self, buf: &[u8], offset: u64, terminated_only: bool) -> ConnectorResult<ReadBatch> {
        let delimiter = self.formatter.line_delimiter();
        let start = if offset > 0 {
            match find(buf, delimiter.as_bytes()) {
                Some(idx) => idx + delimiter.len(),
                None => return Ok(ReadBatch::default()),
            }
        } else {
            0
        };
        let mut body = &buf[start..];
        if terminated_only && !body.ends_with(delimiter.as_bytes()) {
            let end = rfind(body, delimiter.as_bytes()).map_or(0, |idx| idx + delimiter.len());
            debug!(dropped = body.len() - end, "Dropping unterminated trailing fragment");
            body = &body[..end];
        }
        let mut parser = self.formatter.line_parser(offset == 0);
        let mut tally = RejectTally::new(self.on_reject);
        for line in split_lines(body, delimiter.as_bytes()) {
            let parsed = match std::str::from_utf8(line) {
                Ok(text) => parser.parse_line(text),
                Err(err) => Err(ConnectorError::format("record is not valid UTF-8").with_source(err.to_string())),
            };
            match parsed {
                Ok(Some(record)) => tally.accept(Ok(record))?,
                Ok(None) => {}
                Err(err) => tally.accept(Err(err))?,
            }
        }
        tally.finish()
    }
}

/// Applies the reject policy while collecting records.
struct RejectTally {
    action: RejectAction,
    batch: ReadBatch,
    last_error: Option<ConnectorError>,
}

impl RejectTally {
    fn new(action: RejectAction) -> Self {
        Self {
            action,
            batch: ReadBatch::default(),
            last_error: None,
        }
    }

    fn accept(&mut self, parsed: ConnectorResult<Record>) -> ConnectorResult<()> {
        match parsed {
            Ok(record) => self.batch.records.push(record),
            Err(err) => match self.action {
                RejectAction::Throw => return Err(err),
                RejectAction::Log => {
                    warn!(error = %err, "Skipping bad record");
                    self.batch.rejected += 1;
                    self.last_error = Some(err);
                }
                RejectAction::None => {
                    self.batch.rejected += 1;
                    self.last_error = Some(err);
                }
            },
        }
        Ok(())
    }

    fn finish(self) -> ConnectorResult<ReadBatch> {
        if self.batch.records.is_empty()
            && let Some(err) = self.last_error
        {
            return Err(ConnectorError::new(
                ErrorKind::Format,
                format!("all {} records in slice failed to parse", self.batch.rejected),
            )
            .with_source(err.to_string()));
        }
        Ok(self.batch)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split on every `delimiter`, keeping the (possibly empty) piece after the last.
fn split_lines<'a>(mut buf: &'a [u8], delimiter: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        match find(buf, delimiter) {
            Some(idx) => {
                let line = &buf[..idx];
                buf = &buf[idx + delimiter.len()..];
                Some(line)
            }
            None => {
                done = true;
                Some(buf)
            }
        }
    })
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
