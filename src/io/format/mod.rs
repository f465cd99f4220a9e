//! Record serialization formats.
//!
//! A [`Formatter`] is built once from configuration and then turns record
//! batches into bytes and bytes back into records for one [`Format`]:
//!
//! - `json` - one JSON array per batch, followed by the line delimiter
//! - `ldjson` - one JSON object per line
//! - `csv` / `tsv` - quoted values joined by `,` or a tab, optional header row
//! - `raw` - the payload field of each record, one per line, unquoted
//!
//! Empty input always formats to empty bytes, including for `json`; callers
//! treat empty output as "nothing to write".
//!
//! Line-oriented formats are produced row by row through a [`RowEncoder`] and
//! parsed line by line through a [`LineParser`], which is what lets the chunk
//! generator emit output incrementally and the chunk reader reassemble
//! records from arbitrary byte ranges.

pub mod delimited;
pub mod json;
pub mod raw;

use crate::error::{ConnectorError, ConnectorResult};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Wire format of a file or object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    #[default]
    Ldjson,
    Csv,
    Tsv,
    Raw,
}

impl Format {
    /// Formats that can be emitted one record at a time without
    /// materializing the whole batch.
    #[must_use]
    pub fn is_row_optimized(self) -> bool {
        matches!(self, Self::Ldjson | Self::Csv | Self::Tsv)
    }

    /// Everything except `json` stores one record per delimited line.
    #[must_use]
    pub fn is_line_delimited(self) -> bool {
        self != Self::Json
    }

    #[must_use]
    pub fn is_tabular(self) -> bool {
        matches!(self, Self::Csv | Self::Tsv)
    }

    /// Extension derived for destination names; `raw` has none.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => ".json",
            Self::Ldjson => ".ldjson",
            Self::Csv => ".csv",
            Self::Tsv => ".tsv",
            Self::Raw => "",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Ldjson => "ldjson",
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Raw => "raw",
        })
    }
}

impl FromStr for Format {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "ldjson" => Ok(Self::Ldjson),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "raw" => Ok(Self::Raw),
            other => Err(ConnectorError::configuration(format!(
                "unsupported format \"{other}\", expected one of json, ldjson, csv, tsv, raw"
            ))),
        }
    }
}

/// Settings shared by every format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub line_delimiter: String,
    /// Separator for `csv`; `tsv` always uses a tab.
    pub field_delimiter: u8,
    /// When non-empty, only these fields are read or written, in this order.
    pub fields: Vec<String>,
    /// Write a header row before the first tabular row.
    pub include_header: bool,
    /// Treat the first tabular row at the start of a file as a header.
    pub has_header: bool,
    /// Drop tabular columns beyond the known field names instead of keeping
    /// them as `field<N>`.
    pub ignore_extra_columns: bool,
    /// Field carrying the payload of `raw` records.
    pub raw_field: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            line_delimiter: "\n".to_string(),
            field_delimiter: b',',
            fields: vec![],
            include_header: false,
            has_header: true,
            ignore_extra_columns: true,
            raw_field: "data".to_string(),
        }
    }
}

/// Serializer and parser for one configured [`Format`].
#[derive(Debug, Clone)]
pub struct Formatter {
    format: Format,
    options: FormatOptions,
}

impl Formatter {
    /// # Errors
    /// Returns a configuration error for an empty line delimiter.
    pub fn new(format: Format, mut options: FormatOptions) -> ConnectorResult<Self> {
        if options.line_delimiter.is_empty() {
            return Err(ConnectorError::configuration(
                "line_delimiter must not be empty",
            ));
        }
        if format == Format::Tsv {
            options.field_delimiter = b'\t';
        }
        Ok(Self { format, options })
    }

    #[must_use]
    pub fn kind(&self) -> Format {
        self.format
    }

    #[must_use]
    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    #[must_use]
    pub fn line_delimiter(&self) -> &str {
        &self.options.line_delimiter
    }

    /// Turn header output on or off for subsequent batches.
    pub fn set_include_header(&mut self, include: bool) {
        self.options.include_header = include;
    }

    /// Serialize a whole batch.
    ///
    /// # Errors
    /// Returns a format error if a record cannot be serialized.
    pub fn format(&self, records: &[Record]) -> ConnectorResult<Vec<u8>> {
        if records.is_empty() {
            return Ok(vec![]);
        }
        if self.format == Format::Json {
            return json::format_array(records, &self.options);
        }
        let mut out = Vec::new();
        let mut encoder = self.row_encoder();
        for record in records {
            encoder.encode(record, &mut out)?;
        }
        Ok(out)
    }

    /// A stateful encoder emitting one line per record.
    #[must_use]
    pub fn row_encoder(&self) -> RowEncoder<'_> {
        RowEncoder {
            formatter: self,
            columns: None,
        }
    }

    /// A stateful parser for the lines of one slice.
    ///
    /// `at_file_start` tells tabular parsers whether the first line may be a
    /// header row.
    #[must_use]
    pub fn line_parser(&self, at_file_start: bool) -> LineParser<'_> {
        LineParser {
            formatter: self,
            names: self.options.fields.clone(),
            header_pending: self.format.is_tabular() && self.options.has_header && at_file_start,
        }
    }

    /// Parse a whole buffer, failing on the first malformed record.
    ///
    /// # Errors
    /// Returns a format error for malformed input.
    pub fn parse(&self, bytes: &[u8]) -> ConnectorResult<Vec<Record>> {
        if self.format == Format::Json {
            return json::parse_document(bytes, &self.options)?
                .into_iter()
                .collect();
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ConnectorError::format("input is not valid UTF-8").with_source(e.to_string()))?;
        let mut parser = self.line_parser(true);
        let mut out = Vec::new();
        for line in text.split(self.options.line_delimiter.as_str()) {
            if let Some(record) = parser.parse_line(line)? {
                out.push(record);
            }
        }
        Ok(out)
    }
}

/// Emits line-oriented output one record at a time.
///
/// Tabular formats fix their column set from the configured fields or, failing
/// that, from the first record encoded.
pub struct RowEncoder<'a> {
    formatter: &'a Formatter,
    columns: Option<Vec<String>>,
}

impl RowEncoder<'_> {
    /// Append the encoding of `record` to `out`.
    ///
    /// # Errors
    /// Returns a format error if the record cannot be serialized, or if the
    /// format is `json`, which has no per-record form.
    pub fn encode(&mut self, record: &Record, out: &mut Vec<u8>) -> ConnectorResult<()> {
        let options = &self.formatter.options;
        match self.formatter.format {
            Format::Json => Err(ConnectorError::new(
                crate::error::ErrorKind::InvalidInput,
                "json output has no per-record encoding",
            )),
            Format::Ldjson => json::write_line(record, options, out),
            Format::Raw => {
                raw::write_line(record, options, out);
                Ok(())
            }
            Format::Csv | Format::Tsv => {
                let first = self.columns.is_none();
                let columns = self.columns.get_or_insert_with(|| {
                    if options.fields.is_empty() {
                        record.data.keys().cloned().collect()
                    } else {
                        options.fields.clone()
                    }
                });
                if first && options.include_header {
                    delimited::write_header(columns, options, out)?;
                }
                delimited::write_row(record, columns, options, out)
            }
        }
    }
}

/// Parses the lines of one slice into records.
pub struct LineParser<'a> {
    formatter: &'a Formatter,
    names: Vec<String>,
    header_pending: bool,
}

impl LineParser<'_> {
    /// Parse one line. Blank lines and a consumed header row yield `None`.
    ///
    /// # Errors
    /// Returns a format error for a malformed line.
    pub fn parse_line(&mut self, line: &str) -> ConnectorResult<Option<Record>> {
        let options = &self.formatter.options;
        match self.formatter.format {
            Format::Ldjson | Format::Json => json::parse_line(line, options),
            Format::Raw => Ok(raw::parse_line(line, options)),
            Format::Csv | Format::Tsv => {
                let Some(values) = delimited::split_line(line, options)? else {
                    return Ok(None);
                };
                if self.header_pending {
                    self.header_pending = false;
                    if self.names.is_empty() {
                        self.names = values;
                    }
                    return Ok(None);
                }
                Ok(Some(delimited::build_record(values, &self.names, options)))
            }
        }
    }
}

/// Restrict a record to the allowlisted fields, in allowlist order.
///
/// An empty allowlist keeps every field.
pub(crate) fn project(data: &Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    if fields.is_empty() {
        return data.clone();
    }
    fields
        .iter()
        .filter_map(|f| data.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}
