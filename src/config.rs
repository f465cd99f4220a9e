//! Connector configuration.
//!
//! The host hands each component a validated key/value map; these structs are
//! its typed form. Every field has a default except the ones a component
//! cannot work without (`path`, and `id` for senders). All validation happens
//! here, before any I/O, and every failure is an
//! [`ErrorKind::Configuration`](crate::error::ErrorKind::Configuration) error.

use crate::error::{ConnectorError, ConnectorResult};
use crate::io::chunks::DEFAULT_CHUNK_SIZE;
use crate::io::compression::Compression;
use crate::io::format::{Format, FormatOptions, Formatter};
use crate::io::naming::NamingConfig;
use crate::io::reader::{ChunkReader, DEFAULT_MARGIN_SIZE, RejectAction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default byte size of a read slice.
pub const DEFAULT_SLICE_SIZE: u64 = 10_000_000;

/// Default number of destinations written at once by a sender.
pub const DEFAULT_CONCURRENCY: usize = 10;

fn deserialize<T: DeserializeOwned>(value: Value, what: &str) -> ConnectorResult<T> {
    serde_json::from_value(value).map_err(|e| {
        ConnectorError::configuration(format!("invalid {what} configuration")).with_source(e.to_string())
    })
}

/// Resolve the configured field delimiter to the single byte the codecs use.
fn field_delimiter_byte(format: Format, delimiter: &str) -> ConnectorResult<u8> {
    if format == Format::Tsv {
        return Ok(b'\t');
    }
    match delimiter.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(ConnectorError::configuration(format!(
            "field_delimiter must be a single byte, got {delimiter:?}"
        ))),
    }
}

fn require(value: &str, field: &str) -> ConnectorResult<()> {
    if value.trim().is_empty() {
        return Err(ConnectorError::configuration(format!(
            "missing required field \"{field}\""
        )));
    }
    Ok(())
}

/// Settings for the slicer and fetcher of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Directory, file, glob pattern or `bucket/prefix` to read.
    pub path: String,
    pub format: Format,
    pub compression: Compression,
    /// Target byte length of each slice.
    pub size: u64,
    pub line_delimiter: String,
    pub field_delimiter: String,
    pub fields: Vec<String>,
    pub has_header: bool,
    pub ignore_extra_columns: bool,
    /// Every file holds the output of a single write and is read whole.
    pub file_per_slice: bool,
    pub raw_field: String,
    pub margin_size: u64,
    pub on_reject: RejectAction,
    /// Allow an interrupted slicer to restart its listing from scratch.
    pub autorecover: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let options = FormatOptions::default();
        Self {
            path: String::new(),
            format: Format::default(),
            compression: Compression::default(),
            size: DEFAULT_SLICE_SIZE,
            line_delimiter: options.line_delimiter,
            field_delimiter: ",".to_string(),
            fields: vec![],
            has_header: options.has_header,
            ignore_extra_columns: options.ignore_extra_columns,
            file_per_slice: false,
            raw_field: options.raw_field,
            margin_size: DEFAULT_MARGIN_SIZE,
            on_reject: RejectAction::default(),
            autorecover: false,
        }
    }
}

impl ReaderConfig {
    /// Build and validate a reader configuration from a host map.
    ///
    /// # Errors
    /// Returns a configuration error for unknown enum values, mistyped
    /// fields or a failed validation rule.
    pub fn from_value(value: Value) -> ConnectorResult<Self> {
        let config: Self = deserialize(value, "reader")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns a configuration error describing the first violated rule.
    pub fn validate(&self) -> ConnectorResult<()> {
        require(&self.path, "path")?;
        if self.size == 0 {
            return Err(ConnectorError::configuration("size must be greater than 0"));
        }
        if self.margin_size == 0 {
            return Err(ConnectorError::configuration(
                "margin_size must be greater than 0",
            ));
        }
        if self.line_delimiter.is_empty() {
            return Err(ConnectorError::configuration(
                "line_delimiter must not be empty",
            ));
        }
        if !self.whole_file() && self.size <= self.line_delimiter.len() as u64 {
            return Err(ConnectorError::configuration(format!(
                "size must be larger than the line delimiter ({} bytes)",
                self.line_delimiter.len()
            )));
        }
        field_delimiter_byte(self.format, &self.field_delimiter)?;
        self.compression.codec()?;
        Ok(())
    }

    /// Whether each file is read as one slice instead of byte ranges.
    #[must_use]
    pub fn whole_file(&self) -> bool {
        self.format == Format::Json || self.file_per_slice || !self.compression.is_none()
    }

    /// # Errors
    /// Returns a configuration error for an invalid delimiter.
    pub fn formatter(&self) -> ConnectorResult<Formatter> {
        Formatter::new(
            self.format,
            FormatOptions {
                line_delimiter: self.line_delimiter.clone(),
                field_delimiter: field_delimiter_byte(self.format, &self.field_delimiter)?,
                fields: self.fields.clone(),
                include_header: false,
                has_header: self.has_header,
                ignore_extra_columns: self.ignore_extra_columns,
                raw_field: self.raw_field.clone(),
            },
        )
    }

    /// # Errors
    /// Returns a configuration error for an invalid delimiter.
    pub fn chunk_reader(&self) -> ConnectorResult<ChunkReader> {
        Ok(
            ChunkReader::new(self.formatter()?, self.compression, self.whole_file())
                .with_margin_size(self.margin_size)
                .with_reject_action(self.on_reject),
        )
    }
}

/// Settings for one chunked sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Stable identifier used in destination names, e.g. a worker id.
    pub id: String,
    /// Base directory, or `bucket/prefix` for S3.
    pub path: String,
    pub format: Format,
    pub compression: Compression,
    /// Write every `send` to its own, numbered destination.
    pub file_per_slice: bool,
    /// Overrides the derived `.format[.compression]` suffix.
    pub extension: Option<String>,
    /// Honor per-record route overrides.
    pub dynamic_routing: bool,
    /// Upper bound on destinations written at once.
    pub concurrency: usize,
    pub line_delimiter: String,
    pub field_delimiter: String,
    pub fields: Vec<String>,
    pub include_header: bool,
    /// Chunk threshold in bytes.
    pub chunk_size: usize,
    pub raw_field: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        let options = FormatOptions::default();
        Self {
            id: String::new(),
            path: String::new(),
            format: Format::default(),
            compression: Compression::default(),
            file_per_slice: false,
            extension: None,
            dynamic_routing: false,
            concurrency: DEFAULT_CONCURRENCY,
            line_delimiter: options.line_delimiter,
            field_delimiter: ",".to_string(),
            fields: vec![],
            include_header: options.include_header,
            chunk_size: DEFAULT_CHUNK_SIZE,
            raw_field: options.raw_field,
        }
    }
}

impl SenderConfig {
    /// Build and validate a sender configuration from a host map.
    ///
    /// # Errors
    /// Returns a configuration error for unknown enum values, mistyped
    /// fields or a failed validation rule.
    pub fn from_value(value: Value) -> ConnectorResult<Self> {
        let config: Self = deserialize(value, "sender")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns a configuration error describing the first violated rule.
    pub fn validate(&self) -> ConnectorResult<()> {
        require(&self.id, "id")?;
        require(&self.path, "path")?;
        if self.concurrency == 0 {
            return Err(ConnectorError::configuration(
                "concurrency must be greater than 0",
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConnectorError::configuration(
                "chunk_size must be greater than 0",
            ));
        }
        if self.line_delimiter.is_empty() {
            return Err(ConnectorError::configuration(
                "line_delimiter must not be empty",
            ));
        }
        field_delimiter_byte(self.format, &self.field_delimiter)?;
        self.compression.codec()?;
        // A json array or a compressed stream cannot be appended to.
        if (self.format == Format::Json || !self.compression.is_none()) && !self.file_per_slice {
            return Err(ConnectorError::configuration(format!(
                "format {} with compression {} requires file_per_slice",
                self.format, self.compression
            )));
        }
        Ok(())
    }

    /// # Errors
    /// Returns a configuration error for an invalid delimiter.
    pub fn formatter(&self) -> ConnectorResult<Formatter> {
        Formatter::new(
            self.format,
            FormatOptions {
                line_delimiter: self.line_delimiter.clone(),
                field_delimiter: field_delimiter_byte(self.format, &self.field_delimiter)?,
                fields: self.fields.clone(),
                include_header: self.include_header,
                has_header: false,
                ignore_extra_columns: true,
                raw_field: self.raw_field.clone(),
            },
        )
    }

    /// Naming inputs for the given slice counter value.
    #[must_use]
    pub fn naming(&self, slice_count: u64) -> NamingConfig {
        NamingConfig {
            id: self.id.clone(),
            file_per_slice: self.file_per_slice,
            slice_count: self.file_per_slice.then_some(slice_count),
            extension: self.extension.clone(),
            format: self.format,
            compression: self.compression,
        }
    }
}
