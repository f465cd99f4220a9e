//! `json` (array per batch) and `ldjson` (object per line) encodings.

use super::{FormatOptions, project};
use crate::error::{ConnectorError, ConnectorResult};
use crate::record::Record;
use serde_json::Value;

/// Serialize a batch as one JSON array followed by the line delimiter.
pub(crate) fn format_array(records: &[Record], options: &FormatOptions) -> ConnectorResult<Vec<u8>> {
    let items: Vec<_> = records
        .iter()
        .map(|r| project(&r.data, &options.fields))
        .collect();
    let mut out = serde_json::to_vec(&items)?;
    out.extend_from_slice(options.line_delimiter.as_bytes());
    Ok(out)
}

/// Append one record as a single JSON line.
pub(crate) fn write_line(
    record: &Record,
    options: &FormatOptions,
    out: &mut Vec<u8>,
) -> ConnectorResult<()> {
    if options.fields.is_empty() {
        serde_json::to_writer(&mut *out, &record.data)?;
    } else {
        serde_json::to_writer(&mut *out, &project(&record.data, &options.fields))?;
    }
    out.extend_from_slice(options.line_delimiter.as_bytes());
    Ok(())
}

/// Parse one JSON line. Blank lines yield `None`.
pub(crate) fn parse_line(line: &str, options: &FormatOptions) -> ConnectorResult<Option<Record>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(line).map_err(|e| {
        ConnectorError::format(format!("invalid JSON record: {}", preview(line)))
            .with_source(e.to_string())
    })?;
    into_record(value, options).map(Some)
}

/// Parse a whole JSON document.
///
/// An array yields one entry per element; an object yields a single record.
/// Elements that are not objects are returned as per-record errors so the
/// caller can apply its reject policy. A document that is not JSON at all is
/// an error for the whole buffer.
pub(crate) fn parse_document(
    bytes: &[u8],
    options: &FormatOptions,
) -> ConnectorResult<Vec<ConnectorResult<Record>>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(vec![]);
    }
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        ConnectorError::format("invalid JSON document").with_source(e.to_string())
    })?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| into_record(item, options))
            .collect(),
        other => vec![into_record(other, options)],
    })
}

fn into_record(value: Value, options: &FormatOptions) -> ConnectorResult<Record> {
    match value {
        Value::Object(map) if options.fields.is_empty() => Ok(Record::new(map)),
        Value::Object(map) => Ok(Record::new(project(&map, &options.fields))),
        other => Err(ConnectorError::format(format!(
            "expected a JSON object, found {}",
            preview(&other.to_string())
        ))),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
