//! `raw` encoding: one unquoted payload per line.

use super::FormatOptions;
use crate::record::Record;
use serde_json::{Map, Value};

/// Append the record's payload field followed by the line delimiter.
///
/// Non-string payloads are written as JSON text; a missing payload writes an
/// empty line.
pub(crate) fn write_line(record: &Record, options: &FormatOptions, out: &mut Vec<u8>) {
    match record.get(&options.raw_field) {
        Some(Value::String(s)) => out.extend_from_slice(s.as_bytes()),
        Some(Value::Null) | None => {}
        Some(other) => out.extend_from_slice(other.to_string().as_bytes()),
    }
    out.extend_from_slice(options.line_delimiter.as_bytes());
}

pub(crate) fn parse_line(line: &str, options: &FormatOptions) -> Option<Record> {
    if line.is_empty() {
        return None;
    }
    let mut data = Map::new();
    data.insert(options.raw_field.clone(), Value::String(line.to_string()));
    Some(Record::new(data))
}
