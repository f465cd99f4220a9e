//! `csv` and `tsv` encodings, backed by the `csv` crate.
//!
//! Every value is written quoted. Parsing is done one line at a time so a
//! slice can be parsed independently of the rest of its file; quoted values
//! therefore must not contain the line delimiter.

use super::FormatOptions;
use crate::error::{ConnectorError, ConnectorResult};
use crate::record::Record;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use serde_json::{Map, Value};

pub(crate) fn write_header(
    columns: &[String],
    options: &FormatOptions,
    out: &mut Vec<u8>,
) -> ConnectorResult<()> {
    if columns.is_empty() {
        return Ok(());
    }
    write_values(columns.iter().map(String::as_str), options, out)
}

/// Append one row. A record holding none of the columns writes nothing.
pub(crate) fn write_row(
    record: &Record,
    columns: &[String],
    options: &FormatOptions,
    out: &mut Vec<u8>,
) -> ConnectorResult<()> {
    if !columns.iter().any(|c| record.data.contains_key(c)) {
        return Ok(());
    }
    let values: Vec<String> = columns
        .iter()
        .map(|c| record.data.get(c).map(cell).unwrap_or_default())
        .collect();
    write_values(values.iter().map(String::as_str), options, out)
}

fn write_values<'v>(
    values: impl Iterator<Item = &'v str>,
    options: &FormatOptions,
    out: &mut Vec<u8>,
) -> ConnectorResult<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(options.field_delimiter)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(values)?;
    let mut line = writer
        .into_inner()
        .map_err(|e| ConnectorError::io("flush csv row").with_source(e.to_string()))?;
    line.pop();
    out.extend_from_slice(&line);
    out.extend_from_slice(options.line_delimiter.as_bytes());
    Ok(())
}

/// Render a JSON value as a single cell.
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Split one line into its values. Blank lines yield `None`.
pub(crate) fn split_line(line: &str, options: &FormatOptions) -> ConnectorResult<Option<Vec<String>>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(options.field_delimiter)
        .from_reader(line.as_bytes());
    let mut row = StringRecord::new();
    if !reader.read_record(&mut row)? {
        return Ok(None);
    }
    Ok(Some(row.iter().map(str::to_string).collect()))
}

/// Key a row's values by the resolved field names.
///
/// Values past the known names are dropped when `ignore_extra_columns` is
/// set, otherwise kept as `field<N>` (1-based). Without any names every value
/// gets a generated name.
pub(crate) fn build_record(values: Vec<String>, names: &[String], options: &FormatOptions) -> Record {
    let mut data = Map::new();
    for (idx, value) in values.into_iter().enumerate() {
        match names.get(idx) {
            Some(name) => {
                data.insert(name.clone(), Value::String(value));
            }
            None if names.is_empty() || !options.ignore_extra_columns => {
                data.insert(format!("field{}", idx + 1), Value::String(value));
            }
            None => {}
        }
    }
    Record::new(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_quotes_and_crlf() {
        let values = split_line("\"a,b\",\"c\"\"d\",e\r", &FormatOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(values, vec!["a,b", "c\"d", "e"]);
    }

    #[test]
    fn extra_columns_dropped_or_named() {
        let names = vec!["a".to_string()];
        let mut options = FormatOptions::default();
        let kept = build_record(vec!["1".into(), "2".into()], &names, &options);
        assert_eq!(kept.len(), 1);

        options.ignore_extra_columns = false;
        let all = build_record(vec!["1".into(), "2".into()], &names, &options);
        assert_eq!(all.get("field2"), Some(&Value::from("2")));
    }

    #[test]
    fn unnamed_columns_get_generated_names() {
        let rec = build_record(vec!["x".into(), "y".into()], &[], &FormatOptions::default());
        assert_eq!(rec.get("field1"), Some(&Value::from("x")));
        assert_eq!(rec.get("field2"), Some(&Value::from("y")));
    }
}
