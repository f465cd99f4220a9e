//! Destination naming and per-record routing.
//!
//! Output objects are named
//! `<basePath>/<id>[.<sliceCount>]<.extension-or-derived>[.gz|.lz4]`:
//! an explicit extension replaces the whole derived suffix, otherwise the
//! suffix is the format's extension (none for `raw`) followed by the
//! compression's. Stored objects depend on these exact strings.

use crate::error::{ConnectorError, ConnectorResult};
use crate::io::compression::Compression;
use crate::io::format::Format;
use crate::record::Record;
use std::collections::HashMap;

/// Inputs to [`create_destination_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConfig {
    /// Stable writer identifier, e.g. a worker id.
    pub id: String,
    pub file_per_slice: bool,
    /// Required when `file_per_slice` is set.
    pub slice_count: Option<u64>,
    pub extension: Option<String>,
    pub format: Format,
    pub compression: Compression,
}

/// Join a base path and a segment with exactly one `/` between them.
#[must_use]
pub fn join_path(base: &str, segment: &str) -> String {
    let segment = segment.trim_start_matches('/');
    if base.is_empty() {
        segment.to_string()
    } else if base.ends_with('/') {
        format!("{base}{segment}")
    } else {
        format!("{base}/{segment}")
    }
}

/// Compute the fully-qualified destination name for a base path.
///
/// # Examples
/// ```
/// use ironbeam_files::io::compression::Compression;
/// use ironbeam_files::io::format::Format;
/// use ironbeam_files::io::naming::{create_destination_name, NamingConfig};
///
/// let naming = NamingConfig {
///     id: "w1".into(),
///     file_per_slice: true,
///     slice_count: Some(2),
///     extension: Some("txt".into()),
///     format: Format::Ldjson,
///     compression: Compression::None,
/// };
/// assert_eq!(create_destination_name("/data/", &naming).unwrap(), "/data/w1.2.txt");
/// ```
///
/// # Errors
/// Returns a configuration error when `id` is empty or when `file_per_slice`
/// is set without a slice count.
pub fn create_destination_name(base_path: &str, naming: &NamingConfig) -> ConnectorResult<String> {
    if naming.id.is_empty() {
        return Err(ConnectorError::configuration(
            "naming requires a non-empty id",
        ));
    }
    let mut name = join_path(base_path, &naming.id);
    if naming.file_per_slice {
        let count = naming.slice_count.ok_or_else(|| {
            ConnectorError::configuration("slice_count is required when file_per_slice is set")
        })?;
        name.push('.');
        name.push_str(&count.to_string());
    }
    match naming.extension.as_deref().filter(|e| !e.is_empty()) {
        Some(ext) => {
            if !ext.starts_with('.') {
                name.push('.');
            }
            name.push_str(ext);
        }
        None => {
            name.push_str(naming.format.extension());
            name.push_str(naming.compression.extension());
        }
    }
    Ok(name)
}

/// Records bound for one destination path.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteBatch {
    pub path: String,
    pub records: Vec<Record>,
}

/// Partition records by destination path.
///
/// The base path always has an entry, first, even when it ends up empty.
/// Other paths follow in the order they were first seen. Route overrides are
/// only honored with `dynamic_routing`.
#[must_use]
pub fn resolve_batches(records: Vec<Record>, base_path: &str, dynamic_routing: bool) -> Vec<RouteBatch> {
    let mut batches = vec![RouteBatch {
        path: base_path.to_string(),
        records: Vec::new(),
    }];
    if !dynamic_routing {
        batches[0].records = records;
        return batches;
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    index.insert(base_path.to_string(), 0);
    for record in records {
        let path = match record.route() {
            Some(route) => join_path(base_path, route),
            None => base_path.to_string(),
        };
        let slot = *index.entry(path.clone()).or_insert_with(|| {
            batches.push(RouteBatch {
                path,
                records: Vec::new(),
            });
            batches.len() - 1
        });
        batches[slot].records.push(record);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn naming(format: Format, compression: Compression) -> NamingConfig {
        NamingConfig {
            id: "w1".into(),
            file_per_slice: false,
            slice_count: None,
            extension: None,
            format,
            compression,
        }
    }

    #[test]
    fn derived_extensions() {
        let cases = [
            (Format::Ldjson, Compression::None, "/out/w1.ldjson"),
            (Format::Json, Compression::Gzip, "/out/w1.json.gz"),
            (Format::Csv, Compression::Lz4, "/out/w1.csv.lz4"),
            (Format::Raw, Compression::None, "/out/w1"),
            (Format::Raw, Compression::Gzip, "/out/w1.gz"),
        ];
        for (format, compression, expected) in cases {
            assert_eq!(
                create_destination_name("/out", &naming(format, compression)).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn slice_count_and_override() {
        let mut cfg = naming(Format::Json, Compression::Gzip);
        cfg.file_per_slice = true;
        cfg.slice_count = Some(0);
        assert_eq!(create_destination_name("b/p", &cfg).unwrap(), "b/p/w1.0.json.gz");
        cfg.extension = Some(".dat".into());
        assert_eq!(create_destination_name("b/p", &cfg).unwrap(), "b/p/w1.0.dat");
    }

    #[test]
    fn missing_slice_count_is_configuration_error() {
        let mut cfg = naming(Format::Ldjson, Compression::None);
        cfg.file_per_slice = true;
        assert!(create_destination_name("/p", &cfg).unwrap_err().is_configuration());
        cfg.id.clear();
        assert!(create_destination_name("/p", &cfg).unwrap_err().is_configuration());
    }

    #[test]
    fn routes_partition_records() {
        let rec = |n: i32| Record::from_value(json!({"n": n}), "data");
        let records = vec![rec(1).with_route("a"), rec(2).with_route("b"), rec(3), rec(4).with_route("a")];
        let batches = resolve_batches(records, "p", true);
        let summary: Vec<(&str, usize)> = batches.iter().map(|b| (b.path.as_str(), b.records.len())).collect();
        assert_eq!(summary, vec![("p", 1), ("p/a", 2), ("p/b", 1)]);
    }

    #[test]
    fn routes_ignored_without_dynamic_routing() {
        let records = vec![Record::default().with_route("a")];
        let batches = resolve_batches(records, "p", false);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].records.len(), 1);
    }

    #[test]
    fn base_entry_exists_when_empty() {
        let records = vec![Record::default().with_route("x")];
        let batches = resolve_batches(records, "p/", true);
        assert_eq!(batches[0].path, "p/");
        assert!(batches[0].records.is_empty());
        assert_eq!(batches[1].path, "p/x");
    }
}
