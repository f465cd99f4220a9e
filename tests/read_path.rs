mod common;

use anyhow::Result;
use common::{init_tracing, read_all};
use ironbeam_files::storage::{FakeS3Client, LocalFileStore};
use ironbeam_files::testing::{TempDirPath, assert_records_equal, ldjson_text};
#[cfg(feature = "compression-gzip")]
use ironbeam_files::Compression;
use ironbeam_files::{ErrorKind, Fetcher, Format, ReaderConfig, Record, RejectAction, SliceDescriptor, Slicer};
use serde_json::{Value, json};
use std::fs;

fn values(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({"n": i, "pad": "z".repeat(i % 7)}))
        .collect()
}

fn records(values: &[Value]) -> Vec<Record> {
    values.iter().cloned().map(|v| Record::from_value(v, "data")).collect()
}

#[test]
fn every_slice_size_reads_each_record_once() -> Result<()> {
    init_tracing();
    let tmp = TempDirPath::new()?;
    let input = values(40);
    fs::write(tmp.join("a.ldjson"), ldjson_text(&input))?;
    fs::write(tmp.join("b.ldjson"), ldjson_text(&input[..5]))?;

    let mut expected = records(&input);
    expected.extend(records(&input[..5]));
    for size in [2, 3, 7, 16, 33, 100, 10_000] {
        let config = ReaderConfig {
            path: tmp.path_str(),
            size,
            margin_size: 5,
            ..ReaderConfig::default()
        };
        let read = read_all(&LocalFileStore::new(), &config)?;
        assert_records_equal(&read, &expected);
    }
    Ok(())
}

#[test]
fn multi_byte_delimiter_partitions_exactly() -> Result<()> {
    let s3 = FakeS3Client::new();
    let input = values(25);
    let content: String = input.iter().map(|v| format!("{v}\r\n")).collect();
    s3.insert_object("bucket/in/data.ldjson", content);

    for size in [3, 11, 64] {
        let config = ReaderConfig {
            path: "bucket/in".into(),
            size,
            line_delimiter: "\r\n".into(),
            margin_size: 4,
            ..ReaderConfig::default()
        };
        assert_records_equal(&read_all(&s3, &config)?, &records(&input));
    }
    Ok(())
}

#[test]
fn csv_header_is_consumed_once() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let mut content = String::from("\"id\",\"word\"\n");
    for i in 0..30 {
        content.push_str(&format!("\"{i}\",\"w{i}\"\n"));
    }
    fs::write(tmp.join("in.csv"), content)?;

    let config = ReaderConfig {
        path: tmp.path_str(),
        format: Format::Csv,
        fields: vec!["id".into(), "word".into()],
        size: 25,
        ..ReaderConfig::default()
    };
    let read = read_all(&LocalFileStore::new(), &config)?;
    let expected: Vec<Record> = (0..30)
        .map(|i| Record::from_value(json!({"id": i.to_string(), "word": format!("w{i}")}), "data"))
        .collect();
    assert_records_equal(&read, &expected);
    Ok(())
}

#[test]
fn tsv_reads_tabs_whatever_the_configured_delimiter() -> Result<()> {
    let tmp = TempDirPath::new()?;
    fs::write(tmp.join("in.tsv"), "a\tb\n1\t2\n")?;
    let config = ReaderConfig::from_value(json!({
        "path": tmp.path_str(),
        "format": "tsv",
        "field_delimiter": ",",
    }))?;
    let read = read_all(&LocalFileStore::new(), &config)?;
    assert_records_equal(&read, &[Record::from_value(json!({"a": "1", "b": "2"}), "data")]);
    Ok(())
}

#[test]
fn json_documents_are_read_whole() -> Result<()> {
    let s3 = FakeS3Client::new();
    s3.insert_object("bucket/in/a.json", serde_json::to_vec(&values(12))?);
    let config = ReaderConfig {
        path: "bucket/in".into(),
        format: Format::Json,
        size: 8,
        ..ReaderConfig::default()
    };
    let mut slicer = Slicer::new(s3.clone(), config.clone())?;
    let slices = slicer.slice()?.unwrap();
    assert_eq!(slices.len(), 1);
    assert_eq!(slices[0].offset, 0);
    assert_records_equal(&Fetcher::new(s3, &config)?.read(&slices[0])?, &records(&values(12)));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn compressed_files_are_never_sub_sliced() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let input = values(50);
    let compressed = Compression::Gzip.compress(ldjson_text(&input).as_bytes())?;
    fs::write(tmp.join("in.ldjson.gz"), compressed)?;
    let config = ReaderConfig {
        path: tmp.path_str(),
        compression: Compression::Gzip,
        size: 10,
        ..ReaderConfig::default()
    };
    let mut slicer = Slicer::new(LocalFileStore::new(), config.clone())?;
    assert_eq!(slicer.slice()?.unwrap().len(), 1);
    assert_records_equal(&read_all(&LocalFileStore::new(), &config)?, &records(&input));
    Ok(())
}

#[test]
fn raw_lines_land_in_the_payload_field() -> Result<()> {
    let tmp = TempDirPath::new()?;
    fs::write(tmp.join("in.txt"), "alpha\nbeta\n\ngamma\ndelt")?;
    let config = ReaderConfig {
        path: tmp.path_str(),
        format: Format::Raw,
        raw_field: "line".into(),
        ..ReaderConfig::default()
    };
    let read = read_all(&LocalFileStore::new(), &config)?;
    let expected: Vec<Record> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|l| Record::from_value(json!({"line": l}), "data"))
        .collect();
    assert_records_equal(&read, &expected);
    Ok(())
}

#[test]
fn reject_policy_applies_to_bad_lines() -> Result<()> {
    let tmp = TempDirPath::new()?;
    fs::write(tmp.join("in.ldjson"), "{\"a\":1}\nnot json\n{\"a\":2}\n")?;
    let slice = SliceDescriptor::whole(tmp.join("in.ldjson"), 25);

    let log = ReaderConfig {
        path: tmp.path_str(),
        ..ReaderConfig::default()
    };
    let batch = Fetcher::new(LocalFileStore::new(), &log)?.read_batch(&slice)?;
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.rejected, 1);

    let throw = ReaderConfig {
        on_reject: RejectAction::Throw,
        ..log
    };
    let err = Fetcher::new(LocalFileStore::new(), &throw)?.read(&slice).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Format);
    Ok(())
}

#[test]
fn records_carry_their_source() -> Result<()> {
    let s3 = FakeS3Client::new();
    s3.insert_object("bucket/in.ldjson", ldjson_text(&values(4)));
    let config = ReaderConfig {
        path: "bucket/in".into(),
        size: 20,
        ..ReaderConfig::default()
    };
    let mut slicer = Slicer::new(s3.clone(), config.clone())?;
    let fetcher = Fetcher::new(s3, &config)?;
    let slices = slicer.slice()?.unwrap();
    let second = &slices[1];
    for record in fetcher.read(second)? {
        let source = record.metadata.source.unwrap();
        assert_eq!(source.path, "bucket/in.ldjson");
        assert_eq!(source.offset, second.offset);
        assert_eq!(source.length, second.length);
    }
    Ok(())
}

#[test]
fn file_per_slice_sources_read_each_file_whole() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let formatted = ldjson_text(&values(9));
    fs::write(tmp.join("w1.0.ldjson"), &formatted)?;
    fs::write(tmp.join("w1.1.ldjson"), &formatted)?;
    let config = ReaderConfig {
        path: tmp.path_str(),
        file_per_slice: true,
        size: 4,
        ..ReaderConfig::default()
    };
    let mut slicer = Slicer::new(LocalFileStore::new(), config)?;
    let slices = slicer.slice()?.unwrap();
    assert_eq!(slices.len(), 2);
    assert!(slices.iter().all(|s| s.offset == 0 && s.length == formatted.len() as u64));
    assert!(slicer.slice()?.is_none());
    Ok(())
}

#[test]
fn missing_source_fails_the_listing() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let config = ReaderConfig {
        path: tmp.join("nope"),
        ..ReaderConfig::default()
    };
    let mut slicer = Slicer::new(LocalFileStore::new(), config)?;
    assert_eq!(slicer.slice().unwrap_err().kind, ErrorKind::NotFound);
    Ok(())
}
