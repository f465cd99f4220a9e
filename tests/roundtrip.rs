mod common;

use anyhow::Result;
use common::{init_tracing, read_all};
use ironbeam_files::sender::{FileDestination, S3Destination};
use ironbeam_files::storage::{FakeS3Client, LocalFileStore};
use ironbeam_files::testing::{TempDirPath, assert_records_equal, sample_records, sample_string_records};
use ironbeam_files::{ChunkedSender, Format, ReaderConfig, SenderConfig};
use serde_json::json;

#[test]
fn line_formats_survive_s3_roundtrip() -> Result<()> {
    init_tracing();
    for format in ["ldjson", "csv", "tsv"] {
        let s3 = FakeS3Client::new();
        let path = format!("bucket/{format}");
        let sender_config = SenderConfig::from_value(json!({
            "id": "w1",
            "path": path,
            "format": format,
            "fields": ["id", "word"],
            "include_header": true,
            "file_per_slice": true,
            "chunk_size": 40,
        }))?;
        let mut sender = ChunkedSender::new(S3Destination::new(s3.clone()), sender_config)?;
        let records = sample_string_records(12);
        sender.send(records.clone())?;

        let reader_config = ReaderConfig::from_value(json!({
            "path": path,
            "format": format,
            "fields": ["id", "word"],
            "size": 30,
        }))?;
        assert_records_equal(&read_all(&s3, &reader_config)?, &records);
    }
    Ok(())
}

#[test]
fn json_slices_roundtrip_through_local_files() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let sender_config = SenderConfig {
        id: "w1".into(),
        path: tmp.path_str(),
        format: Format::Json,
        file_per_slice: true,
        ..SenderConfig::default()
    };
    let mut sender = ChunkedSender::new(FileDestination::new(), sender_config)?;
    let first = sample_records(3);
    let second = sample_records(4);
    sender.send(first.clone())?;
    sender.send(second.clone())?;

    let reader_config = ReaderConfig {
        path: tmp.path_str(),
        format: Format::Json,
        file_per_slice: true,
        ..ReaderConfig::default()
    };
    let mut expected = first;
    expected.extend(second);
    assert_records_equal(&read_all(&LocalFileStore::new(), &reader_config)?, &expected);
    Ok(())
}

#[cfg(feature = "compression-lz4")]
#[test]
fn compressed_ldjson_roundtrip() -> Result<()> {
    use ironbeam_files::Compression;

    let s3 = FakeS3Client::new();
    let mut sender_config = SenderConfig::from_value(json!({"id": "w1", "path": "bucket/lz"}))?;
    sender_config.compression = Compression::Lz4;
    sender_config.file_per_slice = true;
    sender_config.chunk_size = 50;
    let mut sender = ChunkedSender::new(S3Destination::new(s3.clone()), sender_config)?;
    let records = sample_records(40);
    sender.send(records.clone())?;
    assert_eq!(s3.object_paths(), vec!["bucket/lz/w1.0.ldjson.lz4".to_string()]);

    let reader_config = ReaderConfig {
        path: "bucket/lz".into(),
        compression: Compression::Lz4,
        size: 8,
        ..ReaderConfig::default()
    };
    assert_records_equal(&read_all(&s3, &reader_config)?, &records);
    Ok(())
}
