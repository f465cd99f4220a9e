//! # Ironbeam Files
//!
//! Chunked **file connectors** for batch pipelines: slice large files into
//! byte ranges, reassemble well-formed records from each range, and write
//! record batches back out in bounded-size chunks to the local filesystem,
//! HDFS or S3.
//!
//! ## Key Features
//!
//! - **Byte-range slicing** - split files into overlapping ranges that can be
//!   read independently and in parallel by different workers
//! - **Record reassembly** - a slice reads past its end to complete its last
//!   record and drops the fragment owned by the previous slice
//! - **Formats** - `json`, `ldjson`, `csv`, `tsv` and `raw`
//! - **Compression** - `gzip` and `lz4` (optional via feature flags)
//! - **Chunked writes** - row-by-row chunking for line formats, multipart
//!   uploads for large S3 objects
//! - **Dynamic routing** - per-record destination subpaths
//! - **In-memory fakes** - test connector code without a cluster
//!
//! ## Quick Start
//!
//! ```
//! use ironbeam_files::*;
//! use ironbeam_files::storage::FakeS3Client;
//! use ironbeam_files::sender::S3Destination;
//! use serde_json::json;
//!
//! # fn main() -> ConnectorResult<()> {
//! let s3 = FakeS3Client::new();
//!
//! // Write a batch; S3 cannot append, so each send is its own object
//! let config = SenderConfig::from_value(json!({
//!     "id": "w1",
//!     "path": "bucket/events",
//!     "file_per_slice": true,
//! }))?;
//! let mut sender = ChunkedSender::new(S3Destination::new(s3.clone()), config)?;
//! sender.send(vec![
//!     Record::from_value(json!({"user": "alice"}), "data"),
//!     Record::from_value(json!({"user": "bob"}), "data"),
//! ])?;
//!
//! // Slice and read it back
//! let config = ReaderConfig::from_value(json!({"path": "bucket/events", "size": 16}))?;
//! let mut slicer = Slicer::new(s3.clone(), config.clone())?;
//! let fetcher = Fetcher::new(s3, &config)?;
//! let mut records = Vec::new();
//! while let Some(slices) = slicer.slice()? {
//!     for slice in &slices {
//!         records.extend(fetcher.read(slice)?);
//!     }
//! }
//! assert_eq!(records.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`io`] - offsets, record reassembly, formats, compression, chunking, naming
//! - [`sender`] - the chunked sender and its destinations
//! - [`slicer`] / [`fetcher`] - the read-side drivers
//! - [`storage`] - storage client traits, the local store and in-memory fakes
//! - [`config`] - typed, validated connector configuration
//! - [`testing`] - fixtures and assertions for tests

pub mod config;
pub mod error;
pub mod fetcher;
pub mod io;
pub mod record;
pub mod sender;
pub mod slicer;
pub mod storage;
pub mod testing;

// Re-export commonly used items
pub use config::{ReaderConfig, SenderConfig};
pub use error::{ConnectorError, ConnectorResult, ErrorKind};
pub use fetcher::Fetcher;
pub use io::chunks::{Chunk, ChunkGenerator};
pub use io::compression::Compression;
pub use io::format::{Format, FormatOptions, Formatter};
pub use io::naming::{NamingConfig, create_destination_name, resolve_batches};
pub use io::offsets::{ByteRange, SliceDescriptor, compute_offsets};
pub use io::reader::{ChunkReader, ReadBatch, RejectAction};
pub use record::{Record, SourceInfo};
pub use sender::{ChunkedSender, Destination, WriteMode};
pub use slicer::Slicer;
