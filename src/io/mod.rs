//! Byte-level building blocks shared by the read and write paths.
//!
//! - [`offsets`] - byte-range slicing of a file
//! - [`reader`] - reassembly of records from a slice
//! - [`format`] - record codecs (`json`, `ldjson`, `csv`, `tsv`, `raw`)
//! - [`compression`] - whole-buffer codecs (`gzip`, `lz4`)
//! - [`chunks`] - lazy carving of a batch into upload chunks
//! - [`naming`] - destination names and per-record routing

pub mod chunks;
pub mod compression;
pub mod format;
pub mod naming;
pub mod offsets;
pub mod reader;
