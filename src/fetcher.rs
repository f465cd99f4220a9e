//! Reading the records of one slice from storage.

use crate::config::ReaderConfig;
use crate::error::ConnectorResult;
use crate::io::offsets::SliceDescriptor;
use crate::io::reader::{ChunkReader, ReadBatch};
use crate::record::Record;
use crate::storage::ObjectReader;
use serde_json::Value;

/// Fetches slice bytes with ranged reads and parses them into records.
pub struct Fetcher<S: ObjectReader> {
    storage: S,
    reader: ChunkReader,
}

impl<S: ObjectReader> Fetcher<S> {
    /// # Errors
    /// Returns a configuration error if `config` does not validate.
    pub fn new(storage: S, config: &ReaderConfig) -> ConnectorResult<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            reader: config.chunk_reader()?,
        })
    }

    /// # Errors
    /// Returns a configuration error if the map does not validate.
    pub fn from_value(storage: S, config: Value) -> ConnectorResult<Self> {
        Self::new(storage, &ReaderConfig::from_value(config)?)
    }

    /// The records of `slice`.
    ///
    /// # Errors
    /// As [`read_batch`](Self::read_batch).
    pub fn read(&self, slice: &SliceDescriptor) -> ConnectorResult<Vec<Record>> {
        Ok(self.read_batch(slice)?.records)
    }

    /// The records of `slice` and the number of records rejected.
    ///
    /// # Errors
    /// Propagates read failures and the reader's reject policy.
    pub fn read_batch(&self, slice: &SliceDescriptor) -> ConnectorResult<ReadBatch> {
        self.reader.read(slice, |offset, length| {
            if length == 0 {
                return Ok(Vec::new());
            }
            // Ranged reads take an inclusive end.
            self.storage.read_range(&slice.path, offset, offset + length - 1)
        })
    }
}
