//! Chunked record senders.
//!
//! A [`ChunkedSender`] owns the backend-independent part of writing a batch:
//! routing records to destination paths, naming destinations, making sure each
//! path exists, carving the payload into chunks and fanning the writes out
//! with bounded concurrency. The backend itself is a [`Destination`]:
//!
//! - [`FileDestination`] - the local filesystem
//! - [`HdfsDestination`] - any [`HdfsClient`](crate::storage::HdfsClient)
//! - [`S3Destination`] - any [`S3Client`](crate::storage::S3Client), using
//!   multipart uploads for multi-chunk payloads
//!
//! ```no_run
//! use ironbeam_files::{ChunkedSender, Record, SenderConfig};
//! use ironbeam_files::sender::FileDestination;
//! use serde_json::json;
//!
//! # fn main() -> ironbeam_files::ConnectorResult<()> {
//! let config = SenderConfig::from_value(json!({"id": "w1", "path": "/tmp/out"}))?;
//! let mut sender = ChunkedSender::new(FileDestination::new(), config)?;
//! let sent = sender.send(vec![Record::from_value(json!({"a": 1}), "data")])?;
//! assert_eq!(sent, 1);
//! # Ok(())
//! # }
//! ```

pub mod file;
pub mod hdfs;
pub mod multipart;
pub mod s3;

pub use file::FileDestination;
pub use hdfs::HdfsDestination;
pub use multipart::{MAX_PENDING_PARTS, MultipartUploader, UploadPhase};
pub use s3::S3Destination;

use crate::config::SenderConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::io::chunks::ChunkGenerator;
use crate::io::format::Formatter;
use crate::io::naming::{RouteBatch, create_destination_name, resolve_batches};
use crate::record::Record;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[cfg(feature = "parallel-io")]
use rayon::prelude::*;

/// How the chunks of one write land in an existing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The first chunk replaces any existing content; later chunks append.
    Overwrite,
    /// Every chunk appends.
    Append,
}

/// A storage backend a [`ChunkedSender`] writes to.
pub trait Destination: Send + Sync {
    /// Make sure `path` can receive writes, creating it if needed.
    ///
    /// Called at most once per distinct path per sender.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be checked or created
    fn verify(&self, path: &str) -> ConnectorResult<()>;

    /// Whether a write can extend existing content with [`WriteMode::Append`].
    ///
    /// Senders that do not write one file per slice append every send to the
    /// same destinations, so they refuse backends that answer `false`.
    fn supports_append(&self) -> bool {
        true
    }

    /// Write every chunk to the destination `name`.
    ///
    /// # Errors
    ///
    /// Returns the first chunk or write failure; the write is not resumed
    fn send_to_destination(
        &self,
        name: &str,
        mode: WriteMode,
        chunks: ChunkGenerator<'_>,
    ) -> ConnectorResult<()>;
}

struct Job {
    name: String,
    records: Vec<Record>,
}

/// Writes record batches to a [`Destination`].
///
/// A sender is stateful: it counts its sends (for file-per-slice naming),
/// remembers which paths it has verified and caches destination names. Share
/// one across threads only behind a lock.
pub struct ChunkedSender<D: Destination> {
    destination: D,
    config: SenderConfig,
    formatter: Formatter,
    slice_count: u64,
    verified_paths: HashSet<String>,
    names: HashMap<String, String>,
    #[cfg(feature = "parallel-io")]
    pool: rayon::ThreadPool,
}

impl<D: Destination> ChunkedSender<D> {
    /// # Errors
    /// Returns a configuration error if `config` does not validate, or if it
    /// appends across sends and the destination cannot append.
    pub fn new(destination: D, config: SenderConfig) -> ConnectorResult<Self> {
        config.validate()?;
        if !config.file_per_slice && !destination.supports_append() {
            return Err(ConnectorError::configuration(
                "destination cannot append to existing objects; set file_per_slice",
            ));
        }
        let formatter = config.formatter()?;
        #[cfg(feature = "parallel-io")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .thread_name(|i| format!("sender-{i}"))
            .build()
            .map_err(|e| {
                ConnectorError::configuration("failed to build sender thread pool").with_source(e.to_string())
            })?;
        Ok(Self {
            destination,
            config,
            formatter,
            slice_count: 0,
            verified_paths: HashSet::new(),
            names: HashMap::new(),
            #[cfg(feature = "parallel-io")]
            pool,
        })
    }

    /// Build a sender from a host configuration map.
    ///
    /// # Errors
    /// Returns a configuration error if the map does not validate.
    pub fn from_value(destination: D, config: Value) -> ConnectorResult<Self> {
        Self::new(destination, SenderConfig::from_value(config)?)
    }

    #[must_use]
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    #[must_use]
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Number of sends so far.
    #[must_use]
    pub fn slice_count(&self) -> u64 {
        self.slice_count
    }

    /// Route `records` to their destinations and write them.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    /// Returns the error of a failed path check, or of the failed
    /// destination writes (aggregated when several fail).
    pub fn send(&mut self, records: Vec<Record>) -> ConnectorResult<usize> {
        let batches = resolve_batches(records, &self.config.path, self.config.dynamic_routing);
        self.dispatch(batches)
    }

    /// Write `records` to the base path, ignoring route overrides.
    ///
    /// # Errors
    /// As [`send`](Self::send).
    pub fn simple_send(&mut self, records: Vec<Record>) -> ConnectorResult<usize> {
        let batch = RouteBatch {
            path: self.config.path.clone(),
            records,
        };
        self.dispatch(vec![batch])
    }

    fn dispatch(&mut self, batches: Vec<RouteBatch>) -> ConnectorResult<usize> {
        let slice = self.slice_count;
        self.slice_count += 1;
        if !self.config.file_per_slice && slice > 0 {
            // Appending to the same destinations: the header is already there.
            self.formatter.set_include_header(false);
        }

        let mut jobs = Vec::with_capacity(batches.len());
        for batch in batches {
            if batch.records.is_empty() {
                continue;
            }
            self.ensure_path(&batch.path)?;
            let name = self.destination_name(&batch.path, slice)?;
            jobs.push(Job {
                name,
                records: batch.records,
            });
        }
        if jobs.is_empty() {
            return Ok(0);
        }

        let mode = if self.config.file_per_slice {
            WriteMode::Overwrite
        } else {
            WriteMode::Append
        };
        debug!(slice, destinations = jobs.len(), "dispatching batch");

        let mut sent = 0;
        let mut errors = Vec::new();
        for result in self.write_all(&jobs, mode) {
            match result {
                Ok(count) => sent += count,
                Err(err) => errors.push(err),
            }
        }
        if errors.is_empty() {
            Ok(sent)
        } else {
            Err(ConnectorError::aggregate(errors))
        }
    }

    #[cfg(feature = "parallel-io")]
    fn write_all(&self, jobs: &[Job], mode: WriteMode) -> Vec<ConnectorResult<usize>> {
        self.pool
            .install(|| jobs.par_iter().map(|job| self.write(job, mode)).collect())
    }

    #[cfg(not(feature = "parallel-io"))]
    fn write_all(&self, jobs: &[Job], mode: WriteMode) -> Vec<ConnectorResult<usize>> {
        jobs.iter().map(|job| self.write(job, mode)).collect()
    }

    fn write(&self, job: &Job, mode: WriteMode) -> ConnectorResult<usize> {
        let chunks = ChunkGenerator::new(
            &self.formatter,
            self.config.compression,
            &job.records,
            self.config.chunk_size,
        );
        self.destination.send_to_destination(&job.name, mode, chunks)?;
        info!(destination = %job.name, records = job.records.len(), "wrote batch");
        Ok(job.records.len())
    }

    fn ensure_path(&mut self, path: &str) -> ConnectorResult<()> {
        if self.verified_paths.contains(path) {
            return Ok(());
        }
        self.destination.verify(path)?;
        debug!(path, "verified destination path");
        self.verified_paths.insert(path.to_string());
        Ok(())
    }

    fn destination_name(&mut self, path: &str, slice: u64) -> ConnectorResult<String> {
        if self.config.file_per_slice {
            return create_destination_name(path, &self.config.naming(slice));
        }
        if let Some(name) = self.names.get(path) {
            return Ok(name.clone());
        }
        let name = create_destination_name(path, &self.config.naming(slice))?;
        self.names.insert(path.to_string(), name.clone());
        Ok(name)
    }
}
