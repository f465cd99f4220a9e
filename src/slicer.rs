//! Enumeration of read slices over a storage listing.

use crate::config::ReaderConfig;
use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use crate::io::offsets::{SliceDescriptor, compute_offsets};
use crate::storage::{ObjectEntry, ObjectReader};
use serde_json::Value;
use tracing::{debug, info};

/// Walks a paginated listing and turns every non-empty entry into slices.
///
/// Each call to [`slice`](Slicer::slice) consumes listing pages until one
/// yields descriptors. Once the listing is exhausted it returns `None`, which
/// the host reads as end of stream.
///
/// Entries are read whole for `json`, file-per-slice sources and compressed
/// content; anything else is cut into `size`-byte ranges that overlap by the
/// line delimiter.
pub struct Slicer<S: ObjectReader> {
    storage: S,
    config: ReaderConfig,
    cursor: Option<String>,
    done: bool,
}

impl<S: ObjectReader> Slicer<S> {
    /// # Errors
    /// Returns a configuration error if `config` does not validate.
    pub fn new(storage: S, config: ReaderConfig) -> ConnectorResult<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            config,
            cursor: None,
            done: false,
        })
    }

    /// # Errors
    /// Returns a configuration error if the map does not validate.
    pub fn from_value(storage: S, config: Value) -> ConnectorResult<Self> {
        Self::new(storage, ReaderConfig::from_value(config)?)
    }

    #[must_use]
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The next group of slices, or `None` once the listing is exhausted.
    ///
    /// # Errors
    /// Propagates listing failures; the cursor is left where it was, so the
    /// same page is requested again on the next call.
    pub fn slice(&mut self) -> ConnectorResult<Option<Vec<SliceDescriptor>>> {
        while !self.done {
            let page = self.storage.list(&self.config.path, self.cursor.as_deref())?;
            match page.next_token {
                Some(token) => self.cursor = Some(token),
                None => self.done = true,
            }
            let slices: Vec<SliceDescriptor> = page
                .entries
                .iter()
                .filter(|e| e.size > 0)
                .flat_map(|e| self.slices_for(e))
                .collect();
            if !slices.is_empty() {
                debug!(
                    path = %self.config.path,
                    entries = page.entries.len(),
                    slices = slices.len(),
                    "sliced listing page"
                );
                return Ok(Some(slices));
            }
        }
        Ok(None)
    }

    fn slices_for(&self, entry: &ObjectEntry) -> Vec<SliceDescriptor> {
        if self.config.whole_file() {
            return vec![SliceDescriptor::whole(entry.path.clone(), entry.size)];
        }
        compute_offsets(self.config.size, entry.size, &self.config.line_delimiter)
            .into_iter()
            .map(|r| SliceDescriptor::new(entry.path.clone(), r.offset, r.length, entry.size))
            .collect()
    }

    /// Whether an interrupted run may be restarted with [`recover`](Self::recover).
    #[must_use]
    pub fn recoverable(&self) -> bool {
        self.config.autorecover
    }

    /// Restart the listing from the beginning.
    ///
    /// # Errors
    /// Returns an `InvalidInput` error unless `autorecover` is enabled.
    pub fn recover(&mut self) -> ConnectorResult<()> {
        if !self.recoverable() {
            return Err(ConnectorError::new(
                ErrorKind::InvalidInput,
                format!("slicer for {} is not recoverable", self.config.path),
            ));
        }
        info!(path = %self.config.path, "restarting listing");
        self.cursor = None;
        self.done = false;
        Ok(())
    }
}
