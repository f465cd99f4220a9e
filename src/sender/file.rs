//! Local filesystem destination.

use super::{Destination, WriteMode};
use crate::error::ConnectorResult;
use crate::io::chunks::ChunkGenerator;
use crate::storage::LocalFileStore;
use tracing::debug;

/// Writes destinations as files, creating their directories on demand.
#[derive(Debug, Clone, Default)]
pub struct FileDestination {
    store: LocalFileStore,
}

impl FileDestination {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Destination for FileDestination {
    fn verify(&self, path: &str) -> ConnectorResult<()> {
        self.store.create_dir_all(path)
    }

    fn send_to_destination(
        &self,
        name: &str,
        mode: WriteMode,
        chunks: ChunkGenerator<'_>,
    ) -> ConnectorResult<()> {
        for chunk in chunks {
            let chunk = chunk?;
            let append = mode == WriteMode::Append || chunk.index > 0;
            self.store.write(name, &chunk.data, append)?;
            debug!(file = name, index = chunk.index, bytes = chunk.data.len(), "wrote chunk");
        }
        Ok(())
    }
}
