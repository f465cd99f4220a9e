//! HDFS destination.

use super::{Destination, WriteMode};
use crate::error::{ConnectorResult, ErrorKind};
use crate::io::chunks::ChunkGenerator;
use crate::storage::HdfsClient;
use tracing::debug;

/// Writes destinations through an [`HdfsClient`].
///
/// Appending to a file that does not exist yet creates it.
#[derive(Debug, Clone)]
pub struct HdfsDestination<C: HdfsClient> {
    client: C,
}

impl<C: HdfsClient> HdfsDestination<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn append(&self, name: &str, data: &[u8]) -> ConnectorResult<()> {
        match self.client.append(name, data) {
            Err(err) if err.kind == ErrorKind::NotFound => {
                debug!(file = name, "append target missing, creating it");
                self.client.create(name, data, false)
            }
            other => other,
        }
    }
}

impl<C: HdfsClient> Destination for HdfsDestination<C> {
    fn verify(&self, path: &str) -> ConnectorResult<()> {
        self.client.mkdirs(path)
    }

    fn send_to_destination(
        &self,
        name: &str,
        mode: WriteMode,
        chunks: ChunkGenerator<'_>,
    ) -> ConnectorResult<()> {
        for chunk in chunks {
            let chunk = chunk?;
            if mode == WriteMode::Overwrite && chunk.index == 0 {
                self.client.create(name, &chunk.data, true)?;
            } else {
                self.append(name, &chunk.data)?;
            }
            debug!(file = name, index = chunk.index, bytes = chunk.data.len(), "wrote chunk");
        }
        Ok(())
    }
}
