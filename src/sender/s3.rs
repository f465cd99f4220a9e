//! S3 destination.

use super::multipart::MultipartUploader;
use super::{Destination, WriteMode};
use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use crate::io::chunks::{Chunk, ChunkGenerator};
use crate::storage::{S3Client, split_bucket_key};
use std::sync::Arc;
use tracing::debug;

/// Writes destinations as S3 objects named `bucket/key`.
///
/// A payload that fits in one chunk is written with a single put. Larger
/// payloads become a multipart upload whose part numbers are the chunk
/// indices plus one. Objects are always replaced whole: S3 cannot append,
/// so senders writing here must use one file per slice.
pub struct S3Destination<C: S3Client + ?Sized + 'static> {
    client: Arc<C>,
}

impl<C: S3Client + 'static> S3Destination<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl<C: S3Client + ?Sized + 'static> S3Destination<C> {
    pub fn from_arc(client: Arc<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

fn part_number(chunk: &Chunk) -> ConnectorResult<i32> {
    i32::try_from(chunk.index + 1).map_err(|_| {
        ConnectorError::new(
            ErrorKind::InvalidInput,
            format!("chunk index {} exceeds the multipart part range", chunk.index),
        )
    })
}

impl<C: S3Client + ?Sized + 'static> Destination for S3Destination<C> {
    fn verify(&self, path: &str) -> ConnectorResult<()> {
        let (bucket, _) = split_bucket_key(path)?;
        self.client.ensure_bucket(bucket)
    }

    fn supports_append(&self) -> bool {
        false
    }

    fn send_to_destination(
        &self,
        name: &str,
        mode: WriteMode,
        mut chunks: ChunkGenerator<'_>,
    ) -> ConnectorResult<()> {
        if mode == WriteMode::Append {
            return Err(ConnectorError::new(
                ErrorKind::InvalidInput,
                format!("cannot append to S3 object {name}"),
            ));
        }
        let (bucket, key) = split_bucket_key(name)?;
        let Some(first) = chunks.next().transpose()? else {
            return Ok(());
        };
        if !first.has_more {
            debug!(bucket, key, bytes = first.data.len(), "writing object in one put");
            return self.client.put_object(bucket, key, &first.data);
        }

        let mut uploader = MultipartUploader::new(Arc::clone(&self.client), bucket, key);
        uploader.start()?;
        let number = part_number(&first)?;
        uploader.enqueue_part(first.data, number)?;
        for chunk in chunks {
            let chunk = chunk?;
            let number = part_number(&chunk)?;
            uploader.enqueue_part(chunk.data, number)?;
        }
        uploader.finish()
    }
}
