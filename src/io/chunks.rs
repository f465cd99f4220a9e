//! Lazy carving of a record batch into bounded-size upload chunks.
//!
//! Two strategies are used:
//!
//! - **Row-optimized** (`ldjson`, `csv`, `tsv` without compression): records
//!   are encoded one at a time and a chunk is flushed once the buffered text
//!   reaches the threshold. The batch is never formatted into one buffer.
//!   A chunk only exceeds the threshold when a single record is larger than
//!   it, and chunk boundaries always fall between records.
//! - **Whole-buffer** (`json`, or any compression): the batch is formatted and
//!   compressed in one go on the first pull, then sliced into fixed windows.
//!   JSON framing and compressed streams cannot be cut mid-structure, so the
//!   encoded payload is produced whole and only split for transport.
//!
//! Either way, concatenating the `data` of every chunk reproduces
//! `compress(format(records))` exactly. A non-empty run ends with exactly one
//! chunk whose `has_more` is `false`; an empty run yields no chunks.

use crate::error::ConnectorResult;
use crate::io::compression::Compression;
use crate::io::format::{Formatter, RowEncoder};
use crate::record::Record;

/// Default chunk threshold: the smallest non-final part S3 accepts.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// One piece of an encoded batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the run, starting at 0.
    pub index: usize,
    pub data: Vec<u8>,
    /// `false` only on the last chunk of the run.
    pub has_more: bool,
}

enum Strategy<'a> {
    Rows {
        records: std::slice::Iter<'a, Record>,
        encoder: RowEncoder<'a>,
    },
    Buffer {
        source: Option<(&'a Formatter, &'a [Record])>,
        compression: Compression,
        payload: Vec<u8>,
        position: usize,
    },
}

/// Iterator of [`Chunk`]s over one formatted batch.
pub struct ChunkGenerator<'a> {
    strategy: Strategy<'a>,
    chunk_size: usize,
    staged: Option<Vec<u8>>,
    next_index: usize,
    failed: bool,
}

impl<'a> ChunkGenerator<'a> {
    /// Build a generator, choosing the strategy from the format and compression.
    ///
    /// A `chunk_size` of zero is treated as one byte.
    #[must_use]
    pub fn new(
        formatter: &'a Formatter,
        compression: Compression,
        records: &'a [Record],
        chunk_size: usize,
    ) -> Self {
        let strategy = if formatter.kind().is_row_optimized() && compression.is_none() {
            Strategy::Rows {
                records: records.iter(),
                encoder: formatter.row_encoder(),
            }
        } else {
            Strategy::Buffer {
                source: Some((formatter, records)),
                compression,
                payload: Vec::new(),
                position: 0,
            }
        };
        Self {
            strategy,
            chunk_size: chunk_size.max(1),
            staged: None,
            next_index: 0,
            failed: false,
        }
    }

    /// Whether records are emitted incrementally rather than from one buffer.
    #[must_use]
    pub fn is_row_optimized(&self) -> bool {
        matches!(self.strategy, Strategy::Rows { .. })
    }

    /// Produce the bytes of the next chunk, or `None` once exhausted.
    fn fill(&mut self) -> ConnectorResult<Option<Vec<u8>>> {
        let chunk_size = self.chunk_size;
        match &mut self.strategy {
            Strategy::Rows { records, encoder } => {
                let mut buf = Vec::new();
                while buf.len() < chunk_size {
                    let Some(record) = records.next() else { break };
                    encoder.encode(record, &mut buf)?;
                }
                Ok((!buf.is_empty()).then_some(buf))
            }
            Strategy::Buffer {
                source,
                compression,
                payload,
                position,
            } => {
                if let Some((formatter, records)) = source.take() {
                    let formatted = formatter.format(records)?;
                    if !formatted.is_empty() {
                        *payload = compression.compress(&formatted)?;
                    }
                }
                if *position >= payload.len() {
                    return Ok(None);
                }
                let end = (*position + chunk_size).min(payload.len());
                let window = payload[*position..end].to_vec();
                *position = end;
                Ok(Some(window))
            }
        }
    }
}

impl Iterator for ChunkGenerator<'_> {
    type Item = ConnectorResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let current = match self.staged.take() {
            Some(data) => data,
            None => match self.fill() {
                Ok(Some(data)) => data,
                Ok(None) => return None,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            },
        };
        match self.fill() {
            Ok(next) => {
                let has_more = next.is_some();
                self.staged = next;
                let index = self.next_index;
                self.next_index += 1;
                Some(Ok(Chunk {
                    index,
                    data: current,
                    has_more,
                }))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::format::{Format, FormatOptions};
    use serde_json::json;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::from_value(json!({"id": i, "name": format!("name-{i}")}), "data"))
            .collect()
    }

    fn collect(generator: ChunkGenerator<'_>) -> Vec<Chunk> {
        generator.collect::<ConnectorResult<Vec<_>>>().unwrap()
    }

    fn check_terminal(chunks: &[Chunk]) {
        let (last, rest) = chunks.split_last().unwrap();
        assert!(!last.has_more);
        assert!(rest.iter().all(|c| c.has_more));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        for format in [Format::Json, Format::Ldjson, Format::Csv] {
            let f = Formatter::new(format, FormatOptions::default()).unwrap();
            assert_eq!(ChunkGenerator::new(&f, Compression::None, &[], 16).count(), 0);
        }
    }

    #[test]
    fn row_chunks_concatenate_to_formatted_batch() {
        let f = Formatter::new(Format::Ldjson, FormatOptions::default()).unwrap();
        let input = records(50);
        let generator = ChunkGenerator::new(&f, Compression::None, &input, 100);
        assert!(generator.is_row_optimized());
        let chunks = collect(generator);
        assert!(chunks.len() > 1);
        check_terminal(&chunks);
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.clone()).collect();
        assert_eq!(joined, f.format(&input).unwrap());
        for c in &chunks {
            assert!(c.data.ends_with(b"\n"), "row chunks end on a record boundary");
        }
    }

    #[test]
    fn oversized_record_overflows_one_chunk() {
        let f = Formatter::new(Format::Ldjson, FormatOptions::default()).unwrap();
        let input = vec![Record::from_value(json!({"big": "x".repeat(500)}), "data")];
        let chunks = collect(ChunkGenerator::new(&f, Compression::None, &input, 10));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.len() > 10);
        assert!(!chunks[0].has_more);
    }

    #[test]
    fn json_uses_whole_buffer_windows() {
        let f = Formatter::new(Format::Json, FormatOptions::default()).unwrap();
        let input = records(20);
        let generator = ChunkGenerator::new(&f, Compression::None, &input, 64);
        assert!(!generator.is_row_optimized());
        let chunks = collect(generator);
        check_terminal(&chunks);
        let expected = f.format(&input).unwrap();
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.data.len() == 64));
        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
        assert_eq!(joined, expected);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn compressed_payload_is_split_after_compression() {
        let f = Formatter::new(Format::Ldjson, FormatOptions::default()).unwrap();
        let input = records(200);
        let generator = ChunkGenerator::new(&f, Compression::Gzip, &input, 128);
        assert!(!generator.is_row_optimized());
        let chunks = collect(generator);
        check_terminal(&chunks);
        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
        let restored = Compression::Gzip.decompress(&joined).unwrap();
        assert_eq!(restored, f.format(&input).unwrap());
    }

    #[test]
    fn rows_that_encode_to_nothing_still_terminate() {
        let options = FormatOptions {
            fields: vec!["missing".into()],
            ..FormatOptions::default()
        };
        let f = Formatter::new(Format::Csv, options).unwrap();
        let input = records(3);
        assert_eq!(ChunkGenerator::new(&f, Compression::None, &input, 8).count(), 0);
    }
}
