//! Whole-buffer compression for formatted payloads.
//!
//! Compression is applied to a fully formatted batch before it is chunked for
//! transport, and undone on a whole fetched object before parsing. It is never
//! applied per chunk, so a compressed frame is never split across writes.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Lz4** (`.lz4`) - block format with a size prefix, via `lz4_flex`
//!   (feature: `compression-lz4`)
//!
//! Selecting a codec whose feature is disabled is a configuration error.

use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A compression algorithm operating on whole buffers.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Compress the whole input buffer.
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;

    /// Decompress the whole input buffer.
    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Compression scheme selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Lz4,
}

impl Compression {
    /// The codec backing this scheme; `None` means identity.
    ///
    /// # Errors
    /// Returns a configuration error when the codec's feature is not compiled in.
    pub fn codec(self) -> ConnectorResult<Option<&'static dyn CompressionCodec>> {
        match self {
            Self::None => Ok(None),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Some(&GzipCodec)),
            #[cfg(feature = "compression-lz4")]
            Self::Lz4 => Ok(Some(&Lz4Codec)),
            #[allow(unreachable_patterns)]
            other => Err(ConnectorError::configuration(format!(
                "{other} compression support is not compiled in"
            ))),
        }
    }

    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Extension suffix for destination names (`""`, `".gz"` or `".lz4"`).
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Lz4 => ".lz4",
        }
    }

    /// # Errors
    /// Fails if the codec is unavailable or the encoder reports an error.
    pub fn compress(self, data: &[u8]) -> ConnectorResult<Vec<u8>> {
        match self.codec()? {
            None => Ok(data.to_vec()),
            Some(codec) => codec.compress(data).map_err(|e| {
                ConnectorError::format(format!("{} compression failed", codec.name()))
                    .with_source(e.to_string())
            }),
        }
    }

    /// # Errors
    /// Fails if the codec is unavailable or the payload is not valid for it.
    pub fn decompress(self, data: &[u8]) -> ConnectorResult<Vec<u8>> {
        match self.codec()? {
            None => Ok(data.to_vec()),
            Some(codec) => codec.decompress(data).map_err(|e| {
                ConnectorError::format(format!("{} decompression failed", codec.name()))
                    .with_source(e.to_string())
            }),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
        })
    }
}

impl FromStr for Compression {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "lz4" => Ok(Self::Lz4),
            other => Err(ConnectorError::configuration(format!(
                "unsupported compression \"{other}\", expected one of none, gzip, lz4"
            ))),
        }
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(feature = "compression-lz4")]
struct Lz4Codec;

#[cfg(feature = "compression-lz4")]
impl CompressionCodec for Lz4Codec {
    fn name(&self) -> &str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(lz4_flex::block::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        lz4_flex::block::decompress_size_prepended(data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let data = b"{\"a\":1}\n".to_vec();
        assert_eq!(Compression::None.compress(&data).unwrap(), data);
        assert_eq!(Compression::None.decompress(&data).unwrap(), data);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_roundtrip_has_magic() {
        let data = b"hello hello hello hello".repeat(10);
        let packed = Compression::Gzip.compress(&data).unwrap();
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
        assert_eq!(Compression::Gzip.decompress(&packed).unwrap(), data);
    }

    #[cfg(feature = "compression-lz4")]
    #[test]
    fn lz4_roundtrip() {
        let data = b"abcabcabcabcabcabc".repeat(50);
        let packed = Compression::Lz4.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(Compression::Lz4.decompress(&packed).unwrap(), data);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn corrupt_gzip_is_a_format_error() {
        let err = Compression::Gzip.decompress(b"not gzip").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Format);
    }

    #[test]
    fn parse_names() {
        assert_eq!("GZIP".parse::<Compression>().unwrap(), Compression::Gzip);
        assert!("zip".parse::<Compression>().unwrap_err().is_configuration());
        assert_eq!(Compression::Lz4.extension(), ".lz4");
    }
}
