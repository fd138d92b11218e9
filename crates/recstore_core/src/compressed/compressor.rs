//! Payload compressors.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;

/// A whole-buffer compressor.
pub trait Compressor: Send + Sync {
    /// Returns the kind persisted in the store's properties.
    fn kind(&self) -> CompressorKind;

    /// Compresses `data`.
    ///
    /// # Errors
    ///
    /// Returns a strategy error if the codec fails.
    fn compress(&self, data: &[u8]) -> CoreResult<Vec<u8>>;

    /// Restores bytes produced by [`compress`](Self::compress).
    ///
    /// # Errors
    ///
    /// Returns a strategy error for corrupt input.
    fn decompress(&self, data: &[u8]) -> CoreResult<Vec<u8>>;
}

/// Compressors a store can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressorKind {
    /// Zstandard.
    #[default]
    Zstd,
}

impl CompressorKind {
    /// Builds a compressor of this kind at `level`.
    #[must_use]
    pub fn build(self, level: i32) -> Box<dyn Compressor> {
        match self {
            Self::Zstd => Box::new(ZstdCompressor::new(level)),
        }
    }
}

impl fmt::Display for CompressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zstd => f.write_str("Zstd"),
        }
    }
}

impl FromStr for CompressorKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Zstd" => Ok(Self::Zstd),
            other => Err(CoreError::strategy(format!("unknown compressor: {other}"))),
        }
    }
}

/// Zstandard at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Creates a compressor at `level`.
    #[must_use]
    pub const fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for ZstdCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Zstd
    }

    fn compress(&self, data: &[u8]) -> CoreResult<Vec<u8>> {
        zstd::encode_all(data, self.level)
            .map_err(|e| CoreError::strategy(format!("zstd compression failed: {e}")))
    }

    fn decompress(&self, data: &[u8]) -> CoreResult<Vec<u8>> {
        zstd::decode_all(data)
            .map_err(|e| CoreError::strategy(format!("zstd decompression failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn repetitive_data_shrinks() {
        let compressor = ZstdCompressor::new(3);
        let data = vec![b'a'; 4096];
        let packed = compressor.compress(&data).unwrap();
        assert!(packed.len() < data.len() / 10);
        assert_eq!(compressor.decompress(&packed).unwrap(), data);
    }

    #[test]
    fn garbage_fails_to_decompress() {
        let err = ZstdCompressor::new(3).decompress(b"not zstd").unwrap_err();
        assert!(err.is_strategy());
    }

    #[test]
    fn kind_names() {
        assert_eq!("Zstd".parse::<CompressorKind>().unwrap(), CompressorKind::Zstd);
        assert_eq!(CompressorKind::Zstd.to_string(), "Zstd");
        assert!("Gzip".parse::<CompressorKind>().unwrap_err().is_strategy());
        assert_eq!(CompressorKind::Zstd.build(1).kind(), CompressorKind::Zstd);
    }

    proptest! {
        #[test]
        fn decompress_inverts_compress(data in prop::collection::vec(any::<u8>(), 0..2048), level in 1i32..10) {
            let compressor = ZstdCompressor::new(level);
            let packed = compressor.compress(&data).unwrap();
            prop_assert_eq!(compressor.decompress(&packed).unwrap(), data);
        }
    }
}
