use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Compression failed: {0}")]
    Compress(String),

    #[error("Decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
}

/// Codec applied to message bodies when a queue has compression enabled.
pub trait Compressor: Send + Sync + 'static {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;
}

/// LZ4 block compression with the uncompressed size prepended.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(lz4_flex::decompress_size_prepended(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_shrinks_repetitive_payloads() {
        let payload = "{\"event\":\"click\"}".repeat(64).into_bytes();
        let compressed = Lz4Compressor.compress(&payload).unwrap();
        assert!(compressed.len() < payload.len());
        assert_eq!(Lz4Compressor.decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn lz4_rejects_garbage() {
        assert!(Lz4Compressor.decompress(b"\x10\x00\x00\x00garbage").is_err());
    }
}
