//! Payload compression (gzip via flate2)

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{VaultError, VaultResult};
use crate::models::CompressionLevel;

fn flate_level(level: CompressionLevel) -> Option<Compression> {
    match level {
        CompressionLevel::None => None,
        CompressionLevel::Low => Some(Compression::fast()),
        CompressionLevel::Medium => Some(Compression::default()),
        CompressionLevel::High => Some(Compression::best()),
    }
}

pub fn compress(data: &[u8], level: CompressionLevel) -> VaultResult<Vec<u8>> {
    let Some(compression) = flate_level(level) else {
        return Ok(data.to_vec());
    };
    let mut encoder = GzEncoder::new(Vec::new(), compression);
    encoder
        .write_all(data)
        .map_err(|e| VaultError::Io(format!("Failed to compress payload: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| VaultError::Io(format!("Failed to compress payload: {}", e)))
}

pub fn decompress(data: &[u8], level: CompressionLevel) -> VaultResult<Vec<u8>> {
    if level == CompressionLevel::None {
        return Ok(data.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| VaultError::Integrity(format!("Failed to decompress payload: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_shrink_repetitive_data() {
        let data = b"present,present,absent,present\n".repeat(200);
        for level in [CompressionLevel::Low, CompressionLevel::Medium, CompressionLevel::High] {
            let packed = compress(&data, level).unwrap();
            assert!(packed.len() < data.len());
            assert_eq!(decompress(&packed, level).unwrap(), data);
        }
    }

    #[test]
    fn test_none_is_identity() {
        assert_eq!(compress(b"abc", CompressionLevel::None).unwrap(), b"abc");
    }

    #[test]
    fn test_garbage_is_integrity_error() {
        let err = decompress(b"not gzip", CompressionLevel::Medium).unwrap_err();
        assert!(matches!(err, VaultError::Integrity(_)));
    }
}
