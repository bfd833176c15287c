//! Zlib compression for large container leaves.

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Compress data using zlib.
///
/// Returns `None` when compression is disabled or would not save space; the
/// caller then stores the data raw. Compressed output carries an 8-byte
/// uncompressed-size header.
pub fn compress(data: &[u8], level: i32) -> Result<Option<Vec<u8>>> {
    if level <= 0 || data.is_empty() {
        return Ok(None);
    }

    let compression_level = match level {
        1 => Compression::fast(),
        2..=5 => Compression::default(),
        _ => Compression::best(),
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), compression_level);
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    if compressed.len() + 8 >= data.len() {
        return Ok(None);
    }

    // Format: [uncompressed_size: u64 LE][compressed_data]
    let mut result = Vec::with_capacity(8 + compressed.len());
    result.extend_from_slice(&(data.len() as u64).to_le_bytes());
    result.extend_from_slice(&compressed);
    Ok(Some(result))
}

/// Decompress a leaf produced by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 {
        return Err(Error::UnexpectedEof(data.len() as u64));
    }
    let mut size = [0u8; 8];
    size.copy_from_slice(&data[..8]);
    let uncompressed_size = u64::from_le_bytes(size) as usize;

    let mut decoder = ZlibDecoder::new(&data[8..]);
    let mut decompressed = Vec::with_capacity(uncompressed_size.min(1 << 30));
    decoder.read_to_end(&mut decompressed)?;

    if decompressed.len() != uncompressed_size {
        return Err(Error::invalid(format!(
            "decompressed {} bytes, header says {}",
            decompressed.len(),
            uncompressed_size
        )));
    }
    Ok(decompressed)
}
