//! Binary layout of `index.bin`.
//!
//! Header (little-endian):
//! - 4 bytes magic `DRAG`
//! - 4 bytes format version
//! - 4 bytes dimension D
//! - 8 bytes entry count N
//! - 32 bytes blake3 checksum of the companion `chunks.json`
//!
//! followed by `N * D` f32 values, row-major.

use docrag_core::error::{Error, Result};

use crate::flat::FlatIndex;

const INDEX_MAGIC: u32 = 0x4452_4147; // "DRAG"
const INDEX_VERSION: u32 = 1;

/// 4 magic + 4 version + 4 dim + 8 count + 32 checksum
const HEADER_SIZE: usize = 52;

/// Checksum of the chunk-metadata file an index was written alongside.
pub type MetadataChecksum = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub dim: usize,
    pub count: usize,
    pub chunks_checksum: MetadataChecksum,
}

pub fn encode_index(index: &FlatIndex, chunks_checksum: &MetadataChecksum) -> Result<Vec<u8>> {
    let dim = u32::try_from(index.dim())
        .map_err(|_| Error::InvalidArgument(format!("dimension {} does not fit the index format", index.dim())))?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + index.raw().len() * 4);
    buf.extend_from_slice(&INDEX_MAGIC.to_le_bytes());
    buf.extend_from_slice(&INDEX_VERSION.to_le_bytes());
    buf.extend_from_slice(&dim.to_le_bytes());
    buf.extend_from_slice(&(index.len() as u64).to_le_bytes());
    buf.extend_from_slice(chunks_checksum);
    for val in index.raw() {
        buf.extend_from_slice(&val.to_le_bytes());
    }
    Ok(buf)
}

pub fn decode_header(bytes: &[u8]) -> Result<IndexHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::IndexCorrupt(format!(
            "index file is {} bytes, shorter than its {HEADER_SIZE}-byte header",
            bytes.len()
        )));
    }
    let magic = read_u32(bytes, 0);
    if magic != INDEX_MAGIC {
        return Err(Error::IndexCorrupt(format!("invalid magic: expected {INDEX_MAGIC:#x}, got {magic:#x}")));
    }
    let version = read_u32(bytes, 4);
    if version != INDEX_VERSION {
        return Err(Error::IndexCorrupt(format!("unsupported index version {version}")));
    }
    let dim = read_u32(bytes, 8) as usize;
    let count = usize::try_from(read_u64(bytes, 12))
        .map_err(|_| Error::IndexCorrupt("entry count overflows usize".into()))?;
    let mut chunks_checksum = [0u8; 32];
    chunks_checksum.copy_from_slice(&bytes[20..HEADER_SIZE]);
    Ok(IndexHeader { dim, count, chunks_checksum })
}

pub fn decode_index(bytes: &[u8]) -> Result<(IndexHeader, FlatIndex)> {
    let header = decode_header(bytes)?;
    if header.dim == 0 {
        return Err(Error::IndexCorrupt("dimension is zero".into()));
    }
    let expected = header
        .count
        .checked_mul(header.dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| Error::IndexCorrupt("header sizes overflow".into()))?;
    let body = &bytes[HEADER_SIZE..];
    if body.len() != expected {
        return Err(Error::IndexCorrupt(format!(
            "vector data is {} bytes, header declares {} x {} f32 ({expected} bytes)",
            body.len(),
            header.count,
            header.dim
        )));
    }
    let data: Vec<f32> = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((header, FlatIndex::from_raw(header.dim, data)))
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_stable() {
        let index = FlatIndex::build(2, vec![vec![3.0, 4.0]]).unwrap();
        let bytes = encode_index(&index, &[7u8; 32]).unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 2 * 4);
        assert_eq!(&bytes[0..4], &INDEX_MAGIC.to_le_bytes());
        assert_eq!(read_u32(&bytes, 8), 2);
        assert_eq!(read_u64(&bytes, 12), 1);
        assert_eq!(&bytes[20..52], &[7u8; 32]);
        assert_eq!(f32::from_le_bytes([bytes[52], bytes[53], bytes[54], bytes[55]]), 0.6);
    }

    #[test]
    fn truncated_body_is_corrupt() {
        let index = FlatIndex::build(3, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).unwrap();
        let mut bytes = encode_index(&index, &[0u8; 32]).unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(decode_index(&bytes), Err(Error::IndexCorrupt(_))));
    }

    #[test]
    fn wrong_magic_is_corrupt() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(b"FAIS");
        assert!(matches!(decode_header(&bytes), Err(Error::IndexCorrupt(_))));
    }
}
