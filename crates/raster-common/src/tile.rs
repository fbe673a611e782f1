//! On-wire tile format: a small header, CRC-checked payload of f32 samples.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic   4 bytes  "RTL1"
//! enc     1 byte   0 = raw, 1 = zlib-deflate
//! width   u32
//! height  u32
//! len     u32      encoded payload length in bytes
//! crc     u32      CRC-32 of the encoded payload
//! payload len bytes
//! ```
//!
//! Samples are row-major f32 values; no-data is NaN.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const TILE_MAGIC: &[u8; 4] = b"RTL1";
const HEADER_LEN: usize = 4 + 1 + 4 + 4 + 4 + 4;

/// Payload encoding for a serialized tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEncoding {
    Raw,
    Deflate,
}

impl TileEncoding {
    fn as_byte(self) -> u8 {
        match self {
            TileEncoding::Raw => 0,
            TileEncoding::Deflate => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self, TileCodecError> {
        match b {
            0 => Ok(TileEncoding::Raw),
            1 => Ok(TileEncoding::Deflate),
            other => Err(TileCodecError::UnsupportedEncoding(other)),
        }
    }
}

/// A decoded raster tile: row-major f32 samples, NaN for no-data.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Tile {
    /// Create a tile from row-major samples.
    ///
    /// Panics if `data.len() != width * height`; callers construct tiles
    /// from buffers they sized themselves.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height, "tile data length mismatch");
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a tile filled with no-data.
    pub fn filled_nodata(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![f32::NAN; width * height],
        }
    }

    /// Get the sample at a pixel position.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Serialize the tile with the given payload encoding.
    pub fn encode(&self, encoding: TileEncoding) -> Result<Bytes, TileCodecError> {
        let mut raw = Vec::with_capacity(self.data.len() * 4);
        for value in &self.data {
            raw.extend_from_slice(&value.to_le_bytes());
        }

        let payload = match encoding {
            TileEncoding::Raw => raw,
            TileEncoding::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&raw)?;
                encoder.finish()?
            }
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_slice(TILE_MAGIC);
        buf.put_u8(encoding.as_byte());
        buf.put_u32_le(self.width as u32);
        buf.put_u32_le(self.height as u32);
        buf.put_u32_le(payload.len() as u32);
        buf.put_u32_le(crc);
        buf.put_slice(&payload);

        Ok(buf.freeze())
    }

    /// Deserialize a tile, verifying magic, checksum, and sample count.
    pub fn decode(mut bytes: Bytes) -> Result<Self, TileCodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(TileCodecError::Truncated);
        }

        let mut magic = [0u8; 4];
        bytes.copy_to_slice(&mut magic);
        if &magic != TILE_MAGIC {
            return Err(TileCodecError::BadMagic);
        }

        let encoding = TileEncoding::from_byte(bytes.get_u8())?;
        let width = bytes.get_u32_le() as usize;
        let height = bytes.get_u32_le() as usize;
        let payload_len = bytes.get_u32_le() as usize;
        let expected_crc = bytes.get_u32_le();

        if bytes.len() < payload_len {
            return Err(TileCodecError::Truncated);
        }
        let payload = bytes.split_to(payload_len);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            return Err(TileCodecError::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let raw = match encoding {
            TileEncoding::Raw => payload.to_vec(),
            TileEncoding::Deflate => {
                let mut decoder = ZlibDecoder::new(payload.as_ref());
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                out
            }
        };

        if raw.len() != width * height * 4 {
            return Err(TileCodecError::SampleCountMismatch {
                expected: width * height,
                actual: raw.len() / 4,
            });
        }

        let data = raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// In-memory size of the decoded samples, in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TileCodecError {
    #[error("tile payload does not start with the expected magic")]
    BadMagic,

    #[error("unsupported tile encoding byte: {0}")]
    UnsupportedEncoding(u8),

    #[error("tile payload is truncated")]
    Truncated,

    #[error("tile checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("tile sample count mismatch: expected {expected}, got {actual}")]
    SampleCountMismatch { expected: usize, actual: usize },

    #[error("tile compression error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile() -> Tile {
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.5).collect();
        Tile::new(4, 3, data)
    }

    #[test]
    fn test_roundtrip_raw() {
        let tile = sample_tile();
        let encoded = tile.encode(TileEncoding::Raw).unwrap();
        let decoded = Tile::decode(encoded).unwrap();
        assert_eq!(decoded, tile);
    }

    #[test]
    fn test_roundtrip_deflate() {
        let tile = sample_tile();
        let encoded = tile.encode(TileEncoding::Deflate).unwrap();
        let decoded = Tile::decode(encoded).unwrap();
        assert_eq!(decoded, tile);
    }

    #[test]
    fn test_nan_survives_encoding() {
        let mut tile = Tile::filled_nodata(2, 2);
        tile.data[3] = 7.0;

        let decoded = Tile::decode(tile.encode(TileEncoding::Raw).unwrap()).unwrap();
        assert!(decoded.data[0].is_nan());
        assert_eq!(decoded.data[3], 7.0);
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let tile = sample_tile();
        let mut encoded = tile.encode(TileEncoding::Raw).unwrap().to_vec();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        match Tile::decode(Bytes::from(encoded)) {
            Err(TileCodecError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let bytes = Bytes::from_static(b"NOPE\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00");
        assert!(matches!(Tile::decode(bytes), Err(TileCodecError::BadMagic)));
    }

    #[test]
    fn test_get() {
        let tile = sample_tile();
        assert_eq!(tile.get(0, 0), Some(0.0));
        assert_eq!(tile.get(3, 2), Some(5.5));
        assert_eq!(tile.get(4, 0), None);
    }
}
