//! Block schema: version, page codec, and tokenisation parameters
//!
//! The schema is fixed at block creation and written twice to each stream,
//! once as a header and once as a trailer, so readers can verify it from
//! either end. The encoding is fixed-width so the trailer is locatable from
//! the end of the stream.

use bytes::{Buf, BufMut};

use crate::bloom::BloomParams;
use crate::{MistError, Result};

/// Stream magic, little-endian `"MIST"`
pub const MAGIC: [u8; 4] = *b"MIST";

/// The single schema version written by this crate
pub const SCHEMA_VERSION: u8 = 1;

/// Bloom hash count fixed by schema version 1
const V1_BLOOM_HASHES: u32 = 4;

/// Page compression codec, enumerated by wire id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Identity: pages stored uncompressed
    None = 0,
    /// LZ4 block format with prepended size
    #[default]
    Lz4 = 1,
}

impl Compression {
    /// Wire id of the codec
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Resolve a wire id
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            other => Err(MistError::UnknownCodec(other)),
        }
    }

    /// Compress a raw page payload
    pub fn compress(self, raw: &[u8]) -> Vec<u8> {
        match self {
            Compression::None => raw.to_vec(),
            Compression::Lz4 => lz4_flex::compress_prepend_size(raw),
        }
    }

    /// Decompress a page payload to exactly `uncompressed_len` bytes
    pub fn decompress(self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let raw = match self {
            Compression::None => data.to_vec(),
            Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| MistError::Decompress(e.to_string()))?,
        };
        if raw.len() != uncompressed_len {
            return Err(MistError::Corrupt(format!(
                "page decompressed to {} bytes, index records {}",
                raw.len(),
                uncompressed_len
            )));
        }
        Ok(raw)
    }
}

/// Immutable block schema embedded in stream headers and trailers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub version: u8,
    pub encoding: Compression,
    /// Substring length used when tokenising log lines into the bloom
    pub ngram_length: u32,
    /// Stride between n-grams
    pub ngram_skip: u32,
}

impl Schema {
    /// Encoded size: magic + version + codec id + two u32 parameters
    pub const ENCODED_LEN: usize = 4 + 1 + 1 + 4 + 4;

    /// Append the schema encoding
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.encoding.id());
        buf.put_u32_le(self.ngram_length);
        buf.put_u32_le(self.ngram_skip);
    }

    /// Decode and validate a schema from the cursor
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::ENCODED_LEN {
            return Err(MistError::Corrupt("schema truncated".into()));
        }
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(MistError::Corrupt(format!(
                "bad stream magic: {:02x?}",
                magic
            )));
        }
        let version = buf.get_u8();
        if version != SCHEMA_VERSION {
            return Err(MistError::UnknownVersion(version));
        }
        let encoding = Compression::from_id(buf.get_u8())?;
        let ngram_length = buf.get_u32_le();
        let ngram_skip = buf.get_u32_le();
        Ok(Self {
            version,
            encoding,
            ngram_length,
            ngram_skip,
        })
    }

    /// Bloom parameters implied by this schema version
    pub fn bloom_params(&self) -> BloomParams {
        BloomParams {
            hash_count: V1_BLOOM_HASHES,
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            encoding: Compression::default(),
            ngram_length: 10,
            ngram_skip: 2,
        }
    }
}
