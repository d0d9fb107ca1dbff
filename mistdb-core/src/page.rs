//! Page codec: the atomic compressed + checksummed unit of the block format
//!
//! Write path: compress the serialized entries with the schema codec, append
//! a CRC32-C trailer over the compressed bytes, and record the page in the
//! owning index-of-pages. Read path: verify the trailer, cross-check it
//! against the index entry, and decompress to exactly the recorded size.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::schema::Compression;
use crate::{Fingerprint, MistError, Result};

/// Byte length of the CRC trailer following each page payload
pub const PAGE_TRAILER_LEN: usize = 4;

/// One entry of a stream's index-of-pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    /// Offset of the compressed payload within the stream
    pub offset: u64,
    /// Compressed payload length, excluding the CRC trailer
    pub compressed_len: u32,
    /// Exact decompressed length
    pub uncompressed_len: u32,
    /// CRC32-C of the compressed payload
    pub crc: u32,
}

impl PageEntry {
    pub const ENCODED_LEN: usize = 8 + 4 + 4 + 4;

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.offset);
        buf.put_u32_le(self.compressed_len);
        buf.put_u32_le(self.uncompressed_len);
        buf.put_u32_le(self.crc);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::ENCODED_LEN {
            return Err(MistError::Corrupt("page index entry truncated".into()));
        }
        Ok(Self {
            offset: buf.get_u64_le(),
            compressed_len: buf.get_u32_le(),
            uncompressed_len: buf.get_u32_le(),
            crc: buf.get_u32_le(),
        })
    }

    /// Total stored length of the page: payload plus CRC trailer
    pub fn stored_len(&self) -> usize {
        self.compressed_len as usize + PAGE_TRAILER_LEN
    }
}

/// Index entry for a series page, which additionally records the fingerprint
/// range it covers so queriers can seek without loading payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPageEntry {
    pub page: PageEntry,
    pub min_fp: Fingerprint,
    pub max_fp: Fingerprint,
}

impl SeriesPageEntry {
    pub const ENCODED_LEN: usize = PageEntry::ENCODED_LEN + 8 + 8;

    pub fn encode(&self, buf: &mut impl BufMut) {
        self.page.encode(buf);
        buf.put_u64_le(self.min_fp);
        buf.put_u64_le(self.max_fp);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        let page = PageEntry::decode(buf)?;
        if buf.remaining() < 16 {
            return Err(MistError::Corrupt("series page entry truncated".into()));
        }
        Ok(Self {
            page,
            min_fp: buf.get_u64_le(),
            max_fp: buf.get_u64_le(),
        })
    }
}

/// A sealed page ready to be written to a stream
pub struct SealedPage {
    /// Payload followed by the CRC trailer
    pub bytes: Bytes,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
    pub crc: u32,
}

/// Compress and checksum a raw page payload
pub fn seal(raw: &[u8], encoding: Compression) -> SealedPage {
    let compressed = encoding.compress(raw);
    let crc = crc32c::crc32c(&compressed);

    let mut buf = BytesMut::with_capacity(compressed.len() + PAGE_TRAILER_LEN);
    buf.put_slice(&compressed);
    buf.put_u32_le(crc);

    SealedPage {
        bytes: buf.freeze(),
        compressed_len: compressed.len() as u32,
        uncompressed_len: raw.len() as u32,
        crc,
    }
}

/// Verify and decompress a stored page.
///
/// `stored` must be the `entry.stored_len()` bytes at `entry.offset`:
/// the compressed payload followed by its CRC trailer.
pub fn open(stored: &[u8], entry: &PageEntry, encoding: Compression) -> Result<Vec<u8>> {
    if stored.len() != entry.stored_len() {
        return Err(MistError::Corrupt(format!(
            "page truncated: want {} bytes, have {}",
            entry.stored_len(),
            stored.len()
        )));
    }
    let (payload, mut trailer) = stored.split_at(entry.compressed_len as usize);

    let stored_crc = trailer.get_u32_le();
    let actual = crc32c::crc32c(payload);
    if actual != stored_crc {
        return Err(MistError::ChecksumMismatch {
            expected: stored_crc,
            actual,
        });
    }
    if stored_crc != entry.crc {
        return Err(MistError::ChecksumMismatch {
            expected: entry.crc,
            actual: stored_crc,
        });
    }

    encoding.decompress(payload, entry.uncompressed_len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_roundtrip() {
        let raw: Vec<u8> = (0..512u32).flat_map(|v| v.to_le_bytes()).collect();

        for encoding in [Compression::None, Compression::Lz4] {
            let sealed = seal(&raw, encoding);
            let entry = PageEntry {
                offset: 0,
                compressed_len: sealed.compressed_len,
                uncompressed_len: sealed.uncompressed_len,
                crc: sealed.crc,
            };

            let restored = open(&sealed.bytes, &entry, encoding).unwrap();
            assert_eq!(restored, raw);
        }
    }

    #[test]
    fn test_page_detects_flipped_bit() {
        let raw = vec![0xabu8; 256];
        let sealed = seal(&raw, Compression::Lz4);
        let entry = PageEntry {
            offset: 0,
            compressed_len: sealed.compressed_len,
            uncompressed_len: sealed.uncompressed_len,
            crc: sealed.crc,
        };

        let mut stored = sealed.bytes.to_vec();
        stored[3] ^= 0x01;

        match open(&stored, &entry, Compression::Lz4) {
            Err(MistError::ChecksumMismatch { .. }) => {}
            other => panic!("expected ChecksumMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_page_entry_roundtrip() {
        let entry = SeriesPageEntry {
            page: PageEntry {
                offset: 1234,
                compressed_len: 56,
                uncompressed_len: 78,
                crc: 0xdeadbeef,
            },
            min_fp: 0x10,
            max_fp: 0x20,
        };

        let mut buf = Vec::new();
        entry.encode(&mut buf);
        assert_eq!(buf.len(), SeriesPageEntry::ENCODED_LEN);
        assert_eq!(SeriesPageEntry::decode(&mut &buf[..]).unwrap(), entry);
    }
}
