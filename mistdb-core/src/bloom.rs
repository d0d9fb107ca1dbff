//! Bloom filter over n-gram tokens of a log series
//!
//! Parameters are fixed at construction: `m` bits and `k` hash functions.
//! The wire encoding is `uvarint(byte_len)` followed by the raw bits; `k` is
//! not repeated in the payload and instead comes from the schema-derived
//! [`BloomParams`] at decode time, while `m` is the decoded byte length
//! times eight.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bytes::{Buf, BufMut};

use crate::coding::{get_uvarint, put_uvarint, uvarint_len};
use crate::{MistError, Result};

/// Bloom parameters fixed by the block schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomParams {
    /// Number of hash functions applied per token
    pub hash_count: u32,
}

/// Default size of a freshly allocated filter, in bits
pub const DEFAULT_BLOOM_BITS: usize = 8 << 10;

/// Fixed-parameter Bloom filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bloom {
    bits: Vec<u8>,
    hashes: u32,
}

impl Bloom {
    /// Create a filter with `num_bits` capacity and `hashes` hash functions
    pub fn with_bits(num_bits: usize, hashes: u32) -> Self {
        let num_bytes = (num_bits + 7) / 8;
        Self {
            bits: vec![0u8; num_bytes.max(1)],
            hashes: hashes.max(1),
        }
    }

    /// Create an empty filter of the default size for the given parameters
    pub fn empty(params: BloomParams) -> Self {
        Self::with_bits(DEFAULT_BLOOM_BITS, params.hash_count)
    }

    /// Reconstruct a filter from raw bits
    pub fn from_bits(bits: Vec<u8>, params: BloomParams) -> Self {
        Self {
            bits,
            hashes: params.hash_count.max(1),
        }
    }

    /// Add a token to the filter
    pub fn add(&mut self, token: &[u8]) {
        let (h1, h2) = hash_token(token);
        for i in 0..self.hashes {
            let bit = self.bit_position(h1, h2, i);
            self.bits[bit / 8] |= 1 << (bit % 8);
        }
    }

    /// Check if a token may have been added
    pub fn test(&self, token: &[u8]) -> bool {
        let (h1, h2) = hash_token(token);
        for i in 0..self.hashes {
            let bit = self.bit_position(h1, h2, i);
            if self.bits[bit / 8] >> (bit % 8) & 1 == 0 {
                return false;
            }
        }
        true
    }

    /// Number of bits in the filter
    pub fn num_bits(&self) -> usize {
        self.bits.len() * 8
    }

    /// Encoded length on the wire
    pub fn encoded_len(&self) -> usize {
        uvarint_len(self.bits.len() as u64) + self.bits.len()
    }

    /// Append the wire encoding: `uvarint(byte_len)` then raw bits
    pub fn encode(&self, buf: &mut impl BufMut) {
        put_uvarint(buf, self.bits.len() as u64);
        buf.put_slice(&self.bits);
    }

    /// Decode one filter from the cursor
    pub fn decode(buf: &mut impl Buf, params: BloomParams) -> Result<Self> {
        let len = get_uvarint(buf)? as usize;
        if buf.remaining() < len {
            return Err(MistError::Corrupt(format!(
                "bloom payload truncated: want {} bytes, have {}",
                len,
                buf.remaining()
            )));
        }
        let mut bits = vec![0u8; len];
        buf.copy_to_slice(&mut bits);
        Ok(Self::from_bits(bits, params))
    }

    fn bit_position(&self, h1: u64, h2: u64, i: u32) -> usize {
        let hash = h1.wrapping_add(u64::from(i).wrapping_mul(h2));
        (hash % (self.bits.len() as u64 * 8)) as usize
    }
}

// Double hashing: two seeds derived from one pass, combined as h1 + i*h2
fn hash_token(token: &[u8]) -> (u64, u64) {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    let h1 = hasher.finish();

    let mut hasher = DefaultHasher::new();
    h1.hash(&mut hasher);
    let h2 = hasher.finish();

    (h1, h2)
}
