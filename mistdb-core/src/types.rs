//! Core types for MistDB

use serde::{Deserialize, Serialize};

use crate::bloom::Bloom;

/// 64-bit identifier of a log series. Totally ordered; strictly increasing
/// within a block.
pub type Fingerprint = u64;

/// Reference to one log chunk of a series
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChunkRef {
    /// Fingerprint of the owning series
    pub fingerprint: Fingerprint,
    /// Chunk start, milliseconds since Unix epoch
    pub from_ms: i64,
    /// Chunk end, milliseconds since Unix epoch; `from_ms <= through_ms`
    pub through_ms: i64,
    /// Chunk content checksum
    pub checksum: u32,
}

impl ChunkRef {
    /// Create a new chunk reference
    pub fn new(fingerprint: Fingerprint, from_ms: i64, through_ms: i64, checksum: u32) -> Self {
        Self {
            fingerprint,
            from_ms,
            through_ms,
            checksum,
        }
    }

    /// Check if the chunk overlaps the inclusive time range
    pub fn overlaps(&self, from_ms: i64, through_ms: i64) -> bool {
        self.from_ms <= through_ms && self.through_ms >= from_ms
    }
}

/// A log series: fingerprint plus its ordered chunk references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub fingerprint: Fingerprint,
    pub chunks: Vec<ChunkRef>,
}

impl Series {
    /// Create a series with no chunks
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            chunks: Vec::new(),
        }
    }

    /// Fold another chunk list into this series, keeping the list sorted and
    /// deduplicated. Existing chunks are never replaced.
    pub fn union_chunks(&mut self, other: &[ChunkRef]) {
        for chunk in other {
            if !self.chunks.contains(chunk) {
                self.chunks.push(*chunk);
            }
        }
        self.chunks.sort();
    }
}

/// Input unit to the builder and output unit from the querier
#[derive(Debug, Clone)]
pub struct SeriesWithBloom {
    pub series: Series,
    pub bloom: Bloom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_overlaps() {
        let chunk = ChunkRef::new(1, 100, 200, 0);

        assert!(chunk.overlaps(150, 250));
        assert!(chunk.overlaps(200, 300));
        assert!(chunk.overlaps(0, 100));
        assert!(!chunk.overlaps(201, 300));
        assert!(!chunk.overlaps(0, 99));
    }

    #[test]
    fn test_union_chunks() {
        let mut series = Series {
            fingerprint: 7,
            chunks: vec![ChunkRef::new(7, 0, 10, 1), ChunkRef::new(7, 10, 20, 2)],
        };

        series.union_chunks(&[
            ChunkRef::new(7, 10, 20, 2), // duplicate
            ChunkRef::new(7, 5, 15, 3),
        ]);

        assert_eq!(
            series.chunks,
            vec![
                ChunkRef::new(7, 0, 10, 1),
                ChunkRef::new(7, 5, 15, 3),
                ChunkRef::new(7, 10, 20, 2),
            ]
        );
    }
}
