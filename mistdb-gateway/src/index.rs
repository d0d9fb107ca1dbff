//! Narrow read capabilities of the chunk index
//!
//! The surrounding query layer sources chunk refs, index statistics, and
//! volume figures from an index store. Each capability is its own trait so
//! a backend only exposes what it actually implements; the merge builder's
//! store truth is assembled by the caller from [`ReadIndex`] results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mistdb_core::ChunkRef;

use crate::Result;

/// Label matcher restricting which series an index call covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMatcher {
    pub name: String,
    pub value: String,
    pub match_type: MatcherType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatcherType {
    Eq,
    Neq,
    Re,
    NotRe,
}

/// Aggregate index statistics over a query range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatsSummary {
    pub streams: u64,
    pub chunks: u64,
    pub entries: u64,
    pub bytes: u64,
}

/// Ingested volume attributed to one label set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeEntry {
    pub name: String,
    pub volume: u64,
}

/// Chunk-ref lookup capability
#[async_trait]
pub trait ReadIndex: Send + Sync {
    /// Chunk refs per matching series over `[from_ms, through_ms]`, grouped
    /// by series and ordered by fingerprint
    async fn chunk_refs(
        &self,
        user: &str,
        from_ms: i64,
        through_ms: i64,
        matchers: &[LabelMatcher],
    ) -> Result<Vec<Vec<ChunkRef>>>;
}

/// Index statistics capability
#[async_trait]
pub trait IndexStats: Send + Sync {
    async fn stats(
        &self,
        user: &str,
        from_ms: i64,
        through_ms: i64,
        matchers: &[LabelMatcher],
    ) -> Result<IndexStatsSummary>;

    async fn volume(
        &self,
        user: &str,
        from_ms: i64,
        through_ms: i64,
        matchers: &[LabelMatcher],
        limit: usize,
    ) -> Result<Vec<VolumeEntry>>;
}
