//! Transport-layer filter client contract
//!
//! The gateway core treats the client as a pure function from inputs to
//! filtered outputs or an error; transport semantics live behind the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mistdb_core::{ChunkRef, Fingerprint};

use crate::limits::QueryLimits;
use crate::Result;

/// Chunk references of one series, grouped by fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedChunkRefs {
    pub fingerprint: Fingerprint,
    pub refs: Vec<ChunkRef>,
}

/// How a line filter matches log text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineMatchType {
    Contains,
    NotContains,
}

/// One line-filter predicate of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFilter {
    pub match_type: LineMatchType,
    pub pattern: String,
}

/// The part of a query plan the gateway inspects: its line filters.
/// Without any, bloom filtering cannot narrow the result and is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub line_filters: Vec<LineFilter>,
}

impl QueryPlan {
    pub fn has_line_filters(&self) -> bool {
        !self.line_filters.is_empty()
    }
}

/// Filter RPC contract: returns the subset of `groups` whose blooms may
/// match the plan's line filters over `[from_ms, through_ms]`
#[async_trait]
pub trait FilterClient: Send + Sync {
    async fn filter_chunks(
        &self,
        tenant: &str,
        from_ms: i64,
        through_ms: i64,
        groups: Vec<GroupedChunkRefs>,
        plan: &QueryPlan,
        limits: &QueryLimits,
    ) -> Result<Vec<GroupedChunkRefs>>;
}

#[async_trait]
impl<'a, T: FilterClient + ?Sized> FilterClient for &'a T {
    async fn filter_chunks(
        &self,
        tenant: &str,
        from_ms: i64,
        through_ms: i64,
        groups: Vec<GroupedChunkRefs>,
        plan: &QueryPlan,
        limits: &QueryLimits,
    ) -> Result<Vec<GroupedChunkRefs>> {
        (**self)
            .filter_chunks(tenant, from_ms, through_ms, groups, plan, limits)
            .await
    }
}
