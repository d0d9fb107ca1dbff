//! Per-tenant bloom querier
//!
//! Filter servers hold bloom blocks sharded by UTC day, so a multi-day
//! query range is partitioned into one filter call per day. The calls run
//! concurrently; the first error cancels its siblings at the call site and
//! is returned verbatim. When the query carries no line filters, or there
//! is nothing to filter, the client is never called.

use std::collections::{BTreeMap, HashSet};

use futures::future::try_join_all;
use tracing::debug;

use mistdb_core::{ChunkRef, Fingerprint};

use crate::client::{FilterClient, GroupedChunkRefs, QueryPlan};
use crate::limits::QueryLimits;
use crate::{GatewayError, Result};

/// Milliseconds per UTC day
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// One per-day slice of the query range with the chunk refs that overlap it
#[derive(Debug, Clone, PartialEq, Eq)]
struct DayPartition {
    from_ms: i64,
    through_ms: i64,
    groups: Vec<GroupedChunkRefs>,
}

// Split `[from_ms, through_ms]` at UTC day boundaries and route each chunk
// ref into every day it overlaps. Days without refs produce no partition.
fn partition_by_day(from_ms: i64, through_ms: i64, refs: &[ChunkRef]) -> Vec<DayPartition> {
    let mut partitions = Vec::new();

    let first_day = from_ms.div_euclid(MS_PER_DAY);
    let last_day = through_ms.div_euclid(MS_PER_DAY);
    for day in first_day..=last_day {
        let day_start = day * MS_PER_DAY;
        let day_end = day_start + MS_PER_DAY - 1;

        let mut groups: BTreeMap<Fingerprint, Vec<ChunkRef>> = BTreeMap::new();
        for chunk in refs.iter().filter(|c| c.overlaps(day_start, day_end)) {
            groups.entry(chunk.fingerprint).or_default().push(*chunk);
        }
        if groups.is_empty() {
            continue;
        }

        partitions.push(DayPartition {
            from_ms: from_ms.max(day_start),
            through_ms: through_ms.min(day_end),
            groups: groups
                .into_iter()
                .map(|(fingerprint, refs)| GroupedChunkRefs { fingerprint, refs })
                .collect(),
        });
    }

    partitions
}

/// Day-sharding querier over a [`FilterClient`]
pub struct BloomQuerier<C> {
    client: C,
}

impl<C: FilterClient> BloomQuerier<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Filter `refs` down to chunks whose series may match the plan's line
    /// filters. Returns the surviving refs in the caller's order.
    pub async fn filter_chunk_refs(
        &self,
        tenant: &str,
        from_ms: i64,
        through_ms: i64,
        refs: Vec<ChunkRef>,
        plan: &QueryPlan,
        limits: &QueryLimits,
    ) -> Result<Vec<ChunkRef>> {
        if from_ms > through_ms {
            return Err(GatewayError::InvalidRange { from_ms, through_ms });
        }
        if refs.is_empty() {
            debug!("no chunk refs to filter");
            return Ok(refs);
        }
        if !plan.has_line_filters() {
            debug!("query has no line filters, nothing to narrow");
            return Ok(refs);
        }

        let partitions = partition_by_day(from_ms, through_ms, &refs);
        debug!(days = partitions.len(), "fanning out per-day filter calls");

        let calls = partitions.into_iter().map(|partition| {
            self.client.filter_chunks(
                tenant,
                partition.from_ms,
                partition.through_ms,
                partition.groups,
                plan,
                limits,
            )
        });
        let filtered = try_join_all(calls).await?;

        let surviving: HashSet<ChunkRef> = filtered
            .into_iter()
            .flatten()
            .flat_map(|group| group.refs)
            .collect();
        Ok(refs
            .into_iter()
            .filter(|chunk| surviving.contains(chunk))
            .collect())
    }
}
