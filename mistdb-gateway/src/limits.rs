//! Per-query limits, threaded explicitly through the filter path
//!
//! Limits are an argument, not ambient request state: every call that can
//! be constrained takes the record and passes it along unchanged.

use serde::{Deserialize, Serialize};

/// Limits applied to a single query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimits {
    /// Maximum allowed query range length, in milliseconds
    pub max_query_length_ms: i64,
    /// Maximum lookback from now, in milliseconds
    pub max_query_lookback_ms: i64,
    /// Maximum entries a query may return
    pub max_entries_per_query: u64,
    /// Per-query timeout, in milliseconds
    pub query_timeout_ms: i64,
    /// Labels every query must carry
    pub required_labels: Vec<String>,
    /// Maximum step interval, in milliseconds
    pub max_interval_ms: i64,
}
