//! MistDB Gateway - the query layer around the bloom block store
//!
//! The core never performs network I/O; this crate holds the contracts it
//! is driven through and the orchestration the original system performs
//! around it:
//!
//! - [`client::FilterClient`]: the transport-layer filter RPC contract
//! - [`querier::BloomQuerier`]: per-tenant querier that shards a query
//!   range into per-UTC-day filter calls and fans them out concurrently
//! - [`limits::QueryLimits`]: the explicit per-query limits record threaded
//!   through the filter path
//! - [`analyze`]: single-owner counter trees merged at join points
//! - [`index`]: narrow read capabilities of the chunk index, the source of
//!   the merge builder's store truth

pub mod analyze;
pub mod client;
pub mod index;
pub mod limits;
pub mod querier;

mod error;

pub use error::{GatewayError, Result};
