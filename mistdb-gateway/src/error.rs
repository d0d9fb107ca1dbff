//! Error types for the gateway layer

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Error surfaced from the block store core
    #[error(transparent)]
    Core(#[from] mistdb_core::MistError),

    /// Filter client call failed
    #[error("filter client: {0}")]
    Client(String),

    /// Index source call failed
    #[error("index source: {0}")]
    Index(String),

    /// Query range is inverted
    #[error("invalid query range: from {from_ms} > through {through_ms}")]
    InvalidRange { from_ms: i64, through_ms: i64 },
}
