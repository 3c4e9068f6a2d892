//! Error types for depwall

use thiserror::Error;

/// Control-plane and configuration error type.
///
/// The data plane never surfaces these: per-packet failures are folded into
/// a verdict and reported through counters.
#[derive(Error, Debug)]
pub enum DepwallError {
    /// Insert of a new key into a table that is at capacity
    #[error("{table} table full (capacity {capacity})")]
    TableFull {
        /// Table name
        table: &'static str,
        /// Hard capacity of the table
        capacity: usize,
    },

    /// Unparseable link-layer address
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// Policy document rejected
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for depwall
pub type DepwallResult<T> = Result<T, DepwallError>;
