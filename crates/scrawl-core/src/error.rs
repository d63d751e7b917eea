//! Error handling for the scrawl crates

use thiserror::Error;

/// Errors surfaced by the scrawl database layer
#[derive(Error, Debug)]
pub enum ScrawlError {
    /// Establishing or maintaining a database connection failed
    #[error("connection error: {0}")]
    Connection(String),

    /// A statement failed to prepare, execute, or decode
    #[error("query error: {0}")]
    Query(String),

    /// A configuration value is invalid or missing
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Waited too long for a pooled connection; the payload carries the
    /// timeout that was exceeded
    #[error("{0}")]
    Timeout(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the scrawl crates
pub type Result<T> = std::result::Result<T, ScrawlError>;
