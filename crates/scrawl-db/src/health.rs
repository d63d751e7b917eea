//! Health check functionality for database connections
//!
//! Provides the lightweight ping used by the pool before a connection is
//! returned to the idle set.

mod ping;

#[cfg(test)]
mod tests;

pub use ping::{PING_QUERY, PingError, PingResult, ping};
