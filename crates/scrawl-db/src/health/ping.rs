//! Database ping implementation

use std::time::{Duration, Instant};

use scrawl_core::Connection;
use thiserror::Error;

/// Statement issued to verify a connection is still usable
pub const PING_QUERY: &str = "SELECT 1";

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Why a ping did not come back
#[derive(Debug, Clone, Error)]
pub enum PingError {
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("ping query failed: {0}")]
    QueryFailed(String),
}

/// Check that a connection is alive, returning the round-trip time.
///
/// Runs [`PING_QUERY`] and times it. The pool calls this before putting a
/// connection back on the idle stack; it is also usable on its own for
/// monitoring. The probe runs inside the session's implicit transaction
/// and does not commit it.
pub async fn ping(conn: &dyn Connection) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    conn.query(PING_QUERY, &[])
        .await
        .map(|_| start.elapsed())
        .map_err(|e| PingError::QueryFailed(e.to_string()))
}
