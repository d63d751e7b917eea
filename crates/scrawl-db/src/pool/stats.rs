//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a pool's connection counts
///
/// Read under the idle-set lock plus relaxed atomic loads: consistent enough
/// for logging and dashboards, not a synchronization primitive. Under the
/// `Grow` overflow policy `active` can exceed `max_size`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Idle connections available on the stack
    pub idle: usize,
    /// Connections currently borrowed from the pool
    pub active: usize,
    /// Callers waiting for a connection to be released
    pub waiting: usize,
    /// Configured capacity the counts are judged against
    pub max_size: usize,
}

impl PoolStats {
    /// Total connections the pool currently owns or has lent out
    pub fn total(&self) -> usize {
        self.idle + self.active
    }

    /// Borrowed connections as a fraction of configured capacity
    ///
    /// Exceeds 1.0 when overflow connections are out under `Grow`.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Whether the pool has lent out its full configured capacity
    pub fn at_capacity(&self) -> bool {
        self.max_size > 0 && self.active >= self.max_size
    }
}
