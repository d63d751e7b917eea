//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the pool does when a connection is requested and none is idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Create a connection beyond `max_size` rather than making the caller
    /// wait. Overflow connections are logged with a warning and closed on
    /// release once the idle set is full. Favors availability under burst
    /// load over strict capacity control.
    Grow,
    /// Cap borrowed connections at `max_size`; callers wait up to the
    /// acquire timeout for a release and then fail with a timeout error.
    WaitWithTimeout,
}

/// Sizing and overflow behavior for a [`ConnectionPool`](crate::ConnectionPool)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    min_size: usize,
    max_size: usize,
    // Milliseconds, kept integral so the config serializes plainly.
    acquire_timeout_ms: u64,
    overflow: OverflowPolicy,
}

impl PoolConfig {
    /// Build a configuration that opens `min_size` connections up front and
    /// retains at most `max_size` idle
    ///
    /// # Panics
    ///
    /// Panics on inconsistent sizes: either size of zero, or a `min_size`
    /// above `max_size`.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(max_size > 0, "pool max_size must be at least 1");
        assert!(min_size > 0, "pool min_size must be at least 1");
        assert!(
            min_size <= max_size,
            "pool min_size ({min_size}) exceeds max_size ({max_size})"
        );

        Self {
            min_size,
            max_size,
            acquire_timeout_ms: 30_000,
            overflow: OverflowPolicy::Grow,
        }
    }

    /// Set how long a bounded acquire waits before failing
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the overflow policy
    pub fn with_overflow_policy(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }
}

impl Default for PoolConfig {
    /// One connection up front, at most ten idle, a 30 second acquire
    /// timeout, and `Grow` overflow
    fn default() -> Self {
        Self::new(1, 10)
    }
}
