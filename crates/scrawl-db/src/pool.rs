//! Connection pooling for database connections
//!
//! This module provides connection pooling with configurable sizing, an
//! explicit overflow policy, and statistics tracking.
//!
//! # Example
//!
//! ```ignore
//! use scrawl_db::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 10)
//!     .with_acquire_timeout(std::time::Duration::from_secs(5));
//! let pool = ConnectionPool::new(config, factory);
//!
//! let rows = pool.execute("SELECT 1", &[]).await?;
//! ```

mod config;
mod pool;
mod stats;


pub use config::{OverflowPolicy, PoolConfig};
pub use pool::{ConnectionPool, PoolHandle, is_select};
pub use stats::PoolStats;
