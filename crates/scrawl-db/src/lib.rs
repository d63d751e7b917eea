//! Scrawl DB - connection pooling and query execution
//!
//! This crate owns the demo's database layer: a bounded pool of PostgreSQL
//! connections with transactionally-correct query execution, plus the
//! `predictions` store used by the prediction logger and the results view.

use std::sync::Arc;

use scrawl_driver_postgres::PostgresFactory;

pub mod health;
pub mod pool;
mod store;

pub use health::{PING_QUERY, PingError, PingResult, ping};
pub use pool::{ConnectionPool, OverflowPolicy, PoolConfig, PoolHandle, PoolStats, is_select};
pub use store::{PredictionRecord, PredictionStore};

/// Build a PostgreSQL-backed pool, resolving the connection string from
/// `DATABASE_URL`
///
/// The variable falls back to the documented development connection string
/// when unset. No connection is dialed until the pool is first used.
pub fn postgres_pool(config: PoolConfig) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(config, PostgresFactory::from_env()))
}
