//! Connection and connection-factory traits

use crate::{QueryResult, Result, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// A database connection
///
/// A connection is exclusively borrowed by one caller at a time; the pool
/// enforces this. Statement execution follows the implicit-transaction model:
/// the first `query`/`execute` on an idle session opens a transaction, and
/// `commit`/`rollback` close it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    ///
    /// Returns the number of rows affected. The change is not durable until
    /// `commit` is called.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Commit the open transaction, if any
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction, if any
    async fn rollback(&self) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation only checks the closed flag.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}
