//! Connection pool implementation

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use scrawl_core::{Connection, ConnectionFactory, QueryResult, Result, ScrawlError, Value};

use super::config::{OverflowPolicy, PoolConfig};
use super::stats::PoolStats;
use crate::health::ping;

/// Classify a statement by its leading keyword.
///
/// The check is purely syntactic: leading/trailing whitespace is trimmed and
/// the prefix is compared case-insensitively against `SELECT`. Statements
/// that return rows through other syntax (a leading `WITH`, or a DML
/// statement with a `RETURNING` clause) are classified as writes; this is a
/// known limitation, not a bug to special-case.
pub fn is_select(sql: &str) -> bool {
    sql.trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SELECT"))
}

/// A connection pool that manages a set of database connections
///
/// The pool keeps idle connections on a stack (most-recently-returned first)
/// and hands them out exclusively. Its lifecycle is
/// uninitialized -> ready -> uninitialized: [`ConnectionPool::shutdown`]
/// returns it to the uninitialized state, and the next acquire or execute
/// re-initializes it transparently.
pub struct ConnectionPool {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory
    factory: Arc<dyn ConnectionFactory>,
    /// Available idle connections, LIFO
    idle: Mutex<Vec<Arc<dyn Connection>>>,
    /// Limits total borrowed connections under `WaitWithTimeout`
    semaphore: Arc<Semaphore>,
    /// Number of connections currently borrowed from the pool
    active_count: AtomicUsize,
    /// Number of requests waiting for a connection
    waiting_count: AtomicUsize,
    /// Whether the pool has been initialized
    initialized: AtomicBool,
    /// Serializes initialization and shutdown
    init_lock: tokio::sync::Mutex<()>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    ///
    /// No connections are established yet; that happens on
    /// [`ConnectionPool::initialize`] or lazily on first use.
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            config,
            factory: Arc::new(factory),
            idle: Mutex::new(Vec::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a pool with default sizing (min 1, max 10)
    pub fn with_defaults<F: ConnectionFactory>(factory: F) -> Self {
        Self::new(PoolConfig::default(), factory)
    }

    /// Establish the pool by creating `min_size` connections
    ///
    /// Idempotent: initializing an already-initialized pool is a no-op.
    /// Concurrent callers are serialized; exactly one performs the work.
    /// If any underlying connect fails, connections created so far are
    /// closed, the pool stays uninitialized, and the error is propagated.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut created: Vec<Arc<dyn Connection>> = Vec::with_capacity(self.config.min_size());
        for _ in 0..self.config.min_size() {
            match self.factory.create().await {
                Ok(conn) => created.push(conn),
                Err(e) => {
                    tracing::error!(error = %e, "failed to initialize connection pool");
                    for conn in created {
                        if let Err(close_err) = conn.close().await {
                            tracing::warn!(error = %close_err, "error closing connection during failed initialization");
                        }
                    }
                    return Err(e);
                }
            }
        }

        let count = created.len();
        self.idle.lock().extend(created);
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(connections = count, "connection pool initialized");
        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.initialize().await
    }

    /// Get a connection from the pool
    ///
    /// Initializes the pool first if needed. Idle connections are handed out
    /// most-recently-returned first. When none is idle, behavior follows the
    /// configured [`OverflowPolicy`].
    pub async fn acquire(&self) -> Result<PoolHandle<'_>> {
        self.ensure_initialized().await?;
        match self.config.overflow() {
            OverflowPolicy::Grow => self.acquire_or_grow().await,
            OverflowPolicy::WaitWithTimeout => self.acquire_bounded().await,
        }
    }

    async fn acquire_or_grow(&self) -> Result<PoolHandle<'_>> {
        let connection = match self.pop_idle().await {
            Some(conn) => conn,
            None => {
                if self.active_count.load(Ordering::SeqCst) >= self.config.max_size() {
                    tracing::warn!(
                        max_size = self.config.max_size(),
                        "pool exhausted, creating overflow connection"
                    );
                }
                self.factory.create().await.map_err(|e| {
                    tracing::error!(error = %e, "error creating new database connection");
                    e
                })?
            }
        };

        self.active_count.fetch_add(1, Ordering::SeqCst);
        Ok(PoolHandle {
            connection: Some(connection),
            pool: self,
            _permit: None,
        })
    }

    async fn acquire_bounded(&self) -> Result<PoolHandle<'_>> {
        self.waiting_count.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(self.config.acquire_timeout(), async {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ScrawlError::Connection("Pool semaphore closed".into()))?;

            let connection = match self.pop_idle().await {
                Some(conn) => conn,
                None => self.factory.create().await.map_err(|e| {
                    tracing::error!(error = %e, "error creating new database connection");
                    e
                })?,
            };

            self.active_count.fetch_add(1, Ordering::SeqCst);
            Ok(PoolHandle {
                connection: Some(connection),
                pool: self,
                _permit: Some(permit),
            })
        })
        .await;

        self.waiting_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(handle) => handle,
            Err(_) => Err(ScrawlError::Timeout(format!(
                "Timed out waiting for a connection (timeout: {:?})",
                self.config.acquire_timeout()
            ))),
        }
    }

    /// Pop an idle connection, skipping any that fail validation
    async fn pop_idle(&self) -> Option<Arc<dyn Connection>> {
        loop {
            let candidate = { self.idle.lock().pop() };
            match candidate {
                Some(conn) => {
                    if self.factory.validate(conn.as_ref()).await {
                        return Some(conn);
                    }
                    if let Err(e) = conn.close().await {
                        tracing::warn!(error = %e, "error closing stale connection");
                    }
                }
                None => return None,
            }
        }
    }

    /// Return a connection to the pool if it is still viable
    ///
    /// The connection is health-probed with `SELECT 1`; only a healthy
    /// connection is pushed back, and only while the idle set is below
    /// `max_size`. Anything else is closed. Release never surfaces an error:
    /// probe and close failures are logged and swallowed here.
    pub async fn release(&self, mut handle: PoolHandle<'_>) {
        let Some(conn) = handle.connection.take() else {
            return;
        };
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        match ping(conn.as_ref()).await {
            Ok(_) => {
                {
                    let mut idle = self.idle.lock();
                    if idle.len() < self.config.max_size() {
                        idle.push(conn);
                        return;
                    }
                }
                // Idle set is full, this one is surplus.
                if let Err(e) = conn.close().await {
                    tracing::warn!(error = %e, "error closing surplus connection");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "health probe failed, discarding connection");
                if let Err(close_err) = conn.close().await {
                    tracing::warn!(error = %close_err, "error closing broken connection");
                }
            }
        }
    }

    /// Execute a statement using a pooled connection
    ///
    /// SELECT statements (see [`is_select`]) return their rows; any other
    /// statement is executed and committed, returning an empty result with
    /// the affected-row count. On failure the transaction is rolled back and
    /// the original error is returned to the caller. The connection goes back
    /// to the pool in every path.
    ///
    /// A successful SELECT does not commit, so the session's implicit
    /// transaction stays open while the connection sits idle; the next
    /// write's commit (or a rollback) closes it.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let handle = self.acquire().await?;

        let result = run_statement(&handle, sql, params).await;

        if let Err(ref e) = result {
            tracing::error!(error = %e, "error executing query");
            if let Err(rollback_err) = handle.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed after query error");
            }
        }

        self.release(handle).await;
        result
    }

    /// Close every idle connection and mark the pool uninitialized
    ///
    /// Individual close failures are logged and skipped. A subsequent
    /// acquire or execute re-initializes the pool.
    pub async fn shutdown(&self) {
        let _guard = self.init_lock.lock().await;

        let connections: Vec<_> = {
            let mut idle = self.idle.lock();
            idle.drain(..).collect()
        };

        for conn in connections {
            if let Err(e) = conn.close().await {
                tracing::error!(error = %e, "error closing connection");
            }
        }

        self.initialized.store(false, Ordering::SeqCst);
        tracing::info!("all pooled connections closed");
    }

    /// Whether the pool is currently initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().len(),
            active: self.active_count.load(Ordering::SeqCst),
            waiting: self.waiting_count.load(Ordering::SeqCst),
            max_size: self.config.max_size(),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Drop-path return: no probe, push back only while below `max_size`
    fn return_unprobed(&self, conn: Arc<dyn Connection>) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if conn.is_closed() {
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_size() {
            idle.push(conn);
        }
    }
}

async fn run_statement(
    conn: &PoolHandle<'_>,
    sql: &str,
    params: &[Value],
) -> Result<QueryResult> {
    if is_select(sql) {
        conn.query(sql, params).await
    } else {
        let affected = conn.execute(sql, params).await?;
        conn.commit().await?;
        Ok(QueryResult::committed(affected))
    }
}

/// A connection borrowed from the pool
///
/// Prefer returning it through [`ConnectionPool::release`], which health-probes
/// the connection. Dropping the handle instead returns the connection to the
/// idle set unprobed (or discards it when the idle set is full).
pub struct PoolHandle<'a> {
    connection: Option<Arc<dyn Connection>>,
    pool: &'a ConnectionPool,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<'a> Deref for PoolHandle<'a> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref().expect("connection taken").as_ref()
    }
}

impl<'a> Drop for PoolHandle<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.pool.return_unprobed(conn);
        }
    }
}

impl<'a> PoolHandle<'a> {
    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        self.connection.as_ref().expect("connection taken")
    }
}
