//! Tests for the prediction store

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use scrawl_core::{
    Connection, ConnectionFactory, QueryResult, Result, Row, ScrawlError, Value,
};

use super::*;
use crate::health::PING_QUERY;
use crate::pool::{ConnectionPool, PoolConfig};

struct StoredRow {
    id: i32,
    timestamp: DateTime<Utc>,
    predicted_digit: i32,
    confidence_score: f32,
    true_label: i32,
}

/// In-memory stand-in for the predictions table
///
/// Inserts stage rows until commit; rollback discards the staged rows. This
/// mirrors the implicit-transaction behavior the store relies on.
struct TableConnection {
    staged: Mutex<Vec<(i32, f32, i32)>>,
    committed: Mutex<Vec<StoredRow>>,
    next_id: AtomicI32,
    recorded: Mutex<Vec<(String, Vec<Value>)>>,
    return_malformed_rows: AtomicBool,
}

impl TableConnection {
    fn new() -> Self {
        Self {
            staged: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1),
            recorded: Mutex::new(Vec::new()),
            return_malformed_rows: AtomicBool::new(false),
        }
    }

    fn seed(&self, rows: &[(i32, f32, i32)]) {
        let mut committed = self.committed.lock();
        for &(digit, confidence, label) in rows {
            committed.push(StoredRow {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                timestamp: Utc::now(),
                predicted_digit: digit,
                confidence_score: confidence,
                true_label: label,
            });
        }
    }

    fn recorded(&self, index: usize) -> (String, Vec<Value>) {
        self.recorded.lock()[index].clone()
    }

    fn select_rows(&self, limit: Option<usize>) -> Vec<Row> {
        let columns: Vec<String> = [
            "id",
            "timestamp",
            "predicted_digit",
            "confidence_score",
            "true_label",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let committed = self.committed.lock();
        let mut rows: Vec<Row> = committed
            .iter()
            .rev()
            .map(|r| {
                Row::new(
                    columns.clone(),
                    vec![
                        Value::Int32(r.id),
                        Value::TimestampTz(r.timestamp),
                        Value::Int32(r.predicted_digit),
                        Value::Float32(r.confidence_score),
                        Value::Int32(r.true_label),
                    ],
                )
            })
            .collect();
        if let Some(n) = limit {
            rows.truncate(n);
        }
        rows
    }
}

#[async_trait]
impl Connection for TableConnection {
    fn driver_name(&self) -> &str {
        "table"
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if sql == PING_QUERY {
            return Ok(QueryResult::empty());
        }
        self.recorded.lock().push((sql.to_string(), params.to_vec()));

        if self.return_malformed_rows.load(Ordering::SeqCst) {
            let columns = vec!["id".to_string(), "true_label".to_string()];
            return Ok(QueryResult {
                columns: columns.clone(),
                rows: vec![Row::new(columns, vec![Value::Int32(1), Value::Int32(1)])],
                affected_rows: 0,
            });
        }

        let limit = match params.first() {
            Some(v) => Some(
                v.as_i64()
                    .ok_or_else(|| ScrawlError::Query("bad LIMIT parameter".into()))?
                    as usize,
            ),
            None => None,
        };
        let rows = self.select_rows(limit);
        Ok(QueryResult {
            columns: rows.first().map(|r| r.columns().to_vec()).unwrap_or_default(),
            rows,
            affected_rows: 0,
        })
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.recorded.lock().push((sql.to_string(), params.to_vec()));

        if sql.trim_start().starts_with("CREATE") {
            return Ok(0);
        }

        let digit = params
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| ScrawlError::Query("bad predicted_digit parameter".into()))?;
        let confidence = params
            .get(1)
            .and_then(Value::as_f64)
            .ok_or_else(|| ScrawlError::Query("bad confidence_score parameter".into()))?;
        let label = params
            .get(2)
            .and_then(Value::as_i64)
            .ok_or_else(|| ScrawlError::Query("bad true_label parameter".into()))?;

        self.staged
            .lock()
            .push((digit as i32, confidence as f32, label as i32));
        Ok(1)
    }

    async fn commit(&self) -> Result<()> {
        let staged: Vec<_> = self.staged.lock().drain(..).collect();
        self.seed(&staged);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.staged.lock().clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

struct TableFactory {
    connection: Arc<TableConnection>,
}

#[async_trait]
impl ConnectionFactory for TableFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        Ok(self.connection.clone())
    }
}

fn store_over(connection: Arc<TableConnection>) -> PredictionStore {
    let pool = ConnectionPool::new(PoolConfig::new(1, 2), TableFactory { connection });
    PredictionStore::new(Arc::new(pool))
}

#[tokio::test]
async fn test_log_prediction_issues_parameterized_insert() {
    let conn = Arc::new(TableConnection::new());
    let store = store_over(conn.clone());

    store.log_prediction(7, 0.88, 7).await.expect("log prediction");

    let (sql, params) = conn.recorded(0);
    assert_eq!(sql, INSERT_PREDICTION);
    assert_eq!(
        params,
        vec![Value::Int32(7), Value::Float32(0.88), Value::Int32(7)]
    );
    // The write was committed, not left staged.
    assert_eq!(conn.committed.lock().len(), 1);
    assert!(conn.staged.lock().is_empty());
}

#[tokio::test]
async fn test_recent_predictions_newest_first() {
    let conn = Arc::new(TableConnection::new());
    conn.seed(&[(9, 0.51, 8), (3, 0.99, 3)]);
    let store = store_over(conn.clone());

    let records = store.recent_predictions(None).await.expect("fetch");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 2);
    assert_eq!(records[0].predicted_digit, 3);
    assert_eq!(records[0].true_label, 3);
    assert!((records[0].confidence_score - 0.99).abs() < 1e-6);
    assert_eq!(records[1].id, 1);
    assert_eq!(records[1].predicted_digit, 9);
    assert!(records[1].timestamp.is_some());

    let (sql, params) = conn.recorded(0);
    assert_eq!(sql, SELECT_PREDICTIONS);
    assert!(params.is_empty());
}

#[tokio::test]
async fn test_recent_predictions_honors_limit() {
    let conn = Arc::new(TableConnection::new());
    conn.seed(&[(1, 0.9, 1), (2, 0.9, 2), (3, 0.9, 3)]);
    let store = store_over(conn.clone());

    let records = store.recent_predictions(Some(2)).await.expect("fetch");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 3);
    assert_eq!(records[1].id, 2);

    let (sql, params) = conn.recorded(0);
    assert!(sql.ends_with("LIMIT $1"));
    assert_eq!(params, vec![Value::Int64(2)]);
}

#[tokio::test]
async fn test_ensure_schema_creates_table() {
    let conn = Arc::new(TableConnection::new());
    let store = store_over(conn.clone());

    store.ensure_schema().await.expect("ensure schema");

    let (sql, params) = conn.recorded(0);
    assert_eq!(sql, CREATE_PREDICTIONS_TABLE);
    assert!(params.is_empty());
}

#[tokio::test]
async fn test_logged_prediction_is_readable_back() {
    let conn = Arc::new(TableConnection::new());
    let store = store_over(conn.clone());

    store.log_prediction(4, 0.73, 4).await.expect("log prediction");
    let records = store.recent_predictions(Some(1)).await.expect("fetch");

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, 1);
    assert_eq!(record.predicted_digit, 4);
    assert_eq!(record.true_label, 4);
    assert!((record.confidence_score - 0.73).abs() < 1e-6);
    assert!(record.timestamp.is_some());
}

#[tokio::test]
async fn test_decode_error_names_missing_column() {
    let conn = Arc::new(TableConnection::new());
    conn.return_malformed_rows.store(true, Ordering::SeqCst);
    let store = store_over(conn.clone());

    let err = store
        .recent_predictions(None)
        .await
        .expect_err("malformed rows must not decode");

    match err {
        ScrawlError::Query(msg) => assert!(msg.contains("predicted_digit")),
        other => panic!("expected Query error, got {other:?}"),
    }
}
