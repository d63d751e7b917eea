//! Tests for database health checking

use async_trait::async_trait;
use scrawl_core::{Connection, QueryResult, Result, Row, ScrawlError, Value};

use super::ping::{PING_QUERY, PingError, ping};

struct ProbeConnection {
    closed: bool,
    fail_query: bool,
}

#[async_trait]
impl Connection for ProbeConnection {
    fn driver_name(&self) -> &str {
        "probe"
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        assert_eq!(sql, PING_QUERY);
        if self.fail_query {
            return Err(ScrawlError::Query("server closed the connection unexpectedly".into()));
        }
        Ok(QueryResult {
            columns: vec!["?column?".into()],
            rows: vec![Row::new(vec!["?column?".into()], vec![Value::Int32(1)])],
            affected_rows: 0,
        })
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
        unreachable!("ping never executes writes")
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[tokio::test]
async fn test_ping_healthy_connection() {
    let conn = ProbeConnection {
        closed: false,
        fail_query: false,
    };

    let latency = ping(&conn).await.expect("ping should succeed");
    assert!(latency.as_secs() < 5);
}

#[tokio::test]
async fn test_ping_closed_connection() {
    let conn = ProbeConnection {
        closed: true,
        fail_query: false,
    };

    let err = ping(&conn).await.expect_err("ping must fail on a closed connection");
    assert!(matches!(err, PingError::ConnectionClosed));
    assert_eq!(err.to_string(), "connection is closed");
}

#[tokio::test]
async fn test_ping_query_failure() {
    let conn = ProbeConnection {
        closed: false,
        fail_query: true,
    };

    let err = ping(&conn).await.expect_err("ping must surface query failures");
    match err {
        PingError::QueryFailed(msg) => {
            assert!(msg.contains("server closed the connection"))
        }
        other => panic!("expected QueryFailed, got {other:?}"),
    }
}
