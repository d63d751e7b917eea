//! PostgreSQL connection implementation

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio_postgres::{
    Client, NoTls, Row as PgRow,
    types::{ToSql, Type},
};
use scrawl_core::{Connection, QueryResult, Result, Row, ScrawlError, Value};

/// Fold a server error's message, detail, hint, and SQLSTATE into one string
fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = format!("{} [{}]", db_error.message(), db_error.code().code());
    for (label, part) in [("detail", db_error.detail()), ("hint", db_error.hint())] {
        if let Some(text) = part.filter(|t| !t.trim().is_empty()) {
            message.push_str(&format!("; {label}: {text}"));
        }
    }
    message
}

/// PostgreSQL connection wrapper
///
/// Sessions follow the implicit-transaction model the pool's commit/rollback
/// contract assumes: the first statement after connect (or after a
/// commit/rollback) issues `BEGIN`, and `commit`/`rollback` end the
/// transaction. tokio-postgres autocommits otherwise, which would make the
/// pool's rollback-on-failure a no-op.
pub struct PostgresConnection {
    client: Client,
    closed: AtomicBool,
    in_transaction: AtomicBool,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database using a connection string
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| {
                let message = format_postgres_error(&e);
                tracing::error!(error = %message, "failed to connect to PostgreSQL");
                ScrawlError::Connection(format!("Failed to connect to PostgreSQL: {}", message))
            })?;

        // The connection object drives the socket until the client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::info!("PostgreSQL connection established");
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
        })
    }

    /// Open a transaction if the session does not already have one
    async fn ensure_transaction(&self) -> Result<()> {
        if self.in_transaction.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.client.batch_execute("BEGIN").await.map_err(|e| {
            let message = format_postgres_error(&e);
            ScrawlError::Query(format!("Failed to begin transaction: {}", message))
        })?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Prepare a statement and bind parameters using the statement's types
    async fn prepare_params(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<(tokio_postgres::Statement, Vec<PgValue>)> {
        let statement = self.client.prepare(sql).await.map_err(|e| {
            let message = format_postgres_error(&e);
            ScrawlError::Query(format!("Failed to prepare statement: {}", message))
        })?;

        let param_types = statement.params();
        let pg_params: Vec<PgValue> = params
            .iter()
            .enumerate()
            .map(|(i, value)| PgValue::from_value(value, param_types.get(i)))
            .collect();

        Ok((statement, pg_params))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        self.ensure_transaction().await?;

        let (statement, pg_params) = self.prepare_params(sql, params).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = self
            .client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| {
                let message = format_postgres_error(&e);
                ScrawlError::Query(format!("Failed to execute query: {}", message))
            })?;

        // Column names come from the prepared statement so empty result sets
        // still carry them.
        let column_names: Vec<String> = statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut values = Vec::with_capacity(column_names.len());
            for idx in 0..column_names.len() {
                values.push(postgres_to_value(pg_row, idx));
            }
            rows.push(Row::new(column_names.clone(), values));
        }

        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = start_time.elapsed().as_millis() as u64,
            "query executed"
        );

        Ok(QueryResult {
            columns: column_names,
            rows,
            affected_rows: 0,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_transaction().await?;

        let (statement, pg_params) = self.prepare_params(sql, params).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows_affected = self
            .client
            .execute(&statement, &param_refs)
            .await
            .map_err(|e| {
                let message = format_postgres_error(&e);
                ScrawlError::Query(format!("Failed to execute statement: {}", message))
            })?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(rows_affected)
    }

    async fn commit(&self) -> Result<()> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.client.batch_execute("COMMIT").await.map_err(|e| {
            let message = format_postgres_error(&e);
            ScrawlError::Query(format!("Failed to commit transaction: {}", message))
        })?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.client.batch_execute("ROLLBACK").await.map_err(|e| {
            let message = format_postgres_error(&e);
            ScrawlError::Query(format!("Failed to rollback transaction: {}", message))
        })?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing PostgreSQL connection");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.client.is_closed()
    }
}

/// Wrapper enum for converting scrawl_core::Value to types implementing ToSql
#[derive(Debug)]
enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(chrono::NaiveDateTime),
    TimestampTz(chrono::DateTime<chrono::Utc>),
}

impl PgValue {
    /// Convert a `Value` into the variant matching the target column type
    /// when the prepared statement names one, so tokio-postgres writes the
    /// correct binary width (4 bytes for an INT4 column, not the 8 an i64
    /// would produce). Without a target type the variant mirrors the input.
    fn from_value(value: &Value, target: Option<&Type>) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => Self::int(i64::from(*v), target),
            Value::Int32(v) => Self::int(i64::from(*v), target),
            Value::Int64(v) => Self::int(*v, target),
            Value::Float32(v) => {
                if target == Some(&Type::FLOAT8) {
                    PgValue::Float64(f64::from(*v))
                } else {
                    PgValue::Float32(*v)
                }
            }
            Value::Float64(v) => {
                if target == Some(&Type::FLOAT4) {
                    PgValue::Float32(*v as f32)
                } else {
                    PgValue::Float64(*v)
                }
            }
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Timestamp(v) => PgValue::Timestamp(*v),
            Value::TimestampTz(v) => PgValue::TimestampTz(*v),
        }
    }

    fn int(value: i64, target: Option<&Type>) -> Self {
        match target {
            Some(t) if *t == Type::INT2 => PgValue::Int16(value as i16),
            Some(t) if *t == Type::INT4 => PgValue::Int32(value as i32),
            _ => PgValue::Int64(value),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>>
    {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Timestamp(v) => v.to_sql(ty, out),
            PgValue::TimestampTz(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Decode one cell, mapping NULL and undecodable values to `Value::Null`
fn cell<'a, T>(row: &'a PgRow, idx: usize, wrap: fn(T) -> Value) -> Value
where
    T: postgres_types::FromSql<'a>,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        _ => Value::Null,
    }
}

/// Convert a PostgreSQL row cell to a `Value`, dispatching on the column's
/// declared type name
fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    match row.columns()[idx].type_().name() {
        "bool" => cell(row, idx, Value::Bool),
        "int2" | "smallint" => cell(row, idx, Value::Int16),
        "int4" | "int" | "integer" => cell(row, idx, Value::Int32),
        "int8" | "bigint" => cell(row, idx, Value::Int64),
        "float4" | "real" => cell(row, idx, Value::Float32),
        "float8" | "double precision" => cell(row, idx, Value::Float64),
        "text" | "varchar" | "char" | "bpchar" | "name" => cell(row, idx, Value::String),
        "bytea" => cell(row, idx, Value::Bytes),
        "timestamp" => cell(row, idx, Value::Timestamp),
        "timestamptz" => cell(row, idx, Value::TimestampTz),
        // NUMERIC has no binary f64 decoding; columns of that type come back
        // as Null rather than failing the whole row.
        _ => Value::Null,
    }
}
