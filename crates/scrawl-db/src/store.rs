//! Prediction logging store
//!
//! The demo's two database collaborators go through this surface: the
//! prediction logger inserts one row per classified drawing, and the results
//! view reads the most recent rows back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use scrawl_core::{Result, Row, ScrawlError, Value};

use crate::pool::ConnectionPool;

const INSERT_PREDICTION: &str = "INSERT INTO predictions (predicted_digit, confidence_score, true_label) VALUES ($1, $2, $3)";

const SELECT_PREDICTIONS: &str = "SELECT id, timestamp, predicted_digit, confidence_score, true_label FROM predictions ORDER BY id DESC";

const CREATE_PREDICTIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS predictions (
    id SERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    predicted_digit INTEGER NOT NULL,
    confidence_score REAL NOT NULL,
    true_label INTEGER NOT NULL
)";

/// One logged prediction, as stored in the `predictions` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i32,
    pub timestamp: Option<DateTime<Utc>>,
    pub predicted_digit: i32,
    pub confidence_score: f32,
    pub true_label: i32,
}

/// Store for prediction results, backed by a connection pool
pub struct PredictionStore {
    pool: Arc<ConnectionPool>,
}

impl PredictionStore {
    /// Create a store on top of an existing pool
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Create the `predictions` table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        self.pool.execute(CREATE_PREDICTIONS_TABLE, &[]).await?;
        tracing::info!("predictions table ready");
        Ok(())
    }

    /// Log a prediction result to the `predictions` table
    pub async fn log_prediction(
        &self,
        predicted_digit: i32,
        confidence_score: f32,
        true_label: i32,
    ) -> Result<()> {
        let params = [
            Value::Int32(predicted_digit),
            Value::Float32(confidence_score),
            Value::Int32(true_label),
        ];

        self.pool
            .execute(INSERT_PREDICTION, &params)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to log prediction");
                e
            })?;

        tracing::info!(
            predicted_digit,
            confidence_score,
            true_label,
            "logged prediction"
        );
        Ok(())
    }

    /// Fetch the most recent predictions, newest first
    pub async fn recent_predictions(&self, limit: Option<i64>) -> Result<Vec<PredictionRecord>> {
        let result = match limit {
            Some(n) => {
                let sql = format!("{} LIMIT $1", SELECT_PREDICTIONS);
                self.pool.execute(&sql, &[Value::Int64(n)]).await?
            }
            None => self.pool.execute(SELECT_PREDICTIONS, &[]).await?,
        };

        result.rows.iter().map(decode_prediction).collect()
    }
}

fn decode_prediction(row: &Row) -> Result<PredictionRecord> {
    let id = int_column(row, "id")? as i32;
    let predicted_digit = int_column(row, "predicted_digit")? as i32;
    let true_label = int_column(row, "true_label")? as i32;

    let confidence_score = row
        .get_by_name("confidence_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| bad_column("confidence_score"))? as f32;

    let timestamp = match row.get_by_name("timestamp") {
        Some(Value::TimestampTz(ts)) => Some(*ts),
        Some(Value::Timestamp(ts)) => Some(DateTime::from_naive_utc_and_offset(*ts, Utc)),
        _ => None,
    };

    Ok(PredictionRecord {
        id,
        timestamp,
        predicted_digit,
        confidence_score,
        true_label,
    })
}

fn int_column(row: &Row, name: &str) -> Result<i64> {
    row.get_by_name(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| bad_column(name))
}

fn bad_column(name: &str) -> ScrawlError {
    ScrawlError::Query(format!(
        "predictions row missing or mistyped column: {}",
        name
    ))
}

#[cfg(test)]
mod tests;
