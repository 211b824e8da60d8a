//! Postgres executor
//!
//! Every query runs in its own read-only transaction with a statement
//! timeout and is rolled back afterwards, whatever happened. Rows are
//! aggregated server side into one JSON array so any column types decode.

use super::QueryExecutor;
use crate::error::OrchestrationError;
use crate::models::Row;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct PgExecutor {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgExecutor {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Lazily connected pool; no connection is made until first use.
    pub fn connect_lazy(database_url: &str, statement_timeout: Duration) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to create connection pool: {}", e))
            })?;
        Ok(Self::new(pool, statement_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `json` rather than `jsonb`: keys stay in select-list order.
fn wrap_as_json(query: &str) -> String {
    format!(
        "SELECT COALESCE(json_agg(q), '[]'::json) FROM (\n{}\n) AS q",
        query
    )
}

fn rows_from_json(value: Value) -> Result<Vec<Row>> {
    let Value::Array(items) = value else {
        return Err(OrchestrationError::ExecutionFailed(
            "result was not a JSON array".to_string(),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(OrchestrationError::ExecutionFailed(format!(
                "unexpected row shape: {}",
                other
            ))),
        })
        .collect()
}

fn failed(what: &str, e: sqlx::Error) -> OrchestrationError {
    error!("{}: {}", what, e);
    OrchestrationError::ExecutionFailed(format!("{}: {}", what, e))
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute_read_query(&self, query: &str) -> Result<Vec<Row>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| failed("Failed to begin transaction", e))?;

        let outcome = async {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| failed("Failed to enter read-only mode", e))?;

            sqlx::query(&format!(
                "SET LOCAL statement_timeout = {}",
                self.statement_timeout.as_millis()
            ))
            .execute(&mut *tx)
            .await
            .map_err(|e| failed("Failed to set statement timeout", e))?;

            let value: Value = sqlx::query_scalar(&wrap_as_json(query))
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| failed("Query execution failed", e))?;

            rows_from_json(value)
        }
        .await;

        if let Err(e) = tx.rollback().await {
            warn!("Failed to roll back read-only transaction: {}", e);
        }

        let rows = outcome?;
        debug!(row_count = rows.len(), "Access-query executed");
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestrationError::DatabaseError(format!("Database unreachable: {}", e)))?;
        Ok(())
    }
}
