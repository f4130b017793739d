use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlRunnerError {
    #[error("SQL execution failed: {0}")]
    Execution(#[from] sqlx::Error),
}

/// A materialized query result: ordered rows keyed by column name, plus the
/// column order. Every row carries exactly the keys in `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Executes SQL against the configured relational database.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultSet, SqlRunnerError>;

    /// Cheap connectivity probe for health reporting.
    async fn ping(&self) -> bool {
        self.execute("SELECT 1").await.is_ok()
    }
}
