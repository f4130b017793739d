use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Number, Value};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::sql_runner::{ResultSet, SqlRunner, SqlRunnerError};

pub struct SqliteSqlRunner {
    pub pool: SqlitePool,
}

impl SqliteSqlRunner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode_column(row: &SqliteRow, index: usize) -> Value {
    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(_) => return Value::Null,
    };
    if raw.is_null() {
        return Value::Null;
    }
    match raw.type_info().name() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(|n| Value::Number(Number::from(n)))
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(BASE64.encode(bytes)))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

#[async_trait]
impl SqlRunner for SqliteSqlRunner {
    async fn execute(&self, sql: &str) -> Result<ResultSet, SqlRunnerError> {
        let raw_rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns: Vec<String> = raw_rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let rows = raw_rows
            .iter()
            .map(|row| {
                let mut object = Map::with_capacity(columns.len());
                for (index, name) in columns.iter().enumerate() {
                    object.insert(name.clone(), decode_column(row, index));
                }
                object
            })
            .collect::<Vec<_>>();

        debug!(rows = rows.len(), "SQL statement executed");
        Ok(ResultSet { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded_runner() -> SqliteSqlRunner {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should open");
        sqlx::query(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, balance REAL)",
        )
        .execute(&pool)
        .await
        .expect("create table");
        for (id, name, balance) in [(1, "Ada", 12.5_f64), (2, "Linus", 0.0), (3, "Grace", 7.25)] {
            sqlx::query("INSERT INTO customers (id, name, balance) VALUES (?, ?, ?)")
                .bind(id)
                .bind(name)
                .bind(balance)
                .execute(&pool)
                .await
                .expect("insert row");
        }
        SqliteSqlRunner::new(pool)
    }

    #[tokio::test]
    async fn decodes_rows_with_column_order() {
        let runner = seeded_runner().await;
        let result = runner
            .execute("SELECT id, name, balance FROM customers ORDER BY id")
            .await
            .expect("query should run");

        assert_eq!(result.columns, vec!["id", "name", "balance"]);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.rows[0].get("id"), Some(&json!(1)));
        assert_eq!(result.rows[0].get("name"), Some(&json!("Ada")));
        assert_eq!(result.rows[0].get("balance"), Some(&json!(12.5)));
    }

    #[tokio::test]
    async fn aggregate_columns_keep_their_alias() {
        let runner = seeded_runner().await;
        let result = runner
            .execute("SELECT COUNT(*) AS count FROM customers")
            .await
            .expect("query should run");

        assert_eq!(result.columns, vec!["count"]);
        assert_eq!(result.rows[0].get("count"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn null_values_decode_to_json_null() {
        let runner = seeded_runner().await;
        sqlx::query("INSERT INTO customers (id, name, balance) VALUES (4, 'Edsger', NULL)")
            .execute(&runner.pool)
            .await
            .expect("insert row");

        let result = runner
            .execute("SELECT balance FROM customers WHERE id = 4")
            .await
            .expect("query should run");
        assert_eq!(result.rows[0].get("balance"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn invalid_sql_surfaces_an_execution_error() {
        let runner = seeded_runner().await;
        let err = runner
            .execute("SELECT nope FROM missing_table")
            .await
            .expect_err("bad SQL should fail");
        assert!(matches!(err, SqlRunnerError::Execution(_)));
    }

    #[tokio::test]
    async fn ping_succeeds_on_a_live_pool() {
        let runner = seeded_runner().await;
        assert!(runner.ping().await);
    }
}
