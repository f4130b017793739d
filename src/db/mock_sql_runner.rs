use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::sql_runner::{ResultSet, SqlRunner, SqlRunnerError};

/// Scripted runner for service and route tests. Replays queued results in
/// order and records every statement it was asked to execute.
#[derive(Default)]
pub struct MockSqlRunner {
    results: Mutex<VecDeque<Result<ResultSet, String>>>,
    pub executed: Mutex<Vec<String>>,
}

impl MockSqlRunner {
    pub fn with_result(result: ResultSet) -> Self {
        Self {
            results: Mutex::new(VecDeque::from(vec![Ok(result)])),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_with(message: impl Into<String>) -> Self {
        Self {
            results: Mutex::new(VecDeque::from(vec![Err(message.into())])),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn push_result(&self, result: ResultSet) {
        self.results.lock().unwrap().push_back(Ok(result));
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlRunner for MockSqlRunner {
    async fn execute(&self, sql: &str) -> Result<ResultSet, SqlRunnerError> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(SqlRunnerError::Execution(sqlx::Error::Protocol(message))),
            None => Ok(ResultSet::default()),
        }
    }
}
