use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheField, QueryCache};
use crate::db::sql_runner::{ResultSet, SqlRunner};
use crate::models::query::{
    GenerateFigureResponse, GenerateSqlResponse, LoadQuestionResponse, QueryResponse,
    QuestionHistoryItem, QuestionHistoryResponse, ResultRow, RunSqlResponse,
};
use crate::services::chart::{self, ChartType};
use crate::services::llm::{ChatMessage, LlmBackend, LlmError};
use crate::utils::csv::render_csv;
use crate::worker::TaskPool;

const SQL_SYSTEM_PROMPT: &str = "You are a SQL generation assistant for a relational database. \
Respond with a single valid SQL query answering the user's question and nothing else. \
Do not explain the query.";

const FOLLOWUP_SYSTEM_PROMPT: &str = "You suggest follow-up questions a user could ask next \
about their data. Respond with one short question per line, without numbering.";

const FOLLOWUP_SAMPLE_ROWS: usize = 10;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Validation(String),
    #[error("Query session not found: {0}")]
    NotFound(Uuid),
    #[error("Missing prerequisite field(s): {0}")]
    MissingPrerequisite(String),
    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("worker task failed: {0}")]
    Internal(String),
}

fn llm_error(err: LlmError) -> QueryError {
    if matches!(&err, LlmError::Timeout(_)) {
        QueryError::UpstreamTimeout(err.to_string())
    } else {
        QueryError::Upstream(err.to_string())
    }
}

/// Strip a markdown code fence from a completion, keeping whatever the model
/// wrapped in it.
fn extract_sql(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after
            .strip_prefix("sql")
            .or_else(|| after.strip_prefix("SQL"))
            .unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }
    trimmed.to_string()
}

fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(['-', '*'])
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')'])
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .take(5)
        .collect()
}

/// Coordinates the multi-step query workflow: every blocking edge (LLM call,
/// SQL execution, figure rendering) runs on the bounded [`TaskPool`], and all
/// intermediate state lands in the [`QueryCache`] under the session handle.
pub struct QueryService {
    cache: Arc<QueryCache>,
    llm: Arc<dyn LlmBackend>,
    sql: Arc<dyn SqlRunner>,
    pool: TaskPool,
}

impl QueryService {
    pub fn new(
        cache: Arc<QueryCache>,
        llm: Arc<dyn LlmBackend>,
        sql: Arc<dyn SqlRunner>,
        pool: TaskPool,
    ) -> Self {
        Self {
            cache,
            llm,
            sql,
            pool,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.llm.name()
    }

    pub async fn ping_database(&self) -> bool {
        self.sql.ping().await
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.size()
    }

    fn require_question(question: &str) -> Result<String, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::Validation(
                "Missing or empty 'question' field".to_string(),
            ));
        }
        Ok(question.to_string())
    }

    fn record_failure(&self, id: Uuid, err: &QueryError) {
        self.cache
            .set(id, CacheField::Error, Value::String(err.to_string()));
    }

    fn cached_string(&self, id: Uuid, field: CacheField) -> Option<String> {
        self.cache
            .get(id, field)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    fn cached_rows(&self, id: Uuid) -> Option<Vec<ResultRow>> {
        self.cache.get(id, CacheField::Results).and_then(|value| {
            value.as_array().map(|rows| {
                rows.iter()
                    .filter_map(|row| row.as_object().cloned())
                    .collect()
            })
        })
    }

    fn cached_columns(&self, id: Uuid) -> Option<Vec<String>> {
        self.cache.get(id, CacheField::Columns).and_then(|value| {
            value.as_array().map(|columns| {
                columns
                    .iter()
                    .filter_map(|column| column.as_str().map(str::to_string))
                    .collect()
            })
        })
    }

    /// First workflow step: mint a handle, record the question, generate SQL.
    pub async fn generate_sql(&self, question: &str) -> Result<GenerateSqlResponse, QueryError> {
        let question = Self::require_question(question)?;
        let id = self.cache.new_handle();
        // The question lands in the cache before the generation task is
        // submitted, so a concurrent history read never sees sql without it.
        self.cache
            .set(id, CacheField::Question, Value::String(question.clone()));
        let sql = self.generate_into(id, &question).await?;
        Ok(GenerateSqlResponse { id, question, sql })
    }

    async fn generate_into(&self, id: Uuid, question: &str) -> Result<String, QueryError> {
        let llm = Arc::clone(&self.llm);
        let question = question.to_string();
        let task = self
            .pool
            .dispatch(async move {
                let messages = [
                    ChatMessage::system(SQL_SYSTEM_PROMPT),
                    ChatMessage::user(question),
                ];
                llm.generate(&messages).await
            })
            .await;

        let sql = match task.await {
            Ok(Ok(text)) => extract_sql(&text),
            Ok(Err(err)) => {
                error!(%id, error = %err, "SQL generation failed");
                let mapped = llm_error(err);
                self.record_failure(id, &mapped);
                return Err(mapped);
            }
            Err(err) => {
                error!(%id, error = %err, "SQL generation task aborted");
                let mapped = QueryError::Internal(err.to_string());
                self.record_failure(id, &mapped);
                return Err(mapped);
            }
        };

        self.cache
            .set(id, CacheField::Sql, Value::String(sql.clone()));
        info!(%id, "generated SQL cached");
        Ok(sql)
    }

    /// Second workflow step: execute the cached SQL for `id`.
    pub async fn run_sql(&self, id: Uuid) -> Result<RunSqlResponse, QueryError> {
        if !self.cache.exists(id) {
            return Err(QueryError::NotFound(id));
        }
        let result = self.execute_into(id).await?;
        let row_count = result.row_count();
        Ok(RunSqlResponse {
            id,
            results: result.rows,
            columns: result.columns,
            row_count,
        })
    }

    async fn execute_into(&self, id: Uuid) -> Result<ResultSet, QueryError> {
        let sql = match self.cached_string(id, CacheField::Sql) {
            Some(sql) if !sql.trim().is_empty() => sql,
            _ => return Err(QueryError::MissingPrerequisite("sql".to_string())),
        };

        let runner = Arc::clone(&self.sql);
        let task = self
            .pool
            .dispatch(async move { runner.execute(&sql).await })
            .await;

        match task.await {
            Ok(Ok(result)) => {
                self.cache.set(
                    id,
                    CacheField::Results,
                    Value::Array(result.rows.iter().cloned().map(Value::Object).collect()),
                );
                self.cache
                    .set(id, CacheField::Columns, json!(result.columns));
                info!(%id, rows = result.row_count(), "SQL executed");
                Ok(result)
            }
            Ok(Err(err)) => {
                error!(%id, error = %err, "SQL execution failed");
                let mapped = QueryError::Upstream(err.to_string());
                self.record_failure(id, &mapped);
                Err(mapped)
            }
            Err(err) => {
                error!(%id, error = %err, "SQL execution task aborted");
                let mapped = QueryError::Internal(err.to_string());
                self.record_failure(id, &mapped);
                Err(mapped)
            }
        }
    }

    /// Third workflow step, best-effort: derive a figure from cached results.
    /// Missing prerequisites or unplottable data yield an empty figure, not
    /// an error.
    pub async fn generate_figure(
        &self,
        id: Uuid,
        chart_type: ChartType,
    ) -> Result<GenerateFigureResponse, QueryError> {
        if !self.cache.exists(id) {
            return Err(QueryError::NotFound(id));
        }

        let mut missing = Vec::new();
        if self.cached_string(id, CacheField::Question).is_none() {
            missing.push(CacheField::Question.as_str());
        }
        if self.cached_string(id, CacheField::Sql).is_none() {
            missing.push(CacheField::Sql.as_str());
        }
        if self.cached_rows(id).is_none() {
            missing.push(CacheField::Results.as_str());
        }
        if !missing.is_empty() {
            warn!(%id, missing = %missing.join(", "), "figure prerequisites missing");
            return Ok(GenerateFigureResponse { id, figure: None });
        }

        let figure = self.figure_into(id, chart_type).await;
        Ok(GenerateFigureResponse { id, figure })
    }

    async fn figure_into(&self, id: Uuid, chart_type: ChartType) -> Option<Value> {
        let question = self.cached_string(id, CacheField::Question)?;
        let columns = self.cached_columns(id)?;
        let rows = self.cached_rows(id)?;

        let task = self
            .pool
            .dispatch(async move { chart::build_figure(&question, &columns, &rows, chart_type) })
            .await;

        let figure = match task.await {
            Ok(figure) => figure,
            Err(err) => {
                warn!(%id, error = %err, "figure rendering task aborted");
                None
            }
        };
        if let Some(figure) = &figure {
            self.cache.set(id, CacheField::Figure, figure.clone());
            info!(%id, "figure cached");
        }
        figure
    }

    /// All-in-one pipeline: question → SQL → results → best-effort figure.
    pub async fn ask(&self, question: &str) -> Result<QueryResponse, QueryError> {
        let question = Self::require_question(question)?;
        let id = self.cache.new_handle();
        self.cache
            .set(id, CacheField::Question, Value::String(question.clone()));

        let sql = self.generate_into(id, &question).await?;
        let result = self.execute_into(id).await?;
        let visualization = self.figure_into(id, ChartType::Bar).await;

        let row_count = result.row_count();
        info!(%id, rows = row_count, "query pipeline finished");
        Ok(QueryResponse {
            id,
            question,
            sql,
            results: result.rows,
            columns: result.columns,
            visualization,
            row_count,
        })
    }

    /// Read back everything a session has accumulated so far.
    pub fn load_question(&self, id: Uuid) -> Result<LoadQuestionResponse, QueryError> {
        if !self.cache.exists(id) {
            return Err(QueryError::NotFound(id));
        }
        let results = self.cached_rows(id);
        let row_count = results.as_ref().map(Vec::len);
        Ok(LoadQuestionResponse {
            id,
            question: self.cached_string(id, CacheField::Question),
            sql: self.cached_string(id, CacheField::Sql),
            results,
            columns: self.cached_columns(id),
            figure: self.cache.get(id, CacheField::Figure),
            row_count,
            error: self.cached_string(id, CacheField::Error),
        })
    }

    /// Every session with a question, oldest first.
    pub fn question_history(&self) -> QuestionHistoryResponse {
        let history = self
            .cache
            .list_by_field(CacheField::Question)
            .into_iter()
            .filter_map(|(id, value)| {
                value.as_str().map(|question| QuestionHistoryItem {
                    id,
                    question: question.to_string(),
                })
            })
            .collect();
        QuestionHistoryResponse { history }
    }

    pub fn download_csv(&self, id: Uuid) -> Result<String, QueryError> {
        if !self.cache.exists(id) {
            return Err(QueryError::NotFound(id));
        }
        let (rows, columns) = match (self.cached_rows(id), self.cached_columns(id)) {
            (Some(rows), Some(columns)) => (rows, columns),
            _ => return Err(QueryError::MissingPrerequisite("results".to_string())),
        };
        Ok(render_csv(&columns, &rows))
    }

    /// Suggest follow-up questions for an answered query. Stateless: works on
    /// caller-provided context, no handle involved.
    pub async fn followup_questions(
        &self,
        question: &str,
        sql: Option<&str>,
        results: Option<&[ResultRow]>,
    ) -> Result<Vec<String>, QueryError> {
        let question = Self::require_question(question)?;

        let mut prompt = format!("The user asked: {question}");
        if let Some(sql) = sql {
            prompt.push_str("\nThe SQL used to answer it was: ");
            prompt.push_str(sql);
        }
        if let Some(rows) = results {
            let sample = &rows[..rows.len().min(FOLLOWUP_SAMPLE_ROWS)];
            if let Ok(rendered) = serde_json::to_string(sample) {
                prompt.push_str("\nA sample of the result rows: ");
                prompt.push_str(&rendered);
            }
        }
        prompt.push_str("\nSuggest up to five follow-up questions.");

        let llm = Arc::clone(&self.llm);
        let task = self
            .pool
            .dispatch(async move {
                let messages = [
                    ChatMessage::system(FOLLOWUP_SYSTEM_PROMPT),
                    ChatMessage::user(prompt),
                ];
                llm.generate(&messages).await
            })
            .await;

        match task.await {
            Ok(Ok(text)) => Ok(parse_questions(&text)),
            Ok(Err(err)) => {
                error!(error = %err, "follow-up generation failed");
                Err(llm_error(err))
            }
            Err(err) => Err(QueryError::Internal(err.to_string())),
        }
    }
}
