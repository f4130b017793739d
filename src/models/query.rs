use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type ResultRow = Map<String, Value>;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// All-in-one response: question → SQL → results → best-effort figure.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub id: Uuid,
    pub question: String,
    pub sql: String,
    pub results: Vec<ResultRow>,
    pub columns: Vec<String>,
    pub visualization: Option<Value>,
    pub row_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct GenerateSqlRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateSqlResponse {
    pub id: Uuid,
    pub question: String,
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct RunSqlRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct RunSqlResponse {
    pub id: Uuid,
    pub results: Vec<ResultRow>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct GenerateFigureRequest {
    pub id: String,
    #[serde(default)]
    pub chart_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateFigureResponse {
    pub id: Uuid,
    pub figure: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateFollowupsRequest {
    pub question: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<ResultRow>>,
}

#[derive(Debug, Serialize)]
pub struct GenerateFollowupsResponse {
    pub questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoadQuestionRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct LoadQuestionResponse {
    pub id: Uuid,
    pub question: Option<String>,
    pub sql: Option<String>,
    pub results: Option<Vec<ResultRow>>,
    pub columns: Option<Vec<String>>,
    pub figure: Option<Value>,
    pub row_count: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestionHistoryItem {
    pub id: Uuid,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionHistoryResponse {
    pub history: Vec<QuestionHistoryItem>,
}
