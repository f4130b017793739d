use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    models::query::{
        GenerateFigureRequest, GenerateFollowupsRequest, GenerateFollowupsResponse,
        GenerateSqlRequest, LoadQuestionRequest, QueryRequest, RunSqlRequest,
    },
    responses::JsonResponse,
    services::chart::ChartType,
    services::query::QueryError,
    state::AppState,
};

fn error_response(err: QueryError) -> Response {
    match &err {
        QueryError::Validation(_) | QueryError::MissingPrerequisite(_) => {
            JsonResponse::bad_request(&err.to_string()).into_response()
        }
        QueryError::NotFound(_) => JsonResponse::not_found(&err.to_string()).into_response(),
        QueryError::UpstreamTimeout(_) => {
            JsonResponse::gateway_timeout(&err.to_string()).into_response()
        }
        QueryError::Upstream(_) => JsonResponse::bad_gateway(&err.to_string()).into_response(),
        QueryError::Internal(_) => JsonResponse::server_error(&err.to_string()).into_response(),
    }
}

// Handles are opaque; anything that does not parse cannot name a session.
fn parse_handle(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| {
        JsonResponse::not_found(&format!("Query session not found: {id}")).into_response()
    })
}

/// All-in-one: question → SQL → results → best-effort figure.
pub async fn ask(State(state): State<AppState>, Json(payload): Json<QueryRequest>) -> Response {
    match state.query.ask(&payload.question).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn generate_sql(
    State(state): State<AppState>,
    Json(payload): Json<GenerateSqlRequest>,
) -> Response {
    match state.query.generate_sql(&payload.question).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn run_sql(
    State(state): State<AppState>,
    Json(payload): Json<RunSqlRequest>,
) -> Response {
    let id = match parse_handle(&payload.id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.query.run_sql(id).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn generate_figure(
    State(state): State<AppState>,
    Json(payload): Json<GenerateFigureRequest>,
) -> Response {
    let id = match parse_handle(&payload.id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let chart_type = ChartType::parse(payload.chart_type.as_deref());
    match state.query.generate_figure(id, chart_type).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn generate_followups(
    State(state): State<AppState>,
    Json(payload): Json<GenerateFollowupsRequest>,
) -> Response {
    match state
        .query
        .followup_questions(
            &payload.question,
            payload.sql.as_deref(),
            payload.results.as_deref(),
        )
        .await
    {
        Ok(questions) => Json(GenerateFollowupsResponse { questions }).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn load_question(
    State(state): State<AppState>,
    Json(payload): Json<LoadQuestionRequest>,
) -> Response {
    let id = match parse_handle(&payload.id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.query.load_question(id) {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn question_history(State(state): State<AppState>) -> Response {
    Json(state.query.question_history()).into_response()
}

pub async fn download_csv(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let handle = match parse_handle(&id) {
        Ok(handle) => handle,
        Err(resp) => return resp,
    };
    match state.query.download_csv(handle) {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=query_{handle}.csv"),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}
