use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::{
    config::{APP_NAME, VERSION},
    models::health::{ApiHealthResponse, BackendsResponse, HealthResponse},
    responses::JsonResponse,
    services::llm::available_backends,
    state::AppState,
};

/// A simple root route.
pub async fn root() -> Response {
    JsonResponse::success("QueryDesk SQL AI is running").into_response()
}

/// Basic liveness probe, no dependencies touched.
pub async fn health() -> Response {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: APP_NAME.to_string(),
        version: VERSION.to_string(),
    })
    .into_response()
}

/// Full health check: database connectivity, active backend, cache size.
pub async fn api_health(State(state): State<AppState>) -> Response {
    if !state.query.ping_database().await {
        error!("health check failed: database unreachable");
        return JsonResponse::service_unavailable("Database not connected").into_response();
    }

    Json(ApiHealthResponse {
        status: "healthy".to_string(),
        service: APP_NAME.to_string(),
        version: VERSION.to_string(),
        backend: state.query.backend_name().to_string(),
        database: format!("{} - Connected", state.config.database_url),
        cached_queries: state.query.cached_queries(),
    })
    .into_response()
}

/// Probe both configured LLM backends without touching the active selection.
pub async fn list_backends(State(state): State<AppState>) -> Response {
    let backends = available_backends(&state.http_client, &state.config.llm)
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(BackendsResponse { backends }).into_response()
}
