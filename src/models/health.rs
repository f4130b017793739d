use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ApiHealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub backend: String,
    pub database: String,
    pub cached_queries: usize,
}

#[derive(Debug, Serialize)]
pub struct BackendsResponse {
    pub backends: Vec<String>,
}
