use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::services::query::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub http_client: Client,
    pub config: Arc<Config>,
}

#[cfg(test)]
pub fn test_state(
    llm: Arc<dyn crate::services::llm::LlmBackend>,
    sql: Arc<dyn crate::db::sql_runner::SqlRunner>,
) -> AppState {
    use crate::cache::QueryCache;
    use crate::config::LlmSettings;
    use crate::worker::TaskPool;

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        frontend_origin: "http://localhost".to_string(),
        worker_pool_size: 2,
        llm: LlmSettings {
            backend: "claude_agent".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            timeout_secs: 5,
            anthropic_api_key: None,
            agent_gateway_url: None,
        },
    };
    AppState {
        query: Arc::new(QueryService::new(
            Arc::new(QueryCache::new()),
            llm,
            sql,
            TaskPool::new(config.worker_pool_size),
        )),
        http_client: Client::new(),
        config: Arc::new(config),
    }
}
