use std::env;

pub const APP_NAME: &str = "QueryDesk SQL AI";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Requested backend: `claude_agent`, `anthropic_api` or `auto`.
    pub backend: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub anthropic_api_key: Option<String>,
    pub agent_gateway_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub worker_pool_size: usize,
    pub llm: LlmSettings,
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self {
            backend: env::var("LLM_BACKEND").unwrap_or_else(|_| "claude_agent".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
            temperature: parsed_env("LLM_TEMPERATURE", 0.1),
            max_tokens: parsed_env("LLM_MAX_TOKENS", 2048),
            timeout_secs: parsed_env("LLM_TIMEOUT_SECONDS", 30),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            agent_gateway_url: optional_env("AGENT_GATEWAY_URL"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let frontend_origin = env::var("FRONTEND_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        Config {
            database_url,
            frontend_origin,
            worker_pool_size: parsed_env("WORKER_POOL_SIZE", 4),
            llm: LlmSettings::from_env(),
        }
    }
}
