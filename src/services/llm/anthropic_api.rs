use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmSettings;

use super::{split_system, ChatMessage, LlmBackend, LlmError, ANTHROPIC_API_BACKEND};

pub const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

fn base_url() -> String {
    env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| ANTHROPIC_DEFAULT_BASE_URL.to_string())
}

/// Direct Messages API backend, the fallback when no agent gateway is
/// configured.
#[derive(Debug)]
pub struct AnthropicApiBackend {
    client: Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<MessageBody<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl AnthropicApiBackend {
    pub fn new(client: Client, settings: &LlmSettings) -> Self {
        Self {
            client,
            api_key: settings.anthropic_api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    fn error_message(body: &str) -> String {
        serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error)
            .and_then(|detail| detail.message)
            .unwrap_or_else(|| body.chars().take(300).collect())
    }
}

#[async_trait]
impl LlmBackend for AnthropicApiBackend {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(LlmError::Unavailable(ANTHROPIC_API_BACKEND))?;

        let (system, turns) = split_system(messages);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages: turns
                .iter()
                .map(|message| MessageBody {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
        };

        let url = format!("{}/v1/messages", base_url().trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::from_reqwest(err, self.timeout))?;

        let status = res.status();
        if !status.is_success() {
            let raw = res.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status,
                message: Self::error_message(&raw),
            });
        }

        let parsed: MessagesResponse = res
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| LlmError::InvalidResponse("no text content block".to_string()))?;
        debug!(chars = text.len(), "messages API completion received");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        ANTHROPIC_API_BACKEND
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmSettings;
    use once_cell::sync::Lazy;
    use serde_json::json;
    use std::sync::Mutex;

    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn settings(api_key: Option<String>) -> LlmSettings {
        LlmSettings {
            backend: ANTHROPIC_API_BACKEND.into(),
            model: "claude-sonnet-4-5".into(),
            temperature: 0.1,
            max_tokens: 2048,
            timeout_secs: 5,
            anthropic_api_key: api_key,
            agent_gateway_url: None,
        }
    }

    #[test]
    fn unavailable_without_api_key() {
        let backend = AnthropicApiBackend::new(Client::new(), &settings(None));
        assert!(!backend.is_available());
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let raw = json!({"error": {"type": "overloaded_error", "message": "Overloaded"}});
        assert_eq!(
            AnthropicApiBackend::error_message(&raw.to_string()),
            "Overloaded"
        );
        assert_eq!(AnthropicApiBackend::error_message("plain text"), "plain text");
    }

    #[tokio::test]
    async fn sends_system_prompt_and_reads_first_text_block() {
        let _env = ENV_MUTEX.lock().unwrap();
        let server = httpmock::MockServer::start();
        std::env::set_var("ANTHROPIC_BASE_URL", server.url(""));

        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json_body_partial(
                    json!({
                        "system": "You write SQL.",
                        "messages": [{"role": "user", "content": "How many customers?"}]
                    })
                    .to_string(),
                );
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "content": [{"type": "text", "text": "SELECT COUNT(*) FROM customers"}]
                    })
                    .to_string(),
                );
        });

        let backend = AnthropicApiBackend::new(Client::new(), &settings(Some("test-key".into())));
        let text = backend
            .generate(&[
                ChatMessage::system("You write SQL."),
                ChatMessage::user("How many customers?"),
            ])
            .await
            .expect("API call should succeed");

        std::env::remove_var("ANTHROPIC_BASE_URL");
        mock.assert();
        assert_eq!(text, "SELECT COUNT(*) FROM customers");
    }

    #[tokio::test]
    async fn api_error_carries_status_and_message() {
        let _env = ENV_MUTEX.lock().unwrap();
        let server = httpmock::MockServer::start();
        std::env::set_var("ANTHROPIC_BASE_URL", server.url(""));

        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/v1/messages");
            then.status(429)
                .body(json!({"error": {"message": "rate limited"}}).to_string());
        });

        let backend = AnthropicApiBackend::new(Client::new(), &settings(Some("test-key".into())));
        let err = backend
            .generate(&[ChatMessage::user("q")])
            .await
            .expect_err("429 should fail");

        std::env::remove_var("ANTHROPIC_BASE_URL");
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
