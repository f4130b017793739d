use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmSettings;

use super::{split_system, ChatMessage, LlmBackend, LlmError, CLAUDE_AGENT_BACKEND};

/// Backend that delegates generation to a Claude agent gateway sidecar.
///
/// The gateway exposes a single `/generate` endpoint taking a flat prompt;
/// richer agent capabilities (tool use, multi-step reasoning) live behind it.
#[derive(Debug)]
pub struct ClaudeAgentBackend {
    client: Client,
    gateway_url: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: String,
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
    #[serde(default)]
    #[allow(dead_code)]
    model: Option<String>,
}

impl ClaudeAgentBackend {
    pub fn new(client: Client, settings: &LlmSettings) -> Self {
        Self {
            client,
            gateway_url: settings.agent_gateway_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    // The gateway takes a flat prompt; fold the conversation into one block.
    fn render_prompt(messages: &[ChatMessage]) -> String {
        let (system, turns) = split_system(messages);
        let mut prompt = String::new();
        if let Some(system) = system {
            prompt.push_str(&system);
            prompt.push_str("\n\n");
        }
        for message in turns {
            prompt.push_str(message.role.as_str());
            prompt.push_str(": ");
            prompt.push_str(&message.content);
            prompt.push('\n');
        }
        prompt
    }
}

#[async_trait]
impl LlmBackend for ClaudeAgentBackend {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let gateway = self
            .gateway_url
            .as_deref()
            .ok_or(LlmError::Unavailable(CLAUDE_AGENT_BACKEND))?;

        let url = format!("{}/generate", gateway.trim_end_matches('/'));
        let body = GenerateRequest {
            prompt: Self::render_prompt(messages),
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let res = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::from_reqwest(err, self.timeout))?;

        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }

        let parsed: GenerateResponse = res
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        debug!(chars = parsed.text.len(), "agent gateway completion received");
        Ok(parsed.text)
    }

    fn name(&self) -> &'static str {
        CLAUDE_AGENT_BACKEND
    }

    fn is_available(&self) -> bool {
        self.gateway_url.is_some()
    }
}
