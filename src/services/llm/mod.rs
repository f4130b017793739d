use async_trait::async_trait;
use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

mod anthropic_api;
mod claude_agent;
mod factory;
mod mock_llm;

pub use anthropic_api::AnthropicApiBackend;
pub use claude_agent::ClaudeAgentBackend;
pub use factory::{available_backends, select_backend};
#[allow(unused_imports)]
pub use mock_llm::{MockLlm, MockOutcome};

pub const CLAUDE_AGENT_BACKEND: &str = "claude_agent";
pub const ANTHROPIC_API_BACKEND: &str = "anthropic_api";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM backend '{0}' is not available")]
    Unavailable(&'static str),
    #[error("unknown LLM backend type: {0}")]
    UnknownBackend(String),
    #[error("no LLM backend available; set AGENT_GATEWAY_URL or ANTHROPIC_API_KEY")]
    NoBackendAvailable,
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM backend responded with status {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("LLM backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Request(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One interchangeable language-model provider.
///
/// Exactly one backend is selected at startup (see [`select_backend`]) and
/// shared read-only for the process lifetime.
#[async_trait]
pub trait LlmBackend: Send + Sync + std::fmt::Debug {
    /// Submit a conversation and return the completion text.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    fn name(&self) -> &'static str;

    /// Whether the backend is configured well enough to accept requests.
    /// Must be side-effect free; used for startup probing and health checks.
    fn is_available(&self) -> bool;
}

/// Split a conversation into the system prompt (if any) and the turn
/// messages, the shape both concrete backends need.
pub(crate) fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let mut system = None;
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::System => system = Some(message.content.clone()),
            _ => turns.push(message),
        }
    }
    (system, turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_system_extracts_system_prompt() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ];
        let (system, turns) = split_system(&messages);
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
    }

    #[test]
    fn split_system_without_system_message() {
        let messages = vec![ChatMessage::user("hello")];
        let (system, turns) = split_system(&messages);
        assert!(system.is_none());
        assert_eq!(turns.len(), 1);
    }
}
