use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::LlmSettings;

use super::{
    AnthropicApiBackend, ClaudeAgentBackend, LlmBackend, LlmError, ANTHROPIC_API_BACKEND,
    CLAUDE_AGENT_BACKEND,
};

// Fixed fallback priority: agent gateway first, direct API second.
const PRIORITY: [&str; 2] = [CLAUDE_AGENT_BACKEND, ANTHROPIC_API_BACKEND];

fn instantiate(name: &str, client: &Client, settings: &LlmSettings) -> Arc<dyn LlmBackend> {
    if name == ANTHROPIC_API_BACKEND {
        Arc::new(AnthropicApiBackend::new(client.clone(), settings))
    } else {
        Arc::new(ClaudeAgentBackend::new(client.clone(), settings))
    }
}

/// Resolve the one backend this process will use for generation.
///
/// A requested backend is probed first; if unavailable, selection continues
/// down the fixed priority list from the requested entry onward. `auto`
/// walks the whole list. Exhausting the list is fatal to startup: there is
/// no degraded mode with zero backends.
pub fn select_backend(
    client: &Client,
    settings: &LlmSettings,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let requested = settings.backend.as_str();
    let candidates: &[&str] = match requested {
        "auto" => &PRIORITY,
        name => {
            let position = PRIORITY
                .iter()
                .position(|candidate| *candidate == name)
                .ok_or_else(|| LlmError::UnknownBackend(name.to_string()))?;
            &PRIORITY[position..]
        }
    };

    for name in candidates {
        let backend = instantiate(name, client, settings);
        if backend.is_available() {
            info!(backend = backend.name(), "selected LLM backend");
            return Ok(backend);
        }
        warn!(backend = name, "LLM backend unavailable, trying next");
    }
    Err(LlmError::NoBackendAvailable)
}

/// Probe every configured backend without touching selection state.
pub fn available_backends(client: &Client, settings: &LlmSettings) -> Vec<&'static str> {
    PRIORITY
        .iter()
        .map(|name| instantiate(name, client, settings))
        .filter(|backend| backend.is_available())
        .map(|backend| backend.name())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(
        backend: &str,
        api_key: Option<&str>,
        gateway: Option<&str>,
    ) -> LlmSettings {
        LlmSettings {
            backend: backend.into(),
            model: "claude-sonnet-4-5".into(),
            temperature: 0.1,
            max_tokens: 2048,
            timeout_secs: 5,
            anthropic_api_key: api_key.map(String::from),
            agent_gateway_url: gateway.map(String::from),
        }
    }

    #[test]
    fn picks_requested_backend_when_available() {
        let client = Client::new();
        let backend = select_backend(
            &client,
            &settings(CLAUDE_AGENT_BACKEND, None, Some("http://localhost:8100")),
        )
        .expect("agent backend should be selected");
        assert_eq!(backend.name(), CLAUDE_AGENT_BACKEND);
    }

    #[test]
    fn falls_back_from_agent_to_direct_api() {
        let client = Client::new();
        let backend = select_backend(
            &client,
            &settings(CLAUDE_AGENT_BACKEND, Some("key"), None),
        )
        .expect("fallback backend should be selected");
        assert_eq!(backend.name(), ANTHROPIC_API_BACKEND);
    }

    #[test]
    fn direct_api_request_does_not_fall_back_to_agent() {
        let client = Client::new();
        let err = select_backend(
            &client,
            &settings(ANTHROPIC_API_BACKEND, None, Some("http://localhost:8100")),
        )
        .expect_err("direct API without key should not select the gateway");
        assert!(matches!(err, LlmError::NoBackendAvailable));
    }

    #[test]
    fn auto_walks_the_priority_list() {
        let client = Client::new();
        let backend = select_backend(&client, &settings("auto", Some("key"), None))
            .expect("auto should find the direct API backend");
        assert_eq!(backend.name(), ANTHROPIC_API_BACKEND);
    }

    #[test]
    fn unknown_backend_name_is_an_error() {
        let client = Client::new();
        let err = select_backend(&client, &settings("gpt_twelve", Some("key"), None))
            .expect_err("unknown backend should be rejected");
        match err {
            LlmError::UnknownBackend(name) => assert_eq!(name, "gpt_twelve"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn no_credentials_means_no_backends_and_fatal_selection() {
        let client = Client::new();
        let unconfigured = settings(CLAUDE_AGENT_BACKEND, None, None);
        assert!(available_backends(&client, &unconfigured).is_empty());
        assert!(matches!(
            select_backend(&client, &unconfigured),
            Err(LlmError::NoBackendAvailable)
        ));
    }

    #[test]
    fn available_backends_lists_every_configured_provider() {
        let client = Client::new();
        let both = settings("auto", Some("key"), Some("http://localhost:8100"));
        assert_eq!(
            available_backends(&client, &both),
            vec![CLAUDE_AGENT_BACKEND, ANTHROPIC_API_BACKEND]
        );
    }
}
