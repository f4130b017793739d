use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{ChatMessage, LlmBackend, LlmError};

#[derive(Debug, Clone)]
pub enum MockOutcome {
    Reply(String),
    Timeout,
    RequestError(String),
}

/// Scripted backend for service and route tests. Records every conversation
/// it is asked to complete and replays queued outcomes in order.
#[derive(Debug, Default)]
pub struct MockLlm {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    unavailable: bool,
}

impl MockLlm {
    pub fn with_reply(text: impl Into<String>) -> Self {
        Self::with_outcomes(vec![MockOutcome::Reply(text.into())])
    }

    pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(MockOutcome::Reply(text.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for MockLlm {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(MockOutcome::Reply(text)) => Ok(text),
            Some(MockOutcome::Timeout) => Err(LlmError::Timeout(Duration::from_secs(30))),
            Some(MockOutcome::RequestError(message)) => Err(LlmError::Request(message)),
            None => Err(LlmError::InvalidResponse(
                "mock reply queue is empty".to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "mock_llm"
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }
}
