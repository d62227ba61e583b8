//! In-memory [`LlmClient`] that replays queued responses and records every
//! request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatMessage, ChatRequest, ChatResponse, LlmClient, LlmError, TokenUsage, ToolCall};

#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, content: impl Into<String>) {
        self.push(Ok(response(ChatMessage::assistant(content), "stop")));
    }

    pub fn push_tool_calls(&self, tool_calls: Vec<ToolCall>) {
        self.push(Ok(response(ChatMessage::assistant_tool_calls(tool_calls), "tool_calls")));
    }

    pub fn push_error(&self, error: LlmError) {
        self.push(Err(error));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|script| script.len()).unwrap_or_default()
    }

    fn push(&self, entry: Result<ChatResponse, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
    }
}

fn response(message: ChatMessage, finish_reason: &str) -> ChatResponse {
    ChatResponse {
        model: "scripted".to_string(),
        message,
        finish_reason: Some(finish_reason.to_string()),
        usage: TokenUsage::default(),
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        self.script
            .lock()
            .map_err(|_| LlmError::Transport("scripted client lock poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }
}
