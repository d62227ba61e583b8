//! Chat-completions client for the LLM provider.
//!
//! The [`LlmClient`] trait is the seam between the agent runtime and the
//! provider. [`OpenAiClient`] speaks the OpenAI Chat Completions wire format
//! (also served by most OpenAI-compatible gateways).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use supportdesk_core::config::{ConfigError, LlmConfig};
use supportdesk_core::model::ModelSettings;
use thiserror::Error;
use tracing::debug;

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content: String::new(), tool_calls, tool_call_id: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub strict: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonSchema { name: String, schema: Value, strict: bool },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub response_format: Option<ResponseFormat>,
    pub settings: ModelSettings,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub model: String,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
    pub usage: TokenUsage,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider response was malformed: {0}")]
    InvalidResponse(String),
    #[error("model refused the request: {0}")]
    Refusal(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Runs a request with a strict JSON-schema response format and decodes the
/// answer into `T`.
pub async fn complete_structured<T>(
    client: &dyn LlmClient,
    mut request: ChatRequest,
    schema_name: &str,
    schema: Value,
) -> Result<T, LlmError>
where
    T: DeserializeOwned,
{
    request.response_format =
        Some(ResponseFormat::JsonSchema { name: schema_name.to_string(), schema, strict: true });
    let response = client.complete(request).await?;
    serde_json::from_str(response.message.content.trim()).map_err(|error| {
        LlmError::InvalidResponse(format!("structured output did not match `{schema_name}`: {error}"))
    })
}

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self { http, base_url: base_url.into(), api_key })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ClientSetupError> {
        let api_key = config.require_api_key()?.clone();
        Ok(Self::new(&config.base_url, api_key, Duration::from_secs(config.timeout_secs))?)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Error)]
pub enum ClientSetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = to_api_request(&request);
        debug!(
            event_name = "agent.llm.request",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(map_status_error(status, &text));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;
        from_api_response(&value)
    }
}

fn map_status_error(status: StatusCode, body: &str) -> LlmError {
    let body = truncate(body, ERROR_BODY_LIMIT);
    match status.as_u16() {
        401 | 403 => LlmError::Auth(body),
        429 => LlmError::RateLimited(body),
        code => LlmError::Status { status: code, body },
    }
}

fn truncate(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &value[..index]),
        None => value.to_string(),
    }
}

pub fn to_api_request(request: &ChatRequest) -> Value {
    let messages = request.messages.iter().map(map_message).collect::<Vec<_>>();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if let Some(temperature) = request.settings.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(effort) = request.settings.reasoning_effort {
        body["reasoning_effort"] = json!(effort.as_str());
    }

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                            "strict": tool.strict,
                        },
                    })
                })
                .collect(),
        );
    }

    match &request.response_format {
        Some(ResponseFormat::Text) => body["response_format"] = json!({ "type": "text" }),
        Some(ResponseFormat::JsonSchema { name, schema, strict }) => {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema, "strict": strict },
            });
        }
        None => {}
    }

    body
}

fn map_message(message: &ChatMessage) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content,
        }),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let tool_calls = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments.to_string() },
                    })
                })
                .collect::<Vec<_>>();
            let content =
                if message.content.is_empty() { Value::Null } else { json!(message.content) };
            json!({ "role": "assistant", "content": content, "tool_calls": tool_calls })
        }
        role => json!({ "role": role.as_str(), "content": message.content }),
    }
}

pub fn from_api_response(body: &Value) -> Result<ChatResponse, LlmError> {
    let choice = body["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .ok_or_else(|| LlmError::InvalidResponse("missing `choices` array".to_string()))?;

    let message = &choice["message"];
    if let Some(refusal) = message["refusal"].as_str().filter(|refusal| !refusal.is_empty()) {
        return Err(LlmError::Refusal(refusal.to_string()));
    }

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"]
                .as_str()
                .ok_or_else(|| LlmError::InvalidResponse("tool call without `id`".to_string()))?;
            let name = call["function"]["name"].as_str().ok_or_else(|| {
                LlmError::InvalidResponse("tool call without function name".to_string())
            })?;
            let raw_arguments = call["function"]["arguments"]
                .as_str()
                .filter(|arguments| !arguments.trim().is_empty())
                .unwrap_or("{}");
            let arguments = serde_json::from_str(raw_arguments).map_err(|error| {
                LlmError::InvalidResponse(format!("tool call `{name}` arguments: {error}"))
            })?;
            tool_calls.push(ToolCall { id: id.to_string(), name: name.to_string(), arguments });
        }
    }

    let content = message["content"].as_str().unwrap_or_default().to_string();

    Ok(ChatResponse {
        model: body["model"].as_str().unwrap_or_default().to_string(),
        message: ChatMessage { role: Role::Assistant, content, tool_calls, tool_call_id: None },
        finish_reason: choice["finish_reason"].as_str().map(str::to_string),
        usage: TokenUsage {
            prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        },
    })
}
