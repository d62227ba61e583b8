use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use supportdesk_core::config::AppConfig;
use supportdesk_core::instructions::{InstructionError, InstructionTemplates};
use supportdesk_core::knowledge::KnowledgeBase;
use supportdesk_core::model::ModelSettings;
use supportdesk_core::onboarding::OnboardingConfig;
use thiserror::Error;
use tracing::{info, warn};

use crate::guardrails::{GuardrailOutcome, RelevanceGuardrail};
use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, Role, ToolCall};
use crate::tools::knowledge::KnowledgeSearchTool;
use crate::tools::openapi::load_openapi_tools;
use crate::tools::{Tool, ToolRegistry};

const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to render agent instructions: {0}")]
    Instructions(#[from] InstructionError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to build HTTP client for tools: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("model kept requesting tools after {rounds} rounds")]
    ToolRoundsExhausted { rounds: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub guardrail_triggered: bool,
    pub tool_calls: Vec<ToolCall>,
    /// Messages produced by this turn, starting with the user message.
    pub messages: Vec<ChatMessage>,
}

pub struct SupportAgent {
    name: String,
    description: String,
    instructions: String,
    shared_instructions: Option<String>,
    model: String,
    settings: ModelSettings,
    tools: ToolRegistry,
    guardrail: Option<RelevanceGuardrail>,
    client: Arc<dyn LlmClient>,
    max_tool_rounds: u32,
}

impl SupportAgent {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
        client: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            shared_instructions: None,
            model: model.into(),
            settings: ModelSettings::default(),
            tools: ToolRegistry::default(),
            guardrail: None,
            client,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Builds the agent described by the onboarding record: rendered
    /// instructions, OpenAPI and knowledge tools, and the relevance guardrail
    /// when enabled.
    pub fn from_config(
        onboarding: &OnboardingConfig,
        app: &AppConfig,
        client: Arc<dyn LlmClient>,
    ) -> Result<Self, AgentError> {
        let templates = InstructionTemplates::load(app.agent.templates_dir.as_deref())?;
        let instructions = templates.render_instructions(onboarding)?;

        let mut agent = Self::new(
            onboarding.agent_name.clone(),
            instructions,
            onboarding.model.as_str(),
            Arc::clone(&client),
        )
        .with_description(onboarding.agent_description.clone())
        .with_settings(onboarding.model.agent_settings())
        .with_max_tool_rounds(app.llm.max_tool_rounds);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(app.llm.timeout_secs))
            .build()?;
        for tool in
            load_openapi_tools(onboarding.openapi_schema(), app.tools.bearer_token.as_ref(), http)
        {
            agent = agent.with_tool(tool);
        }

        let knowledge = KnowledgeBase::load(&app.agent.files_dir, &onboarding.knowledge_files);
        if !knowledge.is_empty() {
            info!(
                event_name = "agent.runtime.knowledge_loaded",
                documents = knowledge.documents().len(),
                passages = knowledge.passage_count(),
                "knowledge base loaded"
            );
            agent = agent.with_tool(KnowledgeSearchTool::new(Arc::new(knowledge)));
        }

        if onboarding.enable_guardrail {
            agent = agent.with_guardrail(RelevanceGuardrail::from_config(onboarding, client));
        }

        Ok(agent)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tool<T>(mut self, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.tools.register(tool);
        self
    }

    pub fn with_guardrail(mut self, guardrail: RelevanceGuardrail) -> Self {
        self.guardrail = Some(guardrail);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_shared_instructions(mut self, shared: impl Into<String>) -> Self {
        let shared = shared.into();
        self.shared_instructions = (!shared.trim().is_empty()).then_some(shared);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn has_guardrail(&self) -> bool {
        self.guardrail.is_some()
    }

    /// Instructions sent as the system message; shared instructions come
    /// first.
    pub fn system_prompt(&self) -> String {
        match &self.shared_instructions {
            Some(shared) => format!("{}\n\n{}", shared.trim_end(), self.instructions),
            None => self.instructions.clone(),
        }
    }

    pub async fn respond(
        &self,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<AgentReply, AgentError> {
        let mut turn = vec![ChatMessage::user(user_message)];

        if let Some(guardrail) = &self.guardrail {
            if let GuardrailOutcome::Tripwire { message, .. } = guardrail.check(user_message).await
            {
                info!(
                    event_name = "agent.runtime.guardrail_blocked",
                    agent = %self.name,
                    "guardrail blocked input"
                );
                turn.push(ChatMessage::assistant(message.clone()));
                return Ok(AgentReply {
                    text: message,
                    guardrail_triggered: true,
                    tool_calls: Vec::new(),
                    messages: turn,
                });
            }
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt()));
        messages.extend(history.iter().filter(|message| message.role != Role::System).cloned());

        let mut executed = Vec::new();
        let mut round = 0;
        loop {
            let request = ChatRequest {
                model: self.model.clone(),
                messages: messages.iter().chain(turn.iter()).cloned().collect(),
                tools: self.tools.definitions(),
                response_format: None,
                settings: self.settings.clone(),
            };
            let response = self.client.complete(request).await?;
            let message = response.message;

            if message.tool_calls.is_empty() {
                let text = message.content.clone();
                turn.push(message);
                return Ok(AgentReply {
                    text,
                    guardrail_triggered: false,
                    tool_calls: executed,
                    messages: turn,
                });
            }

            if round >= self.max_tool_rounds {
                return Err(AgentError::ToolRoundsExhausted { rounds: self.max_tool_rounds });
            }
            round += 1;

            let calls = message.tool_calls.clone();
            turn.push(message);
            for call in calls {
                let output = self.run_tool(&call).await;
                turn.push(ChatMessage::tool_result(call.id.clone(), output));
                executed.push(call);
            }
        }
    }

    async fn run_tool(&self, call: &ToolCall) -> String {
        match self.tools.execute(&call.name, call.arguments.clone()).await {
            Ok(output) => {
                info!(
                    event_name = "agent.runtime.tool_call",
                    tool = %call.name,
                    outcome = "ok",
                    "tool call completed"
                );
                output.to_string()
            }
            Err(error) => {
                warn!(
                    event_name = "agent.runtime.tool_call",
                    tool = %call.name,
                    outcome = "error",
                    error = %error,
                    "tool call failed"
                );
                json!({ "error": format!("{error:#}") }).to_string()
            }
        }
    }
}
