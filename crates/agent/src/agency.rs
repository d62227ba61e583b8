use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supportdesk_core::config::AppConfig;
use supportdesk_core::instructions::InstructionTemplates;
use supportdesk_core::onboarding::OnboardingConfig;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::{ChatMessage, LlmClient};
use crate::runtime::{AgentError, AgentReply, SupportAgent};

pub const AGENCY_NAME: &str = "CustomerSupportAgency";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationThread {
    pub fn new() -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(), messages: Vec::new(), created_at: now, updated_at: now }
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ConversationThread {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Agency {
    agent: SupportAgent,
    thread: ConversationThread,
}

impl Agency {
    pub fn new(agent: SupportAgent, shared_instructions: Option<String>) -> Self {
        let agent = match shared_instructions {
            Some(shared) => agent.with_shared_instructions(shared),
            None => agent,
        };
        Self { agent, thread: ConversationThread::new() }
    }

    /// Seeds the conversation from a caller-owned store. A loader error is
    /// logged and the agency keeps its fresh thread.
    pub fn with_thread_loader<F>(mut self, loader: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Option<ConversationThread>>,
    {
        match loader() {
            Ok(Some(thread)) => {
                info!(
                    event_name = "agent.agency.thread_loaded",
                    thread_id = %thread.id,
                    messages = thread.messages.len(),
                    "conversation thread restored"
                );
                self.thread = thread;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    event_name = "agent.agency.thread_load_failed",
                    error = %error,
                    "failed to load conversation thread; starting a new one"
                );
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        AGENCY_NAME
    }

    pub fn agent(&self) -> &SupportAgent {
        &self.agent
    }

    pub fn thread(&self) -> &ConversationThread {
        &self.thread
    }

    /// Runs one turn against the current thread. The thread only grows when
    /// the turn succeeds.
    pub async fn get_response(&mut self, message: &str) -> Result<AgentReply, AgentError> {
        let reply = self.agent.respond(&self.thread.messages, message).await?;
        self.thread.extend(reply.messages.iter().cloned());
        Ok(reply)
    }
}

/// Assembles the agency from the onboarding record, with the shared
/// instructions rendered from the company overview.
pub fn create_agency(
    onboarding: &OnboardingConfig,
    app: &AppConfig,
    client: Arc<dyn LlmClient>,
) -> Result<Agency, AgentError> {
    let templates = InstructionTemplates::load(app.agent.templates_dir.as_deref())?;
    let shared = templates.render_shared_instructions(onboarding)?;
    let agent = SupportAgent::from_config(onboarding, app, client)?;
    Ok(Agency::new(agent, Some(shared)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use supportdesk_core::config::AppConfig;
    use supportdesk_core::onboarding::OnboardingConfig;

    use super::{create_agency, ConversationThread, AGENCY_NAME};
    use crate::llm::{ChatMessage, LlmError, Role};
    use crate::test_utils::ScriptedLlmClient;

    fn onboarding() -> OnboardingConfig {
        OnboardingConfig::new("Acme Anvils", "Acme sells anvils to cartoon coyotes.")
    }

    #[tokio::test]
    async fn responses_accumulate_in_the_thread() {
        let client = Arc::new(ScriptedLlmClient::new());
        client.push_text(r#"{"is_relevant": true, "reasoning": "greeting"}"#);
        client.push_text("Hi, I'm Alex.");
        client.push_text(r#"{"is_relevant": false, "reasoning": "homework"}"#);
        let mut agency =
            create_agency(&onboarding(), &AppConfig::default(), client.clone()).expect("agency");

        let first = agency.get_response("hello").await.expect("first");
        let second = agency.get_response("solve x^2 = 4").await.expect("second");

        assert_eq!(agency.name(), AGENCY_NAME);
        assert_eq!(first.text, "Hi, I'm Alex.");
        assert!(second.guardrail_triggered);
        assert_eq!(agency.thread().messages.len(), 4);
        assert_eq!(agency.thread().messages[3].content, second.text);

        let main = &client.requests()[1];
        assert!(main.messages[0].content.contains("cartoon coyotes"));
    }

    #[tokio::test]
    async fn loaded_thread_becomes_history() {
        let client = Arc::new(ScriptedLlmClient::new());
        client.push_text(r#"{"is_relevant": true, "reasoning": "follow-up"}"#);
        client.push_text("As I said, 30 days.");
        let mut saved = ConversationThread::new();
        saved.extend([
            ChatMessage::user("what is the refund window?"),
            ChatMessage::assistant("30 days."),
        ]);
        let saved_id = saved.id;

        let mut agency = create_agency(&onboarding(), &AppConfig::default(), client.clone())
            .expect("agency")
            .with_thread_loader(move || Ok(Some(saved)));
        agency.get_response("can you repeat that?").await.expect("reply");

        assert_eq!(agency.thread().id, saved_id);
        assert_eq!(agency.thread().messages.len(), 4);
        let main = &client.requests()[1];
        assert_eq!(main.messages[1].role, Role::User);
        assert_eq!(main.messages[1].content, "what is the refund window?");
    }

    #[tokio::test]
    async fn loader_failure_and_turn_failure_leave_thread_untouched() {
        let client = Arc::new(ScriptedLlmClient::new());
        client.push_text(r#"{"is_relevant": true, "reasoning": "ok"}"#);
        client.push_error(LlmError::RateLimited("slow down".to_string()));
        let mut agency = create_agency(&onboarding(), &AppConfig::default(), client)
            .expect("agency")
            .with_thread_loader(|| Err(anyhow!("store offline")));

        assert!(agency.get_response("hello").await.is_err());
        assert!(agency.thread().is_empty());
    }

    #[test]
    fn thread_serializes_for_persistence() {
        let mut thread = ConversationThread::new();
        thread.extend([ChatMessage::user("hi")]);

        let encoded = serde_json::to_string(&thread).expect("encode");
        let decoded: ConversationThread = serde_json::from_str(&encoded).expect("decode");

        assert_eq!(decoded, thread);
    }
}
