use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use supportdesk_core::model::ModelSettings;
use supportdesk_core::onboarding::OnboardingConfig;
use tracing::{debug, warn};

use crate::llm::{complete_structured, ChatMessage, ChatRequest, LlmClient};

pub const GUARDRAIL_NAME: &str = "Relevance Checker";
const FALLBACK_COMPANY_NAME: &str = "the company";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceCheckOutput {
    pub is_relevant: bool,
    pub reasoning: String,
}

impl RelevanceCheckOutput {
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "is_relevant": { "type": "boolean" },
                "reasoning": { "type": "string" }
            },
            "required": ["is_relevant", "reasoning"],
            "additionalProperties": false
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailOutcome {
    Pass,
    Tripwire { message: String, reasoning: String },
}

impl GuardrailOutcome {
    pub fn is_tripwire(&self) -> bool {
        matches!(self, Self::Tripwire { .. })
    }
}

pub struct RelevanceGuardrail {
    company_name: String,
    instructions: String,
    model: String,
    settings: ModelSettings,
    client: Arc<dyn LlmClient>,
}

impl RelevanceGuardrail {
    pub fn from_config(config: &OnboardingConfig, client: Arc<dyn LlmClient>) -> Self {
        let company_name = match config.company_name.trim() {
            "" => FALLBACK_COMPANY_NAME.to_string(),
            name => name.to_string(),
        };

        Self {
            instructions: classifier_instructions(&company_name, config.company_overview.trim()),
            company_name,
            model: config.model.guardrail_model().to_string(),
            settings: config.model.guardrail_settings(),
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn blocked_message(&self) -> String {
        let company = &self.company_name;
        format!(
            "I'm a customer support agent for {company}. I can only help with questions related to our products and services. Please ask a question related to {company}."
        )
    }

    /// Classifies `user_input`. A failed classification passes the input
    /// through.
    pub async fn check(&self, user_input: &str) -> GuardrailOutcome {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(self.instructions.clone()),
                ChatMessage::user(user_input),
            ],
            settings: self.settings.clone(),
            ..ChatRequest::default()
        };

        let verdict = complete_structured::<RelevanceCheckOutput>(
            self.client.as_ref(),
            request,
            "relevance_check",
            RelevanceCheckOutput::json_schema(),
        )
        .await;

        match verdict {
            Ok(output) if output.is_relevant => {
                debug!(
                    event_name = "agent.guardrail.allow",
                    guardrail = GUARDRAIL_NAME,
                    reasoning = %output.reasoning,
                    "input classified as relevant"
                );
                GuardrailOutcome::Pass
            }
            Ok(output) => {
                debug!(
                    event_name = "agent.guardrail.tripwire",
                    guardrail = GUARDRAIL_NAME,
                    reasoning = %output.reasoning,
                    "input classified as irrelevant"
                );
                GuardrailOutcome::Tripwire {
                    message: self.blocked_message(),
                    reasoning: output.reasoning,
                }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.guardrail.fail_open",
                    guardrail = GUARDRAIL_NAME,
                    error = %error,
                    "Guardrail classification failed; allowing message through"
                );
                GuardrailOutcome::Pass
            }
        }
    }
}

fn classifier_instructions(company_name: &str, company_overview: &str) -> String {
    format!(
        r#"You are a content relevance classifier for {company_name}.

Company Overview: {company_overview}

Your task is to determine if a user's question is relevant to customer support for {company_name}.

IMPORTANT RULES:
1. Only classify as IRRELEVANT (is_relevant: false) if the question is CLEARLY about something completely unrelated (e.g., "help me write an essay", "what's the weather", "solve this math problem")
2. Classify as RELEVANT (is_relevant: true) if:
   - It's about the company, products, or services
   - It's a follow-up question (e.g., "can you explain more?", "what do you mean?")
   - It's ambiguous or you're not sure
   - It could possibly be related to customer support
3. When in doubt, classify as RELEVANT (is_relevant: true)

Provide your classification with brief reasoning."#
    )
}
