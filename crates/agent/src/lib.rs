//! Agent runtime for the customer support assistant.
//!
//! This crate turns an onboarding record into a working support agent:
//! - Talks to the LLM provider through the `LlmClient` seam (`llm`)
//! - Screens user input with the relevance classifier (`guardrails`)
//! - Exposes OpenAPI operations and knowledge search as tools (`tools`)
//! - Runs the bounded tool-calling turn loop (`runtime`)
//! - Keeps the conversation thread for one customer (`agency`)
//!
//! # Turn flow
//!
//! 1. **Guardrail** - the classifier model decides whether the input is on
//!    topic. A tripwire answers with a fixed message and the main model is
//!    never called. Classification failures let the input through.
//! 2. **Model call** - instructions, history and tool definitions go to the
//!    configured model.
//! 3. **Tool execution** - requested tools run and their results are fed
//!    back until the model answers in text.
//!
//! # Key Types
//!
//! - `Agency` - conversation entry point (see `agency` module)
//! - `SupportAgent` - the configured agent and turn loop
//! - `RelevanceGuardrail` - input relevance check

pub mod agency;
pub mod guardrails;
pub mod llm;
pub mod runtime;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tools;

pub use agency::{create_agency, Agency, ConversationThread, AGENCY_NAME};
pub use guardrails::{GuardrailOutcome, RelevanceGuardrail};
pub use llm::{ChatMessage, LlmClient, LlmError, OpenAiClient};
pub use runtime::{AgentError, AgentReply, SupportAgent};
