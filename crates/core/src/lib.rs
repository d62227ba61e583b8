//! Supportdesk Core - configuration and instruction rendering
//!
//! Everything the support agent needs before it talks to a model:
//! - **Runtime config** (`config`) - layered defaults, `supportdesk.toml`, env, overrides
//! - **Onboarding record** (`onboarding`) - the settings file written once by `supportdesk onboard`
//! - **Model selection** (`model`) - agent and guardrail model settings per chosen model
//! - **Instructions** (`instructions`) - tera templates rendered from the onboarding record
//! - **Knowledge base** (`knowledge`) - uploaded support documents and passage search

pub mod config;
pub mod instructions;
pub mod knowledge;
pub mod model;
pub mod onboarding;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use instructions::{InstructionError, InstructionTemplates};
pub use knowledge::{KnowledgeBase, SearchHit};
pub use model::{ModelSettings, ReasoningEffort, SupportModel};
pub use onboarding::{OnboardingConfig, OnboardingError, OnboardingReceipt};
