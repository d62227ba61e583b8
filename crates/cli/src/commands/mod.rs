pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod onboard;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use supportdesk_agent::llm::{ClientSetupError, LlmClient, OpenAiClient};
use supportdesk_agent::{create_agency, AgentError, Agency};
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_core::onboarding::{OnboardingConfig, OnboardingError};

pub const EXIT_VALIDATION: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_details(command, message, None)
    }

    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_VALIDATION,
        )
    })
}

pub(crate) fn load_onboarding(
    command: &str,
    config: &AppConfig,
) -> Result<OnboardingConfig, CommandResult> {
    OnboardingConfig::load(&config.agent.onboarding_path).map_err(|error| {
        let error_class = match error {
            OnboardingError::NotFound { .. } => "onboarding_missing",
            _ => "onboarding_validation",
        };
        CommandResult::failure(command, error_class, error.to_string(), EXIT_VALIDATION)
    })
}

pub(crate) fn provider_client(
    command: &str,
    config: &AppConfig,
) -> Result<Arc<dyn LlmClient>, CommandResult> {
    match OpenAiClient::from_config(&config.llm) {
        Ok(client) => Ok(Arc::new(client)),
        Err(ClientSetupError::Config(error)) => Err(CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_VALIDATION,
        )),
        Err(ClientSetupError::Llm(error)) => Err(CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize LLM client: {error}"),
            EXIT_RUNTIME,
        )),
    }
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

pub(crate) fn open_agency(
    command: &str,
    onboarding: &OnboardingConfig,
    config: &AppConfig,
    client: Arc<dyn LlmClient>,
) -> Result<Agency, CommandResult> {
    create_agency(onboarding, config, client).map_err(|error| {
        let (error_class, exit_code) = match &error {
            AgentError::Instructions(_) => ("instruction_rendering", EXIT_VALIDATION),
            _ => ("runtime_init", EXIT_RUNTIME),
        };
        CommandResult::failure(command, error_class, error.to_string(), exit_code)
    })
}
