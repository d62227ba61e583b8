use std::sync::Arc;

use serde_json::json;
use supportdesk_agent::llm::LlmClient;
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_core::onboarding::OnboardingConfig;

use crate::commands::{
    build_runtime, load_config, load_onboarding, open_agency, provider_client, CommandResult,
    EXIT_RUNTIME,
};

pub fn run(options: &LoadOptions, message: &str) -> CommandResult {
    let config = match load_config("ask", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let onboarding = match load_onboarding("ask", &config) {
        Ok(onboarding) => onboarding,
        Err(result) => return result,
    };
    let client = match provider_client("ask", &config) {
        Ok(client) => client,
        Err(result) => return result,
    };

    run_with_client(&config, &onboarding, client, message)
}

/// One-shot turn against a fresh thread.
pub fn run_with_client(
    config: &AppConfig,
    onboarding: &OnboardingConfig,
    client: Arc<dyn LlmClient>,
    message: &str,
) -> CommandResult {
    let mut agency = match open_agency("ask", onboarding, config, client) {
        Ok(agency) => agency,
        Err(result) => return result,
    };
    let runtime = match build_runtime("ask") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    match runtime.block_on(agency.get_response(message)) {
        Ok(reply) => {
            let tool_calls =
                reply.tool_calls.iter().map(|call| call.name.clone()).collect::<Vec<_>>();
            CommandResult::success_with_details(
                "ask",
                reply.text,
                Some(json!({
                    "agent": agency.agent().name(),
                    "guardrail_triggered": reply.guardrail_triggered,
                    "tool_calls": tool_calls,
                    "thread_id": agency.thread().id,
                })),
            )
        }
        Err(error) => CommandResult::failure("ask", "agent_turn", error.to_string(), EXIT_RUNTIME),
    }
}
