use std::fs;
use std::path::PathBuf;

use clap::Args;
use supportdesk_core::config::LoadOptions;
use supportdesk_core::model::SupportModel;
use supportdesk_core::onboarding::{
    OnboardingConfig, OnboardingError, DEFAULT_AGENT_DESCRIPTION, DEFAULT_AGENT_NAME,
    DEFAULT_OUTPUT_FORMAT,
};

use crate::commands::{load_config, CommandResult, EXIT_RUNTIME, EXIT_VALIDATION};

#[derive(Debug, Clone, Args)]
pub struct OnboardArgs {
    #[arg(long, help = "Name of the company the agent supports")]
    pub company_name: String,
    #[arg(long, help = "Short overview of the company, its products and services")]
    pub company_overview: String,
    #[arg(long, default_value = DEFAULT_AGENT_NAME, help = "Name the agent introduces itself with")]
    pub agent_name: String,
    #[arg(long, default_value = DEFAULT_AGENT_DESCRIPTION)]
    pub agent_description: String,
    #[arg(long, default_value_t = SupportModel::Gpt5, help = "Model powering the agent (gpt-4.1 or gpt-5)")]
    pub model: SupportModel,
    #[arg(long, help = "Skip the input relevance guardrail")]
    pub disable_guardrail: bool,
    #[arg(long, default_value = DEFAULT_OUTPUT_FORMAT)]
    pub output_format: String,
    #[arg(long, help = "Where customers are sent when the agent cannot help")]
    pub support_contact: Option<String>,
    #[arg(long)]
    pub additional_context: Option<String>,
    #[arg(long = "knowledge-file", help = "FAQ, SOP or product document (repeatable)")]
    pub knowledge_files: Vec<PathBuf>,
    #[arg(long, help = "OpenAPI schema (JSON or YAML) for the support request tool")]
    pub openapi_schema_file: Option<PathBuf>,
    #[arg(long, help = "Write the configuration here instead of agent.onboarding_path")]
    pub output: Option<PathBuf>,
}

pub fn run(options: &LoadOptions, args: OnboardArgs) -> CommandResult {
    let app_config = match load_config("onboard", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let openapi_schema = match &args.openapi_schema_file {
        Some(path) => match fs::read_to_string(path) {
            Ok(schema) => Some(schema),
            Err(error) => {
                return CommandResult::failure(
                    "onboard",
                    "onboarding_input",
                    format!("could not read OpenAPI schema `{}`: {error}", path.display()),
                    EXIT_VALIDATION,
                );
            }
        },
        None => None,
    };

    let destination = args.output.clone().unwrap_or(app_config.agent.onboarding_path);
    let config = OnboardingConfig {
        agent_name: args.agent_name,
        agent_description: args.agent_description,
        model: args.model,
        enable_guardrail: !args.disable_guardrail,
        output_format: args.output_format,
        support_contact: args.support_contact,
        additional_context: args.additional_context,
        knowledge_files: args.knowledge_files,
        openapi_schema,
        ..OnboardingConfig::new(args.company_name, args.company_overview)
    };

    match config.save(&destination) {
        Ok(receipt) => CommandResult::success("onboard", receipt.message()),
        Err(OnboardingError::Validation(message)) => CommandResult::failure(
            "onboard",
            "onboarding_validation",
            message,
            EXIT_VALIDATION,
        ),
        Err(error) => {
            CommandResult::failure("onboard", "onboarding_write", error.to_string(), EXIT_RUNTIME)
        }
    }
}
