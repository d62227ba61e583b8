use serde::Serialize;
use supportdesk_agent::tools::openapi::inspect_schema;
use supportdesk_core::config::{AppConfig, LoadOptions};
use supportdesk_core::instructions::InstructionTemplates;
use supportdesk_core::knowledge::KnowledgeBase;
use supportdesk_core::onboarding::OnboardingConfig;

use crate::commands::{CommandResult, EXIT_VALIDATION};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_VALIDATION };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_api_key(&config));
            checks.extend(check_onboarding(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in [
                "llm_api_key",
                "onboarding_file",
                "instruction_rendering",
                "openapi_tools",
                "knowledge_files",
            ] {
                checks.push(DoctorCheck::skipped(
                    name,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_api_key(config: &AppConfig) -> DoctorCheck {
    match config.llm.require_api_key() {
        Ok(_) => DoctorCheck::pass("llm_api_key", "API key configured"),
        Err(error) => DoctorCheck::fail("llm_api_key", error.to_string()),
    }
}

fn check_onboarding(config: &AppConfig) -> Vec<DoctorCheck> {
    let onboarding = match OnboardingConfig::load(&config.agent.onboarding_path) {
        Ok(onboarding) => onboarding,
        Err(error) => {
            return vec![
                DoctorCheck::fail("onboarding_file", error.to_string()),
                DoctorCheck::skipped(
                    "instruction_rendering",
                    "skipped because onboarding did not load",
                ),
                DoctorCheck::skipped("openapi_tools", "skipped because onboarding did not load"),
                DoctorCheck::skipped("knowledge_files", "skipped because onboarding did not load"),
            ];
        }
    };

    let mut checks = vec![DoctorCheck::pass(
        "onboarding_file",
        format!(
            "loaded `{}` ({}, model {}, guardrail {})",
            config.agent.onboarding_path.display(),
            onboarding.agent_name,
            onboarding.model,
            if onboarding.enable_guardrail { "enabled" } else { "disabled" }
        ),
    )];

    let rendered = InstructionTemplates::load(config.agent.templates_dir.as_deref())
        .and_then(|templates| {
            templates.render_instructions(&onboarding)?;
            templates.render_shared_instructions(&onboarding)
        });
    checks.push(match rendered {
        Ok(_) => DoctorCheck::pass("instruction_rendering", "instruction templates rendered"),
        Err(error) => DoctorCheck::fail("instruction_rendering", error.to_string()),
    });

    checks.push(match onboarding.openapi_schema() {
        None => DoctorCheck::skipped("openapi_tools", "no OpenAPI schema configured"),
        Some(schema) => match inspect_schema(schema) {
            Ok(names) => DoctorCheck::pass(
                "openapi_tools",
                format!(
                    "{} tool(s): {}{}",
                    names.len(),
                    names.join(", "),
                    if config.tools.bearer_token.is_some() { " (bearer auth)" } else { "" }
                ),
            ),
            Err(error) => DoctorCheck::fail("openapi_tools", error.to_string()),
        },
    });

    let knowledge = KnowledgeBase::load(&config.agent.files_dir, &onboarding.knowledge_files);
    checks.push(if knowledge.is_empty() {
        DoctorCheck::skipped("knowledge_files", "no knowledge files found")
    } else {
        DoctorCheck::pass(
            "knowledge_files",
            format!(
                "{} document(s), {} passage(s)",
                knowledge.documents().len(),
                knowledge.passage_count()
            ),
        )
    });

    checks
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
