use std::env;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::Value;
use supportdesk_agent::test_utils::ScriptedLlmClient;
use supportdesk_cli::commands::onboard::OnboardArgs;
use supportdesk_cli::commands::{ask, chat, config, doctor, onboard};
use supportdesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use supportdesk_core::model::SupportModel;
use supportdesk_core::onboarding::{
    OnboardingConfig, DEFAULT_AGENT_DESCRIPTION, DEFAULT_AGENT_NAME, DEFAULT_OUTPUT_FORMAT,
    GENERATED_HEADER,
};
use tempfile::TempDir;

const SCHEMA: &str = r#"{
  "openapi": "3.1.0",
  "servers": [{ "url": "https://support.example.com/api" }],
  "paths": {
    "/tickets": {
      "post": {
        "operationId": "sendSupportRequest",
        "requestBody": {
          "content": { "application/json": { "schema": { "type": "object" } } }
        }
      }
    }
  }
}"#;

fn onboard_args(output: &Path) -> OnboardArgs {
    OnboardArgs {
        company_name: "Acme Anvils".to_string(),
        company_overview: "Acme sells anvils.".to_string(),
        agent_name: DEFAULT_AGENT_NAME.to_string(),
        agent_description: DEFAULT_AGENT_DESCRIPTION.to_string(),
        model: SupportModel::Gpt5,
        disable_guardrail: false,
        output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        support_contact: Some("support@acme.test".to_string()),
        additional_context: None,
        knowledge_files: Vec::new(),
        openapi_schema_file: None,
        output: Some(output.to_path_buf()),
    }
}

fn options_for(dir: &TempDir) -> LoadOptions {
    LoadOptions {
        overrides: ConfigOverrides {
            onboarding_path: Some(dir.path().join("onboarding_config.toml")),
            files_dir: Some(dir.path().join("files")),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }
}

fn write_onboarding(dir: &TempDir, schema: Option<&str>) {
    let mut onboarding = OnboardingConfig::new("Acme Anvils", "Acme sells anvils.");
    onboarding.openapi_schema = schema.map(str::to_string);
    onboarding.save(&dir.path().join("onboarding_config.toml")).expect("save onboarding");
}

#[test]
fn onboard_writes_generated_configuration() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let schema_path = dir.path().join("schema.json");
        fs::write(&schema_path, SCHEMA).expect("write schema");
        let target = dir.path().join("nested/onboarding_config.toml");

        let mut args = onboard_args(&target);
        args.model = SupportModel::Gpt41;
        args.disable_guardrail = true;
        args.openapi_schema_file = Some(schema_path);
        let result = onboard::run(&options_for(&dir), args);

        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "onboard");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().contains("Configuration saved at:"));

        let raw = fs::read_to_string(&target).expect("generated file");
        assert!(raw.starts_with(GENERATED_HEADER));
        let loaded = OnboardingConfig::load(&target).expect("load generated file");
        assert_eq!(loaded.model, SupportModel::Gpt41);
        assert!(!loaded.enable_guardrail);
        assert_eq!(loaded.openapi_schema.as_deref(), Some(SCHEMA));
        assert_eq!(loaded.support_contact.as_deref(), Some("support@acme.test"));
    });
}

#[test]
fn onboard_rejects_blank_company_name_and_unreadable_schema() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("onboarding_config.toml");

        let mut blank = onboard_args(&target);
        blank.company_name = "   ".to_string();
        let result = onboard::run(&options_for(&dir), blank);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "onboarding_validation");
        assert!(!target.exists());

        let mut missing_schema = onboard_args(&target);
        missing_schema.openapi_schema_file = Some(dir.path().join("nope.json"));
        let result = onboard::run(&options_for(&dir), missing_schema);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "onboarding_input");
    });
}

#[test]
fn ask_requires_onboarding_first() {
    with_env(&[("OPENAI_API_KEY", "sk-test")], || {
        let dir = TempDir::new().expect("tempdir");

        let result = ask::run(&options_for(&dir), "hello");

        assert_eq!(result.exit_code, 2);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "onboarding_missing");
        assert!(payload["message"].as_str().unwrap_or_default().contains("supportdesk onboard"));
    });
}

#[test]
fn ask_requires_api_key() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        write_onboarding(&dir, None);

        let result = ask::run(&options_for(&dir), "hello");

        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn ask_returns_agent_reply() {
    let dir = TempDir::new().expect("tempdir");
    let mut app = AppConfig::default();
    app.agent.files_dir = dir.path().join("files");
    let onboarding = OnboardingConfig::new("Acme Anvils", "Acme sells anvils.");
    let client = Arc::new(ScriptedLlmClient::new());
    client.push_text(r#"{"is_relevant": true, "reasoning": "shipping"}"#);
    client.push_text("Orders ship within two business days.");

    let result = ask::run_with_client(&app, &onboarding, client, "When will my order ship?");

    assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["message"], "Orders ship within two business days.");
    assert_eq!(payload["details"]["agent"], "Alex");
    assert_eq!(payload["details"]["guardrail_triggered"], false);
}

#[test]
fn ask_reports_provider_failure_as_runtime_error() {
    let dir = TempDir::new().expect("tempdir");
    let mut app = AppConfig::default();
    app.agent.files_dir = dir.path().join("files");
    let mut onboarding = OnboardingConfig::new("Acme Anvils", "Acme sells anvils.");
    onboarding.enable_guardrail = false;
    let client = Arc::new(ScriptedLlmClient::new());

    let result = ask::run_with_client(&app, &onboarding, client, "hello");

    assert_eq!(result.exit_code, 3);
    assert_eq!(parse_payload(&result.output)["error_class"], "agent_turn");
}

#[test]
fn chat_session_runs_until_exit_word() {
    let dir = TempDir::new().expect("tempdir");
    let mut app = AppConfig::default();
    app.agent.files_dir = dir.path().join("files");
    let onboarding = OnboardingConfig::new("Acme Anvils", "Acme sells anvils.");
    let client = Arc::new(ScriptedLlmClient::new());
    client.push_text(r#"{"is_relevant": true, "reasoning": "greeting"}"#);
    client.push_text("Hello! How can I help?");
    client.push_text(r#"{"is_relevant": false, "reasoning": "trivia"}"#);

    let input = Cursor::new("hello\n\nwho won the 1998 world cup?\nquit\nnever read\n");
    let mut transcript = Vec::new();
    let result = chat::run_session(&app, &onboarding, client.clone(), input, &mut transcript);

    assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
    let transcript = String::from_utf8(transcript).expect("utf8 transcript");
    assert!(transcript.starts_with("Alex is ready."));
    assert!(transcript.contains("Alex: Hello! How can I help?"));
    assert!(transcript.contains("Alex: I'm a customer support agent for Acme Anvils."));

    let payload = parse_payload(&result.output);
    assert_eq!(payload["details"]["turns"], 2);
    assert_eq!(payload["details"]["messages"], 4);
    assert_eq!(client.remaining(), 0);
}

#[test]
fn doctor_passes_with_onboarding_and_api_key() {
    with_env(&[("SUPPORTDESK_LLM_API_KEY", "sk-test")], || {
        let dir = TempDir::new().expect("tempdir");
        write_onboarding(&dir, Some(SCHEMA));

        let result = doctor::run(&options_for(&dir), true);

        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass");
        let checks = report["checks"].as_array().cloned().unwrap_or_default();
        let openapi = checks.iter().find(|check| check["name"] == "openapi_tools");
        assert!(openapi
            .and_then(|check| check["details"].as_str())
            .unwrap_or_default()
            .contains("sendSupportRequest"));
    });
}

#[test]
fn doctor_flags_missing_onboarding() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");

        let result = doctor::run(&options_for(&dir), false);

        assert_eq!(result.exit_code, 2);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] llm_api_key"));
        assert!(result.output.contains("- [fail] onboarding_file"));
        assert!(result.output.contains("- [skip] instruction_rendering"));
    });
}

#[test]
fn config_attributes_sources_and_redacts_secrets() {
    with_env(
        &[
            ("OPENAI_API_KEY", "sk-live-very-secret"),
            ("CUSTOMER_SUPPORT_BEARER_TOKEN", "opaque-bearer"),
            ("SUPPORTDESK_LOG_LEVEL", "debug"),
        ],
        || {
            let dir = TempDir::new().expect("tempdir");

            let result = config::run(&options_for(&dir));

            assert_eq!(result.exit_code, 0);
            let output = result.output;
            assert!(output.contains("- llm.api_key = sk-*** (source: env (OPENAI_API_KEY))"));
            assert!(output.contains(
                "- tools.bearer_token = <redacted> (source: env (CUSTOMER_SUPPORT_BEARER_TOKEN))"
            ));
            assert!(output.contains("- logging.level = debug (source: env (SUPPORTDESK_LOG_LEVEL))"));
            assert!(output.contains("- llm.base_url = https://api.openai.com/v1 (source: default)"));
            assert!(!output.contains("very-secret"));
            assert!(!output.contains("opaque-bearer"));
        },
    );
}

#[test]
fn config_ignores_blank_env_when_attributing_sources() {
    with_env(&[("OPENAI_API_KEY", "   ")], || {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("supportdesk.toml");
        fs::write(&path, "[llm]\napi_key = \"sk-from-file\"\n").expect("write config");
        let mut options = options_for(&dir);
        options.config_path = Some(path.clone());

        let result = config::run(&options);

        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains(&format!(
            "- llm.api_key = sk-*** (source: file ({}))",
            path.display()
        )));
        assert!(!result.output.contains("env (OPENAI_API_KEY)"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "OPENAI_API_KEY",
        "CUSTOMER_SUPPORT_BEARER_TOKEN",
        "SUPPORTDESK_LLM_API_KEY",
        "SUPPORTDESK_LLM_BASE_URL",
        "SUPPORTDESK_LLM_TIMEOUT_SECS",
        "SUPPORTDESK_LLM_MAX_TOOL_ROUNDS",
        "SUPPORTDESK_AGENT_ONBOARDING_PATH",
        "SUPPORTDESK_AGENT_TEMPLATES_DIR",
        "SUPPORTDESK_AGENT_FILES_DIR",
        "SUPPORTDESK_TOOLS_BEARER_TOKEN",
        "SUPPORTDESK_LOGGING_LEVEL",
        "SUPPORTDESK_LOGGING_FORMAT",
        "SUPPORTDESK_LOG_LEVEL",
        "SUPPORTDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
