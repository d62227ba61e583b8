use std::env;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use supportdesk_core::config::{resolve_config_path, LoadOptions, BEARER_TOKEN_ENV};
use toml::Value;

use crate::commands::{load_config, CommandResult};

struct SourceContext {
    doc: Option<Value>,
    path: Option<String>,
}

impl SourceContext {
    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env_is_set(key)) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self.path.clone().unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let context = SourceContext {
        doc: load_config_file_doc(config_file_path.as_deref()),
        path: config_file_path.map(|path| path.display().to_string()),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: &str, env_keys: &[&str]| {
        lines.push(render_line(key, value, context.source(key, env_keys)));
    };

    push(
        "llm.api_key",
        &redact_secret(config.llm.api_key.as_ref()),
        &["SUPPORTDESK_LLM_API_KEY", "OPENAI_API_KEY"],
    );
    push("llm.base_url", &config.llm.base_url, &["SUPPORTDESK_LLM_BASE_URL"]);
    push(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        &["SUPPORTDESK_LLM_TIMEOUT_SECS"],
    );
    push(
        "llm.max_tool_rounds",
        &config.llm.max_tool_rounds.to_string(),
        &["SUPPORTDESK_LLM_MAX_TOOL_ROUNDS"],
    );

    push(
        "agent.onboarding_path",
        &config.agent.onboarding_path.display().to_string(),
        &["SUPPORTDESK_AGENT_ONBOARDING_PATH"],
    );
    let templates_dir = config
        .agent
        .templates_dir
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<built-in>".to_string());
    push("agent.templates_dir", &templates_dir, &["SUPPORTDESK_AGENT_TEMPLATES_DIR"]);
    push(
        "agent.files_dir",
        &config.agent.files_dir.display().to_string(),
        &["SUPPORTDESK_AGENT_FILES_DIR"],
    );

    push(
        "tools.bearer_token",
        &redact_secret(config.tools.bearer_token.as_ref()),
        &["SUPPORTDESK_TOOLS_BEARER_TOKEN", BEARER_TOKEN_ENV],
    );

    push(
        "logging.level",
        &config.logging.level,
        &["SUPPORTDESK_LOGGING_LEVEL", "SUPPORTDESK_LOG_LEVEL"],
    );
    push(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["SUPPORTDESK_LOGGING_FORMAT", "SUPPORTDESK_LOG_FORMAT"],
    );

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

/// Mirrors the loader: blank variables do not count as set.
fn env_is_set(key: &str) -> bool {
    env::var(key).is_ok_and(|value| !value.trim().is_empty())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognizable key prefix such as `sk-` and hides the rest.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };

    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
