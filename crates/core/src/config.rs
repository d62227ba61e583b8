use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "supportdesk.toml";
pub const NESTED_CONFIG_FILE: &str = "config/supportdesk.toml";
pub const DEFAULT_ONBOARDING_FILE: &str = "onboarding_config.toml";
pub const BEARER_TOKEN_ENV: &str = "CUSTOMER_SUPPORT_BEARER_TOKEN";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_tool_rounds: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub onboarding_path: PathBuf,
    pub templates_dir: Option<PathBuf>,
    pub files_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ToolsConfig {
    pub bearer_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub onboarding_path: Option<PathBuf>,
    pub templates_dir: Option<PathBuf>,
    pub files_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                timeout_secs: 60,
                max_tool_rounds: 8,
            },
            agent: AgentConfig {
                onboarding_path: PathBuf::from(DEFAULT_ONBOARDING_FILE),
                templates_dir: None,
                files_dir: PathBuf::from("files"),
            },
            tools: ToolsConfig { bearer_token: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    /// The API key is optional at load time so that `onboard` and `config`
    /// work without credentials; anything that talks to the model asks here.
    pub fn require_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.api_key.as_ref().filter(|key| !key.expose_secret().trim().is_empty()).ok_or_else(
            || {
                ConfigError::Validation(
                    "llm.api_key is required (set SUPPORTDESK_LLM_API_KEY or OPENAI_API_KEY)"
                        .to_string(),
                )
            },
        )
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tool_rounds) = llm.max_tool_rounds {
                self.llm.max_tool_rounds = max_tool_rounds;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(onboarding_path) = agent.onboarding_path {
                self.agent.onboarding_path = onboarding_path;
            }
            if let Some(templates_dir) = agent.templates_dir {
                self.agent.templates_dir = Some(templates_dir);
            }
            if let Some(files_dir) = agent.files_dir {
                self.agent.files_dir = files_dir;
            }
        }

        if let Some(tools) = patch.tools {
            if let Some(bearer_token_value) = tools.bearer_token {
                self.tools.bearer_token = Some(secret_value(bearer_token_value));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let api_key = read_env("SUPPORTDESK_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SUPPORTDESK_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("SUPPORTDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SUPPORTDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_LLM_MAX_TOOL_ROUNDS") {
            self.llm.max_tool_rounds = parse_u32("SUPPORTDESK_LLM_MAX_TOOL_ROUNDS", &value)?;
        }

        if let Some(value) = read_env("SUPPORTDESK_AGENT_ONBOARDING_PATH") {
            self.agent.onboarding_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("SUPPORTDESK_AGENT_TEMPLATES_DIR") {
            self.agent.templates_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("SUPPORTDESK_AGENT_FILES_DIR") {
            self.agent.files_dir = PathBuf::from(value);
        }

        let bearer_token =
            read_env("SUPPORTDESK_TOOLS_BEARER_TOKEN").or_else(|| read_env(BEARER_TOKEN_ENV));
        if let Some(value) = bearer_token {
            self.tools.bearer_token = Some(secret_value(value));
        }

        let log_level =
            read_env("SUPPORTDESK_LOGGING_LEVEL").or_else(|| read_env("SUPPORTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SUPPORTDESK_LOGGING_FORMAT").or_else(|| read_env("SUPPORTDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(onboarding_path) = overrides.onboarding_path {
            self.agent.onboarding_path = onboarding_path;
        }
        if let Some(templates_dir) = overrides.templates_dir {
            self.agent.templates_dir = Some(templates_dir);
        }
        if let Some(files_dir) = overrides.files_dir {
            self.agent.files_dir = files_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_tool_rounds == 0 || llm.max_tool_rounds > 32 {
        return Err(ConfigError::Validation(
            "llm.max_tool_rounds must be in range 1..=32".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.onboarding_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("agent.onboarding_path must not be empty".to_string()));
    }

    if agent.files_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("agent.files_dir must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    tools: Option<ToolsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_tool_rounds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    onboarding_path: Option<PathBuf>,
    templates_dir: Option<PathBuf>,
    files_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    bearer_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
