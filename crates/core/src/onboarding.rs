//! The onboarding record: the settings an operator authors once before the
//! support agent is deployed.
//!
//! `supportdesk onboard` builds an [`OnboardingConfig`] from command-line
//! input and writes it with [`OnboardingConfig::save`]. Every later start of
//! the agent reads it back with [`OnboardingConfig::load`]; nothing updates
//! the file at runtime.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SupportModel;

pub const GENERATED_HEADER: &str = "# Auto-generated onboarding configuration";

pub const DEFAULT_AGENT_NAME: &str = "Alex";
pub const DEFAULT_AGENT_DESCRIPTION: &str =
    "Handles customer inquiries, provides assistance, and ensures excellent customer service.";
pub const DEFAULT_OUTPUT_FORMAT: &str = "Provide clear, well-structured responses. Use the selected response structure and style. Include relevant examples when helpful.";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnboardingConfig {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    #[serde(default = "default_agent_description")]
    pub agent_description: String,
    #[serde(default)]
    pub model: SupportModel,
    #[serde(default = "default_enable_guardrail")]
    pub enable_guardrail: bool,
    pub company_name: String,
    pub company_overview: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    #[serde(default)]
    pub knowledge_files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openapi_schema: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnboardingReceipt {
    pub path: PathBuf,
}

impl OnboardingReceipt {
    pub fn message(&self) -> String {
        format!(
            "Configuration saved at: {}\n\nStart the agent with:\nsupportdesk chat",
            self.path.display()
        )
    }
}

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error(
        "onboarding configuration not found at `{path}`. Please run `supportdesk onboard` to generate the configuration file before using this agent."
    )]
    NotFound { path: PathBuf },
    #[error("could not read onboarding configuration `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse onboarding configuration `{path}`: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("could not serialize onboarding configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not write onboarding configuration `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("onboarding validation failed: {0}")]
    Validation(String),
}

fn default_agent_name() -> String {
    DEFAULT_AGENT_NAME.to_string()
}

fn default_agent_description() -> String {
    DEFAULT_AGENT_DESCRIPTION.to_string()
}

fn default_enable_guardrail() -> bool {
    true
}

fn default_output_format() -> String {
    DEFAULT_OUTPUT_FORMAT.to_string()
}

impl OnboardingConfig {
    pub fn new(company_name: impl Into<String>, company_overview: impl Into<String>) -> Self {
        Self {
            agent_name: default_agent_name(),
            agent_description: default_agent_description(),
            model: SupportModel::default(),
            enable_guardrail: default_enable_guardrail(),
            company_name: company_name.into(),
            company_overview: company_overview.into(),
            output_format: default_output_format(),
            support_contact: None,
            additional_context: None,
            knowledge_files: Vec::new(),
            openapi_schema: None,
        }
    }

    /// The schema text, if one was supplied and is not just whitespace.
    pub fn openapi_schema(&self) -> Option<&str> {
        self.openapi_schema.as_deref().filter(|schema| !schema.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), OnboardingError> {
        for (field, value) in [
            ("agent_name", &self.agent_name),
            ("company_name", &self.company_name),
            ("company_overview", &self.company_overview),
        ] {
            if value.trim().is_empty() {
                return Err(OnboardingError::Validation(format!("{field} is required")));
            }
        }

        Ok(())
    }

    /// Blank optional text is treated the same as absent text.
    pub fn normalize(&mut self) {
        for field in [&mut self.support_contact, &mut self.additional_context] {
            if field.as_deref().is_some_and(|value| value.trim().is_empty()) {
                *field = None;
            }
        }
        if self.openapi_schema().is_none() {
            self.openapi_schema = None;
        }
        self.knowledge_files.retain(|path| !path.as_os_str().is_empty());
    }

    pub fn to_toml_string(&self) -> Result<String, OnboardingError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("{GENERATED_HEADER}\n\n{body}"))
    }

    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, OnboardingError> {
        let mut config: Self = toml::from_str(raw)
            .map_err(|source| OnboardingError::Parse { path: path.to_path_buf(), source })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<OnboardingReceipt, OnboardingError> {
        let mut config = self.clone();
        config.normalize();
        config.validate()?;

        let rendered = config.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| OnboardingError::Write { path: path.to_path_buf(), source })?;
        }
        fs::write(path, rendered)
            .map_err(|source| OnboardingError::Write { path: path.to_path_buf(), source })?;

        tracing::info!(
            event_name = "core.onboarding.saved",
            path = %path.display(),
            model = %config.model,
            enable_guardrail = config.enable_guardrail,
            has_openapi_schema = config.openapi_schema.is_some(),
            "onboarding configuration written"
        );

        Ok(OnboardingReceipt { path: path.to_path_buf() })
    }

    pub fn load(path: &Path) -> Result<Self, OnboardingError> {
        if !path.exists() {
            return Err(OnboardingError::NotFound { path: path.to_path_buf() });
        }

        let raw = fs::read_to_string(path)
            .map_err(|source| OnboardingError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw, path)
    }
}
