use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Models the onboarding step lets an operator pick for the support agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportModel {
    #[serde(rename = "gpt-4.1")]
    Gpt41,
    #[default]
    #[serde(rename = "gpt-5")]
    Gpt5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl SupportModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt41 => "gpt-4.1",
            Self::Gpt5 => "gpt-5",
        }
    }

    /// Reasoning models take an effort level; gpt-4.1 gets a low temperature instead.
    pub fn agent_settings(&self) -> ModelSettings {
        match self {
            Self::Gpt5 => {
                ModelSettings { temperature: None, reasoning_effort: Some(ReasoningEffort::Low) }
            }
            Self::Gpt41 => ModelSettings { temperature: Some(0.3), reasoning_effort: None },
        }
    }

    pub fn guardrail_model(&self) -> &'static str {
        match self {
            Self::Gpt5 => "gpt-5-nano",
            Self::Gpt41 => "gpt-4o-mini",
        }
    }

    pub fn guardrail_settings(&self) -> ModelSettings {
        match self {
            Self::Gpt5 => {
                ModelSettings { temperature: None, reasoning_effort: Some(ReasoningEffort::Low) }
            }
            Self::Gpt41 => ModelSettings::default(),
        }
    }
}

impl std::fmt::Display for SupportModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SupportModel {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gpt-4.1" => Ok(Self::Gpt41),
            "gpt-5" => Ok(Self::Gpt5),
            other => Err(ConfigError::Validation(format!(
                "unsupported model `{other}` (expected gpt-4.1|gpt-5)"
            ))),
        }
    }
}
