//! Instruction templates for the support agent.
//!
//! Three tera templates are known: `instructions.md` (plain agent),
//! `instructions_openapi.md` (agent with support-request tools) and
//! `shared_instructions.md` (company overview shared by the agency). Each one
//! can be overridden by a file of the same name in the configured templates
//! directory; otherwise the copy compiled into the binary is used.

use std::fs;
use std::path::{Path, PathBuf};

use tera::{Context, Tera};
use thiserror::Error;
use tracing::debug;

use crate::onboarding::OnboardingConfig;

pub const INSTRUCTIONS_TEMPLATE: &str = "instructions.md";
pub const OPENAPI_INSTRUCTIONS_TEMPLATE: &str = "instructions_openapi.md";
pub const SHARED_INSTRUCTIONS_TEMPLATE: &str = "shared_instructions.md";

pub const DEFAULT_SUPPORT_CONTACT: &str = "the support team";

const BUILTIN_TEMPLATES: [(&str, &str); 3] = [
    (INSTRUCTIONS_TEMPLATE, include_str!("../templates/instructions.md")),
    (OPENAPI_INSTRUCTIONS_TEMPLATE, include_str!("../templates/instructions_openapi.md")),
    (SHARED_INSTRUCTIONS_TEMPLATE, include_str!("../templates/shared_instructions.md")),
];

#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("could not read instruction template `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("instruction template `{name}` is invalid: {source}")]
    Template { name: String, source: tera::Error },
    #[error("could not render instruction template `{name}`: {source}")]
    Render { name: String, source: tera::Error },
}

#[derive(Debug)]
pub struct InstructionTemplates {
    tera: Tera,
}

impl InstructionTemplates {
    pub fn builtin() -> Result<Self, InstructionError> {
        Self::load(None)
    }

    pub fn load(override_dir: Option<&Path>) -> Result<Self, InstructionError> {
        let mut tera = Tera::default();

        for (name, builtin) in BUILTIN_TEMPLATES {
            let overridden = override_dir.map(|dir| dir.join(name)).filter(|path| path.is_file());
            let source = match overridden {
                Some(path) => {
                    debug!(template = name, path = %path.display(), "using template override");
                    fs::read_to_string(&path)
                        .map_err(|source| InstructionError::Read { path, source })?
                }
                None => builtin.to_string(),
            };

            tera.add_raw_template(name, &source)
                .map_err(|source| InstructionError::Template { name: name.to_string(), source })?;
        }

        Ok(Self { tera })
    }

    /// Renders the agent instructions, picking the OpenAPI variant when the
    /// onboarding record carries a schema.
    pub fn render_instructions(&self, config: &OnboardingConfig) -> Result<String, InstructionError> {
        let name = if config.openapi_schema().is_some() {
            OPENAPI_INSTRUCTIONS_TEMPLATE
        } else {
            INSTRUCTIONS_TEMPLATE
        };

        let mut context = Context::new();
        context.insert("agent_name", &config.agent_name);
        context.insert("company_name", &config.company_name);
        context.insert("output_format", &config.output_format);
        context.insert(
            "support_contact",
            config.support_contact.as_deref().unwrap_or(DEFAULT_SUPPORT_CONTACT),
        );
        context.insert("additional_context", config.additional_context.as_deref().unwrap_or(""));

        self.render(name, &context)
    }

    pub fn render_shared_instructions(
        &self,
        config: &OnboardingConfig,
    ) -> Result<String, InstructionError> {
        let mut context = Context::new();
        context.insert("company_overview", &config.company_overview);

        self.render(SHARED_INSTRUCTIONS_TEMPLATE, &context)
    }

    fn render(&self, name: &str, context: &Context) -> Result<String, InstructionError> {
        self.tera
            .render(name, context)
            .map_err(|source| InstructionError::Render { name: name.to_string(), source })
    }
}
