//! Tools the support agent can call during a turn.
//!
//! - `openapi` - one HTTP-backed tool per operation of the onboarding OpenAPI schema
//! - `knowledge` - passage search over the uploaded knowledge files

pub mod knowledge;
pub mod openapi;

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::llm::ToolDefinition;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registers `tool` under its name. A tool already registered under the
    /// same name is replaced.
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Box::new(tool)).is_some() {
            warn!(
                event_name = "agent.tools.duplicate_name",
                tool = %name,
                "tool registered twice; keeping the latest"
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    /// Definitions sorted by name so requests are stable across runs.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions =
            self.tools.values().map(|tool| tool.definition()).collect::<Vec<_>>();
        definitions.sort_by(|left, right| left.name.cmp(&right.name));
        definitions
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.tools.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| anyhow!("unknown tool `{name}`"))?;
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
