use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use supportdesk_core::knowledge::KnowledgeBase;

use super::Tool;
use crate::llm::ToolDefinition;

pub const KNOWLEDGE_TOOL_NAME: &str = "search_knowledge_base";
const DEFAULT_RESULT_LIMIT: usize = 5;

pub struct KnowledgeSearchTool {
    knowledge: Arc<KnowledgeBase>,
    limit: usize,
}

impl KnowledgeSearchTool {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge, limit: DEFAULT_RESULT_LIMIT }
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        KNOWLEDGE_TOOL_NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: KNOWLEDGE_TOOL_NAME.to_string(),
            description: "Search the company's uploaded FAQs, SOPs and product documentation. \
                          Returns the most relevant passages with their source file."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Keywords or question to search for."
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            strict: true,
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = input["query"]
            .as_str()
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| anyhow!("`query` must be a non-empty string"))?;

        let hits = self.knowledge.search(query, self.limit);
        Ok(json!({ "results": hits }))
    }
}
