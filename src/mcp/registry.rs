use super::schema::Schema;
use super::tools::Tool;
use crate::error::ToolError;
use crate::xo::XoClient;
use serde_json::{json, Value};
use std::collections::HashMap;

/// A tool as advertised to, and dispatched for, the host.
#[derive(Debug, Clone, Copy)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: &'static Schema,
    handler: Tool,
}

impl From<Tool> for ToolDefinition {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name(),
            description: tool.description(),
            schema: tool.schema(),
            handler: tool,
        }
    }
}

impl ToolDefinition {
    pub fn tool(&self) -> Tool {
        self.handler
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.schema.to_json()
        })
    }

    /// Validates `args` against the schema, then runs the handler.
    ///
    /// Nothing is sent upstream when validation fails.
    pub async fn call(&self, client: &XoClient, args: &Value) -> Result<Value, ToolError> {
        let args = self.schema.validate(args)?;
        self.handler.invoke(client, args).await
    }
}

/// Immutable name to tool lookup, built once at startup.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let tools = Tool::ALL
            .iter()
            .map(|&tool| (tool.name(), ToolDefinition::from(tool)))
            .collect();
        Self { tools }
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Definitions in a stable order for `tools/list`.
    pub fn definitions(&self) -> Vec<Value> {
        Tool::ALL
            .iter()
            .filter_map(|tool| self.tools.get(tool.name()))
            .map(ToolDefinition::to_json)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
