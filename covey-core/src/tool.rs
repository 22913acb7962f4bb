//! Tool contracts and the tool registry
//!
//! A tool is a named callable exposed to agents, classified by its side
//! effect. Read tools absorb external failure and return a degraded value;
//! the terminal write tool propagates failure since it is the irrevocable
//! action of the whole run.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::state::SharedState;

/// Side-effect classification of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Reads an external data source; degrades gracefully on failure
    ReadExternal,
    /// Mutates the run's shared state only
    StateMutation,
    /// Performs the run's irrevocable external write
    TerminalWrite,
}

/// Errors surfaced by tool invocation
#[derive(Error, Debug)]
pub enum ToolError {
    /// No tool registered under the requested name
    #[error("Unknown tool: {0}")]
    NotFound(String),

    /// Arguments did not match the tool's input schema
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// The backing external read/write failed
    #[error("External failure: {0}")]
    ExternalFailure(String),
}

/// A callable contract exposed to agents
///
/// Tools are immutable after registration. `invoke` receives the run's
/// shared state exclusively; only one tool executes at a time within a run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human-readable description surfaced to the decision function
    fn description(&self) -> &str;

    /// Side-effect class of this tool
    fn side_effect(&self) -> SideEffect;

    /// JSON schema describing the tool's named parameters
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    /// Invoke the tool with the given arguments
    async fn invoke(
        &self,
        args: Value,
        state: &mut SharedState,
    ) -> std::result::Result<Value, ToolError>;
}

/// Description of a tool handed to the decision function
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON schema of the parameters
    pub parameters: Value,
}

/// Registry of tools available to a workflow
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    ///
    /// Names must be unique; re-registering a name replaces the previous
    /// tool and logs a warning.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// List all registered tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Invoke a tool by name
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        state: &mut SharedState,
    ) -> std::result::Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tracing::debug!(tool = %name, "Invoking tool");
        tool.invoke(args, state).await
    }

    /// Build decider-facing specs for a subset of tools
    ///
    /// Unknown names are skipped with a warning rather than failing the
    /// whole spec list.
    pub fn specs_for(&self, names: &[String]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|name| match self.tools.get(name) {
                Some(tool) => Some(ToolSpec {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                }),
                None => {
                    tracing::warn!(tool = %name, "Agent references unregistered tool");
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// A state-mutation tool that stores one string argument under a fixed key
///
/// Used for the accumulation steps of a review run: gathered context, the
/// draft comment, and the final review text each get one instance.
#[derive(Debug, Clone)]
pub struct SaveStateTool {
    name: String,
    description: String,
    key: String,
}

impl SaveStateTool {
    /// Create a save-state tool writing to `key`
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            key: key.into(),
        }
    }

    /// The shared-state key this tool writes
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl Tool for SaveStateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn side_effect(&self) -> SideEffect {
        SideEffect::StateMutation
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "value": {
                    "type": "string",
                    "description": "The text to store"
                }
            },
            "required": ["value"]
        })
    }

    async fn invoke(
        &self,
        args: Value,
        state: &mut SharedState,
    ) -> std::result::Result<Value, ToolError> {
        let value = args
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("expected string field `value`".to_string()))?;

        state.set(&self.key, value);
        tracing::debug!(key = %self.key, len = value.len(), "Stored value in shared state");

        Ok(json!({"stored": self.key}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        assert!(registry.get("save_draft").is_none());

        registry.register(Arc::new(SaveStateTool::new(
            "save_draft",
            "Save the draft comment",
            "draft_comment",
        )));
        assert!(registry.get("save_draft").is_some());
        assert_eq!(registry.names(), vec!["save_draft"]);
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = ToolRegistry::new();
        let mut state = SharedState::new();
        let result = registry.invoke("nope", json!({}), &mut state).await;
        assert!(matches!(result, Err(ToolError::NotFound(name)) if name == "nope"));
    }

    #[tokio::test]
    async fn test_save_state_tool_writes_key() {
        let tool = SaveStateTool::new("save_context", "Save context", "gathered_context");
        let mut state = SharedState::new();

        let result = tool
            .invoke(json!({"value": "PR touches the parser"}), &mut state)
            .await
            .unwrap();

        assert_eq!(result["stored"], "gathered_context");
        assert_eq!(state.get_str("gathered_context"), "PR touches the parser");
    }

    #[tokio::test]
    async fn test_save_state_tool_rejects_missing_value() {
        let tool = SaveStateTool::new("save_context", "Save context", "gathered_context");
        let mut state = SharedState::new();

        let result = tool.invoke(json!({}), &mut state).await;
        assert!(matches!(result, Err(ToolError::InvalidArgs(_))));
        assert!(state.is_empty());
    }

    #[test]
    fn test_side_effect_class() {
        let tool = SaveStateTool::new("save_context", "Save context", "gathered_context");
        assert_eq!(tool.side_effect(), SideEffect::StateMutation);
    }

    #[test]
    fn test_specs_for_skips_unknown_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SaveStateTool::new("a", "Tool a", "ka")));

        let specs = registry.specs_for(&["a".to_string(), "missing".to_string()]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "a");
    }
}
