//! Agent definitions and turn results
//!
//! An agent is a named policy unit bound to a subset of registered tools
//! and a fixed set of legal handoff targets. The decision function behind
//! it is opaque; the orchestrator only sees the [`TurnResult`] it yields.

mod decider;

pub mod backends;

pub use decider::{Decider, ScriptedDecider};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named decision-making unit with a bounded capability set
///
/// Immutable for the duration of a run. Tool and handoff entries are
/// references by name; ownership stays with the registry and the workflow.
#[derive(Debug, Clone)]
pub struct AgentDef {
    /// Unique agent name
    pub name: String,
    /// Short description of the agent's responsibility
    pub description: String,
    /// Opaque policy prompt driving the decision function
    pub instructions: String,
    /// Names of tools this agent may call
    pub tools: Vec<String>,
    /// Names of agents this agent may hand off to (may be empty)
    pub handoff_targets: Vec<String>,
}

impl AgentDef {
    /// Create an agent with no tools and no handoff targets
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: String::new(),
            tools: Vec::new(),
            handoff_targets: Vec::new(),
        }
    }

    /// Set the instruction prompt
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Bind tools by name
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Declare legal handoff targets by agent name
    pub fn with_handoff_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handoff_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a handoff to `target` is declared legal for this agent
    pub fn can_handoff_to(&self, target: &str) -> bool {
        self.handoff_targets.iter().any(|t| t == target)
    }

    /// Whether this agent is bound to the named tool
    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in the accumulated conversation history of a run
///
/// Tool results are appended before the next decision step so that context
/// accumulates monotonically within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a tool-result message
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// A single requested tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke
    pub name: String,
    /// Arguments matching the tool's parameter schema
    pub args: Value,
}

impl ToolCall {
    /// Create a tool call
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The decoded outcome of one agent turn
///
/// Decoded and validated at the decider boundary; anything that does not
/// match one of these shapes is rejected there rather than trusted.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult {
    /// The agent requests one or more tool invocations
    ToolCalls(Vec<ToolCall>),
    /// The agent requests a control transfer to another agent
    Handoff {
        /// Name of the target agent
        target: String,
        /// Stated reason for the transfer
        reason: String,
    },
    /// The agent produced its final answer; no further handoff follows
    FinalOutput(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_builder() {
        let agent = AgentDef::new("ContextAgent", "Gathers PR context")
            .with_instructions("Gather the PR details.")
            .with_tools(["get_pr_details", "get_file_content"])
            .with_handoff_targets(["CommentorAgent"]);

        assert_eq!(agent.name, "ContextAgent");
        assert!(agent.has_tool("get_pr_details"));
        assert!(!agent.has_tool("post_review"));
        assert!(agent.can_handoff_to("CommentorAgent"));
        assert!(!agent.can_handoff_to("ContextAgent"));
    }

    #[test]
    fn test_agent_with_no_targets() {
        let agent = AgentDef::new("Loner", "Works alone");
        assert!(agent.handoff_targets.is_empty());
        assert!(!agent.can_handoff_to("Anyone"));
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::tool("t").role, Role::Tool);
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_tool_call_roundtrip() {
        let call = ToolCall::new("get_pr_details", json!({"pr_number": 7}));
        let encoded = serde_json::to_string(&call).unwrap();
        let decoded: ToolCall = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, call);
    }
}
