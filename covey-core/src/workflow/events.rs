//! Replayable run events
//!
//! The orchestrator emits an ordered event sequence so a caller can
//! reconstruct a run for auditing or debugging without re-executing it.

use serde::Serialize;
use serde_json::Value;

/// One step in the ordered event sequence of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// An agent became the active agent
    AgentActivated {
        /// Agent name
        agent: String,
    },
    /// The active agent requested a tool invocation
    ToolCalled {
        /// Calling agent
        agent: String,
        /// Tool name
        tool: String,
        /// Arguments as passed
        args: Value,
    },
    /// A tool invocation returned a value
    ToolResult {
        /// Tool name
        tool: String,
        /// Returned value
        output: Value,
    },
    /// A tool invocation failed
    ToolFailed {
        /// Tool name
        tool: String,
        /// Error description
        error: String,
    },
    /// A handoff was accepted
    Handoff {
        /// Agent that relinquished control
        from: String,
        /// Agent that received control
        to: String,
        /// Stated reason
        reason: String,
    },
    /// A handoff named an undeclared target and was refused
    HandoffRejected {
        /// Agent that requested the transfer
        from: String,
        /// Undeclared target
        to: String,
    },
    /// The active agent produced the run's final output
    FinalOutput {
        /// Agent name
        agent: String,
        /// Final text
        text: String,
    },
}

impl RunEvent {
    /// Short one-line rendering for terminal display
    pub fn summary(&self) -> String {
        match self {
            RunEvent::AgentActivated { agent } => format!("agent activated: {}", agent),
            RunEvent::ToolCalled { agent, tool, .. } => {
                format!("{} called tool {}", agent, tool)
            }
            RunEvent::ToolResult { tool, .. } => format!("tool {} returned", tool),
            RunEvent::ToolFailed { tool, error } => format!("tool {} failed: {}", tool, error),
            RunEvent::Handoff { from, to, .. } => format!("handoff: {} -> {}", from, to),
            RunEvent::HandoffRejected { from, to } => {
                format!("handoff rejected: {} -> {}", from, to)
            }
            RunEvent::FinalOutput { agent, .. } => format!("final output from {}", agent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization_tag() {
        let event = RunEvent::Handoff {
            from: "A".to_string(),
            to: "B".to_string(),
            reason: "needs context".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "handoff");
        assert_eq!(value["from"], "A");
        assert_eq!(value["to"], "B");
    }

    #[test]
    fn test_summary_lines() {
        let event = RunEvent::ToolCalled {
            agent: "ContextAgent".to_string(),
            tool: "get_pr_details".to_string(),
            args: json!({"pr_number": 7}),
        };
        assert_eq!(event.summary(), "ContextAgent called tool get_pr_details");

        let event = RunEvent::HandoffRejected {
            from: "A".to_string(),
            to: "C".to_string(),
        };
        assert_eq!(event.summary(), "handoff rejected: A -> C");
    }
}
