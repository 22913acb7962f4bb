//! OpenAI-compatible chat-completions decider
//!
//! Talks to any endpoint speaking the `/chat/completions` dialect. The
//! agent's bound tools are presented as functions, plus a synthetic
//! `handoff` function restricted to the agent's declared targets. The
//! response is decoded at this boundary into a [`TurnResult`]; output that
//! matches no known shape becomes an error, never a trusted instruction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::{AgentDef, Decider, Message, Role, ToolCall, TurnResult};
use crate::error::{Error, Result};
use crate::tool::ToolSpec;

/// Name of the synthetic control-transfer function
const HANDOFF_TOOL: &str = "handoff";

/// Decider backed by an OpenAI-compatible chat-completions endpoint
pub struct OpenAiDecider {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    request_timeout: Duration,
}

impl OpenAiDecider {
    /// Create a decider with default endpoint and model
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Set a custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

/// Chat completion request (OpenAI-compatible format)
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

/// Build the wire message list: instructions first, then the history
fn build_messages(agent: &AgentDef, history: &[Message]) -> Vec<WireMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(WireMessage {
        role: "system",
        content: agent.instructions.clone(),
    });

    for message in history {
        // Tool results travel as user messages; the plain-text history
        // carries no tool_call ids to thread through.
        let role = match message.role {
            Role::System => "system",
            Role::User | Role::Tool => "user",
            Role::Assistant => "assistant",
        };
        messages.push(WireMessage {
            role,
            content: message.content.clone(),
        });
    }

    messages
}

/// Build the function list: the agent's tools plus the handoff function
fn build_tools(agent: &AgentDef, tools: &[ToolSpec]) -> Vec<Value> {
    let mut functions: Vec<Value> = tools
        .iter()
        .map(|spec| {
            json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.parameters,
                }
            })
        })
        .collect();

    if !agent.handoff_targets.is_empty() {
        functions.push(json!({
            "type": "function",
            "function": {
                "name": HANDOFF_TOOL,
                "description": "Transfer control to another agent.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "to_agent": {
                            "type": "string",
                            "enum": agent.handoff_targets,
                            "description": "Name of the agent to hand off to"
                        },
                        "reason": {
                            "type": "string",
                            "description": "Why control is being transferred"
                        }
                    },
                    "required": ["to_agent"]
                }
            }
        }));
    }

    functions
}

/// Decode one chat choice into a turn result
fn decode_choice(message: ChoiceMessage) -> Result<TurnResult> {
    if let Some(calls) = message.tool_calls.filter(|c| !c.is_empty()) {
        let mut tool_calls = Vec::with_capacity(calls.len());

        for call in calls {
            let args: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| json!({}));

            if call.function.name == HANDOFF_TOOL {
                let target = args
                    .get("to_agent")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Decider("handoff call missing to_agent".to_string())
                    })?;
                let reason = args
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default();

                // A handoff ends the turn; any sibling calls are dropped.
                return Ok(TurnResult::Handoff {
                    target: target.to_string(),
                    reason: reason.to_string(),
                });
            }

            tool_calls.push(ToolCall::new(call.function.name, args));
        }

        return Ok(TurnResult::ToolCalls(tool_calls));
    }

    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(TurnResult::FinalOutput(content)),
        _ => Err(Error::Decider(
            "model returned neither tool calls nor content".to_string(),
        )),
    }
}

#[async_trait]
impl Decider for OpenAiDecider {
    async fn decide(
        &self,
        agent: &AgentDef,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<TurnResult> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(agent, history),
            tools: build_tools(agent, tools),
            tool_choice: if tools.is_empty() && agent.handoff_targets.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
        };

        debug!(
            agent = %agent.name,
            model = %self.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "Requesting decision"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Decider(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Chat completion request rejected");
            return Err(Error::Decider(format!(
                "endpoint returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let mut parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Decider(format!("undecodable response: {}", e)))?;

        if parsed.choices.is_empty() {
            return Err(Error::Decider("response contained no choices".to_string()));
        }

        decode_choice(parsed.choices.remove(0).message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentDef {
        AgentDef::new("CommentorAgent", "Drafts reviews")
            .with_instructions("Draft a review.")
            .with_handoff_targets(["ContextAgent", "ReviewAndPostingAgent"])
    }

    #[test]
    fn test_build_messages_prepends_instructions() {
        let history = vec![Message::user("Review PR 7"), Message::tool("tool output")];
        let messages = build_messages(&agent(), &history);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "Draft a review.");
        assert_eq!(messages[2].role, "user");
    }

    #[test]
    fn test_build_tools_includes_handoff_for_targets() {
        let tools = build_tools(&agent(), &[]);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["function"]["name"], HANDOFF_TOOL);
    }

    #[test]
    fn test_build_tools_omits_handoff_without_targets() {
        let loner = AgentDef::new("Loner", "Works alone");
        assert!(build_tools(&loner, &[]).is_empty());
    }

    #[test]
    fn test_decode_final_output() {
        let message = ChoiceMessage {
            content: Some("Thanks for the PR!".to_string()),
            tool_calls: None,
        };
        let result = decode_choice(message).unwrap();
        assert_eq!(result, TurnResult::FinalOutput("Thanks for the PR!".to_string()));
    }

    #[test]
    fn test_decode_tool_calls() {
        let message = ChoiceMessage {
            content: None,
            tool_calls: Some(vec![WireToolCall {
                function: WireFunction {
                    name: "get_pr_details".to_string(),
                    arguments: r#"{"pr_number": 7}"#.to_string(),
                },
            }]),
        };

        let result = decode_choice(message).unwrap();
        match result {
            TurnResult::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "get_pr_details");
                assert_eq!(calls[0].args["pr_number"], 7);
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_handoff() {
        let message = ChoiceMessage {
            content: None,
            tool_calls: Some(vec![WireToolCall {
                function: WireFunction {
                    name: HANDOFF_TOOL.to_string(),
                    arguments: r#"{"to_agent": "ContextAgent", "reason": "need files"}"#
                        .to_string(),
                },
            }]),
        };

        let result = decode_choice(message).unwrap();
        assert_eq!(
            result,
            TurnResult::Handoff {
                target: "ContextAgent".to_string(),
                reason: "need files".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_handoff_missing_target_rejected() {
        let message = ChoiceMessage {
            content: None,
            tool_calls: Some(vec![WireToolCall {
                function: WireFunction {
                    name: HANDOFF_TOOL.to_string(),
                    arguments: "{}".to_string(),
                },
            }]),
        };
        assert!(decode_choice(message).is_err());
    }

    #[test]
    fn test_decode_empty_decision_rejected() {
        let message = ChoiceMessage {
            content: Some("   ".to_string()),
            tool_calls: None,
        };
        assert!(decode_choice(message).is_err());
    }

    #[test]
    fn test_decode_malformed_arguments_degrade_to_empty() {
        let message = ChoiceMessage {
            content: None,
            tool_calls: Some(vec![WireToolCall {
                function: WireFunction {
                    name: "get_pr_details".to_string(),
                    arguments: "not json".to_string(),
                },
            }]),
        };

        let result = decode_choice(message).unwrap();
        match result {
            TurnResult::ToolCalls(calls) => assert_eq!(calls[0].args, json!({})),
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let decider = OpenAiDecider::new("key").with_api_base("https://example.test/v1/");
        assert_eq!(decider.endpoint(), "https://example.test/v1/chat/completions");
    }
}
