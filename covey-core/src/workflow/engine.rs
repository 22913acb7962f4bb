//! The orchestrator engine
//!
//! Owns the tool registry and the agent set, holds the injected decision
//! function, and drives the per-run state machine: dispatch a turn, apply
//! tool calls, validate handoffs, stop on final output or when the turn
//! budget runs out. The caller always receives a [`RunReport`], never a
//! raw fault.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::agent::{AgentDef, Decider, Message, ToolCall, TurnResult};
use crate::state::SharedState;
use crate::tool::{SideEffect, ToolError, ToolRegistry};

use super::events::RunEvent;
use super::state::{RunPhase, RunState};

/// Tunable bounds for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of turns before a run is declared exhausted
    pub max_turns: u32,

    /// Per-invocation timeout for tool calls
    #[serde(with = "humantime_serde")]
    pub tool_timeout: Duration,

    /// Attempts allowed for the terminal write, including the first
    pub post_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            tool_timeout: Duration::from_secs(60),
            post_attempts: 3,
        }
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The root agent name is not in the declared agent set
    UnknownAgent {
        /// Requested agent name
        name: String,
    },
    /// An agent named a handoff target outside its declared set
    HandoffRejected {
        /// Agent that requested the transfer
        from: String,
        /// Undeclared target
        to: String,
    },
    /// The terminal write failed after its bounded retries
    TerminalWriteFailed {
        /// Underlying error description
        message: String,
    },
    /// The run was cancelled between turns
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::UnknownAgent { name } => write!(f, "unknown agent: {}", name),
            FailureReason::HandoffRejected { from, to } => {
                write!(f, "handoff rejected: {} -> {}", from, to)
            }
            FailureReason::TerminalWriteFailed { message } => {
                write!(f, "terminal write failed: {}", message)
            }
            FailureReason::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The active agent produced a final output with no pending handoff
    Success {
        /// Final output text
        output: String,
    },
    /// The turn budget was exhausted before a final output
    Exhausted,
    /// The run terminated with an error
    Failed {
        /// Failure classification
        reason: FailureReason,
    },
}

impl RunOutcome {
    /// Whether the run succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}

/// Everything a caller gets back from a run
#[derive(Debug)]
pub struct RunReport {
    /// Terminal outcome
    pub outcome: RunOutcome,
    /// Turns taken
    pub turns: u32,
    /// Ordered, replayable event sequence
    pub events: Vec<RunEvent>,
    /// Final shared state
    pub state: SharedState,
}

/// Result of one tool invocation, classified by severity
enum Invocation {
    Ok(Value),
    Recoverable(ToolError),
    Fatal(String),
}

/// The workflow engine
///
/// One agent is active at a time; one turn executes at a time; the shared
/// state is owned by the run and mutated only through tool calls. Multiple
/// independent runs may execute concurrently against the same orchestrator
/// since `run` takes no `&mut self`.
pub struct Orchestrator {
    registry: ToolRegistry,
    agents: HashMap<String, AgentDef>,
    decider: Arc<dyn Decider>,
    config: OrchestratorConfig,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Create an orchestrator over a tool registry and a decision function
    pub fn new(registry: ToolRegistry, decider: Arc<dyn Decider>) -> Self {
        Self {
            registry,
            agents: HashMap::new(),
            decider,
            config: OrchestratorConfig::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the orchestrator configuration
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Add agents to the declared agent set
    pub fn with_agents(mut self, agents: impl IntoIterator<Item = AgentDef>) -> Self {
        for agent in agents {
            self.register_agent(agent);
        }
        self
    }

    /// Register a single agent
    pub fn register_agent(&mut self, agent: AgentDef) {
        if self
            .agents
            .insert(agent.name.clone(), agent)
            .is_some()
        {
            warn!("Replacing previously registered agent");
        }
    }

    /// Names of all declared agents
    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    /// Handle for cancelling runs between turns
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Execute a run from `root_agent` with the given task and state
    ///
    /// Terminates with `Success` on a final output, `Exhausted` when
    /// `max_turns` is reached, or `Failed` on a rejected handoff, a failed
    /// terminal write, or cancellation. Never returns a raw error.
    pub async fn run(
        &self,
        root_agent: &str,
        task: &str,
        initial_state: SharedState,
    ) -> RunReport {
        let mut events = Vec::new();

        let Some(mut agent) = self.agents.get(root_agent) else {
            warn!(agent = %root_agent, "Run requested for unknown root agent");
            return RunReport {
                outcome: RunOutcome::Failed {
                    reason: FailureReason::UnknownAgent {
                        name: root_agent.to_string(),
                    },
                },
                turns: 0,
                events,
                state: initial_state,
            };
        };

        let mut run = RunState::new(&agent.name, initial_state);
        let mut history = vec![Message::user(task)];

        info!(root = %agent.name, max_turns = self.config.max_turns, "Starting run");
        events.push(RunEvent::AgentActivated {
            agent: agent.name.clone(),
        });

        while run.turn() < self.config.max_turns {
            if self.cancel.load(Ordering::SeqCst) {
                info!(turn = run.turn(), "Run cancelled");
                run.transition_to(RunPhase::Terminated);
                return finish(
                    run,
                    RunOutcome::Failed {
                        reason: FailureReason::Cancelled,
                    },
                    events,
                );
            }

            let turn = run.begin_turn();
            let specs = self.registry.specs_for(&agent.tools);

            let decision = match self.decider.decide(agent, &history, &specs).await {
                Ok(decision) => decision,
                Err(e) => {
                    // Malformed or failed decisions consume the turn; the
                    // run continues rather than crashing.
                    warn!(turn, agent = %agent.name, error = %e, "Decision failed");
                    history.push(Message::system(format!(
                        "The previous decision could not be processed: {}. Try again.",
                        e
                    )));
                    continue;
                }
            };

            match decision {
                TurnResult::ToolCalls(calls) => {
                    debug!(turn, agent = %agent.name, count = calls.len(), "Applying tool calls");
                    for call in calls {
                        events.push(RunEvent::ToolCalled {
                            agent: agent.name.clone(),
                            tool: call.name.clone(),
                            args: call.args.clone(),
                        });

                        match self.invoke_one(agent, &call, &mut run).await {
                            Invocation::Ok(output) => {
                                history.push(Message::tool(format!(
                                    "{} returned: {}",
                                    call.name, output
                                )));
                                events.push(RunEvent::ToolResult {
                                    tool: call.name.clone(),
                                    output,
                                });
                            }
                            Invocation::Recoverable(error) => {
                                history.push(Message::tool(format!(
                                    "{} failed: {}",
                                    call.name, error
                                )));
                                events.push(RunEvent::ToolFailed {
                                    tool: call.name.clone(),
                                    error: error.to_string(),
                                });
                            }
                            Invocation::Fatal(message) => {
                                events.push(RunEvent::ToolFailed {
                                    tool: call.name.clone(),
                                    error: message.clone(),
                                });
                                run.transition_to(RunPhase::Terminated);
                                return finish(
                                    run,
                                    RunOutcome::Failed {
                                        reason: FailureReason::TerminalWriteFailed { message },
                                    },
                                    events,
                                );
                            }
                        }
                    }
                }

                TurnResult::Handoff { target, reason } => {
                    run.transition_to(RunPhase::ValidatingHandoff);

                    // A target must be declared by the caller AND exist in
                    // the registered agent set.
                    let next = if agent.can_handoff_to(&target) {
                        self.agents.get(&target)
                    } else {
                        None
                    };

                    let Some(next) = next else {
                        warn!(turn, from = %agent.name, to = %target, "Handoff rejected");
                        events.push(RunEvent::HandoffRejected {
                            from: agent.name.clone(),
                            to: target.clone(),
                        });
                        run.transition_to(RunPhase::Terminated);
                        return finish(
                            run,
                            RunOutcome::Failed {
                                reason: FailureReason::HandoffRejected {
                                    from: agent.name.clone(),
                                    to: target,
                                },
                            },
                            events,
                        );
                    };

                    info!(turn, from = %agent.name, to = %target, %reason, "Handoff accepted");
                    events.push(RunEvent::Handoff {
                        from: agent.name.clone(),
                        to: target.clone(),
                        reason: reason.clone(),
                    });

                    run.transition_to(RunPhase::Running);
                    run.set_current_agent(&target);
                    history.push(Message::system(format!(
                        "Control handed to {}. Reason: {}",
                        target, reason
                    )));

                    agent = next;
                    events.push(RunEvent::AgentActivated {
                        agent: agent.name.clone(),
                    });
                }

                TurnResult::FinalOutput(text) => {
                    info!(turn, agent = %agent.name, "Run produced final output");
                    events.push(RunEvent::FinalOutput {
                        agent: agent.name.clone(),
                        text: text.clone(),
                    });
                    run.transition_to(RunPhase::Terminated);
                    return finish(run, RunOutcome::Success { output: text }, events);
                }
            }
        }

        info!(turns = run.turn(), "Run exhausted its turn budget");
        run.transition_to(RunPhase::Terminated);
        finish(run, RunOutcome::Exhausted, events)
    }

    /// Invoke one tool call on behalf of an agent
    ///
    /// Calls outside the agent's bound subset and unknown names surface as
    /// recoverable errors. A terminal-write tool that already succeeded is
    /// refused without re-executing the side effect; a terminal-write
    /// failure is fatal for the run.
    async fn invoke_one(
        &self,
        agent: &AgentDef,
        call: &ToolCall,
        run: &mut RunState,
    ) -> Invocation {
        if !agent.has_tool(&call.name) {
            warn!(agent = %agent.name, tool = %call.name, "Agent called unbound tool");
            return Invocation::Recoverable(ToolError::NotFound(call.name.clone()));
        }

        let Some(tool) = self.registry.get(&call.name) else {
            return Invocation::Recoverable(ToolError::NotFound(call.name.clone()));
        };

        let terminal = tool.side_effect() == SideEffect::TerminalWrite;
        if terminal && run.terminal_write_done() {
            warn!(tool = %call.name, "Refusing duplicate terminal write");
            return Invocation::Recoverable(ToolError::InvalidArgs(
                "terminal write already completed for this run".to_string(),
            ));
        }

        let invocation = tokio::time::timeout(
            self.config.tool_timeout,
            tool.invoke(call.args.clone(), run.state_mut()),
        )
        .await;

        match invocation {
            Err(_) => {
                let error = ToolError::ExternalFailure(format!(
                    "tool {} timed out after {:?}",
                    call.name, self.config.tool_timeout
                ));
                if terminal {
                    Invocation::Fatal(error.to_string())
                } else {
                    Invocation::Recoverable(error)
                }
            }
            Ok(Err(error)) if terminal => Invocation::Fatal(error.to_string()),
            Ok(Err(error)) => Invocation::Recoverable(error),
            Ok(Ok(output)) => {
                if terminal {
                    run.mark_terminal_write_done();
                }
                Invocation::Ok(output)
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agent_names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn finish(run: RunState, outcome: RunOutcome, events: Vec<RunEvent>) -> RunReport {
    RunReport {
        outcome,
        turns: run.turn(),
        events,
        state: run.into_state(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ScriptedDecider;
    use crate::tool::{SaveStateTool, Tool};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    /// Terminal-write tool that counts attempts and fails or succeeds on demand
    struct CountingPostTool {
        attempts: Arc<AtomicU32>,
        succeed: bool,
    }

    #[async_trait]
    impl Tool for CountingPostTool {
        fn name(&self) -> &str {
            "post_review"
        }

        fn description(&self) -> &str {
            "Post the review"
        }

        fn side_effect(&self) -> SideEffect {
            SideEffect::TerminalWrite
        }

        async fn invoke(
            &self,
            _args: Value,
            _state: &mut SharedState,
        ) -> std::result::Result<Value, ToolError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(json!({"posted": true}))
            } else {
                Err(ToolError::ExternalFailure("502 from host".to_string()))
            }
        }
    }

    fn handoff(target: &str) -> TurnResult {
        TurnResult::Handoff {
            target: target.to_string(),
            reason: "test".to_string(),
        }
    }

    fn final_output(text: &str) -> TurnResult {
        TurnResult::FinalOutput(text.to_string())
    }

    fn orchestrator_with(
        script: Vec<TurnResult>,
        agents: Vec<AgentDef>,
        registry: ToolRegistry,
    ) -> Orchestrator {
        Orchestrator::new(registry, Arc::new(ScriptedDecider::new(script))).with_agents(agents)
    }

    #[tokio::test]
    async fn test_immediate_final_output_succeeds_on_turn_one() {
        let orchestrator = orchestrator_with(
            vec![final_output("all done")],
            vec![AgentDef::new("Root", "root agent")],
            ToolRegistry::new(),
        );

        let report = orchestrator.run("Root", "go", SharedState::new()).await;

        assert_eq!(
            report.outcome,
            RunOutcome::Success {
                output: "all done".to_string()
            }
        );
        assert_eq!(report.turns, 1);
        assert!(matches!(report.events.last(), Some(RunEvent::FinalOutput { .. })));
    }

    #[tokio::test]
    async fn test_round_trip_handoff_carries_state() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SaveStateTool::new(
            "save_note",
            "Save a note",
            "note",
        )));

        let a = AgentDef::new("A", "first")
            .with_handoff_targets(["B"]);
        let b = AgentDef::new("B", "second")
            .with_tools(["save_note"])
            .with_handoff_targets(["A"]);

        // A -> B, B saves a key and hands back, A finishes. The tool call
        // and the return handoff are separate turns.
        let orchestrator = orchestrator_with(
            vec![
                handoff("B"),
                TurnResult::ToolCalls(vec![ToolCall::new(
                    "save_note",
                    json!({"value": "from B"}),
                )]),
                handoff("A"),
                final_output("done"),
            ],
            vec![a, b],
            registry,
        );

        let report = orchestrator.run("A", "go", SharedState::new()).await;

        assert!(report.outcome.is_success());
        assert_eq!(report.turns, 4);
        assert_eq!(report.state.get_str("note"), "from B");
    }

    #[tokio::test]
    async fn test_three_turn_handoff_cycle_succeeds() {
        let a = AgentDef::new("A", "first").with_handoff_targets(["B"]);
        let b = AgentDef::new("B", "second").with_handoff_targets(["A"]);

        let orchestrator = orchestrator_with(
            vec![handoff("B"), handoff("A"), final_output("done")],
            vec![a, b],
            ToolRegistry::new(),
        );

        let report = orchestrator.run("A", "go", SharedState::new()).await;

        assert!(report.outcome.is_success());
        assert_eq!(report.turns, 3);
    }

    #[tokio::test]
    async fn test_undeclared_handoff_target_fails_run() {
        let a = AgentDef::new("A", "first").with_handoff_targets(["B"]);
        let b = AgentDef::new("B", "second");
        let c = AgentDef::new("C", "third");

        let orchestrator = orchestrator_with(
            vec![handoff("C")],
            vec![a, b, c],
            ToolRegistry::new(),
        );

        let initial = SharedState::with_initial([("seed", "value")]);
        let report = orchestrator.run("A", "go", initial.clone()).await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                reason: FailureReason::HandoffRejected {
                    from: "A".to_string(),
                    to: "C".to_string(),
                }
            }
        );
        // State untouched by the rejected transfer.
        assert_eq!(report.state, initial);
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, RunEvent::HandoffRejected { .. })));
    }

    #[tokio::test]
    async fn test_handoff_to_unregistered_agent_rejected() {
        let a = AgentDef::new("A", "first").with_handoff_targets(["Ghost"]);

        let orchestrator =
            orchestrator_with(vec![handoff("Ghost")], vec![a], ToolRegistry::new());

        let report = orchestrator.run("A", "go", SharedState::new()).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Failed {
                reason: FailureReason::HandoffRejected { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_endless_handoffs_exhaust_budget() {
        let a = AgentDef::new("A", "first").with_handoff_targets(["B"]);
        let b = AgentDef::new("B", "second").with_handoff_targets(["A"]);

        let script = vec![
            handoff("B"),
            handoff("A"),
            handoff("B"),
            handoff("A"),
            handoff("B"),
            // Never reached: the budget stops the run first.
            final_output("unreachable"),
        ];

        let orchestrator = orchestrator_with(script, vec![a, b], ToolRegistry::new())
            .with_config(OrchestratorConfig {
                max_turns: 5,
                ..Default::default()
            });

        let report = orchestrator.run("A", "go", SharedState::new()).await;

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(report.turns, 5);
    }

    #[tokio::test]
    async fn test_terminal_write_failure_is_fatal_without_engine_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingPostTool {
            attempts: Arc::clone(&attempts),
            succeed: false,
        }));

        let root = AgentDef::new("Poster", "posts reviews").with_tools(["post_review"]);

        let orchestrator = orchestrator_with(
            vec![TurnResult::ToolCalls(vec![ToolCall::new(
                "post_review",
                json!({}),
            )])],
            vec![root],
            registry,
        );

        let report = orchestrator.run("Poster", "go", SharedState::new()).await;

        assert!(matches!(
            report.outcome,
            RunOutcome::Failed {
                reason: FailureReason::TerminalWriteFailed { .. }
            }
        ));
        // The engine itself never retries the terminal write.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_write_at_most_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CountingPostTool {
            attempts: Arc::clone(&attempts),
            succeed: true,
        }));

        let root = AgentDef::new("Poster", "posts reviews").with_tools(["post_review"]);

        // The agent tries to post twice; the second call must be refused
        // without re-executing the write.
        let orchestrator = orchestrator_with(
            vec![
                TurnResult::ToolCalls(vec![ToolCall::new("post_review", json!({}))]),
                TurnResult::ToolCalls(vec![ToolCall::new("post_review", json!({}))]),
                final_output("posted"),
            ],
            vec![root],
            registry,
        );

        let report = orchestrator.run("Poster", "go", SharedState::new()).await;

        assert!(report.outcome.is_success());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_call_continues_run() {
        let root = AgentDef::new("Root", "root agent");

        let orchestrator = orchestrator_with(
            vec![
                TurnResult::ToolCalls(vec![ToolCall::new("no_such_tool", json!({}))]),
                final_output("recovered"),
            ],
            vec![root],
            ToolRegistry::new(),
        );

        let report = orchestrator.run("Root", "go", SharedState::new()).await;

        assert!(report.outcome.is_success());
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, RunEvent::ToolFailed { .. })));
    }

    #[tokio::test]
    async fn test_decider_failures_consume_turns_until_exhausted() {
        // Empty script: every decision errors. The run must still
        // terminate within the budget.
        let orchestrator = orchestrator_with(
            vec![],
            vec![AgentDef::new("Root", "root agent")],
            ToolRegistry::new(),
        )
        .with_config(OrchestratorConfig {
            max_turns: 3,
            ..Default::default()
        });

        let report = orchestrator.run("Root", "go", SharedState::new()).await;

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(report.turns, 3);
    }

    #[tokio::test]
    async fn test_unknown_root_agent() {
        let orchestrator =
            orchestrator_with(vec![], vec![AgentDef::new("A", "a")], ToolRegistry::new());

        let report = orchestrator.run("Missing", "go", SharedState::new()).await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                reason: FailureReason::UnknownAgent {
                    name: "Missing".to_string()
                }
            }
        );
        assert_eq!(report.turns, 0);
    }

    #[tokio::test]
    async fn test_cancellation_between_turns() {
        let orchestrator = orchestrator_with(
            vec![final_output("never reached")],
            vec![AgentDef::new("Root", "root agent")],
            ToolRegistry::new(),
        );

        orchestrator.cancel_flag().store(true, Ordering::SeqCst);
        let report = orchestrator.run("Root", "go", SharedState::new()).await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                reason: FailureReason::Cancelled
            }
        );
        assert_eq!(report.turns, 0);
    }

    #[tokio::test]
    async fn test_unbound_tool_rejected_even_if_registered() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SaveStateTool::new("save_note", "Save", "note")));

        // Root is not bound to save_note even though the registry has it.
        let root = AgentDef::new("Root", "root agent");

        let orchestrator = orchestrator_with(
            vec![
                TurnResult::ToolCalls(vec![ToolCall::new("save_note", json!({"value": "x"}))]),
                final_output("done"),
            ],
            vec![root],
            registry,
        );

        let report = orchestrator.run("Root", "go", SharedState::new()).await;

        assert!(report.outcome.is_success());
        assert!(!report.state.contains("note"));
    }

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_turns, 20);
        assert_eq!(config.tool_timeout, Duration::from_secs(60));
        assert_eq!(config.post_attempts, 3);
    }
}
