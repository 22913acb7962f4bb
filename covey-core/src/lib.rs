//! Covey Core - Orchestration engine for Covey multi-agent workflows
//!
//! This crate provides the deterministic scaffolding around a set of
//! cooperating agents: a shared state store, a tool registry, explicit
//! handoff validation, and a bounded run loop. The non-deterministic
//! decision function sits behind the [`agent::Decider`] trait.

pub mod agent;
pub mod config;
pub mod error;
pub mod secrets;
pub mod state;
pub mod tool;
pub mod workflow;

pub use agent::{AgentDef, Decider, Message, Role, ScriptedDecider, ToolCall, TurnResult};
pub use config::{Config, LlmConfig};
pub use error::{Error, Result};
pub use secrets::Secrets;
pub use state::SharedState;
pub use tool::{SaveStateTool, SideEffect, Tool, ToolError, ToolRegistry, ToolSpec};
pub use workflow::{
    FailureReason, Orchestrator, OrchestratorConfig, RunEvent, RunOutcome, RunReport,
};
